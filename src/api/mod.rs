use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;

use crate::core::{
    SensitivityParameter, SimulationConfig, SimulationResult, SpendingPolicy, run_sensitivity,
    simulate,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CliSpendingPolicy {
    FixedReal,
    PercentOfPortfolio,
    Hybrid,
}

impl From<&SpendingPolicy> for CliSpendingPolicy {
    fn from(value: &SpendingPolicy) -> Self {
        match value {
            SpendingPolicy::FixedReal => CliSpendingPolicy::FixedReal,
            SpendingPolicy::PercentOfPortfolio { .. } => CliSpendingPolicy::PercentOfPortfolio,
            SpendingPolicy::Hybrid { .. } => CliSpendingPolicy::Hybrid,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CliSensitivityParameter {
    MonthlySpending,
    StartingBalance,
    EquityReturn,
    EquityVolatility,
    InflationRate,
}

impl CliSensitivityParameter {
    /// Rates are entered in percent on the command line.
    fn to_model_value(self, value: f64) -> f64 {
        match self {
            CliSensitivityParameter::MonthlySpending | CliSensitivityParameter::StartingBalance => {
                value
            }
            CliSensitivityParameter::EquityReturn
            | CliSensitivityParameter::EquityVolatility
            | CliSensitivityParameter::InflationRate => pct(value),
        }
    }
}

impl From<CliSensitivityParameter> for SensitivityParameter {
    fn from(value: CliSensitivityParameter) -> Self {
        match value {
            CliSensitivityParameter::MonthlySpending => SensitivityParameter::MonthlySpending,
            CliSensitivityParameter::StartingBalance => SensitivityParameter::StartingBalance,
            CliSensitivityParameter::EquityReturn => SensitivityParameter::EquityReturn,
            CliSensitivityParameter::EquityVolatility => SensitivityParameter::EquityVolatility,
            CliSensitivityParameter::InflationRate => SensitivityParameter::InflationRate,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "runway",
    about = "Monte Carlo retirement portfolio simulator (returns, income, spending, taxes, RMDs)"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one simulation and print the result as JSON.
    Simulate {
        #[command(flatten)]
        config: ConfigArgs,
        #[arg(long, help = "Print headline metrics instead of the full result")]
        summary: bool,
    },
    /// Re-run the simulation across values of one input.
    Sensitivity {
        #[command(flatten)]
        config: ConfigArgs,
        #[arg(long, value_enum)]
        parameter: CliSensitivityParameter,
        #[arg(
            long,
            value_delimiter = ',',
            required = true,
            allow_negative_numbers = true,
            help = "Comma-separated values; rates in percent, amounts in dollars"
        )]
        values: Vec<f64>,
    },
}

/// Every flag is optional and overrides the config file (or the built-in defaults).
#[derive(Args, Debug, Default, Clone)]
pub struct ConfigArgs {
    #[arg(long, help = "JSON config file; flags below override its values")]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub starting_balance: Option<f64>,
    #[arg(long)]
    pub horizon_years: Option<u32>,
    #[arg(long)]
    pub current_age: Option<u32>,
    #[arg(long, help = "Age at which pre-retirement income stops")]
    pub retirement_age: Option<u32>,
    #[arg(long, help = "Monthly salary until retirement age")]
    pub monthly_income: Option<f64>,
    #[arg(long, help = "Monthly spending target in today's dollars")]
    pub monthly_spending: Option<f64>,
    #[arg(long, allow_negative_numbers = true, help = "Annual inflation in percent, e.g. 2.5")]
    pub inflation: Option<f64>,

    #[arg(long, help = "Equity allocation in percent")]
    pub equity_allocation: Option<f64>,
    #[arg(long, help = "Fixed income allocation in percent")]
    pub fixed_income_allocation: Option<f64>,
    #[arg(long, help = "Cash allocation in percent")]
    pub cash_allocation: Option<f64>,

    #[arg(long, allow_negative_numbers = true, help = "Expected annual equity return in percent")]
    pub equity_return: Option<f64>,
    #[arg(long, help = "Annual equity volatility in percent")]
    pub equity_volatility: Option<f64>,
    #[arg(
        long,
        allow_negative_numbers = true,
        help = "Expected annual fixed income return in percent"
    )]
    pub fixed_income_return: Option<f64>,
    #[arg(long, help = "Annual fixed income volatility in percent")]
    pub fixed_income_volatility: Option<f64>,
    #[arg(long, allow_negative_numbers = true, help = "Expected annual cash return in percent")]
    pub cash_return: Option<f64>,
    #[arg(long, help = "Annual cash volatility in percent")]
    pub cash_volatility: Option<f64>,

    #[arg(long)]
    pub scenarios: Option<u32>,
    #[arg(long, conflicts_with = "random_seed")]
    pub seed: Option<u64>,
    #[arg(long, help = "Draw a fresh seed; the one used is reported in the output")]
    pub random_seed: bool,

    #[arg(long, value_enum)]
    pub spending_policy: Option<CliSpendingPolicy>,
    #[arg(long, help = "Annual withdrawal rate in percent for the percent and hybrid policies")]
    pub withdrawal_rate: Option<f64>,
    #[arg(long, help = "Hybrid policy annual spending floor in today's dollars")]
    pub spending_floor: Option<f64>,
    #[arg(long, help = "Hybrid policy annual spending ceiling in today's dollars")]
    pub spending_ceiling: Option<f64>,

    #[arg(long)]
    pub social_security_monthly: Option<f64>,
    #[arg(long)]
    pub social_security_start_age: Option<u32>,
    #[arg(long)]
    pub pension_monthly: Option<f64>,
    #[arg(long)]
    pub pension_start_age: Option<u32>,
    #[arg(long, help = "Pension cost-of-living adjustment in percent")]
    pub pension_cola: Option<f64>,

    #[arg(long)]
    pub healthcare_monthly: Option<f64>,
    #[arg(long)]
    pub healthcare_start_age: Option<u32>,
    #[arg(long, help = "Healthcare cost inflation in percent")]
    pub healthcare_inflation: Option<f64>,

    #[arg(long, help = "Annual advisory fee in percent of balance")]
    pub advisory_fee: Option<f64>,
    #[arg(long, help = "Annual fund expense ratio in percent of balance")]
    pub fund_expense: Option<f64>,

    #[arg(long, help = "Marginal income tax rate in percent")]
    pub marginal_tax_rate: Option<f64>,
    #[arg(long, help = "Capital gains tax rate in percent")]
    pub capital_gains_rate: Option<f64>,

    #[arg(long, help = "Equity share moved to fixed income each year, in percent")]
    pub glide_shift: Option<f64>,
    #[arg(long, help = "Equity share the glide path stops at, in percent")]
    pub glide_floor: Option<f64>,

    #[arg(long, help = "Enable spending guardrails with default bands")]
    pub guardrails: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulationSummary {
    seed: u64,
    scenarios: usize,
    months: usize,
    expected_annual_return: f64,
    annual_volatility: f64,
    success_probability: f64,
    median_ending_balance: f64,
    p10_ending_balance: f64,
    p90_ending_balance: f64,
    warnings: Vec<String>,
}

impl From<&SimulationResult> for SimulationSummary {
    fn from(result: &SimulationResult) -> Self {
        Self {
            seed: result.seed,
            scenarios: result.scenarios,
            months: result.months,
            expected_annual_return: result.expected_annual_return,
            annual_volatility: result.annual_volatility,
            success_probability: result.success_probability,
            median_ending_balance: result.ending_values.median,
            p10_ending_balance: result.ending_values.p10,
            p90_ending_balance: result.ending_values.p90,
            warnings: result.warnings.iter().map(ToString::to_string).collect(),
        }
    }
}

fn pct(value: f64) -> f64 {
    value / 100.0
}

pub fn load_config(path: &Path) -> anyhow::Result<SimulationConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse config file {}", path.display()))
}

pub fn build_config(args: &ConfigArgs) -> anyhow::Result<SimulationConfig> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => SimulationConfig::default(),
    };

    if let Some(v) = args.starting_balance {
        config.starting_balance = v;
    }
    if let Some(v) = args.horizon_years {
        config.horizon_years = v;
    }
    if let Some(v) = args.current_age {
        config.current_age = v;
    }
    if let Some(v) = args.retirement_age {
        config.retirement_age = v;
    }
    if let Some(v) = args.monthly_income {
        config.monthly_income = v;
    }
    if let Some(v) = args.monthly_spending {
        config.monthly_spending = v;
    }
    if let Some(v) = args.inflation {
        config.inflation_rate = pct(v);
    }

    if let Some(v) = args.equity_allocation {
        config.allocation.equity = pct(v);
    }
    if let Some(v) = args.fixed_income_allocation {
        config.allocation.fixed_income = pct(v);
    }
    if let Some(v) = args.cash_allocation {
        config.allocation.cash = pct(v);
    }

    let assumptions = &mut config.assumptions;
    if let Some(v) = args.equity_return {
        assumptions.equity.expected_return = pct(v);
    }
    if let Some(v) = args.equity_volatility {
        assumptions.equity.volatility = pct(v);
    }
    if let Some(v) = args.fixed_income_return {
        assumptions.fixed_income.expected_return = pct(v);
    }
    if let Some(v) = args.fixed_income_volatility {
        assumptions.fixed_income.volatility = pct(v);
    }
    if let Some(v) = args.cash_return {
        assumptions.cash.expected_return = pct(v);
    }
    if let Some(v) = args.cash_volatility {
        assumptions.cash.volatility = pct(v);
    }

    if let Some(v) = args.scenarios {
        config.scenarios = v;
    }
    if args.random_seed {
        config.seed = None;
    } else if let Some(v) = args.seed {
        config.seed = Some(v);
    }

    config.spending_policy = spending_policy(&config.spending_policy, args)?;

    let income = &mut config.income;
    if let Some(v) = args.social_security_monthly {
        income.social_security_monthly = v;
    }
    if let Some(v) = args.social_security_start_age {
        income.social_security_start_age = v;
    }
    if let Some(v) = args.pension_monthly {
        income.pension_monthly = v;
    }
    if let Some(v) = args.pension_start_age {
        income.pension_start_age = v;
    }
    if let Some(v) = args.pension_cola {
        income.pension_cola = pct(v);
    }

    if let Some(v) = args.healthcare_monthly {
        config.healthcare.monthly_cost = v;
    }
    if let Some(v) = args.healthcare_start_age {
        config.healthcare.start_age = v;
    }
    if let Some(v) = args.healthcare_inflation {
        config.healthcare.inflation_rate = pct(v);
    }

    if let Some(v) = args.advisory_fee {
        config.fees.advisory_annual = pct(v);
    }
    if let Some(v) = args.fund_expense {
        config.fees.fund_expense_annual = pct(v);
    }

    if let Some(v) = args.marginal_tax_rate {
        config.tax.marginal_rate = pct(v);
    }
    if let Some(v) = args.capital_gains_rate {
        config.tax.capital_gains_rate = pct(v);
    }

    if args.glide_shift.is_some() || args.glide_floor.is_some() {
        let mut glide = config.glide_path.take().unwrap_or_default();
        if let Some(v) = args.glide_shift {
            glide.annual_equity_shift = pct(v);
        }
        if let Some(v) = args.glide_floor {
            glide.min_equity = pct(v);
        }
        config.glide_path = Some(glide);
    }

    if args.guardrails && config.guardrails.is_none() {
        config.guardrails = Some(Default::default());
    }

    Ok(config)
}

// Policy flags overlay the current policy's own parameters when the kind is unchanged.
fn spending_policy(current: &SpendingPolicy, args: &ConfigArgs) -> anyhow::Result<SpendingPolicy> {
    let (rate, floor, ceiling) = match *current {
        SpendingPolicy::FixedReal => (None, None, None),
        SpendingPolicy::PercentOfPortfolio { annual_rate } => (Some(annual_rate), None, None),
        SpendingPolicy::Hybrid {
            annual_rate,
            annual_floor,
            annual_ceiling,
        } => (Some(annual_rate), Some(annual_floor), Some(annual_ceiling)),
    };
    let rate = args.withdrawal_rate.map(pct).or(rate);
    let floor = args.spending_floor.or(floor);
    let ceiling = args.spending_ceiling.or(ceiling);

    let kind = args
        .spending_policy
        .unwrap_or_else(|| CliSpendingPolicy::from(current));
    let policy = match kind {
        CliSpendingPolicy::FixedReal => {
            if args.withdrawal_rate.is_some()
                || args.spending_floor.is_some()
                || args.spending_ceiling.is_some()
            {
                bail!("--withdrawal-rate and the spending bounds need a percent or hybrid policy");
            }
            SpendingPolicy::FixedReal
        }
        CliSpendingPolicy::PercentOfPortfolio => {
            if args.spending_floor.is_some() || args.spending_ceiling.is_some() {
                bail!("--spending-floor and --spending-ceiling only apply to the hybrid policy");
            }
            SpendingPolicy::PercentOfPortfolio {
                annual_rate: rate
                    .context("--withdrawal-rate is required for the percent-of-portfolio policy")?,
            }
        }
        CliSpendingPolicy::Hybrid => SpendingPolicy::Hybrid {
            annual_rate: rate.context("--withdrawal-rate is required for the hybrid policy")?,
            annual_floor: floor.context("--spending-floor is required for the hybrid policy")?,
            annual_ceiling: ceiling
                .context("--spending-ceiling is required for the hybrid policy")?,
        },
    };
    Ok(policy)
}

/// Runs one command and returns its JSON output.
pub fn run_cli(cli: Cli) -> anyhow::Result<String> {
    let output = match cli.command {
        Command::Simulate { config, summary } => {
            let config = build_config(&config)?;
            let result = simulate(&config).context("invalid simulation config")?;
            if summary {
                serde_json::to_string_pretty(&SimulationSummary::from(&result))?
            } else {
                serde_json::to_string_pretty(&result)?
            }
        }
        Command::Sensitivity {
            config,
            parameter,
            values,
        } => {
            let config = build_config(&config)?;
            let values = values
                .iter()
                .map(|v| parameter.to_model_value(*v))
                .collect::<Vec<_>>();
            let report = run_sensitivity(&config, parameter.into(), &values)
                .context("invalid simulation config")?;
            serde_json::to_string_pretty(&report)?
        }
    };
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    const EPS: f64 = 1e-9;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("runway").chain(args.iter().copied()))
            .expect("valid arguments")
    }

    fn config_args(cli: &Cli) -> &ConfigArgs {
        match &cli.command {
            Command::Simulate { config, .. } | Command::Sensitivity { config, .. } => config,
        }
    }

    fn temp_config(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "runway-{}-{name}.json",
            std::process::id()
        ));
        fs::write(&path, contents).expect("failed to write temp config");
        path
    }

    #[test]
    fn no_flags_gives_default_config() {
        let config = build_config(&ConfigArgs::default()).expect("valid config");
        assert_eq!(config, SimulationConfig::default());
    }

    #[test]
    fn percent_flags_are_converted_to_fractions() {
        let cli = parse(&[
            "simulate",
            "--inflation",
            "3",
            "--equity-return",
            "6",
            "--equity-volatility",
            "20",
            "--advisory-fee",
            "1",
            "--marginal-tax-rate",
            "24",
            "--equity-allocation",
            "50",
            "--fixed-income-allocation",
            "40",
        ]);
        let config = build_config(config_args(&cli)).expect("valid config");
        assert_approx(config.inflation_rate, 0.03);
        assert_approx(config.assumptions.equity.expected_return, 0.06);
        assert_approx(config.assumptions.equity.volatility, 0.20);
        assert_approx(config.fees.advisory_annual, 0.01);
        assert_approx(config.tax.marginal_rate, 0.24);
        assert_approx(config.allocation.equity, 0.5);
        assert_approx(config.allocation.fixed_income, 0.4);
    }

    #[test]
    fn dollar_flags_are_taken_as_is() {
        let cli = parse(&[
            "simulate",
            "--starting-balance",
            "750000",
            "--monthly-spending",
            "3500",
            "--scenarios",
            "200",
            "--seed",
            "9",
        ]);
        let config = build_config(config_args(&cli)).expect("valid config");
        assert_approx(config.starting_balance, 750_000.0);
        assert_approx(config.monthly_spending, 3_500.0);
        assert_eq!(config.scenarios, 200);
        assert_eq!(config.seed, Some(9));
    }

    #[test]
    fn random_seed_clears_the_seed() {
        let cli = parse(&["simulate", "--random-seed"]);
        let config = build_config(config_args(&cli)).expect("valid config");
        assert_eq!(config.seed, None);
    }

    #[test]
    fn seed_and_random_seed_conflict() {
        let err = Cli::try_parse_from(["runway", "simulate", "--seed", "1", "--random-seed"])
            .expect_err("must reject conflicting seed flags");
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn flags_override_config_file() {
        let path = temp_config(
            "override",
            r#"{
                "startingBalance": 500000,
                "monthlySpending": 2500,
                "spendingPolicy": {
                    "type": "hybrid",
                    "annualRate": 0.05,
                    "annualFloor": 30000,
                    "annualCeiling": 60000
                },
                "guardrails": { "upperBand": 0.3 }
            }"#,
        );
        let args = ConfigArgs {
            config: Some(path.clone()),
            monthly_spending: Some(3_000.0),
            withdrawal_rate: Some(4.0),
            ..ConfigArgs::default()
        };
        let config = build_config(&args).expect("valid config");
        let _ = fs::remove_file(&path);

        assert_approx(config.starting_balance, 500_000.0);
        assert_approx(config.monthly_spending, 3_000.0);
        assert_eq!(
            config.spending_policy,
            SpendingPolicy::Hybrid {
                annual_rate: 0.04,
                annual_floor: 30_000.0,
                annual_ceiling: 60_000.0,
            }
        );
        let guardrails = config.guardrails.expect("guardrails from file");
        assert_approx(guardrails.upper_band, 0.3);
        assert_approx(guardrails.lower_band, 0.2);
    }

    #[test]
    fn missing_config_file_names_the_path() {
        let args = ConfigArgs {
            config: Some(PathBuf::from("/nonexistent/runway.json")),
            ..ConfigArgs::default()
        };
        let err = build_config(&args).expect_err("must fail on missing file");
        assert!(err.to_string().contains("/nonexistent/runway.json"));
    }

    #[test]
    fn malformed_config_file_is_rejected() {
        let path = temp_config("malformed", "{ \"startingBalance\": ");
        let err = load_config(&path).expect_err("must fail on bad json");
        let _ = fs::remove_file(&path);
        assert!(err.to_string().contains("failed to parse config file"));
    }

    #[test]
    fn hybrid_policy_requires_its_bounds() {
        let args = ConfigArgs {
            spending_policy: Some(CliSpendingPolicy::Hybrid),
            withdrawal_rate: Some(4.0),
            spending_floor: Some(30_000.0),
            ..ConfigArgs::default()
        };
        let err = build_config(&args).expect_err("must require a ceiling");
        assert!(err.to_string().contains("--spending-ceiling"));
    }

    #[test]
    fn withdrawal_rate_needs_a_rate_based_policy() {
        let args = ConfigArgs {
            withdrawal_rate: Some(4.0),
            ..ConfigArgs::default()
        };
        let err = build_config(&args).expect_err("fixed-real has no rate");
        assert!(err.to_string().contains("--withdrawal-rate"));
    }

    #[test]
    fn percent_policy_is_built_from_flags() {
        let cli = parse(&[
            "simulate",
            "--spending-policy",
            "percent-of-portfolio",
            "--withdrawal-rate",
            "4",
        ]);
        let config = build_config(config_args(&cli)).expect("valid config");
        assert_eq!(
            config.spending_policy,
            SpendingPolicy::PercentOfPortfolio { annual_rate: 0.04 }
        );
    }

    #[test]
    fn glide_and_guardrail_flags_enable_features() {
        let cli = parse(&["simulate", "--glide-shift", "2", "--guardrails"]);
        let config = build_config(config_args(&cli)).expect("valid config");
        let glide = config.glide_path.expect("glide path enabled");
        assert_approx(glide.annual_equity_shift, 0.02);
        assert_approx(glide.min_equity, 0.3);
        assert!(config.guardrails.is_some());
    }

    #[test]
    fn simulate_summary_is_json() {
        let cli = parse(&[
            "simulate",
            "--scenarios",
            "100",
            "--horizon-years",
            "10",
            "--summary",
        ]);
        let output = run_cli(cli).expect("simulation runs");
        let json: Value = serde_json::from_str(&output).expect("valid json");
        let success = json["successProbability"].as_f64().expect("success probability");
        assert!((0.0..=1.0).contains(&success));
        assert_eq!(json["seed"], 42);
        assert_eq!(json["months"], 120);
    }

    #[test]
    fn simulate_full_result_includes_statistics() {
        let cli = parse(&["simulate", "--scenarios", "20", "--horizon-years", "2"]);
        let output = run_cli(cli).expect("simulation runs");
        let json: Value = serde_json::from_str(&output).expect("valid json");
        assert_eq!(
            json["monthlyStatistics"].as_array().map(Vec::len),
            Some(25)
        );
        assert!(json["representativePaths"]["worst"]["balances"].is_array());
    }

    #[test]
    fn sensitivity_converts_rate_values_and_keeps_order() {
        let cli = parse(&[
            "sensitivity",
            "--scenarios",
            "50",
            "--horizon-years",
            "5",
            "--parameter",
            "inflation-rate",
            "--values",
            "3,1,2",
        ]);
        let output = run_cli(cli).expect("sweep runs");
        let json: Value = serde_json::from_str(&output).expect("valid json");
        let values = json["points"]
            .as_array()
            .expect("points")
            .iter()
            .map(|p| p["value"].as_f64().expect("value"))
            .collect::<Vec<_>>();
        assert_eq!(values.len(), 3);
        assert_approx(values[0], 0.03);
        assert_approx(values[1], 0.01);
        assert_approx(values[2], 0.02);
        assert_eq!(json["parameter"], "inflation-rate");
    }

    #[test]
    fn invalid_config_surfaces_the_violated_rule() {
        let cli = parse(&["simulate", "--starting-balance", "0"]);
        let err = run_cli(cli).expect_err("must reject zero balance");
        assert!(format!("{err:#}").contains("starting balance must be > 0"));
    }
}
