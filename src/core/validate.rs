use log::warn;
use thiserror::Error;

use super::types::{NumericalWarning, SimulationConfig, SpendingPolicy};

pub const FRACTION_SUM_TOLERANCE: f64 = 1e-3;
pub const MIN_AGE: u32 = 18;
pub const MAX_AGE: u32 = 100;
pub const MIN_HORIZON_YEARS: u32 = 1;
pub const MAX_HORIZON_YEARS: u32 = 80;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{field} must be a finite number, got {value}")]
    NonFinite { field: &'static str, value: f64 },
    #[error("starting balance must be > 0, got {value}")]
    StartingBalance { value: f64 },
    #[error("horizon must be between 1 and 80 years, got {years}")]
    Horizon { years: u32 },
    #[error("current age must be between 18 and 100, got {age}")]
    CurrentAge { age: u32 },
    #[error("scenario count must be > 0")]
    NoScenarios,
    #[error("{asset} allocation must be between 0 and 1, got {value}")]
    AllocationFraction { asset: &'static str, value: f64 },
    #[error("asset allocation must sum to 1, got {sum}")]
    AllocationSum { sum: f64 },
    #[error("{account} tax fraction must be between 0 and 1, got {value}")]
    TaxFraction { account: &'static str, value: f64 },
    #[error("tax account fractions must sum to 1, got {sum}")]
    TaxFractionSum { sum: f64 },
    #[error("{asset} volatility must be >= 0, got {value}")]
    NegativeVolatility { asset: &'static str, value: f64 },
    #[error("{pair} correlation must be between -1 and 1, got {value}")]
    Correlation { pair: &'static str, value: f64 },
    #[error("{field} must be >= 0, got {value}")]
    NegativeAmount { field: &'static str, value: f64 },
    #[error("{field} must be between 0 and 1, got {value}")]
    Rate { field: &'static str, value: f64 },
    #[error("{field} must be > -1, got {value}")]
    GrowthRate { field: &'static str, value: f64 },
    #[error("hybrid spending floor {floor} exceeds ceiling {ceiling}")]
    HybridBounds { floor: f64, ceiling: f64 },
    #[error("lifestyle phase {index} is invalid: ages {start_age}..{end_age}, multiplier {multiplier}")]
    LifestylePhase {
        index: usize,
        start_age: u32,
        end_age: u32,
        multiplier: f64,
    },
    #[error("guardrail multiplier bounds are invalid: min {min}, max {max}")]
    GuardrailBounds { min: f64, max: f64 },
    #[error("RMD table is invalid: {reason}")]
    RmdTable { reason: String },
}

/// A configuration that passed every check, with fractions rescaled to sum to exactly 1.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedConfig {
    config: SimulationConfig,
    warnings: Vec<NumericalWarning>,
}

impl ValidatedConfig {
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn warnings(&self) -> &[NumericalWarning] {
        &self.warnings
    }
}

pub fn validate(config: &SimulationConfig) -> Result<ValidatedConfig, ConfigError> {
    check_finite(config)?;

    if config.starting_balance <= 0.0 {
        return Err(ConfigError::StartingBalance {
            value: config.starting_balance,
        });
    }

    if !(MIN_HORIZON_YEARS..=MAX_HORIZON_YEARS).contains(&config.horizon_years) {
        return Err(ConfigError::Horizon {
            years: config.horizon_years,
        });
    }

    if !(MIN_AGE..=MAX_AGE).contains(&config.current_age) {
        return Err(ConfigError::CurrentAge {
            age: config.current_age,
        });
    }

    if config.scenarios == 0 {
        return Err(ConfigError::NoScenarios);
    }

    let allocation = &config.allocation;
    for (asset, value) in [
        ("equity", allocation.equity),
        ("fixed income", allocation.fixed_income),
        ("cash", allocation.cash),
    ] {
        if !(0.0..=1.0).contains(&value) {
            return Err(ConfigError::AllocationFraction { asset, value });
        }
    }
    let allocation_sum = allocation.total();
    if (allocation_sum - 1.0).abs() > FRACTION_SUM_TOLERANCE {
        return Err(ConfigError::AllocationSum {
            sum: allocation_sum,
        });
    }

    let tax = &config.tax;
    for (account, value) in [
        ("taxable", tax.taxable_fraction),
        ("traditional", tax.traditional_fraction),
        ("roth", tax.roth_fraction),
    ] {
        if !(0.0..=1.0).contains(&value) {
            return Err(ConfigError::TaxFraction { account, value });
        }
    }
    let tax_sum = tax.total();
    if (tax_sum - 1.0).abs() > FRACTION_SUM_TOLERANCE {
        return Err(ConfigError::TaxFractionSum { sum: tax_sum });
    }

    for (asset, assumption) in config.assumptions.classes() {
        if assumption.volatility < 0.0 {
            return Err(ConfigError::NegativeVolatility {
                asset,
                value: assumption.volatility,
            });
        }
    }

    for (pair, value) in config.assumptions.correlations.pairs() {
        if !(-1.0..=1.0).contains(&value) {
            return Err(ConfigError::Correlation { pair, value });
        }
    }

    for (field, value) in [
        ("monthly income", config.monthly_income),
        ("monthly spending", config.monthly_spending),
        ("social security", config.income.social_security_monthly),
        ("pension", config.income.pension_monthly),
        ("healthcare cost", config.healthcare.monthly_cost),
    ] {
        if value < 0.0 {
            return Err(ConfigError::NegativeAmount { field, value });
        }
    }

    for (field, value) in [
        ("advisory fee", config.fees.advisory_annual),
        ("fund expense ratio", config.fees.fund_expense_annual),
        ("marginal tax rate", tax.marginal_rate),
        ("capital gains tax rate", tax.capital_gains_rate),
    ] {
        if !(0.0..=1.0).contains(&value) {
            return Err(ConfigError::Rate { field, value });
        }
    }

    for (field, value) in [
        ("inflation", config.inflation_rate),
        ("healthcare inflation", config.healthcare.inflation_rate),
        ("pension COLA", config.income.pension_cola),
    ] {
        if value <= -1.0 {
            return Err(ConfigError::GrowthRate { field, value });
        }
    }

    check_spending_policy(&config.spending_policy)?;
    check_optional_policies(config)?;
    check_rmd_table(config)?;

    let mut normalized = config.clone();
    normalized.allocation.equity /= allocation_sum;
    normalized.allocation.fixed_income /= allocation_sum;
    normalized.allocation.cash /= allocation_sum;
    normalized.tax.taxable_fraction /= tax_sum;
    normalized.tax.traditional_fraction /= tax_sum;
    normalized.tax.roth_fraction /= tax_sum;

    let warnings = numerical_warnings(&normalized);
    for warning in &warnings {
        warn!("{warning}");
    }

    Ok(ValidatedConfig {
        config: normalized,
        warnings,
    })
}

fn check_finite(config: &SimulationConfig) -> Result<(), ConfigError> {
    let assumptions = &config.assumptions;
    let mut fields = vec![
        ("starting balance", config.starting_balance),
        ("monthly income", config.monthly_income),
        ("monthly spending", config.monthly_spending),
        ("inflation", config.inflation_rate),
        ("equity allocation", config.allocation.equity),
        ("fixed income allocation", config.allocation.fixed_income),
        ("cash allocation", config.allocation.cash),
        ("equity return", assumptions.equity.expected_return),
        ("equity volatility", assumptions.equity.volatility),
        ("fixed income return", assumptions.fixed_income.expected_return),
        ("fixed income volatility", assumptions.fixed_income.volatility),
        ("cash return", assumptions.cash.expected_return),
        ("cash volatility", assumptions.cash.volatility),
        (
            "equity/fixed income correlation",
            assumptions.correlations.equity_fixed_income,
        ),
        ("equity/cash correlation", assumptions.correlations.equity_cash),
        (
            "fixed income/cash correlation",
            assumptions.correlations.fixed_income_cash,
        ),
        ("social security", config.income.social_security_monthly),
        ("pension", config.income.pension_monthly),
        ("pension COLA", config.income.pension_cola),
        ("healthcare cost", config.healthcare.monthly_cost),
        ("healthcare inflation", config.healthcare.inflation_rate),
        ("advisory fee", config.fees.advisory_annual),
        ("fund expense ratio", config.fees.fund_expense_annual),
        ("taxable fraction", config.tax.taxable_fraction),
        ("traditional fraction", config.tax.traditional_fraction),
        ("roth fraction", config.tax.roth_fraction),
        ("marginal tax rate", config.tax.marginal_rate),
        ("capital gains tax rate", config.tax.capital_gains_rate),
    ];

    match config.spending_policy {
        SpendingPolicy::FixedReal => {}
        SpendingPolicy::PercentOfPortfolio { annual_rate } => {
            fields.push(("spending rate", annual_rate));
        }
        SpendingPolicy::Hybrid {
            annual_rate,
            annual_floor,
            annual_ceiling,
        } => {
            fields.push(("spending rate", annual_rate));
            fields.push(("spending floor", annual_floor));
            fields.push(("spending ceiling", annual_ceiling));
        }
    }

    if let Some(glide) = &config.glide_path {
        fields.push(("glide path equity shift", glide.annual_equity_shift));
        fields.push(("glide path minimum equity", glide.min_equity));
    }

    for phase in &config.lifestyle_phases {
        fields.push(("lifestyle phase multiplier", phase.multiplier));
    }

    if let Some(guardrails) = &config.guardrails {
        fields.push(("guardrail upper band", guardrails.upper_band));
        fields.push(("guardrail lower band", guardrails.lower_band));
        fields.push(("guardrail adjustment", guardrails.adjustment));
        fields.push(("guardrail minimum multiplier", guardrails.min_multiplier));
        fields.push(("guardrail maximum multiplier", guardrails.max_multiplier));
    }

    for (field, value) in fields {
        if !value.is_finite() {
            return Err(ConfigError::NonFinite { field, value });
        }
    }
    Ok(())
}

fn check_spending_policy(policy: &SpendingPolicy) -> Result<(), ConfigError> {
    match *policy {
        SpendingPolicy::FixedReal => Ok(()),
        SpendingPolicy::PercentOfPortfolio { annual_rate } => {
            if !(0.0..=1.0).contains(&annual_rate) {
                return Err(ConfigError::Rate {
                    field: "spending rate",
                    value: annual_rate,
                });
            }
            Ok(())
        }
        SpendingPolicy::Hybrid {
            annual_rate,
            annual_floor,
            annual_ceiling,
        } => {
            if !(0.0..=1.0).contains(&annual_rate) {
                return Err(ConfigError::Rate {
                    field: "spending rate",
                    value: annual_rate,
                });
            }
            if annual_floor < 0.0 {
                return Err(ConfigError::NegativeAmount {
                    field: "spending floor",
                    value: annual_floor,
                });
            }
            if annual_floor > annual_ceiling {
                return Err(ConfigError::HybridBounds {
                    floor: annual_floor,
                    ceiling: annual_ceiling,
                });
            }
            Ok(())
        }
    }
}

fn check_optional_policies(config: &SimulationConfig) -> Result<(), ConfigError> {
    if let Some(glide) = &config.glide_path {
        if glide.annual_equity_shift < 0.0 {
            return Err(ConfigError::NegativeAmount {
                field: "glide path equity shift",
                value: glide.annual_equity_shift,
            });
        }
        if !(0.0..=1.0).contains(&glide.min_equity) {
            return Err(ConfigError::Rate {
                field: "glide path minimum equity",
                value: glide.min_equity,
            });
        }
    }

    for (index, phase) in config.lifestyle_phases.iter().enumerate() {
        if phase.end_age <= phase.start_age || phase.multiplier < 0.0 {
            return Err(ConfigError::LifestylePhase {
                index,
                start_age: phase.start_age,
                end_age: phase.end_age,
                multiplier: phase.multiplier,
            });
        }
    }

    if let Some(guardrails) = &config.guardrails {
        for (field, value) in [
            ("guardrail upper band", guardrails.upper_band),
            ("guardrail lower band", guardrails.lower_band),
            ("guardrail adjustment", guardrails.adjustment),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Rate { field, value });
            }
        }
        if guardrails.min_multiplier <= 0.0 || guardrails.min_multiplier > guardrails.max_multiplier
        {
            return Err(ConfigError::GuardrailBounds {
                min: guardrails.min_multiplier,
                max: guardrails.max_multiplier,
            });
        }
    }

    Ok(())
}

fn check_rmd_table(config: &SimulationConfig) -> Result<(), ConfigError> {
    let table = &config.rmd.table;
    if table.is_empty() {
        return Err(ConfigError::RmdTable {
            reason: "table has no entries".to_string(),
        });
    }
    if let Some((age, divisor)) = table
        .entries()
        .find(|(_, divisor)| !divisor.is_finite() || *divisor <= 0.0)
    {
        return Err(ConfigError::RmdTable {
            reason: format!("divisor for age {age} must be > 0, got {divisor}"),
        });
    }
    Ok(())
}

fn numerical_warnings(config: &SimulationConfig) -> Vec<NumericalWarning> {
    let mut warnings = Vec::new();

    for (asset, assumption) in config.assumptions.classes() {
        if !(-0.05..=0.15).contains(&assumption.expected_return) {
            warnings.push(NumericalWarning::UnusualReturn {
                asset: asset.to_string(),
                value: assumption.expected_return,
            });
        }
        if assumption.volatility > 0.50 {
            warnings.push(NumericalWarning::UnusualVolatility {
                asset: asset.to_string(),
                value: assumption.volatility,
            });
        }
    }

    if !(-0.01..=0.10).contains(&config.inflation_rate) {
        warnings.push(NumericalWarning::UnusualInflation {
            value: config.inflation_rate,
        });
    }

    if config.healthcare.monthly_cost > 0.0
        && !(0.0..=0.15).contains(&config.healthcare.inflation_rate)
    {
        warnings.push(NumericalWarning::UnusualHealthcareInflation {
            value: config.healthcare.inflation_rate,
        });
    }

    if let SpendingPolicy::FixedReal = config.spending_policy {
        let annual_rate = config.monthly_spending * 12.0 / config.starting_balance;
        if annual_rate > 0.10 {
            warnings.push(NumericalWarning::HighWithdrawalRate { annual_rate });
        }
    }

    warnings
}
