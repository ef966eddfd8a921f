use serde::{Deserialize, Serialize};

use super::rmd::RmdTable;

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AssetAllocation {
    pub equity: f64,
    pub fixed_income: f64,
    pub cash: f64,
}

impl Default for AssetAllocation {
    fn default() -> Self {
        Self {
            equity: 0.6,
            fixed_income: 0.3,
            cash: 0.1,
        }
    }
}

impl AssetAllocation {
    pub fn total(&self) -> f64 {
        self.equity + self.fixed_income + self.cash
    }

    pub fn weights(&self) -> [f64; 3] {
        [self.equity, self.fixed_income, self.cash]
    }
}

/// Expected real return and volatility for one asset class, both annual.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AssetClassAssumption {
    pub expected_return: f64,
    pub volatility: f64,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Correlations {
    pub equity_fixed_income: f64,
    pub equity_cash: f64,
    pub fixed_income_cash: f64,
}

impl Default for Correlations {
    fn default() -> Self {
        Self {
            equity_fixed_income: 0.2,
            equity_cash: 0.05,
            fixed_income_cash: 0.1,
        }
    }
}

impl Correlations {
    pub fn pairs(&self) -> [(&'static str, f64); 3] {
        [
            ("equity/fixed income", self.equity_fixed_income),
            ("equity/cash", self.equity_cash),
            ("fixed income/cash", self.fixed_income_cash),
        ]
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CapitalMarketAssumptions {
    pub equity: AssetClassAssumption,
    pub fixed_income: AssetClassAssumption,
    pub cash: AssetClassAssumption,
    pub correlations: Correlations,
}

impl Default for CapitalMarketAssumptions {
    fn default() -> Self {
        Self {
            equity: AssetClassAssumption {
                expected_return: 0.07,
                volatility: 0.18,
            },
            fixed_income: AssetClassAssumption {
                expected_return: 0.02,
                volatility: 0.06,
            },
            cash: AssetClassAssumption {
                expected_return: 0.0,
                volatility: 0.01,
            },
            correlations: Correlations::default(),
        }
    }
}

impl CapitalMarketAssumptions {
    pub fn classes(&self) -> [(&'static str, AssetClassAssumption); 3] {
        [
            ("equity", self.equity),
            ("fixed income", self.fixed_income),
            ("cash", self.cash),
        ]
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SpendingPolicy {
    /// Spend the configured monthly target, grown with inflation.
    #[default]
    FixedReal,
    #[serde(rename_all = "camelCase")]
    PercentOfPortfolio { annual_rate: f64 },
    /// Percent of portfolio, clamped to an inflation-indexed annual floor and ceiling.
    #[serde(rename_all = "camelCase")]
    Hybrid {
        annual_rate: f64,
        annual_floor: f64,
        annual_ceiling: f64,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IncomeSchedule {
    pub social_security_monthly: f64,
    pub social_security_start_age: u32,
    pub pension_monthly: f64,
    pub pension_start_age: u32,
    pub pension_cola: f64,
}

impl Default for IncomeSchedule {
    fn default() -> Self {
        Self {
            social_security_monthly: 0.0,
            social_security_start_age: 67,
            pension_monthly: 0.0,
            pension_start_age: 65,
            pension_cola: 0.0,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HealthcareSchedule {
    pub monthly_cost: f64,
    pub start_age: u32,
    pub inflation_rate: f64,
}

impl Default for HealthcareSchedule {
    fn default() -> Self {
        Self {
            monthly_cost: 0.0,
            start_age: 65,
            inflation_rate: 0.05,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FeeSchedule {
    pub advisory_annual: f64,
    pub fund_expense_annual: f64,
}

impl FeeSchedule {
    pub fn monthly_rate(&self) -> f64 {
        (self.advisory_annual + self.fund_expense_annual) / 12.0
    }
}

/// Account-type mix of the portfolio plus the rates used to tax withdrawals.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TaxProfile {
    pub taxable_fraction: f64,
    pub traditional_fraction: f64,
    pub roth_fraction: f64,
    pub marginal_rate: f64,
    pub capital_gains_rate: f64,
}

impl Default for TaxProfile {
    fn default() -> Self {
        Self {
            taxable_fraction: 0.3,
            traditional_fraction: 0.5,
            roth_fraction: 0.2,
            marginal_rate: 0.22,
            capital_gains_rate: 0.15,
        }
    }
}

impl TaxProfile {
    pub fn total(&self) -> f64 {
        self.taxable_fraction + self.traditional_fraction + self.roth_fraction
    }

    /// Roth withdrawals are untaxed; taxable pays capital gains; traditional pays ordinary income.
    pub fn blended_withdrawal_rate(&self) -> f64 {
        self.taxable_fraction * self.capital_gains_rate
            + self.traditional_fraction * self.marginal_rate
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RmdSchedule {
    pub start_age: u32,
    pub table: RmdTable,
}

impl Default for RmdSchedule {
    fn default() -> Self {
        Self {
            start_age: 73,
            table: RmdTable::uniform_lifetime(),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GlidePath {
    pub annual_equity_shift: f64,
    pub min_equity: f64,
}

impl Default for GlidePath {
    fn default() -> Self {
        Self {
            annual_equity_shift: 0.01,
            min_equity: 0.3,
        }
    }
}

/// Spending multiplier applied while `start_age <= age < end_age`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifestylePhase {
    pub start_age: u32,
    pub end_age: u32,
    pub multiplier: f64,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Guardrails {
    pub upper_band: f64,
    pub lower_band: f64,
    pub adjustment: f64,
    pub min_multiplier: f64,
    pub max_multiplier: f64,
}

impl Default for Guardrails {
    fn default() -> Self {
        Self {
            upper_band: 0.20,
            lower_band: 0.20,
            adjustment: 0.10,
            min_multiplier: 0.5,
            max_multiplier: 1.5,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SimulationConfig {
    pub starting_balance: f64,
    pub horizon_years: u32,
    pub current_age: u32,
    pub retirement_age: u32,
    pub monthly_income: f64,
    pub monthly_spending: f64,
    pub inflation_rate: f64,
    pub allocation: AssetAllocation,
    pub assumptions: CapitalMarketAssumptions,
    pub scenarios: u32,
    pub seed: Option<u64>,
    pub spending_policy: SpendingPolicy,
    pub income: IncomeSchedule,
    pub healthcare: HealthcareSchedule,
    pub fees: FeeSchedule,
    pub tax: TaxProfile,
    pub rmd: RmdSchedule,
    pub glide_path: Option<GlidePath>,
    pub lifestyle_phases: Vec<LifestylePhase>,
    pub guardrails: Option<Guardrails>,
    pub milestone_ages: Vec<u32>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            starting_balance: 1_000_000.0,
            horizon_years: 30,
            current_age: 65,
            retirement_age: 65,
            monthly_income: 0.0,
            monthly_spending: 4_000.0,
            inflation_rate: 0.025,
            allocation: AssetAllocation::default(),
            assumptions: CapitalMarketAssumptions::default(),
            scenarios: 1_000,
            seed: Some(42),
            spending_policy: SpendingPolicy::FixedReal,
            income: IncomeSchedule::default(),
            healthcare: HealthcareSchedule::default(),
            fees: FeeSchedule::default(),
            tax: TaxProfile::default(),
            rmd: RmdSchedule::default(),
            glide_path: None,
            lifestyle_phases: Vec::new(),
            guardrails: None,
            milestone_ages: vec![75, 80, 85, 90, 95, 100],
        }
    }
}

impl SimulationConfig {
    pub fn months(&self) -> usize {
        self.horizon_years as usize * 12
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthStatistics {
    pub month: usize,
    pub age: f64,
    pub p5: f64,
    pub p10: f64,
    pub p25: f64,
    pub median: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
    pub mean: f64,
    pub std_dev: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndingValueDistribution {
    pub values: Vec<f64>,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub p5: f64,
    pub p10: f64,
    pub p25: f64,
    pub median: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LongevityMilestone {
    pub age: u32,
    pub month: usize,
    pub median_balance: f64,
    pub p10_balance: f64,
    pub p90_balance: f64,
    pub depletion_risk: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepresentativePath {
    pub scenario: usize,
    pub ruin_month: Option<usize>,
    pub balances: Vec<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepresentativePaths {
    pub worst: RepresentativePath,
    pub median: RepresentativePath,
    pub best: RepresentativePath,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    pub seed: u64,
    pub scenarios: usize,
    pub months: usize,
    pub expected_annual_return: f64,
    pub annual_volatility: f64,
    pub success_probability: f64,
    pub monthly_statistics: Vec<MonthStatistics>,
    pub ending_values: EndingValueDistribution,
    pub annual_ruin_probability: Vec<f64>,
    pub cumulative_ruin_probability: Vec<f64>,
    pub longevity: Vec<LongevityMilestone>,
    pub representative_paths: RepresentativePaths,
    pub warnings: Vec<NumericalWarning>,
    pub config: SimulationConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum NumericalWarning {
    #[serde(rename_all = "camelCase")]
    UnusualReturn { asset: String, value: f64 },
    #[serde(rename_all = "camelCase")]
    UnusualVolatility { asset: String, value: f64 },
    #[serde(rename_all = "camelCase")]
    UnusualInflation { value: f64 },
    #[serde(rename_all = "camelCase")]
    UnusualHealthcareInflation { value: f64 },
    #[serde(rename_all = "camelCase")]
    HighWithdrawalRate { annual_rate: f64 },
}

impl std::fmt::Display for NumericalWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NumericalWarning::UnusualReturn { asset, value } => write!(
                f,
                "{asset} expected return {:.2}% is outside the typical historical range",
                value * 100.0
            ),
            NumericalWarning::UnusualVolatility { asset, value } => write!(
                f,
                "{asset} volatility {:.2}% is outside the typical historical range",
                value * 100.0
            ),
            NumericalWarning::UnusualInflation { value } => write!(
                f,
                "inflation {:.2}% is outside the typical historical range",
                value * 100.0
            ),
            NumericalWarning::UnusualHealthcareInflation { value } => write!(
                f,
                "healthcare inflation {:.2}% is outside the typical historical range",
                value * 100.0
            ),
            NumericalWarning::HighWithdrawalRate { annual_rate } => write!(
                f,
                "initial withdrawal rate {:.2}% is unusually high",
                annual_rate * 100.0
            ),
        }
    }
}
