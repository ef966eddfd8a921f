use std::fmt;

use log::debug;
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::engine::simulate;
use super::types::SimulationConfig;
use super::validate::ConfigError;

/// One input that a sensitivity sweep varies while everything else is held fixed.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SensitivityParameter {
    MonthlySpending,
    StartingBalance,
    EquityReturn,
    EquityVolatility,
    InflationRate,
}

impl SensitivityParameter {
    pub fn name(self) -> &'static str {
        match self {
            SensitivityParameter::MonthlySpending => "monthly-spending",
            SensitivityParameter::StartingBalance => "starting-balance",
            SensitivityParameter::EquityReturn => "equity-return",
            SensitivityParameter::EquityVolatility => "equity-volatility",
            SensitivityParameter::InflationRate => "inflation-rate",
        }
    }

    pub fn apply(self, config: &mut SimulationConfig, value: f64) {
        match self {
            SensitivityParameter::MonthlySpending => config.monthly_spending = value,
            SensitivityParameter::StartingBalance => config.starting_balance = value,
            SensitivityParameter::EquityReturn => config.assumptions.equity.expected_return = value,
            SensitivityParameter::EquityVolatility => config.assumptions.equity.volatility = value,
            SensitivityParameter::InflationRate => config.inflation_rate = value,
        }
    }
}

impl fmt::Display for SensitivityParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SensitivityPoint {
    pub value: f64,
    pub success_probability: f64,
    pub median_ending_balance: f64,
    pub p10_ending_balance: f64,
    pub p90_ending_balance: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SensitivityReport {
    pub parameter: SensitivityParameter,
    pub seed: u64,
    pub points: Vec<SensitivityPoint>,
}

/// Re-runs the simulation once per value. Every run shares one seed so the
/// points differ only by the varied input. Results keep the order of `values`.
pub fn run_sensitivity(
    base: &SimulationConfig,
    parameter: SensitivityParameter,
    values: &[f64],
) -> Result<SensitivityReport, ConfigError> {
    let seed = base.seed.unwrap_or_else(|| rand::rng().random());
    debug!(
        "sensitivity sweep over {parameter} with {} values, seed {seed}",
        values.len()
    );

    let points = values
        .par_iter()
        .map(|value| {
            let mut config = base.clone();
            config.seed = Some(seed);
            parameter.apply(&mut config, *value);
            let result = simulate(&config)?;
            Ok(SensitivityPoint {
                value: *value,
                success_probability: result.success_probability,
                median_ending_balance: result.ending_values.median,
                p10_ending_balance: result.ending_values.p10,
                p90_ending_balance: result.ending_values.p90,
            })
        })
        .collect::<Result<Vec<_>, ConfigError>>()?;

    Ok(SensitivityReport {
        parameter,
        seed,
        points,
    })
}
