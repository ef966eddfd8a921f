use nalgebra::{Matrix3, Vector3};
use serde::Serialize;

use super::types::{AssetAllocation, CapitalMarketAssumptions, GlidePath};

/// Blended annual expected return and volatility of a portfolio.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioMoments {
    pub expected_return: f64,
    pub volatility: f64,
}

pub fn correlation_matrix(assumptions: &CapitalMarketAssumptions) -> Matrix3<f64> {
    let c = &assumptions.correlations;
    Matrix3::new(
        1.0,
        c.equity_fixed_income,
        c.equity_cash,
        c.equity_fixed_income,
        1.0,
        c.fixed_income_cash,
        c.equity_cash,
        c.fixed_income_cash,
        1.0,
    )
}

/// `diag(σ) · Corr · diag(σ)`
pub fn covariance_matrix(assumptions: &CapitalMarketAssumptions) -> Matrix3<f64> {
    let sigma = Matrix3::from_diagonal(&Vector3::new(
        assumptions.equity.volatility,
        assumptions.fixed_income.volatility,
        assumptions.cash.volatility,
    ));
    sigma * correlation_matrix(assumptions) * sigma
}

pub fn portfolio_moments(
    allocation: &AssetAllocation,
    assumptions: &CapitalMarketAssumptions,
) -> PortfolioMoments {
    let weights = Vector3::from(allocation.weights());
    let returns = Vector3::new(
        assumptions.equity.expected_return,
        assumptions.fixed_income.expected_return,
        assumptions.cash.expected_return,
    );
    let variance = (weights.transpose() * covariance_matrix(assumptions) * weights)[(0, 0)];

    PortfolioMoments {
        expected_return: weights.dot(&returns),
        // A correlation matrix that is not positive semi-definite can push this a hair below zero.
        volatility: variance.max(0.0).sqrt(),
    }
}

pub fn naive_weighted_volatility(
    allocation: &AssetAllocation,
    assumptions: &CapitalMarketAssumptions,
) -> f64 {
    allocation.equity * assumptions.equity.volatility
        + allocation.fixed_income * assumptions.fixed_income.volatility
        + allocation.cash * assumptions.cash.volatility
}

/// Allocation after `years` of glide; the equity given up moves into fixed income.
pub fn glide_allocation(start: &AssetAllocation, glide: &GlidePath, years: u32) -> AssetAllocation {
    if start.equity <= glide.min_equity {
        return *start;
    }
    let equity = (start.equity - glide.annual_equity_shift * years as f64).max(glide.min_equity);
    AssetAllocation {
        equity,
        fixed_income: start.fixed_income + (start.equity - equity),
        cash: start.cash,
    }
}

/// One entry per simulated month. Without a glide path every month shares the same moments.
pub fn monthly_moment_schedule(
    allocation: &AssetAllocation,
    assumptions: &CapitalMarketAssumptions,
    glide: Option<&GlidePath>,
    horizon_years: u32,
) -> Vec<PortfolioMoments> {
    let months = horizon_years as usize * 12;
    match glide {
        None => vec![portfolio_moments(allocation, assumptions); months],
        Some(glide) => (0..horizon_years)
            .flat_map(|year| {
                let glided = glide_allocation(allocation, glide, year);
                std::iter::repeat_n(portfolio_moments(&glided, assumptions), 12)
            })
            .collect(),
    }
}
