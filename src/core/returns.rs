use nalgebra::DMatrix;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;

use super::stats::PortfolioMoments;

pub const MONTHS_PER_YEAR: f64 = 12.0;
pub const DT: f64 = 1.0 / MONTHS_PER_YEAR;

/// `(scenarios × months)` multiplicative monthly return factors.
pub type ReturnPathTensor = DMatrix<f64>;

pub fn seeded_rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

/// Log-space drift and diffusion for one month of GBM.
pub fn monthly_drift_and_diffusion(annual_return: f64, annual_volatility: f64) -> (f64, f64) {
    let drift = (annual_return - 0.5 * annual_volatility * annual_volatility) * DT;
    let diffusion = annual_volatility * DT.sqrt();
    (drift, diffusion)
}

pub fn standard_normal_draws<R: Rng>(
    scenarios: usize,
    months: usize,
    rng: &mut R,
) -> DMatrix<f64> {
    // from_fn walks column-major, so the draw order is month by month.
    DMatrix::from_fn(scenarios, months, |_, _| rng.sample(StandardNormal))
}

pub fn generate_return_paths<R: Rng>(
    annual_return: f64,
    annual_volatility: f64,
    scenarios: usize,
    months: usize,
    rng: &mut R,
) -> ReturnPathTensor {
    let moments = PortfolioMoments {
        expected_return: annual_return,
        volatility: annual_volatility,
    };
    generate_scheduled_return_paths(&vec![moments; months], scenarios, rng)
}

/// Each column uses its own month's moments; the shocks come from a single draw matrix.
pub fn generate_scheduled_return_paths<R: Rng>(
    schedule: &[PortfolioMoments],
    scenarios: usize,
    rng: &mut R,
) -> ReturnPathTensor {
    let mut factors = standard_normal_draws(scenarios, schedule.len(), rng);
    for (month, moments) in schedule.iter().enumerate() {
        let (drift, diffusion) =
            monthly_drift_and_diffusion(moments.expected_return, moments.volatility);
        for z in factors.column_mut(month).iter_mut() {
            *z = (drift + diffusion * *z).exp();
        }
    }
    factors
}
