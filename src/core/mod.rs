mod aggregate;
mod cache;
mod engine;
mod returns;
mod rmd;
mod sensitivity;
mod stats;
mod types;
mod validate;

pub use aggregate::{aggregate, percentile_sorted};
pub use cache::SimulationCache;
pub use engine::{
    CashFlowSimulator, PortfolioPathTensor, RUIN_THRESHOLD, SimulationPaths, simulate,
};
pub use returns::{
    DT, MONTHS_PER_YEAR, ReturnPathTensor, generate_return_paths, generate_scheduled_return_paths,
    monthly_drift_and_diffusion, seeded_rng, standard_normal_draws,
};
pub use rmd::{RmdTable, required_distribution, required_distributions};
pub use sensitivity::{SensitivityParameter, SensitivityPoint, SensitivityReport, run_sensitivity};
pub use stats::{
    PortfolioMoments, correlation_matrix, covariance_matrix, glide_allocation,
    monthly_moment_schedule, naive_weighted_volatility, portfolio_moments,
};
pub use types::{
    AssetAllocation, AssetClassAssumption, CapitalMarketAssumptions, Correlations,
    EndingValueDistribution, FeeSchedule, GlidePath, Guardrails, HealthcareSchedule,
    IncomeSchedule, LifestylePhase, LongevityMilestone, MonthStatistics, NumericalWarning,
    RepresentativePath, RepresentativePaths, RmdSchedule, SimulationConfig, SimulationResult,
    SpendingPolicy, TaxProfile,
};
pub use validate::{
    ConfigError, FRACTION_SUM_TOLERANCE, MAX_AGE, MAX_HORIZON_YEARS, MIN_AGE, MIN_HORIZON_YEARS,
    ValidatedConfig, validate,
};
