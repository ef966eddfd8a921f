use log::{debug, info};
use nalgebra::DMatrix;
use rand::Rng;

use super::aggregate::aggregate;
use super::returns::{ReturnPathTensor, generate_scheduled_return_paths, seeded_rng};
use super::rmd::required_distributions;
use super::stats::monthly_moment_schedule;
use super::types::{Guardrails, SimulationConfig, SimulationResult, SpendingPolicy};
use super::validate::{ConfigError, ValidatedConfig, validate};

/// Balances at or below this are treated as depleted.
pub const RUIN_THRESHOLD: f64 = 1e-6;

/// `(scenarios × (months + 1))` balances; column 0 is the starting balance.
pub type PortfolioPathTensor = DMatrix<f64>;

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationPaths {
    pub balances: PortfolioPathTensor,
    /// First month each scenario hit the floor, `None` if it never did.
    pub ruin_months: Vec<Option<usize>>,
}

impl SimulationPaths {
    pub fn scenarios(&self) -> usize {
        self.balances.nrows()
    }

    pub fn months(&self) -> usize {
        self.balances.ncols().saturating_sub(1)
    }
}

#[derive(Debug, Clone, Copy)]
struct MonthContext {
    month: usize,
    age: f64,
    whole_age: u32,
    years_elapsed: f64,
}

impl MonthContext {
    fn new(config: &SimulationConfig, month: usize) -> Self {
        let years_elapsed = (month - 1) as f64 / 12.0;
        Self {
            month,
            age: config.current_age as f64 + years_elapsed,
            whole_age: config.current_age + ((month - 1) / 12) as u32,
            years_elapsed,
        }
    }

    fn inflation_factor(&self, config: &SimulationConfig) -> f64 {
        (1.0 + config.inflation_rate).powf(self.years_elapsed)
    }
}

pub fn simulate(config: &SimulationConfig) -> Result<SimulationResult, ConfigError> {
    let validated = validate(config)?;
    let seed = config.seed.unwrap_or_else(|| rand::rng().random());
    let normalized = validated.config();

    let scenarios = normalized.scenarios as usize;
    let schedule = monthly_moment_schedule(
        &normalized.allocation,
        &normalized.assumptions,
        normalized.glide_path.as_ref(),
        normalized.horizon_years,
    );
    debug!(
        "simulating {scenarios} scenarios over {} months with seed {seed}",
        schedule.len()
    );

    let mut rng = seeded_rng(seed);
    let returns = generate_scheduled_return_paths(&schedule, scenarios, &mut rng);
    let paths = CashFlowSimulator::new(&validated).run(&returns);

    let result = aggregate(
        config,
        &paths,
        seed,
        schedule[0],
        validated.warnings().to_vec(),
    );
    info!(
        "simulation finished: success probability {:.4}, median ending balance {:.2}",
        result.success_probability, result.ending_values.median
    );
    Ok(result)
}

/// Advances every scenario one month at a time over a fixed return tensor.
pub struct CashFlowSimulator<'a> {
    config: &'a SimulationConfig,
}

impl<'a> CashFlowSimulator<'a> {
    pub fn new(validated: &'a ValidatedConfig) -> Self {
        Self {
            config: validated.config(),
        }
    }

    pub fn run(&self, returns: &ReturnPathTensor) -> SimulationPaths {
        let config = self.config;
        let scenarios = returns.nrows();
        let months = returns.ncols();

        let mut paths = PortfolioPathTensor::zeros(scenarios, months + 1);
        let mut balances = vec![config.starting_balance; scenarios];
        paths.column_mut(0).copy_from_slice(&balances);

        let mut ruin_months: Vec<Option<usize>> = vec![None; scenarios];
        let mut alive = vec![true; scenarios];
        let mut guardrail_multipliers = vec![1.0; scenarios];
        let mut spending = vec![0.0; scenarios];
        let fee_rate = config.fees.monthly_rate();
        let withdrawal_tax_rate = config.tax.blended_withdrawal_rate();

        for month in 1..=months {
            let ctx = MonthContext::new(config, month);
            let factors = returns.column(month - 1);

            for ((balance, factor), live) in balances.iter_mut().zip(factors.iter()).zip(&alive) {
                if *live {
                    *balance *= factor;
                }
            }

            apply_fees(&mut balances, &alive, fee_rate);

            let income = monthly_income(config, &ctx);
            if income > 0.0 {
                for (balance, live) in balances.iter_mut().zip(&alive) {
                    if *live {
                        *balance += income;
                    }
                }
            }

            monthly_spending(config, &ctx, &balances, &guardrail_multipliers, &mut spending);
            for ((balance, spend), live) in balances.iter_mut().zip(&spending).zip(&alive) {
                if *live {
                    *balance -= spend;
                }
            }

            apply_rmd_tax(config, &ctx, &mut balances, &alive);

            if withdrawal_tax_rate > 0.0 {
                for ((balance, spend), live) in balances.iter_mut().zip(&spending).zip(&alive) {
                    if *live {
                        *balance -= spend * withdrawal_tax_rate;
                    }
                }
            }

            if let Some(guardrails) = &config.guardrails {
                if ctx.month > 12 {
                    update_guardrails(
                        guardrails,
                        config.starting_balance,
                        &balances,
                        &alive,
                        &mut guardrail_multipliers,
                    );
                }
            }

            record_ruin(ctx.month, &mut balances, &mut alive, &mut ruin_months);
            paths.column_mut(month).copy_from_slice(&balances);
        }

        SimulationPaths {
            balances: paths,
            ruin_months,
        }
    }
}

fn apply_fees(balances: &mut [f64], alive: &[bool], monthly_rate: f64) {
    if monthly_rate <= 0.0 {
        return;
    }
    for (balance, live) in balances.iter_mut().zip(alive) {
        if *live {
            *balance -= *balance * monthly_rate;
        }
    }
}

fn monthly_income(config: &SimulationConfig, ctx: &MonthContext) -> f64 {
    let income = &config.income;
    let mut total = 0.0;

    if ctx.age >= income.social_security_start_age as f64 {
        total += income.social_security_monthly;
    }

    let pension_start = income.pension_start_age as f64;
    if income.pension_monthly > 0.0 && ctx.age >= pension_start {
        total += income.pension_monthly * (1.0 + income.pension_cola).powf(ctx.age - pension_start);
    }

    if ctx.age < config.retirement_age as f64 {
        total += config.monthly_income;
    }

    total
}

fn healthcare_cost(config: &SimulationConfig, ctx: &MonthContext) -> f64 {
    let healthcare = &config.healthcare;
    let start = healthcare.start_age as f64;
    if healthcare.monthly_cost <= 0.0 || ctx.age < start {
        return 0.0;
    }
    healthcare.monthly_cost * (1.0 + healthcare.inflation_rate).powf(ctx.age - start)
}

fn lifestyle_multiplier(config: &SimulationConfig, ctx: &MonthContext) -> f64 {
    config
        .lifestyle_phases
        .iter()
        .find(|phase| ctx.age >= phase.start_age as f64 && ctx.age < phase.end_age as f64)
        .map(|phase| phase.multiplier)
        .unwrap_or(1.0)
}

fn monthly_spending(
    config: &SimulationConfig,
    ctx: &MonthContext,
    balances: &[f64],
    guardrail_multipliers: &[f64],
    out: &mut [f64],
) {
    let inflation = ctx.inflation_factor(config);
    let lifestyle = lifestyle_multiplier(config, ctx);
    let healthcare = healthcare_cost(config, ctx);

    for ((spend, balance), multiplier) in out.iter_mut().zip(balances).zip(guardrail_multipliers) {
        let base = match config.spending_policy {
            SpendingPolicy::FixedReal => config.monthly_spending * inflation,
            SpendingPolicy::PercentOfPortfolio { annual_rate } => {
                balance.max(0.0) * annual_rate / 12.0
            }
            SpendingPolicy::Hybrid {
                annual_rate,
                annual_floor,
                annual_ceiling,
            } => (balance.max(0.0) * annual_rate / 12.0).clamp(
                annual_floor / 12.0 * inflation,
                annual_ceiling / 12.0 * inflation,
            ),
        };
        *spend = base * lifestyle * multiplier + healthcare;
    }
}

// Only the tax on the distribution leaves the tracked balance; the distribution itself stays.
fn apply_rmd_tax(
    config: &SimulationConfig,
    ctx: &MonthContext,
    balances: &mut [f64],
    alive: &[bool],
) {
    let rmd = &config.rmd;
    if ctx.whole_age < rmd.start_age
        || config.tax.traditional_fraction <= 0.0
        || config.tax.marginal_rate <= 0.0
    {
        return;
    }

    let traditional = balances
        .iter()
        .map(|b| b * config.tax.traditional_fraction)
        .collect::<Vec<_>>();
    let annual = required_distributions(&traditional, ctx.whole_age, &rmd.table);
    for ((balance, distribution), live) in balances.iter_mut().zip(&annual).zip(alive) {
        if *live {
            *balance -= distribution / 12.0 * config.tax.marginal_rate;
        }
    }
}

fn update_guardrails(
    guardrails: &Guardrails,
    starting_balance: f64,
    balances: &[f64],
    alive: &[bool],
    multipliers: &mut [f64],
) {
    let upper = starting_balance * (1.0 + guardrails.upper_band);
    let lower = starting_balance * (1.0 - guardrails.lower_band);
    for ((multiplier, balance), live) in multipliers.iter_mut().zip(balances).zip(alive) {
        if !*live {
            continue;
        }
        if *balance > upper {
            *multiplier *= 1.0 + guardrails.adjustment;
        } else if *balance < lower {
            *multiplier *= 1.0 - guardrails.adjustment;
        }
        *multiplier = multiplier.clamp(guardrails.min_multiplier, guardrails.max_multiplier);
    }
}

fn record_ruin(
    month: usize,
    balances: &mut [f64],
    alive: &mut [bool],
    ruin_months: &mut [Option<usize>],
) {
    for ((balance, live), ruin) in balances.iter_mut().zip(alive.iter_mut()).zip(ruin_months) {
        if *balance <= RUIN_THRESHOLD {
            if ruin.is_none() {
                *ruin = Some(month);
            }
            *live = false;
        }
        if !*live {
            *balance = 0.0;
        }
    }
}
