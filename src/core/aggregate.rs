use super::engine::SimulationPaths;
use super::stats::PortfolioMoments;
use super::types::{
    EndingValueDistribution, LongevityMilestone, MonthStatistics, NumericalWarning,
    RepresentativePath, RepresentativePaths, SimulationConfig, SimulationResult,
};

pub fn aggregate(
    config: &SimulationConfig,
    paths: &SimulationPaths,
    seed: u64,
    moments: PortfolioMoments,
    warnings: Vec<NumericalWarning>,
) -> SimulationResult {
    let scenarios = paths.scenarios();
    let months = paths.months();
    let never_ruined = paths.ruin_months.iter().filter(|r| r.is_none()).count();
    let (annual_ruin_probability, cumulative_ruin_probability) =
        ruin_probabilities(&paths.ruin_months, months);

    SimulationResult {
        seed,
        scenarios,
        months,
        expected_annual_return: moments.expected_return,
        annual_volatility: moments.volatility,
        success_probability: never_ruined as f64 / scenarios as f64,
        monthly_statistics: monthly_statistics(config, paths),
        ending_values: ending_value_distribution(paths),
        annual_ruin_probability,
        cumulative_ruin_probability,
        longevity: longevity_milestones(config, paths),
        representative_paths: representative_paths(paths),
        warnings,
        config: config.clone(),
    }
}

fn monthly_statistics(config: &SimulationConfig, paths: &SimulationPaths) -> Vec<MonthStatistics> {
    (0..=paths.months())
        .map(|month| {
            let sorted = sorted_column(paths, month);
            let (mean, std_dev) = mean_and_std(&sorted);
            MonthStatistics {
                month,
                age: config.current_age as f64 + month as f64 / 12.0,
                p5: percentile_sorted(&sorted, 5.0),
                p10: percentile_sorted(&sorted, 10.0),
                p25: percentile_sorted(&sorted, 25.0),
                median: percentile_sorted(&sorted, 50.0),
                p75: percentile_sorted(&sorted, 75.0),
                p90: percentile_sorted(&sorted, 90.0),
                p95: percentile_sorted(&sorted, 95.0),
                mean,
                std_dev,
            }
        })
        .collect()
}

fn ending_value_distribution(paths: &SimulationPaths) -> EndingValueDistribution {
    let values = sorted_column(paths, paths.months());
    let (mean, std_dev) = mean_and_std(&values);
    EndingValueDistribution {
        min: values.first().copied().unwrap_or(0.0),
        max: values.last().copied().unwrap_or(0.0),
        mean,
        std_dev,
        p5: percentile_sorted(&values, 5.0),
        p10: percentile_sorted(&values, 10.0),
        p25: percentile_sorted(&values, 25.0),
        median: percentile_sorted(&values, 50.0),
        p75: percentile_sorted(&values, 75.0),
        p90: percentile_sorted(&values, 90.0),
        p95: percentile_sorted(&values, 95.0),
        values,
    }
}

/// Per-year first-passage ruin share, and its running total.
fn ruin_probabilities(ruin_months: &[Option<usize>], months: usize) -> (Vec<f64>, Vec<f64>) {
    let years = months.div_ceil(12);
    let mut counts = vec![0_usize; years];
    for month in ruin_months.iter().flatten() {
        let year = (month.saturating_sub(1) / 12).min(years.saturating_sub(1));
        counts[year] += 1;
    }

    let total = ruin_months.len() as f64;
    let annual = counts.iter().map(|c| *c as f64 / total).collect();
    let cumulative = counts
        .iter()
        .scan(0_usize, |running, c| {
            *running += c;
            Some(*running as f64 / total)
        })
        .collect();
    (annual, cumulative)
}

fn longevity_milestones(
    config: &SimulationConfig,
    paths: &SimulationPaths,
) -> Vec<LongevityMilestone> {
    let total = paths.scenarios() as f64;
    config
        .milestone_ages
        .iter()
        .filter(|age| **age >= config.current_age)
        .filter_map(|age| {
            let month = (age - config.current_age) as usize * 12;
            if month > paths.months() {
                return None;
            }
            let sorted = sorted_column(paths, month);
            let depleted = paths
                .ruin_months
                .iter()
                .filter(|r| r.is_some_and(|m| m <= month))
                .count();
            Some(LongevityMilestone {
                age: *age,
                month,
                median_balance: percentile_sorted(&sorted, 50.0),
                p10_balance: percentile_sorted(&sorted, 10.0),
                p90_balance: percentile_sorted(&sorted, 90.0),
                depletion_risk: depleted as f64 / total,
            })
        })
        .collect()
}

fn representative_paths(paths: &SimulationPaths) -> RepresentativePaths {
    let last = paths.months();
    let mut order = (0..paths.scenarios()).collect::<Vec<_>>();
    // Ties on ending value (typically all the ruined paths at zero) rank earlier ruin as worse.
    order.sort_by(|a, b| {
        paths.balances[(*a, last)]
            .total_cmp(&paths.balances[(*b, last)])
            .then_with(|| {
                ruin_rank(paths.ruin_months[*a]).cmp(&ruin_rank(paths.ruin_months[*b]))
            })
            .then_with(|| a.cmp(b))
    });

    let pick = |scenario: usize| RepresentativePath {
        scenario,
        ruin_month: paths.ruin_months[scenario],
        balances: paths.balances.row(scenario).iter().copied().collect(),
    };

    RepresentativePaths {
        worst: pick(order[0]),
        median: pick(order[(order.len() - 1) / 2]),
        best: pick(order[order.len() - 1]),
    }
}

fn ruin_rank(ruin_month: Option<usize>) -> usize {
    ruin_month.unwrap_or(usize::MAX)
}

fn sorted_column(paths: &SimulationPaths, month: usize) -> Vec<f64> {
    let mut values = paths.balances.column(month).iter().copied().collect::<Vec<_>>();
    values.sort_by(|a, b| a.total_cmp(b));
    values
}

fn mean_and_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

pub fn percentile_sorted(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let n = values.len();
    if n == 1 {
        return values[0];
    }

    let rank = (p / 100.0) * (n as f64 - 1.0);
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;

    if lower == upper {
        values[lower]
    } else {
        let w = rank - lower as f64;
        (values[lower] + (values[upper] - values[lower]) * w).min(values[upper])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::DMatrix;
    use proptest::prelude::{prop_assert, prop_assert_eq, proptest};
    use proptest::collection::vec;

    const EPS: f64 = 1e-9;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn sample_config() -> SimulationConfig {
        SimulationConfig {
            current_age: 70,
            horizon_years: 2,
            milestone_ages: vec![65, 70, 71, 72, 90],
            ..SimulationConfig::default()
        }
    }

    fn moments() -> PortfolioMoments {
        PortfolioMoments {
            expected_return: 0.05,
            volatility: 0.1,
        }
    }

    // Four scenarios over 24 months: one ruined in month 5, one in month 13, two survive.
    fn sample_paths() -> SimulationPaths {
        let months = 24;
        let balances = DMatrix::from_fn(4, months + 1, |row, col| match row {
            0 if col >= 5 => 0.0,
            0 => 100.0 - col as f64 * 20.0,
            1 if col >= 13 => 0.0,
            1 => 100.0 - col as f64 * 5.0,
            2 => 100.0 + col as f64,
            _ => 100.0 + 2.0 * col as f64,
        });
        SimulationPaths {
            balances,
            ruin_months: vec![Some(5), Some(13), None, None],
        }
    }

    #[test]
    fn percentile_interpolates_between_points() {
        let values = [10.0, 20.0, 30.0, 40.0];
        assert_approx(percentile_sorted(&values, 50.0), 25.0);
        assert_approx(percentile_sorted(&values, 0.0), 10.0);
        assert_approx(percentile_sorted(&values, 100.0), 40.0);
        assert_approx(percentile_sorted(&[7.0], 90.0), 7.0);
        assert_approx(percentile_sorted(&[], 90.0), 0.0);
    }

    #[test]
    fn ruin_buckets_are_first_passage_per_year() {
        let result = aggregate(&sample_config(), &sample_paths(), 1, moments(), Vec::new());
        assert_eq!(result.annual_ruin_probability, vec![0.25, 0.25]);
        assert_eq!(result.cumulative_ruin_probability, vec![0.25, 0.5]);
        assert_approx(result.success_probability, 0.5);
    }

    #[test]
    fn month_twelve_falls_in_the_first_year_and_month_thirteen_in_the_second() {
        let (annual, cumulative) = ruin_probabilities(&[Some(12), Some(13), None, None], 24);
        assert_eq!(annual, vec![0.25, 0.25]);
        assert_eq!(cumulative, vec![0.25, 0.5]);
    }

    #[test]
    fn longevity_reports_milestones_inside_the_horizon() {
        let result = aggregate(&sample_config(), &sample_paths(), 1, moments(), Vec::new());
        let ages = result.longevity.iter().map(|m| m.age).collect::<Vec<_>>();
        assert_eq!(ages, vec![70, 71, 72]);

        let at_71 = result.longevity[1];
        assert_eq!(at_71.month, 12);
        assert_approx(at_71.depletion_risk, 0.25);
        let at_72 = result.longevity[2];
        assert_approx(at_72.depletion_risk, 0.5);
        assert_approx(at_72.median_balance, (124.0 + 0.0) / 2.0);
    }

    #[test]
    fn representative_paths_rank_by_ending_value_then_ruin_timing() {
        let result = aggregate(&sample_config(), &sample_paths(), 1, moments(), Vec::new());
        let reps = &result.representative_paths;
        assert_eq!(reps.worst.scenario, 0);
        assert_eq!(reps.worst.ruin_month, Some(5));
        assert_eq!(reps.median.scenario, 1);
        assert_eq!(reps.best.scenario, 3);
        assert_eq!(reps.best.balances.len(), 25);
        assert_approx(reps.best.balances[24], 148.0);
    }

    #[test]
    fn ending_distribution_summarizes_final_column() {
        let result = aggregate(&sample_config(), &sample_paths(), 1, moments(), Vec::new());
        let ending = &result.ending_values;
        assert_eq!(ending.values, vec![0.0, 0.0, 124.0, 148.0]);
        assert_approx(ending.min, 0.0);
        assert_approx(ending.max, 148.0);
        assert_approx(ending.mean, 68.0);
        assert_approx(ending.median, 62.0);
    }

    #[test]
    fn monthly_statistics_cover_every_column_with_ages() {
        let result = aggregate(&sample_config(), &sample_paths(), 1, moments(), Vec::new());
        assert_eq!(result.monthly_statistics.len(), 25);
        let first = result.monthly_statistics[0];
        assert_approx(first.mean, 100.0);
        assert_approx(first.std_dev, 0.0);
        assert_relative_eq!(result.monthly_statistics[6].age, 70.5, epsilon = 1e-12);
    }

    #[test]
    fn single_scenario_single_year_is_well_formed() {
        let config = SimulationConfig {
            horizon_years: 1,
            ..SimulationConfig::default()
        };
        let paths = SimulationPaths {
            balances: DMatrix::from_element(1, 13, 50.0),
            ruin_months: vec![None],
        };
        let result = aggregate(&config, &paths, 7, moments(), Vec::new());
        assert_eq!(result.success_probability, 1.0);
        assert_eq!(result.cumulative_ruin_probability, vec![0.0]);
        assert_eq!(result.representative_paths.worst.scenario, 0);
        assert_eq!(result.representative_paths.best.scenario, 0);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(48))]

        #[test]
        fn prop_percentiles_are_ordered_and_ruin_is_consistent(
            columns in vec(vec(0.0f64..1_000_000.0, 12), 1..30),
            ruined in vec(proptest::option::of(1usize..=36), 12)
        ) {
            let months = 36;
            let scenarios = 12;
            let balances = DMatrix::from_fn(scenarios, months + 1, |row, col| {
                columns[col % columns.len()][row]
            });
            let paths = SimulationPaths { balances, ruin_months: ruined };
            let config = SimulationConfig {
                horizon_years: 3,
                ..SimulationConfig::default()
            };
            let result = aggregate(&config, &paths, 0, moments(), Vec::new());

            prop_assert_eq!(result.monthly_statistics.len(), months + 1);
            for stats in &result.monthly_statistics {
                prop_assert!(stats.p5 <= stats.p10);
                prop_assert!(stats.p10 <= stats.p25);
                prop_assert!(stats.p25 <= stats.median);
                prop_assert!(stats.median <= stats.p75);
                prop_assert!(stats.p75 <= stats.p90);
                prop_assert!(stats.p90 <= stats.p95);
            }

            let cumulative = &result.cumulative_ruin_probability;
            prop_assert!(cumulative.windows(2).all(|w| w[0] <= w[1]));
            let final_ruin = cumulative.last().copied().unwrap_or(0.0);
            prop_assert!((result.success_probability + final_ruin - 1.0).abs() < 1e-12);
            let annual_sum = result.annual_ruin_probability.iter().sum::<f64>();
            prop_assert!((annual_sum - final_ruin).abs() < 1e-9);
        }
    }
}
