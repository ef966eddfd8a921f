use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

const UNIFORM_LIFETIME: [(u32, f64); 49] = [
    (72, 27.4),
    (73, 26.5),
    (74, 25.5),
    (75, 24.6),
    (76, 23.7),
    (77, 22.9),
    (78, 22.0),
    (79, 21.1),
    (80, 20.2),
    (81, 19.4),
    (82, 18.5),
    (83, 17.7),
    (84, 16.8),
    (85, 16.0),
    (86, 15.2),
    (87, 14.4),
    (88, 13.7),
    (89, 12.9),
    (90, 12.2),
    (91, 11.5),
    (92, 10.8),
    (93, 10.1),
    (94, 9.5),
    (95, 8.9),
    (96, 8.4),
    (97, 7.8),
    (98, 7.3),
    (99, 6.8),
    (100, 6.4),
    (101, 6.0),
    (102, 5.6),
    (103, 5.2),
    (104, 4.9),
    (105, 4.6),
    (106, 4.3),
    (107, 4.1),
    (108, 3.9),
    (109, 3.7),
    (110, 3.5),
    (111, 3.4),
    (112, 3.3),
    (113, 3.1),
    (114, 3.0),
    (115, 2.9),
    (116, 2.8),
    (117, 2.7),
    (118, 2.5),
    (119, 2.3),
    (120, 2.0),
];

/// Life-expectancy divisors keyed by age.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RmdTable {
    divisors: BTreeMap<u32, f64>,
}

impl Default for RmdTable {
    fn default() -> Self {
        Self::uniform_lifetime()
    }
}

impl RmdTable {
    /// IRS Uniform Lifetime Table (2022 onwards).
    pub fn uniform_lifetime() -> Self {
        Self::from_pairs(UNIFORM_LIFETIME)
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = (u32, f64)>) -> Self {
        Self {
            divisors: pairs.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.divisors.is_empty()
    }

    pub fn min_age(&self) -> Option<u32> {
        self.divisors.keys().next().copied()
    }

    pub fn max_age(&self) -> Option<u32> {
        self.divisors.keys().next_back().copied()
    }

    pub fn entries(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
        self.divisors.iter().map(|(age, divisor)| (*age, *divisor))
    }

    /// Divisor for `age`, clamped to the oldest entry. `None` below the youngest entry.
    pub fn divisor(&self, age: u32) -> Option<f64> {
        if age < self.min_age()? {
            return None;
        }
        self.divisors
            .range(..=age)
            .next_back()
            .map(|(_, divisor)| *divisor)
    }
}

pub fn required_distribution(balance: f64, age: u32, table: &RmdTable) -> f64 {
    match table.divisor(age) {
        Some(divisor) if divisor > 0.0 => (balance / divisor).max(0.0),
        _ => 0.0,
    }
}

pub fn required_distributions(balances: &[f64], age: u32, table: &RmdTable) -> Vec<f64> {
    let Some(divisor) = table.divisor(age).filter(|d| *d > 0.0) else {
        return vec![0.0; balances.len()];
    };
    balances.iter().map(|b| (b / divisor).max(0.0)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::{prop_assert, prop_assert_eq, proptest};

    #[test]
    fn uniform_lifetime_starts_at_72_and_ends_at_120() {
        let table = RmdTable::uniform_lifetime();
        assert_eq!(table.min_age(), Some(72));
        assert_eq!(table.max_age(), Some(120));
        assert_eq!(table.divisor(73), Some(26.5));
    }

    #[test]
    fn distribution_divides_balance_by_factor() {
        let table = RmdTable::uniform_lifetime();
        assert_relative_eq!(required_distribution(265_000.0, 73, &table), 10_000.0);
    }

    #[test]
    fn ages_past_the_table_reuse_the_last_divisor() {
        let table = RmdTable::from_pairs([(72, 27.4), (73, 26.5)]);
        assert_eq!(table.divisor(95), Some(26.5));
        assert_relative_eq!(required_distribution(53_000.0, 95, &table), 2_000.0);
    }

    #[test]
    fn gaps_in_the_table_use_the_nearest_younger_age() {
        let table = RmdTable::from_pairs([(72, 20.0), (80, 10.0)]);
        assert_eq!(table.divisor(76), Some(20.0));
    }

    #[test]
    fn negative_balances_never_produce_negative_distributions() {
        let table = RmdTable::uniform_lifetime();
        assert_eq!(required_distribution(-5_000.0, 80, &table), 0.0);
    }

    #[test]
    fn empty_table_never_distributes() {
        let table = RmdTable::from_pairs([]);
        assert_eq!(required_distribution(100_000.0, 90, &table), 0.0);
        assert_eq!(required_distributions(&[1.0, 2.0], 90, &table), vec![0.0, 0.0]);
    }

    #[test]
    fn vector_form_matches_scalar_form() {
        let table = RmdTable::uniform_lifetime();
        let balances = [0.0, 10_000.0, 250_000.0, 1_234_567.0];
        let vector = required_distributions(&balances, 88, &table);
        for (balance, rmd) in balances.iter().zip(vector) {
            assert_eq!(rmd, required_distribution(*balance, 88, &table));
        }
    }

    #[test]
    fn table_round_trips_through_json_with_age_keys() {
        let table = RmdTable::from_pairs([(72, 27.4), (73, 26.5)]);
        let json = serde_json::to_string(&table).expect("serialize table");
        assert_eq!(json, r#"{"72":27.4,"73":26.5}"#);
        let back: RmdTable = serde_json::from_str(&json).expect("deserialize table");
        assert_eq!(back, table);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_zero_below_the_youngest_table_age(
            age in 0u32..72,
            balance in 0.0f64..5_000_000.0,
            count in 0usize..16
        ) {
            let table = RmdTable::uniform_lifetime();
            prop_assert_eq!(required_distribution(balance, age, &table), 0.0);
            let balances = vec![balance; count];
            let rmds = required_distributions(&balances, age, &table);
            prop_assert_eq!(rmds.len(), count);
            prop_assert!(rmds.iter().all(|r| *r == 0.0));
        }

        #[test]
        fn prop_distribution_never_exceeds_balance_for_table_ages(
            age in 72u32..130,
            balance in 0.0f64..5_000_000.0
        ) {
            let table = RmdTable::uniform_lifetime();
            let rmd = required_distribution(balance, age, &table);
            prop_assert!(rmd >= 0.0);
            prop_assert!(rmd <= balance);
        }
    }
}
