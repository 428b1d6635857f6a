//! Running price aggregate and its read models.

use serde::{Deserialize, Serialize};

/// Running (count, sum) over successfully processed prices.
///
/// Plain data: callers are responsible for serializing access. Count and sum
/// only change together through [`apply`](Self::apply).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AggregateState {
    count: u64,
    sum: f64,
}

impl AggregateState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one price to the aggregate.
    pub fn apply(&mut self, price: f64) {
        self.count += 1;
        self.sum += price;
    }

    #[must_use]
    pub fn count(&self) -> u64 {
        self.count
    }

    #[must_use]
    pub fn sum(&self) -> f64 {
        self.sum
    }

    /// `sum / count`, or `0.0` before the first price.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn average(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> AggregateSnapshot {
        AggregateSnapshot {
            count: self.count,
            sum: self.sum,
            average: self.average(),
        }
    }
}

/// Consistent point-in-time view of an [`AggregateState`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregateSnapshot {
    pub count: u64,
    pub sum: f64,
    pub average: f64,
}

/// Running average published after every aggregate update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AveragePrice {
    /// Orders behind this average.
    pub count: u64,
    pub average: f64,
}

impl From<AggregateSnapshot> for AveragePrice {
    fn from(snapshot: AggregateSnapshot) -> Self {
        Self {
            count: snapshot.count,
            average: snapshot.average,
        }
    }
}

/// External read model for the aggregation stats endpoint.
///
/// Monetary values are rendered with exactly two decimals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceStats {
    pub total_orders: u64,
    pub total_value: String,
    pub running_average_price: String,
}

impl From<AggregateSnapshot> for PriceStats {
    fn from(snapshot: AggregateSnapshot) -> Self {
        Self {
            total_orders: snapshot.count,
            total_value: format!("{:.2}", snapshot.sum),
            running_average_price: format!("{:.2}", snapshot.average),
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn fresh_state_is_zero() {
        let snap = AggregateState::new().snapshot();
        assert_eq!(snap.count, 0);
        assert!(snap.sum.abs() < f64::EPSILON);
        assert!(snap.average.abs() < f64::EPSILON);
    }

    #[test]
    fn apply_updates_count_sum_and_average() {
        let mut state = AggregateState::new();
        state.apply(10.0);
        state.apply(20.0);
        state.apply(30.0);

        let snap = state.snapshot();
        assert_eq!(snap.count, 3);
        assert!((snap.sum - 60.0).abs() < 1e-9);
        assert!((snap.average - 20.0).abs() < 1e-9);
    }

    #[test]
    fn zero_price_still_counts() {
        let mut state = AggregateState::new();
        state.apply(0.0);
        assert_eq!(state.count(), 1);
        assert!(state.average().abs() < f64::EPSILON);
    }

    #[test]
    fn price_stats_formats_two_decimals() {
        let stats = PriceStats::from(AggregateSnapshot {
            count: 3,
            sum: 60.0,
            average: 20.0,
        });
        assert_eq!(stats.total_orders, 3);
        assert_eq!(stats.total_value, "60.00");
        assert_eq!(stats.running_average_price, "20.00");

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["totalOrders"], 3);
        assert_eq!(json["totalValue"], "60.00");
        assert_eq!(json["runningAveragePrice"], "20.00");
    }

    #[test]
    fn average_price_from_snapshot() {
        let average = AveragePrice::from(AggregateSnapshot {
            count: 2,
            sum: 30.0,
            average: 15.0,
        });
        assert_eq!(average.count, 2);
        assert!((average.average - 15.0).abs() < f64::EPSILON);

        let json = serde_json::to_value(average).unwrap();
        assert_eq!(json["count"], 2);
        assert_eq!(json["average"], 15.0);
    }

    #[test]
    fn price_stats_for_empty_aggregate() {
        let stats = PriceStats::from(AggregateState::new().snapshot());
        assert_eq!(stats.total_orders, 0);
        assert_eq!(stats.total_value, "0.00");
        assert_eq!(stats.running_average_price, "0.00");
    }

    proptest! {
        #[test]
        fn apply_adds_exactly_one_and_the_price(
            prices in proptest::collection::vec(0u32..1_000_000, 0..50),
            next in 0u32..1_000_000,
        ) {
            // Integral cents keep the float sums exact.
            let mut state = AggregateState::new();
            for p in &prices {
                state.apply(f64::from(*p));
            }
            let before = state.snapshot();
            state.apply(f64::from(next));
            let after = state.snapshot();

            prop_assert_eq!(after.count, before.count + 1);
            prop_assert_eq!(after.sum, before.sum + f64::from(next));
            #[allow(clippy::cast_precision_loss)]
            let expected_avg = after.sum / after.count as f64;
            prop_assert_eq!(after.average, expected_avg);
        }
    }
}
