use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use crate::types::Tick;

/// 2023-11-14T22:13:20Z, fixed so synthetic series are reproducible
const SYNTHETIC_EPOCH: i64 = 1_700_000_000;

/// Geometric random walk with one tick per minute.
///
/// `drift` and `volatility` are per-tick log-return mean and deviation.
pub fn synthetic_ticks(seed: u64, len: usize, start_price: f64, drift: f64, volatility: f64) -> Vec<Tick> {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(drift, volatility.abs()).ok();
    let start = DateTime::<Utc>::from_timestamp(SYNTHETIC_EPOCH, 0).unwrap_or_default();

    let mut price = start_price;
    (0..len)
        .map(|i| {
            if i > 0 {
                let step = noise.as_ref().map(|n| n.sample(&mut rng)).unwrap_or(drift);
                price *= step.exp();
            }
            Tick {
                timestamp: start + Duration::minutes(i as i64),
                price,
                volume: 1.0 + (i % 10) as f64,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_series() {
        assert_eq!(synthetic_ticks(4, 50, 100.0, 0.0, 0.02), synthetic_ticks(4, 50, 100.0, 0.0, 0.02));
        assert_ne!(synthetic_ticks(4, 50, 100.0, 0.0, 0.02), synthetic_ticks(5, 50, 100.0, 0.0, 0.02));
    }

    #[test]
    fn prices_stay_positive_and_ordered_in_time() {
        let ticks = synthetic_ticks(1, 200, 50.0, -0.001, 0.05);
        assert!(ticks.iter().all(|t| t.price > 0.0));
        assert!(ticks.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }
}
