//! Performance simulation: the response service's latency-injection step
//! (§4.5). Trimmed down from `mockforge-core/src/latency.rs`'s general
//! `LatencyDistribution`/`LatencyProfile`/fault-injection machinery to the
//! two modes spec.md actually specifies — an exact delay, or a uniform
//! random pick in `[min, max)` — since nothing in the spec calls for
//! Normal/Pareto distributions or fault injection.

use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::config::PerformanceConfig;

/// Decide how long to delay the response for `config`, per spec.md §4.5
/// step 1: an exact delay takes precedence over a range; the range's upper
/// bound is **exclusive** (an explicitly preserved quirk — see
/// DESIGN.md's delay-range open question).
pub fn compute_delay(config: Option<&PerformanceConfig>) -> Option<Duration> {
    let config = config?;

    if let Some(exact) = config.exact_delay_ms {
        if exact > 0 {
            return Some(Duration::from_millis(exact));
        }
    }

    match (config.min_delay_ms, config.max_delay_ms) {
        (Some(min), Some(max)) if max >= min => {
            if max == min {
                return Some(Duration::from_millis(min));
            }
            let picked = rand::rng().random_range(min..max);
            Some(Duration::from_millis(picked))
        }
        _ => None,
    }
}

/// Sleep for the computed delay, or return immediately if none is
/// configured. Cancels early (without completing the delay) if
/// `cancellation` fires, so a disconnected client's request doesn't hold a
/// worker thread for the full delay.
pub async fn simulate_performance(config: Option<&PerformanceConfig>, cancellation: &CancellationToken) {
    let Some(delay) = compute_delay(config) else { return };

    tokio::select! {
        () = tokio::time::sleep(delay) => {}
        () = cancellation.cancelled() => {
            tracing::debug!("performance simulation cancelled, client disconnected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_delay_takes_precedence() {
        let config = PerformanceConfig { exact_delay_ms: Some(50), min_delay_ms: Some(100), max_delay_ms: Some(200) };
        assert_eq!(compute_delay(Some(&config)), Some(Duration::from_millis(50)));
    }

    #[test]
    fn no_config_means_no_delay() {
        assert_eq!(compute_delay(None), None);
    }

    #[test]
    fn equal_min_and_max_picks_exactly_that_value() {
        let config = PerformanceConfig { exact_delay_ms: None, min_delay_ms: Some(150), max_delay_ms: Some(150) };
        assert_eq!(compute_delay(Some(&config)), Some(Duration::from_millis(150)));
    }

    #[test]
    fn range_pick_never_reaches_the_exclusive_upper_bound() {
        let config = PerformanceConfig { exact_delay_ms: None, min_delay_ms: Some(100), max_delay_ms: Some(200) };
        for _ in 0..200 {
            let delay = compute_delay(Some(&config)).unwrap();
            assert!(delay >= Duration::from_millis(100));
            assert!(delay < Duration::from_millis(200));
        }
    }

    #[tokio::test]
    async fn simulate_performance_completes_without_cancellation() {
        let config = PerformanceConfig { exact_delay_ms: Some(1), min_delay_ms: None, max_delay_ms: None };
        let token = CancellationToken::new();
        simulate_performance(Some(&config), &token).await;
    }
}
