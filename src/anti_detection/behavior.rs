//! Human-like interaction pacing, sampled from a [`PacingBounds`] profile.

use rand::Rng;
use std::time::Duration;

use super::profiles::PacingBounds;

fn sample_range(bounds: (Duration, Duration)) -> Duration {
    let (low, high) = bounds;
    if high <= low {
        return low;
    }
    let low_ms = low.as_millis() as u64;
    let high_ms = high.as_millis() as u64;
    Duration::from_millis(rand::rng().random_range(low_ms..=high_ms))
}

/// Sleeps for a randomized delay appropriate for a single interaction
/// (click, fill, scroll), per the given pacing profile.
pub async fn pace_action(bounds: &PacingBounds) {
    tokio::time::sleep(sample_range(bounds.action_delay)).await;
}

/// Sleeps for a randomized delay after navigation, simulating the page
/// "settling" before the next action, with an occasional longer idle pause.
pub async fn pace_page_settle(bounds: &PacingBounds) {
    tokio::time::sleep(sample_range(bounds.page_settle_delay)).await;
    if rand::rng().random_bool(bounds.idle_pause_probability) {
        let (_, high) = bounds.page_settle_delay;
        tokio::time::sleep(high).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anti_detection::profiles::bounds_for;
    use crate::config::PacingProfile;

    #[tokio::test]
    async fn pace_action_completes() {
        let bounds = bounds_for(PacingProfile::Aggressive);
        pace_action(&bounds).await;
    }
}
