//! Pacing profiles: how aggressively the executor paces interactions.

use std::time::Duration;

use crate::config::PacingProfile;

/// Timing bounds for a single simulated human interaction (mouse move,
/// scroll, keystroke). The executor samples a delay uniformly from
/// `[min, max]` before each action.
#[derive(Debug, Clone, Copy)]
pub struct PacingBounds {
    pub action_delay: (Duration, Duration),
    pub page_settle_delay: (Duration, Duration),
    /// Probability per page of inserting an extra "idle" pause, simulating
    /// a human reading the page before acting.
    pub idle_pause_probability: f64,
}

#[must_use]
pub fn bounds_for(profile: PacingProfile) -> PacingBounds {
    match profile {
        PacingProfile::Aggressive => PacingBounds {
            action_delay: (Duration::from_millis(20), Duration::from_millis(120)),
            page_settle_delay: (Duration::from_millis(100), Duration::from_millis(400)),
            idle_pause_probability: 0.05,
        },
        PacingProfile::Balanced => PacingBounds {
            action_delay: (Duration::from_millis(80), Duration::from_millis(350)),
            page_settle_delay: (Duration::from_millis(300), Duration::from_millis(1200)),
            idle_pause_probability: 0.15,
        },
        PacingProfile::Conservative => PacingBounds {
            action_delay: (Duration::from_millis(200), Duration::from_millis(900)),
            page_settle_delay: (Duration::from_millis(800), Duration::from_millis(2500)),
            idle_pause_probability: 0.3,
        },
        PacingProfile::Stealth => PacingBounds {
            action_delay: (Duration::from_millis(400), Duration::from_millis(1800)),
            page_settle_delay: (Duration::from_millis(1500), Duration::from_millis(4000)),
            idle_pause_probability: 0.45,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stealth_is_slower_than_aggressive() {
        let stealth = bounds_for(PacingProfile::Stealth);
        let aggressive = bounds_for(PacingProfile::Aggressive);
        assert!(stealth.action_delay.0 > aggressive.action_delay.1);
    }
}
