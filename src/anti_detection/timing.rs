//! Secondary challenge signal based on page-load timing rather than text.
//!
//! A real browser render has jitter; an interstitial served straight from an
//! edge cache or a stub challenge page tends to respond implausibly fast or
//! with suspiciously uniform timing across repeated loads. This is a weak
//! signal meant to be combined with [`super::detection::detect_challenge`],
//! not used standalone.

/// Flags load timing that is implausibly fast or suspiciously uniform across
/// the last few samples.
#[must_use]
pub fn timing_is_suspicious(load_time_ms: u64, recent_samples: &[u64]) -> bool {
    if load_time_ms < 10 {
        return true;
    }
    if recent_samples.len() < 3 {
        return false;
    }
    recent_samples.windows(2).all(|w| w[0] == w[1])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_implausibly_fast_load() {
        assert!(timing_is_suspicious(3, &[]));
    }

    #[test]
    fn flags_suspiciously_uniform_timing() {
        assert!(timing_is_suspicious(500, &[12, 12, 12]));
    }

    #[test]
    fn normal_timing_is_not_flagged() {
        assert!(!timing_is_suspicious(500, &[12, 30, 8]));
    }
}
