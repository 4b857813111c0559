//! Heuristic detection of CAPTCHA/anti-bot challenge pages by scanning
//! visible page text for known marker phrases. This is a text-scan, not a
//! solver — solving CAPTCHAs is out of scope; detecting them lets the
//! executor surface a clear error instead of treating a challenge page as a
//! successful extraction.

/// Marker phrases seen on common CAPTCHA/challenge interstitials, lower-cased.
const CHALLENGE_MARKERS: &[&str] = &[
    "verify you are human",
    "checking your browser",
    "are you a robot",
    "unusual traffic from your computer",
    "please enable javascript and cookies",
    "cloudflare ray id",
    "access denied",
    "complete the security check",
    "captcha",
    "press and hold",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeDetection {
    pub matched_marker: String,
}

/// Scans `page_text` (already extracted, lower-cased comparison is
/// case-insensitive) for a known challenge marker.
#[must_use]
pub fn detect_challenge(page_text: &str) -> Option<ChallengeDetection> {
    let lower = page_text.to_lowercase();
    CHALLENGE_MARKERS
        .iter()
        .find(|marker| lower.contains(*marker))
        .map(|marker| ChallengeDetection {
            matched_marker: (*marker).to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_known_marker() {
        let text = "Please complete the security check to continue. Captcha required.";
        let detection = detect_challenge(text).unwrap();
        assert_eq!(detection.matched_marker, "complete the security check");
    }

    #[test]
    fn clean_page_has_no_detection() {
        assert!(detect_challenge("Welcome to our store, browse our catalog.").is_none());
    }
}
