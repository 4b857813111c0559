//! Shared configuration constants.

/// Chrome user agent string for stealth mode.
///
/// Updated: 2025-01-29 to Chrome 132 (current stable)
/// Chrome releases new stable versions ~every 4 weeks; update quarterly to
/// stay within a reasonable version window.
pub const CHROME_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.6834.160 Safari/537.36";
