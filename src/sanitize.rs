//! Error and log text sanitization
//!
//! Everything that crosses the trust boundary (error ToolResults, surfaced
//! turn errors, telemetry detail, log lines) passes through here. The
//! functions are pure and idempotent: sanitizing already-sanitized text is a
//! no-op, so an accidental double pass can never corrupt output.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

/// Marker substituted for credential-like tokens
pub const REDACTED_MARKER: &str = "[REDACTED]";

/// Marker substituted for home-relative filesystem paths
pub const REDACTED_PATH_MARKER: &str = "[REDACTED_PATH]";

/// Marker appended when text is truncated
pub const TRUNCATION_MARKER: &str = " [truncated]";

/// Default upper bound for sanitized text, in characters
pub const MAX_SANITIZED_LEN: usize = 4096;

/// Fixed-prefix API credential patterns (`sk-…` style keys, bearer tokens)
static CREDENTIAL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"sk-[A-Za-z0-9_-]{8,}|(?i:bearer)\s+[A-Za-z0-9._=-]{8,}").expect("credential pattern"));

/// Absolute paths under recognized user-home prefixes
static HOME_PATH_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?:/home|/Users)/[^\s'"`]+"#).expect("home path pattern"));

/// Metadata keys whose values are always redacted
const SENSITIVE_KEY_FRAGMENTS: &[&str] = &["key", "secret", "token", "password"];

/// Text sanitizer with a configurable length bound
#[derive(Debug, Clone)]
pub struct Sanitizer {
    max_len: usize,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self {
            max_len: MAX_SANITIZED_LEN,
        }
    }
}

impl Sanitizer {
    /// Sanitizer with a custom length bound. Bounds smaller than the
    /// truncation marker are clamped so the marker always fits.
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            max_len: max_len.max(TRUNCATION_MARKER.len() + 1),
        }
    }

    /// Redact credentials and home paths, then truncate to the bound.
    ///
    /// Never panics; pathological input degrades to a generic string.
    pub fn sanitize(&self, text: &str) -> String {
        // Hard ceiling before regex work so hostile input can't make the
        // sanitizer itself expensive.
        let bounded: &str = if text.len() > self.max_len * 8 {
            match text.get(..self.max_len * 8) {
                Some(prefix) => prefix,
                None => return "[unrepresentable content]".to_string(),
            }
        } else {
            text
        };

        let redacted = CREDENTIAL_PATTERN.replace_all(bounded, REDACTED_MARKER);
        let redacted = HOME_PATH_PATTERN.replace_all(&redacted, REDACTED_PATH_MARKER);
        let redacted = self.redact_detected_home(&redacted);

        self.truncate(&redacted)
    }

    /// Redact values in structured metadata whose key names suggest secret
    /// material, and sanitize the remaining values as plain text.
    pub fn sanitize_metadata(&self, metadata: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        metadata
            .iter()
            .map(|(key, value)| {
                let lowered = key.to_lowercase();
                let redact = SENSITIVE_KEY_FRAGMENTS
                    .iter()
                    .any(|fragment| lowered.contains(fragment));
                let value = if redact {
                    REDACTED_MARKER.to_string()
                } else {
                    self.sanitize(value)
                };
                (key.clone(), value)
            })
            .collect()
    }

    /// Replace occurrences of the actual home directory, covering platforms
    /// where the home prefix is not `/home` or `/Users`.
    fn redact_detected_home(&self, text: &str) -> String {
        match dirs::home_dir() {
            Some(home) => {
                let home = home.to_string_lossy();
                if home.len() > 1 && text.contains(home.as_ref()) {
                    text.replace(home.as_ref(), REDACTED_PATH_MARKER)
                } else {
                    text.to_string()
                }
            }
            None => text.to_string(),
        }
    }

    /// Truncate to the bound on a character boundary, leaving room for the
    /// marker so the result never exceeds `max_len`. Text at or under the
    /// bound is returned unchanged, which keeps truncation idempotent.
    fn truncate(&self, text: &str) -> String {
        let char_count = text.chars().count();
        if char_count <= self.max_len {
            return text.to_string();
        }

        let keep = self.max_len.saturating_sub(TRUNCATION_MARKER.chars().count());
        let mut truncated: String = text.chars().take(keep).collect();
        truncated.push_str(TRUNCATION_MARKER);
        truncated
    }
}

/// Sanitize with the default bound. Shorthand for one-off call sites.
pub fn sanitize(text: &str) -> String {
    Sanitizer::default().sanitize(text)
}
