//! Runtime environment probing
//!
//! Classifies the OS family from a platform / user-agent string and resolves
//! the timezone. Pure apart from [`Environment::from_host`].

use crate::types::OperatingSystem;
use serde::{Deserialize, Serialize};

const FALLBACK_TIMEZONE: &str = "UTC";

/// OS family and timezone of the visitor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    /// Detected OS family
    pub operating_system: OperatingSystem,
    /// IANA timezone
    pub timezone: String,
}

impl Environment {
    /// Probe the current process: OS constant plus the `TZ` variable
    #[must_use]
    pub fn from_host() -> Self {
        Self::resolve(None, None)
    }

    /// Probe with explicit overrides, falling back to host values
    #[must_use]
    pub fn resolve(platform: Option<&str>, timezone: Option<&str>) -> Self {
        let host_tz = std::env::var("TZ").ok();
        probe(
            platform.unwrap_or(std::env::consts::OS),
            timezone.or(host_tz.as_deref()),
        )
    }
}

/// Classify `platform` and resolve `timezone`.
///
/// Blank or missing timezones become `UTC`. A leading `:` (POSIX `TZ`
/// file syntax) is stripped.
#[must_use]
pub fn probe(platform: &str, timezone: Option<&str>) -> Environment {
    let timezone = timezone
        .map(|tz| tz.trim().trim_start_matches(':'))
        .filter(|tz| !tz.is_empty())
        .unwrap_or(FALLBACK_TIMEZONE)
        .to_string();

    Environment {
        operating_system: classify(platform),
        timezone,
    }
}

/// Classify an OS family by substring.
///
/// More specific families are tested first: Android user agents also say
/// "Linux", iOS ones say "Mac OS X", and "Darwin" contains "win".
#[must_use]
pub fn classify(platform: &str) -> OperatingSystem {
    let p = platform.to_ascii_lowercase();
    let has = |needle: &str| p.contains(needle);

    if has("android") {
        OperatingSystem::Android
    } else if has("iphone") || has("ipad") || has("ipod") || has("ios") {
        OperatingSystem::IOS
    } else if has("mac") || has("darwin") {
        OperatingSystem::MacOS
    } else if has("win") {
        OperatingSystem::Windows
    } else if has("linux") || has("x11") {
        OperatingSystem::Linux
    } else {
        OperatingSystem::Unknown
    }
}
