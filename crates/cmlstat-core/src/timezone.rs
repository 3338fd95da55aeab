//! Timezone utilities for report windows
//!
//! Report windows are calendar periods ("July 2024"), so their boundaries
//! depend on the timezone the operator thinks in. This module detects the
//! system's local timezone, parses timezone strings from user input, and
//! converts local calendar boundaries to UTC instants.

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::str::FromStr;
use tracing::debug;

/// Configuration for timezone handling
#[derive(Debug, Clone)]
pub struct TimezoneConfig {
    /// The timezone to use for date operations
    pub tz: Tz,
    /// Whether the timezone is UTC
    pub is_utc: bool,
}

impl Default for TimezoneConfig {
    fn default() -> Self {
        let tz = get_local_timezone();
        Self {
            is_utc: tz == Tz::UTC,
            tz,
        }
    }
}

impl TimezoneConfig {
    /// UTC configuration, independent of the host
    pub fn utc() -> Self {
        Self {
            tz: Tz::UTC,
            is_utc: true,
        }
    }

    /// Create a new timezone configuration from CLI arguments
    pub fn from_cli(timezone_str: Option<&str>, use_utc: bool) -> crate::error::Result<Self> {
        if use_utc {
            return Ok(Self::utc());
        }

        if let Some(tz_str) = timezone_str {
            let tz = Tz::from_str(tz_str).map_err(|_| {
                crate::error::CmlstatError::InvalidTimezone(format!(
                    "'{}'. Use format like 'America/New_York', 'Asia/Tokyo', or 'UTC'",
                    tz_str
                ))
            })?;
            Ok(Self {
                tz,
                is_utc: tz == Tz::UTC,
            })
        } else {
            Ok(Self::default())
        }
    }

    /// Get the display name for the configured timezone
    pub fn display_name(&self) -> &str {
        if self.is_utc { "UTC" } else { self.tz.name() }
    }

    /// Convert a local wall-clock time in this timezone to a UTC instant
    ///
    /// Ambiguous times (DST fall-back) resolve to the earlier instant. Times
    /// that do not exist locally (DST spring-forward gap) resolve to the
    /// first valid instant after the gap.
    pub fn to_utc(&self, local: NaiveDateTime) -> DateTime<Utc> {
        let mut candidate = local;
        // DST gaps are at most a few hours; step forward until the wall time exists.
        for _ in 0..4 {
            if let Some(dt) = self.tz.from_local_datetime(&candidate).earliest() {
                return dt.with_timezone(&Utc);
            }
            candidate += Duration::hours(1);
        }
        local.and_utc()
    }

    /// Current wall-clock time in this timezone
    pub fn now_local(&self) -> NaiveDateTime {
        Utc::now().with_timezone(&self.tz).naive_local()
    }
}

/// Timezone that report windows default to when none is given
///
/// `TZ` wins over the zone the OS reports. Anything unrecognized falls
/// back to UTC, which keeps month boundaries well defined.
pub fn get_local_timezone() -> Tz {
    let from_env = std::env::var("TZ")
        .ok()
        .and_then(|name| named_zone("TZ", &name));
    let from_system = || match iana_time_zone::get_timezone() {
        Ok(name) => named_zone("system", &name),
        Err(e) => {
            debug!(error = ?e, "System timezone unavailable");
            None
        }
    };

    from_env.or_else(from_system).unwrap_or_else(|| {
        debug!("Report windows fall back to UTC");
        Tz::UTC
    })
}

fn named_zone(source: &str, name: &str) -> Option<Tz> {
    match Tz::from_str(name.trim()) {
        Ok(tz) => {
            debug!(source, timezone = %tz.name(), "Report window timezone");
            Some(tz)
        }
        Err(_) => {
            debug!(source, name, "Unrecognized timezone name");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_named_zone() {
        assert_eq!(named_zone("TZ", " Asia/Tokyo "), Some(Tz::Asia__Tokyo));
        assert_eq!(named_zone("TZ", "Mars/Olympus"), None);
    }

    #[test]
    fn test_timezone_config_utc() {
        let config = TimezoneConfig::from_cli(None, true).unwrap();
        assert!(config.is_utc);
        assert_eq!(config.tz, Tz::UTC);
        assert_eq!(config.display_name(), "UTC");
    }

    #[test]
    fn test_timezone_config_explicit() {
        let config = TimezoneConfig::from_cli(Some("America/New_York"), false).unwrap();
        assert!(!config.is_utc);
        assert_eq!(config.tz.name(), "America/New_York");
    }

    #[test]
    fn test_timezone_config_invalid() {
        let result = TimezoneConfig::from_cli(Some("Invalid/Timezone"), false);
        assert!(result.is_err());
    }

    #[test]
    fn test_timezone_config_utc_via_timezone_flag() {
        let config = TimezoneConfig::from_cli(Some("UTC"), false).unwrap();
        assert!(config.is_utc);
        assert_eq!(config.display_name(), "UTC");
    }

    #[test]
    fn test_to_utc_offsets_local_midnight() {
        let config = TimezoneConfig::from_cli(Some("Asia/Tokyo"), false).unwrap();
        let local = NaiveDate::from_ymd_opt(2024, 7, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let utc = config.to_utc(local);
        assert_eq!(utc, Utc.with_ymd_and_hms(2024, 6, 30, 15, 0, 0).unwrap());
    }

    #[test]
    fn test_to_utc_skips_dst_gap() {
        // 2024-03-10 02:30 does not exist in New York.
        let config = TimezoneConfig::from_cli(Some("America/New_York"), false).unwrap();
        let local = NaiveDate::from_ymd_opt(2024, 3, 10)
            .unwrap()
            .and_hms_opt(2, 30, 0)
            .unwrap();
        let utc = config.to_utc(local);
        assert_eq!(utc, Utc.with_ymd_and_hms(2024, 3, 10, 7, 30, 0).unwrap());
    }
}
