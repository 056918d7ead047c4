//! Static device description attached to every verdict submission.

use serde::{Deserialize, Serialize};

/// Device description, computed once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub user_agent: String,
    pub platform: String,
    pub screen_width: u32,
    pub screen_height: u32,
    pub timezone: String,
    pub language: String,
    pub touch_support: bool,
    pub device_pixel_ratio: f64,
}

/// Values that replace detected device properties.
///
/// Screen geometry and touch support cannot be detected from a headless
/// agent, so embedders that know them set them here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceOverrides {
    pub user_agent: Option<String>,
    pub platform: Option<String>,
    pub screen_width: Option<u32>,
    pub screen_height: Option<u32>,
    pub timezone: Option<String>,
    pub language: Option<String>,
    pub touch_support: Option<bool>,
    pub device_pixel_ratio: Option<f64>,
}

impl DeviceInfo {
    /// Detect device properties from the process environment.
    pub fn detect(overrides: &DeviceOverrides) -> Self {
        Self::detect_with(overrides, |key| std::env::var(key).ok())
    }

    /// Detect device properties using the given environment lookup.
    pub fn detect_with(overrides: &DeviceOverrides, env: impl Fn(&str) -> Option<String>) -> Self {
        let timezone = overrides
            .timezone
            .clone()
            .unwrap_or_else(|| detect_timezone(env("TZ")));
        let language = overrides.language.clone().unwrap_or_else(|| {
            env("LC_ALL")
                .or_else(|| env("LANG"))
                .and_then(|locale| language_tag(&locale))
                .unwrap_or_else(|| "en-US".to_string())
        });

        Self {
            user_agent: overrides.user_agent.clone().unwrap_or_else(|| {
                format!(
                    "{}/{} ({}; {})",
                    env!("CARGO_PKG_NAME"),
                    env!("CARGO_PKG_VERSION"),
                    std::env::consts::OS,
                    std::env::consts::ARCH
                )
            }),
            platform: overrides
                .platform
                .clone()
                .unwrap_or_else(|| std::env::consts::OS.to_string()),
            screen_width: overrides.screen_width.unwrap_or(0),
            screen_height: overrides.screen_height.unwrap_or(0),
            timezone,
            language,
            touch_support: overrides.touch_support.unwrap_or(false),
            device_pixel_ratio: overrides.device_pixel_ratio.unwrap_or(1.0),
        }
    }
}

/// Resolve an IANA timezone name, falling back to UTC.
fn detect_timezone(tz: Option<String>) -> String {
    tz.map(|name| name.trim_start_matches(':').to_string())
        .and_then(|name| name.parse::<chrono_tz::Tz>().ok())
        .unwrap_or(chrono_tz::Tz::UTC)
        .name()
        .to_string()
}

/// Convert a POSIX locale (`en_US.UTF-8`) into a language tag (`en-US`).
fn language_tag(locale: &str) -> Option<String> {
    let base = locale.split(['.', '@']).next()?.trim();
    if base.is_empty() || base == "C" || base == "POSIX" {
        return None;
    }
    Some(base.replace('_', "-"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_detects_timezone_and_language() {
        let info = DeviceInfo::detect_with(
            &DeviceOverrides::default(),
            env_of(&[("TZ", "Europe/Berlin"), ("LANG", "de_DE.UTF-8")]),
        );
        assert_eq!(info.timezone, "Europe/Berlin");
        assert_eq!(info.language, "de-DE");
        assert_eq!(info.platform, std::env::consts::OS);
        assert!(!info.touch_support);
    }

    #[test]
    fn test_falls_back_for_unknown_values() {
        let info = DeviceInfo::detect_with(
            &DeviceOverrides::default(),
            env_of(&[("TZ", "Mars/Olympus"), ("LANG", "C")]),
        );
        assert_eq!(info.timezone, "UTC");
        assert_eq!(info.language, "en-US");
        assert_eq!(info.device_pixel_ratio, 1.0);
    }

    #[test]
    fn test_overrides_win() {
        let overrides = DeviceOverrides {
            screen_width: Some(1920),
            screen_height: Some(1080),
            touch_support: Some(true),
            timezone: Some("Asia/Tokyo".to_string()),
            ..DeviceOverrides::default()
        };
        let info = DeviceInfo::detect_with(&overrides, env_of(&[("TZ", "UTC")]));
        assert_eq!(info.screen_width, 1920);
        assert_eq!(info.screen_height, 1080);
        assert!(info.touch_support);
        assert_eq!(info.timezone, "Asia/Tokyo");
    }

    #[test]
    fn test_serializes_in_camel_case() {
        let info = DeviceInfo::detect_with(&DeviceOverrides::default(), env_of(&[]));
        let json = serde_json::to_value(&info).unwrap();
        assert!(json.get("userAgent").is_some());
        assert!(json.get("devicePixelRatio").is_some());
        assert!(json.get("touchSupport").is_some());
    }
}
