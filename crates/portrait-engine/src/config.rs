use std::env;
use std::time::Duration;

pub const DEFAULT_PROVIDER: &str = "gemini";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-image";
pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_RELAY_URL: &str = "http://127.0.0.1:3000/api/generate";
pub const DEFAULT_RELAY_ADDR: &str = "127.0.0.1:3000";
const DEFAULT_REQUEST_TIMEOUT_S: f64 = 120.0;

/// API key variables, checked in order.
pub const API_KEY_VARS: &[&str] = &["GEMINI_API_KEY", "API_KEY", "GOOGLE_API_KEY"];

/// Where generation requests go and how.
///
/// Resolved from the environment first; the CLI then applies its flags on top.
#[derive(Debug, Clone, PartialEq)]
pub struct StudioConfig {
    pub provider: String,
    pub model: String,
    pub gemini_api_base: String,
    pub api_key: Option<String>,
    pub relay_url: String,
    pub request_timeout: Duration,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            provider: DEFAULT_PROVIDER.to_string(),
            model: DEFAULT_MODEL.to_string(),
            gemini_api_base: DEFAULT_GEMINI_API_BASE.to_string(),
            api_key: None,
            relay_url: DEFAULT_RELAY_URL.to_string(),
            request_timeout: Duration::from_secs_f64(DEFAULT_REQUEST_TIMEOUT_S),
        }
    }
}

impl StudioConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let defaults = Self::default();

        Self {
            provider: non_empty("PORTRAIT_PROVIDER")
                .map(|value| value.to_ascii_lowercase())
                .unwrap_or(defaults.provider),
            model: non_empty("GEMINI_MODEL").unwrap_or(defaults.model),
            gemini_api_base: non_empty("GEMINI_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or(defaults.gemini_api_base),
            api_key: API_KEY_VARS.iter().find_map(|&key| non_empty(key)),
            relay_url: non_empty("PORTRAIT_RELAY_URL").unwrap_or(defaults.relay_url),
            request_timeout: non_empty("PORTRAIT_REQUEST_TIMEOUT")
                .and_then(|value| value.parse::<f64>().ok())
                .filter(|seconds| seconds.is_finite() && *seconds > 0.0)
                .map(Duration::from_secs_f64)
                .unwrap_or(defaults.request_timeout),
        }
    }
}
