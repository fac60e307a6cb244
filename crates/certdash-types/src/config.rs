//! Process-wide configuration types for certdash.
//!
//! [`AppConfig`] mirrors `config.toml` in the data directory. [`AppInfo`]
//! holds the version and documentation links, resolved once at startup and
//! passed by reference to whatever needs them.

use serde::{Deserialize, Serialize};

/// Top-level configuration. All fields have sensible defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub ui: UiConfig,
}

/// Connection settings for the backend server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the backend (no trailing slash needed).
    #[serde(default = "default_backend_url")]
    pub url: String,

    /// Auth token sent as the `Authorization` header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Timeout for plain request/response calls.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// How long a subscribe call waits for the realtime connection handshake.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_backend_url() -> String {
    "http://127.0.0.1:8090".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            token: None,
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

/// Display preferences.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiConfig {
    /// Page size used when none is given explicitly.
    #[serde(default = "default_per_page")]
    pub default_per_page: u32,

    /// Language tag, e.g. `en` or `zh-CN`.
    #[serde(default = "default_locale")]
    pub locale: String,
}

fn default_per_page() -> u32 {
    10
}

fn default_locale() -> String {
    "en".to_string()
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            default_per_page: default_per_page(),
            locale: default_locale(),
        }
    }
}

// ---------------------------------------------------------------------------
// App info
// ---------------------------------------------------------------------------

pub const APP_REPO_URL: &str = "https://github.com/certimate-go/certimate";
pub const FALLBACK_APP_VERSION: &str = "v0.0.0-dev";

const DOCUMENT_URL_ZH: &str = "https://docs.certimate.me";
const DOCUMENT_URL_EN: &str = "https://docs.certimate.me/en/";

/// Version and links shown by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppInfo {
    pub version: String,
    pub repo_url: String,
    pub download_url: String,
    pub document_url: String,
}

impl AppInfo {
    /// Resolve app info once.
    ///
    /// Version priority: runtime override > build-time git tag > `v0.0.0-dev`.
    /// Blank values fall through to the next source.
    pub fn resolve(runtime_version: Option<&str>, build_tag: Option<&str>, locale: &str) -> Self {
        let version = [runtime_version, build_tag]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|v| !v.is_empty())
            .unwrap_or(FALLBACK_APP_VERSION)
            .to_string();

        Self {
            version,
            repo_url: APP_REPO_URL.to_string(),
            download_url: format!("{APP_REPO_URL}/releases"),
            document_url: document_url_for(locale).to_string(),
        }
    }
}

/// Documentation root for a language tag. Chinese locales get the default
/// site, everything else the English one.
pub fn document_url_for(locale: &str) -> &'static str {
    if locale.to_lowercase().starts_with("zh") {
        DOCUMENT_URL_ZH
    } else {
        DOCUMENT_URL_EN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_config_default_values() {
        let config = AppConfig::default();
        assert_eq!(config.backend.url, "http://127.0.0.1:8090");
        assert!(config.backend.token.is_none());
        assert_eq!(config.ui.default_per_page, 10);
        assert_eq!(config.ui.locale, "en");
    }

    #[test]
    fn test_app_config_deserialize_with_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.backend.request_timeout_secs, 30);
        assert_eq!(config.backend.connect_timeout_secs, 10);
    }

    #[test]
    fn test_app_config_deserialize_partial_sections() {
        let toml_str = r#"
[backend]
url = "https://certs.example.com"
token = "abc"

[ui]
locale = "zh-CN"
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.backend.url, "https://certs.example.com");
        assert_eq!(config.backend.token.as_deref(), Some("abc"));
        assert_eq!(config.backend.request_timeout_secs, 30);
        assert_eq!(config.ui.locale, "zh-CN");
        assert_eq!(config.ui.default_per_page, 10);
    }

    #[test]
    fn test_app_info_version_fallback_chain() {
        assert_eq!(AppInfo::resolve(Some("v1.2.0"), Some("v1.1.0"), "en").version, "v1.2.0");
        assert_eq!(AppInfo::resolve(Some("  "), Some("v1.1.0"), "en").version, "v1.1.0");
        assert_eq!(AppInfo::resolve(None, None, "en").version, FALLBACK_APP_VERSION);
    }

    #[test]
    fn test_app_info_links() {
        let info = AppInfo::resolve(None, None, "en-US");
        assert_eq!(info.download_url, format!("{APP_REPO_URL}/releases"));
        assert_eq!(info.document_url, "https://docs.certimate.me/en/");
    }

    #[test]
    fn test_document_url_for_locale() {
        assert_eq!(document_url_for("zh"), "https://docs.certimate.me");
        assert_eq!(document_url_for("zh-TW"), "https://docs.certimate.me");
        assert_eq!(document_url_for("fr"), "https://docs.certimate.me/en/");
    }
}
