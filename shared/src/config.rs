use crate::auth::AuthEndpoints;
use crate::upload::Endpoints;
use serde::{Deserialize, Serialize};

pub const DEFAULT_AUTH_BASE: &str = "https://ocr-software-62gw.onrender.com";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// OCR service origin. Empty means the page's own origin.
    pub api_base: String,
    pub api_key: Option<String>,
    /// Origin of the accounts API used by the Google callback view.
    pub auth_base: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: String::new(),
            api_key: None,
            auth_base: DEFAULT_AUTH_BASE.to_string(),
        }
    }
}

impl ClientConfig {
    /// Builds the config from optional overrides, treating blank values as unset.
    pub fn from_values(
        api_base: Option<&str>,
        api_key: Option<&str>,
        auth_base: Option<&str>,
    ) -> Self {
        let defaults = Self::default();
        let non_blank = |v: Option<&str>| v.map(str::trim).filter(|v| !v.is_empty()).map(String::from);

        Self {
            api_base: non_blank(api_base).unwrap_or(defaults.api_base),
            api_key: non_blank(api_key),
            auth_base: non_blank(auth_base).unwrap_or(defaults.auth_base),
        }
    }

    pub fn api_key_missing(&self) -> bool {
        self.api_key.is_none()
    }

    /// Key to send in the `X-API-Key` header. Requests still go out without
    /// one; the server decides what is allowed.
    pub fn api_key(&self) -> &str {
        self.api_key.as_deref().unwrap_or_default()
    }

    pub fn endpoints(&self) -> Endpoints {
        Endpoints::new(&self.api_base)
    }

    pub fn auth_endpoints(&self) -> AuthEndpoints {
        AuthEndpoints::new(&self.auth_base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::from_values(None, Some("   "), None);
        assert_eq!(config, ClientConfig::default());
        assert!(config.api_key_missing());
        assert_eq!(config.api_key(), "");
        assert_eq!(config.endpoints().health(), "/health");
    }

    #[test]
    fn test_overrides() {
        let config = ClientConfig::from_values(
            Some("https://ocr.internal/"),
            Some("k-123"),
            Some("http://localhost:8000"),
        );
        assert!(!config.api_key_missing());
        assert_eq!(config.api_key(), "k-123");
        assert_eq!(config.endpoints().health(), "https://ocr.internal/health");
        assert_eq!(
            config.auth_endpoints().verify_otp(),
            "http://localhost:8000/api/accounts/verify-otp/"
        );
    }

    #[test]
    fn test_deserialize_partial() {
        let config: ClientConfig = serde_json::from_str(r#"{"api_key": "abc"}"#).unwrap();
        assert_eq!(config.api_key.as_deref(), Some("abc"));
        assert_eq!(config.auth_base, DEFAULT_AUTH_BASE);
    }
}
