//! Credential handling for LLM providers.
//!
//! A credential is wrapped in a [`SecretString`] the moment it is read.
//! `Debug` and `Display` print `[REDACTED]`; the raw value is only reachable
//! through [`ApiCredential::expose`], at the point a request header is built.
//!
//! ```ignore
//! const KEY: CredentialSpec = CredentialSpec::new("Anthropic API key", "api_key", "ANTHROPIC_API_KEY");
//! let credential = KEY.resolve(&settings.options)?;
//! ```

use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value as JsonValue;

use super::ProviderError;

/// Where a credential was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// `provider.options` in the config file
    Config,
    Environment,
    Programmatic,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Config => "config",
            Self::Environment => "environment",
            Self::Programmatic => "programmatic",
        })
    }
}

/// How to find one credential: an options key first, then an env variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredentialSpec {
    pub name: &'static str,
    pub config_key: &'static str,
    pub env_var: &'static str,
}

impl CredentialSpec {
    pub const fn new(name: &'static str, config_key: &'static str, env_var: &'static str) -> Self {
        Self {
            name,
            config_key,
            env_var,
        }
    }

    /// Load the credential. Empty values count as missing.
    pub fn resolve(&self, options: &JsonValue) -> Result<ApiCredential, ProviderError> {
        if let Some(value) = self.option_value(options) {
            return Ok(ApiCredential::new(value, CredentialSource::Config, self.name));
        }
        if let Some(value) = self.env_value() {
            return Ok(ApiCredential::new(value, CredentialSource::Environment, self.name));
        }
        Err(ProviderError::NotConfigured(format!(
            "{} missing: set provider.options.{} or {}",
            self.name, self.config_key, self.env_var
        )))
    }

    /// Whether [`resolve`](Self::resolve) would succeed, without wrapping the value.
    pub fn is_available(&self, options: &JsonValue) -> bool {
        self.option_value(options).is_some() || self.env_value().is_some()
    }

    fn option_value<'a>(&self, options: &'a JsonValue) -> Option<&'a str> {
        options
            .get(self.config_key)
            .and_then(JsonValue::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    fn env_value(&self) -> Option<String> {
        std::env::var(self.env_var)
            .ok()
            .filter(|v| !v.trim().is_empty())
    }
}

/// An API credential that never prints its value.
pub struct ApiCredential {
    value: SecretString,
    source: CredentialSource,
    name: &'static str,
}

impl ApiCredential {
    pub fn new(value: impl Into<String>, source: CredentialSource, name: &'static str) -> Self {
        Self {
            value: SecretString::from(value.into()),
            source,
            name,
        }
    }

    /// The raw value. Use it inline; never store or log it.
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    pub fn is_empty(&self) -> bool {
        self.expose().is_empty()
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredential")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("value", &"[REDACTED]")
            .finish()
    }
}

impl fmt::Display for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) [REDACTED]", self.name, self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SECRET: &str = "sk-ant-REDACTED";

    fn spec(env_var: &'static str) -> CredentialSpec {
        CredentialSpec::new("Test key", "api_key", env_var)
    }

    #[test]
    fn test_credential_redacted() {
        let cred = ApiCredential::new(SECRET, CredentialSource::Config, "Anthropic API key");

        let debug = format!("{:?}", cred);
        let display = format!("{}", cred);
        assert!(!debug.contains(SECRET));
        assert!(!display.contains(SECRET));
        assert_eq!(display, "Anthropic API key (config) [REDACTED]");
        assert_eq!(cred.expose(), SECRET);
    }

    #[test]
    fn test_options_take_precedence() {
        std::env::set_var("PARAFIND_TEST_KEY_PRIORITY", "env-key");
        let cred = spec("PARAFIND_TEST_KEY_PRIORITY")
            .resolve(&json!({ "api_key": "config-key" }))
            .unwrap();

        assert_eq!(cred.expose(), "config-key");
        assert_eq!(cred.source(), CredentialSource::Config);
        std::env::remove_var("PARAFIND_TEST_KEY_PRIORITY");
    }

    #[test]
    fn test_env_fallback_skips_empty_option() {
        std::env::set_var("PARAFIND_TEST_KEY_FALLBACK", "env-key");
        let cred = spec("PARAFIND_TEST_KEY_FALLBACK")
            .resolve(&json!({ "api_key": "  " }))
            .unwrap();

        assert_eq!(cred.expose(), "env-key");
        assert_eq!(cred.source(), CredentialSource::Environment);
        std::env::remove_var("PARAFIND_TEST_KEY_FALLBACK");
    }

    #[test]
    fn test_missing_credential() {
        let spec = spec("PARAFIND_TEST_KEY_MISSING");
        let err = spec.resolve(&json!({})).unwrap_err();

        assert!(err.to_string().contains("PARAFIND_TEST_KEY_MISSING"));
        assert!(!spec.is_available(&json!({})));
        assert!(spec.is_available(&json!({ "api_key": "x" })));
    }
}
