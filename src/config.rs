//! Configuration types for report extraction and generation.
//!
//! Everything the two model clients need is carried by [`ReportConfig`],
//! built once at process start and passed by reference into each call.
//! Credentials live in [`Credentials`] inside the config; nothing in the
//! library reads API keys from ambient global state after start-up.

use crate::error::RexError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Environment variable the provider factory reads the key for `provider`
/// from. Local providers (`ollama`, `lmstudio`) need no key.
pub fn api_key_env(provider: &str) -> Option<&'static str> {
    match provider.to_ascii_lowercase().as_str() {
        "openai" => Some("OPENAI_API_KEY"),
        "anthropic" => Some("ANTHROPIC_API_KEY"),
        "gemini" => Some("GEMINI_API_KEY"),
        "mistral" => Some("MISTRAL_API_KEY"),
        "openrouter" => Some("OPENROUTER_API_KEY"),
        "azure" => Some("AZURE_OPENAI_API_KEY"),
        _ => None,
    }
}

/// Default vision model.
pub const DEFAULT_VISION_MODEL: &str = "gpt-4o-mini";

/// Default generation model.
pub const DEFAULT_GENERATION_MODEL: &str = "claude-3-sonnet-20240229";

/// An API key. `Debug` and `Display` never print the value.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey(String);

impl SecretKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The raw key, for handing to the transport layer.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

/// The two API credentials the pipeline needs.
///
/// A missing key is not an error here: the call that needs it fails later
/// with an auth error that the session shows to the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub vision_api_key: Option<SecretKey>,
    pub generation_api_key: Option<SecretKey>,
}

impl Credentials {
    /// Load the keys for both configured providers from the process environment.
    pub fn from_env(vision: &ModelSettings, generation: &ModelSettings) -> Self {
        Self::from_lookup(vision, generation, |name| std::env::var(name).ok())
    }

    /// Load the keys through an arbitrary lookup function. Empty values
    /// count as absent.
    pub fn from_lookup<F>(vision: &ModelSettings, generation: &ModelSettings, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |settings: &ModelSettings| {
            api_key_env(&settings.provider)
                .and_then(&lookup)
                .filter(|v| !v.trim().is_empty())
                .map(SecretKey::new)
        };
        Self {
            vision_api_key: get(vision),
            generation_api_key: get(generation),
        }
    }
}

/// Which provider and model one of the two clients talks to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Provider name understood by the provider factory, e.g. "openai".
    pub provider: String,
    /// Model identifier. Treated as opaque configuration.
    pub model: String,
    /// Ceiling on generated tokens.
    pub max_tokens: usize,
    /// Sampling temperature. `None` leaves the provider default.
    pub temperature: Option<f32>,
}

impl ModelSettings {
    /// Defaults for the text-extraction call.
    pub fn vision_default() -> Self {
        Self {
            provider: "openai".into(),
            model: DEFAULT_VISION_MODEL.into(),
            max_tokens: 4000,
            temperature: None,
        }
    }

    /// Defaults for the report-generation call.
    ///
    /// Low temperature keeps the section layout consistent between runs.
    pub fn generation_default() -> Self {
        Self {
            provider: "anthropic".into(),
            model: DEFAULT_GENERATION_MODEL.into(),
            max_tokens: 4000,
            temperature: Some(0.3),
        }
    }
}

/// Configuration for a report session.
///
/// # Example
/// ```rust
/// use rex_report::ReportConfig;
///
/// let config = ReportConfig::builder()
///     .vision_model("gpt-4o")
///     .generation_temperature(0.2)
///     .build()
///     .unwrap();
/// assert_eq!(config.vision.model, "gpt-4o");
/// ```
#[derive(Debug, Clone)]
pub struct ReportConfig {
    /// Text extraction model.
    pub vision: ModelSettings,
    /// Report generation model.
    pub generation: ModelSettings,
    /// Directory report files are written to. Default: current directory.
    pub output_dir: PathBuf,
    /// API keys for the two models.
    pub credentials: Credentials,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            vision: ModelSettings::vision_default(),
            generation: ModelSettings::generation_default(),
            output_dir: PathBuf::from("."),
            credentials: Credentials::default(),
        }
    }
}

impl ReportConfig {
    /// Create a new builder for `ReportConfig`.
    pub fn builder() -> ReportConfigBuilder {
        ReportConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ReportConfig`].
#[derive(Debug)]
pub struct ReportConfigBuilder {
    config: ReportConfig,
}

impl ReportConfigBuilder {
    pub fn vision_provider(mut self, name: impl Into<String>) -> Self {
        self.config.vision.provider = name.into();
        self
    }

    pub fn vision_model(mut self, model: impl Into<String>) -> Self {
        self.config.vision.model = model.into();
        self
    }

    pub fn vision_max_tokens(mut self, n: usize) -> Self {
        self.config.vision.max_tokens = n;
        self
    }

    pub fn generation_provider(mut self, name: impl Into<String>) -> Self {
        self.config.generation.provider = name.into();
        self
    }

    pub fn generation_model(mut self, model: impl Into<String>) -> Self {
        self.config.generation.model = model.into();
        self
    }

    pub fn generation_max_tokens(mut self, n: usize) -> Self {
        self.config.generation.max_tokens = n;
        self
    }

    pub fn generation_temperature(mut self, t: f32) -> Self {
        self.config.generation.temperature = Some(t.clamp(0.0, 2.0));
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.config.credentials = credentials;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ReportConfig, RexError> {
        for (role, m) in [("vision", &self.config.vision), ("generation", &self.config.generation)] {
            if m.provider.trim().is_empty() {
                return Err(RexError::InvalidConfig(format!("{role} provider must not be empty")));
            }
            if m.model.trim().is_empty() {
                return Err(RexError::InvalidConfig(format!("{role} model must not be empty")));
            }
            if m.max_tokens == 0 {
                return Err(RexError::InvalidConfig(format!("{role} max_tokens must be ≥ 1")));
            }
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_pipeline_contract() {
        let c = ReportConfig::default();
        assert_eq!(c.vision.max_tokens, 4000);
        assert_eq!(c.vision.temperature, None);
        assert_eq!(c.generation.max_tokens, 4000);
        assert_eq!(c.generation.temperature, Some(0.3));
    }

    #[test]
    fn builder_clamps_temperature() {
        let c = ReportConfig::builder()
            .generation_temperature(5.0)
            .build()
            .unwrap();
        assert_eq!(c.generation.temperature, Some(2.0));
    }

    #[test]
    fn builder_rejects_empty_model() {
        let err = ReportConfig::builder().vision_model("  ").build().unwrap_err();
        assert!(err.to_string().contains("vision model"), "got: {err}");
    }

    #[test]
    fn builder_rejects_zero_tokens() {
        let err = ReportConfig::builder()
            .generation_max_tokens(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, RexError::InvalidConfig(_)));
    }

    fn lookup<'a>(env: &'a HashMap<&'a str, &'a str>) -> impl Fn(&str) -> Option<String> + 'a {
        |k: &str| env.get(k).map(|v| v.to_string())
    }

    #[test]
    fn credentials_follow_configured_providers() {
        let env: HashMap<&str, &str> =
            [("OPENAI_API_KEY", "sk-vision"), ("ANTHROPIC_API_KEY", "sk-gen")].into();
        let creds = Credentials::from_lookup(
            &ModelSettings::vision_default(),
            &ModelSettings::generation_default(),
            lookup(&env),
        );
        assert_eq!(creds.vision_api_key.unwrap().expose(), "sk-vision");
        assert_eq!(creds.generation_api_key.unwrap().expose(), "sk-gen");
    }

    #[test]
    fn same_provider_shares_one_key() {
        let env: HashMap<&str, &str> = [("OPENAI_API_KEY", "sk-shared")].into();
        let mut generation = ModelSettings::generation_default();
        generation.provider = "openai".into();
        let creds =
            Credentials::from_lookup(&ModelSettings::vision_default(), &generation, lookup(&env));
        assert_eq!(creds.vision_api_key, creds.generation_api_key);
        assert!(creds.generation_api_key.is_some());
    }

    #[test]
    fn empty_values_are_absent() {
        let creds = Credentials::from_lookup(
            &ModelSettings::vision_default(),
            &ModelSettings::generation_default(),
            |_| Some("   ".to_string()),
        );
        assert_eq!(creds, Credentials::default());
    }

    #[test]
    fn local_providers_need_no_key() {
        assert_eq!(api_key_env("ollama"), None);
        assert_eq!(api_key_env("OpenAI"), Some("OPENAI_API_KEY"));
    }

    #[test]
    fn debug_redacts_keys() {
        let creds = Credentials {
            vision_api_key: Some(SecretKey::new("sk-very-secret")),
            generation_api_key: None,
        };
        let shown = format!("{:?}", ReportConfig::builder().credentials(creds).build().unwrap());
        assert!(!shown.contains("sk-very-secret"));
        assert!(shown.contains("redacted"));
    }
}
