//! Model interaction: the Text Extraction and Report Generation clients.
//!
//! Both clients are thin: prompt wording lives in [`crate::prompts`] and
//! the HTTP transport lives in `edgequake-llm`. What this module owns is
//! the request shape (one user message, token ceiling, temperature) and
//! the failure policy: every provider error becomes a [`StageError`] for
//! the caller to show, never a panic and never a retry.
//!
//! The session talks to the clients through the [`TextExtractor`] and
//! [`ReportGenerator`] traits so front-ends and tests can substitute their
//! own implementations. Underneath, both clients send through a
//! [`ChatBackend`], normally an `Arc<dyn LLMProvider>`.

use crate::config::{api_key_env, ModelSettings, ReportConfig, SecretKey};
use crate::error::StageError;
use crate::pipeline::encode::EncodedImage;
use crate::prompts::{pathology_report_prompt, EXTRACTION_PROMPT};
use edgequake_llm::{
    AnthropicProvider, ChatMessage, CompletionOptions, LLMProvider, OpenAIProvider,
    ProviderFactory,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Obtains raw text from an encoded medical-report image.
pub trait TextExtractor {
    /// Transcribe all visible text. The result is returned unmodified.
    fn extract(
        &self,
        image: &EncodedImage,
    ) -> impl Future<Output = Result<String, StageError>> + Send;
}

/// Turns reviewed text into a structured pathology report body.
pub trait ReportGenerator {
    /// Generate the report body. The result is returned unmodified.
    fn generate(&self, text: &str) -> impl Future<Output = Result<String, StageError>> + Send;
}

/// Transport for one chat request: messages and options in, reply text out.
///
/// Implemented for `Arc<dyn LLMProvider>`; the clients below are generic
/// over it so the exact request they send can be inspected.
pub trait ChatBackend: Send + Sync {
    fn send(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> impl Future<Output = Result<String, String>> + Send;
}

impl ChatBackend for Arc<dyn LLMProvider> {
    async fn send(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<String, String> {
        let response = LLMProvider::chat(self.as_ref(), messages, Some(options))
            .await
            .map_err(|e| e.to_string())?;
        debug!(
            "{}: {} input tokens, {} output tokens",
            self.model(),
            response.prompt_tokens,
            response.completion_tokens
        );
        Ok(response.content)
    }
}

/// A backend that is ready, or the reason it is not.
///
/// A missing API key must not stop the session from starting; the call
/// that needs the provider reports the problem instead.
#[derive(Clone)]
enum ProviderSlot<B> {
    Ready(B),
    Unavailable(String),
}

impl ProviderSlot<Arc<dyn LLMProvider>> {
    fn resolve(settings: &ModelSettings, key: Option<&SecretKey>) -> Self {
        match resolve_provider(settings, key) {
            Ok(p) => ProviderSlot::Ready(p),
            Err(reason) => {
                warn!("{} provider unavailable: {}", settings.provider, reason);
                ProviderSlot::Unavailable(reason)
            }
        }
    }
}

/// Build a provider for `settings` using the key from the configuration.
///
/// `openai` and `anthropic` are constructed directly from `key`. Other
/// providers go through the factory, which reads the key from its
/// environment variable; a configured key that differs from that variable
/// is rejected rather than silently replaced. Providers that need a key
/// fail fast when `key` is absent, with a message naming the variable.
pub fn resolve_provider(
    settings: &ModelSettings,
    key: Option<&SecretKey>,
) -> Result<Arc<dyn LLMProvider>, String> {
    let var = api_key_env(&settings.provider);
    if let (Some(var), None) = (var, key) {
        return Err(format!(
            "authentication failed: no API key for provider '{}' (set {var})",
            settings.provider
        ));
    }

    match (settings.provider.to_ascii_lowercase().as_str(), key, var) {
        ("openai", Some(key), _) => Ok(Arc::new(
            OpenAIProvider::new(key.expose()).with_model(&settings.model),
        )),
        ("anthropic", Some(key), _) => Ok(Arc::new(
            AnthropicProvider::new(key.expose()).with_model(&settings.model),
        )),
        (_, Some(key), Some(var))
            if std::env::var(var).ok().as_deref() != Some(key.expose()) =>
        {
            Err(format!(
                "provider '{}' reads its key from {var}, which does not hold the configured key",
                settings.provider
            ))
        }
        _ => ProviderFactory::create_llm_provider(&settings.provider, &settings.model)
            .map_err(|e| format!("provider '{}' is not configured: {e}", settings.provider)),
    }
}

/// Build `CompletionOptions` from model settings.
fn build_options(settings: &ModelSettings) -> CompletionOptions {
    CompletionOptions {
        temperature: settings.temperature,
        max_tokens: Some(settings.max_tokens),
        ..Default::default()
    }
}

/// The single user message of an extraction request.
fn extraction_messages(image: &EncodedImage) -> Vec<ChatMessage> {
    vec![ChatMessage::user_with_images(
        EXTRACTION_PROMPT,
        vec![image.to_image_data()],
    )]
}

/// The single user message of a generation request.
fn generation_messages(text: &str) -> Vec<ChatMessage> {
    vec![ChatMessage::user(pathology_report_prompt(text))]
}

// ── Text extraction ──────────────────────────────────────────────────────

/// [`TextExtractor`] backed by a vision-capable provider.
#[derive(Clone)]
pub struct VisionExtractor<B = Arc<dyn LLMProvider>> {
    provider: ProviderSlot<B>,
    settings: ModelSettings,
}

impl<B> VisionExtractor<B> {
    /// Wrap an already constructed backend.
    pub fn new(backend: B, settings: ModelSettings) -> Self {
        Self {
            provider: ProviderSlot::Ready(backend),
            settings,
        }
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }
}

impl VisionExtractor {
    /// Resolve the vision provider from the configuration.
    pub fn from_config(config: &ReportConfig) -> Self {
        Self {
            provider: ProviderSlot::resolve(
                &config.vision,
                config.credentials.vision_api_key.as_ref(),
            ),
            settings: config.vision.clone(),
        }
    }
}

impl<B: ChatBackend> TextExtractor for VisionExtractor<B> {
    async fn extract(&self, image: &EncodedImage) -> Result<String, StageError> {
        let backend = match &self.provider {
            ProviderSlot::Ready(b) => b,
            ProviderSlot::Unavailable(reason) => {
                return Err(StageError::Extraction {
                    detail: reason.clone(),
                })
            }
        };

        let messages = extraction_messages(image);
        let options = build_options(&self.settings);

        info!(
            "Extracting text with {} ({} image, {} bytes)",
            self.settings.model,
            image.media_type(),
            image.byte_len
        );
        let start = Instant::now();

        match backend.send(&messages, &options).await {
            Ok(text) => {
                debug!("Extraction done in {:?}", start.elapsed());
                Ok(text)
            }
            Err(detail) => {
                warn!("Extraction failed after {:?}: {}", start.elapsed(), detail);
                Err(StageError::Extraction { detail })
            }
        }
    }
}

// ── Report generation ────────────────────────────────────────────────────

/// [`ReportGenerator`] backed by a text-generation provider.
#[derive(Clone)]
pub struct ReportWriter<B = Arc<dyn LLMProvider>> {
    provider: ProviderSlot<B>,
    settings: ModelSettings,
}

impl<B> ReportWriter<B> {
    /// Wrap an already constructed backend.
    pub fn new(backend: B, settings: ModelSettings) -> Self {
        Self {
            provider: ProviderSlot::Ready(backend),
            settings,
        }
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }
}

impl ReportWriter {
    /// Resolve the generation provider from the configuration.
    pub fn from_config(config: &ReportConfig) -> Self {
        Self {
            provider: ProviderSlot::resolve(
                &config.generation,
                config.credentials.generation_api_key.as_ref(),
            ),
            settings: config.generation.clone(),
        }
    }
}

impl<B: ChatBackend> ReportGenerator for ReportWriter<B> {
    async fn generate(&self, text: &str) -> Result<String, StageError> {
        let backend = match &self.provider {
            ProviderSlot::Ready(b) => b,
            ProviderSlot::Unavailable(reason) => {
                return Err(StageError::Generation {
                    detail: reason.clone(),
                })
            }
        };

        let messages = generation_messages(text);
        let options = build_options(&self.settings);

        info!(
            "Generating report with {} ({} chars of input)",
            self.settings.model,
            text.len()
        );
        let start = Instant::now();

        match backend.send(&messages, &options).await {
            Ok(body) => {
                debug!("Generation done in {:?}", start.elapsed());
                Ok(body)
            }
            Err(detail) => {
                warn!("Generation failed after {:?}: {}", start.elapsed(), detail);
                Err(StageError::Generation { detail })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credentials;
    use crate::pipeline::encode::{encode_image, tests::sample_image};
    use std::sync::Mutex;

    /// One recorded request: the messages and the two options we set.
    struct Sent {
        messages: Vec<ChatMessage>,
        temperature: Option<f32>,
        max_tokens: Option<usize>,
    }

    /// Backend that records each request and answers with a fixed reply.
    struct Recorder {
        reply: Result<String, String>,
        sent: Mutex<Vec<Sent>>,
    }

    impl Recorder {
        fn replying(reply: Result<&str, &str>) -> Self {
            Self {
                reply: reply.map(str::to_string).map_err(str::to_string),
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    impl ChatBackend for Recorder {
        async fn send(
            &self,
            messages: &[ChatMessage],
            options: &CompletionOptions,
        ) -> Result<String, String> {
            self.sent.lock().unwrap().push(Sent {
                messages: messages.to_vec(),
                temperature: options.temperature,
                max_tokens: options.max_tokens,
            });
            self.reply.clone()
        }
    }

    #[test]
    fn build_options_vision_defaults() {
        let opts = build_options(&ModelSettings::vision_default());
        assert_eq!(opts.temperature, None);
        assert_eq!(opts.max_tokens, Some(4000));
    }

    #[test]
    fn build_options_generation_defaults() {
        let opts = build_options(&ModelSettings::generation_default());
        assert_eq!(opts.temperature, Some(0.3));
        assert_eq!(opts.max_tokens, Some(4000));
    }

    #[test]
    fn missing_key_is_an_auth_error() {
        let err = resolve_provider(&ModelSettings::vision_default(), None)
            .err()
            .expect("no key must fail");
        assert!(err.contains("OPENAI_API_KEY"), "got: {err}");
        assert!(err.contains("authentication"));
    }

    #[test]
    fn configured_key_builds_provider_without_environment() {
        let key = SecretKey::new("sk-from-config");

        let vision = resolve_provider(&ModelSettings::vision_default(), Some(&key))
            .expect("explicit openai key must be enough");
        assert_eq!(vision.model(), "gpt-4o-mini");

        let generation = resolve_provider(&ModelSettings::generation_default(), Some(&key))
            .expect("explicit anthropic key must be enough");
        assert_eq!(generation.model(), "claude-3-sonnet-20240229");
    }

    #[test]
    fn credentials_alone_make_clients_ready() {
        let config = ReportConfig::builder()
            .credentials(Credentials {
                vision_api_key: Some(SecretKey::new("sk-vision")),
                generation_api_key: Some(SecretKey::new("sk-generation")),
            })
            .build()
            .unwrap();

        assert!(matches!(
            VisionExtractor::from_config(&config).provider,
            ProviderSlot::Ready(_)
        ));
        assert!(matches!(
            ReportWriter::from_config(&config).provider,
            ProviderSlot::Ready(_)
        ));
    }

    #[test]
    fn configured_key_not_in_environment_is_rejected() {
        let mut settings = ModelSettings::vision_default();
        settings.provider = "gemini".into();
        settings.model = "gemini-2.0-flash".into();

        let err = resolve_provider(&settings, Some(&SecretKey::new("configured-gemini-key")))
            .err()
            .expect("mismatched key must fail");
        assert!(err.contains("GEMINI_API_KEY"), "got: {err}");
    }

    #[tokio::test]
    async fn extraction_sends_prompt_and_high_detail_image() {
        let image = encode_image(&sample_image(image::ImageFormat::Png)).unwrap();
        let extractor = VisionExtractor::new(
            Recorder::replying(Ok("Hemoglobin: 13.2 g/dL")),
            ModelSettings::vision_default(),
        );

        let text = extractor.extract(&image).await.unwrap();
        assert_eq!(text, "Hemoglobin: 13.2 g/dL");

        let sent = extractor_sent(&extractor);
        assert_eq!(sent.len(), 1);
        let request = &sent[0];
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.messages[0].content, EXTRACTION_PROMPT);

        let shown = format!("{:?}", request.messages[0]);
        assert!(shown.contains("User"), "got: {shown}");
        assert!(shown.contains(&image.data));
        assert!(shown.contains("image/png"));
        assert!(shown.contains("\"high\""));

        assert_eq!(request.temperature, None);
        assert_eq!(request.max_tokens, Some(4000));
    }

    #[tokio::test]
    async fn generation_sends_report_prompt_with_low_temperature() {
        let writer = ReportWriter::new(
            Recorder::replying(Ok("## Diagnosis\nNormal.")),
            ModelSettings::generation_default(),
        );

        let body = writer.generate("Hemoglobin: 13.5 g/dL").await.unwrap();
        assert_eq!(body, "## Diagnosis\nNormal.");

        let sent = writer_sent(&writer);
        assert_eq!(sent.len(), 1);
        let request = &sent[0];
        assert_eq!(request.messages.len(), 1);
        assert_eq!(
            request.messages[0].content,
            pathology_report_prompt("Hemoglobin: 13.5 g/dL")
        );
        assert_eq!(request.temperature, Some(0.3));
        assert_eq!(request.max_tokens, Some(4000));
    }

    #[tokio::test]
    async fn provider_errors_map_to_stage_errors() {
        let image = encode_image(&sample_image(image::ImageFormat::Jpeg)).unwrap();

        let extractor = VisionExtractor::new(
            Recorder::replying(Err("429 Too Many Requests")),
            ModelSettings::vision_default(),
        );
        let err = extractor.extract(&image).await.unwrap_err();
        assert_eq!(
            err,
            StageError::Extraction {
                detail: "429 Too Many Requests".into()
            }
        );

        let writer = ReportWriter::new(
            Recorder::replying(Err("invalid x-api-key")),
            ModelSettings::generation_default(),
        );
        let err = writer.generate("text").await.unwrap_err();
        assert_eq!(
            err,
            StageError::Generation {
                detail: "invalid x-api-key".into()
            }
        );
    }

    fn extractor_sent(extractor: &VisionExtractor<Recorder>) -> Vec<Sent> {
        match &extractor.provider {
            ProviderSlot::Ready(r) => std::mem::take(&mut *r.sent.lock().unwrap()),
            ProviderSlot::Unavailable(_) => Vec::new(),
        }
    }

    fn writer_sent(writer: &ReportWriter<Recorder>) -> Vec<Sent> {
        match &writer.provider {
            ProviderSlot::Ready(r) => std::mem::take(&mut *r.sent.lock().unwrap()),
            ProviderSlot::Unavailable(_) => Vec::new(),
        }
    }

    #[tokio::test]
    async fn unavailable_extractor_reports_extraction_error() {
        let config = ReportConfig::builder()
            .credentials(Credentials::default())
            .build()
            .unwrap();
        let extractor = VisionExtractor::from_config(&config);
        let image = encode_image(&sample_image(image::ImageFormat::Png)).unwrap();

        let err = extractor.extract(&image).await.unwrap_err();
        assert!(matches!(err, StageError::Extraction { .. }));
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[tokio::test]
    async fn unavailable_writer_reports_generation_error() {
        let writer = ReportWriter::from_config(&ReportConfig::default());
        let err = writer.generate("Hemoglobin: 13.5 g/dL").await.unwrap_err();
        assert!(matches!(err, StageError::Generation { .. }));
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));
    }
}
