//! Rate-limited AI client.
//!
//! Wraps a [`GenerationTransport`] behind the shared [`RateLimiter`], pauses for
//! a random jitter after every successful call, and never lets a transport
//! error escape as anything other than a [`ProcessingError`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::prompts;
use super::rate_limiter::RateLimiter;
use crate::config::AiConfig;
use crate::constants::{AI_JITTER_MAX_MS, AI_JITTER_MIN_MS};
use crate::error::{ErrorKind, ProcessingError};

/// Sampling parameters sent with every generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub max_output_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_k: 40,
            top_p: 0.95,
            max_output_tokens: 2048,
        }
    }
}

impl From<&AiConfig> for GenerationConfig {
    fn from(config: &AiConfig) -> Self {
        Self {
            temperature: config.temperature,
            top_k: config.top_k,
            top_p: config.top_p,
            max_output_tokens: config.max_output_tokens,
        }
    }
}

/// The single primitive an LLM provider has to offer.
#[async_trait]
pub trait GenerationTransport: Send + Sync {
    async fn generate(&self, prompt: &str, config: &GenerationConfig) -> anyhow::Result<String>;
}

/// Inclusive range of the post-call pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JitterBand {
    pub min: Duration,
    pub max: Duration,
}

impl Default for JitterBand {
    fn default() -> Self {
        Self::from_millis(AI_JITTER_MIN_MS, AI_JITTER_MAX_MS)
    }
}

impl JitterBand {
    pub fn from_millis(min_ms: u64, max_ms: u64) -> Self {
        let (min_ms, max_ms) = if min_ms <= max_ms {
            (min_ms, max_ms)
        } else {
            (max_ms, min_ms)
        };
        Self {
            min: Duration::from_millis(min_ms),
            max: Duration::from_millis(max_ms),
        }
    }

    /// No pause at all.
    #[cfg(test)]
    pub fn none() -> Self {
        Self::from_millis(0, 0)
    }

    /// Draw a uniformly random duration within the band.
    pub fn sample(&self) -> Duration {
        let min = self.min.as_millis() as u64;
        let span = (self.max.as_millis() as u64).saturating_sub(min);
        if span == 0 {
            return self.min;
        }

        let mut bytes = [0u8; 8];
        let offset = match getrandom::fill(&mut bytes) {
            Ok(()) => u64::from_le_bytes(bytes) % (span + 1),
            // Without an entropy source, fall back to the middle of the band
            Err(_) => span / 2,
        };
        Duration::from_millis(min + offset)
    }
}

#[derive(Clone)]
pub struct AiClient {
    transport: Arc<dyn GenerationTransport>,
    limiter: Arc<RateLimiter>,
    config: GenerationConfig,
    jitter: JitterBand,
}

impl AiClient {
    pub fn new(
        transport: Arc<dyn GenerationTransport>,
        limiter: Arc<RateLimiter>,
        config: GenerationConfig,
        jitter: JitterBand,
    ) -> Self {
        Self {
            transport,
            limiter,
            config,
            jitter,
        }
    }

    #[cfg(test)]
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Run a raw prompt through the model.
    pub async fn generate_content(&self, prompt: &str) -> Result<String, ProcessingError> {
        self.call(prompt, "AI generation failed").await
    }

    /// Analyze one email against agent instructions and an output schema.
    ///
    /// `context_schema` pairs field names with their expected types. The
    /// to-do pipeline only needs plain generation.
    #[allow(dead_code)]
    pub async fn analyze_email(
        &self,
        subject: &str,
        body: &str,
        agent_prompt: &str,
        context_schema: &[(String, String)],
    ) -> Result<String, ProcessingError> {
        let prompt = prompts::email_analysis_prompt(subject, body, agent_prompt, context_schema);
        tracing::debug!("Analyzing email '{}'", subject);
        self.call(&prompt, "Email analysis failed").await
    }

    async fn call(&self, prompt: &str, context: &str) -> Result<String, ProcessingError> {
        self.limiter.acquire().await;
        tracing::debug!(
            "Acquired AI rate limit slot, {} remaining",
            self.limiter.remaining_requests().await
        );

        match self.transport.generate(prompt, &self.config).await {
            Ok(text) => {
                let pause = self.jitter.sample();
                tracing::debug!("AI request completed, pausing {:?}", pause);
                tokio::time::sleep(pause).await;
                Ok(text)
            }
            Err(e) => {
                tracing::warn!("{}: {:#}", context, e);
                Err(ProcessingError::classify(context, e, ErrorKind::Api))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;
    use crate::pipeline::testing::FakeTransport;
    use tokio::time::Instant;

    fn client(transport: Arc<FakeTransport>, jitter: JitterBand) -> AiClient {
        AiClient::new(
            transport,
            Arc::new(RateLimiter::per_minute(5)),
            GenerationConfig::default(),
            jitter,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_consumes_slot_and_pauses_within_band() {
        let transport = Arc::new(FakeTransport::replying(["Pay rent"]));
        let ai = client(Arc::clone(&transport), JitterBand::from_millis(2000, 3000));

        let start = Instant::now();
        let text = ai.generate_content("prompt").await.unwrap();
        let elapsed = Instant::now() - start;

        assert_eq!(text, "Pay rent");
        assert!(elapsed >= Duration::from_millis(2000));
        assert!(elapsed <= Duration::from_millis(3000));
        assert_eq!(ai.limiter().remaining_requests().await, 4);
        assert_eq!(transport.prompts(), vec!["prompt".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failure_becomes_processing_error() {
        let transport = Arc::new(FakeTransport::failing(|| {
            anyhow::Error::new(GatewayError::Rejected {
                status: 429,
                body: "quota".into(),
            })
        }));
        let ai = client(Arc::clone(&transport), JitterBand::default());

        let start = Instant::now();
        let err = ai.generate_content("prompt").await.unwrap_err();

        assert_eq!(err.kind, ErrorKind::Api);
        assert!(err.message.contains("quota"));
        // Failures skip the jitter pause but still used a slot
        assert_eq!(Instant::now(), start);
        assert_eq!(ai.limiter().remaining_requests().await, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_analyze_email_builds_structured_prompt() {
        let transport = Arc::new(FakeTransport::replying([r#"{"amount": "42"}"#]));
        let ai = client(Arc::clone(&transport), JitterBand::none());
        let schema = vec![("amount".to_string(), "number".to_string())];

        let text = ai
            .analyze_email("Invoice", "Please pay 42", "Extract the amount", &schema)
            .await
            .unwrap();

        assert_eq!(text, r#"{"amount": "42"}"#);
        let prompt = &transport.prompts()[0];
        assert!(prompt.contains("Extract the amount"));
        assert!(prompt.contains("- amount (number)"));
        assert!(prompt.contains("Subject: Invoice"));
        assert!(prompt.contains("Please pay 42"));
    }

    #[test]
    fn test_jitter_band_sampling() {
        let band = JitterBand::from_millis(3000, 2000);
        assert_eq!(band.min, Duration::from_millis(2000));
        for _ in 0..50 {
            let sample = band.sample();
            assert!(sample >= band.min && sample <= band.max);
        }
        assert_eq!(JitterBand::none().sample(), Duration::ZERO);
    }
}
