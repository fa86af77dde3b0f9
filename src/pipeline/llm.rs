//! VLM interaction: send one page image with a system prompt, return the
//! raw reply text.
//!
//! Prompt text lives in [`crate::prompts`]; reply parsing lives in
//! [`super::postprocess`]. This module owns only retry, backoff and timeout.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 errors from LLM APIs are transient. Exponential backoff
//! (`retry_backoff_ms * 2^attempt`) with 500 ms base and 3 retries waits
//! 500 ms → 1 s → 2 s. A call that exceeds `api_timeout_secs` is not retried:
//! a hung provider is treated like a hung process tool and fails the run.

use crate::config::IngestConfig;
use crate::error::IngestError;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Per-call VLM settings copied out of [`IngestConfig`].
#[derive(Debug, Clone)]
pub struct VlmSettings {
    pub temperature: f32,
    pub max_tokens: usize,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub api_timeout_secs: u64,
}

impl VlmSettings {
    pub fn from_config(config: &IngestConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
            api_timeout_secs: config.api_timeout_secs,
        }
    }
}

/// Ask the VLM about one page image.
///
/// The request is a system message followed by a user turn carrying the
/// image and a one-line instruction.
pub async fn complete_page(
    provider: &Arc<dyn LLMProvider>,
    system_prompt: &str,
    instruction: &str,
    image_data: ImageData,
    target: &str,
    settings: &VlmSettings,
) -> Result<String, IngestError> {
    let start = Instant::now();
    let messages = vec![
        ChatMessage::system(system_prompt),
        ChatMessage::user_with_images(instruction, vec![image_data]),
    ];
    let options = build_options(settings);

    let mut last_err: Option<String> = None;

    for attempt in 0..=settings.max_retries {
        if attempt > 0 {
            let backoff = backoff_ms(settings.retry_backoff_ms, attempt);
            warn!(
                "{}: retry {}/{} after {}ms",
                target, attempt, settings.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        let call = provider.chat(&messages, Some(&options));
        let result = timeout(Duration::from_secs(settings.api_timeout_secs), call)
            .await
            .map_err(|_| IngestError::LlmTimeout {
                target: target.to_string(),
                secs: settings.api_timeout_secs,
            })?;

        match result {
            Ok(response) => {
                debug!(
                    "{}: {} input tokens, {} output tokens, {:?}",
                    target,
                    response.prompt_tokens,
                    response.completion_tokens,
                    start.elapsed()
                );
                return Ok(response.content);
            }
            Err(e) => {
                let err_msg = format!("{}", e);
                warn!("{}: attempt {} failed: {}", target, attempt + 1, err_msg);
                last_err = Some(err_msg);
            }
        }
    }

    Err(IngestError::LlmApiError {
        target: target.to_string(),
        retries: settings.max_retries,
        message: last_err.unwrap_or_else(|| "Unknown error".to_string()),
    })
}

/// Delay before retry `attempt` (1-based), saturating instead of overflowing.
fn backoff_ms(base_ms: u64, attempt: u32) -> u64 {
    match 2u64.checked_pow(attempt.saturating_sub(1)) {
        Some(factor) => base_ms.saturating_mul(factor),
        None if base_ms == 0 => 0,
        None => u64::MAX,
    }
}

fn build_options(settings: &VlmSettings) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(settings.temperature),
        max_tokens: Some(settings.max_tokens),
        ..Default::default()
    }
}
