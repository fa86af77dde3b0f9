//! Vision-LLM adapters for the page structurer and the question reader.
//!
//! The provider is resolved on first use, not at construction: a server that
//! only imports JSON never needs API keys.

use super::{PageStructurer, QuestionReader};
use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::model::StructuredPage;
use crate::pipeline::encode::{encode_bytes, read_page};
use crate::pipeline::llm::{complete_page, VlmSettings};
use crate::pipeline::postprocess::parse_structured_page;
use crate::prompts::{
    MARK_SCHEME_INSTRUCTION, MARK_SCHEME_PROMPT, QUESTION_PAPER_INSTRUCTION, QUESTION_PAPER_PROMPT,
};
use async_trait::async_trait;
use edgequake_llm::{LLMProvider, ProviderFactory};
use once_cell::sync::OnceCell;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

const DEFAULT_MODEL: &str = "gpt-4o";

/// Provider selection copied from the config, resolved once.
struct LazyProvider {
    provider: Option<Arc<dyn LLMProvider>>,
    provider_name: Option<String>,
    model: Option<String>,
    resolved: OnceCell<Arc<dyn LLMProvider>>,
}

impl LazyProvider {
    fn from_config(config: &IngestConfig) -> Self {
        Self {
            provider: config.provider.clone(),
            provider_name: config.provider_name.clone(),
            model: config.model.clone(),
            resolved: OnceCell::new(),
        }
    }

    fn get(&self) -> Result<&Arc<dyn LLMProvider>, IngestError> {
        self.resolved.get_or_try_init(|| {
            resolve_provider(
                self.provider.as_ref(),
                self.provider_name.as_deref(),
                self.model.as_deref(),
            )
        })
    }
}

/// Page structurer backed by a vision LLM.
pub struct VlmStructurer {
    provider: LazyProvider,
    prompt: String,
    settings: VlmSettings,
}

impl VlmStructurer {
    pub fn from_config(config: &IngestConfig) -> Self {
        Self {
            provider: LazyProvider::from_config(config),
            prompt: config
                .mark_scheme_prompt
                .clone()
                .unwrap_or_else(|| MARK_SCHEME_PROMPT.to_string()),
            settings: VlmSettings::from_config(config),
        }
    }
}

#[async_trait]
impl PageStructurer for VlmStructurer {
    async fn structure(&self, image: &Path) -> Result<StructuredPage, IngestError> {
        let provider = self.provider.get()?;
        let bytes = read_page(image).await?;
        let target = image.display().to_string();
        let reply = complete_page(
            provider,
            &self.prompt,
            MARK_SCHEME_INSTRUCTION,
            encode_bytes(&bytes),
            &target,
            &self.settings,
        )
        .await?;
        debug!("{}: structurer reply {} chars", target, reply.len());
        parse_structured_page(&reply, &target)
    }
}

/// Question reader backed by a vision LLM.
pub struct VlmQuestionReader {
    provider: LazyProvider,
    prompt: String,
    settings: VlmSettings,
}

impl VlmQuestionReader {
    pub fn from_config(config: &IngestConfig) -> Self {
        Self {
            provider: LazyProvider::from_config(config),
            prompt: config
                .question_prompt
                .clone()
                .unwrap_or_else(|| QUESTION_PAPER_PROMPT.to_string()),
            settings: VlmSettings::from_config(config),
        }
    }
}

#[async_trait]
impl QuestionReader for VlmQuestionReader {
    async fn read_questions(&self, image: &Path) -> Result<String, IngestError> {
        let provider = self.provider.get()?;
        let bytes = read_page(image).await?;
        complete_page(
            provider,
            &self.prompt,
            QUESTION_PAPER_INSTRUCTION,
            encode_bytes(&bytes),
            &image.display().to_string(),
            &self.settings,
        )
        .await
    }
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, IngestError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        IngestError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. a pre-built provider;
/// 2. a named provider plus optional model;
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL` when both are set;
/// 4. OpenAI when `OPENAI_API_KEY` is set;
/// 5. `ProviderFactory::from_env` auto-detection.
fn resolve_provider(
    provider: Option<&Arc<dyn LLMProvider>>,
    provider_name: Option<&str>,
    model: Option<&str>,
) -> Result<Arc<dyn LLMProvider>, IngestError> {
    if let Some(provider) = provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(name) = provider_name {
        return create_vision_provider(name, model.unwrap_or(DEFAULT_MODEL));
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            return create_vision_provider("openai", model.unwrap_or(DEFAULT_MODEL));
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| IngestError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a structurer command.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
