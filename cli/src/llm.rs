use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use crate::config::LlmConfig;
use macrolog_core::ai::{
    ChatCompletionRequest, ChatCompletionResponse, GenerateContentRequest,
    GenerateContentResponse, canned_meal, parse_meal_result,
};
use macrolog_core::models::{AiMealResult, AiProvider, MacroNeeds};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// One step in the suggestion chain.
#[async_trait]
pub trait MealGenerator: Send + Sync {
    fn provider(&self) -> AiProvider;
    async fn generate(&self, prompt: &str, needs: Option<&MacroNeeds>) -> Result<AiMealResult>;
}

fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(format!(
            "macrolog/{} (nutrition tracker)",
            env!("CARGO_PKG_VERSION")
        ))
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(5))
        .build()
        .context("Failed to build HTTP client")
}

// Non-2xx bodies are truncated so a provider's HTML error page does not flood the logs.
async fn read_success_body(resp: reqwest::Response, provider: &str) -> Result<String> {
    let status = resp.status();
    let body = resp
        .text()
        .await
        .with_context(|| format!("Failed to read {provider} response"))?;
    if !status.is_success() {
        let snippet: String = body.chars().take(200).collect();
        bail!("{provider} returned {status}: {snippet}");
    }
    Ok(body)
}

pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(api_key: &str, model: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: OPENAI_BASE_URL.to_string(),
        })
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl MealGenerator for OpenAiClient {
    fn provider(&self) -> AiProvider {
        AiProvider::OpenAi
    }

    #[instrument(skip(self, prompt, needs), fields(model = %self.model))]
    async fn generate(&self, prompt: &str, needs: Option<&MacroNeeds>) -> Result<AiMealResult> {
        let request = ChatCompletionRequest::meal(&self.model, prompt, needs);
        debug!("Sending request to OpenAI");
        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to reach OpenAI API")?;
        let body = read_success_body(resp, "OpenAI").await?;
        let parsed: ChatCompletionResponse =
            serde_json::from_str(&body).context("Failed to parse OpenAI response")?;
        let text = parsed.first_text().context("OpenAI returned no content")?;
        parse_meal_result(text)
    }
}

pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: &str, model: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: GEMINI_BASE_URL.to_string(),
        })
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl MealGenerator for GeminiClient {
    fn provider(&self) -> AiProvider {
        AiProvider::Gemini
    }

    #[instrument(skip(self, prompt, needs), fields(model = %self.model))]
    async fn generate(&self, prompt: &str, needs: Option<&MacroNeeds>) -> Result<AiMealResult> {
        let request = GenerateContentRequest::meal(prompt, needs);
        debug!("Sending request to Gemini");
        let resp = self
            .client
            .post(format!(
                "{}/models/{}:generateContent",
                self.base_url, self.model
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to reach Gemini API")?;
        let body = read_success_body(resp, "Gemini").await?;
        let parsed: GenerateContentResponse =
            serde_json::from_str(&body).context("Failed to parse Gemini response")?;
        if let Some(err) = parsed.error {
            bail!("Gemini API error: {}", err.message);
        }
        let text = parsed.first_text().context("Gemini returned no content")?;
        parse_meal_result(&text)
    }
}

/// Build the provider chain in priority order: OpenAI, then Gemini. Providers
/// without a key are left out.
pub fn generators_from_config(config: &LlmConfig) -> Result<Vec<Box<dyn MealGenerator>>> {
    let timeout = Duration::from_secs(config.llm_timeout.max(1));
    let mut chain: Vec<Box<dyn MealGenerator>> = Vec::new();
    if let Some(key) = config.openai_key() {
        chain.push(Box::new(OpenAiClient::new(key, &config.openai_model, timeout)?));
    } else {
        debug!("OPENAI_API_KEY not set; skipping OpenAI");
    }
    if let Some(key) = config.gemini_key() {
        chain.push(Box::new(GeminiClient::new(key, &config.gemini_model, timeout)?));
    } else {
        debug!("GEMINI_API_KEY not set; skipping Gemini");
    }
    if chain.is_empty() {
        warn!("No AI provider configured; suggestions will use built-in meals");
    }
    Ok(chain)
}

/// Try each generator once, in order. When all of them fail the canned meal
/// is returned, so this never errors.
pub async fn generate_meal(
    generators: &[Box<dyn MealGenerator>],
    prompt: &str,
    needs: Option<&MacroNeeds>,
) -> (AiMealResult, AiProvider) {
    for generator in generators {
        let provider = generator.provider();
        match generator.generate(prompt, needs).await {
            Ok(meal) => {
                info!(provider = provider.as_str(), meal = %meal.name, "Generated AI meal");
                return (meal, provider);
            }
            Err(e) => {
                warn!(
                    provider = provider.as_str(),
                    error = %format!("{e:#}"),
                    "AI provider failed"
                );
            }
        }
    }
    info!("Falling back to built-in meal");
    (
        canned_meal(prompt, needs, &mut rand::rng()),
        AiProvider::Fallback,
    )
}
