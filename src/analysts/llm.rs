//! LLM-backed scoring
//!
//! OpenAI-style chat completion with a JSON response contract. Provider
//! base URLs follow the universe's tier table; unknown providers fall back
//! to an OpenAI-compatible endpoint.

use async_trait::async_trait;
use reqwest::Client;

use super::{Assessment, AssessmentContext, ScoringCapability};
use crate::config::LlmConfig;
use crate::error::{PipelineError, Result};
use crate::types::Direction;

pub struct LlmScorer {
    http: Client,
    config: LlmConfig,
}

impl LlmScorer {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }

    fn base_url(&self, provider: &str) -> String {
        match provider.to_lowercase().as_str() {
            "deepseek" => "https://api.deepseek.com".to_string(),
            "ollama" => self
                .config
                .base_url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            _ => self
                .config
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com".to_string()),
        }
    }

    fn build_prompt(ctx: &AssessmentContext) -> String {
        format!(
            "You are an analyst assessing a detected signal about {symbol}.\n\
             Perspective: {perspective}\n\
             Instructions: {instructions}\n\
             Target context: {context}\n\
             Signal ({direction}): {content}\n\n\
             Respond with JSON only:\n\
             {{\"direction\": \"bullish|bearish|neutral\", \"confidence\": 0.0-1.0,\n\
               \"reasoning\": \"...\", \"key_factors\": [\"...\"], \"risks\": [\"...\"]}}",
            symbol = ctx.target_symbol,
            perspective = ctx.analyst_perspective,
            instructions = ctx.tier_instructions,
            context = ctx.target_context.as_deref().unwrap_or("none"),
            direction = ctx.signal_direction.as_str(),
            content = ctx.signal_content,
        )
    }

    async fn call(&self, ctx: &AssessmentContext) -> Result<String> {
        let base_url = self.base_url(&ctx.tier_model.provider);
        let request = serde_json::json!({
            "model": ctx.tier_model.model,
            "messages": [{"role": "user", "content": Self::build_prompt(ctx)}],
            "response_format": {"type": "json_object"}
        });

        let mut req = self
            .http
            .post(format!("{}/v1/chat/completions", base_url))
            .header("content-type", "application/json");
        if !self.config.api_key.is_empty() {
            req = req.header("Authorization", format!("Bearer {}", self.config.api_key));
        }

        let resp: serde_json::Value = req.json(&request).send().await?.json().await?;
        resp["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| PipelineError::Llm("empty completion response".into()))
    }

    fn parse(response: &str) -> Result<Assessment> {
        // Models occasionally wrap the JSON in prose; take the outermost
        // object.
        let json_str = match (response.find('{'), response.rfind('}')) {
            (Some(start), Some(end)) if end > start => &response[start..=end],
            _ => response,
        };
        let parsed: serde_json::Value = serde_json::from_str(json_str)
            .map_err(|e| PipelineError::Llm(format!("unparseable assessment: {}", e)))?;

        let direction = match parsed["direction"].as_str().unwrap_or("neutral") {
            "bullish" => Direction::Bullish,
            "bearish" => Direction::Bearish,
            _ => Direction::Neutral,
        };
        let collect = |key: &str| -> Vec<String> {
            parsed[key]
                .as_array()
                .map(|a| {
                    a.iter()
                        .filter_map(|v| v.as_str().map(|s| s.to_string()))
                        .collect()
                })
                .unwrap_or_default()
        };

        Ok(Assessment {
            direction,
            confidence: parsed["confidence"].as_f64().unwrap_or(0.5).clamp(0.0, 1.0),
            reasoning: parsed["reasoning"].as_str().unwrap_or("").to_string(),
            key_factors: collect("key_factors"),
            risks: collect("risks"),
        })
    }
}

#[async_trait]
impl ScoringCapability for LlmScorer {
    async fn assess(&self, ctx: &AssessmentContext) -> Result<Assessment> {
        let response = self.call(ctx).await?;
        Self::parse(&response)
    }
}
