use std::fs;
use std::path::Path;

use anyhow::Context;
use reqwest::blocking::multipart::{Form as MultipartForm, Part as MultipartPart};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Value};
use tracing::info;

use crate::config::EngineConfig;
use crate::error::GenerationError;

/// Externally hosted result of a provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderAsset {
    pub url: String,
    pub model: String,
}

/// The three image operations a provider exposes. Each call is a single
/// billed request; implementations never retry.
pub trait ImageProvider: Send + Sync {
    fn name(&self) -> &str;

    fn generate(
        &self,
        prompt: &str,
        size: &str,
        quality: &str,
    ) -> Result<ProviderAsset, GenerationError>;

    /// `image` must be a canonical RGBA PNG on disk.
    fn create_variation(&self, image: &Path, size: &str) -> Result<ProviderAsset, GenerationError>;

    /// Transparent regions of `mask` mark what gets regenerated.
    fn edit(
        &self,
        image: &Path,
        mask: &Path,
        prompt: &str,
        size: &str,
    ) -> Result<ProviderAsset, GenerationError>;
}

/// OpenAI-compatible Images API (`/images/generations`, `/images/variations`,
/// `/images/edits`) returning hosted URLs.
pub struct OpenAiImagesProvider {
    api_base: String,
    api_key: String,
    http: HttpClient,
    generation_model: String,
    image_model: String,
}

impl OpenAiImagesProvider {
    pub fn new(config: &EngineConfig) -> anyhow::Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .context("OPENAI_API_KEY or OPENAI_API_KEY_BACKUP not set")?;
        let http = HttpClient::builder()
            .timeout(config.provider_timeout)
            .build()
            .context("failed building provider client")?;
        Ok(Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key,
            http,
            generation_model: config.generation_model.clone(),
            image_model: config.image_model.clone(),
        })
    }

    fn post_json(&self, operation: &str, payload: &Value) -> Result<Value, GenerationError> {
        let endpoint = format!("{}/{operation}", self.api_base);
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(payload)
            .send()
            .map_err(|err| {
                GenerationError::provider(format!("OpenAI {operation} request failed: {err}"))
            })?;
        response_json_or_error(operation, response)
    }

    fn post_multipart(&self, operation: &str, form: MultipartForm) -> Result<Value, GenerationError> {
        let endpoint = format!("{}/{operation}", self.api_base);
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .map_err(|err| {
                GenerationError::provider(format!("OpenAI {operation} request failed: {err}"))
            })?;
        response_json_or_error(operation, response)
    }

    fn finish(&self, operation: &str, payload: &Value, model: &str) -> Result<ProviderAsset, GenerationError> {
        let url = first_image_url(operation, payload)?;
        info!(operation, model, "provider call succeeded");
        Ok(ProviderAsset {
            url,
            model: model.to_string(),
        })
    }
}

impl ImageProvider for OpenAiImagesProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn generate(
        &self,
        prompt: &str,
        size: &str,
        quality: &str,
    ) -> Result<ProviderAsset, GenerationError> {
        let operation = "images/generations";
        info!(model = %self.generation_model, prompt = %truncate_text(prompt, 50), "generating image");
        let payload = json!({
            "model": self.generation_model,
            "prompt": prompt,
            "size": size,
            "quality": quality,
            "n": 1,
            "response_format": "url",
        });
        let response = self.post_json(operation, &payload)?;
        self.finish(operation, &response, &self.generation_model)
    }

    fn create_variation(&self, image: &Path, size: &str) -> Result<ProviderAsset, GenerationError> {
        let operation = "images/variations";
        info!(model = %self.image_model, image = %image.display(), "generating variation");
        let form = MultipartForm::new()
            .text("model", self.image_model.clone())
            .text("n", "1")
            .text("size", size.to_string())
            .text("response_format", "url")
            .part("image", png_part(image, "image.png")?);
        let response = self.post_multipart(operation, form)?;
        self.finish(operation, &response, &self.image_model)
    }

    fn edit(
        &self,
        image: &Path,
        mask: &Path,
        prompt: &str,
        size: &str,
    ) -> Result<ProviderAsset, GenerationError> {
        let operation = "images/edits";
        info!(model = %self.image_model, prompt = %truncate_text(prompt, 50), "editing image");
        let form = MultipartForm::new()
            .text("model", self.image_model.clone())
            .text("prompt", prompt.to_string())
            .text("n", "1")
            .text("size", size.to_string())
            .text("response_format", "url")
            .part("image", png_part(image, "image.png")?)
            .part("mask", png_part(mask, "mask.png")?);
        let response = self.post_multipart(operation, form)?;
        self.finish(operation, &response, &self.image_model)
    }
}

fn png_part(path: &Path, fallback_name: &str) -> Result<MultipartPart, GenerationError> {
    let bytes = fs::read(path).map_err(|err| {
        GenerationError::staging(format!("failed reading {}: {err}", path.display()))
    })?;
    let file_name = path
        .file_name()
        .and_then(|value| value.to_str())
        .unwrap_or(fallback_name)
        .to_string();
    MultipartPart::bytes(bytes)
        .file_name(file_name)
        .mime_str("image/png")
        .map_err(|err| GenerationError::staging(format!("invalid upload mime: {err}")))
}

fn response_json_or_error(operation: &str, response: HttpResponse) -> Result<Value, GenerationError> {
    let status = response.status();
    let code = status.as_u16();
    let body = response.text().map_err(|err| {
        GenerationError::provider(format!("OpenAI {operation} response body read failed: {err}"))
    })?;
    if !status.is_success() {
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|parsed| {
                parsed
                    .pointer("/error/message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or_else(|| truncate_text(&body, 512));
        return Err(GenerationError::provider(format!(
            "OpenAI {operation} failed ({code}): {message}"
        )));
    }
    serde_json::from_str(&body).map_err(|err| {
        GenerationError::provider(format!("OpenAI {operation} returned invalid JSON: {err}"))
    })
}

fn first_image_url(operation: &str, payload: &Value) -> Result<String, GenerationError> {
    payload
        .pointer("/data/0/url")
        .and_then(Value::as_str)
        .filter(|url| !url.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| GenerationError::provider(format!("OpenAI {operation} returned no image URL")))
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
