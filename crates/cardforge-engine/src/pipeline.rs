use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use cardforge_contracts::events::{EventLog, GenerationEvent, RequestEvents};
use cardforge_contracts::generation::{
    GenerationFailure, GenerationPayload, GenerationRequest, GenerationResult,
};
use cardforge_contracts::templates::{
    size_for_category, JsonTemplateStore, MemoryTemplateStore, TemplateStore,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::download::HttpAssetFetcher;
use crate::error::{GenerationError, GenerationOutcome};
use crate::gateway::{ProviderGateway, ProviderOutput};
use crate::normalize::{ImageNormalizer, ImageSource};
use crate::plan::GenerationPlan;
use crate::provider::OpenAiImagesProvider;
use crate::resolver::{ResolvedTemplate, TemplateResolver};
use crate::staging::StagingArea;

const DEFAULT_IMAGE_FORMAT: &str = "image/jpeg";

/// Entry point for card generation: resolves the template, picks a plan
/// and drives the provider gateway. Safe to share across threads.
pub struct CardEngine {
    resolver: TemplateResolver,
    gateway: ProviderGateway,
    quality: String,
    events: Option<EventLog>,
}

impl CardEngine {
    pub fn new(
        resolver: TemplateResolver,
        gateway: ProviderGateway,
        quality: impl Into<String>,
    ) -> Self {
        Self {
            resolver,
            gateway,
            quality: quality.into(),
            events: None,
        }
    }

    /// Wires the OpenAI provider, HTTP downloader and template store described
    /// by `config`. Fails only when the provider cannot be configured.
    pub fn from_config(config: &EngineConfig) -> anyhow::Result<Self> {
        let store: Arc<dyn TemplateStore> = match &config.templates_path {
            Some(path) => Arc::new(JsonTemplateStore::new(path)),
            None => Arc::new(MemoryTemplateStore::default()),
        };
        let provider = OpenAiImagesProvider::new(config)?;
        let fetcher = HttpAssetFetcher::new(config.download_timeout, config.user_agent.clone())?;
        let gateway = ProviderGateway::new(
            Box::new(provider),
            Box::new(fetcher),
            ImageNormalizer::new(config.square_size),
            StagingArea::new(config.staging_dir.clone()),
        );
        let engine = Self::new(TemplateResolver::new(store), gateway, config.quality.clone());
        Ok(match &config.events_path {
            Some(path) => engine.with_event_log(EventLog::new(path)),
            None => engine,
        })
    }

    pub fn with_event_log(mut self, events: EventLog) -> Self {
        self.events = Some(events);
        self
    }

    /// Adapter for the wire payload, where the user image arrives as base64.
    /// Blank image data, or data that decodes to nothing, means no image.
    pub fn generate_from_payload(
        &self,
        payload: &GenerationPayload,
    ) -> Result<GenerationResult, GenerationFailure> {
        let mut request = GenerationRequest::new(payload.template_title.clone());
        if let Some(text) = &payload.text {
            request = request.with_text(text.clone());
        }
        if let Some(size) = payload.size.as_deref().filter(|size| !size.trim().is_empty()) {
            request = request.with_size(size);
        }
        if let Some(encoded) = payload
            .image_data
            .as_deref()
            .filter(|data| !data.trim().is_empty())
        {
            let bytes = decode_image_data(encoded).map_err(|err| {
                err.into_failure()
                    .with_template(payload.template_title.clone())
            })?;
            if bytes.is_empty() {
                debug!("image data decoded to no bytes; treating as absent");
            } else {
                let format = payload
                    .image_format
                    .clone()
                    .unwrap_or_else(|| DEFAULT_IMAGE_FORMAT.to_string());
                request = request.with_image(bytes, Some(format));
            }
        }
        self.process_image_generation(&request)
    }

    #[tracing::instrument(skip_all, fields(template = %request.template_title))]
    pub fn process_image_generation(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResult, GenerationFailure> {
        let request_id = Uuid::new_v4().to_string();
        let events = self
            .events
            .as_ref()
            .map(|log| log.for_request(request_id.as_str()));
        let resolved = self.resolver.resolve(&request.template_title);
        let size = resolve_size(request, &resolved);
        let prompt = compose_prompt(&resolved.prompt, request.user_text.as_deref());
        info!(
            %request_id,
            size = %size,
            user_image_format = request.user_image_format.as_deref().unwrap_or("none"),
            "starting generation"
        );
        emit(
            events.as_ref(),
            GenerationEvent::GenerationStarted {
                template_title: request.template_title.clone(),
                has_user_image: request.user_image.is_some(),
                user_image_format: request
                    .user_image
                    .as_ref()
                    .and(request.user_image_format.clone()),
                size: size.clone(),
            },
        );

        let template_image = resolved.existing_reference_image();
        let plan = GenerationPlan::select(template_image, request.user_image.as_deref());
        let strategy = plan.strategy();
        info!(
            strategy = strategy.as_str(),
            template_image = template_image.is_some(),
            user_image = request.user_image.is_some(),
            source = resolved.source.as_str(),
            "strategy selected"
        );
        emit(
            events.as_ref(),
            GenerationEvent::StrategySelected {
                strategy,
                resolved_template_title: resolved.title.clone(),
                template_source: resolved.source.as_str().to_string(),
                has_template_image: template_image.is_some(),
            },
        );

        let operation = strategy.operation();
        match self.dispatch(plan, &prompt, &size) {
            Ok(ProviderOutput { asset, model }) => {
                let format = asset.format.mime().to_string();
                emit(
                    events.as_ref(),
                    GenerationEvent::GenerationFinished {
                        strategy,
                        operation,
                        provider_model: model.clone(),
                        image_format: format.clone(),
                        size_bytes: asset.size_bytes,
                    },
                );
                info!(bytes = asset.size_bytes, "successfully generated image");
                Ok(GenerationResult {
                    success: true,
                    image_base64: asset.image_base64,
                    image_url: asset.image_url,
                    format,
                    size_bytes: asset.size_bytes,
                    prompt_used: prompt,
                    strategy,
                    operation,
                    provider_model: model,
                    template_title: request.template_title.clone(),
                    resolved_template_title: resolved.title,
                    size,
                })
            }
            Err(err) => {
                error!(strategy = strategy.as_str(), "generation failed: {err}");
                let failure = err
                    .into_failure()
                    .with_template(request.template_title.clone());
                emit(
                    events.as_ref(),
                    GenerationEvent::GenerationFailed {
                        kind: failure.kind,
                        error: failure.error.clone(),
                    },
                );
                Err(failure)
            }
        }
    }

    fn dispatch(
        &self,
        plan: GenerationPlan<'_>,
        prompt: &str,
        size: &str,
    ) -> GenerationOutcome<ProviderOutput> {
        match plan {
            GenerationPlan::EditWithMask { template, mask } => self.gateway.edit_with_mask(
                ImageSource::File(template),
                ImageSource::Bytes(mask),
                prompt,
                size,
            ),
            GenerationPlan::VariationFromTemplate { template } => {
                self.gateway.variation(ImageSource::File(template), size)
            }
            GenerationPlan::VariationFromUserImage { image } => {
                self.gateway.variation(ImageSource::Bytes(image), size)
            }
            GenerationPlan::GenerateFromPrompt => {
                self.gateway.generate_from_prompt(prompt, size, &self.quality)
            }
        }
    }
}

fn emit(events: Option<&RequestEvents>, event: GenerationEvent) {
    let Some(events) = events else {
        return;
    };
    if let Err(err) = events.emit(&event) {
        warn!(
            request_id = events.request_id(),
            path = %events.path().display(),
            "failed writing event: {err:#}"
        );
    }
}

/// Template prompt, extended with the user's wishes when there are any.
pub fn compose_prompt(base: &str, user_text: Option<&str>) -> String {
    match user_text.filter(|text| !text.trim().is_empty()) {
        Some(text) => format!("{base}. Additional requirements: {text}"),
        None => base.to_string(),
    }
}

/// Explicit request size, then the category table, then the template default.
pub fn resolve_size(request: &GenerationRequest, resolved: &ResolvedTemplate) -> String {
    request
        .requested_size
        .as_deref()
        .map(str::trim)
        .filter(|size| !size.is_empty())
        .or_else(|| size_for_category(&request.template_title))
        .map(str::to_string)
        .unwrap_or_else(|| resolved.default_size.clone())
}

fn decode_image_data(encoded: &str) -> Result<Vec<u8>, GenerationError> {
    let trimmed = encoded.trim();
    let data = match trimmed.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => trimmed,
    };
    BASE64
        .decode(data)
        .map_err(|err| GenerationError::input(format!("invalid base64 image data: {err}")))
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io::Cursor;
    use std::sync::Arc;

    use cardforge_contracts::generation::{FailureKind, Operation, Strategy};
    use cardforge_contracts::templates::Template;
    use image::{DynamicImage, ImageFormat, RgbaImage};
    use serde_json::Value;

    use super::*;
    use crate::gateway::fakes::{FakeFetcher, FakeProvider};

    fn png(width: u32, height: u32) -> anyhow::Result<Vec<u8>> {
        let image = DynamicImage::ImageRgba8(RgbaImage::new(width, height));
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, ImageFormat::Png)?;
        Ok(out.into_inner())
    }

    struct Harness {
        engine: CardEngine,
        provider: FakeProvider,
        _staging: tempfile::TempDir,
    }

    fn harness(templates: Vec<Template>, provider: FakeProvider) -> anyhow::Result<Harness> {
        let staging = tempfile::tempdir()?;
        let gateway = ProviderGateway::new(
            Box::new(provider.clone()),
            Box::new(FakeFetcher::default()),
            ImageNormalizer::new(32),
            StagingArea::new(Some(staging.path().to_path_buf())),
        );
        let resolver = TemplateResolver::new(Arc::new(MemoryTemplateStore::new(templates)));
        Ok(Harness {
            engine: CardEngine::new(resolver, gateway, "standard"),
            provider,
            _staging: staging,
        })
    }

    #[test]
    fn prompt_composition_appends_non_blank_text() {
        assert_eq!(compose_prompt("Base", None), "Base");
        assert_eq!(compose_prompt("Base", Some("   ")), "Base");
        assert_eq!(
            compose_prompt("Base", Some("gold foil")),
            "Base. Additional requirements: gold foil"
        );
    }

    #[test]
    fn size_prefers_request_then_category_then_template() {
        let resolved = ResolvedTemplate {
            title: "gala".to_string(),
            prompt: String::new(),
            reference_image: None,
            default_size: "512x512".to_string(),
            source: crate::resolver::TemplateSource::Store,
        };
        let explicit = GenerationRequest::new("story").with_size("256x256");
        assert_eq!(resolve_size(&explicit, &resolved), "256x256");
        assert_eq!(resolve_size(&GenerationRequest::new("Story"), &resolved), "1080x1920");
        assert_eq!(resolve_size(&GenerationRequest::new("gala"), &resolved), "512x512");
    }

    #[test]
    fn text_only_requests_generate_from_prompt() -> anyhow::Result<()> {
        let harness = harness(Vec::new(), FakeProvider::default())?;
        let request = GenerationRequest::new("birthday").with_text("for grandma");
        let result = harness
            .engine
            .process_image_generation(&request)
            .map_err(anyhow::Error::new)?;

        assert!(result.success);
        assert_eq!(result.strategy, Strategy::GenerateFromPrompt);
        assert_eq!(result.operation, Operation::Generation);
        assert_eq!(result.provider_model, "dall-e-3");
        assert_eq!(result.format, "image/png");
        assert_eq!(result.size, "1024x1024");
        assert_eq!(result.resolved_template_title, "birthday");
        assert_eq!(
            result.prompt_used,
            "Create a festive birthday card with balloons, cake, and party elements. \
             Additional requirements: for grandma"
        );
        let calls = harness.provider.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].operation, "generate");
        assert!(calls[0].uploads.is_empty());
        Ok(())
    }

    #[test]
    fn user_image_alone_becomes_a_variation() -> anyhow::Result<()> {
        let harness = harness(Vec::new(), FakeProvider::default())?;
        let request = GenerationRequest::new("xyzzy").with_image(png(10, 30)?, None);
        let result = harness
            .engine
            .process_image_generation(&request)
            .map_err(anyhow::Error::new)?;

        assert_eq!(result.strategy, Strategy::VariationFromUserImage);
        assert_eq!(result.operation, Operation::Variation);
        assert_eq!(result.resolved_template_title, "xyzzy");
        assert!(result.prompt_used.contains("xyzzy"));
        Ok(())
    }

    #[test]
    fn template_and_user_images_edit_with_the_user_image_as_mask() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let reference = temp.path().join("wedding.png");
        fs::write(&reference, png(20, 20)?)?;
        let templates = vec![Template::new("wedding", "white roses").with_reference_image(&reference)];

        let edit = harness(templates.clone(), FakeProvider::default())?;
        let request = GenerationRequest::new("Wedding")
            .with_text("add names")
            .with_image(png(8, 8)?, Some("image/png".to_string()));
        let result = edit
            .engine
            .process_image_generation(&request)
            .map_err(anyhow::Error::new)?;
        assert_eq!(result.strategy, Strategy::EditWithMask);
        assert_eq!(result.operation, Operation::Edit);
        let calls = edit.provider.calls();
        assert_eq!(calls[0].operation, "edit");
        assert_eq!(calls[0].uploads.len(), 2);
        assert_eq!(
            calls[0].prompt.as_deref(),
            Some("white roses. Additional requirements: add names")
        );

        let variation = harness(templates, FakeProvider::default())?;
        let result = variation
            .engine
            .process_image_generation(&GenerationRequest::new("wedding"))
            .map_err(anyhow::Error::new)?;
        assert_eq!(result.strategy, Strategy::VariationFromTemplate);
        assert_eq!(variation.provider.calls()[0].operation, "variation");
        Ok(())
    }

    #[test]
    fn missing_reference_files_fall_back_to_prompt_generation() -> anyhow::Result<()> {
        let templates =
            vec![Template::new("gala", "gold").with_reference_image("/nonexistent/gala.png")];
        let harness = harness(templates, FakeProvider::default())?;
        let result = harness
            .engine
            .process_image_generation(&GenerationRequest::new("gala"))
            .map_err(anyhow::Error::new)?;
        assert_eq!(result.strategy, Strategy::GenerateFromPrompt);
        Ok(())
    }

    #[test]
    fn provider_failures_carry_the_template_title() -> anyhow::Result<()> {
        let harness = harness(Vec::new(), FakeProvider::failing("quota exceeded"))?;
        let failure = harness
            .engine
            .process_image_generation(&GenerationRequest::new("greeting"))
            .unwrap_err();
        assert!(!failure.success);
        assert_eq!(failure.kind, FailureKind::Provider);
        assert!(failure.error.contains("quota exceeded"));
        assert_eq!(failure.template_title.as_deref(), Some("greeting"));
        Ok(())
    }

    #[test]
    fn undecodable_user_images_are_input_failures() -> anyhow::Result<()> {
        let harness = harness(Vec::new(), FakeProvider::default())?;
        let request = GenerationRequest::new("greeting").with_image(b"garbage".to_vec(), None);
        let failure = harness.engine.process_image_generation(&request).unwrap_err();
        assert_eq!(failure.kind, FailureKind::Input);
        assert!(harness.provider.calls().is_empty());
        Ok(())
    }

    #[test]
    fn payload_adapter_decodes_base64_images() -> anyhow::Result<()> {
        let harness = harness(Vec::new(), FakeProvider::default())?;
        let payload = GenerationPayload {
            template_title: "greeting".to_string(),
            image_data: Some(format!("data:image/png;base64,{}", BASE64.encode(png(4, 4)?))),
            ..GenerationPayload::default()
        };
        let result = harness
            .engine
            .generate_from_payload(&payload)
            .map_err(anyhow::Error::new)?;
        assert_eq!(result.strategy, Strategy::VariationFromUserImage);

        let broken = GenerationPayload {
            template_title: "greeting".to_string(),
            image_data: Some("%%% not base64 %%%".to_string()),
            ..GenerationPayload::default()
        };
        let failure = harness.engine.generate_from_payload(&broken).unwrap_err();
        assert_eq!(failure.kind, FailureKind::Input);
        assert_eq!(failure.template_title.as_deref(), Some("greeting"));
        assert_eq!(harness.provider.calls().len(), 1);
        Ok(())
    }

    #[test]
    fn blank_payload_images_fall_back_to_prompt_generation() -> anyhow::Result<()> {
        let harness = harness(Vec::new(), FakeProvider::default())?;
        for image_data in ["", "   ", "data:image/png;base64,"] {
            let payload = GenerationPayload {
                template_title: "birthday".to_string(),
                image_data: Some(image_data.to_string()),
                ..GenerationPayload::default()
            };
            let result = harness
                .engine
                .generate_from_payload(&payload)
                .map_err(anyhow::Error::new)?;
            assert_eq!(result.strategy, Strategy::GenerateFromPrompt);
        }
        let calls = harness.provider.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|call| call.operation == "generate"));
        Ok(())
    }

    #[test]
    fn runs_are_recorded_in_the_event_log() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let events_path = temp.path().join("events.jsonl");
        let harness = harness(Vec::new(), FakeProvider::default())?;
        let engine = harness.engine.with_event_log(EventLog::new(&events_path));

        let request = GenerationRequest::new("business")
            .with_image(png(6, 6)?, Some("image/png".to_string()));
        engine
            .process_image_generation(&request)
            .map_err(anyhow::Error::new)?;

        let lines: Vec<Value> = fs::read_to_string(&events_path)?
            .lines()
            .map(serde_json::from_str)
            .collect::<Result<_, _>>()?;
        let types: Vec<&str> = lines
            .iter()
            .filter_map(|line| line["type"].as_str())
            .collect();
        assert_eq!(
            types,
            ["generation_started", "strategy_selected", "generation_finished"]
        );
        assert_eq!(lines[0]["request_id"], lines[2]["request_id"]);
        assert_eq!(lines[0]["user_image_format"], Value::String("image/png".to_string()));
        assert_eq!(lines[1]["template_source"], Value::String("default".to_string()));
        assert_eq!(lines[2]["operation"], Value::String("variation".to_string()));
        Ok(())
    }
}
