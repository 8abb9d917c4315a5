use cardforge_contracts::generation::Operation;
use tracing::{debug, info};

use crate::download::{download_and_encode, AssetFetcher, EncodedAsset};
use crate::error::GenerationError;
use crate::normalize::{CanonicalImage, ImageNormalizer, ImageSource};
use crate::provider::ImageProvider;
use crate::staging::{StagedFile, StagingArea};

/// A downloaded provider result and the model that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderOutput {
    pub asset: EncodedAsset,
    pub model: String,
}

/// Runs one provider operation end to end: canonicalize and stage the inputs,
/// make the call, release the staged files, then download the hosted result.
pub struct ProviderGateway {
    provider: Box<dyn ImageProvider>,
    fetcher: Box<dyn AssetFetcher>,
    normalizer: ImageNormalizer,
    staging: StagingArea,
}

impl ProviderGateway {
    pub fn new(
        provider: Box<dyn ImageProvider>,
        fetcher: Box<dyn AssetFetcher>,
        normalizer: ImageNormalizer,
        staging: StagingArea,
    ) -> Self {
        Self {
            provider,
            fetcher,
            normalizer,
            staging,
        }
    }

    pub fn generate_from_prompt(
        &self,
        prompt: &str,
        size: &str,
        quality: &str,
    ) -> Result<ProviderOutput, GenerationError> {
        let asset = self.provider.generate(prompt, size, quality)?;
        self.finish(Operation::Generation, asset.model, &asset.url)
    }

    pub fn variation(
        &self,
        source: ImageSource<'_>,
        size: &str,
    ) -> Result<ProviderOutput, GenerationError> {
        let staged = self.stage(source)?;
        let asset = self.provider.create_variation(staged.path(), size);
        drop(staged);
        let asset = asset?;
        self.finish(Operation::Variation, asset.model, &asset.url)
    }

    /// `base` is the image to edit; transparent areas of `mask` are repainted.
    pub fn edit_with_mask(
        &self,
        base: ImageSource<'_>,
        mask: ImageSource<'_>,
        prompt: &str,
        size: &str,
    ) -> Result<ProviderOutput, GenerationError> {
        let staged_base = self.stage(base)?;
        let staged_mask = self.stage(mask)?;
        let asset = self
            .provider
            .edit(staged_base.path(), staged_mask.path(), prompt, size);
        drop(staged_mask);
        drop(staged_base);
        let asset = asset?;
        self.finish(Operation::Edit, asset.model, &asset.url)
    }

    fn stage(&self, source: ImageSource<'_>) -> Result<StagedFile, GenerationError> {
        let CanonicalImage {
            bytes,
            width,
            height,
            source_mode,
            squared,
        } = self.normalizer.canonicalize_source(source)?;
        debug!(
            width,
            height,
            mode = source_mode.as_str(),
            squared,
            "canonicalized provider input"
        );
        self.staging.stage(&bytes)
    }

    fn finish(
        &self,
        operation: Operation,
        model: String,
        url: &str,
    ) -> Result<ProviderOutput, GenerationError> {
        info!(
            provider = self.provider.name(),
            operation = operation.as_str(),
            "downloading provider result"
        );
        let asset = download_and_encode(self.fetcher.as_ref(), url)?;
        Ok(ProviderOutput { asset, model })
    }
}
