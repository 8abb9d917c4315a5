pub mod config;
pub mod download;
pub mod error;
pub mod gateway;
pub mod normalize;
pub mod pipeline;
pub mod plan;
pub mod provider;
pub mod resolver;
pub mod staging;

#[cfg(test)]
mod test_support;

pub use config::EngineConfig;
pub use download::{download_and_encode, AssetFetcher, AssetFormat, EncodedAsset, HttpAssetFetcher};
pub use error::{GenerationError, GenerationOutcome, NormalizationFailure};
pub use gateway::{ProviderGateway, ProviderOutput};
pub use normalize::{CanonicalImage, ImageNormalizer, ImageSource, SourceMode};
pub use pipeline::{compose_prompt, resolve_size, CardEngine};
pub use plan::GenerationPlan;
pub use provider::{ImageProvider, OpenAiImagesProvider, ProviderAsset};
pub use resolver::{ResolvedTemplate, TemplateResolver, TemplateSource};
pub use staging::{StagedFile, StagingArea};
