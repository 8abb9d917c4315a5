use std::time::Duration;

use anyhow::Context;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::blocking::Client as HttpClient;
use reqwest::header::USER_AGENT;
use tracing::{error, info};

use crate::error::GenerationError;
use crate::normalize::has_png_signature;

const JPEG_MARKER: [u8; 3] = [0xFF, 0xD8, 0xFF];

/// Fetches provider-hosted result assets.
pub trait AssetFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, GenerationError>;
}

pub struct HttpAssetFetcher {
    http: HttpClient,
    user_agent: String,
}

impl HttpAssetFetcher {
    pub fn new(timeout: Duration, user_agent: impl Into<String>) -> anyhow::Result<Self> {
        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("failed building asset download client")?;
        Ok(Self {
            http,
            user_agent: user_agent.into(),
        })
    }
}

impl AssetFetcher for HttpAssetFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, GenerationError> {
        let response = self
            .http
            .get(url)
            .header(USER_AGENT, self.user_agent.as_str())
            .send()
            .map_err(|err| GenerationError::transport(format!("Download error: {err}")))?;
        let status = response.status();
        if !status.is_success() {
            error!(status = status.as_u16(), "failed to download image");
            return Err(GenerationError::DownloadStatus {
                status: status.as_u16(),
            });
        }
        let bytes = response
            .bytes()
            .map_err(|err| GenerationError::transport(format!("Download error: {err}")))?;
        Ok(bytes.to_vec())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetFormat {
    Png,
    Jpeg,
}

impl AssetFormat {
    /// Unrecognized content is reported as PNG.
    pub fn sniff(bytes: &[u8]) -> Self {
        if has_png_signature(bytes) {
            AssetFormat::Png
        } else if bytes.starts_with(&JPEG_MARKER) {
            AssetFormat::Jpeg
        } else {
            AssetFormat::Png
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetFormat::Png => "png",
            AssetFormat::Jpeg => "jpeg",
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            AssetFormat::Png => "image/png",
            AssetFormat::Jpeg => "image/jpeg",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedAsset {
    pub image_base64: String,
    pub image_url: String,
    pub format: AssetFormat,
    pub size_bytes: usize,
}

pub fn download_and_encode(
    fetcher: &dyn AssetFetcher,
    url: &str,
) -> Result<EncodedAsset, GenerationError> {
    let bytes = fetcher.fetch(url)?;
    let format = AssetFormat::sniff(&bytes);
    info!(
        bytes = bytes.len(),
        format = format.as_str(),
        "downloaded image"
    );
    Ok(EncodedAsset {
        image_base64: BASE64.encode(&bytes),
        image_url: url.to_string(),
        format,
        size_bytes: bytes.len(),
    })
}
