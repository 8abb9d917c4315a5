//! Canonicalization of arbitrary input images into the square RGBA PNG the
//! provider's variation and edit endpoints accept.

use std::fs;
use std::path::Path;

use image::codecs::png::{CompressionType, FilterType as PngFilterType, PngEncoder};
use image::imageops::{self, FilterType};
use image::{
    DynamicImage, ExtendedColorType, GrayAlphaImage, ImageEncoder, ImageResult, LumaA, Rgb,
    RgbImage, Rgba, RgbaImage,
};
use tracing::{debug, warn};

use crate::error::NormalizationFailure;

pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

pub fn has_png_signature(bytes: &[u8]) -> bool {
    bytes.starts_with(&PNG_SIGNATURE)
}

/// Where an input image comes from: a stored template file or request bytes.
#[derive(Debug, Clone, Copy)]
pub enum ImageSource<'a> {
    File(&'a Path),
    Bytes(&'a [u8]),
}

/// Colour layout reported by the decoder before conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMode {
    Luma,
    LumaAlpha,
    Rgb,
    Rgba,
    /// 16-bit and float layouts.
    Extended,
}

impl SourceMode {
    pub fn of(image: &DynamicImage) -> Self {
        match image {
            DynamicImage::ImageLuma8(_) => SourceMode::Luma,
            DynamicImage::ImageLumaA8(_) => SourceMode::LumaAlpha,
            DynamicImage::ImageRgb8(_) => SourceMode::Rgb,
            DynamicImage::ImageRgba8(_) => SourceMode::Rgba,
            _ => SourceMode::Extended,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceMode::Luma => "L",
            SourceMode::LumaAlpha => "LA",
            SourceMode::Rgb => "RGB",
            SourceMode::Rgba => "RGBA",
            SourceMode::Extended => "extended",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalImage {
    /// RGBA PNG bytes.
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub source_mode: SourceMode,
    /// False when square normalization failed and the unpadded image was kept.
    pub squared: bool,
}

#[derive(Debug, Clone)]
pub struct ImageNormalizer {
    square_size: u32,
}

impl ImageNormalizer {
    pub fn new(square_size: u32) -> Self {
        Self {
            square_size: square_size.max(1),
        }
    }

    pub fn canonicalize_source(
        &self,
        source: ImageSource<'_>,
    ) -> Result<CanonicalImage, NormalizationFailure> {
        match source {
            ImageSource::Bytes(bytes) => self.canonicalize(bytes),
            ImageSource::File(path) => self.canonicalize_file(path),
        }
    }

    /// A missing or unreadable file fails the same way undecodable bytes do.
    pub fn canonicalize_file(&self, path: &Path) -> Result<CanonicalImage, NormalizationFailure> {
        let bytes = fs::read(path).map_err(|err| {
            NormalizationFailure::new(format!("failed reading {}: {err}", path.display()))
        })?;
        self.canonicalize(&bytes)
    }

    /// Decodes `raw`, converts it to RGBA, encodes it as PNG and letterboxes it
    /// onto a transparent square canvas.
    ///
    /// Only undecodable input is an error. If squaring fails the RGBA PNG is
    /// returned as-is with `squared == false`.
    pub fn canonicalize(&self, raw: &[u8]) -> Result<CanonicalImage, NormalizationFailure> {
        let decoded = image::load_from_memory(raw)
            .map_err(|err| NormalizationFailure::new(err.to_string()))?;
        let source_mode = SourceMode::of(&decoded);
        debug!(
            mode = source_mode.as_str(),
            width = decoded.width(),
            height = decoded.height(),
            bytes = raw.len(),
            "decoded source image"
        );

        let rgba = expand_to_rgba(decoded);
        let png = encode_canonical_png(&rgba)
            .map_err(|err| NormalizationFailure::new(format!("png encoding failed: {err}")))?;
        let (width, height) = rgba.dimensions();

        if width == height && width == self.square_size {
            return Ok(CanonicalImage {
                bytes: png,
                width,
                height,
                source_mode,
                squared: true,
            });
        }

        let squared = self.make_square(&rgba).and_then(|square| {
            match encode_canonical_png(&square) {
                Ok(bytes) => Some((bytes, square.width(), square.height())),
                Err(err) => {
                    warn!("failed encoding square image: {err}");
                    None
                }
            }
        });

        match squared {
            Some((bytes, width, height)) => {
                debug!(width, height, bytes = bytes.len(), "created square image");
                Ok(CanonicalImage {
                    bytes,
                    width,
                    height,
                    source_mode,
                    squared: true,
                })
            }
            None => {
                warn!(width, height, "square normalization failed; keeping unpadded image");
                Ok(CanonicalImage {
                    bytes: png,
                    width,
                    height,
                    source_mode,
                    squared: false,
                })
            }
        }
    }

    /// Fits `image` into a transparent `square_size` square, keeping its aspect
    /// ratio and centering the short side. Returns `None` for empty images.
    pub fn make_square(&self, image: &RgbaImage) -> Option<RgbaImage> {
        let size = self.square_size;
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return None;
        }
        if width == height && width == size {
            return Some(image.clone());
        }

        let (new_width, new_height) = if width > height {
            (size, scaled_side(size, height, width))
        } else {
            (scaled_side(size, width, height), size)
        };
        let x_offset = (size - new_width) / 2;
        let y_offset = (size - new_height) / 2;

        let resized = imageops::resize(image, new_width, new_height, FilterType::Lanczos3);
        let mut canvas = RgbaImage::new(size, size);
        imageops::replace(&mut canvas, &resized, i64::from(x_offset), i64::from(y_offset));
        Some(canvas)
    }
}

fn scaled_side(target: u32, short: u32, long: u32) -> u32 {
    let scaled = u64::from(target) * u64::from(short) / u64::from(long);
    (scaled as u32).clamp(1, target)
}

/// Decoders already expand palette, 1-bit and CMYK sources into one of the
/// 8-bit layouts below.
fn expand_to_rgba(image: DynamicImage) -> RgbaImage {
    match image {
        DynamicImage::ImageRgba8(rgba) => rgba,
        DynamicImage::ImageRgb8(rgb) => with_opaque_alpha(&rgb),
        DynamicImage::ImageLuma8(luma) => with_opaque_alpha(&DynamicImage::ImageLuma8(luma).to_rgb8()),
        DynamicImage::ImageLumaA8(luma_alpha) => luma_alpha_to_rgba(&luma_alpha),
        other => other.to_rgba8(),
    }
}

fn with_opaque_alpha(rgb: &RgbImage) -> RgbaImage {
    RgbaImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let Rgb([r, g, b]) = *rgb.get_pixel(x, y);
        Rgba([r, g, b, u8::MAX])
    })
}

// Alpha is carried over from the source, not derived from luminance.
fn luma_alpha_to_rgba(luma_alpha: &GrayAlphaImage) -> RgbaImage {
    RgbaImage::from_fn(luma_alpha.width(), luma_alpha.height(), |x, y| {
        let LumaA([luma, alpha]) = *luma_alpha.get_pixel(x, y);
        Rgba([luma, luma, luma, alpha])
    })
}

fn encode_canonical_png(image: &RgbaImage) -> ImageResult<Vec<u8>> {
    let encoded = encode_png(image, CompressionType::Best)?;
    if has_png_signature(&encoded) {
        return Ok(encoded);
    }
    warn!("encoded image lacks a PNG signature; re-encoding once");
    encode_png(image, CompressionType::Default)
}

fn encode_png(image: &RgbaImage, compression: CompressionType) -> ImageResult<Vec<u8>> {
    let mut out = Vec::new();
    PngEncoder::new_with_quality(&mut out, compression, PngFilterType::Adaptive).write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        ExtendedColorType::Rgba8,
    )?;
    Ok(out)
}
