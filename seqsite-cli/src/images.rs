//! Raster asset re-encoding: oversized images are scaled down and every
//! decoded image is written back without its metadata.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageResult};
use seqsite_core::ImagesConfig;
use std::fs;
use std::io::Cursor;
use std::path::Path;

/// Re-encoded bytes for a raster asset, or `None` when the file should be
/// copied unchanged (not a raster image, optimisation off, or undecodable).
pub fn optimized_image(source: &Path, options: &ImagesConfig) -> Option<Vec<u8>> {
    if !options.optimize {
        return None;
    }
    let format = raster_format(source)?;
    let bytes = fs::read(source).ok()?;

    match reencode(&bytes, format, options) {
        Ok(encoded) => {
            tracing::debug!("Optimized image: {:?}", source);
            Some(encoded)
        }
        Err(err) => {
            tracing::warn!("Copying {:?} unchanged, cannot optimize: {}", source, err);
            None
        }
    }
}

fn raster_format(path: &Path) -> Option<ImageFormat> {
    match ImageFormat::from_path(path).ok()? {
        format @ (ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::WebP) => Some(format),
        _ => None,
    }
}

fn reencode(bytes: &[u8], format: ImageFormat, options: &ImagesConfig) -> ImageResult<Vec<u8>> {
    let img = image::load_from_memory_with_format(bytes, format)?;
    let img = limit_width(img, options.max_width);

    let mut out = Vec::new();
    match format {
        ImageFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut out, options.jpeg_quality);
            DynamicImage::ImageRgb8(img.to_rgb8()).write_with_encoder(encoder)?;
        }
        ImageFormat::WebP => {
            DynamicImage::ImageRgba8(img.to_rgba8())
                .write_to(&mut Cursor::new(&mut out), ImageFormat::WebP)?;
        }
        _ => img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)?,
    }
    Ok(out)
}

fn limit_width(img: DynamicImage, max_width: u32) -> DynamicImage {
    let (width, height) = (img.width(), img.height());
    if width <= max_width {
        return img;
    }
    let scaled = (u64::from(height) * u64::from(max_width) / u64::from(width)).max(1);
    let scaled = u32::try_from(scaled).unwrap_or(height);
    img.resize_exact(max_width, scaled, FilterType::Lanczos3)
}
