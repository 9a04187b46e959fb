use anyhow::Context;
use bytes::Bytes;
use image::{
    codecs::jpeg::JpegEncoder,
    imageops::{self, FilterType},
    DynamicImage, Rgb, RgbImage,
};

use crate::error::{AppError, AppResult};

pub const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;
pub const AVATAR_SIZE: u32 = 200;
pub const JPEG_QUALITY: u8 = 75;
/// Letterbox fill around images that are not square.
const PAD: Rgb<u8> = Rgb([0, 0, 0]);

/// Upload filter: only `image/*` parts up to `MAX_UPLOAD_BYTES`.
pub fn check_image(content_type: Option<&str>, len: usize) -> AppResult<()> {
    let is_image = content_type
        .map(|ct| ct.trim().to_ascii_lowercase().starts_with("image/"))
        .unwrap_or(false);
    if !is_image || len > MAX_UPLOAD_BYTES {
        return Err(AppError::validation("Not an image! Please upload only images."));
    }
    Ok(())
}

fn resize_blocking(raw: &[u8]) -> anyhow::Result<Vec<u8>> {
    let img = image::load_from_memory(raw).context("decode image")?;
    // scale to fit inside the square, keep the whole picture, pad the rest
    let fitted = img.resize(AVATAR_SIZE, AVATAR_SIZE, FilterType::Triangle).to_rgb8();
    let mut canvas = RgbImage::from_pixel(AVATAR_SIZE, AVATAR_SIZE, PAD);
    let x = (AVATAR_SIZE - fitted.width()) / 2;
    let y = (AVATAR_SIZE - fitted.height()) / 2;
    imageops::overlay(&mut canvas, &fitted, i64::from(x), i64::from(y));
    let rgb = DynamicImage::ImageRgb8(canvas);
    let mut out = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY))
        .context("encode jpeg")?;
    Ok(out)
}

/// Scales into a padded square avatar JPEG on the blocking pool.
pub async fn resize_avatar(raw: Bytes) -> AppResult<Bytes> {
    let out = tokio::task::spawn_blocking(move || resize_blocking(&raw))
        .await
        .context("join image resize")?
        .map_err(|e| {
            tracing::warn!(error = %e, "image could not be processed");
            AppError::validation("Not an image! Please upload only images.")
        })?;
    Ok(Bytes::from(out))
}

#[cfg(test)]
pub(crate) fn sample_png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_fn(width, height, |x, y| {
        image::Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255])
    });
    let mut out = std::io::Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .expect("encode png");
    out.into_inner()
}
