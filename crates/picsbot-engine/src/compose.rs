use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_text_mut, text_size};
use tracing::warn;

pub const FULL_MAX_DIM: u32 = 1280;
pub const THUMB_MAX_DIM: u32 = 320;
pub const COLLAGE_TILE: u32 = 360;

const FULL_JPEG_QUALITY: u8 = 85;
const THUMB_JPEG_QUALITY: u8 = 75;
const MIN_FONT_PX: f32 = 12.0;
const MAX_CAPTION_CHARS: usize = 120;
const BACKGROUND: Rgb<u8> = Rgb([16, 16, 16]);
const TEXT_FILL: Rgb<u8> = Rgb([255, 255, 255]);
const TEXT_OUTLINE: Rgb<u8> = Rgb([0, 0, 0]);

const EMBEDDED_FONT: &[u8] = include_bytes!("../resources/DejaVuSans.ttf");

/// Encoded JPEG output: the full image and its thumbnail.
#[derive(Debug, Clone)]
pub struct Composite {
    pub full: Vec<u8>,
    pub thumb: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    #[error("no decodable source images")]
    NoImages,
    #[error("no overlay font configured")]
    NoFont,
    #[error("invalid font file: {0}")]
    Font(String),
    #[error("image processing failed: {0}")]
    Image(#[from] image::ImageError),
}

pub trait Compositor: Send + Sync {
    fn overlay(&self, source: &[u8], text: &str) -> Result<Composite, ComposeError>;
    fn collage(&self, sources: &[Vec<u8>], text: Option<&str>) -> Result<Composite, ComposeError>;
}

#[derive(Clone)]
pub struct RasterCompositor {
    font: Option<FontArc>,
}

/// Uses the bundled DejaVu Sans for captions.
impl Default for RasterCompositor {
    fn default() -> Self {
        let font = embedded_font();
        if let Err(err) = &font {
            warn!(error = %err, "bundled overlay font unusable; text overlays disabled");
        }
        Self::new(font.ok())
    }
}

impl RasterCompositor {
    pub fn new(font: Option<FontArc>) -> Self {
        Self { font }
    }

    pub fn load_font(path: &Path) -> Result<FontArc, ComposeError> {
        let bytes = std::fs::read(path)
            .map_err(|err| ComposeError::Font(format!("{}: {err}", path.display())))?;
        FontArc::try_from_vec(bytes)
            .map_err(|err| ComposeError::Font(format!("{}: {err}", path.display())))
    }

    fn font(&self) -> Result<&FontArc, ComposeError> {
        self.font.as_ref().ok_or(ComposeError::NoFont)
    }
}

impl Compositor for RasterCompositor {
    fn overlay(&self, source: &[u8], text: &str) -> Result<Composite, ComposeError> {
        let font = self.font()?;
        let mut canvas = fit_within(decode(source)?, FULL_MAX_DIM);
        draw_caption(&mut canvas, text, font);
        encode_pair(canvas)
    }

    fn collage(&self, sources: &[Vec<u8>], text: Option<&str>) -> Result<Composite, ComposeError> {
        let font = match text {
            Some(_) => Some(self.font()?),
            None => None,
        };
        let tiles: Vec<RgbImage> = sources
            .iter()
            .enumerate()
            .filter_map(|(idx, bytes)| match decode(bytes) {
                Ok(tile) => Some(tile),
                Err(err) => {
                    warn!(index = idx, error = %err, "skipping undecodable collage tile");
                    None
                }
            })
            .collect();
        if tiles.is_empty() {
            return Err(ComposeError::NoImages);
        }

        let mut canvas = fit_within(tile_grid(tiles), FULL_MAX_DIM);
        if let (Some(text), Some(font)) = (text, font) {
            draw_caption(&mut canvas, text, font);
        }
        encode_pair(canvas)
    }
}

pub fn embedded_font() -> Result<FontArc, ComposeError> {
    FontArc::try_from_slice(EMBEDDED_FONT)
        .map_err(|err| ComposeError::Font(format!("bundled font: {err}")))
}

/// Columns and rows for a near-square grid holding `count` tiles.
pub fn grid_dims(count: usize) -> (u32, u32) {
    let count = count.max(1) as u32;
    let mut cols = 1;
    while cols * cols < count {
        cols += 1;
    }
    let rows = count.div_ceil(cols);
    (cols, rows)
}

fn tile_grid(tiles: Vec<RgbImage>) -> RgbImage {
    let (cols, rows) = grid_dims(tiles.len());
    let mut canvas = RgbImage::from_pixel(cols * COLLAGE_TILE, rows * COLLAGE_TILE, BACKGROUND);
    for (idx, tile) in tiles.into_iter().enumerate() {
        let idx = idx as u32;
        let fitted = DynamicImage::ImageRgb8(tile)
            .resize_to_fill(COLLAGE_TILE, COLLAGE_TILE, FilterType::Triangle)
            .to_rgb8();
        let x = (idx % cols) * COLLAGE_TILE;
        let y = (idx / cols) * COLLAGE_TILE;
        imageops::replace(&mut canvas, &fitted, i64::from(x), i64::from(y));
    }
    canvas
}

/// Single-line caption centered near the bottom edge, outlined in black.
fn draw_caption(canvas: &mut RgbImage, text: &str, font: &FontArc) {
    let caption: String = text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(MAX_CAPTION_CHARS)
        .collect();
    if caption.is_empty() {
        return;
    }

    let (width, height) = canvas.dimensions();
    let max_width = width as f32 * 0.9;
    let mut scale = (height as f32 / 9.0).max(MIN_FONT_PX);
    let (mut text_w, mut text_h) = text_size(PxScale::from(scale), font, &caption);
    if text_w as f32 > max_width {
        scale = (scale * max_width / text_w as f32).max(MIN_FONT_PX);
        (text_w, text_h) = text_size(PxScale::from(scale), font, &caption);
    }

    let outline = ((scale / 18.0).round() as i32).max(1);
    let margin = (height / 20) as i32;
    let x = (width as i32 - text_w as i32) / 2;
    let y = height as i32 - text_h as i32 - margin - outline;
    let px = PxScale::from(scale);
    for dx in -outline..=outline {
        for dy in -outline..=outline {
            if dx == 0 && dy == 0 {
                continue;
            }
            draw_text_mut(canvas, TEXT_OUTLINE, x + dx, y + dy, px, font, &caption);
        }
    }
    draw_text_mut(canvas, TEXT_FILL, x, y, px, font, &caption);
}

fn decode(bytes: &[u8]) -> Result<RgbImage, ComposeError> {
    Ok(image::load_from_memory(bytes)?.to_rgb8())
}

fn fit_within(image: RgbImage, max_dim: u32) -> RgbImage {
    if image.width() <= max_dim && image.height() <= max_dim {
        return image;
    }
    DynamicImage::ImageRgb8(image)
        .resize(max_dim, max_dim, FilterType::Triangle)
        .to_rgb8()
}

fn encode_pair(full: RgbImage) -> Result<Composite, ComposeError> {
    let thumb = DynamicImage::ImageRgb8(full.clone())
        .thumbnail(THUMB_MAX_DIM, THUMB_MAX_DIM)
        .to_rgb8();
    Ok(Composite {
        full: encode_jpeg(&full, FULL_JPEG_QUALITY)?,
        thumb: encode_jpeg(&thumb, THUMB_JPEG_QUALITY)?,
    })
}

pub(crate) fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, ComposeError> {
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality).encode_image(image)?;
    Ok(bytes)
}
