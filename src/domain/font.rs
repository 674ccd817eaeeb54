//! Caption font resolution.
//!
//! Candidates are tried in order and the first one that loads wins for the
//! whole job. When none loads, the built-in 8x8 bitmap font is used, so
//! resolution itself never fails.

use ab_glyph::{FontVec, PxScale};
use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_text_mut, text_size};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const BUILTIN_GLYPH: u32 = 8;

pub enum CaptionFont {
    Outline { font: FontVec, source: PathBuf },
    Builtin,
}

impl std::fmt::Debug for CaptionFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptionFont::Outline { source, .. } => write!(f, "Outline({})", source.display()),
            CaptionFont::Builtin => f.write_str("Builtin"),
        }
    }
}

impl CaptionFont {
    pub fn is_builtin(&self) -> bool {
        matches!(self, CaptionFont::Builtin)
    }

    fn builtin_scale(size: f32) -> u32 {
        (size / BUILTIN_GLYPH as f32).round().max(1.0) as u32
    }

    /// Width and height of `text` rendered at `size` pixels.
    pub fn measure(&self, text: &str, size: f32) -> (u32, u32) {
        match self {
            CaptionFont::Outline { font, .. } => {
                let (w, h) = text_size(PxScale::from(size), font, text);
                (w as u32, h as u32)
            }
            CaptionFont::Builtin => {
                let cell = BUILTIN_GLYPH * Self::builtin_scale(size);
                (text.chars().count() as u32 * cell, cell)
            }
        }
    }

    /// Draw `text` with its top-left corner at `(x, y)`. Pixels outside the
    /// image are clipped.
    pub fn draw(&self, image: &mut RgbaImage, x: i32, y: i32, size: f32, color: Rgba<u8>, text: &str) {
        match self {
            CaptionFont::Outline { font, .. } => {
                draw_text_mut(image, color, x, y, PxScale::from(size), font, text);
            }
            CaptionFont::Builtin => draw_builtin(image, x, y, Self::builtin_scale(size), color, text),
        }
    }
}

fn draw_builtin(image: &mut RgbaImage, x: i32, y: i32, scale: u32, color: Rgba<u8>, text: &str) {
    let (width, height) = (image.width() as i32, image.height() as i32);
    let cell = (BUILTIN_GLYPH * scale) as i32;
    let scale = scale as i32;

    for (i, ch) in text.chars().enumerate() {
        let glyph = BASIC_FONTS
            .get(ch)
            .or_else(|| BASIC_FONTS.get('?'))
            .unwrap_or([0; 8]);
        let origin_x = x + i as i32 * cell;

        for (row, &bits) in glyph.iter().enumerate() {
            for col in 0..8i32 {
                if bits & (1u8 << col) == 0 {
                    continue;
                }
                for dy in 0..scale {
                    for dx in 0..scale {
                        let px = origin_x + col * scale + dx;
                        let py = y + row as i32 * scale + dy;
                        if px >= 0 && py >= 0 && px < width && py < height {
                            image.put_pixel(px as u32, py as u32, color);
                        }
                    }
                }
            }
        }
    }
}

/// Ordered list of font files to try before the built-in font.
#[derive(Debug, Clone)]
pub struct FontChain {
    candidates: Vec<PathBuf>,
}

impl FontChain {
    pub fn new(candidates: Vec<PathBuf>) -> Self {
        Self { candidates }
    }

    /// Bundled regional font first, then the system-installed one.
    pub fn bundled_then_system(bundled: impl Into<PathBuf>, system: impl Into<PathBuf>) -> Self {
        Self::new(vec![bundled.into(), system.into()])
    }

    /// Resolve the chain. Returns the font and one warning per skipped step.
    pub fn resolve(&self) -> (CaptionFont, Vec<String>) {
        let mut warnings = Vec::new();

        for path in &self.candidates {
            match load_font(path) {
                Ok(font) => {
                    debug!(font = %path.display(), "caption font resolved");
                    return (
                        CaptionFont::Outline {
                            font,
                            source: path.clone(),
                        },
                        warnings,
                    );
                }
                Err(reason) => {
                    warn!(font = %path.display(), %reason, "caption font unavailable, falling back");
                    warnings.push(format!("font {}: {}", path.display(), reason));
                }
            }
        }

        warn!("no caption font could be loaded, using built-in bitmap font");
        warnings.push("using built-in bitmap font".to_string());
        (CaptionFont::Builtin, warnings)
    }
}

fn load_font(path: &Path) -> Result<FontVec, String> {
    let data = std::fs::read(path).map_err(|e| e.to_string())?;
    // index 0 also covers .ttc collections
    FontVec::try_from_vec_and_index(data, 0).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_fonts_fall_back_to_builtin() {
        let chain = FontChain::bundled_then_system(
            "/definitely/not/here/bundled.ttf",
            "/definitely/not/here/system.ttc",
        );
        let (font, warnings) = chain.resolve();
        assert!(font.is_builtin());
        assert_eq!(warnings.len(), 3);
        assert!(warnings[0].contains("bundled.ttf"));
        assert!(warnings[1].contains("system.ttc"));
    }

    #[test]
    fn test_corrupt_font_file_is_skipped() {
        let dir = tempdir().unwrap();
        let bogus = dir.path().join("bogus.ttf");
        std::fs::write(&bogus, b"not a font at all").unwrap();

        let (font, warnings) = FontChain::new(vec![bogus]).resolve();
        assert!(font.is_builtin());
        assert!(warnings[0].contains("bogus.ttf"));
    }

    #[test]
    fn test_builtin_measure_scales_with_size() {
        let font = CaptionFont::Builtin;
        assert_eq!(font.measure("abc", 8.0), (24, 8));
        assert_eq!(font.measure("abc", 16.0), (48, 16));
        assert_eq!(font.measure("", 16.0), (0, 16));
    }

    #[test]
    fn test_builtin_draw_marks_pixels_and_clips() {
        let mut image = RgbaImage::from_pixel(40, 20, Rgba([0, 0, 0, 255]));
        let white = Rgba([255, 255, 255, 255]);
        CaptionFont::Builtin.draw(&mut image, 2, 2, 8.0, white, "HI");
        assert!(image.pixels().any(|p| *p == white));

        // partially off-canvas must not panic
        CaptionFont::Builtin.draw(&mut image, -5, 15, 16.0, white, "clip");
    }

    #[test]
    fn test_builtin_unknown_glyph_uses_placeholder() {
        let mut image = RgbaImage::from_pixel(16, 16, Rgba([0, 0, 0, 255]));
        let white = Rgba([255, 255, 255, 255]);
        CaptionFont::Builtin.draw(&mut image, 0, 0, 8.0, white, "你");
        assert!(image.pixels().any(|p| *p == white));
    }
}
