//! Burns a caption into a frame: centered text on a translucent dark box
//! anchored near the bottom edge.

use super::font::CaptionFont;
use super::media::Frame;
use crate::error::RenderError;
use image::{DynamicImage, ImageFormat, Rgba};
use imageproc::drawing::{draw_filled_rect_mut, Blend};
use imageproc::rect::Rect;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct OverlayStyle {
    pub font_size: f32,
    /// Gap between the text and the bottom edge of the image
    pub bottom_margin: i32,
    pub pad_x: i32,
    pub pad_y: i32,
    pub box_color: Rgba<u8>,
    pub text_color: Rgba<u8>,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            font_size: 20.0,
            bottom_margin: 15,
            pad_x: 10,
            pad_y: 8,
            box_color: Rgba([0, 0, 0, 180]),
            text_color: Rgba([255, 255, 255, 255]),
        }
    }
}

/// Where the caption text and its background box go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptionLayout {
    pub text_x: i32,
    pub text_y: i32,
    pub box_x: i32,
    pub box_y: i32,
    pub box_width: u32,
    pub box_height: u32,
}

impl CaptionLayout {
    pub fn compute(
        image_width: u32,
        image_height: u32,
        text_width: u32,
        text_height: u32,
        style: &OverlayStyle,
    ) -> Self {
        let text_x = (image_width as i32 - text_width as i32) / 2;
        let text_y = image_height as i32 - text_height as i32 - style.bottom_margin;

        Self {
            text_x,
            text_y,
            box_x: text_x - style.pad_x,
            box_y: text_y - style.pad_y,
            box_width: (text_width as i32 + 2 * style.pad_x).max(1) as u32,
            box_height: (text_height as i32 + 2 * style.pad_y).max(1) as u32,
        }
    }
}

pub struct OverlayRenderer {
    font: CaptionFont,
    style: OverlayStyle,
}

impl OverlayRenderer {
    pub fn new(font: CaptionFont, style: OverlayStyle) -> Self {
        Self { font, style }
    }

    pub fn font(&self) -> &CaptionFont {
        &self.font
    }

    /// Return `image` with `caption` burned in. A blank caption returns an
    /// unmodified copy.
    pub fn render(&self, image: &DynamicImage, caption: &str) -> DynamicImage {
        let caption = caption.trim();
        if caption.is_empty() {
            return image.clone();
        }

        let (text_width, text_height) = self.font.measure(caption, self.style.font_size);
        let layout = CaptionLayout::compute(
            image.width(),
            image.height(),
            text_width,
            text_height,
            &self.style,
        );

        let mut canvas = Blend(image.to_rgba8());
        draw_filled_rect_mut(
            &mut canvas,
            Rect::at(layout.box_x, layout.box_y).of_size(layout.box_width, layout.box_height),
            self.style.box_color,
        );
        let mut rgba = canvas.0;
        self.font.draw(
            &mut rgba,
            layout.text_x,
            layout.text_y,
            self.style.font_size,
            self.style.text_color,
            caption,
        );

        if image.color().has_alpha() {
            DynamicImage::ImageRgba8(rgba)
        } else {
            DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(rgba).to_rgb8())
        }
    }

    /// Caption a frame file in place. Returns `false` without touching the
    /// file when the caption is blank.
    pub fn caption_frame(&self, frame: &mut Frame, caption: &str) -> Result<bool, RenderError> {
        if caption.trim().is_empty() {
            return Ok(false);
        }

        let image = image::open(&frame.path)?;
        let captioned = self.render(&image, caption);
        write_png_atomically(&captioned, &frame.path)?;
        frame.captioned = true;
        Ok(true)
    }
}

/// Replace `path` only once the new PNG is fully written, so a failed write
/// leaves the original frame intact.
fn write_png_atomically(image: &DynamicImage, path: &Path) -> Result<(), RenderError> {
    let tmp = path.with_extension("png.tmp");
    if let Err(e) = image.save_with_format(&tmp, ImageFormat::Png) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.into());
    }
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::font::FontChain;
    use image::{Rgb, RgbImage};
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn builtin_renderer() -> OverlayRenderer {
        OverlayRenderer::new(CaptionFont::Builtin, OverlayStyle::default())
    }

    fn gray_frame(dir: &Path, name: &str) -> Frame {
        let path = dir.join(name);
        RgbImage::from_pixel(320, 240, Rgb([120, 120, 120]))
            .save(&path)
            .unwrap();
        Frame::new(1, path)
    }

    #[test]
    fn test_layout_centered_and_bottom_anchored() {
        let style = OverlayStyle::default();
        let layout = CaptionLayout::compute(640, 480, 100, 20, &style);
        assert_eq!(layout.text_x, 270);
        assert_eq!(layout.text_y, 480 - 20 - 15);
        assert_eq!(layout.box_x, 260);
        assert_eq!(layout.box_y, layout.text_y - 8);
        assert_eq!(layout.box_width, 120);
        assert_eq!(layout.box_height, 36);
    }

    #[test]
    fn test_layout_wider_than_image_goes_negative() {
        let layout = CaptionLayout::compute(100, 100, 300, 20, &OverlayStyle::default());
        assert_eq!(layout.text_x, -100);
    }

    #[test]
    fn test_render_blank_caption_is_identity() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 48, Rgb([1, 2, 3])));
        let out = builtin_renderer().render(&image, "   ");
        assert_eq!(out.as_bytes(), image.as_bytes());
    }

    #[test]
    fn test_render_darkens_box_and_draws_text() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(320, 240, Rgb([120, 120, 120])));
        let out = builtin_renderer().render(&image, "hello").to_rgb8();

        // top of the image untouched
        assert_eq!(out.get_pixel(5, 5), &Rgb([120, 120, 120]));
        // box padding area is darkened
        let (tw, th) = CaptionFont::Builtin.measure("hello", 20.0);
        let layout = CaptionLayout::compute(320, 240, tw, th, &OverlayStyle::default());
        let pad = out.get_pixel((layout.box_x + 2) as u32, (layout.box_y + 2) as u32);
        assert!(pad.0[0] < 120);
        // some text pixels are white
        assert!(out.pixels().any(|p| *p == Rgb([255, 255, 255])));
    }

    #[test]
    fn test_render_keeps_color_type() {
        let rgb = DynamicImage::ImageRgb8(RgbImage::new(50, 50));
        assert!(!builtin_renderer().render(&rgb, "x").color().has_alpha());
        let rgba = DynamicImage::ImageRgba8(image::RgbaImage::new(50, 50));
        assert!(builtin_renderer().render(&rgba, "x").color().has_alpha());
    }

    #[test]
    fn test_caption_frame_blank_leaves_file_byte_identical() {
        let dir = tempdir().unwrap();
        let mut frame = gray_frame(dir.path(), "frame_001.png");
        let before = std::fs::read(&frame.path).unwrap();

        let captioned = builtin_renderer().caption_frame(&mut frame, "").unwrap();

        assert!(!captioned);
        assert!(!frame.captioned);
        assert_eq!(std::fs::read(&frame.path).unwrap(), before);
    }

    #[test]
    fn test_caption_frame_with_missing_fonts_still_captions() {
        let dir = tempdir().unwrap();
        let mut frame = gray_frame(dir.path(), "frame_001.png");
        let before = std::fs::read(&frame.path).unwrap();

        let (font, _) = FontChain::bundled_then_system(
            dir.path().join("missing.ttf"),
            "/no/such/system/font.ttc",
        )
        .resolve();
        let renderer = OverlayRenderer::new(font, OverlayStyle::default());

        assert!(renderer.caption_frame(&mut frame, "你好 hello").unwrap());
        assert!(frame.captioned);
        assert_ne!(std::fs::read(&frame.path).unwrap(), before);
        assert!(!dir.path().join("frame_001.png.tmp").exists());
        image::open(&frame.path).unwrap();
    }

    #[test]
    fn test_failed_replace_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        // a non-empty directory where the frame should go makes the rename fail
        let target = dir.path().join("frame_001.png");
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("keep"), b"x").unwrap();

        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([0, 0, 0])));
        let result = write_png_atomically(&image, &target);

        assert!(matches!(result, Err(RenderError::Io(_))));
        assert!(!dir.path().join("frame_001.png.tmp").exists());
        assert!(target.join("keep").exists());
    }

    #[test]
    fn test_caption_frame_unreadable_image_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("frame_001.png");
        std::fs::write(&path, b"garbage").unwrap();
        let mut frame = Frame::new(1, PathBuf::from(&path));

        assert!(builtin_renderer().caption_frame(&mut frame, "text").is_err());
        assert!(!frame.captioned);
        assert_eq!(std::fs::read(&path).unwrap(), b"garbage");
    }
}
