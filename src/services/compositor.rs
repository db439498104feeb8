// src/services/compositor.rs
use base64::{Engine as _, engine::general_purpose};
use image::{GenericImageView, Rgba, RgbaImage};

use crate::editor::{CANVAS_HEIGHT, CANVAS_WIDTH, CanvasEditor, MAX_INSERT_SIZE};
use crate::errors::MontageError;
use crate::models::{HandleKind, ImageLayer};

const BACKGROUND: Rgba<u8> = Rgba([0xf9, 0xfa, 0xfb, 0xff]);
const SELECTION_BLUE: Rgba<u8> = Rgba([0x3b, 0x82, 0xf6, 0xff]);
const HANDLE_GREEN: Rgba<u8> = Rgba([0x10, 0xb9, 0x81, 0xff]);
const WHITE: Rgba<u8> = Rgba([0xff, 0xff, 0xff, 0xff]);

/// Rasterizes the canvas: layers in z-order with their affine transforms,
/// plus the selection overlay. The snapshot is what gets fed to the
/// enhancement job, overlay included, matching the interactive canvas.
pub struct Compositor;

impl Compositor {
    pub fn new() -> Self {
        Self
    }

    /// Decodes and size-checks an incoming image, returning its natural
    /// dimensions.
    pub fn validate_image(&self, data: &[u8]) -> Result<(u32, u32), MontageError> {
        let img = image::load_from_memory(data)
            .map_err(|e| MontageError::ImageProcessing(format!("Invalid image format: {}", e)))?;

        let (width, height) = img.dimensions();
        if width > 4096 || height > 4096 {
            return Err(MontageError::ImageProcessing(
                "Image dimensions exceed 4096x4096".to_string(),
            ));
        }
        Ok((width, height))
    }

    /// Display size at insertion: natural aspect ratio fit into a 200px box.
    pub fn insertion_size(natural_width: u32, natural_height: u32) -> (f64, f64) {
        let aspect = natural_width as f64 / natural_height as f64;
        if aspect > 1.0 {
            (MAX_INSERT_SIZE, MAX_INSERT_SIZE / aspect)
        } else {
            (MAX_INSERT_SIZE * aspect, MAX_INSERT_SIZE)
        }
    }

    pub fn render(&self, editor: &CanvasEditor) -> Result<RgbaImage, MontageError> {
        let width = CANVAS_WIDTH as u32;
        let height = CANVAS_HEIGHT as u32;
        let mut target = RgbaImage::from_pixel(width, height, BACKGROUND);

        for layer in editor.layers() {
            self.draw_layer(&mut target, layer)?;
            if editor.selected() == Some(layer.id) {
                draw_selection_overlay(&mut target, layer);
            }
        }
        Ok(target)
    }

    pub fn snapshot_png(&self, editor: &CanvasEditor) -> Result<Vec<u8>, MontageError> {
        let rendered = self.render(editor)?;
        let mut output = Vec::new();
        image::DynamicImage::ImageRgba8(rendered)
            .write_to(
                &mut std::io::Cursor::new(&mut output),
                image::ImageFormat::Png,
            )
            .map_err(|e| {
                MontageError::ImageProcessing(format!("Failed to encode snapshot: {}", e))
            })?;
        Ok(output)
    }

    /// JPEG snapshot wrapped as a data URI; this is the enhancement input.
    pub fn snapshot_jpeg_data_uri(&self, editor: &CanvasEditor) -> Result<String, MontageError> {
        let rendered = image::DynamicImage::ImageRgba8(self.render(editor)?).to_rgb8();
        let mut output = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut output);
        let mut encoder =
            image::codecs::jpeg::JpegEncoder::new_with_quality(&mut cursor, 90);
        encoder
            .encode(
                rendered.as_raw(),
                rendered.width(),
                rendered.height(),
                image::ColorType::Rgb8,
            )
            .map_err(|e| {
                MontageError::ImageProcessing(format!("Failed to encode snapshot: {}", e))
            })?;
        Ok(format!(
            "data:image/jpeg;base64,{}",
            general_purpose::STANDARD.encode(output)
        ))
    }

    /// Draws one layer: translate to its transformed center, rotate, scale,
    /// blit the raster centered. Implemented as an inverse mapping over the
    /// destination bounding box with nearest-neighbor sampling.
    fn draw_layer(&self, target: &mut RgbaImage, layer: &ImageLayer) -> Result<(), MontageError> {
        let raster = image::load_from_memory(&layer.data)
            .map_err(|e| {
                MontageError::ImageProcessing(format!(
                    "Failed to decode layer {}: {}",
                    layer.id, e
                ))
            })?
            .to_rgba8();
        let (natural_w, natural_h) = (raster.width() as f64, raster.height() as f64);
        if natural_w == 0.0 || natural_h == 0.0 {
            return Ok(());
        }

        let (cx, cy) = layer.center();
        let theta = layer.rotation.to_radians();
        let (sin, cos) = theta.sin_cos();
        let half_w = layer.scaled_width() / 2.0;
        let half_h = layer.scaled_height() / 2.0;

        // Bounding box of the rotated rect, clamped to the canvas.
        let corners = [
            (-half_w, -half_h),
            (half_w, -half_h),
            (half_w, half_h),
            (-half_w, half_h),
        ];
        let mut min_x = f64::MAX;
        let mut min_y = f64::MAX;
        let mut max_x = f64::MIN;
        let mut max_y = f64::MIN;
        for (dx, dy) in corners {
            let rx = cx + dx * cos - dy * sin;
            let ry = cy + dx * sin + dy * cos;
            min_x = min_x.min(rx);
            min_y = min_y.min(ry);
            max_x = max_x.max(rx);
            max_y = max_y.max(ry);
        }
        let x0 = min_x.floor().max(0.0) as u32;
        let y0 = min_y.floor().max(0.0) as u32;
        let x1 = (max_x.ceil().min(CANVAS_WIDTH) as u32).min(target.width());
        let y1 = (max_y.ceil().min(CANVAS_HEIGHT) as u32).min(target.height());

        for py in y0..y1 {
            for px in x0..x1 {
                // Map the destination pixel back into unrotated, unscaled
                // layer space.
                let dx = px as f64 + 0.5 - cx;
                let dy = py as f64 + 0.5 - cy;
                let lx = (dx * cos + dy * sin) / layer.scale + layer.width / 2.0;
                let ly = (-dx * sin + dy * cos) / layer.scale + layer.height / 2.0;
                if lx < 0.0 || ly < 0.0 || lx >= layer.width || ly >= layer.height {
                    continue;
                }
                let sx = ((lx / layer.width * natural_w) as u32).min(raster.width() - 1);
                let sy = ((ly / layer.height * natural_h) as u32).min(raster.height() - 1);
                let src = *raster.get_pixel(sx, sy);
                blend_pixel(target, px, py, src);
            }
        }
        Ok(())
    }
}

impl Default for Compositor {
    fn default() -> Self {
        Self::new()
    }
}

fn draw_selection_overlay(target: &mut RgbaImage, layer: &ImageLayer) {
    // Dashed bounding box around the scaled, axis-aligned extent.
    stroke_rect_dashed(
        target,
        layer.x,
        layer.y,
        layer.scaled_width(),
        layer.scaled_height(),
        SELECTION_BLUE,
    );

    let handles = CanvasEditor::transform_handles(layer);

    // Guide line from the top-center down to the rotate handle.
    if let Some(rotate) = handles.iter().find(|h| h.kind == HandleKind::Rotate) {
        let (cx, _) = layer.center();
        let top = rotate.y + rotate.size / 2.0;
        draw_vline(target, cx, top, layer.y, HANDLE_GREEN);
    }

    for handle in handles {
        let color = match handle.kind {
            HandleKind::Scale => SELECTION_BLUE,
            HandleKind::Rotate => HANDLE_GREEN,
        };
        fill_rect(target, handle.x, handle.y, handle.size, handle.size, color);
        stroke_rect(target, handle.x, handle.y, handle.size, handle.size, WHITE);
    }
}

fn put_pixel(target: &mut RgbaImage, x: i64, y: i64, color: Rgba<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < target.width() && (y as u32) < target.height() {
        target.put_pixel(x as u32, y as u32, color);
    }
}

fn blend_pixel(target: &mut RgbaImage, x: u32, y: u32, src: Rgba<u8>) {
    let alpha = src[3] as u32;
    if alpha == 255 {
        target.put_pixel(x, y, src);
        return;
    }
    if alpha == 0 {
        return;
    }
    let dst = *target.get_pixel(x, y);
    let inv = 255 - alpha;
    let mix = |s: u8, d: u8| ((s as u32 * alpha + d as u32 * inv) / 255) as u8;
    target.put_pixel(
        x,
        y,
        Rgba([
            mix(src[0], dst[0]),
            mix(src[1], dst[1]),
            mix(src[2], dst[2]),
            255,
        ]),
    );
}

fn fill_rect(target: &mut RgbaImage, x: f64, y: f64, w: f64, h: f64, color: Rgba<u8>) {
    let (x, y) = (x.round() as i64, y.round() as i64);
    for dy in 0..h.round() as i64 {
        for dx in 0..w.round() as i64 {
            put_pixel(target, x + dx, y + dy, color);
        }
    }
}

fn stroke_rect(target: &mut RgbaImage, x: f64, y: f64, w: f64, h: f64, color: Rgba<u8>) {
    let (x0, y0) = (x.round() as i64, y.round() as i64);
    let (x1, y1) = (x0 + w.round() as i64 - 1, y0 + h.round() as i64 - 1);
    for px in x0..=x1 {
        put_pixel(target, px, y0, color);
        put_pixel(target, px, y1, color);
    }
    for py in y0..=y1 {
        put_pixel(target, x0, py, color);
        put_pixel(target, x1, py, color);
    }
}

// 5px-on / 5px-off dashes, the pattern the interactive canvas uses.
fn stroke_rect_dashed(target: &mut RgbaImage, x: f64, y: f64, w: f64, h: f64, color: Rgba<u8>) {
    let (x0, y0) = (x.round() as i64, y.round() as i64);
    let (x1, y1) = (x0 + w.round() as i64 - 1, y0 + h.round() as i64 - 1);
    let dash = |offset: i64| offset % 10 < 5;
    for (i, px) in (x0..=x1).enumerate() {
        if dash(i as i64) {
            put_pixel(target, px, y0, color);
            put_pixel(target, px, y1, color);
        }
    }
    for (i, py) in (y0..=y1).enumerate() {
        if dash(i as i64) {
            put_pixel(target, x0, py, color);
            put_pixel(target, x1, py, color);
        }
    }
}

fn draw_vline(target: &mut RgbaImage, x: f64, y_from: f64, y_to: f64, color: Rgba<u8>) {
    let x = x.round() as i64;
    let (top, bottom) = if y_from <= y_to {
        (y_from.round() as i64, y_to.round() as i64)
    } else {
        (y_to.round() as i64, y_from.round() as i64)
    };
    for py in top..=bottom {
        put_pixel(target, x, py, color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ImageLayer;

    fn solid_png(width: u32, height: u32, color: Rgba<u8>) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, color);
        let mut data = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(
                &mut std::io::Cursor::new(&mut data),
                image::ImageFormat::Png,
            )
            .unwrap();
        data
    }

    #[test]
    fn insertion_size_fits_the_200px_box_preserving_aspect() {
        // Landscape: width caps at 200.
        assert_eq!(Compositor::insertion_size(400, 300), (200.0, 150.0));
        // Portrait: height caps at 200.
        assert_eq!(Compositor::insertion_size(300, 400), (150.0, 200.0));
        // Square fills the box.
        assert_eq!(Compositor::insertion_size(512, 512), (200.0, 200.0));
    }

    #[test]
    fn validate_image_rejects_garbage_and_oversized() {
        let compositor = Compositor::new();
        assert!(compositor.validate_image(b"not an image").is_err());

        let ok = solid_png(4, 4, Rgba([10, 20, 30, 255]));
        assert_eq!(compositor.validate_image(&ok).unwrap(), (4, 4));

        let big = solid_png(4097, 1, Rgba([0, 0, 0, 255]));
        assert!(compositor.validate_image(&big).is_err());
    }

    #[test]
    fn render_paints_layers_in_z_order() {
        let red = solid_png(10, 10, Rgba([255, 0, 0, 255]));
        let green = solid_png(10, 10, Rgba([0, 255, 0, 255]));

        let mut editor = CanvasEditor::new();
        let mut bottom = ImageLayer::new("red".into(), red, 100.0, 100.0, 100.0, 100.0);
        bottom.scale = 1.0;
        let top = ImageLayer::new("green".into(), green, 100.0, 100.0, 100.0, 100.0);
        editor.add_layer(bottom);
        editor.add_layer(top);

        let compositor = Compositor::new();
        let rendered = compositor.render(&editor).unwrap();
        // Both layers cover (150, 150); the later one must win.
        assert_eq!(*rendered.get_pixel(150, 150), Rgba([0, 255, 0, 255]));
        // Outside every layer the background shows.
        assert_eq!(*rendered.get_pixel(700, 500), BACKGROUND);
    }

    #[test]
    fn rotated_layer_paints_outside_its_unrotated_box() {
        let blue = solid_png(10, 10, Rgba([0, 0, 255, 255]));
        let mut layer = ImageLayer::new("blue".into(), blue, 200.0, 50.0, 300.0, 275.0);
        layer.rotation = 90.0;

        let mut editor = CanvasEditor::new();
        editor.add_layer(layer);

        let rendered = Compositor::new().render(&editor).unwrap();
        // Center (400, 300) stays covered.
        assert_eq!(*rendered.get_pixel(400, 300), Rgba([0, 0, 255, 255]));
        // A point inside the unrotated 200x50 extent but outside the rotated
        // one is background now.
        assert_eq!(*rendered.get_pixel(310, 300), BACKGROUND);
        // And the rotated extent reaches above the old top edge.
        assert_eq!(*rendered.get_pixel(400, 220), Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn selection_overlay_marks_the_selected_layer() {
        let red = solid_png(10, 10, Rgba([255, 0, 0, 255]));
        let layer = ImageLayer::new("red".into(), red, 100.0, 100.0, 200.0, 200.0);
        let id = layer.id;

        let mut editor = CanvasEditor::new();
        editor.add_layer(layer);
        editor.select(id).unwrap();

        let rendered = Compositor::new().render(&editor).unwrap();
        // First dash of the top edge.
        assert_eq!(*rendered.get_pixel(200, 200), SELECTION_BLUE);
        // Rotate handle block above the top-center.
        assert_eq!(*rendered.get_pixel(250, 173), HANDLE_GREEN);
    }

    #[test]
    fn jpeg_snapshot_is_a_data_uri() {
        let red = solid_png(10, 10, Rgba([255, 0, 0, 255]));
        let mut editor = CanvasEditor::new();
        editor.add_layer(ImageLayer::new("red".into(), red, 100.0, 100.0, 0.0, 0.0));

        let uri = Compositor::new().snapshot_jpeg_data_uri(&editor).unwrap();
        assert!(uri.starts_with("data:image/jpeg;base64,"));

        let encoded = uri.trim_start_matches("data:image/jpeg;base64,");
        let bytes = general_purpose::STANDARD.decode(encoded).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (800, 600));
    }
}
