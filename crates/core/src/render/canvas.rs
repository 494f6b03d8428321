//! Minimal immediate-mode software canvas.
//!
//! Pixels are linear RGB floats. Shapes are blended with a per-call alpha and
//! shifted by the current translation. Text is not rasterised: runs are
//! recorded per frame for the host to lay out.

use super::Color;

/// Largest side length of the backing store, in device pixels.
pub const MAX_CANVAS_SIDE: u32 = 8_192;

#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub x: f32,
    pub y: f32,
    pub text: String,
    pub color: Color,
}

#[derive(Debug, Clone)]
pub struct Canvas {
    width: u32,
    height: u32,
    pixels: Vec<Color>,
    translation: (f32, f32),
    text: Vec<TextRun>,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        let mut canvas = Self {
            width: 0,
            height: 0,
            pixels: Vec::new(),
            translation: (0.0, 0.0),
            text: Vec::new(),
        };
        canvas.resize(width, height);
        canvas
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Reallocates the backing store. Contents are cleared to black. Each
    /// side is clamped to `1..=MAX_CANVAS_SIDE`.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width > MAX_CANVAS_SIDE || height > MAX_CANVAS_SIDE {
            tracing::warn!(width, height, max = MAX_CANVAS_SIDE, "canvas size clamped");
        }
        self.width = width.clamp(1, MAX_CANVAS_SIDE);
        self.height = height.clamp(1, MAX_CANVAS_SIDE);
        let len = (self.width as usize).saturating_mul(self.height as usize);
        self.pixels = vec![Color::BLACK; len];
    }

    /// Starts a frame: drops last frame's text runs and the translation.
    pub fn begin_frame(&mut self) {
        self.text.clear();
        self.translation = (0.0, 0.0);
    }

    pub fn translate(&mut self, dx: f32, dy: f32) {
        self.translation = (dx, dy);
    }

    pub fn translation(&self) -> (f32, f32) {
        self.translation
    }

    /// Blends `color` over the whole surface. A low alpha leaves fading
    /// trails of whatever was drawn before.
    pub fn fill(&mut self, color: Color, alpha: f32) {
        if alpha <= 0.0 {
            return;
        }
        for pixel in &mut self.pixels {
            *pixel = pixel.mix(color, alpha);
        }
    }

    pub fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: Color, alpha: f32) {
        let (x, y) = (x + self.translation.0, y + self.translation.1);
        let x0 = x.floor().max(0.0) as u32;
        let y0 = y.floor().max(0.0) as u32;
        let x1 = ((x + w).ceil().max(0.0) as u32).min(self.width);
        let y1 = ((y + h).ceil().max(0.0) as u32).min(self.height);
        for py in y0..y1 {
            for px in x0..x1 {
                let index = self.index(px, py);
                self.pixels[index] = self.pixels[index].mix(color, alpha);
            }
        }
    }

    pub fn fill_circle(&mut self, cx: f32, cy: f32, radius: f32, color: Color, alpha: f32) {
        let (cx, cy) = (cx + self.translation.0, cy + self.translation.1);
        let r = radius.max(0.0);
        let x0 = (cx - r).floor().max(0.0) as u32;
        let y0 = (cy - r).floor().max(0.0) as u32;
        let x1 = ((cx + r).ceil().max(0.0) as u32).min(self.width);
        let y1 = ((cy + r).ceil().max(0.0) as u32).min(self.height);
        for py in y0..y1 {
            for px in x0..x1 {
                let dx = px as f32 + 0.5 - cx;
                let dy = py as f32 + 0.5 - cy;
                if dx * dx + dy * dy <= r * r {
                    let index = self.index(px, py);
                    self.pixels[index] = self.pixels[index].mix(color, alpha);
                }
            }
        }
    }

    pub fn draw_text(&mut self, x: f32, y: f32, text: impl Into<String>, color: Color) {
        self.text.push(TextRun {
            x: x + self.translation.0,
            y: y + self.translation.1,
            text: text.into(),
            color,
        });
    }

    pub fn text_runs(&self) -> &[TextRun] {
        &self.text
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Color> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels.get(self.index(x, y)).copied()
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    pub fn mean_luma(&self) -> f32 {
        let sum: f32 = self.pixels.iter().map(|p| p.luma()).sum();
        sum / self.pixels.len() as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_reallocates_backing_store() {
        let mut canvas = Canvas::new(4, 4);
        canvas.resize(8, 2);
        assert_eq!((canvas.width(), canvas.height()), (8, 2));
        assert!(canvas.pixel(7, 1).is_some());
        assert!(canvas.pixel(0, 2).is_none());
    }

    #[test]
    fn oversized_surface_is_clamped() {
        let mut canvas = Canvas::new(70_000, 1);
        assert_eq!((canvas.width(), canvas.height()), (MAX_CANVAS_SIDE, 1));

        canvas.resize(2, u32::MAX);
        assert_eq!((canvas.width(), canvas.height()), (2, MAX_CANVAS_SIDE));
        canvas.fill_rect(0.0, 0.0, 1e9, 1e9, Color::WHITE, 1.0);
        assert_eq!(canvas.pixel(1, MAX_CANVAS_SIDE - 1), Some(Color::WHITE));
        assert!(canvas.pixel(0, MAX_CANVAS_SIDE).is_none());
    }

    #[test]
    fn low_alpha_fill_leaves_trails() {
        let mut canvas = Canvas::new(2, 1);
        canvas.fill_rect(0.0, 0.0, 1.0, 1.0, Color::WHITE, 1.0);
        canvas.fill(Color::BLACK, 0.25);

        let trail = canvas.pixel(0, 0).unwrap();
        assert!((trail.r - 0.75).abs() < 1e-6);
        assert_eq!(canvas.pixel(1, 0), Some(Color::BLACK));
    }

    #[test]
    fn shapes_are_translated_and_clipped() {
        let mut canvas = Canvas::new(4, 4);
        canvas.translate(2.0, 2.0);
        canvas.fill_rect(0.0, 0.0, 10.0, 10.0, Color::WHITE, 1.0);

        assert_eq!(canvas.pixel(1, 1), Some(Color::BLACK));
        assert_eq!(canvas.pixel(3, 3), Some(Color::WHITE));

        canvas.fill_circle(-50.0, -50.0, 3.0, Color::WHITE, 1.0);
        canvas.begin_frame();
        assert_eq!(canvas.translation(), (0.0, 0.0));
    }
}
