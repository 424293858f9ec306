//! Synthetic frames for tests: skin-coloured ellipses with dark features on
//! a plain background.

use crate::logic::signal::{ImageFrame, SignalNormalizer};

pub const SKIN: [u8; 3] = [224, 172, 140];
pub const FEATURE: [u8; 3] = [40, 30, 30];
pub const BACKGROUND: [u8; 3] = [255, 255, 255];

#[derive(Debug, Clone, Copy)]
pub struct FaceSpec {
    pub cx: i32,
    pub cy: i32,
    /// Half width / half height of the face ellipse
    pub rx: i32,
    pub ry: i32,
    /// (left eye x, right eye x, eye y) as fractions of the face box
    pub eyes: Option<(f32, f32, f32)>,
    pub eye_radius: i32,
    /// Vertical dark stripe down the middle instead of eyes
    pub stripe: bool,
}

impl FaceSpec {
    pub fn centered(cx: i32, cy: i32) -> Self {
        Self {
            cx,
            cy,
            rx: 50,
            ry: 65,
            eyes: Some((0.35, 0.65, 0.45)),
            eye_radius: 7,
            stripe: false,
        }
    }

    pub fn eyes_at(mut self, left: f32, right: f32, y: f32) -> Self {
        self.eyes = Some((left, right, y));
        self
    }

    pub fn with_stripe(mut self) -> Self {
        self.eyes = None;
        self.stripe = true;
        self
    }

    /// Plain skin ellipse: face shaped, nothing inside
    pub fn featureless(mut self) -> Self {
        self.eyes = None;
        self.stripe = false;
        self
    }

    fn box_point(&self, fx: f32, fy: f32) -> (i32, i32) {
        let left = self.cx - self.rx;
        let top = self.cy - self.ry;
        (
            left + (fx * 2.0 * self.rx as f32) as i32,
            top + (fy * 2.0 * self.ry as f32) as i32,
        )
    }

    fn paint(&self, x: i32, y: i32) -> Option<[u8; 3]> {
        let dx = (x - self.cx) as f32 / self.rx as f32;
        let dy = (y - self.cy) as f32 / self.ry as f32;
        if dx * dx + dy * dy > 1.0 {
            return None;
        }

        if let Some((left, right, ey)) = self.eyes {
            for ex in [left, right] {
                let (px, py) = self.box_point(ex, ey);
                if (x - px).pow(2) + (y - py).pow(2) <= self.eye_radius.pow(2) {
                    return Some(FEATURE);
                }
            }
        }
        if self.stripe {
            let (x0, y0) = self.box_point(0.45, 0.3);
            let (x1, y1) = self.box_point(0.55, 0.7);
            if (x0..=x1).contains(&x) && (y0..=y1).contains(&y) {
                return Some(FEATURE);
            }
        }
        Some(SKIN)
    }
}

pub fn blank_frame(width: u32, height: u32, color: [u8; 3]) -> ImageFrame {
    let pixels = color.iter().copied().cycle().take(width as usize * height as usize * 3).collect();
    SignalNormalizer::default().image_from_raw(pixels, width, height).unwrap()
}

pub fn face_frame(width: u32, height: u32, faces: &[FaceSpec]) -> ImageFrame {
    let mut pixels = Vec::with_capacity(width as usize * height as usize * 3);
    for y in 0..height as i32 {
        for x in 0..width as i32 {
            let color = faces.iter().find_map(|f| f.paint(x, y)).unwrap_or(BACKGROUND);
            pixels.extend_from_slice(&color);
        }
    }
    SignalNormalizer::default().image_from_raw(pixels, width, height).unwrap()
}

/// PNG-encode a frame, as a browser upload would arrive
pub fn encode_png(frame: &ImageFrame) -> Vec<u8> {
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgb8(frame.to_rgb_image())
        .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}
