//! Fallback Heuristics (no model)
//!
//! Deterministic stand-ins used when no ONNX model is configured. They are
//! coarse: skin-tone segmentation for faces, feature-centroid geometry for
//! pose, an intensity grid for identity. Good enough to keep the pipeline
//! honest on blank or obviously empty frames; real deployments configure
//! models.

use std::sync::Arc;

use image::imageops::FilterType;

use crate::constants::MAX_ANGLE_DEG;
use crate::logic::signal::ImageFrame;
use super::inference::InferenceError;
use super::providers::{
    BoundingBox, Detection, FaceEmbedder, FaceEmbedding, FaceLocator, FaceRegion, ObjectLocator,
    PoseAngles, PoseEstimator,
};

/// Fraction trimmed from each side of a face box to reach the feature area
const INNER_INSET: f32 = 0.2;

/// Expected vertical position of the eye/mouth centroid in a level face (0 = top)
const FEATURE_CENTER_Y: f32 = 0.45;

/// Non-skin pixels darker than this fraction of mean skin luma count as features
const FEATURE_LUMA_RATIO: f32 = 0.6;

/// Side of the identity grid
const EMBEDDING_GRID: u32 = 16;

/// RGB skin rule (uniform daylight)
pub fn is_skin([r, g, b]: [u8; 3]) -> bool {
    let (r, g, b) = (r as i32, g as i32, b as i32);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    r > 95 && g > 40 && b > 20 && max - min > 15 && (r - g).abs() > 15 && r > g && r > b
}

fn clip(bbox: &BoundingBox, frame: &ImageFrame) -> Result<BoundingBox, InferenceError> {
    BoundingBox::from_corners(
        bbox.x as f32,
        bbox.y as f32,
        (bbox.x + bbox.width) as f32,
        (bbox.y + bbox.height) as f32,
        frame.width(),
        frame.height(),
    )
    .ok_or_else(|| InferenceError::Failed("face region lies outside the frame".to_string()))
}

/// Dark non-skin pixels inside the inner face box: eyes, brows, mouth
#[derive(Debug, Clone, Copy)]
struct FeatureBlob {
    inner: BoundingBox,
    count: u32,
    min_count: u32,
    sum_x: f32,
    sum_y: f32,
}

impl FeatureBlob {
    /// `skin_luma` is the mean luma of the skin pixels in `face`
    fn measure(frame: &ImageFrame, face: &BoundingBox, skin_luma: f32) -> Self {
        let inner = face.inset(INNER_INSET);
        let cutoff = skin_luma * FEATURE_LUMA_RATIO;
        let (mut count, mut sum_x, mut sum_y) = (0u32, 0f32, 0f32);
        for y in inner.y..inner.y + inner.height {
            for x in inner.x..inner.x + inner.width {
                if !is_skin(frame.rgb(x, y)) && frame.luma(x, y) < cutoff {
                    count += 1;
                    sum_x += x as f32 + 0.5;
                    sum_y += y as f32 + 0.5;
                }
            }
        }

        Self {
            inner,
            count,
            min_count: (inner.area() / 500).max(4) as u32,
            sum_x,
            sum_y,
        }
    }

    fn is_present(&self) -> bool {
        self.count >= self.min_count
    }

    fn centroid(&self) -> Option<(f32, f32)> {
        self.is_present()
            .then(|| (self.sum_x / self.count as f32, self.sum_y / self.count as f32))
    }
}

/// Mean luma of the skin pixels in `b`, `None` without skin
fn mean_skin_luma(frame: &ImageFrame, b: &BoundingBox) -> Option<f32> {
    let (mut n, mut sum) = (0u64, 0f64);
    for y in b.y..b.y + b.height {
        for x in b.x..b.x + b.width {
            if is_skin(frame.rgb(x, y)) {
                n += 1;
                sum += frame.luma(x, y) as f64;
            }
        }
    }
    (n > 0).then(|| (sum / n as f64) as f32)
}

// ============================================================================
// SKIN-TONE FACE LOCATOR
// ============================================================================

/// Connected skin regions on a coarse grid, filtered by size and shape
#[derive(Debug, Clone)]
pub struct SkinToneLocator {
    /// Cells along the shorter frame side
    pub grid: u32,
    /// Minimum skin area relative to the frame
    pub min_area_fraction: f32,
    /// Minimum share of the bounding box covered by skin cells
    pub min_fill: f32,
    /// Accepted height / width range
    pub min_aspect: f32,
    pub max_aspect: f32,
    /// Regions whose box covers more of the frame than this are background
    pub max_frame_coverage: f32,
}

impl Default for SkinToneLocator {
    fn default() -> Self {
        Self {
            grid: 64,
            min_area_fraction: 0.01,
            min_fill: 0.35,
            min_aspect: 0.6,
            max_aspect: 2.5,
            max_frame_coverage: 0.8,
        }
    }
}

impl SkinToneLocator {
    fn skin_mask(&self, frame: &ImageFrame, cell: u32, cols: usize, rows: usize) -> Vec<bool> {
        let (w, h) = (frame.width(), frame.height());
        let mut mask = vec![false; cols * rows];

        for row in 0..rows {
            for col in 0..cols {
                let x0 = col as u32 * cell;
                let y0 = row as u32 * cell;
                let x1 = (x0 + cell).min(w);
                let y1 = (y0 + cell).min(h);

                let mut skin = 0u32;
                let mut total = 0u32;
                for y in y0..y1 {
                    for x in x0..x1 {
                        total += 1;
                        if is_skin(frame.rgb(x, y)) {
                            skin += 1;
                        }
                    }
                }
                mask[row * cols + col] = total > 0 && skin * 2 >= total;
            }
        }
        mask
    }
}

impl FaceLocator for SkinToneLocator {
    fn name(&self) -> &str {
        "skin-tone"
    }

    fn locate(&self, frame: &ImageFrame) -> Result<Vec<FaceRegion>, InferenceError> {
        let (w, h) = (frame.width(), frame.height());
        let cell = (w.min(h) / self.grid.max(1)).max(1);
        let cols = w.div_ceil(cell) as usize;
        let rows = h.div_ceil(cell) as usize;
        let mask = self.skin_mask(frame, cell, cols, rows);

        let frame_area = w as f32 * h as f32;
        let mut seen = vec![false; mask.len()];
        let mut faces = Vec::new();

        for start in 0..mask.len() {
            if !mask[start] || seen[start] {
                continue;
            }

            // Flood fill one 4-connected component
            let mut stack = vec![start];
            seen[start] = true;
            let (mut min_c, mut max_c) = (usize::MAX, 0usize);
            let (mut min_r, mut max_r) = (usize::MAX, 0usize);
            let mut count = 0usize;

            while let Some(idx) = stack.pop() {
                let (c, r) = (idx % cols, idx / cols);
                min_c = min_c.min(c);
                max_c = max_c.max(c);
                min_r = min_r.min(r);
                max_r = max_r.max(r);
                count += 1;

                let mut visit = |n: usize| {
                    if mask[n] && !seen[n] {
                        seen[n] = true;
                        stack.push(n);
                    }
                };
                if c > 0 {
                    visit(idx - 1);
                }
                if c + 1 < cols {
                    visit(idx + 1);
                }
                if r > 0 {
                    visit(idx - cols);
                }
                if r + 1 < rows {
                    visit(idx + cols);
                }
            }

            let bbox_cells = (max_c - min_c + 1) * (max_r - min_r + 1);
            let fill = count as f32 / bbox_cells as f32;

            let x = min_c as u32 * cell;
            let y = min_r as u32 * cell;
            let bbox = BoundingBox {
                x,
                y,
                width: ((max_c as u32 + 1) * cell).min(w) - x,
                height: ((max_r as u32 + 1) * cell).min(h) - y,
            };
            let area_fraction = bbox.area() as f32 * fill / frame_area;
            let aspect = bbox.height as f32 / bbox.width as f32;

            let shaped = area_fraction >= self.min_area_fraction
                && fill >= self.min_fill
                && (self.min_aspect..=self.max_aspect).contains(&aspect);
            let touches_every_edge =
                bbox.x == 0 && bbox.y == 0 && bbox.x + bbox.width == w && bbox.y + bbox.height == h;
            let background =
                touches_every_edge || bbox.area() as f32 / frame_area > self.max_frame_coverage;

            if shaped && !background && has_features(frame, &bbox) {
                faces.push(FaceRegion {
                    bbox,
                    confidence: fill.min(1.0),
                });
            }
        }

        faces.sort_by(|a, b| b.bbox.area().cmp(&a.bbox.area()));
        log::trace!("Skin-tone locator found {} face(s) in {}x{}", faces.len(), w, h);
        Ok(faces)
    }
}

/// A skin blob without dark features is a wall or a hand, not a face
fn has_features(frame: &ImageFrame, bbox: &BoundingBox) -> bool {
    mean_skin_luma(frame, bbox)
        .map(|luma| FeatureBlob::measure(frame, bbox, luma).is_present())
        .unwrap_or(false)
}

// ============================================================================
// GEOMETRIC POSE ESTIMATOR
// ============================================================================

/// Yaw/pitch from where the dark facial features sit inside the face box,
/// roll from the orientation of the skin blob.
///
/// Sign conventions: yaw < 0 when features shift toward image-left, pitch > 0
/// when they shift up, roll > 0 for a clockwise tilt in image coordinates.
#[derive(Debug, Clone, Default)]
pub struct GeometricPoseEstimator;

impl PoseEstimator for GeometricPoseEstimator {
    fn name(&self) -> &str {
        "geometric"
    }

    fn estimate(&self, frame: &ImageFrame, face: &FaceRegion) -> Result<PoseAngles, InferenceError> {
        let b = clip(&face.bbox, frame)?;

        // Skin moments over the whole box
        let (mut n, mut sx, mut sy, mut sxx, mut syy, mut sxy, mut luma_sum) =
            (0f64, 0f64, 0f64, 0f64, 0f64, 0f64, 0f64);
        for y in b.y..b.y + b.height {
            for x in b.x..b.x + b.width {
                if is_skin(frame.rgb(x, y)) {
                    let (fx, fy) = (x as f64, y as f64);
                    n += 1.0;
                    sx += fx;
                    sy += fy;
                    sxx += fx * fx;
                    syy += fy * fy;
                    sxy += fx * fy;
                    luma_sum += frame.luma(x, y) as f64;
                }
            }
        }
        if n == 0.0 {
            return Err(InferenceError::Featureless);
        }

        let (mx, my) = (sx / n, sy / n);
        let mu20 = sxx / n - mx * mx;
        let mu02 = syy / n - my * my;
        let mu11 = sxy / n - mx * my;
        let theta = (0.5 * (2.0 * mu11).atan2(mu20 - mu02)).to_degrees() as f32;
        let roll = if theta > 0.0 { theta - 90.0 } else { theta + 90.0 };

        let features = FeatureBlob::measure(frame, &b, (luma_sum / n) as f32);
        let (yaw, pitch) = match features.centroid() {
            None => (0.0, 0.0),
            Some((fx, fy)) => {
                let inner = features.inner;
                let half_w = inner.width as f32 / 2.0;
                let half_h = inner.height as f32 / 2.0;
                let center_x = inner.x as f32 + half_w;
                let reference_y = b.y as f32 + FEATURE_CENTER_Y * b.height as f32;
                (
                    (fx - center_x) / half_w * MAX_ANGLE_DEG,
                    -(fy - reference_y) / half_h * MAX_ANGLE_DEG,
                )
            }
        };

        Ok(PoseAngles {
            yaw: yaw.clamp(-MAX_ANGLE_DEG, MAX_ANGLE_DEG),
            pitch: pitch.clamp(-MAX_ANGLE_DEG, MAX_ANGLE_DEG),
            roll: roll.clamp(-MAX_ANGLE_DEG, MAX_ANGLE_DEG),
        })
    }
}

// ============================================================================
// INTENSITY-GRID EMBEDDER
// ============================================================================

/// Mean-centred luma of the inner face area on a 16x16 grid
#[derive(Debug, Clone, Default)]
pub struct IntensityGridEmbedder;

impl FaceEmbedder for IntensityGridEmbedder {
    fn name(&self) -> &str {
        "intensity-grid"
    }

    fn embed(&self, frame: &ImageFrame, face: &FaceRegion) -> Result<FaceEmbedding, InferenceError> {
        let inner = clip(&face.bbox, frame)?.inset(INNER_INSET);
        let crop = image::GrayImage::from_fn(inner.width, inner.height, |x, y| {
            image::Luma([frame.luma(inner.x + x, inner.y + y) as u8])
        });
        let grid = image::imageops::resize(&crop, EMBEDDING_GRID, EMBEDDING_GRID, FilterType::Triangle);

        let values: Vec<f32> = grid.pixels().map(|p| p[0] as f32).collect();
        let mean = values.iter().sum::<f32>() / values.len() as f32;
        FaceEmbedding::from_raw(values.into_iter().map(|v| v - mean).collect())
    }
}

// ============================================================================
// FACE-COUNT OBJECT LOCATOR
// ============================================================================

/// Reports every located face as a person. Without an object model this is
/// the only forbidden "object" that can be seen: a second person.
pub struct FaceCountObjectLocator {
    locator: Arc<dyn FaceLocator>,
    person_label: String,
}

impl FaceCountObjectLocator {
    pub fn new(locator: Arc<dyn FaceLocator>, person_label: &str) -> Self {
        Self {
            locator,
            person_label: person_label.to_string(),
        }
    }
}

impl ObjectLocator for FaceCountObjectLocator {
    fn name(&self) -> &str {
        "face-count"
    }

    fn detect(&self, frame: &ImageFrame) -> Result<Vec<Detection>, InferenceError> {
        let faces = self.locator.locate(frame)?;
        Ok(faces
            .into_iter()
            .map(|face| Detection {
                label: self.person_label.clone(),
                confidence: face.confidence,
                bbox: face.bbox,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::model::fixtures::{blank_frame, face_frame, FaceSpec, SKIN};

    const WARM_TONES: [[u8; 3]; 3] = [SKIN, [200, 120, 80], [180, 100, 60]];

    #[test]
    fn test_skin_rule() {
        assert!(is_skin([224, 172, 140]));
        assert!(!is_skin([255, 255, 255]));
        assert!(!is_skin([0, 0, 0]));
        assert!(!is_skin([40, 30, 30]));
    }

    #[test]
    fn test_blank_frame_has_no_faces() {
        let locator = SkinToneLocator::default();
        for color in [[255, 255, 255], [0, 0, 0], [90, 120, 200]] {
            let faces = locator.locate(&blank_frame(320, 240, color)).unwrap();
            assert!(faces.is_empty(), "unexpected face in {:?} frame", color);
        }

        // Skin-coloured walls fill the frame and carry no features
        for color in WARM_TONES {
            assert!(is_skin(color));
            for (w, h) in [(320, 240), (640, 480)] {
                let faces = locator.locate(&blank_frame(w, h, color)).unwrap();
                assert!(faces.is_empty(), "unexpected face in {:?} {}x{} frame", color, w, h);
            }
        }
    }

    #[test]
    fn test_featureless_skin_blob_is_not_a_face() {
        let frame = face_frame(320, 240, &[FaceSpec::centered(160, 120).featureless()]);
        assert!(SkinToneLocator::default().locate(&frame).unwrap().is_empty());

        let bbox = BoundingBox { x: 110, y: 55, width: 100, height: 130 };
        assert!(!has_features(&frame, &bbox));
        assert!(has_features(&face_frame(320, 240, &[FaceSpec::centered(160, 120)]), &bbox));
    }

    #[test]
    fn test_pose_without_skin_is_featureless() {
        let frame = blank_frame(320, 240, [255, 255, 255]);
        let face = FaceRegion {
            bbox: BoundingBox { x: 10, y: 10, width: 100, height: 100 },
            confidence: 1.0,
        };
        assert!(matches!(
            GeometricPoseEstimator.estimate(&frame, &face),
            Err(InferenceError::Featureless)
        ));
    }

    #[test]
    fn test_single_face_located() {
        let frame = face_frame(320, 240, &[FaceSpec::centered(160, 120)]);
        let faces = SkinToneLocator::default().locate(&frame).unwrap();
        assert_eq!(faces.len(), 1);

        let b = faces[0].bbox;
        assert!(b.x <= 112 && b.x + b.width >= 208, "bbox {:?}", b);
        assert!(b.y <= 57 && b.y + b.height >= 183, "bbox {:?}", b);
    }

    #[test]
    fn test_two_faces_located() {
        let frame = face_frame(
            480,
            240,
            &[FaceSpec::centered(110, 120), FaceSpec::centered(370, 120)],
        );
        let faces = SkinToneLocator::default().locate(&frame).unwrap();
        assert_eq!(faces.len(), 2);
    }

    #[test]
    fn test_frontal_face_is_centered() {
        let frame = face_frame(320, 240, &[FaceSpec::centered(160, 120)]);
        let face = SkinToneLocator::default().locate(&frame).unwrap()[0];
        let pose = GeometricPoseEstimator.estimate(&frame, &face).unwrap();
        assert!(pose.yaw.abs() < 10.0, "yaw {}", pose.yaw);
        assert!(pose.pitch.abs() < 10.0, "pitch {}", pose.pitch);
        assert!(pose.roll.abs() < 5.0, "roll {}", pose.roll);
    }

    #[test]
    fn test_features_left_give_negative_yaw() {
        let frame = face_frame(320, 240, &[FaceSpec::centered(160, 120).eyes_at(0.25, 0.45, 0.45)]);
        let face = SkinToneLocator::default().locate(&frame).unwrap()[0];
        let pose = GeometricPoseEstimator.estimate(&frame, &face).unwrap();
        assert!(pose.yaw < -30.0, "yaw {}", pose.yaw);
    }

    #[test]
    fn test_embedding_stable_for_same_face() {
        let frame = face_frame(320, 240, &[FaceSpec::centered(160, 120)]);
        let face = SkinToneLocator::default().locate(&frame).unwrap()[0];
        let a = IntensityGridEmbedder.embed(&frame, &face).unwrap();
        let b = IntensityGridEmbedder.embed(&frame, &face).unwrap();
        assert_eq!(a.distance(&b), 0.0);
    }

    #[test]
    fn test_embedding_differs_between_layouts() {
        let frame_a = face_frame(320, 240, &[FaceSpec::centered(160, 120)]);
        let frame_b = face_frame(320, 240, &[FaceSpec::centered(160, 120).with_stripe()]);
        let locator = SkinToneLocator::default();
        let a = IntensityGridEmbedder.embed(&frame_a, &locator.locate(&frame_a).unwrap()[0]).unwrap();
        let b = IntensityGridEmbedder.embed(&frame_b, &locator.locate(&frame_b).unwrap()[0]).unwrap();
        assert!(a.distance(&b) > 0.6, "distance {}", a.distance(&b));
    }

    #[test]
    fn test_face_count_locator_reports_people() {
        let locator: Arc<dyn FaceLocator> = Arc::new(SkinToneLocator::default());
        let objects = FaceCountObjectLocator::new(locator, "person");
        let frame = face_frame(480, 240, &[FaceSpec::centered(110, 120), FaceSpec::centered(370, 120)]);
        let detections = objects.detect(&frame).unwrap();
        assert_eq!(detections.len(), 2);
        assert!(detections.iter().all(|d| d.label == "person"));
    }
}
