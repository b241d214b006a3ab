//! Local descriptors: oriented FAST corners with rotated BRIEF tests.
//!
//! ## Pipeline
//! 1. Grayscale, shrink to the working size
//! 2. FAST-9 corners (`imageproc`) inside the border, 3x3 non-maximum
//!    suppression
//! 3. Rank corners by Harris response and keep the strongest `budget`
//! 4. Orientation from the intensity centroid of a disc around each corner
//! 5. 256 pairwise intensity tests on a blurred copy, rotated by the
//!    orientation, packed into a 32-byte descriptor
//!
//! The sampling pattern is generated once per extractor from a seeded
//! ChaCha stream, so identical input always yields identical descriptors in
//! identical order.

use super::descriptors::{DescriptorSet, DESCRIPTOR_BYTES};
use super::fast_resize::fit_within;
use crate::error::DecodeError;
use image::{imageops, DynamicImage, GrayImage};
use imageproc::corners::{corners_fast9, Corner};
use imageproc::suppress::local_maxima;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

/// Corners closer than this to an edge are dropped; covers the rotated
/// pattern reach and the orientation disc
const BORDER: u32 = 20;

const HARRIS_K: f32 = 0.04;
const HARRIS_RADIUS: i32 = 3;
const ORIENTATION_RADIUS: i32 = 15;

const PATTERN_TESTS: usize = DESCRIPTOR_BYTES * 8;
const PATTERN_REACH: f32 = 13.0;
const PATTERN_SIGMA: f32 = 6.2;
const PATTERN_SEED: u64 = 0x2545_f491;
const SMOOTHING_SIGMA: f32 = 2.0;

/// Detector tuning that sits outside the matching configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Minimum intensity difference for a FAST ring pixel
    pub fast_threshold: u8,
    /// Longest side of the image the detector runs on
    pub working_size: u32,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            fast_threshold: 20,
            working_size: 512,
        }
    }
}

/// A detected corner in working-image coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub x: u32,
    pub y: u32,
    /// Harris corner response
    pub response: f32,
    /// Orientation in radians
    pub angle: f32,
}

#[derive(Debug, Clone, Copy)]
struct PatternTest {
    first: (f32, f32),
    second: (f32, f32),
}

/// Gaussian test pairs around the corner, rounded to whole pixels and
/// clamped to the pattern reach
fn build_pattern() -> Vec<PatternTest> {
    let mut rng = ChaCha8Rng::seed_from_u64(PATTERN_SEED);
    let mut offset = || {
        let z: f32 = rng.sample(StandardNormal);
        (z * PATTERN_SIGMA).round().clamp(-PATTERN_REACH, PATTERN_REACH)
    };

    let mut pattern = Vec::with_capacity(PATTERN_TESTS);
    while pattern.len() < PATTERN_TESTS {
        let first = (offset(), offset());
        let second = (offset(), offset());
        if first != second {
            pattern.push(PatternTest { first, second });
        }
    }
    pattern
}

/// Oriented FAST / rotated BRIEF extractor
pub struct OrbExtractor {
    config: ExtractorConfig,
    budget: usize,
    pattern: Vec<PatternTest>,
}

impl OrbExtractor {
    pub fn new(config: ExtractorConfig, budget: usize) -> Self {
        Self {
            config,
            budget,
            pattern: build_pattern(),
        }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Extract at most `budget` descriptors, strongest corner first.
    /// A featureless image yields an empty set.
    pub fn extract(&self, image: &DynamicImage) -> Result<DescriptorSet, DecodeError> {
        let gray = fit_within(image.to_luma8(), self.config.working_size)?;
        let keypoints = self.detect(&gray);

        if keypoints.is_empty() {
            return Ok(DescriptorSet::empty());
        }

        let smoothed = imageops::blur(&gray, SMOOTHING_SIGMA);
        let rows: Vec<[u8; DESCRIPTOR_BYTES]> = keypoints
            .iter()
            .map(|kp| self.describe(&smoothed, kp))
            .collect();

        Ok(DescriptorSet::from(rows))
    }

    /// Detect, rank and orient corners on a working-size grayscale image
    pub fn detect(&self, gray: &GrayImage) -> Vec<Keypoint> {
        let (width, height) = gray.dimensions();
        if width <= 2 * BORDER || height <= 2 * BORDER {
            return Vec::new();
        }

        let inside: Vec<Corner> = corners_fast9(gray, self.config.fast_threshold)
            .into_iter()
            .filter(|c| {
                c.x >= BORDER && c.x < width - BORDER && c.y >= BORDER && c.y < height - BORDER
            })
            .collect();

        let mut keypoints: Vec<Keypoint> = local_maxima(&inside, 1)
            .into_iter()
            .map(|c| Keypoint {
                x: c.x,
                y: c.y,
                response: harris_response(gray, c.x, c.y),
                angle: 0.0,
            })
            .collect();

        keypoints.sort_by(|a, b| {
            b.response
                .total_cmp(&a.response)
                .then(a.y.cmp(&b.y))
                .then(a.x.cmp(&b.x))
        });
        keypoints.truncate(self.budget);

        for kp in &mut keypoints {
            kp.angle = centroid_angle(gray, kp.x, kp.y);
        }

        keypoints
    }

    fn describe(&self, smoothed: &GrayImage, kp: &Keypoint) -> [u8; DESCRIPTOR_BYTES] {
        let (sin, cos) = kp.angle.sin_cos();
        let sample = |(px, py): (f32, f32)| {
            let dx = (px * cos - py * sin).round() as i32;
            let dy = (px * sin + py * cos).round() as i32;
            pixel_clamped(smoothed, kp.x as i32 + dx, kp.y as i32 + dy)
        };

        let mut descriptor = [0u8; DESCRIPTOR_BYTES];
        for (bit, test) in self.pattern.iter().enumerate() {
            if sample(test.first) < sample(test.second) {
                descriptor[bit / 8] |= 1 << (bit % 8);
            }
        }
        descriptor
    }
}

fn pixel_clamped(img: &GrayImage, x: i32, y: i32) -> u8 {
    let x = x.clamp(0, img.width() as i32 - 1) as u32;
    let y = y.clamp(0, img.height() as i32 - 1) as u32;
    img.get_pixel(x, y).0[0]
}

/// Harris response from Sobel gradients over a 7x7 window
fn harris_response(gray: &GrayImage, x: u32, y: u32) -> f32 {
    let at = |px: i32, py: i32| gray.get_pixel(px as u32, py as u32).0[0] as f32;
    let (cx, cy) = (x as i32, y as i32);

    let mut sxx = 0.0f32;
    let mut syy = 0.0f32;
    let mut sxy = 0.0f32;

    for py in cy - HARRIS_RADIUS..=cy + HARRIS_RADIUS {
        for px in cx - HARRIS_RADIUS..=cx + HARRIS_RADIUS {
            let ix = (at(px + 1, py - 1) + 2.0 * at(px + 1, py) + at(px + 1, py + 1))
                - (at(px - 1, py - 1) + 2.0 * at(px - 1, py) + at(px - 1, py + 1));
            let iy = (at(px - 1, py + 1) + 2.0 * at(px, py + 1) + at(px + 1, py + 1))
                - (at(px - 1, py - 1) + 2.0 * at(px, py - 1) + at(px + 1, py - 1));
            sxx += ix * ix;
            syy += iy * iy;
            sxy += ix * iy;
        }
    }

    let det = sxx * syy - sxy * sxy;
    let trace = sxx + syy;
    det - HARRIS_K * trace * trace
}

/// Angle from the corner to the intensity centroid of the surrounding disc
fn centroid_angle(gray: &GrayImage, x: u32, y: u32) -> f32 {
    let (cx, cy) = (x as i32, y as i32);
    let mut m01 = 0.0f32;
    let mut m10 = 0.0f32;

    for dy in -ORIENTATION_RADIUS..=ORIENTATION_RADIUS {
        for dx in -ORIENTATION_RADIUS..=ORIENTATION_RADIUS {
            if dx * dx + dy * dy > ORIENTATION_RADIUS * ORIENTATION_RADIUS {
                continue;
            }
            let value = pixel_clamped(gray, cx + dx, cy + dy) as f32;
            m10 += dx as f32 * value;
            m01 += dy as f32 * value;
        }
    }

    m01.atan2(m10)
}
