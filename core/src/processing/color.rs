use crate::prelude::LightColor;
use image::Rgb;
use palette::{FromColor, Hsv, Srgb};
use serde::{Deserialize, Serialize};

/// Pixel in 8-bit HSV, hue halved to fit 0-179 the way OpenCV stores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HsvPixel {
    pub h: u8,
    pub s: u8,
    pub v: u8,
}

impl HsvPixel {
    pub fn from_rgb(pixel: &Rgb<u8>) -> Self {
        let [r, g, b] = pixel.0;
        let rgb = Srgb::new(r, g, b).into_format::<f32>();
        let hsv: Hsv = Hsv::from_color(rgb);
        Self {
            h: (hsv.hue.into_positive_degrees() / 2.0).round() as u8,
            s: (hsv.saturation * 255.0).round() as u8,
            v: (hsv.value * 255.0).round() as u8,
        }
    }
}

/// Inclusive HSV box that identifies one light color.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorRange {
    pub color: LightColor,
    pub lower: [u8; 3],
    pub upper: [u8; 3],
}

impl ColorRange {
    pub fn new(color: LightColor, lower: [u8; 3], upper: [u8; 3]) -> Self {
        Self {
            color,
            lower,
            upper,
        }
    }

    pub fn contains(&self, pixel: &HsvPixel) -> bool {
        let channels = [pixel.h, pixel.s, pixel.v];
        channels
            .iter()
            .zip(self.lower.iter().zip(self.upper.iter()))
            .all(|(value, (low, high))| low <= value && value <= high)
    }
}

/// Ordered list of color ranges. Earlier entries win when ranges overlap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColorRangeTable {
    ranges: Vec<ColorRange>,
}

impl ColorRangeTable {
    pub fn new(ranges: Vec<ColorRange>) -> Self {
        Self { ranges }
    }

    pub fn ranges(&self) -> &[ColorRange] {
        &self.ranges
    }

    pub fn covers(&self, color: LightColor) -> bool {
        self.ranges.iter().any(|range| range.color == color)
    }

    /// Color of the first range that any pixel falls into.
    pub fn first_match(&self, pixels: &[HsvPixel]) -> Option<LightColor> {
        self.ranges
            .iter()
            .find(|range| pixels.iter().any(|pixel| range.contains(pixel)))
            .map(|range| range.color)
    }
}

impl Default for ColorRangeTable {
    fn default() -> Self {
        Self::new(vec![
            ColorRange::new(LightColor::Yellow, [20, 100, 100], [30, 255, 255]),
            ColorRange::new(LightColor::Red, [0, 120, 70], [10, 255, 255]),
            ColorRange::new(LightColor::Green, [40, 40, 40], [90, 255, 255]),
        ])
    }
}
