use crate::prelude::{ClassifierConfig, LightColor, Position, Verdict};
use crate::processing::color::{ColorRangeTable, HsvPixel};
use image::RgbImage;

/// What the classifier saw inside one region of interest.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionStats {
    pub pixel_count: usize,
    pub mean_brightness: f32,
    /// First matching table color. `None` when unlit or nothing matched.
    pub detected: Option<LightColor>,
}

/// Frame-in, verdict-out light classifier. Holds no per-frame state.
#[derive(Debug, Clone)]
pub struct LightClassifier {
    config: ClassifierConfig,
    ranges: ColorRangeTable,
}

impl LightClassifier {
    pub fn new(config: ClassifierConfig, ranges: ColorRangeTable) -> Self {
        Self { config, ranges }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn classify(&self, frame: &RgbImage, position: Position, expected: LightColor) -> Verdict {
        let stats = self.inspect(frame, position);
        if stats.pixel_count == 0 || stats.mean_brightness < self.config.brightness_threshold {
            return Verdict::Unlit;
        }
        match stats.detected {
            Some(color) if color == expected => Verdict::Correct,
            _ => Verdict::WrongColor,
        }
    }

    pub fn inspect(&self, frame: &RgbImage, position: Position) -> RegionStats {
        let pixels = self.region(frame, position);
        if pixels.is_empty() {
            return RegionStats {
                pixel_count: 0,
                mean_brightness: 0.0,
                detected: None,
            };
        }

        let total: u64 = pixels.iter().map(|pixel| u64::from(pixel.v)).sum();
        let mean_brightness = total as f32 / pixels.len() as f32;
        let detected = if mean_brightness < self.config.brightness_threshold {
            None
        } else {
            self.ranges.first_match(&pixels)
        };

        RegionStats {
            pixel_count: pixels.len(),
            mean_brightness,
            detected,
        }
    }

    /// HSV pixels of the square `[x-r, x+r) x [y-r, y+r)` clipped to the frame.
    fn region(&self, frame: &RgbImage, position: Position) -> Vec<HsvPixel> {
        let half = i64::from(self.config.roi_half_width);
        let (width, height) = (i64::from(frame.width()), i64::from(frame.height()));
        let x0 = (i64::from(position.x) - half).clamp(0, width);
        let x1 = (i64::from(position.x) + half).clamp(0, width);
        let y0 = (i64::from(position.y) - half).clamp(0, height);
        let y1 = (i64::from(position.y) + half).clamp(0, height);

        let mut pixels = Vec::with_capacity(((x1 - x0) * (y1 - y0)).max(0) as usize);
        for y in y0..y1 {
            for x in x0..x1 {
                pixels.push(HsvPixel::from_rgb(frame.get_pixel(x as u32, y as u32)));
            }
        }
        pixels
    }
}

impl Default for LightClassifier {
    fn default() -> Self {
        Self::new(ClassifierConfig::default(), ColorRangeTable::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    const RED: Rgb<u8> = Rgb([230, 20, 20]);
    const GREEN: Rgb<u8> = Rgb([20, 220, 40]);
    const YELLOW: Rgb<u8> = Rgb([240, 220, 10]);

    fn frame_with_patch(center: (u32, u32), color: Rgb<u8>) -> RgbImage {
        let mut frame = RgbImage::from_pixel(200, 100, Rgb([10, 10, 10]));
        for y in center.1 - 10..center.1 + 10 {
            for x in center.0 - 10..center.0 + 10 {
                frame.put_pixel(x, y, color);
            }
        }
        frame
    }

    #[test]
    fn dark_region_is_unlit_whatever_its_hue() {
        let classifier = LightClassifier::default();
        let dim_red = frame_with_patch((50, 50), Rgb([90, 5, 5]));
        assert_eq!(
            classifier.classify(&dim_red, Position::new(50, 50), LightColor::Red),
            Verdict::Unlit
        );
        let stats = classifier.inspect(&dim_red, Position::new(50, 50));
        assert!(stats.mean_brightness < 100.0);
        assert_eq!(stats.detected, None);
    }

    #[test]
    fn brightness_exactly_at_threshold_is_lit() {
        let classifier = LightClassifier::default();
        let edge = frame_with_patch((50, 50), Rgb([100, 0, 0]));
        let stats = classifier.inspect(&edge, Position::new(50, 50));
        assert_eq!(stats.mean_brightness, 100.0);
        assert_eq!(stats.detected, Some(LightColor::Red));
        assert_eq!(
            classifier.classify(&edge, Position::new(50, 50), LightColor::Red),
            Verdict::Correct
        );

        let below = frame_with_patch((50, 50), Rgb([99, 0, 0]));
        assert_eq!(
            classifier.classify(&below, Position::new(50, 50), LightColor::Red),
            Verdict::Unlit
        );
    }

    #[test]
    fn bright_expected_color_is_correct() {
        let classifier = LightClassifier::default();
        for (color, expected) in [
            (RED, LightColor::Red),
            (GREEN, LightColor::Green),
            (YELLOW, LightColor::Yellow),
        ] {
            let frame = frame_with_patch((60, 40), color);
            assert_eq!(
                classifier.classify(&frame, Position::new(60, 40), expected),
                Verdict::Correct
            );
        }
    }

    #[test]
    fn bright_other_color_is_wrong() {
        let classifier = LightClassifier::default();
        let frame = frame_with_patch((60, 40), GREEN);
        assert_eq!(
            classifier.classify(&frame, Position::new(60, 40), LightColor::Red),
            Verdict::WrongColor
        );
    }

    #[test]
    fn bright_colorless_region_is_wrong_not_unlit() {
        let classifier = LightClassifier::default();
        let frame = frame_with_patch((60, 40), Rgb([220, 220, 220]));
        assert_eq!(
            classifier.classify(&frame, Position::new(60, 40), LightColor::Yellow),
            Verdict::WrongColor
        );
    }

    #[test]
    fn single_matching_pixel_is_enough() {
        let classifier = LightClassifier::default();
        let mut frame = frame_with_patch((60, 40), Rgb([220, 220, 220]));
        frame.put_pixel(55, 35, RED);
        assert_eq!(
            classifier.classify(&frame, Position::new(60, 40), LightColor::Red),
            Verdict::Correct
        );
    }

    #[test]
    fn region_outside_frame_is_unlit() {
        let classifier = LightClassifier::default();
        let frame = RgbImage::from_pixel(200, 100, RED);
        assert_eq!(
            classifier.classify(&frame, Position::new(-50, 40), LightColor::Red),
            Verdict::Unlit
        );
        assert_eq!(
            classifier.classify(&frame, Position::new(60, 400), LightColor::Red),
            Verdict::Unlit
        );
    }

    #[test]
    fn region_is_clamped_at_frame_edges() {
        let classifier = LightClassifier::default();
        let frame = RgbImage::from_pixel(200, 100, RED);
        let stats = classifier.inspect(&frame, Position::new(0, 0));
        assert_eq!(stats.pixel_count, 100);
        assert_eq!(
            classifier.classify(&frame, Position::new(0, 0), LightColor::Red),
            Verdict::Correct
        );
    }
}
