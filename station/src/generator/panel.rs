use crate::workflow::config::Scenario;
use image::{Rgb, RgbImage};
use lightcore::layout::LayoutDefinition;
use lightcore::{FrameSource, LightCheckResult, LightColor, Position};
use rand::{rngs::StdRng, Rng, SeedableRng};

const BACKGROUND: Rgb<u8> = Rgb([18, 18, 22]);
const LAMP_HALF_SIZE: i32 = 12;

/// Representative lit color for each light color.
pub fn lamp_rgb(color: LightColor) -> Rgb<u8> {
    match color {
        LightColor::Red => Rgb([230, 20, 20]),
        LightColor::Yellow => Rgb([240, 220, 10]),
        LightColor::Green => Rgb([20, 220, 40]),
        LightColor::Blue => Rgb([20, 40, 230]),
        LightColor::White => Rgb([240, 240, 240]),
    }
}

fn wrong_rgb(color: LightColor) -> Rgb<u8> {
    match color {
        LightColor::Green => lamp_rgb(LightColor::Red),
        _ => lamp_rgb(LightColor::Green),
    }
}

#[derive(Debug, Clone)]
struct Lamp {
    position: Position,
    lit: Rgb<u8>,
}

/// Frame source that paints a panel with square lamps and sensor noise.
///
/// The first `warmup_frames` frames are dark, then the scenario is shown.
pub struct SyntheticPanel {
    width: u32,
    height: u32,
    lamps: Vec<Lamp>,
    warmup_frames: usize,
    frame_limit: Option<usize>,
    produced: usize,
    noise: i16,
    rng: StdRng,
}

impl SyntheticPanel {
    pub fn for_layout(
        definition: &LayoutDefinition,
        scenario: &Scenario,
        size: (u32, u32),
        seed: u64,
    ) -> Self {
        let lamps = match scenario {
            Scenario::Dark => Vec::new(),
            Scenario::Pass => definition
                .lights
                .iter()
                .map(|light| Lamp {
                    position: light.position,
                    lit: lamp_rgb(light.color),
                })
                .collect(),
            Scenario::Fail { label } => definition
                .lights
                .iter()
                .map(|light| Lamp {
                    position: light.position,
                    lit: if &light.label == label {
                        wrong_rgb(light.color)
                    } else {
                        lamp_rgb(light.color)
                    },
                })
                .collect(),
        };
        Self {
            width: size.0,
            height: size.1,
            lamps,
            warmup_frames: 0,
            frame_limit: None,
            produced: 0,
            noise: 6,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn with_warmup(mut self, frames: usize) -> Self {
        self.warmup_frames = frames;
        self
    }

    pub fn with_frame_limit(mut self, limit: Option<usize>) -> Self {
        self.frame_limit = limit;
        self
    }

    fn jitter(&mut self, pixel: Rgb<u8>) -> Rgb<u8> {
        let noise = self.noise;
        let mut out = pixel;
        for channel in out.0.iter_mut() {
            let offset = self.rng.gen_range(-noise..=noise);
            *channel = (i16::from(*channel) + offset).clamp(0, 255) as u8;
        }
        out
    }

    fn render(&mut self, lit: bool) -> RgbImage {
        let mut frame = RgbImage::from_pixel(self.width, self.height, BACKGROUND);
        if !lit {
            return frame;
        }
        let lamps = self.lamps.clone();
        for lamp in &lamps {
            let (cx, cy) = (lamp.position.x, lamp.position.y);
            for y in (cy - LAMP_HALF_SIZE).max(0)..(cy + LAMP_HALF_SIZE).min(self.height as i32) {
                for x in (cx - LAMP_HALF_SIZE).max(0)..(cx + LAMP_HALF_SIZE).min(self.width as i32)
                {
                    let pixel = self.jitter(lamp.lit);
                    frame.put_pixel(x as u32, y as u32, pixel);
                }
            }
        }
        frame
    }
}

impl FrameSource for SyntheticPanel {
    fn next_frame(&mut self) -> LightCheckResult<Option<RgbImage>> {
        if self.frame_limit.is_some_and(|limit| self.produced >= limit) {
            return Ok(None);
        }
        let lit = self.produced >= self.warmup_frames;
        self.produced += 1;
        Ok(Some(self.render(lit)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lightcore::layout::LayoutCatalog;
    use lightcore::processing::LightClassifier;
    use lightcore::Verdict;

    #[test]
    fn warmup_frames_are_dark_then_lamps_light_up() {
        let catalog = LayoutCatalog::builtin();
        let cicon = catalog.definition("CICON").unwrap();
        let mut panel = SyntheticPanel::for_layout(cicon, &Scenario::Pass, (640, 360), 1)
            .with_warmup(1)
            .with_frame_limit(Some(2));
        let classifier = LightClassifier::default();

        let dark = panel.next_frame().unwrap().unwrap();
        let lit = panel.next_frame().unwrap().unwrap();
        assert!(panel.next_frame().unwrap().is_none());

        for light in &cicon.lights {
            assert_eq!(
                classifier.classify(&dark, light.position, light.color),
                Verdict::Unlit
            );
            assert_eq!(
                classifier.classify(&lit, light.position, light.color),
                Verdict::Correct
            );
        }
    }

    #[test]
    fn failing_scenario_shows_wrong_color_on_one_light() {
        let catalog = LayoutCatalog::builtin();
        let cilow = catalog.definition("CILOW").unwrap();
        let scenario = Scenario::Fail {
            label: "D3BUS CIDIS".into(),
        };
        let mut panel = SyntheticPanel::for_layout(cilow, &scenario, (640, 360), 7);
        let frame = panel.next_frame().unwrap().unwrap();
        let classifier = LightClassifier::default();

        for light in &cilow.lights {
            let expected = if light.label == "D3BUS CIDIS" {
                Verdict::WrongColor
            } else {
                Verdict::Correct
            };
            assert_eq!(
                classifier.classify(&frame, light.position, light.color),
                expected
            );
        }
    }
}
