use crate::prelude::Position;
use crate::processing::state::LightStatus;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_circle_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

const PASSED: Rgb<u8> = Rgb([0, 255, 0]);
const FAILED: Rgb<u8> = Rgb([255, 0, 0]);
const PENDING: Rgb<u8> = Rgb([0, 0, 255]);
const GUIDE: Rgb<u8> = Rgb([255, 255, 255]);

/// Marker ring radius, matching the pick tolerance.
const MARKER_RADIUS: i32 = 10;

pub fn status_color(status: &LightStatus) -> Rgb<u8> {
    if status.success {
        PASSED
    } else if status.wrong {
        FAILED
    } else {
        PENDING
    }
}

/// Draws a centered panel guide and one ring per sample point.
pub fn annotate(
    frame: &RgbImage,
    guide: Option<(u32, u32)>,
    lights: &[(Position, LightStatus)],
) -> RgbImage {
    let mut canvas = frame.clone();

    if let Some((width, height)) = guide {
        if width > 0 && height > 0 {
            let x = (i64::from(canvas.width()) - i64::from(width)) / 2;
            let y = (i64::from(canvas.height()) - i64::from(height)) / 2;
            for inset in 0..2u32 {
                if width > 2 * inset && height > 2 * inset {
                    let rect = Rect::at(x as i32 + inset as i32, y as i32 + inset as i32)
                        .of_size(width - 2 * inset, height - 2 * inset);
                    draw_hollow_rect_mut(&mut canvas, rect, GUIDE);
                }
            }
        }
    }

    for (position, status) in lights {
        let color = status_color(status);
        let center = (position.x, position.y);
        draw_hollow_circle_mut(&mut canvas, center, MARKER_RADIUS, color);
        draw_hollow_circle_mut(&mut canvas, center, MARKER_RADIUS + 1, color);
    }
    canvas
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rings_take_status_color() {
        let frame = RgbImage::new(100, 60);
        let passed = LightStatus {
            checked: true,
            wrong: false,
            success: true,
        };
        let failed = LightStatus {
            checked: false,
            wrong: true,
            success: false,
        };
        let out = annotate(
            &frame,
            None,
            &[(Position::new(20, 30), passed), (Position::new(70, 30), failed)],
        );
        assert_eq!(*out.get_pixel(30, 30), PASSED);
        assert_eq!(*out.get_pixel(80, 30), FAILED);
        assert_eq!(*out.get_pixel(20, 30), Rgb([0, 0, 0]));
    }

    #[test]
    fn guide_is_centered_and_offscreen_points_are_tolerated() {
        let frame = RgbImage::new(100, 60);
        let out = annotate(
            &frame,
            Some((60, 40)),
            &[(Position::new(-200, -200), LightStatus::default())],
        );
        assert_eq!(*out.get_pixel(20, 10), GUIDE);
        assert_eq!(*out.get_pixel(79, 49), GUIDE);
        assert_eq!(*out.get_pixel(50, 30), Rgb([0, 0, 0]));
    }
}
