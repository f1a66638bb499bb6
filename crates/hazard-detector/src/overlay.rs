//! Tint rules for the visual overlay (RGB channel order).
//!
//! Pixels under consideration go green. Hazards keep the pixel's original
//! green channel and saturate red (too close) or blue (too far).

use image::Rgb;

const CONSIDERED_ATTENUATION: f32 = 1.1;
const HAZARD_ATTENUATION: f32 = 1.5;

fn attenuate(value: u8, factor: f32) -> u8 {
    (value as f32 / factor) as u8
}

/// Mark a pixel as inside the scanned window with a valid reading.
pub fn mark_considered(px: &mut Rgb<u8>) {
    px[0] = attenuate(px[0], CONSIDERED_ATTENUATION);
    px[1] = 255;
    px[2] = attenuate(px[2], CONSIDERED_ATTENUATION);
}

/// Mark a pixel whose live range is shorter than tolerated.
pub fn mark_too_close(px: &mut Rgb<u8>, original_green: u8) {
    px[0] = 255;
    px[1] = original_green;
    px[2] = attenuate(px[2], HAZARD_ATTENUATION);
}

/// Mark a pixel whose live range is longer than tolerated.
pub fn mark_too_far(px: &mut Rgb<u8>, original_green: u8) {
    px[0] = attenuate(px[0], HAZARD_ATTENUATION);
    px[1] = original_green;
    px[2] = 255;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn considered_pixels_turn_green() {
        let mut px = Rgb([120, 40, 230]);
        mark_considered(&mut px);
        assert_eq!(px, Rgb([109, 255, 209]));
    }

    #[test]
    fn too_close_restores_green_and_saturates_red() {
        let mut px = Rgb([120, 40, 230]);
        mark_considered(&mut px);
        mark_too_close(&mut px, 40);
        assert_eq!(px, Rgb([255, 40, 139]));
    }

    #[test]
    fn too_far_saturates_blue() {
        let mut px = Rgb([150, 7, 9]);
        mark_too_far(&mut px, 7);
        assert_eq!(px, Rgb([100, 7, 255]));
    }

    #[test]
    fn later_tint_wins() {
        let mut px = Rgb([90, 90, 90]);
        mark_considered(&mut px);
        mark_too_close(&mut px, 90);
        mark_too_far(&mut px, 90);
        assert_eq!(px[2], 255);
        assert_eq!(px[1], 90);
        assert_eq!(px[0], 170);
    }
}
