//! Face crop preprocessing
//!
//! Turns a detection rect plus the raw camera frame into the grayscale
//! float crop the classifier consumes: pad with neutral gray where the
//! crop leaves the frame, resample to the target size, convert to
//! BT.601 luminance scaled to [0, 1].

use facetrack::{Frame, Rect};
use image::{imageops, Rgba, RgbaImage};

/// Neutral padding gray, also the fill value of crop ring chunks once
/// scaled by 1/255.
pub const PAD_GRAY: u8 = 110;
pub const PAD_VALUE: f32 = PAD_GRAY as f32 / 255.0;

/// Square crop region in bottom-left-origin pixel coordinates. May
/// extend outside the frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropRect {
    pub x: f32,
    pub y: f32,
    pub side: f32,
}

/// Derive the classifier crop square for a detected face box.
///
/// The square side is the face half-extent padded by `crop_scale`, and
/// its center sits `crop_scale` of a half-extent below the detection
/// midpoint so the crop favors the head over the neck.
pub fn crop_rect_for(detection: &Rect, frame_w: u32, frame_h: u32, crop_scale: f32) -> CropRect {
    let w = frame_w as f32;
    let h = frame_h as f32;
    let bs = (detection.width * w).max(detection.height * h) / 2.0;
    let side = bs * (1.0 + crop_scale);
    let cx = detection.mid_x() * w;
    let cy = detection.mid_y() * h - bs * crop_scale;
    CropRect {
        x: cx - side / 2.0,
        y: cy - side / 2.0,
        side,
    }
}

/// Preprocess one face crop into `out` (`target * target` floats).
///
/// The crop rect may lie partially outside the frame; missing pixels
/// come from the neutral gray padding.
pub fn preprocess_face(frame: &Frame, crop: CropRect, target: u32, out: &mut [f32]) {
    debug_assert_eq!(out.len(), (target * target) as usize);

    let side = crop.side.round().max(1.0) as u32;
    let mut intermediate =
        RgbaImage::from_pixel(side, side, Rgba([PAD_GRAY, PAD_GRAY, PAD_GRAY, 255]));

    // The crop rect is bottom-left-origin; pixel rows are top-down.
    let frame_w = frame.width() as i64;
    let frame_h = frame.height() as i64;
    let crop_x = crop.x.round() as i64;
    let crop_y_td = frame_h - (crop.y + crop.side).round() as i64;

    let x0 = crop_x.max(0);
    let y0 = crop_y_td.max(0);
    let x1 = (crop_x + side as i64).min(frame_w);
    let y1 = (crop_y_td + side as i64).min(frame_h);

    if x1 > x0 && y1 > y0 {
        let frame_img = RgbaImage::from_raw(
            frame.width(),
            frame.height(),
            frame.data().to_vec(),
        )
        .expect("frame byte length matches dimensions");
        let visible = imageops::crop_imm(
            &frame_img,
            x0 as u32,
            y0 as u32,
            (x1 - x0) as u32,
            (y1 - y0) as u32,
        )
        .to_image();
        imageops::overlay(&mut intermediate, &visible, x0 - crop_x, y0 - crop_y_td);
    }

    let resized = imageops::resize(&intermediate, target, target, imageops::FilterType::Lanczos3);

    for (slot, pixel) in out.iter_mut().zip(resized.pixels()) {
        let [r, g, b, _] = pixel.0;
        let luma = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
        *slot = luma / 255.0;
    }
}
