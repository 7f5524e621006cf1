//! Mapping from a crop region onto the output canvas.
//!
//! Pure functions only: the same crop, source and target dimensions always
//! produce the same [`DrawParams`], so recomputing per frame is safe (the
//! pipeline computes once per job since the crop is snapshotted).

use crate::crop::CropRegion;
use crate::error::{JobError, JobResult};

/// Output canvas dimensions, 9:16 portrait.
pub const TARGET_WIDTH: u32 = 1080;
pub const TARGET_HEIGHT: u32 = 1920;

/// The crop rectangle in absolute source pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Where and how large the cropped content lands on the canvas.
///
/// The scaled content always covers the canvas on at least one axis;
/// offsets may be negative, in which case the overflow is clipped by the
/// canvas edges and the content is center-cropped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawParams {
    pub source: SourceRect,
    pub draw_width: f64,
    pub draw_height: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

/// Converts a percent-space crop into canvas draw parameters.
///
/// The cropped region is scaled uniformly so that it exactly fills the
/// target height when it is wider than the target aspect, or the target
/// width otherwise, and is centered on the remaining axis.
pub fn compute_draw_params(
    crop: &CropRegion,
    source_width: u32,
    source_height: u32,
    target_width: u32,
    target_height: u32,
) -> JobResult<DrawParams> {
    let crop_px_x = crop.x / 100.0 * f64::from(source_width);
    let crop_px_y = crop.y / 100.0 * f64::from(source_height);
    let crop_px_width = crop.width / 100.0 * f64::from(source_width);
    let crop_px_height = crop.height / 100.0 * f64::from(source_height);

    if crop_px_width <= 0.0 || crop_px_height <= 0.0 {
        return Err(JobError::InvalidRegion {
            width_px: crop_px_width,
            height_px: crop_px_height,
        });
    }

    let crop_aspect = crop_px_width / crop_px_height;
    let target_aspect = f64::from(target_width) / f64::from(target_height);

    let (draw_width, draw_height, offset_x, offset_y) = if crop_aspect > target_aspect {
        // Cropped area is wider than the target: fill the height, center
        // horizontally, horizontal overflow is clipped.
        let draw_height = f64::from(target_height);
        let draw_width = draw_height * crop_aspect;
        let offset_x = (f64::from(target_width) - draw_width) / 2.0;
        (draw_width, draw_height, offset_x, 0.0)
    } else {
        // Cropped area is taller: fill the width, center vertically.
        let draw_width = f64::from(target_width);
        let draw_height = draw_width / crop_aspect;
        let offset_y = (f64::from(target_height) - draw_height) / 2.0;
        (draw_width, draw_height, 0.0, offset_y)
    };

    Ok(DrawParams {
        source: SourceRect {
            x: crop_px_x,
            y: crop_px_y,
            width: crop_px_width,
            height: crop_px_height,
        },
        draw_width,
        draw_height,
        offset_x,
        offset_y,
    })
}
