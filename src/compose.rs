//! Per-frame crop, scale and canvas placement.

use anyhow::{bail, Context, Result};
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

use crate::geometry::DrawParams;

/// Applies one job's [`DrawParams`] to raw RGBA frames.
///
/// All geometry is resolved to integer pixels once at construction; the
/// per-frame path is crop, resize and overlay only.
pub struct FrameComposer {
    source_width: u32,
    source_height: u32,
    target_width: u32,
    target_height: u32,
    crop_x: u32,
    crop_y: u32,
    crop_width: u32,
    crop_height: u32,
    scaled_width: u32,
    scaled_height: u32,
    offset_x: i64,
    offset_y: i64,
}

impl FrameComposer {
    pub fn new(
        source_width: u32,
        source_height: u32,
        target_width: u32,
        target_height: u32,
        params: &DrawParams,
    ) -> Result<Self> {
        let crop_x = (params.source.x.round() as i64).clamp(0, i64::from(source_width)) as u32;
        let crop_y = (params.source.y.round() as i64).clamp(0, i64::from(source_height)) as u32;
        let crop_width = (params.source.width.round() as u32)
            .min(source_width - crop_x)
            .max(1);
        let crop_height = (params.source.height.round() as u32)
            .min(source_height - crop_y)
            .max(1);
        let scaled_width = (params.draw_width.round() as u32).max(1);
        let scaled_height = (params.draw_height.round() as u32).max(1);

        Ok(Self {
            source_width,
            source_height,
            target_width,
            target_height,
            crop_x,
            crop_y,
            crop_width,
            crop_height,
            scaled_width,
            scaled_height,
            offset_x: params.offset_x.round() as i64,
            offset_y: params.offset_y.round() as i64,
        })
    }

    pub fn target_dimensions(&self) -> (u32, u32) {
        (self.target_width, self.target_height)
    }

    /// Produces one output frame, `target_width * target_height * 4` bytes.
    pub fn compose(&self, frame: Vec<u8>) -> Result<Vec<u8>> {
        let expected = (self.source_width * self.source_height * 4) as usize;
        if frame.len() != expected {
            bail!(
                "decoded frame is {} bytes, expected {expected} for {}x{}",
                frame.len(),
                self.source_width,
                self.source_height
            );
        }
        let source = RgbaImage::from_raw(self.source_width, self.source_height, frame)
            .context("failed to wrap decoded frame as an image")?;

        let cropped = imageops::crop_imm(
            &source,
            self.crop_x,
            self.crop_y,
            self.crop_width,
            self.crop_height,
        )
        .to_image();
        let scaled =
            if (cropped.width(), cropped.height()) == (self.scaled_width, self.scaled_height) {
                cropped
            } else {
                imageops::resize(
                    &cropped,
                    self.scaled_width,
                    self.scaled_height,
                    FilterType::Triangle,
                )
            };

        // Negative offsets clip the overflowing edges against the canvas.
        let mut canvas = RgbaImage::from_pixel(
            self.target_width,
            self.target_height,
            Rgba([0, 0, 0, 255]),
        );
        imageops::overlay(&mut canvas, &scaled, self.offset_x, self.offset_y);
        Ok(canvas.into_raw())
    }
}
