//! Crop region in percent space.
//!
//! A [`CropRegion`] describes the portion of the source frame kept in the
//! output, as percentages (0-100) of the source dimensions. It is mutated
//! only by the selector and read by the geometry engine and pipeline.

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};

/// Smallest selectable width/height, in percent of the source frame.
pub const MIN_SIZE_PERCENT: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CropRegion {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Default for CropRegion {
    fn default() -> Self {
        Self::full_frame()
    }
}

impl CropRegion {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The whole source frame. New sources start here, and loading a
    /// replacement source resets the selection back to it.
    pub fn full_frame() -> Self {
        Self::new(0.0, 0.0, 100.0, 100.0)
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn contains(&self, px: f64, py: f64) -> bool {
        px >= self.x && px <= self.right() && py >= self.y && py <= self.bottom()
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite())
        {
            bail!("crop region contains a non-finite value");
        }
        if self.x < 0.0 || self.y < 0.0 {
            bail!(
                "crop origin must be non-negative, got ({:.2}, {:.2})",
                self.x,
                self.y
            );
        }
        if self.width < MIN_SIZE_PERCENT || self.height < MIN_SIZE_PERCENT {
            bail!(
                "crop must be at least {MIN_SIZE_PERCENT}% on each axis, got {:.2}x{:.2}",
                self.width,
                self.height
            );
        }
        if self.right() > 100.0 + f64::EPSILON {
            bail!("crop extends past the right edge ({:.2}% > 100%)", self.right());
        }
        if self.bottom() > 100.0 + f64::EPSILON {
            bail!(
                "crop extends past the bottom edge ({:.2}% > 100%)",
                self.bottom()
            );
        }
        Ok(())
    }
}

impl fmt::Display for CropRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.1},{:.1},{:.1},{:.1}",
            self.x, self.y, self.width, self.height
        )
    }
}

impl FromStr for CropRegion {
    type Err = anyhow::Error;

    /// Parses the compact `x,y,width,height` form used on the command line,
    /// e.g. `25,0,50,100`.
    fn from_str(value: &str) -> Result<Self> {
        let parts: Vec<&str> = value.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            bail!("expected crop as 'x,y,width,height' percentages, got '{value}'");
        }
        let mut numbers = [0.0_f64; 4];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            *slot = part
                .parse()
                .map_err(|_| anyhow!("invalid crop component '{part}' in '{value}'"))?;
        }
        let region = Self::new(numbers[0], numbers[1], numbers[2], numbers[3]);
        region.validate()?;
        Ok(region)
    }
}
