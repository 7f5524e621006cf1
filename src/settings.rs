//! Conversion settings.
//!
//! Settings arrive either as a YAML file or as CLI flag overrides; both
//! paths funnel through [`ConversionSettings::validate`] before a job is
//! created.

use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

pub const MIN_FPS: u32 = 24;
pub const MAX_FPS: u32 = 60;
pub const DEFAULT_FPS: u32 = 30;

pub const MIN_BITRATE_KBPS: u32 = 1000;
pub const MAX_BITRATE_KBPS: u32 = 10_000;
pub const DEFAULT_BITRATE_KBPS: u32 = 5000;

/// Output container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Mp4,
    Mov,
    Avi,
}

impl OutputFormat {
    pub fn from_keyword(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mp4" => Ok(Self::Mp4),
            "mov" => Ok(Self::Mov),
            "avi" => Ok(Self::Avi),
            other => Err(anyhow!(
                "invalid output format '{other}' (allowed: mp4, mov, avi)"
            )),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Mov => "mov",
            Self::Avi => "avi",
        }
    }
}

/// Encoder quality tier.
///
/// Tiers map to x264 CRF values: lower CRF is higher quality. The chosen
/// ladder is low=30, medium=26, high=22, ultra=18; the configured bitrate
/// acts as a VBV cap on top of the tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Low,
    Medium,
    #[default]
    High,
    Ultra,
}

impl Quality {
    pub fn from_keyword(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "ultra" => Ok(Self::Ultra),
            other => Err(anyhow!(
                "invalid quality '{other}' (allowed: low, medium, high, ultra)"
            )),
        }
    }

    pub fn crf(self) -> u8 {
        match self {
            Self::Low => 30,
            Self::Medium => 26,
            Self::High => 22,
            Self::Ultra => 18,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConversionSettings {
    pub format: OutputFormat,
    pub quality: Quality,
    pub fps: u32,
    pub bitrate_kbps: u32,
    /// When true the user-adjusted crop region drives the mapping; when
    /// false the full frame is center-fit automatically and the manual
    /// selector is bypassed.
    pub auto_crop: bool,
    /// Pass-through flag for an external overlay step; the core pipeline
    /// does not consume it.
    pub watermark: bool,
}

impl Default for ConversionSettings {
    fn default() -> Self {
        Self {
            format: OutputFormat::Mp4,
            quality: Quality::High,
            fps: DEFAULT_FPS,
            bitrate_kbps: DEFAULT_BITRATE_KBPS,
            auto_crop: true,
            watermark: false,
        }
    }
}

impl ConversionSettings {
    pub fn validate(&self) -> Result<()> {
        if !(MIN_FPS..=MAX_FPS).contains(&self.fps) {
            bail!(
                "fps must be between {MIN_FPS} and {MAX_FPS}, got {}",
                self.fps
            );
        }
        if !(MIN_BITRATE_KBPS..=MAX_BITRATE_KBPS).contains(&self.bitrate_kbps) {
            bail!(
                "bitrate must be between {MIN_BITRATE_KBPS} and {MAX_BITRATE_KBPS} kbps, got {}",
                self.bitrate_kbps
            );
        }
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed reading settings file {}", path.display()))?;
        let settings: Self = serde_yaml::from_str(&raw)
            .with_context(|| format!("failed parsing settings file {}", path.display()))?;
        settings
            .validate()
            .with_context(|| format!("invalid settings in {}", path.display()))?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = ConversionSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.format, OutputFormat::Mp4);
        assert_eq!(settings.quality, Quality::High);
        assert_eq!(settings.fps, 30);
        assert_eq!(settings.bitrate_kbps, 5000);
        assert!(settings.auto_crop);
        assert!(!settings.watermark);
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut settings = ConversionSettings::default();
        settings.fps = 23;
        assert!(settings.validate().is_err());
        settings.fps = 61;
        assert!(settings.validate().is_err());

        let mut settings = ConversionSettings::default();
        settings.bitrate_kbps = 999;
        assert!(settings.validate().is_err());
        settings.bitrate_kbps = 10_001;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn serde_round_trip_preserves_every_enumerated_value() {
        for format in [OutputFormat::Mp4, OutputFormat::Mov, OutputFormat::Avi] {
            for quality in [Quality::Low, Quality::Medium, Quality::High, Quality::Ultra] {
                let settings = ConversionSettings {
                    format,
                    quality,
                    fps: 48,
                    bitrate_kbps: 2500,
                    auto_crop: false,
                    watermark: true,
                };
                let encoded = serde_json::to_string(&settings).expect("settings should encode");
                let decoded: ConversionSettings =
                    serde_json::from_str(&encoded).expect("settings should decode");
                assert_eq!(decoded, settings);
            }
        }
    }

    #[test]
    fn yaml_file_with_partial_fields_uses_defaults() {
        let parsed: ConversionSettings =
            serde_yaml::from_str("format: mov\nquality: ultra\n").expect("yaml should parse");
        assert_eq!(parsed.format, OutputFormat::Mov);
        assert_eq!(parsed.quality, Quality::Ultra);
        assert_eq!(parsed.fps, DEFAULT_FPS);
        assert_eq!(parsed.bitrate_kbps, DEFAULT_BITRATE_KBPS);
    }

    #[test]
    fn unknown_yaml_fields_are_rejected() {
        let result = serde_yaml::from_str::<ConversionSettings>("formatt: mp4\n");
        assert!(result.is_err());
    }

    #[test]
    fn quality_ladder_is_ordered() {
        assert!(Quality::Low.crf() > Quality::Medium.crf());
        assert!(Quality::Medium.crf() > Quality::High.crf());
        assert!(Quality::High.crf() > Quality::Ultra.crf());
        assert_eq!(Quality::Ultra.crf(), 18);
    }

    #[test]
    fn keywords_parse_case_insensitively() {
        assert_eq!(OutputFormat::from_keyword(" MOV ").unwrap(), OutputFormat::Mov);
        assert_eq!(Quality::from_keyword("Ultra").unwrap(), Quality::Ultra);
        assert!(OutputFormat::from_keyword("mkv").is_err());
        assert!(Quality::from_keyword("best").is_err());
    }
}
