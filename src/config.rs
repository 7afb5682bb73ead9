use crate::enums::{Orientation, RescaleMode};
use crate::locator::{DisplayTransform, PreviewBox};
use crate::rescaler::DEFAULT_QUANTILE;
use crate::saver::DEFAULT_SUFFIX;

use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Quantile must lie in (0, 100], got {0}")]
    InvalidQuantile(f32),

    #[error("Save suffix must not be empty")]
    EmptySuffix,
}

/// Initial display transform of every pane
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaneTransforms {
    pub axial: DisplayTransform,
    pub coronal: DisplayTransform,
    pub sagittal: DisplayTransform,
}

impl PaneTransforms {
    pub fn get(&self, orientation: Orientation) -> DisplayTransform {
        match orientation {
            Orientation::Axial => self.axial,
            Orientation::Coronal => self.coronal,
            Orientation::Sagittal => self.sagittal,
        }
    }

    pub fn set(&mut self, orientation: Orientation, transform: DisplayTransform) {
        match orientation {
            Orientation::Axial => self.axial = transform,
            Orientation::Coronal => self.coronal = transform,
            Orientation::Sagittal => self.sagittal = transform,
        }
    }
}

/// Session settings. Every field has a default, so a config file only
/// needs the entries it changes.
///
/// ```json
/// { "rescale_mode": { "fixed-depth": { "ceiling": 4095.0 } }, "suffix": ".qc" }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QcConfig {
    pub rescale_mode: RescaleMode,
    /// Percentile for [`RescaleMode::RobustPercentile`]
    pub quantile: f32,
    pub preview: PreviewBox,
    pub transforms: PaneTransforms,
    /// Marks saved files as QC-edited
    pub suffix: String,
}

impl Default for QcConfig {
    fn default() -> Self {
        Self {
            rescale_mode: RescaleMode::default(),
            quantile: DEFAULT_QUANTILE,
            preview: PreviewBox::default(),
            transforms: PaneTransforms::default(),
            suffix: DEFAULT_SUFFIX.to_string(),
        }
    }
}

impl QcConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.quantile > 0.0 && self.quantile <= 100.0) {
            return Err(ConfigError::InvalidQuantile(self.quantile));
        }
        if self.suffix.is_empty() {
            return Err(ConfigError::EmptySuffix);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rescaler::TWELVE_BIT_CEILING;

    #[test]
    fn test_defaults() {
        let config = QcConfig::from_json("{}").unwrap();
        assert_eq!(config, QcConfig::default());
        assert_eq!(config.rescale_mode, RescaleMode::RobustPercentile);
        assert_eq!(config.quantile, 99.5);
        assert_eq!(config.suffix, ".exc");
    }

    #[test]
    fn test_partial_override() {
        let config = QcConfig::from_json(
            r#"{
                "rescale_mode": { "fixed-depth": { "ceiling": 4095.0 } },
                "preview": { "width": 320, "height": 200 },
                "transforms": { "coronal": { "rotate": true, "mirror_vertical": true, "mirror_horizontal": false } }
            }"#,
        )
        .unwrap();
        assert_eq!(
            config.rescale_mode,
            RescaleMode::FixedDepth {
                ceiling: TWELVE_BIT_CEILING
            }
        );
        assert_eq!(config.preview.width, 320);
        assert!(config.transforms.get(Orientation::Coronal).rotate);
        assert!(!config.transforms.get(Orientation::Sagittal).rotate);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            QcConfig::from_json(r#"{ "quantile": 150.0 }"#),
            Err(ConfigError::InvalidQuantile(_))
        ));
        assert!(matches!(
            QcConfig::from_json(r#"{ "suffix": "" }"#),
            Err(ConfigError::EmptySuffix)
        ));
        assert!(matches!(
            QcConfig::from_json(r#"{ "rescale_mode": "median" }"#),
            Err(ConfigError::Json(_))
        ));
    }
}
