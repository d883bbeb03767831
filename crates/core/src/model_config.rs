//! Fixed table of supported model configurations and size buckets.
//!
//! Every generation request names one of the entries in [`MODEL_CONFIGS`];
//! the entry supplies sampling defaults and the set of resolutions the
//! checkpoint was trained for.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::task::TaskKind;

// ---------------------------------------------------------------------------
// Guidance scale
// ---------------------------------------------------------------------------

/// Classifier-free guidance scale for the two denoising experts.
///
/// Single-expert models use the same value for both stages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GuideScale {
    pub low_noise: f64,
    pub high_noise: f64,
}

impl GuideScale {
    pub const fn uniform(value: f64) -> Self {
        Self {
            low_noise: value,
            high_noise: value,
        }
    }

    pub const fn split(low_noise: f64, high_noise: f64) -> Self {
        Self {
            low_noise,
            high_noise,
        }
    }
}

// ---------------------------------------------------------------------------
// Size buckets
// ---------------------------------------------------------------------------

/// A `W*H` resolution bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeBucket {
    pub width: u32,
    pub height: u32,
}

impl SizeBucket {
    /// Parse a `"1280*720"` style key.
    pub fn parse(key: &str) -> Result<Self, CoreError> {
        let invalid = || CoreError::Validation(format!("Invalid size '{key}', expected 'W*H'"));
        let (w, h) = key.split_once('*').ok_or_else(invalid)?;
        let width: u32 = w.trim().parse().map_err(|_| invalid())?;
        let height: u32 = h.trim().parse().map_err(|_| invalid())?;
        if width == 0 || height == 0 {
            return Err(invalid());
        }
        Ok(Self { width, height })
    }

    /// Pixel budget used by image-conditioned variants.
    pub fn max_area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    pub fn key(&self) -> String {
        format!("{}*{}", self.width, self.height)
    }
}

// ---------------------------------------------------------------------------
// Model configurations
// ---------------------------------------------------------------------------

/// Sampling defaults and resolution support for one checkpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    /// Task name callers put in the request, e.g. `"t2v-A14B"`.
    pub name: &'static str,
    pub kind: TaskKind,
    pub sample_steps: u32,
    pub sample_shift: f64,
    pub guide_scale: GuideScale,
    pub frame_num: u32,
    pub sample_solver: &'static str,
    pub sample_fps: u32,
    pub default_size: &'static str,
    pub supported_sizes: &'static [&'static str],
}

const SIZES_A14B: &[&str] = &["720*1280", "1280*720", "480*832", "832*480"];

/// Every model the worker group can serve.
pub const MODEL_CONFIGS: &[ModelConfig] = &[
    ModelConfig {
        name: "t2v-A14B",
        kind: TaskKind::TextToVideo,
        sample_steps: 40,
        sample_shift: 12.0,
        guide_scale: GuideScale::split(3.0, 4.0),
        frame_num: 81,
        sample_solver: "unipc",
        sample_fps: 16,
        default_size: "1280*720",
        supported_sizes: SIZES_A14B,
    },
    ModelConfig {
        name: "i2v-A14B",
        kind: TaskKind::ImageToVideo,
        sample_steps: 40,
        sample_shift: 5.0,
        guide_scale: GuideScale::split(3.5, 3.5),
        frame_num: 81,
        sample_solver: "unipc",
        sample_fps: 16,
        default_size: "1280*720",
        supported_sizes: SIZES_A14B,
    },
    ModelConfig {
        name: "ti2v-5B",
        kind: TaskKind::TextImageToVideo,
        sample_steps: 50,
        sample_shift: 5.0,
        guide_scale: GuideScale::uniform(5.0),
        frame_num: 121,
        sample_solver: "unipc",
        sample_fps: 24,
        default_size: "1280*704",
        supported_sizes: &["704*1280", "1280*704"],
    },
    ModelConfig {
        name: "s2v-14B",
        kind: TaskKind::SpeechToVideo,
        sample_steps: 40,
        sample_shift: 3.0,
        guide_scale: GuideScale::uniform(4.5),
        frame_num: 80,
        sample_solver: "unipc",
        sample_fps: 16,
        default_size: "1280*720",
        supported_sizes: &[
            "720*1280", "1280*720", "480*832", "832*480", "1024*704", "704*1024", "704*1280",
            "1280*704",
        ],
    },
    ModelConfig {
        name: "animate-14B",
        kind: TaskKind::Animate,
        sample_steps: 20,
        sample_shift: 5.0,
        guide_scale: GuideScale::uniform(1.0),
        frame_num: 77,
        sample_solver: "unipc",
        sample_fps: 30,
        default_size: "1280*720",
        supported_sizes: &["720*1280", "1280*720"],
    },
];

/// Look up the configuration for a task name.
pub fn lookup(task: &str) -> Result<&'static ModelConfig, CoreError> {
    MODEL_CONFIGS
        .iter()
        .find(|c| c.name == task)
        .ok_or_else(|| CoreError::UnsupportedTask(task.to_string()))
}

impl ModelConfig {
    /// Validate `size` against this model's supported buckets.
    pub fn check_size(&self, size: &SizeBucket) -> Result<(), CoreError> {
        let key = size.key();
        if self.supported_sizes.contains(&key.as_str()) {
            Ok(())
        } else {
            Err(CoreError::Validation(format!(
                "Size '{key}' is not supported by '{}'. Must be one of: {}",
                self.name,
                self.supported_sizes.join(", ")
            )))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn every_kind_has_a_config() {
        for kind in [
            TaskKind::TextToVideo,
            TaskKind::ImageToVideo,
            TaskKind::TextImageToVideo,
            TaskKind::SpeechToVideo,
            TaskKind::Animate,
        ] {
            assert!(
                MODEL_CONFIGS.iter().any(|c| c.kind == kind),
                "missing config for {kind:?}"
            );
        }
    }

    #[test]
    fn default_sizes_are_supported() {
        for config in MODEL_CONFIGS {
            let size = SizeBucket::parse(config.default_size).unwrap();
            config.check_size(&size).unwrap();
        }
    }

    #[test]
    fn lookup_unknown_task_is_unsupported() {
        assert_matches!(lookup("t2v-999B"), Err(CoreError::UnsupportedTask(name)) if name == "t2v-999B");
    }

    #[test]
    fn parse_size_and_area() {
        let size = SizeBucket::parse("1280*720").unwrap();
        assert_eq!(size.width, 1280);
        assert_eq!(size.height, 720);
        assert_eq!(size.max_area(), 921_600);
        assert_eq!(size.key(), "1280*720");
    }

    #[test]
    fn parse_size_rejects_garbage() {
        assert_matches!(SizeBucket::parse("1280x720"), Err(CoreError::Validation(_)));
        assert_matches!(SizeBucket::parse("0*720"), Err(CoreError::Validation(_)));
        assert_matches!(SizeBucket::parse("abc*def"), Err(CoreError::Validation(_)));
    }

    #[test]
    fn ti2v_rejects_a14b_sizes() {
        let config = lookup("ti2v-5B").unwrap();
        let size = SizeBucket::parse("832*480").unwrap();
        assert_matches!(config.check_size(&size), Err(CoreError::Validation(_)));
    }
}
