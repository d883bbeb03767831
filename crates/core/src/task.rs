//! Generation requests and their typed task variants.
//!
//! A [`GenerationRequest`] is the loose JSON mapping callers send. It is
//! turned into a [`GenerationTask`] by [`GenerationTask::from_request`],
//! which checks the task category and the modality inputs each category
//! needs. Nothing here touches the model table; see
//! [`resolver`](crate::resolver) for defaults.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::TaskId;

/// Default number of frames generated per clip for speech-to-video.
pub const DEFAULT_S2V_INFER_FRAMES: u32 = 80;

/// Default number of reference frames carried between animate clips.
pub const DEFAULT_REFERT_NUM: u32 = 77;

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Raw generation request as received by the gateway.
///
/// Every field except `task` is optional. Field aliases accept the names
/// used by older clients (`num_inference_steps`, `base_seed`,
/// `checkpoint_dir`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationRequest {
    /// Task name, either a model name (`"t2v-A14B"`) or a bare category
    /// (`"t2v"`).
    pub task: String,
    pub task_id: Option<TaskId>,

    pub prompt: Option<String>,
    pub negative_prompt: Option<String>,
    pub image: Option<String>,
    pub audio: Option<String>,
    /// Preprocessed pose/face directory for the animate variant.
    pub src_root_path: Option<String>,

    #[serde(alias = "frame_num")]
    pub num_frames: Option<u32>,
    /// `"W*H"` size bucket. Takes precedence over `width`/`height`.
    pub size: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,

    pub guidance_scale: Option<f64>,
    /// Guidance for the low-noise expert. Defaults to `guidance_scale`.
    pub guidance_scale_2: Option<f64>,
    #[serde(alias = "num_inference_steps")]
    pub sample_steps: Option<u32>,
    pub sample_shift: Option<f64>,
    pub sample_solver: Option<String>,
    /// Negative values mean "draw a random seed".
    #[serde(alias = "base_seed")]
    pub seed: Option<i64>,

    #[serde(alias = "checkpoint_dir")]
    pub ckpt_dir: Option<String>,
    pub offload_model: Option<bool>,
    pub t5_fsdp: bool,
    pub dit_fsdp: bool,
    pub t5_cpu: bool,
    pub ulysses_size: Option<u32>,
    pub convert_model_dtype: bool,

    pub use_relighting_lora: bool,
    pub replace_flag: bool,
    pub refert_num: Option<u32>,
    pub enable_tts: bool,
    pub infer_frames: Option<u32>,
    pub start_from_ref: bool,

    pub fps: Option<u32>,
    pub output_path: Option<String>,
    pub s3_bucket: Option<String>,
    pub s3_key_prefix: Option<String>,
}

impl GenerationRequest {
    /// Minimal request for `task` with a prompt, used by tests and the CLI.
    pub fn new(task: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            prompt: Some(prompt.into()),
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Task kinds
// ---------------------------------------------------------------------------

/// Generation modality, derived from the task name's category prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    TextToVideo,
    TextImageToVideo,
    ImageToVideo,
    SpeechToVideo,
    Animate,
}

impl TaskKind {
    /// Categorize a task name such as `"i2v-A14B"` or `"animate"`.
    ///
    /// The category is the part before the first `-`. Unknown categories
    /// are reported as [`CoreError::NotImplemented`].
    pub fn from_task_name(task: &str) -> Result<Self, CoreError> {
        let category = task.split('-').next().unwrap_or_default();
        match category {
            "t2v" => Ok(Self::TextToVideo),
            "ti2v" => Ok(Self::TextImageToVideo),
            "i2v" => Ok(Self::ImageToVideo),
            "s2v" => Ok(Self::SpeechToVideo),
            "animate" => Ok(Self::Animate),
            _ => Err(CoreError::NotImplemented(task.to_string())),
        }
    }

    pub fn category(self) -> &'static str {
        match self {
            Self::TextToVideo => "t2v",
            Self::TextImageToVideo => "ti2v",
            Self::ImageToVideo => "i2v",
            Self::SpeechToVideo => "s2v",
            Self::Animate => "animate",
        }
    }

    /// Model served when a request names only the category.
    pub fn default_model(self) -> &'static str {
        match self {
            Self::TextToVideo => "t2v-A14B",
            Self::TextImageToVideo => "ti2v-5B",
            Self::ImageToVideo => "i2v-A14B",
            Self::SpeechToVideo => "s2v-14B",
            Self::Animate => "animate-14B",
        }
    }
}

// ---------------------------------------------------------------------------
// Typed tasks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechToVideoInputs {
    pub prompt: String,
    pub ref_image: String,
    pub audio: String,
    pub enable_tts: bool,
    pub infer_frames: u32,
    pub start_from_ref: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimateInputs {
    pub prompt: String,
    pub src_root_path: String,
    pub replace_flag: bool,
    pub refert_num: u32,
    pub use_relighting_lora: bool,
}

/// A request narrowed to one modality with its required inputs present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GenerationTask {
    TextToVideo { prompt: String },
    TextImageToVideo { prompt: String, image: String },
    ImageToVideo { prompt: String, image: String },
    SpeechToVideo(SpeechToVideoInputs),
    Animate(AnimateInputs),
}

impl GenerationTask {
    /// Parse and validate the modality inputs of `request`.
    pub fn from_request(request: &GenerationRequest) -> Result<Self, CoreError> {
        let kind = TaskKind::from_task_name(&request.task)?;
        let prompt = non_empty(&request.prompt);

        let task = match kind {
            TaskKind::TextToVideo => Self::TextToVideo {
                prompt: prompt.unwrap_or_default(),
            },
            TaskKind::TextImageToVideo => Self::TextImageToVideo {
                prompt: prompt.unwrap_or_default(),
                image: required(non_empty(&request.image), "image", kind)?,
            },
            TaskKind::ImageToVideo => Self::ImageToVideo {
                prompt: prompt.unwrap_or_default(),
                image: required(non_empty(&request.image), "image", kind)?,
            },
            TaskKind::SpeechToVideo => Self::SpeechToVideo(SpeechToVideoInputs {
                prompt: required(prompt, "prompt", kind)?,
                ref_image: required(non_empty(&request.image), "image", kind)?,
                audio: required(non_empty(&request.audio), "audio", kind)?,
                enable_tts: request.enable_tts,
                infer_frames: request.infer_frames.unwrap_or(DEFAULT_S2V_INFER_FRAMES),
                start_from_ref: request.start_from_ref,
            }),
            TaskKind::Animate => Self::Animate(AnimateInputs {
                prompt: prompt.unwrap_or_default(),
                src_root_path: required(non_empty(&request.src_root_path), "src_root_path", kind)?,
                replace_flag: request.replace_flag,
                refert_num: request.refert_num.unwrap_or(DEFAULT_REFERT_NUM),
                use_relighting_lora: request.use_relighting_lora,
            }),
        };
        Ok(task)
    }

    pub fn kind(&self) -> TaskKind {
        match self {
            Self::TextToVideo { .. } => TaskKind::TextToVideo,
            Self::TextImageToVideo { .. } => TaskKind::TextImageToVideo,
            Self::ImageToVideo { .. } => TaskKind::ImageToVideo,
            Self::SpeechToVideo(_) => TaskKind::SpeechToVideo,
            Self::Animate(_) => TaskKind::Animate,
        }
    }

    pub fn prompt(&self) -> &str {
        match self {
            Self::TextToVideo { prompt }
            | Self::TextImageToVideo { prompt, .. }
            | Self::ImageToVideo { prompt, .. } => prompt,
            Self::SpeechToVideo(inputs) => &inputs.prompt,
            Self::Animate(inputs) => &inputs.prompt,
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn required(value: Option<String>, field: &str, kind: TaskKind) -> Result<String, CoreError> {
    value.ok_or_else(|| {
        CoreError::Validation(format!(
            "'{field}' is required for {} tasks",
            kind.category()
        ))
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn categorizes_model_names_and_bare_categories() {
        assert_eq!(TaskKind::from_task_name("t2v-A14B").unwrap(), TaskKind::TextToVideo);
        assert_eq!(TaskKind::from_task_name("t2v").unwrap(), TaskKind::TextToVideo);
        assert_eq!(TaskKind::from_task_name("ti2v-5B").unwrap(), TaskKind::TextImageToVideo);
        assert_eq!(TaskKind::from_task_name("i2v-A14B").unwrap(), TaskKind::ImageToVideo);
        assert_eq!(TaskKind::from_task_name("s2v-14B").unwrap(), TaskKind::SpeechToVideo);
        assert_eq!(TaskKind::from_task_name("animate-14B").unwrap(), TaskKind::Animate);
    }

    #[test]
    fn unknown_category_is_not_implemented() {
        assert_matches!(
            TaskKind::from_task_name("bogus"),
            Err(CoreError::NotImplemented(name)) if name == "bogus"
        );
        assert_matches!(TaskKind::from_task_name(""), Err(CoreError::NotImplemented(_)));
        // Substrings do not count: the category must be the whole prefix.
        assert_matches!(TaskKind::from_task_name("xt2v-1B"), Err(CoreError::NotImplemented(_)));
    }

    #[test]
    fn i2v_without_image_fails_validation() {
        let request = GenerationRequest::new("i2v-A14B", "a cat");
        assert_matches!(
            GenerationTask::from_request(&request),
            Err(CoreError::Validation(msg)) if msg.contains("image")
        );
    }

    #[test]
    fn blank_image_counts_as_missing() {
        let request = GenerationRequest {
            image: Some("   ".into()),
            ..GenerationRequest::new("ti2v-5B", "a cat")
        };
        assert_matches!(GenerationTask::from_request(&request), Err(CoreError::Validation(_)));
    }

    #[test]
    fn s2v_requires_audio() {
        let request = GenerationRequest {
            image: Some("ref.png".into()),
            ..GenerationRequest::new("s2v-14B", "talking")
        };
        assert_matches!(
            GenerationTask::from_request(&request),
            Err(CoreError::Validation(msg)) if msg.contains("audio")
        );
    }

    #[test]
    fn s2v_defaults() {
        let request = GenerationRequest {
            image: Some("ref.png".into()),
            audio: Some("speech.wav".into()),
            ..GenerationRequest::new("s2v-14B", "talking")
        };
        let task = GenerationTask::from_request(&request).unwrap();
        assert_matches!(task, GenerationTask::SpeechToVideo(inputs) => {
            assert_eq!(inputs.ref_image, "ref.png");
            assert_eq!(inputs.infer_frames, DEFAULT_S2V_INFER_FRAMES);
            assert!(!inputs.enable_tts);
        });
    }

    #[test]
    fn animate_requires_src_root_path_but_not_prompt() {
        let mut request = GenerationRequest {
            task: "animate-14B".into(),
            ..Default::default()
        };
        assert_matches!(GenerationTask::from_request(&request), Err(CoreError::Validation(_)));

        request.src_root_path = Some("/data/pose".into());
        request.replace_flag = true;
        let task = GenerationTask::from_request(&request).unwrap();
        assert_eq!(task.kind(), TaskKind::Animate);
        assert_eq!(task.prompt(), "");
        assert_matches!(task, GenerationTask::Animate(inputs) => {
            assert!(inputs.replace_flag);
            assert_eq!(inputs.refert_num, DEFAULT_REFERT_NUM);
        });
    }

    #[test]
    fn t2v_and_ti2v_accept_a_missing_prompt() {
        let request = GenerationRequest {
            task: "t2v-A14B".into(),
            ..Default::default()
        };
        let task = GenerationTask::from_request(&request).unwrap();
        assert_eq!(task, GenerationTask::TextToVideo { prompt: String::new() });

        let request = GenerationRequest {
            task: "ti2v-5B".into(),
            image: Some("cat.png".into()),
            ..Default::default()
        };
        let task = GenerationTask::from_request(&request).unwrap();
        assert_eq!(task.kind(), TaskKind::TextImageToVideo);
        assert_eq!(task.prompt(), "");
    }

    #[test]
    fn s2v_still_requires_a_prompt() {
        let request = GenerationRequest {
            task: "s2v-14B".into(),
            image: Some("ref.png".into()),
            audio: Some("speech.wav".into()),
            ..Default::default()
        };
        assert_matches!(
            GenerationTask::from_request(&request),
            Err(CoreError::Validation(msg)) if msg.contains("prompt")
        );
    }

    #[test]
    fn request_accepts_legacy_field_names() {
        let request: GenerationRequest = serde_json::from_value(serde_json::json!({
            "task": "t2v",
            "prompt": "a cat",
            "num_inference_steps": 12,
            "base_seed": 7,
            "checkpoint_dir": "/ckpt",
        }))
        .unwrap();
        assert_eq!(request.sample_steps, Some(12));
        assert_eq!(request.seed, Some(7));
        assert_eq!(request.ckpt_dir.as_deref(), Some("/ckpt"));
        assert!(request.task_id.is_none());
    }
}
