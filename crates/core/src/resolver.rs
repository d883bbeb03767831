//! Fill a request's sampling parameters from its model configuration.
//!
//! Resolution happens once per task. Callers that only need to reject bad
//! requests (the gateway) use [`validate`], which runs the same checks but
//! never draws a seed.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::model_config::{self, GuideScale, ModelConfig, SizeBucket};
use crate::task::{GenerationRequest, GenerationTask, TaskKind};
use crate::types::MAX_SEED;

/// Sharding and memory options forwarded to the pipeline constructor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParallelOptions {
    /// `None` lets the planner pick based on world size.
    pub offload_model: Option<bool>,
    pub t5_fsdp: bool,
    pub dit_fsdp: bool,
    pub t5_cpu: bool,
    pub ulysses_size: u32,
    pub convert_model_dtype: bool,
}

/// Where the produced artifact goes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputOptions {
    pub fps: u32,
    pub output_path: Option<String>,
    pub s3_bucket: Option<String>,
    pub s3_key_prefix: Option<String>,
}

/// A fully populated task: every sampling parameter has a concrete value.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTask {
    pub model: &'static ModelConfig,
    pub task: GenerationTask,
    pub negative_prompt: String,
    pub size: SizeBucket,
    pub frame_num: u32,
    pub sample_steps: u32,
    pub sample_shift: f64,
    pub sample_solver: String,
    pub guide_scale: GuideScale,
    pub seed: u64,
    pub ckpt_dir: Option<String>,
    pub parallel: ParallelOptions,
    pub output: OutputOptions,
}

impl ResolvedTask {
    /// Replace the seed with the value agreed across ranks.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Resolve `request`, drawing a random seed when none (or a negative one)
/// was supplied.
pub fn resolve(request: &GenerationRequest) -> Result<ResolvedTask, CoreError> {
    resolve_with(request, || rand::rng().random_range(0..=MAX_SEED))
}

/// Run every check [`resolve`] performs without drawing a seed.
pub fn validate(request: &GenerationRequest) -> Result<(), CoreError> {
    resolve_with(request, || 0).map(|_| ())
}

/// Pick the model for a task name; a bare category selects its default model.
pub fn model_for(task: &str) -> Result<&'static ModelConfig, CoreError> {
    let kind = TaskKind::from_task_name(task)?;
    let name = if task == kind.category() {
        kind.default_model()
    } else {
        task
    };
    let model = model_config::lookup(name)?;
    if model.kind != kind {
        return Err(CoreError::UnsupportedTask(task.to_string()));
    }
    Ok(model)
}

fn resolve_with(
    request: &GenerationRequest,
    draw_seed: impl FnOnce() -> u64,
) -> Result<ResolvedTask, CoreError> {
    let model = model_for(&request.task)?;
    let task = GenerationTask::from_request(request)?;
    let size = resolve_size(request, model)?;

    let frame_num = request.num_frames.unwrap_or(model.frame_num);
    if frame_num == 0 {
        return Err(CoreError::Validation("'num_frames' must be positive".into()));
    }

    let sample_steps = request.sample_steps.unwrap_or(model.sample_steps);
    if sample_steps == 0 {
        return Err(CoreError::Validation("'sample_steps' must be positive".into()));
    }

    let sample_shift = request.sample_shift.unwrap_or(model.sample_shift);
    if !sample_shift.is_finite() || sample_shift <= 0.0 {
        return Err(CoreError::Validation("'sample_shift' must be a positive number".into()));
    }

    let guide_scale = resolve_guidance(request, model)?;

    let ulysses_size = request.ulysses_size.unwrap_or(1);
    if ulysses_size == 0 {
        return Err(CoreError::Validation("'ulysses_size' must be at least 1".into()));
    }

    let seed = match request.seed {
        Some(seed) if seed >= 0 => seed as u64,
        _ => draw_seed(),
    };

    Ok(ResolvedTask {
        model,
        task,
        negative_prompt: request.negative_prompt.clone().unwrap_or_default(),
        size,
        frame_num,
        sample_steps,
        sample_shift,
        sample_solver: request
            .sample_solver
            .clone()
            .unwrap_or_else(|| model.sample_solver.to_string()),
        guide_scale,
        seed,
        ckpt_dir: request.ckpt_dir.clone(),
        parallel: ParallelOptions {
            offload_model: request.offload_model,
            t5_fsdp: request.t5_fsdp,
            dit_fsdp: request.dit_fsdp,
            t5_cpu: request.t5_cpu,
            ulysses_size,
            convert_model_dtype: request.convert_model_dtype,
        },
        output: OutputOptions {
            fps: request.fps.unwrap_or(model.sample_fps),
            output_path: request.output_path.clone(),
            s3_bucket: request.s3_bucket.clone(),
            s3_key_prefix: request.s3_key_prefix.clone(),
        },
    })
}

fn resolve_size(request: &GenerationRequest, model: &ModelConfig) -> Result<SizeBucket, CoreError> {
    let size = match (&request.size, request.width, request.height) {
        (Some(key), _, _) => SizeBucket::parse(key)?,
        (None, Some(width), Some(height)) => SizeBucket::parse(&format!("{width}*{height}"))?,
        (None, None, None) => SizeBucket::parse(model.default_size)?,
        _ => {
            return Err(CoreError::Validation(
                "'width' and 'height' must be given together".into(),
            ))
        }
    };
    model.check_size(&size)?;
    Ok(size)
}

fn resolve_guidance(request: &GenerationRequest, model: &ModelConfig) -> Result<GuideScale, CoreError> {
    let scale = match (request.guidance_scale, request.guidance_scale_2) {
        (None, None) => model.guide_scale,
        (Some(high), None) => GuideScale::uniform(high),
        (high, Some(low)) => GuideScale::split(low, high.unwrap_or(model.guide_scale.high_noise)),
    };
    for value in [scale.low_noise, scale.high_noise] {
        if !value.is_finite() || value < 0.0 {
            return Err(CoreError::Validation(
                "'guidance_scale' must be a non-negative number".into(),
            ));
        }
    }
    Ok(scale)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
