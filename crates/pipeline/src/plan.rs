//! Parameter shaping in front of the model call.
//!
//! [`plan`] is an exhaustive match over [`GenerationTask`]: each variant
//! selects its pipeline and receives only the keyword arguments that apply
//! to its modality.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use vidgen_collective::DistributedConfig;
use vidgen_core::model_config::{GuideScale, SizeBucket};
use vidgen_core::resolver::ResolvedTask;
use vidgen_core::task::GenerationTask;
use vidgen_core::types::TaskId;

/// Longest prompt prefix used in generated file names.
const FILE_PROMPT_CHARS: usize = 30;

/// Pipeline class the model process instantiates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineVariant {
    WanT2V,
    #[serde(rename = "WanTI2V")]
    WanTi2V,
    WanI2V,
    WanS2V,
    WanAnimate,
}

/// Arguments for constructing the pipeline on one rank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineArgs {
    pub config: String,
    pub checkpoint_dir: Option<String>,
    pub device_id: u32,
    pub rank: u32,
    pub t5_fsdp: bool,
    pub dit_fsdp: bool,
    /// Sequence parallelism, enabled when `ulysses_size > 1`.
    pub use_sp: bool,
    pub t5_cpu: bool,
    pub convert_model_dtype: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_relighting_lora: Option<bool>,
}

/// Sampling arguments every variant's `generate` call takes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingArgs {
    pub input_prompt: String,
    pub n_prompt: String,
    pub shift: f64,
    pub sample_solver: String,
    pub sampling_steps: u32,
    pub guide_scale: GuideScale,
    pub seed: u64,
    pub offload_model: bool,
}

/// Modality-specific `generate` arguments. The sets are disjoint per variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariantArgs {
    TextToVideo {
        size: SizeBucket,
        frame_num: u32,
    },
    TextImageToVideo {
        img: String,
        size: SizeBucket,
        max_area: u64,
        frame_num: u32,
    },
    ImageToVideo {
        img: String,
        max_area: u64,
        frame_num: u32,
    },
    SpeechToVideo {
        ref_image_path: String,
        audio_path: String,
        enable_tts: bool,
        max_area: u64,
        infer_frames: u32,
        init_first_frame: bool,
    },
    Animate {
        src_root_path: String,
        replace_flag: bool,
        refert_num: u32,
        clip_len: u32,
    },
}

/// Everything a model process needs to run one task on one rank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineInvocation {
    pub task_id: TaskId,
    pub variant: PipelineVariant,
    pub pipeline: PipelineArgs,
    pub sampling: SamplingArgs,
    pub inputs: VariantArgs,
    /// Where rank 0 writes the encoded video.
    pub save_file: PathBuf,
    pub fps: u32,
}

/// Shape `resolved` into the invocation for this rank.
///
/// Model offloading defaults to on for single-rank jobs and off otherwise.
pub fn plan(
    task_id: &TaskId,
    resolved: &ResolvedTask,
    dist: &DistributedConfig,
    output_dir: &Path,
) -> PipelineInvocation {
    let max_area = resolved.size.max_area();
    let mut use_relighting_lora = None;

    let (variant, inputs) = match &resolved.task {
        GenerationTask::TextToVideo { .. } => (
            PipelineVariant::WanT2V,
            VariantArgs::TextToVideo {
                size: resolved.size,
                frame_num: resolved.frame_num,
            },
        ),
        GenerationTask::TextImageToVideo { image, .. } => (
            PipelineVariant::WanTi2V,
            VariantArgs::TextImageToVideo {
                img: image.clone(),
                size: resolved.size,
                max_area,
                frame_num: resolved.frame_num,
            },
        ),
        GenerationTask::ImageToVideo { image, .. } => (
            PipelineVariant::WanI2V,
            VariantArgs::ImageToVideo {
                img: image.clone(),
                max_area,
                frame_num: resolved.frame_num,
            },
        ),
        GenerationTask::SpeechToVideo(inputs) => (
            PipelineVariant::WanS2V,
            VariantArgs::SpeechToVideo {
                ref_image_path: inputs.ref_image.clone(),
                audio_path: inputs.audio.clone(),
                enable_tts: inputs.enable_tts,
                max_area,
                infer_frames: inputs.infer_frames,
                init_first_frame: inputs.start_from_ref,
            },
        ),
        GenerationTask::Animate(inputs) => {
            use_relighting_lora = Some(inputs.use_relighting_lora);
            (
                PipelineVariant::WanAnimate,
                VariantArgs::Animate {
                    src_root_path: inputs.src_root_path.clone(),
                    replace_flag: inputs.replace_flag,
                    refert_num: inputs.refert_num,
                    clip_len: resolved.frame_num,
                },
            )
        }
    };

    let parallel = &resolved.parallel;
    PipelineInvocation {
        task_id: task_id.clone(),
        variant,
        pipeline: PipelineArgs {
            config: resolved.model.name.to_string(),
            checkpoint_dir: resolved.ckpt_dir.clone(),
            device_id: dist.device_index(),
            rank: dist.rank,
            t5_fsdp: parallel.t5_fsdp,
            dit_fsdp: parallel.dit_fsdp,
            use_sp: parallel.ulysses_size > 1,
            t5_cpu: parallel.t5_cpu,
            convert_model_dtype: parallel.convert_model_dtype,
            use_relighting_lora,
        },
        sampling: SamplingArgs {
            input_prompt: resolved.task.prompt().to_string(),
            n_prompt: resolved.negative_prompt.clone(),
            shift: resolved.sample_shift,
            sample_solver: resolved.sample_solver.clone(),
            sampling_steps: resolved.sample_steps,
            guide_scale: resolved.guide_scale,
            seed: resolved.seed,
            offload_model: parallel.offload_model.unwrap_or(dist.world_size == 1),
        },
        inputs,
        save_file: save_file(resolved, output_dir),
        fps: resolved.output.fps,
    }
}

/// `<prompt prefix>_<seed>_<timestamp>.mp4` under the output directory,
/// unless the request named an `.mp4` path of its own.
fn save_file(resolved: &ResolvedTask, output_dir: &Path) -> PathBuf {
    let dir = match resolved.output.output_path.as_deref() {
        Some(path) if path.ends_with(".mp4") => return PathBuf::from(path),
        Some(path) => PathBuf::from(path),
        None => output_dir.to_path_buf(),
    };

    let slug: String = resolved
        .task
        .prompt()
        .chars()
        .take(FILE_PROMPT_CHARS)
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    let slug = if slug.trim_matches('_').is_empty() {
        resolved.task.kind().category().to_string()
    } else {
        slug
    };
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    dir.join(format!("{slug}_{}_{timestamp}.mp4", resolved.seed))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use vidgen_core::resolver::resolve;
    use vidgen_core::task::GenerationRequest;

    use super::*;

    fn plan_for(request: GenerationRequest, dist: &DistributedConfig) -> PipelineInvocation {
        let resolved = resolve(&request).unwrap();
        plan(&TaskId::from("task-1"), &resolved, dist, Path::new("/out"))
    }

    #[test]
    fn t2v_plan() {
        let request = GenerationRequest {
            seed: Some(42),
            num_frames: Some(16),
            ..GenerationRequest::new("t2v", "a cat on a roof")
        };
        let invocation = plan_for(request, &DistributedConfig::single());

        assert_eq!(invocation.variant, PipelineVariant::WanT2V);
        assert_eq!(invocation.pipeline.config, "t2v-A14B");
        assert!(invocation.sampling.offload_model);
        assert_eq!(invocation.sampling.seed, 42);
        assert_matches!(invocation.inputs, VariantArgs::TextToVideo { frame_num: 16, .. });

        let name = invocation.save_file.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("a_cat_on_a_roof_42_"), "{name}");
        assert!(name.ends_with(".mp4"));
        assert!(invocation.save_file.starts_with("/out"));
    }

    #[test]
    fn i2v_plan_carries_image_and_area_on_peer_rank() {
        let request = GenerationRequest {
            image: Some("/in/cat.png".into()),
            size: Some("832*480".into()),
            ..GenerationRequest::new("i2v-A14B", "")
        };
        let dist = DistributedConfig::for_rank(1, 2);
        let invocation = plan_for(request, &dist);

        assert_eq!(invocation.variant, PipelineVariant::WanI2V);
        assert_eq!(invocation.pipeline.rank, 1);
        assert_eq!(invocation.pipeline.device_id, 1);
        assert!(!invocation.sampling.offload_model);
        assert_matches!(
            &invocation.inputs,
            VariantArgs::ImageToVideo { img, max_area: 399_360, frame_num: 81 } if img == "/in/cat.png"
        );
        // An empty prompt falls back to the category for the file name.
        let name = invocation.save_file.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("i2v_"), "{name}");
    }

    #[test]
    fn s2v_and_animate_use_their_own_arguments() {
        let s2v = GenerationRequest {
            image: Some("ref.png".into()),
            audio: Some("talk.wav".into()),
            start_from_ref: true,
            ..GenerationRequest::new("s2v-14B", "speaker")
        };
        let invocation = plan_for(s2v, &DistributedConfig::single());
        assert_eq!(invocation.variant, PipelineVariant::WanS2V);
        assert_matches!(
            invocation.inputs,
            VariantArgs::SpeechToVideo { init_first_frame: true, infer_frames: 80, .. }
        );
        assert_eq!(invocation.pipeline.use_relighting_lora, None);

        let animate = GenerationRequest {
            task: "animate-14B".into(),
            src_root_path: Some("/pose".into()),
            use_relighting_lora: true,
            ..Default::default()
        };
        let invocation = plan_for(animate, &DistributedConfig::single());
        assert_eq!(invocation.variant, PipelineVariant::WanAnimate);
        assert_eq!(invocation.pipeline.use_relighting_lora, Some(true));
        assert_matches!(invocation.inputs, VariantArgs::Animate { clip_len: 77, refert_num: 77, .. });
    }

    #[test]
    fn explicit_mp4_output_path_is_used_verbatim() {
        let request = GenerationRequest {
            output_path: Some("/videos/final.mp4".into()),
            ..GenerationRequest::new("t2v", "x")
        };
        let invocation = plan_for(request, &DistributedConfig::single());
        assert_eq!(invocation.save_file, PathBuf::from("/videos/final.mp4"));
    }

    #[test]
    fn invocation_json_keeps_variant_arguments_disjoint() {
        let request = GenerationRequest {
            image: Some("in.png".into()),
            ..GenerationRequest::new("ti2v-5B", "a dog")
        };
        let invocation = plan_for(request, &DistributedConfig::single());
        let json = serde_json::to_value(&invocation).unwrap();
        assert_eq!(json["variant"], "WanTI2V");
        assert_eq!(json["inputs"]["img"], "in.png");
        assert_eq!(json["inputs"]["max_area"], 1280 * 704);
        assert!(json["inputs"].get("audio_path").is_none());
        assert!(json["pipeline"].get("use_relighting_lora").is_none());
    }
}
