//! [`ModelRunner`] that runs the model as an external process.
//!
//! The invocation is written to the child's stdin as one JSON document. The
//! child reports back with newline-delimited JSON on stdout:
//!
//! ```text
//! {"event":"progress","percent":42}
//! {"event":"output","video_path":"/out/a.mp4","frames":81}
//! ```
//!
//! Any other stdout line is logged and ignored. A non-zero exit status is a
//! generation error carrying the tail of stderr.

use std::collections::VecDeque;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use vidgen_collective::DistributedConfig;

use crate::error::GenerationError;
use crate::plan::PipelineInvocation;
use crate::runner::{GeneratedVideo, ModelRunner, ProgressFn};

/// Trailing stderr kept from the model process (1 MiB).
const MAX_STDERR_BYTES: usize = 1024 * 1024;

/// Characters of stderr kept in the error message.
const STDERR_TAIL_CHARS: usize = 2000;

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum RunnerEvent {
    Progress {
        percent: f64,
    },
    Output {
        video_path: PathBuf,
        #[serde(default)]
        frames: Option<u32>,
    },
}

/// Spawns `program args…` once per task on each rank.
#[derive(Debug, Clone)]
pub struct SubprocessRunner {
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
    working_dir: Option<PathBuf>,
}

impl SubprocessRunner {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: None,
            working_dir: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    fn command(&self, dist: &DistributedConfig) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // The model runs its own process group; keep it off the port our
        // collective group already listens on.
        let model_port = dist.master_port.checked_add(1).unwrap_or(dist.master_port - 1);
        cmd.env("RANK", dist.rank.to_string())
            .env("WORLD_SIZE", dist.world_size.to_string())
            .env("LOCAL_RANK", dist.local_rank.to_string())
            .env("MASTER_ADDR", &dist.master_addr)
            .env("MASTER_PORT", model_port.to_string());
        if let Some(ifname) = &dist.socket_ifname {
            cmd.env("NCCL_SOCKET_IFNAME", ifname);
        }
        if let Some(ib) = &dist.ib_disable {
            cmd.env("NCCL_IB_DISABLE", ib);
        }
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

#[async_trait]
impl ModelRunner for SubprocessRunner {
    async fn run(
        &self,
        invocation: &PipelineInvocation,
        dist: &DistributedConfig,
        on_progress: ProgressFn<'_>,
    ) -> Result<Option<GeneratedVideo>, GenerationError> {
        let start = Instant::now();
        let rank = dist.rank;
        let payload = encode_invocation(invocation)?;
        let mut child = self.command(dist).spawn().map_err(GenerationError::Spawn)?;

        let stderr_task = tokio::spawn(read_tail(child.stderr.take(), MAX_STDERR_BYTES));
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();

        let session = async {
            if let Some(mut stdin) = stdin {
                match stdin.write_all(&payload).await {
                    Ok(()) => {}
                    // The model closed stdin without reading it; its exit
                    // status decides the outcome.
                    Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                        tracing::debug!(rank, "Model closed stdin before reading the invocation");
                    }
                    Err(e) => return Err(e),
                }
            }

            let mut video = None;
            if let Some(stdout) = stdout {
                let mut lines = BufReader::new(stdout).lines();
                while let Some(line) = lines.next_line().await? {
                    match serde_json::from_str::<RunnerEvent>(line.trim()) {
                        Ok(RunnerEvent::Progress { percent }) => {
                            on_progress(percent.clamp(0.0, 100.0) as u8);
                        }
                        Ok(RunnerEvent::Output { video_path, frames }) => {
                            video = Some(GeneratedVideo {
                                path: video_path,
                                frames,
                            });
                        }
                        Err(_) => tracing::debug!(rank, line = %line, "Model output"),
                    }
                }
            }
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((status, video))
        };

        // On timeout the session future is dropped and `child` with it,
        // which kills the process.
        let (status, video) = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, session)
                .await
                .map_err(|_| GenerationError::Timeout {
                    elapsed_ms: start.elapsed().as_millis() as u64,
                })??,
            None => session.await?,
        };

        let stderr_bytes = stderr_task.await.unwrap_or_default();
        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr_bytes);
            return Err(GenerationError::ProcessFailed {
                code: status.code().unwrap_or(-1),
                stderr_tail: tail(stderr.trim_end(), STDERR_TAIL_CHARS),
            });
        }

        tracing::info!(
            rank,
            elapsed_ms = start.elapsed().as_millis() as u64,
            produced_video = video.is_some(),
            "Model process finished",
        );
        Ok(video)
    }
}

/// The invocation as one newline-terminated JSON document.
fn encode_invocation(invocation: &PipelineInvocation) -> Result<Vec<u8>, GenerationError> {
    let mut payload = serde_json::to_vec(invocation)?;
    payload.push(b'\n');
    Ok(payload)
}

/// Drain a stream to EOF, keeping only its last `cap` bytes.
///
/// The stream is always read to the end so the writer never blocks or sees
/// a closed pipe.
async fn read_tail<R: AsyncRead + Unpin>(handle: Option<R>, cap: usize) -> Vec<u8> {
    let mut kept = VecDeque::with_capacity(cap.min(64 * 1024));
    let Some(mut h) = handle else {
        return Vec::new();
    };

    let mut chunk = [0u8; 8192];
    loop {
        match h.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                kept.extend(&chunk[..n]);
                if kept.len() > cap {
                    let excess = kept.len() - cap;
                    kept.drain(..excess);
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
    kept.into()
}

fn tail(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    text.chars().skip(count.saturating_sub(max_chars)).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Mutex;

    use assert_matches::assert_matches;
    use vidgen_core::resolver::resolve;
    use vidgen_core::task::GenerationRequest;
    use vidgen_core::types::TaskId;

    use super::*;
    use crate::plan::plan;

    fn invocation() -> PipelineInvocation {
        let resolved = resolve(&GenerationRequest::new("t2v", "a cat")).unwrap();
        plan(
            &TaskId::from("sub-1"),
            &resolved,
            &DistributedConfig::single(),
            Path::new("/tmp"),
        )
    }

    fn shell(script: &str) -> SubprocessRunner {
        SubprocessRunner::new("sh", vec!["-c".into(), script.into()])
    }

    #[tokio::test]
    async fn parses_progress_and_output_events() {
        let runner = shell(
            r#"cat >/dev/null
echo 'loading weights'
echo '{"event":"progress","percent":25}'
echo '{"event":"progress","percent":180}'
echo "{\"event\":\"output\",\"video_path\":\"/tmp/out.mp4\",\"frames\":$RANK}""#,
        );
        let seen = Mutex::new(Vec::new());
        let on_progress = |p: u8| seen.lock().unwrap().push(p);

        let video = runner
            .run(&invocation(), &DistributedConfig::single(), &on_progress)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(video.path, PathBuf::from("/tmp/out.mp4"));
        assert_eq!(video.frames, Some(0));
        assert_eq!(*seen.lock().unwrap(), vec![25, 100]);
    }

    #[tokio::test]
    async fn invocation_is_written_to_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let captured = dir.path().join("stdin.json");
        let runner = shell(&format!("cat > {}", captured.display()));

        let result = runner
            .run(&invocation(), &DistributedConfig::single(), &|_| {})
            .await
            .unwrap();
        assert!(result.is_none());

        let raw = std::fs::read_to_string(&captured).unwrap();
        let json: serde_json::Value = serde_json::from_str(raw.trim()).unwrap();
        assert_eq!(json["task_id"], "sub-1");
        assert_eq!(json["variant"], "WanT2V");
    }

    #[tokio::test]
    async fn non_zero_exit_reports_stderr_tail() {
        let runner = shell("echo 'CUDA out of memory' >&2; exit 3");
        let result = runner
            .run(&invocation(), &DistributedConfig::single(), &|_| {})
            .await;
        assert_matches!(
            result,
            Err(GenerationError::ProcessFailed { code: 3, stderr_tail }) if stderr_tail.contains("out of memory")
        );
    }

    #[tokio::test]
    async fn timeout_kills_the_process() {
        let runner = shell("sleep 5").with_timeout(Some(Duration::from_millis(100)));
        let result = runner
            .run(&invocation(), &DistributedConfig::single(), &|_| {})
            .await;
        assert_matches!(result, Err(GenerationError::Timeout { .. }));
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let runner = SubprocessRunner::new("/nonexistent/vidgen-model", vec![]);
        let result = runner
            .run(&invocation(), &DistributedConfig::single(), &|_| {})
            .await;
        assert_matches!(result, Err(GenerationError::Spawn(_)));
    }

    #[tokio::test]
    async fn working_dir_is_applied() {
        let dir = tempfile::tempdir().unwrap();
        let runner = shell("cat >/dev/null; pwd >&2; exit 1").with_working_dir(dir.path());
        assert_eq!(runner.working_dir(), Some(dir.path()));

        let result = runner
            .run(&invocation(), &DistributedConfig::single(), &|_| {})
            .await;

        let expected = dir.path().canonicalize().unwrap();
        assert_matches!(
            result,
            Err(GenerationError::ProcessFailed { code: 1, stderr_tail })
                if Path::new(&stderr_tail).canonicalize().unwrap() == expected
        );
    }

    #[tokio::test]
    async fn stderr_beyond_the_cap_keeps_the_tail() {
        let runner = shell(
            "cat >/dev/null; head -c 1200000 /dev/zero | tr '\\0' x >&2; echo 'CUDA out of memory' >&2; exit 2",
        );
        let result = runner
            .run(&invocation(), &DistributedConfig::single(), &|_| {})
            .await;
        assert_matches!(
            result,
            Err(GenerationError::ProcessFailed { code: 2, stderr_tail })
                if stderr_tail.ends_with("CUDA out of memory")
        );
    }

    #[tokio::test]
    async fn read_tail_drains_and_keeps_last_bytes() {
        let input: Vec<u8> = (0..=255u8).cycle().take(100_000).collect();
        let kept = read_tail(Some(&input[..]), 1000).await;
        assert_eq!(kept, &input[input.len() - 1000..]);

        assert_eq!(read_tail(Some(&b"short"[..]), 1000).await, b"short");
        assert!(read_tail(None::<&[u8]>, 1000).await.is_empty());
    }

    #[tokio::test]
    async fn model_that_ignores_stdin_is_judged_by_exit_status() {
        let runner = shell("exec 0<&-; echo 'bad checkpoint' >&2; exit 4");
        let result = runner
            .run(&invocation(), &DistributedConfig::single(), &|_| {})
            .await;
        assert_matches!(
            result,
            Err(GenerationError::ProcessFailed { code: 4, stderr_tail }) if stderr_tail.contains("bad checkpoint")
        );
    }

    #[test]
    fn encoded_invocation_is_one_json_line() {
        let payload = encode_invocation(&invocation()).unwrap();
        assert_eq!(payload.last(), Some(&b'\n'));
        assert_eq!(payload.iter().filter(|&&b| b == b'\n').count(), 1);
        let json: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(json["task_id"], "sub-1");
    }

    #[test]
    fn tail_keeps_last_characters() {
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail("ab", 3), "ab");
    }
}
