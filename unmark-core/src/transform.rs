//! Boundary to the watermark remover.
//!
//! The remover itself is opaque: it takes an input clip and an output path,
//! may run for minutes, and optionally reports progress. [`CommandTransform`]
//! drives it as an external program whose arguments are rendered from
//! templates containing `{input}` and `{output}`.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, trace};

pub const INPUT_PLACEHOLDER: &str = "{input}";
pub const OUTPUT_PLACEHOLDER: &str = "{output}";

const OUTPUT_TAIL_LINES: usize = 8;

static PERCENT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([0-9]{1,3})(?:\.[0-9]+)?\s*%").expect("percent pattern is valid"));

/// Progress callback handed to a transform. Receives 0..=100.
pub type ProgressHook<'a> = &'a (dyn Fn(u8) + Send + Sync);

#[derive(Error, Debug)]
pub enum TransformError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error while running transform: {0}")]
    Io(#[from] std::io::Error),

    #[error("{program} exited with {status}: {detail}")]
    Exit {
        program: String,
        status: String,
        detail: String,
    },

    #[error("transform finished without producing {0}")]
    MissingOutput(PathBuf),

    #[error("{0}")]
    Failed(String),
}

/// A long-running input → output transform. Implementations must tolerate
/// being called at most once at a time; the coordinator never overlaps runs.
#[async_trait]
pub trait Transform: Send + Sync {
    async fn run(
        &self,
        input: &Path,
        output: &Path,
        on_progress: ProgressHook<'_>,
    ) -> Result<(), TransformError>;
}

/// Runs an external program per clip.
#[derive(Clone, Debug)]
pub struct CommandTransform {
    program: String,
    args: Vec<String>,
}

impl CommandTransform {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Substitute `{input}`/`{output}` in every argument template.
    pub fn render_args(&self, input: &Path, output: &Path) -> Vec<String> {
        let input = input.to_string_lossy();
        let output = output.to_string_lossy();
        self.args
            .iter()
            .map(|arg| {
                arg.replace(INPUT_PLACEHOLDER, &input)
                    .replace(OUTPUT_PLACEHOLDER, &output)
            })
            .collect()
    }
}

#[async_trait]
impl Transform for CommandTransform {
    async fn run(
        &self,
        input: &Path,
        output: &Path,
        on_progress: ProgressHook<'_>,
    ) -> Result<(), TransformError> {
        let args = self.render_args(input, output);
        debug!(program = %self.program, ?args, "launching transform");

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| TransformError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (stdout_tail, stderr_tail) = tokio::join!(
            pump_output(stdout, on_progress),
            pump_output(stderr, on_progress)
        );

        let status = child.wait().await?;
        if !status.success() {
            let tail = if stderr_tail.is_empty() {
                stdout_tail
            } else {
                stderr_tail
            };
            let detail = if tail.is_empty() {
                "no output".to_string()
            } else {
                tail.into_iter().collect::<Vec<_>>().join(" | ")
            };
            return Err(TransformError::Exit {
                program: self.program.clone(),
                status: status.to_string(),
                detail,
            });
        }

        if !tokio::fs::try_exists(output).await.unwrap_or(false) {
            return Err(TransformError::MissingOutput(output.to_path_buf()));
        }

        Ok(())
    }
}

/// Read a child stream to completion, forwarding percentages to the hook and
/// keeping the last few lines for error reports. Carriage returns count as
/// line breaks so `\r`-redrawn progress bars are understood.
async fn pump_output<R>(reader: Option<R>, on_progress: ProgressHook<'_>) -> VecDeque<String>
where
    R: AsyncRead + Unpin,
{
    let mut tail = VecDeque::with_capacity(OUTPUT_TAIL_LINES);
    let Some(reader) = reader else {
        return tail;
    };

    let mut segments = BufReader::new(reader).split(b'\n');
    loop {
        let segment = match segments.next_segment().await {
            Ok(Some(segment)) => segment,
            Ok(None) => break,
            Err(err) => {
                debug!(error = %err, "stopped reading transform output");
                break;
            }
        };

        let text = String::from_utf8_lossy(&segment);
        for piece in text.split('\r') {
            let piece = piece.trim();
            if piece.is_empty() {
                continue;
            }
            match parse_progress(piece) {
                Some(percent) => on_progress(percent),
                None => trace!(line = piece, "transform output"),
            }
            if tail.len() == OUTPUT_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(piece.to_string());
        }
    }

    tail
}

/// Last percentage mentioned in a line, clamped to 100.
pub fn parse_progress(line: &str) -> Option<u8> {
    PERCENT_PATTERN
        .captures_iter(line)
        .last()
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u16>().ok())
        .map(|value| value.min(100) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    #[test]
    fn parses_percentages() {
        assert_eq!(parse_progress("Processing: 42%"), Some(42));
        assert_eq!(parse_progress("frames 10/20 50.5 %"), Some(50));
        assert_eq!(parse_progress("a 10% b 20%"), Some(20));
        assert_eq!(parse_progress("loading model"), None);
        assert_eq!(parse_progress("999%"), Some(100));
    }

    #[test]
    fn renders_placeholders() {
        let transform = CommandTransform::new(
            "sorawm",
            vec![
                "--input={input}".to_string(),
                "{output}".to_string(),
                "--fast".to_string(),
            ],
        );
        let args = transform.render_args(Path::new("/in/a.mp4"), Path::new("/out/wr_a.mp4"));
        assert_eq!(args, vec!["--input=/in/a.mp4", "/out/wr_a.mp4", "--fast"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_success_reports_progress() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("20251104_1209_a.mp4");
        let output = dir.path().join("wr_20251104_1209.mp4");
        std::fs::write(&input, b"video").unwrap();

        let transform = CommandTransform::new(
            "sh",
            vec![
                "-c".to_string(),
                r#"echo "25%"; printf '50%%\r75%%\n'; cp "$0" "$1""#.to_string(),
                "{input}".to_string(),
                "{output}".to_string(),
            ],
        );

        let seen = Mutex::new(Vec::new());
        let hook = |p: u8| seen.lock().unwrap().push(p);
        transform.run(&input, &output, &hook).await.unwrap();

        assert!(output.exists());
        assert_eq!(*seen.lock().unwrap(), vec![25, 50, 75]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_failure_carries_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let transform = CommandTransform::new(
            "sh",
            vec!["-c".to_string(), "echo 'model missing' >&2; exit 3".to_string()],
        );

        let err = transform
            .run(&dir.path().join("in.mp4"), &dir.path().join("out.mp4"), &|_| {})
            .await
            .unwrap_err();
        match err {
            TransformError::Exit { detail, .. } => assert!(detail.contains("model missing")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn success_without_output_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let transform = CommandTransform::new("true", Vec::new());
        let err = transform
            .run(&dir.path().join("in.mp4"), &dir.path().join("out.mp4"), &|_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, TransformError::MissingOutput(_)));
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let transform = CommandTransform::new("unmark-definitely-not-installed", Vec::new());
        let err = transform
            .run(Path::new("in.mp4"), Path::new("out.mp4"), &|_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, TransformError::Spawn { .. }));
    }
}
