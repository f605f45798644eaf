//! Transcoding through an external `ffmpeg` process.
//!
//! [`encode_args`] builds the fixed argument list, [`run_command`] executes
//! a child process and captures its output, and [`Transcoder`] is the seam
//! the ingest pipeline depends on.

use async_trait::async_trait;
use std::{
    ffi::{OsStr, OsString},
    path::Path,
    process::Stdio,
};
use tokio::process::Command;
use tracing::debug;

/// Outcome of one external command: stdout on success, stderr (or the spawn
/// error) on failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeResult {
    pub success: bool,
    pub detail: String,
}

impl EncodeResult {
    pub fn ok(detail: impl Into<String>) -> Self {
        Self {
            success: true,
            detail: detail.into(),
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            success: false,
            detail: detail.into(),
        }
    }
}

/// Encoding policy: H.264 high profile at half resolution, 1.25–2.5 Mbit/s,
/// fast-start MP4. Only the first pass is ever run.
const VIDEO_OPTIONS: &[&str] = &[
    "-movflags",
    "+faststart",
    "-c:v",
    "libx264",
    "-filter:v",
    "scale=iw/2:ih/2,setsar=1:1",
    "-coder",
    "1",
    "-pix_fmt",
    "yuv420p",
    "-profile:v",
    "high",
    "-level",
    "4.0",
    "-preset:v",
    "veryfast",
    "-tune",
    "film",
    "-bf",
    "3",
    "-b_strategy",
    "2",
    "-g",
    "60",
    "-refs",
    "10",
    "-b:v",
    "1.5M",
    "-minrate",
    "1.25M",
    "-maxrate",
    "2.5M",
    "-bufsize",
    "2.5M",
    "-movflags",
    "faststart",
    "-b:a",
    "64k",
    "-pass",
    "1",
];

/// Arguments for transcoding `input` into `output`, excluding the program.
pub fn encode_args(input: &Path, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-hide_banner", "-loglevel", "error", "-y", "-i"]
        .iter()
        .map(OsString::from)
        .collect();
    args.push(input.as_os_str().to_owned());
    args.extend(VIDEO_OPTIONS.iter().map(OsString::from));
    args.push(output.as_os_str().to_owned());
    args
}

/// Run `program` with `args` to completion. Never returns an error: a
/// process that cannot be spawned is reported as a failed result.
///
/// There is no timeout; a hung child blocks the caller.
pub async fn run_command(program: &OsStr, args: &[OsString]) -> EncodeResult {
    debug!(program = %program.to_string_lossy(), args = args.len(), "spawning command");

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await;

    match output {
        Ok(out) if out.status.success() => {
            EncodeResult::ok(String::from_utf8_lossy(&out.stdout).into_owned())
        }
        Ok(out) => {
            let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
            if stderr.is_empty() {
                EncodeResult::failed(format!("process exited with {}", out.status))
            } else {
                EncodeResult::failed(stderr)
            }
        }
        Err(err) => EncodeResult::failed(format!(
            "failed to spawn `{}`: {}",
            program.to_string_lossy(),
            err
        )),
    }
}

#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn encode(&self, input: &Path, output: &Path) -> EncodeResult;
}

/// Runs the configured ffmpeg executable with [`encode_args`].
#[derive(Clone, Debug)]
pub struct FfmpegTranscoder {
    program: OsString,
}

impl FfmpegTranscoder {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn encode(&self, input: &Path, output: &Path) -> EncodeResult {
        let is_file = tokio::fs::metadata(input)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !is_file {
            return EncodeResult::failed("input is not a file");
        }

        let args = encode_args(input, output);
        run_command(&self.program, &args).await
    }
}
