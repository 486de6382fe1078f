//! Scripted doubles for driving the pipeline without ffmpeg or a network.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use mpipe_media::{Fetcher, MediaError, MediaResult, ToolOutput, ToolRunner};
use mpipe_worker::{Pipeline, PipelineConfig};

pub const PROBE_JSON: &str = r#"{
    "format": {"format_name": "mov,mp4,m4a,3gp,3g2,mj2"},
    "streams": [
        {"codec_type": "video", "codec_name": "h264"},
        {"codec_type": "audio", "codec_name": "aac"}
    ]
}"#;

fn ok() -> ToolOutput {
    ToolOutput {
        exit_code: Some(0),
        ..Default::default()
    }
}

fn failed(stderr: &str) -> ToolOutput {
    ToolOutput {
        stderr: stderr.to_string(),
        exit_code: Some(1),
        ..Default::default()
    }
}

fn inputs_of(args: &[String]) -> Vec<PathBuf> {
    args.windows(2)
        .filter(|w| w[0] == "-i")
        .map(|w| PathBuf::from(&w[1]))
        .collect()
}

/// Stand-in for ffmpeg/ffprobe.
///
/// Remux copies the input, conversion writes `mp3:<input>`, combination
/// writes the inputs joined with `|` in `-i` order. Failures are scripted.
#[derive(Default)]
pub struct FakeTools {
    pub calls: Mutex<Vec<(String, Vec<String>)>>,
    /// Remux fails for inputs whose path ends with one of these
    pub fail_remux: Vec<String>,
    pub probe_fails: bool,
    /// Encode exits non-zero with this stderr
    pub encode_failure: Option<String>,
    pub empty_output: bool,
    /// Encode exits 0 without writing its output
    pub skip_output: bool,
    pub encode_delay: Option<Duration>,
    /// Remux writes a partial file, then stalls this long
    pub remux_delay: Option<Duration>,
    pub probe_delay: Option<Duration>,
}

impl FakeTools {
    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn ffmpeg_calls(&self) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter(|(program, _)| program == "ffmpeg")
            .map(|(_, args)| args)
            .collect()
    }

    /// The conversion/combination invocation.
    pub fn encode_call(&self) -> Option<Vec<String>> {
        self.ffmpeg_calls()
            .into_iter()
            .find(|args| !args.iter().any(|a| a == "-movflags"))
    }
}

#[async_trait]
impl ToolRunner for FakeTools {
    async fn run_tool(&self, program: &str, args: &[String]) -> MediaResult<ToolOutput> {
        self.calls
            .lock()
            .unwrap()
            .push((program.to_string(), args.to_vec()));

        if program == "ffprobe" {
            if let Some(delay) = self.probe_delay {
                tokio::time::sleep(delay).await;
            }
            if self.probe_fails {
                return Ok(failed("Invalid data found when processing input"));
            }
            return Ok(ToolOutput {
                stdout: PROBE_JSON.to_string(),
                exit_code: Some(0),
                ..Default::default()
            });
        }

        let output = PathBuf::from(args.last().unwrap());
        let inputs = inputs_of(args);

        if args.iter().any(|a| a == "-movflags") {
            let input = &inputs[0];
            let name = input.to_string_lossy();
            if self.fail_remux.iter().any(|s| name.ends_with(s.as_str())) {
                tokio::fs::write(&output, b"partial").await?;
                return Ok(failed("moov atom not found"));
            }
            if let Some(delay) = self.remux_delay {
                tokio::fs::write(&output, b"partial").await?;
                tokio::time::sleep(delay).await;
            }
            let data = tokio::fs::read(input).await?;
            tokio::fs::write(&output, data).await?;
            return Ok(ok());
        }

        if let Some(delay) = self.encode_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(stderr) = &self.encode_failure {
            tokio::fs::write(&output, b"partial").await?;
            return Ok(failed(stderr));
        }
        if self.empty_output {
            tokio::fs::write(&output, b"").await?;
            return Ok(ok());
        }
        if self.skip_output {
            return Ok(ok());
        }

        let mut parts = Vec::new();
        for input in &inputs {
            parts.push(tokio::fs::read_to_string(input).await?);
        }
        let body = if args.iter().any(|a| a == "-vn") {
            format!("mp3:{}", parts.join("|"))
        } else {
            parts.join("|")
        };
        tokio::fs::write(&output, body).await?;
        Ok(ok())
    }
}

/// Serves canned bodies by URL; unknown URLs fail like an HTTP 404.
#[derive(Default)]
pub struct FakeFetcher {
    bodies: HashMap<String, Vec<u8>>,
    pub delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeFetcher {
    pub fn with_body(mut self, url: &str, body: &[u8]) -> Self {
        self.bodies.insert(url.to_string(), body.to_vec());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> MediaResult<PathBuf> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.bodies.get(url) {
            Some(body) => {
                tokio::fs::write(dest, body).await?;
                Ok(dest.to_path_buf())
            }
            None => Err(MediaError::download_failed(format!(
                "{} returned HTTP 404 Not Found",
                url
            ))),
        }
    }
}

/// A pipeline over a fresh temp work dir.
pub struct Harness {
    pub dir: TempDir,
    pub tools: Arc<FakeTools>,
    pub fetcher: Arc<FakeFetcher>,
}

impl Harness {
    pub fn new(tools: FakeTools, fetcher: FakeFetcher) -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            tools: Arc::new(tools),
            fetcher: Arc::new(fetcher),
        }
    }

    pub fn work_dir(&self) -> PathBuf {
        self.dir.path().join("work")
    }

    pub fn config(&self) -> PipelineConfig {
        PipelineConfig::default().with_work_dir(self.work_dir())
    }

    pub fn pipeline(&self) -> Pipeline {
        self.pipeline_with(self.config())
    }

    pub fn pipeline_with(&self, config: PipelineConfig) -> Pipeline {
        Pipeline::new(config, self.fetcher.clone(), self.tools.clone())
    }

    /// Sorted file names in the work dir.
    pub fn files(&self) -> Vec<String> {
        let mut names: Vec<String> = match std::fs::read_dir(self.work_dir()) {
            Ok(entries) => entries
                .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
                .collect(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }
}
