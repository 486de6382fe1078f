#![deny(unreachable_patterns)]
//! FFmpeg CLI wrapper for the media pipeline.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building over ordered inputs
//! - An external-tool capability (`ToolRunner`) with captured output
//! - Best-effort probing via ffprobe
//! - Fast-start normalization with explicit fallback
//! - Audio conversion and order-preserving concatenation
//! - Source fetching over HTTP(S), and `file://` when enabled

pub mod command;
pub mod download;
pub mod error;
pub mod fs_utils;
pub mod normalize;
pub mod probe;
pub mod transcode;

pub use command::{FfmpegCommand, FfmpegRunner, ProcessToolRunner, ToolOutput, ToolRunner};
pub use download::{Fetcher, HttpFetcher};
pub use error::{MediaError, MediaResult};
pub use normalize::{normalize_faststart, normalized_path_for, NormalizeResult};
pub use probe::{parse_probe_output, probe_media};
pub use transcode::{combine_videos, convert_audio, CombinePlan};
