//! FFmpeg CLI wrapper for the render pipeline.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building and execution
//! - Audio trimming and duration probing
//! - Still-image muxing and stream-copy concatenation
//! - Caption frame rendering
//! - The `MediaToolkit` seam the worker drives

pub mod audio;
pub mod command;
pub mod concat;
pub mod error;
pub mod frame;
pub mod mux;
pub mod probe;
pub mod toolkit;

pub use audio::trim_audio;
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use concat::concatenate_clips;
pub use error::{MediaError, MediaResult};
pub use frame::{DrawtextFrameRenderer, FrameLayout, FrameRenderer};
pub use mux::mux_still_image;
pub use probe::{probe_audio, probe_duration, AudioInfo};
pub use toolkit::{FfmpegToolkit, MediaToolkit};
