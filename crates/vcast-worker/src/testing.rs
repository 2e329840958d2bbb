//! Test doubles for the media tools and a scratch environment.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use vcast_media::{FrameRenderer, MediaError, MediaResult, MediaToolkit};
use vcast_models::{BaseTextData, FrameText, Segment};
use vcast_queue::RenderVideoJob;
use vcast_storage::{fingerprint_bytes, ArtifactCache, CacheConfig};

use crate::pipeline::RenderPipeline;
use crate::progress::ProgressSink;

/// Media toolkit that writes placeholder files instead of running FFmpeg.
#[derive(Default)]
pub struct FakeToolkit {
    fail_trim_at: Mutex<Option<f64>>,
    trims_time_out: AtomicBool,
    fail_concat_call: Mutex<Option<usize>>,
    trim_delay: Mutex<Duration>,
    trim_starts: Mutex<Vec<f64>>,
    trim_times: Mutex<Vec<Instant>>,
    concat_calls: Mutex<Vec<Vec<PathBuf>>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl FakeToolkit {
    /// Fail every trim whose range starts at `start`.
    pub fn fail_trim_at(&self, start: f64) {
        *self.fail_trim_at.lock().unwrap() = Some(start);
    }

    /// Every trim fails the way a hung FFmpeg does once its limit passes.
    pub fn time_out_trims(&self) {
        self.trims_time_out.store(true, Ordering::SeqCst);
    }

    /// Fail the `index`-th concat call (0-based) after it wrote partial output.
    pub fn fail_concat_call(&self, index: usize) {
        *self.fail_concat_call.lock().unwrap() = Some(index);
    }

    pub fn set_trim_delay(&self, delay: Duration) {
        *self.trim_delay.lock().unwrap() = delay;
    }

    pub fn trim_starts(&self) -> Vec<f64> {
        self.trim_starts.lock().unwrap().clone()
    }

    pub fn trim_times(&self) -> Vec<Instant> {
        self.trim_times.lock().unwrap().clone()
    }

    pub fn concat_calls(&self) -> Vec<Vec<PathBuf>> {
        self.concat_calls.lock().unwrap().clone()
    }

    /// Highest number of trims observed running at once.
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaToolkit for FakeToolkit {
    async fn trim_audio(&self, _input: &Path, output: &Path, start: f64, _end: f64) -> MediaResult<()> {
        self.trim_starts.lock().unwrap().push(start);
        self.trim_times.lock().unwrap().push(Instant::now());

        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);
        let delay = *self.trim_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.trims_time_out.load(Ordering::SeqCst) {
            return Err(MediaError::timeout("Audio trim", Duration::from_secs(600)));
        }
        if *self.fail_trim_at.lock().unwrap() == Some(start) {
            return Err(MediaError::ffmpeg_failed(
                "Audio trim failed",
                Some("Invalid data found when processing input".to_string()),
                Some(1),
            ));
        }
        tokio::fs::write(output, b"mp3").await?;
        Ok(())
    }

    async fn probe_duration(&self, _path: &Path) -> MediaResult<f64> {
        Ok(1.0)
    }

    async fn mux_still(&self, _image: &Path, _audio: &Path, output: &Path, _duration: f64) -> MediaResult<()> {
        tokio::fs::write(output, b"mp4").await?;
        Ok(())
    }

    async fn concat(&self, clips: &[PathBuf], output: &Path) -> MediaResult<()> {
        let index = {
            let mut calls = self.concat_calls.lock().unwrap();
            calls.push(clips.to_vec());
            calls.len() - 1
        };
        if *self.fail_concat_call.lock().unwrap() == Some(index) {
            tokio::fs::write(output, b"trunc").await?;
            return Err(MediaError::ffmpeg_failed("Concat failed", None, Some(1)));
        }
        tokio::fs::write(output, b"final").await?;
        Ok(())
    }
}

/// Frame renderer that writes a placeholder image.
#[derive(Default)]
pub struct FakeFrames {
    panic: AtomicBool,
}

impl FakeFrames {
    pub fn panic_on_render(&self) {
        self.panic.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl FrameRenderer for FakeFrames {
    async fn render(&self, _text: &FrameText, output: &Path) -> MediaResult<()> {
        if self.panic.load(Ordering::SeqCst) {
            panic!("frame renderer exploded");
        }
        tokio::fs::write(output, b"png").await?;
        Ok(())
    }
}

/// Progress sink that keeps every reported value.
#[derive(Default)]
pub struct RecordingProgress {
    values: Mutex<Vec<u8>>,
}

impl RecordingProgress {
    pub fn values(&self) -> Vec<u8> {
        self.values.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProgressSink for RecordingProgress {
    async fn report(&self, percent: u8) {
        self.values.lock().unwrap().push(percent);
    }
}

/// Scratch directories plus fakes wired into a pipeline.
pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub media: Arc<FakeToolkit>,
    pub frames: Arc<FakeFrames>,
    pub cache: Arc<ArtifactCache>,
}

impl Fixture {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        for sub in ["work", "out", "uploads"] {
            tokio::fs::create_dir_all(dir.path().join(sub)).await.unwrap();
        }
        let cache = ArtifactCache::load(CacheConfig {
            cache_file: dir.path().join("videoCache.json"),
            output_dir: dir.path().join("out"),
        })
        .await;

        Self {
            dir,
            media: Arc::new(FakeToolkit::default()),
            frames: Arc::new(FakeFrames::default()),
            cache: Arc::new(cache),
        }
    }

    pub fn work_dir(&self) -> PathBuf {
        self.dir.path().join("work")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.dir.path().join("out")
    }

    pub fn upload_dir(&self) -> PathBuf {
        self.dir.path().join("uploads")
    }

    pub fn pipeline(&self) -> RenderPipeline {
        RenderPipeline::new(
            self.media.clone(),
            self.frames.clone(),
            self.cache.clone(),
            self.work_dir(),
            self.output_dir(),
        )
    }

    /// Files left in the scratch directory.
    pub fn work_files(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.work_dir())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect()
    }
}

/// A job over a freshly written audio file with unique content.
pub async fn audio_job(fx: &Fixture, segments: Vec<Segment>) -> RenderVideoJob {
    let name = uuid::Uuid::new_v4().to_string();
    let audio_path = fx.upload_dir().join(format!("{}.mp3", name));
    tokio::fs::write(&audio_path, name.as_bytes()).await.unwrap();

    let base_text = BaseTextData::new("Series", "Main", "Speaker");
    let fingerprint = fingerprint_bytes(&base_text, &segments, name.as_bytes());
    RenderVideoJob::new(audio_path, fingerprint.into_string(), base_text, segments)
}
