//! Caption frame rendering.
//!
//! A frame is a 1280x720 still with the text stacked in the right-hand
//! section: series title, a separator rule, the main title, a speaker
//! bubble and an optional caption box. Font sizes shrink linearly with
//! word count so long titles still fit.
//!
//! The default renderer draws with FFmpeg's `drawtext`/`drawbox` filters
//! over a background image, or over a plain fill when the background is
//! missing. Text is passed through `textfile=` so captions never need
//! filter escaping.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};
use vcast_models::FrameText;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Renders the still image for one segment.
#[async_trait]
pub trait FrameRenderer: Send + Sync {
    /// Render `text` to an image file at `output`.
    async fn render(&self, text: &FrameText, output: &Path) -> MediaResult<()>;
}

// =============================================================================
// Layout
// =============================================================================

const COLOR_SERIES: &str = "0x000000";
const COLOR_MAIN_TITLE: &str = "0x388090";
const COLOR_ACCENT: &str = "0x629f60";
const COLOR_BACKGROUND: &str = "0xf8f8f8";
const COLOR_BOX_BORDER: &str = "0xa0a0a0";
const COLOR_CAPTION: &str = "0x0b5394";

/// Average glyph advance as a fraction of the font size.
const GLYPH_WIDTH_RATIO: f64 = 0.5;
/// Baseline-to-top distance as a fraction of the font size.
const ASCENT_RATIO: f64 = 0.8;

/// Word-count driven font size.
#[derive(Debug, Clone, Copy)]
pub struct FontScale {
    pub base: f64,
    pub min: f64,
    /// Word count at which the size starts shrinking
    pub trigger_words: usize,
    /// Word count at which the size reaches `min`
    pub max_words: usize,
}

impl FontScale {
    pub const SERIES_TITLE: FontScale = FontScale { base: 35.0, min: 20.0, trigger_words: 4, max_words: 15 };
    pub const MAIN_TITLE: FontScale = FontScale { base: 55.0, min: 30.0, trigger_words: 5, max_words: 20 };
    pub const SPEAKER: FontScale = FontScale { base: 45.0, min: 25.0, trigger_words: 3, max_words: 10 };
    pub const CAPTION: FontScale = FontScale { base: 28.0, min: 16.0, trigger_words: 30, max_words: 80 };

    /// Font size for `text`.
    pub fn size_for(&self, text: &str) -> f64 {
        let words = text.split_whitespace().count();
        if words <= self.trigger_words {
            return self.base;
        }
        let over = (words.min(self.max_words) - self.trigger_words) as f64;
        let range = (self.max_words - self.trigger_words) as f64;
        self.base - (over / range) * (self.base - self.min)
    }
}

/// Canvas geometry and assets.
#[derive(Debug, Clone)]
pub struct FrameLayout {
    pub width: u32,
    pub height: u32,
    /// Background image; a plain fill is used when absent or missing
    pub background: Option<PathBuf>,
    /// Font file for drawtext; fontconfig's default sans when absent
    pub font_file: Option<PathBuf>,
}

impl Default for FrameLayout {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            background: Some(PathBuf::from("image.jpg")),
            font_file: None,
        }
    }
}

impl FrameLayout {
    /// Create layout from environment variables.
    pub fn from_env() -> Self {
        Self {
            background: Some(PathBuf::from(
                std::env::var("FRAME_BACKGROUND").unwrap_or_else(|_| "image.jpg".to_string()),
            )),
            font_file: std::env::var("FRAME_FONT").ok().map(PathBuf::from),
            ..Default::default()
        }
    }

    fn section_left(&self) -> f64 {
        self.width as f64 * 0.4
    }

    fn section_width(&self) -> f64 {
        self.width as f64 - self.section_left() - 60.0
    }

    fn center_x(&self) -> f64 {
        self.section_left() + self.section_width() / 2.0
    }
}

/// One drawing primitive of a planned frame.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    /// Text centered on `center_x`, top edge at `y`
    Text {
        content: String,
        size: u32,
        color: &'static str,
        center_x: f64,
        y: f64,
        bold: bool,
    },
    /// Rectangle; `thickness` of `None` means filled
    Rect {
        x: f64,
        y: f64,
        w: f64,
        h: f64,
        color: String,
        thickness: Option<u32>,
    },
}

/// Greedy word wrap against an estimated line width.
pub fn wrap_text(text: &str, max_width: f64, font_size: f64) -> Vec<String> {
    let advance = font_size * GLYPH_WIDTH_RATIO;
    let fits = |line: &str| line.chars().count() as f64 * advance <= max_width;

    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.is_empty() {
            current.push_str(word);
            continue;
        }
        let candidate = format!("{} {}", current, word);
        if fits(&candidate) {
            current = candidate;
        } else {
            lines.push(std::mem::replace(&mut current, word.to_string()));
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

fn estimate_width(text: &str, font_size: f64) -> f64 {
    text.chars().count() as f64 * font_size * GLYPH_WIDTH_RATIO
}

/// Lay out every element of the frame.
pub fn plan_frame(text: &FrameText, layout: &FrameLayout) -> Vec<DrawOp> {
    let mut ops = Vec::new();
    let cx = layout.center_x();
    let section_width = layout.section_width();

    // Series title
    let series_size = FontScale::SERIES_TITLE.size_for(&text.series_title).round();
    let series_line_height = (series_size * 1.25).round();
    let mut baseline = 90.0;
    for line in wrap_text(&text.series_title, section_width * 0.9, series_size) {
        ops.push(DrawOp::Text {
            content: line,
            size: series_size as u32,
            color: COLOR_SERIES,
            center_x: cx,
            y: baseline - series_size * ASCENT_RATIO,
            bold: false,
        });
        baseline += series_line_height;
    }

    // Separator rule
    let rule_y = baseline - series_line_height + 20.0;
    ops.push(DrawOp::Rect {
        x: cx - 150.0,
        y: rule_y,
        w: 300.0,
        h: 2.0,
        color: COLOR_SERIES.to_string(),
        thickness: None,
    });

    // Main title
    let main_size = FontScale::MAIN_TITLE.size_for(&text.main_title).round();
    let main_line_height = (main_size * 1.25).round();
    baseline = rule_y + 70.0;
    for line in wrap_text(&text.main_title, section_width * 0.7, main_size) {
        ops.push(DrawOp::Text {
            content: line,
            size: main_size as u32,
            color: COLOR_MAIN_TITLE,
            center_x: cx,
            y: baseline - main_size * ASCENT_RATIO,
            bold: true,
        });
        baseline += main_line_height;
    }
    let mut top = baseline + 30.0;

    // Speaker bubble
    let speaker_size = FontScale::SPEAKER.size_for(&text.speaker).round();
    let bubble_w = estimate_width(&text.speaker, speaker_size) + 60.0;
    let bubble_h = speaker_size + 30.0;
    ops.push(DrawOp::Rect {
        x: cx - bubble_w / 2.0,
        y: top,
        w: bubble_w,
        h: bubble_h,
        color: COLOR_ACCENT.to_string(),
        thickness: None,
    });
    ops.push(DrawOp::Text {
        content: text.speaker.clone(),
        size: speaker_size as u32,
        color: COLOR_BACKGROUND,
        center_x: cx,
        y: top + 15.0,
        bold: true,
    });
    top += bubble_h + 30.0;

    // Caption box
    if let Some(caption) = text.caption() {
        let size = FontScale::CAPTION.size_for(caption).round();
        let line_height = (size * 1.4).round();
        let box_w = section_width * 0.9;
        let padding = 20.0;
        let lines = wrap_text(caption, box_w - padding * 2.0, size);
        let box_h = lines.len() as f64 * line_height + padding * 2.0;
        let box_x = cx - box_w / 2.0;

        ops.push(DrawOp::Rect {
            x: box_x,
            y: top,
            w: box_w,
            h: box_h,
            color: "white@0.9".to_string(),
            thickness: None,
        });
        ops.push(DrawOp::Rect {
            x: box_x,
            y: top,
            w: box_w,
            h: box_h,
            color: COLOR_BOX_BORDER.to_string(),
            thickness: Some(2),
        });

        let mut line_baseline = top + padding + line_height / 2.0 + size / 2.0;
        for line in lines {
            ops.push(DrawOp::Text {
                content: line,
                size: size as u32,
                color: COLOR_CAPTION,
                center_x: cx,
                y: line_baseline - size * ASCENT_RATIO,
                bold: false,
            });
            line_baseline += line_height;
        }
    }

    ops
}

/// Escape a value for use inside an FFmpeg filter description.
fn escape_filter_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '\'' | ':' | ',' | ';' | '[' | ']') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Build the filter chain; `text_files[i]` holds the i-th text op's content.
pub fn build_frame_filter(ops: &[DrawOp], layout: &FrameLayout, text_files: &[PathBuf]) -> String {
    let mut filters = vec![format!("scale={}:{}", layout.width, layout.height)];
    let mut files = text_files.iter();

    for op in ops {
        match op {
            DrawOp::Rect { x, y, w, h, color, thickness } => {
                let t = thickness.map(|t| t.to_string()).unwrap_or_else(|| "fill".to_string());
                filters.push(format!(
                    "drawbox=x={:.0}:y={:.0}:w={:.0}:h={:.0}:color={}:t={}",
                    x,
                    y,
                    w,
                    h,
                    escape_filter_value(color),
                    t
                ));
            }
            DrawOp::Text { size, color, center_x, y, bold, .. } => {
                let Some(file) = files.next() else { break };
                let font = match &layout.font_file {
                    Some(path) => format!("fontfile={}", escape_filter_value(&path.to_string_lossy())),
                    None if *bold => "font=Sans Bold".to_string(),
                    None => "font=Sans".to_string(),
                };
                filters.push(format!(
                    "drawtext=textfile={}:expansion=none:{}:fontsize={}:fontcolor={}:x={:.0}-text_w/2:y={:.0}",
                    escape_filter_value(&file.to_string_lossy()),
                    font,
                    size,
                    color,
                    center_x,
                    y
                ));
            }
        }
    }

    filters.join(",")
}

// =============================================================================
// Renderer
// =============================================================================

/// Frame renderer backed by FFmpeg `drawtext`.
#[derive(Debug, Clone, Default)]
pub struct DrawtextFrameRenderer {
    layout: FrameLayout,
    runner: FfmpegRunner,
}

impl DrawtextFrameRenderer {
    pub fn new(layout: FrameLayout) -> Self {
        Self {
            layout,
            runner: FfmpegRunner::new(),
        }
    }

    /// Kill a render that runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.runner = self.runner.with_timeout(timeout);
        self
    }

    pub fn layout(&self) -> &FrameLayout {
        &self.layout
    }
}

#[async_trait]
impl FrameRenderer for DrawtextFrameRenderer {
    async fn render(&self, text: &FrameText, output: &Path) -> MediaResult<()> {
        let ops = plan_frame(text, &self.layout);

        // Text files live only as long as this render.
        let scratch = tempfile::tempdir()
            .map_err(|e| MediaError::frame_render(format!("Failed to create scratch dir: {}", e)))?;
        let mut text_files = Vec::new();
        for (i, op) in ops.iter().enumerate() {
            if let DrawOp::Text { content, .. } = op {
                let path = scratch.path().join(format!("line-{}.txt", i));
                tokio::fs::write(&path, content).await?;
                text_files.push(path);
            }
        }

        let filter = build_frame_filter(&ops, &self.layout, &text_files);

        let cmd = match self.layout.background.as_deref().filter(|p| p.exists()) {
            Some(background) => FfmpegCommand::new(background, output),
            None => {
                if let Some(missing) = &self.layout.background {
                    warn!("Background image {} not found, using plain fill", missing.display());
                }
                FfmpegCommand::without_input(output)
                    .raw_input(format!(
                        "color=c={}:s={}x{}",
                        COLOR_BACKGROUND, self.layout.width, self.layout.height
                    ))
                    .input_args(["-f", "lavfi"])
            }
        }
        .video_filter(filter)
        .single_frame();

        self.runner.run(&cmd, "Frame render").await.map_err(|e| match e {
            MediaError::FfmpegFailed { message, stderr, .. } => MediaError::frame_render(format!(
                "{}: {}",
                message,
                stderr.unwrap_or_default().trim()
            )),
            other => other,
        })?;

        debug!("Frame saved to {}", output.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vcast_models::BaseTextData;

    fn text(extra: Option<&str>) -> FrameText {
        BaseTextData::new("Weekly Lessons", "On Patience", "Sheikh Ahmad").for_segment(extra)
    }

    #[test]
    fn test_font_scale_short_text_uses_base() {
        assert_eq!(FontScale::MAIN_TITLE.size_for("one two three"), 55.0);
    }

    #[test]
    fn test_font_scale_shrinks_to_min() {
        let long = vec!["word"; 40].join(" ");
        assert_eq!(FontScale::MAIN_TITLE.size_for(&long), 30.0);
        // 10 words: 5 over trigger out of a 15 word range
        let ten = vec!["word"; 10].join(" ");
        let expected = 55.0 - (5.0 / 15.0) * 25.0;
        assert!((FontScale::MAIN_TITLE.size_for(&ten) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_wrap_text_respects_width() {
        let lines = wrap_text("aaaa bbbb cccc dddd", 100.0, 20.0);
        // 10px per glyph, so at most 10 glyphs per line
        assert_eq!(lines, vec!["aaaa bbbb", "cccc dddd"]);
        assert_eq!(wrap_text("", 100.0, 20.0), vec![String::new()]);
    }

    #[test]
    fn test_plan_without_caption_has_no_box() {
        let ops = plan_frame(&text(None), &FrameLayout::default());
        let rects = ops.iter().filter(|op| matches!(op, DrawOp::Rect { .. })).count();
        // separator rule and speaker bubble
        assert_eq!(rects, 2);
    }

    #[test]
    fn test_plan_with_caption_adds_box_and_lines() {
        let ops = plan_frame(&text(Some("A short caption")), &FrameLayout::default());
        let rects = ops.iter().filter(|op| matches!(op, DrawOp::Rect { .. })).count();
        assert_eq!(rects, 4);
        assert!(ops.iter().any(|op| matches!(
            op,
            DrawOp::Text { content, color, .. } if content == "A short caption" && *color == COLOR_CAPTION
        )));
    }

    #[test]
    fn test_filter_references_text_files_in_order() {
        let layout = FrameLayout::default();
        let ops = plan_frame(&text(None), &layout);
        let count = ops.iter().filter(|op| matches!(op, DrawOp::Text { .. })).count();
        let files: Vec<PathBuf> = (0..count).map(|i| PathBuf::from(format!("/tmp/s/line-{}.txt", i))).collect();

        let filter = build_frame_filter(&ops, &layout, &files);
        assert!(filter.starts_with("scale=1280:720,"));
        let first = filter.find("line-0.txt").unwrap();
        let last = filter.find(&format!("line-{}.txt", count - 1)).unwrap();
        assert!(first < last);
        assert!(filter.contains("expansion=none"));
    }

    #[test]
    fn test_escape_filter_value() {
        assert_eq!(escape_filter_value("C:\\fonts\\a.ttf"), "C\\:\\\\fonts\\\\a.ttf");
        assert_eq!(escape_filter_value("white@0.9"), "white@0.9");
    }
}
