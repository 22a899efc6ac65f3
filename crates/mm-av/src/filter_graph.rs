//! Filter graph construction for each [`CombinationMode`].
//!
//! The builder is pure: it takes the mode and both probed durations and
//! returns a [`FilterPlan`] holding any video input options, the
//! `-filter_complex` stages, the output options and the duration the output
//! is expected to have. Stream labels are
//! positional: input `0` is always the video, input `1` the audio.

use mm_core::config::EngineConfig;
use mm_core::CombinationMode;
use serde::Serialize;

/// Label every template must produce for the mapped video stream.
pub const FINAL_VIDEO_LABEL: &str = "final_video";

/// Encoder settings appended to every plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeProfile {
    pub video_codec: String,
    pub video_preset: String,
    pub video_crf: u32,
    pub audio_codec: String,
}

impl Default for EncodeProfile {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for EncodeProfile {
    fn from(cfg: &EngineConfig) -> Self {
        Self {
            video_codec: "libx264".into(),
            video_preset: cfg.video_preset.clone(),
            video_crf: cfg.video_crf,
            audio_codec: cfg.audio_codec.clone(),
        }
    }
}

/// Everything the engine needs besides the inputs and the output path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterPlan {
    /// Options placed before the video `-i`.
    pub video_input_options: Vec<String>,
    /// Ordered filter stages, joined with `;` on the command line.
    pub filter_graph: Vec<String>,
    /// Output options in argument order.
    pub output_options: Vec<String>,
    /// Expected duration of the produced file.
    pub final_duration_secs: f64,
    /// Total number of video repetitions when the loop branch was taken.
    pub loop_count: Option<u32>,
}

impl FilterPlan {
    /// The `-filter_complex` argument.
    pub fn filter_complex(&self) -> String {
        self.filter_graph.join(";")
    }

    /// Whether the output is bounded by `-shortest` rather than `-t`.
    pub fn uses_shortest(&self) -> bool {
        self.output_options.iter().any(|o| o == "-shortest")
    }
}

/// How the output length is bounded.
enum Bound {
    Explicit(f64),
    Shortest,
}

/// Builds [`FilterPlan`]s. Cheap to clone; holds only the encode profile.
#[derive(Debug, Clone, Default)]
pub struct FilterGraphBuilder {
    profile: EncodeProfile,
}

impl FilterGraphBuilder {
    pub fn new(profile: EncodeProfile) -> Self {
        Self { profile }
    }

    /// Build the plan for `mode` given both probed durations in seconds.
    pub fn build(&self, mode: CombinationMode, video_secs: f64, audio_secs: f64) -> FilterPlan {
        let shorter = video_secs.min(audio_secs);

        let mut video_input_options = Vec::new();
        let (filter_graph, bound, final_duration_secs, loop_count) = match mode {
            CombinationMode::StandardSync => {
                (standard_sync_graph(), Bound::Explicit(shorter), shorter, None)
            }
            CombinationMode::SpectrumOverlay => {
                (spectrum_overlay_graph(), Bound::Explicit(shorter), shorter, None)
            }
            CombinationMode::FrequencyBarsOverlay => (
                frequency_bars_graph(),
                Bound::Explicit(shorter),
                shorter,
                None,
            ),
            CombinationMode::InvertedColor => {
                (inverted_color_graph(), Bound::Explicit(shorter), shorter, None)
            }
            CombinationMode::PortraitPad => {
                (portrait_pad_graph(), Bound::Explicit(shorter), shorter, None)
            }
            CombinationMode::LoopOrTrim => {
                if video_secs > 0.0 && video_secs < audio_secs {
                    let count = loop_count_for(video_secs, audio_secs);
                    // The demuxer replays the file, so no frames are buffered
                    // and long inputs loop in full.
                    video_input_options = vec![
                        "-stream_loop".to_string(),
                        count.saturating_sub(1).to_string(),
                    ];
                    (loop_graph(), Bound::Shortest, audio_secs, Some(count))
                } else {
                    (trim_graph(audio_secs), Bound::Explicit(audio_secs), audio_secs, None)
                }
            }
        };

        FilterPlan {
            video_input_options,
            filter_graph,
            output_options: self.output_options(bound),
            final_duration_secs,
            loop_count,
        }
    }

    fn output_options(&self, bound: Bound) -> Vec<String> {
        let p = &self.profile;
        let mut opts: Vec<String> = vec![
            "-map".into(),
            format!("[{FINAL_VIDEO_LABEL}]"),
            "-map".into(),
            "1:a".into(),
            "-c:v".into(),
            p.video_codec.clone(),
            "-c:a".into(),
            p.audio_codec.clone(),
        ];

        match bound {
            Bound::Explicit(secs) => {
                opts.push("-t".into());
                opts.push(format_seconds(secs));
            }
            Bound::Shortest => opts.push("-shortest".into()),
        }

        opts.extend([
            "-avoid_negative_ts".into(),
            "make_zero".into(),
            "-preset".into(),
            p.video_preset.clone(),
            "-crf".into(),
            p.video_crf.to_string(),
            "-movflags".into(),
            "+faststart".into(),
        ]);
        opts
    }
}

/// Total repetitions needed for `video_secs` to cover `audio_secs`.
fn loop_count_for(video_secs: f64, audio_secs: f64) -> u32 {
    (audio_secs / video_secs).ceil().max(1.0) as u32
}

/// Render seconds with at least one decimal place (`7.0`, `7.25`).
pub fn format_seconds(secs: f64) -> String {
    if secs.fract() == 0.0 {
        format!("{secs:.1}")
    } else {
        format!("{secs}")
    }
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

fn standard_sync_graph() -> Vec<String> {
    vec![
        "[1:a]showspectrum=mode=separate:color=rainbow:scale=log:size=800x100:orientation=horizontal[spectrum_raw]".into(),
        "[spectrum_raw]format=rgba,colorchannelmixer=aa=0.7[spectrum]".into(),
        "[0:v]scale=1280:720[scaled_video]".into(),
        "[scaled_video]zoompan=z='1.05+0.05*sin(2*PI*it)':d=1:x=iw/2-(iw/zoom/2):y=ih/2-(ih/zoom/2):s=1280x720[bouncing_video]".into(),
        "[bouncing_video]eq=brightness=0.08:contrast=1.15:saturation=1.25[enhanced_video]".into(),
        format!("[enhanced_video][spectrum]overlay=(W-w)/2:H-h-50[{FINAL_VIDEO_LABEL}]"),
    ]
}

fn spectrum_overlay_graph() -> Vec<String> {
    vec![
        "[1:a]showspectrum=s=1280x180:mode=combined:slide=scroll:color=intensity:scale=cbrt[spectrum]".into(),
        "[0:v]scale=1280:720,setsar=1[scaled_video]".into(),
        format!("[scaled_video][spectrum]overlay=0:H-h[{FINAL_VIDEO_LABEL}]"),
    ]
}

fn frequency_bars_graph() -> Vec<String> {
    vec![
        "[1:a]showfreqs=s=1280x240:mode=bar:ascale=log:fscale=log:colors=white[freqs]".into(),
        "[freqs]format=rgba,colorchannelmixer=aa=0.8[bars]".into(),
        "[0:v]scale=1280:720,setsar=1[scaled_video]".into(),
        format!("[scaled_video][bars]overlay=0:H-h[{FINAL_VIDEO_LABEL}]"),
    ]
}

fn inverted_color_graph() -> Vec<String> {
    vec![
        "[0:v]scale=1280:720[scaled_video]".into(),
        format!("[scaled_video]negate[{FINAL_VIDEO_LABEL}]"),
    ]
}

fn portrait_pad_graph() -> Vec<String> {
    vec![
        "[0:v]scale=1080:1920:force_original_aspect_ratio=decrease[fitted_video]".into(),
        format!(
            "[fitted_video]pad=1080:1920:(ow-iw)/2:(oh-ih)/2:color=black,setsar=1[{FINAL_VIDEO_LABEL}]"
        ),
    ]
}

fn loop_graph() -> Vec<String> {
    vec![format!("[0:v]setpts=PTS-STARTPTS[{FINAL_VIDEO_LABEL}]")]
}

fn trim_graph(audio_secs: f64) -> Vec<String> {
    vec![format!(
        "[0:v]trim=duration={},setpts=PTS-STARTPTS[{FINAL_VIDEO_LABEL}]",
        format_seconds(audio_secs)
    )]
}
