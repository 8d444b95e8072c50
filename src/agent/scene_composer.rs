// SYNOID Scenes - Scene Composer
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Renders one scene: every selected clip is trimmed to the per-clip cap and
// muted, the muted clips are concatenated in selection order, and the
// narration is laid over the result.
//
// Duration policy:
//   audio longer than video -> audio cut to the video length
//   video longer than audio -> video cut to audio + trailing slack
// Video is never stretched or looped to cover narration.

use crate::agent::clip_catalog::Clip;
use crate::agent::video_stitcher::VideoStitcher;
use crate::config::{RenderSettings, SceneConfig};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

/// Name of the intermediate narration track inside the render workspace.
pub const TEMP_AUDIO_FILE: &str = "temp-audio.m4a";

/// Muxed scene inside the workspace, moved to the real output on success.
const RENDERED_SCENE_FILE: &str = "scene.mp4";

/// How the two tracks get cut before muxing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconcilePlan {
    pub audio_secs: f64,
    pub video_secs: f64,
    pub audio_trimmed: bool,
    pub video_trimmed: bool,
}

/// Decide final track lengths from the native ones.
pub fn reconcile_durations(audio_secs: f64, video_secs: f64, trailing_slack_secs: f64) -> ReconcilePlan {
    if audio_secs > video_secs {
        ReconcilePlan {
            audio_secs: video_secs,
            video_secs,
            audio_trimmed: true,
            video_trimmed: false,
        }
    } else if video_secs > audio_secs {
        let limit = audio_secs + trailing_slack_secs;
        ReconcilePlan {
            audio_secs,
            video_secs: video_secs.min(limit),
            audio_trimmed: false,
            video_trimmed: video_secs > limit,
        }
    } else {
        ReconcilePlan {
            audio_secs,
            video_secs,
            audio_trimmed: false,
            video_trimmed: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ComposeReport {
    pub output: PathBuf,
    pub clip_count: usize,
    pub native_audio_secs: f64,
    pub native_video_secs: f64,
    pub plan: ReconcilePlan,
}

/// Turns an allocation into a scene file.
#[async_trait]
pub trait SceneRenderer: Send + Sync {
    async fn render(&self, clips: &[Clip], narration_audio: &Path, output: &Path) -> Result<ComposeReport>;
}

pub struct SceneComposer {
    render: RenderSettings,
    per_clip_cap_secs: f64,
    trailing_slack_secs: f64,
}

impl SceneComposer {
    pub fn new(render: RenderSettings, per_clip_cap_secs: f64, trailing_slack_secs: f64) -> Self {
        Self {
            render,
            per_clip_cap_secs,
            trailing_slack_secs,
        }
    }

    pub fn from_config(config: &SceneConfig) -> Self {
        Self::new(
            config.render.clone(),
            config.per_clip_cap_secs,
            config.trailing_slack_secs,
        )
    }

    /// Render `clips` against `narration_audio` into `output`.
    ///
    /// All intermediates live in a scratch directory that is removed when
    /// this returns, whether or not the render succeeded.
    pub async fn compose(&self, clips: &[Clip], narration_audio: &Path, output: &Path) -> Result<ComposeReport> {
        if clips.is_empty() {
            bail!("No clips selected for scene {:?}", output);
        }

        // Workspace sits next to the output so the final rename stays on one
        // filesystem. A scene file only appears once the render succeeded.
        let scenes_dir = match output.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => parent.to_path_buf(),
            None => PathBuf::from("."),
        };
        tokio::fs::create_dir_all(&scenes_dir)
            .await
            .with_context(|| format!("Creating scenes directory {:?}", scenes_dir))?;
        // Concat manifest entries resolve against the manifest's folder.
        let scenes_dir = tokio::fs::canonicalize(&scenes_dir)
            .await
            .with_context(|| format!("Resolving scenes directory {:?}", scenes_dir))?;
        let workspace = tempfile::Builder::new()
            .prefix(".synoid_scene")
            .tempdir_in(&scenes_dir)
            .context("Creating render workspace")?;
        let work = workspace.path();

        // 1. Trim + mute + normalise each clip
        let mut prepared = Vec::with_capacity(clips.len());
        for (idx, clip) in clips.iter().enumerate() {
            let target = work.join(format!("clip_{:03}.mp4", idx));
            self.prepare_clip(clip, &target).await?;
            prepared.push(target);
        }

        // 2. Concatenate in selection order
        let muted = work.join("muted.mp4");
        let manifest = work.join("concat.txt");
        tokio::fs::write(&manifest, VideoStitcher::create_concat_manifest(&prepared))
            .await
            .context("Writing concat manifest")?;
        run_ffmpeg(
            vec![
                "-f".into(),
                "concat".into(),
                "-safe".into(),
                "0".into(),
                "-i".into(),
                manifest.into_os_string(),
                "-c".into(),
                "copy".into(),
                muted.clone().into_os_string(),
            ],
            "concatenate clips",
        )
        .await?;

        // 3. Load narration, 4. reconcile
        let native_video = probe_duration(&muted).await?;
        let native_audio = probe_duration(narration_audio)
            .await
            .with_context(|| format!("Loading narration audio {:?}", narration_audio))?;
        let plan = reconcile_durations(native_audio, native_video, self.trailing_slack_secs);
        info!(
            "[COMPOSER] Audio {:.2}s, video {:.2}s -> audio {:.2}s, video {:.2}s",
            native_audio, native_video, plan.audio_secs, plan.video_secs
        );

        // 5. Intermediate narration track cut to the planned length
        let temp_audio = work.join(TEMP_AUDIO_FILE);
        run_ffmpeg(
            vec![
                "-i".into(),
                narration_audio.as_os_str().to_owned(),
                "-vn".into(),
                "-t".into(),
                format_secs(plan.audio_secs).into(),
                "-c:a".into(),
                self.render.audio_codec.clone().into(),
                temp_audio.clone().into_os_string(),
            ],
            "prepare narration audio",
        )
        .await?;

        // 6. Mux and render
        let rendered = work.join(RENDERED_SCENE_FILE);
        run_ffmpeg(
            vec![
                "-i".into(),
                muted.into_os_string(),
                "-i".into(),
                temp_audio.clone().into_os_string(),
                "-map".into(),
                "0:v:0".into(),
                "-map".into(),
                "1:a:0".into(),
                "-t".into(),
                format_secs(plan.video_secs).into(),
                "-c:v".into(),
                self.render.video_codec.clone().into(),
                "-preset".into(),
                self.render.preset.clone().into(),
                "-pix_fmt".into(),
                "yuv420p".into(),
                "-c:a".into(),
                "copy".into(),
                "-movflags".into(),
                "+faststart".into(),
                rendered.clone().into_os_string(),
            ],
            "render scene",
        )
        .await?;

        tokio::fs::rename(&rendered, output)
            .await
            .with_context(|| format!("Moving rendered scene into {:?}", output))?;

        let _ = tokio::fs::remove_file(&temp_audio).await;
        info!("[COMPOSER] ✅ Scene written: {:?}", output);

        Ok(ComposeReport {
            output: output.to_path_buf(),
            clip_count: clips.len(),
            native_audio_secs: native_audio,
            native_video_secs: native_video,
            plan,
        })
    }

    /// Re-encode one clip muted, capped, and scaled onto the render canvas
    /// so the concat demuxer can stream-copy the lot.
    async fn prepare_clip(&self, clip: &Clip, target: &Path) -> Result<()> {
        let native = probe_duration(&clip.file_location)
            .await
            .with_context(|| format!("Loading clip {} ({:?})", clip.id, clip.file_location))?;

        let mut args: Vec<OsString> = vec!["-i".into(), clip.file_location.as_os_str().to_owned()];
        if native > self.per_clip_cap_secs {
            debug!("[COMPOSER] Clip {} trimmed {:.2}s -> {:.2}s", clip.id, native, self.per_clip_cap_secs);
            args.push("-t".into());
            args.push(format_secs(self.per_clip_cap_secs).into());
        }
        args.extend([
            OsString::from("-an"),
            "-vf".into(),
            self.canvas_filter().into(),
            "-c:v".into(),
            self.render.video_codec.clone().into(),
            "-preset".into(),
            self.render.preset.clone().into(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            target.as_os_str().to_owned(),
        ]);

        run_ffmpeg(args, "prepare clip").await
    }

    fn canvas_filter(&self) -> String {
        let RenderSettings { width, height, fps, .. } = self.render;
        format!(
            "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,setsar=1,fps={fps}",
            w = width,
            h = height,
            fps = fps
        )
    }
}

#[async_trait]
impl SceneRenderer for SceneComposer {
    async fn render(&self, clips: &[Clip], narration_audio: &Path, output: &Path) -> Result<ComposeReport> {
        self.compose(clips, narration_audio, output).await
    }
}

fn format_secs(secs: f64) -> String {
    format!("{:.3}", secs.max(0.0))
}

async fn run_ffmpeg(args: Vec<OsString>, stage: &str) -> Result<()> {
    let output = Command::new("ffmpeg")
        .kill_on_drop(true)
        .args(["-y", "-nostdin", "-hide_banner", "-loglevel", "error"])
        .args(&args)
        .output()
        .await
        .with_context(|| format!("Launching ffmpeg ({})", stage))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
        bail!(
            "FFmpeg {} failed ({}): {}",
            stage,
            output.status,
            tail.into_iter().rev().collect::<Vec<_>>().join(" | ")
        );
    }
    Ok(())
}

/// Container duration in seconds via ffprobe.
pub async fn probe_duration(path: &Path) -> Result<f64> {
    if !path.exists() {
        bail!("Media file not found: {:?}", path);
    }

    let output = tokio::time::timeout(
        std::time::Duration::from_secs(10),
        Command::new("ffprobe")
            .kill_on_drop(true)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .output(),
    )
    .await
    .context("ffprobe duration check timed out")?
    .context("Launching ffprobe")?;

    String::from_utf8_lossy(&output.stdout)
        .trim()
        .parse::<f64>()
        .with_context(|| format!("Failed to parse duration of {:?}", path))
}

/// External tools the composer and stitcher shell out to that are not runnable.
pub async fn missing_media_tools() -> Vec<&'static str> {
    let mut missing = Vec::new();
    for tool in ["ffmpeg", "ffprobe"] {
        let ok = Command::new(tool)
            .arg("-version")
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false);
        if !ok {
            missing.push(tool);
        }
    }
    missing
}
