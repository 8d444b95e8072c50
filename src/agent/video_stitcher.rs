// SYNOID Video Stitcher - Scene Concatenation
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Joins rendered scenes into the final video with FFmpeg's concat demuxer.
// Scenes share one encoding policy, so `-c copy` is enough: no quality loss
// and near-zero CPU cost.

use crate::agent::tables::order_from_file_name;
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{error, info};

pub const DEFAULT_COMBINED_NAME: &str = "combined_output.mp4";

pub struct VideoStitcher;

impl VideoStitcher {
    /// Build the contents of an FFmpeg concat manifest.
    ///
    /// Each line is `file '<path>'`, with single quotes escaped the way the
    /// concat demuxer expects.
    pub fn create_concat_manifest(segments: &[PathBuf]) -> String {
        segments
            .iter()
            .map(|p| {
                let path = p.to_string_lossy().replace('\'', "'\\''");
                format!("file '{}'", path)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// `*.mp4` files in `scenes_dir`, sorted by their leading order number.
    /// Files without one go last, by name.
    pub async fn collect_scenes(scenes_dir: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(scenes_dir)
            .await
            .with_context(|| format!("Scenes folder not found at {:?}", scenes_dir))?;

        let mut scenes = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_mp4 = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("mp4"))
                .unwrap_or(false);
            if is_mp4 && path.is_file() {
                scenes.push(path);
            }
        }

        scenes.sort_by(|a, b| {
            let key = |p: &PathBuf| (order_from_file_name(p).unwrap_or(u32::MAX), p.file_name().map(|n| n.to_os_string()));
            key(a).cmp(&key(b))
        });
        Ok(scenes)
    }

    /// Output file name for the combined video, `.mp4` appended if missing.
    pub fn output_name(name: Option<&str>) -> String {
        match name.map(str::trim).filter(|n| !n.is_empty()) {
            None => DEFAULT_COMBINED_NAME.to_string(),
            Some(n) if n.to_lowercase().ends_with(".mp4") => n.to_string(),
            Some(n) => format!("{}.mp4", n),
        }
    }

    /// Write the manifest next to the output and join the segments.
    pub async fn finalize(segments: &[PathBuf], output_path: &Path) -> Result<PathBuf> {
        if segments.is_empty() {
            bail!("No segments to stitch.");
        }

        if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Creating output folder {:?}", parent))?;
        }

        // Manifest entries resolve relative to the manifest, not the cwd.
        let absolute: Vec<PathBuf> = segments
            .iter()
            .map(|p| std::fs::canonicalize(p).unwrap_or_else(|_| p.clone()))
            .collect();
        let manifest_path = output_path.with_extension("concat_manifest.txt");
        let manifest_content = Self::create_concat_manifest(&absolute);
        tokio::fs::write(&manifest_path, &manifest_content)
            .await
            .context("Writing concat manifest")?;

        info!(
            "[STITCHER] Manifest written ({} segments): {:?}",
            segments.len(),
            manifest_path
        );

        let status = Command::new("ffmpeg")
            .args(["-y", "-nostdin", "-f", "concat", "-safe", "0", "-i"])
            .arg(&manifest_path)
            .args(["-c", "copy"])
            .arg(output_path)
            .status()
            .await
            .context("Launching ffmpeg concat")?;

        let _ = tokio::fs::remove_file(&manifest_path).await;

        if status.success() {
            info!("[STITCHER] ✅ Final output: {:?}", output_path);
            Ok(output_path.to_path_buf())
        } else {
            error!("[STITCHER] ❌ FFmpeg concat failed.");
            bail!("FFmpeg concat demuxer failed.")
        }
    }

    /// Combine every scene in `scenes_dir` into `output_dir/<name>`.
    pub async fn combine(scenes_dir: &Path, output_dir: &Path, name: Option<&str>) -> Result<PathBuf> {
        let scenes = Self::collect_scenes(scenes_dir).await?;
        if scenes.is_empty() {
            bail!("No MP4 files found in {:?}", scenes_dir);
        }
        let output = output_dir.join(Self::output_name(name));
        info!("[STITCHER] Combining {} scenes into {:?}", scenes.len(), output);
        Self::finalize(&scenes, &output).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concat_manifest_generation() {
        let segments = vec![
            PathBuf::from("/tmp/001_scene_a.mp4"),
            PathBuf::from("/tmp/002_scene_b.mp4"),
            PathBuf::from("/tmp/it's.mp4"),
        ];
        let manifest = VideoStitcher::create_concat_manifest(&segments);
        let lines: Vec<&str> = manifest.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "file '/tmp/001_scene_a.mp4'");
        assert_eq!(lines[2], "file '/tmp/it'\\''s.mp4'");
    }

    #[test]
    fn test_empty_segments() {
        let manifest = VideoStitcher::create_concat_manifest(&[]);
        assert!(manifest.is_empty());
    }

    #[test]
    fn test_output_name() {
        assert_eq!(VideoStitcher::output_name(None), "combined_output.mp4");
        assert_eq!(VideoStitcher::output_name(Some("final")), "final.mp4");
        assert_eq!(VideoStitcher::output_name(Some("Final.MP4")), "Final.MP4");
    }

    #[tokio::test]
    async fn test_collect_scenes_sorted_by_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["010_scene_c.mp4", "002_scene_b.mp4", "extra.mp4", "001_scene_a.mp4", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }

        let scenes = VideoStitcher::collect_scenes(dir.path()).await.unwrap();
        let names: Vec<String> = scenes
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["001_scene_a.mp4", "002_scene_b.mp4", "010_scene_c.mp4", "extra.mp4"]);
    }

    #[tokio::test]
    async fn test_finalize_rejects_empty() {
        assert!(VideoStitcher::finalize(&[], Path::new("out.mp4")).await.is_err());
    }
}
