// SYNOID Scenes - Table Loading
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Turns the clip and narration CSV tables into typed records at the
// boundary. Nothing downstream ever sees a raw row.

use crate::agent::clip_catalog::Clip;
use crate::error::SceneError;
use anyhow::Context;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// One narration unit: its audio, its transcript, and how long it runs.
#[derive(Debug, Clone, PartialEq)]
pub struct NarrationSegment {
    pub id: String,
    pub order: u32,
    pub target_duration_secs: f64,
    pub audio_file: PathBuf,
    pub transcript_file: PathBuf,
    /// Free-text keywords attached upstream, if the table carries them.
    pub keywords: Option<String>,
}

impl NarrationSegment {
    /// `001`, `012`, ... used as the scene file prefix.
    pub fn order_label(&self) -> String {
        format!("{:03}", self.order)
    }

    /// `{order}_scene_{id}.mp4`
    pub fn scene_file_name(&self) -> String {
        format!("{}_scene_{}.mp4", self.order_label(), self.id)
    }

    pub fn scene_path(&self, scenes_dir: &Path) -> PathBuf {
        scenes_dir.join(self.scene_file_name())
    }

    pub async fn read_transcript(&self) -> anyhow::Result<String> {
        tokio::fs::read_to_string(&self.transcript_file)
            .await
            .with_context(|| format!("Reading transcript {:?}", self.transcript_file))
    }
}

#[derive(Debug, Deserialize)]
struct ClipRow {
    id: String,
    #[serde(default)]
    length: String,
    #[serde(default)]
    filelocation: String,
    #[serde(default)]
    keywords: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NarrationRow {
    #[serde(default)]
    order: Option<String>,
    id: String,
    #[serde(default)]
    length: String,
    #[serde(default)]
    audio_file: String,
    #[serde(default)]
    transcript_file: String,
    #[serde(default)]
    keywords: Option<String>,
}

/// Load the clip table. Rows with an unusable duration are skipped;
/// an unreadable or empty table is fatal.
pub fn load_clips(path: &Path) -> Result<Vec<Clip>, SceneError> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| SceneError::Config(format!("cannot open clip table {:?}: {}", path, e)))?;

    let mut clips = Vec::new();
    let mut seen = HashSet::new();

    for (idx, row) in reader.deserialize::<ClipRow>().enumerate() {
        let row = row.map_err(|e| {
            SceneError::Config(format!("clip table {:?} row {}: {}", path, idx + 1, e))
        })?;

        let id = row.id.trim().to_string();
        if id.is_empty() {
            warn!("[TABLES] Clip row {} has no id, skipping", idx + 1);
            continue;
        }

        let duration = match row.length.trim().parse::<f64>() {
            Ok(d) if d > 0.0 && d.is_finite() => d,
            _ => {
                warn!(
                    "[TABLES] Clip {} has unusable length {:?}, skipping",
                    id, row.length
                );
                continue;
            }
        };

        if !seen.insert(id.clone()) {
            warn!("[TABLES] Duplicate clip id {}, keeping the first row", id);
            continue;
        }

        clips.push(Clip::new(
            id,
            duration,
            row.keywords.unwrap_or_default(),
            PathBuf::from(row.filelocation.trim()),
        ));
    }

    if clips.is_empty() {
        return Err(SceneError::Config(format!(
            "clip table {:?} contains no usable clips",
            path
        )));
    }

    info!("[TABLES] Loaded {} clips from {:?}", clips.len(), path);
    Ok(clips)
}

/// Load the narration table in its given row order.
pub fn load_narration(path: &Path) -> Result<Vec<NarrationSegment>, SceneError> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| {
        SceneError::Config(format!("cannot open narration table {:?}: {}", path, e))
    })?;

    let mut segments = Vec::new();

    for (idx, row) in reader.deserialize::<NarrationRow>().enumerate() {
        let row = row.map_err(|e| {
            SceneError::Config(format!("narration table {:?} row {}: {}", path, idx + 1, e))
        })?;

        let id = row.id.trim().to_string();
        if id.is_empty() {
            return Err(SceneError::Config(format!(
                "narration table {:?} row {} has no id",
                path,
                idx + 1
            )));
        }
        // The id becomes part of the scene file name.
        if id.contains(['/', '\\', '\0']) {
            return Err(SceneError::Config(format!(
                "narration id {:?} contains a path separator",
                id
            )));
        }

        let target = row
            .length
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|d| *d >= 0.0 && d.is_finite())
            .ok_or_else(|| {
                SceneError::Config(format!(
                    "narration {} has invalid length {:?}",
                    id, row.length
                ))
            })?;

        let audio_file = PathBuf::from(row.audio_file.trim());
        let order = row
            .order
            .as_deref()
            .and_then(|o| o.trim().parse::<u32>().ok())
            .or_else(|| order_from_file_name(&audio_file))
            .unwrap_or(idx as u32 + 1);

        segments.push(NarrationSegment {
            id,
            order,
            target_duration_secs: target,
            audio_file,
            transcript_file: PathBuf::from(row.transcript_file.trim()),
            keywords: row.keywords.filter(|k| !k.trim().is_empty()),
        });
    }

    if segments.is_empty() {
        return Err(SceneError::Config(format!(
            "narration table {:?} has no segments",
            path
        )));
    }

    info!("[TABLES] Loaded {} narration segments from {:?}", segments.len(), path);
    Ok(segments)
}

/// Leading digits of a file name, e.g. `001_abc.mp3` -> 1.
pub fn order_from_file_name(path: &Path) -> Option<u32> {
    let name = path.file_name()?.to_str()?;
    let digits: String = name.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_load_clips_skips_bad_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "clips.csv",
            "id,date,location,length,filelocation,keywords\n\
             a1,2024-01-01,Paris,4.0,Clips/a1.mp4,\"tank, desert\"\n\
             a2,2024-01-01,Paris,,Clips/a2.mp4,ocean\n\
             a3,2024-01-01,Paris,2.5,Clips/a3.mp4,\n\
             a1,2024-01-01,Paris,9.0,Clips/dup.mp4,dup\n",
        );

        let clips = load_clips(&path).unwrap();
        assert_eq!(clips.len(), 2);
        assert_eq!(clips[0].id, "a1");
        assert_eq!(clips[0].tokens, vec!["tank", "desert"]);
        assert_eq!(clips[0].file_location, PathBuf::from("Clips/a1.mp4"));
        assert!(clips[1].tokens.is_empty());
    }

    #[test]
    fn test_empty_clip_table_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "clips.csv", "id,length,filelocation,keywords\n");
        let err = load_clips(&path).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_missing_table_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_clips(&dir.path().join("missing.csv")).unwrap_err().is_fatal());
        assert!(load_narration(&dir.path().join("missing.csv")).unwrap_err().is_fatal());
    }

    #[test]
    fn test_load_narration_order_fallbacks() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "transcripts.csv",
            "order,id,date,location,length,audio_file,transcript_file\n\
             7,first,20240101,Paris,10.0,Audio/x.mp3,Transcript/first.txt\n\
             ,second,20240101,Paris,3.5,Audio/004_second.mp3,Transcript/second.txt\n\
             ,third,20240101,Paris,2,Audio/third.mp3,Transcript/third.txt\n",
        );

        let segments = load_narration(&path).unwrap();
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].order, 7);
        assert_eq!(segments[1].order, 4);
        assert_eq!(segments[2].order, 3);
        assert_eq!(segments[0].scene_file_name(), "007_scene_first.mp4");
        assert_eq!(segments[1].target_duration_secs, 3.5);
    }

    #[test]
    fn test_narration_bad_length_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "transcripts.csv",
            "order,id,length,audio_file,transcript_file\n1,abc,,a.mp3,a.txt\n",
        );
        assert!(load_narration(&path).unwrap_err().is_fatal());
    }

    #[test]
    fn test_narration_id_cannot_escape_scenes_dir() {
        let dir = tempfile::tempdir().unwrap();
        for id in ["../outside", "nested/abc", "win\\abc"] {
            let path = write(
                dir.path(),
                "transcripts.csv",
                &format!("order,id,length,audio_file,transcript_file\n1,{},2.0,a.mp3,a.txt\n", id),
            );
            let err = load_narration(&path).unwrap_err();
            assert!(matches!(err, SceneError::Config(_)), "{} was accepted", id);
        }
    }

    #[test]
    fn test_order_from_file_name() {
        assert_eq!(order_from_file_name(Path::new("Audio/012_abc.mp3")), Some(12));
        assert_eq!(order_from_file_name(Path::new("Audio/abc.mp3")), None);
    }
}
