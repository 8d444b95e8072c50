#![cfg(unix)]
// Runs as its own test binary: it puts fake ffmpeg/ffprobe scripts first on PATH.

use async_trait::async_trait;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use synoid_scenes::agent::scene_composer::SceneComposer;
use synoid_scenes::agent::scene_run::{SceneGenerationRun, SegmentStatus};
use synoid_scenes::agent::semantic_matcher::ClipOracle;
use synoid_scenes::config::SceneConfig;
use synoid_scenes::error::SceneError;

/// Writes its last argument (the output file), then fails on the final mux.
const FAKE_FFMPEG: &str = r#"#!/bin/sh
for last; do :; done
: > "$last"
case "$*" in
  *faststart*) echo "mux exploded" >&2; exit 1 ;;
esac
exit 0
"#;

const FAKE_FFPROBE: &str = "#!/bin/sh\necho 4.0\n";

struct FirstClipOracle;

#[async_trait]
impl ClipOracle for FirstClipOracle {
    async fn complete(&self, _prompt: &str) -> Result<String, SceneError> {
        Ok("[\"c1\"]".to_string())
    }
}

fn install_script(dir: &Path, name: &str, body: &str) {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

#[tokio::test]
async fn test_failed_render_leaves_no_scene_file() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    let bin = root.join("bin");
    std::fs::create_dir_all(&bin).unwrap();
    install_script(&bin, "ffmpeg", FAKE_FFMPEG);
    install_script(&bin, "ffprobe", FAKE_FFPROBE);
    let path = std::env::var("PATH").unwrap_or_default();
    std::env::set_var("PATH", format!("{}:{}", bin.display(), path));

    std::fs::write(root.join("c1.mp4"), b"").unwrap();
    std::fs::write(root.join("n1.mp3"), b"").unwrap();
    std::fs::write(root.join("n1.txt"), "a quiet street").unwrap();
    std::fs::write(
        root.join("clips.csv"),
        format!(
            "id,length,filelocation,keywords\nc1,4.0,{},street\nc2,4.0,{},street\n",
            root.join("c1.mp4").display(),
            root.join("c1.mp4").display()
        ),
    )
    .unwrap();
    std::fs::write(
        root.join("narration.csv"),
        format!(
            "order,id,length,audio_file,transcript_file\n1,n1,2.0,{},{}\n",
            root.join("n1.mp3").display(),
            root.join("n1.txt").display()
        ),
    )
    .unwrap();

    let config = SceneConfig {
        clips_table: root.join("clips.csv"),
        narration_table: root.join("narration.csv"),
        used_clips_store: root.join("used_clips.csv"),
        scenes_dir: root.join("Scenes"),
        output_dir: root.join("Output"),
        api_key: None,
        ..SceneConfig::default()
    };
    let scene = root.join("Scenes/001_scene_n1.mp4");

    let run = SceneGenerationRun::new(
        config.clone(),
        Arc::new(FirstClipOracle),
        Arc::new(SceneComposer::from_config(&config)),
    );
    let summary = run.execute().await.unwrap();
    assert!(matches!(
        summary.outcomes[0].status,
        SegmentStatus::Failed { stage: "compose", .. }
    ));
    assert!(!scene.exists(), "partial scene left behind");

    // A resumed run must retry the segment, not count it as done.
    let resumed = SceneConfig {
        skip_existing: true,
        ..config.clone()
    };
    let run = SceneGenerationRun::new(
        resumed.clone(),
        Arc::new(FirstClipOracle),
        Arc::new(SceneComposer::from_config(&resumed)),
    );
    let summary = run.execute().await.unwrap();
    assert_ne!(summary.outcomes[0].status, SegmentStatus::Skipped);
    assert_eq!(summary.exit_code(), 2);
    assert!(!scene.exists());

    // Only the scene file would have been picked up; no workspace is left either.
    let leftovers: Vec<_> = std::fs::read_dir(root.join("Scenes")).unwrap().collect();
    assert!(leftovers.is_empty());
}
