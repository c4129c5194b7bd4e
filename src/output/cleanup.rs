//! Temp artifact removal

use std::io::ErrorKind;

use tracing::{debug, warn};

use crate::domain::model::{ArtifactKind, TempArtifact};

/// What a cleanup pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed: usize,
    pub missing: usize,
    pub failed: usize,
}

/// Delete artifacts: files first, then directories
///
/// Missing paths count as already clean. Other failures are logged and
/// never abort the pass.
pub async fn remove_artifacts(artifacts: Vec<TempArtifact>) -> CleanupReport {
    let mut report = CleanupReport::default();
    let (files, dirs): (Vec<_>, Vec<_>) = artifacts
        .into_iter()
        .partition(|a| a.kind == ArtifactKind::File);

    for artifact in files.iter().chain(dirs.iter()) {
        let result = match artifact.kind {
            ArtifactKind::File => tokio::fs::remove_file(&artifact.path).await,
            ArtifactKind::Directory => tokio::fs::remove_dir_all(&artifact.path).await,
        };
        match result {
            Ok(()) => {
                report.removed += 1;
                debug!(path = %artifact.path.display(), "Temp artifact removed");
            }
            Err(e) if e.kind() == ErrorKind::NotFound => report.missing += 1,
            Err(e) => {
                report.failed += 1;
                warn!(path = %artifact.path.display(), error = %e, "Failed to remove temp artifact");
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_removes_files_then_directory() {
        let root = tempfile::tempdir().unwrap();
        let work = root.path().join("atacut_job");
        std::fs::create_dir_all(&work).unwrap();
        let segment = work.join("clip_a.mp4");
        std::fs::write(&segment, b"data").unwrap();

        let report = remove_artifacts(vec![
            TempArtifact::directory(&work),
            TempArtifact::file(&segment),
        ])
        .await;

        assert_eq!(report.removed, 2);
        assert_eq!(report.failed, 0);
        assert!(!work.exists());
    }

    #[tokio::test]
    async fn test_missing_artifacts_are_not_errors() {
        let root = tempfile::tempdir().unwrap();
        let report = remove_artifacts(vec![
            TempArtifact::file(root.path().join("gone.mp4")),
            TempArtifact::directory(root.path().join("gone_dir")),
        ])
        .await;
        assert_eq!(report, CleanupReport { removed: 0, missing: 2, failed: 0 });
    }
}
