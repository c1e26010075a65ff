use std::path::Path;

/// Naming pattern for scratch files: `telemetry-msg-<uuid>.dat`.
///
/// Cleanup discovers artifacts by this pattern rather than by live
/// references, so files orphaned by a crash in an earlier run are removed
/// too.
pub const TEMP_PREFIX: &str = "telemetry-msg-";
pub const TEMP_SUFFIX: &str = ".dat";

/// Resolves when an interrupt arrives, or never when cleanup-on-exit is
/// disabled — in that case no handler is installed and the default signal
/// disposition applies, leaving scratch files for manual inspection.
pub async fn wait_for_interrupt(cleanup_enabled: bool) {
    if !cleanup_enabled {
        return std::future::pending().await;
    }
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for interrupt");
        return std::future::pending().await;
    }
    tracing::info!("interrupt received, cleaning up");
}

/// Remove every scratch file in `dir` matching the temp-artifact pattern.
///
/// Best effort: a file that cannot be removed is reported and skipped.
/// Returns the number of files removed.
pub fn remove_temp_artifacts(dir: &Path) -> usize {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::warn!(dir = %dir.display(), error = %err, "cannot scan temp directory");
            return 0;
        }
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !name.starts_with(TEMP_PREFIX) || !name.ends_with(TEMP_SUFFIX) {
            continue;
        }
        match std::fs::remove_file(entry.path()) {
            Ok(()) => removed += 1,
            Err(err) => {
                tracing::warn!(
                    path = %entry.path().display(),
                    error = %err,
                    "failed to remove tmp file"
                );
            }
        }
    }

    tracing::info!(removed, dir = %dir.display(), "scratch files removed");
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("lifecycle-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_removes_only_matching_files() {
        let dir = scratch_dir();
        std::fs::write(dir.join("telemetry-msg-1.dat"), b"a").unwrap();
        std::fs::write(dir.join("telemetry-msg-2.dat"), b"b").unwrap();
        std::fs::write(dir.join("keep.txt"), b"c").unwrap();
        std::fs::write(dir.join("telemetry-msg-3.log"), b"d").unwrap();

        assert_eq!(remove_temp_artifacts(&dir), 2);

        let mut remaining: Vec<_> = std::fs::read_dir(&dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        remaining.sort();
        assert_eq!(remaining, vec!["keep.txt", "telemetry-msg-3.log"]);
    }

    #[test]
    fn test_missing_directory_is_not_fatal() {
        let dir = scratch_dir().join("does-not-exist");
        assert_eq!(remove_temp_artifacts(&dir), 0);
    }

    #[tokio::test]
    async fn test_interrupt_wait_disabled_never_resolves() {
        let wait = wait_for_interrupt(false);
        assert!(
            tokio::time::timeout(std::time::Duration::from_millis(50), wait)
                .await
                .is_err()
        );
    }
}
