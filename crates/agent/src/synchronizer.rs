//! Source Synchronizer.
//!
//! Brings one metadata source's clone up to date and, when upstream
//! changed, re-stages its derived artifacts into the source's processing
//! directory. Exactly one attempt per call; errors never escape, they
//! come back as [`SyncOutcome::Failed`].
//!
//! Staging builds the new contents in a sibling directory and swaps it in
//! with renames, so the processing directory holds either the previous
//! artifacts or the new ones, never a mix.
//!
//! Callers must not synchronize the same source concurrently.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use taskrunner_core::sources::{ArtifactMapping, SourceDescriptor};
use taskrunner_core::sync::SyncOutcome;

use crate::vcs::{VcsError, VersionControl};

/// Errors from a single synchronization attempt.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Failed to prepare {} for source {source_name}: {cause}", path.display())]
    Prepare {
        source_name: String,
        path: PathBuf,
        #[source]
        cause: std::io::Error,
    },

    #[error("Failed to sync source {source_name} from {url}: {cause}")]
    Clone {
        source_name: String,
        url: String,
        #[source]
        cause: VcsError,
    },

    #[error("Source {source_name} from {url}: artifact not found at {}", path.display())]
    ArtifactNotFound {
        source_name: String,
        url: String,
        path: PathBuf,
    },

    #[error("Failed to stage source {source_name} at {}: {cause}", path.display())]
    Staging {
        source_name: String,
        path: PathBuf,
        #[source]
        cause: std::io::Error,
    },
}

/// A located artifact and the file name it is staged under.
#[derive(Debug, Clone, PartialEq, Eq)]
struct StagedFile {
    from: PathBuf,
    name: String,
}

pub struct SourceSynchronizer {
    vcs: Arc<dyn VersionControl>,
}

impl SourceSynchronizer {
    pub fn new(vcs: Arc<dyn VersionControl>) -> Self {
        Self { vcs }
    }

    /// Synchronize one source. Never fails; see [`SyncOutcome`].
    pub async fn synchronize(&self, source: &SourceDescriptor) -> SyncOutcome {
        tracing::info!(source = %source.name, url = %source.upstream_url, "Synchronizing source");

        match self.try_synchronize(source).await {
            Ok(outcome) => {
                tracing::info!(source = %source.name, %outcome, "Source synchronization finished");
                outcome
            }
            Err(e) => {
                tracing::warn!(source = %source.name, error = %e, "Source synchronization failed");
                SyncOutcome::Failed(e.to_string())
            }
        }
    }

    async fn try_synchronize(&self, source: &SourceDescriptor) -> Result<SyncOutcome, SyncError> {
        tokio::fs::create_dir_all(&source.clone_dir)
            .await
            .map_err(|cause| SyncError::Prepare {
                source_name: source.name.clone(),
                path: source.clone_dir.clone(),
                cause,
            })?;

        // Set before the clone moves and cleared only once staging succeeds,
        // so an attempt that fails after upstream changed is restaged later.
        let marker = unstaged_marker(source);
        let was_unstaged = tokio::fs::try_exists(&marker).await.unwrap_or(false);
        if !was_unstaged {
            tokio::fs::write(&marker, source.upstream_url.as_bytes())
                .await
                .map_err(|cause| SyncError::Prepare {
                    source_name: source.name.clone(),
                    path: marker.clone(),
                    cause,
                })?;
        }

        let changed = self
            .vcs
            .clone_or_refresh(&source.upstream_url, &source.git_ref, &source.clone_dir)
            .await
            .map_err(|cause| SyncError::Clone {
                source_name: source.name.clone(),
                url: source.upstream_url.clone(),
                cause,
            })?;

        if !changed && !was_unstaged {
            clear_marker(&marker).await;
            return Ok(SyncOutcome::UpToDate);
        }
        if !changed {
            tracing::info!(
                source = %source.name,
                "Previous attempt did not stage artifacts, restaging",
            );
        }

        let files = locate_artifacts(source).await?;
        stage(source, &files).await?;
        clear_marker(&marker).await;

        tracing::info!(
            source = %source.name,
            files = files.len(),
            dir = %source.processing_dir.display(),
            "Staged source artifacts",
        );
        Ok(SyncOutcome::Refreshed)
    }
}

/// Marker beside the clone directory present while the clone may be ahead
/// of the staged artifacts.
fn unstaged_marker(source: &SourceDescriptor) -> PathBuf {
    let parent = source
        .clone_dir
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    parent.join(format!(".{}.unstaged", source.name))
}

async fn clear_marker(marker: &Path) {
    if let Err(e) = tokio::fs::remove_file(marker).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(
                marker = %marker.display(),
                error = %e,
                "Failed to clear unstaged marker",
            );
        }
    }
}

async fn locate_artifacts(source: &SourceDescriptor) -> Result<Vec<StagedFile>, SyncError> {
    let not_found = |path: PathBuf| SyncError::ArtifactNotFound {
        source_name: source.name.clone(),
        url: source.upstream_url.clone(),
        path,
    };

    match &source.artifact {
        ArtifactMapping::File { path, staged_name } => {
            let from = source.clone_dir.join(path);
            match tokio::fs::metadata(&from).await {
                Ok(meta) if meta.is_file() => Ok(vec![StagedFile {
                    from,
                    name: staged_name.clone(),
                }]),
                _ => Err(not_found(from)),
            }
        }
        ArtifactMapping::Directory { path, extension } => {
            let dir = source.clone_dir.join(path);
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(_) => return Err(not_found(dir)),
            };

            let mut files = Vec::new();
            loop {
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(cause) => {
                        return Err(SyncError::Prepare {
                            source_name: source.name.clone(),
                            path: dir.clone(),
                            cause,
                        })
                    }
                };

                let from = entry.path();
                let matches_ext = from
                    .extension()
                    .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case(extension));
                let is_file = entry.file_type().await.is_ok_and(|t| t.is_file());
                if !matches_ext || !is_file {
                    continue;
                }
                let name = entry.file_name().to_string_lossy().into_owned();
                files.push(StagedFile { from, name });
            }

            if files.is_empty() {
                return Err(not_found(dir));
            }
            files.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(files)
        }
    }
}

/// Replace the processing directory's contents with `files`.
async fn stage(source: &SourceDescriptor, files: &[StagedFile]) -> Result<(), SyncError> {
    let staging_error = |path: &Path, cause: std::io::Error| SyncError::Staging {
        source_name: source.name.clone(),
        path: path.to_path_buf(),
        cause,
    };

    let dest = &source.processing_dir;
    let parent = dest
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    tokio::fs::create_dir_all(&parent)
        .await
        .map_err(|e| staging_error(&parent, e))?;

    let token = uuid::Uuid::new_v4().simple().to_string();
    let staging = parent.join(format!(".{}.staging-{token}", source.name));
    let previous = parent.join(format!(".{}.previous-{token}", source.name));

    if let Err(e) = populate(&staging, files).await {
        discard(&staging).await;
        return Err(staging_error(&staging, e));
    }

    if let Err(e) = swap_into_place(&staging, dest, &previous).await {
        discard(&staging).await;
        return Err(staging_error(dest, e));
    }
    Ok(())
}

/// Rename `staging` onto `dest`. An existing `dest` is parked at
/// `previous` for the swap and renamed back if the swap fails.
async fn swap_into_place(staging: &Path, dest: &Path, previous: &Path) -> std::io::Result<()> {
    let had_previous = tokio::fs::try_exists(dest).await.unwrap_or(false);
    if had_previous {
        tokio::fs::rename(dest, previous).await?;
    }

    if let Err(e) = tokio::fs::rename(staging, dest).await {
        if had_previous {
            if let Err(restore) = tokio::fs::rename(previous, dest).await {
                tracing::error!(
                    error = %restore,
                    previous = %previous.display(),
                    "Failed to restore previous processing directory",
                );
            }
        }
        return Err(e);
    }

    if had_previous {
        discard(previous).await;
    }
    Ok(())
}

async fn populate(staging: &Path, files: &[StagedFile]) -> std::io::Result<()> {
    tokio::fs::create_dir_all(staging).await?;
    for file in files {
        tokio::fs::copy(&file.from, staging.join(&file.name)).await?;
    }
    Ok(())
}

/// Remove a scratch directory; failure is logged only.
async fn discard(dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(dir = %dir.display(), error = %e, "Failed to remove scratch directory");
        }
    }
}
