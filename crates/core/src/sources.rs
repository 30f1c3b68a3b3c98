//! Metadata source descriptors and the built-in source catalog.
//!
//! A [`SourceDescriptor`] names an upstream git repository, the ref to
//! track, where the clone lives locally, and which files inside the clone
//! are staged into the source's processing directory.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::CoreError;

/// Maximum length of a source name.
const MAX_NAME_LEN: usize = 64;

/// How a source's derived artifact is located and staged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArtifactMapping {
    /// A single file inside the clone, renamed on staging.
    File {
        path: PathBuf,
        staged_name: String,
    },
    /// Every regular file with `extension` directly inside `path`,
    /// staged under its own file name.
    Directory { path: PathBuf, extension: String },
}

/// Static description of one metadata source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceDescriptor {
    pub name: String,
    pub upstream_url: String,
    pub git_ref: String,
    pub clone_dir: PathBuf,
    pub processing_dir: PathBuf,
    pub artifact: ArtifactMapping,
}

impl SourceDescriptor {
    /// Build a descriptor whose clone and processing directories are
    /// `<clone_root>/<name>` and `<processing_root>/<name>`.
    pub fn new(
        name: &str,
        upstream_url: &str,
        git_ref: &str,
        artifact: ArtifactMapping,
        clone_root: &Path,
        processing_root: &Path,
    ) -> Result<Self, CoreError> {
        validate_source_name(name)?;
        Ok(Self {
            name: name.to_string(),
            upstream_url: upstream_url.to_string(),
            git_ref: git_ref.to_string(),
            clone_dir: clone_root.join(name),
            processing_dir: processing_root.join(name),
            artifact,
        })
    }
}

/// Source names double as directory names.
///
/// Rules:
/// - Must not be empty or exceed `MAX_NAME_LEN` characters.
/// - Only ASCII alphanumeric, hyphen, or underscore characters.
pub fn validate_source_name(name: &str) -> Result<(), CoreError> {
    if name.is_empty() {
        return Err(CoreError::Validation(
            "Source name must not be empty".to_string(),
        ));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(CoreError::Validation(format!(
            "Source name must not exceed {MAX_NAME_LEN} characters"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(CoreError::Validation(format!(
            "Source name '{name}' may only contain alphanumeric, hyphen, or underscore characters"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Built-in catalog
// ---------------------------------------------------------------------------

pub const SOURCE_WHDLOAD: &str = "WHDLoad";
pub const SOURCE_FBNEO: &str = "FBNEO";

struct BuiltinSource {
    name: &'static str,
    upstream_url: &'static str,
    git_ref: &'static str,
    artifact: fn() -> ArtifactMapping,
}

const BUILTIN_SOURCES: &[BuiltinSource] = &[
    BuiltinSource {
        name: SOURCE_WHDLOAD,
        upstream_url: "https://github.com/BlitterStudio/amiberry.git",
        git_ref: "master",
        artifact: whdload_artifact,
    },
    BuiltinSource {
        name: SOURCE_FBNEO,
        upstream_url: "https://github.com/libretro/FBNeo.git",
        git_ref: "master",
        artifact: fbneo_artifact,
    },
];

fn whdload_artifact() -> ArtifactMapping {
    ArtifactMapping::File {
        path: PathBuf::from("whdboot/game-data/whdload_db.xml"),
        staged_name: "whdload_db.dat".to_string(),
    }
}

fn fbneo_artifact() -> ArtifactMapping {
    ArtifactMapping::Directory {
        path: PathBuf::from("dats"),
        extension: "dat".to_string(),
    }
}

/// Names of every built-in source, in catalog order.
pub fn builtin_source_names() -> Vec<&'static str> {
    BUILTIN_SOURCES.iter().map(|s| s.name).collect()
}

/// Resolve a built-in source by name (case-insensitive).
pub fn builtin_source(
    name: &str,
    clone_root: &Path,
    processing_root: &Path,
) -> Result<SourceDescriptor, CoreError> {
    let builtin = BUILTIN_SOURCES
        .iter()
        .find(|s| s.name.eq_ignore_ascii_case(name.trim()))
        .ok_or_else(|| CoreError::UnknownSource(name.to_string()))?;

    SourceDescriptor::new(
        builtin.name,
        builtin.upstream_url,
        builtin.git_ref,
        (builtin.artifact)(),
        clone_root,
        processing_root,
    )
}

/// Resolve a list of names, or the whole catalog when `names` is empty.
///
/// Duplicates (after case folding) are dropped, keeping first occurrence.
pub fn select_builtin_sources(
    names: &[String],
    clone_root: &Path,
    processing_root: &Path,
) -> Result<Vec<SourceDescriptor>, CoreError> {
    if names.is_empty() {
        return BUILTIN_SOURCES
            .iter()
            .map(|s| builtin_source(s.name, clone_root, processing_root))
            .collect();
    }

    let mut selected: Vec<SourceDescriptor> = Vec::with_capacity(names.len());
    for name in names {
        let descriptor = builtin_source(name, clone_root, processing_root)?;
        if !selected.iter().any(|d| d.name == descriptor.name) {
            selected.push(descriptor);
        }
    }
    Ok(selected)
}
