//! Local path to remote key mapping.
//!
//! Keys are derived from the artifact category, the file name and the configured
//! prefix only. The resulting [`ArtifactPlan`] is the fixed, ordered list both
//! push and pull iterate over.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::{RemoteLocation, SyncConfig};
use crate::error::SyncError;

/// Logical kind of pipeline output. Each category owns a distinct remote subpath.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Dataset,
    Model,
    Metric,
    Figure,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Dataset,
        Category::Model,
        Category::Metric,
        Category::Figure,
    ];

    pub fn subpath(self) -> &'static str {
        match self {
            Category::Dataset => "data/",
            Category::Model => "models/",
            Category::Metric => "metrics/",
            Category::Figure => "figures/",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::Dataset => "dataset",
            Category::Model => "model",
            Category::Metric => "metric",
            Category::Figure => "figure",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    File,
    /// Mirrored subtree; the remote key is a prefix ending in `/`.
    Directory,
}

/// One tracked artifact or directory. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactDescriptor {
    category: Category,
    kind: ArtifactKind,
    local_path: PathBuf,
    remote_key: String,
}

impl ArtifactDescriptor {
    pub fn category(&self) -> Category {
        self.category
    }

    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    pub fn remote_key(&self) -> &str {
        &self.remote_key
    }
}

/// Deterministic key derivation rooted at a [`RemoteLocation`] prefix.
#[derive(Debug, Clone, Copy)]
pub struct PathResolver<'a> {
    remote: &'a RemoteLocation,
}

impl<'a> PathResolver<'a> {
    pub fn new(remote: &'a RemoteLocation) -> Self {
        Self { remote }
    }

    /// `prefix + category subpath + file name`.
    pub fn resolve(&self, category: Category, local_path: &Path) -> String {
        let filename = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("{}{}{}", self.remote.prefix(), category.subpath(), filename)
    }

    /// Key prefix a mirrored directory of this category lands under.
    pub fn resolve_dir(&self, category: Category) -> String {
        format!("{}{}", self.remote.prefix(), category.subpath())
    }

    pub fn manifest_key(&self, timestamp: &str) -> String {
        format!("{}manifests/manifest_{}.json", self.remote.prefix(), timestamp)
    }

    pub fn file(&self, category: Category, local_path: PathBuf) -> ArtifactDescriptor {
        let remote_key = self.resolve(category, &local_path);
        ArtifactDescriptor {
            category,
            kind: ArtifactKind::File,
            local_path,
            remote_key,
        }
    }

    pub fn directory(&self, category: Category, local_path: PathBuf) -> ArtifactDescriptor {
        ArtifactDescriptor {
            category,
            kind: ArtifactKind::Directory,
            local_path,
            remote_key: self.resolve_dir(category),
        }
    }
}

/// Ordered descriptors for one run: dataset, models, metrics, figures.
#[derive(Debug, Clone)]
pub struct ArtifactPlan {
    descriptors: Vec<ArtifactDescriptor>,
}

impl ArtifactPlan {
    /// Builds the plan from the configured layout, rejecting any two artifacts
    /// that would share a remote key.
    pub fn from_config(config: &SyncConfig) -> Result<Self, SyncError> {
        let resolver = PathResolver::new(&config.remote);
        let root = &config.workspace_root;
        let layout = &config.layout;

        let mut descriptors = vec![resolver.file(Category::Dataset, root.join(&layout.dataset))];
        descriptors.extend(
            layout
                .models
                .iter()
                .map(|m| resolver.file(Category::Model, root.join(m))),
        );
        descriptors.push(resolver.file(Category::Metric, root.join(&layout.metrics)));
        descriptors.push(resolver.directory(Category::Figure, root.join(&layout.figures_dir)));

        Self::from_descriptors(descriptors)
    }

    pub fn from_descriptors(descriptors: Vec<ArtifactDescriptor>) -> Result<Self, SyncError> {
        let mut claimed: HashMap<&str, &Path> = HashMap::new();
        for d in &descriptors {
            if let Some(first) = claimed.insert(d.remote_key(), d.local_path()) {
                return Err(SyncError::KeyCollision {
                    key: d.remote_key().to_string(),
                    first: first.display().to_string(),
                    second: d.local_path().display().to_string(),
                });
            }
            debug!(
                category = %d.category(),
                local_path = %d.local_path().display(),
                remote_key = d.remote_key(),
                "Resolved artifact"
            );
        }
        Ok(Self { descriptors })
    }

    pub fn descriptors(&self) -> &[ArtifactDescriptor] {
        &self.descriptors
    }

    /// Single-file descriptors, in plan order. These are what the manifest lists.
    pub fn files(&self) -> impl Iterator<Item = &ArtifactDescriptor> {
        self.descriptors
            .iter()
            .filter(|d| d.kind() == ArtifactKind::File)
    }
}
