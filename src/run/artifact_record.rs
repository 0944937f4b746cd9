//! Artifact Record - files and model versions produced by a run

use serde::{Deserialize, Serialize};

use crate::context::Context;

/// Extensions recognized as serialized model files.
const MODEL_EXTENSIONS: [&str; 4] = ["pt", "pth", "ckpt", "safetensors"];

/// Artifact Record represents one output of a run: a file path plus optional
/// step and timestamps, with a flag marking serialized model snapshots.
///
/// Records are never mutated after creation; a new version of a model is a new
/// record with the same name at a different step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    name: String,
    context: Context,
    path: String,
    step: Option<u32>,
    created_at_ms: Option<i64>,
    modified_at_ms: Option<i64>,
    is_model_version: bool,
}

impl ArtifactRecord {
    /// Create a new artifact record.
    ///
    /// # Arguments
    ///
    /// * `name` - Artifact name/key (e.g., "model_v3", "confusion_matrix")
    /// * `context` - Phase of the run that produced it
    /// * `path` - Location of the artifact under the run's artifact directory
    #[must_use]
    pub fn new(name: impl Into<String>, context: Context, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            context,
            path: path.into(),
            step: None,
            created_at_ms: None,
            modified_at_ms: None,
            is_model_version: false,
        }
    }

    /// Create a builder for an artifact record with optional fields.
    #[must_use]
    pub fn builder(
        name: impl Into<String>,
        context: Context,
        path: impl Into<String>,
    ) -> ArtifactRecordBuilder {
        ArtifactRecordBuilder {
            record: Self::new(name, context, path),
        }
    }

    /// Get the artifact name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the context the artifact was logged under.
    #[must_use]
    pub const fn context(&self) -> Context {
        self.context
    }

    /// Get the artifact path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Get the step the artifact was produced at, if recorded.
    #[must_use]
    pub const fn step(&self) -> Option<u32> {
        self.step
    }

    /// Get the creation timestamp in milliseconds, if recorded.
    #[must_use]
    pub const fn created_at_ms(&self) -> Option<i64> {
        self.created_at_ms
    }

    /// Get the last-modified timestamp in milliseconds, if recorded.
    #[must_use]
    pub const fn modified_at_ms(&self) -> Option<i64> {
        self.modified_at_ms
    }

    /// Whether the artifact is a model-version snapshot.
    #[must_use]
    pub const fn is_model_version(&self) -> bool {
        self.is_model_version
    }

    /// Whether the artifact path looks like a serialized model file.
    ///
    /// Only size and path are known for a generic artifact; connectors to the
    /// artifact store are needed for richer metadata, so recognition is by
    /// file extension.
    #[must_use]
    pub fn is_serialized_model(&self) -> bool {
        self.path
            .rsplit('.')
            .next()
            .is_some_and(|ext| MODEL_EXTENSIONS.contains(&ext))
    }
}

/// Builder for [`ArtifactRecord`].
#[derive(Debug)]
pub struct ArtifactRecordBuilder {
    record: ArtifactRecord,
}

impl ArtifactRecordBuilder {
    /// Set the step the artifact was produced at.
    #[must_use]
    pub const fn step(mut self, step: u32) -> Self {
        self.record.step = Some(step);
        self
    }

    /// Set creation and last-modified timestamps (milliseconds).
    #[must_use]
    pub const fn timestamps(mut self, created_ms: i64, modified_ms: i64) -> Self {
        self.record.created_at_ms = Some(created_ms);
        self.record.modified_at_ms = Some(modified_ms);
        self
    }

    /// Mark the artifact as a model-version snapshot.
    #[must_use]
    pub const fn model_version(mut self) -> Self {
        self.record.is_model_version = true;
        self
    }

    /// Build the [`ArtifactRecord`].
    #[must_use]
    pub fn build(self) -> ArtifactRecord {
        self.record
    }
}
