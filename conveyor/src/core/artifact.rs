//! Artifacts produced by pipeline stages.

use serde::{Deserialize, Serialize};

/// The body of an artifact: either inline content or a reference to
/// externally stored content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactContent {
    /// The full content, held inline.
    Inline(String),
    /// An opaque reference (e.g. a storage key) to the content.
    Reference(String),
}

/// An artifact produced by a stage.
///
/// Artifacts produced by a completed stage remain retrievable even if a
/// later stage fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    /// Logical path of the artifact within the produced set.
    pub path: String,

    /// The artifact body.
    pub content: ArtifactContent,

    /// Language or format hint (e.g. "rust", "markdown").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    /// Size of the content in bytes.
    pub size_bytes: u64,

    /// Name of the stage that produced this artifact.
    pub produced_by_stage: String,

    /// Whether the content is binary (inline content is then base-agnostic
    /// and treated as opaque).
    #[serde(default)]
    pub is_binary: bool,
}

impl Artifact {
    /// Creates a new artifact with inline text content.
    #[must_use]
    pub fn inline(
        path: impl Into<String>,
        content: impl Into<String>,
        produced_by_stage: impl Into<String>,
    ) -> Self {
        let content = content.into();
        Self {
            path: path.into(),
            size_bytes: content.len() as u64,
            content: ArtifactContent::Inline(content),
            language: None,
            produced_by_stage: produced_by_stage.into(),
            is_binary: false,
        }
    }

    /// Creates a new artifact referencing externally stored content.
    #[must_use]
    pub fn reference(
        path: impl Into<String>,
        reference: impl Into<String>,
        size_bytes: u64,
        produced_by_stage: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            content: ArtifactContent::Reference(reference.into()),
            language: None,
            size_bytes,
            produced_by_stage: produced_by_stage.into(),
            is_binary: false,
        }
    }

    /// Sets the language hint.
    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Marks the artifact as binary.
    #[must_use]
    pub fn binary(mut self) -> Self {
        self.is_binary = true;
        self
    }
}
