// src/artifact.rs
//! Normalized output records handed to the downstream pipeline.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Task,
    Url,
    IpAddress,
    Domain,
    Hash,
    YaraSignature,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Task => "task",
            ArtifactKind::Url => "url",
            ArtifactKind::IpAddress => "ip_address",
            ArtifactKind::Domain => "domain",
            ArtifactKind::Hash => "hash",
            ArtifactKind::YaraSignature => "yara_signature",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub kind: ArtifactKind,
    /// Title for tasks, the indicator itself for everything else.
    pub value: String,
    pub source_name: String,
    pub reference_link: String,
    pub reference_text: String,
}

impl Artifact {
    pub fn task(
        title: impl Into<String>,
        source_name: impl Into<String>,
        reference_link: impl Into<String>,
        reference_text: impl Into<String>,
    ) -> Self {
        Self {
            kind: ArtifactKind::Task,
            value: title.into(),
            source_name: source_name.into(),
            reference_link: reference_link.into(),
            reference_text: reference_text.into(),
        }
    }

    /// Short stable id: first 12 hex chars of sha256(kind:reference_link:value).
    /// Used as dedup key and as a log-safe identifier.
    pub fn fingerprint(&self) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(self.kind.as_str().as_bytes());
        hasher.update(b":");
        hasher.update(self.reference_link.as_bytes());
        hasher.update(b":");
        hasher.update(self.value.as_bytes());
        let digest = hasher.finalize();
        let mut out = String::with_capacity(12);
        for b in digest.iter().take(6) {
            use std::fmt::Write as _;
            let _ = write!(&mut out, "{:02x}", b);
        }
        out
    }
}
