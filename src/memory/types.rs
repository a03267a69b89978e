//! Core memory type definitions.
//!
//! Defines [`MemoryKind`] (the closed set of experience categories plus a
//! custom fallback), [`RelationKind`] (typed graph edges, same open-ended
//! shape), [`Memory`] (a full record), [`MemoryLink`], and [`Pattern`].

use serde::{Deserialize, Serialize};

/// Category of a stored experience.
///
/// The well-known kinds get their own variants so traversal and consolidation
/// code can match exhaustively; anything else round-trips through `Custom`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MemoryKind {
    /// General insights and learnings.
    Insight,
    /// Solutions that worked.
    Success,
    /// Failures and their causes.
    Failure,
    /// Technical decisions and their reasoning.
    Decision,
    /// General notes.
    Note,
    /// Caller-defined kind outside the well-known set.
    Custom(String),
}

impl MemoryKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Insight => "insight",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Decision => "decision",
            Self::Note => "note",
            Self::Custom(s) => s,
        }
    }

    /// Parse a kind string. Unknown non-empty values become [`MemoryKind::Custom`];
    /// empty or whitespace-only input is rejected.
    pub fn parse(s: &str) -> Result<Self, String> {
        let s = s.trim();
        match s {
            "" => Err("memory kind must not be empty".into()),
            "insight" => Ok(Self::Insight),
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            "decision" => Ok(Self::Decision),
            "note" => Ok(Self::Note),
            other => Ok(Self::Custom(other.to_string())),
        }
    }
}

impl std::fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MemoryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Kind of a directed relation between two memories.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RelationKind {
    /// Generally related memories.
    Related,
    /// The source updates/replaces the target.
    Supersedes,
    /// The source contradicts the target.
    Contradicts,
    /// The source extends/elaborates the target.
    Extends,
    /// The source depends on the target.
    DependsOn,
    /// The source evolved from an older version or design.
    EvolvedFrom,
    /// The source was rejected in favor of the target.
    RejectedBecause,
    /// The source (e.g. a bug) was caused by the target (e.g. a change).
    CausedBy,
    /// Caller-defined kind outside the well-known set.
    Custom(String),
}

impl RelationKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Related => "related",
            Self::Supersedes => "supersedes",
            Self::Contradicts => "contradicts",
            Self::Extends => "extends",
            Self::DependsOn => "depends_on",
            Self::EvolvedFrom => "evolved_from",
            Self::RejectedBecause => "rejected_because",
            Self::CausedBy => "caused_by",
            Self::Custom(s) => s,
        }
    }

    /// Parse a kind string. Unknown non-empty values become `Custom`; values
    /// containing whitespace or empty input are rejected as malformed.
    pub fn parse(s: &str) -> Result<Self, String> {
        let s = s.trim();
        if s.is_empty() {
            return Err("relation kind must not be empty".into());
        }
        if s.chars().any(char::is_whitespace) {
            return Err(format!("relation kind must not contain whitespace: {s:?}"));
        }
        Ok(match s {
            "related" => Self::Related,
            "supersedes" => Self::Supersedes,
            "contradicts" => Self::Contradicts,
            "extends" => Self::Extends,
            "depends_on" => Self::DependsOn,
            "evolved_from" => Self::EvolvedFrom,
            "rejected_because" => Self::RejectedBecause,
            "caused_by" => Self::CausedBy,
            other => Self::Custom(other.to_string()),
        })
    }

    /// Kinds followed by default when tracing decision lineage.
    pub fn lineage_defaults() -> Vec<RelationKind> {
        vec![
            Self::EvolvedFrom,
            Self::CausedBy,
            Self::RejectedBecause,
            Self::Supersedes,
        ]
    }
}

impl std::fmt::Display for RelationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RelationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for MemoryKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MemoryKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

impl Serialize for RelationKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RelationKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// A memory record, matching the `memories` table schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    /// UUID v7 (time-sortable) primary key.
    pub id: String,
    pub kind: MemoryKind,
    /// Full text content (Markdown allowed).
    pub content: String,
    /// Derived short summary, bounded length.
    pub summary: String,
    /// Owning context/project name, if any.
    pub context: Option<String>,
    /// Tags attached to this memory, normalized lowercase.
    pub tags: Vec<String>,
    /// Emotional weight of the underlying experience, in `[0.0, 1.0]`.
    pub frustration: f64,
    /// Recorded time spent on the underlying problem, in hours.
    pub time_cost_hours: Option<f64>,
    /// Number of times this memory has been returned by recall.
    pub access_count: u64,
    /// ISO 8601 timestamp of the last recall (set to creation time on insert).
    pub last_accessed: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A directed relation edge between two memories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryLink {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    pub kind: RelationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub created_at: String,
}

/// An abstracted cluster summary, created only by the dream worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    pub id: String,
    pub content: String,
    pub summary: String,
    /// Confidence in `[0.0, 1.0]`, only ever raised as instances accumulate.
    pub confidence: f64,
    pub instance_count: u64,
    pub created_at: String,
    pub updated_at: String,
}
