//! Core data model: schema versions, registry snapshots, and the
//! mode/compatibility enums the registry REST surface speaks.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Schema format (Avro, Protobuf, JSON Schema)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum SchemaType {
    #[default]
    Avro,
    Protobuf,
    Json,
}

impl SchemaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaType::Avro => "AVRO",
            SchemaType::Protobuf => "PROTOBUF",
            SchemaType::Json => "JSON",
        }
    }
}

impl fmt::Display for SchemaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchemaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "AVRO" => Ok(SchemaType::Avro),
            "PROTOBUF" => Ok(SchemaType::Protobuf),
            "JSON" => Ok(SchemaType::Json),
            other => Err(format!("unknown schema type: {other}")),
        }
    }
}

/// Registry write mode, per subject or global.
///
/// IMPORT permits caller-assigned schema ids, normally only while the
/// subject has no versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegistryMode {
    Readwrite,
    Readonly,
    ReadwriteOverride,
    Import,
}

impl RegistryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistryMode::Readwrite => "READWRITE",
            RegistryMode::Readonly => "READONLY",
            RegistryMode::ReadwriteOverride => "READWRITE_OVERRIDE",
            RegistryMode::Import => "IMPORT",
        }
    }
}

impl fmt::Display for RegistryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegistryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "READWRITE" => Ok(RegistryMode::Readwrite),
            "READONLY" => Ok(RegistryMode::Readonly),
            "READWRITE_OVERRIDE" => Ok(RegistryMode::ReadwriteOverride),
            "IMPORT" => Ok(RegistryMode::Import),
            other => Err(format!("unknown registry mode: {other}")),
        }
    }
}

/// Compatibility level for schema evolution, enforced registry-side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompatibilityLevel {
    #[default]
    Backward,
    Forward,
    Full,
    BackwardTransitive,
    ForwardTransitive,
    FullTransitive,
    None,
}

impl CompatibilityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompatibilityLevel::Backward => "BACKWARD",
            CompatibilityLevel::Forward => "FORWARD",
            CompatibilityLevel::Full => "FULL",
            CompatibilityLevel::BackwardTransitive => "BACKWARD_TRANSITIVE",
            CompatibilityLevel::ForwardTransitive => "FORWARD_TRANSITIVE",
            CompatibilityLevel::FullTransitive => "FULL_TRANSITIVE",
            CompatibilityLevel::None => "NONE",
        }
    }
}

impl fmt::Display for CompatibilityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompatibilityLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BACKWARD" => Ok(CompatibilityLevel::Backward),
            "FORWARD" => Ok(CompatibilityLevel::Forward),
            "FULL" => Ok(CompatibilityLevel::Full),
            "BACKWARD_TRANSITIVE" => Ok(CompatibilityLevel::BackwardTransitive),
            "FORWARD_TRANSITIVE" => Ok(CompatibilityLevel::ForwardTransitive),
            "FULL_TRANSITIVE" => Ok(CompatibilityLevel::FullTransitive),
            "NONE" => Ok(CompatibilityLevel::None),
            other => Err(format!("unknown compatibility level: {other}")),
        }
    }
}

/// A subject's compatibility configuration as the registry reports it.
///
/// `Inherited` is the 404 case: no subject-level override exists and the
/// global level applies. Restoration after a temporary override must delete
/// the override in this case rather than writing any explicit level back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectCompatibility {
    Explicit(CompatibilityLevel),
    Inherited,
}

/// One registered schema version.
///
/// Identity is `(subject, version)`. The `id` is assigned by the owning
/// registry (or by the caller under IMPORT mode) and is not comparable across
/// independent registry instances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaVersion {
    pub subject: String,
    pub version: i32,
    pub id: i32,
    pub schema_type: SchemaType,
    pub schema: String,
}

/// Point-in-time view of an entire registry: subject name to its versions in
/// ascending version order (gaps allowed after deletions).
///
/// Iteration order is deterministic so runs are reproducible. A snapshot goes
/// stale as soon as the registry is mutated; consumers re-read rather than
/// trusting a cached view after cleanup or registration batches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistrySnapshot {
    subjects: BTreeMap<String, Vec<SchemaVersion>>,
}

impl RegistrySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a version, keeping the subject's list ordered by version.
    pub fn insert(&mut self, schema: SchemaVersion) {
        let list = self.subjects.entry(schema.subject.clone()).or_default();
        let pos = list.partition_point(|v| v.version < schema.version);
        list.insert(pos, schema);
    }

    pub fn subjects(&self) -> impl Iterator<Item = (&String, &[SchemaVersion])> {
        self.subjects.iter().map(|(s, v)| (s, v.as_slice()))
    }

    pub fn subject_names(&self) -> impl Iterator<Item = &str> {
        self.subjects.keys().map(String::as_str)
    }

    pub fn get(&self, subject: &str) -> Option<&[SchemaVersion]> {
        self.subjects.get(subject).map(Vec::as_slice)
    }

    pub fn contains_subject(&self, subject: &str) -> bool {
        self.subjects.contains_key(subject)
    }

    /// True when the subject holds a byte-identical payload at any version.
    pub fn contains_payload(&self, subject: &str, schema: &str) -> bool {
        self.subjects
            .get(subject)
            .map(|list| list.iter().any(|v| v.schema == schema))
            .unwrap_or(false)
    }

    pub fn find_version(&self, subject: &str, version: i32) -> Option<&SchemaVersion> {
        self.subjects
            .get(subject)?
            .iter()
            .find(|v| v.version == version)
    }

    pub fn subject_count(&self) -> usize {
        self.subjects.len()
    }

    pub fn version_count(&self) -> usize {
        self.subjects.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }
}

// Wire types for the registry REST surface. Field spellings
// (`schemaType`, `compatibilityLevel`) must match the server exactly.

#[derive(Debug, Clone, Serialize)]
pub struct RegisterSchemaRequest {
    pub schema: String,
    #[serde(rename = "schemaType", skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<SchemaType>,
    /// Explicit id, accepted by the registry only under IMPORT mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterSchemaResponse {
    pub id: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchemaResponse {
    pub subject: String,
    pub version: i32,
    pub id: i32,
    pub schema: String,
    // Registries omit the type for AVRO schemas.
    #[serde(rename = "schemaType", default)]
    pub schema_type: Option<SchemaType>,
}

impl SchemaResponse {
    pub fn into_schema_version(self) -> SchemaVersion {
        SchemaVersion {
            subject: self.subject,
            version: self.version,
            id: self.id,
            schema_type: self.schema_type.unwrap_or_default(),
            schema: self.schema,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeBody {
    pub mode: RegistryMode,
}

#[derive(Debug, Clone, Serialize)]
pub struct SetCompatibilityRequest {
    pub compatibility: CompatibilityLevel,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompatibilityResponse {
    #[serde(rename = "compatibilityLevel")]
    pub compatibility_level: CompatibilityLevel,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompatibilityCheckResponse {
    pub is_compatible: bool,
}

/// Result of a registration call.
///
/// `id_preserved` is false when an explicit id was requested but the registry
/// rejected it and the write was retried without one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    pub id: i32,
    pub id_preserved: bool,
}
