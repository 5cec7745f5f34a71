//! In-process registry implementation.
//!
//! Backs the test suite and local fixtures with the same write-protection
//! state machine a real registry enforces: READONLY blocks registration,
//! explicit ids require IMPORT mode, IMPORT requires an empty subject, and
//! the effective compatibility level gates new versions.

use crate::client::SchemaRegistry;
use crate::error::{RegistryError, Result};
use crate::types::*;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI32, Ordering};
use tokio::sync::RwLock;

type CompatRule = dyn Fn(&str, &str) -> bool + Send + Sync;

pub struct MemoryRegistry {
    next_id: AtomicI32,
    inner: RwLock<Inner>,
    /// (latest payload, candidate payload) -> compatible?
    compat_rule: Box<CompatRule>,
}

struct Inner {
    versions: BTreeMap<String, Vec<SchemaVersion>>,
    subject_modes: HashMap<String, RegistryMode>,
    global_mode: RegistryMode,
    subject_compat: HashMap<String, CompatibilityLevel>,
    global_compat: CompatibilityLevel,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            versions: BTreeMap::new(),
            subject_modes: HashMap::new(),
            global_mode: RegistryMode::Readwrite,
            subject_compat: HashMap::new(),
            global_compat: CompatibilityLevel::Backward,
        }
    }
}

impl Inner {
    fn effective_mode(&self, subject: &str) -> RegistryMode {
        self.subject_modes
            .get(subject)
            .copied()
            .unwrap_or(self.global_mode)
    }

    fn effective_compatibility(&self, subject: &str) -> CompatibilityLevel {
        self.subject_compat
            .get(subject)
            .copied()
            .unwrap_or(self.global_compat)
    }

    fn find_payload(&self, subject: &str, schema: &str) -> Option<&SchemaVersion> {
        self.versions
            .get(subject)
            .and_then(|list| list.iter().find(|v| v.schema == schema))
    }

    fn id_in_use(&self, id: i32) -> Option<&SchemaVersion> {
        self.versions.values().flatten().find(|v| v.id == id)
    }
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::with_compatibility_rule(|_, _| true)
    }

    /// The rule decides whether `candidate` is compatible with the subject's
    /// latest payload; it is consulted only when the effective level is not
    /// NONE and the subject is not in IMPORT mode.
    pub fn with_compatibility_rule<F>(rule: F) -> Self
    where
        F: Fn(&str, &str) -> bool + Send + Sync + 'static,
    {
        Self {
            next_id: AtomicI32::new(1),
            inner: RwLock::new(Inner::default()),
            compat_rule: Box::new(rule),
        }
    }

    /// Fixture helper: insert a version verbatim, bypassing mode and
    /// compatibility enforcement. Generated ids stay above anything seeded.
    pub async fn seed(&self, schema: SchemaVersion) {
        let mut inner = self.inner.write().await;
        self.next_id.fetch_max(schema.id + 1, Ordering::SeqCst);
        let list = inner.versions.entry(schema.subject.clone()).or_default();
        let pos = list.partition_point(|v| v.version < schema.version);
        list.insert(pos, schema);
    }
}

#[async_trait]
impl SchemaRegistry for MemoryRegistry {
    async fn list_subjects(&self) -> Result<Vec<String>> {
        let inner = self.inner.read().await;
        Ok(inner
            .versions
            .iter()
            .filter(|(_, list)| !list.is_empty())
            .map(|(subject, _)| subject.clone())
            .collect())
    }

    async fn list_versions(&self, subject: &str) -> Result<Vec<i32>> {
        let inner = self.inner.read().await;
        Ok(inner
            .versions
            .get(subject)
            .map(|list| list.iter().map(|v| v.version).collect())
            .unwrap_or_default())
    }

    async fn get_schema(&self, subject: &str, version: i32) -> Result<SchemaVersion> {
        let inner = self.inner.read().await;
        inner
            .versions
            .get(subject)
            .and_then(|list| list.iter().find(|v| v.version == version))
            .cloned()
            .ok_or_else(|| RegistryError::Http {
                status: 404,
                path: format!("/subjects/{subject}/versions/{version}"),
                body: "version not found".to_string(),
            })
    }

    async fn get_latest_version(&self, subject: &str) -> Result<Option<i32>> {
        let inner = self.inner.read().await;
        Ok(inner
            .versions
            .get(subject)
            .and_then(|list| list.last())
            .map(|v| v.version))
    }

    async fn get_subject_mode(&self, subject: &str) -> Result<RegistryMode> {
        let inner = self.inner.read().await;
        Ok(inner.effective_mode(subject))
    }

    async fn set_subject_mode(&self, subject: &str, mode: RegistryMode) -> Result<()> {
        let mut inner = self.inner.write().await;
        if mode == RegistryMode::Import
            && inner.versions.get(subject).map_or(false, |l| !l.is_empty())
        {
            return Err(RegistryError::Http {
                status: 422,
                path: format!("/mode/{subject}"),
                body: "IMPORT mode requires an empty subject".to_string(),
            });
        }
        inner.subject_modes.insert(subject.to_string(), mode);
        Ok(())
    }

    async fn get_global_mode(&self) -> Result<RegistryMode> {
        let inner = self.inner.read().await;
        Ok(inner.global_mode)
    }

    async fn set_global_mode(&self, mode: RegistryMode) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.global_mode = mode;
        Ok(())
    }

    async fn get_global_compatibility(&self) -> Result<CompatibilityLevel> {
        let inner = self.inner.read().await;
        Ok(inner.global_compat)
    }

    async fn set_global_compatibility(&self, level: CompatibilityLevel) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.global_compat = level;
        Ok(())
    }

    async fn get_subject_compatibility(&self, subject: &str) -> Result<SubjectCompatibility> {
        let inner = self.inner.read().await;
        Ok(inner
            .subject_compat
            .get(subject)
            .map(|level| SubjectCompatibility::Explicit(*level))
            .unwrap_or(SubjectCompatibility::Inherited))
    }

    async fn set_subject_compatibility(
        &self,
        subject: &str,
        level: CompatibilityLevel,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.subject_compat.insert(subject.to_string(), level);
        Ok(())
    }

    async fn delete_subject_compatibility(&self, subject: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.subject_compat.remove(subject);
        Ok(())
    }

    async fn register_schema(
        &self,
        subject: &str,
        schema: &str,
        schema_type: SchemaType,
        id: Option<i32>,
    ) -> Result<Registration> {
        let path = format!("/subjects/{subject}/versions");
        let mut inner = self.inner.write().await;

        // Identical payload re-sends are idempotent.
        if let Some(existing) = inner.find_payload(subject, schema) {
            return Ok(Registration {
                id: existing.id,
                id_preserved: id == Some(existing.id),
            });
        }

        let mode = inner.effective_mode(subject);
        if mode == RegistryMode::Readonly {
            return Err(RegistryError::Http {
                status: 409,
                path,
                body: format!("subject {subject} is read-only"),
            });
        }
        if id.is_some() && mode != RegistryMode::Import {
            return Err(RegistryError::Http {
                status: 422,
                path,
                body: "explicit schema ids require IMPORT mode".to_string(),
            });
        }
        if mode != RegistryMode::Import {
            let level = inner.effective_compatibility(subject);
            if level != CompatibilityLevel::None {
                if let Some(latest) = inner.versions.get(subject).and_then(|l| l.last()) {
                    if !(self.compat_rule)(&latest.schema, schema) {
                        return Err(RegistryError::Http {
                            status: 409,
                            path,
                            body: format!(
                                "schema is incompatible with version {} under {}",
                                latest.version, level
                            ),
                        });
                    }
                }
            }
        }

        let new_id = match id {
            Some(wanted) => {
                if let Some(existing) = inner.id_in_use(wanted) {
                    if existing.schema != schema {
                        return Err(RegistryError::Http {
                            status: 422,
                            path,
                            body: format!("id {wanted} is bound to a different schema"),
                        });
                    }
                }
                self.next_id.fetch_max(wanted + 1, Ordering::SeqCst);
                wanted
            }
            None => self.next_id.fetch_add(1, Ordering::SeqCst),
        };
        let version = inner
            .versions
            .get(subject)
            .and_then(|list| list.last())
            .map(|v| v.version + 1)
            .unwrap_or(1);
        inner
            .versions
            .entry(subject.to_string())
            .or_default()
            .push(SchemaVersion {
                subject: subject.to_string(),
                version,
                id: new_id,
                schema_type,
                schema: schema.to_string(),
            });
        Ok(Registration {
            id: new_id,
            id_preserved: id.is_some(),
        })
    }

    async fn check_schema_exists(
        &self,
        subject: &str,
        schema: &str,
        _schema_type: SchemaType,
    ) -> Result<Option<SchemaVersion>> {
        let inner = self.inner.read().await;
        Ok(inner.find_payload(subject, schema).cloned())
    }

    async fn check_compatibility(
        &self,
        subject: &str,
        schema: &str,
        _schema_type: SchemaType,
        version: &str,
    ) -> Result<bool> {
        let inner = self.inner.read().await;
        let list = match inner.versions.get(subject) {
            Some(list) if !list.is_empty() => list,
            _ => return Ok(true),
        };
        let target = if version == "latest" {
            list.last()
        } else {
            version
                .parse::<i32>()
                .ok()
                .and_then(|n| list.iter().find(|v| v.version == n))
        };
        let target = match target {
            Some(target) => target,
            None => return Ok(true),
        };
        if inner.effective_compatibility(subject) == CompatibilityLevel::None {
            return Ok(true);
        }
        Ok((self.compat_rule)(&target.schema, schema))
    }

    async fn delete_subject(&self, subject: &str, permanent: bool) -> Result<Vec<i32>> {
        let mut inner = self.inner.write().await;
        let removed = inner.versions.remove(subject).unwrap_or_default();
        if permanent {
            inner.subject_modes.remove(subject);
            inner.subject_compat.remove(subject);
        }
        Ok(removed.iter().map(|v| v.version).collect())
    }

    async fn delete_version(&self, subject: &str, version: i32) -> Result<i32> {
        let mut inner = self.inner.write().await;
        let list = inner.versions.get_mut(subject);
        let removed = list.and_then(|list| {
            list.iter()
                .position(|v| v.version == version)
                .map(|pos| list.remove(pos))
        });
        match removed {
            Some(v) => Ok(v.version),
            None => Err(RegistryError::Http {
                status: 404,
                path: format!("/subjects/{subject}/versions/{version}"),
                body: "version not found".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(subject: &str, version: i32, id: i32, payload: &str) -> SchemaVersion {
        SchemaVersion {
            subject: subject.to_string(),
            version,
            id,
            schema_type: SchemaType::Avro,
            schema: payload.to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_assigns_ids_and_versions() {
        let registry = MemoryRegistry::new();
        let first = registry
            .register_schema("orders", "s1", SchemaType::Avro, None)
            .await
            .unwrap();
        let second = registry
            .register_schema("orders", "s2", SchemaType::Avro, None)
            .await
            .unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(registry.list_versions("orders").await.unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_identical_payload_is_idempotent() {
        let registry = MemoryRegistry::new();
        let first = registry
            .register_schema("orders", "s1", SchemaType::Avro, None)
            .await
            .unwrap();
        let again = registry
            .register_schema("orders", "s1", SchemaType::Avro, None)
            .await
            .unwrap();
        assert_eq!(first.id, again.id);
        assert_eq!(registry.list_versions("orders").await.unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_readonly_blocks_registration() {
        let registry = MemoryRegistry::new();
        registry
            .set_subject_mode("locked", RegistryMode::Readonly)
            .await
            .unwrap();
        let err = registry
            .register_schema("locked", "s1", SchemaType::Avro, None)
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_explicit_id_requires_import_mode() {
        let registry = MemoryRegistry::new();
        let err = registry
            .register_schema("orders", "s1", SchemaType::Avro, Some(5))
            .await
            .unwrap_err();
        assert!(err.is_unprocessable());

        registry
            .set_subject_mode("orders", RegistryMode::Import)
            .await
            .unwrap();
        let reg = registry
            .register_schema("orders", "s1", SchemaType::Avro, Some(5))
            .await
            .unwrap();
        assert_eq!(reg.id, 5);
        assert!(reg.id_preserved);
    }

    #[tokio::test]
    async fn test_import_mode_requires_empty_subject() {
        let registry = MemoryRegistry::new();
        registry
            .register_schema("orders", "s1", SchemaType::Avro, None)
            .await
            .unwrap();
        let err = registry
            .set_subject_mode("orders", RegistryMode::Import)
            .await
            .unwrap_err();
        assert!(err.is_unprocessable());
    }

    #[tokio::test]
    async fn test_compatibility_rule_gates_registration() {
        let registry = MemoryRegistry::with_compatibility_rule(|_, candidate| {
            !candidate.contains("breaking")
        });
        registry
            .register_schema("orders", "s1", SchemaType::Avro, None)
            .await
            .unwrap();
        let err = registry
            .register_schema("orders", "breaking-change", SchemaType::Avro, None)
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        // NONE bypasses the rule.
        registry
            .set_subject_compatibility("orders", CompatibilityLevel::None)
            .await
            .unwrap();
        registry
            .register_schema("orders", "breaking-change", SchemaType::Avro, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_subject_compatibility_inherited_until_set() {
        let registry = MemoryRegistry::new();
        assert_eq!(
            registry.get_subject_compatibility("orders").await.unwrap(),
            SubjectCompatibility::Inherited
        );
        registry
            .set_subject_compatibility("orders", CompatibilityLevel::Full)
            .await
            .unwrap();
        assert_eq!(
            registry.get_subject_compatibility("orders").await.unwrap(),
            SubjectCompatibility::Explicit(CompatibilityLevel::Full)
        );
        registry.delete_subject_compatibility("orders").await.unwrap();
        assert_eq!(
            registry.get_subject_compatibility("orders").await.unwrap(),
            SubjectCompatibility::Inherited
        );
    }

    #[tokio::test]
    async fn test_seed_bypasses_enforcement() {
        let registry = MemoryRegistry::new();
        registry
            .set_subject_mode("locked", RegistryMode::Readonly)
            .await
            .unwrap();
        registry.seed(schema("locked", 1, 9, "s1")).await;
        assert_eq!(registry.list_versions("locked").await.unwrap(), vec![1]);
        // Generated ids stay above seeded ones.
        let reg = registry
            .register_schema("other", "s2", SchemaType::Avro, None)
            .await
            .unwrap();
        assert!(reg.id > 9);
    }

    #[tokio::test]
    async fn test_delete_subject_returns_versions() {
        let registry = MemoryRegistry::new();
        registry.seed(schema("orders", 1, 1, "s1")).await;
        registry.seed(schema("orders", 2, 2, "s2")).await;
        let deleted = registry.delete_subject("orders", false).await.unwrap();
        assert_eq!(deleted, vec![1, 2]);
        assert!(registry.list_subjects().await.unwrap().is_empty());
    }
}
