//! Full registry walk: subjects, their versions, and every schema payload.

use crate::client::SchemaRegistry;
use crate::error::Result;
use crate::types::RegistrySnapshot;
use tracing::{debug, info};

/// Read every subject and every version into a [`RegistrySnapshot`].
///
/// The walk is sequential and read-only. Individual version fetches are not
/// softened: a subject listed a moment ago whose version then 404s means the
/// registry is being mutated under us, and the run should stop rather than
/// produce a partial snapshot.
pub async fn read_all(registry: &dyn SchemaRegistry, label: &str) -> Result<RegistrySnapshot> {
    let subjects = registry.list_subjects().await?;
    info!(registry = label, subjects = subjects.len(), "reading registry");

    let mut snapshot = RegistrySnapshot::new();
    for subject in &subjects {
        let versions = registry.list_versions(subject).await?;
        debug!(registry = label, subject = %subject, versions = versions.len(), "reading subject");
        for version in versions {
            let schema = registry.get_schema(subject, version).await?;
            snapshot.insert(schema);
        }
    }
    info!(
        registry = label,
        subjects = snapshot.subject_count(),
        versions = snapshot.version_count(),
        "snapshot complete"
    );
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryRegistry;
    use crate::types::{SchemaType, SchemaVersion};

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
    async fn test_read_all_empty_registry() {
        let registry = MemoryRegistry::new();
        let snap = read_all(&registry, "source").await.unwrap();
        assert!(snap.is_empty());
    }

    #[tokio::test]
    async fn test_read_all_collects_every_version() {
        let registry = MemoryRegistry::new();
        registry.seed(schema("orders", 1, 1, "s1")).await;
        registry.seed(schema("orders", 2, 2, "s2")).await;
        registry.seed(schema("events", 1, 3, "e1")).await;

        let snap = read_all(&registry, "source").await.unwrap();
        assert_eq!(snap.subject_count(), 2);
        assert_eq!(snap.version_count(), 3);
        assert_eq!(snap.find_version("orders", 2).unwrap().schema, "s2");
        assert_eq!(snap.find_version("events", 1).unwrap().id, 3);
    }

    #[tokio::test]
    async fn test_read_all_preserves_version_gaps() {
        let registry = MemoryRegistry::new();
        registry.seed(schema("orders", 1, 1, "s1")).await;
        registry.seed(schema("orders", 3, 3, "s3")).await;

        let snap = read_all(&registry, "source").await.unwrap();
        let versions: Vec<i32> = snap.get("orders").unwrap().iter().map(|v| v.version).collect();
        assert_eq!(versions, vec![1, 3]);
    }
}
