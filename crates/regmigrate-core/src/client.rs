//! Typed HTTP façade over one schema registry's REST surface.
//!
//! The [`SchemaRegistry`] trait is the seam everything above this module
//! talks through, so the differ, mode controller, and migration engine can be
//! tested against the in-memory registry without a server.

use crate::error::{RegistryError, Result};
use crate::types::*;
use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

/// Transport attempts for idempotent reads (initial try + retries).
const READ_ATTEMPTS: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_millis(500);

/// One registry instance's REST operations.
///
/// 404 on optional resources is folded into defaults here (empty version
/// list, READWRITE mode, inherited compatibility); every other non-2xx
/// surfaces as [`RegistryError::Http`] with the status code intact.
#[async_trait]
pub trait SchemaRegistry: Send + Sync {
    async fn list_subjects(&self) -> Result<Vec<String>>;

    /// Versions for a subject; a subject that does not exist yields an empty
    /// list rather than an error.
    async fn list_versions(&self, subject: &str) -> Result<Vec<i32>>;

    async fn get_schema(&self, subject: &str, version: i32) -> Result<SchemaVersion>;

    async fn get_latest_version(&self, subject: &str) -> Result<Option<i32>>;

    /// Subject write mode; READWRITE when no subject-level override exists.
    async fn get_subject_mode(&self, subject: &str) -> Result<RegistryMode>;

    async fn set_subject_mode(&self, subject: &str, mode: RegistryMode) -> Result<()>;

    async fn get_global_mode(&self) -> Result<RegistryMode>;

    async fn set_global_mode(&self, mode: RegistryMode) -> Result<()>;

    async fn get_global_compatibility(&self) -> Result<CompatibilityLevel>;

    async fn set_global_compatibility(&self, level: CompatibilityLevel) -> Result<()>;

    /// Subject compatibility; `Inherited` when no override exists, so callers
    /// know whether restoration means deletion or an explicit re-set.
    async fn get_subject_compatibility(&self, subject: &str) -> Result<SubjectCompatibility>;

    async fn set_subject_compatibility(
        &self,
        subject: &str,
        level: CompatibilityLevel,
    ) -> Result<()>;

    async fn delete_subject_compatibility(&self, subject: &str) -> Result<()>;

    /// Register a schema, optionally under an explicit id (IMPORT mode).
    ///
    /// A 422 on an id-carrying write is retried once without the id and the
    /// result reports `id_preserved: false`. A 409 propagates untouched; only
    /// the engine can tell an idempotent re-send from a real conflict.
    async fn register_schema(
        &self,
        subject: &str,
        schema: &str,
        schema_type: SchemaType,
        id: Option<i32>,
    ) -> Result<Registration>;

    /// Non-mutating probe: is this exact payload already registered?
    async fn check_schema_exists(
        &self,
        subject: &str,
        schema: &str,
        schema_type: SchemaType,
    ) -> Result<Option<SchemaVersion>>;

    /// Compatibility probe against a version (usually "latest"). A missing
    /// subject or version counts as compatible: there is nothing to conflict
    /// with.
    async fn check_compatibility(
        &self,
        subject: &str,
        schema: &str,
        schema_type: SchemaType,
        version: &str,
    ) -> Result<bool>;

    async fn delete_subject(&self, subject: &str, permanent: bool) -> Result<Vec<i32>>;

    async fn delete_version(&self, subject: &str, version: i32) -> Result<i32>;
}

/// REST client for a single registry instance.
#[derive(Debug)]
pub struct HttpRegistryClient {
    base_url: String,
    context: Option<String>,
    auth: Option<(String, String)>,
    import_enabled: bool,
    http: reqwest::Client,
}

impl HttpRegistryClient {
    /// Credentials must be given both-or-neither. `context` prefixes
    /// `/contexts/{name}` onto every path; `import_enabled` attaches the
    /// import-mode marker header to every write.
    pub fn new(
        base_url: impl Into<String>,
        username: Option<String>,
        password: Option<String>,
        context: Option<String>,
        import_enabled: bool,
    ) -> Result<Self> {
        let auth = match (username, password) {
            (Some(user), Some(pass)) => Some((user, pass)),
            (None, None) => None,
            _ => return Err(RegistryError::IncompleteCredentials),
        };
        let base_url = base_url.into().trim_end_matches('/').to_string();
        debug!(url = %base_url, import_enabled, "initialized registry client");
        Ok(Self {
            base_url,
            context,
            auth,
            import_enabled,
            http: reqwest::Client::new(),
        })
    }

    fn url(&self, path: &str) -> String {
        match &self.context {
            Some(ctx) => format!("{}/contexts/{}{}", self.base_url, ctx, path),
            None => format!("{}{}", self.base_url, path),
        }
    }

    async fn send_once(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        write: bool,
    ) -> std::result::Result<(u16, String), reqwest::Error> {
        let mut req = self.http.request(method, self.url(path));
        if let Some((user, pass)) = &self.auth {
            req = req.basic_auth(user, Some(pass));
        }
        if write && self.import_enabled {
            req = req.header("X-Registry-Import", "true");
        }
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().await?;
        let status = resp.status().as_u16();
        let text = resp.text().await.unwrap_or_default();
        Ok((status, text))
    }

    /// Reads retry transient failures (connection errors and 5xx) with
    /// exponential backoff. Writes are sent exactly once; anything beyond
    /// that belongs to the caller's recovery logic.
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
        write: bool,
    ) -> Result<(u16, String)> {
        let attempts = if write { 1 } else { READ_ATTEMPTS };
        let mut attempt = 0;
        loop {
            let err = match self.send_once(method.clone(), path, body.as_ref(), write).await {
                Ok((status, text)) if status >= 500 => {
                    warn!(path, status, attempt, "server error");
                    RegistryError::Http {
                        status,
                        path: path.to_string(),
                        body: text,
                    }
                }
                Ok(ok) => return Ok(ok),
                Err(source) => {
                    warn!(path, error = %source, attempt, "transport error");
                    RegistryError::Transport {
                        path: path.to_string(),
                        source,
                    }
                }
            };
            attempt += 1;
            if attempt >= attempts {
                return Err(err);
            }
            tokio::time::sleep(BACKOFF_BASE * 2u32.pow(attempt - 1)).await;
        }
    }

    fn parse<T: DeserializeOwned>(path: &str, body: &str) -> Result<T> {
        serde_json::from_str(body).map_err(|source| RegistryError::UnexpectedBody {
            path: path.to_string(),
            source,
        })
    }

    fn check_status(path: &str, status: u16, body: String) -> Result<String> {
        if (200..300).contains(&status) {
            Ok(body)
        } else {
            Err(RegistryError::Http {
                status,
                path: path.to_string(),
                body,
            })
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let (status, body) = self.send(Method::GET, path, None, false).await?;
        let body = Self::check_status(path, status, body)?;
        Self::parse(path, &body)
    }

    async fn post_json<B: serde::Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        write: bool,
    ) -> Result<T> {
        let value = serde_json::to_value(body).map_err(|source| RegistryError::UnexpectedBody {
            path: path.to_string(),
            source,
        })?;
        let (status, text) = self.send(Method::POST, path, Some(value), write).await?;
        let text = Self::check_status(path, status, text)?;
        Self::parse(path, &text)
    }

    async fn put_unit<B: serde::Serialize>(&self, path: &str, body: &B) -> Result<()> {
        let value = serde_json::to_value(body).map_err(|source| RegistryError::UnexpectedBody {
            path: path.to_string(),
            source,
        })?;
        let (status, text) = self.send(Method::PUT, path, Some(value), true).await?;
        Self::check_status(path, status, text)?;
        Ok(())
    }

    async fn delete_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let (status, text) = self.send(Method::DELETE, path, None, true).await?;
        let text = Self::check_status(path, status, text)?;
        Self::parse(path, &text)
    }

    async fn delete_unit(&self, path: &str) -> Result<()> {
        let (status, text) = self.send(Method::DELETE, path, None, true).await?;
        Self::check_status(path, status, text)?;
        Ok(())
    }
}

#[async_trait]
impl SchemaRegistry for HttpRegistryClient {
    async fn list_subjects(&self) -> Result<Vec<String>> {
        self.get_json("/subjects").await
    }

    async fn list_versions(&self, subject: &str) -> Result<Vec<i32>> {
        match self.get_json(&format!("/subjects/{subject}/versions")).await {
            Ok(versions) => Ok(versions),
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    async fn get_schema(&self, subject: &str, version: i32) -> Result<SchemaVersion> {
        let resp: SchemaResponse = self
            .get_json(&format!("/subjects/{subject}/versions/{version}"))
            .await?;
        Ok(resp.into_schema_version())
    }

    async fn get_latest_version(&self, subject: &str) -> Result<Option<i32>> {
        match self
            .get_json::<SchemaResponse>(&format!("/subjects/{subject}/versions/latest"))
            .await
        {
            Ok(resp) => Ok(Some(resp.version)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn get_subject_mode(&self, subject: &str) -> Result<RegistryMode> {
        match self.get_json::<ModeBody>(&format!("/mode/{subject}")).await {
            Ok(body) => Ok(body.mode),
            Err(e) if e.is_not_found() => Ok(RegistryMode::Readwrite),
            Err(e) => Err(e),
        }
    }

    async fn set_subject_mode(&self, subject: &str, mode: RegistryMode) -> Result<()> {
        self.put_unit(&format!("/mode/{subject}"), &ModeBody { mode })
            .await
    }

    async fn get_global_mode(&self) -> Result<RegistryMode> {
        match self.get_json::<ModeBody>("/mode").await {
            Ok(body) => Ok(body.mode),
            Err(e) if e.is_not_found() => Ok(RegistryMode::Readwrite),
            Err(e) => Err(e),
        }
    }

    async fn set_global_mode(&self, mode: RegistryMode) -> Result<()> {
        self.put_unit("/mode", &ModeBody { mode }).await
    }

    async fn get_global_compatibility(&self) -> Result<CompatibilityLevel> {
        let resp: CompatibilityResponse = self.get_json("/config").await?;
        Ok(resp.compatibility_level)
    }

    async fn set_global_compatibility(&self, level: CompatibilityLevel) -> Result<()> {
        self.put_unit("/config", &SetCompatibilityRequest { compatibility: level })
            .await
    }

    async fn get_subject_compatibility(&self, subject: &str) -> Result<SubjectCompatibility> {
        match self
            .get_json::<CompatibilityResponse>(&format!("/config/{subject}"))
            .await
        {
            Ok(resp) => Ok(SubjectCompatibility::Explicit(resp.compatibility_level)),
            Err(e) if e.is_not_found() => Ok(SubjectCompatibility::Inherited),
            Err(e) => Err(e),
        }
    }

    async fn set_subject_compatibility(
        &self,
        subject: &str,
        level: CompatibilityLevel,
    ) -> Result<()> {
        self.put_unit(
            &format!("/config/{subject}"),
            &SetCompatibilityRequest { compatibility: level },
        )
        .await
    }

    async fn delete_subject_compatibility(&self, subject: &str) -> Result<()> {
        self.delete_unit(&format!("/config/{subject}")).await
    }

    async fn register_schema(
        &self,
        subject: &str,
        schema: &str,
        schema_type: SchemaType,
        id: Option<i32>,
    ) -> Result<Registration> {
        let path = format!("/subjects/{subject}/versions");
        let request = RegisterSchemaRequest {
            schema: schema.to_string(),
            schema_type: Some(schema_type),
            id,
        };
        match self
            .post_json::<_, RegisterSchemaResponse>(&path, &request, true)
            .await
        {
            Ok(resp) => Ok(Registration {
                id: resp.id,
                id_preserved: id.is_some(),
            }),
            Err(e) if id.is_some() && e.is_unprocessable() => {
                // Server rejected the explicit id; retry once without it.
                debug!(subject, "explicit id rejected (422), retrying without id");
                let request = RegisterSchemaRequest {
                    schema: schema.to_string(),
                    schema_type: Some(schema_type),
                    id: None,
                };
                let resp: RegisterSchemaResponse = self.post_json(&path, &request, true).await?;
                Ok(Registration {
                    id: resp.id,
                    id_preserved: false,
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn check_schema_exists(
        &self,
        subject: &str,
        schema: &str,
        schema_type: SchemaType,
    ) -> Result<Option<SchemaVersion>> {
        let request = RegisterSchemaRequest {
            schema: schema.to_string(),
            schema_type: Some(schema_type),
            id: None,
        };
        match self
            .post_json::<_, SchemaResponse>(&format!("/subjects/{subject}"), &request, false)
            .await
        {
            Ok(resp) => Ok(Some(resp.into_schema_version())),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn check_compatibility(
        &self,
        subject: &str,
        schema: &str,
        schema_type: SchemaType,
        version: &str,
    ) -> Result<bool> {
        let request = RegisterSchemaRequest {
            schema: schema.to_string(),
            schema_type: Some(schema_type),
            id: None,
        };
        match self
            .post_json::<_, CompatibilityCheckResponse>(
                &format!("/compatibility/subjects/{subject}/versions/{version}"),
                &request,
                false,
            )
            .await
        {
            Ok(resp) => Ok(resp.is_compatible),
            Err(e) if e.is_not_found() => Ok(true),
            Err(e) => Err(e),
        }
    }

    async fn delete_subject(&self, subject: &str, permanent: bool) -> Result<Vec<i32>> {
        let path = if permanent {
            format!("/subjects/{subject}?permanent=true")
        } else {
            format!("/subjects/{subject}")
        };
        self.delete_json(&path).await
    }

    async fn delete_version(&self, subject: &str, version: i32) -> Result<i32> {
        self.delete_json(&format!("/subjects/{subject}/versions/{version}"))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_lone_username() {
        let err = HttpRegistryClient::new(
            "http://localhost:8081",
            Some("user".to_string()),
            None,
            None,
            false,
        )
        .unwrap_err();
        assert!(matches!(err, RegistryError::IncompleteCredentials));
    }

    #[test]
    fn test_rejects_lone_password() {
        let err = HttpRegistryClient::new(
            "http://localhost:8081",
            None,
            Some("secret".to_string()),
            None,
            false,
        )
        .unwrap_err();
        assert!(matches!(err, RegistryError::IncompleteCredentials));
    }

    #[test]
    fn test_url_without_context() {
        let client =
            HttpRegistryClient::new("http://localhost:8081/", None, None, None, false).unwrap();
        assert_eq!(client.url("/subjects"), "http://localhost:8081/subjects");
    }

    #[test]
    fn test_url_with_context() {
        let client = HttpRegistryClient::new(
            "http://localhost:8081",
            None,
            None,
            Some("staging".to_string()),
            false,
        )
        .unwrap();
        assert_eq!(
            client.url("/subjects"),
            "http://localhost:8081/contexts/staging/subjects"
        );
    }
}
