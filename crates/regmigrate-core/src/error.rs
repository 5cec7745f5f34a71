//! Error types for registry access and migration.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RegistryError>;

#[derive(Error, Debug)]
pub enum RegistryError {
    /// Credentials must come as a pair; rejected at client construction.
    #[error("both username and password must be provided, or neither")]
    IncompleteCredentials,

    /// Non-2xx response outside the documented 404 defaults. The status code
    /// is preserved verbatim: the migration engine pattern-matches on
    /// 404/409/422 to pick its recovery path.
    #[error("HTTP {status} from {path}: {body}")]
    Http {
        status: u16,
        path: String,
        body: String,
    },

    /// Connection-level failure after the transport retry budget is spent.
    #[error("request to {path} failed: {source}")]
    Transport {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected response body from {path}: {source}")]
    UnexpectedBody {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl RegistryError {
    pub fn status(&self) -> Option<u16> {
        match self {
            RegistryError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    pub fn is_conflict(&self) -> bool {
        self.status() == Some(409)
    }

    pub fn is_unprocessable(&self) -> bool {
        self.status() == Some(422)
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, RegistryError::Transport { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http(status: u16) -> RegistryError {
        RegistryError::Http {
            status,
            path: "/subjects".to_string(),
            body: String::new(),
        }
    }

    #[test]
    fn test_status_helpers() {
        assert!(http(404).is_not_found());
        assert!(http(409).is_conflict());
        assert!(http(422).is_unprocessable());
        assert!(!http(409).is_not_found());
        assert!(!RegistryError::IncompleteCredentials.is_conflict());
    }

    #[test]
    fn test_http_display_keeps_status_and_body() {
        let err = RegistryError::Http {
            status: 409,
            path: "/subjects/orders/versions".to_string(),
            body: "incompatible".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("409"));
        assert!(msg.contains("incompatible"));
    }
}
