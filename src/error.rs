use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Container, archive, manifest or packaged blob is missing.
    #[error("{what} {id} not found")]
    NotFound { what: &'static str, id: String },

    /// Export target already on disk. Nothing is overwritten.
    #[error("{} already exists, not continuing", .0.display())]
    AlreadyExists(PathBuf),

    /// An object store or catalog call failed. Never retried here.
    #[error("{service} request failed: {message}")]
    Upstream {
        service: &'static str,
        message: String,
    },

    #[error("{what} {id} is malformed: {message}")]
    InvalidDocument {
        what: &'static str,
        id: String,
        message: String,
    },

    #[error("unsupported blob url {0}")]
    InvalidUrl(String),

    #[error("settings: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    pub fn not_found(what: &'static str, id: impl Into<String>) -> Error {
        Error::NotFound {
            what,
            id: id.into(),
        }
    }

    pub fn upstream(service: &'static str, message: impl ToString) -> Error {
        Error::Upstream {
            service,
            message: message.to_string(),
        }
    }

    /// Failures the CLI reports with exit code 1 rather than as faults.
    pub fn is_handled(&self) -> bool {
        matches!(self, Error::NotFound { .. } | Error::AlreadyExists(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handled_errors() {
        assert!(Error::not_found("container", "c1").is_handled());
        assert!(Error::AlreadyExists(PathBuf::from("/tmp/x.sdspkg")).is_handled());
        assert!(!Error::upstream("elasticsearch", "boom").is_handled());
        assert!(!Error::InvalidUrl("ftp://x".into()).is_handled());
    }

    #[test]
    fn messages_name_the_entity() {
        let e = Error::not_found("SDS package", "container-foo:v1");
        assert_eq!(e.to_string(), "SDS package container-foo:v1 not found");
    }
}
