use std::fmt;

use anyhow::anyhow;

pub type Result<T> = std::result::Result<T, LibError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Database,
    Forbidden,
    InvalidInput,
    NotAuthenticated,
    OwnerNotFound,
    NotFound,
    QuotaExceeded,
    InvalidSlug,
    EmptyCollection,
    Unknown,
}

/// Error returned by every list operation.
///
/// `code` is stable and machine readable, `public` is safe to show to the caller and
/// `source` carries internal detail meant for logs only.
#[derive(Debug)]
pub struct LibError {
    pub kind: ErrorKind,
    pub code: &'static str,
    pub public: &'static str,
    pub source: anyhow::Error,
}

impl LibError {
    pub fn database(public: &'static str, source: anyhow::Error) -> Self {
        Self {
            kind: ErrorKind::Database,
            code: "database_error",
            public,
            source,
        }
    }

    pub fn invalid_with_code(
        code: &'static str,
        public: &'static str,
        source: anyhow::Error,
    ) -> Self {
        Self {
            kind: ErrorKind::InvalidInput,
            code,
            public,
            source,
        }
    }

    pub fn not_authenticated(source: anyhow::Error) -> Self {
        Self {
            kind: ErrorKind::NotAuthenticated,
            code: "not_authenticated",
            public: "You must be signed in to do this",
            source,
        }
    }

    pub fn owner_not_found(source: anyhow::Error) -> Self {
        Self {
            kind: ErrorKind::OwnerNotFound,
            code: "owner_not_found",
            public: "No profile is provisioned for this account",
            source,
        }
    }

    pub fn forbidden(public: &'static str, source: anyhow::Error) -> Self {
        Self {
            kind: ErrorKind::Forbidden,
            code: "forbidden",
            public,
            source,
        }
    }

    pub fn not_found(public: &'static str, source: anyhow::Error) -> Self {
        Self {
            kind: ErrorKind::NotFound,
            code: "not_found",
            public,
            source,
        }
    }

    pub fn quota_exceeded(public: &'static str, source: anyhow::Error) -> Self {
        Self {
            kind: ErrorKind::QuotaExceeded,
            code: "quota_exceeded",
            public,
            source,
        }
    }

    pub fn invalid_slug(source: anyhow::Error) -> Self {
        Self {
            kind: ErrorKind::InvalidSlug,
            code: "invalid_slug",
            public: "Invalid slug",
            source,
        }
    }

    pub fn empty_collection(source: anyhow::Error) -> Self {
        Self {
            kind: ErrorKind::EmptyCollection,
            code: "empty_collection",
            public: "Video list is empty",
            source,
        }
    }

    pub fn unknown(public: &'static str, source: anyhow::Error) -> Self {
        Self {
            kind: ErrorKind::Unknown,
            code: "unknown_error",
            public,
            source,
        }
    }

    pub fn message(public: &'static str) -> Self {
        Self::unknown(public, anyhow!(public))
    }
}

impl fmt::Display for LibError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.public, self.code)
    }
}

impl std::error::Error for LibError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        let source: &(dyn std::error::Error + 'static) = self.source.as_ref();
        Some(source)
    }
}

#[cfg(feature = "sqlx")]
impl From<sqlx::Error> for LibError {
    fn from(value: sqlx::Error) -> Self {
        Self::database("Database request failed", anyhow!(value))
    }
}
