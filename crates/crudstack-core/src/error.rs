//! Error types for stack composition.

use thiserror::Error;

/// Result type alias for composition operations.
pub type ComposeResult<T> = Result<T, ComposeError>;

/// Errors that abort composition before any resource is declared to the
/// provisioning engine.
#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("invalid {kind} name {name:?}: {reason}")]
    InvalidName {
        kind: &'static str,
        name: String,
        reason: &'static str,
    },

    #[error("storage resource already declared: {0}")]
    DuplicateStorage(String),

    #[error("no storage resource declared")]
    MissingStorage,

    #[error("compute unit declared twice: {0}")]
    DuplicateComputeUnit(String),

    #[error("compute unit {0} has no grant on the storage resource")]
    MissingGrant(String),

    #[error("unknown compute unit: {0}")]
    UnknownComputeUnit(String),

    #[error("invalid entry point {0:?}: expected <module>.<function>")]
    InvalidEntryPoint(String),

    #[error("entry point {entry} does not resolve to a packaged artifact in {asset}")]
    UnresolvedEntryPoint { entry: String, asset: String },

    #[error("artifact not found: {0}")]
    MissingArtifact(String),

    #[error("unsupported runtime: {0}")]
    UnsupportedRuntime(String),

    #[error("unsupported HTTP method: {0}")]
    InvalidMethod(String),

    #[error("invalid path pattern {pattern:?}: {reason}")]
    InvalidPathPattern {
        pattern: String,
        reason: &'static str,
    },

    #[error("route declared twice: {method} {path}")]
    DuplicateRoute { method: String, path: String },

    #[error("invalid certificate reference {0:?}")]
    InvalidCertificate(String),

    #[error("invalid trust bundle {path}: {reason}")]
    InvalidTrustBundle { path: String, reason: String },

    #[error("object store bucket already declared: {0}")]
    DuplicateBucket(String),

    #[error("no object store bucket declared for trust objects")]
    MissingBucket,

    #[error("trust object {0} has not been staged")]
    TrustObjectNotStaged(String),

    #[error("secure domain already declared: {0}")]
    DuplicateSecureDomain(String),

    #[error("{step} must be declared before {before}")]
    OutOfOrder {
        step: &'static str,
        before: &'static str,
    },

    #[error("gateway already assembled: {0}")]
    GatewayAlreadyAssembled(String),

    #[error("no gateway assembled")]
    GatewayNotAssembled,

    #[error("logical ID {0} is used by more than one declaration")]
    LogicalIdCollision(String),

    #[error("{node} depends on undeclared {dependency}")]
    UnknownDependency { node: String, dependency: String },

    #[error("dependency cycle involving {0}")]
    DependencyCycle(String),

    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl ComposeError {
    pub(crate) fn invalid_name(kind: &'static str, name: &str, reason: &'static str) -> Self {
        ComposeError::InvalidName {
            kind,
            name: name.to_string(),
            reason,
        }
    }
}
