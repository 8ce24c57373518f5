//! Shared declarative types used across crudstack crates.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::error::{ComposeError, ComposeResult};

/// Environment key under which every compute unit receives the table name.
pub const TABLE_NAME_ENV: &str = "HELLO_TABLE_NAME";

// ── HTTP ──────────────────────────────────────────────────────────

/// HTTP method a route answers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
    Any,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Any => "ANY",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = ComposeError;

    fn from_str(s: &str) -> ComposeResult<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            "HEAD" => Ok(HttpMethod::Head),
            "OPTIONS" => Ok(HttpMethod::Options),
            "ANY" => Ok(HttpMethod::Any),
            _ => Err(ComposeError::InvalidMethod(s.to_string())),
        }
    }
}

static PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\{([A-Za-z_][A-Za-z0-9_]*)\}$").expect("static regex"));
static LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._~-]+$").expect("static regex"));

/// A route path: literal segments plus at most one `{param}` segment.
///
/// Parameters are forwarded to the target unit untouched; the routing layer
/// never validates their values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathPattern {
    raw: String,
    parameter: Option<String>,
}

impl PathPattern {
    pub fn parse(pattern: &str) -> ComposeResult<Self> {
        let invalid = |reason| ComposeError::InvalidPathPattern {
            pattern: pattern.to_string(),
            reason,
        };

        let rest = pattern.strip_prefix('/').ok_or_else(|| invalid("must start with '/'"))?;
        if rest.is_empty() {
            return Ok(PathPattern {
                raw: "/".to_string(),
                parameter: None,
            });
        }

        let mut parameter = None;
        for segment in rest.split('/') {
            if segment.is_empty() {
                return Err(invalid("empty path segment"));
            }
            if let Some(caps) = PARAM.captures(segment) {
                if parameter.is_some() {
                    return Err(invalid("at most one path parameter is supported"));
                }
                parameter = Some(caps[1].to_string());
            } else if !LITERAL.is_match(segment) {
                return Err(invalid("segment is neither a literal nor a {param}"));
            }
        }

        Ok(PathPattern {
            raw: pattern.to_string(),
            parameter,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Name of the path parameter, if the pattern has one.
    pub fn parameter(&self) -> Option<&str> {
        self.parameter.as_deref()
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

// ── Storage ───────────────────────────────────────────────────────

/// Attribute type of the table's partition key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    #[default]
    String,
    Number,
    Binary,
}

impl KeyType {
    /// Single-letter attribute type code used in table definitions.
    pub fn attribute_type(&self) -> &'static str {
        match self {
            KeyType::String => "S",
            KeyType::Number => "N",
            KeyType::Binary => "B",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionKey {
    pub name: String,
    #[serde(rename = "type", default)]
    pub key_type: KeyType,
}

impl Default for PartitionKey {
    fn default() -> Self {
        PartitionKey {
            name: "id".to_string(),
            key_type: KeyType::String,
        }
    }
}

/// Access a grant gives its subject over the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    Read,
    Write,
    ReadWrite,
}

const READ_ACTIONS: &[&str] = &[
    "dynamodb:BatchGetItem",
    "dynamodb:GetRecords",
    "dynamodb:GetShardIterator",
    "dynamodb:Query",
    "dynamodb:GetItem",
    "dynamodb:Scan",
    "dynamodb:ConditionCheckItem",
];

const WRITE_ACTIONS: &[&str] = &[
    "dynamodb:BatchWriteItem",
    "dynamodb:PutItem",
    "dynamodb:UpdateItem",
    "dynamodb:DeleteItem",
];

impl AccessMode {
    pub fn allows_read(&self) -> bool {
        matches!(self, AccessMode::Read | AccessMode::ReadWrite)
    }

    pub fn allows_write(&self) -> bool {
        matches!(self, AccessMode::Write | AccessMode::ReadWrite)
    }

    /// Smallest mode that covers both `self` and `other`.
    pub fn union(self, other: AccessMode) -> AccessMode {
        if self == other {
            self
        } else {
            AccessMode::ReadWrite
        }
    }

    /// Table actions permitted under this mode.
    pub fn actions(&self) -> Vec<&'static str> {
        let mut actions = Vec::new();
        if self.allows_read() {
            actions.extend_from_slice(READ_ACTIONS);
        }
        if self.allows_write() {
            actions.extend_from_slice(WRITE_ACTIONS);
        }
        actions.push("dynamodb:DescribeTable");
        actions
    }
}

// ── Compute ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeFamily {
    Node,
    Python,
}

/// Runtime identifier such as `nodejs12.x` or `python3.12`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Runtime {
    id: String,
    family: RuntimeFamily,
}

impl Runtime {
    pub fn parse(id: &str) -> ComposeResult<Self> {
        let family = if id.starts_with("nodejs") {
            RuntimeFamily::Node
        } else if id.starts_with("python") {
            RuntimeFamily::Python
        } else {
            return Err(ComposeError::UnsupportedRuntime(id.to_string()));
        };
        Ok(Runtime {
            id: id.to_string(),
            family,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn family(&self) -> RuntimeFamily {
        self.family
    }

    /// File extensions a handler module may carry for this runtime.
    pub fn handler_extensions(&self) -> &'static [&'static str] {
        match self.family {
            RuntimeFamily::Node => &["js", "mjs", "cjs"],
            RuntimeFamily::Python => &["py"],
        }
    }
}

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Handler entry point, `<module>.<function>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    pub module: String,
    pub function: String,
}

impl EntryPoint {
    pub fn parse(entry: &str) -> ComposeResult<Self> {
        let (module, function) = entry
            .rsplit_once('.')
            .ok_or_else(|| ComposeError::InvalidEntryPoint(entry.to_string()))?;
        if module.is_empty() || function.is_empty() || module.starts_with('/') || module.contains("..") {
            return Err(ComposeError::InvalidEntryPoint(entry.to_string()));
        }
        Ok(EntryPoint {
            module: module.to_string(),
            function: function.to_string(),
        })
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.module, self.function)
    }
}

/// Which slice of the CRUD surface a handler serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerRole {
    /// One unit serving every route.
    Single,
    Get,
    Put,
    Delete,
}

impl HandlerRole {
    /// Access the role needs when grants are scoped per operation.
    pub fn scoped_access(&self) -> AccessMode {
        match self {
            HandlerRole::Single => AccessMode::ReadWrite,
            HandlerRole::Get => AccessMode::Read,
            HandlerRole::Put | HandlerRole::Delete => AccessMode::Write,
        }
    }
}

// ── Domain ────────────────────────────────────────────────────────

static CERT_ARN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^arn:aws[a-z-]*:acm:([a-z]{2}(?:-[a-z]+)+-\d):(\d{12}):certificate/([A-Za-z0-9-]+)$")
        .expect("static regex")
});

/// Reference to an externally issued TLS certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRef {
    arn: String,
    pub region: String,
    pub account: String,
    pub certificate_id: String,
}

impl CertificateRef {
    pub fn parse(arn: &str) -> ComposeResult<Self> {
        let caps = CERT_ARN
            .captures(arn)
            .ok_or_else(|| ComposeError::InvalidCertificate(arn.to_string()))?;
        Ok(CertificateRef {
            arn: arn.to_string(),
            region: caps[1].to_string(),
            account: caps[2].to_string(),
            certificate_id: caps[3].to_string(),
        })
    }

    pub fn arn(&self) -> &str {
        &self.arn
    }
}
