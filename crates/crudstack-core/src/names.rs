//! Physical resource name rules and logical ID derivation.
//!
//! Physical names are what the provider sees (table, function, bucket and
//! domain names). Logical IDs key declarations inside a synthesized template
//! and are derived from physical names so that they stay stable across
//! re-synthesis.

use regex::Regex;
use std::sync::LazyLock;

use crate::error::{ComposeError, ComposeResult};

static TABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.-]{3,255}$").expect("static regex"));
static FUNCTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("static regex"));
static BUCKET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9.-]{1,61}[a-z0-9]$").expect("static regex"));
static LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?$").expect("static regex")
});
static STACK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9-]{0,127}$").expect("static regex"));
static OBJECT_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9!_.*'()/-]{1,1024}$").expect("static regex"));

pub fn validate_stack_id(id: &str) -> ComposeResult<()> {
    if STACK.is_match(id) {
        Ok(())
    } else {
        Err(ComposeError::invalid_name(
            "stack",
            id,
            "must start with a letter and contain only alphanumerics and '-'",
        ))
    }
}

pub fn validate_table_name(name: &str) -> ComposeResult<()> {
    if TABLE.is_match(name) {
        Ok(())
    } else {
        Err(ComposeError::invalid_name(
            "table",
            name,
            "3-255 characters of [A-Za-z0-9_.-]",
        ))
    }
}

pub fn validate_function_name(name: &str) -> ComposeResult<()> {
    if FUNCTION.is_match(name) {
        Ok(())
    } else {
        Err(ComposeError::invalid_name(
            "compute unit",
            name,
            "1-64 characters of [A-Za-z0-9_-]",
        ))
    }
}

pub fn validate_bucket_name(name: &str) -> ComposeResult<()> {
    if !BUCKET.is_match(name) {
        return Err(ComposeError::invalid_name(
            "bucket",
            name,
            "3-63 lowercase characters of [a-z0-9.-], alphanumeric at both ends",
        ));
    }
    if name.contains("..") {
        return Err(ComposeError::invalid_name("bucket", name, "adjacent periods"));
    }
    if name.split('.').count() == 4 && name.split('.').all(|part| part.parse::<u8>().is_ok()) {
        return Err(ComposeError::invalid_name(
            "bucket",
            name,
            "must not be formatted as an IP address",
        ));
    }
    Ok(())
}

pub fn validate_object_key(key: &str) -> ComposeResult<()> {
    if OBJECT_KEY.is_match(key) && !key.starts_with('/') {
        Ok(())
    } else {
        Err(ComposeError::invalid_name(
            "object key",
            key,
            "relative key of URL-safe characters",
        ))
    }
}

/// Validate a fully qualified domain name (at least two labels).
pub fn validate_domain_name(fqdn: &str) -> ComposeResult<()> {
    let name = fqdn.strip_suffix('.').unwrap_or(fqdn);
    let labels: Vec<&str> = name.split('.').collect();
    if name.len() > 253 || labels.len() < 2 {
        return Err(ComposeError::invalid_name(
            "domain",
            fqdn,
            "must be a fully qualified name",
        ));
    }
    if !labels.iter().all(|label| LABEL.is_match(label)) {
        return Err(ComposeError::invalid_name(
            "domain",
            fqdn,
            "labels are 1-63 alphanumerics or inner '-'",
        ));
    }
    if labels.last().is_some_and(|tld| tld.chars().all(|c| c.is_ascii_digit())) {
        return Err(ComposeError::invalid_name("domain", fqdn, "numeric top-level label"));
    }
    Ok(())
}

/// Turn a physical name into a PascalCase logical ID fragment.
///
/// `http-get-dynamo-function` becomes `HttpGetDynamoFunction`; characters
/// outside `[A-Za-z0-9]` act as word separators and are dropped.
pub fn logical_id(name: &str) -> String {
    name.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}
