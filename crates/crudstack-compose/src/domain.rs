//! Secure domain configuration: trust bucket, staged trust objects, and the
//! mTLS custom domain.
//!
//! The steps are linear and each one is a hard precondition for the next:
//!
//! 1. create the object store bucket,
//! 2. stage the local client-certificate bundle into it under a known key,
//! 3. bind the custom domain to the certificate and the staged trust object.
//!
//! Mapping the gateway onto the domain (and disabling the provider's default
//! endpoint) happens when the gateway is assembled; see [`crate::stack`].

use std::path::Path;

use crudstack_core::names::{self, logical_id};
use crudstack_core::{CertificateRef, ComposeError, ComposeResult, S3Uri};
use tracing::{debug, info};

use crate::assets::{ArtifactResolver, TrustBundle};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectStoreBucket {
    pub logical_id: String,
    pub name: String,
}

/// A local artifact deployed verbatim into the trust bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustObject {
    pub logical_id: String,
    /// Logical ID of the bucket it is deployed into.
    pub bucket: String,
    pub uri: S3Uri,
    pub bundle: TrustBundle,
}

/// What a caller declares for the custom domain.
#[derive(Debug, Clone)]
pub struct DomainSpec {
    pub name: String,
    /// ARN of an externally issued TLS certificate.
    pub certificate: String,
    /// Key of an already staged trust object.
    pub trust_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecureDomain {
    pub logical_id: String,
    pub name: String,
    pub certificate: CertificateRef,
    pub truststore: S3Uri,
    /// Logical ID of the trust object backing the truststore.
    pub trust_object: String,
    /// Fingerprint of the staged bundle; a new bundle forces the domain to
    /// pick up the new truststore version.
    pub truststore_sha256: String,
}

pub struct SecureDomainConfigurator<'r> {
    resolver: &'r dyn ArtifactResolver,
    bucket: Option<ObjectStoreBucket>,
    trust_objects: Vec<TrustObject>,
    domain: Option<SecureDomain>,
}

impl<'r> SecureDomainConfigurator<'r> {
    pub fn new(resolver: &'r dyn ArtifactResolver) -> Self {
        Self {
            resolver,
            bucket: None,
            trust_objects: Vec::new(),
            domain: None,
        }
    }

    pub fn create_bucket(&mut self, name: &str) -> ComposeResult<&ObjectStoreBucket> {
        if let Some(existing) = &self.bucket {
            return Err(ComposeError::DuplicateBucket(existing.name.clone()));
        }
        names::validate_bucket_name(name)?;
        debug!(bucket = name, "declared trust bucket");
        Ok(self.bucket.insert(ObjectStoreBucket {
            logical_id: logical_id(name),
            name: name.to_string(),
        }))
    }

    /// Stage the local bundle at `artifact` into the bucket under `key`.
    pub fn stage_trust_object(&mut self, artifact: &Path, key: &str) -> ComposeResult<&TrustObject> {
        let bucket = self.bucket.as_ref().ok_or(ComposeError::MissingBucket)?;
        let uri = S3Uri::new(&bucket.name, key)?;
        if self.trust_objects.iter().any(|t| t.uri == uri) {
            return Err(ComposeError::InvalidName {
                kind: "object key",
                name: key.to_string(),
                reason: "already staged",
            });
        }

        let bundle = self.resolver.load_trust_bundle(artifact)?;
        info!(
            artifact = %artifact.display(),
            %uri,
            certificates = bundle.certificates,
            sha256 = %bundle.sha256,
            "staged trust object"
        );
        self.trust_objects.push(TrustObject {
            logical_id: format!("Deploy{}", logical_id(key)),
            bucket: bucket.logical_id.clone(),
            uri,
            bundle,
        });
        Ok(&self.trust_objects[self.trust_objects.len() - 1])
    }

    /// Bind the custom domain. The trust object named by `spec.trust_key`
    /// must already be staged.
    pub fn bind_domain(&mut self, spec: &DomainSpec) -> ComposeResult<&SecureDomain> {
        if let Some(existing) = &self.domain {
            return Err(ComposeError::DuplicateSecureDomain(existing.name.clone()));
        }
        names::validate_domain_name(&spec.name)?;
        let certificate = CertificateRef::parse(&spec.certificate)?;

        let trust = self
            .trust_objects
            .iter()
            .find(|t| t.uri.key == spec.trust_key)
            .ok_or_else(|| ComposeError::TrustObjectNotStaged(spec.trust_key.clone()))?;

        let name = spec.name.trim_end_matches('.').to_string();
        info!(domain = %name, certificate = certificate.arn(), truststore = %trust.uri, "bound secure domain");
        Ok(self.domain.insert(SecureDomain {
            logical_id: logical_id(&name),
            name,
            certificate,
            truststore: trust.uri.clone(),
            trust_object: trust.logical_id.clone(),
            truststore_sha256: trust.bundle.sha256.clone(),
        }))
    }

    pub fn bucket(&self) -> Option<&ObjectStoreBucket> {
        self.bucket.as_ref()
    }

    pub fn trust_objects(&self) -> &[TrustObject] {
        &self.trust_objects
    }

    pub fn domain(&self) -> Option<&SecureDomain> {
        self.domain.as_ref()
    }

    pub fn into_parts(self) -> (Option<ObjectStoreBucket>, Vec<TrustObject>, Option<SecureDomain>) {
        (self.bucket, self.trust_objects, self.domain)
    }
}
