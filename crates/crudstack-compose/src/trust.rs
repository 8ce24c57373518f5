//! Client trust material for the mTLS custom domain.
//!
//! The domain's truststore is a PEM bundle of the CA that signs client
//! certificates. `generate_client_trust` produces that CA plus one client
//! certificate so a stack can be deployed and exercised end to end.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyPair, KeyUsagePurpose,
};
use tracing::info;

/// A generated certificate and private key pair.
#[derive(Debug, Clone)]
pub struct CertKeyPair {
    /// PEM-encoded certificate.
    pub cert_pem: String,
    /// PEM-encoded private key.
    pub key_pem: String,
}

/// A client-auth CA and one client certificate it signed.
#[derive(Debug, Clone)]
pub struct ClientTrust {
    pub ca: CertKeyPair,
    pub client: CertKeyPair,
}

/// Paths written by [`ClientTrust::write`].
#[derive(Debug, Clone)]
pub struct TrustFiles {
    /// The truststore bundle, to be staged into the trust bucket.
    pub bundle: PathBuf,
    pub ca_key: PathBuf,
    pub client_cert: PathBuf,
    pub client_key: PathBuf,
}

fn distinguished_name(organization: &str, common_name: &str) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(DnType::OrganizationName, organization);
    dn.push(DnType::CommonName, common_name);
    dn
}

/// Generate a self-signed client CA and a client certificate signed by it.
pub fn generate_client_trust(organization: &str, client_name: &str) -> anyhow::Result<ClientTrust> {
    let mut ca_params = CertificateParams::default();
    ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    ca_params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
    ca_params.distinguished_name = distinguished_name(organization, &format!("{organization} Client CA"));
    ca_params.not_after = rcgen::date_time_ymd(2036, 1, 1);

    let ca_key = KeyPair::generate()?;
    let ca_cert = ca_params.self_signed(&ca_key)?;

    let mut client_params = CertificateParams::new(vec![client_name.to_string()])
        .with_context(|| format!("invalid client name {client_name:?}"))?;
    client_params.distinguished_name = distinguished_name(organization, client_name);
    client_params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
    client_params.not_after = rcgen::date_time_ymd(2028, 1, 1);

    let client_key = KeyPair::generate()?;
    let client_cert = client_params.signed_by(&client_key, &ca_cert, &ca_key)?;

    info!(%organization, client = %client_name, "generated client trust material");

    Ok(ClientTrust {
        ca: CertKeyPair {
            cert_pem: ca_cert.pem(),
            key_pem: ca_key.serialize_pem(),
        },
        client: CertKeyPair {
            cert_pem: client_cert.pem(),
            key_pem: client_key.serialize_pem(),
        },
    })
}

impl ClientTrust {
    /// Write the material under `dir`. The bundle holds the CA certificate
    /// only; keys go to sibling files and never into the bundle.
    pub fn write(&self, dir: &Path, bundle_name: &str) -> anyhow::Result<TrustFiles> {
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
        let files = TrustFiles {
            bundle: dir.join(bundle_name),
            ca_key: dir.join("client-ca.key"),
            client_cert: dir.join("client.pem"),
            client_key: dir.join("client.key"),
        };
        for (path, contents) in [
            (&files.bundle, &self.ca.cert_pem),
            (&files.ca_key, &self.ca.key_pem),
            (&files.client_cert, &self.client.cert_pem),
            (&files.client_key, &self.client.key_pem),
        ] {
            fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))?;
        }
        Ok(files)
    }
}
