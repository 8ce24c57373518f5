use std::path::Path;

use anyhow::Context;
use crudstack_compose::{ArtifactResolver, FsResolver, generate_client_trust};

pub fn init(out: &str, common_name: &str, organization: &str) -> anyhow::Result<()> {
    let out = Path::new(out);
    let name = out
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("{} does not name a file", out.display()))?;
    let dir = out.parent().unwrap_or(Path::new(""));
    let dir = if dir.as_os_str().is_empty() { Path::new(".") } else { dir };

    let files = generate_client_trust(organization, common_name)?.write(dir, name)?;

    println!("✓ Generated client trust material");
    println!("  Bundle:      {}", files.bundle.display());
    println!("  CA key:      {}", files.ca_key.display());
    println!("  Client cert: {}", files.client_cert.display());
    println!("  Client key:  {}", files.client_key.display());
    Ok(())
}

pub fn inspect(file: &str) -> anyhow::Result<()> {
    let bundle = FsResolver
        .load_trust_bundle(Path::new(file))
        .with_context(|| format!("invalid trust bundle {file}"))?;
    println!("✓ {}", bundle.path.display());
    println!("  Certificates: {}", bundle.certificates);
    println!("  SHA256:       {}", bundle.sha256);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trust_init_then_inspect() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("certs/mfjimene.com.cer");
        init(out.to_str().unwrap(), "client", "Test").unwrap();

        assert!(out.is_file());
        assert!(dir.path().join("certs/client.key").is_file());
        inspect(out.to_str().unwrap()).unwrap();
    }

    #[test]
    fn test_inspect_rejects_key_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("ca.pem");
        init(out.to_str().unwrap(), "client", "Test").unwrap();

        let err = inspect(dir.path().join("client.key").to_str().unwrap()).unwrap_err();
        assert!(format!("{err:#}").contains("private key"));
    }

    #[test]
    fn test_inspect_missing_file() {
        assert!(inspect("/nonexistent/ca.pem").is_err());
    }
}
