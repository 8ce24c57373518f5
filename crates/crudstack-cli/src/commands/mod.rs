pub mod graph;
pub mod init;
pub mod routes;
pub mod synth;
pub mod trust;

use std::path::Path;

use anyhow::Context;
use crudstack_compose::{FsResolver, StackGraph, compose};
use crudstack_core::StackConfig;

/// Read `config` and compose the stack it describes against the local
/// filesystem.
pub fn load(config: &str) -> anyhow::Result<StackGraph> {
    let path = Path::new(config);
    let config = StackConfig::from_file(path)?;
    let graph = compose(&config, &FsResolver)
        .with_context(|| format!("failed to compose stack from {}", path.display()))?;
    Ok(graph)
}

/// A project on disk with handler sources for every role, plus the trust
/// bundle when `secure` is set.
#[cfg(test)]
pub(crate) fn write_project(dir: &Path, split: bool, secure: bool) -> std::path::PathBuf {
    use std::fs;

    let config = StackConfig::scaffold(split, secure);
    let manifest = dir.join("stack.toml");
    fs::write(&manifest, config.to_toml_string().unwrap()).unwrap();

    let functions = dir.join("functions");
    fs::create_dir_all(&functions).unwrap();
    for module in ["function", "getMethod", "putMethod", "deleteMethod"] {
        fs::write(functions.join(format!("{module}.js")), "exports.handler = async () => ({})").unwrap();
    }
    if secure {
        crudstack_compose::generate_client_trust("Test", "client")
            .unwrap()
            .write(&dir.join("certs"), "mfjimene.com.cer")
            .unwrap();
    }
    manifest
}
