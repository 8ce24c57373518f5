use std::path::Path;

use anyhow::{Context, bail};
use crudstack_core::StackConfig;

pub fn init(path: &str, split: bool, secure_domain: bool, force: bool) -> anyhow::Result<()> {
    let dir = Path::new(path);
    let output = dir.join("stack.toml");
    if output.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", output.display());
    }

    let config = StackConfig::scaffold(split, secure_domain);
    std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    std::fs::write(&output, config.to_toml_string()?)
        .with_context(|| format!("failed to write {}", output.display()))?;

    println!("✓ Generated {}", output.display());
    println!("  Handlers: {}", config.handler_decls().len());
    if let Some(domain) = config.secure_domain() {
        println!("  Secure domain: {} (set [domain].certificate to your ACM ARN)", domain.name);
        println!("  Trust bundle: run `crudstack trust init --out {}`", domain.trust_artifact);
    }
    Ok(())
}
