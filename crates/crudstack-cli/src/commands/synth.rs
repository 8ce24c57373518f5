use std::path::Path;

use anyhow::Context;
use tracing::info;

pub fn synth(config: &str, out: Option<&str>) -> anyhow::Result<()> {
    let graph = super::load(config)?;
    let template = crudstack_compose::render_string(&graph)?;

    match out {
        Some(out) => {
            let out = Path::new(out);
            if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            std::fs::write(out, &template)
                .with_context(|| format!("failed to write {}", out.display()))?;
            info!(stack = %graph.stack_id, out = %out.display(), "wrote template");
            println!("✓ Synthesized {} ({} resources)", out.display(), graph.nodes().len());
        }
        None => println!("{template}"),
    }
    Ok(())
}
