use crudstack_compose::StackGraph;

pub fn graph(config: &str) -> anyhow::Result<()> {
    let graph = super::load(config)?;
    print!("{}", format_order(&graph)?);
    Ok(())
}

pub fn format_order(graph: &StackGraph) -> anyhow::Result<String> {
    let mut out = String::new();
    for (i, node) in graph.dependency_order()?.iter().enumerate() {
        out.push_str(&format!("{:>3}  {:<14} {}", i + 1, node.kind.label(), node.logical_id));
        if !node.depends_on.is_empty() {
            out.push_str(&format!("  <- {}", node.depends_on.join(", ")));
        }
        out.push('\n');
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{load, write_project};

    #[test]
    fn test_format_order_secure_domain() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = write_project(dir.path(), true, true);
        let graph = load(manifest.to_str().unwrap()).unwrap();

        let text = format_order(&graph).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].contains("storage"));
        assert!(lines.last().unwrap().contains("route"));

        let line_of = |label: &str| lines.iter().position(|l| l.contains(label)).unwrap();
        assert!(line_of("trust-object") < line_of("secure-domain"));
        assert!(line_of("secure-domain") < line_of(" gateway "));
    }
}
