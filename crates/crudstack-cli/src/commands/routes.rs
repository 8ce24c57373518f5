use crudstack_compose::StackGraph;

pub fn routes(config: &str) -> anyhow::Result<()> {
    let graph = super::load(config)?;
    print!("{}", format_routes(&graph));
    Ok(())
}

/// `METHOD path -> unit` per route, followed by the reachable endpoint.
pub fn format_routes(graph: &StackGraph) -> String {
    let mut out = String::new();
    for route in &graph.gateway.routes {
        let unit = graph
            .unit(route.target())
            .map(|u| u.name.as_str())
            .unwrap_or("?");
        out.push_str(&format!("{:<7} {:<14} -> {unit}\n", route.method.as_str(), route.path.as_str()));
    }
    out.push_str(&format!(
        "\n{} routes, {} integrations\nEndpoint: {}\n",
        graph.gateway.routes.len(),
        graph.gateway.adapters.len(),
        graph.gateway.endpoint()
    ));
    if !graph.gateway.default_endpoint_enabled() {
        out.push_str("Default execute-api endpoint: disabled\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{load, write_project};

    #[test]
    fn test_format_routes_split() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = write_project(dir.path(), true, false);
        let graph = load(manifest.to_str().unwrap()).unwrap();

        let text = format_routes(&graph);
        assert!(text.contains("GET     /items/{id}    -> http-get-dynamo-function"));
        assert!(text.contains("DELETE  /items/{id}    -> http-delete-dynamo-function"));
        assert!(text.contains("4 routes, 3 integrations"));
        assert!(!text.contains("disabled"));
    }

    #[test]
    fn test_format_routes_single() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = write_project(dir.path(), false, false);
        let graph = load(manifest.to_str().unwrap()).unwrap();

        let text = format_routes(&graph);
        assert_eq!(text.matches("-> http-crud-tutorial-function").count(), 4);
        assert!(text.contains("4 routes, 1 integrations"));
    }
}
