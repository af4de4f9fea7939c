use crate::error::Result;
use crate::graph::Graph;
use crate::models::GraphSnapshot;
use std::io::Write;

pub fn read(bytes: &[u8]) -> Result<Graph> {
    let snapshot: GraphSnapshot = serde_yaml::from_slice(bytes)?;
    Ok(Graph::from_snapshot(snapshot))
}

pub fn write<W: Write>(graph: &Graph, writer: &mut W) -> Result<()> {
    serde_yaml::to_writer(writer, &graph.to_snapshot())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NodeId;

    #[test]
    fn test_read_hand_written_yaml() {
        let text = r#"
directed: true
multigraph: false
graph:
  name: tiny
nodes:
  - id: 1
    attributes:
      color: red
  - id: hub
edges:
  - source: 1
    target: hub
    attributes:
      weight: 0.5
"#;
        let graph = read(text.as_bytes()).unwrap();

        assert!(graph.is_directed());
        assert_eq!(graph.node_count(), 2);
        assert!(graph.has_edge(&NodeId::Int(1), &NodeId::from("hub")));
        assert_eq!(graph.attributes()["name"], "tiny");
    }

    #[test]
    fn test_malformed_yaml_is_an_error() {
        assert!(read(b"nodes: [unclosed").is_err());
    }
}
