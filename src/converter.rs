use crate::graph::Graph;
use crate::models::{LinkRecord, NodeLinkDocument, NodeRecord};
use tracing::debug;

/// How undirected edges are turned into links
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LinkPolicy {
    /// One link per stored edge, in the orientation it was added
    #[default]
    Unique,
    /// One link per adjacency entry; undirected edges show up from both ends
    PerAdjacency,
}

/// Flatten `graph` into a node-link document.
///
/// Nodes follow the graph's insertion order. Links are emitted while walking
/// each node's adjacency, so they are grouped by the node they were reached
/// from. Directed graphs give the same output under either policy.
pub fn convert_network(graph: &Graph, policy: LinkPolicy) -> NodeLinkDocument {
    let mut nodes = Vec::with_capacity(graph.node_count());
    let mut links = Vec::with_capacity(graph.edge_count());

    for ix in graph.node_indices() {
        let node = graph.node(ix);
        nodes.push(NodeRecord::new(node.id.to_string(), node.attributes.clone()));

        for entry in graph.adjacency(ix) {
            if policy == LinkPolicy::Unique && !graph.is_directed() {
                let (stored_source, _) = graph.endpoints(entry.edge);
                if stored_source != ix {
                    continue;
                }
            }
            links.push(LinkRecord::new(
                node.id.clone(),
                graph.node(entry.neighbor).id.clone(),
                graph.edge(entry.edge).attributes.clone(),
            ));
        }
    }

    debug!(
        "Converted graph into {} nodes and {} links ({:?})",
        nodes.len(),
        links.len(),
        policy
    );

    NodeLinkDocument { nodes, links }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Attributes, NodeId};
    use serde_json::json;

    fn attrs(pairs: &[(&str, serde_json::Value)]) -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn triangle_with_loop() -> Graph {
        let mut graph = Graph::undirected();
        graph.add_node("a".into(), attrs(&[("group", json!(1))]));
        graph.add_edge("a".into(), "b".into(), attrs(&[("weight", json!(2))]));
        graph.add_edge("b".into(), "c".into(), Attributes::new());
        graph.add_edge("c".into(), "a".into(), Attributes::new());
        graph.add_edge("c".into(), "c".into(), Attributes::new());
        graph
    }

    #[test]
    fn test_one_node_record_per_node() {
        let graph = triangle_with_loop();
        let document = convert_network(&graph, LinkPolicy::Unique);

        let names: Vec<&str> = document.nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(document.nodes[0].attributes["group"], json!(1));
    }

    #[test]
    fn test_unique_policy_one_link_per_edge() {
        let graph = triangle_with_loop();
        let document = convert_network(&graph, LinkPolicy::Unique);

        assert_eq!(document.links.len(), graph.edge_count());
        let first = &document.links[0];
        assert_eq!(first.source, NodeId::from("a"));
        assert_eq!(first.target, NodeId::from("b"));
        assert_eq!(first.attributes["weight"], json!(2));
    }

    #[test]
    fn test_per_adjacency_policy_doubles_all_but_self_loops() {
        let graph = triangle_with_loop();
        let document = convert_network(&graph, LinkPolicy::PerAdjacency);

        // three ordinary edges twice, one self-loop once
        assert_eq!(document.links.len(), 3 * 2 + 1);
        assert!(document
            .links
            .iter()
            .any(|l| l.source == NodeId::from("b") && l.target == NodeId::from("a")));
    }

    #[test]
    fn test_directed_policies_agree() {
        let mut graph = Graph::directed();
        graph.add_edge(NodeId::Int(1), NodeId::Int(2), Attributes::new());
        graph.add_edge(NodeId::Int(2), NodeId::Int(1), Attributes::new());
        graph.add_edge(NodeId::Int(2), NodeId::Int(3), Attributes::new());

        let unique = convert_network(&graph, LinkPolicy::Unique);
        let adjacency = convert_network(&graph, LinkPolicy::PerAdjacency);

        assert_eq!(unique, adjacency);
        assert_eq!(unique.links.len(), 3);
    }

    #[test]
    fn test_parallel_edges_each_get_a_link() {
        let mut graph = Graph::new(false, true);
        graph.add_edge("x".into(), "y".into(), attrs(&[("key", json!(0))]));
        graph.add_edge("x".into(), "y".into(), attrs(&[("key", json!(1))]));

        let document = convert_network(&graph, LinkPolicy::Unique);
        assert_eq!(document.links.len(), 2);
    }

    #[test]
    fn test_conversion_is_deterministic() {
        let graph = triangle_with_loop();
        let first = serde_json::to_string(&convert_network(&graph, LinkPolicy::Unique)).unwrap();
        let second = serde_json::to_string(&convert_network(&graph, LinkPolicy::Unique)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_name_attribute_does_not_override_identifier() {
        let mut graph = Graph::undirected();
        graph.add_node(NodeId::Int(5), attrs(&[("name", json!("five"))]));

        let document = convert_network(&graph, LinkPolicy::Unique);
        assert_eq!(document.nodes[0].name, "5");
        assert!(!document.nodes[0].attributes.contains_key("name"));
    }
}
