use crate::error::{NodeLinkError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Open-ended attribute mapping carried by graphs, nodes and edges
pub type Attributes = serde_json::Map<String, serde_json::Value>;

/// Node identifier, unique within a graph
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeId {
    Int(i64),
    Str(String),
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Int(i) => write!(f, "{}", i),
            NodeId::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for NodeId {
    fn from(value: i64) -> Self {
        NodeId::Int(value)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        NodeId::Str(value.to_string())
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        NodeId::Str(value)
    }
}

/// How textual identifiers read from a file become node ids
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum NodeIdKind {
    /// Keep identifiers as strings
    #[default]
    Str,
    /// Require integer identifiers
    Int,
    /// Integers where the text parses as one, strings otherwise
    Infer,
}

/// Options handed through to the format readers untouched
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    pub node_type: NodeIdKind,
}

impl ReadOptions {
    /// Turn a raw identifier token into a node id according to `node_type`
    pub fn node_id(&self, raw: &str) -> Result<NodeId> {
        match self.node_type {
            NodeIdKind::Str => Ok(NodeId::Str(raw.to_string())),
            NodeIdKind::Int => raw.trim().parse::<i64>().map(NodeId::Int).map_err(|_| {
                NodeLinkError::invalid_parameter(format!(
                    "Node identifier '{}' is not an integer",
                    raw
                ))
            }),
            NodeIdKind::Infer => Ok(raw
                .trim()
                .parse::<i64>()
                .map(NodeId::Int)
                .unwrap_or_else(|_| NodeId::Str(raw.to_string()))),
        }
    }
}

/// A node in the output document: `{name, ...attributes}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub name: String,
    #[serde(flatten)]
    pub attributes: Attributes,
}

impl NodeRecord {
    /// The synthesized name wins over a node attribute of the same key
    pub fn new(name: String, mut attributes: Attributes) -> Self {
        attributes.remove("name");
        Self { name, attributes }
    }
}

/// A link in the output document: `{source, target, ...attributes}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkRecord {
    pub source: NodeId,
    pub target: NodeId,
    #[serde(flatten)]
    pub attributes: Attributes,
}

impl LinkRecord {
    /// The synthesized endpoints win over edge attributes of the same key
    pub fn new(source: NodeId, target: NodeId, mut attributes: Attributes) -> Self {
        attributes.remove("source");
        attributes.remove("target");
        Self {
            source,
            target,
            attributes,
        }
    }
}

/// Node-link document consumed by force-directed layouts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeLinkDocument {
    pub nodes: Vec<NodeRecord>,
    pub links: Vec<LinkRecord>,
}

/// Format-neutral serialized form of a graph, shared by the YAML and pickle codecs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub directed: bool,
    pub multigraph: bool,
    #[serde(default)]
    pub graph: Attributes,
    pub nodes: Vec<SnapshotNode>,
    pub edges: Vec<SnapshotEdge>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotNode {
    pub id: NodeId,
    #[serde(default)]
    pub attributes: Attributes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEdge {
    pub source: NodeId,
    pub target: NodeId,
    #[serde(default)]
    pub attributes: Attributes,
}

/// Internal representation of centrality scores
#[derive(Debug, Clone, Default)]
pub struct CentralityScores {
    pub scores: HashMap<NodeId, f64>,
    pub nodes_processed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_node_record_name_wins() {
        let mut attributes = Attributes::new();
        attributes.insert("name".to_string(), json!("shadow"));
        attributes.insert("color".to_string(), json!("red"));

        let record = NodeRecord::new("7".to_string(), attributes);
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value, json!({"name": "7", "color": "red"}));
    }

    #[test]
    fn test_link_record_keeps_identifier_types() {
        let mut attributes = Attributes::new();
        attributes.insert("source".to_string(), json!("bogus"));
        attributes.insert("weight".to_string(), json!(2.5));

        let record = LinkRecord::new(NodeId::Int(1), NodeId::from("b"), attributes);
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value, json!({"source": 1, "target": "b", "weight": 2.5}));
    }

    #[test]
    fn test_read_options_node_ids() {
        let strings = ReadOptions::default();
        assert_eq!(strings.node_id("12").unwrap(), NodeId::from("12"));

        let ints = ReadOptions {
            node_type: NodeIdKind::Int,
        };
        assert_eq!(ints.node_id("12").unwrap(), NodeId::Int(12));
        assert!(ints.node_id("twelve").is_err());

        let inferred = ReadOptions {
            node_type: NodeIdKind::Infer,
        };
        assert_eq!(inferred.node_id("-3").unwrap(), NodeId::Int(-3));
        assert_eq!(inferred.node_id("n3").unwrap(), NodeId::from("n3"));
    }
}
