use crate::error::{NodeLinkError, Result};
use crate::models::{Attributes, GraphSnapshot, NodeId, SnapshotEdge, SnapshotNode};
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction::{Incoming, Outgoing};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct NodeData {
    pub id: NodeId,
    pub attributes: Attributes,
}

#[derive(Debug, Clone, Default)]
pub struct EdgeData {
    pub attributes: Attributes,
}

/// One entry of a node's adjacency: the neighbor and the connecting edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Adjacent {
    pub neighbor: NodeIndex,
    pub edge: EdgeIndex,
}

/// Attributed graph, directed or undirected, optionally with parallel edges.
///
/// Edges are always stored in petgraph with the orientation they were added
/// in; undirectedness is applied when walking adjacency. Nodes and edges
/// iterate in insertion order.
#[derive(Debug, Clone)]
pub struct Graph {
    inner: DiGraph<NodeData, EdgeData>,
    index: HashMap<NodeId, NodeIndex>,
    directed: bool,
    multigraph: bool,
    attributes: Attributes,
}

impl Graph {
    pub fn new(directed: bool, multigraph: bool) -> Self {
        Self {
            inner: DiGraph::new(),
            index: HashMap::new(),
            directed,
            multigraph,
            attributes: Attributes::new(),
        }
    }

    pub fn undirected() -> Self {
        Self::new(false, false)
    }

    pub fn directed() -> Self {
        Self::new(true, false)
    }

    pub fn is_directed(&self) -> bool {
        self.directed
    }

    pub fn is_multigraph(&self) -> bool {
        self.multigraph
    }

    /// Allow parallel edges from now on
    pub fn set_multigraph(&mut self, multigraph: bool) {
        self.multigraph = multigraph;
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut Attributes {
        &mut self.attributes
    }

    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    /// Add a node, or merge `attributes` into it if it already exists
    pub fn add_node(&mut self, id: NodeId, attributes: Attributes) -> NodeIndex {
        if let Some(&ix) = self.index.get(&id) {
            self.inner[ix].attributes.extend(attributes);
            return ix;
        }
        let ix = self.inner.add_node(NodeData {
            id: id.clone(),
            attributes,
        });
        self.index.insert(id, ix);
        ix
    }

    fn ensure_node(&mut self, id: NodeId) -> NodeIndex {
        self.add_node(id, Attributes::new())
    }

    /// Add an edge, creating missing endpoints.
    ///
    /// In a simple graph an existing edge between the endpoints absorbs the
    /// new attributes instead of gaining a sibling.
    pub fn add_edge(&mut self, source: NodeId, target: NodeId, attributes: Attributes) -> EdgeIndex {
        let u = self.ensure_node(source);
        let v = self.ensure_node(target);

        if !self.multigraph {
            if let Some(e) = self.find_edge(u, v) {
                self.inner[e].attributes.extend(attributes);
                return e;
            }
        }
        self.inner.add_edge(u, v, EdgeData { attributes })
    }

    /// Edge between `u` and `v`, honoring undirectedness
    pub fn find_edge(&self, u: NodeIndex, v: NodeIndex) -> Option<EdgeIndex> {
        self.inner.find_edge(u, v).or_else(|| {
            if self.directed {
                None
            } else {
                self.inner.find_edge(v, u)
            }
        })
    }

    pub fn has_edge(&self, source: &NodeId, target: &NodeId) -> bool {
        match (self.node_index(source), self.node_index(target)) {
            (Some(u), Some(v)) => self.find_edge(u, v).is_some(),
            _ => false,
        }
    }

    pub fn node_index(&self, id: &NodeId) -> Option<NodeIndex> {
        self.index.get(id).copied()
    }

    pub fn contains_node(&self, id: &NodeId) -> bool {
        self.index.contains_key(id)
    }

    pub fn node_indices(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.inner.node_indices()
    }

    pub fn edge_indices(&self) -> impl Iterator<Item = EdgeIndex> + '_ {
        self.inner.edge_indices()
    }

    pub fn node(&self, ix: NodeIndex) -> &NodeData {
        &self.inner[ix]
    }

    pub fn edge(&self, e: EdgeIndex) -> &EdgeData {
        &self.inner[e]
    }

    /// Stored (source, target) of an edge
    pub fn endpoints(&self, e: EdgeIndex) -> (NodeIndex, NodeIndex) {
        let edge = &self.inner.raw_edges()[e.index()];
        (edge.source(), edge.target())
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeData> + '_ {
        self.inner.node_indices().map(move |ix| &self.inner[ix])
    }

    /// Iterate `(source id, target id, attributes)` in insertion order
    pub fn edges(&self) -> impl Iterator<Item = (&NodeId, &NodeId, &Attributes)> + '_ {
        self.inner.edge_indices().map(move |e| {
            let (u, v) = self.endpoints(e);
            (&self.inner[u].id, &self.inner[v].id, &self.inner[e].attributes)
        })
    }

    /// Set one attribute on an existing node
    pub fn set_node_attribute(
        &mut self,
        id: &NodeId,
        key: &str,
        value: serde_json::Value,
    ) -> Result<()> {
        let ix = self
            .node_index(id)
            .ok_or_else(|| NodeLinkError::NodeNotFound(id.to_string()))?;
        self.inner[ix].attributes.insert(key.to_string(), value);
        Ok(())
    }

    /// Neighbors of `ix` with the connecting edges, in edge insertion order.
    ///
    /// Directed graphs yield successors. Undirected graphs yield every
    /// incident edge; a self-loop is reported once.
    pub fn adjacency(&self, ix: NodeIndex) -> Vec<Adjacent> {
        let mut entries: Vec<Adjacent> = self
            .inner
            .edges_directed(ix, Outgoing)
            .map(|edge| Adjacent {
                neighbor: edge.target(),
                edge: edge.id(),
            })
            .collect();

        if !self.directed {
            entries.extend(
                self.inner
                    .edges_directed(ix, Incoming)
                    .filter(|edge| edge.source() != ix)
                    .map(|edge| Adjacent {
                        neighbor: edge.source(),
                        edge: edge.id(),
                    }),
            );
        }

        entries.sort_by_key(|entry| entry.edge.index());
        entries
    }

    pub fn to_snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            directed: self.directed,
            multigraph: self.multigraph,
            graph: self.attributes.clone(),
            nodes: self
                .nodes()
                .map(|node| SnapshotNode {
                    id: node.id.clone(),
                    attributes: node.attributes.clone(),
                })
                .collect(),
            edges: self
                .edges()
                .map(|(source, target, attributes)| SnapshotEdge {
                    source: source.clone(),
                    target: target.clone(),
                    attributes: attributes.clone(),
                })
                .collect(),
        }
    }

    pub fn from_snapshot(snapshot: GraphSnapshot) -> Self {
        let mut graph = Graph::new(snapshot.directed, snapshot.multigraph);
        graph.attributes = snapshot.graph;
        for node in snapshot.nodes {
            graph.add_node(node.id, node.attributes);
        }
        for edge in snapshot.edges {
            graph.add_edge(edge.source, edge.target, edge.attributes);
        }
        graph
    }
}
