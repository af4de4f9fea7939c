use crate::error::{NodeLinkError, Result};
use crate::graph::Graph;
use crate::models::{Attributes, NodeId};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashSet;
use tracing::{debug, info};

/// Node count of the synthetic graph produced when no input is given
pub const DEFAULT_NODES: usize = 100;
/// Edges attached per new node
pub const DEFAULT_NEAREST_NEIGHBORS: usize = 8;
/// Probability of closing a triangle after each random attachment
pub const DEFAULT_TRIANGLE_PROBABILITY: f64 = 0.1;

/// Holme–Kim growing graph with power-law degrees and tunable clustering.
///
/// Starts from `m` isolated nodes; every new node attaches to `m` distinct
/// existing nodes chosen proportionally to degree, and after each
/// attachment closes a triangle with probability `p` instead of making the
/// next preferential pick.
pub fn powerlaw_cluster_graph<R: Rng + ?Sized>(
    n: usize,
    m: usize,
    p: f64,
    rng: &mut R,
) -> Result<Graph> {
    if m < 1 || n < m {
        return Err(NodeLinkError::invalid_parameter(format!(
            "powerlaw_cluster_graph needs 1 <= m <= n, got m={}, n={}",
            m, n
        )));
    }
    if !(0.0..=1.0).contains(&p) {
        return Err(NodeLinkError::invalid_parameter(format!(
            "Triangle probability must be in [0, 1], got {}",
            p
        )));
    }

    info!(
        "Generating powerlaw cluster graph with n={}, m={}, p={}",
        n, m, p
    );

    let mut graph = Graph::undirected();
    for node in 0..m {
        graph.add_node(node_id(node), Attributes::new());
    }

    // Each node appears once per incident edge, so sampling is degree-weighted
    let mut repeated_nodes: Vec<usize> = (0..m).collect();

    for source in m..n {
        let mut possible_targets = random_subset(&repeated_nodes, m, rng);
        let Some(mut target) = possible_targets.pop() else {
            break;
        };
        add_edge(&mut graph, source, target);
        repeated_nodes.push(target);

        let mut count = 1;
        while count < m {
            if rng.gen::<f64>() < p {
                let neighborhood: Vec<usize> = neighbors(&graph, target)
                    .into_iter()
                    .filter(|&nbr| nbr != source && !graph.has_edge(&node_id(source), &node_id(nbr)))
                    .collect();
                if let Some(&nbr) = neighborhood.choose(rng) {
                    add_edge(&mut graph, source, nbr);
                    repeated_nodes.push(nbr);
                    count += 1;
                    continue;
                }
            }
            match possible_targets.pop() {
                Some(next) => target = next,
                None => break,
            }
            add_edge(&mut graph, source, target);
            repeated_nodes.push(target);
            count += 1;
        }

        repeated_nodes.extend(std::iter::repeat(source).take(m));
    }

    debug!(
        "Generated graph with {} nodes and {} edges",
        graph.node_count(),
        graph.edge_count()
    );

    Ok(graph)
}

/// The synthetic graph used when the pipeline has no input file
pub fn default_synthetic_graph<R: Rng + ?Sized>(rng: &mut R) -> Result<Graph> {
    powerlaw_cluster_graph(
        DEFAULT_NODES,
        DEFAULT_NEAREST_NEIGHBORS,
        DEFAULT_TRIANGLE_PROBABILITY,
        rng,
    )
}

fn node_id(node: usize) -> NodeId {
    NodeId::Int(node as i64)
}

fn add_edge(graph: &mut Graph, u: usize, v: usize) {
    graph.add_edge(node_id(u), node_id(v), Attributes::new());
}

fn neighbors(graph: &Graph, node: usize) -> Vec<usize> {
    let Some(ix) = graph.node_index(&node_id(node)) else {
        return Vec::new();
    };
    graph
        .adjacency(ix)
        .into_iter()
        .filter_map(|entry| match graph.node(entry.neighbor).id {
            NodeId::Int(i) => Some(i as usize),
            NodeId::Str(_) => None,
        })
        .collect()
}

/// Draw `m` distinct elements from `seq`, with repetition in `seq` acting as weight
fn random_subset<R: Rng + ?Sized>(seq: &[usize], m: usize, rng: &mut R) -> Vec<usize> {
    let mut targets = HashSet::new();
    let mut ordered = Vec::with_capacity(m);
    while targets.len() < m {
        match seq.choose(rng) {
            Some(&x) => {
                if targets.insert(x) {
                    ordered.push(x);
                }
            }
            None => break,
        }
    }
    ordered
}
