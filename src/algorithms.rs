use crate::error::{NodeLinkError, Result};
use crate::graph::Graph;
use crate::models::CentralityScores;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::Instant;
use tracing::{debug, info};

pub const DEFAULT_DAMPING_FACTOR: f64 = 0.85;
pub const DEFAULT_MAX_ITERATIONS: u32 = 100;
pub const DEFAULT_TOLERANCE: f64 = 1e-6;

/// Per-node centrality measures the annotator can attach
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Centrality {
    PageRank,
    Eigenvector,
    Betweenness,
}

impl Centrality {
    pub const ALL: [Centrality; 3] = [
        Centrality::PageRank,
        Centrality::Eigenvector,
        Centrality::Betweenness,
    ];

    /// Node attribute the score is stored under
    pub fn attribute(self) -> &'static str {
        match self {
            Centrality::PageRank => "pagerank",
            Centrality::Eigenvector => "eigenvector_centrality",
            Centrality::Betweenness => "betweenness",
        }
    }
}

impl fmt::Display for Centrality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Centrality::PageRank => "PageRank",
            Centrality::Eigenvector => "eigenvector centrality",
            Centrality::Betweenness => "betweenness centrality",
        };
        f.write_str(name)
    }
}

/// Compute one centrality measure for every node of `graph`
pub fn centrality(graph: &Graph, kind: Centrality) -> Result<CentralityScores> {
    match kind {
        Centrality::PageRank => calculate_pagerank(
            graph,
            DEFAULT_DAMPING_FACTOR,
            DEFAULT_MAX_ITERATIONS,
            DEFAULT_TOLERANCE,
        ),
        Centrality::Eigenvector => {
            calculate_eigenvector_centrality(graph, DEFAULT_MAX_ITERATIONS, DEFAULT_TOLERANCE)
        }
        Centrality::Betweenness => calculate_betweenness_centrality(graph),
    }
}

/// Compute `kind` and store each node's score under its attribute name.
///
/// Returns the number of nodes written.
pub fn annotate(graph: &mut Graph, kind: Centrality) -> Result<usize> {
    let result = centrality(graph, kind)?;
    let attribute = kind.attribute();

    for (node, score) in &result.scores {
        graph.set_node_attribute(node, attribute, serde_json::Value::from(*score))?;
    }

    info!(
        "Annotated {} nodes with '{}'",
        result.scores.len(),
        attribute
    );
    Ok(result.scores.len())
}

fn into_scores(graph: &Graph, values: Vec<f64>) -> CentralityScores {
    let scores: HashMap<_, _> = graph
        .node_indices()
        .map(|ix| (graph.node(ix).id.clone(), values[ix.index()]))
        .collect();
    CentralityScores {
        nodes_processed: scores.len(),
        scores,
    }
}

/// Numeric `weight` of an edge, 1 when absent or not a number
fn edge_weight(graph: &Graph, edge: petgraph::graph::EdgeIndex) -> f64 {
    graph
        .edge(edge)
        .attributes
        .get("weight")
        .and_then(|w| w.as_f64())
        .unwrap_or(1.0)
}

/// PageRank by power iteration.
///
/// Undirected edges contribute in both directions. Rank held by nodes
/// without outgoing weight is redistributed uniformly, so scores sum to 1.
pub fn calculate_pagerank(
    graph: &Graph,
    damping_factor: f64,
    max_iterations: u32,
    tolerance: f64,
) -> Result<CentralityScores> {
    let start = Instant::now();
    info!(
        "Starting PageRank calculation with damping_factor={}, iterations={}",
        damping_factor, max_iterations
    );

    if !(0.0..=1.0).contains(&damping_factor) {
        return Err(NodeLinkError::invalid_parameter(format!(
            "Damping factor must be in [0, 1], got {}",
            damping_factor
        )));
    }

    let node_count = graph.node_count();
    if node_count == 0 {
        return Ok(CentralityScores::default());
    }

    // Row-stochastic transition weights
    let mut out_links: Vec<Vec<(usize, f64)>> = vec![Vec::new(); node_count];
    for ix in graph.node_indices() {
        let links = &mut out_links[ix.index()];
        for entry in graph.adjacency(ix) {
            links.push((entry.neighbor.index(), edge_weight(graph, entry.edge)));
        }
        let total: f64 = links.iter().map(|(_, w)| w).sum();
        if total > 0.0 {
            for (_, w) in links.iter_mut() {
                *w /= total;
            }
        } else {
            links.clear();
        }
    }

    let uniform = 1.0 / node_count as f64;
    let mut scores = vec![uniform; node_count];

    for iteration in 0..max_iterations {
        let previous = scores.clone();
        let dangling_sum: f64 = damping_factor
            * out_links
                .iter()
                .zip(&previous)
                .filter(|(links, _)| links.is_empty())
                .map(|(_, score)| score)
                .sum::<f64>();

        scores.iter_mut().for_each(|s| *s = 0.0);
        for (node, links) in out_links.iter().enumerate() {
            for &(target, weight) in links {
                scores[target] += damping_factor * previous[node] * weight;
            }
        }
        for score in scores.iter_mut() {
            *score += dangling_sum * uniform + (1.0 - damping_factor) * uniform;
        }

        let total_diff: f64 = scores
            .iter()
            .zip(&previous)
            .map(|(new, old)| (new - old).abs())
            .sum();
        debug!("Iteration {}: total difference = {:.8}", iteration + 1, total_diff);

        if total_diff < node_count as f64 * tolerance {
            info!(
                "PageRank converged after {} iterations in {:?} for {} nodes",
                iteration + 1,
                start.elapsed(),
                node_count
            );
            return Ok(into_scores(graph, scores));
        }
    }

    Err(NodeLinkError::algorithm_failed(format!(
        "PageRank failed to converge in {} iterations",
        max_iterations
    )))
}

/// Eigenvector centrality by shifted power iteration.
///
/// A node's score is the sum of the scores of the nodes pointing at it
/// (every neighbor, for undirected graphs), normalized to unit L2 norm.
pub fn calculate_eigenvector_centrality(
    graph: &Graph,
    max_iterations: u32,
    tolerance: f64,
) -> Result<CentralityScores> {
    let start = Instant::now();
    info!("Starting eigenvector centrality calculation");

    let node_count = graph.node_count();
    if node_count == 0 {
        return Ok(CentralityScores::default());
    }

    // parallel edges count a neighbor once
    let adjacency: Vec<Vec<usize>> = graph
        .node_indices()
        .map(|ix| {
            let mut neighbors: Vec<usize> = graph
                .adjacency(ix)
                .into_iter()
                .map(|entry| entry.neighbor.index())
                .collect();
            neighbors.sort_unstable();
            neighbors.dedup();
            neighbors
        })
        .collect();

    let initial_value = 1.0 / node_count as f64;
    let mut scores = vec![initial_value; node_count];

    for iteration in 0..max_iterations {
        let previous = scores.clone();

        // Start from x itself so bipartite graphs do not oscillate
        for (node, neighbors) in adjacency.iter().enumerate() {
            for &neighbor in neighbors {
                scores[neighbor] += previous[node];
            }
        }

        let norm = scores.iter().map(|s| s * s).sum::<f64>().sqrt();
        if norm > 0.0 {
            for score in scores.iter_mut() {
                *score /= norm;
            }
        }

        let total_diff: f64 = scores
            .iter()
            .zip(&previous)
            .map(|(new, old)| (new - old).abs())
            .sum();
        debug!("Iteration {}: total difference = {:.8}", iteration + 1, total_diff);

        if total_diff < node_count as f64 * tolerance {
            info!(
                "Eigenvector centrality converged after {} iterations in {:?} for {} nodes",
                iteration + 1,
                start.elapsed(),
                node_count
            );
            return Ok(into_scores(graph, scores));
        }
    }

    Err(NodeLinkError::algorithm_failed(format!(
        "Eigenvector centrality failed to converge in {} iterations",
        max_iterations
    )))
}

/// Exact betweenness centrality (Brandes), unweighted, endpoints excluded.
///
/// Scores are normalized by 1/((n-1)(n-2)) when the graph has more than two
/// nodes.
pub fn calculate_betweenness_centrality(graph: &Graph) -> Result<CentralityScores> {
    let start = Instant::now();
    info!("Starting betweenness centrality calculation");

    let node_count = graph.node_count();
    let adjacency: Vec<Vec<usize>> = graph
        .node_indices()
        .map(|ix| {
            let mut neighbors: Vec<usize> = graph
                .adjacency(ix)
                .into_iter()
                .map(|entry| entry.neighbor.index())
                .filter(|&n| n != ix.index())
                .collect();
            // parallel edges do not add shortest paths
            neighbors.sort_unstable();
            neighbors.dedup();
            neighbors
        })
        .collect();

    let mut betweenness = vec![0.0; node_count];

    for source in 0..node_count {
        let mut stack = Vec::with_capacity(node_count);
        let mut predecessors: Vec<Vec<usize>> = vec![Vec::new(); node_count];
        let mut sigma = vec![0.0_f64; node_count];
        let mut distance: Vec<Option<usize>> = vec![None; node_count];

        sigma[source] = 1.0;
        distance[source] = Some(0);
        let mut queue = VecDeque::from([source]);

        while let Some(v) = queue.pop_front() {
            stack.push(v);
            let Some(dist_v) = distance[v] else { continue };
            for &w in &adjacency[v] {
                if distance[w].is_none() {
                    distance[w] = Some(dist_v + 1);
                    queue.push_back(w);
                }
                if distance[w] == Some(dist_v + 1) {
                    sigma[w] += sigma[v];
                    predecessors[w].push(v);
                }
            }
        }

        let mut delta = vec![0.0_f64; node_count];
        while let Some(w) = stack.pop() {
            for &v in &predecessors[w] {
                delta[v] += sigma[v] / sigma[w] * (1.0 + delta[w]);
            }
            if w != source {
                betweenness[w] += delta[w];
            }
        }
    }

    if node_count > 2 {
        let scale = 1.0 / ((node_count - 1) * (node_count - 2)) as f64;
        for score in betweenness.iter_mut() {
            *score *= scale;
        }
    }

    info!(
        "Betweenness centrality calculation completed in {:?} for {} nodes",
        start.elapsed(),
        node_count
    );

    Ok(into_scores(graph, betweenness))
}
