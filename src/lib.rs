/*!
# Graphiti Node-Link Converter

Turns graph files into the node-link JSON consumed by force-directed
visualizations.

This library provides:
- Readers and writers for DOT, GEXF, GML, gpickle, GraphML, Pajek and YAML graphs
- A synthetic powerlaw-cluster graph when no input file is given
- PageRank, eigenvector and betweenness centrality annotators
- Conversion into a `{"nodes": [...], "links": [...]}` document
*/

pub mod algorithms;
pub mod config;
pub mod converter;
pub mod error;
pub mod formats;
pub mod generators;
pub mod graph;
pub mod models;
pub mod pipeline;

pub use algorithms::{annotate, centrality, Centrality};
pub use config::{Cli, Config};
pub use converter::{convert_network, LinkPolicy};
pub use error::{NodeLinkError, Result};
pub use formats::{infer_format, read_graph, write_graph, GraphFormat};
pub use graph::Graph;
pub use models::*;
pub use pipeline::{build_document, run};
