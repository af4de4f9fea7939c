//! Load, annotate, convert and write: the whole run behind the CLI.

use crate::algorithms::annotate;
use crate::config::Config;
use crate::converter::convert_network;
use crate::error::Result;
use crate::formats::read_graph;
use crate::generators::default_synthetic_graph;
use crate::graph::Graph;
use crate::models::NodeLinkDocument;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::time::Instant;
use tracing::info;

/// Read the input graph, or generate one when no input is configured
pub fn load_graph(config: &Config) -> Result<Graph> {
    match &config.input {
        Some(path) => read_graph(path, config.format, &config.read_options),
        None => {
            info!("No input given, generating a synthetic powerlaw-cluster graph");
            default_synthetic_graph(&mut rand::thread_rng())
        }
    }
}

/// Load the graph, run the enabled annotators in order and convert
pub fn build_document(config: &Config) -> Result<NodeLinkDocument> {
    let mut graph = load_graph(config)?;

    for kind in config.centralities() {
        let start = Instant::now();
        annotate(&mut graph, kind)?;
        info!("{} finished in {:?}", kind, start.elapsed());
    }

    Ok(convert_network(&graph, config.links))
}

/// Serialize `document` as a single JSON value with no trailing newline
pub fn write_document<W: Write>(document: &NodeLinkDocument, writer: &mut W, pretty: bool) -> Result<()> {
    if pretty {
        serde_json::to_writer_pretty(&mut *writer, document)?;
    } else {
        serde_json::to_writer(&mut *writer, document)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn run(config: &Config) -> Result<()> {
    let document = build_document(config)?;

    match &config.output {
        Some(path) => {
            let mut writer = BufWriter::new(File::create(path)?);
            write_document(&document, &mut writer, config.pretty)?;
            info!(
                "Wrote {} nodes and {} links to {}",
                document.nodes.len(),
                document.links.len(),
                path.display()
            );
        }
        None => {
            let stdout = io::stdout();
            let mut writer = stdout.lock();
            write_document(&document, &mut writer, config.pretty)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::Centrality;

    #[test]
    fn test_synthetic_document_shape() {
        let document = build_document(&Config::default()).unwrap();
        assert_eq!(document.nodes.len(), 100);
        assert!(!document.links.is_empty());
        assert!(document.nodes.iter().all(|node| !node.attributes.contains_key("pagerank")));
    }

    #[test]
    fn test_annotators_run_in_order() {
        let config = Config {
            page_rank: true,
            betweenness: true,
            ..Config::default()
        };
        let document = build_document(&config).unwrap();
        for node in &document.nodes {
            assert!(node.attributes.contains_key(Centrality::PageRank.attribute()));
            assert!(node.attributes.contains_key(Centrality::Betweenness.attribute()));
            assert!(!node.attributes.contains_key(Centrality::Eigenvector.attribute()));
        }
    }

    #[test]
    fn test_compact_output_has_no_trailing_newline() {
        let document = NodeLinkDocument::default();
        let mut out = Vec::new();
        write_document(&document, &mut out, false).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), r#"{"nodes":[],"links":[]}"#);
    }
}
