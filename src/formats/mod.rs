//! Graph file formats and the loader that dispatches between them.
//!
//! Every format has a reader producing a [`Graph`] and a writer accepting
//! one, so any graph can be saved in one format and loaded back.

use crate::error::{NodeLinkError, Result};
use crate::graph::Graph;
use crate::models::ReadOptions;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

pub mod dot;
pub mod gexf;
pub mod gml;
pub mod gpickle;
pub mod graphml;
pub mod pajek;
pub mod yaml;

mod xml;

/// Deepest list or subgraph nesting the text readers accept
pub(crate) const MAX_NESTING: usize = 128;

/// Recognized serialization dialects, named by their file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum GraphFormat {
    Dot,
    Gexf,
    Gml,
    Gpickle,
    Graphml,
    Pajek,
    Yaml,
}

impl GraphFormat {
    pub const ALL: [GraphFormat; 7] = [
        GraphFormat::Dot,
        GraphFormat::Gexf,
        GraphFormat::Gml,
        GraphFormat::Gpickle,
        GraphFormat::Graphml,
        GraphFormat::Pajek,
        GraphFormat::Yaml,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            GraphFormat::Dot => "dot",
            GraphFormat::Gexf => "gexf",
            GraphFormat::Gml => "gml",
            GraphFormat::Gpickle => "gpickle",
            GraphFormat::Graphml => "graphml",
            GraphFormat::Pajek => "pajek",
            GraphFormat::Yaml => "yaml",
        }
    }
}

impl fmt::Display for GraphFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for GraphFormat {
    type Err = NodeLinkError;

    fn from_str(s: &str) -> Result<Self> {
        GraphFormat::ALL
            .into_iter()
            .find(|format| format.tag() == s)
            .ok_or_else(|| NodeLinkError::UnknownFormatTag(s.to_string()))
    }
}

/// Pick the format from the file extension alone; nothing is read
pub fn infer_format(path: &Path) -> Result<GraphFormat> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(|ext| ext.parse().ok())
        .ok_or_else(|| NodeLinkError::UnrecognizedFormat {
            path: path.to_path_buf(),
        })
}

/// Load a graph from `path`, inferring the format unless one is given
pub fn read_graph(path: &Path, format: Option<GraphFormat>, options: &ReadOptions) -> Result<Graph> {
    let format = match format {
        Some(format) => format,
        None => infer_format(path)?,
    };

    info!("Reading {} graph from {}", format, path.display());
    let bytes = fs::read(path)?;
    let graph = parse_graph(&bytes, format, options)?;

    info!(
        "Loaded graph with {} nodes and {} edges (directed: {}, multigraph: {})",
        graph.node_count(),
        graph.edge_count(),
        graph.is_directed(),
        graph.is_multigraph()
    );
    Ok(graph)
}

/// Parse an in-memory serialized graph
pub fn parse_graph(bytes: &[u8], format: GraphFormat, options: &ReadOptions) -> Result<Graph> {
    debug!("Parsing {} bytes as {}", bytes.len(), format);
    match format {
        GraphFormat::Dot => dot::read(utf8(bytes, format)?, options),
        GraphFormat::Gexf => gexf::read(utf8(bytes, format)?, options),
        GraphFormat::Gml => gml::read(utf8(bytes, format)?, options),
        GraphFormat::Gpickle => gpickle::read(bytes),
        GraphFormat::Graphml => graphml::read(utf8(bytes, format)?, options),
        GraphFormat::Pajek => pajek::read(utf8(bytes, format)?, options),
        GraphFormat::Yaml => yaml::read(bytes),
    }
}

fn utf8(bytes: &[u8], format: GraphFormat) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|e| {
        NodeLinkError::syntax(format.tag(), 1, format!("input is not UTF-8: {}", e))
    })
}

/// Serialize `graph` into `writer` using `format`
pub fn write_graph<W: Write>(graph: &Graph, writer: &mut W, format: GraphFormat) -> Result<()> {
    debug!(
        "Writing graph with {} nodes and {} edges as {}",
        graph.node_count(),
        graph.edge_count(),
        format
    );
    match format {
        GraphFormat::Dot => dot::write(graph, writer),
        GraphFormat::Gexf => gexf::write(graph, writer),
        GraphFormat::Gml => gml::write(graph, writer),
        GraphFormat::Gpickle => gpickle::write(graph, writer),
        GraphFormat::Graphml => graphml::write(graph, writer),
        GraphFormat::Pajek => pajek::write(graph, writer),
        GraphFormat::Yaml => yaml::write(graph, writer),
    }
}

/// Text form of an attribute value for formats whose attributes are strings
pub(crate) fn value_to_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::path::PathBuf;

    #[test]
    fn test_infer_every_tag() {
        for format in GraphFormat::ALL {
            let path = PathBuf::from(format!("networks/sample.{}", format.tag()));
            assert_eq!(infer_format(&path).unwrap(), format);
        }
    }

    #[test]
    fn test_infer_rejects_unknown_extension() {
        let err = infer_format(Path::new("graph.xyz")).unwrap_err();
        assert!(matches!(err, NodeLinkError::UnrecognizedFormat { .. }));
        assert!(err.to_string().contains("graph.xyz"));
    }

    #[test]
    fn test_infer_rejects_missing_extension() {
        assert!(infer_format(Path::new("graph")).is_err());
        assert!(infer_format(Path::new(".gml")).is_err());
    }

    #[test]
    fn test_infer_is_case_sensitive() {
        assert!(infer_format(Path::new("graph.GML")).is_err());
    }

    #[test]
    fn test_unknown_extension_fails_before_reading() {
        // the file does not exist, so reaching the filesystem would be an Io error
        let err = read_graph(Path::new("/nonexistent/graph.xyz"), None, &ReadOptions::default())
            .unwrap_err();
        assert!(matches!(err, NodeLinkError::UnrecognizedFormat { .. }));
    }

    #[test]
    fn test_explicit_format_bypasses_inference() {
        let err = read_graph(
            Path::new("/nonexistent/graph.xyz"),
            Some(GraphFormat::Gml),
            &ReadOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, NodeLinkError::Io(_)));
    }

    #[test]
    fn test_tag_parse() {
        assert_eq!("graphml".parse::<GraphFormat>().unwrap(), GraphFormat::Graphml);
        assert!("json".parse::<GraphFormat>().is_err());
    }

    proptest! {
        #[test]
        fn prop_inference_is_pure(stem in "[a-z_]{1,12}", index in 0usize..7) {
            let format = GraphFormat::ALL[index];
            let path = PathBuf::from(format!("{}.{}", stem, format.tag()));
            let first = infer_format(&path).unwrap();
            let second = infer_format(&path).unwrap();
            prop_assert_eq!(first, second);
            prop_assert_eq!(first, format);
        }

        #[test]
        fn prop_unknown_extensions_rejected(stem in "[a-z]{1,8}", ext in "[a-z]{1,6}") {
            prop_assume!(ext.parse::<GraphFormat>().is_err());
            let path = PathBuf::from(format!("{}.{}", stem, ext));
            prop_assert!(infer_format(&path).is_err());
        }
    }
}
