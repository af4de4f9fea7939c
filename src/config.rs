use crate::algorithms::Centrality;
use crate::converter::LinkPolicy;
use crate::formats::GraphFormat;
use crate::models::{NodeIdKind, ReadOptions};
use clap::Parser;
use std::path::PathBuf;

/// Convert a graph file into node-link JSON
#[derive(Debug, Parser)]
#[command(name = "graphiti-nodelink", version, about)]
pub struct Cli {
    /// Graph file to read; a synthetic graph is generated when omitted
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Format of the input file, overriding the file extension
    #[arg(long, value_enum)]
    pub format: Option<GraphFormat>,

    /// Write the document here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Annotate nodes with PageRank
    #[arg(long)]
    pub page_rank: bool,

    /// Annotate nodes with eigenvector centrality
    #[arg(long)]
    pub eigenvector: bool,

    /// Annotate nodes with betweenness centrality
    #[arg(long)]
    pub betweenness: bool,

    /// How undirected edges become links
    #[arg(long, value_enum, default_value_t = LinkPolicy::Unique)]
    pub links: LinkPolicy,

    /// How node identifiers in text formats are typed
    #[arg(long, value_enum, default_value_t = NodeIdKind::Str)]
    pub node_type: NodeIdKind,

    /// Pretty-print the JSON document
    #[arg(long)]
    pub pretty: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub input: Option<PathBuf>,
    pub format: Option<GraphFormat>,
    pub output: Option<PathBuf>,
    pub page_rank: bool,
    pub eigenvector: bool,
    pub betweenness: bool,
    pub links: LinkPolicy,
    pub read_options: ReadOptions,
    pub pretty: bool,
}

impl Config {
    /// Annotators to run, in the order they are applied
    pub fn centralities(&self) -> Vec<Centrality> {
        Centrality::ALL
            .into_iter()
            .filter(|kind| match kind {
                Centrality::PageRank => self.page_rank,
                Centrality::Eigenvector => self.eigenvector,
                Centrality::Betweenness => self.betweenness,
            })
            .collect()
    }
}

impl From<Cli> for Config {
    fn from(cli: Cli) -> Self {
        Config {
            input: cli.input,
            format: cli.format,
            output: cli.output,
            page_rank: cli.page_rank,
            eigenvector: cli.eigenvector,
            betweenness: cli.betweenness,
            links: cli.links,
            read_options: ReadOptions {
                node_type: cli.node_type,
            },
            pretty: cli.pretty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["graphiti-nodelink"]);
        let config = Config::from(cli);

        assert!(config.input.is_none());
        assert!(config.output.is_none());
        assert!(config.centralities().is_empty());
        assert_eq!(config.links, LinkPolicy::Unique);
        assert_eq!(config.read_options.node_type, NodeIdKind::Str);
        assert!(!config.pretty);
    }

    #[test]
    fn test_all_flags() {
        let cli = Cli::parse_from([
            "graphiti-nodelink",
            "--input",
            "graph.gml",
            "-o",
            "out.json",
            "--betweenness",
            "--page-rank",
            "--eigenvector",
            "--format",
            "gml",
            "--links",
            "per-adjacency",
            "--node-type",
            "infer",
            "--pretty",
        ]);
        let config = Config::from(cli);

        assert_eq!(config.input, Some(PathBuf::from("graph.gml")));
        assert_eq!(config.output, Some(PathBuf::from("out.json")));
        assert_eq!(config.format, Some(GraphFormat::Gml));
        assert_eq!(config.links, LinkPolicy::PerAdjacency);
        assert_eq!(config.read_options.node_type, NodeIdKind::Infer);
        assert!(config.pretty);
        // applied in a fixed order regardless of flag order
        assert_eq!(
            config.centralities(),
            vec![Centrality::PageRank, Centrality::Eigenvector, Centrality::Betweenness]
        );
    }

    #[test]
    fn test_unknown_format_tag_rejected() {
        assert!(Cli::try_parse_from(["graphiti-nodelink", "--format", "json"]).is_err());
    }
}
