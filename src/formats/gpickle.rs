use crate::error::Result;
use crate::graph::Graph;
use crate::models::GraphSnapshot;
use serde_pickle::{DeOptions, SerOptions};
use std::io::Write;

pub fn read(bytes: &[u8]) -> Result<Graph> {
    let snapshot: GraphSnapshot = serde_pickle::from_slice(bytes, DeOptions::new())?;
    Ok(Graph::from_snapshot(snapshot))
}

pub fn write<W: Write>(graph: &Graph, writer: &mut W) -> Result<()> {
    serde_pickle::to_writer(writer, &graph.to_snapshot(), SerOptions::new())?;
    Ok(())
}
