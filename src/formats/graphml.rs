use super::xml::{element_attributes, format_value, xml_error, KeyTable, ValueType};
use crate::error::Result;
use crate::graph::Graph;
use crate::models::{Attributes, NodeId, ReadOptions};
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::Value;
use std::collections::HashMap;
use std::io::Write;
use tracing::{debug, warn};

const FORMAT: &str = "graphml";
const NAMESPACE: &str = "http://graphml.graphdrawing.org/xmlns";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Domain {
    Graph,
    Node,
    Edge,
    All,
}

impl Domain {
    fn from_name(name: &str) -> Self {
        match name {
            "graph" => Domain::Graph,
            "node" => Domain::Node,
            "edge" => Domain::Edge,
            _ => Domain::All,
        }
    }

    fn applies_to(self, other: Domain) -> bool {
        self == Domain::All || self == other
    }
}

#[derive(Debug, Clone)]
struct KeyDeclaration {
    name: String,
    ty: ValueType,
    domain: Domain,
    default: Option<Value>,
}

/// Open element whose closing tag still has work to do
enum Frame {
    Key(String),
    Default(String),
    Graph,
    Node(NodeId, Attributes),
    Edge(NodeId, NodeId, Attributes),
    Data(String),
    Other,
}

struct GraphmlReader<'a> {
    text: &'a str,
    options: &'a ReadOptions,
    keys: HashMap<String, KeyDeclaration>,
    graph: Option<Graph>,
    graph_attributes: Attributes,
    stack: Vec<Frame>,
    buffer: String,
}

pub fn read(text: &str, options: &ReadOptions) -> Result<Graph> {
    let mut reader = Reader::from_str(text);
    reader.trim_text(true);

    let mut state = GraphmlReader {
        text,
        options,
        keys: HashMap::new(),
        graph: None,
        graph_attributes: Attributes::new(),
        stack: Vec::new(),
        buffer: String::new(),
    };

    loop {
        let position = reader.buffer_position();
        match reader.read_event()? {
            Event::Start(element) => state.open(&element, position)?,
            Event::Empty(element) => {
                state.open(&element, position)?;
                state.close(position)?;
            }
            Event::End(_) => state.close(position)?,
            Event::Text(content) => state.buffer.push_str(&content.unescape()?),
            Event::CData(content) => {
                state.buffer.push_str(&String::from_utf8_lossy(&content.into_inner()))
            }
            Event::Eof => break,
            _ => {}
        }
    }

    let mut graph = state
        .graph
        .ok_or_else(|| xml_error(FORMAT, text, text.len(), "document has no <graph> element"))?;
    graph.attributes_mut().extend(state.graph_attributes);
    Ok(graph)
}

impl<'a> GraphmlReader<'a> {
    fn graph_mut(&mut self, position: usize) -> Result<&mut Graph> {
        let text = self.text;
        self.graph
            .as_mut()
            .ok_or_else(|| xml_error(FORMAT, text, position, "element outside of <graph>"))
    }

    fn required(&self, attributes: &HashMap<String, String>, name: &str, element: &str, position: usize) -> Result<String> {
        attributes.get(name).cloned().ok_or_else(|| {
            xml_error(
                FORMAT,
                self.text,
                position,
                format!("<{}> is missing the '{}' attribute", element, name),
            )
        })
    }

    fn open(&mut self, element: &BytesStart<'_>, position: usize) -> Result<()> {
        let attributes = element_attributes(element)?;
        self.buffer.clear();

        let frame = match element.local_name().as_ref() {
            b"key" => {
                let id = self.required(&attributes, "id", "key", position)?;
                let declaration = KeyDeclaration {
                    name: attributes.get("attr.name").cloned().unwrap_or_else(|| id.clone()),
                    ty: ValueType::from_name(attributes.get("attr.type").map(String::as_str).unwrap_or("string")),
                    domain: Domain::from_name(attributes.get("for").map(String::as_str).unwrap_or("all")),
                    default: None,
                };
                self.keys.insert(id.clone(), declaration);
                Frame::Key(id)
            }
            b"default" => match self.stack.last() {
                Some(Frame::Key(id)) => Frame::Default(id.clone()),
                _ => Frame::Other,
            },
            b"graph" => {
                if self.graph.is_none() {
                    let directed = attributes.get("edgedefault").map(String::as_str) == Some("directed");
                    self.graph = Some(Graph::new(directed, false));
                } else {
                    debug!("Flattening nested GraphML graph");
                }
                Frame::Graph
            }
            b"node" => {
                let raw = self.required(&attributes, "id", "node", position)?;
                let id = self.options.node_id(&raw)?;
                self.graph_mut(position)?.add_node(id.clone(), Attributes::new());
                Frame::Node(id, Attributes::new())
            }
            b"edge" => {
                let source = self.required(&attributes, "source", "edge", position)?;
                let target = self.required(&attributes, "target", "edge", position)?;
                let mut data = Attributes::new();
                if let Some(id) = attributes.get("id") {
                    data.insert("id".to_string(), Value::String(id.clone()));
                }
                Frame::Edge(self.options.node_id(&source)?, self.options.node_id(&target)?, data)
            }
            b"data" => Frame::Data(self.required(&attributes, "key", "data", position)?),
            _ => Frame::Other,
        };

        self.stack.push(frame);
        Ok(())
    }

    fn close(&mut self, position: usize) -> Result<()> {
        let Some(frame) = self.stack.pop() else {
            return Ok(());
        };
        let text = std::mem::take(&mut self.buffer);

        match frame {
            Frame::Default(id) => {
                if let Some(declaration) = self.keys.get_mut(&id) {
                    let value = declaration
                        .ty
                        .parse(&text)
                        .map_err(|message| xml_error(FORMAT, self.text, position, message))?;
                    declaration.default = Some(value);
                }
            }
            Frame::Data(key) => {
                let (name, value) = match self.keys.get(&key) {
                    Some(declaration) => (
                        declaration.name.clone(),
                        declaration.ty
                            .parse(&text)
                            .map_err(|message| xml_error(FORMAT, self.text, position, message))?,
                    ),
                    None => {
                        warn!("GraphML data references undeclared key '{}'", key);
                        (key, Value::String(text))
                    }
                };
                match self.stack.last_mut() {
                    Some(Frame::Node(_, attributes)) | Some(Frame::Edge(_, _, attributes)) => {
                        attributes.insert(name, value);
                    }
                    Some(Frame::Graph) => {
                        self.graph_attributes.insert(name, value);
                    }
                    _ => {}
                }
            }
            Frame::Node(id, attributes) => {
                let attributes = self.with_defaults(attributes, Domain::Node);
                self.graph_mut(position)?.add_node(id, attributes);
            }
            Frame::Edge(source, target, attributes) => {
                let attributes = self.with_defaults(attributes, Domain::Edge);
                let graph = self.graph_mut(position)?;
                if !graph.is_multigraph() && graph.has_edge(&source, &target) {
                    debug!("Parallel edge {} - {}, switching to multigraph", source, target);
                    graph.set_multigraph(true);
                }
                graph.add_edge(source, target, attributes);
            }
            Frame::Key(_) | Frame::Graph | Frame::Other => {}
        }
        Ok(())
    }

    fn with_defaults(&self, mut attributes: Attributes, domain: Domain) -> Attributes {
        for declaration in self.keys.values() {
            if let (true, Some(default)) = (declaration.domain.applies_to(domain), &declaration.default) {
                attributes
                    .entry(declaration.name.clone())
                    .or_insert_with(|| default.clone());
            }
        }
        attributes
    }
}

pub fn write<W: Write>(graph: &Graph, writer: &mut W) -> Result<()> {
    let graph_keys = KeyTable::from_attributes(std::iter::once(graph.attributes()), &[]);
    let node_keys = KeyTable::from_attributes(graph.nodes().map(|node| &node.attributes), &[]);
    let edge_keys = KeyTable::from_attributes(graph.edges().map(|(_, _, attributes)| attributes), &["id"]);

    // key ids are assigned graph, node, edge in order
    let node_offset = graph_keys.keys.len();
    let edge_offset = node_offset + node_keys.keys.len();

    writeln!(writer, r#"<?xml version="1.0" encoding="UTF-8"?>"#)?;
    writeln!(writer, r#"<graphml xmlns="{}">"#, NAMESPACE)?;
    for (offset, domain, table) in [
        (0, "graph", &graph_keys),
        (node_offset, "node", &node_keys),
        (edge_offset, "edge", &edge_keys),
    ] {
        for (i, (name, ty)) in table.keys.iter().enumerate() {
            writeln!(
                writer,
                r#"  <key id="d{}" for="{}" attr.name="{}" attr.type="{}"/>"#,
                offset + i,
                domain,
                escape(name.as_str()),
                ty.name()
            )?;
        }
    }

    let edgedefault = if graph.is_directed() { "directed" } else { "undirected" };
    writeln!(writer, r#"  <graph edgedefault="{}">"#, edgedefault)?;
    write_data(writer, graph.attributes(), &graph_keys, 0, "    ")?;

    for node in graph.nodes() {
        let id = escape(&node.id.to_string()).into_owned();
        if node.attributes.is_empty() {
            writeln!(writer, r#"    <node id="{}"/>"#, id)?;
        } else {
            writeln!(writer, r#"    <node id="{}">"#, id)?;
            write_data(writer, &node.attributes, &node_keys, node_offset, "      ")?;
            writeln!(writer, "    </node>")?;
        }
    }

    for (source, target, attributes) in graph.edges() {
        let mut open = format!(
            r#"    <edge source="{}" target="{}""#,
            escape(&source.to_string()),
            escape(&target.to_string())
        );
        if let Some(id) = attributes.get("id") {
            open.push_str(&format!(r#" id="{}""#, escape(&super::value_to_text(id))));
        }
        writeln!(writer, "{}>", open)?;
        write_data(writer, attributes, &edge_keys, edge_offset, "      ")?;
        writeln!(writer, "    </edge>")?;
    }

    writeln!(writer, "  </graph>")?;
    write!(writer, "</graphml>")?;
    Ok(())
}

fn write_data<W: Write>(
    writer: &mut W,
    attributes: &Attributes,
    table: &KeyTable,
    offset: usize,
    indent: &str,
) -> Result<()> {
    for (name, value) in attributes {
        let Some(position) = table.position(name) else {
            continue;
        };
        let ty = table.keys[position].1;
        if value.is_null() {
            continue;
        }
        writeln!(
            writer,
            r#"{}<data key="d{}">{}</data>"#,
            indent,
            offset + position,
            escape(&format_value(value, ty))
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NodeIdKind;
    use serde_json::json;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<graphml xmlns="http://graphml.graphdrawing.org/xmlns">
  <key id="d0" for="node" attr.name="color" attr.type="string">
    <default>yellow</default>
  </key>
  <key id="d1" for="edge" attr.name="weight" attr.type="double"/>
  <key id="d2" for="graph" attr.name="title" attr.type="string"/>
  <graph id="G" edgedefault="undirected">
    <data key="d2">sample</data>
    <node id="n0">
      <data key="d0">green</data>
    </node>
    <node id="n1"/>
    <node id="n2"/>
    <edge id="e0" source="n0" target="n1">
      <data key="d1">1.5</data>
    </edge>
    <edge source="n1" target="n2"/>
  </graph>
</graphml>"#;

    #[test]
    fn test_read_sample() {
        let graph = read(SAMPLE, &ReadOptions::default()).unwrap();

        assert!(!graph.is_directed());
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.attributes()["title"], json!("sample"));

        let n0 = graph.node_index(&"n0".into()).unwrap();
        let n1 = graph.node_index(&"n1".into()).unwrap();
        assert_eq!(graph.node(n0).attributes["color"], json!("green"));
        assert_eq!(graph.node(n1).attributes["color"], json!("yellow"));

        let (_, _, attributes) = graph.edges().next().unwrap();
        assert_eq!(attributes["weight"], json!(1.5));
        assert_eq!(attributes["id"], json!("e0"));
    }

    #[test]
    fn test_parallel_edges_switch_to_multigraph() {
        let text = r#"<graphml><graph edgedefault="directed">
            <edge source="1" target="2"/><edge source="1" target="2"/>
        </graph></graphml>"#;
        let options = ReadOptions {
            node_type: NodeIdKind::Int,
        };
        let graph = read(text, &options).unwrap();

        assert!(graph.is_directed());
        assert!(graph.is_multigraph());
        assert_eq!(graph.edge_count(), 2);
        assert!(graph.contains_node(&NodeId::Int(1)));
    }

    #[test]
    fn test_bad_typed_value_reports_line() {
        let text = "<graphml>\n<key id=\"k\" for=\"node\" attr.name=\"n\" attr.type=\"int\"/>\n<graph>\n<node id=\"a\"><data key=\"k\">abc</data></node>\n</graph></graphml>";
        let err = read(text, &ReadOptions::default()).unwrap_err();
        assert!(err.to_string().contains("line 4"), "{}", err);
    }

    #[test]
    fn test_missing_graph_element() {
        assert!(read("<graphml></graphml>", &ReadOptions::default()).is_err());
    }

    #[test]
    fn test_write_then_read_keeps_typed_attributes() {
        let mut graph = Graph::directed();
        let mut attributes = Attributes::new();
        attributes.insert("rank".to_string(), json!(0.25));
        attributes.insert("visible".to_string(), json!(true));
        graph.add_node(NodeId::from("a & b"), attributes);
        graph.add_edge(NodeId::from("a & b"), NodeId::from("c"), Attributes::new());

        let mut bytes = Vec::new();
        write(&graph, &mut bytes).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let back = read(&text, &ReadOptions::default()).unwrap();

        let ix = back.node_index(&NodeId::from("a & b")).unwrap();
        assert_eq!(back.node(ix).attributes["rank"], json!(0.25));
        assert_eq!(back.node(ix).attributes["visible"], json!(true));
        assert!(back.is_directed());
        assert!(back.has_edge(&"a & b".into(), &"c".into()));
    }
}
