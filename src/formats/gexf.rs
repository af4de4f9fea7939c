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
use tracing::debug;

const FORMAT: &str = "gexf";
const NAMESPACE: &str = "http://www.gexf.net/1.2draft";

#[derive(Debug, Clone)]
struct AttributeSpec {
    title: String,
    ty: ValueType,
    default: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Class {
    Node,
    Edge,
}

enum Frame {
    Graph,
    Attributes(Class),
    Attribute(Class, String),
    Default(Class, String),
    Node(NodeId, Attributes),
    Edge(NodeId, NodeId, Attributes),
    Other,
}

struct GexfReader<'a> {
    text: &'a str,
    options: &'a ReadOptions,
    declarations: HashMap<(Class, String), AttributeSpec>,
    graph: Option<Graph>,
    stack: Vec<Frame>,
    buffer: String,
}

pub fn read(text: &str, options: &ReadOptions) -> Result<Graph> {
    let mut reader = Reader::from_str(text);
    reader.trim_text(true);

    let mut state = GexfReader {
        text,
        options,
        declarations: HashMap::new(),
        graph: None,
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
            Event::Eof => break,
            _ => {}
        }
    }

    state
        .graph
        .ok_or_else(|| xml_error(FORMAT, text, text.len(), "document has no <graph> element"))
}

impl<'a> GexfReader<'a> {
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
            b"graph" => {
                if self.graph.is_none() {
                    let directed = attributes.get("defaultedgetype").map(String::as_str) == Some("directed");
                    self.graph = Some(Graph::new(directed, false));
                }
                Frame::Graph
            }
            b"attributes" => {
                let class = match attributes.get("class").map(String::as_str) {
                    Some("edge") => Class::Edge,
                    _ => Class::Node,
                };
                Frame::Attributes(class)
            }
            b"attribute" => match self.stack.last() {
                Some(&Frame::Attributes(class)) => {
                    let id = self.required(&attributes, "id", "attribute", position)?;
                    let spec = AttributeSpec {
                        title: attributes.get("title").cloned().unwrap_or_else(|| id.clone()),
                        ty: ValueType::from_name(attributes.get("type").map(String::as_str).unwrap_or("string")),
                        default: None,
                    };
                    self.declarations.insert((class, id.clone()), spec);
                    Frame::Attribute(class, id)
                }
                _ => Frame::Other,
            },
            b"default" => match self.stack.last() {
                Some(Frame::Attribute(class, id)) => Frame::Default(*class, id.clone()),
                _ => Frame::Other,
            },
            b"node" => {
                let raw = self.required(&attributes, "id", "node", position)?;
                let id = self.options.node_id(&raw)?;
                let mut data = Attributes::new();
                if let Some(label) = attributes.get("label") {
                    data.insert("label".to_string(), Value::String(label.clone()));
                }
                let text = self.text;
                self.graph
                    .as_mut()
                    .ok_or_else(|| xml_error(FORMAT, text, position, "<node> outside of <graph>"))?
                    .add_node(id.clone(), Attributes::new());
                Frame::Node(id, data)
            }
            b"edge" => {
                let source = self.required(&attributes, "source", "edge", position)?;
                let target = self.required(&attributes, "target", "edge", position)?;
                let mut data = Attributes::new();
                if let Some(weight) = attributes.get("weight") {
                    let weight = ValueType::Double
                        .parse(weight)
                        .map_err(|message| xml_error(FORMAT, self.text, position, message))?;
                    data.insert("weight".to_string(), weight);
                }
                if let Some(label) = attributes.get("label") {
                    data.insert("label".to_string(), Value::String(label.clone()));
                }
                Frame::Edge(self.options.node_id(&source)?, self.options.node_id(&target)?, data)
            }
            b"attvalue" => {
                let key = self.required(&attributes, "for", "attvalue", position)?;
                let raw = self.required(&attributes, "value", "attvalue", position)?;
                let text = self.text;
                let declarations = &self.declarations;
                // attvalues belong to the closest enclosing node or edge
                let owner = self.stack.iter_mut().rev().find_map(|frame| match frame {
                    Frame::Node(_, attributes) => Some((Class::Node, attributes)),
                    Frame::Edge(_, _, attributes) => Some((Class::Edge, attributes)),
                    _ => None,
                });
                if let Some((class, owner)) = owner {
                    let (name, value) = match declarations.get(&(class, key.clone())) {
                        Some(spec) => (
                            spec.title.clone(),
                            spec.ty
                                .parse(&raw)
                                .map_err(|message| xml_error(FORMAT, text, position, message))?,
                        ),
                        None => (key, Value::String(raw)),
                    };
                    owner.insert(name, value);
                }
                Frame::Other
            }
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
            Frame::Default(class, id) => {
                if let Some(spec) = self.declarations.get_mut(&(class, id)) {
                    let value = spec
                        .ty
                        .parse(&text)
                        .map_err(|message| xml_error(FORMAT, self.text, position, message))?;
                    spec.default = Some(value);
                }
            }
            Frame::Node(id, attributes) => {
                let attributes = self.with_defaults(attributes, Class::Node);
                if let Some(graph) = self.graph.as_mut() {
                    graph.add_node(id, attributes);
                }
            }
            Frame::Edge(source, target, attributes) => {
                let attributes = self.with_defaults(attributes, Class::Edge);
                if let Some(graph) = self.graph.as_mut() {
                    if !graph.is_multigraph() && graph.has_edge(&source, &target) {
                        debug!("Parallel edge {} - {}, switching to multigraph", source, target);
                        graph.set_multigraph(true);
                    }
                    graph.add_edge(source, target, attributes);
                }
            }
            Frame::Graph | Frame::Attributes(_) | Frame::Attribute(..) | Frame::Other => {}
        }
        Ok(())
    }

    fn with_defaults(&self, mut attributes: Attributes, class: Class) -> Attributes {
        for ((declared_class, _), spec) in &self.declarations {
            if let (true, Some(default)) = (*declared_class == class, &spec.default) {
                attributes
                    .entry(spec.title.clone())
                    .or_insert_with(|| default.clone());
            }
        }
        attributes
    }
}

pub fn write<W: Write>(graph: &Graph, writer: &mut W) -> Result<()> {
    let node_keys = KeyTable::from_attributes(graph.nodes().map(|node| &node.attributes), &["label"]);
    let edge_keys = KeyTable::from_attributes(
        graph.edges().map(|(_, _, attributes)| attributes),
        &["label", "weight"],
    );

    let edge_type = if graph.is_directed() { "directed" } else { "undirected" };

    writeln!(writer, r#"<?xml version="1.0" encoding="UTF-8"?>"#)?;
    writeln!(writer, r#"<gexf xmlns="{}" version="1.2">"#, NAMESPACE)?;
    writeln!(writer, r#"  <graph defaultedgetype="{}" mode="static">"#, edge_type)?;

    for (class, table) in [("node", &node_keys), ("edge", &edge_keys)] {
        if table.keys.is_empty() {
            continue;
        }
        writeln!(writer, r#"    <attributes class="{}" mode="static">"#, class)?;
        for (i, (title, ty)) in table.keys.iter().enumerate() {
            writeln!(
                writer,
                r#"      <attribute id="{}" title="{}" type="{}"/>"#,
                i,
                escape(title.as_str()),
                ty.name()
            )?;
        }
        writeln!(writer, "    </attributes>")?;
    }

    writeln!(writer, "    <nodes>")?;
    for node in graph.nodes() {
        let id = node.id.to_string();
        let label = match node.attributes.get("label") {
            Some(label) => super::value_to_text(label),
            None => id.clone(),
        };
        writeln!(
            writer,
            r#"      <node id="{}" label="{}">"#,
            escape(id.as_str()),
            escape(label.as_str())
        )?;
        write_attvalues(writer, &node.attributes, &node_keys, "        ")?;
        writeln!(writer, "      </node>")?;
    }
    writeln!(writer, "    </nodes>")?;

    writeln!(writer, "    <edges>")?;
    for (i, (source, target, attributes)) in graph.edges().enumerate() {
        let mut open = format!(
            r#"      <edge id="{}" source="{}" target="{}""#,
            i,
            escape(&source.to_string()),
            escape(&target.to_string())
        );
        if let Some(weight) = attributes.get("weight").and_then(Value::as_f64) {
            open.push_str(&format!(r#" weight="{}""#, weight));
        }
        if let Some(label) = attributes.get("label") {
            open.push_str(&format!(r#" label="{}""#, escape(&super::value_to_text(label))));
        }
        writeln!(writer, "{}>", open)?;
        write_attvalues(writer, attributes, &edge_keys, "        ")?;
        writeln!(writer, "      </edge>")?;
    }
    writeln!(writer, "    </edges>")?;

    writeln!(writer, "  </graph>")?;
    write!(writer, "</gexf>")?;
    Ok(())
}

fn write_attvalues<W: Write>(
    writer: &mut W,
    attributes: &Attributes,
    table: &KeyTable,
    indent: &str,
) -> Result<()> {
    let values: Vec<(usize, String)> = attributes
        .iter()
        .filter(|(_, value)| !value.is_null())
        .filter_map(|(name, value)| {
            table
                .position(name)
                .map(|position| (position, format_value(value, table.keys[position].1)))
        })
        .collect();
    if values.is_empty() {
        return Ok(());
    }

    writeln!(writer, "{}<attvalues>", indent)?;
    for (position, value) in values {
        writeln!(
            writer,
            r#"{}  <attvalue for="{}" value="{}"/>"#,
            indent,
            position,
            escape(value.as_str())
        )?;
    }
    writeln!(writer, "{}</attvalues>", indent)?;
    Ok(())
}
