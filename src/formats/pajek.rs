//! Pajek `.net` networks.
//!
//! Vertices are keyed by their label; the vertex number is kept as the `id`
//! attribute. Every Pajek graph loads as a multigraph, and a single `*Arcs`
//! section makes the whole graph directed.

use crate::error::{NodeLinkError, Result};
use crate::graph::Graph;
use crate::models::{Attributes, NodeId, ReadOptions};
use serde_json::Value;
use std::collections::HashMap;
use std::io::Write;
use tracing::warn;

const FORMAT: &str = "pajek";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Vertices,
    Edges,
    Arcs,
    Other,
}

/// Split a line into words, honoring double quotes with `\"` and `\\` escapes
fn split_words(line: &str, number: usize) -> Result<Vec<String>> {
    let mut words = Vec::new();
    let mut chars = line.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        let mut word = String::new();
        if c == '"' {
            chars.next();
            loop {
                match chars.next() {
                    Some('"') => break,
                    Some('\\') => match chars.next() {
                        Some(escaped @ ('"' | '\\')) => word.push(escaped),
                        Some(other) => {
                            word.push('\\');
                            word.push(other);
                        }
                        None => break,
                    },
                    Some(other) => word.push(other),
                    None => {
                        return Err(NodeLinkError::syntax(FORMAT, number, "unterminated quoted word"))
                    }
                }
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                word.push(c);
                chars.next();
            }
        }
        words.push(word);
    }
    Ok(words)
}

fn section_of(header: &str) -> Section {
    let lower = header.to_ascii_lowercase();
    if lower.starts_with("*vertices") {
        Section::Vertices
    } else if lower.starts_with("*arcs") {
        Section::Arcs
    } else if lower.starts_with("*edges") {
        Section::Edges
    } else {
        Section::Other
    }
}

fn extra_pairs(words: &[String], attributes: &mut Attributes) {
    for pair in words.chunks_exact(2) {
        attributes.insert(pair[0].clone(), Value::String(pair[1].clone()));
    }
}

pub fn read(text: &str, options: &ReadOptions) -> Result<Graph> {
    let lines: Vec<(usize, &str)> = text
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('%'))
        .collect();

    let directed = lines
        .iter()
        .any(|(_, line)| line.starts_with('*') && section_of(line) == Section::Arcs);
    let mut graph = Graph::new(directed, true);

    let mut section = Section::Preamble;
    let mut labels: HashMap<String, NodeId> = HashMap::new();
    let mut declared_vertices = None;
    let mut seen_vertices = 0usize;

    for (number, line) in lines {
        if line.starts_with('*') {
            section = section_of(line);
            let mut words = line.splitn(2, char::is_whitespace);
            let header = words.next().unwrap_or_default();
            let rest = words.next().map(str::trim).unwrap_or_default();

            if header.eq_ignore_ascii_case("*network") && !rest.is_empty() {
                graph
                    .attributes_mut()
                    .insert("name".to_string(), Value::String(rest.to_string()));
            }
            if section == Section::Vertices {
                declared_vertices = Some(rest.split_whitespace().next().unwrap_or("0").parse::<usize>().map_err(
                    |_| NodeLinkError::syntax(FORMAT, number, format!("invalid vertex count '{}'", rest)),
                )?);
            }
            continue;
        }

        match section {
            Section::Vertices => {
                let words = split_words(line, number)?;
                let Some(vertex) = words.first() else { continue };
                let label = words.get(1).unwrap_or(vertex);
                let id = options.node_id(label)?;

                let mut attributes = Attributes::new();
                attributes.insert("id".to_string(), Value::String(vertex.clone()));
                if let [x, y, shape, ..] = &words[words.len().min(2)..] {
                    if let (Ok(x), Ok(y)) = (x.parse::<f64>(), y.parse::<f64>()) {
                        attributes.insert("x".to_string(), Value::from(x));
                        attributes.insert("y".to_string(), Value::from(y));
                        attributes.insert("shape".to_string(), Value::String(shape.clone()));
                    }
                }
                if words.len() > 5 {
                    extra_pairs(&words[5..], &mut attributes);
                }

                labels.insert(vertex.clone(), id.clone());
                graph.add_node(id, attributes);
                seen_vertices += 1;
            }
            Section::Edges | Section::Arcs => {
                let words = split_words(line, number)?;
                if words.len() < 2 {
                    continue;
                }
                let resolve = |word: &String| -> Result<NodeId> {
                    match labels.get(word) {
                        Some(id) => Ok(id.clone()),
                        None => options.node_id(word),
                    }
                };
                let source = resolve(&words[0])?;
                let target = resolve(&words[1])?;

                let mut attributes = Attributes::new();
                if let Some(weight) = words.get(2).and_then(|w| w.parse::<f64>().ok()) {
                    attributes.insert("weight".to_string(), Value::from(weight));
                }
                if words.len() > 3 {
                    extra_pairs(&words[3..], &mut attributes);
                }

                let mirrored = directed && section == Section::Edges && source != target;
                if mirrored {
                    graph.add_edge(target.clone(), source.clone(), attributes.clone());
                }
                graph.add_edge(source, target, attributes);
            }
            Section::Preamble | Section::Other => {}
        }
    }

    if let Some(declared) = declared_vertices {
        if declared != seen_vertices {
            warn!(
                "Pajek header declares {} vertices but {} were listed",
                declared, seen_vertices
            );
        }
    }

    Ok(graph)
}

fn quote(word: &str) -> String {
    if !word.is_empty() && !word.contains(|c: char| c.is_whitespace() || c == '"' || c == '\\') {
        return word.to_string();
    }
    let escaped = word.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escaped)
}

fn attribute_text(attributes: &Attributes, key: &str, default: &str) -> String {
    attributes
        .get(key)
        .filter(|value| !value.is_null())
        .map(super::value_to_text)
        .unwrap_or_else(|| default.to_string())
}

fn write_extras<W: Write>(writer: &mut W, attributes: &Attributes, skip: &[&str]) -> Result<()> {
    for (key, value) in attributes {
        if skip.contains(&key.as_str()) || value.is_null() {
            continue;
        }
        write!(writer, " {} {}", quote(key), quote(&super::value_to_text(value)))?;
    }
    Ok(())
}

pub fn write<W: Write>(graph: &Graph, writer: &mut W) -> Result<()> {
    let name = graph
        .attributes()
        .get("name")
        .map(super::value_to_text)
        .unwrap_or_else(|| "graphiti".to_string());
    writeln!(writer, "*network {}", name)?;
    writeln!(writer, "*vertices {}", graph.node_count())?;

    let mut numbers: HashMap<&NodeId, usize> = HashMap::new();
    for (position, node) in graph.nodes().enumerate() {
        let number = position + 1;
        numbers.insert(&node.id, number);
        write!(
            writer,
            "{} {} {} {} {}",
            number,
            quote(&node.id.to_string()),
            quote(&attribute_text(&node.attributes, "x", "0.0")),
            quote(&attribute_text(&node.attributes, "y", "0.0")),
            quote(&attribute_text(&node.attributes, "shape", "ellipse")),
        )?;
        write_extras(writer, &node.attributes, &["id", "x", "y", "shape"])?;
        writeln!(writer)?;
    }

    writeln!(writer, "{}", if graph.is_directed() { "*arcs" } else { "*edges" })?;
    for (source, target, attributes) in graph.edges() {
        let (Some(u), Some(v)) = (numbers.get(source), numbers.get(target)) else {
            return Err(NodeLinkError::NodeNotFound(format!("{} -> {}", source, target)));
        };
        write!(writer, "{} {} {}", u, v, attribute_text(attributes, "weight", "1.0"))?;
        write_extras(writer, attributes, &["weight"])?;
        writeln!(writer)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SAMPLE: &str = "\
*Network friends
% comment lines are ignored
*Vertices 3
1 \"Alice Smith\" 0.1 0.2 box color red
2 Bob
3 Carol
*Edges
1 2 2.5
2 3
";

    #[test]
    fn test_split_words() {
        let words = split_words(r#"1 "a \"b\" c" 0.5"#, 1).unwrap();
        assert_eq!(words, vec!["1", "a \"b\" c", "0.5"]);
        assert!(split_words("1 \"open", 3).is_err());
    }

    #[test]
    fn test_read_sample() {
        let graph = read(SAMPLE, &ReadOptions::default()).unwrap();

        assert!(!graph.is_directed());
        assert!(graph.is_multigraph());
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.attributes()["name"], json!("friends"));

        let alice = graph.node_index(&"Alice Smith".into()).unwrap();
        let attributes = &graph.node(alice).attributes;
        assert_eq!(attributes["id"], json!("1"));
        assert_eq!(attributes["x"], json!(0.1));
        assert_eq!(attributes["shape"], json!("box"));
        assert_eq!(attributes["color"], json!("red"));

        assert!(graph.has_edge(&"Alice Smith".into(), &"Bob".into()));
        let (_, _, edge) = graph.edges().next().unwrap();
        assert_eq!(edge["weight"], json!(2.5));
    }

    #[test]
    fn test_arcs_make_graph_directed() {
        let text = "*Vertices 2\n1 a\n2 b\n*Arcs\n1 2\n*Edges\n2 2\n1 2\n";
        let graph = read(text, &ReadOptions::default()).unwrap();

        assert!(graph.is_directed());
        // arc, self-loop, and the undirected edge mirrored both ways
        assert_eq!(graph.edge_count(), 4);
        assert!(graph.has_edge(&"b".into(), &"a".into()));
    }

    #[test]
    fn test_unknown_endpoints_become_nodes() {
        let text = "*Vertices 1\n1 a\n*Edges\n1 z\n";
        let graph = read(text, &ReadOptions::default()).unwrap();
        assert!(graph.contains_node(&"z".into()));
    }

    #[test]
    fn test_text_coordinates_keep_columns_aligned() {
        let mut graph = Graph::undirected();
        let mut attributes = Attributes::new();
        attributes.insert("x".to_string(), json!("left side"));
        attributes.insert("color".to_string(), json!("red"));
        graph.add_node("a".into(), attributes);

        let mut out = Vec::new();
        write(&graph, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("1 a \"left side\" 0.0 ellipse color red"), "{}", text);

        let back = read(&text, &ReadOptions::default()).unwrap();
        let a = back.node_index(&"a".into()).unwrap();
        assert_eq!(back.node(a).attributes["color"], json!("red"));
    }

    #[test]
    fn test_write_then_read() {
        let graph = read(SAMPLE, &ReadOptions::default()).unwrap();
        let mut out = Vec::new();
        write(&graph, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("*network friends\n*vertices 3\n"));
        assert!(text.contains("\"Alice Smith\""));

        let back = read(&text, &ReadOptions::default()).unwrap();
        assert_eq!(back.node_count(), 3);
        assert_eq!(back.edge_count(), 2);
        assert!(back.has_edge(&"Bob".into(), &"Carol".into()));
    }
}
