use super::MAX_NESTING;
use crate::error::{NodeLinkError, Result};
use crate::graph::Graph;
use crate::models::{Attributes, NodeId, ReadOptions};
use quick_xml::escape::{escape, unescape};
use serde_json::Value;
use std::io::Write;
use std::iter::Peekable;
use std::str::CharIndices;

const FORMAT: &str = "gml";

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Key(String),
    Int(i64),
    Real(f64),
    Str(String),
    Open,
    Close,
}

#[derive(Debug, Clone, PartialEq)]
enum GmlValue {
    Int(i64),
    Real(f64),
    Str(String),
    List(Vec<Entry>),
}

#[derive(Debug, Clone, PartialEq)]
struct Entry {
    key: String,
    value: GmlValue,
    line: usize,
}

struct Lexer<'a> {
    chars: Peekable<CharIndices<'a>>,
    text: &'a str,
    line: usize,
}

impl<'a> Lexer<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            chars: text.char_indices().peekable(),
            text,
            line: 1,
        }
    }

    fn tokenize(mut self) -> Result<Vec<(Token, usize)>> {
        let mut tokens = Vec::new();
        while let Some(&(start, c)) = self.chars.peek() {
            match c {
                '\n' => {
                    self.line += 1;
                    self.chars.next();
                }
                c if c.is_whitespace() => {
                    self.chars.next();
                }
                '#' => {
                    while let Some(&(_, c)) = self.chars.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.chars.next();
                    }
                }
                '[' => {
                    self.chars.next();
                    tokens.push((Token::Open, self.line));
                }
                ']' => {
                    self.chars.next();
                    tokens.push((Token::Close, self.line));
                }
                '"' => {
                    let line = self.line;
                    tokens.push((Token::Str(self.string()?), line));
                }
                c if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' => {
                    let end = self.take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+'));
                    tokens.push((self.number(&self.text[start..end])?, self.line));
                }
                c if c.is_ascii_alphabetic() || c == '_' => {
                    let end = self.take_while(|c| c.is_ascii_alphanumeric() || c == '_');
                    tokens.push((Token::Key(self.text[start..end].to_string()), self.line));
                }
                other => {
                    return Err(NodeLinkError::syntax(
                        FORMAT,
                        self.line,
                        format!("unexpected character '{}'", other),
                    ))
                }
            }
        }
        Ok(tokens)
    }

    fn take_while(&mut self, keep: impl Fn(char) -> bool) -> usize {
        let mut end = self.text.len();
        while let Some(&(i, c)) = self.chars.peek() {
            if !keep(c) {
                end = i;
                break;
            }
            self.chars.next();
        }
        end
    }

    fn string(&mut self) -> Result<String> {
        let line = self.line;
        self.chars.next();
        let mut raw = String::new();
        loop {
            match self.chars.next() {
                Some((_, '"')) => break,
                Some((_, c)) => {
                    if c == '\n' {
                        self.line += 1;
                    }
                    raw.push(c);
                }
                None => return Err(NodeLinkError::syntax(FORMAT, line, "unterminated string")),
            }
        }
        Ok(decode_entities(&raw))
    }

    fn number(&self, raw: &str) -> Result<Token> {
        if let Ok(i) = raw.parse::<i64>() {
            return Ok(Token::Int(i));
        }
        match raw.to_ascii_uppercase().trim_start_matches('+') {
            "INF" => return Ok(Token::Real(f64::INFINITY)),
            "-INF" => return Ok(Token::Real(f64::NEG_INFINITY)),
            "NAN" | "-NAN" => return Ok(Token::Real(f64::NAN)),
            _ => {}
        }
        raw.parse::<f64>()
            .map(Token::Real)
            .map_err(|_| NodeLinkError::syntax(FORMAT, self.line, format!("invalid number '{}'", raw)))
    }
}

/// Decode `&name;` and `&#N;` references, keeping any other `&` as written
fn decode_entities(raw: &str) -> String {
    let mut decoded = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find('&') {
        decoded.push_str(&rest[..start]);
        let tail = &rest[start..];
        let reference = tail[1..]
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '#'))
            .filter(|&len| len > 0 && tail[1 + len..].starts_with(';'))
            .map(|len| &tail[..len + 2]);

        match reference.and_then(|r| unescape(r).ok().map(|text| (r.len(), text))) {
            Some((consumed, text)) => {
                decoded.push_str(&text);
                rest = &tail[consumed..];
            }
            None => {
                decoded.push('&');
                rest = &tail[1..];
            }
        }
    }
    decoded.push_str(rest);
    decoded
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl Parser {
    fn parse_list(&mut self, depth: usize, open_line: usize) -> Result<Vec<Entry>> {
        if depth > MAX_NESTING {
            return Err(NodeLinkError::syntax(
                FORMAT,
                open_line,
                format!("lists nested deeper than {} levels", MAX_NESTING),
            ));
        }
        let nested = depth > 0;
        let mut entries = Vec::new();
        loop {
            let Some((token, line)) = self.tokens.get(self.pos).cloned() else {
                if nested {
                    return Err(NodeLinkError::syntax(FORMAT, open_line, "list opened here is never closed"));
                }
                return Ok(entries);
            };
            self.pos += 1;

            let key = match token {
                Token::Close if nested => return Ok(entries),
                Token::Key(key) => key,
                other => {
                    return Err(NodeLinkError::syntax(
                        FORMAT,
                        line,
                        format!("expected a key, found {:?}", other),
                    ))
                }
            };

            let Some((token, value_line)) = self.tokens.get(self.pos).cloned() else {
                return Err(NodeLinkError::syntax(FORMAT, line, format!("key '{}' has no value", key)));
            };
            self.pos += 1;

            let value = match token {
                Token::Int(i) => GmlValue::Int(i),
                Token::Real(f) => GmlValue::Real(f),
                Token::Str(s) => GmlValue::Str(s),
                Token::Open => GmlValue::List(self.parse_list(depth + 1, value_line)?),
                Token::Key(word) if word == "INF" => GmlValue::Real(f64::INFINITY),
                Token::Key(word) if word == "NAN" => GmlValue::Real(f64::NAN),
                other => {
                    return Err(NodeLinkError::syntax(
                        FORMAT,
                        value_line,
                        format!("expected a value for '{}', found {:?}", key, other),
                    ))
                }
            };
            entries.push(Entry { key, value, line });
        }
    }
}

fn to_json(value: &GmlValue) -> Value {
    match value {
        GmlValue::Int(i) => Value::from(*i),
        GmlValue::Real(f) => Value::from(*f),
        GmlValue::Str(s) => Value::String(s.clone()),
        GmlValue::List(entries) => Value::Object(entries_to_attributes(entries, &[])),
    }
}

/// Fold entries into a map; a repeated key collects its values into an array
fn entries_to_attributes(entries: &[Entry], skip: &[&str]) -> Attributes {
    let mut grouped: Vec<(&str, Vec<Value>)> = Vec::new();
    for entry in entries {
        if skip.contains(&entry.key.as_str()) {
            continue;
        }
        let value = to_json(&entry.value);
        match grouped.iter_mut().find(|(key, _)| *key == entry.key) {
            Some((_, values)) => values.push(value),
            None => grouped.push((&entry.key, vec![value])),
        }
    }

    grouped
        .into_iter()
        .map(|(key, mut values)| {
            let value = if values.len() == 1 {
                values.remove(0)
            } else {
                Value::Array(values)
            };
            (key.to_string(), value)
        })
        .collect()
}

fn find<'e>(entries: &'e [Entry], key: &str) -> Option<&'e Entry> {
    entries.iter().find(|entry| entry.key == key)
}

fn flag(entries: &[Entry], key: &str) -> bool {
    matches!(find(entries, key).map(|e| &e.value), Some(GmlValue::Int(1)))
}

fn node_id(entry: &Entry, options: &ReadOptions) -> Result<NodeId> {
    match &entry.value {
        GmlValue::Int(i) => Ok(NodeId::Int(*i)),
        GmlValue::Str(s) => options.node_id(s),
        other => Err(NodeLinkError::syntax(
            FORMAT,
            entry.line,
            format!("'{}' must be an integer or string, found {:?}", entry.key, other),
        )),
    }
}

fn required<'e>(entries: &'e [Entry], key: &str, element: &str, line: usize) -> Result<&'e Entry> {
    find(entries, key).ok_or_else(|| {
        NodeLinkError::syntax(FORMAT, line, format!("{} has no '{}'", element, key))
    })
}

pub fn read(text: &str, options: &ReadOptions) -> Result<Graph> {
    let tokens = Lexer::new(text).tokenize()?;
    let mut parser = Parser { tokens, pos: 0 };
    let top = parser.parse_list(0, 1)?;

    let graph_entry = find(&top, "graph")
        .ok_or_else(|| NodeLinkError::syntax(FORMAT, 1, "input contains no graph"))?;
    let GmlValue::List(entries) = &graph_entry.value else {
        return Err(NodeLinkError::syntax(FORMAT, graph_entry.line, "'graph' must be a list"));
    };

    let mut graph = Graph::new(flag(entries, "directed"), flag(entries, "multigraph"));
    *graph.attributes_mut() = entries_to_attributes(entries, &["directed", "multigraph", "node", "edge"]);

    for entry in entries.iter().filter(|e| e.key == "node") {
        let GmlValue::List(fields) = &entry.value else {
            return Err(NodeLinkError::syntax(FORMAT, entry.line, "'node' must be a list"));
        };
        let id = node_id(required(fields, "id", "node", entry.line)?, options)?;
        if graph.contains_node(&id) {
            return Err(NodeLinkError::syntax(FORMAT, entry.line, format!("node id {} is duplicated", id)));
        }
        graph.add_node(id, entries_to_attributes(fields, &["id"]));
    }

    for entry in entries.iter().filter(|e| e.key == "edge") {
        let GmlValue::List(fields) = &entry.value else {
            return Err(NodeLinkError::syntax(FORMAT, entry.line, "'edge' must be a list"));
        };
        let source = node_id(required(fields, "source", "edge", entry.line)?, options)?;
        let target = node_id(required(fields, "target", "edge", entry.line)?, options)?;
        for endpoint in [&source, &target] {
            if !graph.contains_node(endpoint) {
                return Err(NodeLinkError::syntax(
                    FORMAT,
                    entry.line,
                    format!("edge references undeclared node {}", endpoint),
                ));
            }
        }
        if !graph.is_multigraph() && graph.has_edge(&source, &target) {
            return Err(NodeLinkError::syntax(
                FORMAT,
                entry.line,
                format!("edge ({}, {}) is duplicated; declare 'multigraph 1'", source, target),
            ));
        }
        graph.add_edge(source, target, entries_to_attributes(fields, &["source", "target", "key"]));
    }

    Ok(graph)
}

fn valid_key(key: &str) -> bool {
    let mut chars = key.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn write_id<W: Write>(writer: &mut W, key: &str, id: &NodeId, indent: &str) -> Result<()> {
    match id {
        NodeId::Int(i) => writeln!(writer, "{}{} {}", indent, key, i)?,
        NodeId::Str(s) => writeln!(writer, "{}{} \"{}\"", indent, key, escape(s.as_str()))?,
    }
    Ok(())
}

fn write_entry<W: Write>(writer: &mut W, key: &str, value: &Value, indent: &str) -> Result<()> {
    if !valid_key(key) {
        return Err(NodeLinkError::unsupported(
            FORMAT,
            format!("'{}' is not a valid GML key", key),
        ));
    }
    match value {
        Value::Null => {}
        Value::Bool(b) => writeln!(writer, "{}{} {}", indent, key, i64::from(*b))?,
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => writeln!(writer, "{}{} {}", indent, key, i)?,
            (None, Some(f)) if f.is_nan() => writeln!(writer, "{}{} NAN", indent, key)?,
            (None, Some(f)) if f.is_infinite() => {
                let sign = if f < 0.0 { "-" } else { "" };
                writeln!(writer, "{}{} {}INF", indent, key, sign)?
            }
            (None, Some(f)) => writeln!(writer, "{}{} {:?}", indent, key, f)?,
            (None, None) => writeln!(writer, "{}{} {}", indent, key, n)?,
        },
        Value::String(s) => writeln!(writer, "{}{} \"{}\"", indent, key, escape(s.as_str()))?,
        Value::Array(values) => {
            for value in values {
                if value.is_array() {
                    return Err(NodeLinkError::unsupported(FORMAT, "nested arrays have no GML form"));
                }
                write_entry(writer, key, value, indent)?;
            }
        }
        Value::Object(map) => {
            writeln!(writer, "{}{} [", indent, key)?;
            let inner = format!("{}  ", indent);
            for (k, v) in map {
                write_entry(writer, k, v, &inner)?;
            }
            writeln!(writer, "{}]", indent)?;
        }
    }
    Ok(())
}

pub fn write<W: Write>(graph: &Graph, writer: &mut W) -> Result<()> {
    writeln!(writer, "graph [")?;
    if graph.is_directed() {
        writeln!(writer, "  directed 1")?;
    }
    if graph.is_multigraph() {
        writeln!(writer, "  multigraph 1")?;
    }
    for (key, value) in graph.attributes() {
        if !matches!(key.as_str(), "directed" | "multigraph" | "node" | "edge") {
            write_entry(writer, key, value, "  ")?;
        }
    }

    for node in graph.nodes() {
        writeln!(writer, "  node [")?;
        write_id(writer, "id", &node.id, "    ")?;
        for (key, value) in &node.attributes {
            if key != "id" {
                write_entry(writer, key, value, "    ")?;
            }
        }
        writeln!(writer, "  ]")?;
    }

    for (source, target, attributes) in graph.edges() {
        writeln!(writer, "  edge [")?;
        write_id(writer, "source", source, "    ")?;
        write_id(writer, "target", target, "    ")?;
        for (key, value) in attributes {
            if !matches!(key.as_str(), "source" | "target" | "key") {
                write_entry(writer, key, value, "    ")?;
            }
        }
        writeln!(writer, "  ]")?;
    }

    write!(writer, "]")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SAMPLE: &str = r#"
# a small weighted graph
Creator "test"
graph [
  directed 1
  label "sample"
  node [ id 1 label "one" pos [ x 1.5 y -2 ] ]
  node [ id 2 label "two &amp; more" tag "a" tag "b" ]
  node [ id 3 ]
  edge [ source 1 target 2 weight 0.5 ]
  edge [ source 2 target 3 ]
]
"#;

    #[test]
    fn test_read_sample() {
        let graph = read(SAMPLE, &ReadOptions::default()).unwrap();

        assert!(graph.is_directed());
        assert!(!graph.is_multigraph());
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.attributes()["label"], json!("sample"));

        let one = graph.node_index(&NodeId::Int(1)).unwrap();
        assert_eq!(graph.node(one).attributes["label"], json!("one"));
        assert_eq!(graph.node(one).attributes["pos"], json!({"x": 1.5, "y": -2}));

        let two = graph.node_index(&NodeId::Int(2)).unwrap();
        assert_eq!(graph.node(two).attributes["label"], json!("two & more"));
        assert_eq!(graph.node(two).attributes["tag"], json!(["a", "b"]));

        let (_, _, attributes) = graph.edges().next().unwrap();
        assert_eq!(attributes["weight"], json!(0.5));
    }

    #[test]
    fn test_bare_ampersand_is_kept() {
        let text = r#"graph [ node [ id 0 label "AT&T" note "a &b; &#65; & &amp;" ] ]"#;
        let graph = read(text, &ReadOptions::default()).unwrap();

        let node = graph.node_index(&NodeId::Int(0)).unwrap();
        assert_eq!(graph.node(node).attributes["label"], json!("AT&T"));
        assert_eq!(graph.node(node).attributes["note"], json!("a &b; A & &"));
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let depth = 10_000;
        let text = format!("graph [ {} {} ]", "a [ ".repeat(depth), "] ".repeat(depth));
        let err = read(&text, &ReadOptions::default()).unwrap_err();
        assert!(matches!(err, NodeLinkError::Syntax { .. }), "{}", err);

        let shallow = format!("graph [ {} {} ]", "a [ ".repeat(20), "] ".repeat(20));
        assert!(read(&shallow, &ReadOptions::default()).is_ok());
    }

    #[test]
    fn test_unclosed_list_reports_opening_line() {
        let err = read("graph [\n  node [ id 1\n", &ReadOptions::default()).unwrap_err();
        assert!(err.to_string().contains("line 2"), "{}", err);
    }

    #[test]
    fn test_edge_to_undeclared_node() {
        let text = "graph [ node [ id 1 ] edge [ source 1 target 9 ] ]";
        assert!(read(text, &ReadOptions::default()).is_err());
    }

    #[test]
    fn test_duplicate_edge_needs_multigraph() {
        let simple = "graph [ node [ id 1 ] node [ id 2 ] edge [ source 1 target 2 ] edge [ source 2 target 1 ] ]";
        assert!(read(simple, &ReadOptions::default()).is_err());

        let multi = "graph [ multigraph 1 node [ id 1 ] node [ id 2 ] edge [ source 1 target 2 ] edge [ source 2 target 1 ] ]";
        assert_eq!(read(multi, &ReadOptions::default()).unwrap().edge_count(), 2);
    }

    #[test]
    fn test_string_ids() {
        let text = r#"graph [ node [ id "a" ] node [ id "b" ] edge [ source "a" target "b" ] ]"#;
        let graph = read(text, &ReadOptions::default()).unwrap();
        assert!(graph.has_edge(&"a".into(), &"b".into()));
    }

    #[test]
    fn test_write_rejects_invalid_keys() {
        let mut graph = Graph::undirected();
        let mut attributes = Attributes::new();
        attributes.insert("two words".to_string(), json!(1));
        graph.add_node(NodeId::Int(0), attributes);

        let mut out = Vec::new();
        assert!(matches!(
            write(&graph, &mut out),
            Err(NodeLinkError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_write_then_read_keeps_attributes() {
        let graph = read(SAMPLE, &ReadOptions::default()).unwrap();
        let mut out = Vec::new();
        write(&graph, &mut out).unwrap();
        let back = read(std::str::from_utf8(&out).unwrap(), &ReadOptions::default()).unwrap();

        let two = back.node_index(&NodeId::Int(2)).unwrap();
        assert_eq!(back.node(two).attributes["label"], json!("two & more"));
        assert_eq!(back.node(two).attributes["tag"], json!(["a", "b"]));
        assert_eq!(back.edge_count(), 2);
        assert!(back.is_directed());
    }
}
