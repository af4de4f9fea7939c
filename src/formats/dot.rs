//! Graphviz DOT.
//!
//! Subgraphs are flattened into the enclosing graph, ports are dropped from
//! node references and every attribute value is kept as a string. Graphs load
//! as multigraphs unless declared `strict`.

use super::MAX_NESTING;
use crate::error::{NodeLinkError, Result};
use crate::graph::Graph;
use crate::models::{Attributes, NodeId, ReadOptions};
use serde_json::Value;
use std::io::Write;
use std::iter::Peekable;
use std::str::Chars;
use tracing::debug;

const FORMAT: &str = "dot";

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Id { text: String, quoted: bool },
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Equals,
    Semicolon,
    Comma,
    Colon,
    Plus,
    EdgeOp { directed: bool },
}

struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    line: usize,
}

fn is_id_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.' || !c.is_ascii()
}

impl<'a> Lexer<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            chars: text.chars().peekable(),
            line: 1,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next();
        if c == Some('\n') {
            self.line += 1;
        }
        c
    }

    fn error(&self, message: impl Into<String>) -> NodeLinkError {
        NodeLinkError::syntax(FORMAT, self.line, message)
    }

    fn tokenize(mut self) -> Result<Vec<(Token, usize)>> {
        let mut tokens = Vec::new();
        while let Some(&c) = self.chars.peek() {
            let line = self.line;
            let token = match c {
                c if c.is_whitespace() => {
                    self.bump();
                    continue;
                }
                '#' => {
                    self.skip_line();
                    continue;
                }
                '/' => {
                    self.bump();
                    match self.bump() {
                        Some('/') => self.skip_line(),
                        Some('*') => self.skip_block()?,
                        _ => return Err(self.error("stray '/'")),
                    }
                    continue;
                }
                '{' | '}' | '[' | ']' | '=' | ';' | ',' | ':' | '+' => {
                    self.bump();
                    match c {
                        '{' => Token::LBrace,
                        '}' => Token::RBrace,
                        '[' => Token::LBracket,
                        ']' => Token::RBracket,
                        '=' => Token::Equals,
                        ';' => Token::Semicolon,
                        ',' => Token::Comma,
                        ':' => Token::Colon,
                        _ => Token::Plus,
                    }
                }
                '"' => Token::Id {
                    text: self.quoted()?,
                    quoted: true,
                },
                '<' => Token::Id {
                    text: self.html()?,
                    quoted: true,
                },
                '-' => {
                    self.bump();
                    match self.chars.peek() {
                        Some('-') => {
                            self.bump();
                            Token::EdgeOp { directed: false }
                        }
                        Some('>') => {
                            self.bump();
                            Token::EdgeOp { directed: true }
                        }
                        Some(&d) if d.is_ascii_digit() || d == '.' => Token::Id {
                            text: format!("-{}", self.word()),
                            quoted: false,
                        },
                        _ => return Err(self.error("stray '-'")),
                    }
                }
                c if is_id_char(c) => Token::Id {
                    text: self.word(),
                    quoted: false,
                },
                other => return Err(self.error(format!("unexpected character '{}'", other))),
            };
            tokens.push((token, line));
        }
        Ok(tokens)
    }

    fn skip_line(&mut self) {
        while let Some(&c) = self.chars.peek() {
            if c == '\n' {
                break;
            }
            self.bump();
        }
    }

    fn skip_block(&mut self) -> Result<()> {
        let start = self.line;
        let mut previous = '\0';
        while let Some(c) = self.bump() {
            if previous == '*' && c == '/' {
                return Ok(());
            }
            previous = c;
        }
        Err(NodeLinkError::syntax(FORMAT, start, "unterminated comment"))
    }

    fn word(&mut self) -> String {
        let mut word = String::new();
        while let Some(&c) = self.chars.peek() {
            if !is_id_char(c) {
                break;
            }
            word.push(c);
            self.bump();
        }
        word
    }

    fn quoted(&mut self) -> Result<String> {
        let start = self.line;
        self.bump();
        let mut text = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok(text),
                Some('\\') => match self.bump() {
                    Some(c @ ('"' | '\\')) => text.push(c),
                    Some('\n') => {}
                    Some(other) => {
                        text.push('\\');
                        text.push(other);
                    }
                    None => break,
                },
                Some(c) => text.push(c),
                None => break,
            }
        }
        Err(NodeLinkError::syntax(FORMAT, start, "unterminated string"))
    }

    fn html(&mut self) -> Result<String> {
        let start = self.line;
        self.bump();
        let mut depth = 1;
        let mut text = String::new();
        while let Some(c) = self.bump() {
            match c {
                '<' => depth += 1,
                '>' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(text);
                    }
                }
                _ => {}
            }
            text.push(c);
        }
        Err(NodeLinkError::syntax(FORMAT, start, "unterminated HTML string"))
    }
}

struct Parser<'o> {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    options: &'o ReadOptions,
    directed: bool,
}

impl<'o> Parser<'o> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(token, _)| token)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|(token, _)| token)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|(_, line)| *line)
            .unwrap_or(1)
    }

    fn error(&self, message: impl Into<String>) -> NodeLinkError {
        NodeLinkError::syntax(FORMAT, self.line(), message)
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        if self.eat(&expected) {
            Ok(())
        } else {
            Err(self.error(format!("expected {:?}, found {:?}", expected, self.peek())))
        }
    }

    fn is_keyword_at(&self, offset: usize, keyword: &str) -> bool {
        matches!(
            self.peek_at(offset),
            Some(Token::Id { text, quoted: false }) if text.eq_ignore_ascii_case(keyword)
        )
    }

    fn id(&mut self) -> Result<String> {
        let Some(Token::Id { text, quoted }) = self.peek().cloned() else {
            return Err(self.error(format!("expected an identifier, found {:?}", self.peek())));
        };
        self.pos += 1;

        let mut text = text;
        if quoted {
            while self.peek() == Some(&Token::Plus) {
                self.pos += 1;
                match self.peek().cloned() {
                    Some(Token::Id { text: more, quoted: true }) => {
                        self.pos += 1;
                        text.push_str(&more);
                    }
                    _ => return Err(self.error("'+' must join two quoted strings")),
                }
            }
        }
        Ok(text)
    }

    fn attr_list(&mut self) -> Result<Attributes> {
        let mut attributes = Attributes::new();
        while self.eat(&Token::LBracket) {
            while !self.eat(&Token::RBracket) {
                let key = self.id()?;
                let value = if self.eat(&Token::Equals) {
                    self.id()?
                } else {
                    "true".to_string()
                };
                attributes.insert(key, Value::String(value));
                if !self.eat(&Token::Comma) {
                    self.eat(&Token::Semicolon);
                }
            }
        }
        Ok(attributes)
    }

    fn node_id(&mut self) -> Result<NodeId> {
        let name = self.id()?;
        // port and compass point
        if self.eat(&Token::Colon) {
            self.id()?;
            if self.eat(&Token::Colon) {
                self.id()?;
            }
        }
        self.options.node_id(&name)
    }

    fn starts_subgraph(&self) -> bool {
        self.peek() == Some(&Token::LBrace) || self.is_keyword_at(0, "subgraph")
    }

    fn subgraph(&mut self, graph: &mut Graph, depth: usize) -> Result<Vec<NodeId>> {
        if self.is_keyword_at(0, "subgraph") {
            self.pos += 1;
            if self.peek() != Some(&Token::LBrace) {
                let name = self.id()?;
                debug!("Flattening subgraph {}", name);
            }
        }
        if depth >= MAX_NESTING {
            return Err(self.error(format!("subgraphs nested deeper than {} levels", MAX_NESTING)));
        }
        self.expect(Token::LBrace)?;
        let members = self.stmt_list(graph, depth + 1)?;
        self.expect(Token::RBrace)?;
        Ok(members)
    }

    /// Nodes named by an edge operand
    fn operand(&mut self, graph: &mut Graph, depth: usize) -> Result<Vec<NodeId>> {
        if self.starts_subgraph() {
            return self.subgraph(graph, depth);
        }
        let id = self.node_id()?;
        graph.add_node(id.clone(), Attributes::new());
        Ok(vec![id])
    }

    fn stmt_list(&mut self, graph: &mut Graph, depth: usize) -> Result<Vec<NodeId>> {
        let mut members = Vec::new();
        loop {
            match self.peek() {
                Some(Token::RBrace) => return Ok(members),
                None => return Err(self.error("missing closing '}'")),
                Some(_) => {}
            }
            self.stmt(graph, depth, &mut members)?;
            self.eat(&Token::Semicolon);
        }
    }

    fn stmt(&mut self, graph: &mut Graph, depth: usize, members: &mut Vec<NodeId>) -> Result<()> {
        for kind in ["graph", "node", "edge"] {
            if self.is_keyword_at(0, kind) && self.peek_at(1) == Some(&Token::LBracket) {
                self.pos += 1;
                let attributes = self.attr_list()?;
                if depth == 0 {
                    if kind == "graph" {
                        graph.attributes_mut().extend(attributes);
                    } else {
                        let defaults = graph
                            .attributes_mut()
                            .entry(kind)
                            .or_insert_with(|| Value::Object(Attributes::new()));
                        if let Value::Object(map) = defaults {
                            map.extend(attributes);
                        }
                    }
                }
                return Ok(());
            }
        }

        if matches!(self.peek(), Some(Token::Id { .. })) && self.peek_at(1) == Some(&Token::Equals) {
            let key = self.id()?;
            self.expect(Token::Equals)?;
            let value = self.id()?;
            if depth == 0 {
                graph.attributes_mut().insert(key, Value::String(value));
            }
            return Ok(());
        }

        let is_node = !self.starts_subgraph();
        let first = self.operand(graph, depth)?;
        members.extend(first.iter().cloned());

        if !matches!(self.peek(), Some(Token::EdgeOp { .. })) {
            if is_node {
                let attributes = self.attr_list()?;
                for id in first {
                    graph.add_node(id, attributes.clone());
                }
            }
            return Ok(());
        }

        let mut operands = vec![first];
        while let Some(&Token::EdgeOp { directed }) = self.peek() {
            if directed != self.directed {
                let op = if directed { "->" } else { "--" };
                return Err(self.error(format!("edge operator '{}' does not match the graph kind", op)));
            }
            self.pos += 1;
            let next = self.operand(graph, depth)?;
            members.extend(next.iter().cloned());
            operands.push(next);
        }

        let attributes = self.attr_list()?;
        for pair in operands.windows(2) {
            for source in &pair[0] {
                for target in &pair[1] {
                    graph.add_edge(source.clone(), target.clone(), attributes.clone());
                }
            }
        }
        Ok(())
    }
}

pub fn read(text: &str, options: &ReadOptions) -> Result<Graph> {
    let tokens = Lexer::new(text).tokenize()?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        options,
        directed: false,
    };

    let strict = parser.is_keyword_at(0, "strict");
    if strict {
        parser.pos += 1;
    }
    parser.directed = if parser.is_keyword_at(0, "digraph") {
        true
    } else if parser.is_keyword_at(0, "graph") {
        false
    } else {
        return Err(parser.error("expected 'graph' or 'digraph'"));
    };
    parser.pos += 1;

    let mut graph = Graph::new(parser.directed, !strict);
    if parser.peek() != Some(&Token::LBrace) {
        let name = parser.id()?;
        graph
            .attributes_mut()
            .insert("name".to_string(), Value::String(name));
    }

    parser.expect(Token::LBrace)?;
    parser.stmt_list(&mut graph, 0)?;
    parser.expect(Token::RBrace)?;

    if parser.pos < parser.tokens.len() {
        debug!("Ignoring content after the first DOT graph");
    }
    Ok(graph)
}

fn quote(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

fn attr_list(attributes: &Attributes) -> String {
    let pairs: Vec<String> = attributes
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| format!("{}={}", quote(key), quote(&super::value_to_text(value))))
        .collect();
    if pairs.is_empty() {
        String::new()
    } else {
        format!(" [{}]", pairs.join(", "))
    }
}

pub fn write<W: Write>(graph: &Graph, writer: &mut W) -> Result<()> {
    let strict = if graph.is_multigraph() { "" } else { "strict " };
    let kind = if graph.is_directed() { "digraph" } else { "graph" };
    let op = if graph.is_directed() { "->" } else { "--" };

    match graph.attributes().get("name") {
        Some(name) => writeln!(writer, "{}{} {} {{", strict, kind, quote(&super::value_to_text(name)))?,
        None => writeln!(writer, "{}{} {{", strict, kind)?,
    }

    for (key, value) in graph.attributes() {
        match (key.as_str(), value) {
            ("name", _) | (_, Value::Null) => {}
            ("node" | "edge" | "graph", Value::Object(defaults)) => {
                writeln!(writer, "  {}{};", key, attr_list(defaults))?
            }
            _ => writeln!(writer, "  {}={};", quote(key), quote(&super::value_to_text(value)))?,
        }
    }

    for node in graph.nodes() {
        writeln!(writer, "  {}{};", quote(&node.id.to_string()), attr_list(&node.attributes))?;
    }

    for (source, target, attributes) in graph.edges() {
        writeln!(
            writer,
            "  {} {} {}{};",
            quote(&source.to_string()),
            op,
            quote(&target.to_string()),
            attr_list(attributes)
        )?;
    }

    writeln!(writer, "}}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(text: &str) -> Graph {
        read(text, &ReadOptions::default()).unwrap()
    }

    #[test]
    fn test_read_digraph() {
        let graph = parse(
            r#"
            /* header */
            digraph "deps" {
                rankdir=LR; // layout
                node [shape=box];
                a [label="Alpha", color=red];
                a -> b -> c [weight=2];
                a -> b;
            }
            "#,
        );

        assert!(graph.is_directed());
        assert!(graph.is_multigraph());
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 3);
        assert_eq!(graph.attributes()["name"], json!("deps"));
        assert_eq!(graph.attributes()["rankdir"], json!("LR"));
        assert_eq!(graph.attributes()["node"], json!({"shape": "box"}));

        let a = graph.node_index(&"a".into()).unwrap();
        assert_eq!(graph.node(a).attributes["label"], json!("Alpha"));
        assert!(graph.has_edge(&"b".into(), &"c".into()));
        assert!(!graph.has_edge(&"c".into(), &"b".into()));
    }

    #[test]
    fn test_strict_graph_merges_parallel_edges() {
        let graph = parse("strict graph { a -- b; b -- a [w=1] }");
        assert!(!graph.is_directed());
        assert!(!graph.is_multigraph());
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn test_subgraph_operands_and_ports() {
        let graph = parse("digraph { a:n -> { b c } ; subgraph s { d } }");
        assert_eq!(graph.node_count(), 4);
        assert!(graph.has_edge(&"a".into(), &"b".into()));
        assert!(graph.has_edge(&"a".into(), &"c".into()));
        assert!(graph.contains_node(&"d".into()));
    }

    #[test]
    fn test_quoted_ids() {
        let graph = parse(r#"graph { "say \"hi\"" -- "part " + "two"; -1.5 -- <<b>x</b>> }"#);
        assert!(graph.contains_node(&r#"say "hi""#.into()));
        assert!(graph.contains_node(&"part two".into()));
        assert!(graph.contains_node(&"-1.5".into()));
        assert!(graph.contains_node(&"<b>x</b>".into()));
    }

    #[test]
    fn test_deep_subgraph_nesting_is_rejected() {
        let depth = 10_000;
        let text = format!("digraph {{ {} a {} }}", "{ ".repeat(depth), "} ".repeat(depth));
        let err = read(&text, &ReadOptions::default()).unwrap_err();
        assert!(matches!(err, NodeLinkError::Syntax { .. }), "{}", err);

        let shallow = format!("digraph {{ x -> {} a {} }}", "{ ".repeat(20), "} ".repeat(20));
        assert!(parse(&shallow).has_edge(&"x".into(), &"a".into()));
    }

    #[test]
    fn test_mismatched_edge_operator() {
        let err = read("graph {\n a -> b }", &ReadOptions::default()).unwrap_err();
        assert!(err.to_string().contains("line 2"), "{}", err);
    }

    #[test]
    fn test_missing_brace() {
        assert!(read("digraph { a -> b", &ReadOptions::default()).is_err());
        assert!(read("a -> b", &ReadOptions::default()).is_err());
    }

    #[test]
    fn test_write_then_read() {
        let graph = parse(r#"digraph g { a [label="A \\ \"quoted\""]; a -> b [weight=3] }"#);
        let mut out = Vec::new();
        write(&graph, &mut out).unwrap();
        let back = parse(std::str::from_utf8(&out).unwrap());

        assert!(back.is_directed());
        assert_eq!(back.edge_count(), 1);
        let a = back.node_index(&"a".into()).unwrap();
        assert_eq!(back.node(a).attributes["label"], json!(r#"A \ "quoted""#));
        let (_, _, edge) = back.edges().next().unwrap();
        assert_eq!(edge["weight"], json!("3"));
    }
}
