//! Shared pieces of the GraphML and GEXF codecs.

use crate::error::{NodeLinkError, Result};
use crate::models::Attributes;
use quick_xml::events::BytesStart;
use serde_json::Value;
use std::collections::HashMap;

/// XML attributes of an element keyed by local name, values unescaped
pub(crate) fn element_attributes(element: &BytesStart<'_>) -> Result<HashMap<String, String>> {
    let mut map = HashMap::new();
    for attribute in element.attributes() {
        let attribute = attribute?;
        let key = String::from_utf8_lossy(attribute.key.local_name().as_ref()).into_owned();
        let value = attribute.unescape_value()?.into_owned();
        map.insert(key, value);
    }
    Ok(map)
}

/// 1-based line containing byte offset `position`
pub(crate) fn line_at(text: &str, position: usize) -> usize {
    let end = position.min(text.len());
    text.as_bytes()[..end].iter().filter(|&&b| b == b'\n').count() + 1
}

/// Declared type of a data/attribute value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ValueType {
    Boolean,
    Integer,
    Double,
    Text,
}

impl ValueType {
    /// Map a GraphML `attr.type` or GEXF `type` name
    pub(crate) fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "boolean" => ValueType::Boolean,
            "int" | "integer" | "long" => ValueType::Integer,
            "float" | "double" => ValueType::Double,
            _ => ValueType::Text,
        }
    }

    /// Type name understood by both GraphML and GEXF
    pub(crate) fn name(self) -> &'static str {
        match self {
            ValueType::Boolean => "boolean",
            ValueType::Integer => "long",
            ValueType::Double => "double",
            ValueType::Text => "string",
        }
    }

    /// Type that can hold a JSON value, `None` for values that are skipped
    pub(crate) fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(_) => Some(ValueType::Boolean),
            Value::Number(n) if n.is_i64() => Some(ValueType::Integer),
            Value::Number(_) => Some(ValueType::Double),
            _ => Some(ValueType::Text),
        }
    }

    /// Widen two types so both values fit
    pub(crate) fn merge(self, other: Self) -> Self {
        use ValueType::*;
        match (self, other) {
            (a, b) if a == b => a,
            (Integer, Double) | (Double, Integer) => Double,
            _ => Text,
        }
    }

    pub(crate) fn parse(self, raw: &str) -> std::result::Result<Value, String> {
        let trimmed = raw.trim();
        match self {
            ValueType::Boolean => match trimmed.to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(Value::Bool(true)),
                "false" | "0" => Ok(Value::Bool(false)),
                _ => Err(format!("'{}' is not a boolean", raw)),
            },
            ValueType::Integer => trimmed
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| format!("'{}' is not an integer", raw)),
            ValueType::Double => trimmed
                .parse::<f64>()
                .map(Value::from)
                .map_err(|_| format!("'{}' is not a number", raw)),
            ValueType::Text => Ok(Value::String(raw.to_string())),
        }
    }
}

/// Attribute declarations collected for one element class when writing
#[derive(Debug, Default)]
pub(crate) struct KeyTable {
    pub(crate) keys: Vec<(String, ValueType)>,
}

impl KeyTable {
    pub(crate) fn from_attributes<'a>(
        maps: impl Iterator<Item = &'a Attributes>,
        skip: &[&str],
    ) -> Self {
        let mut keys: Vec<(String, ValueType)> = Vec::new();
        for map in maps {
            for (name, value) in map {
                if skip.contains(&name.as_str()) {
                    continue;
                }
                let Some(ty) = ValueType::of(value) else {
                    continue;
                };
                match keys.iter_mut().find(|(existing, _)| existing == name) {
                    Some((_, existing_ty)) => *existing_ty = existing_ty.merge(ty),
                    None => keys.push((name.clone(), ty)),
                }
            }
        }
        Self { keys }
    }

    pub(crate) fn position(&self, name: &str) -> Option<usize> {
        self.keys.iter().position(|(existing, _)| existing == name)
    }
}

/// Text written for a value of declared type `ty`
pub(crate) fn format_value(value: &Value, ty: ValueType) -> String {
    match (ty, value) {
        (ValueType::Double, Value::Number(n)) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.is_finite() => format!("{:.1}", f),
            _ => n.to_string(),
        },
        _ => super::value_to_text(value),
    }
}

pub(crate) fn xml_error(format: &'static str, text: &str, position: usize, message: impl Into<String>) -> NodeLinkError {
    NodeLinkError::syntax(format, line_at(text, position), message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_type_parse() {
        assert_eq!(ValueType::Boolean.parse("True").unwrap(), json!(true));
        assert_eq!(ValueType::Integer.parse(" 42 ").unwrap(), json!(42));
        assert_eq!(ValueType::Double.parse("2.5").unwrap(), json!(2.5));
        assert!(ValueType::Integer.parse("4.2").is_err());
    }

    #[test]
    fn test_key_table_widens_mixed_numbers() {
        let mut first = Attributes::new();
        first.insert("w".to_string(), json!(1));
        let mut second = Attributes::new();
        second.insert("w".to_string(), json!(1.5));
        second.insert("skip".to_string(), json!(null));

        let table = KeyTable::from_attributes([&first, &second].into_iter(), &[]);
        assert_eq!(table.keys, vec![("w".to_string(), ValueType::Double)]);
    }

    #[test]
    fn test_line_at() {
        assert_eq!(line_at("a\nb\nc", 0), 1);
        assert_eq!(line_at("a\nb\nc", 4), 3);
    }
}
