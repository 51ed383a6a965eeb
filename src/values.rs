use anyhow::{Context, Result};

/// One node of a decoded chart values tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueNode {
    /// Strings, numbers and booleans, kept in their textual form.
    Scalar(String),
    Mapping(Mapping),
    /// Never interpreted as an image declaration.
    List(Vec<ValueNode>),
    Absent,
}

/// A mapping with unique keys that keeps the decoder's iteration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mapping {
    entries: Vec<(String, ValueNode)>,
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `value` under `key`, replacing any earlier value in place.
    pub fn insert(&mut self, key: impl Into<String>, value: ValueNode) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&ValueNode> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ValueNode)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Decodes a YAML document whose root must be a mapping (or empty).
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        let value: serde_yaml_ng::Value =
            serde_yaml_ng::from_str(s).context("Failed to parse values YAML")?;
        match ValueNode::from(value) {
            ValueNode::Mapping(mapping) => Ok(mapping),
            ValueNode::Absent => Ok(Mapping::new()),
            _ => anyhow::bail!("Values YAML root must be a mapping"),
        }
    }
}

impl FromIterator<(String, ValueNode)> for Mapping {
    fn from_iter<I: IntoIterator<Item = (String, ValueNode)>>(iter: I) -> Self {
        let mut mapping = Mapping::new();
        for (key, value) in iter {
            mapping.insert(key, value);
        }
        mapping
    }
}

impl ValueNode {
    /// The scalar text, treating the empty string as not set.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ValueNode::Scalar(s) if !s.is_empty() => Some(s),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            ValueNode::Mapping(mapping) => Some(mapping),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ValueNode::Scalar(_) => "scalar",
            ValueNode::Mapping(_) => "mapping",
            ValueNode::List(_) => "list",
            ValueNode::Absent => "null",
        }
    }
}

impl From<serde_yaml_ng::Value> for ValueNode {
    fn from(value: serde_yaml_ng::Value) -> Self {
        use serde_yaml_ng::Value;
        match value {
            Value::Null => ValueNode::Absent,
            Value::Bool(b) => ValueNode::Scalar(b.to_string()),
            Value::Number(n) => ValueNode::Scalar(n.to_string()),
            Value::String(s) => ValueNode::Scalar(s),
            Value::Sequence(items) => ValueNode::List(items.into_iter().map(Into::into).collect()),
            Value::Mapping(mapping) => ValueNode::Mapping(
                mapping
                    .into_iter()
                    .map(|(k, v)| (yaml_key_text(k), v.into()))
                    .collect(),
            ),
            Value::Tagged(tagged) => tagged.value.into(),
        }
    }
}

fn yaml_key_text(key: serde_yaml_ng::Value) -> String {
    match ValueNode::from(key) {
        ValueNode::Scalar(s) => s,
        ValueNode::Absent => "null".to_string(),
        other => format!("<{}>", other.kind()),
    }
}

impl From<serde_json::Value> for ValueNode {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => ValueNode::Absent,
            Value::Bool(b) => ValueNode::Scalar(b.to_string()),
            Value::Number(n) => ValueNode::Scalar(n.to_string()),
            Value::String(s) => ValueNode::Scalar(s),
            Value::Array(items) => ValueNode::List(items.into_iter().map(Into::into).collect()),
            Value::Object(map) => ValueNode::Mapping(map.into()),
        }
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for Mapping {
    fn from(map: serde_json::Map<String, serde_json::Value>) -> Self {
        map.into_iter().map(|(k, v)| (k, v.into())).collect()
    }
}
