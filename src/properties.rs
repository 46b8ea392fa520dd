use crate::error::MapError;
use crate::loader::xml::XmlNode;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    /// `int` and `object` properties.
    I64(i64),
    F32(f32),
    /// `string`, `file` and `color` properties.
    String(String),
    Class(Properties),
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Bool(v) => write!(f, "{v}"),
            PropertyValue::I64(v) => write!(f, "{v}"),
            PropertyValue::F32(v) => write!(f, "{v}"),
            PropertyValue::String(v) => f.write_str(v),
            PropertyValue::Class(_) => Ok(()),
        }
    }
}

/// Custom properties attached to a map, layer, object, tileset or tile.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Properties(HashMap<String, PropertyValue>);

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: PropertyValue) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.0.get(name)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.get(name)? {
            PropertyValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        match self.get(name)? {
            PropertyValue::I64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_i32(&self, name: &str) -> Option<i32> {
        self.get_i64(name).and_then(|v| i32::try_from(v).ok())
    }

    pub fn get_f32(&self, name: &str) -> Option<f32> {
        match self.get(name)? {
            PropertyValue::F32(v) => Some(*v),
            PropertyValue::I64(v) => Some(*v as f32),
            _ => None,
        }
    }

    pub fn get_string(&self, name: &str) -> Option<&str> {
        match self.get(name)? {
            PropertyValue::String(v) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn get_class(&self, name: &str) -> Option<&Properties> {
        match self.get(name)? {
            PropertyValue::Class(v) => Some(v),
            _ => None,
        }
    }

    /// Any value rendered as text; empty when the property is missing.
    pub fn string_or_empty(&self, name: &str) -> String {
        self.get(name).map(|v| v.to_string()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Reads the `<properties>` child of `owner`, if there is one.
    pub fn from_owner(owner: &XmlNode) -> Result<Properties, MapError> {
        match owner.child("properties") {
            Some(node) => Self::from_node(node),
            None => Ok(Properties::new()),
        }
    }

    /// Reads every `<property>` of a `<properties>` node.
    pub fn from_node(node: &XmlNode) -> Result<Properties, MapError> {
        let mut out = Properties::new();
        for prop in node.children_named("property") {
            let name = prop.require::<String>("name")?;
            let raw = prop.attr("value").unwrap_or(prop.text.as_str());
            let value = match prop.attr("type") {
                None | Some("string") | Some("file") | Some("color") => {
                    PropertyValue::String(raw.to_owned())
                }
                Some("bool") => PropertyValue::Bool(parse_typed(&name, "bool", raw)?),
                Some("int") | Some("object") => PropertyValue::I64(parse_typed(&name, "int", raw)?),
                Some("float") => PropertyValue::F32(parse_typed(&name, "float", raw)?),
                Some("class") => PropertyValue::Class(Self::from_owner(prop)?),
                Some(other) => {
                    return Err(MapError::UnsupportedPropertyType {
                        name,
                        kind: other.to_owned(),
                    });
                }
            };
            out.insert(name, value);
        }
        Ok(out)
    }
}

fn parse_typed<T: std::str::FromStr>(name: &str, kind: &str, raw: &str) -> Result<T, MapError> {
    raw.trim().parse().map_err(|_| {
        MapError::InvalidMap(format!("property '{name}' has invalid {kind} value '{raw}'"))
    })
}
