//! Generic element tree built from quick-xml events.
//!
//! The TMX walker only ever needs names, attributes, children and text, so
//! the whole document is read eagerly into [`XmlNode`]s and the loader
//! works on that tree.

use crate::error::MapError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::str::FromStr;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlNode {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
    /// Concatenated, trimmed text and CDATA content.
    pub text: String,
}

impl XmlNode {
    /// Parses a complete document and returns its root element.
    pub fn parse(txt: &str) -> Result<XmlNode, MapError> {
        let mut reader = Reader::from_str(txt);
        reader.trim_text(true);

        let mut stack: Vec<XmlNode> = Vec::new();
        let mut root = None;

        loop {
            match reader.read_event()? {
                Event::Start(e) => stack.push(Self::open(&e)?),
                Event::Empty(e) => {
                    let node = Self::open(&e)?;
                    attach(&mut stack, &mut root, node);
                }
                Event::End(_) => {
                    let node = stack
                        .pop()
                        .ok_or_else(|| MapError::InvalidMap("unbalanced closing tag".into()))?;
                    attach(&mut stack, &mut root, node);
                }
                Event::Text(t) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&t.unescape()?);
                    }
                }
                Event::CData(c) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(String::from_utf8_lossy(&c).trim());
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(MapError::InvalidMap("document ended inside an element".into()));
        }
        root.ok_or_else(|| MapError::InvalidMap("document has no root element".into()))
    }

    fn open(e: &BytesStart<'_>) -> Result<XmlNode, MapError> {
        let mut node = XmlNode {
            name: String::from_utf8_lossy(e.name().as_ref()).into_owned(),
            ..Default::default()
        };
        for attr in e.attributes() {
            let attr = attr.map_err(quick_xml::Error::from)?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            node.attributes.push((key, value));
        }
        Ok(node)
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Attribute parsed as `T`; `None` when absent or unparsable.
    pub fn attr_as<T: FromStr>(&self, key: &str) -> Option<T> {
        self.attr(key).and_then(|v| v.trim().parse().ok())
    }

    pub fn attr_or<T: FromStr>(&self, key: &str, default: T) -> T {
        self.attr_as(key).unwrap_or(default)
    }

    /// Attribute that must be present and parse as `T`.
    pub fn require<T: FromStr>(&self, key: &'static str) -> Result<T, MapError> {
        self.attr_as(key).ok_or_else(|| MapError::MissingAttribute {
            node: self.name.clone(),
            attribute: key,
        })
    }

    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }
}

fn attach(stack: &mut [XmlNode], root: &mut Option<XmlNode>, node: XmlNode) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => {
            if root.is_none() {
                *root = Some(node);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_nested_tree_with_attributes_and_text() {
        let doc = r#"<?xml version="1.0" encoding="UTF-8"?>
            <map width="2" height="3">
              <layer name="ground &amp; sky">
                <data encoding="csv">
                  1,2,
                  3,4
                </data>
              </layer>
              <objectgroup name="things"/>
            </map>"#;
        let root = XmlNode::parse(doc).expect("parse");
        assert_eq!(root.name, "map");
        assert_eq!(root.require::<u32>("width").expect("width"), 2);
        assert_eq!(root.attr_or("missing", 7u32), 7);

        let layer = root.child("layer").expect("layer");
        assert_eq!(layer.attr("name"), Some("ground & sky"));
        let data = layer.child("data").expect("data");
        assert!(data.text.starts_with("1,2,"));
        assert!(data.text.ends_with("3,4"));
        assert_eq!(root.children_named("objectgroup").count(), 1);
    }

    #[test]
    fn missing_attribute_names_node_and_key() {
        let root = XmlNode::parse("<tileset/>").expect("parse");
        let err = root.require::<u32>("firstgid").unwrap_err();
        assert!(matches!(
            err,
            MapError::MissingAttribute { attribute: "firstgid", .. }
        ));
    }

    #[test]
    fn rejects_mismatched_tags() {
        assert!(XmlNode::parse("<map><layer></map>").is_err());
        assert!(XmlNode::parse("").is_err());
    }
}
