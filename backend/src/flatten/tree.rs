//! Sparse tree built from one sheet row before it becomes JSON.
//!
//! Array indexes from column headers may skip values (`a/0/x`, `a/3/x`);
//! arrays are kept as ordered maps and compacted on output.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::schema::Segment;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Leaf(Value),
    Object(Vec<(String, Node)>),
    Array(BTreeMap<usize, Node>),
}

/// A path that runs into a leaf or a container of the wrong kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PathConflict;

impl Node {
    pub(crate) fn object() -> Self {
        Node::Object(Vec::new())
    }

    fn container_for(segment: &Segment) -> Self {
        match segment {
            Segment::Key(_) => Node::Object(Vec::new()),
            Segment::Index(_) => Node::Array(BTreeMap::new()),
        }
    }

    /// Set `value` at `path`, creating containers as needed.
    pub(crate) fn insert(&mut self, path: &[Segment], value: Value) -> Result<(), PathConflict> {
        let Some((first, rest)) = path.split_first() else {
            return Err(PathConflict);
        };

        let child = match (self, first) {
            (Node::Object(entries), Segment::Key(key)) => {
                let position = match entries.iter().position(|(k, _)| k == key) {
                    Some(i) => i,
                    None => {
                        let fresh = match rest.first() {
                            Some(next) => Node::container_for(next),
                            None => Node::Leaf(Value::Null),
                        };
                        entries.push((key.clone(), fresh));
                        entries.len() - 1
                    }
                };
                &mut entries[position].1
            }
            (Node::Array(items), Segment::Index(i)) => items.entry(*i).or_insert_with(|| match rest.first() {
                Some(next) => Node::container_for(next),
                None => Node::Leaf(Value::Null),
            }),
            _ => return Err(PathConflict),
        };

        match rest {
            [] => match child {
                Node::Leaf(existing) if existing.is_null() => {
                    *existing = value;
                    Ok(())
                }
                _ => Err(PathConflict),
            },
            _ => child.insert(rest, value),
        }
    }

    /// Leaf value directly under `key`, if any.
    pub(crate) fn leaf(&self, key: &str) -> Option<&Value> {
        match self {
            Node::Object(entries) => entries.iter().find(|(k, _)| k == key).and_then(|(_, n)| match n {
                Node::Leaf(v) => Some(v),
                _ => None,
            }),
            _ => None,
        }
    }

    /// Fill in everything `other` has that `self` lacks. Existing leaves win.
    pub(crate) fn merge(&mut self, other: Node) {
        match (self, other) {
            (Node::Object(entries), Node::Object(incoming)) => {
                for (key, node) in incoming {
                    match entries.iter_mut().find(|(k, _)| *k == key) {
                        Some((_, existing)) => existing.merge(node),
                        None => entries.push((key, node)),
                    }
                }
            }
            (Node::Array(items), Node::Array(incoming)) => {
                for (i, node) in incoming {
                    match items.get_mut(&i) {
                        Some(existing) => existing.merge(node),
                        None => {
                            items.insert(i, node);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    pub(crate) fn into_value(self) -> Value {
        match self {
            Node::Leaf(v) => v,
            Node::Object(entries) => {
                let mut map = Map::new();
                for (key, node) in entries {
                    map.insert(key, node.into_value());
                }
                Value::Object(map)
            }
            Node::Array(items) => Value::Array(items.into_values().map(Node::into_value).collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(k: &str) -> Segment {
        Segment::Key(k.to_string())
    }

    #[test]
    fn test_insert_nested_paths() {
        let mut root = Node::object();
        root.insert(&[key("id")], json!("1")).unwrap();
        root.insert(&[key("tender"), key("title")], json!("Roads")).unwrap();
        root.insert(&[key("parties"), Segment::Index(2), key("name")], json!("B")).unwrap();
        root.insert(&[key("parties"), Segment::Index(0), key("name")], json!("A")).unwrap();

        assert_eq!(
            root.into_value(),
            json!({
                "id": "1",
                "tender": { "title": "Roads" },
                "parties": [{ "name": "A" }, { "name": "B" }]
            })
        );
    }

    #[test]
    fn test_conflicting_paths_are_rejected() {
        let mut root = Node::object();
        root.insert(&[key("tender")], json!("x")).unwrap();
        assert_eq!(root.insert(&[key("tender"), key("title")], json!("y")), Err(PathConflict));
        assert_eq!(root.insert(&[key("tender")], json!("z")), Err(PathConflict));
    }

    #[test]
    fn test_merge_keeps_existing_leaves() {
        let mut first = Node::object();
        first.insert(&[key("id")], json!("1")).unwrap();
        first.insert(&[key("items"), Segment::Index(0), key("id")], json!("a")).unwrap();

        let mut second = Node::object();
        second.insert(&[key("id")], json!("other")).unwrap();
        second.insert(&[key("items"), Segment::Index(1), key("id")], json!("b")).unwrap();
        second.insert(&[key("title")], json!("T")).unwrap();

        first.merge(second);
        assert_eq!(
            first.into_value(),
            json!({ "id": "1", "items": [{ "id": "a" }, { "id": "b" }], "title": "T" })
        );
    }
}
