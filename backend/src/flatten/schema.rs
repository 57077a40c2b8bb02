//! Navigation over an item schema for typing cells and translating titles.
//!
//! Only local `$ref`s (`#/definitions/...`) are followed. Remote references
//! are left unresolved, which leaves the affected cells as strings.

use serde_json::Value;

/// Maximum `$ref` hops before giving up on a cycle.
const MAX_REF_DEPTH: usize = 32;

/// One step in a flattened column path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// Borrowing view over a schema document.
#[derive(Debug, Clone, Copy)]
pub struct SchemaIndex<'a> {
    root: &'a Value,
}

impl<'a> SchemaIndex<'a> {
    pub fn new(root: &'a Value) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &'a Value {
        self.resolve(self.root)
    }

    /// Follow local `$ref`s until a concrete schema is reached.
    pub fn resolve(&self, mut schema: &'a Value) -> &'a Value {
        for _ in 0..MAX_REF_DEPTH {
            let target = schema
                .get("$ref")
                .and_then(Value::as_str)
                .and_then(|r| r.strip_prefix('#'))
                .and_then(|pointer| self.root.pointer(pointer));
            match target {
                Some(next) => schema = next,
                None => return schema,
            }
        }
        schema
    }

    /// Declared types of a schema (`"type": "x"` or `"type": ["x", "null"]`).
    pub fn types(&self, schema: &'a Value) -> Vec<&'a str> {
        match self.resolve(schema).get("type") {
            Some(Value::String(t)) => vec![t.as_str()],
            Some(Value::Array(ts)) => ts.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        }
    }

    pub fn has_type(&self, schema: &'a Value, name: &str) -> bool {
        self.types(schema).contains(&name)
    }

    /// Child schema for a property name.
    pub fn property(&self, schema: &'a Value, name: &str) -> Option<&'a Value> {
        self.resolve(schema)
            .get("properties")
            .and_then(|p| p.get(name))
            .map(|s| self.resolve(s))
    }

    /// Property whose `title` matches, case-insensitively.
    pub fn property_by_title(&self, schema: &'a Value, title: &str) -> Option<(&'a str, &'a Value)> {
        let wanted = title.trim().to_lowercase();
        self.resolve(schema)
            .get("properties")
            .and_then(Value::as_object)?
            .iter()
            .map(|(name, child)| (name.as_str(), self.resolve(child)))
            .find(|(_, child)| {
                child
                    .get("title")
                    .and_then(Value::as_str)
                    .is_some_and(|t| t.trim().to_lowercase() == wanted)
            })
    }

    /// Title of a property, if the schema declares one.
    pub fn title_of(&self, schema: &'a Value, name: &str) -> Option<&'a str> {
        self.property(schema, name)
            .and_then(|child| child.get("title"))
            .and_then(Value::as_str)
    }

    /// Schema of array elements.
    pub fn items(&self, schema: &'a Value) -> Option<&'a Value> {
        self.resolve(schema).get("items").map(|s| self.resolve(s))
    }

    /// Schema reached by walking a column path from `schema`.
    pub fn walk(&self, schema: &'a Value, path: &[Segment]) -> Option<&'a Value> {
        let mut current = self.resolve(schema);
        for segment in path {
            current = match segment {
                Segment::Key(name) => self.property(current, name)?,
                Segment::Index(_) => self.items(current)?,
            };
        }
        Some(current)
    }
}
