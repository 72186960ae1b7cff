use std::{fmt, sync::Arc};

use async_graphql::SelectionField;

use crate::reflect::{BaseKind, BaseType, DecodeError, Dynamic, Erased, NativeType, Reflect};

/// Live view over the fields requested below the field being resolved.
///
/// Fragments are flattened, so a field requested through an inline fragment or a fragment
/// spread is selected just like a plain one.
#[derive(Clone, Default)]
pub struct FieldSelection {
    root: Arc<Node>,
}

#[derive(Default)]
struct Node {
    name: String,
    children: Vec<Node>,
}

impl Node {
    fn from_field(field: SelectionField<'_>) -> Self {
        Self {
            name: field.name().into(),
            children: field.selection_set().map(Self::from_field).collect(),
        }
    }

    fn matches(&self, segments: &[&str]) -> bool {
        match segments {
            [] => true,
            [first, rest @ ..] => {
                (*first == "*" || *first == self.name)
                    && (rest.is_empty() || self.children.iter().any(|c| c.matches(rest)))
            }
        }
    }
}

impl FieldSelection {
    pub(crate) fn new(field: SelectionField<'_>) -> Self {
        Self {
            root: Arc::new(Node::from_field(field)),
        }
    }

    /// Returns the name of the field being resolved.
    pub fn field_name(&self) -> &str {
        &self.root.name
    }

    /// Indicates whether any of the given field paths is selected.
    ///
    /// A path is a slash-delimited sequence of field names relative to the field being resolved,
    /// like `innerObject/intField`. A `*` segment matches any field, so `innerObject/*` checks
    /// whether anything inside `innerObject` is selected. A path starting with `/`, or with the
    /// name of the field being resolved, is anchored at that field itself.
    pub fn is_selected<S: AsRef<str>>(&self, names: impl IntoIterator<Item = S>) -> bool {
        names.into_iter().any(|name| {
            let name = name.as_ref();
            let path = if let Some(anchored) = name.strip_prefix('/') {
                anchored.to_owned()
            } else if name.starts_with("*/")
                || name.split('/').next() == Some(self.root.name.as_str())
            {
                name.to_owned()
            } else {
                format!("*/{name}")
            };
            let segments = path.split('/').filter(|s| !s.is_empty()).collect::<Vec<_>>();
            self.root.matches(&segments)
        })
    }
}

impl fmt::Debug for FieldSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldSelection")
            .field("field", &self.root.name)
            .finish_non_exhaustive()
    }
}

impl Reflect for FieldSelection {
    fn native() -> NativeType {
        NativeType::Base(BaseType::of::<Self>(BaseKind::Selection))
    }

    fn into_dynamic(self) -> Dynamic {
        Dynamic::Native(Erased::new(self))
    }

    fn from_dynamic(value: Dynamic) -> Result<Self, DecodeError> {
        match value {
            Dynamic::Null => Ok(Self::default()),
            v => v.downcast("FieldSelection"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str, children: Vec<Node>) -> Node {
        Node {
            name: name.into(),
            children,
        }
    }

    fn selection() -> FieldSelection {
        FieldSelection {
            root: Arc::new(node(
                "getTestObject",
                vec![
                    node("stringField", vec![]),
                    node("innerObject", vec![node("intField", vec![])]),
                ],
            )),
        }
    }

    #[test]
    fn checks_relative_paths() {
        let s = selection();

        assert!(s.is_selected(["stringField"]));
        assert!(s.is_selected(["innerObject"]));
        assert!(s.is_selected(["innerObject/intField"]));
        assert!(!s.is_selected(["innerObject/stringField"]));
        assert!(!s.is_selected(["missing"]));
        assert!(s.is_selected(["missing", "stringField"]));
    }

    #[test]
    fn checks_wildcards_and_anchors() {
        let s = selection();

        assert!(s.is_selected(["innerObject/*"]));
        assert!(!s.is_selected(["stringField/*"]));
        assert!(s.is_selected(["*/innerObject/intField"]));
        assert!(s.is_selected(["getTestObject/stringField"]));
        assert!(s.is_selected(["/getTestObject/innerObject"]));
        assert!(!s.is_selected(["/other/innerObject"]));
    }
}
