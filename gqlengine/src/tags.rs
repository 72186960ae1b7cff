//! The `_tags` query, listing the root operations per tag.
//!
//! ```graphql
//! type Tag {
//!   tag: String!
//!   entries: [TagEntry!]!
//! }
//!
//! type TagEntry {
//!   type: String!
//!   name: String!
//!   description: String
//! }
//! ```

use std::sync::Arc;

use async_graphql::dynamic::{Field, FieldFuture, FieldValue, Object, TypeRef};
use indexmap::IndexMap;

use crate::{Value, engine::Operation};

/// Name of the query field.
pub(crate) const FIELD_NAME: &str = "_tags";

#[derive(Clone, Debug, PartialEq)]
struct Entry {
    kind: &'static str,
    name: String,
    description: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
struct Tag {
    tag: String,
    entries: Vec<Entry>,
}

/// Groups the operations per tag, in registration order. Untagged operations go under the empty
/// tag.
fn group<'a>(operations: impl IntoIterator<Item = &'a Operation>) -> Vec<Tag> {
    let mut tags: IndexMap<&str, Vec<Entry>> = IndexMap::new();
    for op in operations {
        let entry = Entry {
            kind: op.kind.as_str(),
            name: op.name.clone(),
            description: op.description.clone(),
        };
        if op.tags.is_empty() {
            tags.entry("").or_default().push(entry);
        } else {
            for tag in &op.tags {
                tags.entry(tag.as_str()).or_default().push(entry.clone());
            }
        }
    }
    tags.into_iter()
        .map(|(tag, entries)| Tag {
            tag: tag.into(),
            entries,
        })
        .collect()
}

/// Builds the query field and the types it refers to.
pub(crate) fn build<'a>(
    operations: impl IntoIterator<Item = &'a Operation>,
) -> (Field, [Object; 2]) {
    let tags = Arc::new(group(operations));

    let field = Field::new(
        FIELD_NAME,
        TypeRef::named_nn_list_nn("Tag"),
        move |_| {
            let tags = tags.clone();
            FieldFuture::new(async move {
                Ok(Some(FieldValue::list(
                    tags.iter().cloned().map(FieldValue::owned_any),
                )))
            })
        },
    )
    .description("operations grouped per tag");

    let tag = Object::new("Tag")
        .field(Field::new("tag", TypeRef::named_nn(TypeRef::STRING), |ctx| {
            FieldFuture::new(async move {
                let tag = ctx.parent_value.try_downcast_ref::<Tag>()?;
                Ok(Some(Value::from(tag.tag.as_str())))
            })
        }))
        .field(Field::new(
            "entries",
            TypeRef::named_nn_list_nn("TagEntry"),
            |ctx| {
                FieldFuture::new(async move {
                    let tag = ctx.parent_value.try_downcast_ref::<Tag>()?;
                    Ok(Some(FieldValue::list(
                        tag.entries.iter().cloned().map(FieldValue::owned_any),
                    )))
                })
            },
        ));

    let entry = Object::new("TagEntry")
        .field(Field::new("type", TypeRef::named_nn(TypeRef::STRING), |ctx| {
            FieldFuture::new(async move {
                let entry = ctx.parent_value.try_downcast_ref::<Entry>()?;
                Ok(Some(Value::from(entry.kind)))
            })
        }))
        .field(Field::new("name", TypeRef::named_nn(TypeRef::STRING), |ctx| {
            FieldFuture::new(async move {
                let entry = ctx.parent_value.try_downcast_ref::<Entry>()?;
                Ok(Some(Value::from(entry.name.as_str())))
            })
        }))
        .field(Field::new("description", TypeRef::named(TypeRef::STRING), |ctx| {
            FieldFuture::new(async move {
                let entry = ctx.parent_value.try_downcast_ref::<Entry>()?;
                Ok(entry.description.as_deref().map(Value::from))
            })
        }));

    (field, [tag, entry])
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        engine::Target,
        plugin::OperationKind,
        resolve::{Resolver, Site},
        schema::Registry,
    };

    fn operation(kind: OperationKind, name: &str, tags: &[&str]) -> Operation {
        let resolver =
            Resolver::synthesize(&mut Registry::new(), name, || async { 1_i32 }, Site::Query, false)
                .unwrap();
        Operation {
            kind,
            name: name.into(),
            description: Some(format!("{name} op")),
            tags: tags.iter().map(|t| (*t).into()).collect(),
            checkers: vec![],
            target: Target::Single(resolver),
        }
    }

    #[test]
    fn groups_per_tag() {
        let ops = [
            operation(OperationKind::Query, "user", &["users"]),
            operation(OperationKind::Mutation, "ping", &[]),
            operation(OperationKind::Mutation, "addUser", &["users", "admin"]),
        ];

        let tags = group(&ops);

        assert_eq!(
            tags.iter()
                .map(|t| (
                    t.tag.as_str(),
                    t.entries.iter().map(|e| (e.kind, e.name.as_str())).collect::<Vec<_>>(),
                ))
                .collect::<Vec<_>>(),
            [
                ("users", vec![("query", "user"), ("mutation", "addUser")]),
                ("", vec![("mutation", "ping")]),
                ("admin", vec![("mutation", "addUser")]),
            ],
        );
        assert_eq!(tags[0].entries[0].description.as_deref(), Some("user op"));
    }
}
