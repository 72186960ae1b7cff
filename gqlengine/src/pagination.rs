//! Paged queries, composed out of a list resolver and a total count resolver.
//!
//! The composed field takes the union of both resolvers' arguments, plus `page` and `size` when
//! neither declares them, and resolves into a `<Element>PaginationResults` object:
//!
//! ```graphql
//! type UserPaginationResults {
//!   page: Int
//!   total: Int
//!   list: [User]
//! }
//! ```

use arcstr::ArcStr;
use async_graphql::dynamic::ResolverContext;
use indexmap::IndexMap;

use crate::{
    FieldError, RegistrationError, Value,
    engine::Runtime,
    reflect::Dynamic,
    resolve::{Resolver, codec},
    schema::{
        Access, Argument, Builtin, DeprecationStatus, Field, FieldType, MetaType, Named,
        ObjectMeta, Registry, Role,
    },
};

/// Page requested when the `page` argument is absent or malformed.
pub const DEFAULT_PAGE: i64 = 1;

/// Page size requested when the `size` argument is absent or malformed.
pub const DEFAULT_SIZE: i64 = 10;

/// Requested window of a paged query, decoded out of the raw field arguments.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Page {
    /// 1-based page number.
    pub page: i64,
    /// Number of elements per page.
    pub size: i64,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            size: DEFAULT_SIZE,
        }
    }
}

impl Page {
    /// Decodes `page` and `size` permissively, falling back to the defaults.
    pub fn from_arguments(raw: &IndexMap<async_graphql::Name, Value>) -> Self {
        let get = |key: &str, default: i64| {
            raw.get(key)
                .map(codec::plain)
                .filter(|v| !v.is_null())
                .and_then(|v| v.weak_i64("Int").ok())
                .unwrap_or(default)
        };
        Self {
            page: get("page", DEFAULT_PAGE),
            size: get("size", DEFAULT_SIZE),
        }
    }
}

/// List resolver and total count resolver, resolving a single paged field.
#[derive(Debug)]
pub(crate) struct Pagination {
    list: Resolver,
    total: Resolver,
    shared_arguments: bool,
    arguments: Vec<Argument>,
    wrapper: FieldType,
}

impl Pagination {
    /// Pairs already synthesized resolvers, registering the wrapper type of the list element.
    pub(crate) fn compose(
        registry: &mut Registry,
        list: Resolver,
        total: Resolver,
    ) -> Result<Self, RegistrationError> {
        let (Some(elements), Some(base)) = (list.payload().cloned(), list.payload_base().copied())
        else {
            return Err(RegistrationError::pagination(format!(
                "{} should return a list",
                list.name(),
            )));
        };
        if !elements.is_list {
            return Err(RegistrationError::pagination(format!(
                "{} should return a list, not {elements}",
                list.name(),
            )));
        }
        match total.payload() {
            Some(ty) if !ty.is_list && ty.named == Named::Builtin(Builtin::Int) => {}
            other => {
                return Err(RegistrationError::pagination(format!(
                    "{} should return an integer, not {}",
                    total.name(),
                    other.map_or_else(|| "nothing".into(), ToString::to_string),
                )));
            }
        }

        let shared_arguments = match (list.arguments(), total.arguments()) {
            (Some(l), Some(t)) => l.base == t.base,
            _ => false,
        };
        let mut arguments: Vec<Argument> = vec![];
        for arg in list
            .arguments()
            .into_iter()
            .chain(total.arguments())
            .flat_map(|meta| meta.arguments.iter())
        {
            if !arguments.iter().any(|a| a.name == arg.name) {
                arguments.push(arg.clone());
            }
        }
        for (name, default) in [("page", DEFAULT_PAGE), ("size", DEFAULT_SIZE)] {
            if !arguments.iter().any(|a| a.name == name) {
                arguments.push(Argument {
                    name: name.into(),
                    description: None,
                    arg_type: FieldType::builtin(Builtin::Int),
                    default_value: Some(Value::from(default)),
                    deprecation_status: DeprecationStatus::Current,
                    path: vec![],
                });
            }
        }

        let name = registry.synthesized((base.id(), Role::Paginated), |_| {
            let int = FieldType::builtin(Builtin::Int);
            let field = |name: &'static str, field_type: FieldType| Field {
                name: name.into(),
                description: None,
                field_type,
                deprecation_status: DeprecationStatus::Current,
                ident: name,
                owner: base,
                need_resolver: false,
                access: Access::Key(name),
            };
            Ok(MetaType::Object(ObjectMeta {
                name: ArcStr::from(format!("{}PaginationResults", elements.name)),
                description: Some(format!("paged results of {}", elements.name).into()),
                fields: vec![
                    field("page", int.clone()),
                    field("total", int),
                    field("list", elements.clone()),
                ],
                interface_names: vec![],
                delegation: None,
            }))
        })?;

        Ok(Self {
            list,
            total,
            shared_arguments,
            arguments,
            wrapper: FieldType::new(Named::Registered(base.id(), Role::Paginated), name),
        })
    }

    /// Returns the schema arguments of the composed field.
    pub(crate) fn arguments(&self) -> &[Argument] {
        &self.arguments
    }

    /// Returns the type of the composed field.
    pub(crate) fn wrapper(&self) -> &FieldType {
        &self.wrapper
    }

    /// Resolves the list, then the total, into a value of the wrapper type.
    pub(crate) async fn resolve(
        &self,
        runtime: &Runtime,
        ctx: &ResolverContext<'_>,
    ) -> Result<Dynamic, FieldError> {
        let page = Page::from_arguments(ctx.args.as_index_map());

        let list_input = runtime.invocation(ctx, &self.list)?;
        let total_input = if self.shared_arguments {
            runtime.invocation_with(ctx, &self.total, list_input.arguments.clone())
        } else {
            runtime.invocation(ctx, &self.total)?
        };
        let list = self.list.invoke(list_input).await?.payload;
        let total = self.total.invoke(total_input).await?.payload;

        let mut out = IndexMap::new();
        _ = out.insert("page".into(), Dynamic::Int(page.page));
        _ = out.insert("total".into(), Dynamic::Int(coerce_total(&total)));
        _ = out.insert("list".into(), list);
        Ok(Dynamic::Object(out))
    }
}

/// Coerces the total count permissively, counting anything unrepresentable as `0`.
fn coerce_total(total: &Dynamic) -> i64 {
    match total {
        Dynamic::Int(_) | Dynamic::Uint(_) | Dynamic::Bool(_) | Dynamic::String(_) => {
            total.weak_i64("Int").unwrap_or(0)
        }
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(json: serde_json::Value) -> IndexMap<async_graphql::Name, Value> {
        match Value::from_json(json).unwrap() {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn decodes_page_permissively() {
        assert_eq!(
            Page::from_arguments(&raw(serde_json::json!({"page": 2, "size": "3"}))),
            Page { page: 2, size: 3 },
        );
        assert_eq!(
            Page::from_arguments(&raw(serde_json::json!({"page": "x", "other": 1}))),
            Page::default(),
        );
        assert_eq!(
            Page::from_arguments(&raw(serde_json::json!({"size": null}))),
            Page { page: 1, size: 10 },
        );
    }

    #[test]
    fn coerces_total() {
        assert_eq!(coerce_total(&Dynamic::Int(7)), 7);
        assert_eq!(coerce_total(&Dynamic::Uint(7)), 7);
        assert_eq!(coerce_total(&Dynamic::String("12".into())), 12);
        assert_eq!(coerce_total(&Dynamic::Bool(true)), 1);
        assert_eq!(coerce_total(&Dynamic::String("many".into())), 0);
        assert_eq!(coerce_total(&Dynamic::Float(2.5)), 0);
        assert_eq!(coerce_total(&Dynamic::Null), 0);
    }
}
