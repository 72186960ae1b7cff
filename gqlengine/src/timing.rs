//! Per-phase and per-resolver timings, attached to responses in the Apollo tracing format.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_graphql::{
    Name, Response, ServerError, ServerResult, ValidationResult, Variables,
    extensions::{
        Extension, ExtensionContext, ExtensionFactory, NextExecute, NextParseQuery, NextResolve,
        NextValidation, ResolveInfo,
    },
    parser::types::ExecutableDocument,
};
use indexmap::IndexMap;
use jiff::Timestamp;

use crate::Value;

/// Response extension key the timings are attached under.
pub(crate) const EXTENSION_KEY: &str = "tracing";

/// Factory of [`Timing`] extensions, one per request.
pub(crate) struct Tracing;

impl ExtensionFactory for Tracing {
    fn create(&self) -> Arc<dyn Extension> {
        Arc::new(Timing {
            inner: Mutex::new(Inner::new()),
        })
    }
}

struct Phase {
    start: Timestamp,
    end: Timestamp,
}

struct ResolverTiming {
    path: Vec<String>,
    parent_type: String,
    field_name: String,
    return_type: String,
    start: Timestamp,
    end: Timestamp,
}

struct Inner {
    start: Timestamp,
    parsing: Option<Phase>,
    validation: Option<Phase>,
    resolvers: Vec<ResolverTiming>,
    introspected: bool,
}

impl Inner {
    fn new() -> Self {
        Self {
            start: Timestamp::now(),
            parsing: None,
            validation: None,
            resolvers: vec![],
            introspected: false,
        }
    }

    fn offset(&self, at: Timestamp) -> Value {
        nanos(self.start, at)
    }

    fn phase(&self, phase: Option<&Phase>) -> Value {
        let mut out = IndexMap::new();
        if let Some(p) = phase {
            _ = out.insert(Name::new("startOffset"), self.offset(p.start));
            _ = out.insert(Name::new("duration"), nanos(p.start, p.end));
        }
        Value::Object(out)
    }

    fn record(&self, start: Timestamp, end: Timestamp) -> Value {
        let resolvers = self
            .resolvers
            .iter()
            .map(|r| {
                let mut out = IndexMap::new();
                _ = out.insert(
                    Name::new("path"),
                    Value::List(r.path.iter().map(|p| Value::from(p.as_str())).collect()),
                );
                _ = out.insert(Name::new("parentType"), Value::from(r.parent_type.as_str()));
                _ = out.insert(Name::new("fieldName"), Value::from(r.field_name.as_str()));
                _ = out.insert(Name::new("returnType"), Value::from(r.return_type.as_str()));
                _ = out.insert(Name::new("startOffset"), self.offset(r.start));
                _ = out.insert(Name::new("duration"), nanos(r.start, r.end));
                Value::Object(out)
            })
            .collect();

        let mut execution = IndexMap::new();
        _ = execution.insert(Name::new("resolvers"), Value::List(resolvers));

        let mut out = IndexMap::new();
        _ = out.insert(Name::new("version"), Value::from(1));
        _ = out.insert(Name::new("startTime"), Value::from(start.to_string()));
        _ = out.insert(Name::new("endTime"), Value::from(end.to_string()));
        _ = out.insert(Name::new("duration"), nanos(start, end));
        _ = out.insert(Name::new("parsing"), self.phase(self.parsing.as_ref()));
        _ = out.insert(Name::new("validation"), self.phase(self.validation.as_ref()));
        _ = out.insert(Name::new("execution"), Value::Object(execution));
        Value::Object(out)
    }
}

fn nanos(from: Timestamp, to: Timestamp) -> Value {
    let nanos = to.duration_since(from).as_nanos();
    Value::from(i64::try_from(nanos).unwrap_or(i64::MAX))
}

/// Timings of a single request.
struct Timing {
    inner: Mutex<Inner>,
}

impl Timing {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait::async_trait]
impl Extension for Timing {
    async fn parse_query(
        &self,
        ctx: &ExtensionContext<'_>,
        query: &str,
        variables: &Variables,
        next: NextParseQuery<'_>,
    ) -> ServerResult<ExecutableDocument> {
        let start = Timestamp::now();
        let res = next.run(ctx, query, variables).await;
        self.lock().parsing = Some(Phase {
            start,
            end: Timestamp::now(),
        });
        res
    }

    async fn validation(
        &self,
        ctx: &ExtensionContext<'_>,
        next: NextValidation<'_>,
    ) -> Result<ValidationResult, Vec<ServerError>> {
        let start = Timestamp::now();
        let res = next.run(ctx).await;
        self.lock().validation = Some(Phase {
            start,
            end: Timestamp::now(),
        });
        res
    }

    async fn execute(
        &self,
        ctx: &ExtensionContext<'_>,
        operation_name: Option<&str>,
        next: NextExecute<'_>,
    ) -> Response {
        let start = self.lock().start;
        let resp = next.run(ctx, operation_name).await;
        let end = Timestamp::now();

        let mut inner = self.lock();
        if inner.introspected && inner.resolvers.is_empty() {
            return resp;
        }
        inner.resolvers.sort_by_key(|r| r.start);
        let record = inner.record(start, end);
        resp.extension(EXTENSION_KEY, record)
    }

    async fn resolve(
        &self,
        ctx: &ExtensionContext<'_>,
        info: ResolveInfo<'_>,
        next: NextResolve<'_>,
    ) -> ServerResult<Option<Value>> {
        if info.is_for_introspection {
            self.lock().introspected = true;
            return next.run(ctx, info).await;
        }
        let path = info.path_node.to_string_vec();
        let parent_type = info.parent_type.to_owned();
        let field_name = info.name.to_owned();
        let return_type = info.return_type.to_owned();
        let start = Timestamp::now();

        let res = next.run(ctx, info).await;

        self.lock().resolvers.push(ResolverTiming {
            path,
            parent_type,
            field_name,
            return_type,
            start,
            end: Timestamp::now(),
        });
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn measures_in_nanoseconds() {
        let start = Timestamp::from_second(10).unwrap();
        let end = Timestamp::from_second(12).unwrap();

        assert_eq!(nanos(start, end), Value::from(2_000_000_000_i64));
    }

    #[test]
    fn records_phases_and_resolvers() {
        let start = Timestamp::from_second(0).unwrap();
        let at = |ms: i64| Timestamp::from_millisecond(ms).unwrap();
        let mut inner = Inner::new();
        inner.start = start;
        inner.parsing = Some(Phase {
            start: at(1),
            end: at(2),
        });
        inner.resolvers.push(ResolverTiming {
            path: vec!["user".into()],
            parent_type: "Query".into(),
            field_name: "user".into(),
            return_type: "User".into(),
            start: at(3),
            end: at(5),
        });

        let Value::Object(record) = inner.record(start, at(6)) else {
            panic!("not an object");
        };
        assert_eq!(record["version"], Value::from(1));
        assert_eq!(record["duration"], Value::from(6_000_000_i64));

        let Value::Object(parsing) = &record["parsing"] else {
            panic!("not an object");
        };
        assert_eq!(parsing["startOffset"], Value::from(1_000_000_i64));

        let Value::Object(execution) = &record["execution"] else {
            panic!("not an object");
        };
        let Value::List(resolvers) = &execution["resolvers"] else {
            panic!("not a list");
        };
        let Value::Object(resolver) = &resolvers[0] else {
            panic!("not an object");
        };
        assert_eq!(resolver["fieldName"], Value::from("user"));
        assert_eq!(resolver["duration"], Value::from(2_000_000_i64));
    }
}
