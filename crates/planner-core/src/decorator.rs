//! Decorator schema and argument canonicalization (spec §4.3).
//!
//! Grounded on `signature.rs`'s positional-then-keyword parameter binding
//! for Python calls, applied here to a decorator's declared schema instead
//! of a function signature.

use smallvec::SmallVec;

use crate::ir::{ArgExprs, DecoratorRef, ExprIr};

/// One declared parameter of a decorator (spec §4.3).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ParamSchema {
    pub name: String,
    pub required: bool,
}

/// A decorator's declared argument schema: ordered parameters, which one
/// (if any) is primary (bound by `@name.selector` / `@name("...")` form),
/// and a map from deprecated names to their canonical replacement.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct DecoratorSchema {
    pub params: Vec<ParamSchema>,
    pub primary: Option<String>,
    pub deprecated: Vec<(String, String)>,
}

impl DecoratorSchema {
    #[must_use]
    pub fn new(params: Vec<ParamSchema>) -> Self {
        Self { params, primary: None, deprecated: Vec::new() }
    }

    #[must_use]
    pub fn with_primary(mut self, name: impl Into<String>) -> Self {
        self.primary = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_deprecated(mut self, old: impl Into<String>, new: impl Into<String>) -> Self {
        self.deprecated.push((old.into(), new.into()));
        self
    }

    fn canonical_name<'a>(&'a self, name: &'a str) -> &'a str {
        self.deprecated
            .iter()
            .find(|(old, _)| old == name)
            .map_or(name, |(_, new)| new.as_str())
    }

    /// Declared parameter order with required parameters first, mirroring
    /// how positional arguments fill unreserved slots (spec §4.3 step 2).
    fn ordered_names(&self) -> impl Iterator<Item = &str> {
        self.params
            .iter()
            .filter(|p| p.required)
            .chain(self.params.iter().filter(|p| !p.required))
            .map(|p| p.name.as_str())
    }
}

/// Canonicalizes a decorator call's positional and named arguments against
/// its schema (spec §4.3).
///
/// 1. Reserve all parameter names the caller used explicitly (after
///    rewriting any deprecated name to canonical).
/// 2. Walk positional arguments, filling unreserved slots in declared
///    "required first, then optional" order, skipping any slot the primary
///    parameter already claims (the `.selector` form binds the primary
///    directly and positional args must not re-bind it).
/// 3. Deprecated names are rewritten to canonical ones; caller value order
///    is preserved throughout.
#[must_use]
pub fn canonicalize(
    schema: &DecoratorSchema,
    positional: Vec<ExprIr>,
    named: Vec<(String, ExprIr)>,
    primary_bound: bool,
) -> ArgExprs {
    let mut result: ArgExprs = SmallVec::new();
    let mut reserved: std::collections::HashSet<&str> = std::collections::HashSet::new();

    if primary_bound {
        if let Some(primary) = schema.primary.as_deref() {
            reserved.insert(primary);
        }
    }
    for (name, _) in &named {
        reserved.insert(schema.canonical_name(name));
    }

    for (name, expr) in named {
        result.push((schema.canonical_name(&name).to_owned(), expr));
    }

    let mut slots = schema.ordered_names().filter(|n| !reserved.contains(n));
    for expr in positional {
        if let Some(slot) = slots.next() {
            result.push((slot.to_owned(), expr));
        } else {
            // No declared slot left: keep it positionally-named so callers
            // can still see the value (schema drift, not a planner bug).
            result.push((format!("arg{}", result.len() + 1), expr));
        }
    }

    result
}

/// Read-only, idempotent lookup from decorator name to its declared schema
/// (spec §4.3 "Decorator-schema lookups are read-only and idempotent").
pub trait DecoratorSchemaRegistry {
    fn schema(&self, decorator_name: &str) -> Option<&DecoratorSchema>;
}

/// A fixed, compile-time-known schema table for tests and the CLI demo.
#[derive(Default)]
pub struct StaticSchemaRegistry(std::collections::HashMap<String, DecoratorSchema>);

impl StaticSchemaRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, schema: DecoratorSchema) -> Self {
        self.0.insert(name.into(), schema);
        self
    }
}

impl DecoratorSchemaRegistry for StaticSchemaRegistry {
    fn schema(&self, decorator_name: &str) -> Option<&DecoratorSchema> {
        self.0.get(decorator_name)
    }
}

/// Normalizes `@var.X` and `@var("X")` to a plain variable reference (spec
/// §3 "Two normalizations are required").
#[must_use]
pub fn normalize_var_ref(decorator: &DecoratorRef) -> Option<String> {
    if decorator.name != "var" {
        return None;
    }
    if let Some(selector) = &decorator.selector {
        return Some(selector.clone());
    }
    decorator.args.first().and_then(|(_, expr)| match expr {
        ExprIr::Literal(crate::ir::Value::String(s)) => Some(s.clone()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Value;

    fn lit(s: &str) -> ExprIr {
        ExprIr::Literal(Value::String(s.to_owned()))
    }

    #[test]
    fn positional_fills_required_then_optional() {
        let schema = DecoratorSchema::new(vec![
            ParamSchema { name: "times".to_owned(), required: true },
            ParamSchema { name: "delay".to_owned(), required: false },
        ]);
        let result = canonicalize(&schema, vec![lit("2"), lit("3s")], vec![], false);
        assert_eq!(result[0].0, "times");
        assert_eq!(result[1].0, "delay");
    }

    #[test]
    fn explicit_named_arg_is_skipped_by_positional_fill() {
        let schema = DecoratorSchema::new(vec![
            ParamSchema { name: "times".to_owned(), required: true },
            ParamSchema { name: "delay".to_owned(), required: false },
        ]);
        let result = canonicalize(&schema, vec![lit("3s")], vec![("times".to_owned(), lit("2"))], false);
        assert!(result.iter().any(|(n, _)| n == "times"));
        assert!(result.iter().any(|(n, _)| n == "delay"));
    }

    #[test]
    fn deprecated_name_rewritten_to_canonical() {
        let schema = DecoratorSchema::new(vec![ParamSchema { name: "retries".to_owned(), required: true }])
            .with_deprecated("times", "retries");
        let result = canonicalize(&schema, vec![], vec![("times".to_owned(), lit("2"))], false);
        assert_eq!(result[0].0, "retries");
    }

    #[test]
    fn primary_selector_excludes_positional_rebind() {
        let schema = DecoratorSchema::new(vec![
            ParamSchema { name: "name".to_owned(), required: true },
            ParamSchema { name: "default".to_owned(), required: false },
        ])
        .with_primary("name");
        // `@var.X` form: `name` is already bound by the selector, so a
        // positional arg must land on `default`, not re-bind `name`.
        let result = canonicalize(&schema, vec![lit("fallback")], vec![], true);
        assert_eq!(result[0].0, "default");
    }

    #[test]
    fn var_dot_selector_normalizes() {
        let decorator = DecoratorRef { name: "var".to_owned(), selector: Some("HOME".to_owned()), args: SmallVec::new() };
        assert_eq!(normalize_var_ref(&decorator), Some("HOME".to_owned()));
    }

    #[test]
    fn var_call_form_normalizes() {
        let mut args: ArgExprs = SmallVec::new();
        args.push(("arg1".to_owned(), lit("HOME")));
        let decorator = DecoratorRef { name: "var".to_owned(), selector: None, args };
        assert_eq!(normalize_var_ref(&decorator), Some("HOME".to_owned()));
    }
}
