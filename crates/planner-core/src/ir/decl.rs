//! Top-level declarations (spec §3 "FunctionIR", "StructTypeIR", "EnumTypeIR").

use crate::error::{EventPosition, PlannerError, PlannerResult};
use crate::scope::ScopeStack;

use super::expr::ExprIr;
use super::statement::StatementIr;

/// One function parameter (spec §3 "FunctionIR": parameters).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Param {
    pub name: String,
    pub type_annotation: Option<String>,
    pub default: Option<ExprIr>,
}

/// A `fun` declaration.
///
/// `scope_snapshot` is captured at the definition site (spec §3 invariant 4,
/// §4.1): resolution of this function's body sees the lexical environment
/// that existed when `fun` was parsed, never the caller's environment.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FunctionIr {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Vec<StatementIr>,
    pub scope_snapshot: ScopeStack,
}

/// A struct field or enum member declaration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FieldDecl {
    pub name: String,
    pub type_annotation: Option<String>,
    pub default: Option<ExprIr>,
}

/// `struct Name { fields... }` — declarative only, no runtime behavior
/// beyond serving `TypeName` resolution (spec §3).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StructTypeIr {
    pub name: String,
    pub fields: Vec<FieldDecl>,
}

/// `enum Name { members... }` — declarative only, serves `EnumName.Member`
/// resolution (spec §3).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EnumTypeIr {
    pub name: String,
    pub members: Vec<FieldDecl>,
}

fn reject_duplicates(
    names: impl Iterator<Item = String>,
    what: &str,
    position: EventPosition,
) -> PlannerResult<()> {
    let mut seen = std::collections::HashSet::new();
    for name in names {
        if !seen.insert(name.clone()) {
            return Err(PlannerError::StructuralIr {
                message: format!("duplicate {what} \"{name}\""),
                position,
            });
        }
    }
    Ok(())
}

impl StructTypeIr {
    /// Validates no duplicate field names (spec §3 invariant 2).
    pub fn validate(&self, position: EventPosition) -> PlannerResult<()> {
        reject_duplicates(self.fields.iter().map(|f| f.name.clone()), "field", position)
    }
}

impl EnumTypeIr {
    /// Validates no duplicate member names (spec §3 invariant 2).
    pub fn validate(&self, position: EventPosition) -> PlannerResult<()> {
        reject_duplicates(self.members.iter().map(|m| m.name.clone()), "enum member", position)
    }
}
