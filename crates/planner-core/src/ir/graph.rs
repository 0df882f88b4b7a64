//! `ExecutionGraph` — the IR root (spec §3).

use std::collections::HashMap;

use crate::error::{EventPosition, PlannerError, PlannerResult};
use crate::scope::ScopeStack;

use super::decl::{EnumTypeIr, FunctionIr, StructTypeIr};
use super::statement::StatementIr;

/// Owns everything the IR builder produced: ordered top-level statements,
/// name-keyed declaration tables, and the outermost scope stack (spec §3).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ExecutionGraph {
    pub top_level: Vec<StatementIr>,
    pub functions: HashMap<String, FunctionIr>,
    pub structs: HashMap<String, StructTypeIr>,
    pub enums: HashMap<String, EnumTypeIr>,
    pub root_scope: ScopeStack,
}

impl ExecutionGraph {
    #[must_use]
    pub fn new() -> Self {
        Self {
            top_level: Vec::new(),
            functions: HashMap::new(),
            structs: HashMap::new(),
            enums: HashMap::new(),
            root_scope: ScopeStack::new(),
        }
    }

    /// Registers a function, rejecting a duplicate name (spec §3 invariant 2
    /// extends naturally to top-level declarations sharing a namespace).
    pub fn declare_function(&mut self, func: FunctionIr, position: EventPosition) -> PlannerResult<()> {
        if self.functions.contains_key(&func.name) {
            return Err(PlannerError::StructuralIr {
                message: format!("duplicate function \"{}\"", func.name),
                position,
            });
        }
        self.functions.insert(func.name.clone(), func);
        Ok(())
    }

    pub fn declare_struct(&mut self, decl: StructTypeIr, position: EventPosition) -> PlannerResult<()> {
        decl.validate(position)?;
        if self.structs.contains_key(&decl.name) {
            return Err(PlannerError::StructuralIr {
                message: format!("duplicate struct \"{}\"", decl.name),
                position,
            });
        }
        self.structs.insert(decl.name.clone(), decl);
        Ok(())
    }

    pub fn declare_enum(&mut self, decl: EnumTypeIr, position: EventPosition) -> PlannerResult<()> {
        decl.validate(position)?;
        if self.enums.contains_key(&decl.name) {
            return Err(PlannerError::StructuralIr {
                message: format!("duplicate enum \"{}\"", decl.name),
                position,
            });
        }
        self.enums.insert(decl.name.clone(), decl);
        Ok(())
    }

    /// All function names, sorted, for fuzzy-match suggestions (spec §4.8).
    #[must_use]
    pub fn function_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.functions.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for ExecutionGraph {
    fn default() -> Self {
        Self::new()
    }
}
