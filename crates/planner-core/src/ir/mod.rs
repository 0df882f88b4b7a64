//! The intermediate representation (spec §3).

pub mod decl;
pub mod expr;
pub mod graph;
pub mod statement;
pub mod value;

pub use decl::{EnumTypeIr, FieldDecl, FunctionIr, Param, StructTypeIr};
pub use expr::{ArgExprs, BinOp, CastType, DecoratorRef, EnumMemberRef, ExprIr};
pub use graph::ExecutionGraph;
pub use statement::{
    BlockerIr, BlockerKind, CommandStmtIr, FunctionCallStmtIr, Iteration, Pattern, RedirectMode, ShellOperator,
    StatementIr, TryIr, VarDeclIr, WhenArm,
};
pub use value::Value;
