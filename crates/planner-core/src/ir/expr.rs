//! Expression IR (spec §3 "ExprIR") and decorator-reference canonicalization.

use smallvec::SmallVec;

use super::value::Value;

/// Canonicalized argument value: a literal value or a nested expression —
/// decorator arguments may themselves be any expression, not just literals
/// (spec §3 "DecoratorRef").
pub type ArgExprs = SmallVec<[(String, ExprIr); 4]>;

/// A binary operator (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinOp {
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::And => "&&",
            Self::Or => "||",
        }
    }
}

/// A scalar cast target type (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CastType {
    Int,
    Float,
    String,
    Bool,
    Duration,
}

/// A reference to a decorator call, already normalized per spec §3:
/// `@var.X` and `@var("X")` both become `ExprIr::VarRef("X")` upstream in
/// the builder, never a `DecoratorRef` with name `"var"` — this variant
/// exists for every other decorator.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DecoratorRef {
    /// Top-level identifier, e.g. `env`, `retry`.
    pub name: String,
    /// Dotted tail, e.g. `HOME` in `@env.HOME`.
    pub selector: Option<String>,
    /// Canonicalized arguments, in the decorator's declared parameter order.
    pub args: ArgExprs,
}

impl DecoratorRef {
    /// Dotted path used to group decorator calls into batches (spec §4.5),
    /// e.g. `"@env"` or `"@retry"` — the selector is not part of the path,
    /// only of the call payload, since batching groups by decorator
    /// identity, not by which member of it was selected.
    #[must_use]
    pub fn path(&self) -> String {
        format!("@{}", self.name)
    }
}

/// A member of an enum literal reference (spec §3 "EnumMemberRef").
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EnumMemberRef {
    pub enum_name: String,
    pub member_name: String,
}

/// An expression node (spec §3 "ExprIR").
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum ExprIr {
    Literal(Value),
    VarRef(String),
    DecoratorRef(DecoratorRef),
    BinaryOp { op: BinOp, left: Box<ExprIr>, right: Box<ExprIr> },
    TypeCast { value: Box<ExprIr>, target: CastType, optional: bool },
    EnumMemberRef(EnumMemberRef),
    ArrayLiteral(Vec<ExprIr>),
    ObjectLiteral(Vec<(String, ExprIr)>),
    /// A flat shell command-expression: literal fragments, var refs, and
    /// decorator refs concatenated as written (spec §4.2 `CommandExpr`).
    /// Used for command arguments and redirect targets, both of which may
    /// interpolate variables.
    CommandExpr(Vec<ExprIr>),
}

impl ExprIr {
    /// Whether this node is a leaf the resolver can attempt directly
    /// (spec §4.5 "leaf expressions"): everything except a bare `VarRef`
    /// whose referent is still unresolved is handled by the resolver's own
    /// readiness check, but structurally every variant except `VarRef` is
    /// always a candidate for direct evaluation once its children are.
    #[must_use]
    pub fn is_decorator_call(&self) -> bool {
        matches!(self, Self::DecoratorRef(_))
    }

    /// All directly nested subexpressions, for a readiness walk (spec §4.5
    /// step 1: "leaf expression reachable now ... whose subexpressions are
    /// resolvable").
    #[must_use]
    pub fn children(&self) -> Vec<&ExprIr> {
        match self {
            Self::Literal(_) | Self::VarRef(_) | Self::EnumMemberRef(_) => vec![],
            Self::DecoratorRef(d) => d.args.iter().map(|(_, e)| e).collect(),
            Self::BinaryOp { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            Self::TypeCast { value, .. } => vec![value.as_ref()],
            Self::ArrayLiteral(items) => items.iter().collect(),
            Self::ObjectLiteral(fields) => fields.iter().map(|(_, e)| e).collect(),
            Self::CommandExpr(parts) => parts.iter().collect(),
        }
    }
}
