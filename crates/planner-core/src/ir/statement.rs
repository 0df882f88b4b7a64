//! Statement IR (spec §3 "StatementIR").

use crate::exprid::ExprId;

use super::expr::ExprIr;

/// Post-command shell operator, recorded on the preceding command while the
/// builder walks a step; the precedence parser (spec §4.7) later turns runs
/// of these into a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ShellOperator {
    Pipe,
    And,
    Or,
    Semicolon,
}

/// `>`, `>>`, or `<` applied to the immediately preceding command (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RedirectMode {
    Truncate,
    Append,
    Input,
}

/// `var NAME = VALUE` (spec §3 "VarDeclIR").
///
/// `expr_id` starts empty and is assigned by the resolver on the wave in
/// which this declaration's value expression first becomes resolvable
/// (spec §3 invariant 1); it is never assigned at build time.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct VarDeclIr {
    pub name: String,
    pub expr_id: Option<ExprId>,
    pub value: ExprIr,
}

/// `@decorator(args) { block }` (spec §3 "CommandStmtIR").
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CommandStmtIr {
    pub decorator: crate::ir::expr::DecoratorRef,
    /// Present for decorator-with-body forms, e.g. `@retry(times=3) { ... }`.
    pub block: Option<Vec<StatementIr>>,
    pub operator: Option<ShellOperator>,
    pub redirect: Option<(RedirectMode, ExprIr)>,
}

/// One `when` arm: a pattern plus a lexically-scoped body.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct WhenArm {
    pub pattern: Pattern,
    pub body: Vec<StatementIr>,
}

/// A `when`-arm pattern (spec §4.4 "pattern match").
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum Pattern {
    Literal(ExprIr),
    Else,
    Regex(String),
    IntRange { start: i64, end_inclusive: i64 },
    EnumMember(super::expr::EnumMemberRef),
}

/// One unrolled for-loop iteration, populated after evaluation (spec §3
/// "Iterations").
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Iteration {
    pub value: crate::ir::value::Value,
    pub body: Vec<StatementIr>,
}

/// `if`/`for`/`when` (spec §3 "BlockerIR").
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BlockerIr {
    pub kind: BlockerKind,
    pub condition: Option<ExprIr>,
    pub loop_var: Option<String>,
    pub collection: Option<ExprIr>,
    pub then_branch: Vec<StatementIr>,
    pub else_branch: Vec<StatementIr>,
    pub arms: Vec<WhenArm>,
    /// Set exactly once for If/When on the evaluated path; never set for For
    /// (spec §3 invariant 5).
    pub taken: Option<bool>,
    /// Populated after for-loop unrolling; empty (and meaningless) for
    /// If/When/Try.
    pub iterations: Vec<Iteration>,
    /// Index into `arms` of the arm that matched, set by the resolver when
    /// `kind == When` and `taken == Some(true)`. The materializer uses this
    /// to find the one arm body that was actually resolved; `None` for
    /// every other kind, and for a `When` where no arm matched.
    #[serde(default)]
    pub matched_arm: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum BlockerKind {
    If,
    For,
    When,
}

/// `try`/`catch`/`finally` (spec §3 "TryIR").
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TryIr {
    pub try_body: Vec<StatementIr>,
    pub catch_body: Vec<StatementIr>,
    pub finally_body: Vec<StatementIr>,
}

/// A call to a user-defined function as a statement (spec §3
/// "FunctionCallStmtIR").
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FunctionCallStmtIr {
    pub function_name: String,
    pub args: Vec<(String, ExprIr)>,
    /// The callee's body, resolved under the call's own bound arguments.
    /// Empty at build time; filled in by the resolver (spec §4.5 "script
    /// mode: ... including reachable functions only if called") so the
    /// materializer can splice the call's effects into the surrounding plan
    /// without re-deriving the call's argument bindings itself.
    #[serde(default)]
    pub resolved_body: Vec<StatementIr>,
}

/// One statement, tagged by kind (spec §3 "StatementIR").
///
/// `creates_scope()` distinguishes lexical containment from transparent
/// inlining: only the four scope-creating kinds actually push/pop during a
/// walk (spec §3 `CreatesScope` flag, §4.1).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum StatementIr {
    VarDecl(VarDeclIr),
    Command(CommandStmtIr),
    Blocker(BlockerIr),
    Try(TryIr),
    FunctionCall(FunctionCallStmtIr),
}

impl StatementIr {
    /// Whether entering this statement's nested bodies requires pushing a
    /// new lexical frame. `VarDecl`, `Command`, and `FunctionCall` never do;
    /// `Blocker` and `Try` always do, on every branch/arm/catch/finally body
    /// they carry (spec §3 `CreatesScope`, §4.1).
    #[must_use]
    pub fn creates_scope(&self) -> bool {
        matches!(self, Self::Blocker(_) | Self::Try(_))
    }
}
