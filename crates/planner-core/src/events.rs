//! The parser-input contract (spec §6).
//!
//! The lexer and event-stream parser are out of scope for this crate (spec
//! §1); this module only defines the data shapes the IR builder consumes.
//! No parsing logic lives here.

use serde::{Deserialize, Serialize};

/// One token emitted by the (external) lexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Lexical category, e.g. `"ident"`, `"string"`, `"op"`.
    pub ty: String,
    /// Raw source text of the token.
    pub text: String,
    /// Whether source whitespace preceded this token. Used by the IR
    /// builder to decide whether to insert a literal `" "` between
    /// consecutive shell-arg parts (spec §4.2).
    pub has_space_before: bool,
}

/// The kind of node an `Open`/`Close` event pair brackets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Source,
    Function,
    Param,
    StructDecl,
    EnumDecl,
    Field,
    VarDecl,
    ShellCommand,
    ShellArg,
    InterpolatedString,
    Decorator,
    DecoratorArg,
    DecoratorBlock,
    If,
    Else,
    For,
    When,
    WhenArm,
    WhenPattern,
    Try,
    Catch,
    Finally,
    Redirect,
    RedirectTarget,
    TypeCast,
    BinaryExpr,
    ArrayLiteral,
    ObjectLiteral,
    ObjectField,
    FunctionCall,
    FunctionCallArg,
}

/// One entry in the flat event stream the parser produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    Open(NodeKind),
    Close(NodeKind),
    /// `Data` is an index into `ParseTree::tokens`.
    Token(u32),
    StepEnter,
    StepExit,
}

/// The complete output of the (external) parser: a flat event stream plus
/// the token array the `Token` events index into, and any parse errors.
///
/// A non-empty `errors` means the planner must refuse to proceed
/// (`PlannerError::ParseConsumed`, spec §7).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseTree {
    pub events: Vec<Event>,
    pub tokens: Vec<Token>,
    pub errors: Vec<String>,
}

impl ParseTree {
    #[must_use]
    pub fn token(&self, idx: u32) -> Option<&Token> {
        self.tokens.get(idx as usize)
    }
}
