//! The IR builder (spec §4.2): a forward, cursor-based walker over the
//! flat event/token stream that emits `StatementIr`/`ExprIr` nodes.
//!
//! Grounded on the recursive-descent-over-a-flat-stream shape of the
//! teacher's own parser: a single monotonically advancing position field,
//! with a debug assertion that every dispatch strictly advances it (spec §8
//! property 1, §9 "Cursor walker").
//!
//! # Event grammar this builder expects
//!
//! The lexer/parser are out of scope (spec §1); this crate only consumes
//! whatever `ParseTree` it is handed. The concrete bracketing below is this
//! crate's own contract for that stream — documented here since nothing
//! upstream pins it down:
//!
//! - `Source`: a sequence of `Function` / `StructDecl` / `EnumDecl`
//!   declarations interleaved with `StepEnter <statement> StepExit` steps.
//! - `Function`: `Token(name)`, zero or more `Param` (`Token(name)`,
//!   optional `Token(type)`, optional default expr), then body statements.
//! - `StructDecl`/`EnumDecl`: `Token(name)`, zero or more `Field`
//!   (`Token(name)`, optional `Token(type)`, optional default expr).
//! - `VarDecl`: `Token(name)`, one expression.
//! - A step's statement is one of: `VarDecl`, one or more `ShellCommand`
//!   siblings joined by `Token(shell-operator)` between them, `If`, `For`,
//!   `When`, `Try`, or `FunctionCall`.
//! - `ShellCommand`: either a single `Decorator` node (a bare decorator
//!   statement), or one or more `ShellArg` each holding command-expression
//!   parts (`Token(text)` | `Decorator` | `InterpolatedString`), optionally
//!   followed by a `Redirect` (`Token(redirect-op)`, `RedirectTarget`).
//! - `Decorator`: one or more `Token(name-part)` joined by `.` to form the
//!   dotted path, zero or more `DecoratorArg` (optional `Token(param
//!   name)`, one expression), and an optional trailing `DecoratorBlock`
//!   holding nested steps.
//! - `If`: condition expr, then-branch statements, optional `Else` (whose
//!   body is either another `If` for `else if`, or a plain statement list).
//! - `For`: `Token(loop var)`, collection expr, body statements.
//! - `When`: scrutinee expr, `WhenArm`* (`WhenPattern`, body statements).
//! - `Try`: try-body statements, `Catch` body, `Finally` body.
//! - A primary expression is one of: a literal `Token`, a `Decorator`, an
//!   `InterpolatedString`, an `ArrayLiteral`, an `ObjectLiteral`, or a
//!   `Token(ty = "enum_member")`. It may be followed by a `TypeCast` suffix
//!   and then a `BinaryExpr` tail (`Token(op)`, a full expression,
//!   consumed right-associatively per spec §4.2).

use crate::decorator::{self, DecoratorSchemaRegistry};
use crate::error::{EventPosition, PlannerError, PlannerResult};
use crate::events::{Event, NodeKind, ParseTree};
use crate::ir::{
    BinOp, BlockerIr, BlockerKind, CastType, CommandStmtIr, DecoratorRef, EnumMemberRef, EnumTypeIr, ExecutionGraph,
    ExprIr, FieldDecl, FunctionCallStmtIr, FunctionIr, Param, Pattern, RedirectMode, ShellOperator, StatementIr,
    StructTypeIr, TryIr, VarDeclIr, Value, WhenArm,
};
use crate::scope::ScopeStack;

/// Walks a `ParseTree` and produces an `ExecutionGraph`.
pub struct Builder<'a> {
    tree: &'a ParseTree,
    pos: usize,
    scope: ScopeStack,
    schemas: &'a dyn DecoratorSchemaRegistry,
}

/// Builds the IR for an entire `ParseTree` (spec §4.2 `Source`).
///
/// # Errors
/// Returns `PlannerError::ParseConsumed` if the parser reported errors, or
/// `PlannerError::StructuralIr` for malformed IR (duplicate names, an
/// unexpected event).
pub fn build(tree: &ParseTree, schemas: &dyn DecoratorSchemaRegistry) -> PlannerResult<ExecutionGraph> {
    if !tree.errors.is_empty() {
        return Err(PlannerError::ParseConsumed { messages: tree.errors.clone() });
    }
    let mut builder = Builder { tree, pos: 0, scope: ScopeStack::new(), schemas };
    builder.build_source()
}

impl<'a> Builder<'a> {
    fn position(&self) -> EventPosition {
        EventPosition { index: self.pos as u32, total: self.tree.events.len() as u32 }
    }

    fn peek(&self) -> Option<Event> {
        self.tree.events.get(self.pos).copied()
    }

    /// Advances the cursor by one event, returning the event that was
    /// there. The strict-advance invariant (spec §8 property 1) is upheld
    /// by construction: `pos` only ever moves forward, and every other
    /// method routes through this one.
    fn bump(&mut self) -> PlannerResult<Event> {
        let before = self.pos;
        let event = self.peek().ok_or_else(|| PlannerError::StructuralIr {
            message: "unexpected end of event stream".to_owned(),
            position: self.position(),
        })?;
        self.pos += 1;
        debug_assert!(self.pos > before, "cursor must strictly advance on every dispatch");
        Ok(event)
    }

    fn expect_open(&mut self, kind: NodeKind) -> PlannerResult<()> {
        match self.bump()? {
            Event::Open(k) if k == kind => Ok(()),
            other => Err(self.unexpected(other, &format!("Open({kind:?})"))),
        }
    }

    fn expect_close(&mut self, kind: NodeKind) -> PlannerResult<()> {
        match self.bump()? {
            Event::Close(k) if k == kind => Ok(()),
            other => Err(self.unexpected(other, &format!("Close({kind:?})"))),
        }
    }

    fn at_open(&self, kind: NodeKind) -> bool {
        matches!(self.peek(), Some(Event::Open(k)) if k == kind)
    }

    fn at_close(&self, kind: NodeKind) -> bool {
        matches!(self.peek(), Some(Event::Close(k)) if k == kind)
    }

    fn unexpected(&self, got: Event, wanted: &str) -> PlannerError {
        PlannerError::StructuralIr {
            message: format!("expected {wanted}, got {got:?}"),
            position: self.position(),
        }
    }

    fn expect_token_text(&mut self) -> PlannerResult<String> {
        match self.bump()? {
            Event::Token(idx) => {
                let position = self.position();
                self.tree.token(idx).map(|t| t.text.clone()).ok_or_else(|| PlannerError::StructuralIr {
                    message: format!("token index {idx} out of range"),
                    position,
                })
            }
            other => Err(self.unexpected(other, "Token")),
        }
    }

    fn expect_token_kind(&mut self, expect_ty: &str) -> PlannerResult<String> {
        let position = self.position();
        match self.bump()? {
            Event::Token(idx) => {
                let token = self.tree.token(idx).ok_or_else(|| PlannerError::StructuralIr {
                    message: format!("token index {idx} out of range"),
                    position,
                })?;
                if token.ty != expect_ty {
                    return Err(PlannerError::StructuralIr {
                        message: format!("expected token of kind \"{expect_ty}\", got \"{}\"", token.ty),
                        position,
                    });
                }
                Ok(token.text.clone())
            }
            other => Err(self.unexpected(other, &format!("Token({expect_ty})"))),
        }
    }

    // ---------------------------------------------------------------- Source

    fn build_source(&mut self) -> PlannerResult<ExecutionGraph> {
        self.expect_open(NodeKind::Source)?;
        let mut graph = ExecutionGraph::new();
        loop {
            match self.peek() {
                Some(Event::Close(NodeKind::Source)) => break,
                Some(Event::Open(NodeKind::Function)) => {
                    let position = self.position();
                    let func = self.build_function()?;
                    graph.declare_function(func, position)?;
                }
                Some(Event::Open(NodeKind::StructDecl)) => {
                    let position = self.position();
                    let decl = self.build_struct()?;
                    graph.declare_struct(decl, position)?;
                }
                Some(Event::Open(NodeKind::EnumDecl)) => {
                    let position = self.position();
                    let decl = self.build_enum()?;
                    graph.declare_enum(decl, position)?;
                }
                Some(Event::StepEnter) => {
                    self.bump()?;
                    let stmts = self.build_step()?;
                    graph.top_level.extend(stmts);
                    self.expect_close_step()?;
                }
                Some(other) => return Err(self.unexpected(other, "a top-level declaration or step")),
                None => return Err(self.unexpected_eof()),
            }
        }
        self.expect_close(NodeKind::Source)?;
        graph.root_scope = self.scope.clone();
        Ok(graph)
    }

    fn unexpected_eof(&self) -> PlannerError {
        PlannerError::StructuralIr { message: "unexpected end of event stream".to_owned(), position: self.position() }
    }

    fn expect_close_step(&mut self) -> PlannerResult<()> {
        match self.bump()? {
            Event::StepExit => Ok(()),
            other => Err(self.unexpected(other, "StepExit")),
        }
    }

    // -------------------------------------------------------------- Function

    fn build_function(&mut self) -> PlannerResult<FunctionIr> {
        self.expect_open(NodeKind::Function)?;
        let name = self.expect_token_text()?;
        let mut params = Vec::new();
        while self.at_open(NodeKind::Param) {
            params.push(self.build_param()?);
        }
        propagate_param_types(&mut params);
        // The function body sees the scope captured at definition site
        // (spec §3 invariant 4), so we snapshot *before* pushing the
        // function's own frame.
        let scope_snapshot = self.scope.clone();
        self.scope.push();
        let body = self.build_statement_list_until(NodeKind::Function)?;
        self.scope.pop();
        self.expect_close(NodeKind::Function)?;
        Ok(FunctionIr { name, params, body, scope_snapshot })
    }

    fn build_param(&mut self) -> PlannerResult<Param> {
        self.expect_open(NodeKind::Param)?;
        let name = self.expect_token_text()?;
        let type_annotation = if matches!(self.peek(), Some(Event::Token(idx)) if self.is_type_token(idx)) {
            Some(self.expect_token_text()?)
        } else {
            None
        };
        let default = if !self.at_close(NodeKind::Param) { Some(self.parse_expr()?) } else { None };
        self.expect_close(NodeKind::Param)?;
        Ok(Param { name, type_annotation, default })
    }

    fn is_type_token(&self, idx: u32) -> bool {
        self.tree.token(idx).is_some_and(|t| t.ty == "type")
    }

    // -------------------------------------------------------- Struct / Enum

    fn build_struct(&mut self) -> PlannerResult<StructTypeIr> {
        self.expect_open(NodeKind::StructDecl)?;
        let name = self.expect_token_text()?;
        let mut fields = Vec::new();
        while self.at_open(NodeKind::Field) {
            fields.push(self.build_field()?);
        }
        self.expect_close(NodeKind::StructDecl)?;
        Ok(StructTypeIr { name, fields })
    }

    fn build_enum(&mut self) -> PlannerResult<EnumTypeIr> {
        self.expect_open(NodeKind::EnumDecl)?;
        let name = self.expect_token_text()?;
        let mut members = Vec::new();
        while self.at_open(NodeKind::Field) {
            members.push(self.build_field()?);
        }
        self.expect_close(NodeKind::EnumDecl)?;
        Ok(EnumTypeIr { name, members })
    }

    fn build_field(&mut self) -> PlannerResult<FieldDecl> {
        self.expect_open(NodeKind::Field)?;
        let name = self.expect_token_text()?;
        let type_annotation = if matches!(self.peek(), Some(Event::Token(idx)) if self.is_type_token(idx)) {
            Some(self.expect_token_text()?)
        } else {
            None
        };
        let default = if !self.at_close(NodeKind::Field) { Some(self.parse_expr()?) } else { None };
        self.expect_close(NodeKind::Field)?;
        Ok(FieldDecl { name, type_annotation, default })
    }

    // ----------------------------------------------------------------- Step

    /// Builds the statement(s) that make up one step: a `VarDecl`, one or
    /// more `ShellCommand` siblings chained by shell operators, or a single
    /// control-flow/`FunctionCall` statement.
    fn build_step(&mut self) -> PlannerResult<Vec<StatementIr>> {
        match self.peek() {
            Some(Event::Open(NodeKind::VarDecl)) => Ok(vec![StatementIr::VarDecl(self.build_var_decl()?)]),
            Some(Event::Open(NodeKind::If)) => Ok(vec![StatementIr::Blocker(self.build_if()?)]),
            Some(Event::Open(NodeKind::For)) => Ok(vec![StatementIr::Blocker(self.build_for()?)]),
            Some(Event::Open(NodeKind::When)) => Ok(vec![StatementIr::Blocker(self.build_when()?)]),
            Some(Event::Open(NodeKind::Try)) => Ok(vec![StatementIr::Try(self.build_try()?)]),
            Some(Event::Open(NodeKind::FunctionCall)) => {
                Ok(vec![StatementIr::FunctionCall(self.build_function_call()?)])
            }
            Some(Event::Open(NodeKind::ShellCommand)) | Some(Event::Open(NodeKind::Decorator)) => {
                self.build_command_sequence()
            }
            other => Err(self.unexpected(other.unwrap_or(Event::StepExit), "a statement")),
        }
    }

    /// Builds the statement list a function/if/for/when/catch/finally body
    /// holds, by repeatedly invoking `build_step`-style dispatch until the
    /// enclosing node's `Close` event, *without* the `StepEnter`/`StepExit`
    /// wrapper top-level steps use (bodies are a flat statement list).
    fn build_statement_list_until(&mut self, enclosing: NodeKind) -> PlannerResult<Vec<StatementIr>> {
        let mut out = Vec::new();
        while !self.at_close(enclosing) {
            out.extend(self.build_step()?);
        }
        Ok(out)
    }

    fn build_var_decl(&mut self) -> PlannerResult<VarDeclIr> {
        self.expect_open(NodeKind::VarDecl)?;
        let name = self.expect_token_text()?;
        let value = self.parse_expr()?;
        self.expect_close(NodeKind::VarDecl)?;
        // The resolver assigns the real ExprId; a placeholder keeps the
        // name visible to later lookups inside this builder pass, but
        // since ExprId is only assigned by resolution (spec §4.2 "do not
        // assign ExprID here"), we do not call `scope.define` here at all.
        Ok(VarDeclIr { name, expr_id: None, value })
    }

    fn build_function_call(&mut self) -> PlannerResult<FunctionCallStmtIr> {
        self.expect_open(NodeKind::FunctionCall)?;
        let function_name = self.expect_token_text()?;
        let mut args = Vec::new();
        while self.at_open(NodeKind::FunctionCallArg) {
            self.expect_open(NodeKind::FunctionCallArg)?;
            let name = if matches!(self.peek(), Some(Event::Token(idx)) if self.is_param_name_token(idx)) {
                self.expect_token_text()?
            } else {
                String::new()
            };
            let expr = self.parse_expr()?;
            self.expect_close(NodeKind::FunctionCallArg)?;
            args.push((name, expr));
        }
        self.expect_close(NodeKind::FunctionCall)?;
        Ok(FunctionCallStmtIr { function_name, args, resolved_body: Vec::new() })
    }

    fn is_param_name_token(&self, idx: u32) -> bool {
        self.tree.token(idx).is_some_and(|t| t.ty == "param_name")
    }

    // ------------------------------------------------------------ Commands

    /// A step's command sequence: one or more `ShellCommand`/bare
    /// `Decorator` siblings joined by shell operators (spec §4.2 "Operator
    /// tokens inside a step").
    fn build_command_sequence(&mut self) -> PlannerResult<Vec<StatementIr>> {
        let mut commands = Vec::new();
        loop {
            let mut command = self.build_one_command()?;
            if matches!(self.peek(), Some(Event::Token(idx)) if self.is_shell_op_token(idx)) {
                let op_text = self.expect_token_text()?;
                command.operator = Some(parse_shell_operator(&op_text).ok_or_else(|| PlannerError::StructuralIr {
                    message: format!("unknown shell operator \"{op_text}\""),
                    position: self.position(),
                })?);
                commands.push(StatementIr::Command(command));
                if self.at_open(NodeKind::ShellCommand) || self.at_open(NodeKind::Decorator) {
                    continue;
                }
                break;
            }
            commands.push(StatementIr::Command(command));
            break;
        }
        Ok(commands)
    }

    fn is_shell_op_token(&self, idx: u32) -> bool {
        self.tree.token(idx).is_some_and(|t| t.ty == "shell_op")
    }

    fn build_one_command(&mut self) -> PlannerResult<CommandStmtIr> {
        if self.at_open(NodeKind::Decorator) {
            let decorator = self.build_decorator_ref()?;
            let block = if self.at_open(NodeKind::DecoratorBlock) {
                Some(self.build_decorator_block()?)
            } else {
                None
            };
            return Ok(CommandStmtIr { decorator, block, operator: None, redirect: None });
        }
        self.expect_open(NodeKind::ShellCommand)?;
        let mut parts = Vec::new();
        let mut first = true;
        while self.at_open(NodeKind::ShellArg) {
            self.expect_open(NodeKind::ShellArg)?;
            let boundary_space = !first && self.next_token_has_space_before();
            if boundary_space {
                parts.push(ExprIr::Literal(Value::String(" ".to_owned())));
            }
            first = false;
            // The arg's own first token's leading-space flag was already
            // spent on `boundary_space` above; applying `with_leading_space`
            // to it too would double the space (spec §4.2).
            let mut first_part = true;
            while !self.at_close(NodeKind::ShellArg) {
                if first_part && boundary_space {
                    parts.push(self.parse_command_expr_part_no_leading_space()?);
                } else {
                    parts.push(self.parse_command_expr_part()?);
                }
                first_part = false;
            }
            self.expect_close(NodeKind::ShellArg)?;
        }
        let redirect = if self.at_open(NodeKind::Redirect) { Some(self.build_redirect()?) } else { None };
        self.expect_close(NodeKind::ShellCommand)?;
        let decorator = DecoratorRef {
            name: "shell".to_owned(),
            selector: None,
            args: smallvec::smallvec![("command".to_owned(), ExprIr::CommandExpr(parts))],
        };
        Ok(CommandStmtIr { decorator, block: None, operator: None, redirect })
    }

    fn build_redirect(&mut self) -> PlannerResult<(RedirectMode, ExprIr)> {
        self.expect_open(NodeKind::Redirect)?;
        let op_text = self.expect_token_kind("redirect_op")?;
        let mode = match op_text.as_str() {
            ">" => RedirectMode::Truncate,
            ">>" => RedirectMode::Append,
            "<" => RedirectMode::Input,
            other => {
                return Err(PlannerError::StructuralIr {
                    message: format!("unknown redirect operator \"{other}\""),
                    position: self.position(),
                });
            }
        };
        self.expect_open(NodeKind::RedirectTarget)?;
        let mut parts = Vec::new();
        while !self.at_close(NodeKind::RedirectTarget) {
            parts.push(self.parse_command_expr_part()?);
        }
        self.expect_close(NodeKind::RedirectTarget)?;
        self.expect_close(NodeKind::Redirect)?;
        Ok((mode, ExprIr::CommandExpr(parts)))
    }

    fn build_decorator_block(&mut self) -> PlannerResult<Vec<StatementIr>> {
        self.expect_open(NodeKind::DecoratorBlock)?;
        self.scope.push();
        let mut out = Vec::new();
        while !self.at_close(NodeKind::DecoratorBlock) {
            match self.peek() {
                Some(Event::StepEnter) => {
                    self.bump()?;
                    out.extend(self.build_step()?);
                    self.expect_close_step()?;
                }
                _ => out.extend(self.build_step()?),
            }
        }
        self.scope.pop();
        self.expect_close(NodeKind::DecoratorBlock)?;
        Ok(out)
    }

    fn build_decorator_ref(&mut self) -> PlannerResult<DecoratorRef> {
        self.expect_open(NodeKind::Decorator)?;
        let mut name_parts = vec![self.expect_token_kind("ident")?];
        let selector = if matches!(self.peek(), Some(Event::Token(idx)) if self.is_selector_token(idx)) {
            Some(self.expect_token_kind("selector")?)
        } else {
            None
        };
        // Multi-part dotted names before any args (e.g. `@a.b.c`), distinct
        // from the single selector form `@var.X` — subsequent ident tokens
        // extend the joined name.
        while matches!(self.peek(), Some(Event::Token(idx)) if self.tree.token(idx).is_some_and(|t| t.ty == "ident")) {
            name_parts.push(self.expect_token_kind("ident")?);
        }
        let mut positional = Vec::new();
        let mut named = Vec::new();
        let mut primary_bound = selector.is_some();
        while self.at_open(NodeKind::DecoratorArg) {
            self.expect_open(NodeKind::DecoratorArg)?;
            let param_name = if matches!(self.peek(), Some(Event::Token(idx)) if self.is_param_name_token(idx)) {
                Some(self.expect_token_text()?)
            } else {
                None
            };
            let expr = self.parse_expr()?;
            self.expect_close(NodeKind::DecoratorArg)?;
            match param_name {
                Some(name) => named.push((name, expr)),
                None => positional.push(expr),
            }
        }
        self.expect_close(NodeKind::Decorator)?;

        let joined_name = name_parts.join(".");
        if joined_name == "var" {
            primary_bound = primary_bound || !positional.is_empty();
        }
        let args = match self.schemas.schema(&joined_name) {
            Some(schema) => decorator::canonicalize(schema, positional, named, primary_bound),
            None => {
                let mut args = smallvec::SmallVec::new();
                for (i, expr) in positional.into_iter().enumerate() {
                    args.push((format!("arg{}", i + 1), expr));
                }
                args.extend(named);
                args
            }
        };
        Ok(DecoratorRef { name: joined_name, selector, args })
    }

    fn is_selector_token(&self, idx: u32) -> bool {
        self.tree.token(idx).is_some_and(|t| t.ty == "selector")
    }

    /// Parses one part of a flat `CommandExpr` / interpolated-string body.
    fn parse_command_expr_part(&mut self) -> PlannerResult<ExprIr> {
        self.parse_command_expr_part_inner(true)
    }

    /// Same as [`Self::parse_command_expr_part`], but never wraps a leading
    /// token in its own `" "` prefix — for when the caller already accounted
    /// for that token's `has_space_before` flag itself (a `ShellArg`
    /// boundary space, spec §4.2).
    fn parse_command_expr_part_no_leading_space(&mut self) -> PlannerResult<ExprIr> {
        self.parse_command_expr_part_inner(false)
    }

    fn parse_command_expr_part_inner(&mut self, apply_leading_space: bool) -> PlannerResult<ExprIr> {
        match self.peek() {
            Some(Event::Open(NodeKind::Decorator)) => {
                let decorator = self.build_decorator_ref()?;
                Ok(decorator_to_expr(decorator))
            }
            Some(Event::Open(NodeKind::InterpolatedString)) => self.build_interpolated_string(),
            Some(Event::Token(idx)) => {
                let text = self.expect_token_text()?;
                if apply_leading_space {
                    Ok(self.with_leading_space(idx, ExprIr::Literal(Value::String(text))))
                } else {
                    Ok(ExprIr::Literal(Value::String(text)))
                }
            }
            other => Err(self.unexpected(other.unwrap_or(Event::StepExit), "a command expression part")),
        }
    }

    /// Whether the next token the cursor will reach (searching past any
    /// intervening `Open`s, e.g. into a leading `@decorator`/interpolated
    /// string) recorded whitespace before it — used to decide whether a
    /// `ShellArg` boundary needs a literal `" "` inserted (spec §4.2).
    fn next_token_has_space_before(&self) -> bool {
        for event in &self.tree.events[self.pos..] {
            if let Event::Token(idx) = event {
                return self.tree.token(*idx).is_some_and(|t| t.has_space_before);
            }
        }
        false
    }

    fn with_leading_space(&self, token_idx: u32, expr: ExprIr) -> ExprIr {
        if self.tree.token(token_idx).is_some_and(|t| t.has_space_before) {
            ExprIr::CommandExpr(vec![ExprIr::Literal(Value::String(" ".to_owned())), expr])
        } else {
            expr
        }
    }

    fn build_interpolated_string(&mut self) -> PlannerResult<ExprIr> {
        self.expect_open(NodeKind::InterpolatedString)?;
        let mut parts = Vec::new();
        while !self.at_close(NodeKind::InterpolatedString) {
            match self.peek() {
                Some(Event::Open(NodeKind::Decorator)) => {
                    let decorator = self.build_decorator_ref()?;
                    parts.push(decorator_to_expr(decorator));
                }
                Some(Event::Token(_)) => {
                    let text = self.expect_token_text()?;
                    parts.push(ExprIr::Literal(Value::String(text)));
                }
                other => return Err(self.unexpected(other.unwrap_or(Event::StepExit), "a string fragment or @ref")),
            }
        }
        self.expect_close(NodeKind::InterpolatedString)?;
        Ok(ExprIr::CommandExpr(parts))
    }

    // --------------------------------------------------------------- If/For/When/Try

    fn build_if(&mut self) -> PlannerResult<BlockerIr> {
        self.expect_open(NodeKind::If)?;
        let condition = Some(self.parse_expr()?);
        self.scope.push();
        let then_branch = self.build_if_then_branch()?;
        self.scope.pop();
        let else_branch = if self.at_open(NodeKind::Else) {
            self.expect_open(NodeKind::Else)?;
            let body = if self.at_open(NodeKind::If) {
                vec![StatementIr::Blocker(self.build_if()?)]
            } else {
                self.scope.push();
                let body = self.build_statement_list_until(NodeKind::Else)?;
                self.scope.pop();
                body
            };
            self.expect_close(NodeKind::Else)?;
            body
        } else {
            Vec::new()
        };
        self.expect_close(NodeKind::If)?;
        Ok(BlockerIr {
            kind: BlockerKind::If,
            condition,
            loop_var: None,
            collection: None,
            then_branch,
            else_branch,
            arms: Vec::new(),
            taken: None,
            iterations: Vec::new(),
            matched_arm: None,
        })
    }

    /// An if's then-branch: a plain statement list ending either at
    /// `Close(If)` (no else) or at a sibling `Open(Else)`. A nested `if` as
    /// one of the branch's own statements is consumed whole by
    /// `build_step`, so it never looks like a boundary here.
    fn build_if_then_branch(&mut self) -> PlannerResult<Vec<StatementIr>> {
        let mut out = Vec::new();
        while !self.at_close(NodeKind::If) && !self.at_open(NodeKind::Else) {
            out.extend(self.build_step()?);
        }
        Ok(out)
    }

    fn build_for(&mut self) -> PlannerResult<BlockerIr> {
        self.expect_open(NodeKind::For)?;
        let loop_var = self.expect_token_text()?;
        let collection = Some(self.parse_expr()?);
        self.scope.push();
        self.scope.define(loop_var.clone(), crate::exprid::ExprId::from_raw("template-loop-var-placeholder"));
        let body = self.build_statement_list_until(NodeKind::For)?;
        self.scope.pop();
        self.expect_close(NodeKind::For)?;
        Ok(BlockerIr {
            kind: BlockerKind::For,
            condition: None,
            loop_var: Some(loop_var),
            collection,
            then_branch: body,
            else_branch: Vec::new(),
            arms: Vec::new(),
            taken: None,
            iterations: Vec::new(),
            matched_arm: None,
        })
    }

    fn build_when(&mut self) -> PlannerResult<BlockerIr> {
        self.expect_open(NodeKind::When)?;
        let condition = Some(self.parse_expr()?);
        let mut arms = Vec::new();
        while self.at_open(NodeKind::WhenArm) {
            arms.push(self.build_when_arm()?);
        }
        self.expect_close(NodeKind::When)?;
        Ok(BlockerIr {
            kind: BlockerKind::When,
            condition,
            loop_var: None,
            collection: None,
            then_branch: Vec::new(),
            else_branch: Vec::new(),
            arms,
            taken: None,
            iterations: Vec::new(),
            matched_arm: None,
        })
    }

    fn build_when_arm(&mut self) -> PlannerResult<WhenArm> {
        self.expect_open(NodeKind::WhenArm)?;
        self.expect_open(NodeKind::WhenPattern)?;
        let pattern = self.build_pattern()?;
        self.expect_close(NodeKind::WhenPattern)?;
        self.scope.push();
        let body = self.build_statement_list_until(NodeKind::WhenArm)?;
        self.scope.pop();
        self.expect_close(NodeKind::WhenArm)?;
        Ok(WhenArm { pattern, body })
    }

    fn build_pattern(&mut self) -> PlannerResult<Pattern> {
        match self.peek() {
            Some(Event::Token(idx)) if self.tree.token(idx).is_some_and(|t| t.ty == "else") => {
                self.bump()?;
                Ok(Pattern::Else)
            }
            Some(Event::Token(idx)) if self.tree.token(idx).is_some_and(|t| t.ty == "regex") => {
                let text = self.expect_token_text()?;
                Ok(Pattern::Regex(text))
            }
            Some(Event::Token(idx)) if self.tree.token(idx).is_some_and(|t| t.ty == "enum_member") => {
                let text = self.expect_token_text()?;
                let (enum_name, member_name) = text.split_once('.').ok_or_else(|| PlannerError::StructuralIr {
                    message: format!("malformed enum member pattern \"{text}\""),
                    position: self.position(),
                })?;
                Ok(Pattern::EnumMember(EnumMemberRef {
                    enum_name: enum_name.to_owned(),
                    member_name: member_name.to_owned(),
                }))
            }
            Some(Event::Token(idx)) if self.tree.token(idx).is_some_and(|t| t.ty == "int") => {
                let start: i64 = self.expect_token_text()?.parse().map_err(|_| PlannerError::StructuralIr {
                    message: "malformed integer range start".to_owned(),
                    position: self.position(),
                })?;
                if matches!(self.peek(), Some(Event::Token(idx)) if self.tree.token(idx).is_some_and(|t| t.ty == "range_sep"))
                {
                    self.bump()?;
                    let end_inclusive: i64 =
                        self.expect_token_text()?.parse().map_err(|_| PlannerError::StructuralIr {
                            message: "malformed integer range end".to_owned(),
                            position: self.position(),
                        })?;
                    Ok(Pattern::IntRange { start, end_inclusive })
                } else {
                    Ok(Pattern::Literal(ExprIr::Literal(Value::Int(start))))
                }
            }
            _ => Ok(Pattern::Literal(self.parse_expr()?)),
        }
    }

    fn build_try(&mut self) -> PlannerResult<TryIr> {
        self.expect_open(NodeKind::Try)?;
        self.scope.push();
        let try_body = self.build_statement_list_until(NodeKind::Try)?;
        self.scope.pop();
        let catch_body = if self.at_open(NodeKind::Catch) {
            self.expect_open(NodeKind::Catch)?;
            self.scope.push();
            let body = self.build_statement_list_until(NodeKind::Catch)?;
            self.scope.pop();
            self.expect_close(NodeKind::Catch)?;
            body
        } else {
            Vec::new()
        };
        let finally_body = if self.at_open(NodeKind::Finally) {
            self.expect_open(NodeKind::Finally)?;
            self.scope.push();
            let body = self.build_statement_list_until(NodeKind::Finally)?;
            self.scope.pop();
            self.expect_close(NodeKind::Finally)?;
            body
        } else {
            Vec::new()
        };
        self.expect_close(NodeKind::Try)?;
        Ok(TryIr { try_body, catch_body, finally_body })
    }

    // ------------------------------------------------------------- Expressions

    fn parse_expr(&mut self) -> PlannerResult<ExprIr> {
        let primary = self.parse_primary()?;
        let casted = self.maybe_wrap_cast(primary)?;
        self.maybe_wrap_binary(casted)
    }

    fn parse_primary(&mut self) -> PlannerResult<ExprIr> {
        match self.peek() {
            Some(Event::Open(NodeKind::Decorator)) => {
                let decorator = self.build_decorator_ref()?;
                Ok(decorator_to_expr(decorator))
            }
            Some(Event::Open(NodeKind::InterpolatedString)) => self.build_interpolated_string(),
            Some(Event::Open(NodeKind::ArrayLiteral)) => self.build_array_literal(),
            Some(Event::Open(NodeKind::ObjectLiteral)) => self.build_object_literal(),
            Some(Event::Token(idx)) => self.parse_literal_token(idx),
            other => Err(self.unexpected(other.unwrap_or(Event::StepExit), "an expression")),
        }
    }

    fn parse_literal_token(&mut self, idx: u32) -> PlannerResult<ExprIr> {
        let position = self.position();
        let token = self.tree.token(idx).ok_or_else(|| PlannerError::StructuralIr {
            message: format!("token index {idx} out of range"),
            position,
        })?;
        let ty = token.ty.clone();
        let text = self.expect_token_text()?;
        literal_from_token(&ty, &text, position)
    }

    fn build_array_literal(&mut self) -> PlannerResult<ExprIr> {
        self.expect_open(NodeKind::ArrayLiteral)?;
        let mut items = Vec::new();
        while !self.at_close(NodeKind::ArrayLiteral) {
            items.push(self.parse_expr()?);
        }
        self.expect_close(NodeKind::ArrayLiteral)?;
        Ok(ExprIr::ArrayLiteral(items))
    }

    fn build_object_literal(&mut self) -> PlannerResult<ExprIr> {
        self.expect_open(NodeKind::ObjectLiteral)?;
        let mut fields = Vec::new();
        while self.at_open(NodeKind::ObjectField) {
            self.expect_open(NodeKind::ObjectField)?;
            let key = self.expect_token_text()?;
            let value = self.parse_expr()?;
            self.expect_close(NodeKind::ObjectField)?;
            fields.push((key, value));
        }
        self.expect_close(NodeKind::ObjectLiteral)?;
        Ok(ExprIr::ObjectLiteral(fields))
    }

    fn maybe_wrap_cast(&mut self, value: ExprIr) -> PlannerResult<ExprIr> {
        if !self.at_open(NodeKind::TypeCast) {
            return Ok(value);
        }
        self.expect_open(NodeKind::TypeCast)?;
        let type_name = self.expect_token_text()?;
        let target = cast_type_from_name(&type_name).ok_or_else(|| PlannerError::StructuralIr {
            message: format!("unknown cast target \"{type_name}\""),
            position: self.position(),
        })?;
        let optional = matches!(self.peek(), Some(Event::Token(idx)) if self.tree.token(idx).is_some_and(|t| t.ty == "optional_flag"));
        if optional {
            self.bump()?;
        }
        self.expect_close(NodeKind::TypeCast)?;
        Ok(ExprIr::TypeCast { value: Box::new(value), target, optional })
    }

    fn maybe_wrap_binary(&mut self, left: ExprIr) -> PlannerResult<ExprIr> {
        if !self.at_open(NodeKind::BinaryExpr) {
            return Ok(left);
        }
        self.expect_open(NodeKind::BinaryExpr)?;
        let op_text = self.expect_token_kind("op")?;
        let op = binop_from_symbol(&op_text).ok_or_else(|| PlannerError::StructuralIr {
            message: format!("unknown binary operator \"{op_text}\""),
            position: self.position(),
        })?;
        // Consumed right-associatively: the right-hand side is a full
        // expression, which may itself have its own `BinaryExpr` tail
        // (spec §4.2).
        let right = self.parse_expr()?;
        self.expect_close(NodeKind::BinaryExpr)?;
        Ok(ExprIr::BinaryOp { op, left: Box::new(left), right: Box::new(right) })
    }
}

fn parse_shell_operator(text: &str) -> Option<ShellOperator> {
    match text {
        "|" => Some(ShellOperator::Pipe),
        "&&" => Some(ShellOperator::And),
        "||" => Some(ShellOperator::Or),
        ";" => Some(ShellOperator::Semicolon),
        _ => None,
    }
}

fn binop_from_symbol(symbol: &str) -> Option<BinOp> {
    Some(match symbol {
        "+" => BinOp::Add,
        "-" => BinOp::Sub,
        "*" => BinOp::Mul,
        "/" => BinOp::Div,
        "==" => BinOp::Eq,
        "!=" => BinOp::Ne,
        "<" => BinOp::Lt,
        "<=" => BinOp::Le,
        ">" => BinOp::Gt,
        ">=" => BinOp::Ge,
        "&&" => BinOp::And,
        "||" => BinOp::Or,
        _ => return None,
    })
}

fn cast_type_from_name(name: &str) -> Option<CastType> {
    Some(match name {
        "Int" => CastType::Int,
        "Float" => CastType::Float,
        "String" => CastType::String,
        "Bool" => CastType::Bool,
        "Duration" => CastType::Duration,
        _ => return None,
    })
}

fn literal_from_token(ty: &str, text: &str, position: EventPosition) -> PlannerResult<ExprIr> {
    let value = match ty {
        "string" => Value::String(text.to_owned()),
        "int" => Value::Int(text.parse().map_err(|_| PlannerError::StructuralIr {
            message: format!("malformed integer literal \"{text}\""),
            position,
        })?),
        "float" => Value::Float(text.parse().map_err(|_| PlannerError::StructuralIr {
            message: format!("malformed float literal \"{text}\""),
            position,
        })?),
        "bool" => Value::Bool(text == "true"),
        "duration" => Value::Duration(crate::eval::parse_duration(text).ok_or_else(|| PlannerError::StructuralIr {
            message: format!("malformed duration literal \"{text}\""),
            position,
        })?),
        "null" => Value::Null,
        other => {
            return Err(PlannerError::StructuralIr { message: format!("unexpected literal token kind \"{other}\""), position });
        }
    };
    Ok(ExprIr::Literal(value))
}

fn decorator_to_expr(decorator: DecoratorRef) -> ExprIr {
    match decorator::normalize_var_ref(&decorator) {
        Some(name) => ExprIr::VarRef(name),
        None => ExprIr::DecoratorRef(decorator),
    }
}

/// Propagates a shared type annotation right-to-left across untyped
/// grouped parameters (spec §4.2 "`fun f(a, b Int)` ⇒ both `Int`").
fn propagate_param_types(params: &mut [Param]) {
    let mut carry: Option<String> = None;
    for param in params.iter_mut().rev() {
        match &param.type_annotation {
            Some(ty) => carry = Some(ty.clone()),
            None => {
                if let Some(ty) = &carry {
                    param.type_annotation = Some(ty.clone());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Token;

    fn tok(ty: &str, text: &str) -> Token {
        Token { ty: ty.to_owned(), text: text.to_owned(), has_space_before: false }
    }

    /// `var X = 1` as a single top-level step.
    #[test]
    fn builds_a_simple_var_decl() {
        let tree = ParseTree {
            tokens: vec![tok("ident", "X"), tok("int", "1")],
            events: vec![
                Event::Open(NodeKind::Source),
                Event::StepEnter,
                Event::Open(NodeKind::VarDecl),
                Event::Token(0),
                Event::Token(1),
                Event::Close(NodeKind::VarDecl),
                Event::StepExit,
                Event::Close(NodeKind::Source),
            ],
            errors: vec![],
        };
        let schemas = crate::decorator::StaticSchemaRegistry::new();
        let graph = build(&tree, &schemas).unwrap();
        assert_eq!(graph.top_level.len(), 1);
        match &graph.top_level[0] {
            StatementIr::VarDecl(decl) => {
                assert_eq!(decl.name, "X");
                assert_eq!(decl.value, ExprIr::Literal(Value::Int(1)));
                assert!(decl.expr_id.is_none(), "builder must not assign ExprId");
            }
            other => panic!("expected VarDecl, got {other:?}"),
        }
    }

    #[test]
    fn cursor_strictly_advances() {
        let tree = ParseTree {
            tokens: vec![tok("ident", "X"), tok("int", "1")],
            events: vec![
                Event::Open(NodeKind::Source),
                Event::StepEnter,
                Event::Open(NodeKind::VarDecl),
                Event::Token(0),
                Event::Token(1),
                Event::Close(NodeKind::VarDecl),
                Event::StepExit,
                Event::Close(NodeKind::Source),
            ],
            errors: vec![],
        };
        let schemas = crate::decorator::StaticSchemaRegistry::new();
        let mut builder = Builder { tree: &tree, pos: 0, scope: ScopeStack::new(), schemas: &schemas };
        let mut last = builder.pos;
        while builder.peek().is_some() {
            builder.bump().unwrap();
            assert!(builder.pos > last);
            last = builder.pos;
        }
    }

    #[test]
    fn refuses_to_build_when_parser_reported_errors() {
        let tree = ParseTree { events: vec![], tokens: vec![], errors: vec!["bad token".to_owned()] };
        let schemas = crate::decorator::StaticSchemaRegistry::new();
        let err = build(&tree, &schemas).unwrap_err();
        assert!(matches!(err, PlannerError::ParseConsumed { .. }));
    }

    /// Two `ShellArg`s where the second's leading token recorded whitespace
    /// get exactly one space between them; the unconditional insertion this
    /// guards against would double it up with `with_leading_space`'s own
    /// per-token space (spec §4.2 "iff the originating token recorded
    /// whitespace before it").
    #[test]
    fn shell_arg_boundary_space_is_conditional_on_has_space_before() {
        let tree = ParseTree {
            tokens: vec![
                Token { ty: "word".to_owned(), text: "echo".to_owned(), has_space_before: false },
                Token { ty: "word".to_owned(), text: "hi".to_owned(), has_space_before: true },
            ],
            events: vec![
                Event::Open(NodeKind::Source),
                Event::StepEnter,
                Event::Open(NodeKind::ShellCommand),
                Event::Open(NodeKind::ShellArg),
                Event::Token(0),
                Event::Close(NodeKind::ShellArg),
                Event::Open(NodeKind::ShellArg),
                Event::Token(1),
                Event::Close(NodeKind::ShellArg),
                Event::Close(NodeKind::ShellCommand),
                Event::StepExit,
                Event::Close(NodeKind::Source),
            ],
            errors: vec![],
        };
        let schemas = crate::decorator::StaticSchemaRegistry::new();
        let graph = build(&tree, &schemas).unwrap();
        match &graph.top_level[0] {
            StatementIr::Command(command) => match &command.decorator.args[0].1 {
                ExprIr::CommandExpr(parts) => {
                    assert_eq!(
                        parts,
                        &vec![
                            ExprIr::Literal(Value::String("echo".to_owned())),
                            ExprIr::Literal(Value::String(" ".to_owned())),
                            ExprIr::Literal(Value::String("hi".to_owned())),
                        ],
                        "exactly one space, not two"
                    );
                }
                other => panic!("expected CommandExpr, got {other:?}"),
            },
            other => panic!("expected Command, got {other:?}"),
        }
    }

    #[test]
    fn param_type_propagates_right_to_left() {
        let mut params = vec![
            Param { name: "a".into(), type_annotation: None, default: None },
            Param { name: "b".into(), type_annotation: Some("Int".into()), default: None },
        ];
        propagate_param_types(&mut params);
        assert_eq!(params[0].type_annotation.as_deref(), Some("Int"));
    }
}
