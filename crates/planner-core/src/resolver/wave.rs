//! The wave engine itself (spec §4.5).

use std::collections::BTreeMap;
use std::collections::HashMap;

use crate::decorator_iface::{DecoratorRegistry, ValueCall, ValueEvalContext};
use crate::error::{EventPosition, PlannerError, PlannerResult};
use crate::eval::{self, match_pattern};
use crate::exprid::ExprId;
use crate::ir::{
    BlockerIr, BlockerKind, CommandStmtIr, ExecutionGraph, ExprIr, FunctionCallStmtIr, FunctionIr, Iteration,
    StatementIr, TryIr, VarDeclIr, Value,
};
use crate::scope::ScopeStack;
use crate::session::Session;
use crate::telemetry::{PlannerTracer, TraceEvent};
use crate::vault::Vault;

/// Runs the wave engine over `graph`'s top level (spec §4.8 script mode).
///
/// Command mode (spec §4.8) is the dispatcher's concern: it locates the
/// target `FunctionIr` itself (constructing `TargetNotFound` with a fuzzy
/// suggestion if missing) and calls [`resolve_function`] directly, so this
/// entry point never needs to know about dispatch at all.
///
/// # Errors
/// `UndefinedName`/`TypeError`/`DecoratorError` from the statements
/// themselves.
pub fn resolve<T: PlannerTracer>(
    mut graph: ExecutionGraph,
    vault: &mut dyn Vault,
    decorators: &dyn DecoratorRegistry,
    session: &dyn Session,
    tracer: &mut T,
) -> PlannerResult<ExecutionGraph> {
    tracer.on_phase_enter("resolve");
    let functions = graph.functions.clone();
    let mut top_level = std::mem::take(&mut graph.top_level);
    let transport = session.transport_scope().to_owned();
    let mut resolver = Resolver { functions: &functions, vault, decorators, session, tracer, transport, wave: 0 };
    let mut scope = ScopeStack::new();
    let result = resolver.resolve_block(&mut top_level, &mut scope);
    resolver.tracer.on_phase_exit("resolve");
    result?;
    graph.top_level = top_level;
    Ok(graph)
}

/// Resolves a single already-located function's body (spec §4.8 command
/// mode). The caller (the dispatcher) is responsible for locating `func` and
/// reporting `TargetNotFound` if it doesn't exist; by the time control
/// reaches here the target is known good.
///
/// # Errors
/// Same as [`resolve`].
pub fn resolve_function<T: PlannerTracer>(
    graph: &ExecutionGraph,
    func: &FunctionIr,
    vault: &mut dyn Vault,
    decorators: &dyn DecoratorRegistry,
    session: &dyn Session,
    tracer: &mut T,
) -> PlannerResult<Vec<StatementIr>> {
    tracer.on_phase_enter("resolve");
    let transport = session.transport_scope().to_owned();
    let mut resolver =
        Resolver { functions: &graph.functions, vault, decorators, session, tracer, transport, wave: 0 };
    let mut body = func.body.clone();
    let mut scope = func.scope_snapshot.clone();
    let result = resolver.resolve_block(&mut body, &mut scope);
    resolver.tracer.on_phase_exit("resolve");
    result.map(|()| body)
}

struct Resolver<'a, T: PlannerTracer> {
    functions: &'a HashMap<String, FunctionIr>,
    vault: &'a mut dyn Vault,
    decorators: &'a dyn DecoratorRegistry,
    #[allow(dead_code)]
    session: &'a dyn Session,
    tracer: &'a mut T,
    transport: String,
    wave: usize,
}

impl<T: PlannerTracer> Resolver<'_, T> {
    /// The resolver walks IR that no longer carries event positions (those
    /// belong to the builder's stream); every error surfaced here reports
    /// position `0 of 0` rather than fabricating one.
    fn position(&self) -> EventPosition {
        EventPosition { index: 0, total: 0 }
    }

    fn mint_id(&mut self, raw_identity: &str, value: Value) -> ExprId {
        let id = ExprId::derive(&self.transport, raw_identity, None);
        self.vault.store_unresolved_value(&id, value);
        self.vault.touch(&id);
        id
    }

    /// Resolves one block: first batches every decorator call this wave's
    /// own statements make directly (`batch_decorator_calls`), then resolves
    /// every `VarDecl`/`Command`/`FunctionCall` in it, then every nested
    /// `Blocker`/`Try` (each of which recurses into its own sub-blocks as
    /// further waves).
    fn resolve_block(&mut self, stmts: &mut [StatementIr], scope: &mut ScopeStack) -> PlannerResult<()> {
        self.wave += 1;
        let wave = self.wave;
        self.tracer.on_event(TraceEvent::WaveStarted { wave });
        self.batch_decorator_calls(stmts, scope)?;
        for stmt in stmts.iter_mut() {
            match stmt {
                StatementIr::VarDecl(decl) => self.resolve_var_decl(decl, scope)?,
                StatementIr::Command(command) => self.resolve_command(command, scope)?,
                StatementIr::FunctionCall(call) => self.resolve_function_call(call, scope)?,
                StatementIr::Blocker(blocker) => self.resolve_blocker(blocker, scope)?,
                StatementIr::Try(try_ir) => self.resolve_try(try_ir, scope)?,
            }
        }
        self.tracer.on_event(TraceEvent::WaveFinished { wave, progressed: true });
        Ok(())
    }

    /// Collects every decorator call that sits directly at this wave's own
    /// statement level — a bare `var X = @path(...)` value, or a non-
    /// `@shell` command's own call — groups same-path calls together, sorts
    /// paths (`BTreeMap`), and invokes each path's registry exactly once
    /// with the full batch (spec §4.5 step 2 "Group pending calls by
    /// decorator path... invoke each decorator once with its batch", §8
    /// property 7 "resolver invokes each decorator path exactly once per
    /// wave"). A decorator call nested as an argument to another decorator
    /// call is unaffected here — it still resolves on its own through
    /// `call_decorator` once this batch folds its enclosing call's other
    /// args to literal, since readiness for a nested call never depends on
    /// anything this wave's batch produces.
    fn batch_decorator_calls(&mut self, stmts: &mut [StatementIr], scope: &mut ScopeStack) -> PlannerResult<()> {
        struct Pending {
            stmt_index: usize,
            path: String,
            primary: Option<String>,
            params: BTreeMap<String, Value>,
        }

        let mut pending = Vec::new();
        for (stmt_index, stmt) in stmts.iter_mut().enumerate() {
            match stmt {
                StatementIr::Command(command) => {
                    for (_, arg) in &mut command.decorator.args {
                        let value = self.resolve_expr(arg, scope)?;
                        *arg = ExprIr::Literal(value);
                    }
                    if command.decorator.name != "shell" {
                        let mut params = BTreeMap::new();
                        for (name, arg) in &command.decorator.args {
                            if let ExprIr::Literal(value) = arg {
                                params.insert(name.clone(), value.clone());
                            }
                        }
                        pending.push(Pending {
                            stmt_index,
                            path: command.decorator.path(),
                            primary: command.decorator.selector.clone(),
                            params,
                        });
                    }
                }
                StatementIr::VarDecl(decl) => {
                    let is_call = matches!(&decl.value, ExprIr::DecoratorRef(d) if crate::decorator::normalize_var_ref(d).is_none());
                    if is_call {
                        let ExprIr::DecoratorRef(decorator) = decl.value.clone() else { unreachable!() };
                        let mut params = BTreeMap::new();
                        for (name, expr) in &decorator.args {
                            params.insert(name.clone(), self.resolve_expr(expr, scope)?);
                        }
                        pending.push(Pending { stmt_index, path: decorator.path(), primary: decorator.selector, params });
                    }
                }
                _ => {}
            }
        }

        let mut by_path: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (i, call) in pending.iter().enumerate() {
            by_path.entry(call.path.clone()).or_default().push(i);
        }

        let mut results: HashMap<usize, Value> = HashMap::new();
        for (path, indices) in by_path {
            let decorator = self.decorators.get(&path).ok_or_else(|| PlannerError::DecoratorError {
                path: path.clone(),
                call_index: 0,
                message: "no decorator registered for this path".to_owned(),
            })?;
            let batch: Vec<ValueCall> = indices
                .iter()
                .map(|&i| ValueCall { path: path.clone(), primary: pending[i].primary.clone(), params: pending[i].params.clone() })
                .collect();
            let ctx = ValueEvalContext { plan_hash: self.transport.clone(), step_path: vec![self.wave] };
            self.tracer.on_event(TraceEvent::DecoratorBatch { path: path.clone(), calls: batch.len() });
            let outcomes = decorator.resolve(&ctx, &batch).map_err(|e| PlannerError::DecoratorError {
                path: path.clone(),
                call_index: 0,
                message: e.to_string(),
            })?;
            if outcomes.len() != batch.len() {
                return Err(PlannerError::DecoratorError {
                    path: path.clone(),
                    call_index: 0,
                    message: "decorator returned a different number of results than calls".to_owned(),
                });
            }
            for (&i, outcome) in indices.iter().zip(outcomes) {
                results.insert(pending[i].stmt_index, outcome.value);
            }
        }

        for (stmt_index, value) in results {
            if let StatementIr::VarDecl(decl) = &mut stmts[stmt_index] {
                decl.value = ExprIr::Literal(value);
            }
        }
        Ok(())
    }

    fn resolve_var_decl(&mut self, decl: &mut VarDeclIr, scope: &mut ScopeStack) -> PlannerResult<()> {
        // Registers the name with the vault before its value resolves (spec
        // §2/§6: the vault is "addressed only through" its five operations,
        // `declare_variable` among them). The returned id is provenance
        // bookkeeping only; the ExprId actually bound in `scope` still comes
        // from `mint_id`/`ExprId::alias_of` below, content-addressed so that
        // identical literals collapse to one id regardless of which
        // declaration produced them (spec §4.6).
        let _ = self.vault.declare_variable(&decl.name, &self.transport);
        // `var Y = @var.X` copies X's own id outright rather than minting a
        // fresh one (spec §4.6 "var Y = @var.X").
        if let ExprIr::VarRef(name) = &decl.value {
            let source_id = scope
                .lookup(name)
                .cloned()
                .ok_or_else(|| PlannerError::UndefinedName { name: name.clone(), position: self.position() })?;
            debug_assert!(self.vault.is_touched(&source_id), "an id reachable through scope must already be touched");
            let id = ExprId::alias_of(&source_id);
            self.vault.touch(&id);
            scope.define(decl.name.clone(), id.clone());
            decl.expr_id = Some(id);
            return Ok(());
        }
        let value = self.resolve_expr(&decl.value, scope)?;
        // Keyed on the literal/transport alone, not `decl.name` — two
        // variables assigned the same literal on the same transport must
        // collapse to one ExprId (spec §4.6 "Same literal, same transport:
        // one ExprID").
        let raw_identity = format!("var:{:?}", decl.value);
        let id = self.mint_id(&raw_identity, value);
        scope.define(decl.name.clone(), id.clone());
        decl.expr_id = Some(id);
        Ok(())
    }

    /// Resolves what `batch_decorator_calls` didn't already: the command's
    /// args (and, for a non-`@shell` decorator, the call itself) were
    /// already folded/invoked there, batched with any sibling statement
    /// sharing the same decorator path (spec §4.5 step 2). This just folds
    /// the redirect target (spec §4.2) and descends into a nested block.
    fn resolve_command(&mut self, command: &mut CommandStmtIr, scope: &mut ScopeStack) -> PlannerResult<()> {
        if let Some((_, target)) = &mut command.redirect {
            let value = self.resolve_expr(target, scope)?;
            *target = ExprIr::Literal(value);
        }
        if let Some(block) = &mut command.block {
            scope.push();
            self.resolve_block(block, scope)?;
            scope.pop();
        }
        Ok(())
    }

    fn resolve_function_call(&mut self, call: &mut FunctionCallStmtIr, scope: &mut ScopeStack) -> PlannerResult<()> {
        let func = self.functions.get(&call.function_name).cloned().ok_or_else(|| PlannerError::UndefinedName {
            name: call.function_name.clone(),
            position: self.position(),
        })?;
        let mut named: BTreeMap<String, (Value, String)> = BTreeMap::new();
        let mut positional: Vec<(Value, String)> = Vec::new();
        for (name, expr) in &call.args {
            let value = self.resolve_expr(expr, scope)?;
            let raw = format!("{expr:?}");
            if name.is_empty() {
                positional.push((value, raw));
            } else {
                named.insert(name.clone(), (value, raw));
            }
        }

        let mut call_scope = func.scope_snapshot.clone();
        call_scope.push();
        let mut positional = positional.into_iter();
        for param in &func.params {
            let (value, raw) = if let Some(bound) = named.remove(&param.name) {
                bound
            } else if let Some(bound) = positional.next() {
                bound
            } else if let Some(default_expr) = &param.default {
                let value = self.resolve_expr(default_expr, &mut call_scope)?;
                (value, format!("default:{default_expr:?}"))
            } else {
                (Value::Null, "missing".to_owned())
            };
            let raw_identity = format!("param:{}:{}:{raw}", func.name, param.name);
            let id = self.mint_id(&raw_identity, value);
            call_scope.define(param.name.clone(), id);
        }
        let mut body = func.body.clone();
        self.resolve_block(&mut body, &mut call_scope)?;
        call.resolved_body = body;
        Ok(())
    }

    /// Evaluates a decorator call nested as an argument to something else
    /// (e.g. `@retry(times=@env.N)`'s `@env.N`) by resolving its own
    /// argument expressions and calling through the registry as a singleton
    /// batch. Every call reachable directly at a block's statement level —
    /// the common case, including sibling statements sharing a path — is
    /// batched instead by `batch_decorator_calls`; this method only runs for
    /// the rarer case of a call embedded inside another expression, whose
    /// batch-readiness depends on its enclosing call and so can't join that
    /// wave-level batch.
    fn call_decorator(&mut self, decorator_ref: &crate::ir::DecoratorRef, scope: &mut ScopeStack) -> PlannerResult<Value> {
        let mut params = BTreeMap::new();
        for (name, expr) in &decorator_ref.args {
            params.insert(name.clone(), self.resolve_expr(expr, scope)?);
        }
        let path = decorator_ref.path();
        let decorator = self.decorators.get(&path).ok_or_else(|| PlannerError::DecoratorError {
            path: path.clone(),
            call_index: 0,
            message: "no decorator registered for this path".to_owned(),
        })?;
        let call = ValueCall { path: path.clone(), primary: decorator_ref.selector.clone(), params };
        let ctx = ValueEvalContext { plan_hash: self.transport.clone(), step_path: vec![self.wave] };
        self.tracer.on_event(TraceEvent::DecoratorBatch { path: path.clone(), calls: 1 });
        let results = decorator.resolve(&ctx, std::slice::from_ref(&call)).map_err(|e| PlannerError::DecoratorError {
            path: path.clone(),
            call_index: 0,
            message: e.to_string(),
        })?;
        let result = results.into_iter().next().ok_or_else(|| PlannerError::DecoratorError {
            path,
            call_index: 0,
            message: "decorator returned no result for the call".to_owned(),
        })?;
        Ok(result.value)
    }

    /// Evaluates an expression tree to a value, resolving `VarRef`s through
    /// `scope`/the vault and `DecoratorRef`s through the registry bottom-up
    /// (so a decorator argument that is itself a decorator call resolves
    /// before its parent call is made).
    fn resolve_expr(&mut self, expr: &ExprIr, scope: &mut ScopeStack) -> PlannerResult<Value> {
        match expr {
            ExprIr::Literal(value) => Ok(value.clone()),
            ExprIr::VarRef(name) => {
                let id = scope
                    .lookup(name)
                    .cloned()
                    .ok_or_else(|| PlannerError::UndefinedName { name: name.clone(), position: self.position() })?;
                debug_assert!(self.vault.is_touched(&id), "a scope-reachable id must already be touched");
                self.vault.get_unresolved_value(&id).ok_or_else(|| PlannerError::UndefinedName {
                    name: name.clone(),
                    position: self.position(),
                })
            }
            ExprIr::DecoratorRef(decorator_ref) => {
                if let Some(name) = crate::decorator::normalize_var_ref(decorator_ref) {
                    return self.resolve_expr(&ExprIr::VarRef(name), scope);
                }
                self.call_decorator(decorator_ref, scope)
            }
            ExprIr::BinaryOp { op, left, right } => {
                let lhs = self.resolve_expr(left, scope)?;
                if matches!(op, crate::ir::BinOp::And) && !lhs.truthy() {
                    return Ok(Value::Bool(false));
                }
                if matches!(op, crate::ir::BinOp::Or) && lhs.truthy() {
                    return Ok(Value::Bool(true));
                }
                let rhs = self.resolve_expr(right, scope)?;
                eval::evaluate(
                    &ExprIr::BinaryOp {
                        op: *op,
                        left: Box::new(ExprIr::Literal(lhs)),
                        right: Box::new(ExprIr::Literal(rhs)),
                    },
                    &|_: &str| None,
                )
                .map_err(|e| PlannerError::TypeError { message: e.to_string(), position: self.position() })
            }
            ExprIr::TypeCast { value, target, optional } => {
                let inner = self.resolve_expr(value, scope)?;
                eval::evaluate(
                    &ExprIr::TypeCast { value: Box::new(ExprIr::Literal(inner)), target: *target, optional: *optional },
                    &|_: &str| None,
                )
                .map_err(|e| PlannerError::TypeError { message: e.to_string(), position: self.position() })
            }
            ExprIr::EnumMemberRef(member) => Ok(Value::String(format!("{}.{}", member.enum_name, member.member_name))),
            ExprIr::ArrayLiteral(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.resolve_expr(item, scope)?);
                }
                Ok(Value::Array(values))
            }
            ExprIr::ObjectLiteral(fields) => {
                let mut map = BTreeMap::new();
                for (key, value_expr) in fields {
                    map.insert(key.clone(), self.resolve_expr(value_expr, scope)?);
                }
                Ok(Value::Object(map))
            }
            ExprIr::CommandExpr(parts) => {
                let mut out = String::new();
                for part in parts {
                    out.push_str(&self.resolve_expr(part, scope)?.to_string());
                }
                Ok(Value::String(out))
            }
        }
    }

    fn resolve_blocker(&mut self, blocker: &mut BlockerIr, scope: &mut ScopeStack) -> PlannerResult<()> {
        match blocker.kind {
            BlockerKind::If => self.resolve_if(blocker, scope),
            BlockerKind::For => self.resolve_for(blocker, scope),
            BlockerKind::When => self.resolve_when(blocker, scope),
        }
    }

    fn resolve_if(&mut self, blocker: &mut BlockerIr, scope: &mut ScopeStack) -> PlannerResult<()> {
        let condition = blocker.condition.as_ref().expect("If always carries a condition");
        let value = self.resolve_expr(condition, scope)?;
        let taken = value.truthy();
        self.tracer.on_event(TraceEvent::BlockerEvaluated { taken: Some(taken) });
        blocker.taken = Some(taken);
        // Branch pruning (spec §3 invariant 5): the untaken branch's
        // statements are never visited, so nothing in it ever acquires an
        // ExprId or a vault entry.
        if taken {
            scope.push();
            self.resolve_block(&mut blocker.then_branch, scope)?;
            scope.pop();
        } else if !blocker.else_branch.is_empty() {
            scope.push();
            self.resolve_block(&mut blocker.else_branch, scope)?;
            scope.pop();
        }
        Ok(())
    }

    fn resolve_for(&mut self, blocker: &mut BlockerIr, scope: &mut ScopeStack) -> PlannerResult<()> {
        let collection_expr = blocker.collection.as_ref().expect("For always carries a collection expression");
        let collection = self.resolve_expr(collection_expr, scope)?;
        let items = match collection {
            Value::Array(items) => items,
            other => {
                return Err(PlannerError::TypeError {
                    message: format!("`for` collection must be an Array, got {}", other.type_name()),
                    position: self.position(),
                });
            }
        };
        let loop_var = blocker.loop_var.clone().expect("For always carries a loop variable name");
        let mut iterations = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            let raw_identity = format!("loopvar:{loop_var}:{index}:{item}");
            let item_id = self.mint_id(&raw_identity, item.clone());
            let mut iter_scope = scope.clone();
            iter_scope.push();
            iter_scope.define(loop_var.clone(), item_id);
            let mut body = blocker.then_branch.clone();
            self.resolve_block(&mut body, &mut iter_scope)?;
            self.tracer.on_event(TraceEvent::LoopUnrolled { iterations: 1 });
            iterations.push(Iteration { value: item, body });
        }
        blocker.iterations = iterations;
        Ok(())
    }

    fn resolve_when(&mut self, blocker: &mut BlockerIr, scope: &mut ScopeStack) -> PlannerResult<()> {
        let scrutinee_expr = blocker.condition.as_ref().expect("When always carries a scrutinee expression");
        let scrutinee = self.resolve_expr(scrutinee_expr, scope)?;
        let mut matched = false;
        for (index, arm) in blocker.arms.iter_mut().enumerate() {
            let hit = match_pattern(&arm.pattern, &scrutinee, &|_: &str| None)
                .map_err(|e| PlannerError::TypeError { message: e.to_string(), position: self.position() })?;
            if hit {
                matched = true;
                scope.push();
                self.resolve_block(&mut arm.body, scope)?;
                scope.pop();
                blocker.matched_arm = Some(index);
                break;
            }
        }
        self.tracer.on_event(TraceEvent::BlockerEvaluated { taken: Some(matched) });
        blocker.taken = Some(matched);
        Ok(())
    }

    /// `try`/`catch`/`finally` are all resolved unconditionally: a planner
    /// has no runtime failure to branch on ahead of execution, so every
    /// section is reachable and must be planned (no `taken` flag, unlike
    /// `If`/`When`).
    fn resolve_try(&mut self, try_ir: &mut TryIr, scope: &mut ScopeStack) -> PlannerResult<()> {
        scope.push();
        self.resolve_block(&mut try_ir.try_body, scope)?;
        scope.pop();
        scope.push();
        self.resolve_block(&mut try_ir.catch_body, scope)?;
        scope.pop();
        scope.push();
        self.resolve_block(&mut try_ir.finally_body, scope)?;
        scope.pop();
        Ok(())
    }
}
