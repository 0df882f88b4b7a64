//! End-to-end planning scenarios: hand-built event streams through
//! `builder` -> `resolver`/`dispatcher` -> `precedence`, asserting the
//! materialized `Plan` shape the design notes describe for each.

use planner_core::config::PlannerConfig;
use planner_core::decorator::StaticSchemaRegistry;
use planner_core::decorator_iface::EchoRegistry;
use planner_core::error::PlannerError;
use planner_core::events::{Event, NodeKind, ParseTree, Token};
use planner_core::ir::Value;
use planner_core::plan::{ExecutionNode, PlanKind};
use planner_core::session::LocalSession;
use planner_core::telemetry::NoopTracer;
use planner_core::vault::InMemoryVault;
use pretty_assertions::assert_eq;

fn tok(ty: &str, text: &str) -> Token {
    Token { ty: ty.to_owned(), text: text.to_owned(), has_space_before: false }
}

fn run_tree(tree: &ParseTree, target: Option<&str>, known: &[&'static str]) -> planner_core::PlannerResult<planner_core::Plan> {
    let schemas = StaticSchemaRegistry::new();
    let config = match target {
        Some(name) => PlannerConfig::command_mode(name),
        None => PlannerConfig::script_mode(),
    };
    let mut vault = InMemoryVault::new();
    let decorators = EchoRegistry::with_paths(known.iter().copied());
    let session = LocalSession::new("test");
    let mut tracer = NoopTracer;
    planner_core::plan(tree, &schemas, &config, PlanKind::Run, &mut vault, &decorators, &session, &mut tracer)
}

fn command_node(node: &ExecutionNode) -> (&str, &Value) {
    match node {
        ExecutionNode::CommandNode { command, .. } => (command.path.as_str(), command.args.get("command").expect("shell command carries a command arg")),
        other => panic!("expected CommandNode, got {other:?}"),
    }
}

// ===================================================== S1: @retry{ block }

/// Spec §8 S1: a bare decorator statement with a trailing block resolves
/// to one Step whose `CommandNode` carries the decorator's canonical args
/// and whose nested `block` holds the inner command as its own Step.
#[test]
fn s1_decorator_block_materializes_nested_step() {
    let tree = ParseTree {
        tokens: vec![
            tok("ident", "retry"),       // 0: decorator name
            tok("param_name", "times"),  // 1
            tok("int", "3"),             // 2
            tok("string", "test"),       // 3: inner echo arg
        ],
        events: vec![
            Event::Open(NodeKind::Source),
            Event::StepEnter,
            Event::Open(NodeKind::Decorator),
            Event::Token(0),
            Event::Open(NodeKind::DecoratorArg),
            Event::Token(1),
            Event::Token(2),
            Event::Close(NodeKind::DecoratorArg),
            Event::Close(NodeKind::Decorator),
            Event::Open(NodeKind::DecoratorBlock),
            Event::StepEnter,
            Event::Open(NodeKind::ShellCommand),
            Event::Open(NodeKind::ShellArg),
            Event::Token(3),
            Event::Close(NodeKind::ShellArg),
            Event::Close(NodeKind::ShellCommand),
            Event::StepExit,
            Event::Close(NodeKind::DecoratorBlock),
            Event::StepExit,
            Event::Close(NodeKind::Source),
        ],
        errors: vec![],
    };

    let plan = run_tree(&tree, None, &["@retry"]).expect("plan succeeds");
    assert_eq!(plan.steps.len(), 1);
    match &plan.steps[0].tree {
        ExecutionNode::CommandNode { command, block } => {
            assert_eq!(command.path, "@retry");
            assert_eq!(command.args.get("times"), Some(&Value::Int(3)));
            assert_eq!(block.len(), 1);
            assert_eq!(command_node(&block[0].tree), ("@shell", &Value::String("test".to_owned())));
        }
        other => panic!("expected CommandNode, got {other:?}"),
    }
}

// ======================================================= S2: if / else

/// Spec §8 S2: a taken `if` branch materializes the then-branch's steps
/// under `LogicNode { taken: Some(true), .. }`; the else branch is never
/// touched.
#[test]
fn s2_if_true_takes_then_branch() {
    let tree = ParseTree {
        tokens: vec![
            tok("bool", "true"), // 0: condition
            tok("string", "yes"), // 1: then body
            tok("string", "no"),  // 2: else body
        ],
        events: vec![
            Event::Open(NodeKind::Source),
            Event::StepEnter,
            Event::Open(NodeKind::If),
            Event::Token(0),
            Event::Open(NodeKind::ShellCommand),
            Event::Open(NodeKind::ShellArg),
            Event::Token(1),
            Event::Close(NodeKind::ShellArg),
            Event::Close(NodeKind::ShellCommand),
            Event::Open(NodeKind::Else),
            Event::Open(NodeKind::ShellCommand),
            Event::Open(NodeKind::ShellArg),
            Event::Token(2),
            Event::Close(NodeKind::ShellArg),
            Event::Close(NodeKind::ShellCommand),
            Event::Close(NodeKind::Else),
            Event::Close(NodeKind::If),
            Event::StepExit,
            Event::Close(NodeKind::Source),
        ],
        errors: vec![],
    };

    let plan = run_tree(&tree, None, &[]).expect("plan succeeds");
    assert_eq!(plan.steps.len(), 1);
    match &plan.steps[0].tree {
        ExecutionNode::LogicNode { taken, steps } => {
            assert_eq!(*taken, Some(true));
            assert_eq!(steps.len(), 1);
            assert_eq!(command_node(&steps[0].tree), ("@shell", &Value::String("yes".to_owned())));
        }
        other => panic!("expected LogicNode, got {other:?}"),
    }
}

// =================================================== S3: else-if chain

/// Spec §8 S3: `if false { .. } else if true { .. } else { .. }` never
/// visits the outermost then-branch or the final else, and the nested
/// `else if` is itself a pruned `LogicNode` recorded as its own Step
/// inside the outer else branch.
#[test]
fn s3_else_if_chain_takes_middle_branch() {
    let tree = ParseTree {
        tokens: vec![
            tok("bool", "false"), // 0: outer condition
            tok("string", "outer-then"), // 1
            tok("bool", "true"),  // 2: inner condition
            tok("string", "inner-then"), // 3
            tok("string", "inner-else"), // 4
        ],
        events: vec![
            Event::Open(NodeKind::Source),
            Event::StepEnter,
            Event::Open(NodeKind::If),
            Event::Token(0),
            Event::Open(NodeKind::ShellCommand),
            Event::Open(NodeKind::ShellArg),
            Event::Token(1),
            Event::Close(NodeKind::ShellArg),
            Event::Close(NodeKind::ShellCommand),
            Event::Open(NodeKind::Else),
            Event::Open(NodeKind::If),
            Event::Token(2),
            Event::Open(NodeKind::ShellCommand),
            Event::Open(NodeKind::ShellArg),
            Event::Token(3),
            Event::Close(NodeKind::ShellArg),
            Event::Close(NodeKind::ShellCommand),
            Event::Open(NodeKind::Else),
            Event::Open(NodeKind::ShellCommand),
            Event::Open(NodeKind::ShellArg),
            Event::Token(4),
            Event::Close(NodeKind::ShellArg),
            Event::Close(NodeKind::ShellCommand),
            Event::Close(NodeKind::Else),
            Event::Close(NodeKind::If),
            Event::Close(NodeKind::Else),
            Event::Close(NodeKind::If),
            Event::StepExit,
            Event::Close(NodeKind::Source),
        ],
        errors: vec![],
    };

    let plan = run_tree(&tree, None, &[]).expect("plan succeeds");
    assert_eq!(plan.steps.len(), 1);
    match &plan.steps[0].tree {
        ExecutionNode::LogicNode { taken: Some(false), steps } => {
            assert_eq!(steps.len(), 1);
            match &steps[0].tree {
                ExecutionNode::LogicNode { taken: Some(true), steps: inner } => {
                    assert_eq!(inner.len(), 1);
                    assert_eq!(command_node(&inner[0].tree), ("@shell", &Value::String("inner-then".to_owned())));
                }
                other => panic!("expected nested LogicNode, got {other:?}"),
            }
        }
        other => panic!("expected outer LogicNode, got {other:?}"),
    }
}

// ========================================================= S4: for loop

/// Spec §8 S4: three iterations over an array literal produce three Steps
/// sharing one continuous id counter, each echoing its own loop-variable
/// value via `@var.item`.
#[test]
fn s4_for_loop_unrolls_with_continuous_ids() {
    let tree = ParseTree {
        tokens: vec![
            tok("ident", "item"),  // 0: loop var name
            tok("string", "a"),    // 1
            tok("string", "b"),    // 2
            tok("string", "c"),    // 3
            tok("ident", "var"),   // 4: decorator name
            tok("selector", "item"), // 5: @var.item
        ],
        events: vec![
            Event::Open(NodeKind::Source),
            Event::StepEnter,
            Event::Open(NodeKind::For),
            Event::Token(0),
            Event::Open(NodeKind::ArrayLiteral),
            Event::Token(1),
            Event::Token(2),
            Event::Token(3),
            Event::Close(NodeKind::ArrayLiteral),
            Event::Open(NodeKind::ShellCommand),
            Event::Open(NodeKind::ShellArg),
            Event::Open(NodeKind::Decorator),
            Event::Token(4),
            Event::Token(5),
            Event::Close(NodeKind::Decorator),
            Event::Close(NodeKind::ShellArg),
            Event::Close(NodeKind::ShellCommand),
            Event::Close(NodeKind::For),
            Event::StepExit,
            Event::Close(NodeKind::Source),
        ],
        errors: vec![],
    };

    let plan = run_tree(&tree, None, &[]).expect("plan succeeds");
    assert_eq!(plan.steps.len(), 1);
    match &plan.steps[0].tree {
        ExecutionNode::LogicNode { taken: None, steps } => {
            assert_eq!(steps.len(), 3);
            let ids: Vec<u32> = steps.iter().map(|s| s.id).collect();
            assert_eq!(ids, vec![1, 2, 3]);
            let values: Vec<&Value> = steps.iter().map(|s| command_node(&s.tree).1).collect();
            assert_eq!(
                values,
                vec![
                    &Value::String("a".to_owned()),
                    &Value::String("b".to_owned()),
                    &Value::String("c".to_owned()),
                ]
            );
        }
        other => panic!("expected LogicNode, got {other:?}"),
    }
}

// ============================================ S5: full precedence chain

/// Spec §8 S5: `a | b && c || d ; e` groups `|` tightest, then `&&`, then
/// `||`, with `;` splitting the whole run into a top-level `SequenceNode`.
#[test]
fn s5_full_precedence_chain() {
    let tree = ParseTree {
        tokens: vec![
            tok("string", "a"),
            tok("shell_op", "|"),
            tok("string", "b"),
            tok("shell_op", "&&"),
            tok("string", "c"),
            tok("shell_op", "||"),
            tok("string", "d"),
            tok("shell_op", ";"),
            tok("string", "e"),
        ],
        events: {
            let mut events = vec![Event::Open(NodeKind::Source), Event::StepEnter];
            events.extend(shell_arg_cmd(0));
            events.push(Event::Token(1));
            events.extend(shell_arg_cmd(2));
            events.push(Event::Token(3));
            events.extend(shell_arg_cmd(4));
            events.push(Event::Token(5));
            events.extend(shell_arg_cmd(6));
            events.push(Event::Token(7));
            events.extend(shell_arg_cmd(8));
            events.push(Event::StepExit);
            events.push(Event::Close(NodeKind::Source));
            events
        },
        errors: vec![],
    };

    let plan = run_tree(&tree, None, &[]).expect("plan succeeds");
    assert_eq!(plan.steps.len(), 1);
    match &plan.steps[0].tree {
        ExecutionNode::SequenceNode(nodes) => {
            assert_eq!(nodes.len(), 2);
            match &nodes[0] {
                ExecutionNode::OrNode(and_side, d_side) => {
                    assert_eq!(command_node(d_side), ("@shell", &Value::String("d".to_owned())));
                    match and_side.as_ref() {
                        ExecutionNode::AndNode(pipe_side, c_side) => {
                            assert_eq!(command_node(c_side), ("@shell", &Value::String("c".to_owned())));
                            match pipe_side.as_ref() {
                                ExecutionNode::PipelineNode(pipe_nodes) => {
                                    assert_eq!(pipe_nodes.len(), 2);
                                    assert_eq!(command_node(&pipe_nodes[0]), ("@shell", &Value::String("a".to_owned())));
                                    assert_eq!(command_node(&pipe_nodes[1]), ("@shell", &Value::String("b".to_owned())));
                                }
                                other => panic!("expected PipelineNode, got {other:?}"),
                            }
                        }
                        other => panic!("expected AndNode, got {other:?}"),
                    }
                }
                other => panic!("expected OrNode, got {other:?}"),
            }
            assert_eq!(command_node(&nodes[1]), ("@shell", &Value::String("e".to_owned())));
        }
        other => panic!("expected SequenceNode, got {other:?}"),
    }
}

/// One `ShellCommand` holding a single bare-token `ShellArg`, as a flat
/// event slice so S5's fixture reads as one chain instead of a wall of
/// nested `vec!`s.
fn shell_arg_cmd(token_idx: u32) -> Vec<Event> {
    vec![
        Event::Open(NodeKind::ShellCommand),
        Event::Open(NodeKind::ShellArg),
        Event::Token(token_idx),
        Event::Close(NodeKind::ShellArg),
        Event::Close(NodeKind::ShellCommand),
    ]
}

// =================================================== S6: command dispatch

/// Spec §8 S6: command mode targeting `deploy` plans only `deploy`'s body;
/// `hello`'s function declaration is parsed into the graph but its body is
/// never resolved or materialized.
#[test]
fn s6_command_mode_plans_only_the_target() {
    let tree = ParseTree {
        tokens: vec![
            tok("ident", "hello"),     // 0
            tok("string", "echo H"),   // 1
            tok("ident", "deploy"),    // 2
            tok("string", "echo D"),   // 3
        ],
        events: vec![
            Event::Open(NodeKind::Source),
            Event::Open(NodeKind::Function),
            Event::Token(0),
            Event::Open(NodeKind::ShellCommand),
            Event::Open(NodeKind::ShellArg),
            Event::Token(1),
            Event::Close(NodeKind::ShellArg),
            Event::Close(NodeKind::ShellCommand),
            Event::Close(NodeKind::Function),
            Event::Open(NodeKind::Function),
            Event::Token(2),
            Event::Open(NodeKind::ShellCommand),
            Event::Open(NodeKind::ShellArg),
            Event::Token(3),
            Event::Close(NodeKind::ShellArg),
            Event::Close(NodeKind::ShellCommand),
            Event::Close(NodeKind::Function),
            Event::Close(NodeKind::Source),
        ],
        errors: vec![],
    };

    let plan = run_tree(&tree, Some("deploy"), &[]).expect("plan succeeds");
    assert_eq!(plan.steps.len(), 1);
    assert_eq!(command_node(&plan.steps[0].tree), ("@shell", &Value::String("echo D".to_owned())));

    let err = run_tree(&tree, Some("missing"), &[]).expect_err("unknown target is rejected");
    match err {
        PlannerError::TargetNotFound { name, available, .. } => {
            assert_eq!(name, "missing");
            assert_eq!(available, vec!["deploy".to_owned(), "hello".to_owned()]);
        }
        other => panic!("expected TargetNotFound, got {other:?}"),
    }
}

// ============================================= universal property tests

/// Spec §3 invariant 5 / §8 property "branch purity": an untaken `if`
/// branch is never resolved. Proven negatively: the branch references an
/// undefined variable that would error if it were ever visited, and the
/// plan still succeeds because it prunes clean.
#[test]
fn untaken_branch_is_never_resolved() {
    let tree = ParseTree {
        tokens: vec![
            tok("bool", "false"), // 0
            tok("ident", "var"),  // 1
            tok("selector", "ghost"), // 2
        ],
        events: vec![
            Event::Open(NodeKind::Source),
            Event::StepEnter,
            Event::Open(NodeKind::If),
            Event::Token(0),
            Event::Open(NodeKind::ShellCommand),
            Event::Open(NodeKind::ShellArg),
            Event::Open(NodeKind::Decorator),
            Event::Token(1),
            Event::Token(2),
            Event::Close(NodeKind::Decorator),
            Event::Close(NodeKind::ShellArg),
            Event::Close(NodeKind::ShellCommand),
            Event::Close(NodeKind::If),
            Event::StepExit,
            Event::Close(NodeKind::Source),
        ],
        errors: vec![],
    };

    let plan = run_tree(&tree, None, &[]).expect("pruned branch never touches the undefined var");
    assert_eq!(plan.steps.len(), 1);
    assert_eq!(plan.steps[0].tree, ExecutionNode::LogicNode { taken: Some(false), steps: vec![] });
}

/// Spec §3 invariant 4 ("scope discipline"): a name declared inside an
/// `if`'s then-branch does not leak past the branch's closing brace.
#[test]
fn scope_does_not_leak_past_block_boundary() {
    let tree = ParseTree {
        tokens: vec![
            tok("bool", "true"), // 0
            tok("ident", "X"),   // 1: inner var name
            tok("int", "1"),     // 2
            tok("ident", "Y"),   // 3: outer var name
            tok("ident", "var"), // 4: decorator name
            tok("selector", "X"), // 5: @var.X
        ],
        events: vec![
            Event::Open(NodeKind::Source),
            Event::StepEnter,
            Event::Open(NodeKind::If),
            Event::Token(0),
            Event::Open(NodeKind::VarDecl),
            Event::Token(1),
            Event::Token(2),
            Event::Close(NodeKind::VarDecl),
            Event::Close(NodeKind::If),
            Event::StepExit,
            Event::StepEnter,
            Event::Open(NodeKind::VarDecl),
            Event::Token(3),
            Event::Open(NodeKind::Decorator),
            Event::Token(4),
            Event::Token(5),
            Event::Close(NodeKind::Decorator),
            Event::Close(NodeKind::VarDecl),
            Event::StepExit,
            Event::Close(NodeKind::Source),
        ],
        errors: vec![],
    };

    let err = run_tree(&tree, None, &[]).expect_err("X is out of scope once the if block closes");
    match err {
        PlannerError::UndefinedName { name, .. } => assert_eq!(name, "X"),
        other => panic!("expected UndefinedName, got {other:?}"),
    }
}
