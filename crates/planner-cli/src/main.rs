use std::{env, fs, process::ExitCode};

use planner_core::config::{PlannerConfig, Telemetry};
use planner_core::decorator::StaticSchemaRegistry;
use planner_core::decorator_iface::EchoRegistry;
use planner_core::events::ParseTree;
use planner_core::plan::PlanKind;
use planner_core::session::LocalSession;
use planner_core::telemetry::{DebugLevel, NoopTracer};
use planner_core::vault::InMemoryVault;

/// Decorators resolvable without a real registry attached (spec §6
/// GLOSSARY). `@shell` is absent on purpose: the resolver never routes it
/// through the decorator interface at all.
const KNOWN_DECORATORS: [&str; 4] = ["@env", "@retry", "@timeout", "@var"];

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    let file_path = if args.len() > 1 { &args[1] } else { "plan.json" };
    let target = args.get(2).cloned();
    let kind = match args.get(3).map(String::as_str) {
        Some("view") => PlanKind::View,
        _ => PlanKind::Run,
    };

    let tree_json = match read_file(file_path) {
        Ok(contents) => contents,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };
    let tree: ParseTree = match serde_json::from_str(&tree_json) {
        Ok(tree) => tree,
        Err(err) => {
            eprintln!("error: {file_path} is not a valid parse tree: {err}");
            return ExitCode::FAILURE;
        }
    };

    let schemas = StaticSchemaRegistry::new();
    let config = match target {
        Some(name) => PlannerConfig::command_mode(name),
        None => PlannerConfig::script_mode(),
    }
    .with_telemetry(Telemetry::Off)
    .with_debug(DebugLevel::Off);

    let mut vault = InMemoryVault::new();
    let decorators = EchoRegistry::with_paths(KNOWN_DECORATORS);
    let session = LocalSession::new("cli");
    let mut tracer = NoopTracer;

    match planner_core::plan(&tree, &schemas, &config, kind, &mut vault, &decorators, &session, &mut tracer) {
        Ok(plan) => match serde_json::to_string_pretty(&plan) {
            Ok(json) => {
                println!("{json}");
                ExitCode::SUCCESS
            }
            Err(err) => {
                eprintln!("error: failed to serialize plan: {err}");
                ExitCode::FAILURE
            }
        },
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn read_file(file_path: &str) -> Result<String, String> {
    match fs::metadata(file_path) {
        Ok(metadata) => {
            if !metadata.is_file() {
                return Err(format!("{file_path} is not a file"));
            }
        }
        Err(err) => return Err(format!("reading {file_path}: {err}")),
    }
    fs::read_to_string(file_path).map_err(|err| format!("reading {file_path}: {err}"))
}
