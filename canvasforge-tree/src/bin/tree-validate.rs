use canvasforge_tree::{parse_snapshot, parse_snapshot_yaml, ComponentTree, TreeError};
use std::env;
use std::fs;
use std::path::Path;
use std::process;

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: tree-validate <snapshot.json|snapshot.yaml>...");
        eprintln!();
        eprintln!("Examples:");
        eprintln!("  tree-validate canvas.json");
        eprintln!("  tree-validate fixtures/*.yaml");
        process::exit(1);
    }

    let mut exit_code = 0;

    for file_path in &args[1..] {
        match validate_file(file_path) {
            Ok(tree) => {
                println!(
                    "✓ {} is valid ({} roots, {} components)",
                    file_path,
                    tree.roots().len(),
                    tree.len()
                );
            }
            Err(e) => {
                eprintln!("✗ {} has errors:", file_path);
                print_error(&e);
                exit_code = 1;
            }
        }
    }

    process::exit(exit_code);
}

fn validate_file(path: &str) -> Result<ComponentTree, TreeError> {
    let content = fs::read_to_string(path)
        .map_err(|e| TreeError::Serialization(format!("Failed to read file: {}", e)))?;

    let is_yaml = Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));

    if is_yaml {
        parse_snapshot_yaml(&content)
    } else {
        parse_snapshot(&content)
    }
}

fn print_error(error: &TreeError) {
    match error {
        TreeError::NotFound { id } => {
            eprintln!("  Component '{}' not found", id);
        }
        TreeError::DuplicateId { id } => {
            eprintln!("  Duplicate component id '{}':", id);
            eprintln!("    Every component in a snapshot needs its own id");
        }
        TreeError::EmptyId => {
            eprintln!("  Empty component id");
        }
        TreeError::InvalidGeometry { id, reason } => {
            eprintln!("  Invalid geometry for '{}':", id);
            eprintln!("    {}", reason);
        }
        TreeError::InvalidValue { id, key, reason } => {
            eprintln!("  Invalid value for '{}' on '{}':", key, id);
            eprintln!("    {}", reason);
        }
        TreeError::MaxNestingDepthExceeded { max_depth } => {
            eprintln!("  Maximum nesting depth ({}) exceeded", max_depth);
            eprintln!("    Components are nested too deeply");
        }
        TreeError::CycleDetected { id, parent } => {
            eprintln!("  '{}' cannot be placed under its own descendant '{}'", id, parent);
        }
        TreeError::Serialization(msg) => {
            eprintln!("  Serialization error:");
            eprintln!("    {}", msg);
        }
        e => {
            eprintln!("  {}", e);
        }
    }
}
