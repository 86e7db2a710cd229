use canvasforge_core::config::Config;
use canvasforge_core::sandbox::{bus, ExecutionChannel, ProcessContext};
use canvasforge_core::storage::{FileStore, KeyValueStore};
use canvasforge_core::versions::VersionStore;
use canvasforge_core::{logging, Studio};
use canvasforge_tree::{parse_snapshot, ComponentTree, TreeStore};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use uuid::Uuid;

fn usage() {
    eprintln!("Usage:");
    eprintln!("  canvasforge render <snapshot.json>");
    eprintln!("  canvasforge versions list");
    eprintln!("  canvasforge versions save <name> <snapshot.json>");
    eprintln!("  canvasforge versions restore <id> <out.json>");
    eprintln!("  canvasforge versions delete <id>");
    eprintln!("  canvasforge versions clear");
    eprintln!();
    eprintln!("Configuration: $CANVASFORGE_CONFIG (YAML), $CANVASFORGE_STATE_DIR,");
    eprintln!("  $CANVASFORGE_SANDBOX_PROGRAM, $CANVASFORGE_SANDBOX_TIMEOUT_MS, $CANVASFORGE_SCRIPT_TIMEOUT_MS");
}

#[tokio::main]
async fn main() {
    logging::init("warn");

    let args: Vec<String> = env::args().skip(1).collect();
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("✗ {}", e);
            process::exit(1);
        }
    };

    let result = match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["render", path] => render(&config, path).await,
        ["versions", rest @ ..] => versions(&config, rest),
        _ => {
            usage();
            process::exit(2);
        }
    };

    if let Err(msg) = result {
        eprintln!("✗ {}", msg);
        process::exit(1);
    }
}

fn backend(config: &Config) -> Arc<dyn KeyValueStore> {
    let store = FileStore::new(&config.storage.dir);
    match config.storage.quota_bytes {
        Some(quota) => Arc::new(store.with_quota(quota)),
        None => Arc::new(store),
    }
}

fn read_snapshot(path: &str) -> Result<ComponentTree, String> {
    let content = fs::read_to_string(path).map_err(|e| format!("Failed to read {}: {}", path, e))?;
    parse_snapshot(&content).map_err(|e| format!("{} is not a valid snapshot: {}", path, e))
}

fn parse_id(raw: &str) -> Result<Uuid, String> {
    Uuid::parse_str(raw).map_err(|_| format!("'{}' is not a version id", raw))
}

fn sandbox_program(config: &Config) -> Result<PathBuf, String> {
    if let Some(program) = &config.sandbox.program {
        return Ok(program.clone());
    }
    let exe = env::current_exe().map_err(|e| format!("Cannot locate sandbox binary: {}", e))?;
    Ok(exe.with_file_name(format!("canvasforge-sandbox{}", env::consts::EXE_SUFFIX)))
}

async fn render(config: &Config, path: &str) -> Result<(), String> {
    let tree = read_snapshot(path)?;
    let program = sandbox_program(config)?;

    let (tx, rx) = bus();
    let context = ProcessContext::spawn(&program, config.sandbox.process_args(), tx)
        .map_err(|e| e.to_string())?;
    let channel = ExecutionChannel::connect(Arc::new(context), rx, &config.sandbox.channel_config())
        .await
        .map_err(|e| e.to_string())?;

    let store = TreeStore::with_tree(tree, config.history.undo_limit);
    let versions = VersionStore::new(backend(config));
    let mut studio = Studio::new(store, versions, channel, &config.history);

    let results = studio.render_all().await;
    if results.is_empty() {
        println!("No components with code in {}", path);
        return Ok(());
    }

    let mut failed = 0;
    for (id, outcome) in results {
        match outcome {
            Ok(output) => {
                let tree = serde_json::to_string(&output.tree).unwrap_or_else(|e| e.to_string());
                println!("✓ {}: {}", id, tree);
                for line in output.logs {
                    println!("    log: {}", line);
                }
            }
            Err(e) => {
                eprintln!("✗ {}: {}", id, e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        return Err(format!("{} component(s) failed to render", failed));
    }
    Ok(())
}

fn versions(config: &Config, args: &[&str]) -> Result<(), String> {
    let store = VersionStore::new(backend(config));
    match args {
        ["list"] => {
            let list = store.list();
            if list.is_empty() {
                println!("No saved versions");
            }
            for v in list {
                println!(
                    "{}  {}  {:<24}  {} components",
                    v.id,
                    v.timestamp.to_rfc3339(),
                    if v.name.is_empty() { "(unnamed)" } else { v.name.as_str() },
                    v.node_count
                );
            }
            Ok(())
        }
        ["save", name, path] => {
            let tree = read_snapshot(path)?;
            let version = store.save(name, tree.roots()).map_err(|e| e.to_string())?;
            println!("✓ Saved version {} ({})", version.id, version.name);
            Ok(())
        }
        ["restore", id, out] => {
            let components = store.restore(parse_id(id)?).map_err(|e| e.to_string())?;
            let tree = ComponentTree::from_roots(components).map_err(|e| e.to_string())?;
            let json = tree.serialize_pretty().map_err(|e| e.to_string())?;
            fs::write(out, json).map_err(|e| format!("Failed to write {}: {}", out, e))?;
            println!("✓ Restored version {} to {}", id, out);
            Ok(())
        }
        ["delete", id] => {
            store.delete(parse_id(id)?).map_err(|e| e.to_string())?;
            println!("✓ Deleted version {}", id);
            Ok(())
        }
        ["clear"] => {
            store.clear().map_err(|e| e.to_string())?;
            println!("✓ Cleared version history");
            Ok(())
        }
        _ => {
            usage();
            process::exit(2);
        }
    }
}
