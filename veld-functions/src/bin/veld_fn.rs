// Command-line front end for the function execution subsystem.
// Validates and runs script files with the same routing the embedded service uses.

use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use veld_functions::{ExecutionStrategy, FunctionService, FunctionsConfig};
use veld_store::{DataStoreSession, MemoryStore};

#[derive(Parser)]
#[command(name = "veld-fn")]
#[command(about = "Run and validate user function scripts")]
#[command(version = "0.1.0")]
struct Args {
    /// TOML configuration file; VELD_FN_* environment variables override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Syntax-check a script file without running it
    Validate {
        /// Script file to check
        file: PathBuf,
    },
    /// Execute a script file and print the result as JSON
    Run {
        /// Script file to execute
        file: PathBuf,

        /// Invocation context as inline JSON, or @path to read it from a file
        #[arg(short = 'x', long)]
        context: Option<String>,

        /// Isolation strategy: auto, in_process, subprocess or remote
        #[arg(short, long, default_value = "auto")]
        strategy: String,

        /// Wall-clock budget in seconds
        #[arg(short, long)]
        timeout_secs: Option<u64>,

        /// Attach an in-memory demo store so capability functions resolve
        #[arg(long)]
        demo_store: bool,
    },
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<FunctionsConfig> {
    let base = match path {
        Some(p) => {
            let text = std::fs::read_to_string(p)?;
            FunctionsConfig::from_toml_str(&text)?
        }
        None => FunctionsConfig::default(),
    };
    Ok(base.apply_env_overrides()?)
}

fn load_context(spec: Option<&str>) -> anyhow::Result<Value> {
    match spec {
        None => Ok(json!({})),
        Some(s) if s.starts_with('@') => {
            let text = std::fs::read_to_string(&s[1..])?;
            Ok(serde_json::from_str(&text)?)
        }
        Some(s) => Ok(serde_json::from_str(s)?),
    }
}

fn demo_session() -> anyhow::Result<Arc<MemoryStore>> {
    let store = Arc::new(MemoryStore::new());
    let note_type = store.add_object_type("note", "Note")?;
    let tag_type = store.add_object_type("tag", "Tag")?;
    let tagged = store.add_link_type("tagged_with", &note_type, &tag_type)?;

    let note = store.create_object(&note_type, json!({"title": "hello", "body": "first note"}))?;
    let tag = store.create_object(&tag_type, json!({"label": "inbox"}))?;
    store.create_link(&tagged, &note.id, &tag.id, json!({"added_by": "demo"}))?;
    Ok(store)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("veld_functions=info".parse()?),
        )
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(args.config.as_ref())?;

    match args.command {
        Command::Validate { file } => {
            let script = std::fs::read_to_string(&file)?;
            let service = FunctionService::new(config);
            let v = service.validate(&script);
            if v.valid {
                println!("{}: ok", file.display());
                Ok(())
            } else {
                println!(
                    "{}: {}",
                    file.display(),
                    v.error.unwrap_or_else(|| "invalid script".to_string())
                );
                std::process::exit(1);
            }
        }
        Command::Run {
            file,
            context,
            strategy,
            timeout_secs,
            demo_store,
        } => {
            let script = std::fs::read_to_string(&file)?;
            let context = load_context(context.as_deref())?;
            let strategy: ExecutionStrategy = strategy
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))?;
            let timeout = timeout_secs.map(Duration::from_secs);

            let service = if demo_store {
                let session: Arc<dyn DataStoreSession> = demo_session()?;
                FunctionService::with_session(config, session)
            } else {
                FunctionService::new(config)
            };

            let result = service.execute(&script, context, Some(strategy), timeout)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if result.success {
                Ok(())
            } else {
                std::process::exit(1);
            }
        }
    }
}
