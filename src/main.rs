use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use conveyor::{Engine, Settings};

#[derive(Parser)]
#[command(name = "conveyor")]
#[command(about = "Watches directories and dispatches arriving files to handlers")]
#[command(version)]
struct Cli {
    /// Path to the configuration file (defaults to conveyor.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration file
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Start all configured watchers and run until interrupted
    Run,

    /// Show the effective configuration
    Config,

    /// List registered handler types, plugins included
    Types,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init { force } => {
            Settings::init_config_file(force)?;
        }

        Commands::Run => {
            let settings = load_settings(cli.config.as_deref())?;
            conveyor::logging::init_with_config(&settings.logging);

            let mut engine = Engine::new(settings)?;
            engine.set_failure_callback(|watcher| {
                tracing::error!(
                    "[engine] watcher '{watcher}' halted after a handler failure; \
                     restart it explicitly once the cause is fixed"
                );
            });
            engine.startup()?;

            let shutdown = Arc::new(AtomicBool::new(false));
            let flag = Arc::clone(&shutdown);
            ctrlc::set_handler(move || {
                flag.store(true, Ordering::SeqCst);
            })?;

            println!(
                "conveyor running with {} watcher(s), ctrl-c to stop",
                engine.watcher_count()
            );
            while !shutdown.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(200));
            }

            println!("shutting down");
            engine.shutdown();
        }

        Commands::Config => {
            let settings = load_settings(cli.config.as_deref())?;
            print!("{}", toml::to_string_pretty(&settings)?);
        }

        Commands::Types => {
            let settings = load_settings(cli.config.as_deref())?;
            conveyor::logging::init_with_config(&settings.logging);

            let engine = Engine::new(settings)?;
            for type_name in engine.handler_types() {
                println!("{type_name}");
            }
        }
    }

    Ok(())
}

fn load_settings(path: Option<&Path>) -> Result<Settings, Box<figment::Error>> {
    match path {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
}
