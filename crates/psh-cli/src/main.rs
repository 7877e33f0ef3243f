//! psh — remote files over one persistent ssh shell.
//!
//! Lists, reads, writes and creates remote files through the system `ssh`
//! client, keeping a single shell open per invocation, plus an interactive
//! folder browser that remembers where it left off.

mod commands;
mod config;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{Config, Settings};

/// psh — persistent remote shell
#[derive(Parser)]
#[command(name = "psh", version, about = "Browse and edit remote files over one persistent ssh shell")]
struct Cli {
    /// Config file path (default ~/.psh/config.toml)
    #[arg(long = "config", global = true)]
    config: Option<PathBuf>,

    /// ssh program to run instead of the configured one
    #[arg(long = "program", global = true)]
    program: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a command in the remote shell and exit with its status
    Exec {
        /// Target in [user@]host format
        target: String,
        /// Kill the transport after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Command words, joined with spaces
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// List a remote folder
    Ls {
        /// Folder as [user@]host:path (empty path is the home directory)
        location: String,
        /// Print the listing as JSON
        #[arg(long)]
        json: bool,
        /// Include dotfiles
        #[arg(short, long)]
        all: bool,
    },

    /// Print remote files
    Cat {
        /// Files as [user@]host:path
        #[arg(required = true)]
        locations: Vec<String>,
    },

    /// Upload a local file
    Put {
        /// Local file
        local: PathBuf,
        /// Destination as [user@]host:path
        location: String,
    },

    /// List the files in a remote folder matching glob patterns
    Glob {
        /// Folder as [user@]host:path
        location: String,
        /// Space-separated patterns, each containing '*'
        patterns: String,
    },

    /// Create a remote file or folders (end with / for folders only)
    New {
        /// Folder to create in, as [user@]host:path
        location: String,
        /// Path to create, e.g. notes/todo.txt
        path: String,
    },

    /// Browse a remote host interactively
    Browse {
        /// Target in [user@]host format (default: the last one browsed)
        target: Option<String>,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "psh=debug,psh_cli=debug,psh_client=debug,psh_core=debug"
    } else {
        "psh=warn,psh_cli=warn,psh_client=warn,psh_core=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // stdout carries file contents
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config_path = cli.config.clone().unwrap_or_else(config::default_config_path);
    let mut cfg = Config::load(&config_path).unwrap_or_else(|e| {
        warn!("{:#}", e);
        Config::default()
    });
    if let Some(program) = cli.program {
        cfg.transport.program = program;
    }
    let settings = Settings::new(&cfg, &config_path);

    let result = match cli.command {
        Command::Exec {
            target,
            timeout,
            command,
        } => commands::exec::run(&target, &command, timeout, &settings).await,
        Command::Ls {
            location,
            json,
            all,
        } => commands::ls::run(&location, json, all, &settings).await.map(|()| 0),
        Command::Cat { locations } => commands::cat::run(&locations, &settings).await.map(|()| 0),
        Command::Put { local, location } => {
            commands::put::run(&local, &location, &settings).await.map(|()| 0)
        }
        Command::Glob { location, patterns } => {
            commands::glob::run(&location, &patterns, &settings).await.map(|()| 0)
        }
        Command::New { location, path } => {
            commands::new::run(&location, &path, &settings).await.map(|()| 0)
        }
        Command::Browse { target } => {
            commands::browse::run(target.as_deref(), &settings).await.map(|()| 0)
        }
    };

    match result {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("{:#}", e);
            eprintln!("psh: {e:#}");
            std::process::exit(1);
        }
    }
}
