//! Glask CLI - interactive terminal panes and filesystem commands.
//!
//! This is the main binary entry point. See the `glask` library for the
//! core functionality.

use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use glask::fs::{FileKind, FsClient, WorkspaceStore};
use glask::terminal::backend::HttpTerminalBackend;
use glask::terminal::sanitize::strip_markup;
use glask::terminal::{LineId, PaneSnapshot};
use glask::{constants, Action, Config, Driver, PaneId, Terminal, TerminalSnapshot};
use mimalloc::MiMalloc;
use tokio::io::AsyncBufReadExt;
use tokio::sync::watch;

/// Global allocator configured per M-MIMALLOC-APPS guideline.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser)]
#[command(name = "glask")]
#[command(version)]
#[command(about = "Terminal session manager for the Glask workspace backend")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open an interactive terminal. Lines starting with ':' are local
    /// commands (:split, :focus left|right, :resize ROWS COLS, :quit).
    Terminal {
        /// Start in split view
        #[arg(long)]
        split: bool,
    },
    /// Filesystem operations against the backend
    Fs {
        #[command(subcommand)]
        command: FsCommand,
    },
    /// Print the effective configuration
    Config {
        /// Write it to the config file
        #[arg(long)]
        save: bool,
    },
}

#[derive(Subcommand)]
enum FsCommand {
    /// List a directory
    List {
        /// Directory path (relative paths resolve against the workspace)
        #[arg(default_value = "")]
        path: String,
        /// Include subdirectories
        #[arg(long)]
        recursive: bool,
    },
    /// Print a file
    Read {
        /// File path
        path: String,
    },
    /// Write a file (content from --content or stdin)
    Write {
        /// File path
        path: String,
        /// File content; read from stdin when omitted
        #[arg(long)]
        content: Option<String>,
    },
    /// Create a directory
    Mkdir {
        /// Directory path
        path: String,
    },
    /// Search file names
    Search {
        /// Search query
        query: String,
        /// Maximum number of results
        #[arg(long, default_value_t = constants::FS_SEARCH_MAX_RESULTS)]
        max_results: usize,
    },
    /// Register the workspace root
    Register {
        /// Workspace name
        name: String,
        /// Workspace root path
        path: String,
    },
    /// Forget the registered workspace
    Unregister,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let config = Config::load()?;
    log::info!("glask starting ({})", glask::env::Environment::current());

    match cli.command {
        Commands::Terminal { split } => run_terminal(&config, split).await,
        Commands::Fs { command } => run_fs(&config, command).await,
        Commands::Config { save } => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            if save {
                let path = config.save()?;
                println!("Saved to {}", path.display());
            }
            Ok(())
        }
    }
}

/// File logging: `GLASK_LOG_FILE`, else `GLASK_CONFIG_DIR/glask.log`, else
/// `/tmp/glask.log`. Falls back to stderr if the file cannot be created.
fn init_logging() {
    let log_path = if let Ok(path) = std::env::var("GLASK_LOG_FILE") {
        std::path::PathBuf::from(path)
    } else if let Ok(config_dir) = std::env::var("GLASK_CONFIG_DIR") {
        std::path::PathBuf::from(config_dir).join("glask.log")
    } else {
        std::path::PathBuf::from("/tmp/glask.log")
    };

    let filter = glask::env::Environment::current().default_log_filter();
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter));
    builder.format_timestamp_secs();
    match std::fs::File::create(&log_path) {
        Ok(file) => {
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }
        Err(e) => eprintln!("Cannot create log file {}: {e}; logging to stderr", log_path.display()),
    }
    builder.init();

    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        log::error!("PANIC: {:?}", panic_info);
        default_hook(panic_info);
    }));
}

/// One line of stdin, interpreted.
#[derive(Debug, PartialEq)]
enum Input {
    Action(Action),
    Quit,
}

fn parse_input(line: &str, active: PaneId) -> Result<Input> {
    let Some(meta) = line.trim().strip_prefix(':') else {
        return Ok(Input::Action(Action::Submit {
            pane: active,
            text: line.to_string(),
        }));
    };
    let mut words = meta.split_whitespace();
    match (words.next(), words.next(), words.next()) {
        (Some("q" | "quit"), None, None) => Ok(Input::Quit),
        (Some("split"), None, None) => Ok(Input::Action(Action::Split)),
        (Some("focus"), Some(pane), None) => Ok(Input::Action(Action::Focus(pane.parse()?))),
        (Some("resize"), Some(rows), Some(cols)) => Ok(Input::Action(Action::Resize {
            pane: active,
            rows: rows.parse().context("rows must be a number")?,
            cols: cols.parse().context("cols must be a number")?,
        })),
        _ => anyhow::bail!("unknown command ':{meta}' (try :split, :focus left|right, :resize R C, :quit)"),
    }
}

async fn run_terminal(config: &Config, split: bool) -> Result<()> {
    let backend = Arc::new(HttpTerminalBackend::new(config.server_url.clone())?);
    let terminal = Terminal::new(config.terminal_settings());
    let (handle, driver) = Driver::spawn(terminal, backend, config.socket_open_timeout());
    let printer = tokio::spawn(print_lines(handle.subscribe()));

    let (rows, cols) = constants::DEFAULT_DIMS;
    handle.send(Action::Resize {
        pane: PaneId::Left,
        rows,
        cols,
    })?;
    handle.send(Action::Open)?;
    if split {
        handle.send(Action::Split)?;
        handle.send(Action::Resize {
            pane: PaneId::Right,
            rows,
            cols,
        })?;
    }

    let mut stdin = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = stdin.next_line().await? {
        let active = handle.snapshot().active;
        match parse_input(&line, active) {
            Ok(Input::Quit) => break,
            Ok(Input::Action(action)) => handle.send(action)?,
            Err(e) => eprintln!("{e:#}"),
        }
    }

    handle.send(Action::Shutdown)?;
    driver.await.context("terminal driver panicked")?;
    printer.abort();
    Ok(())
}

/// Print lines as they are appended to each pane.
async fn print_lines(mut snapshots: watch::Receiver<Arc<TerminalSnapshot>>) {
    let mut printed: HashMap<PaneId, (usize, Option<LineId>)> = HashMap::new();
    loop {
        let snapshot = Arc::clone(&snapshots.borrow_and_update());
        for pane in &snapshot.panes {
            let prefix = if snapshot.is_split() {
                format!("[{}] ", pane.id)
            } else {
                String::new()
            };
            let entry = printed.entry(pane.id).or_insert((0, None));
            print_new_lines(pane, &prefix, entry);
        }
        printed.retain(|id, _| snapshot.pane(*id).is_some());
        if snapshots.changed().await.is_err() {
            break;
        }
    }
}

fn print_new_lines(pane: &PaneSnapshot, prefix: &str, (seen, first): &mut (usize, Option<LineId>)) {
    let current_first = pane.lines.first().map(|line| line.id().clone());
    if pane.lines.len() < *seen || (first.is_some() && current_first != *first) {
        println!("{prefix}-- cleared --");
        *seen = 0;
    }
    for line in pane.lines.iter().skip(*seen) {
        let text = strip_markup(line.content());
        if line.is_command() {
            println!("{prefix}$ {text}");
        } else {
            println!("{prefix}{}", text.trim_end_matches(['\r', '\n']));
        }
    }
    *seen = pane.lines.len();
    *first = current_first;
}

async fn run_fs(config: &Config, command: FsCommand) -> Result<()> {
    let store = WorkspaceStore::new(Config::workspace_file()?);
    let mut client = FsClient::new(config.server_url.clone(), config.cache_ttl())?.with_store(store)?;

    match command {
        FsCommand::List { path, recursive } => {
            for item in client.list(&path, recursive).await? {
                print_item(&item);
            }
        }
        FsCommand::Read { path } => print!("{}", client.read(&path).await?),
        FsCommand::Write { path, content } => {
            let content = match content {
                Some(content) => content,
                None => {
                    let mut buf = String::new();
                    std::io::stdin()
                        .read_to_string(&mut buf)
                        .context("Failed to read content from stdin")?;
                    buf
                }
            };
            client.write(&path, &content).await?;
            println!("Wrote {}", client.normalize(&path));
        }
        FsCommand::Mkdir { path } => {
            client.mkdir(&path).await?;
            println!("Created {}", client.normalize(&path));
        }
        FsCommand::Search { query, max_results } => {
            for item in client.search(&query, max_results).await? {
                print_item(&item);
            }
        }
        FsCommand::Register { name, path } => {
            let workspace = client.register(&name, &path).await?;
            println!("Registered {} at {}", workspace.name, workspace.path);
        }
        FsCommand::Unregister => {
            client.clear_workspace()?;
            println!("Workspace cleared");
        }
    }
    Ok(())
}

fn print_item(item: &glask::fs::FileItem) {
    match item.kind {
        FileKind::Folder => println!("d {:>10}  {}/", "-", item.path),
        FileKind::File => println!("- {:>10}  {}", item.size, item.path),
    }
}
