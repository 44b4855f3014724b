// Command-line front end for leveltree
// One-shot commands against a database, or `serve` for the JSON-lines router

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing::{debug, error};

use leveltree::{
    AsyncSession, Backend, IoContext, LevelTreeError, MatchMode, NamespaceTree, Node, PrefixMatcher, PrunePlan,
    Router, Session, StoreOptions,
};

#[derive(Parser, Debug)]
#[command(name = "leveltree", version, about = "Browse and prune !-delimited key namespaces")]
struct Cli {
    /// Log filter (e.g. info, leveltree=debug)
    #[arg(long, env = "LEVELTREE_LOG", default_value = "warn")]
    log_level: String,

    /// fsync the log after every write
    #[arg(long, env = "LEVELTREE_SYNC")]
    sync: bool,

    /// Fail instead of creating a missing database directory
    #[arg(long)]
    no_create: bool,

    /// Use an ephemeral in-memory store instead of the on-disk log
    #[arg(long)]
    memory: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the reconstructed namespace tree
    Tree {
        path: PathBuf,
        /// Pretty-print JSON
        #[arg(long)]
        pretty: bool,
        /// Draw an indented outline instead of JSON
        #[arg(long, conflicts_with = "pretty")]
        outline: bool,
    },
    /// Print the value of a key
    Get { path: PathBuf, key: String },
    /// Set a key
    Put { path: PathBuf, key: String, value: String },
    /// Delete a key
    Del { path: PathBuf, key: String },
    /// Delete every key under a prefix
    Prune {
        path: PathBuf,
        prefix: String,
        /// literal, segments or regex
        #[arg(long, default_value_t = MatchMode::Literal)]
        mode: MatchMode,
        /// List the keys that would be deleted without deleting them
        #[arg(long)]
        dry_run: bool,
    },
    /// Answer JSON-lines requests on stdin
    Serve,
}

impl Cli {
    fn store_options(&self) -> StoreOptions {
        StoreOptions::default()
            .create_if_missing(!self.no_create)
            .sync_writes(self.sync)
            .backend(if self.memory { Backend::Memory } else { Backend::Log })
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&cli.log_level)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        error!(error = %e, "command failed");
        eprintln!("leveltree: {}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> leveltree::Result<()> {
    let options = cli.store_options();
    debug!(?options, "starting");

    match cli.command {
        Command::Tree { path, pretty, outline } => {
            let session = AsyncSession::open(&path, options).await?;
            let tree = session.reconstruct().await?;
            session.close().await?;

            if outline {
                let mut out = String::new();
                render_outline(&tree, 0, &mut out);
                print!("{}", out);
            } else if pretty {
                println!("{}", to_json(serde_json::to_string_pretty(&tree))?);
            } else {
                println!("{}", to_json(serde_json::to_string(&tree))?);
            }
        }

        Command::Get { path, key } => {
            let session = AsyncSession::open(&path, options).await?;
            match session.get(&key).await? {
                Some(value) => println!("{}", value),
                None => println!("(not found)"),
            }
            session.close().await?;
        }

        Command::Put { path, key, value } => {
            let session = AsyncSession::open(&path, options).await?;
            session.put(&key, &value).await?;
            session.close().await?;
            println!("✓ Set '{}'", key);
        }

        Command::Del { path, key } => {
            let session = AsyncSession::open(&path, options).await?;
            let existed = session.delete(&key).await?;
            session.close().await?;
            if existed {
                println!("✓ Deleted '{}'", key);
            } else {
                println!("(not found)");
            }
        }

        Command::Prune { path, prefix, mode, dry_run: true } => {
            let session = Session::open(&path, &options)?;
            let matcher = PrefixMatcher::compile(&prefix, mode)?;
            let plan = PrunePlan::collect(&session, &matcher)?;
            for key in plan.keys() {
                println!("{}", key);
            }
            println!("{} keys would be deleted", plan.len());
        }

        Command::Prune { path, prefix, mode, dry_run: false } => {
            let session = AsyncSession::open(&path, options).await?;
            let deleted = session.prune_subtree(&prefix, mode).await?;
            session.close().await?;
            println!("✓ Deleted {} keys under '{}'", deleted, prefix);
        }

        Command::Serve => {
            tokio::task::spawn_blocking(move || serve(options))
                .await
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
                .io_context("serving requests")??;
        }
    }

    Ok(())
}

fn serve(options: StoreOptions) -> leveltree::Result<()> {
    let mut router = Router::new(options);
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = line.io_context("reading request")?;
        if line.trim().is_empty() {
            continue;
        }

        let reply = router.handle_line(&line);
        let encoded = to_json(serde_json::to_string(&reply))?;
        writeln!(stdout, "{}", encoded)
            .and_then(|_| stdout.flush())
            .io_context("writing reply")?;
    }

    router.close_all()
}

fn to_json(encoded: serde_json::Result<String>) -> leveltree::Result<String> {
    encoded.map_err(|e| LevelTreeError::Io {
        context: "encoding JSON".to_string(),
        source: io::Error::new(io::ErrorKind::InvalidData, e),
    })
}

fn render_outline(tree: &NamespaceTree, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    for (name, child) in tree.children() {
        match child {
            Node::Branch(sub) => {
                out.push_str(&format!("{}├── {}/\n", indent, name));
                render_outline(sub, depth + 1, out);
            }
            Node::Leaf(value) => {
                out.push_str(&format!("{}├── {} = {}\n", indent, name, truncate(value, 50)));
            }
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
