use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use msgstore_server::{MsgStoreServer, ServerConfig};
use msgstore_store::{ArticleStore, Registry, RetrieveOutcome};

use crate::cli::*;

/// Config file values, overridden by command-line flags.
pub fn resolve_config(cli: &Cli) -> anyhow::Result<ServerConfig> {
    let mut config = match &cli.config {
        Some(path) => ServerConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ServerConfig::default(),
    };
    if let Some(root) = &cli.root {
        config.data_root = root.clone();
    }
    if let Command::Serve(ServeArgs { bind: Some(bind) }) = &cli.command {
        config.bind_addr = *bind;
    }
    config.verbose |= cli.verbose;
    Ok(config)
}

pub fn run_command(cli: Cli, config: ServerConfig) -> anyhow::Result<()> {
    match cli.command {
        Command::Serve(_) => cmd_serve(config),
        Command::Partitions => cmd_partitions(&config.data_root),
        Command::Stats(args) => cmd_stats(&config.data_root, args),
        Command::Cat(args) => cmd_cat(&config.data_root, args),
    }
}

/// Open an existing data root. Inspection commands never create one.
fn open_store(root: &Path) -> anyhow::Result<ArticleStore> {
    anyhow::ensure!(root.is_dir(), "data root {} does not exist", root.display());
    let registry = Registry::open(root)
        .with_context(|| format!("opening data root {}", root.display()))?;
    Ok(ArticleStore::new(Arc::new(registry)))
}

fn cmd_serve(config: ServerConfig) -> anyhow::Result<()> {
    let server = MsgStoreServer::new(config)?;
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(server.serve())?;
    Ok(())
}

fn cmd_partitions(root: &Path) -> anyhow::Result<()> {
    let store = open_store(root)?;
    let partitions = store.registry().partitions();
    if partitions.is_empty() {
        println!("No partitions in {}", root.display().to_string().bold());
        return Ok(());
    }
    for p in partitions {
        println!(
            "{}  {:>8} articles  (created {})",
            p.key.yellow().bold(),
            p.articles,
            p.created_at.format("%H:%M:%S UTC").to_string().dimmed()
        );
    }
    Ok(())
}

fn cmd_stats(root: &Path, args: StatsArgs) -> anyhow::Result<()> {
    let store = open_store(root)?;
    let Some(stats) = store.stats(&args.msgid) else {
        anyhow::bail!("Article not found msgid={}", args.msgid);
    };
    println!("{} {}", "Article".bold(), args.msgid.yellow());
    println!("  Partition:  {}", stats.partition.cyan());
    println!("  Reads:      {}", stats.stat.read_count);
    println!("  Last read:  {} ms after partition start", stats.stat.last_read_ms);
    println!("  Stored at:  {} ms after partition start", stats.stat.store_age_ms);
    for (k, v) in &stats.meta.attributes {
        println!("  {}: {}", k.blue(), v);
    }
    Ok(())
}

fn cmd_cat(root: &Path, args: CatArgs) -> anyhow::Result<()> {
    let store = open_store(root)?;
    match store.open_view(&args.msgid, args.view)? {
        RetrieveOutcome::Found(mut reader) => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            io::copy(&mut reader, &mut out)?;
            out.flush()?;
            Ok(())
        }
        RetrieveOutcome::Rejected(r) => anyhow::bail!("{r}"),
    }
}
