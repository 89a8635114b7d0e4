use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use msgstore_store::ViewKind;

#[derive(Parser)]
#[command(
    name = "msgstore",
    about = "Date-partitioned article store addressed by message id",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log every stored and read article
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// TOML config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Data root holding the partition directories
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP server
    Serve(ServeArgs),
    /// List partitions and their article counts
    Partitions,
    /// Show usage statistics of an article
    Stats(StatsArgs),
    /// Print a view of a stored article (not counted as a read)
    Cat(CatArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(long)]
    pub bind: Option<SocketAddr>,
}

#[derive(Args)]
pub struct StatsArgs {
    pub msgid: String,
}

#[derive(Args)]
pub struct CatArgs {
    pub msgid: String,
    /// HEAD, ARTICLE or BODY
    #[arg(long = "type", default_value = "ARTICLE")]
    pub view: ViewKind,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_cat_with_view() {
        let cli = Cli::parse_from(["msgstore", "--root", "/tmp/spool", "cat", "<1@x>", "--type", "HEAD"]);
        assert_eq!(cli.root, Some(PathBuf::from("/tmp/spool")));
        match cli.command {
            Command::Cat(args) => {
                assert_eq!(args.msgid, "<1@x>");
                assert_eq!(args.view, ViewKind::HeadersOnly);
            }
            _ => panic!("expected cat"),
        }
    }

    #[test]
    fn parse_rejects_unknown_view() {
        assert!(Cli::try_parse_from(["msgstore", "cat", "x", "--type", "XOVER"]).is_err());
    }

    #[test]
    fn parse_serve_bind() {
        let cli = Cli::parse_from(["msgstore", "serve", "--bind", "0.0.0.0:9000", "-v"]);
        assert!(cli.verbose);
        match cli.command {
            Command::Serve(args) => assert_eq!(args.bind.unwrap().port(), 9000),
            _ => panic!("expected serve"),
        }
    }
}
