use crate::command::Command;
use clap::Parser;

#[derive(Parser)]
#[command(name = "stagefs", version, about = "Stage file system changes and apply them in order")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log every queued and applied operation
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,
}
