use super::open_host;
use super::plan::Plan;
use crate::error::Result;
use crate::fs::TransactionalFileSystem;
use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
pub struct ListArgs {
    /// Plan file, one operation per line
    pub plan: PathBuf,

    /// Directory to list
    pub dir: String,

    /// Directory relative paths resolve against (defaults to current directory)
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,
}

/// Prints the directory as it would look once the plan is applied.
///
/// `write` steps still run; queued steps are discarded afterwards.
pub fn execute(args: ListArgs) -> Result<()> {
    let plan = Plan::load(&args.plan)?;
    let mut fs = TransactionalFileSystem::new(open_host(args.root.as_deref())?);

    let listing = plan.stage(&mut fs).and_then(|_| fs.read_dir_sync(&args.dir));
    let queued = fs.discard();
    log::debug!("Listed {} with {} operation(s) queued", args.dir, queued.len());

    for entry in listing? {
        let name = entry.path.rsplit('/').next().unwrap_or(&entry.path).to_string();
        if entry.is_directory {
            println!("{}/", name.blue().bold());
        } else {
            println!("{}", name);
        }
    }

    Ok(())
}
