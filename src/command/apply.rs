use super::plan::Plan;
use super::open_host;
use crate::error::Result;
use crate::fs::{Operation, OperationKind, TransactionalFileSystem};
use crate::path::StandardizedPath;
use clap::Parser;
use colored::Colorize;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug, Clone)]
pub struct ApplyArgs {
    /// Plan file, one operation per line
    pub plan: PathBuf,

    /// Directory relative plan paths resolve against (defaults to current directory)
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Show the queued operations without applying them
    #[arg(long, short = 'n')]
    pub dry_run: bool,

    /// Only apply the operations under this directory
    #[arg(long, value_name = "DIR")]
    pub save: Option<String>,
}

pub fn execute(args: ApplyArgs) -> Result<()> {
    let plan = Plan::load(&args.plan)?;
    let host = open_host(args.root.as_deref())?;
    let mut fs = TransactionalFileSystem::new(host);
    let root = PathBuf::from(fs.current_directory().as_str());

    log::debug!("Loaded {} step(s) from {}", plan.len(), args.plan.display());

    if let Err(e) = plan.stage(&mut fs) {
        eprintln!("{} {}", "Error while staging:".red().bold(), e);
        fs.discard();
        return Err(e);
    }

    if args.dry_run {
        let queued = fs.discard();
        print_summary(&queued, &root, true);
        return Ok(());
    }

    let queued = fs.pending_operations();
    let result = match &args.save {
        Some(dir) => fs.save_for_directory_sync(dir),
        None => fs.flush_sync(),
    };

    let remaining = fs.pending_operations();
    let applied: Vec<Operation> = queued
        .into_iter()
        .filter(|op| !remaining.iter().any(|left| left.index == op.index))
        .collect();

    if let Err(e) = result {
        eprintln!("{} {}", "Error while applying:".red().bold(), e);
        print_summary(&applied, &root, false);
        eprintln!(
            "{} {} operation(s) left unapplied.",
            "ℹ".blue().bold(),
            remaining.len()
        );
        fs.discard();
        return Err(e);
    }

    print_summary(&applied, &root, false);

    if !remaining.is_empty() {
        println!(
            "\n{} {} operation(s) outside {} still queued:",
            "ℹ".blue().bold(),
            remaining.len(),
            args.save.as_deref().unwrap_or("the saved directory")
        );
        for op in &remaining {
            println!("   • {}", op.to_string().dimmed());
        }
        fs.discard();
    }

    Ok(())
}

fn print_group(title: &str, items: &[String], dry_run: bool, limit: usize) {
    if items.is_empty() {
        return;
    }

    println!(
        "\n{} ({} item{})",
        title.bold(),
        items.len(),
        if items.len() == 1 { "" } else { "s" }
    );

    let bullet = if dry_run {
        "•".to_string()
    } else {
        "✓".green().to_string()
    };
    for item in items.iter().take(limit) {
        println!("   {} {}", bullet, item);
    }
    if items.len() > limit {
        println!("   {} {} more...", bullet, items.len() - limit);
    }
}

/// Prints operations grouped by kind, paths relative to `root`.
pub fn print_summary(operations: &[Operation], root: &Path, dry_run: bool) {
    if operations.is_empty() {
        println!("\n{}", "Nothing to apply".yellow());
        return;
    }

    let display = |path: &StandardizedPath| path.relative_to(root);

    let mut created = Vec::new();
    let mut deleted_dirs = Vec::new();
    let mut deleted_files = Vec::new();
    let mut transfers = Vec::new();

    for op in operations {
        match &op.kind {
            OperationKind::Mkdir(path) => created.push(display(path).green().to_string()),
            OperationKind::DeleteDir(path) => deleted_dirs.push(display(path).red().to_string()),
            OperationKind::DeleteFile(path) => deleted_files.push(display(path).red().to_string()),
            OperationKind::MoveDir { from, to } => transfers.push(format!(
                "{} {} → {}",
                "mv".dimmed(),
                display(from).yellow(),
                display(to).green()
            )),
            OperationKind::CopyDir { from, to } => transfers.push(format!(
                "{} {} → {}",
                "cp".dimmed(),
                display(from).yellow(),
                display(to).green()
            )),
        }
    }

    if dry_run {
        println!("{}", "DRY RUN - No changes will be made".yellow().bold());
    } else {
        println!("\n{}", "Changes applied:".green().bold());
    }

    print_group("Created directories", &created, dry_run, 8);
    print_group("Moved and copied", &transfers, dry_run, 8);
    print_group("Deleted directories", &deleted_dirs, dry_run, 8);
    print_group("Deleted files", &deleted_files, dry_run, 8);

    println!();
    let count = operations.len();
    if dry_run {
        println!(
            "{} operation{} queued. Run without {} to apply.",
            count.to_string().cyan().bold(),
            if count == 1 { "" } else { "s" },
            "--dry-run".cyan()
        );
    } else {
        println!(
            "{} operation{} applied.",
            count.to_string().green().bold(),
            if count == 1 { "" } else { "s" }
        );
    }
}
