//! Plan files: one staged operation per line.
//!
//! ```text
//! # comments and blank lines are ignored
//! mkdir build/out
//! write build/out/NOTES.txt generated by stagefs
//! mv old-dir new-dir
//! cp templates build/templates
//! rm stale.txt
//! rmdir tmp
//! ```
//!
//! `write` happens immediately while the plan is staged. Everything else is
//! queued.

use crate::error::{Result, TransactionError};
use crate::fs::TransactionalFileSystem;
use crate::host::FileSystemHost;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanStep {
    Mkdir(String),
    DeleteFile(String),
    DeleteDir(String),
    Move { from: String, to: String },
    Copy { from: String, to: String },
    Write { path: String, text: String },
}

#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub steps: Vec<PlanStep>,
}

impl Plan {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read plan {}: {}", path.display(), e))?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut steps = Vec::new();

        for (number, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            steps.push(parse_line(line).map_err(|message| TransactionError::InvalidPlan {
                line: number + 1,
                message,
            })?);
        }

        Ok(Self { steps })
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Queues (or for `write`, performs) every step in order.
    pub fn stage<H: FileSystemHost>(&self, fs: &mut TransactionalFileSystem<H>) -> Result<()> {
        for step in &self.steps {
            log::debug!("Staging {:?}", step);
            match step {
                PlanStep::Mkdir(path) => fs.queue_mkdir(path),
                PlanStep::DeleteFile(path) => fs.queue_file_delete(path),
                PlanStep::DeleteDir(path) => fs.queue_directory_delete(path)?,
                PlanStep::Move { from, to } => fs.queue_move_directory(from, to)?,
                PlanStep::Copy { from, to } => fs.queue_copy_directory(from, to)?,
                PlanStep::Write { path, text } => fs.write_file_sync(path, text)?,
            }
        }
        Ok(())
    }
}

fn split_word(input: &str) -> (&str, &str) {
    match input.find(char::is_whitespace) {
        Some(at) => (&input[..at], input[at..].trim_start()),
        None => (input, ""),
    }
}

fn parse_line(line: &str) -> std::result::Result<PlanStep, String> {
    let (keyword, rest) = split_word(line);

    if keyword == "write" {
        let (path, text) = split_word(rest);
        if path.is_empty() {
            return Err("write needs a path".to_string());
        }
        return Ok(PlanStep::Write {
            path: path.to_string(),
            text: text.to_string(),
        });
    }

    let args: Vec<&str> = rest.split_whitespace().collect();
    let expected = match keyword {
        "mkdir" | "rm" | "rmdir" => 1,
        "mv" | "cp" => 2,
        other => return Err(format!("unknown command '{other}'")),
    };
    if args.len() != expected {
        return Err(format!(
            "{keyword} takes {expected} path{}, got {}",
            if expected == 1 { "" } else { "s" },
            args.len()
        ));
    }

    let arg = |i: usize| args[i].to_string();
    Ok(match keyword {
        "mkdir" => PlanStep::Mkdir(arg(0)),
        "rm" => PlanStep::DeleteFile(arg(0)),
        "rmdir" => PlanStep::DeleteDir(arg(0)),
        "mv" => PlanStep::Move {
            from: arg(0),
            to: arg(1),
        },
        _ => PlanStep::Copy {
            from: arg(0),
            to: arg(1),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::InMemoryFileSystemHost;

    #[test]
    fn test_parse_skips_comments_and_blank_lines() {
        let plan = Plan::parse("# header\n\nmkdir a\n  rm a/b.txt  \n").unwrap();
        assert_eq!(
            plan.steps,
            vec![
                PlanStep::Mkdir("a".to_string()),
                PlanStep::DeleteFile("a/b.txt".to_string())
            ]
        );
    }

    #[test]
    fn test_parse_write_keeps_inner_spacing() {
        let plan = Plan::parse("write notes.txt hello   world").unwrap();
        assert_eq!(
            plan.steps[0],
            PlanStep::Write {
                path: "notes.txt".to_string(),
                text: "hello   world".to_string()
            }
        );
    }

    #[test]
    fn test_parse_reports_line_number() {
        let err = Plan::parse("mkdir a\nmv only-one\n").unwrap_err();
        match err {
            TransactionError::InvalidPlan { line, message } => {
                assert_eq!(line, 2);
                assert!(message.contains("mv takes 2 paths"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_rejects_unknown_command() {
        let err = Plan::parse("chmod a").unwrap_err();
        assert!(err.to_string().contains("unknown command 'chmod'"));
    }

    #[test]
    fn test_stage_queues_in_order() {
        let plan = Plan::parse("mkdir /a/b\nrmdir /a\nwrite /f.txt x\n").unwrap();
        let mut fs = TransactionalFileSystem::new(InMemoryFileSystemHost::new());

        plan.stage(&mut fs).unwrap();

        assert_eq!(fs.len(), 2);
        assert!(fs.host().file_exists_sync("/f.txt"));
        assert!(!fs.directory_exists_sync("/a"));
        fs.discard();
    }
}
