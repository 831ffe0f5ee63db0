pub mod remote;
pub mod repo;

pub use remote::{HostingService, RepoHost, RepoUrl};
pub use repo::GitRepo;

use crate::error::{AnalyzerError, Result};
use crate::model::{BlameContribution, CommitRecord};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::Path;
use std::process::{Command, Output};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutKind {
    Cloned,
    Reused,
}

/// Version-control operations the analysis pipeline depends on.
///
/// All methods block; async callers run them on the blocking pool.
pub trait VcsProvider: Send + Sync {
    fn clone_or_open(&self, repo_url: &str, local_path: &Path) -> Result<CheckoutKind>;
    fn list_tracked_files(&self, local_path: &Path) -> Result<Vec<String>>;
    fn blame(&self, local_path: &Path, file: &str) -> Result<Vec<BlameContribution>>;
    fn commits_since(&self, local_path: &Path, since: DateTime<Utc>) -> Result<Vec<CommitRecord>>;
}

/// Provider backed by gix for reading and the `git` executable for clone and blame.
#[derive(Debug, Clone, Default)]
pub struct GitProvider;

impl GitProvider {
    pub fn new() -> Self {
        Self
    }
}

impl VcsProvider for GitProvider {
    fn clone_or_open(&self, repo_url: &str, local_path: &Path) -> Result<CheckoutKind> {
        if local_path.join(".git").is_dir() {
            GitRepo::open(local_path)?;
            return Ok(CheckoutKind::Reused);
        }
        if let Some(parent) = local_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let target = local_path.to_string_lossy();
        run_git(None, &["clone", "--quiet", repo_url, target.as_ref()])
            .map_err(|e| AnalyzerError::CommandFailed(format!("git clone {repo_url}: {e}")))?;
        Ok(CheckoutKind::Cloned)
    }

    fn list_tracked_files(&self, local_path: &Path) -> Result<Vec<String>> {
        GitRepo::open(local_path)?.tracked_files()
    }

    fn blame(&self, local_path: &Path, file: &str) -> Result<Vec<BlameContribution>> {
        let output = run_git(
            Some(local_path),
            &["blame", "--line-porcelain", "HEAD", "--", file],
        )?;
        let text = String::from_utf8_lossy(&output.stdout);
        Ok(parse_line_porcelain(&text))
    }

    fn commits_since(&self, local_path: &Path, since: DateTime<Utc>) -> Result<Vec<CommitRecord>> {
        GitRepo::open(local_path)?.commits_since(since)
    }
}

fn run_git(dir: Option<&Path>, args: &[&str]) -> Result<Output> {
    let mut cmd = Command::new("git");
    cmd.args(args);
    if let Some(dir) = dir {
        cmd.current_dir(dir);
    }
    let output = cmd.output()?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AnalyzerError::CommandFailed(format!(
            "git {} exited with {}: {}",
            args.first().copied().unwrap_or_default(),
            output.status,
            stderr.trim()
        )));
    }
    Ok(output)
}

/// Counts blamed lines per author from `git blame --line-porcelain` output.
pub fn parse_line_porcelain(text: &str) -> Vec<BlameContribution> {
    let mut counts: HashMap<&str, u64> = HashMap::new();
    for line in text.lines() {
        if let Some(mail) = line.strip_prefix("author-mail ") {
            let email = mail.trim().trim_start_matches('<').trim_end_matches('>');
            *counts.entry(email).or_insert(0) += 1;
        }
    }
    let mut contributions: Vec<BlameContribution> = counts
        .into_iter()
        .map(|(email, lines)| BlameContribution {
            author_email: email.to_string(),
            lines,
        })
        .collect();
    contributions.sort_by(|a, b| b.lines.cmp(&a.lines).then_with(|| a.author_email.cmp(&b.author_email)));
    contributions
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn porcelain_lines_are_counted_per_author() {
        let text = "\
4f1c0c5e 1 1 2
author Ada
author-mail <ada@example.com>
author-time 1700000000
summary first
filename src/lib.rs
\tfn a() {}
4f1c0c5e 2 2
author Ada
author-mail <ada@example.com>
filename src/lib.rs
\tfn b() {}
9e3d1a77 3 3 1
author Bob
author-mail <bob@example.com>
filename src/lib.rs
\t// author-mail <not-an-author@example.com>
";
        assert_eq!(
            parse_line_porcelain(text),
            vec![
                BlameContribution {
                    author_email: "ada@example.com".to_string(),
                    lines: 2
                },
                BlameContribution {
                    author_email: "bob@example.com".to_string(),
                    lines: 1
                },
            ]
        );
    }

    #[test]
    fn empty_blame_has_no_contributions() {
        assert!(parse_line_porcelain("").is_empty());
    }
}
