use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;
use repo_analyzer::git::{CheckoutKind, GitProvider, VcsProvider};
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::tempdir;

fn has_git() -> bool {
    Command::new("git").arg("--version").output().is_ok()
}

fn git(dir: &Path, args: &[&str], date: Option<&str>) {
    let mut cmd = Command::new("git");
    cmd.args(args).current_dir(dir);
    if let Some(date) = date {
        cmd.env("GIT_AUTHOR_DATE", date).env("GIT_COMMITTER_DATE", date);
    }
    assert!(cmd.status().unwrap().success());
}

fn commit(dir: &Path, author: &str, name: &str, content: &str, date: Option<&str>) {
    fs::write(dir.join(name), content).unwrap();
    git(dir, &["add", "."], None);
    git(
        dir,
        &[
            "-c",
            "user.name=Dev",
            "-c",
            "user.email=dev@example.com",
            "commit",
            "--quiet",
            "-m",
            name,
            "--author",
            &format!("Dev <{author}>"),
        ],
        date,
    );
}

fn origin(root: &Path) -> std::path::PathBuf {
    let repo = root.join("origin");
    fs::create_dir_all(&repo).unwrap();
    git(&repo, &["init", "--quiet"], None);
    commit(&repo, "old@example.com", "legacy.txt", "one\ntwo\n", Some("2001-02-03T04:05:06Z"));
    commit(&repo, "alice@example.com", "main.rs", "a\nb\nc\n", None);
    commit(&repo, "bob@example.com", "lib.rs", "d\n", None);
    repo
}

#[test]
fn clones_then_reuses_a_checkout() {
    let dir = tempdir().unwrap();
    if !has_git() {
        return;
    }
    let origin = origin(dir.path());
    let target = dir.path().join("checkouts").join("acme").join("origin");
    let url = format!("file://{}", origin.display());
    let git = GitProvider::new();

    assert_eq!(git.clone_or_open(&url, &target).unwrap(), CheckoutKind::Cloned);
    assert_eq!(git.clone_or_open(&url, &target).unwrap(), CheckoutKind::Reused);

    let mut files = git.list_tracked_files(&target).unwrap();
    files.sort();
    assert_eq!(files, vec!["legacy.txt", "lib.rs", "main.rs"]);
}

#[test]
fn clone_of_missing_repository_fails() {
    let dir = tempdir().unwrap();
    if !has_git() {
        return;
    }
    let url = format!("file://{}", dir.path().join("nope").display());
    let target = dir.path().join("checkout");
    assert!(GitProvider::new().clone_or_open(&url, &target).is_err());
}

#[test]
fn blame_attributes_lines_to_authors() {
    let dir = tempdir().unwrap();
    if !has_git() {
        return;
    }
    let repo = origin(dir.path());
    let git = GitProvider::new();

    let main = git.blame(&repo, "main.rs").unwrap();
    assert_eq!(main.len(), 1);
    assert_eq!(main[0].author_email, "alice@example.com");
    assert_eq!(main[0].lines, 3);

    let legacy = git.blame(&repo, "legacy.txt").unwrap();
    assert_eq!(legacy[0].author_email, "old@example.com");
    assert_eq!(legacy[0].lines, 2);

    assert!(git.blame(&repo, "missing.rs").is_err());
}

#[test]
fn commit_walk_stops_at_the_window() {
    let dir = tempdir().unwrap();
    if !has_git() {
        return;
    }
    let repo = origin(dir.path());
    let since = Utc::now() - Duration::days(365);

    let commits = GitProvider::new().commits_since(&repo, since).unwrap();
    let authors: Vec<_> = commits.iter().map(|c| c.author_email.as_str()).collect();
    assert_eq!(authors.len(), 2);
    assert!(authors.contains(&"alice@example.com"));
    assert!(authors.contains(&"bob@example.com"));
    assert!(commits.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
    assert!(commits.iter().all(|c| c.size > 0 && c.id.len() == 40));
}
