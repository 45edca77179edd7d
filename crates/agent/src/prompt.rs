//! System prompt assembly.
//!
//! The configured prompt (plus citation rules when the knowledge base is
//! on) and, when `[agent].git_context` is set, a snapshot of the git
//! repository the session starts in. The snapshot is taken once; it does
//! not follow later commits or `cd`s.

use std::path::Path;

use hintloop_config::AppConfig;
use tokio::process::Command;
use tracing::debug;

const RECENT_COMMITS: &str = "5";

/// Branch, status and history of a working tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitContext {
    pub branch: String,
    pub main_branch: String,
    pub status: String,
    pub recent_commits: String,
}

impl GitContext {
    /// Read the repository containing `dir`. `None` when `dir` is not inside
    /// a work tree or git is not installed.
    pub async fn collect(dir: &Path) -> Option<Self> {
        let inside = git(dir, &["rev-parse", "--is-inside-work-tree"]).await?;
        if inside != "true" {
            return None;
        }

        let branch = git(dir, &["branch", "--show-current"]).await.unwrap_or_default();
        let branches = git(dir, &["branch", "-a"]).await.unwrap_or_default();
        let status = git(dir, &["status", "--short"]).await.unwrap_or_default();
        let log = git(dir, &["log", "--oneline", "-n", RECENT_COMMITS])
            .await
            .unwrap_or_default();

        Some(Self {
            branch: or(branch, "unknown"),
            main_branch: main_branch(&branches).to_string(),
            status: or(status, "No changes"),
            recent_commits: or(log, "No commits"),
        })
    }

    pub fn render(&self) -> String {
        format!(
            "=== GIT CONTEXT ===\nCurrent branch: {}\nMain branch: {}\nStatus:\n{}\nRecent commits:\n{}",
            self.branch, self.main_branch, self.status, self.recent_commits
        )
    }
}

fn or(value: String, fallback: &str) -> String {
    if value.is_empty() { fallback.to_string() } else { value }
}

/// `main` or `master`, whichever the branch list has; `main` otherwise.
fn main_branch(branch_list: &str) -> &'static str {
    let names: Vec<&str> = branch_list
        .lines()
        .map(|l| l.trim_start_matches(['*', ' ']))
        .map(|l| l.rsplit('/').next().unwrap_or(l))
        .collect();
    if names.contains(&"main") {
        "main"
    } else if names.contains(&"master") {
        "master"
    } else {
        "main"
    }
}

async fn git(dir: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// The system prompt a session starts with.
pub async fn system_prompt(config: &AppConfig, dir: &Path) -> String {
    let mut prompt = config.system_prompt();
    if config.agent.git_context {
        match GitContext::collect(dir).await {
            Some(git) => {
                prompt.push_str("\n\n");
                prompt.push_str(&git.render());
            }
            None => debug!(dir = %dir.display(), "No git repository, prompt has no git context"),
        }
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command as StdCommand;

    fn run_git(dir: &Path, args: &[&str]) -> bool {
        StdCommand::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// A repo on branch `trunk` with one commit and one untracked file.
    /// `false` when git is unavailable.
    fn init_repo(dir: &Path) -> bool {
        std::fs::write(dir.join("readme.md"), "hello\n").unwrap();
        let steps: [&[&str]; 4] = [
            &["init", "-q"],
            &["checkout", "-q", "-b", "trunk"],
            &["add", "readme.md"],
            &[
                "-c", "user.name=t", "-c", "user.email=t@example.com", "-c", "commit.gpgsign=false",
                "commit", "-q", "-m", "first commit",
            ],
        ];
        if !steps.iter().all(|args| run_git(dir, args)) {
            return false;
        }
        std::fs::write(dir.join("new.txt"), "x").unwrap();
        true
    }

    #[test]
    fn main_branch_detection() {
        assert_eq!(main_branch("* feature\n  master\n"), "master");
        assert_eq!(main_branch("  dev\n* main\n  remotes/origin/main"), "main");
        assert_eq!(main_branch("* trunk"), "main");
        assert_eq!(main_branch("* maintenance"), "main");
    }

    #[test]
    fn render_layout() {
        let git = GitContext {
            branch: "feature/x".into(),
            main_branch: "main".into(),
            status: "No changes".into(),
            recent_commits: "abc123 fix parser".into(),
        };
        assert_eq!(
            git.render(),
            "=== GIT CONTEXT ===\nCurrent branch: feature/x\nMain branch: main\nStatus:\nNo changes\nRecent commits:\nabc123 fix parser"
        );
    }

    #[tokio::test]
    async fn collects_from_repository() {
        let dir = tempfile::tempdir().unwrap();
        if !init_repo(dir.path()) {
            return;
        }

        let git = GitContext::collect(dir.path()).await.unwrap();
        assert_eq!(git.branch, "trunk");
        assert_eq!(git.main_branch, "main");
        assert!(git.status.contains("?? new.txt"));
        assert!(git.recent_commits.ends_with("first commit"));
    }

    #[tokio::test]
    async fn prompt_without_git_context_is_config_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::default();
        assert_eq!(system_prompt(&config, dir.path()).await, config.system_prompt());
    }

    #[tokio::test]
    async fn prompt_gains_git_context() {
        let dir = tempfile::tempdir().unwrap();
        if !init_repo(dir.path()) {
            return;
        }
        let mut config = AppConfig::default();
        config.agent.git_context = true;

        let prompt = system_prompt(&config, dir.path()).await;
        assert!(prompt.starts_with(&config.system_prompt()));
        assert!(prompt.contains("=== GIT CONTEXT ===\nCurrent branch: trunk"));
    }

    #[tokio::test]
    async fn plain_directory_has_no_git_context() {
        let dir = tempfile::tempdir().unwrap();
        let inside = GitContext::collect(dir.path()).await;
        // a temp dir nested in some checkout would still be a work tree
        if run_git(dir.path(), &["rev-parse", "--is-inside-work-tree"]) {
            return;
        }
        assert!(inside.is_none());
    }
}
