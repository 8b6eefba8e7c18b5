use anyhow::anyhow;
// All git access goes through the cli on the single writer task, so there
// is no in-process git state to synchronize.
use std::path::Path;
use tokio::process::Command;

async fn run_git(repo_path: &Path, args: &[&str]) -> Result<String, anyhow::Error> {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo_path)
        .output()
        .await
        .map_err(|op| anyhow!("Failed to execute git {}: {}", args.join(" "), op))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
    } else {
        Err(anyhow!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        ))
    }
}

pub async fn clone_repo(origin_url: &str, destination: &Path) -> Result<(), anyhow::Error> {
    let parent = destination
        .parent()
        .ok_or_else(|| anyhow!("clone destination has no parent directory"))?;
    tokio::fs::create_dir_all(parent).await?;
    let output = Command::new("git")
        .arg("clone")
        .arg(origin_url)
        .arg(destination)
        .output()
        .await
        .map_err(|op| anyhow!("Failed to execute git clone {origin_url}: {op}"))?;
    if output.status.success() {
        Ok(())
    } else {
        Err(anyhow!(
            "git clone failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        ))
    }
}

pub async fn fetch(repo_path: &Path) -> Result<(), anyhow::Error> {
    run_git(repo_path, &["fetch", "origin"]).await.map(|_| ())
}

pub async fn pull(repo_path: &Path) -> Result<(), anyhow::Error> {
    run_git(repo_path, &["pull", "origin"]).await.map(|_| ())
}

pub async fn head_sha(repo_path: &Path) -> Result<String, anyhow::Error> {
    run_git(repo_path, &["rev-parse", "HEAD"]).await
}

/// The remote default branch tip. `origin/HEAD` is not always set on fresh
/// clones, so fall back through the common default branch names, then the
/// local HEAD.
pub async fn remote_head_sha(repo_path: &Path) -> Result<String, anyhow::Error> {
    for reference in ["origin/HEAD", "origin/main", "origin/master"] {
        if let Ok(sha) = run_git(repo_path, &["rev-parse", reference]).await {
            return Ok(sha);
        }
    }
    head_sha(repo_path).await
}

pub async fn commits_between(
    repo_path: &Path,
    from_sha: &str,
    to_sha: &str,
) -> Result<i64, anyhow::Error> {
    let range = format!("{from_sha}..{to_sha}");
    let count = run_git(repo_path, &["rev-list", "--count", &range]).await?;
    count
        .parse()
        .map_err(|err| anyhow!("unparsable rev-list count {count}: {err}"))
}

pub async fn changed_files(
    repo_path: &Path,
    from_sha: &str,
    to_sha: &str,
) -> Result<Vec<String>, anyhow::Error> {
    let range = format!("{from_sha}..{to_sha}");
    let output = run_git(repo_path, &["diff", "--name-only", &range]).await?;
    Ok(output
        .lines()
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect())
}

pub async fn deleted_files(
    repo_path: &Path,
    from_sha: &str,
    to_sha: &str,
) -> Result<Vec<String>, anyhow::Error> {
    let range = format!("{from_sha}..{to_sha}");
    let output = run_git(repo_path, &["diff", "--name-only", "--diff-filter=D", &range]).await?;
    Ok(output
        .lines()
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command as StdCommand;

    fn git_in(dir: &Path, args: &[&str]) {
        let status = StdCommand::new("git")
            .args(args)
            .current_dir(dir)
            .env("GIT_AUTHOR_NAME", "test")
            .env("GIT_AUTHOR_EMAIL", "test@test")
            .env("GIT_COMMITTER_NAME", "test")
            .env("GIT_COMMITTER_EMAIL", "test@test")
            .status()
            .expect("git to run");
        assert!(status.success(), "git {args:?} failed");
    }

    fn init_repo(dir: &Path) {
        git_in(dir, &["init", "-q", "-b", "main"]);
        std::fs::write(dir.join("a.ts"), "export const a = 1;\n").unwrap();
        git_in(dir, &["add", "."]);
        git_in(dir, &["commit", "-q", "-m", "initial"]);
    }

    #[tokio::test]
    async fn diff_detects_changed_and_deleted_files() {
        let dir = tempfile::TempDir::new().unwrap();
        init_repo(dir.path());
        let first = head_sha(dir.path()).await.unwrap();

        std::fs::write(dir.path().join("b.ts"), "export const b = 2;\n").unwrap();
        std::fs::remove_file(dir.path().join("a.ts")).unwrap();
        git_in(dir.path(), &["add", "-A"]);
        git_in(dir.path(), &["commit", "-q", "-m", "second"]);
        let second = head_sha(dir.path()).await.unwrap();

        assert_eq!(commits_between(dir.path(), &first, &second).await.unwrap(), 1);
        let changed = changed_files(dir.path(), &first, &second).await.unwrap();
        assert!(changed.contains(&"a.ts".to_owned()));
        assert!(changed.contains(&"b.ts".to_owned()));
        let deleted = deleted_files(dir.path(), &first, &second).await.unwrap();
        assert_eq!(deleted, vec!["a.ts".to_owned()]);
    }

    #[tokio::test]
    async fn commits_between_same_sha_is_zero() {
        let dir = tempfile::TempDir::new().unwrap();
        init_repo(dir.path());
        let sha = head_sha(dir.path()).await.unwrap();
        assert_eq!(commits_between(dir.path(), &sha, &sha).await.unwrap(), 0);
    }
}
