//! read_map: the table of contents the agent sees before drilling down.
//! One line per entry, indentation by depth, summaries appended when the
//! summarize stage has produced them.

use std::collections::{BTreeMap, BTreeSet};

use crate::db::{contents, summaries, SqlDb};

use super::RetrievalError;

struct MapData {
    file_summaries: BTreeMap<String, String>,
    dir_summaries: BTreeMap<String, String>,
    files: BTreeSet<String>,
    dirs: BTreeSet<String>,
}

fn parent_of(path: &str) -> Option<&str> {
    path.rsplit_once('/').map(|(dir, _)| dir)
}

fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn render_dir(out: &mut String, data: &MapData, dir: &str, depth: usize) {
    let indent = "  ".repeat(depth);

    let direct_child = |candidate: &str| {
        if dir.is_empty() {
            !candidate.contains('/')
        } else {
            parent_of(candidate) == Some(dir)
        }
    };
    let child_dirs: Vec<&String> = data
        .dirs
        .iter()
        .filter(|candidate| direct_child(candidate))
        .collect();
    let child_files: Vec<&String> = data
        .files
        .iter()
        .filter(|candidate| direct_child(candidate))
        .collect();

    for child in child_dirs {
        match data.dir_summaries.get(child.as_str()) {
            Some(summary) => {
                out.push_str(&format!("{indent}{}/ — {summary}\n", base_name(child)))
            }
            None => out.push_str(&format!("{indent}{}/\n", base_name(child))),
        }
        render_dir(out, data, child, depth + 1);
    }
    for file in child_files {
        match data.file_summaries.get(file.as_str()) {
            Some(summary) => {
                out.push_str(&format!("{indent}{} — {summary}\n", base_name(file)))
            }
            None => out.push_str(&format!("{indent}{}\n", base_name(file))),
        }
    }
}

pub async fn read_map(
    db: &SqlDb,
    repo_id: i64,
    scope: Option<&str>,
) -> Result<String, RetrievalError> {
    let scope = scope.map(|s| s.trim_matches('/')).filter(|s| !s.is_empty());

    let mut files: BTreeSet<String> = contents::all_paths(db, repo_id).await?.into_iter().collect();
    let file_summaries: BTreeMap<String, String> = summaries::all_files(db, repo_id)
        .await?
        .into_iter()
        .map(|row| (row.file_path, row.summary))
        .collect();
    // summarized files may predate a content wipe, show them anyway
    files.extend(file_summaries.keys().cloned());
    let dir_summaries: BTreeMap<String, String> = summaries::all_dirs(db, repo_id)
        .await?
        .into_iter()
        .map(|row| (row.dir_path, row.summary))
        .collect();

    if let Some(prefix) = scope {
        let keep = format!("{prefix}/");
        files.retain(|path| path.starts_with(&keep) || path == prefix);
    }

    let mut dirs = BTreeSet::new();
    for file in &files {
        let mut current = parent_of(file);
        while let Some(dir) = current {
            dirs.insert(dir.to_owned());
            current = parent_of(dir);
        }
    }

    let data = MapData {
        file_summaries,
        dir_summaries,
        files,
        dirs,
    };

    let mut out = String::new();
    let root = scope.unwrap_or("");
    if let Some(prefix) = scope {
        match data.dir_summaries.get(prefix) {
            Some(summary) => out.push_str(&format!("{prefix}/ — {summary}\n")),
            None => out.push_str(&format!("{prefix}/\n")),
        }
        render_dir(&mut out, &data, root, 1);
    } else {
        render_dir(&mut out, &data, root, 0);
    }

    if out.is_empty() {
        out.push_str("(no indexed files)");
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::test_db;

    async fn seed(db: &SqlDb) {
        for (path, content) in [
            ("src/node/server.ts", "server"),
            ("src/node/hmr.ts", "hmr"),
            ("src/shared/utils.ts", "utils"),
            ("index.ts", "entry"),
        ] {
            contents::upsert(db, 1, path, content).await.unwrap();
        }
        summaries::upsert_file(db, 1, "src/node/hmr.ts", "Handles hot module updates.", None, 1)
            .await
            .unwrap();
        summaries::upsert_dir(db, 1, "src/node", "Server-side runtime.")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn map_renders_tree_with_summaries() {
        let db = test_db().await;
        seed(&db).await;
        let map = read_map(&db, 1, None).await.unwrap();

        let lines: Vec<&str> = map.lines().collect();
        assert_eq!(lines[0], "src/");
        assert_eq!(lines[1], "  node/ — Server-side runtime.");
        assert!(lines.contains(&"    hmr.ts — Handles hot module updates."));
        assert!(lines.contains(&"    server.ts"));
        assert!(lines.contains(&"index.ts"));
        // depth is encoded in indentation
        assert!(map.contains("  shared/\n    utils.ts"));
    }

    #[tokio::test]
    async fn scope_restricts_to_subtree() {
        let db = test_db().await;
        seed(&db).await;
        let map = read_map(&db, 1, Some("src/node")).await.unwrap();
        assert!(map.starts_with("src/node/ — Server-side runtime."));
        assert!(map.contains("hmr.ts"));
        assert!(!map.contains("utils.ts"));
        assert!(!map.contains("index.ts"));
    }

    #[tokio::test]
    async fn empty_repo_has_placeholder() {
        let db = test_db().await;
        let map = read_map(&db, 1, None).await.unwrap();
        assert_eq!(map, "(no indexed files)");
    }
}
