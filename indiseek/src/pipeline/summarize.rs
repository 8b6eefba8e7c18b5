//! Summarize stage, file sub-stage then directory sub-stage. Files with
//! chunks but no summary get a one-sentence description; directories are
//! walked deepest-first so every directory sees its children's summaries.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use llm_client::clients::types::{LLMClientCompletionRequest, LLMClientMessage};
use llm_client::provider::LLMProviderAPIKeys;
use tracing::{debug, warn};

use crate::application::application::Application;
use crate::db::{chunks, contents, metadata, summaries};

use super::progress::ProgressReporter;
use super::{PipelineError, StageCounts};

pub const STAGE_FILES: &str = "summarize_files";
pub const STAGE_DIRS: &str = "summarize_dirs";

const MAX_CONSECUTIVE_FAILURES: u32 = 5;
const SUMMARY_MAX_TOKENS: usize = 256;

fn language_for_path(path: &str) -> Option<&'static str> {
    match path.rsplit('.').next()? {
        "ts" | "mts" | "cts" => Some("TypeScript"),
        "tsx" => Some("TSX"),
        "js" | "mjs" | "cjs" => Some("JavaScript"),
        "jsx" => Some("JSX"),
        "py" => Some("Python"),
        "rs" => Some("Rust"),
        "go" => Some("Go"),
        _ => None,
    }
}

fn chat_key(app: &Application) -> Result<LLMProviderAPIKeys, PipelineError> {
    app.config
        .chat_api_key()
        .ok_or_else(|| PipelineError::MissingKey("chat provider".to_owned()))
}

async fn generate(
    app: &Application,
    key: &LLMProviderAPIKeys,
    instruction: String,
) -> Result<String, llm_client::clients::types::LLMClientError> {
    let request = LLMClientCompletionRequest::new(
        app.config.chat_model(),
        vec![LLMClientMessage::user(instruction)],
        app.config.chat_temperature(),
    )
    .set_max_tokens(SUMMARY_MAX_TOKENS)
    .set_thinking_level(app.config.gemini_thinking_level.clone());

    let response = app.llm_broker.chat(key.clone(), request).await?;
    Ok(response.message().unwrap_or_default().trim().to_owned())
}

pub async fn run_files(
    app: &Application,
    repo_id: i64,
    path_filter: Option<&str>,
    progress: &ProgressReporter,
) -> Result<StageCounts, PipelineError> {
    let key = chat_key(app)?;

    let with_chunks = chunks::files_with_chunks(&app.sql, repo_id).await?;
    let already: BTreeSet<String> = summaries::summarized_paths(&app.sql, repo_id)
        .await?
        .into_iter()
        .collect();
    let pending: Vec<String> = with_chunks
        .into_iter()
        .filter(|path| !already.contains(path))
        .filter(|path| path_filter.map_or(true, |prefix| path.starts_with(prefix)))
        .collect();

    let total = pending.len() as u64;
    debug!(repo_id, total, "file summarization starting");

    let mut summarized = 0u64;
    let mut errors = 0u64;
    let mut consecutive_failures = 0u32;

    for (position, path) in pending.iter().enumerate() {
        progress.emit(STAGE_FILES, position as u64 + 1, total, Some(path.as_str()));

        let row = match contents::get(&app.sql, repo_id, path).await {
            Ok(row) => row,
            Err(_) => continue,
        };
        let mut content = row.content;
        crate::strings::truncate_at_boundary(&mut content, app.config.summary_max_chars);

        let instruction = format!(
            "Summarize this source file in one sentence. Mention what it is responsible for, \
             not how it is written.\n\nFile: {path}\n\n{content}"
        );
        match generate(app, &key, instruction).await {
            Ok(summary) if !summary.is_empty() => {
                summaries::upsert_file(
                    &app.sql,
                    repo_id,
                    path,
                    &summary,
                    language_for_path(path),
                    row.line_count,
                )
                .await?;
                summarized += 1;
                consecutive_failures = 0;
            }
            Ok(_) => {
                warn!(path, "empty summary returned");
                errors += 1;
                consecutive_failures += 1;
            }
            Err(err) if err.is_auth() => return Err(PipelineError::ProviderAuth),
            Err(err) => {
                warn!(path, %err, "file summarization failed");
                errors += 1;
                consecutive_failures += 1;
            }
        }
        if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
            return Err(PipelineError::Fatal(format!(
                "{MAX_CONSECUTIVE_FAILURES} consecutive summarization failures"
            )));
        }

        tokio::time::sleep(Duration::from_millis(app.config.summary_delay_ms)).await;
    }

    if summarized > 0 {
        metadata::touch_last_index(&app.sql).await?;
    }

    let mut counts = StageCounts::new();
    counts.insert("files_summarized".to_owned(), summarized);
    counts.insert("files_errored".to_owned(), errors);
    Ok(counts)
}

fn parent_dir(path: &str) -> Option<String> {
    let (dir, _) = path.rsplit_once('/')?;
    Some(dir.to_owned())
}

fn dir_depth(dir: &str) -> usize {
    dir.matches('/').count() + 1
}

/// Every directory that (transitively) contains a summarized file, sorted
/// deepest-first so children are always computed before their parent.
pub(crate) fn directories_bottom_up(file_paths: &[String]) -> Vec<String> {
    let mut dirs = BTreeSet::new();
    for path in file_paths {
        let mut current = parent_dir(path);
        while let Some(dir) = current {
            current = parent_dir(&dir);
            dirs.insert(dir);
        }
    }
    let mut ordered: Vec<String> = dirs.into_iter().collect();
    ordered.sort_by(|a, b| dir_depth(b).cmp(&dir_depth(a)).then_with(|| a.cmp(b)));
    ordered
}

pub async fn run_dirs(
    app: &Application,
    repo_id: i64,
    progress: &ProgressReporter,
) -> Result<StageCounts, PipelineError> {
    let key = chat_key(app)?;

    let file_summaries = summaries::all_files(&app.sql, repo_id).await?;
    let by_dir: BTreeMap<String, Vec<&summaries::FileSummary>> = {
        let mut map: BTreeMap<String, Vec<&summaries::FileSummary>> = BTreeMap::new();
        for summary in &file_summaries {
            if let Some(dir) = parent_dir(&summary.file_path) {
                map.entry(dir).or_default().push(summary);
            }
        }
        map
    };

    let paths: Vec<String> = file_summaries.iter().map(|s| s.file_path.clone()).collect();
    let ordered = directories_bottom_up(&paths);
    let total = ordered.len() as u64;
    debug!(repo_id, total, "directory summarization starting");

    let mut summarized = 0u64;
    let mut errors = 0u64;
    let mut consecutive_failures = 0u32;

    for (position, dir) in ordered.iter().enumerate() {
        progress.emit(STAGE_DIRS, position as u64 + 1, total, Some(dir.as_str()));

        if summaries::get_dir(&app.sql, repo_id, dir).await?.is_some() {
            continue;
        }

        let mut context = String::new();
        for file in by_dir.get(dir).map(|v| v.as_slice()).unwrap_or_default() {
            let name = file.file_path.rsplit('/').next().unwrap_or(&file.file_path);
            context.push_str(&format!("file {name}: {}\n", file.summary));
        }
        // direct child directories, already summarized thanks to the
        // deepest-first ordering
        for child in &ordered {
            if parent_dir(child).as_deref() == Some(dir.as_str()) {
                if let Some(child_summary) = summaries::get_dir(&app.sql, repo_id, child).await? {
                    let name = child.rsplit('/').next().unwrap_or(child);
                    context.push_str(&format!("dir {name}/: {}\n", child_summary.summary));
                }
            }
        }
        if context.is_empty() {
            continue;
        }

        let instruction = format!(
            "Summarize this directory's role in the codebase in one sentence, based on its \
             children.\n\nDirectory: {dir}/\n\n{context}"
        );
        match generate(app, &key, instruction).await {
            Ok(summary) if !summary.is_empty() => {
                summaries::upsert_dir(&app.sql, repo_id, dir, &summary).await?;
                summarized += 1;
                consecutive_failures = 0;
            }
            Ok(_) => {
                errors += 1;
                consecutive_failures += 1;
            }
            Err(err) if err.is_auth() => return Err(PipelineError::ProviderAuth),
            Err(err) => {
                warn!(dir, %err, "directory summarization failed");
                errors += 1;
                consecutive_failures += 1;
            }
        }
        if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
            return Err(PipelineError::Fatal(format!(
                "{MAX_CONSECUTIVE_FAILURES} consecutive summarization failures"
            )));
        }

        tokio::time::sleep(Duration::from_millis(app.config.summary_delay_ms)).await;
    }

    if summarized > 0 {
        metadata::touch_last_index(&app.sql).await?;
    }

    let mut counts = StageCounts::new();
    counts.insert("dirs_summarized".to_owned(), summarized);
    counts.insert("dirs_errored".to_owned(), errors);
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directories_order_deepest_first() {
        let paths = vec![
            "src/a/b/c.ts".to_owned(),
            "src/a/d.ts".to_owned(),
        ];
        let ordered = directories_bottom_up(&paths);
        assert_eq!(ordered, vec!["src/a/b", "src/a", "src"]);
    }

    #[test]
    fn root_level_files_produce_no_directories() {
        let ordered = directories_bottom_up(&["main.rs".to_owned()]);
        assert!(ordered.is_empty());
    }

    #[test]
    fn language_detection_follows_extension() {
        assert_eq!(language_for_path("src/a.ts"), Some("TypeScript"));
        assert_eq!(language_for_path("src/a.rs"), Some("Rust"));
        assert_eq!(language_for_path("Makefile"), None);
    }
}
