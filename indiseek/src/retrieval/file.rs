//! read_file over the stored contents table — never the disk. Small
//! requested windows are widened so the agent does not burn iterations on
//! micro-reads.

use crate::db::{contents, SqlDb};

use super::RetrievalError;

/// Ranges spanning fewer lines than this get widened...
const MIN_WINDOW_LINES: i64 = 100;
/// ...to this many lines, centered on the request's midpoint.
const EXPANDED_WINDOW_LINES: i64 = 150;
/// Hard cap on returned lines.
const MAX_WINDOW_LINES: i64 = 500;

/// Resolve the effective 1-based inclusive window.
pub(crate) fn effective_range(
    start: Option<i64>,
    end: Option<i64>,
    total_lines: i64,
) -> (i64, i64) {
    let start_requested = start.unwrap_or(1).max(1);
    let end_requested = end.unwrap_or(total_lines).max(start_requested);

    let (mut from, mut to) = (start_requested, end_requested);
    let span = to - from + 1;
    if span < MIN_WINDOW_LINES {
        let midpoint = (from + to) / 2;
        from = (midpoint - EXPANDED_WINDOW_LINES / 2).max(1);
        to = from + EXPANDED_WINDOW_LINES - 1;
    }
    if to - from + 1 > MAX_WINDOW_LINES {
        to = from + MAX_WINDOW_LINES - 1;
    }
    to = to.min(total_lines.max(1));
    (from.min(to), to)
}

pub async fn read_file(
    db: &SqlDb,
    repo_id: i64,
    path: &str,
    start: Option<i64>,
    end: Option<i64>,
) -> Result<String, RetrievalError> {
    let row = contents::get(db, repo_id, path).await?;
    let lines: Vec<&str> = row.content.lines().collect();
    let total = lines.len() as i64;
    let (from, to) = effective_range(start, end, total);

    let mut out = format!("{path} (lines {from}-{to} of {total})\n");
    for (offset, line) in lines
        .iter()
        .skip((from - 1) as usize)
        .take((to - from + 1) as usize)
        .enumerate()
    {
        out.push_str(&format!("{:>5} | {}\n", from + offset as i64, line));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::test_db;

    #[test]
    fn small_windows_expand_to_150_lines() {
        let (from, to) = effective_range(Some(200), Some(200), 1000);
        assert_eq!((from, to), (125, 274)); // 150 lines centered on the request

        // exactly 100 lines is not expanded
        let (from, to) = effective_range(Some(200), Some(299), 1000);
        assert_eq!((from, to), (200, 299));

        // 99 lines is
        let (from, to) = effective_range(Some(200), Some(298), 1000);
        assert_eq!(to - from + 1, 150);
    }

    #[test]
    fn expansion_clamps_at_line_one() {
        let (from, to) = effective_range(Some(1), Some(1), 1000);
        assert_eq!(from, 1);
        assert_eq!(to, 150);
    }

    #[test]
    fn default_read_caps_at_500_lines() {
        let (from, to) = effective_range(None, None, 2000);
        assert_eq!((from, to), (1, 500));
    }

    #[test]
    fn short_files_are_returned_whole() {
        let (from, to) = effective_range(Some(1), Some(3), 5);
        assert_eq!((from, to), (1, 5));
    }

    #[tokio::test]
    async fn read_renders_numbered_lines_from_the_store() {
        let db = test_db().await;
        let body: String = (1..=10).map(|i| format!("line {i}\n")).collect();
        contents::upsert(&db, 1, "src/a.ts", &body).await.unwrap();

        let text = read_file(&db, 1, "src/a.ts", Some(2), Some(4)).await.unwrap();
        assert!(text.starts_with("src/a.ts (lines 1-10 of 10)"));
        assert!(text.contains("    2 | line 2"));
        assert!(text.contains("   10 | line 10"));
    }

    #[tokio::test]
    async fn unindexed_file_is_not_found() {
        let db = test_db().await;
        let err = read_file(&db, 1, "missing.ts", None, None).await.unwrap_err();
        assert!(matches!(err, RetrievalError::Store(crate::db::StoreError::NotFound(_))));
    }
}
