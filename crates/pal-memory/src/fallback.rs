//! Keyword search over the local Markdown memory workspace.
//!
//! Layout of a workspace:
//!
//! ```text
//! <root>/MEMORY.md            long-term memory
//! <root>/memory/2025-01-03.md daily notes, date-named
//! ```
//!
//! Only the 7 lexically-last daily files are read, so date-named notes give
//! the most recent week.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use async_trait::async_trait;
use pal_types::MemoryHit;
use regex::Regex;
use tracing::debug;

use crate::search::{MemoryError, MemorySearch, SNIPPET_CHARS};

const DAILY_FILE_LIMIT: usize = 7;

static HEADING_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n#{1,3} ").expect("valid heading regex"));

/// Local keyword-scoring fallback.
#[derive(Debug, Clone)]
pub struct LocalMemoryFiles {
    root: PathBuf,
}

impl LocalMemoryFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Files to scan: `MEMORY.md` first, then up to 7 daily notes newest
    /// first. Missing files and directories are skipped.
    async fn candidate_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();

        let long_term = self.root.join("MEMORY.md");
        if tokio::fs::try_exists(&long_term).await.unwrap_or(false) {
            files.push(long_term);
        }

        let daily_dir = self.root.join("memory");
        if let Ok(mut entries) = tokio::fs::read_dir(&daily_dir).await {
            let mut names = Vec::new();
            while let Ok(Some(entry)) = entries.next_entry().await {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
            names.sort_unstable_by(|a, b| b.cmp(a));
            files.extend(
                names
                    .into_iter()
                    .take(DAILY_FILE_LIMIT)
                    .filter(|n| n.ends_with(".md"))
                    .map(|n| daily_dir.join(n)),
            );
        }
        files
    }

    /// Score every heading-delimited paragraph against the whitespace
    /// separated keywords of `query`.
    ///
    /// Score is the fraction of keywords present (case-insensitive). Only
    /// paragraphs with a positive score are returned, best first, at most
    /// `max_results`. Unreadable files are skipped.
    pub async fn keyword_search(&self, query: &str, max_results: usize) -> Vec<MemoryHit> {
        let keywords: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
        if keywords.is_empty() {
            return Vec::new();
        }

        let mut hits = Vec::new();
        for path in self.candidate_files().await {
            let content = match tokio::fs::read_to_string(&path).await {
                Ok(c) => c,
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "skipping unreadable memory file");
                    continue;
                }
            };
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            hits.extend(score_paragraphs(&content, &keywords, &file_name));
        }

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(max_results);
        hits
    }
}

fn score_paragraphs(content: &str, keywords: &[String], file_name: &str) -> Vec<MemoryHit> {
    HEADING_SPLIT
        .split(content)
        .filter_map(|para| {
            let lower = para.to_lowercase();
            let matched = keywords.iter().filter(|kw| lower.contains(kw.as_str())).count();
            if matched == 0 {
                return None;
            }
            let snippet: String = para
                .trim()
                .chars()
                .take(SNIPPET_CHARS)
                .collect::<String>()
                .replace('\n', " ");
            Some(MemoryHit {
                text: snippet,
                path: file_name.to_string(),
                source: "fallback".to_string(),
                score: matched as f32 / keywords.len() as f32,
                start_line: 0,
                end_line: 0,
                citation: String::new(),
            })
        })
        .collect()
}

#[async_trait]
impl MemorySearch for LocalMemoryFiles {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
        _min_score: f32,
    ) -> Result<Vec<MemoryHit>, MemoryError> {
        Ok(self.keyword_search(query, max_results).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn workspace() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("MEMORY.md"),
            "# パルの記憶\nはじめまして\n## ギター\nハルトとギターのセッションをした\n## 宇宙\n三体を読んだ夜",
        )
        .unwrap();
        fs::create_dir(dir.path().join("memory")).unwrap();
        for day in 1..=9 {
            fs::write(
                dir.path().join("memory").join(format!("2025-01-0{day}.md")),
                format!("## day {day}\nギター練習 day{day}"),
            )
            .unwrap();
        }
        fs::write(dir.path().join("memory").join("notes.txt"), "ギター").unwrap();
        dir
    }

    #[tokio::test]
    async fn scores_by_fraction_of_keywords() {
        let dir = workspace();
        let files = LocalMemoryFiles::new(dir.path());
        let hits = files.keyword_search("ギター セッション", 20).await;

        assert!(!hits.is_empty());
        assert_eq!(hits[0].score, 1.0);
        assert_eq!(hits[0].path, "MEMORY.md");
        assert!(hits[0].text.contains("セッション"));
        assert!(hits.iter().all(|h| h.source == "fallback"));
        assert!(hits.iter().skip(1).all(|h| h.score == 0.5));
    }

    #[tokio::test]
    async fn reads_only_the_seven_newest_entries() {
        let dir = workspace();
        let files = LocalMemoryFiles::new(dir.path());
        let hits = files.keyword_search("練習", 50).await;

        // notes.txt sorts last, so it takes one of the seven slots and is
        // then skipped for not being Markdown.
        let mut paths: Vec<&str> = hits.iter().map(|h| h.path.as_str()).collect();
        paths.sort_unstable();
        assert_eq!(paths.len(), 6);
        assert_eq!(paths[0], "2025-01-04.md");
        assert_eq!(paths[5], "2025-01-09.md");
    }

    #[tokio::test]
    async fn results_are_truncated_and_sorted() {
        let dir = workspace();
        let files = LocalMemoryFiles::new(dir.path());
        let hits = files.keyword_search("ギター", 3).await;
        assert_eq!(hits.len(), 3);
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn missing_workspace_yields_nothing() {
        let files = LocalMemoryFiles::new("/definitely/not/here");
        assert!(files.keyword_search("ギター", 5).await.is_empty());
    }

    #[test]
    fn snippets_are_flattened_and_bounded() {
        let body = format!("intro\n## long\n{}\nsecond line", "あ".repeat(300));
        let hits = score_paragraphs(&body, &["あ".to_string()], "MEMORY.md");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text.chars().count(), SNIPPET_CHARS);
        assert!(!hits[0].text.contains('\n'));
    }

    #[test]
    fn keyword_match_is_case_insensitive() {
        let hits = score_paragraphs("JetBot went exploring", &["jetbot".to_string()], "x.md");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].score, 1.0);
    }
}
