//! Text and question extraction from source files.
//!
//! This module provides:
//! - A [`TextExtractor`] seam that turns a file into raw text
//! - Recursive collection of knowledge-base files
//! - Line-based question extraction from questionnaire text

use crate::config::IndexerConfig;
use crate::patterns::{is_binary, should_exclude};
use crate::rag::Metadata;
use crate::types::QuestionAnswer;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, warn};

/// Shortest line length accepted as a question.
const MIN_QUESTION_CHARS: usize = 10;

/// Errors that can occur while walking a knowledge-base directory.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),
}

pub type Result<T> = std::result::Result<T, ExtractError>;

/// Turns a source file into plain text.
///
/// Implementations never fail: an empty string means nothing could be
/// extracted.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, path: &Path) -> String;
}

/// Reads files as UTF-8 text, replacing invalid sequences.
///
/// Files with a known binary extension yield an empty string.
#[derive(Debug, Clone, Default)]
pub struct PlainTextExtractor;

#[async_trait]
impl TextExtractor for PlainTextExtractor {
    async fn extract(&self, path: &Path) -> String {
        if is_binary(path) {
            debug!(path = %path.display(), "Skipping binary file");
            return String::new();
        }

        match fs::read(path).await {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(e) => {
                    debug!(path = %path.display(), "File is not valid UTF-8, decoding lossily");
                    String::from_utf8_lossy(e.as_bytes()).into_owned()
                }
            },
            Err(e) => {
                warn!(path = %path.display(), "Failed to read file: {}", e);
                String::new()
            }
        }
    }
}

/// Recursively collects all indexable files under `dir`, sorted by path.
///
/// Files are filtered on:
/// - **Extensions**: only files with an extension in `config.extensions`
///   (case-insensitive). If empty, every non-binary file is kept.
/// - **Exclude patterns**: entries with a path component (below `dir`) equal
///   to one of `config.exclude_patterns`, or starting with one of
///   `config.exclude_prefixes`, are skipped.
///
/// Files with a binary extension (images, archives, PDF and Office
/// documents) are never collected.
pub async fn collect_files(dir: impl AsRef<Path>, config: &IndexerConfig) -> Result<Vec<PathBuf>> {
    let root = dir.as_ref();
    if !fs::metadata(root).await?.is_dir() {
        return Err(ExtractError::NotADirectory(root.to_path_buf()));
    }

    let mut files = Vec::new();
    collect_files_recursive(root, root, &mut files, config).await?;
    files.sort();
    Ok(files)
}

fn collect_files_recursive<'a>(
    root: &'a Path,
    dir: &'a Path,
    files: &'a mut Vec<PathBuf>,
    config: &'a IndexerConfig,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        let mut entries = fs::read_dir(dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(&path);

            if should_exclude(relative, &config.exclude_patterns, &config.exclude_prefixes) {
                debug!(path = %path.display(), "Excluded");
                continue;
            }

            if entry.file_type().await?.is_dir() {
                collect_files_recursive(root, &path, files, config).await?;
            } else if is_binary(&path) {
                debug!(path = %path.display(), "Skipping unsupported binary file");
            } else if is_indexable(&path, &config.extensions) {
                files.push(path);
            }
        }

        Ok(())
    })
}

/// Checks if a file should be indexed based on its extension.
fn is_indexable(path: &Path, extensions: &[String]) -> bool {
    if is_binary(path) {
        return false;
    }

    if extensions.is_empty() {
        return true;
    }

    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|e| e.trim_start_matches('.').eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// Whether a candidate line reads like a question worth answering.
pub fn is_valid_question(text: &str) -> bool {
    let text = text.trim();
    if text.chars().count() < MIN_QUESTION_CHARS {
        return false;
    }
    if matches!(text.to_lowercase().as_str(), "nan" | "none" | "null") {
        return false;
    }
    text.chars().any(char::is_alphabetic)
}

/// Extracts one question per valid non-empty line of `text`.
///
/// Each question's metadata records `source_file` and the zero-based
/// `line_index` it came from.
pub fn extract_questions(text: &str, source_file: &str) -> Vec<QuestionAnswer> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| is_valid_question(line))
        .map(|(line_index, line)| {
            let mut metadata = Metadata::new();
            metadata.insert("source_file".to_string(), source_file.into());
            metadata.insert("line_index".to_string(), line_index.into());
            QuestionAnswer::new(line.trim()).with_metadata(metadata)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_is_indexable() {
        let extensions = vec!["txt".to_string(), ".MD".to_string()];

        assert!(is_indexable(Path::new("notes.txt"), &extensions));
        assert!(is_indexable(Path::new("README.md"), &extensions));
        assert!(!is_indexable(Path::new("tool.exe"), &extensions));
        assert!(!is_indexable(Path::new("Makefile"), &extensions));
    }

    #[test]
    fn test_is_indexable_empty_extensions() {
        assert!(is_indexable(Path::new("Makefile"), &[]));
        assert!(is_indexable(Path::new("policy.txt"), &[]));
        assert!(!is_indexable(Path::new("logo.png"), &[]));
    }

    #[test]
    fn test_question_validity() {
        assert!(is_valid_question("Describe your security policy."));
        assert!(!is_valid_question("short"));
        assert!(!is_valid_question("1234567890123"));
        assert!(!is_valid_question("   null   "));
        assert!(!is_valid_question(""));
    }

    #[test]
    fn test_extract_questions_records_lines() {
        let text = "Tender questionnaire\n\nnan\nDo you hold ISO 27001 certification?\n42\n  How many staff do you employ?  \n";
        let questions = extract_questions(text, "tender.txt");

        let texts: Vec<_> = questions.iter().map(|q| q.question.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "Tender questionnaire",
                "Do you hold ISO 27001 certification?",
                "How many staff do you employ?"
            ]
        );
        assert_eq!(questions[1].metadata["line_index"], 3);
        assert_eq!(questions[2].metadata["source_file"], "tender.txt");
    }

    #[tokio::test]
    async fn test_collect_files_filters() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("policies")).unwrap();
        std::fs::create_dir_all(root.join(".git")).unwrap();
        std::fs::write(root.join("policies/security.txt"), "ISO 27001").unwrap();
        std::fs::write(root.join("overview.md"), "About us").unwrap();
        std::fs::write(root.join("logo.png"), [0u8, 1, 2]).unwrap();
        std::fs::write(root.join("~$draft.txt"), "lock").unwrap();
        std::fs::write(root.join(".git/config"), "[core]").unwrap();

        let files = collect_files(root, &IndexerConfig::default()).await.unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(names, vec!["overview.md", "policies/security.txt"]);
    }

    #[tokio::test]
    async fn test_collect_files_requires_directory() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, "x").unwrap();

        assert!(matches!(
            collect_files(&file, &IndexerConfig::default()).await,
            Err(ExtractError::NotADirectory(_))
        ));
    }

    #[tokio::test]
    async fn test_plain_text_extractor() {
        let dir = TempDir::new().unwrap();
        let good = dir.path().join("a.txt");
        let lossy = dir.path().join("b.txt");
        std::fs::write(&good, "héllo").unwrap();
        std::fs::write(&lossy, [b'o', b'k', 0xff]).unwrap();

        let extractor = PlainTextExtractor;
        assert_eq!(extractor.extract(&good).await, "héllo");
        assert!(extractor.extract(&lossy).await.starts_with("ok"));
        assert_eq!(extractor.extract(&dir.path().join("missing.txt")).await, "");
        assert_eq!(extractor.extract(&dir.path().join("x.png")).await, "");
    }

    #[tokio::test]
    async fn test_office_and_pdf_files_are_neither_collected_nor_extracted() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let zip_header = [b'P', b'K', 3, 4, 20, 0, 6, 0, 0xff, 0xfe, b'A', b'B', b'C'];
        for name in ["offer.docx", "prices.xlsx", "brochure.pdf"] {
            std::fs::write(root.join(name), zip_header).unwrap();
        }
        std::fs::write(root.join("summary.txt"), "Company summary").unwrap();

        let files = collect_files(root, &IndexerConfig::default()).await.unwrap();
        assert_eq!(files, vec![root.join("summary.txt")]);

        let extractor = PlainTextExtractor;
        assert_eq!(extractor.extract(&root.join("offer.docx")).await, "");
        assert_eq!(extractor.extract(&root.join("brochure.pdf")).await, "");
    }

    #[tokio::test]
    async fn test_collect_files_custom_prefixes() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        std::fs::write(root.join("draft_offer.txt"), "draft").unwrap();
        std::fs::write(root.join("offer.txt"), "final").unwrap();

        let config = IndexerConfig {
            exclude_prefixes: vec!["draft_".to_string()],
            ..IndexerConfig::default()
        };
        let files = collect_files(root, &config).await.unwrap();
        assert_eq!(files, vec![root.join("offer.txt")]);
    }
}
