/// Common file patterns used when collecting knowledge-base documents.
use std::path::Path;

/// Default directory/file names skipped while walking a knowledge base.
///
/// A pattern matches a path component exactly.
pub fn default_exclude_patterns() -> Vec<String> {
    vec![
        // Version control
        ".git".to_string(),
        ".svn".to_string(),
        ".hg".to_string(),

        // Python leftovers from older tooling
        "__pycache__".to_string(),
        ".venv".to_string(),

        // OS
        ".DS_Store".to_string(),
        "Thumbs.db".to_string(),

        // Temp/cache
        ".cache".to_string(),
        ".qdrant".to_string(),
        "qdrant_storage".to_string(),
    ]
}

/// Default name prefixes skipped while walking a knowledge base.
///
/// A prefix matches any path component that starts with it.
pub fn default_exclude_prefixes() -> Vec<String> {
    vec![
        // Office lock/temp files
        "~$".to_string(),
    ]
}

/// Extensions whose content cannot be read as plain text.
pub fn binary_extensions() -> Vec<&'static str> {
    vec![
        // Images
        "png", "jpg", "jpeg", "gif", "bmp", "ico", "svg", "webp",
        // Documents
        "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "odt", "ods",
        // Archives
        "zip", "tar", "gz", "bz2", "7z", "rar",
        // Executables/Libraries
        "exe", "dll", "so", "dylib",
        // Media
        "mp3", "mp4", "avi", "mov", "wav",
        // Binary data
        "bin", "dat", "db", "sqlite", "sqlite3",
    ]
}

/// Checks if a path has a binary extension.
pub fn is_binary(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            binary_extensions().contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Checks if a path should be skipped.
///
/// A path is excluded when one of its components equals an entry of
/// `exclude_patterns` or starts with an entry of `exclude_prefixes`.
pub fn should_exclude(path: &Path, exclude_patterns: &[String], exclude_prefixes: &[String]) -> bool {
    path.components().any(|component| {
        let name = component.as_os_str().to_string_lossy();
        exclude_patterns.iter().any(|pattern| name == pattern.as_str())
            || exclude_prefixes.iter().any(|prefix| name.starts_with(prefix.as_str()))
    })
}
