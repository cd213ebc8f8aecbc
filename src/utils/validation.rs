use anyhow::{Result, anyhow};

/// Longest filename kept after sanitizing
pub const MAX_FILENAME_LEN: usize = 255;

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub code: &'static str,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Sanitizes an uploaded filename so it can be used as a single storage key.
///
/// Path separators become word breaks, runs of whitespace collapse into `_`,
/// anything outside `[A-Za-z0-9_.-]` is dropped and leading/trailing dots and
/// underscores are stripped. `../../etc/passwd` therefore becomes `etc_passwd`.
pub fn sanitize_filename(filename: &str) -> Result<String> {
    if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
        tracing::warn!("Path traversal attempt detected: {}", filename);
    }

    let spaced: String = filename
        .chars()
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");

    let mut kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();

    kept.truncate(MAX_FILENAME_LEN);
    let sanitized = kept.trim_matches(|c| c == '.' || c == '_').to_string();

    if sanitized.is_empty() {
        return Err(anyhow!(ValidationError {
            code: "INVALID_FILENAME",
            message: format!("Filename '{}' has no usable characters", filename),
        }));
    }

    Ok(sanitized)
}

/// Lowercase extension after the last dot, if any
pub fn file_extension(filename: &str) -> Option<String> {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .filter(|ext| !ext.is_empty())
}

/// Checks the extension against the configured allow-list (case-insensitive)
pub fn is_allowed_extension(filename: &str, allowed: &[String]) -> bool {
    file_extension(filename)
        .map(|ext| allowed.iter().any(|a| a.eq_ignore_ascii_case(&ext)))
        .unwrap_or(false)
}

/// Validates the extension, returning a coded error when it is not allowed
pub fn validate_extension(filename: &str, allowed: &[String]) -> Result<()> {
    if is_allowed_extension(filename, allowed) {
        return Ok(());
    }
    Err(anyhow!(ValidationError {
        code: "DISALLOWED_EXTENSION",
        message: format!(
            "Extension of '{}' is not one of: {}",
            filename,
            allowed.join(", ")
        ),
    }))
}

/// Filename without its final extension (`sales.v2.csv` -> `sales.v2`)
pub fn file_stem(filename: &str) -> &str {
    filename
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(filename)
}

/// True when `name` is already a clean single-component key
pub fn is_safe_key(name: &str) -> bool {
    sanitize_filename(name).is_ok_and(|clean| clean == name)
}
