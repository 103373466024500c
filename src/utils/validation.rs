use std::path::Path;
use thiserror::Error;

/// Maximum stored filename length in bytes
pub const MAX_FILENAME_LEN: usize = 255;

#[derive(Debug, Clone, Error)]
#[error("{code}: {message}")]
pub struct ValidationError {
    pub code: &'static str,
    pub message: String,
}

/// Normalizes a client-supplied filename for storage.
///
/// Keeps only the last path component, trims whitespace, replaces reserved
/// characters with `_` and truncates to 255 bytes on a char boundary.
pub fn sanitize_filename(filename: &str) -> Result<String, ValidationError> {
    let trimmed = filename.trim();
    let name = trimmed
        .rsplit(['/', '\\'])
        .next()
        .map(str::trim)
        .unwrap_or("");

    if name.is_empty() || name == "." || name == ".." {
        return Err(ValidationError {
            code: "INVALID_FILENAME",
            message: "Filename cannot be empty".to_string(),
        });
    }

    if name != trimmed {
        tracing::warn!("Path components stripped from filename: {}", filename);
    }

    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_control() || matches!(c, ':' | '*' | '?' | '"' | '<' | '>' | '|') {
                '_'
            } else {
                c
            }
        })
        .collect();

    let sanitized = if sanitized.len() > MAX_FILENAME_LEN {
        // Keep the extension when truncating
        let ext = Path::new(&sanitized)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| e.len() < 16)
            .map(|e| format!(".{}", e))
            .unwrap_or_default();
        let mut end = MAX_FILENAME_LEN - ext.len();
        while !sanitized.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}{}", &sanitized[..end], ext)
    } else {
        sanitized
    };

    Ok(sanitized)
}
