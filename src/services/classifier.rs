use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unsupported file type: {mime_type}")]
pub struct UnsupportedType {
    pub mime_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileCategory {
    Image,
    Document,
    Archive,
    Media,
    SourceText,
}

/// How the compressor treats an accepted file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Image,
    Passthrough,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub category: FileCategory,
    pub strategy: Strategy,
}

/// Maps a declared mime type to an allow/deny decision and a processing strategy.
#[derive(Debug, Clone)]
pub struct TypeClassifier {
    allowed: HashSet<String>,
}

impl TypeClassifier {
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed: allowed.into_iter().map(|m| normalize(m.as_ref())).collect(),
        }
    }

    pub fn classify(&self, declared_mime_type: &str) -> Result<Classification, UnsupportedType> {
        let mime = normalize(declared_mime_type);
        if !self.allowed.contains(&mime) {
            return Err(UnsupportedType {
                mime_type: declared_mime_type.to_string(),
            });
        }

        let category = category_of(&mime);
        let strategy = if category == FileCategory::Image {
            Strategy::Image
        } else {
            Strategy::Passthrough
        };

        Ok(Classification { category, strategy })
    }
}

/// Lowercases and strips parameters such as `; charset=utf-8`.
fn normalize(declared: &str) -> String {
    match declared.trim().parse::<mime::Mime>() {
        Ok(m) => m.essence_str().to_lowercase(),
        Err(_) => declared.split(';').next().unwrap_or("").trim().to_lowercase(),
    }
}

fn category_of(mime: &str) -> FileCategory {
    match mime {
        m if m.starts_with("image/") => FileCategory::Image,
        m if m.starts_with("video/") || m.starts_with("audio/") => FileCategory::Media,
        "application/zip" | "application/x-rar-compressed" | "application/x-7z-compressed" => {
            FileCategory::Archive
        }
        "text/html" | "text/css" | "text/javascript" | "application/json" => {
            FileCategory::SourceText
        }
        _ => FileCategory::Document,
    }
}
