/// Longest accepted filename, in characters.
pub const MAX_FILENAME_CHARS: usize = 255;

const FALLBACK_MEDIA_TYPE: &str = "application/octet-stream";

/// Reasons an upload filename is refused.
#[derive(Debug, PartialEq, Eq)]
pub enum FilenameError {
    /// Filename is empty or whitespace-only.
    Empty,
    TooLong,
    /// Filename contains path separators (`/` or `\`).
    ContainsPathSeparator,
    /// Filename is `.` or `..`.
    PathTraversal,
    NullByte,
    /// Filename contains control characters (CR, LF, etc.).
    ControlCharacter,
}

impl FilenameError {
    /// Returns a human-readable error message.
    pub fn message(&self) -> &'static str {
        match self {
            Self::Empty => "Filename cannot be empty",
            Self::TooLong => "Invalid filename: longer than 255 characters",
            Self::ContainsPathSeparator => "Invalid filename: path separators are not allowed",
            Self::PathTraversal => "Invalid filename: '.' and '..' are not allowed",
            Self::NullByte => "Invalid filename: null bytes are not allowed",
            Self::ControlCharacter => "Invalid filename: control characters are not allowed",
        }
    }
}

/// Validates a flat filename (no directory components allowed) and returns it
/// trimmed.
pub fn validate_flat_filename(filename: &str) -> Result<&str, FilenameError> {
    let trimmed = filename.trim();

    if trimmed.is_empty() {
        return Err(FilenameError::Empty);
    }

    if trimmed.chars().count() > MAX_FILENAME_CHARS {
        return Err(FilenameError::TooLong);
    }

    if trimmed.contains('\0') {
        return Err(FilenameError::NullByte);
    }

    // Names end up in Content-Disposition headers.
    if trimmed.chars().any(|c| c.is_control()) {
        return Err(FilenameError::ControlCharacter);
    }

    if trimmed.contains('/') || trimmed.contains('\\') {
        return Err(FilenameError::ContainsPathSeparator);
    }

    if trimmed == "." || trimmed == ".." {
        return Err(FilenameError::PathTraversal);
    }

    Ok(trimmed)
}

/// Media type for an upload: the declared type when present, otherwise a
/// guess from the extension. A declared `application/octet-stream` counts as
/// absent.
pub fn resolve_media_type(declared: Option<&str>, filename: &str) -> String {
    declared
        .map(str::trim)
        .filter(|t| !t.is_empty() && !t.eq_ignore_ascii_case(FALLBACK_MEDIA_TYPE))
        .map(|t| t.to_ascii_lowercase())
        .unwrap_or_else(|| {
            mime_guess::from_path(filename)
                .first_raw()
                .unwrap_or(FALLBACK_MEDIA_TYPE)
                .to_string()
        })
}
