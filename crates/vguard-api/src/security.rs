//! Input validation for upload intake and path parameters.

/// Maximum display name length, in characters, after trimming.
pub const MAX_DISPLAY_NAME_LENGTH: usize = 200;

/// Maximum stored original filename length.
const MAX_FILENAME_LENGTH: usize = 255;

/// Accepted video container extensions.
pub const ALLOWED_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv"];

/// Accepted declared MIME types.
pub const ALLOWED_CONTENT_TYPES: &[&str] = &[
    "video/mp4",
    "video/x-msvideo",
    "video/quicktime",
    "video/x-matroska",
];

/// Trim and length-check a display name.
pub fn validate_display_name(input: &str) -> Result<String, String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err("Display name is required".to_string());
    }
    if trimmed.chars().count() > MAX_DISPLAY_NAME_LENGTH {
        return Err(format!(
            "Display name must be at most {} characters",
            MAX_DISPLAY_NAME_LENGTH
        ));
    }
    if trimmed.chars().any(|c| c.is_control()) {
        return Err("Display name contains control characters".to_string());
    }
    Ok(trimmed.to_string())
}

/// Reduce a client-supplied filename to its final path component.
pub fn sanitize_filename(input: &str) -> String {
    let name = input
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    name.chars()
        .filter(|c| !c.is_control())
        .take(MAX_FILENAME_LENGTH)
        .collect()
}

/// Lowercased extension of `filename`, if it is an accepted video type.
pub fn video_extension(filename: &str) -> Option<String> {
    let (stem, ext) = filename.rsplit_once('.')?;
    if stem.is_empty() {
        return None;
    }
    let ext = ext.to_lowercase();
    ALLOWED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

/// Validate the uploaded file's name and declared type.
///
/// Returns the extension used in the storage key.
pub fn validate_video_file(filename: &str, content_type: Option<&str>) -> Result<String, String> {
    let ext = video_extension(filename).ok_or_else(|| {
        format!(
            "Unsupported file type. Allowed extensions: {}",
            ALLOWED_EXTENSIONS.join(", ")
        )
    })?;

    if let Some(declared) = content_type {
        let essence = declared
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_lowercase();
        if !ALLOWED_CONTENT_TYPES.contains(&essence.as_str()) {
            return Err(format!("Unsupported content type '{}'", essence));
        }
    }

    Ok(ext)
}

/// Whether `segment` is safe to use as one storage key path component.
pub fn is_safe_key_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment.len() <= 128
        && segment != "."
        && segment != ".."
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' || c == '@')
}

/// Validate video ID format.
///
/// Valid format: alphanumeric characters and hyphens only, 8-64 chars.
pub fn is_valid_video_id(id: &str) -> bool {
    if id.len() > 64 || id.len() < 8 {
        return false;
    }
    id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}
