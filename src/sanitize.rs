//! Filename handling for the attachment we send back.

const FORBIDDEN_CHARS: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];
const FALLBACK_NAME: &str = "download";

/// Strips characters that are illegal in common filesystems and header
/// values, caps the result at `max_chars` characters and trims whitespace.
///
/// The result may be empty when the title had nothing usable in it; use
/// [`attachment_filename`] when a name is required.
pub fn sanitize_title(raw: &str, max_chars: usize) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|character| !FORBIDDEN_CHARS.contains(character) && !character.is_control())
        .collect();
    let capped: String = cleaned.trim_start().chars().take(max_chars).collect();

    capped.trim_end().to_string()
}

/// `{sanitized title}.{extension}`, falling back to `download` when the
/// sanitized title comes out empty.
pub fn attachment_filename(raw_title: &str, extension: &str, max_chars: usize) -> String {
    let title = sanitize_title(raw_title, max_chars);
    let stem = if title.is_empty() {
        FALLBACK_NAME
    } else {
        title.as_str()
    };

    format!("{stem}.{extension}")
}

pub fn build_content_disposition(filename: &str) -> String {
    let safe_ascii = sanitize_ascii_filename(filename);
    format!(
        "attachment; filename=\"{safe_ascii}\"; filename*=UTF-8''{}",
        urlencoding::encode(filename)
    )
}

fn sanitize_ascii_filename(value: &str) -> String {
    let mut sanitized = String::with_capacity(value.len());

    for character in value.chars() {
        if character.is_ascii_alphanumeric()
            || matches!(character, '.' | '-' | '_' | ' ' | '(' | ')' | '[' | ']' | ',' | '\'')
        {
            sanitized.push(character);
        } else {
            sanitized.push('_');
        }
    }

    let compact = sanitized.trim();
    if compact.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        compact.to_string()
    }
}
