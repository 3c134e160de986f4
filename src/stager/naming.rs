//! Output archive naming.

/// Name used when the requested name is unusable.
pub const DEFAULT_OUTPUT_NAME: &str = "output";

/// Names at or above this many characters fall back to the default.
pub const MAX_NAME_LEN: usize = 128;

/// Substitute for characters outside the allow-set.
const SUBSTITUTE: char = '_';

pub(crate) fn is_allowed(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '@')
}

/// Sanitize a user-supplied output name.
///
/// Characters outside `[A-Za-z0-9_\-@]` become `_`, runs of `_` collapse to
/// one, leading and trailing `_` are dropped, and an empty or over-long
/// result falls back to [`DEFAULT_OUTPUT_NAME`].
#[must_use]
pub fn sanitize_name(name: Option<&str>) -> String {
    let raw = name.unwrap_or(DEFAULT_OUTPUT_NAME);

    let mut sanitized = String::with_capacity(raw.len());
    for ch in raw.chars() {
        let ch = if is_allowed(ch) { ch } else { SUBSTITUTE };
        if ch == SUBSTITUTE && sanitized.ends_with(SUBSTITUTE) {
            continue;
        }
        sanitized.push(ch);
    }

    let trimmed = sanitized.trim_matches(SUBSTITUTE);
    if trimmed.is_empty() || trimmed.len() >= MAX_NAME_LEN {
        DEFAULT_OUTPUT_NAME.to_owned()
    } else {
        trimmed.to_owned()
    }
}

/// Archive extension for a target format: Bedrock worlds use `mcworld`,
/// everything else `zip`.
#[must_use]
pub fn extension_for(output_type: &str) -> &'static str {
    if output_type.starts_with("BEDROCK") {
        "mcworld"
    } else {
        "zip"
    }
}

/// Sanitized archive file name for `name` and `output_type`.
#[must_use]
pub fn output_file_name(name: Option<&str>, output_type: &str) -> String {
    format!("{}.{}", sanitize_name(name), extension_for(output_type))
}
