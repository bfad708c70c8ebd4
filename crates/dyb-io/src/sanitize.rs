//! Name sanitization shared by every adapter.
//!
//! Storage segments never contain `.`, but they may contain characters that are path
//! separators (or escape characters) in the target container. Those are
//! percent-escaped on save and unescaped on load, so names round-trip exactly.

use std::borrow::Cow;

use dyb_core::PathKey;

use crate::FormatError;

const ESCAPED: [char; 3] = ['%', '/', '\\'];

/// Escape `%`, `/` and `\` in one segment.
pub fn escape_segment(segment: &str) -> Cow<'_, str> {
    if !segment.contains(ESCAPED) {
        return Cow::Borrowed(segment);
    }
    let mut out = String::with_capacity(segment.len() + 4);
    for c in segment.chars() {
        match c {
            '%' => out.push_str("%25"),
            '/' => out.push_str("%2F"),
            '\\' => out.push_str("%5C"),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Inverse of [`escape_segment`].
pub fn unescape_segment(segment: &str) -> Result<String, FormatError> {
    let mut out = String::with_capacity(segment.len());
    let mut rest = segment;
    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let code = rest.get(pos + 1..pos + 3).unwrap_or("");
        let c = match code {
            "25" => '%',
            "2F" | "2f" => '/',
            "5C" | "5c" => '\\',
            _ => {
                return Err(FormatError::Name(format!("bad escape '%{code}' in '{segment}'")));
            }
        };
        out.push(c);
        rest = &rest[pos + 3..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Escaped segments joined with `/`.
pub fn to_slash_name(path: &PathKey) -> String {
    path.segments().iter().map(|s| escape_segment(s)).collect::<Vec<_>>().join("/")
}

/// Inverse of [`to_slash_name`].
pub fn from_slash_name(name: &str) -> Result<PathKey, FormatError> {
    let segments = name.split('/').map(unescape_segment).collect::<Result<Vec<_>, _>>()?;
    Ok(PathKey::from_segments(segments)?)
}
