/// Decode source bytes without ever failing: invalid UTF-8 sequences become U+FFFD and are
/// then dropped by [`clean_text`]. A leading UTF-8 BOM is stripped.
pub fn decode_lossy(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Normalize extracted text so tokenization only ever sees single-space separated words.
///
/// NUL and other control characters act as separators; BOMs and replacement characters are
/// removed outright; every whitespace run collapses to one space; the result is trimmed.
pub fn clean_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_space = false;
    for ch in raw.chars() {
        if ch == '\u{feff}' || ch == '\u{fffd}' {
            continue;
        }
        if ch.is_whitespace() || ch.is_control() {
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        out.push(ch);
    }
    out
}
