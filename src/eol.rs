//! End-of-line detection and rewriting, ported from
//! `original_source/prapti/language_server/line_endings.py`.

/// Detects the dominant line ending already in use in `source`, falling
/// back to the host platform's native convention for a document with no
/// line breaks yet.
pub fn detect_eol_sequence(source: &str) -> String {
    if source.contains("\r\n") {
        "\r\n".to_string()
    } else if source.contains('\n') {
        "\n".to_string()
    } else if cfg!(windows) {
        "\r\n".to_string()
    } else {
        "\n".to_string()
    }
}

/// Rewrites any `\r\n` in `s` to `\n`. A no-op when `s` has none.
pub fn rewrite_to_lf(s: &str) -> String {
    if s.contains("\r\n") {
        s.replace("\r\n", "\n")
    } else {
        s.to_string()
    }
}

/// Rewrites bare `\n` in `s` to `\r\n`, first collapsing any existing `\r\n`
/// so runs never end up double-converted.
pub fn rewrite_to_crlf(s: &str) -> String {
    if !s.contains('\n') {
        return s.to_string();
    }
    if s.contains("\r\n") {
        s.replace("\r\n", "\n").replace('\n', "\r\n")
    } else {
        s.replace('\n', "\r\n")
    }
}

/// Picks the rewriter matching `eol_sequence` ("\n" or "\r\n").
pub fn select_eol_rewriter(eol_sequence: &str) -> fn(&str) -> String {
    if eol_sequence == "\n" {
        rewrite_to_lf
    } else {
        rewrite_to_crlf
    }
}
