//! ANSI-aware width and truncation helpers.

use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

const TAB_WIDTH: usize = 4;

/// Length in bytes of the escape sequence starting at `pos`, if any.
fn escape_len(input: &str, pos: usize) -> Option<usize> {
    let bytes = input.as_bytes();
    if bytes.get(pos) != Some(&0x1b) {
        return None;
    }
    match bytes.get(pos + 1)? {
        b'[' => {
            let end = bytes[pos + 2..]
                .iter()
                .position(|b| (0x40..=0x7e).contains(b))?;
            Some(end + 3)
        }
        b']' | b'P' | b'_' => {
            let body = &input[pos + 2..];
            let bel = body.find('\x07').map(|i| i + 1);
            let st = body.find("\x1b\\").map(|i| i + 2);
            let end = match (bel, st) {
                (Some(a), Some(b)) => a.min(b),
                (Some(a), None) => a,
                (None, Some(b)) => b,
                (None, None) => return None,
            };
            Some(end + 2)
        }
        _ => Some(1 + input[pos + 1..].chars().next().map_or(1, char::len_utf8)),
    }
}

fn grapheme_width(grapheme: &str) -> usize {
    if grapheme == "\t" {
        return TAB_WIDTH;
    }
    UnicodeWidthStr::width(grapheme)
}

/// Byte offset of the next ESC after the character at `pos`.
fn next_escape(input: &str, pos: usize) -> usize {
    let first = input[pos..].chars().next().map_or(1, char::len_utf8);
    input[pos + first..]
        .find('\x1b')
        .map(|offset| pos + first + offset)
        .unwrap_or(input.len())
}

/// Display width of `input`, ignoring escape sequences.
pub fn visible_width(input: &str) -> usize {
    let mut width = 0;
    let mut pos = 0;
    while pos < input.len() {
        if let Some(len) = escape_len(input, pos) {
            pos += len;
            continue;
        }
        let next = next_escape(input, pos);
        width += input[pos..next].graphemes(true).map(grapheme_width).sum::<usize>();
        pos = next;
    }
    width
}

/// Cut `line` to at most `max_width` columns, keeping every escape sequence so
/// styles opened before the cut still get closed.
pub fn truncate_line(line: &str, max_width: usize) -> String {
    let mut out = String::with_capacity(line.len());
    let mut width = 0;
    let mut pos = 0;
    let mut full = false;

    while pos < line.len() {
        if let Some(len) = escape_len(line, pos) {
            out.push_str(&line[pos..pos + len]);
            pos += len;
            continue;
        }
        let next = next_escape(line, pos);
        for grapheme in line[pos..next].graphemes(true) {
            if full {
                break;
            }
            let w = grapheme_width(grapheme);
            if width + w > max_width {
                full = true;
                break;
            }
            width += w;
            out.push_str(grapheme);
        }
        pos = next;
    }
    out
}

/// Remove SGR sequences (`CSI ... m`), leaving text and other controls.
pub fn strip_sgr(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut pos = 0;
    while pos < line.len() {
        if let Some(len) = escape_len(line, pos) {
            let seq = &line[pos..pos + len];
            if !(seq.starts_with("\x1b[") && seq.ends_with('m')) {
                out.push_str(seq);
            }
            pos += len;
            continue;
        }
        let ch_len = line[pos..].chars().next().map_or(1, char::len_utf8);
        out.push_str(&line[pos..pos + ch_len]);
        pos += ch_len;
    }
    out
}
