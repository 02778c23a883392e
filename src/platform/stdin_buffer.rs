//! Splits raw terminal input into complete sequences and bracketed pastes.
//!
//! Bytes that could still be the start of an escape sequence stay buffered until
//! either the rest arrives or the flush timeout passes, after which they are
//! emitted as-is (a lone ESC becomes the Escape key).

use std::time::{Duration, Instant};

const ESC: u8 = 0x1b;
const PASTE_START: &str = "\x1b[200~";
const PASTE_END: &[u8] = b"\x1b[201~";

pub const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    Sequence(String),
    Paste(String),
}

enum Split {
    Complete(usize),
    Incomplete,
}

#[derive(Debug)]
pub struct StdinBuffer {
    pending: Vec<u8>,
    paste: Option<Vec<u8>>,
    deadline: Option<Instant>,
    timeout: Duration,
}

impl Default for StdinBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_FLUSH_TIMEOUT)
    }
}

impl StdinBuffer {
    pub fn new(timeout: Duration) -> Self {
        Self {
            pending: Vec::new(),
            paste: None,
            deadline: None,
            timeout,
        }
    }

    pub fn push(&mut self, bytes: &[u8], now: Instant) -> Vec<Chunk> {
        self.pending.extend_from_slice(bytes);
        self.deadline = None;

        let mut chunks = Vec::new();
        self.drain(&mut chunks);
        if !self.pending.is_empty() && self.paste.is_none() {
            self.deadline = Some(now + self.timeout);
        }
        chunks
    }

    /// Emit buffered bytes whose flush deadline has passed.
    pub fn flush_due(&mut self, now: Instant) -> Vec<Chunk> {
        match self.deadline {
            Some(deadline) if now >= deadline => self.flush(),
            _ => Vec::new(),
        }
    }

    /// How long a reader may block before `flush_due` has work to do.
    pub fn poll_timeout(&self, now: Instant, default: Duration) -> Duration {
        match self.deadline {
            Some(deadline) => deadline.saturating_duration_since(now).min(default),
            None => default,
        }
    }

    /// Emit everything still buffered, including an unterminated paste.
    pub fn flush(&mut self) -> Vec<Chunk> {
        self.deadline = None;
        let mut chunks = Vec::new();
        if let Some(paste) = self.paste.take() {
            chunks.push(Chunk::Paste(String::from_utf8_lossy(&paste).into_owned()));
        }
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            chunks.push(Chunk::Sequence(String::from_utf8_lossy(&rest).into_owned()));
        }
        chunks
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.paste.is_none()
    }

    fn drain(&mut self, chunks: &mut Vec<Chunk>) {
        let mut pos = 0;
        loop {
            if let Some(paste) = self.paste.as_mut() {
                let rest = &self.pending[pos..];
                match find(rest, PASTE_END) {
                    Some(end) => {
                        paste.extend_from_slice(&rest[..end]);
                        let text = String::from_utf8_lossy(paste).into_owned();
                        self.paste = None;
                        chunks.push(Chunk::Paste(text));
                        pos += end + PASTE_END.len();
                        continue;
                    }
                    None => {
                        // Keep a possible partial terminator for the next read.
                        let keep = partial_suffix(rest, PASTE_END);
                        paste.extend_from_slice(&rest[..rest.len() - keep]);
                        pos = self.pending.len() - keep;
                        break;
                    }
                }
            }

            if pos >= self.pending.len() {
                break;
            }
            match split_one(&self.pending[pos..]) {
                Split::Incomplete => break,
                Split::Complete(len) => {
                    let seq = String::from_utf8_lossy(&self.pending[pos..pos + len]).into_owned();
                    pos += len;
                    if seq == PASTE_START {
                        self.paste = Some(Vec::new());
                    } else {
                        chunks.push(Chunk::Sequence(seq));
                    }
                }
            }
        }
        self.pending.drain(..pos);
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn partial_suffix(haystack: &[u8], needle: &[u8]) -> usize {
    (1..needle.len())
        .rev()
        .find(|&len| haystack.ends_with(&needle[..len]))
        .unwrap_or(0)
}

fn utf8_len(first: u8) -> usize {
    match first {
        0xc0..=0xdf => 2,
        0xe0..=0xef => 3,
        0xf0..=0xf7 => 4,
        _ => 1,
    }
}

fn split_char(bytes: &[u8]) -> Split {
    let len = utf8_len(bytes[0]);
    if bytes.len() < len {
        return Split::Incomplete;
    }
    Split::Complete(len)
}

fn split_string_sequence(bytes: &[u8]) -> Split {
    let mut i = 2;
    while i < bytes.len() {
        match bytes[i] {
            0x07 => return Split::Complete(i + 1),
            ESC if bytes.get(i + 1) == Some(&b'\\') => return Split::Complete(i + 2),
            ESC if i + 1 == bytes.len() => return Split::Incomplete,
            _ => i += 1,
        }
    }
    Split::Incomplete
}

fn split_csi(bytes: &[u8]) -> Split {
    // X10 mouse: CSI M followed by three raw bytes.
    if bytes.get(2) == Some(&b'M') {
        return if bytes.len() >= 6 {
            Split::Complete(6)
        } else {
            Split::Incomplete
        };
    }
    match bytes[2..].iter().position(|b| (0x40..=0x7e).contains(b)) {
        Some(end) => Split::Complete(end + 3),
        None => Split::Incomplete,
    }
}

fn split_one(bytes: &[u8]) -> Split {
    if bytes[0] != ESC {
        return split_char(bytes);
    }
    let Some(&next) = bytes.get(1) else {
        return Split::Incomplete;
    };
    match next {
        b'[' => split_csi(bytes),
        b']' | b'P' | b'_' => split_string_sequence(bytes),
        b'O' => {
            if bytes.len() >= 3 {
                Split::Complete(3)
            } else {
                Split::Incomplete
            }
        }
        ESC => match split_one(&bytes[1..]) {
            Split::Complete(len) => Split::Complete(len + 1),
            Split::Incomplete => Split::Incomplete,
        },
        _ => match split_char(&bytes[1..]) {
            Split::Complete(len) => Split::Complete(len + 1),
            Split::Incomplete => Split::Incomplete,
        },
    }
}
