//! Line handling for captured crawler output.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    pub fn tag(self) -> &'static str {
        match self {
            Stream::Stdout => "[stdout]",
            Stream::Stderr => "[stderr]",
        }
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stream::Stdout => f.write_str("stdout"),
            Stream::Stderr => f.write_str("stderr"),
        }
    }
}

/// Splits `text` on `\n` / `\r\n`, trims every line and drops the blank ones.
pub fn sanitize(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Decodes bytes read from a pipe. Invalid UTF-8 is replaced, not rejected.
pub fn decode(raw: &[u8]) -> Vec<String> {
    sanitize(&String::from_utf8_lossy(raw))
}

pub fn tag_lines<'a>(stream: Stream, lines: impl IntoIterator<Item = &'a String>) -> impl Iterator<Item = String> {
    let tag = stream.tag();
    lines.into_iter().map(move |line| format!("{} {}", tag, line))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_drops_blank_and_whitespace_lines() {
        let lines = sanitize("first\r\n\n   \n\tsecond  \n");
        assert_eq!(lines, vec!["first", "second"]);
    }

    #[test]
    fn sanitize_is_idempotent() {
        let once = sanitize("  a \n\n b\r\n \t\n");
        let twice = sanitize(&once.join("\n"));
        assert_eq!(once, twice);
    }

    #[test]
    fn decode_handles_invalid_utf8() {
        assert!(decode(b"  \r\n").is_empty());
        assert_eq!(decode("Truyện\n".as_bytes()), vec!["Truyện"]);

        let decoded = decode(&[b'o', b'k', 0xff, b'\n']);
        assert_eq!(decoded.len(), 1);
        assert!(decoded[0].starts_with("ok"));
    }

    #[test]
    fn tags_lines_with_stream() {
        let lines = vec!["hello".to_string()];
        let tagged: Vec<String> = tag_lines(Stream::Stderr, &lines).collect();
        assert_eq!(tagged, vec!["[stderr] hello"]);
    }
}
