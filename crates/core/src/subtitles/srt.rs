//! SRT parsing and rendering.

use once_cell::sync::Lazy;
use regex_lite::Regex;

use super::SubtitleError;

static TIMESTAMP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{2}):(\d{2}):(\d{2})[,.](\d{3}) --> (\d{2}):(\d{2}):(\d{2})[,.](\d{3})")
        .unwrap()
});

static INLINE_MARKUP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"</?(?:i|b|u|font)[^>]*>").unwrap());

static HI_BRACKET_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\[(][^\])]*[\])]").unwrap());

static HI_SPEAKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[A-Z][A-Z0-9 .']{1,24}:\s*").unwrap());

/// A single timed SRT cue.
#[derive(Debug, Clone, PartialEq)]
pub struct SrtEntry {
    pub seq: usize,
    pub start_ms: u64,
    pub end_ms: u64,
    pub text: String,
}

impl SrtEntry {
    pub fn new(seq: usize, start_ms: u64, end_ms: u64, text: impl Into<String>) -> Self {
        Self {
            seq,
            start_ms,
            end_ms,
            text: text.into(),
        }
    }

    /// Format a millisecond timestamp as `HH:MM:SS,mmm`.
    pub fn format_timestamp(ms: u64) -> String {
        let hours = ms / 3_600_000;
        let minutes = (ms % 3_600_000) / 60_000;
        let seconds = (ms % 60_000) / 1_000;
        let millis = ms % 1_000;
        format!("{hours:02}:{minutes:02}:{seconds:02},{millis:03}")
    }

    fn captured_ms(caps: &regex_lite::Captures, base: usize) -> u64 {
        let h: u64 = caps[base].parse().unwrap_or(0);
        let m: u64 = caps[base + 1].parse().unwrap_or(0);
        let s: u64 = caps[base + 2].parse().unwrap_or(0);
        let ms: u64 = caps[base + 3].parse().unwrap_or(0);
        h * 3_600_000 + m * 60_000 + s * 1_000 + ms
    }

    /// Parse a whole SRT document. Tolerates CRLF, BOM and blank runs.
    pub fn parse(content: &str) -> Result<Vec<SrtEntry>, SubtitleError> {
        let content = content.trim_start_matches('\u{feff}').replace("\r\n", "\n");
        let mut entries = Vec::new();

        for block in content.split("\n\n").filter(|b| !b.trim().is_empty()) {
            let mut lines = block.lines().peekable();
            // Sequence line is optional in the wild; skip it when numeric.
            let mut first = match lines.peek() {
                Some(l) => l.trim(),
                None => continue,
            };
            let seq = first.parse::<usize>().ok();
            if seq.is_some() {
                lines.next();
                first = match lines.peek() {
                    Some(l) => l.trim(),
                    None => continue,
                };
            }
            let caps = match TIMESTAMP_RE.captures(first) {
                Some(caps) => caps,
                None => continue,
            };
            lines.next();

            let start_ms = Self::captured_ms(&caps, 1);
            let end_ms = Self::captured_ms(&caps, 5);
            let text = lines.collect::<Vec<_>>().join("\n").trim().to_string();
            if text.is_empty() {
                continue;
            }
            entries.push(SrtEntry {
                seq: seq.unwrap_or(entries.len() + 1),
                start_ms,
                end_ms,
                text,
            });
        }

        if entries.is_empty() && !content.trim().is_empty() {
            return Err(SubtitleError::Parse(
                "no cues found in SRT content".to_string(),
            ));
        }
        Ok(entries)
    }

    /// Render entries back to SRT, renumbering sequentially.
    pub fn render(entries: &[SrtEntry]) -> String {
        let mut out = String::new();
        for (i, entry) in entries.iter().enumerate() {
            out.push_str(&format!(
                "{}\n{} --> {}\n{}\n\n",
                i + 1,
                Self::format_timestamp(entry.start_ms),
                Self::format_timestamp(entry.end_ms),
                entry.text
            ));
        }
        out
    }
}

/// Strip inline HTML-like markup (`<i>`, `<font ...>`), keeping the text.
pub fn strip_inline_markup(text: &str) -> String {
    INLINE_MARKUP_RE.replace_all(text, "").to_string()
}

/// Remove hearing-impaired markers: bracketed sound cues and ALL-CAPS
/// speaker labels. Collapses the whitespace the removal leaves behind.
pub fn strip_hi_markers(text: &str) -> String {
    let text = HI_BRACKET_RE.replace_all(text, "");
    let text = HI_SPEAKER_RE.replace_all(&text, "");
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "1\n00:00:01,000 --> 00:00:03,500\nHello there.\n\n2\n00:00:04,000 --> 00:00:06,000\nSecond line\nwith a wrap.\n";

    #[test]
    fn test_parse_basic() {
        let entries = SrtEntry::parse(SAMPLE).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].start_ms, 1000);
        assert_eq!(entries[0].end_ms, 3500);
        assert_eq!(entries[1].text, "Second line\nwith a wrap.");
    }

    #[test]
    fn test_parse_crlf_and_bom() {
        let crlf = format!("\u{feff}{}", SAMPLE.replace('\n', "\r\n"));
        let entries = SrtEntry::parse(&crlf).unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_parse_dot_millis() {
        let dotted = "1\n00:00:01.000 --> 00:00:02.000\nHi\n";
        let entries = SrtEntry::parse(dotted).unwrap();
        assert_eq!(entries[0].end_ms, 2000);
    }

    #[test]
    fn test_parse_garbage_fails() {
        assert!(SrtEntry::parse("not a subtitle at all").is_err());
    }

    #[test]
    fn test_render_round_trip() {
        let entries = SrtEntry::parse(SAMPLE).unwrap();
        let rendered = SrtEntry::render(&entries);
        let reparsed = SrtEntry::parse(&rendered).unwrap();
        assert_eq!(entries, reparsed);
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(SrtEntry::format_timestamp(3_661_042), "01:01:01,042");
    }

    #[test]
    fn test_strip_inline_markup() {
        assert_eq!(
            strip_inline_markup("<i>Hello</i> <font color=\"red\">world</font>"),
            "Hello world"
        );
    }

    #[test]
    fn test_strip_hi_markers_brackets() {
        assert_eq!(strip_hi_markers("[door creaks]\nCome in."), "Come in.");
        assert_eq!(strip_hi_markers("(sighs) Fine."), "Fine.");
    }

    #[test]
    fn test_strip_hi_markers_speaker_labels() {
        assert_eq!(strip_hi_markers("JOHN: We have to go."), "We have to go.");
        // Mixed-case "names" are dialogue, not labels.
        assert_eq!(strip_hi_markers("Note: keep this."), "Note: keep this.");
    }
}
