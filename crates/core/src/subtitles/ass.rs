//! ASS/SSA document model, style classification and override-tag handling.
//!
//! Parsing keeps unknown sections and style fields verbatim so a translated
//! file differs from its source only in the dialog text and title.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex_lite::Regex;

use super::SubtitleError;

static SIGNS_PATTERNS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)sign|^op$|^ed$|song|karaoke|title|note|insert|logo|screen|board|card|letter")
        .unwrap()
});

static DIALOG_PATTERNS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)default|main|dialogue|italic|flashback|narrat|top|alt|internal|thought")
        .unwrap()
});

static OVERRIDE_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{[^}]*\}").unwrap());

static POS_MOVE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\(?:pos|move|org)\s*\(").unwrap());

/// Classification of an ASS style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyleClass {
    /// Spoken dialogue, translated.
    Dialog,
    /// Signs/songs/typesetting, preserved verbatim.
    Signs,
}

/// One event line (`Dialogue:` or `Comment:`).
#[derive(Debug, Clone, PartialEq)]
pub struct AssEvent {
    /// `Dialogue` or `Comment`.
    pub kind: String,
    /// Columns before the text, verbatim (Layer, Start, End, Style, ...).
    pub fields: Vec<String>,
    pub style: String,
    pub text: String,
}

impl AssEvent {
    pub fn is_comment(&self) -> bool {
        self.kind.eq_ignore_ascii_case("comment")
    }
}

/// A parsed ASS document.
#[derive(Debug, Clone)]
pub struct AssFile {
    /// `[Script Info]` key/value pairs in order.
    pub script_info: Vec<(String, String)>,
    /// Raw style lines under `[V4+ Styles]`, `Format:` first.
    pub style_lines: Vec<String>,
    /// Column names of the events `Format:` line.
    pub events_format: Vec<String>,
    pub events: Vec<AssEvent>,
    /// Sections other than Script Info/Styles/Events, kept verbatim.
    pub extra_sections: Vec<String>,
}

impl AssFile {
    /// Parse an ASS/SSA document.
    pub fn parse(content: &str) -> Result<Self, SubtitleError> {
        let content = content.trim_start_matches('\u{feff}');
        let mut script_info = Vec::new();
        let mut style_lines = Vec::new();
        let mut events_format: Vec<String> = Vec::new();
        let mut events = Vec::new();
        let mut extra_sections = Vec::new();

        #[derive(PartialEq)]
        enum Section {
            None,
            ScriptInfo,
            Styles,
            Events,
            Other,
        }
        let mut section = Section::None;
        let mut current_extra = String::new();

        for line in content.lines() {
            let trimmed = line.trim_end_matches('\r');
            if trimmed.starts_with('[') && trimmed.ends_with(']') {
                if section == Section::Other && !current_extra.is_empty() {
                    extra_sections.push(std::mem::take(&mut current_extra));
                }
                let name = trimmed[1..trimmed.len() - 1].to_ascii_lowercase();
                section = match name.as_str() {
                    "script info" => Section::ScriptInfo,
                    "v4+ styles" | "v4 styles" | "v4+ styles+" => Section::Styles,
                    "events" => Section::Events,
                    _ => {
                        current_extra.push_str(trimmed);
                        current_extra.push('\n');
                        Section::Other
                    }
                };
                continue;
            }

            match section {
                Section::ScriptInfo => {
                    if trimmed.starts_with(';') || trimmed.is_empty() {
                        continue;
                    }
                    if let Some((key, value)) = trimmed.split_once(':') {
                        script_info.push((key.trim().to_string(), value.trim().to_string()));
                    }
                }
                Section::Styles => {
                    if !trimmed.is_empty() {
                        style_lines.push(trimmed.to_string());
                    }
                }
                Section::Events => {
                    if trimmed.is_empty() {
                        continue;
                    }
                    if let Some(rest) = trimmed.strip_prefix("Format:") {
                        events_format =
                            rest.split(',').map(|c| c.trim().to_string()).collect();
                        continue;
                    }
                    let (kind, rest) = match trimmed.split_once(':') {
                        Some((k, r)) if k == "Dialogue" || k == "Comment" => (k, r),
                        _ => continue,
                    };
                    let n_cols = if events_format.is_empty() {
                        10
                    } else {
                        events_format.len()
                    };
                    // The text column is last and may contain commas.
                    let parts: Vec<&str> = rest.splitn(n_cols, ',').collect();
                    if parts.len() < n_cols {
                        continue;
                    }
                    let fields: Vec<String> = parts[..n_cols - 1]
                        .iter()
                        .map(|s| s.trim().to_string())
                        .collect();
                    let text = parts[n_cols - 1].to_string();
                    let style_idx = events_format
                        .iter()
                        .position(|c| c.eq_ignore_ascii_case("style"))
                        .unwrap_or(3);
                    let style = fields.get(style_idx).cloned().unwrap_or_default();
                    events.push(AssEvent {
                        kind: kind.to_string(),
                        fields,
                        style,
                        text,
                    });
                }
                Section::Other => {
                    current_extra.push_str(trimmed);
                    current_extra.push('\n');
                }
                Section::None => {}
            }
        }
        if !current_extra.is_empty() {
            extra_sections.push(current_extra);
        }

        if events.is_empty() && style_lines.is_empty() && script_info.is_empty() {
            return Err(SubtitleError::Parse("not an ASS document".to_string()));
        }
        if events_format.is_empty() {
            events_format = [
                "Layer", "Start", "End", "Style", "Name", "MarginL", "MarginR", "MarginV",
                "Effect", "Text",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect();
        }

        Ok(Self {
            script_info,
            style_lines,
            events_format,
            events,
            extra_sections,
        })
    }

    /// Render back to ASS text.
    pub fn render(&self) -> String {
        let mut out = String::from("[Script Info]\n");
        for (key, value) in &self.script_info {
            out.push_str(&format!("{key}: {value}\n"));
        }
        out.push_str("\n[V4+ Styles]\n");
        for line in &self.style_lines {
            out.push_str(line);
            out.push('\n');
        }
        out.push_str("\n[Events]\n");
        out.push_str(&format!("Format: {}\n", self.events_format.join(", ")));
        for event in &self.events {
            out.push_str(&format!(
                "{}: {},{}\n",
                event.kind,
                event.fields.join(","),
                event.text
            ));
        }
        for section in &self.extra_sections {
            out.push('\n');
            out.push_str(section);
        }
        out
    }

    pub fn title(&self) -> Option<&str> {
        self.script_info
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("title"))
            .map(|(_, v)| v.as_str())
    }

    pub fn set_title(&mut self, title: &str) {
        for (key, value) in &mut self.script_info {
            if key.eq_ignore_ascii_case("title") {
                *value = title.to_string();
                return;
            }
        }
        self.script_info.push(("Title".to_string(), title.to_string()));
    }

    /// Shift every event's Start/End time by `offset_ms`, clamping at zero.
    ///
    /// Returns how many events were shifted. Events whose time fields do
    /// not parse are left untouched.
    pub fn shift_times(&mut self, offset_ms: i64) -> usize {
        let start_idx = self
            .events_format
            .iter()
            .position(|c| c.eq_ignore_ascii_case("start"))
            .unwrap_or(1);
        let end_idx = self
            .events_format
            .iter()
            .position(|c| c.eq_ignore_ascii_case("end"))
            .unwrap_or(2);
        let mut shifted = 0;
        for event in &mut self.events {
            let parsed = (
                event.fields.get(start_idx).and_then(|s| parse_ass_time(s)),
                event.fields.get(end_idx).and_then(|s| parse_ass_time(s)),
            );
            if let (Some(start), Some(end)) = parsed {
                event.fields[start_idx] = format_ass_time(start.saturating_add_signed(offset_ms));
                event.fields[end_idx] = format_ass_time(end.saturating_add_signed(offset_ms));
                shifted += 1;
            }
        }
        shifted
    }

    /// Names of styles declared in the styles section.
    pub fn style_names(&self) -> Vec<String> {
        self.style_lines
            .iter()
            .filter_map(|l| l.strip_prefix("Style:"))
            .filter_map(|rest| rest.split(',').next())
            .map(|name| name.trim().to_string())
            .collect()
    }
}

/// Parse an ASS `H:MM:SS.cc` timestamp into milliseconds.
pub fn parse_ass_time(value: &str) -> Option<u64> {
    let mut parts = value.trim().split(':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let (seconds, centis) = parts.next()?.split_once('.')?;
    let seconds: u64 = seconds.parse().ok()?;
    let centis: u64 = centis.parse().ok()?;
    Some(hours * 3_600_000 + minutes * 60_000 + seconds * 1_000 + centis * 10)
}

/// Format milliseconds as the ASS `H:MM:SS.cc` convention.
pub fn format_ass_time(ms: u64) -> String {
    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000) / 60_000;
    let seconds = (ms % 60_000) / 1_000;
    let centis = (ms % 1_000) / 10;
    format!("{hours}:{minutes:02}:{seconds:02}.{centis:02}")
}

/// Classify every style used by events as dialog or signs/songs.
///
/// Explicit name patterns win; otherwise a style where more than 80% of its
/// events carry positioning overrides counts as signs. Unmatched styles
/// default to dialog.
pub fn classify_styles(file: &AssFile) -> HashMap<String, StyleClass> {
    let mut style_lines: HashMap<&str, Vec<&str>> = HashMap::new();
    for event in &file.events {
        if event.is_comment() {
            continue;
        }
        style_lines
            .entry(event.style.as_str())
            .or_default()
            .push(event.text.as_str());
    }

    let mut classes = HashMap::new();
    for (style, lines) in style_lines {
        let class = if SIGNS_PATTERNS.is_match(style) {
            StyleClass::Signs
        } else if DIALOG_PATTERNS.is_match(style) {
            StyleClass::Dialog
        } else {
            let pos_count = lines.iter().filter(|l| POS_MOVE_RE.is_match(l)).count();
            if !lines.is_empty() && pos_count as f64 / lines.len() as f64 > 0.8 {
                StyleClass::Signs
            } else {
                StyleClass::Dialog
            }
        };
        classes.insert(style.to_string(), class);
    }
    classes
}

/// An override-tag block and its offset in the clean text.
#[derive(Debug, Clone, PartialEq)]
pub struct TagSpan {
    /// Character offset in the tag-free text where the block sat.
    pub pos: usize,
    pub tag: String,
}

/// Split override-tag blocks out of an event text.
///
/// Returns the clean text and the removed blocks with their offsets.
pub fn extract_tags(text: &str) -> (String, Vec<TagSpan>) {
    if !OVERRIDE_TAG_RE.is_match(text) {
        return (text.to_string(), Vec::new());
    }
    let mut clean = String::new();
    let mut spans = Vec::new();
    let mut last = 0;
    for m in OVERRIDE_TAG_RE.find_iter(text) {
        clean.push_str(&text[last..m.start()]);
        spans.push(TagSpan {
            pos: clean.chars().count(),
            tag: m.as_str().to_string(),
        });
        last = m.end();
    }
    clean.push_str(&text[last..]);
    (clean, spans)
}

/// Re-insert override tags into translated text.
///
/// Position-0 tags stay prefixed. Others land at the proportional offset
/// `pos / orig_len * translated_len`, snapped to the nearest word boundary
/// within three characters. Insertions never reorder.
pub fn restore_tags(translated: &str, spans: &[TagSpan], original_clean_len: usize) -> String {
    if spans.is_empty() {
        return translated.to_string();
    }
    let chars: Vec<char> = translated.chars().collect();
    let trans_len = chars.len();
    let orig_len = if original_clean_len == 0 {
        trans_len
    } else {
        original_clean_len
    };

    let mut sorted: Vec<&TagSpan> = spans.iter().collect();
    sorted.sort_by_key(|s| s.pos);

    let mut result = String::new();
    let mut text_pos = 0usize;
    for span in sorted {
        let mut insert_pos = if span.pos == 0 {
            0
        } else if orig_len > 0 {
            let target = (span.pos as f64 / orig_len as f64 * trans_len as f64) as usize;
            let mut best = target.min(trans_len);
            for offset in -3i64..=3 {
                let check = target as i64 + offset;
                if check >= 0 && check as usize <= trans_len {
                    let check = check as usize;
                    if check == trans_len || chars[check] == ' ' || chars[check] == '\\' {
                        best = check;
                        break;
                    }
                }
            }
            best
        } else {
            span.pos.min(trans_len)
        };
        insert_pos = insert_pos.max(text_pos).min(trans_len);
        if insert_pos > text_pos {
            result.extend(&chars[text_pos..insert_pos]);
            text_pos = insert_pos;
        }
        result.push_str(&span.tag);
    }
    if text_pos < trans_len {
        result.extend(&chars[text_pos..]);
    }
    result
}

/// Normalize line breaks after translation to the ASS `\N` convention.
///
/// Models sometimes emit literal newlines or soft `\n` breaks.
pub fn fix_line_breaks(text: &str) -> String {
    let text = text.replace('\n', "\\N");
    // Rewrite `\n` to `\N` unless the backslash is itself escaped.
    let bytes: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == '\\'
            && i + 1 < bytes.len()
            && bytes[i + 1] == 'n'
            && (i == 0 || bytes[i - 1] != '\\')
        {
            out.push_str("\\N");
            i += 2;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    let collapsed = Regex::new(r"  +").unwrap().replace_all(&out, " ");
    collapsed.trim().to_string()
}
