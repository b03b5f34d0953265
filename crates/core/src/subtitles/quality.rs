//! Post-translation quality heuristics and output validation.

use serde::Serialize;

/// Advisory warnings computed after a translation pass. Warnings never fail
/// the job; they are attached to the job result and the quality sidecar.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QualityReport {
    pub warnings: Vec<String>,
    /// Share of output lines identical to their source, in [0, 1].
    pub identical_ratio: f64,
    /// Count of lines whose length ratio falls outside [0.2, 3.0].
    pub length_outliers: usize,
}

impl QualityReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

const STOPWORDS_EN: &[&str] = &[
    "the", "and", "you", "that", "have", "for", "not", "with", "this", "but",
];
const STOPWORDS_JA: &[&str] = &["です", "ます", "した", "ない", "こと"];
const STOPWORDS_ES: &[&str] = &["que", "los", "las", "una", "por", "para", "pero"];
const STOPWORDS_FR: &[&str] = &["les", "des", "une", "est", "pas", "que", "pour"];

fn stopwords_for(lang: &str) -> &'static [&'static str] {
    match lang {
        "en" => STOPWORDS_EN,
        "ja" => STOPWORDS_JA,
        "es" => STOPWORDS_ES,
        "fr" => STOPWORDS_FR,
        _ => &[],
    }
}

/// Heuristic quality check over (source, translated) line pairs.
///
/// Flags: more than half the lines unchanged, per-line length ratios outside
/// [0.2, 3.0], and a high residue of source-language stopwords in the
/// output.
pub fn check_translation_quality(
    source_lines: &[String],
    translated_lines: &[String],
    source_language: &str,
) -> QualityReport {
    let mut report = QualityReport::default();
    let n = source_lines.len().min(translated_lines.len());
    if n == 0 {
        return report;
    }

    let identical = source_lines
        .iter()
        .zip(translated_lines.iter())
        .filter(|(s, t)| !s.trim().is_empty() && s.trim() == t.trim())
        .count();
    report.identical_ratio = identical as f64 / n as f64;
    if report.identical_ratio > 0.5 {
        report.warnings.push(format!(
            "{identical} of {n} lines identical to source (likely untranslated)"
        ));
    }

    for (source, translated) in source_lines.iter().zip(translated_lines.iter()) {
        let src_len = source.chars().count();
        let out_len = translated.chars().count();
        if src_len == 0 || out_len == 0 {
            continue;
        }
        let ratio = out_len as f64 / src_len as f64;
        if !(0.2..=3.0).contains(&ratio) {
            report.length_outliers += 1;
        }
    }
    if report.length_outliers > 0 {
        report.warnings.push(format!(
            "{} line(s) with suspicious length ratio",
            report.length_outliers
        ));
    }

    let stopwords = stopwords_for(source_language);
    if !stopwords.is_empty() {
        let mut total_words = 0usize;
        let mut stopword_hits = 0usize;
        for line in translated_lines {
            for word in line.split_whitespace() {
                total_words += 1;
                let lower = word.to_lowercase();
                let clean: String = lower
                    .trim_matches(|c: char| !c.is_alphanumeric())
                    .to_string();
                if stopwords.contains(&clean.as_str()) || stopwords.iter().any(|s| lower.contains(s) && s.len() > 2 && !s.is_ascii()) {
                    stopword_hits += 1;
                }
            }
        }
        if total_words >= 20 && stopword_hits as f64 / total_words as f64 > 0.15 {
            report.warnings.push(format!(
                "high source-language stopword residue ({stopword_hits}/{total_words} words)"
            ));
        }
    }

    report
}

/// Outcome of structural output validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ValidationOutcome {
    Ok,
    /// Validation failed; the caller may retry and eventually accept with
    /// these problems logged.
    Failed(Vec<String>),
}

impl ValidationOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, ValidationOutcome::Ok)
    }
}

/// Structural validation of a translation batch result.
///
/// Requires the output line count to match the input, the total output
/// length to stay within 1.5x of the input, and at most 30% empty outputs.
pub fn validate_translation_output(
    source_lines: &[String],
    translated_lines: &[String],
) -> ValidationOutcome {
    let mut problems = Vec::new();

    if source_lines.len() != translated_lines.len() {
        problems.push(format!(
            "line count mismatch: {} in, {} out",
            source_lines.len(),
            translated_lines.len()
        ));
    }

    let in_len: usize = source_lines.iter().map(|l| l.chars().count()).sum();
    let out_len: usize = translated_lines.iter().map(|l| l.chars().count()).sum();
    if in_len > 0 && out_len as f64 > in_len as f64 * 1.5 {
        problems.push(format!(
            "output length {out_len} exceeds 1.5x input length {in_len}"
        ));
    }

    if !translated_lines.is_empty() {
        let empty = translated_lines
            .iter()
            .filter(|l| l.trim().is_empty())
            .count();
        if empty as f64 / translated_lines.len() as f64 > 0.3 {
            problems.push(format!(
                "{empty} of {} outputs empty",
                translated_lines.len()
            ));
        }
    }

    if problems.is_empty() {
        ValidationOutcome::Ok
    } else {
        ValidationOutcome::Failed(problems)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_untranslated_warning() {
        let source = lines(&["Hello", "World", "Again", "More"]);
        let report = check_translation_quality(&source, &source, "en");
        assert!(report.identical_ratio > 0.99);
        assert!(!report.is_clean());
    }

    #[test]
    fn test_clean_translation_no_warnings() {
        let source = lines(&["Hello there", "How are you"]);
        let translated = lines(&["Hallo du", "Wie geht es dir"]);
        let report = check_translation_quality(&source, &translated, "en");
        assert!(report.is_clean());
    }

    #[test]
    fn test_length_outlier_detection() {
        let source = lines(&["Hi", "A perfectly ordinary sentence here"]);
        let translated = lines(&[
            "Hi there this translation is absurdly long for a greeting of two letters",
            "Ein Satz",
        ]);
        let report = check_translation_quality(&source, &translated, "en");
        assert!(report.length_outliers >= 1);
    }

    #[test]
    fn test_empty_input_is_clean() {
        let report = check_translation_quality(&[], &[], "en");
        assert!(report.is_clean());
    }

    #[test]
    fn test_validate_ok() {
        let source = lines(&["one", "two"]);
        let translated = lines(&["eins", "zwei"]);
        assert!(validate_translation_output(&source, &translated).is_ok());
    }

    #[test]
    fn test_validate_zero_lines_ok() {
        assert!(validate_translation_output(&[], &[]).is_ok());
    }

    #[test]
    fn test_validate_line_count_mismatch() {
        let source = lines(&["one", "two"]);
        let translated = lines(&["eins"]);
        assert!(!validate_translation_output(&source, &translated).is_ok());
    }

    #[test]
    fn test_validate_length_blowup() {
        let source = lines(&["short"]);
        let translated = lines(&["this output is very much longer than allowed for the input"]);
        assert!(!validate_translation_output(&source, &translated).is_ok());
    }

    #[test]
    fn test_validate_too_many_empty() {
        let source = lines(&["a", "b", "c"]);
        let translated = lines(&["x", "", ""]);
        assert!(!validate_translation_output(&source, &translated).is_ok());
    }
}
