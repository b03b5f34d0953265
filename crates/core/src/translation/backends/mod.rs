//! Concrete translation backends.

mod deepl;
mod google;
mod libretranslate;
mod ollama;
mod openai;

pub use deepl::DeepLBackend;
pub use google::GoogleTranslateBackend;
pub use libretranslate::LibreTranslateBackend;
pub use ollama::OllamaBackend;
pub use openai::OpenAiBackend;

use crate::store::GlossaryEntry;

use super::types::BackendError;

/// Render the shared translation prompt for generative backends: numbered
/// input lines, glossary directives, and a strict output contract.
pub(crate) fn build_llm_prompt(
    lines: &[String],
    source_lang: &str,
    target_lang: &str,
    glossary: &[GlossaryEntry],
) -> String {
    let mut prompt = format!(
        "Translate the following subtitle lines from {source_lang} to {target_lang}.\n\
         Keep the meaning, register and length close to the original.\n\
         Reply with exactly one numbered line per input line, nothing else.\n"
    );
    if !glossary.is_empty() {
        prompt.push_str("Use these term translations:\n");
        for entry in glossary {
            prompt.push_str(&format!("- {} => {}\n", entry.source_term, entry.target_term));
        }
    }
    prompt.push('\n');
    for (i, line) in lines.iter().enumerate() {
        let flat = line.replace('\n', " ");
        prompt.push_str(&format!("{}. {}\n", i + 1, flat));
    }
    prompt
}

/// Parse a numbered response back into exactly `expected` lines.
pub(crate) fn parse_numbered_lines(
    text: &str,
    expected: usize,
) -> Result<Vec<String>, BackendError> {
    let mut out: Vec<Option<String>> = vec![None; expected];
    for raw in text.lines() {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }
        let Some((num, rest)) = trimmed.split_once('.') else {
            continue;
        };
        let Ok(index) = num.trim().parse::<usize>() else {
            continue;
        };
        if index == 0 || index > expected {
            continue;
        }
        let slot = &mut out[index - 1];
        if slot.is_none() {
            *slot = Some(rest.trim().to_string());
        }
    }
    let missing = out.iter().filter(|s| s.is_none()).count();
    if missing > 0 {
        return Err(BackendError::Malformed(format!(
            "{missing} of {expected} lines missing from response"
        )));
    }
    Ok(out.into_iter().map(|s| s.unwrap()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn glossary_entry(src: &str, tgt: &str) -> GlossaryEntry {
        GlossaryEntry {
            id: 1,
            series_id: None,
            source_term: src.to_string(),
            target_term: tgt.to_string(),
            notes: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_prompt_contains_numbered_lines_and_glossary() {
        let lines = vec!["Hello".to_string(), "Bye".to_string()];
        let glossary = vec![glossary_entry("Titan", "Titan")];
        let prompt = build_llm_prompt(&lines, "en", "de", &glossary);
        assert!(prompt.contains("1. Hello"));
        assert!(prompt.contains("2. Bye"));
        assert!(prompt.contains("Titan => Titan"));
        assert!(prompt.contains("from en to de"));
    }

    #[test]
    fn test_parse_numbered_exact() {
        let parsed = parse_numbered_lines("1. Hallo\n2. Tschuess\n", 2).unwrap();
        assert_eq!(parsed, vec!["Hallo", "Tschuess"]);
    }

    #[test]
    fn test_parse_numbered_tolerates_noise_and_order() {
        let text = "Here you go:\n2. zwei\n1. eins\n";
        let parsed = parse_numbered_lines(text, 2).unwrap();
        assert_eq!(parsed, vec!["eins", "zwei"]);
    }

    #[test]
    fn test_parse_numbered_missing_line_fails() {
        let err = parse_numbered_lines("1. nur eine\n", 2).unwrap_err();
        assert!(matches!(err, BackendError::Malformed(_)));
    }

    #[test]
    fn test_parse_numbered_out_of_range_ignored() {
        let parsed = parse_numbered_lines("1. a\n2. b\n3. extra\n", 2).unwrap();
        assert_eq!(parsed.len(), 2);
    }
}
