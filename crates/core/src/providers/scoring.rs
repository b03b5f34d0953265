//! Candidate scoring and the upgrade decision.
//!
//! Scoring is a pure function over (candidate, query) plus a per-provider
//! bias. The weights are policy: they load from settings (`scoring.*`) and
//! ship with defaults where an exact-id match outranks a series-title match,
//! which outranks year, which outranks resolution, and where series + season
//! + episode alone reach the perfect threshold.

use std::path::Path;
use std::time::SystemTime;

use serde::Serialize;

use crate::store::SettingsStore;
use crate::subtitles::SubtitleFormat;

use super::types::{MatchSignal, SubtitleCandidate, VideoQuery};

/// Score at which a candidate counts as a perfect match (early-exit).
pub const PERFECT_SCORE: i32 = 400;

/// Overridable scoring weights.
#[derive(Debug, Clone, Serialize)]
pub struct ScoringWeights {
    pub hash: i32,
    pub id_match: i32,
    pub series: i32,
    pub season: i32,
    pub episode: i32,
    pub year: i32,
    pub release_group: i32,
    pub resolution: i32,
    pub hearing_impaired_penalty: i32,
    pub forced_penalty: i32,
    pub forced_bonus: i32,
    pub machine_translated_penalty: i32,
    pub uploader_trust_multiplier: f32,
    pub uploader_trust_cap: i32,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            hash: 350,
            id_match: 350,
            series: 300,
            season: 50,
            episode: 50,
            year: 40,
            release_group: 60,
            resolution: 30,
            hearing_impaired_penalty: 50,
            forced_penalty: 100,
            forced_bonus: 80,
            machine_translated_penalty: 80,
            uploader_trust_multiplier: 10.0,
            uploader_trust_cap: 30,
        }
    }
}

impl ScoringWeights {
    /// Load weights from settings, falling back to defaults per key.
    pub fn from_settings(settings: &dyn SettingsStore) -> Self {
        let d = Self::default();
        Self {
            hash: settings.get_i64("scoring.hash", d.hash as i64) as i32,
            id_match: settings.get_i64("scoring.id_match", d.id_match as i64) as i32,
            series: settings.get_i64("scoring.series", d.series as i64) as i32,
            season: settings.get_i64("scoring.season", d.season as i64) as i32,
            episode: settings.get_i64("scoring.episode", d.episode as i64) as i32,
            year: settings.get_i64("scoring.year", d.year as i64) as i32,
            release_group: settings.get_i64("scoring.release_group", d.release_group as i64) as i32,
            resolution: settings.get_i64("scoring.resolution", d.resolution as i64) as i32,
            hearing_impaired_penalty: settings.get_i64(
                "scoring.hearing_impaired_penalty",
                d.hearing_impaired_penalty as i64,
            ) as i32,
            forced_penalty: settings.get_i64("scoring.forced_penalty", d.forced_penalty as i64)
                as i32,
            forced_bonus: settings.get_i64("scoring.forced_bonus", d.forced_bonus as i64) as i32,
            machine_translated_penalty: settings.get_i64(
                "scoring.machine_translated_penalty",
                d.machine_translated_penalty as i64,
            ) as i32,
            uploader_trust_multiplier: settings.get_f64(
                "scoring.uploader_trust_multiplier",
                d.uploader_trust_multiplier as f64,
            ) as f32,
            uploader_trust_cap: settings
                .get_i64("scoring.uploader_trust_cap", d.uploader_trust_cap as i64)
                as i32,
        }
    }
}

/// Score a candidate against a query.
///
/// `provider_modifier` is the per-provider additive bias from the store,
/// clamped to [-50, +50] and applied last.
pub fn score_candidate(
    candidate: &SubtitleCandidate,
    query: &VideoQuery,
    weights: &ScoringWeights,
    provider_modifier: i32,
) -> i32 {
    let mut score = 0i32;

    if candidate.matches.contains(&MatchSignal::Hash) {
        score += weights.hash;
    }
    if candidate.matches.contains(&MatchSignal::ImdbId)
        || candidate.matches.contains(&MatchSignal::TvdbId)
        || candidate.matches.contains(&MatchSignal::AnidbId)
    {
        score += weights.id_match;
    }
    if candidate.matches.contains(&MatchSignal::Series) {
        score += weights.series;
    }
    if candidate.matches.contains(&MatchSignal::Season) {
        score += weights.season;
    }
    if candidate.matches.contains(&MatchSignal::Episode) {
        score += weights.episode;
    }
    if candidate.matches.contains(&MatchSignal::Year) {
        score += weights.year;
    }
    if candidate.matches.contains(&MatchSignal::ReleaseGroup) {
        score += weights.release_group;
    }
    if candidate.matches.contains(&MatchSignal::Resolution) {
        score += weights.resolution;
    }

    if candidate.hearing_impaired && !query.hearing_impaired {
        score -= weights.hearing_impaired_penalty;
    }

    if candidate.forced {
        if query.forced_only {
            score += weights.forced_bonus;
        } else {
            score -= weights.forced_penalty;
        }
    }

    if candidate.machine_translated {
        let confidence = candidate.mt_confidence.clamp(0.0, 1.0);
        score -= (weights.machine_translated_penalty as f32 * (1.0 - confidence)).round() as i32;
    }

    if candidate.uploader_trust > 0.0 {
        let bonus = (candidate.uploader_trust * weights.uploader_trust_multiplier).round() as i32;
        score += bonus.min(weights.uploader_trust_cap);
    }

    score + provider_modifier.clamp(-50, 50)
}

/// Whether a candidate's score counts as a perfect match.
pub fn is_perfect(score: i32) -> bool {
    score >= PERFECT_SCORE
}

/// Decide whether an existing subtitle should be replaced.
///
/// True iff (a) `prefer_ass` and the old format is not ASS while the new one
/// is, or (b) the score improves by at least `min_delta`. Files younger than
/// `window_days` demand double the delta on the score path, so a fresh
/// download is not churned for marginal gains.
pub fn should_upgrade(
    old_format: SubtitleFormat,
    old_score: i32,
    new_format: SubtitleFormat,
    new_score: i32,
    prefer_ass: bool,
    min_delta: i32,
    window_days: u32,
    existing_path: Option<&Path>,
) -> (bool, String) {
    let format_upgrade =
        prefer_ass && old_format != SubtitleFormat::Ass && new_format == SubtitleFormat::Ass;
    if format_upgrade {
        return (
            true,
            format!(
                "{} to {} format upgrade",
                old_format.extension(),
                new_format.extension()
            ),
        );
    }

    let delta = new_score - old_score;
    let recent = existing_path
        .and_then(|p| p.metadata().ok())
        .and_then(|m| m.modified().ok())
        .and_then(|mtime| SystemTime::now().duration_since(mtime).ok())
        .map(|age| age.as_secs() < u64::from(window_days) * 86_400)
        .unwrap_or(false);

    // The score path always needs a real improvement; recent files demand
    // double the configured delta.
    let required = if recent {
        (min_delta * 2).max(1)
    } else {
        min_delta.max(1)
    };
    if delta >= required {
        return (true, format!("score +{delta} (required {required})"));
    }

    let reason = if recent {
        format!("existing file younger than {window_days}d and delta {delta} below margin")
    } else {
        format!("score delta {delta} below minimum {min_delta}")
    };
    (false, reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn candidate(matches: &[MatchSignal]) -> SubtitleCandidate {
        SubtitleCandidate {
            provider: "test".to_string(),
            subtitle_id: "1".to_string(),
            filename: "x.ass".to_string(),
            language: "de".to_string(),
            format: SubtitleFormat::Ass,
            score: 0,
            release_info: String::new(),
            hearing_impaired: false,
            forced: false,
            matches: matches.iter().copied().collect::<HashSet<_>>(),
            machine_translated: false,
            mt_confidence: 0.0,
            uploader_trust: 0.0,
            provider_data: None,
        }
    }

    fn query() -> VideoQuery {
        VideoQuery {
            file_path: "/m/e1.mkv".to_string(),
            languages: vec!["de".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_weight_ordering_invariants() {
        let w = ScoringWeights::default();
        assert!(w.hash > w.series);
        assert!(w.id_match > w.series);
        assert!(w.series > w.year);
        assert!(w.year > w.resolution);
    }

    #[test]
    fn test_series_season_episode_reaches_perfect() {
        let w = ScoringWeights::default();
        let c = candidate(&[MatchSignal::Series, MatchSignal::Season, MatchSignal::Episode]);
        let score = score_candidate(&c, &query(), &w, 0);
        assert!(is_perfect(score), "score {score} should be perfect");
    }

    #[test]
    fn test_year_alone_not_perfect() {
        let w = ScoringWeights::default();
        let c = candidate(&[MatchSignal::Series, MatchSignal::Year]);
        assert!(!is_perfect(score_candidate(&c, &query(), &w, 0)));
    }

    #[test]
    fn test_hi_penalty_unless_requested() {
        let w = ScoringWeights::default();
        let mut c = candidate(&[MatchSignal::Series]);
        c.hearing_impaired = true;
        let penalized = score_candidate(&c, &query(), &w, 0);

        let mut hi_query = query();
        hi_query.hearing_impaired = true;
        let unpenalized = score_candidate(&c, &hi_query, &w, 0);
        assert_eq!(unpenalized - penalized, w.hearing_impaired_penalty);
    }

    #[test]
    fn test_forced_penalty_and_bonus() {
        let w = ScoringWeights::default();
        let mut c = candidate(&[MatchSignal::Series]);
        c.forced = true;
        let full_query = query();
        let penalized = score_candidate(&c, &full_query, &w, 0);
        assert_eq!(penalized, w.series - w.forced_penalty);

        let mut forced_query = query();
        forced_query.forced_only = true;
        let boosted = score_candidate(&c, &forced_query, &w, 0);
        assert_eq!(boosted, w.series + w.forced_bonus);
    }

    #[test]
    fn test_mt_penalty_scaled_by_confidence() {
        let w = ScoringWeights::default();
        let mut c = candidate(&[MatchSignal::Series]);
        c.machine_translated = true;
        c.mt_confidence = 0.0;
        let worst = score_candidate(&c, &query(), &w, 0);
        c.mt_confidence = 1.0;
        let best = score_candidate(&c, &query(), &w, 0);
        assert_eq!(best - worst, w.machine_translated_penalty);
    }

    #[test]
    fn test_trust_bonus_bounded() {
        let w = ScoringWeights::default();
        let mut c = candidate(&[]);
        c.uploader_trust = 100.0;
        let score = score_candidate(&c, &query(), &w, 0);
        assert_eq!(score, w.uploader_trust_cap);
    }

    #[test]
    fn test_provider_modifier_clamped() {
        let w = ScoringWeights::default();
        let c = candidate(&[]);
        assert_eq!(score_candidate(&c, &query(), &w, 500), 50);
        assert_eq!(score_candidate(&c, &query(), &w, -500), -50);
    }

    #[test]
    fn test_should_upgrade_prefer_ass() {
        let (upgrade, reason) = should_upgrade(
            SubtitleFormat::Srt,
            120,
            SubtitleFormat::Ass,
            100,
            true,
            0,
            7,
            None,
        );
        assert!(upgrade, "{reason}");
    }

    #[test]
    fn test_should_upgrade_score_delta() {
        let (upgrade, _) = should_upgrade(
            SubtitleFormat::Srt,
            100,
            SubtitleFormat::Srt,
            160,
            false,
            50,
            7,
            None,
        );
        assert!(upgrade);

        let (no_upgrade, _) = should_upgrade(
            SubtitleFormat::Srt,
            100,
            SubtitleFormat::Srt,
            120,
            false,
            50,
            7,
            None,
        );
        assert!(!no_upgrade);
    }

    #[test]
    fn test_should_upgrade_recent_file_needs_margin() {
        let dir = tempfile::TempDir::new().unwrap();
        let existing = dir.path().join("ep.de.srt");
        std::fs::write(&existing, "x").unwrap();

        // Fresh file: +50 meets min_delta but not the doubled margin.
        let (upgrade, _) = should_upgrade(
            SubtitleFormat::Srt,
            100,
            SubtitleFormat::Srt,
            150,
            false,
            50,
            7,
            Some(&existing),
        );
        assert!(!upgrade);

        let (upgrade, _) = should_upgrade(
            SubtitleFormat::Srt,
            100,
            SubtitleFormat::Srt,
            210,
            false,
            50,
            7,
            Some(&existing),
        );
        assert!(upgrade);
    }

    #[test]
    fn test_settings_override() {
        let settings = crate::store::SqliteSettingsStore::in_memory().unwrap();
        settings.set("scoring.series", "250").unwrap();
        let weights = ScoringWeights::from_settings(&settings);
        assert_eq!(weights.series, 250);
        assert_eq!(weights.hash, ScoringWeights::default().hash);
    }
}
