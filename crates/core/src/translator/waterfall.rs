//! Waterfall implementation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::fsops::{atomic_write, check_disk_space, quality_sidecar_path};
use crate::integrations::LibraryItem;
use crate::providers::{parse_filename, ProviderManager, VideoQuery};
use crate::store::{
    GlossaryEntry, ItemKind, LanguageProfile, SettingsStore, SqliteHistoryStore, SqliteJobStore,
    SqliteTranslationStore,
};
use crate::subtitles::{
    classify_styles, detect_existing_target, extract_subtitle_stream, extract_tags,
    find_external_source_sub, fix_line_breaks, restore_tags, run_ffprobe,
    select_best_subtitle_stream, sidecar_path, strip_hi_markers, strip_inline_markup,
    validate_translation_output, AssFile, ProbeData, QualityReport, SrtEntry, StyleClass,
    SubtitleFormat, check_translation_quality,
};
use crate::translation::TranslationManager;
use crate::whisper::WhisperClient;

/// Result of one waterfall run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TranslateOutcome {
    /// A subtitle file was produced (or upgraded).
    Success {
        output_path: String,
        case: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        backend: Option<String>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        warnings: Vec<String>,
    },
    /// Nothing to do (already satisfied, or kept as-is).
    Skipped {
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        output_path: Option<String>,
    },
    /// Transcription was enqueued; the pipeline re-enters when it lands.
    WhisperPending { job_id: String },
    /// No step could produce a subtitle.
    Failed { error: String },
}

impl TranslateOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TranslateOutcome::Success { .. })
    }

    pub fn output_path(&self) -> Option<&str> {
        match self {
            TranslateOutcome::Success { output_path, .. } => Some(output_path),
            TranslateOutcome::Skipped { output_path, .. } => output_path.as_deref(),
            _ => None,
        }
    }
}

/// Build a provider query for a video, preferring library metadata and
/// falling back to release-name parsing.
pub fn build_video_query(
    video_path: &Path,
    context: Option<&LibraryItem>,
    languages: Vec<String>,
) -> VideoQuery {
    let mut query = VideoQuery {
        file_path: video_path.to_string_lossy().to_string(),
        languages,
        ..Default::default()
    };
    match context {
        Some(item) => {
            match item.kind {
                ItemKind::Episode => query.series = Some(item.title.clone()),
                ItemKind::Movie => query.title = Some(item.title.clone()),
            }
            query.season = item.season;
            query.episode = item.episode;
            query.year = item.year;
            query.imdb_id = item.imdb_id.clone();
            query.tvdb_id = item.tvdb_id;
            query.tmdb_id = item.tmdb_id;
        }
        None => {
            let parsed = parse_filename(video_path);
            if !parsed.series_title.is_empty() {
                query.series = Some(parsed.series_title);
            }
            if !parsed.title.is_empty() {
                query.title = Some(parsed.title);
            }
            query.season = parsed.season;
            query.episode = parsed.episode;
            query.absolute_episode = parsed.absolute_episode;
            query.year = parsed.year;
            query.release_group = parsed.release_group;
            query.resolution = parsed.resolution;
        }
    }
    query
}

struct TranslatedText {
    lines_out: String,
    backend: Option<String>,
    warnings: Vec<String>,
    report: QualityReport,
}

/// The waterfall translator.
pub struct Translator {
    providers: Arc<ProviderManager>,
    translation: Arc<TranslationManager>,
    jobs: Arc<SqliteJobStore>,
    history: Arc<SqliteHistoryStore>,
    settings: Arc<dyn SettingsStore>,
    whisper: Option<Arc<WhisperClient>>,
}

impl Translator {
    pub fn new(
        providers: Arc<ProviderManager>,
        translation: Arc<TranslationManager>,
        jobs: Arc<SqliteJobStore>,
        history: Arc<SqliteHistoryStore>,
        settings: Arc<dyn SettingsStore>,
    ) -> Self {
        Self {
            providers,
            translation,
            jobs,
            history,
            settings,
            whisper: None,
        }
    }

    pub fn with_whisper(mut self, whisper: Arc<WhisperClient>) -> Self {
        self.whisper = Some(whisper);
        self
    }

    fn translation_store(&self) -> &Arc<SqliteTranslationStore> {
        self.translation.store()
    }

    /// Effective profile for the item, with settings-backed defaults when
    /// no profile rows exist yet.
    pub fn resolve_profile(&self, context: Option<&LibraryItem>) -> LanguageProfile {
        let (kind, id) = match context {
            Some(item) => match item.kind {
                ItemKind::Episode => ("series", item.series_id),
                ItemKind::Movie => ("movie", Some(item.id)),
            },
            None => ("series", None),
        };
        if let Ok(Some(profile)) = self.translation_store().effective_profile(kind, id) {
            return profile;
        }
        LanguageProfile {
            id: 0,
            name: "default".to_string(),
            source_language: self.settings.get_string("translation.source_language", "en"),
            target_languages: vec![self.settings.get_string("translation.target_language", "de")],
            fallback_chain: vec![self.settings.get_string("translation.backend", "ollama")],
            forced_preference: Default::default(),
            updated_at: chrono::Utc::now(),
        }
    }

    fn glossary_for(&self, context: Option<&LibraryItem>) -> Vec<GlossaryEntry> {
        let series_id = context.and_then(|c| c.series_id);
        self.translation_store()
            .glossary_merged(series_id)
            .unwrap_or_default()
    }

    fn hi_removal_enabled(&self) -> bool {
        self.settings.get_bool("translation.remove_hi", true)
    }

    /// Run the full waterfall for one video file and target language.
    pub async fn translate_file(
        &self,
        video_path: &Path,
        target_language: &str,
        context: Option<&LibraryItem>,
    ) -> TranslateOutcome {
        let profile = self.resolve_profile(context);
        let source_language = profile.source_language.clone();
        let chain = profile.fallback_chain.clone();
        let glossary = self.glossary_for(context);

        // Case A: target ASS already on disk.
        if let Some(existing) = detect_existing_target(video_path, target_language, false) {
            if existing.format == SubtitleFormat::Ass {
                return TranslateOutcome::Skipped {
                    reason: "target-language ASS already present".to_string(),
                    output_path: Some(existing.path.to_string_lossy().to_string()),
                };
            }
            // Case B: an SRT exists; try to upgrade it to ASS.
            return self
                .upgrade_srt(
                    video_path,
                    &existing.path,
                    target_language,
                    &source_language,
                    &chain,
                    &glossary,
                    context,
                )
                .await;
        }

        // Case C: no target-language subtitle at all.
        self.produce_target(
            video_path,
            target_language,
            &source_language,
            &chain,
            &glossary,
            context,
        )
        .await
    }

    /// Case B: upgrade an existing target SRT to ASS.
    async fn upgrade_srt(
        &self,
        video_path: &Path,
        existing_srt: &Path,
        target_language: &str,
        source_language: &str,
        chain: &[String],
        glossary: &[GlossaryEntry],
        context: Option<&LibraryItem>,
    ) -> TranslateOutcome {
        // B1: a provider may carry the target-language ASS directly.
        let query = build_video_query(video_path, context, vec![target_language.to_string()]);
        match self
            .providers
            .search_and_download_best(&query, Some(SubtitleFormat::Ass))
            .await
        {
            Ok(Some(downloaded)) if downloaded.format == SubtitleFormat::Ass => {
                match self
                    .providers
                    .save_subtitle(&downloaded, video_path, target_language, false)
                {
                    Ok(output) => {
                        self.remove_replaced_srt(existing_srt);
                        self.record_upgrade(
                            video_path,
                            "srt",
                            "ass",
                            downloaded.candidate.score,
                            &format!("SRT->ASS via {}", downloaded.candidate.provider),
                        );
                        return TranslateOutcome::Success {
                            output_path: output.to_string_lossy().to_string(),
                            case: "upgrade_provider_ass".to_string(),
                            backend: None,
                            warnings: Vec::new(),
                        };
                    }
                    Err(e) => warn!("Failed to save upgrade download: {e}"),
                }
            }
            Ok(_) => {}
            Err(e) => debug!("Upgrade provider search failed: {e}"),
        }

        // B2: an embedded source-language ASS can be translated.
        let probe = run_ffprobe(video_path).await.unwrap_or_default();
        if let Some(choice) = select_best_subtitle_stream(
            &probe,
            source_language,
            target_language,
            Some(SubtitleFormat::Ass),
        ) {
            match self
                .extract_and_translate_ass(
                    video_path,
                    &probe,
                    choice.sub_index,
                    target_language,
                    source_language,
                    chain,
                    glossary,
                )
                .await
            {
                Ok((output, backend, warnings)) => {
                    self.remove_replaced_srt(existing_srt);
                    self.record_upgrade(
                        video_path,
                        "srt",
                        "ass",
                        0,
                        "SRT->ASS via embedded stream translation",
                    );
                    return TranslateOutcome::Success {
                        output_path: output.to_string_lossy().to_string(),
                        case: "upgrade_embedded_ass".to_string(),
                        backend,
                        warnings,
                    };
                }
                Err(e) => debug!("Embedded upgrade failed: {e}"),
            }
        }

        // B3: keep the SRT.
        TranslateOutcome::Skipped {
            reason: "no ASS upgrade available, keeping SRT".to_string(),
            output_path: Some(existing_srt.to_string_lossy().to_string()),
        }
    }

    /// Case C: produce a target-language subtitle from scratch.
    async fn produce_target(
        &self,
        video_path: &Path,
        target_language: &str,
        source_language: &str,
        chain: &[String],
        glossary: &[GlossaryEntry],
        context: Option<&LibraryItem>,
    ) -> TranslateOutcome {
        let probe = run_ffprobe(video_path).await.unwrap_or_default();

        // C1: embedded source ASS.
        if let Some(choice) = select_best_subtitle_stream(
            &probe,
            source_language,
            target_language,
            Some(SubtitleFormat::Ass),
        ) {
            match self
                .extract_and_translate_ass(
                    video_path,
                    &probe,
                    choice.sub_index,
                    target_language,
                    source_language,
                    chain,
                    glossary,
                )
                .await
            {
                Ok((output, backend, warnings)) => {
                    return TranslateOutcome::Success {
                        output_path: output.to_string_lossy().to_string(),
                        case: "embedded_ass".to_string(),
                        backend,
                        warnings,
                    }
                }
                Err(e) => debug!("Embedded ASS translation failed: {e}"),
            }
        }

        // C2: embedded source SRT.
        if let Some(choice) = select_best_subtitle_stream(
            &probe,
            source_language,
            target_language,
            Some(SubtitleFormat::Srt),
        ) {
            match self
                .extract_srt_stream(video_path, choice.sub_index)
                .await
            {
                Ok(content) => {
                    match self
                        .translate_srt_content(
                            &content,
                            video_path,
                            target_language,
                            source_language,
                            chain,
                            glossary,
                            "embedded_srt",
                        )
                        .await
                    {
                        Ok(outcome) => return outcome,
                        Err(e) => debug!("Embedded SRT translation failed: {e}"),
                    }
                }
                Err(e) => debug!("Embedded SRT extraction failed: {e}"),
            }
        }

        // C2b: an external source-language SRT next to the video.
        if let Some(srt_path) = find_external_source_sub(video_path, source_language) {
            match std::fs::read_to_string(&srt_path) {
                Ok(content) => {
                    match self
                        .translate_srt_content(
                            &content,
                            video_path,
                            target_language,
                            source_language,
                            chain,
                            glossary,
                            "external_srt",
                        )
                        .await
                    {
                        Ok(outcome) => return outcome,
                        Err(e) => debug!("External SRT translation failed: {e}"),
                    }
                }
                Err(e) => debug!("External SRT unreadable: {e}"),
            }
        }

        // C3: a provider may carry a source-language subtitle.
        let query = build_video_query(video_path, context, vec![source_language.to_string()]);
        match self.providers.search_and_download_best(&query, None).await {
            Ok(Some(downloaded)) => {
                let content = String::from_utf8_lossy(&downloaded.bytes).to_string();
                let result = if downloaded.format == SubtitleFormat::Ass {
                    self.translate_ass_content(
                        &content,
                        video_path,
                        target_language,
                        source_language,
                        chain,
                        glossary,
                        "provider_source_ass",
                    )
                    .await
                } else {
                    self.translate_srt_content(
                        &content,
                        video_path,
                        target_language,
                        source_language,
                        chain,
                        glossary,
                        "provider_source_srt",
                    )
                    .await
                };
                match result {
                    Ok(outcome) => return outcome,
                    Err(e) => debug!("Provider source translation failed: {e}"),
                }
            }
            Ok(None) => debug!("No source-language candidates for {:?}", video_path),
            Err(e) => debug!("Source-language search failed: {e}"),
        }

        // Case D: Whisper fall-through.
        self.enqueue_whisper(video_path, source_language).await
    }

    /// Case D: submit a transcription job and report pending.
    async fn enqueue_whisper(&self, video_path: &Path, source_language: &str) -> TranslateOutcome {
        let enabled = self.settings.get_bool("whisper.enabled", false);
        let Some(whisper) = self.whisper.as_ref().filter(|_| enabled) else {
            return TranslateOutcome::Failed {
                error: "no subtitle source available and transcription disabled".to_string(),
            };
        };
        let file_path = video_path.to_string_lossy().to_string();
        match whisper.submit(&file_path, source_language).await {
            Ok(service_job_id) => {
                let job = match self.jobs.create(&file_path) {
                    Ok(job) => job,
                    Err(e) => {
                        return TranslateOutcome::Failed {
                            error: format!("failed to record whisper job: {e}"),
                        }
                    }
                };
                // The whisper worker finds the service id in the job stats.
                let stats = serde_json::json!({
                    "whisper_job_id": service_job_id,
                    "source_language": source_language,
                });
                if let Err(e) = self.jobs.attach_stats(&job.id, &stats) {
                    warn!("Failed to attach whisper metadata to job {}: {e}", job.id);
                }
                info!("Whisper job {} enqueued for {:?}", job.id, video_path);
                TranslateOutcome::WhisperPending { job_id: job.id }
            }
            Err(e) => TranslateOutcome::Failed {
                error: format!("whisper submit failed: {e}"),
            },
        }
    }

    /// Translate an already-downloaded subtitle payload into the target
    /// language, preserving ASS when the source was ASS. Used by the wanted
    /// pipeline for its provider-translate steps.
    pub async fn translate_downloaded(
        &self,
        content: &str,
        format: SubtitleFormat,
        video_path: &Path,
        target_language: &str,
        context: Option<&LibraryItem>,
    ) -> TranslateOutcome {
        let profile = self.resolve_profile(context);
        let glossary = self.glossary_for(context);
        let result = if format == SubtitleFormat::Ass {
            self.translate_ass_content(
                content,
                video_path,
                target_language,
                &profile.source_language,
                &profile.fallback_chain,
                &glossary,
                "provider_source_ass",
            )
            .await
        } else {
            self.translate_srt_content(
                content,
                video_path,
                target_language,
                &profile.source_language,
                &profile.fallback_chain,
                &glossary,
                "provider_source_srt",
            )
            .await
        };
        match result {
            Ok(outcome) => outcome,
            Err(e) => TranslateOutcome::Failed { error: e },
        }
    }

    /// C2b re-entry: translate a finished transcription (or any SRT file).
    pub async fn translate_srt_file(
        &self,
        video_path: &Path,
        srt_path: &Path,
        target_language: &str,
        context: Option<&LibraryItem>,
    ) -> TranslateOutcome {
        let profile = self.resolve_profile(context);
        let glossary = self.glossary_for(context);
        let content = match std::fs::read_to_string(srt_path) {
            Ok(content) => content,
            Err(e) => {
                return TranslateOutcome::Failed {
                    error: format!("cannot read {srt_path:?}: {e}"),
                }
            }
        };
        match self
            .translate_srt_content(
                &content,
                video_path,
                target_language,
                &profile.source_language,
                &profile.fallback_chain,
                &glossary,
                "external_srt",
            )
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => TranslateOutcome::Failed { error: e },
        }
    }

    // ------------------------------------------------------------------
    // ASS translation
    // ------------------------------------------------------------------

    async fn extract_and_translate_ass(
        &self,
        video_path: &Path,
        probe: &ProbeData,
        sub_index: usize,
        target_language: &str,
        source_language: &str,
        chain: &[String],
        glossary: &[GlossaryEntry],
    ) -> Result<(PathBuf, Option<String>, Vec<String>), String> {
        let choice = select_best_subtitle_stream(
            probe,
            source_language,
            target_language,
            Some(SubtitleFormat::Ass),
        )
        .filter(|c| c.sub_index == sub_index)
        .ok_or_else(|| "stream vanished between probe and extraction".to_string())?;

        // Tempfile discipline: the guard deletes the extraction on all exit
        // paths.
        let temp = tempfile::Builder::new()
            .suffix(".ass")
            .tempfile()
            .map_err(|e| e.to_string())?;
        extract_subtitle_stream(video_path, &choice, temp.path())
            .await
            .map_err(|e| e.to_string())?;
        let content = std::fs::read_to_string(temp.path()).map_err(|e| e.to_string())?;

        match self
            .translate_ass_content(
                &content,
                video_path,
                target_language,
                source_language,
                chain,
                glossary,
                "embedded_ass",
            )
            .await?
        {
            TranslateOutcome::Success {
                output_path,
                backend,
                warnings,
                ..
            } => Ok((PathBuf::from(output_path), backend, warnings)),
            other => Err(format!("unexpected translation outcome: {other:?}")),
        }
    }

    async fn extract_srt_stream(
        &self,
        video_path: &Path,
        sub_index: usize,
    ) -> Result<String, String> {
        let temp = tempfile::Builder::new()
            .suffix(".srt")
            .tempfile()
            .map_err(|e| e.to_string())?;
        let choice = crate::subtitles::StreamChoice {
            sub_index,
            stream_index: 0,
            format: SubtitleFormat::Srt,
            language: String::new(),
            title: String::new(),
        };
        extract_subtitle_stream(video_path, &choice, temp.path())
            .await
            .map_err(|e| e.to_string())?;
        std::fs::read_to_string(temp.path()).map_err(|e| e.to_string())
    }

    /// Translate ASS content and write the target sidecar.
    #[allow(clippy::too_many_arguments)]
    async fn translate_ass_content(
        &self,
        content: &str,
        video_path: &Path,
        target_language: &str,
        source_language: &str,
        chain: &[String],
        glossary: &[GlossaryEntry],
        case: &str,
    ) -> Result<TranslateOutcome, String> {
        let job = self
            .jobs
            .create(&video_path.to_string_lossy())
            .map_err(|e| e.to_string())?;
        let _ = self.jobs.mark_running(&job.id);

        let mut file = AssFile::parse(content).map_err(|e| {
            let _ = self.jobs.mark_failed(&job.id, &e.to_string());
            e.to_string()
        })?;
        let classes = classify_styles(&file);

        // Collect dialog events: strip tags, optionally strip HI markers.
        let mut dialog_indices = Vec::new();
        let mut clean_lines = Vec::new();
        let mut tag_spans = Vec::new();
        for (i, event) in file.events.iter().enumerate() {
            if event.is_comment() {
                continue;
            }
            if classes.get(&event.style) != Some(&StyleClass::Dialog) {
                continue;
            }
            let (mut clean, spans) = extract_tags(&event.text);
            if self.hi_removal_enabled() {
                clean = strip_hi_markers(&clean.replace("\\N", "\n")).replace('\n', "\\N");
            }
            dialog_indices.push(i);
            clean_lines.push(clean.replace("\\N", "\n"));
            tag_spans.push(spans);
        }

        let translated = self
            .translate_lines_validated(&clean_lines, source_language, target_language, chain, glossary)
            .await
            .map_err(|e| {
                let _ = self.jobs.mark_failed(&job.id, &e);
                e
            })?;

        // Restore tags and line breaks into each translated event.
        for ((index, spans), (source, output)) in dialog_indices
            .iter()
            .zip(tag_spans.iter())
            .zip(clean_lines.iter().zip(translated.lines_out.split('\u{1}')))
        {
            let restored = restore_tags(output, spans, source.chars().count());
            file.events[*index].text = fix_line_breaks(&restored);
        }

        let title = file.title().unwrap_or("").to_string();
        file.set_title(&format!("[{}] {}", target_language.to_uppercase(), title));

        let output_path = sidecar_path(video_path, target_language, false, SubtitleFormat::Ass);
        self.write_output(&output_path, file.render().as_bytes(), &translated.report)
            .map_err(|e| {
                let _ = self.jobs.mark_failed(&job.id, &e);
                e
            })?;

        self.finish_job(&job.id, &output_path, &translated, chain, target_language, glossary);
        Ok(TranslateOutcome::Success {
            output_path: output_path.to_string_lossy().to_string(),
            case: case.to_string(),
            backend: translated.backend,
            warnings: translated.warnings,
        })
    }

    // ------------------------------------------------------------------
    // SRT translation
    // ------------------------------------------------------------------

    /// Translate SRT content and write the target sidecar.
    #[allow(clippy::too_many_arguments)]
    async fn translate_srt_content(
        &self,
        content: &str,
        video_path: &Path,
        target_language: &str,
        source_language: &str,
        chain: &[String],
        glossary: &[GlossaryEntry],
        case: &str,
    ) -> Result<TranslateOutcome, String> {
        let job = self
            .jobs
            .create(&video_path.to_string_lossy())
            .map_err(|e| e.to_string())?;
        let _ = self.jobs.mark_running(&job.id);

        let mut entries = SrtEntry::parse(content).map_err(|e| {
            let _ = self.jobs.mark_failed(&job.id, &e.to_string());
            e.to_string()
        })?;

        let mut lines = Vec::with_capacity(entries.len());
        for entry in &entries {
            let mut text = strip_inline_markup(&entry.text);
            if self.hi_removal_enabled() {
                text = strip_hi_markers(&text);
            }
            lines.push(text);
        }

        let translated = self
            .translate_lines_validated(&lines, source_language, target_language, chain, glossary)
            .await
            .map_err(|e| {
                let _ = self.jobs.mark_failed(&job.id, &e);
                e
            })?;

        for (entry, output) in entries.iter_mut().zip(translated.lines_out.split('\u{1}')) {
            entry.text = output.trim().to_string();
        }
        // Empty cues after HI-removal carry no dialogue.
        entries.retain(|e| !e.text.is_empty());

        let output_path = sidecar_path(video_path, target_language, false, SubtitleFormat::Srt);
        self.write_output(
            &output_path,
            SrtEntry::render(&entries).as_bytes(),
            &translated.report,
        )
        .map_err(|e| {
            let _ = self.jobs.mark_failed(&job.id, &e);
            e
        })?;

        self.finish_job(&job.id, &output_path, &translated, chain, target_language, glossary);
        Ok(TranslateOutcome::Success {
            output_path: output_path.to_string_lossy().to_string(),
            case: case.to_string(),
            backend: translated.backend,
            warnings: translated.warnings,
        })
    }

    // ------------------------------------------------------------------
    // Shared translation plumbing
    // ------------------------------------------------------------------

    /// Translate lines through the chain with structural validation.
    ///
    /// Validation failures retry up to two times; the last attempt is
    /// accepted with its problems downgraded to warnings.
    async fn translate_lines_validated(
        &self,
        lines: &[String],
        source_language: &str,
        target_language: &str,
        chain: &[String],
        glossary: &[GlossaryEntry],
    ) -> Result<TranslatedText, String> {
        let mut warnings = Vec::new();
        let mut last: Option<Vec<String>> = None;
        let mut backend = None;

        for attempt in 0..3 {
            let result = self
                .translation
                .translate_with_fallback(lines, source_language, target_language, chain, glossary)
                .await;
            if !result.success {
                return Err(result.error.unwrap_or_else(|| "translation failed".to_string()));
            }
            backend = result.backend_used.clone();
            let outcome = validate_translation_output(lines, &result.lines);
            match outcome {
                crate::subtitles::ValidationOutcome::Ok => {
                    last = Some(result.lines);
                    break;
                }
                crate::subtitles::ValidationOutcome::Failed(problems) => {
                    warn!(
                        "Translation validation failed (attempt {}): {:?}",
                        attempt + 1,
                        problems
                    );
                    last = Some(result.lines);
                    if attempt == 2 {
                        for problem in problems {
                            warnings.push(format!("validation: {problem}"));
                        }
                    }
                }
            }
        }

        let translated_lines = last.ok_or_else(|| "translation produced nothing".to_string())?;
        let report = check_translation_quality(lines, &translated_lines, source_language);
        warnings.extend(report.warnings.clone());

        Ok(TranslatedText {
            // Join with a control char so multi-line cues survive the round
            // trip back to per-event strings.
            lines_out: translated_lines.join("\u{1}"),
            backend,
            warnings,
            report,
        })
    }

    fn write_output(
        &self,
        output_path: &Path,
        bytes: &[u8],
        report: &QualityReport,
    ) -> Result<(), String> {
        if let Some(parent) = output_path.parent() {
            check_disk_space(parent).map_err(|e| e.to_string())?;
        }
        atomic_write(output_path, bytes).map_err(|e| e.to_string())?;
        let sidecar = quality_sidecar_path(output_path);
        if let Ok(json) = serde_json::to_vec_pretty(report) {
            let _ = std::fs::write(sidecar, json);
        }
        Ok(())
    }

    fn finish_job(
        &self,
        job_id: &str,
        output_path: &Path,
        translated: &TranslatedText,
        chain: &[String],
        target_language: &str,
        glossary: &[GlossaryEntry],
    ) {
        let hash = self.translation.config_hash(chain, target_language, glossary);
        let stats = serde_json::json!({
            "backend": translated.backend,
            "warnings": translated.warnings,
            "identical_ratio": translated.report.identical_ratio,
        });
        if let Err(e) = self.jobs.mark_completed(
            job_id,
            &output_path.to_string_lossy(),
            Some(&stats),
            &hash,
        ) {
            warn!("Failed to complete job {job_id}: {e}");
        }
    }

    fn remove_replaced_srt(&self, srt_path: &Path) {
        if let Err(e) = std::fs::remove_file(srt_path) {
            warn!("Failed to remove replaced SRT {:?}: {e}", srt_path);
        } else {
            info!("Removed replaced SRT {:?}", srt_path);
        }
        let sidecar = quality_sidecar_path(srt_path);
        if sidecar.exists() {
            let _ = std::fs::remove_file(sidecar);
        }
    }

    fn record_upgrade(
        &self,
        video_path: &Path,
        old_format: &str,
        new_format: &str,
        new_score: i32,
        reason: &str,
    ) {
        if let Err(e) = self.history.record_upgrade(
            &video_path.to_string_lossy(),
            old_format,
            0,
            new_format,
            new_score,
            reason,
        ) {
            warn!("Failed to record upgrade history: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{ProviderRegistry, SubtitleCandidate};
    use crate::store::{SqliteProviderStore, SqliteSettingsStore};
    use crate::testing::MockProvider;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        video: PathBuf,
        translator: Translator,
        settings: Arc<SqliteSettingsStore>,
        translation: Arc<TranslationManager>,
        jobs: Arc<SqliteJobStore>,
    }

    fn fixture_with_providers(providers: Vec<MockProvider>) -> Fixture {
        let dir = TempDir::new().unwrap();
        let video = dir.path().join("Show.S01E01.mkv");
        std::fs::write(&video, "not really a video").unwrap();

        let settings = Arc::new(SqliteSettingsStore::in_memory().unwrap());
        let settings_dyn: Arc<dyn SettingsStore> = Arc::clone(&settings) as _;
        let provider_store = Arc::new(SqliteProviderStore::in_memory().unwrap());
        let mut registry = ProviderRegistry::new(provider_store, Arc::clone(&settings_dyn));
        for provider in providers {
            registry.register(Arc::new(provider));
        }
        let history = Arc::new(SqliteHistoryStore::in_memory().unwrap());
        let manager = Arc::new(ProviderManager::new(
            Arc::new(registry),
            Arc::clone(&history),
            Arc::clone(&settings_dyn),
        ));
        let translation = Arc::new(TranslationManager::new(
            Arc::new(SqliteTranslationStore::in_memory().unwrap()),
            Arc::clone(&settings_dyn),
        ));
        let jobs = Arc::new(SqliteJobStore::in_memory().unwrap());
        let translator = Translator::new(
            manager,
            Arc::clone(&translation),
            Arc::clone(&jobs),
            history,
            settings_dyn,
        );
        Fixture {
            _dir: dir,
            video,
            translator,
            settings,
            translation,
            jobs,
        }
    }

    /// Seed the translation memory so the chain succeeds without any live
    /// backend.
    fn seed_memory(fixture: &Fixture, pairs: &[(&str, &str)]) {
        for (source, target) in pairs {
            fixture.translation.memory().store("en", "de", source, target);
        }
    }

    #[tokio::test]
    async fn test_case_a_existing_ass_skips() {
        let fixture = fixture_with_providers(vec![]);
        let target = fixture._dir.path().join("Show.S01E01.de.ass");
        std::fs::write(&target, "[Script Info]\nTitle: x\n").unwrap();

        let outcome = fixture
            .translator
            .translate_file(&fixture.video, "de", None)
            .await;
        match outcome {
            TranslateOutcome::Skipped { reason, output_path } => {
                assert!(reason.contains("already present"));
                assert!(output_path.unwrap().ends_with("Show.S01E01.de.ass"));
            }
            other => panic!("expected skip, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_case_c2b_external_srt_translated_via_memory() {
        let fixture = fixture_with_providers(vec![]);
        let srt = fixture._dir.path().join("Show.S01E01.en.srt");
        std::fs::write(
            &srt,
            "1\n00:00:01,000 --> 00:00:02,000\nHello\n\n2\n00:00:03,000 --> 00:00:04,000\nGoodbye\n",
        )
        .unwrap();
        seed_memory(&fixture, &[("Hello", "Hallo"), ("Goodbye", "Tschuess")]);

        let outcome = fixture
            .translator
            .translate_file(&fixture.video, "de", None)
            .await;
        match &outcome {
            TranslateOutcome::Success { output_path, case, .. } => {
                assert_eq!(case, "external_srt");
                assert!(output_path.ends_with("Show.S01E01.de.srt"));
                let written = std::fs::read_to_string(output_path).unwrap();
                assert!(written.contains("Hallo"));
                assert!(written.contains("Tschuess"));
                // Quality sidecar written next to the output.
                assert!(quality_sidecar_path(Path::new(output_path)).exists());
            }
            other => panic!("expected success, got {other:?}"),
        }

        // A completed job with a config hash was recorded.
        let jobs = fixture.jobs.list(None, 10, 0).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].status, crate::store::JobStatus::Completed);
        assert!(jobs[0].config_hash.is_some());
    }

    #[tokio::test]
    async fn test_case_b1_provider_ass_upgrade_removes_srt() {
        let payload = b"[Script Info]\nTitle: DL\n\n[V4+ Styles]\nFormat: Name, Fontname, Fontsize\nStyle: Default,Arial,48\n\n[Events]\nFormat: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text\nDialogue: 0,0:00:01.00,0:00:02.00,Default,,0,0,0,,Hallo\n".to_vec();
        let provider = MockProvider::new("ace")
            .with_candidate("1", "de", SubtitleFormat::Ass, &["series", "season", "episode"])
            .with_payload(payload);
        let fixture = fixture_with_providers(vec![provider]);

        let old_srt = fixture._dir.path().join("Show.S01E01.de.srt");
        std::fs::write(&old_srt, "1\n00:00:01,000 --> 00:00:02,000\nalt\n").unwrap();

        let outcome = fixture
            .translator
            .translate_file(&fixture.video, "de", None)
            .await;
        match &outcome {
            TranslateOutcome::Success { output_path, case, .. } => {
                assert_eq!(case, "upgrade_provider_ass");
                assert!(output_path.ends_with("Show.S01E01.de.ass"));
                assert!(!old_srt.exists(), "old SRT should be removed");
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_case_b3_keeps_srt_when_no_upgrade() {
        let fixture = fixture_with_providers(vec![]);
        let old_srt = fixture._dir.path().join("Show.S01E01.de.srt");
        std::fs::write(&old_srt, "1\n00:00:01,000 --> 00:00:02,000\nalt\n").unwrap();

        let outcome = fixture
            .translator
            .translate_file(&fixture.video, "de", None)
            .await;
        match outcome {
            TranslateOutcome::Skipped { reason, .. } => {
                assert!(reason.contains("keeping SRT"));
                assert!(old_srt.exists());
            }
            other => panic!("expected skip, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_case_d_disabled_whisper_fails() {
        let fixture = fixture_with_providers(vec![]);
        let outcome = fixture
            .translator
            .translate_file(&fixture.video, "de", None)
            .await;
        match outcome {
            TranslateOutcome::Failed { error } => {
                assert!(error.contains("transcription disabled"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_forced_sidecar_not_treated_as_target() {
        let fixture = fixture_with_providers(vec![]);
        // A forced sidecar must not satisfy the full-subtitle check.
        let forced = fixture._dir.path().join("Show.S01E01.de.forced.ass");
        std::fs::write(&forced, "[Script Info]\n").unwrap();

        let outcome = fixture
            .translator
            .translate_file(&fixture.video, "de", None)
            .await;
        assert!(matches!(outcome, TranslateOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn test_translate_srt_file_reentry() {
        let fixture = fixture_with_providers(vec![]);
        let srt = fixture._dir.path().join("transcribed.srt");
        std::fs::write(&srt, "1\n00:00:01,000 --> 00:00:02,000\nHello\n").unwrap();
        seed_memory(&fixture, &[("Hello", "Hallo")]);

        let outcome = fixture
            .translator
            .translate_srt_file(&fixture.video, &srt, "de", None)
            .await;
        assert!(outcome.is_success());
        assert!(outcome.output_path().unwrap().ends_with("Show.S01E01.de.srt"));
    }

    #[tokio::test]
    async fn test_profile_settings_defaults_used() {
        let fixture = fixture_with_providers(vec![]);
        fixture
            .settings
            .set("translation.source_language", "ja")
            .unwrap();
        let profile = fixture.translator.resolve_profile(None);
        assert_eq!(profile.source_language, "ja");
        assert_eq!(profile.fallback_chain, vec!["ollama".to_string()]);
    }
}
