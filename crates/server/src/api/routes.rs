use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;

use super::{
    api_keys, config, health, integrations, library, middleware::auth_middleware, profiles,
    providers, system, tools, translate, wanted, webhooks, ws,
};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(health::health))
        .route("/config", get(config::get_config))
        .route("/config", put(config::put_config))
        // Translation
        .route("/translate", post(translate::translate_async))
        .route("/translate/sync", post(translate::translate_sync))
        .route("/status/{job_id}", get(translate::job_status))
        .route("/jobs", get(translate::list_jobs))
        .route("/jobs/{id}/retry", post(translate::retry_job))
        .route("/batch", post(translate::batch_translate))
        .route("/batch/status", get(translate::batch_status))
        .route("/retranslate/{id}", post(translate::retranslate_one))
        .route("/retranslate/batch", post(translate::retranslate_batch))
        .route("/retranslate/status", get(translate::retranslate_status))
        // Wanted
        .route("/wanted", get(wanted::list_wanted))
        .route("/wanted/summary", get(wanted::summary))
        .route("/wanted/refresh", post(wanted::refresh))
        .route("/wanted/batch-search", post(wanted::batch_search))
        .route("/wanted/batch-status", get(wanted::batch_status))
        .route("/wanted/search-all", post(wanted::search_all))
        .route("/wanted/{id}", delete(wanted::delete_item))
        .route("/wanted/{id}/search", post(wanted::search_item))
        .route("/wanted/{id}/download", post(wanted::download_candidate))
        .route("/wanted/{id}/process", post(wanted::process_item))
        .route("/wanted/{id}/ignore", post(wanted::ignore_item))
        // Providers
        .route("/providers", get(providers::list_providers))
        .route("/providers/stats", get(providers::provider_stats))
        .route("/providers/health", get(providers::provider_health))
        .route("/providers/search", post(providers::search))
        .route("/providers/test/{name}", post(providers::test_provider))
        .route("/providers/{name}/enable", post(providers::set_enabled))
        .route("/providers/cache/clear", post(providers::clear_cache))
        // Library
        .route("/library", get(library::list_library))
        .route("/library/history", get(library::download_history))
        .route(
            "/library/episodes/{id}/subtitles",
            get(library::episode_subtitles),
        )
        .route(
            "/library/series/{id}/subtitles",
            get(library::series_subtitles),
        )
        .route(
            "/library/series/{id}/subtitles/batch-delete",
            post(library::batch_delete_series_subtitles),
        )
        .route("/library/subtitles", delete(library::delete_subtitles))
        .route("/library/trash", get(library::list_trash))
        .route(
            "/library/trash/{batch_id}/restore",
            post(library::restore_trash),
        )
        .route("/library/trash/{batch_id}", delete(library::delete_trash))
        // Language profiles and glossary
        .route("/profiles", get(profiles::list_profiles))
        .route("/profiles", post(profiles::create_profile))
        .route("/profiles/{id}", put(profiles::update_profile))
        .route("/profiles/{id}", delete(profiles::delete_profile))
        .route("/profiles/{id}/assign", post(profiles::assign_profile))
        .route("/glossary", get(profiles::list_glossary))
        .route("/glossary", post(profiles::add_glossary))
        .route("/glossary/{id}", delete(profiles::delete_glossary))
        // API keys
        .route("/apikeys", get(api_keys::list_keys))
        .route("/apikeys", post(api_keys::create_key))
        .route("/apikeys/test", post(api_keys::test_key))
        .route("/apikeys/export", get(api_keys::export_keys))
        .route("/apikeys/import", post(api_keys::import_keys))
        .route("/apikeys/{name}", delete(api_keys::delete_key))
        // Webhooks
        .route("/webhook/sonarr", post(webhooks::sonarr))
        .route("/webhook/radarr", post(webhooks::radarr))
        .route(
            "/webhook/validate-callback",
            post(webhooks::validate_callback),
        )
        // Tools
        .route("/tools/remove-hi", post(tools::remove_hi))
        .route("/tools/adjust-timing", post(tools::adjust_timing))
        .route("/tools/common-fixes", post(tools::common_fixes))
        .route("/tools/preview", get(tools::preview))
        // Integrations
        .route(
            "/integrations/bazarr/mapping-report",
            post(integrations::bazarr_mapping_report),
        )
        .route(
            "/integrations/compat-check",
            post(integrations::compat_check_batch),
        )
        .route(
            "/integrations/compat-check/single",
            post(integrations::compat_check_single),
        )
        .route("/integrations/health/all", get(integrations::health_all))
        .route("/integrations/export", post(integrations::export_config))
        .route("/integrations/export/zip", post(integrations::export_zip))
        // Standalone mode
        .route("/standalone/folders", get(system::list_folders))
        .route("/standalone/folders", post(system::add_folder))
        .route("/standalone/folders/{id}", delete(system::remove_folder))
        .route("/standalone/scan", post(system::scan))
        // System
        .route("/system/export", get(system::export))
        // WebSocket
        .route("/ws", get(ws::ws_handler))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(system::metrics))
}
