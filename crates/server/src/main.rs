mod api;
mod metrics;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sublarr_core::{
    load_config, validate_config, BatchTracker, EmbeddedProvider, InMemoryJobQueue, JobQueue,
    LegendasDivxProvider, LibraryManager, MediaServer, PlexClient, PodnapisiProvider,
    ProviderManager, ProviderRegistry, RadarrClient, Scanner, SettingsStore, SonarrClient,
    TitrariProvider,
    SqliteHistoryStore, SqliteJobStore, SqliteProviderStore, SqliteSettingsStore,
    SqliteTranslationStore, SqliteWantedStore, SqliteWatchedFolderStore, SqliteWorkQueue,
    TranslationManager, Translator, TrashManager, WantedPipeline, WhisperClient, WhisperWorker,
    WorkExecutor, WorkItem,
};

use api::{create_router, WsBroadcaster};
use state::AppState;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging (SUBLARR_LOG overrides the config file level).
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env("SUBLARR_LOG")
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("SUBLARR_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {config_path:?}"))?;
    validate_config(&config).context("Configuration validation failed")?;

    info!("Media root: {:?}", config.media.root);
    info!("Database path: {:?}", config.database.path);

    // The media root must be writable before anything else starts.
    let probe = config.media.root.join(".sublarr_write_check");
    std::fs::write(&probe, b"ok")
        .and_then(|_| std::fs::remove_file(&probe))
        .with_context(|| format!("Media root {:?} is not writable", config.media.root))?;

    // Open the stores (exit non-zero if the database cannot be opened).
    let db_path = &config.database.path;
    let settings: Arc<dyn SettingsStore> = Arc::new(
        SqliteSettingsStore::new(db_path).context("Failed to open settings store")?,
    );
    let wanted_store =
        Arc::new(SqliteWantedStore::new(db_path).context("Failed to open wanted store")?);
    let job_store = Arc::new(SqliteJobStore::new(db_path).context("Failed to open job store")?);
    let provider_store =
        Arc::new(SqliteProviderStore::new(db_path).context("Failed to open provider store")?);
    let translation_store = Arc::new(
        SqliteTranslationStore::new(db_path).context("Failed to open translation store")?,
    );
    let history_store =
        Arc::new(SqliteHistoryStore::new(db_path).context("Failed to open history store")?);
    let watched_store = Arc::new(
        SqliteWatchedFolderStore::new(db_path).context("Failed to open watched folder store")?,
    );
    info!("Stores initialized");

    // A default language profile always exists.
    translation_store
        .ensure_default_profile(
            &settings.get_string("translation.source_language", "en"),
            &[settings.get_string("translation.target_language", "de")],
            &[settings.get_string("translation.backend", "ollama")],
        )
        .context("Failed to ensure default profile")?;

    // Register providers explicitly; no import-time side effects.
    let mut registry = ProviderRegistry::new(Arc::clone(&provider_store), Arc::clone(&settings));
    registry.register(Arc::new(PodnapisiProvider::new()));
    registry.register(Arc::new(LegendasDivxProvider::new()));
    registry.register(Arc::new(TitrariProvider::new()));
    registry.register(Arc::new(EmbeddedProvider::new()));
    registry.initialize_all().await;
    let registry = Arc::new(registry);
    info!("Provider registry initialized ({:?})", registry.names());

    let provider_manager = Arc::new(ProviderManager::new(
        Arc::clone(&registry),
        Arc::clone(&history_store),
        Arc::clone(&settings),
    ));
    let translation_manager = Arc::new(TranslationManager::new(
        Arc::clone(&translation_store),
        Arc::clone(&settings),
    ));

    // Whisper is optional; requires a service URL in settings.
    let whisper_url = settings.get_string("whisper.url", "");
    let whisper = (!whisper_url.is_empty()).then(|| Arc::new(WhisperClient::new(whisper_url)));

    let mut translator = Translator::new(
        Arc::clone(&provider_manager),
        Arc::clone(&translation_manager),
        Arc::clone(&job_store),
        Arc::clone(&history_store),
        Arc::clone(&settings),
    );
    if let Some(whisper) = &whisper {
        translator = translator.with_whisper(Arc::clone(whisper));
    }
    let translator = Arc::new(translator);

    // Library managers from settings.
    let mut libraries: Vec<Arc<dyn LibraryManager>> = Vec::new();
    let sonarr_url = settings.get_string("sonarr.url", "");
    if !sonarr_url.is_empty() {
        info!("Sonarr configured at {sonarr_url}");
        libraries.push(Arc::new(SonarrClient::new(
            sonarr_url,
            settings.get_string("sonarr.api_key", ""),
        )));
    }
    let radarr_url = settings.get_string("radarr.url", "");
    if !radarr_url.is_empty() {
        info!("Radarr configured at {radarr_url}");
        libraries.push(Arc::new(RadarrClient::new(
            radarr_url,
            settings.get_string("radarr.api_key", ""),
        )));
    }

    // Media servers from settings.
    let mut media_servers: Vec<Arc<dyn MediaServer>> = Vec::new();
    let plex_url = settings.get_string("plex.url", "");
    if !plex_url.is_empty() {
        media_servers.push(Arc::new(PlexClient::new(
            plex_url,
            settings.get_string("plex.token", ""),
        )));
    }
    let kodi_url = settings.get_string("kodi.url", "");
    if !kodi_url.is_empty() {
        media_servers.push(Arc::new(sublarr_core::KodiClient::new(kodi_url)));
    }

    let pipeline = Arc::new(
        WantedPipeline::new(
            Arc::clone(&wanted_store),
            Arc::clone(&provider_manager),
            Arc::clone(&translator),
            Arc::clone(&history_store),
            Arc::clone(&settings),
        )
        .with_libraries(libraries.clone()),
    );

    // WebSocket broadcaster; the scanner forwards its events through it.
    let ws_broadcaster = WsBroadcaster::default();
    let event_broadcaster = ws_broadcaster.clone();
    let scanner = Arc::new(
        Scanner::new(
            Arc::clone(&wanted_store),
            Arc::clone(&translation_store),
            Arc::clone(&watched_store),
            Arc::clone(&history_store),
            Arc::clone(&pipeline),
            libraries.clone(),
            Arc::clone(&settings),
        )
        .with_events(Arc::new(move |event| {
            event_broadcaster.forward_scanner_event(event);
        })),
    );
    scanner.start();
    info!("Scanner started");

    // Background work queue: the executor routes items into the pipeline
    // and translator.
    let executor: WorkExecutor = {
        let pipeline = Arc::clone(&pipeline);
        let translator = Arc::clone(&translator);
        Arc::new(move |item: WorkItem| {
            let pipeline = Arc::clone(&pipeline);
            let translator = Arc::clone(&translator);
            Box::pin(async move {
                match item {
                    WorkItem::WantedSearch { item_id, force } => {
                        pipeline.process_item(item_id, force).await;
                        Ok(())
                    }
                    WorkItem::WantedBatch { item_ids, .. } => {
                        for item_id in item_ids {
                            pipeline.process_item(item_id, false).await;
                        }
                        Ok(())
                    }
                    WorkItem::TranslateFile {
                        file_path,
                        target_language,
                    } => {
                        translator
                            .translate_file(
                                std::path::Path::new(&file_path),
                                &target_language,
                                None,
                            )
                            .await;
                        Ok(())
                    }
                    WorkItem::WebhookScan { .. } => Ok(()),
                }
            })
        })
    };

    let queue: Option<Arc<dyn JobQueue>> =
        match settings.get_string("queue.backend", "memory").as_str() {
            "durable" => {
                let queue = SqliteWorkQueue::new(db_path).context("Failed to open work queue")?;
                queue.start(Arc::clone(&executor), Duration::from_secs(2));
                info!("Durable work queue started");
                Some(Arc::new(queue))
            }
            "none" => None,
            _ => {
                let workers = settings.get_i64("queue.workers", 2) as usize;
                info!("In-memory work queue started");
                Some(Arc::new(InMemoryJobQueue::new(workers, 256, executor)))
            }
        };

    // Whisper completion worker.
    let whisper_worker = whisper.as_ref().map(|whisper| {
        let worker = Arc::new(WhisperWorker::new(
            Arc::clone(&job_store),
            Arc::clone(&wanted_store),
            Arc::clone(&translator),
            Arc::clone(whisper),
            Arc::clone(&settings),
        ));
        worker.start();
        worker
    });

    // Trash retention sweep, daily.
    let trash = Arc::new(TrashManager::new(&config.media.root));
    {
        let trash = Arc::clone(&trash);
        let settings_sweep = Arc::clone(&settings);
        tokio::spawn(async move {
            loop {
                let retention = settings_sweep.get_i64("trash.retention_days", 30);
                if let Err(e) = trash.purge_expired(retention) {
                    warn!("Trash retention sweep failed: {e}");
                }
                tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
            }
        });
    }

    // Create app state and router.
    let state = Arc::new(AppState::new(
        config.clone(),
        Arc::clone(&settings),
        wanted_store,
        job_store,
        translation_store,
        history_store,
        watched_store,
        provider_manager,
        translation_manager,
        translator,
        pipeline,
        Arc::clone(&scanner),
        queue.clone(),
        Arc::new(BatchTracker::new()),
        Arc::clone(&trash),
        libraries,
        media_servers,
        whisper,
        ws_broadcaster,
    ));
    let app = create_router(state);

    // Start server.
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {addr}");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Teardown in dependency order.
    info!("Server shutting down...");
    scanner.stop();
    if let Some(worker) = whisper_worker {
        worker.stop();
    }
    if let Some(queue) = queue {
        queue.shutdown().await;
    }
    registry.terminate_all().await;
    info!("Shutdown complete");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
