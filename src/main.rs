use std::sync::Arc;

use notes_app::{
    config,
    handlers::rest::{self, AppState},
    repository::{FsBlobStorage, PgRecordService},
    service::{Backends, NoteController},
};

#[tokio::main]
async fn main() {
    // Log setup
    tracing_subscriber::fmt::init();

    // Load config
    let cfg = config::load_config().unwrap_or_else(|e| {
        tracing::error!("Failed to load config: {e}");
        panic!("failed to locate or load config: {e}");
    });
    tracing::info!("Successfully loaded notes app config");

    // Record service creation and migration
    let mut records = PgRecordService::connect(&cfg.database_dsn)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Failed to establish database connection: {e}");
            panic!("failed to establish database connection: {e}");
        });

    records.migrate().await.unwrap_or_else(|e| {
        tracing::error!("Failed to migrate database: {e}");
        panic!("failed to migrate database: {e}");
    });

    // Blob storage creation
    let blobs = Arc::new(FsBlobStorage::new(
        cfg.blob_root.clone(),
        cfg.public_base_url.clone(),
        cfg.signing_secret.clone(),
        cfg.url_ttl,
    ));
    tracing::info!("Storing images under {}", blobs.root().display());

    // Controller creation and initial listing
    let controller = Arc::new(NoteController::new(Backends::new(
        Arc::new(records),
        blobs.clone(),
    )));

    match controller.list().await {
        Ok(notes) => tracing::info!("Loaded {} notes", notes.len()),
        Err(e) => tracing::error!("Initial note listing failed: {e}"),
    }

    // Router config
    let router = rest::router(
        AppState {
            notes: controller,
            blobs,
        },
        cfg.max_upload_bytes,
    );

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", cfg.port))
        .await
        .expect("Failed to bind to address");
    let addr = listener.local_addr().expect("Failed to read local address");

    tracing::info!("Notes app starting, listening on {}", addr);

    axum::serve(listener, router)
        .await
        .expect("failed to start server");
}
