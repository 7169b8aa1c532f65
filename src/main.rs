// LLM Chat API - Rust backend

use axum::Router;
use std::fmt::Write as FmtWrite;
use std::fs::OpenOptions;
use std::io::LineWriter;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Custom time formatter: [HH:mm:ss] [server]
#[derive(Clone)]
struct ServerTimer;

impl FormatTime for ServerTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = chrono::Utc::now();
        write!(w, "[{}] [server]", now.format("%H:%M:%S"))
    }
}

mod config;
mod error;
mod llm;
mod models;
mod routes;
mod services;
mod streaming;

use config::Config;
use llm::{CompletionBackend, LlmClient};
use routes::{chats_routes, health_routes, messages_routes};
use services::ChatStore;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: ChatStore,
    pub llm: Arc<dyn CompletionBackend>,
    pub config: Arc<Config>,
}

#[tokio::main]
async fn main() {
    // Log to stdout and a file; LineWriter flushes after each line so
    // entries appear immediately
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open("/tmp/chat-backend.log")
        .expect("Failed to open log file");
    let line_writer = LineWriter::new(log_file);
    let (non_blocking, _guard) = tracing_appender::non_blocking(line_writer);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chat_reply_backend=info,tower_http=info".into()),
        )
        // Stdout layer
        .with(
            fmt::layer()
                .with_timer(ServerTimer)
                .with_target(false)
                .with_level(false)
                .with_ansi(true),
        )
        // File layer (same format, no ANSI colors)
        .with(
            fmt::layer()
                .with_timer(ServerTimer)
                .with_target(false)
                .with_level(false)
                .with_ansi(false)
                .with_writer(non_blocking),
        )
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    // Load and validate config
    let config = Config::from_env();
    if let Err(e) = config.validate() {
        tracing::error!("Configuration error: {}", e);
    }

    // Open the database and ensure the schema exists
    let store = match ChatStore::connect(&config.database_url).await {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("Failed to open database {}: {}", config.database_url, e);
            std::process::exit(1);
        }
    };

    // The generation client is constructed once and shared across requests
    let llm: Arc<dyn CompletionBackend> = Arc::new(LlmClient::new(
        config.openai_api_key.clone().unwrap_or_default(),
        config.openai_base_url.clone(),
        config.llm_model.clone(),
    ));

    let state = AppState {
        store,
        llm,
        config: Arc::new(config.clone()),
    };

    // Build CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(health_routes())
        .merge(chats_routes())
        .merge(messages_routes())
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting chat backend on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
