//! Hearth Chat server binary.
//!
//! Serves the messaging REST API under `/api/chat`, the realtime gateway on
//! `/ws`, and stored attachments under `/uploads/chat-files`.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use hearth_chat::auth::JwtVerifier;
use hearth_chat::state::{AppState, ChatConfig, DEFAULT_PORT};
use hearth_core::messaging::attachment::MAX_ATTACHMENT_SIZE;
use hearth_core::{Database, MessageService};

// ── CLI Arguments ─────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "hearth-chat", version, about = "Hearth messaging server")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "PORT")]
    port: u16,

    /// SQLite database file, or ":memory:" for an ephemeral store
    #[arg(long, default_value = "hearth-chat.db", env = "DATABASE_PATH")]
    database: String,

    /// Root directory for uploads; attachments go to <dir>/chat-files
    #[arg(long, default_value = "uploads", env = "UPLOAD_DIR")]
    upload_dir: PathBuf,

    /// HS256 secret shared with the account service
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    jwt_secret: String,

    /// Attachment size ceiling in bytes
    #[arg(long, default_value_t = MAX_ATTACHMENT_SIZE, env = "MAX_UPLOAD_BYTES")]
    max_upload_bytes: usize,

    /// Allowed CORS origins (comma-separated). Any origin when empty.
    /// Example: https://hearth.example,https://admin.hearth.example
    #[arg(long, env = "CLIENT_ORIGINS", value_delimiter = ',')]
    client_origin: Vec<String>,

    /// Emit JSON log lines
    #[arg(long, default_value_t = false, env = "LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "hearth_chat=info,hearth_core=info,tower_http=info".into());
    if args.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let db_path = (args.database != ":memory:").then_some(args.database.as_str());
    let database = Database::open(db_path)
        .await
        .expect("Failed to open database");
    tracing::info!(path = args.database.as_str(), "Database ready");

    let config = ChatConfig {
        port: args.port,
        upload_dir: args.upload_dir,
        max_upload_bytes: args.max_upload_bytes,
        allowed_origins: args
            .client_origin
            .into_iter()
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect(),
    };

    tracing::info!(
        port = config.port,
        upload_dir = %config.upload_dir.display(),
        max_upload_bytes = config.max_upload_bytes,
        origins = config.allowed_origins.len(),
        "Configuration loaded"
    );

    let state = AppState::new(
        config,
        MessageService::new(Arc::new(database)),
        Arc::new(JwtVerifier::new(args.jwt_secret.as_bytes())),
    );

    let app = hearth_chat::router(state);

    let addr = format!("0.0.0.0:{}", args.port);
    tracing::info!("Hearth chat server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app).await.expect("Server error");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults() {
        let args = Args::try_parse_from(["hearth-chat", "--jwt-secret", "s"]).unwrap();
        assert_eq!(args.database, "hearth-chat.db");
        assert_eq!(args.max_upload_bytes, MAX_ATTACHMENT_SIZE);
        assert!(!args.log_json);
    }

    #[test]
    fn test_args_origins_split_on_comma() {
        let args = Args::try_parse_from([
            "hearth-chat",
            "--jwt-secret",
            "s",
            "--client-origin",
            "https://a.example,https://b.example",
        ])
        .unwrap();
        assert_eq!(args.client_origin, vec!["https://a.example", "https://b.example"]);
    }
}
