use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use retina_core::secrets::SecretBox;
use retina_db::repositories::SessionRepo;
use retina_db::DbPool;
use retina_events::{EmailConfig, LogMailer, OtpMailer, SmtpMailer};
use retina_inference::{InferenceAdapter, ModelConfig, SuggestionClient};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use retina_api::config::ServerConfig;
use retina_api::router::build_app_router;
use retina_api::state::AppState;

const SESSION_CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = config.port, "Configuration loaded");

    let pool = connect_database().await;

    let state = AppState {
        pool: pool.clone(),
        config: Arc::new(config.clone()),
        mailer: otp_mailer(),
        classifier: classifier(),
        secrets: SecretBox::new(&config.secret_key),
        suggestions: SuggestionClient::default(),
    };
    let cleanup = spawn_session_cleanup(pool);

    let addr = SocketAddr::new(
        config.host.parse().expect("HOST must be an IP address"),
        config.port,
    );
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .unwrap_or_else(|e| panic!("Failed to bind {addr}: {e}"));
    tracing::info!(%addr, "Listening");

    let draining = Arc::new(Notify::new());
    let signalled = draining.clone();
    let server = axum::serve(listener, build_app_router(state, &config))
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            signalled.notify_one();
        })
        .into_future();
    let grace = Duration::from_secs(config.shutdown_timeout_secs);

    tokio::select! {
        result = server => result.expect("Server error"),
        _ = async {
            draining.notified().await;
            tokio::time::sleep(grace).await;
        } => tracing::warn!(?grace, "In-flight requests did not finish in time"),
    }

    cleanup.abort();
    tracing::info!("Shut down");
}

/// `RUST_LOG` filtering; `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "retina_api=debug,tower_http=debug".into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Connect, ping and migrate. Any failure aborts startup.
async fn connect_database() -> DbPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = retina_db::create_pool(&url)
        .await
        .expect("Failed to connect to database");
    retina_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    retina_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database ready");
    pool
}

fn otp_mailer() -> Arc<dyn OtpMailer> {
    let Some(email) = EmailConfig::from_env() else {
        tracing::warn!("SMTP_HOST not set, one-time codes will be written to the log");
        return Arc::new(LogMailer);
    };
    tracing::info!(host = %email.smtp_host, "SMTP mailer configured");
    Arc::new(SmtpMailer::new(email).expect("Invalid SMTP configuration"))
}

fn classifier() -> Option<InferenceAdapter> {
    let Some(model) = ModelConfig::from_env() else {
        tracing::warn!("MODEL_ENDPOINT not set, analysis endpoints will answer 503");
        return None;
    };
    tracing::info!(
        endpoint = %model.endpoint,
        model = %model.model_name,
        input_size = model.input_size,
        "Classifier configured"
    );
    Some(InferenceAdapter::serving(&model))
}

/// Hourly purge of expired and revoked refresh sessions.
fn spawn_session_cleanup(pool: DbPool) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SESSION_CLEANUP_INTERVAL);
        loop {
            ticker.tick().await;
            match SessionRepo::purge_stale(&pool).await {
                Ok(removed) => tracing::debug!(removed, "Expired sessions purged"),
                Err(e) => tracing::warn!(error = %e, "Session cleanup failed"),
            }
        }
    })
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl-C handler failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Ctrl-C received, draining"),
        _ = terminate => tracing::info!("SIGTERM received, draining"),
    }
}
