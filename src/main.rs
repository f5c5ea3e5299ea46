use std::sync::Arc;

use anyhow::Context;

use onboard_assist::config::{OracleConfig, ServerConfig, SessionConfig};
use onboard_assist::error::ConfigError;
use onboard_assist::llm::create_provider;
use onboard_assist::onboarding::{
    EventEmitter, LlmQuestionOracle, OnboardingRouteState, OnboardingSession, onboarding_routes,
};
use onboard_assist::store::{LibSqlSnapshotStore, SnapshotStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let oracle_config = match OracleConfig::from_env() {
        Ok(config) => config,
        Err(ConfigError::MissingEnvVar(var)) => {
            eprintln!("Error: {var} not set");
            eprintln!("  export ONBOARD_API_KEY=gsk_...");
            std::process::exit(1);
        }
        Err(e) => return Err(e).context("Invalid oracle configuration"),
    };
    let session_config = SessionConfig::from_env().context("Invalid session configuration")?;
    let server_config = ServerConfig::from_env().context("Invalid server configuration")?;

    eprintln!("🧭 Onboard Assist v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", oracle_config.model);
    eprintln!("   Oracle: {}", oracle_config.base_url);
    eprintln!("   API: http://0.0.0.0:{}/api/onboarding/state", server_config.port);

    let llm = create_provider(&oracle_config).context("Failed to create LLM provider")?;
    let oracle = Arc::new(LlmQuestionOracle::new(llm, oracle_config));

    // ── Database ─────────────────────────────────────────────────────────
    let store: Arc<dyn SnapshotStore> = Arc::new(
        LibSqlSnapshotStore::new_local(&server_config.db_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to open database at {}",
                    server_config.db_path.display()
                )
            })?,
    );
    eprintln!("   Database: {}", server_config.db_path.display());

    // ── Session ──────────────────────────────────────────────────────────
    let resume = session_config.resume_on_start;
    let mut session = OnboardingSession::new(oracle, store, EventEmitter::new(), session_config);
    if resume {
        let resumed = session.resume().await;
        eprintln!("   Session: {}", if resumed { "resumed" } else { "new" });
    } else {
        session.initialize().await;
        eprintln!("   Session: new");
    }

    let state = OnboardingRouteState::new(session);
    let app = onboarding_routes(state.clone());

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", server_config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", server_config.port))?;
    tracing::info!(port = server_config.port, "Onboarding server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("Server error")?;

    // Write any pending snapshot before exiting
    state.session.lock().await.flush().await;
    tracing::info!("Onboarding server stopped");

    Ok(())
}
