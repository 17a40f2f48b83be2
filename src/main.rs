use std::sync::Arc;

use session_profile::config::SessionConfig;
use session_profile::error::Result;
use session_profile::onboarding::{OnboardingRouteState, OnboardingWorkflow, onboarding_routes};
use session_profile::session::{
    Identity, MemoryIdentityProvider, MemoryProfileStore, SessionStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = SessionConfig::from_env()?;

    eprintln!("Session profile v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Session API: http://0.0.0.0:{}/api/session", config.http_port);
    eprintln!("   Onboarding:  http://0.0.0.0:{}/api/onboarding/submit", config.http_port);
    eprintln!("   Reconcile window: {:?}", config.reconcile_window);

    // ── Collaborators ───────────────────────────────────────────────────
    let identities = Arc::new(MemoryIdentityProvider::new());
    let profiles = Arc::new(MemoryProfileStore::new());

    // ── Session ─────────────────────────────────────────────────────────
    let session = SessionStore::new(identities.clone(), profiles.clone(), &config);
    session.initialize().await?;

    // Dev identity so the onboarding flow has someone to onboard.
    let email =
        std::env::var("SESSION_DEV_EMAIL").unwrap_or_else(|_| "dev@example.com".to_string());
    let identity = Identity::new(uuid::Uuid::new_v4().to_string(), email);
    eprintln!("   Signed in as: {} ({})\n", identity.email, identity.id);
    identities.sign_in(identity);

    // ── Onboarding ──────────────────────────────────────────────────────
    let workflow = Arc::new(OnboardingWorkflow::new(
        session.clone(),
        profiles.clone(),
        &config,
    ));
    let app = onboarding_routes(OnboardingRouteState {
        session: session.clone(),
        workflow: Arc::clone(&workflow),
    });

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.http_port)).await?;
    tracing::info!(port = config.http_port, "Session server started");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    workflow.dispose();
    session.teardown().await;

    Ok(())
}
