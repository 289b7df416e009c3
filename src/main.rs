mod clock;
mod config;
mod db;
mod error;
mod mail;
mod review;
mod routes;
mod state;
mod templates;

use axum::{
    routing::{get, patch, post, put},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::clock::{Clock, SystemClock};
use crate::db::{PgStore, Store};
use crate::mail::{GuardedMailer, MailerGuard, Notifier, SmtpMailer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "conference_review=info,tower_http=info".into()),
        )
        .init();

    let config = config::Config::from_env()?;
    let config = Arc::new(config);

    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(pool.as_ref()).await?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool));

    let guard = Arc::new(MailerGuard::new(clock.clone(), config.mailer_cooldown));
    let mailer = Arc::new(GuardedMailer::new(
        Arc::new(SmtpMailer::new(&config.smtp)?),
        guard,
        config.smtp.send_attempts,
        Duration::from_secs(1),
    ));
    let notifier = Arc::new(Notifier::new(
        mailer,
        config.conference_name.clone(),
        config.admin_email.clone(),
    ));

    let _reminders = review::spawn_reminder_job(
        store.clone(),
        notifier.clone(),
        clock.clone(),
        config.reminder.clone(),
    );

    let state = Arc::new(state::AppState {
        store,
        notifier,
        clock,
        config: config.clone(),
    });

    let app = Router::new()
        .route("/health", get(routes::health))
        .route("/api/speaker/register", post(routes::register_speaker))
        .route("/api/speaker/speakers", get(routes::list_speakers))
        .route(
            "/api/speaker/speakers/:id",
            get(routes::get_speaker).delete(routes::delete_speaker),
        )
        .route(
            "/api/reviewing-committee/members",
            get(routes::list_members).post(routes::create_member),
        )
        .route(
            "/api/reviewing-committee/members/:id",
            put(routes::update_member).delete(routes::delete_member),
        )
        .route(
            "/api/reviewing-committee/active-members",
            get(routes::list_active_members),
        )
        .route(
            "/api/reviewing-committee/send-speaker/:speaker_id",
            post(routes::send_to_committee),
        )
        .route(
            "/api/reviewing-committee/speaker-status/:speaker_id",
            put(routes::update_speaker_status),
        )
        .route("/api/reviewer-expression", post(routes::create_expression))
        .route("/api/reviewer-expression/all", get(routes::list_expressions))
        .route(
            "/api/reviewer-expression/:id",
            get(routes::get_expression).delete(routes::delete_expression),
        )
        .route(
            "/api/reviewer-expression/:id/status",
            patch(routes::update_expression_status),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("{} review service listening on http://{}", config.conference_name, addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
