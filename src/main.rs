//! Neuron - A multi-author blog with an editorial workflow

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use neuron::{
    api::{self, AppState},
    cache::create_cache,
    config::Config,
    db::{
        self,
        repositories::{
            SqlxCommentRepository, SqlxPostRepository, SqlxSessionRepository, SqlxUserRepository,
        },
    },
    services::{
        create_notifier, CommentService, JobQueue, JobWorker, PostService, Signer, UserService,
    },
};

/// How often expired sessions are purged
const SESSION_CLEANUP_INTERVAL_SECS: u64 = 3600;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "neuron=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Neuron...");

    // Load configuration
    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    let cache = create_cache(&config.cache).await?;
    tracing::info!("Cache initialized");

    // Create repositories
    let user_repo = SqlxUserRepository::boxed(pool.clone());
    let session_repo = SqlxSessionRepository::boxed(pool.clone());
    let post_repo = SqlxPostRepository::boxed(pool.clone());
    let comment_repo = SqlxCommentRepository::boxed(pool.clone());

    // Background mail delivery
    let notifier = create_notifier(&config.smtp)?;
    let (jobs, job_rx) = JobQueue::new();
    JobWorker::new(
        post_repo.clone(),
        user_repo.clone(),
        notifier,
        config.blog.site_url.clone(),
        config.smtp.admin_email.clone(),
    )
    .spawn(job_rx);
    tracing::info!("Job worker started");

    // Initialize services
    let user_service = Arc::new(UserService::new(
        user_repo.clone(),
        session_repo,
        Signer::new(&config.security.secret_key)?,
        jobs.clone(),
        config.blog.site_url.clone(),
        config.blog.session_days,
    )?);
    let post_service = Arc::new(PostService::new(
        post_repo.clone(),
        user_repo,
        comment_repo.clone(),
        cache,
        jobs,
        config.blog.posts_per_page,
    ));
    let comment_service = Arc::new(CommentService::new(comment_repo, post_repo));

    if let Some(admin) = &config.admin {
        user_service.ensure_admin(admin).await?;
    }

    // Purge expired sessions periodically
    {
        let users = user_service.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(
                SESSION_CLEANUP_INTERVAL_SECS,
            ));
            loop {
                interval.tick().await;
                match users.cleanup_expired_sessions().await {
                    Ok(0) => {}
                    Ok(count) => tracing::info!("Removed {} expired sessions", count),
                    Err(e) => tracing::warn!("Failed to remove expired sessions: {}", e),
                }
            }
        });
    }

    let state = AppState {
        post_service,
        comment_service,
        user_service,
    };

    // Build router
    let app = api::build_router(state, &config.server.cors_origin)?;

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
