use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, Method},
    routing::{get, patch, post},
    Router,
};
use redis::Client as RedisClient;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use taskgroups_api::{
    config::Config,
    db::{self, PgStore},
    routes,
    services::{
        email::EmailService,
        notifications::{start_worker, ChannelSink},
    },
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let config = Arc::new(config);

    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;
    info!("Database connected and migrations applied");

    let redis_client = RedisClient::open(config.redis_url.as_str())?;
    let redis_conn = redis_client.get_multiplexed_async_connection().await?;
    info!("Redis connected");

    let email = EmailService::new(&config).map(Arc::new);
    if email.is_some() {
        info!("SMTP email service configured");
    } else {
        info!("SMTP not configured, dashboard reports will be skipped");
    }
    let (sink, rx) = ChannelSink::channel(config.notification_queue_capacity);
    start_worker(rx, email);

    let state = AppState {
        store: PgStore::new(pool),
        redis: redis_conn,
        config: config.clone(),
        notifications: Arc::new(sink),
    };

    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(AllowHeaders::list([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
        ]))
        .allow_origin(AllowOrigin::any());

    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/metrics", get(routes::metrics::metrics_handler))
        // Auth
        .route("/auth/signup", post(routes::auth::signup))
        .route("/auth/login", post(routes::auth::login))
        .route("/auth/refresh", post(routes::auth::refresh_token))
        .route("/auth/me", get(routes::auth::me))
        // Groups
        .route("/groups", get(routes::groups::list_groups).post(routes::groups::create_group))
        .route(
            "/groups/{id}",
            get(routes::groups::get_group)
                .patch(routes::groups::update_group)
                .delete(routes::groups::delete_group),
        )
        .route("/groups/{id}/tasks", get(routes::groups::list_group_tasks))
        // Members
        .route(
            "/groups/{id}/members",
            get(routes::members::list_members).post(routes::members::add_member),
        )
        .route(
            "/groups/{id}/members/{user_id}",
            patch(routes::members::update_member).delete(routes::members::remove_member),
        )
        // Tasks
        .route("/tasks", post(routes::tasks::create_task))
        .route(
            "/tasks/{id}",
            patch(routes::tasks::update_task).delete(routes::tasks::delete_task),
        )
        .route("/tasks/{id}/photo", post(routes::tasks::upload_task_photo))
        // Email
        .route("/email/dashboard", post(routes::email::send_dashboard))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // Photo uploads are capped at 20 MB
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024))
        .with_state(state);

    let addr = format!("{}:{}", config.host, config.port);
    info!("taskgroups API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
