use todo_api::{
    application::todo_service::TodoServiceImpl,
    config::AppConfig,
    domain::repository::TodoRepository,
    http::{routes::todos, routing},
    infrastructure,
};
use tower::ServiceBuilder;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();
    if config.uses_default_secret() {
        tracing::warn!("JWT_SECRET is not set; using the built-in development secret");
    }

    let repo = infrastructure::open_repository(&config).await?;
    let storage = repo.kind();
    let service = TodoServiceImpl::new(repo).with_max_limit(config.max_page_limit);
    let todos_router = todos::router(todos::AppState::new(service, config.jwt_keys()));
    let router = routing::app(todos_router, storage).layer(ServiceBuilder::new().layer(routing::cors(&config.frontend_url)?));

    let addr = config.socket_addr()?;
    tracing::info!(%addr, database = %storage, "listening");
    axum::serve(tokio::net::TcpListener::bind(addr).await?, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal::ctrl_c;
    let _ = ctrl_c().await;
    tracing::info!("shutdown");
}
