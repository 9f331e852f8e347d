pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod pages;
pub mod session;
pub mod stream;

use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    routing::{delete, get, post},
    Router,
};
use hooklog_auth::{Credentials, SessionCodec};
use hooklog_store::RecordStore;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use error::ApiError;

/// Application state shared across handlers
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub sessions: SessionCodec,
    pub credentials: Credentials,
    /// Longest single wait on the request log per feed read
    pub stream_block: Duration,
    /// Mark the session cookie `Secure`
    pub secure_cookie: bool,
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "hooklog API",
        version = "0.1.0",
        description = "Admin API over captured HTTP request logs",
        contact(
            name = "Hooklog Team",
            email = "team@hooklog.dev"
        )
    ),
    paths(
        handlers::history,
        handlers::search,
        handlers::delete_record,
        handlers::delete_all,
        handlers::health_check,
        stream::stream_events,
        pages::list_pages,
        pages::create_page,
        pages::update_page,
        pages::delete_page,
        session::login,
        session::logout,
    ),
    components(
        schemas(
            hooklog_proto::CapturedRequest,
            hooklog_proto::RequestRecord,
            hooklog_proto::Report,
            hooklog_proto::HttpCookie,
            hooklog_proto::HistoryResponse,
            hooklog_proto::SearchResponse,
            hooklog_proto::ActionResponse,
            hooklog_proto::ErrorResponse,
            hooklog_proto::ValidationErrorResponse,
            hooklog_proto::HealthResponse,
            hooklog_proto::PageInput,
            hooklog_proto::HeaderEntry,
            hooklog_proto::StoredPage,
            models::LoginForm,
        )
    ),
    tags(
        (name = "records", description = "Captured request history, search, live feed and deletion"),
        (name = "pages", description = "Custom page definitions"),
        (name = "auth", description = "Session management"),
        (name = "system", description = "System health and info endpoints")
    )
)]
struct ApiDoc;

/// API server configuration
pub struct ApiServerConfig {
    /// Address to bind the API server
    pub bind_addr: SocketAddr,
    /// Enable CORS for local development origins
    pub enable_cors: bool,
    /// Longest single wait on the request log per feed read
    pub stream_block: Duration,
    /// Mark the session cookie `Secure`
    pub secure_cookie: bool,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            enable_cors: false,
            stream_block: Duration::from_secs(5),
            secure_cookie: false,
        }
    }
}

/// API Server
pub struct ApiServer {
    config: ApiServerConfig,
    state: Arc<AppState>,
}

impl ApiServer {
    /// Create a new API server
    pub fn new(
        config: ApiServerConfig,
        store: Arc<dyn RecordStore>,
        credentials: Credentials,
        session_secret: &[u8],
    ) -> Self {
        let state = Arc::new(AppState {
            store,
            sessions: SessionCodec::new(session_secret),
            credentials,
            stream_block: config.stream_block,
            secure_cookie: config.secure_cookie,
        });

        Self { config, state }
    }

    pub fn state(&self) -> Arc<AppState> {
        self.state.clone()
    }

    /// Build the router with all routes
    pub fn build_router(&self) -> Router {
        let api_doc = ApiDoc::openapi();

        // Build PUBLIC routes (no session required)
        let public_router = Router::new()
            .route("/api/health", get(handlers::health_check))
            .route("/login", get(session::login_page).post(session::login))
            .with_state(self.state.clone());

        // Build PROTECTED routes (redirect to /login without a session)
        let protected_router = Router::new()
            .route("/", get(handlers::root))
            .route("/logout", post(session::logout))
            .route("/api/history", get(handlers::history))
            .route("/api/stream", get(stream::stream_events))
            .route("/api/search", get(handlers::search))
            .route("/api/delete", delete(handlers::delete_record))
            .route("/api/delete-all", delete(handlers::delete_all))
            .route(
                "/api/create",
                get(pages::list_pages)
                    .post(pages::create_page)
                    .put(pages::update_page)
                    .delete(pages::delete_page),
            )
            .with_state(self.state.clone())
            .merge(SwaggerUi::new("/swagger-ui").url("/api/openapi.json", api_doc))
            .layer(axum_middleware::from_fn_with_state(
                self.state.clone(),
                middleware::require_session,
            ));

        let mut router = public_router
            .merge(protected_router)
            .layer(TraceLayer::new_for_http());

        if self.config.enable_cors {
            use tower_http::cors::AllowOrigin;

            // Cookies need credentials, which rules out a wildcard origin
            let cors = CorsLayer::new()
                .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
                .allow_headers([header::CONTENT_TYPE, header::COOKIE])
                .allow_credentials(true)
                .allow_origin(AllowOrigin::predicate(|origin: &HeaderValue, _| {
                    let origin = origin.to_str().unwrap_or("");
                    origin.starts_with("http://localhost:")
                        || origin.starts_with("http://127.0.0.1:")
                }));
            router = router.layer(cors);
        }

        router
    }

    /// Start the API server
    pub async fn start(self) -> Result<(), anyhow::Error> {
        let router = self.build_router();

        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;
        let local_addr = listener.local_addr()?;

        info!("Starting API server on {}", local_addr);
        info!("OpenAPI spec: http://{}/api/openapi.json", local_addr);
        info!("Swagger UI: http://{}/swagger-ui", local_addr);

        axum::serve(listener, router)
            .await
            .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

        Ok(())
    }
}
