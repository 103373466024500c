pub mod api;
pub mod config;
pub mod entities;
pub mod infrastructure;
pub mod services;
pub mod utils;

use crate::config::AppConfig;
use crate::services::pipeline::IngestionPipeline;
use crate::services::repository::FileRepository;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post, put},
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::auth::signup,
        api::handlers::auth::signin,
        api::handlers::auth::logout,
        api::handlers::users::me,
        api::handlers::files::upload::upload_files,
        api::handlers::files::upload::replace_file,
        api::handlers::files::list::list_files,
        api::handlers::files::list::get_stats,
        api::handlers::files::manage::rename_file,
        api::handlers::files::manage::delete_file,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            api::handlers::auth::SignupRequest,
            api::handlers::auth::SigninRequest,
            api::handlers::auth::AuthResponse,
            api::handlers::auth::MessageResponse,
            api::handlers::users::MeResponse,
            api::handlers::files::FileResponse,
            api::handlers::files::UploadedFileResponse,
            api::handlers::files::UploadResponse,
            api::handlers::files::ReplaceResponse,
            api::handlers::files::RenameRequest,
            api::handlers::files::RenameResponse,
            api::handlers::files::DeleteResponse,
            api::handlers::files::Pagination,
            api::handlers::files::ListFilesResponse,
            api::handlers::files::StatsResponse,
            api::handlers::health::HealthResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Authentication endpoints"),
        (name = "files", description = "File management endpoints"),
        (name = "system", description = "Health and diagnostics")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "jwt",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub pipeline: Arc<IngestionPipeline>,
    pub repo: Arc<dyn FileRepository>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(db: DatabaseConnection, pipeline: Arc<IngestionPipeline>, config: AppConfig) -> Self {
        let repo = pipeline.repository().clone();
        Self {
            db,
            pipeline,
            repo,
            config: Arc::new(config),
        }
    }
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

pub fn create_app(state: AppState) -> Router {
    let upload = &state.config.upload;
    // Multipart framing adds overhead on top of the file bytes
    let upload_limit = upload
        .max_file_size
        .saturating_mul(upload.max_files_per_request)
        .saturating_add(10 * 1024 * 1024);
    let replace_limit = upload.max_file_size + 10 * 1024 * 1024;

    let auth = || from_fn_with_state(state.clone(), api::middleware::auth::auth_middleware);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route("/signup", post(api::handlers::auth::signup))
        .route("/signin", post(api::handlers::auth::signin))
        .route("/logout", post(api::handlers::auth::logout))
        .route("/me", get(api::handlers::users::me).layer(auth()))
        .route(
            "/upload",
            post(api::handlers::files::upload_files)
                .layer(DefaultBodyLimit::max(upload_limit))
                .layer(auth()),
        )
        .route(
            "/files",
            get(api::handlers::files::list_files).layer(auth()),
        )
        .route(
            "/files/:id",
            put(api::handlers::files::rename_file)
                .delete(api::handlers::files::delete_file)
                .layer(auth()),
        )
        .route(
            "/files/:id/replace",
            put(api::handlers::files::replace_file)
                .layer(DefaultBodyLimit::max(replace_limit))
                .layer(auth()),
        )
        .route("/stats", get(api::handlers::files::get_stats).layer(auth()))
        .layer(cors_layer(&state.config))
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .with_state(state)
}
