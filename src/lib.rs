use actix_cors::Cors;
use actix_web::middleware::Compress;
use actix_web::{http::header, web, App, HttpResponse, HttpServer};
use actix_web_prometheus::PrometheusMetricsBuilder;
use prometheus::IntCounterVec;
use serde::{Deserialize, Serialize};
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

pub mod docx;
pub mod selection;

use crate::docx::template::TemplateStore;

/// JSON body limit. Base64 image payloads inflate request bodies considerably.
const JSON_BODY_LIMIT: usize = 25 * 1024 * 1024;

/// Error body returned by every failing endpoint.
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: &str) -> Self {
        Self {
            error: error.to_string(),
            details: None,
        }
    }

    pub fn with_details(error: &str, details: &str) -> Self {
        Self {
            error: error.to_string(),
            details: Some(details.to_string()),
        }
    }
}

/// Shared per-process state: the template byte cache and the outcome counter.
pub struct AppState {
    pub templates: TemplateStore,
    pub documents_total: IntCounterVec,
}

impl AppState {
    pub fn new() -> Self {
        let documents_total = IntCounterVec::new(
            prometheus::Opts::new(
                "generated_documents_total",
                "Product selection documents generated, labelled by outcome",
            ),
            &["outcome"],
        )
        .expect("valid metric definition");

        Self {
            templates: TemplateStore::new(),
            documents_total,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

fn json_error_handler(
    err: actix_web::error::JsonPayloadError,
    _req: &actix_web::HttpRequest,
) -> actix_web::Error {
    let response = HttpResponse::BadRequest().json(ErrorResponse::with_details(
        "Invalid request body",
        &err.to_string(),
    ));
    actix_web::error::InternalError::from_response(err, response).into()
}

pub async fn run() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    #[derive(OpenApi)]
    #[openapi(
        paths(crate::selection::handlers::generate_document),
        components(
            schemas(
                selection::models::GenerationRequest,
                selection::models::ProductInput,
                ErrorResponse,
            )
        ),
        tags(
            (name = "Document Generation", description = "Product selection document endpoints.")
        )
    )]
    struct ApiDoc;

    let app_state = web::Data::new(AppState::new());

    let registry = prometheus::Registry::new();
    registry
        .register(Box::new(app_state.documents_total.clone()))
        .expect("Failed to register documents counter");
    let prometheus = PrometheusMetricsBuilder::new("product_selection_server")
        .registry(registry)
        .endpoint("/metrics")
        .build()
        .expect("Failed to create Prometheus metrics middleware");

    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(8080);

    log::info!("Starting server at http://{}:{}", host, port);

    HttpServer::new(move || {
        let app_state = app_state.clone();
        let prometheus = prometheus.clone();
        let cors = Cors::default()
            .allow_any_origin()
            .allowed_methods(vec!["POST", "OPTIONS"])
            .allowed_header(header::CONTENT_TYPE)
            .max_age(3600);

        App::new()
            .wrap(Compress::default())
            .wrap(prometheus)
            .wrap(cors)
            .app_data(app_state)
            .app_data(
                web::JsonConfig::default()
                    .limit(JSON_BODY_LIMIT)
                    .error_handler(json_error_handler),
            )
            .service(web::scope("/api").configure(selection::handlers::config))
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
    })
    .backlog(8192)
    .keep_alive(actix_web::http::KeepAlive::Os)
    .bind((host, port))?
    .run()
    .await
}
