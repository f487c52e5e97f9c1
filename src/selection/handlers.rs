//! HTTP handler for document generation.
//!
//! The handler is a single linear pipeline: validate → load template →
//! transform data → merge → respond. Every failure is converted into the
//! JSON `ErrorResponse` shape; the response is never left unset.

use actix_web::http::{header, Method};
use actix_web::{web, HttpResponse, Responder};
use log::{debug, error, info};

use crate::docx::template::TemplateArchive;
use crate::docx::{DocumentError, GeneratedDocument, ImageModule, MergeEngine, RenderError, TemplateError};
use crate::selection::models::GenerationRequest;
use crate::selection::transform::{attachment_filename, build_merge_data, request_has_images};
use crate::{AppState, ErrorResponse};

const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

#[utoipa::path(
    context_path = "/api",
    tag = "Document Generation",
    post,
    path = "/generate-document",
    request_body = GenerationRequest,
    responses(
        (status = 200, description = "Merged Word document", content_type = "application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 500, description = "Template or render failure", body = ErrorResponse)
    )
)]
pub async fn generate_document(
    data: web::Data<AppState>,
    body: web::Json<GenerationRequest>,
) -> impl Responder {
    let request = body.into_inner();
    info!(
        "Generating product selection document for address '{}' ({} products)",
        request.address,
        request.products.len()
    );

    if let Err(err) = request.validate() {
        data.documents_total
            .with_label_values(&["validation_error"])
            .inc();
        return HttpResponse::BadRequest().json(ErrorResponse::new(&err.to_string()));
    }

    let templates = data.templates.clone();
    let result = web::block(move || -> Result<GeneratedDocument, DocumentError> {
        let bytes = templates.load()?;
        let archive = TemplateArchive::parse(&bytes)?;
        debug!("template archive parsed, building merge data");

        let filename = attachment_filename(&request.address);
        let merge_data = serde_json::to_value(build_merge_data(&request))?;

        let mut engine = MergeEngine::new(archive)?;
        if request_has_images(&request) {
            engine.attach_image_module(ImageModule::new());
        }

        let docx = engine.render(&merge_data)?;
        Ok(GeneratedDocument { filename, docx })
    })
    .await;

    match result {
        Ok(Ok(document)) => {
            info!(
                "document generated: {} ({} bytes)",
                document.filename,
                document.docx.len()
            );
            data.documents_total.with_label_values(&["success"]).inc();
            HttpResponse::Ok()
                .content_type(DOCX_MIME)
                .insert_header((
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", document.filename),
                ))
                .body(document.docx)
        }
        Ok(Err(err)) => {
            let (outcome, response) = failure_response(&err);
            error!("document generation failed: {err}");
            data.documents_total.with_label_values(&[outcome]).inc();
            response
        }
        Err(err) => {
            error!("blocking pool failure: {err}");
            data.documents_total
                .with_label_values(&["internal_error"])
                .inc();
            HttpResponse::InternalServerError().json(ErrorResponse::with_details(
                "Internal server error",
                &err.to_string(),
            ))
        }
    }
}

fn failure_response(err: &DocumentError) -> (&'static str, HttpResponse) {
    match err {
        DocumentError::Template(TemplateError::NotFound) => (
            "template_error",
            HttpResponse::InternalServerError().json(ErrorResponse::new("Template file not found")),
        ),
        DocumentError::Template(TemplateError::Io(source)) => (
            "template_error",
            HttpResponse::InternalServerError().json(ErrorResponse::with_details(
                "Failed to read template file",
                &source.to_string(),
            )),
        ),
        DocumentError::Template(TemplateError::Corrupted(source)) => (
            "template_error",
            HttpResponse::InternalServerError().json(ErrorResponse::with_details(
                "Template file is corrupted",
                &source.to_string(),
            )),
        ),
        DocumentError::Template(TemplateError::StructureInvalid(detail)) => (
            "template_error",
            HttpResponse::InternalServerError().json(ErrorResponse::with_details(
                "Template structure is invalid",
                detail,
            )),
        ),
        DocumentError::Render(failure @ RenderError::Failed(_)) => (
            "render_error",
            HttpResponse::InternalServerError().json(ErrorResponse::with_details(
                "Failed to render document",
                &failure.to_string(),
            )),
        ),
        DocumentError::Render(other) => (
            "render_error",
            HttpResponse::InternalServerError().json(ErrorResponse::with_details(
                "Failed to assemble document",
                &other.to_string(),
            )),
        ),
        DocumentError::Data(source) => (
            "internal_error",
            HttpResponse::InternalServerError().json(ErrorResponse::with_details(
                "Internal server error",
                &source.to_string(),
            )),
        ),
    }
}

/// Plain OPTIONS (outside a CORS preflight) is answered 200 with no body.
pub async fn preflight() -> impl Responder {
    HttpResponse::Ok().finish()
}

pub async fn method_not_allowed() -> impl Responder {
    HttpResponse::MethodNotAllowed().json(ErrorResponse::new("Method not allowed"))
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/generate-document")
            .route(web::post().to(generate_document))
            .route(web::method(Method::OPTIONS).to(preflight))
            .route(web::route().to(method_not_allowed)),
    );
}
