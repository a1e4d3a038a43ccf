use std::sync::Arc;

use poem::http::{header, StatusCode};
use poem::middleware::Tracing;
use poem::web::{Data, Multipart, Path};
use poem::{get, handler, post, Endpoint, EndpointExt, Request, Response, Route};
use uuid::Uuid;

use crate::config::RuntimeConfig;
use crate::form::{FormError, UploadForm};
use crate::models::FALLBACK_CONTENT_TYPE;
use crate::response::{attachment_response, blob_response, status_response, UploadReport};
use crate::samples::SampleDocuments;
use crate::service::IngestionService;

pub const DOWNLOAD_PATH: &str = "/download";
pub const UPLOAD_PATH: &str = "/upload";
pub const SAVE_DB_PATH: &str = "/savedb";
pub const SHOW_PATH: &str = "/show/:id";
pub const FOO_PATH: &str = "/foo";
pub const JSON_PATH: &str = "/json";
pub const XML_PATH: &str = "/xml";

/// The handler facing settings, taken from the runtime config at startup.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub max_upload_size: u64,
    pub download_filename: String,
    pub distinct_not_found: bool,
}

impl From<&RuntimeConfig> for TransportConfig {
    fn from(cfg: &RuntimeConfig) -> Self {
        Self {
            max_upload_size: cfg.max_upload_size,
            download_filename: cfg.storage.download_filename.clone(),
            distinct_not_found: cfg.distinct_not_found,
        }
    }
}

pub fn app(
    service: Arc<IngestionService>,
    settings: TransportConfig,
    samples: SampleDocuments,
) -> impl Endpoint<Output = Response> {
    Route::new()
        .at(DOWNLOAD_PATH, get(download))
        .at(UPLOAD_PATH, post(upload))
        .at(SAVE_DB_PATH, post(save_db))
        .at(SHOW_PATH, get(show))
        .at(FOO_PATH, get(foo))
        .at(JSON_PATH, get(json))
        .at(XML_PATH, get(xml))
        .data(service)
        .data(settings)
        .data(samples)
        .with(Tracing)
}

#[handler]
pub async fn download(
    Data(service): Data<&Arc<IngestionService>>,
    Data(settings): Data<&TransportConfig>,
) -> Response {
    let filename = settings.download_filename.as_str();

    match service.fetch_by_filename(filename).await {
        Ok(data) => attachment_response(mime::IMAGE_PNG.as_ref(), filename, data),
        Err(e) => {
            warn!("failed to read download asset {}: {}", filename, e);
            status_response(StatusCode::BAD_REQUEST, &["Can't read the file", filename])
        }
    }
}

#[handler]
pub async fn upload(
    req: &Request,
    multipart: poem::Result<Multipart>,
    Data(service): Data<&Arc<IngestionService>>,
    Data(settings): Data<&TransportConfig>,
) -> Response {
    let form = match receive_form(req, multipart, settings.max_upload_size).await {
        Ok(form) => form,
        Err(resp) => return resp,
    };

    let mut report = UploadReport::new();

    // The first failure ends the batch, later files are not attempted.
    for file in form.into_files() {
        let filename = file.filename().to_string();
        let size = file.size();

        match service.save_to_filesystem(&filename, file.into_stream()).await {
            Ok(stored) => {
                info!("saved upload {} ({} bytes)", &stored.filename, size);
                report.success(&filename);
            }
            Err(e) => {
                warn!(kind = %e.kind(), "failed to save upload {}: {}", &filename, e);
                report.failure(StatusCode::BAD_REQUEST, &e.to_string());
                return report.into_response();
            }
        }
    }

    report.into_response()
}

#[handler]
pub async fn save_db(
    req: &Request,
    multipart: poem::Result<Multipart>,
    Data(service): Data<&Arc<IngestionService>>,
    Data(settings): Data<&TransportConfig>,
) -> Response {
    let form = match receive_form(req, multipart, settings.max_upload_size).await {
        Ok(form) => form,
        Err(resp) => return resp,
    };

    let mut report = UploadReport::new();

    // A failing file is reported and the rest of the batch still runs.
    for file in form.into_files() {
        let filename = file.filename().to_string();
        let size = file.size();
        let content_type = file
            .content_type()
            .unwrap_or(FALLBACK_CONTENT_TYPE)
            .to_string();

        match service.save_to_record_store(&content_type, file.into_stream()).await {
            Ok(id) => {
                info!("stored upload {} ({} bytes) as record {}", &filename, size, id);
                report.record_success(&filename, id);
            }
            Err(e) if e.is_not_found() => {
                warn!("record store lost upload {}: {}", &filename, e);
                report.failure(StatusCode::NOT_FOUND, "Image not found");
            }
            Err(e) => {
                warn!(kind = %e.kind(), "failed to store upload {}: {}", &filename, e);
                report.failure(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    &format!("Database error while saving image: {}", filename),
                );
            }
        }
    }

    report.into_response()
}

#[handler]
pub async fn show(
    Path(raw_id): Path<String>,
    Data(service): Data<&Arc<IngestionService>>,
    Data(settings): Data<&TransportConfig>,
) -> Response {
    let id = match Uuid::parse_str(&raw_id) {
        Ok(id) => id,
        Err(_) => return status_response(StatusCode::BAD_REQUEST, &["Error parsing the id"]),
    };

    match service.fetch_by_id(id).await {
        Ok(record) => {
            let content_type = record.content_type().to_string();
            blob_response(&content_type, record.into_content())
        }
        Err(e) if e.is_not_found() && settings.distinct_not_found => {
            status_response(StatusCode::NOT_FOUND, &["Image not found"])
        }
        Err(e) => {
            warn!(kind = %e.kind(), "failed to fetch record {}: {}", id, e);
            status_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &["Error getting the image from db"],
            )
        }
    }
}

#[handler]
pub async fn foo() -> &'static str {
    "Hello, world!"
}

#[handler]
pub async fn json(Data(samples): Data<&SampleDocuments>) -> Response {
    blob_response("application/json; charset=utf-8", samples.json())
}

#[handler]
pub async fn xml(Data(samples): Data<&SampleDocuments>) -> Response {
    blob_response("application/xml; charset=utf-8", samples.xml())
}

/// Runs the size check and decodes the form.
///
/// Any early exit comes back as the finished response.
async fn receive_form(
    req: &Request,
    multipart: poem::Result<Multipart>,
    limit: u64,
) -> Result<UploadForm, Response> {
    if declared_length(req).map_or(false, |len| len > limit) {
        return Err(status_response(
            StatusCode::PAYLOAD_TOO_LARGE,
            &["File is too large"],
        ));
    }

    let multipart = match multipart {
        Ok(multipart) => multipart,
        Err(e) => {
            debug!("rejecting non multipart upload: {}", e);
            return Err(status_response(StatusCode::BAD_REQUEST, &[]));
        }
    };

    match UploadForm::parse(multipart, limit).await {
        Ok(form) if form.is_empty() => {
            debug!("upload form carried no {} files", crate::form::UPLOAD_FIELD);
            Ok(form)
        }
        Ok(form) => {
            debug!("decoded upload form with {} files", form.len());
            Ok(form)
        }
        Err(FormError::TooLarge(e)) => {
            info!(kind = %e.kind(), "rejecting upload form: {}", e);
            Err(status_response(
                StatusCode::PAYLOAD_TOO_LARGE,
                &["File is too large"],
            ))
        }
        Err(e @ FormError::Spool(_)) => {
            error!("failed to decode upload form: {}", e);
            Err(status_response(StatusCode::INTERNAL_SERVER_ERROR, &[]))
        }
        Err(e) => {
            debug!("rejecting upload form: {}", e);
            Err(status_response(StatusCode::BAD_REQUEST, &[]))
        }
    }
}

fn declared_length(req: &Request) -> Option<u64> {
    req.header(header::CONTENT_LENGTH)
        .and_then(|v| v.trim().parse::<u64>().ok())
}
