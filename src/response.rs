use bytes::Bytes;
use poem::http::{header, HeaderValue, StatusCode};
use poem::Response;
use uuid::Uuid;

/// The header carrying the ids minted by a record store upload, one value
/// per stored file in upload order.
pub const RECORD_ID_HEADER: &str = "x-record-id";

/// A plain text response: the reason phrase, then one explanation per line.
pub fn status_response(status: StatusCode, explanations: &[&str]) -> Response {
    Response::builder()
        .status(status)
        .content_type(mime::TEXT_PLAIN_UTF_8.as_ref())
        .body(status_text(status, explanations))
}

fn status_text(status: StatusCode, explanations: &[&str]) -> String {
    let mut text = status.canonical_reason().unwrap_or_default().to_string();

    if !explanations.is_empty() {
        text.push('\n');
        text.push_str(&explanations.join("\n"));
    }

    text
}

pub fn blob_response(content_type: &str, data: Bytes) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .content_type(content_type)
        .body(data)
}

pub fn attachment_response(content_type: &str, filename: &str, data: Bytes) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .content_type(content_type)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename={}", filename),
        )
        .body(data)
}

/// Collects the per-file outcome lines of a batch upload.
///
/// The status of the whole response is fixed by whichever outcome is written
/// first, so a failure after a success is only visible in the body.
#[derive(Debug, Default)]
pub struct UploadReport {
    status: Option<StatusCode>,
    body: String,
    record_ids: Vec<Uuid>,
}

impl UploadReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn success(&mut self, filename: &str) {
        self.status.get_or_insert(StatusCode::OK);
        self.body.push_str(&format!("File uploaded successfully: {}\n", filename));
    }

    pub fn record_success(&mut self, filename: &str, id: Uuid) {
        self.success(filename);
        self.record_ids.push(id);
    }

    pub fn failure(&mut self, status: StatusCode, explanation: &str) {
        self.status.get_or_insert(status);
        self.body.push_str(&status_text(status, &[explanation]));
        self.body.push('\n');
    }

    #[inline]
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    pub fn into_response(self) -> Response {
        let mut resp = Response::builder()
            .status(self.status())
            .content_type(mime::TEXT_PLAIN_UTF_8.as_ref())
            .body(self.body);

        for id in self.record_ids {
            if let Ok(value) = HeaderValue::from_str(&id.to_string()) {
                resp.headers_mut().append(RECORD_ID_HEADER, value);
            }
        }

        resp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_text() {
        assert_eq!(status_text(StatusCode::BAD_REQUEST, &[]), "Bad Request");
        assert_eq!(
            status_text(StatusCode::BAD_REQUEST, &["Can't read the file", "diagram.png"]),
            "Bad Request\nCan't read the file\ndiagram.png",
        );
    }

    #[test]
    fn test_first_outcome_sets_status() {
        let mut report = UploadReport::new();
        report.success("a.png");
        report.failure(StatusCode::INTERNAL_SERVER_ERROR, "Database error while saving image: b.png");
        report.success("c.png");

        assert_eq!(report.status(), StatusCode::OK);
        assert_eq!(
            report.body,
            "File uploaded successfully: a.png\n\
             Internal Server Error\nDatabase error while saving image: b.png\n\
             File uploaded successfully: c.png\n",
        );

        let mut report = UploadReport::new();
        report.failure(StatusCode::NOT_FOUND, "Image not found");
        report.success("b.png");
        assert_eq!(report.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_empty_report_is_ok() {
        let report = UploadReport::new();
        assert_eq!(report.status(), StatusCode::OK);
        assert!(report.into_response().status().is_success());
    }

    #[test]
    fn test_record_ids_become_headers() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        let mut report = UploadReport::new();
        report.record_success("a.png", a);
        report.record_success("b.png", b);

        let resp = report.into_response();
        let ids: Vec<_> = resp
            .headers()
            .get_all(RECORD_ID_HEADER)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(ToString::to_string)
            .collect();

        assert_eq!(ids, vec![a.to_string(), b.to_string()]);
    }
}
