mod upload;

use crate::application::use_cases::geocode::GeocodeUseCase;
use crate::application::use_cases::geocode_csv::{GeocodeCsvUseCase, PipelineOutcome};
use crate::domain::csv::TextEncoding;
use crate::domain::error::AppError;
use crate::domain::query::RawQuery;
use crate::infrastructure::config::AppConfig;
use actix_cors::Cors;
use actix_multipart::Multipart;
use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::http::StatusCode;
use actix_web::middleware::{Condition, Logger};
use actix_web::{dev::Server, get, post, web, App, HttpResponse, HttpServer, ResponseError};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

pub use upload::{CsvUpload, UploadedFile};

pub struct HttpState {
    pub geocode_use_case: Arc<GeocodeUseCase>,
    pub geocode_csv_use_case: Arc<GeocodeCsvUseCase>,
    pub config: AppConfig,
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(AppError::status_code(self)).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        let status = ResponseError::status_code(self);
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }
        HttpResponse::build(status).json(json!({
            "code": status.as_u16(),
            "message": self.public_message(),
        }))
    }
}

#[get("/search")]
async fn search(
    data: web::Data<HttpState>,
    query: web::Query<Vec<(String, String)>>,
) -> Result<HttpResponse, AppError> {
    let raw = RawQuery::from_pairs(query.into_inner());
    let result = data.geocode_use_case.search(&raw).await?;
    Ok(HttpResponse::Ok().json(result))
}

#[get("/reverse")]
async fn reverse(
    data: web::Data<HttpState>,
    query: web::Query<Vec<(String, String)>>,
) -> Result<HttpResponse, AppError> {
    let raw = RawQuery::from_pairs(query.into_inner());
    let result = data.geocode_use_case.reverse(&raw).await?;
    Ok(HttpResponse::Ok().json(result))
}

#[post("/search/csv")]
async fn search_csv(
    data: web::Data<HttpState>,
    payload: Multipart,
) -> Result<HttpResponse, AppError> {
    let upload = CsvUpload::read(payload, data.config.max_upload_bytes).await?;
    let file = upload
        .file
        .ok_or_else(|| AppError::validation("A CSV file must be provided in data field"))?;

    let req_id = format!("req_{}", Uuid::new_v4().simple());
    let started_at = Utc::now();
    info!(
        req_id = %req_id,
        status = "created",
        columns = ?upload.options.columns,
        result_columns = ?upload.options.result_columns,
        citycode = ?upload.options.citycode,
        postcode = ?upload.options.postcode,
        file_size = file.bytes.len(),
        started_at = %started_at.to_rfc3339(),
        "CSV geocoding job"
    );

    let pipeline = data
        .geocode_csv_use_case
        .build(file.bytes, upload.options)?;
    let charset = pipeline.format().encoding;
    let (stream, monitor) = pipeline.run();

    actix_web::rt::spawn(async move {
        let outcome = monitor.outcome().await;
        let finished_at = Utc::now();
        let duration_ms = (finished_at - started_at).num_milliseconds();

        match &outcome {
            PipelineOutcome::Completed { rows, bytes } => info!(
                req_id = %req_id,
                status = outcome.status(),
                rows,
                bytes,
                finished_at = %finished_at.to_rfc3339(),
                duration_ms,
                "CSV geocoding job"
            ),
            PipelineOutcome::Failed { error, rows, bytes } => error!(
                req_id = %req_id,
                status = outcome.status(),
                rows,
                bytes,
                stage = %error.stage,
                error = %error.source,
                finished_at = %finished_at.to_rfc3339(),
                duration_ms,
                "CSV geocoding job"
            ),
            PipelineOutcome::Aborted { rows, bytes } => warn!(
                req_id = %req_id,
                status = outcome.status(),
                rows,
                bytes,
                finished_at = %finished_at.to_rfc3339(),
                duration_ms,
                "CSV geocoding job"
            ),
        }
    });

    let file_name = match file.name {
        Some(name) if !name.is_empty() => format!("geocoded-{}", name),
        _ => "geocoded.csv".to_string(),
    };

    Ok(HttpResponse::Ok()
        .content_type(format!("text/csv; charset={}", content_charset(charset)))
        .insert_header(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(file_name)],
        })
        .streaming(stream))
}

fn content_charset(encoding: TextEncoding) -> &'static str {
    match encoding {
        TextEncoding::Utf8 => "utf-8",
        TextEncoding::Latin1 => "iso-8859-1",
    }
}

/// Register every route; shared by the server and the tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(search_csv).service(search).service(reverse);
}

pub fn start_server(state: HttpState) -> std::io::Result<Server> {
    let bind = (state.config.host.clone(), state.config.port);
    let access_log = !state.config.is_production();
    let state = web::Data::new(state);

    info!(host = %bind.0, port = bind.1, "Starting geocoding HTTP server");

    let server = HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(Condition::new(access_log, Logger::default()))
            .wrap(cors)
            .app_data(state.clone())
            .configure(configure)
    })
    .bind(bind)?
    .run();

    Ok(server)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::addok::{AddokClient, BackendRowGeocoder};
    use actix_web::{body, test};

    fn state_for(url: &str) -> web::Data<HttpState> {
        let config = AppConfig {
            addok_service_url: url.to_string(),
            request_timeout_ms: 1000,
            max_upload_bytes: 1024,
            ..Default::default()
        };
        let client = Arc::new(AddokClient::new(&config).unwrap());
        web::Data::new(HttpState {
            geocode_use_case: Arc::new(GeocodeUseCase::new(client.clone())),
            geocode_csv_use_case: Arc::new(GeocodeCsvUseCase::new(
                Arc::new(BackendRowGeocoder::new(client)),
                2,
            )),
            config,
        })
    }

    fn multipart_body(boundary: &str, parts: &[(&str, Option<&str>, &str)]) -> Vec<u8> {
        let mut body = String::new();
        for (name, filename, content) in parts {
            body.push_str(&format!("--{}\r\n", boundary));
            match filename {
                Some(filename) => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: text/csv\r\n\r\n",
                    name, filename
                )),
                None => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                    name
                )),
            }
            body.push_str(content);
            body.push_str("\r\n");
        }
        body.push_str(&format!("--{}--\r\n", boundary));
        body.into_bytes()
    }

    #[actix_web::test]
    async fn test_search_proxies_backend_json() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/search/")
            .match_query(mockito::Matcher::UrlEncoded("q".into(), "bar".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"type":"FeatureCollection","features":[]}"#)
            .create_async()
            .await;

        let app = test::init_service(
            App::new()
                .app_data(state_for(&server.url()))
                .configure(configure),
        )
        .await;
        let req = test::TestRequest::get()
            .uri("/search?q=foo&q=bar&unknown=1")
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["type"], "FeatureCollection");
        mock.assert_async().await;
    }

    #[actix_web::test]
    async fn test_validation_error_is_400_json() {
        let app = test::init_service(
            App::new()
                .app_data(state_for("http://127.0.0.1:9"))
                .configure(configure),
        )
        .await;
        let req = test::TestRequest::get()
            .uri("/reverse?lon=2.3")
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["code"], 400);
        assert_eq!(body["message"], "lon/lat must be present together if defined");
    }

    #[actix_web::test]
    async fn test_upstream_status_is_forwarded() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/search/")
            .match_query(mockito::Matcher::Any)
            .with_status(429)
            .create_async()
            .await;

        let app = test::init_service(
            App::new()
                .app_data(state_for(&server.url()))
                .configure(configure),
        )
        .await;
        let req = test::TestRequest::get().uri("/search?q=paris").to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["message"], "Too Many Requests");
    }

    #[actix_web::test]
    async fn test_csv_requires_file() {
        let app = test::init_service(
            App::new()
                .app_data(state_for("http://127.0.0.1:9"))
                .configure(configure),
        )
        .await;
        let boundary = "XBOUNDARY";
        let req = test::TestRequest::post()
            .uri("/search/csv")
            .insert_header((
                "content-type",
                format!("multipart/form-data; boundary={}", boundary),
            ))
            .set_payload(multipart_body(boundary, &[("columns", None, "adresse")]))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["message"], "A CSV file must be provided in data field");
    }

    #[actix_web::test]
    async fn test_csv_unknown_column_is_rejected() {
        let app = test::init_service(
            App::new()
                .app_data(state_for("http://127.0.0.1:9"))
                .configure(configure),
        )
        .await;
        let boundary = "XBOUNDARY";
        let req = test::TestRequest::post()
            .uri("/search/csv")
            .insert_header((
                "content-type",
                format!("multipart/form-data; boundary={}", boundary),
            ))
            .set_payload(multipart_body(
                boundary,
                &[
                    ("data", Some("adresses.csv"), "adresse,ville\n8 bd du port,Amiens\n"),
                    ("columns", None, "rue"),
                ],
            ))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["message"], "At least one given column name is unknown");
    }

    #[actix_web::test]
    async fn test_csv_is_geocoded_and_streamed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/search/")
            .match_query(mockito::Matcher::UrlEncoded(
                "q".into(),
                "8 bd du port Amiens".into(),
            ))
            .with_status(200)
            .with_body(
                r#"{"features":[{"geometry":{"coordinates":[2.29,49.89]},"properties":{"label":"8 Boulevard du Port 80000 Amiens","score":0.97}}]}"#,
            )
            .create_async()
            .await;

        let app = test::init_service(
            App::new()
                .app_data(state_for(&server.url()))
                .configure(configure),
        )
        .await;
        let boundary = "XBOUNDARY";
        let req = test::TestRequest::post()
            .uri("/search/csv")
            .insert_header((
                "content-type",
                format!("multipart/form-data; boundary={}", boundary),
            ))
            .set_payload(multipart_body(
                boundary,
                &[
                    ("data", Some("adresses.csv"), "adresse;ville\r\n8 bd du port;Amiens\r\n"),
                    ("columns", None, "adresse"),
                    ("columns", None, "ville"),
                    ("result_columns", None, "result_label"),
                    ("result_columns", None, "latitude"),
                ],
            ))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()
                .get("content-disposition")
                .and_then(|v| v.to_str().ok()),
            Some("attachment; filename=\"geocoded-adresses.csv\"")
        );
        let bytes = body::to_bytes(resp.into_body()).await.unwrap();
        assert_eq!(
            std::str::from_utf8(&bytes).unwrap(),
            "adresse;ville;result_label;latitude\r\n8 bd du port;Amiens;8 Boulevard du Port 80000 Amiens;49.89\r\n"
        );
    }
}
