//! HTTP router.
//!
//! All routes live under `/api/`. Uploads are capped by `DefaultBodyLimit`
//! slightly above the spreadsheet size limit to leave room for multipart
//! framing; the spreadsheet limit itself is enforced on the decoded file.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue};
use axum::routing::{get, post};
use axum::Router;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::api::endpoints;
use crate::api::types::ApiContext;
use crate::core_state::CoreState;
use crate::pipeline::import::MAX_FILE_SIZE;

const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// Build the API router over shared state.
pub fn api_router(core: Arc<CoreState>) -> Router {
    build_router(ApiContext::new(core))
}

fn build_router(ctx: ApiContext) -> Router {
    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    let routes = Router::new()
        .route("/health", get(endpoints::health::check))
        .route("/stats", get(endpoints::patients::stats))
        .route(
            "/patients",
            get(endpoints::patients::list).post(endpoints::patients::create),
        )
        .route(
            "/patients/:lab",
            get(endpoints::patients::detail).delete(endpoints::patients::remove),
        )
        .route("/imports/patients", post(endpoints::imports::patients))
        .route("/imports/review", post(endpoints::imports::review))
        .route("/templates/annotate", post(endpoints::templates::annotate))
        .route("/reports/:lab", get(endpoints::reports::download))
        .with_state(ctx);

    Router::new()
        .nest("/api", routes)
        .layer(DefaultBodyLimit::max(MAX_FILE_SIZE as usize + MULTIPART_OVERHEAD))
        // Responses carry patient data
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use tower::ServiceExt;

    use crate::core_state::test_settings;

    const BOUNDARY: &str = "genereport-test-boundary";

    const PATIENT_CSV: &str = "\
Reported date,Lab. no.,IM Lab. no.,Patient name,DOB,Sex/Age
2024-01-15,24IG001731,IM662,Chan Tai Man,12/04/1990,M/34
15/01/2024,,IM663,Wong Siu Ming,,F/2
";

    const REVIEW_CSV: &str = "\
,Variant Info,,,IM662,
Reportable Variant,Gene Names,HGVS c. (Clinically Relevant),HGVS p. (Clinically Relevant),Zygosity,Title
,KCNQ2,c.100C>T,p.Arg34Cys,Het,Epilepsy
A,SCN1A,c.5536A>G,p.Lys1846Glu,Het,Dravet syndrome
";

    fn test_app() -> (Router, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let core = Arc::new(CoreState::new(test_settings(dir.path())));
        (api_router(core), dir)
    }

    fn multipart_request(uri: &str, file_name: &str, content: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json(response: Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    async fn import_patients(app: &Router) -> serde_json::Value {
        let response = app
            .clone()
            .oneshot(multipart_request(
                "/api/imports/patients",
                "patients.csv",
                PATIENT_CSV.as_bytes(),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        json(response).await
    }

    #[tokio::test]
    async fn health_reports_version_and_count() {
        let (app, _dir) = test_app();
        let response = app.oneshot(get("/api/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("cache-control").unwrap(), "no-store");
        let body = json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], crate::config::APP_VERSION);
        assert_eq!(body["patients"], 0);
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let (app, _dir) = test_app();
        let response = app.oneshot(get("/api/nonexistent")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn import_then_list_and_lookup() {
        let (app, _dir) = test_app();
        let summary = import_patients(&app).await;
        assert_eq!(summary["inserted"], 2);
        assert_eq!(summary["format"], "csv");

        let list = json(app.clone().oneshot(get("/api/patients?limit=1")).await.unwrap()).await;
        assert_eq!(list["total"], 2);
        assert_eq!(list["limit"], 1);
        assert_eq!(list["patients"].as_array().unwrap().len(), 1);

        let response = app.clone().oneshot(get("/api/patients/im663")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let detail = json(response).await;
        assert_eq!(detail["patient"]["name"], "Wong Siu Ming");
        assert_eq!(detail["findings"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn lookup_rejects_invalid_lab_number() {
        let (app, _dir) = test_app();
        let response = app.oneshot(get("/api/patients/not-a-number")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json(response).await;
        assert_eq!(body["error"]["message"], "Invalid lab number format");
    }

    #[tokio::test]
    async fn lookup_missing_patient_returns_404() {
        let (app, _dir) = test_app();
        let response = app.oneshot(get("/api/patients/IM999")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json(response).await["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn create_then_duplicate_conflicts() {
        let (app, _dir) = test_app();
        let request = || {
            Request::builder()
                .method("POST")
                .uri("/api/patients")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"im_lab_number":" IM700 ","name":"Ho Wai"}"#))
                .unwrap()
        };

        let response = app.clone().oneshot(request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = json(response).await;
        assert_eq!(created["im_lab_number"], "IM700");
        assert!(created["id"].as_i64().is_some());

        let response = app.oneshot(request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn created_keys_match_imported_keys() {
        let (app, _dir) = test_app();
        let request = Request::builder()
            .method("POST")
            .uri("/api/patients")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"im_lab_number":"im 700","name":"Ho Wai"}"#))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(json(response).await["im_lab_number"], "IM700");

        let response = app.clone().oneshot(get("/api/patients/IM700")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["patient"]["name"], "Ho Wai");

        let response = app
            .clone()
            .oneshot(multipart_request(
                "/api/imports/patients",
                "more.csv",
                b"IM Lab. no.,Patient name\nIM700,Ho Wai\n",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let summary = json(response).await;
        assert_eq!(summary["inserted"], 0);
        assert_eq!(summary["duplicates"], 1);

        let health = json(app.oneshot(get("/api/health")).await.unwrap()).await;
        assert_eq!(health["patients"], 1);
    }

    #[tokio::test]
    async fn legacy_key_reachable_for_lookup_and_delete() {
        let (app, _dir) = test_app();
        let response = app
            .clone()
            .oneshot(multipart_request(
                "/api/imports/patients",
                "legacy.csv",
                b"Lab. no.,Patient name\nOLD-0042,Legacy Case\n",
            ))
            .await
            .unwrap();
        assert_eq!(json(response).await["inserted"], 1);

        let response = app.clone().oneshot(get("/api/patients/old-0042")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let delete = Request::builder()
            .method("DELETE")
            .uri("/api/patients/OLD-0042")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(delete).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app.oneshot(get("/api/patients/OLD-0042")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn create_without_key_rejected() {
        let (app, _dir) = test_app();
        let request = Request::builder()
            .method("POST")
            .uri("/api/patients")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"name":"Nobody"}"#))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn delete_patient_then_404() {
        let (app, _dir) = test_app();
        import_patients(&app).await;

        let delete = || {
            Request::builder()
                .method("DELETE")
                .uri("/api/patients/IM662")
                .body(Body::empty())
                .unwrap()
        };
        let response = app.clone().oneshot(delete()).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app.oneshot(delete()).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_policy_is_bad_request() {
        let (app, _dir) = test_app();
        let response = app
            .oneshot(multipart_request(
                "/api/imports/patients?policy=merge",
                "patients.csv",
                PATIENT_CSV.as_bytes(),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn binary_upload_is_unsupported() {
        let (app, _dir) = test_app();
        let response = app
            .oneshot(multipart_request(
                "/api/imports/patients",
                "scan.pdf",
                &[0x00, 0x01, 0x02, 0xFF, 0xFE, 0x00, 0x00, 0x10],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn review_updates_summary_and_stats() {
        let (app, _dir) = test_app();
        import_patients(&app).await;

        let response = app
            .clone()
            .oneshot(multipart_request(
                "/api/imports/review",
                "IM662_review.csv",
                REVIEW_CSV.as_bytes(),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let outcome = json(response).await;
        assert_eq!(outcome["lab_number"], "IM662");
        assert_eq!(outcome["findings"].as_array().unwrap().len(), 1);

        let detail = json(app.clone().oneshot(get("/api/patients/IM662")).await.unwrap()).await;
        assert_eq!(detail["patient"]["type_of_findings"], "A");
        assert_eq!(detail["findings"][0]["gene"], "SCN1A");

        let stats = json(app.oneshot(get("/api/stats")).await.unwrap()).await;
        assert_eq!(stats["patients"]["total"], 2);
        assert_eq!(stats["patients"]["with_findings"], 1);
        assert_eq!(stats["recent_imports"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn review_for_unknown_patient_is_404() {
        let (app, _dir) = test_app();
        let response = app
            .oneshot(multipart_request(
                "/api/imports/review?lab_number=IM999",
                "review.csv",
                REVIEW_CSV.as_bytes(),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn annotate_returns_workbook_attachment() {
        let (app, _dir) = test_app();
        let csv = "Chr:Pos,Ref/Alt,Gene Names,Zygosity\n1:1000,A/G,SCN1A,Het\n";
        let response = app
            .oneshot(multipart_request("/api/templates/annotate", "IM662.csv", csv.as_bytes()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("x-template-kind").unwrap(), "singleton");
        assert_eq!(
            response.headers().get("content-disposition").unwrap(),
            "attachment; filename=\"IM662_review.xlsx\""
        );
        let body = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        assert_eq!(&body[0..2], b"PK");
    }

    #[tokio::test]
    async fn report_download_saves_copy() {
        let (app, dir) = test_app();
        import_patients(&app).await;

        let response = app.oneshot(get("/api/reports/IM662")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("content-type").unwrap(), "application/pdf");
        let disposition = response
            .headers()
            .get("content-disposition")
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(disposition.contains("patient_info_24IG001731_"));

        let body = to_bytes(response.into_body(), 4 * 1024 * 1024).await.unwrap();
        assert_eq!(&body[0..4], b"%PDF");

        let saved: Vec<_> = std::fs::read_dir(dir.path().join("reports"))
            .unwrap()
            .collect();
        assert_eq!(saved.len(), 1);
    }

    #[tokio::test]
    async fn report_for_missing_patient_is_404() {
        let (app, _dir) = test_app();
        let response = app.oneshot(get("/api/reports/IM404")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
