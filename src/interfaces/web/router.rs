use axum::{
    Router,
    body::Body,
    http::{HeaderValue, Method, Request, header},
    middleware,
    middleware::Next,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;

use super::AppState;
use super::handlers::errors;

fn build_localhost_cors(api_port: u16) -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        format!("http://127.0.0.1:{}", api_port),
        format!("http://localhost:{}", api_port),
    ]
    .iter()
    .filter_map(|o| o.parse().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any)
}

pub(crate) fn build_api_router(state: AppState) -> Router {
    Router::new()
        .route("/api/errors/sync", post(errors::sync_endpoint))
        .route(
            "/api/errors/signatures",
            get(errors::list_signatures_endpoint),
        )
        .route("/api/errors/summary", get(errors::summary_endpoint))
        .route(
            "/api/errors/signatures/{hash}/remediate",
            post(errors::remediate_endpoint),
        )
        .route("/api/errors/activity", get(errors::activity_endpoint))
        .route("/api/logs", get(super::sse_logs_endpoint))
        .layer(middleware::from_fn(security_headers))
        .layer(build_localhost_cors(state.api_port))
        .with_state(state)
}

async fn security_headers(req: Request<Body>, next: Next) -> axum::response::Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pipeline::testkit::{Harness, line};
    use axum::http::StatusCode;
    use std::sync::Arc;
    use tower::util::ServiceExt;

    fn state_for(h: &Harness) -> AppState {
        let (log_tx, _) = tokio::sync::broadcast::channel(16);
        AppState {
            pipeline: h.pipeline.clone(),
            log_tx,
            api_port: 17990,
        }
    }

    async fn json_request(
        app: Router,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut req = Request::builder().method(method).uri(path);
        let body = match body {
            Some(json) => {
                req = req.header("content-type", "application/json");
                Body::from(serde_json::to_string(&json).unwrap())
            }
            None => Body::empty(),
        };
        let resp = app.oneshot(req.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let body_bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let json: serde_json::Value =
            serde_json::from_slice(&body_bytes).unwrap_or(serde_json::json!({}));
        (status, json)
    }

    #[tokio::test]
    async fn security_headers_present_on_responses() {
        let h = Harness::new().await;
        let app = build_api_router(state_for(&h));
        let req = Request::builder()
            .uri("/api/errors/summary")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();

        assert_eq!(
            resp.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
        assert_eq!(resp.headers().get("x-frame-options").unwrap(), "DENY");
        assert!(resp.headers().get("content-security-policy").is_some());
    }

    #[tokio::test]
    async fn sync_then_list_and_summary() {
        let h = Harness::new().await;
        h.append(&line("connect ECONNREFUSED 10.0.0.1:5432"));
        h.append(&line("connect ECONNREFUSED 10.0.0.1:5433"));
        let app = build_api_router(state_for(&h));

        let (status, json) = json_request(app.clone(), Method::POST, "/api/errors/sync", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
        assert_eq!(json["result"]["processed_events"], "2");

        let (status, json) = json_request(
            app.clone(),
            Method::GET,
            "/api/errors/signatures?days=7&include_raw=true",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["meta"]["days"], 7);
        assert_eq!(json["signatures"].as_array().unwrap().len(), 1);
        assert_eq!(json["signatures"][0]["window_count"], "2");
        assert!(json["signatures"][0]["raw_sample"].is_string());

        let (status, json) = json_request(app, Method::GET, "/api/errors/summary", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["summary"]["totals"]["total_errors"], "2");
        assert_eq!(json["summary"]["trend"].as_array().unwrap().len(), 14);
    }

    #[tokio::test]
    async fn invalid_days_is_a_bad_request() {
        let h = Harness::new().await;
        let app = build_api_router(state_for(&h));
        let (status, json) =
            json_request(app, Method::GET, "/api/errors/summary?days=400", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["success"], false);
        assert!(json["error"].as_str().unwrap().contains("days"));
    }

    #[tokio::test]
    async fn remediating_an_unknown_signature_is_not_found() {
        let h = Harness::new().await;
        let app = build_api_router(state_for(&h));
        let (status, json) = json_request(
            app,
            Method::POST,
            "/api/errors/signatures/deadbeef/remediate",
            Some(serde_json::json!({ "mode": "create" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["success"], false);
    }

    #[tokio::test]
    async fn remediate_creates_a_work_order() {
        let h = Harness::new().await;
        h.append(&line("SqliteError: database is locked"));
        let app = build_api_router(state_for(&h));
        json_request(app.clone(), Method::POST, "/api/errors/sync", None).await;
        let (_, list) = json_request(app.clone(), Method::GET, "/api/errors/signatures", None).await;
        let hash = list["signatures"][0]["signature_hash"].as_str().unwrap().to_string();

        let (status, json) = json_request(
            app.clone(),
            Method::POST,
            &format!("/api/errors/signatures/{hash}/remediate"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["result"]["mode"], "create");
        assert_eq!(json["result"]["started"], false);
        let id = json["result"]["work_order_id"].as_str().unwrap();
        assert!(h.store.get_work_order(id).await.unwrap().is_some());

        let (status, json) =
            json_request(app, Method::GET, "/api/errors/activity?limit=5", None).await;
        assert_eq!(status, StatusCode::OK);
        let kinds: Vec<_> = json["events"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["kind"].as_str().unwrap().to_string())
            .collect();
        assert!(kinds.contains(&"error_remediation.created".to_string()));
    }

    #[tokio::test]
    async fn method_not_allowed_returns_405() {
        let h = Harness::new().await;
        let app = build_api_router(state_for(&h));
        let req = Request::builder()
            .method(Method::DELETE)
            .uri("/api/errors/summary")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
