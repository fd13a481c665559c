//! Inbound HTTP endpoints.
//!
//! The daemon pushes repository status here whenever it changes, and asks
//! for display names of opaque asset paths.

pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;
pub mod translate;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::AppState;
pub use server::TetherServer;
pub use translate::{FriendlyName, NameTranslator, StemTranslator};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::Request;
    use tower::util::ServiceExt;

    use tether_client::{MockDaemon, NonceStore, RemoteServiceClient};

    fn app(dir: &std::path::Path) -> (axum::Router, Arc<RemoteServiceClient>) {
        let client = Arc::new(RemoteServiceClient::with_transport(
            Arc::new(MockDaemon::new("alice")),
            NonceStore::fixed("nonce"),
        ));
        let state = AppState { client: client.clone(), translator: Arc::new(StemTranslator::new(dir)) };
        (router::build_router(state), client)
    }

    fn post(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = app(dir.path());
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(json_body(response).await, serde_json::json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn status_push_replaces_cached_status() {
        let dir = tempfile::tempdir().unwrap();
        let (app, client) = app(dir.path());
        let body = r#"{"branch": "main", "modifiedFiles": [{"path": "Content/A.uasset"}]}"#;

        let response = app.oneshot(post(router::STATUS_UPDATE_PATH, body)).await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(json_body(response).await, serde_json::json!({}));

        let snapshot = client.status_snapshot().unwrap();
        assert_eq!(snapshot.status.branch, "main");
        assert!(snapshot.status.is_modified("Content/A.uasset"));
    }

    #[tokio::test]
    async fn undecodable_push_still_acknowledged() {
        let dir = tempfile::tempdir().unwrap();
        let (app, client) = app(dir.path());

        let response = app.oneshot(post(router::STATUS_UPDATE_PATH, "not json")).await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(json_body(response).await, serde_json::json!({}));
        assert!(client.status_snapshot().is_none());
    }

    #[tokio::test]
    async fn friendly_names_translates_each_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("Content")).unwrap();
        std::fs::write(dir.path().join("Content/Hero.uasset"), b"asset").unwrap();
        let (app, _) = app(dir.path());

        let body = r#"{"fileNames": ["Content/Hero.uasset", "Content/Missing.uasset"]}"#;
        let response = app.oneshot(post(router::FRIENDLY_NAMES_PATH, body)).await.unwrap();
        assert_eq!(response.status(), 200);

        let json = json_body(response).await;
        let names = json["names"].as_array().unwrap();
        assert_eq!(names.len(), 2);
        assert_eq!(names[0]["assetName"], "Hero");
        assert_eq!(names[0]["filePath"], "Content/Hero.uasset");
        assert!(names[1]["error"].as_str().unwrap().starts_with("Failed to find package"));
    }

    #[tokio::test]
    async fn status_update_rejects_get() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = app(dir.path());
        let response = app
            .oneshot(Request::builder().uri(router::STATUS_UPDATE_PATH).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), 405);
    }
}
