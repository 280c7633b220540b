use std::sync::Arc;

use axum::{
    extract::{
        multipart::MultipartRejection, rejection::JsonRejection, DefaultBodyLimit, Multipart,
        Path, State,
    },
    http::{Method, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use classhub_shared::RecipientType;
use classhub_store::{Material, Message};

use crate::blob_store::BlobStore;
use crate::caller::Caller;
use crate::config::ServerConfig;
use crate::dispatch::{self, SendMessageRequest, SentMessage};
use crate::download::{self, MaterialDownload};
use crate::error::ServerError;
use crate::repository::MetadataRepository;
use crate::upload::{self, UploadedMaterial};

/// Room for multipart boundaries and the small text fields on top of the
/// file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub blob_store: Arc<BlobStore>,
    pub repository: Arc<dyn MetadataRepository>,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    let body_limit = state.blob_store.max_size() + MULTIPART_OVERHEAD;

    Router::new()
        .route("/health", get(health_check))
        .route("/info", get(server_info))
        .route("/materials", post(material_upload).get(material_list))
        .route("/materials/:id", get(material_download))
        .route("/messages", post(message_send).get(message_list))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ServerInfoResponse {
    name: String,
    version: &'static str,
    max_upload_size: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MaterialSummary {
    id: Uuid,
    title: String,
    file_name: String,
    file_size: i64,
    file_type: String,
    class: Option<String>,
    subject: Option<String>,
    downloads: i64,
    upload_date: DateTime<Utc>,
}

impl From<Material> for MaterialSummary {
    fn from(m: Material) -> Self {
        Self {
            id: m.id,
            title: m.title,
            file_name: m.file_name,
            file_size: m.file_size,
            file_type: m.file_type,
            class: m.class,
            subject: m.subject,
            downloads: m.downloads,
            upload_date: m.upload_date,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MessageSummary {
    id: Uuid,
    recipient: String,
    recipient_type: RecipientType,
    subject: String,
    body: String,
    sent_date: DateTime<Utc>,
    is_read: bool,
    read_date: Option<DateTime<Utc>>,
}

impl From<Message> for MessageSummary {
    fn from(m: Message) -> Self {
        Self {
            id: m.id,
            recipient: m.recipient,
            recipient_type: m.recipient_type,
            subject: m.subject,
            body: m.body,
            sent_date: m.sent_date,
            is_read: m.is_read,
            read_date: m.read_date,
        }
    }
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn server_info(State(state): State<AppState>) -> Json<ServerInfoResponse> {
    Json(ServerInfoResponse {
        name: state.config.instance_name.clone(),
        version: env!("CARGO_PKG_VERSION"),
        max_upload_size: state.blob_store.max_size(),
    })
}

async fn material_upload(
    State(state): State<AppState>,
    Caller(caller): Caller,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<UploadedMaterial>), ServerError> {
    let multipart =
        multipart.map_err(|e| ServerError::Validation(format!("Expected multipart form: {e}")))?;

    let uploaded = upload::receive(
        &state.blob_store,
        state.repository.as_ref(),
        &caller,
        multipart,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(uploaded)))
}

async fn material_download(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<String>,
) -> Result<MaterialDownload, ServerError> {
    let id = Uuid::parse_str(&id)
        .map_err(|_| ServerError::NotFound("Material not found".to_string()))?;

    let download = download::open(&state.blob_store, state.repository.as_ref(), id).await?;
    info!(
        id = %id,
        caller = %caller,
        downloads = download.material().downloads,
        "Serving material download"
    );
    Ok(download)
}

async fn material_list(
    State(state): State<AppState>,
    Caller(caller): Caller,
) -> Result<Json<Vec<MaterialSummary>>, ServerError> {
    let materials = state.repository.list_materials(caller).await?;
    Ok(Json(materials.into_iter().map(MaterialSummary::from).collect()))
}

async fn message_send(
    State(state): State<AppState>,
    Caller(caller): Caller,
    request: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SentMessage>), ServerError> {
    let Json(request) =
        request.map_err(|e| ServerError::Validation(format!("Invalid message body: {e}")))?;

    let sent = dispatch::send(state.repository.as_ref(), &caller, request).await?;
    Ok((StatusCode::CREATED, Json(sent)))
}

async fn message_list(
    State(state): State<AppState>,
    Caller(caller): Caller,
) -> Result<Json<Vec<MessageSummary>>, ServerError> {
    let messages = state.repository.list_messages(caller).await?;
    Ok(Json(messages.into_iter().map(MessageSummary::from).collect()))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{header, Request, Response};
    use tower::ServiceExt;

    use super::*;
    use crate::test_support::{blob_count, FailingRepository, TestContext, TEST_MAX_UPLOAD};

    const BOUNDARY: &str = "classhub-test-boundary";

    fn app(ctx: &TestContext) -> Router {
        app_with(ctx, Arc::new(ctx.repo.clone()))
    }

    fn app_with(ctx: &TestContext, repository: Arc<dyn MetadataRepository>) -> Router {
        build_router(AppState {
            blob_store: ctx.blobs.clone(),
            repository,
            config: Arc::new(ServerConfig::default()),
        })
    }

    enum Part<'a> {
        Text(&'a str, &'a str),
        File {
            name: &'a str,
            mime: Option<&'a str>,
            bytes: &'a [u8],
        },
    }

    fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match part {
                Part::Text(name, value) => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n")
                            .as_bytes(),
                    );
                    body.extend_from_slice(value.as_bytes());
                }
                Part::File { name, mime, bytes } => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"file\"; filename=\"{name}\"\r\n"
                        )
                        .as_bytes(),
                    );
                    if let Some(mime) = mime {
                        body.extend_from_slice(format!("Content-Type: {mime}\r\n").as_bytes());
                    }
                    body.extend_from_slice(b"\r\n");
                    body.extend_from_slice(bytes);
                }
            }
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload_request(parts: &[Part<'_>]) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/materials")
            .header("x-user-id", "teacher-1")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(parts)))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header("x-user-id", "teacher-1")
            .body(Body::empty())
            .unwrap()
    }

    fn message_request(json: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/messages")
            .header("x-user-id", "teacher-1")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response<Body>) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn upload(app: &Router, parts: &[Part<'_>]) -> serde_json::Value {
        let response = app.clone().oneshot(upload_request(parts)).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        json_body(response).await
    }

    #[tokio::test]
    async fn syllabus_upload_and_download() {
        let ctx = TestContext::new().await;
        let app = app(&ctx);
        let pdf = vec![0x25u8; 1024];

        let uploaded = upload(
            &app,
            &[Part::File {
                name: "syllabus.pdf",
                mime: Some("application/pdf"),
                bytes: &pdf,
            }],
        )
        .await;
        assert_eq!(uploaded["title"], "syllabus.pdf");
        assert_eq!(uploaded["fileName"], "syllabus.pdf");
        assert_eq!(uploaded["fileSize"], 1024);
        assert!(uploaded["uploadDate"].is_string());
        assert!(uploaded.get("filePath").is_none());

        let id = uploaded["id"].as_str().unwrap().to_string();
        let before = ctx
            .repo
            .find_material(id.parse().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(before.downloads, 0);

        let response = app
            .clone()
            .oneshot(get_request(&format!("/materials/{id}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers().clone();
        assert_eq!(headers[header::CONTENT_TYPE], "application/pdf");
        assert_eq!(
            headers[header::CONTENT_DISPOSITION],
            "attachment; filename=\"syllabus.pdf\""
        );
        assert_eq!(headers[header::CONTENT_LENGTH], "1024");

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(bytes.len(), 1024);
        assert_eq!(&bytes[..], &pdf[..]);

        let after = ctx
            .repo
            .find_material(id.parse().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after.downloads, 1);
    }

    #[tokio::test]
    async fn text_fields_may_follow_the_file() {
        let ctx = TestContext::new().await;
        let app = app(&ctx);

        let uploaded = upload(
            &app,
            &[
                Part::File {
                    name: "quiz.docx",
                    mime: None,
                    bytes: b"quiz",
                },
                Part::Text("title", "  Chapter 4 quiz "),
                Part::Text("class", "8C"),
                Part::Text("subject", ""),
            ],
        )
        .await;
        assert_eq!(uploaded["title"], "Chapter 4 quiz");

        let stored = ctx
            .repo
            .find_material(uploaded["id"].as_str().unwrap().parse().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.file_type, "application/octet-stream");
        assert_eq!(stored.class.as_deref(), Some("8C"));
        assert_eq!(stored.subject, None);
    }

    #[tokio::test]
    async fn upload_without_file_is_rejected() {
        let ctx = TestContext::new().await;
        let response = app(&ctx)
            .oneshot(upload_request(&[Part::Text("title", "Orphan title")]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["message"], "No file uploaded");
        assert_eq!(blob_count(&ctx.blobs), 0);
    }

    #[tokio::test]
    async fn upload_requires_caller() {
        let ctx = TestContext::new().await;
        let mut request = upload_request(&[Part::File {
            name: "a.pdf",
            mime: None,
            bytes: b"a",
        }]);
        request.headers_mut().remove("x-user-id");

        let response = app(&ctx).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(blob_count(&ctx.blobs), 0);
    }

    #[tokio::test]
    async fn oversize_upload_leaves_no_bytes() {
        let ctx = TestContext::new().await;
        let big = vec![0u8; TEST_MAX_UPLOAD + 1];

        let response = app(&ctx)
            .oneshot(upload_request(&[Part::File {
                name: "huge.pptx",
                mime: None,
                bytes: &big,
            }]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(blob_count(&ctx.blobs), 0);
    }

    #[tokio::test]
    async fn oversize_text_fields_are_413() {
        let ctx = TestContext::new().await;
        let notes = "x".repeat(TEST_MAX_UPLOAD + MULTIPART_OVERHEAD + 1);

        let response = app(&ctx)
            .oneshot(upload_request(&[
                Part::Text("title", &notes),
                Part::File {
                    name: "a.pdf",
                    mime: None,
                    bytes: b"a",
                },
            ]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(json_body(response).await["message"].is_string());
        assert_eq!(blob_count(&ctx.blobs), 0);
    }

    #[tokio::test]
    async fn metadata_failure_returns_500_without_orphan() {
        let ctx = TestContext::new().await;
        let app = app_with(&ctx, Arc::new(FailingRepository::new(ctx.repo.clone())));

        let response = app
            .oneshot(upload_request(&[Part::File {
                name: "syllabus.pdf",
                mime: Some("application/pdf"),
                bytes: b"%PDF",
            }]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(json_body(response).await["message"].is_string());
        assert_eq!(blob_count(&ctx.blobs), 0);
    }

    #[tokio::test]
    async fn unknown_or_malformed_id_is_404() {
        let ctx = TestContext::new().await;
        let app = app(&ctx);

        for uri in [format!("/materials/{}", Uuid::new_v4()), "/materials/not-a-uuid".to_string()] {
            let response = app.clone().oneshot(get_request(&uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
            assert!(json_body(response).await["message"].is_string());
        }
    }

    #[tokio::test]
    async fn removed_bytes_are_404() {
        let ctx = TestContext::new().await;
        let app = app(&ctx);
        let uploaded = upload(
            &app,
            &[Part::File {
                name: "notes.txt",
                mime: Some("text/plain"),
                bytes: b"notes",
            }],
        )
        .await;
        let id: Uuid = uploaded["id"].as_str().unwrap().parse().unwrap();

        let stored = ctx.repo.find_material(id).await.unwrap().unwrap();
        ctx.blobs.delete(&stored.file_path).await.unwrap();

        let response = app
            .oneshot(get_request(&format!("/materials/{id}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_downloads_are_all_counted() {
        const N: usize = 25;
        let ctx = TestContext::new().await;
        let app = app(&ctx);
        let uploaded = upload(
            &app,
            &[Part::File {
                name: "handout.pdf",
                mime: Some("application/pdf"),
                bytes: b"handout",
            }],
        )
        .await;
        let id: Uuid = uploaded["id"].as_str().unwrap().parse().unwrap();

        let tasks: Vec<_> = (0..N)
            .map(|_| {
                let app = app.clone();
                tokio::spawn(async move {
                    let response = app
                        .oneshot(get_request(&format!("/materials/{id}")))
                        .await
                        .unwrap();
                    assert_eq!(response.status(), StatusCode::OK);
                    axum::body::to_bytes(response.into_body(), usize::MAX)
                        .await
                        .unwrap()
                })
            })
            .collect();
        for task in tasks {
            assert_eq!(&task.await.unwrap()[..], b"handout");
        }

        let stored = ctx.repo.find_material(id).await.unwrap().unwrap();
        assert_eq!(stored.downloads, N as i64);
    }

    #[tokio::test]
    async fn list_materials_hides_storage_path() {
        let ctx = TestContext::new().await;
        let app = app(&ctx);
        upload(
            &app,
            &[Part::File {
                name: "a.pdf",
                mime: Some("application/pdf"),
                bytes: b"a",
            }],
        )
        .await;

        let response = app.oneshot(get_request("/materials")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let listed = json_body(response).await;
        let listed = listed.as_array().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0]["fileName"], "a.pdf");
        assert_eq!(listed[0]["downloads"], 0);
        assert!(listed[0].get("filePath").is_none());
    }

    #[tokio::test]
    async fn send_message_returns_projection() {
        let ctx = TestContext::new().await;
        let app = app(&ctx);

        let response = app
            .clone()
            .oneshot(message_request(serde_json::json!({
                "recipient": "Parents of 4A",
                "recipientType": "group",
                "subject": "Sports day",
                "body": "Bring water bottles."
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let sent = json_body(response).await;
        assert_eq!(sent["recipient"], "Parents of 4A");
        assert_eq!(sent["subject"], "Sports day");
        assert!(sent["id"].is_string());
        assert!(sent["sentDate"].is_string());

        let response = app.oneshot(get_request("/messages")).await.unwrap();
        let listed = json_body(response).await;
        assert_eq!(listed[0]["recipientType"], "group");
        assert_eq!(listed[0]["isRead"], false);
        assert!(listed[0]["readDate"].is_null());
    }

    #[tokio::test]
    async fn empty_subject_is_400_and_nothing_stored() {
        let ctx = TestContext::new().await;
        let before = ctx.repo.database().count_messages().unwrap();

        let response = app(&ctx)
            .oneshot(message_request(serde_json::json!({
                "recipient": "Parents",
                "subject": "",
                "body": "Hello"
            })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(response).await["message"].is_string());
        assert_eq!(ctx.repo.database().count_messages().unwrap(), before);
    }

    #[tokio::test]
    async fn malformed_message_json_is_400() {
        let ctx = TestContext::new().await;
        let request = Request::builder()
            .method("POST")
            .uri("/messages")
            .header("x-user-id", "teacher-1")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();

        let response = app(&ctx).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn health_and_info() {
        let ctx = TestContext::new().await;
        let app = app(&ctx);

        let response = app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(json_body(response).await["status"], "ok");

        let response = app
            .oneshot(Request::get("/info").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let info = json_body(response).await;
        assert_eq!(info["maxUploadSize"], TEST_MAX_UPLOAD);
    }
}
