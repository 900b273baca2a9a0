mod common;

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use common::{Fixture, png_bytes};
use tryon_server::{
    pipeline::GenerationPipeline,
    web::{self, AppState},
};

const BOUNDARY: &str = "tryon-test-boundary";

fn app(fixture: &Fixture, pipeline: Option<GenerationPipeline>) -> Router {
    let missing_settings = if pipeline.is_some() {
        Vec::new()
    } else {
        vec!["OPENAI_API_KEY", "FACESWAP_API_URL"]
    };
    let state = AppState {
        artifacts: Arc::new(fixture.artifacts.clone()),
        catalog: fixture.catalog.clone(),
        records: fixture.records.clone(),
        pipeline: pipeline.map(Arc::new),
        missing_settings,
    };
    web::router(state, fixture.dir.path(), 5 * 1024 * 1024)
}

fn multipart_body(face: Option<&[u8]>, selections: Option<&str>, author: Option<&str>) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some(face) = face {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"face_image\"; filename=\"me.png\"\r\nContent-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(face);
        body.extend_from_slice(b"\r\n");
    }
    for (name, value) in [("selections", selections), ("author_id", author)] {
        if let Some(value) = value {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn generate_request(body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/generate")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::String(
        String::from_utf8_lossy(&bytes).into_owned(),
    ));
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

const SELECTIONS: &str =
    r#"[{"category_id":"c1","selected_clothing_id":"i1","selected_color":"Blue"}]"#;

#[tokio::test]
async fn root_says_hello() {
    let fixture = Fixture::new().await;
    let (status, body) = send(app(&fixture, None), get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Server says: Hello World!");
}

#[tokio::test]
async fn categories_and_items_are_listed() {
    let fixture = Fixture::new().await;

    let (status, body) = send(app(&fixture, None), get("/categories")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);

    let (status, body) = send(app(&fixture, None), get("/category?categoryId=c2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["name"], "Chinos");
    assert_eq!(body[0]["colors"][0], "Khaki");
}

#[tokio::test]
async fn unknown_category_is_404_and_missing_param_is_400() {
    let fixture = Fixture::new().await;

    let (status, body) = send(app(&fixture, None), get("/category?categoryId=zzz")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    let (status, _) = send(app(&fixture, None), get("/category")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn generate_creates_record_visible_in_history() {
    let fixture = Fixture::new().await;
    let generator = fixture.generator();
    let pipeline = fixture.pipeline(generator.clone(), fixture.swapper(), Arc::new(fixture.artifacts.clone()));
    let app = app(&fixture, Some(pipeline));

    let body = multipart_body(Some(&png_bytes()), Some(SELECTIONS), Some("ana"));
    let (status, item) = send(app.clone(), generate_request(body)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(item["author_id"], "ana");
    assert!(item["face_image_url"].as_str().unwrap().contains("/public/faces/"));
    assert_eq!(generator.calls(), 1);

    let (status, history) = send(app.clone(), get("/history?authorId=ana")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history.as_array().unwrap().len(), 1);
    assert_eq!(history[0]["id"], item["id"]);

    let (_, other) = send(app.clone(), get("/history?authorId=bo")).await;
    assert!(other.as_array().unwrap().is_empty());

    let (_, gallery) = send(app, get("/gallery")).await;
    assert_eq!(gallery.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn generate_rejects_bad_input_without_provider_calls() {
    let fixture = Fixture::new().await;
    let generator = fixture.generator();
    let pipeline = fixture.pipeline(generator.clone(), fixture.swapper(), Arc::new(fixture.artifacts.clone()));
    let app = app(&fixture, Some(pipeline));

    let no_face = multipart_body(None, Some(SELECTIONS), None);
    let (status, body) = send(app.clone(), generate_request(no_face)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let not_an_image = multipart_body(Some(b"definitely not a png"), Some(SELECTIONS), None);
    let (status, _) = send(app.clone(), generate_request(not_an_image)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let bad_json = multipart_body(Some(&png_bytes()), Some("[{"), None);
    let (status, _) = send(app.clone(), generate_request(bad_json)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let empty = multipart_body(Some(&png_bytes()), Some("[]"), None);
    let (status, _) = send(app.clone(), generate_request(empty)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let unknown = multipart_body(
        Some(&png_bytes()),
        Some(r#"[{"category_id":"c1","selected_clothing_id":"nope","selected_color":"Red"}]"#),
        None,
    );
    let (status, body) = send(app, generate_request(unknown)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["stage"], "RESOLVING");

    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn generate_without_provider_settings_is_server_error() {
    let fixture = Fixture::new().await;
    let body = multipart_body(Some(&png_bytes()), Some(SELECTIONS), None);
    let (status, body) = send(app(&fixture, None), generate_request(body)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "CONFIGURATION_ERROR");
    assert!(body["error"].as_str().unwrap().contains("OPENAI_API_KEY"));
}

#[tokio::test]
async fn persisted_artifacts_are_served_under_public() {
    let fixture = Fixture::new().await;
    let face = fixture.upload_face().await;
    let response = app(&fixture, None)
        .oneshot(get(&format!("/public/{}", face.key)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(bytes.as_ref(), png_bytes().as_slice());
}
