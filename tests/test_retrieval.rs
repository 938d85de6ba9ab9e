use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use grainbooth::generate::{GenerateError, GenerationOptions, ImageGenerator, ReplicateGenerator};
use grainbooth::imaging::retrieval::{ImageSource, RetrievalError, Retriever};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use serde_json::{Value, json};

fn png(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba([9, 99, 199, 255])))
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .expect("encode png");
    bytes
}

/// Serves `router` on an ephemeral port and returns its base URL.
async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });
    format!("http://{addr}")
}

async fn image_server() -> String {
    let router = Router::new()
        .route(
            "/ok.png",
            get(|| async { ([("content-type", "image/png")], png(12, 8)) }),
        )
        .route("/garbage", get(|| async { "definitely not an image" }))
        .route(
            "/gone",
            get(|| async { (StatusCode::NOT_FOUND, "nothing here") }),
        );
    serve(router).await
}

fn options() -> GenerationOptions {
    GenerationOptions {
        model: "owner/model".to_string(),
        raw: false,
        aspect_ratio: "3:2".to_string(),
        output_format: "jpg".to_string(),
        safety_tolerance: 2,
        image_prompt_strength: 0.1,
    }
}

#[tokio::test]
async fn fetches_and_decodes_remote_images() {
    let base = image_server().await;
    let source = ImageSource::parse(&format!("{base}/ok.png")).expect("parse");
    let asset = Retriever::default()
        .fetch_image(&source)
        .await
        .expect("fetch");
    assert_eq!((asset.width(), asset.height()), (12, 8));
}

#[tokio::test]
async fn non_success_status_is_a_fetch_failure() {
    let base = image_server().await;
    let source = ImageSource::parse(&format!("{base}/gone")).expect("parse");
    let err = Retriever::default()
        .fetch_image(&source)
        .await
        .expect_err("404 must fail");
    assert!(
        matches!(err, RetrievalError::FetchFailed { status: Some(404), .. }),
        "{err:?}"
    );
}

#[tokio::test]
async fn undecodable_body_is_a_decode_failure() {
    let base = image_server().await;
    let source = ImageSource::parse(&format!("{base}/garbage")).expect("parse");
    let err = Retriever::default()
        .fetch_image(&source)
        .await
        .expect_err("garbage must fail");
    assert!(matches!(err, RetrievalError::DecodeFailed(_)), "{err:?}");
}

#[tokio::test]
async fn unreachable_host_has_no_status() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);

    let source = ImageSource::parse(&format!("http://{addr}/ok.png")).expect("parse");
    let err = Retriever::default()
        .load_bytes(&source)
        .await
        .expect_err("nothing is listening");
    assert!(
        matches!(err, RetrievalError::FetchFailed { status: None, .. }),
        "{err:?}"
    );
}

#[tokio::test]
async fn inline_images_skip_the_network() {
    let source = ImageSource::inline("image/png", &png(3, 5));
    let asset = Retriever::default()
        .fetch_image(&source)
        .await
        .expect("inline");
    assert_eq!((asset.width(), asset.height()), (3, 5));
}

#[derive(Clone)]
struct FakeReplicate {
    base: String,
    /// `status` of the first response; later polls always succeed.
    first_status: &'static str,
    polls: Arc<AtomicUsize>,
}

async fn create_prediction(
    State(fake): State<FakeReplicate>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let authorised = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        == Some("Bearer r8_test");
    if !authorised {
        return (StatusCode::UNAUTHORIZED, Json(json!({"detail": "bad token"})));
    }
    if body["input"]["prompt"] == "explode" {
        return (
            StatusCode::OK,
            Json(json!({"id": "p0", "status": "failed", "error": "NSFW content detected"})),
        );
    }
    assert_eq!(headers.get("prefer").and_then(|v| v.to_str().ok()), Some("wait"));
    assert_eq!(body["input"]["aspect_ratio"], "3:2");
    assert_eq!(body["input"]["safety_tolerance"], 2);
    (
        StatusCode::CREATED,
        Json(json!({
            "id": "p1",
            "status": fake.first_status,
            "output": format!("{}/ok.png", fake.base),
            "urls": {"get": format!("{}/predictions/p1", fake.base)}
        })),
    )
}

async fn get_prediction(State(fake): State<FakeReplicate>) -> Json<Value> {
    fake.polls.fetch_add(1, Ordering::SeqCst);
    Json(json!({
        "id": "p1",
        "status": "succeeded",
        "output": [format!("{}/ok.png", fake.base)]
    }))
}

async fn fake_replicate(first_status: &'static str) -> (String, Arc<AtomicUsize>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let base = format!("http://{}", listener.local_addr().expect("local addr"));
    let polls = Arc::new(AtomicUsize::new(0));
    let state = FakeReplicate {
        base: base.clone(),
        first_status,
        polls: polls.clone(),
    };
    let router = Router::new()
        .route("/models/{owner}/{name}/predictions", post(create_prediction))
        .route("/predictions/{id}", get(get_prediction))
        .route("/ok.png", get(|| async { png(16, 16) }))
        .with_state(state);
    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });
    (base, polls)
}

fn generator(base: &str, token: &str) -> ReplicateGenerator {
    ReplicateGenerator::new(reqwest::Client::new(), base, token)
        .with_polling(Duration::from_millis(10), 5)
}

#[tokio::test]
async fn finished_prediction_returns_its_output() {
    let (base, polls) = fake_replicate("succeeded").await;
    let url = generator(&base, "r8_test")
        .generate("a lighthouse at dusk", &options())
        .await
        .expect("generate");
    assert_eq!(url, format!("{base}/ok.png"));
    assert_eq!(polls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn running_prediction_is_polled_to_completion() {
    let (base, polls) = fake_replicate("processing").await;
    let url = generator(&base, "r8_test")
        .generate("a lighthouse at dusk", &options())
        .await
        .expect("generate");
    assert_eq!(url, format!("{base}/ok.png"));
    assert_eq!(polls.load(Ordering::SeqCst), 1);

    let asset = Retriever::default()
        .fetch_image(&ImageSource::parse(&url).expect("parse"))
        .await
        .expect("fetch output");
    assert_eq!(asset.width(), 16);
}

#[tokio::test]
async fn failed_prediction_carries_the_provider_message() {
    let (base, _) = fake_replicate("succeeded").await;
    let err = generator(&base, "r8_test")
        .generate("explode", &options())
        .await
        .expect_err("prediction failed");
    match err {
        GenerateError::Failed(message) => assert_eq!(message, "NSFW content detected"),
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn rejected_token_is_a_provider_error() {
    let (base, _) = fake_replicate("succeeded").await;
    let err = generator(&base, "wrong")
        .generate("a lighthouse at dusk", &options())
        .await
        .expect_err("unauthorised");
    assert!(
        matches!(err, GenerateError::Provider { status: 401, .. }),
        "{err:?}"
    );
}
