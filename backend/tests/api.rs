use std::io::Cursor;
use std::path::Path;

use actix_web::http::{header, StatusCode};
use actix_web::{test, web, App};
use cropcare::auth::jwt::JwtService;
use cropcare::auth::middleware::AuthMiddleware;
use cropcare::classifier::{
    ClassCatalog, ClassificationModel, InferenceBackend, InferenceError, InputTensor, LabelInterpreter,
};
use cropcare::db::prediction_repository::PredictionRepository;
use cropcare::db::user_repository::UserRepository;
use cropcare::db::Database;
use cropcare::prediction::PredictionService;
use cropcare::routes::configure_routes;
use cropcare::storage::upload_store::{UploadStore, MAX_SIZE};
use cropcare::weather::WeatherService;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde_json::{json, Value};
use shared::{AuthResponse, DashboardResponse, HistoryEntry, PredictResponse, WeatherResponse};

const BOUNDARY: &str = "----cropcare-test-boundary";

struct StubBackend;

impl InferenceBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn input_size(&self) -> Option<(u32, u32)> {
        Some((32, 32))
    }

    fn num_classes(&self) -> Option<usize> {
        Some(3)
    }

    fn run(&self, _tensor: &InputTensor) -> Result<Vec<f32>, InferenceError> {
        Ok(vec![0.1, 0.75, 0.15])
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    predictions: PredictionRepository,
    users: UserRepository,
    service: PredictionService,
    jwt: JwtService,
    weather: WeatherService,
    static_dir: String,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let database = Database::new(dir.path().join("test.db"));
    database.init().unwrap();
    let static_dir = dir.path().join("static");

    let predictions = PredictionRepository::new(database.clone());
    let catalog = ClassCatalog::new(vec![
        "Corn Crop Diseases".into(),
        "Rice plant Diseases".into(),
        "Healthy Wheat".into(),
    ]);
    let service = PredictionService::new(
        ClassificationModel::from_backend(StubBackend, (256, 256)),
        LabelInterpreter::new(catalog),
        predictions.clone(),
        UploadStore::new(&static_dir),
    );

    Harness {
        predictions,
        users: UserRepository::new(database),
        service,
        jwt: JwtService::new("integration-secret"),
        weather: WeatherService::new(None),
        static_dir: static_dir.to_string_lossy().into_owned(),
        _dir: dir,
    }
}

macro_rules! app {
    ($h:expr) => {
        test::init_service(
            App::new()
                .wrap(AuthMiddleware::new($h.jwt.clone()))
                .app_data(web::Data::new($h.service.clone()))
                .app_data(web::Data::new($h.predictions.clone()))
                .app_data(web::Data::new($h.users.clone()))
                .app_data(web::Data::new($h.jwt.clone()))
                .app_data(web::Data::new($h.weather.clone()))
                .configure(|cfg| configure_routes(cfg, $h.static_dir.clone())),
        )
        .await
    };
}

fn leaf_png() -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 24, Rgb([34, 139, 34])));
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

fn multipart_body(field: &str, file_name: &str, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field, file_name
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: image/png\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn upload_request(token: Option<&str>, body: Vec<u8>) -> test::TestRequest {
    let mut req = test::TestRequest::post()
        .uri("/api/predict")
        .insert_header((
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        ))
        .set_payload(body);
    if let Some(token) = token {
        req = req.insert_header((header::AUTHORIZATION, format!("Bearer {}", token)));
    }
    req
}

macro_rules! register {
    ($app:expr, $username:expr) => {{
        let req = test::TestRequest::post()
            .uri("/api/auth/register")
            .set_json(json!({"username": $username, "password": "hunter22"}))
            .to_request();
        let resp: AuthResponse = test::call_and_read_body_json(&$app, req).await;
        assert_eq!(resp.user.username, $username);
        resp.token
    }};
}

fn exists_under(static_dir: &str, url: &str) -> bool {
    let relative = url.trim_start_matches("/static/");
    Path::new(static_dir).join(relative).exists()
}

#[actix_web::test]
async fn upload_is_classified_and_recorded_once() {
    let h = harness();
    let app = app!(h);
    let token = register!(app, "farmer");

    let req = upload_request(Some(&token), multipart_body("image", "leaf.png", &leaf_png())).to_request();
    let resp: PredictResponse = test::call_and_read_body_json(&app, req).await;
    assert!(resp.success);
    assert_eq!(resp.prediction, "Rice plant Diseases");
    assert!((0.0..=100.0).contains(&resp.confidence));
    assert_eq!(resp.confidence, 75.0);
    assert_eq!(resp.crop_type, "Rice");
    assert!(!resp.is_healthy);
    assert!(resp.warning.is_none());
    assert!(exists_under(&h.static_dir, &resp.image_url));

    let req = test::TestRequest::get()
        .uri("/api/history")
        .insert_header((header::AUTHORIZATION, format!("Bearer {}", token)))
        .to_request();
    let history: Vec<HistoryEntry> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].prediction, "Rice plant Diseases");
    assert_eq!(history[0].status.to_string(), "Diseased");

    let req = test::TestRequest::get()
        .uri("/api/dashboard")
        .insert_header((header::AUTHORIZATION, format!("Bearer {}", token)))
        .to_request();
    let dashboard: DashboardResponse = test::call_and_read_body_json(&app, req).await;
    assert_eq!(dashboard.username, "farmer");
    assert_eq!(dashboard.stats.total, 1);
    assert_eq!(dashboard.stats.diseased, 1);
    assert_eq!(dashboard.recent_predictions.len(), 1);

    let req = test::TestRequest::get()
        .uri("/api/crop_health")
        .insert_header((header::AUTHORIZATION, format!("Bearer {}", token)))
        .to_request();
    let crops: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(crops[0]["crop_type"], "Rice");
    assert_eq!(crops[0]["health_percentage"], 0.0);
}

#[actix_web::test]
async fn predict_requires_token() {
    let h = harness();
    let app = app!(h);

    let req = upload_request(None, multipart_body("image", "leaf.png", &leaf_png())).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = upload_request(Some("not.a.token"), multipart_body("image", "leaf.png", &leaf_png()))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn intake_rejections_do_not_record() {
    let h = harness();
    let app = app!(h);
    let token = register!(app, "farmer");

    let cases = [
        (multipart_body("photo", "leaf.png", &leaf_png()), "No image uploaded"),
        (multipart_body("image", "", &leaf_png()), "No image selected"),
        (multipart_body("image", "leaf.png", b""), "Uploaded image is empty"),
    ];
    for (body, message) in cases {
        let req = upload_request(Some(&token), body).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json: Value = test::read_body_json(resp).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["message"], message);
    }

    let req = upload_request(Some(&token), multipart_body("image", "notes.png", b"plain text"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    assert!(h.predictions.list_by_owner("farmer").await.unwrap().is_empty());
}

#[actix_web::test]
async fn oversized_upload_is_rejected_before_storage() {
    let h = harness();
    let app = app!(h);
    let token = register!(app, "farmer");

    let oversized = vec![0u8; MAX_SIZE + 1];
    let req = upload_request(Some(&token), multipart_body("image", "big.png", &oversized)).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let json: Value = test::read_body_json(resp).await;
    assert_eq!(json["success"], false);
    assert_eq!(json["message"], "File too large");

    assert!(h.predictions.list_by_owner("farmer").await.unwrap().is_empty());
    assert!(!Path::new(&h.static_dir).join("uploads").exists());
}

#[actix_web::test]
async fn history_is_scoped_to_owner() {
    let h = harness();
    let app = app!(h);
    let alice = register!(app, "alice");
    let bob = register!(app, "bob");

    let req = upload_request(Some(&alice), multipart_body("image", "leaf.png", &leaf_png())).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let req = test::TestRequest::get()
        .uri("/api/history")
        .insert_header((header::AUTHORIZATION, format!("Bearer {}", bob)))
        .to_request();
    let history: Vec<HistoryEntry> = test::call_and_read_body_json(&app, req).await;
    assert!(history.is_empty());
}

#[actix_web::test]
async fn login_and_duplicate_registration() {
    let h = harness();
    let app = app!(h);
    register!(app, "farmer");

    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(json!({"username": "farmer", "password": "another1"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .set_json(json!({"username": "farmer", "password": "wrongpass"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .set_json(json!({"username": "farmer", "password": "hunter22"}))
        .to_request();
    let login: AuthResponse = test::call_and_read_body_json(&app, req).await;

    let req = test::TestRequest::get()
        .uri("/api/auth/me")
        .insert_header((header::AUTHORIZATION, format!("Bearer {}", login.token)))
        .to_request();
    let me: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(me["username"], "farmer");
}

#[actix_web::test]
async fn public_endpoints_need_no_token() {
    let h = harness();
    let app = app!(h);

    let req = test::TestRequest::get().uri("/api/health").to_request();
    let health: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(health["status"], "ok");

    let req = test::TestRequest::get()
        .uri("/api/weather?lat=31.5&lon=74.3")
        .to_request();
    let weather: WeatherResponse = test::call_and_read_body_json(&app, req).await;
    assert_eq!(weather.current.location, "Sample City");
    assert_eq!(weather.forecast.len(), 3);
    assert!(weather.error.is_some());
}
