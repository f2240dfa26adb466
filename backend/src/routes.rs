use actix_files::Files;
use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use futures::TryStreamExt;
use log::{error, info, warn};
use serde::Deserialize;
use serde_json::json;
use shared::{DashboardResponse, FailureResponse, HistoryEntry, PredictResponse};

use crate::auth::middleware::AuthenticatedUser;
use crate::auth::routes as auth_routes;
use crate::db::prediction_repository::PredictionRepository;
use crate::prediction::{PredictionError, PredictionService, UploadedImage};
use crate::storage::upload_store::{StorageError, MAX_SIZE};
use crate::weather::WeatherService;

const IMAGE_FIELD: &str = "image";
const RECENT_LIMIT: u32 = 3;
const SAVE_WARNING: &str = "Prediction could not be saved to history";

pub fn configure_routes(cfg: &mut web::ServiceConfig, static_dir: String) {
    cfg.service(web::resource("/api/health").route(web::get().to(health)))
        .service(
            web::scope("/api/auth")
                .route("/register", web::post().to(auth_routes::register))
                .route("/login", web::post().to(auth_routes::login))
                .route("/me", web::get().to(auth_routes::me)),
        )
        .service(web::resource("/api/predict").route(web::post().to(predict)))
        .service(web::resource("/api/history").route(web::get().to(history)))
        .service(web::resource("/api/dashboard").route(web::get().to(dashboard)))
        .service(web::resource("/api/crop_health").route(web::get().to(crop_health)))
        .service(web::resource("/api/weather").route(web::get().to(weather)))
        .service(Files::new("/static", static_dir));
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

fn bad_request(message: impl Into<String>) -> HttpResponse {
    HttpResponse::BadRequest().json(FailureResponse::new(message))
}

/// Reasons an upload is turned away before it reaches the pipeline.
#[derive(Debug, PartialEq)]
enum IntakeError {
    Missing,
    NoFileName,
    Empty,
    TooLarge,
    Malformed(String),
}

impl IntakeError {
    fn message(&self) -> String {
        match self {
            IntakeError::Missing => "No image uploaded".to_string(),
            IntakeError::NoFileName => "No image selected".to_string(),
            IntakeError::Empty => "Uploaded image is empty".to_string(),
            IntakeError::TooLarge => "File too large".to_string(),
            IntakeError::Malformed(e) => format!("Invalid upload: {}", e),
        }
    }

    fn response(&self) -> HttpResponse {
        match self {
            IntakeError::TooLarge => {
                HttpResponse::PayloadTooLarge().json(FailureResponse::new(self.message()))
            }
            _ => bad_request(self.message()),
        }
    }
}

fn check_intake(upload: Option<UploadedImage>) -> Result<UploadedImage, IntakeError> {
    let upload = upload.ok_or(IntakeError::Missing)?;
    if upload.file_name.trim().is_empty() {
        return Err(IntakeError::NoFileName);
    }
    if upload.bytes.is_empty() {
        return Err(IntakeError::Empty);
    }
    Ok(upload)
}

/// Pulls the `image` field out of the form; other fields are drained.
/// Reading stops as soon as the image exceeds `max_size` bytes.
async fn read_image_field(
    mut payload: Multipart,
    max_size: usize,
) -> Result<Option<UploadedImage>, IntakeError> {
    let malformed = |e: actix_multipart::MultipartError| IntakeError::Malformed(e.to_string());
    let mut upload = None;

    while let Some(mut field) = payload.try_next().await.map_err(malformed)? {
        let is_image = field.name() == Some(IMAGE_FIELD) && upload.is_none();
        let file_name = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .unwrap_or_default()
            .to_string();
        let content_type = field.content_type().map(|mime| mime.essence_str().to_string());

        let mut data = web::BytesMut::new();
        while let Some(chunk) = field.try_next().await.map_err(malformed)? {
            if !is_image {
                continue;
            }
            if data.len() + chunk.len() > max_size {
                return Err(IntakeError::TooLarge);
            }
            data.extend_from_slice(&chunk);
        }

        if is_image {
            upload = Some(UploadedImage {
                bytes: data.freeze(),
                file_name,
                content_type,
            });
        }
    }

    Ok(upload)
}

fn prediction_failure(e: &PredictionError) -> HttpResponse {
    match e {
        PredictionError::EmptyUpload | PredictionError::Storage(StorageError::Empty) => {
            bad_request(IntakeError::Empty.message())
        }
        PredictionError::Storage(StorageError::FileTooLarge) => {
            HttpResponse::PayloadTooLarge().json(FailureResponse::new("File too large"))
        }
        PredictionError::Decode(inner) => bad_request(format!("Invalid image: {}", inner)),
        PredictionError::Storage(_) => {
            HttpResponse::InternalServerError().json(FailureResponse::new("Failed to store upload"))
        }
        PredictionError::Inference(inner) => HttpResponse::InternalServerError()
            .json(FailureResponse::new(format!("Prediction failed: {}", inner))),
        PredictionError::Blocking(_) => {
            HttpResponse::InternalServerError().json(FailureResponse::new("Prediction failed"))
        }
    }
}

async fn predict(
    user: AuthenticatedUser,
    service: web::Data<PredictionService>,
    payload: Multipart,
) -> HttpResponse {
    let intake = read_image_field(payload, MAX_SIZE)
        .await
        .and_then(check_intake);
    let upload = match intake {
        Ok(upload) => upload,
        Err(rejection) => {
            warn!("Rejected upload from {}: {}", user.0, rejection.message());
            return rejection.response();
        }
    };

    match service.predict(&user.0, upload).await {
        Ok(outcome) => {
            let warning = outcome.persistence_error.as_ref().map(|_| SAVE_WARNING.to_string());
            HttpResponse::Ok().json(PredictResponse {
                success: true,
                prediction: outcome.interpretation.label.clone(),
                confidence: outcome.confidence_percentage(),
                crop_type: outcome.interpretation.crop_type.clone(),
                is_healthy: outcome.interpretation.is_healthy,
                image_url: outcome.image.url(),
                warning,
            })
        }
        Err(e) => {
            error!("Prediction failed for {}: {}", user.0, e);
            prediction_failure(&e)
        }
    }
}

async fn history(
    user: AuthenticatedUser,
    predictions: web::Data<PredictionRepository>,
) -> HttpResponse {
    match predictions.list_by_owner(&user.0).await {
        Ok(records) => {
            let entries: Vec<HistoryEntry> = records.iter().map(|r| r.to_history_entry()).collect();
            info!("Returning {} history entries for {}", entries.len(), user.0);
            HttpResponse::Ok().json(entries)
        }
        Err(e) => {
            error!("Failed to load history for {}: {:?}", user.0, e);
            HttpResponse::InternalServerError().json(FailureResponse::new("Failed to load history"))
        }
    }
}

async fn dashboard(
    user: AuthenticatedUser,
    predictions: web::Data<PredictionRepository>,
) -> HttpResponse {
    let stats = match predictions.owner_stats(&user.0).await {
        Ok(stats) => stats,
        Err(e) => {
            error!("Failed to load stats for {}: {:?}", user.0, e);
            return HttpResponse::InternalServerError()
                .json(FailureResponse::new("Failed to load dashboard"));
        }
    };

    match predictions.recent_by_owner(&user.0, RECENT_LIMIT).await {
        Ok(recent) => HttpResponse::Ok().json(DashboardResponse {
            username: user.0.clone(),
            stats,
            recent_predictions: recent.iter().map(|r| r.to_history_entry()).collect(),
        }),
        Err(e) => {
            error!("Failed to load recent predictions for {}: {:?}", user.0, e);
            HttpResponse::InternalServerError().json(FailureResponse::new("Failed to load dashboard"))
        }
    }
}

async fn crop_health(
    user: AuthenticatedUser,
    predictions: web::Data<PredictionRepository>,
) -> HttpResponse {
    match predictions.crop_health(&user.0).await {
        Ok(crops) => HttpResponse::Ok().json(crops),
        Err(e) => {
            error!("Failed to aggregate crop health for {}: {:?}", user.0, e);
            HttpResponse::InternalServerError()
                .json(FailureResponse::new("Failed to load crop health"))
        }
    }
}

#[derive(Deserialize)]
struct WeatherQuery {
    lat: Option<f64>,
    lon: Option<f64>,
}

async fn weather(
    query: web::Query<WeatherQuery>,
    weather_service: web::Data<WeatherService>,
) -> HttpResponse {
    HttpResponse::Ok().json(weather_service.report(query.lat, query.lon).await)
}
