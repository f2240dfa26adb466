use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use cropcare::auth::jwt::JwtService;
use cropcare::auth::middleware::AuthMiddleware;
use cropcare::classifier::{ClassCatalog, ClassificationModel, LabelInterpreter};
use cropcare::config::AppConfig;
use cropcare::db::prediction_repository::PredictionRepository;
use cropcare::db::user_repository::UserRepository;
use cropcare::db::Database;
use cropcare::prediction::PredictionService;
use cropcare::routes::configure_routes;
use cropcare::storage::upload_store::UploadStore;
use cropcare::weather::WeatherService;
use std::env;
use std::io;

fn startup_error(context: &str, e: impl std::fmt::Display) -> io::Error {
    log::error!("{}: {}", context, e);
    io::Error::other(format!("{}: {}", context, e))
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    }

    let config = AppConfig::from_env().map_err(|e| startup_error("Invalid configuration", e))?;

    let database = Database::new(&config.database_path);
    database
        .init()
        .map_err(|e| startup_error("Failed to initialize database", e))?;
    log::info!("Using database {}", config.database_path.display());

    std::fs::create_dir_all(&config.static_dir)?;

    let catalog = ClassCatalog::load(&config.catalog_path)
        .map_err(|e| startup_error("Failed to load class catalog", e))?;
    log::info!(
        "Loaded {} classes from {}",
        catalog.len(),
        config.catalog_path.display()
    );

    let model = ClassificationModel::load(&config.model)
        .map_err(|e| startup_error("Model loading failed", e))?;

    let predictions = PredictionRepository::new(database.clone());
    let users = UserRepository::new(database);
    let prediction_service = PredictionService::new(
        model,
        LabelInterpreter::new(catalog),
        predictions.clone(),
        UploadStore::new(&config.static_dir),
    );

    let jwt_service = JwtService::new(&config.jwt_secret);
    let auth_middleware = AuthMiddleware::new(jwt_service.clone());

    if config.weather_api_key.is_none() {
        log::warn!("WEATHER_API_KEY is not set; /api/weather will serve sample data");
    }
    let weather_service = WeatherService::new(config.weather_api_key.clone());

    let static_dir = config.static_dir.to_string_lossy().into_owned();
    let allowed_origin = config.allowed_origin.clone();

    log::info!("Starting server on {}", config.bind_address);

    HttpServer::new(move || {
        let cors = match &allowed_origin {
            Some(origin) => Cors::default().allowed_origin(origin),
            None => Cors::default().allow_any_origin(),
        };

        App::new()
            .wrap(auth_middleware.clone())
            .wrap(
                cors.allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::AUTHORIZATION,
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(web::Data::new(prediction_service.clone()))
            .app_data(web::Data::new(predictions.clone()))
            .app_data(web::Data::new(users.clone()))
            .app_data(web::Data::new(jwt_service.clone()))
            .app_data(web::Data::new(weather_service.clone()))
            .configure(|cfg| configure_routes(cfg, static_dir.clone()))
    })
    .bind(&config.bind_address)?
    .run()
    .await
}
