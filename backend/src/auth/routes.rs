use actix_web::{web, HttpResponse, Result};
use log::{error, info, warn};
use shared::{AuthResponse, Credentials, FailureResponse, UserInfo};

use crate::db::user_repository::UserRepository;
use crate::db::RepositoryError;

use super::jwt::JwtService;
use super::middleware::AuthenticatedUser;
use super::password::{hash_password, verify_password};

const MIN_USERNAME_LEN: usize = 3;
const MAX_USERNAME_LEN: usize = 64;
const MIN_PASSWORD_LEN: usize = 6;

fn validate_credentials(credentials: &Credentials) -> Result<(), &'static str> {
    let username_len = credentials.username.trim().chars().count();
    if !(MIN_USERNAME_LEN..=MAX_USERNAME_LEN).contains(&username_len) {
        return Err("Username must be between 3 and 64 characters");
    }
    if credentials.password.chars().count() < MIN_PASSWORD_LEN {
        return Err("Password must be at least 6 characters");
    }
    Ok(())
}

fn issue_token(jwt_service: &JwtService, user: UserInfo) -> HttpResponse {
    match jwt_service.generate_token(&user.username) {
        Ok(token) => HttpResponse::Ok().json(AuthResponse { token, user }),
        Err(e) => {
            error!("Failed to issue token for {}: {:?}", user.username, e);
            HttpResponse::InternalServerError().json(FailureResponse::new("Failed to issue token"))
        }
    }
}

pub async fn register(
    body: web::Json<Credentials>,
    users: web::Data<UserRepository>,
    jwt_service: web::Data<JwtService>,
) -> Result<HttpResponse> {
    let credentials = body.into_inner();
    if let Err(message) = validate_credentials(&credentials) {
        return Ok(HttpResponse::BadRequest().json(FailureResponse::new(message)));
    }
    let username = credentials.username.trim().to_string();

    let password = credentials.password;
    let password_hash = match web::block(move || hash_password(&password)).await {
        Ok(Ok(hash)) => hash,
        Ok(Err(e)) => {
            error!("Password hashing failed: {}", e);
            return Ok(HttpResponse::InternalServerError().json(FailureResponse::new("Registration failed")));
        }
        Err(e) => {
            error!("Password hashing task failed: {}", e);
            return Ok(HttpResponse::InternalServerError().json(FailureResponse::new("Registration failed")));
        }
    };

    match users.create_user(&username, password_hash).await {
        Ok(user) => {
            info!("Registered user {}", user.username);
            Ok(issue_token(&jwt_service, UserInfo::from(&user)))
        }
        Err(RepositoryError::Duplicate(_)) => {
            Ok(HttpResponse::Conflict().json(FailureResponse::new("Username already exists")))
        }
        Err(e) => {
            error!("Failed to register {}: {:?}", username, e);
            Ok(HttpResponse::InternalServerError().json(FailureResponse::new("Registration failed")))
        }
    }
}

pub async fn login(
    body: web::Json<Credentials>,
    users: web::Data<UserRepository>,
    jwt_service: web::Data<JwtService>,
) -> Result<HttpResponse> {
    let credentials = body.into_inner();
    let username = credentials.username.trim().to_string();

    let user = match users.get_user(&username).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            warn!("Login attempt for unknown user {}", username);
            return Ok(HttpResponse::Unauthorized().json(FailureResponse::new("Invalid credentials")));
        }
        Err(e) => {
            error!("Failed to load user {}: {:?}", username, e);
            return Ok(HttpResponse::InternalServerError().json(FailureResponse::new("Login failed")));
        }
    };

    let stored_hash = user.password_hash.clone();
    let password = credentials.password;
    let verified = web::block(move || verify_password(&password, &stored_hash))
        .await
        .unwrap_or(false);

    if !verified {
        warn!("Invalid password for user {}", username);
        return Ok(HttpResponse::Unauthorized().json(FailureResponse::new("Invalid credentials")));
    }

    info!("User {} logged in", username);
    Ok(issue_token(&jwt_service, UserInfo::from(&user)))
}

pub async fn me(
    user: AuthenticatedUser,
    users: web::Data<UserRepository>,
) -> Result<HttpResponse> {
    match users.get_user(&user.0).await {
        Ok(Some(account)) => Ok(HttpResponse::Ok().json(UserInfo::from(&account))),
        Ok(None) => {
            warn!("Token subject {} has no account", user.0);
            Ok(HttpResponse::Unauthorized().json(FailureResponse::new("Unknown user")))
        }
        Err(e) => {
            error!("Failed to fetch user {}: {:?}", user.0, e);
            Ok(HttpResponse::InternalServerError().json(FailureResponse::new("Failed to load user")))
        }
    }
}
