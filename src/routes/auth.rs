/// Authentication Routes
///
/// Registration, login, access-token refresh and the current user.

use actix_multipart::Multipart;
use actix_web::{http::header, web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::{AuthService, Principal, Registration};
use crate::error::{AppError, ErrorContext};
use crate::rate_limit::RefreshRateLimiter;
use crate::routes::multipart::{read_user_form, UserForm};

/// The `user` part of the registration form
#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// POST /auth/register
///
/// Multipart body: `user` (JSON with username, email, password) and an
/// optional `image` part.
///
/// # Errors
/// - 400: Validation errors
/// - 409: Username or email already taken
/// - 502: Image upload failed
pub async fn register(
    payload: Multipart,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_registration");

    let UserForm { user, image } = read_user_form::<RegisterRequest>(payload).await?;
    let message = auth
        .register(Registration {
            username: user.username,
            email: user.email,
            password: user.password,
            image,
        })
        .await?;

    tracing::debug!(request_id = %context.request_id, "Registration request completed");

    Ok(HttpResponse::Created().json(MessageResponse::new(message)))
}

/// POST /auth/login
///
/// Returns the token pair and the user's public profile.
///
/// # Errors
/// - 401: Bad credentials. Unknown email and wrong password look the same.
pub async fn login(
    form: web::Json<LoginRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let outcome = auth.login(&form.email, &form.password).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

/// POST /auth/refresh-token
///
/// No body; expects `Authorization: Bearer <refresh token>`. Gated by the
/// global refresh bucket.
///
/// # Errors
/// - 429: Bucket empty, with `Retry-After` and `X-Rate-Limit-Retry-After-Milliseconds`
/// - 404: Token subject cannot be resolved to a user
/// - 403: Token fails validation
pub async fn refresh_token(
    req: HttpRequest,
    auth: web::Data<AuthService>,
    limiter: web::Data<RefreshRateLimiter>,
) -> Result<HttpResponse, AppError> {
    let probe = limiter.try_consume(1);
    if !probe.consumed {
        return Err(AppError::RateLimitExceeded {
            retry_after: probe.retry_after(),
        });
    }

    let authorization = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let mut response = HttpResponse::Ok();
    response.insert_header(("X-Rate-Limit-Remaining", probe.remaining_tokens.to_string()));

    match auth.refresh(authorization).await? {
        Some(outcome) => Ok(response.json(outcome)),
        None => Ok(response.finish()),
    }
}

/// GET /auth/me
pub async fn me(
    principal: web::ReqData<Principal>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let profile = auth.current_profile(&principal).await?;
    Ok(HttpResponse::Ok().json(profile))
}
