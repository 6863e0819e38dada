/// Account maintenance routes. Every handler here sits behind `JwtMiddleware`.

use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

use crate::account::AccountService;
use crate::auth::Principal;
use crate::domain::RoleName;
use crate::error::AppError;
use crate::routes::auth::MessageResponse;
use crate::routes::multipart::{read_user_form, UserForm};

#[derive(Deserialize)]
pub struct ProfileUpdateRequest {
    pub username: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordUpdateRequest {
    pub current_password: String,
    pub new_password: String,
    pub confirmation_password: String,
}

#[derive(Deserialize)]
pub struct RoleRequest {
    pub role: String,
}

/// PUT /users/me
pub async fn update_profile(
    principal: web::ReqData<Principal>,
    payload: Multipart,
    accounts: web::Data<AccountService>,
) -> Result<HttpResponse, AppError> {
    let UserForm { user, image } = read_user_form::<ProfileUpdateRequest>(payload).await?;
    let profile = accounts
        .update_profile(principal.user_id, &user.username, image)
        .await?;
    Ok(HttpResponse::Ok().json(profile))
}

/// PUT /users/me/password
///
/// # Errors
/// - 400: Current password wrong, confirmation mismatch, or new password invalid
pub async fn update_password(
    principal: web::ReqData<Principal>,
    form: web::Json<PasswordUpdateRequest>,
    accounts: web::Data<AccountService>,
) -> Result<HttpResponse, AppError> {
    accounts
        .update_password(
            principal.user_id,
            &form.current_password,
            &form.new_password,
            &form.confirmation_password,
        )
        .await?;
    Ok(HttpResponse::Ok().json(MessageResponse::new("Password updated successfully!")))
}

/// PUT /users/{id}/roles grants, DELETE /users/{id}/roles withdraws. Admin only.
pub async fn grant_role(
    principal: web::ReqData<Principal>,
    path: web::Path<Uuid>,
    form: web::Json<RoleRequest>,
    accounts: web::Data<AccountService>,
) -> Result<HttpResponse, AppError> {
    change_role(&principal, path.into_inner(), &form.role, true, &accounts).await
}

pub async fn withdraw_role(
    principal: web::ReqData<Principal>,
    path: web::Path<Uuid>,
    form: web::Json<RoleRequest>,
    accounts: web::Data<AccountService>,
) -> Result<HttpResponse, AppError> {
    change_role(&principal, path.into_inner(), &form.role, false, &accounts).await
}

async fn change_role(
    principal: &Principal,
    user_id: Uuid,
    role: &str,
    add: bool,
    accounts: &AccountService,
) -> Result<HttpResponse, AppError> {
    principal.require_role(RoleName::Admin)?;
    let profile = accounts.update_user_role(user_id, role, add).await?;
    Ok(HttpResponse::Ok().json(profile))
}

/// DELETE /users/{id}. Admin only.
pub async fn delete_user(
    principal: web::ReqData<Principal>,
    path: web::Path<Uuid>,
    accounts: web::Data<AccountService>,
) -> Result<HttpResponse, AppError> {
    principal.require_role(RoleName::Admin)?;
    accounts.delete_user(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(MessageResponse::new("User deleted successfully!")))
}
