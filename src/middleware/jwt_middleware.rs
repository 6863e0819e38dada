/// JWT Authentication Middleware
///
/// Authenticates the access token in the Authorization header through the
/// `AuthService` and injects the resulting `Principal` into request
/// extensions for route handlers.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    web, Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;

use crate::auth::{bearer_token, AuthService};
use crate::error::{AppError, AuthError};

/// Guards every route of the scope it wraps.
pub struct JwtMiddleware;

impl<S, B> Transform<S, ServiceRequest> for JwtMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = JwtMiddlewareService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(JwtMiddlewareService {
            service: Rc::new(service),
        }))
    }
}

pub struct JwtMiddlewareService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for JwtMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let token = req
            .headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(bearer_token)
            .map(str::to_string);

        let auth = req.app_data::<web::Data<AuthService>>().cloned();
        let service = self.service.clone();

        Box::pin(async move {
            let Some(token) = token else {
                tracing::warn!("Missing or invalid Authorization header");
                return Err(AppError::from(AuthError::MissingToken).into());
            };

            let auth = auth.ok_or_else(|| AppError::Internal("AuthService not registered".to_string()))?;

            match auth.authenticate_access(&token).await {
                Ok(principal) => {
                    tracing::debug!(user_id = %principal.user_id, "Access token accepted");
                    req.extensions_mut().insert(principal);
                    service.call(req).await
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Access token rejected");
                    Err(e.into())
                }
            }
        })
    }
}
