use actix_web::{
    body::MessageBody,
    dev::{ServiceRequest, ServiceResponse},
    middleware::Next,
    web, Error, HttpMessage, HttpRequest,
};

use crate::{api::error, utils::AuthValidator};

/// Authenticated caller, stored in the request extensions.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub id: i64,
}

pub async fn authentication<B>(
    req: ServiceRequest,
    next: Next<B>,
) -> Result<ServiceResponse<B>, Error>
where
    B: MessageBody + 'static,
{
    let auth = req.headers().get("Authorization").and_then(|h| h.to_str().ok());
    let token = match auth.and_then(|h| h.strip_prefix("Bearer ")) {
        Some(t) => t,
        None => {
            return Err(error::Error::unauthorized("Token Invalid or Expired").into());
        }
    };

    let validator = req.app_data::<web::Data<dyn AuthValidator>>().ok_or_else(|| {
        log::error!("No AuthValidator registered in app data");
        error::Error::InternalServer
    })?;

    let id = validator
        .decode(token)
        .map_err(|_| error::Error::unauthorized("Token Invalid or Expired"))?;

    req.extensions_mut().insert(AuthUser { id });

    next.call(req).await
}

pub fn get_user_id(req: &HttpRequest) -> Result<i64, error::Error> {
    let extensions = req.extensions();

    let user = extensions
        .get::<AuthUser>()
        .ok_or_else(|| error::Error::unauthorized("Unauthorized"))?;

    Ok(user.id)
}
