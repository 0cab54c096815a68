use actix_web::{web, FromRequest};
use futures_util::future::LocalBoxFuture;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::api::error;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum TypeClaims {
    RefreshToken,
    AccessToken,
}

/// Issuers may encode `sub` as a number or as a numeric string, and may omit `iat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    #[serde(deserialize_with = "deserialize_subject")]
    pub sub: i64,
    #[serde(default)]
    pub iat: u64,
    pub exp: u64,
    #[serde(default)]
    pub _type: Option<TypeClaims>,
}

fn deserialize_subject<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Subject {
        Id(i64),
        Text(String),
    }

    match Subject::deserialize(deserializer)? {
        Subject::Id(id) => Ok(id),
        Subject::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

impl Claims {
    pub fn decode(token: &str, secret: &[u8]) -> Result<Self, error::SystemError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.validate_nbf = false;
        let token_data = decode::<Self>(token, &DecodingKey::from_secret(secret), &validation)?;
        Ok(token_data.claims)
    }
}

#[cfg(test)]
impl Claims {
    pub fn new(sub: i64, exp: u64) -> Self {
        let now = chrono::Utc::now().timestamp() as u64;
        Claims { sub, iat: now, exp: now + exp, _type: None }
    }

    pub fn with_type(mut self, _type: TypeClaims) -> Self {
        self._type = Some(_type);
        self
    }

    pub fn encode(&self, secret: &[u8]) -> Result<String, error::SystemError> {
        let header = jsonwebtoken::Header::new(Algorithm::HS256);
        let token =
            jsonwebtoken::encode(&header, self, &jsonwebtoken::EncodingKey::from_secret(secret))?;
        Ok(token)
    }
}

/// Resolves a bearer token to the user id it was issued for.
pub trait AuthValidator: Send + Sync {
    fn decode(&self, token: &str) -> Result<i64, error::SystemError>;
}

#[derive(Clone)]
pub struct JwtAuthValidator {
    secret: String,
}

impl JwtAuthValidator {
    pub fn new(secret: impl Into<String>) -> Self {
        Self { secret: secret.into() }
    }
}

impl AuthValidator for JwtAuthValidator {
    fn decode(&self, token: &str) -> Result<i64, error::SystemError> {
        let claims = Claims::decode(token, self.secret.as_bytes())
            .map_err(|_| error::SystemError::unauthorized("Token Invalid or Expired"))?;

        if matches!(claims._type, Some(TypeClaims::RefreshToken)) {
            return Err(error::SystemError::unauthorized("Only access tokens are accepted"));
        }

        if claims.sub <= 0 {
            return Err(error::SystemError::unauthorized("Invalid user id in token"));
        }

        Ok(claims.sub)
    }
}

/// Unordered user pair stored smaller id first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CanonicalPair {
    pub low: i64,
    pub high: i64,
}

impl CanonicalPair {
    pub fn new(user_a: i64, user_b: i64) -> Result<Self, error::SystemError> {
        if user_a == user_b {
            return Err(error::SystemError::bad_request("Cannot start a chat with yourself"));
        }
        let (low, high) = if user_a < user_b { (user_a, user_b) } else { (user_b, user_a) };
        Ok(Self { low, high })
    }

    pub fn cache_key(&self, prefix: &str) -> String {
        format!("{prefix}{}:{}", self.low, self.high)
    }
}

pub struct ValidatedQuery<T>(pub T);

impl<T> FromRequest for ValidatedQuery<T>
where
    T: Validate + serde::de::DeserializeOwned + 'static,
{
    type Error = error::Error;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(
        req: &actix_web::HttpRequest,
        payload: &mut actix_web::dev::Payload,
    ) -> Self::Future {
        let fut = web::Query::<T>::from_request(req, payload);

        Box::pin(async move {
            let query = fut.await.map_err(|e| error::Error::BadRequest(e.to_string().into()))?;
            query.validate().map_err(|e| error::Error::BadRequest(e.to_string().into()))?;
            Ok(ValidatedQuery(query.into_inner()))
        })
    }
}

pub struct ValidatedJson<T>(pub T);

impl<T> FromRequest for ValidatedJson<T>
where
    T: Validate + serde::de::DeserializeOwned + 'static,
{
    type Error = error::Error;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(
        req: &actix_web::HttpRequest,
        payload: &mut actix_web::dev::Payload,
    ) -> Self::Future {
        let fut = web::Json::<T>::from_request(req, payload);

        Box::pin(async move {
            let json = fut.await.map_err(|e| error::Error::BadRequest(e.to_string().into()))?;
            let model = json.into_inner();
            model.validate().map_err(|e| error::Error::BadRequest(e.to_string().into()))?;
            Ok(ValidatedJson(model))
        })
    }
}
