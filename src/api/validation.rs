use axum::{
    Json,
    extract::{FromRequest, FromRequestParts, Query, Request},
    http::request::Parts,
};
use serde::de::DeserializeOwned;
use std::sync::Arc;

use super::{ApiError, AppState};
use crate::services::Operator;
use crate::services::directory_service::{MAX_NAME_LEN, validate_name};

/// Header naming the operator recorded as `performed_by`.
pub const OPERATOR_HEADER: &str = "x-operator";

/// JSON body whose rejections are reported as validation errors.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        Json::<T>::from_request(req, state)
            .await
            .map(|Json(value)| Self(value))
            .map_err(|rejection| ApiError::validation(rejection.body_text()))
    }
}

/// Query string whose rejections are reported as validation errors.
pub struct ApiQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Query::<T>::from_request_parts(parts, state)
            .await
            .map(|Query(value)| Self(value))
            .map_err(|rejection| ApiError::validation(rejection.body_text()))
    }
}

impl FromRequestParts<Arc<AppState>> for Operator {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(OPERATOR_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        match header {
            Some(name) if name.len() > MAX_NAME_LEN => Err(ApiError::validation(format!(
                "{OPERATOR_HEADER} must be at most {MAX_NAME_LEN} characters"
            ))),
            Some(name) => Ok(Operator(name.to_string())),
            None => Ok(Operator(state.config.audit.default_operator.clone())),
        }
    }
}

/// Checks a path parameter naming a directory object on read routes.
/// Mutations validate inside the directory service so rejections are audited.
pub fn validate_object_name<'a>(kind: &str, name: &'a str) -> Result<&'a str, ApiError> {
    Ok(validate_name(kind, name)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_object_name() {
        assert_eq!(
            validate_object_name("Group name", " Finance ").unwrap(),
            "Finance"
        );
        assert!(validate_object_name("Group name", "   ").is_err());
        assert!(validate_object_name("Group name", "bad\u{0}name").is_err());
        assert!(validate_object_name("Group name", &"x".repeat(300)).is_err());
    }
}
