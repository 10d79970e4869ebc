use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::AppError;

/// A `Query<T>` wrapper whose rejections become `VALIDATION_ERROR` bodies.
pub struct AppQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for AppQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(AppQuery(value)),
            Err(rejection) => {
                debug!(status = %rejection.status(), "Rejected query string");
                Err(AppError::Validation(format!(
                    "Invalid query parameters: {}",
                    rejection.body_text()
                )))
            }
        }
    }
}

