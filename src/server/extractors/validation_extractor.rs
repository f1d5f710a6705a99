use axum::Json;
use axum::extract::{FromRequest, FromRequestParts, Query, Request};
use axum::http::request::Parts;
use serde::de::DeserializeOwned;
use validator::{Validate, ValidationErrors};

use crate::server::error::Error;

/// `Query<T>` that also runs `T::validate`, any failure is a 400 in the usual json envelope
pub struct ValidatedQuery<T>(pub T);

/// same as [`ValidatedQuery`] but for json bodies
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequestParts<S> for ValidatedQuery<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| Error::BadRequest(rejection.body_text()))?;

        value
            .validate()
            .map_err(|errors| Error::BadRequest(describe(&errors)))?;

        Ok(Self(value))
    }
}

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| Error::BadRequest(rejection.body_text()))?;

        value
            .validate()
            .map_err(|errors| Error::BadRequest(describe(&errors)))?;

        Ok(Self(value))
    }
}

/// flattens validator output into one line, struct level errors don't get a field prefix
pub fn describe(errors: &ValidationErrors) -> String {
    let mut lines: Vec<String> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |err| {
                let message = err
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("invalid value ({})", err.code));
                if field == "__all__" {
                    message
                } else {
                    format!("{}: {}", field, message)
                }
            })
        })
        .collect();

    lines.sort();

    if lines.is_empty() {
        "invalid request".to_string()
    } else {
        lines.join("; ")
    }
}
