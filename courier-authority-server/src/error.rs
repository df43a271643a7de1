// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! One place the §7 error taxonomy becomes an HTTP status: every handler
//! returns `Result<T, ApiError>`. Ground: `identity_server`'s
//! thiserror-enum-plus-`IntoResponse` handler idiom.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use courier_common::error::ErrorKind;
use serde::Serialize;
use tracing::error;
use uuid::Uuid;

pub struct ApiError {
    kind: ErrorKind,
    correlation_id: Uuid,
}

impl ApiError {
    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

impl From<ErrorKind> for ApiError {
    fn from(kind: ErrorKind) -> Self {
        Self {
            kind,
            correlation_id: Uuid::new_v4(),
        }
    }
}

impl From<courier_authority::AuthorityError> for ApiError {
    fn from(err: courier_authority::AuthorityError) -> Self {
        ErrorKind::from(err).into()
    }
}

impl From<courier_queue::QueueError> for ApiError {
    fn from(err: courier_queue::QueueError) -> Self {
        ErrorKind::from(err).into()
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    correlation_id: Uuid,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.kind {
            ErrorKind::Validation { field, reason } => {
                (StatusCode::BAD_REQUEST, format!("{field}: {reason}"))
            }
            ErrorKind::Authentication(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            ErrorKind::Authorization(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            ErrorKind::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ErrorKind::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            ErrorKind::RateLimitExceeded { retry_after_secs } => (
                StatusCode::TOO_MANY_REQUESTS,
                format!("retry after {retry_after_secs}s"),
            ),
            ErrorKind::TransientDependency(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "a downstream dependency is unavailable".to_string(),
            ),
            ErrorKind::PermanentDependency(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            ErrorKind::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error".to_string(),
            ),
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR || status == StatusCode::SERVICE_UNAVAILABLE {
            error!(correlation_id = %self.correlation_id, kind = %self.kind, "request failed");
        }

        let mut response = (
            status,
            Json(ErrorBody {
                error: message,
                correlation_id: self.correlation_id,
            }),
        )
            .into_response();
        response.headers_mut().insert(
            "x-correlation-id",
            self.correlation_id.to_string().parse().expect("uuid is valid header value"),
        );
        response
    }
}
