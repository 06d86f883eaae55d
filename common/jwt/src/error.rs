use axum::http::header::WWW_AUTHENTICATE;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

/// HTTP-facing category of an authentication failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthErrorKind {
    BadRequest,
    Unauthorized,
    ServiceUnavailable,
}

impl AuthErrorKind {
    pub fn status(self) -> StatusCode {
        match self {
            AuthErrorKind::BadRequest => StatusCode::BAD_REQUEST,
            AuthErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            AuthErrorKind::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AuthErrorKind::BadRequest => "bad_request",
            AuthErrorKind::Unauthorized => "unauthorized",
            AuthErrorKind::ServiceUnavailable => "service_unavailable",
        }
    }
}

/// Failure of the request authentication pipeline.
///
/// Display strings are safe to return to clients; the detail carried by some
/// variants is only meant for logs.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authentication required")]
    MissingToken,
    #[error("invalid token")]
    MalformedToken(String),
    #[error("authentication not available")]
    SigningKeyUnavailable,
    #[error("unauthenticated")]
    Verification(String),
}

impl AuthError {
    pub fn kind(&self) -> AuthErrorKind {
        match self {
            AuthError::MalformedToken(_) => AuthErrorKind::BadRequest,
            AuthError::MissingToken | AuthError::Verification(_) => AuthErrorKind::Unauthorized,
            AuthError::SigningKeyUnavailable => AuthErrorKind::ServiceUnavailable,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AuthError::MissingToken => "AUTH_REQUIRED",
            AuthError::MalformedToken(_) => "AUTH_TOKEN_MALFORMED",
            AuthError::SigningKeyUnavailable => "AUTH_UNAVAILABLE",
            AuthError::Verification(_) => "AUTH_TOKEN",
        }
    }

    /// Internal detail for logging, if any.
    pub fn detail(&self) -> Option<&str> {
        match self {
            AuthError::MalformedToken(detail) | AuthError::Verification(detail) => {
                Some(detail.as_str())
            }
            AuthError::MissingToken | AuthError::SigningKeyUnavailable => None,
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(value: jsonwebtoken::errors::Error) -> Self {
        Self::Verification(value.to_string())
    }
}

/// Failure of a single signing key provider. Recovered by the resolver.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("token has no kid and the key set holds {0} keys")]
    AmbiguousKey(usize),
    #[error("no signing key found for kid '{0}'")]
    UnknownKeyId(String),
    #[error("failed to parse signing key: {0}")]
    KeyParse(String),
    #[error("failed to fetch JWKS: {0}")]
    JwksFetch(String),
    #[error("failed to parse JWKS response: {0}")]
    JwksDecode(String),
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let code = self.code();
        let body = ErrorBody {
            code,
            message: self.to_string(),
        };

        let mut response = (kind.status(), Json(body)).into_response();
        let headers = response.headers_mut();
        headers.insert("X-Error-Code", HeaderValue::from_static(code));
        if kind == AuthErrorKind::Unauthorized {
            headers.insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}
