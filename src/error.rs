use axum::extract::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use std::env;
use std::fmt::{self, Debug, Display};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    Unauthorized,
    NotFound,
    InvalidTransition,
    AlreadyAccepted,
    InsufficientFunds { balance: Decimal, shortfall: Decimal },
    NoDriversAvailable,
    UpstreamUnavailable,
}

impl ErrorKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::Unauthorized => "unauthorized",
            Self::NotFound => "not_found",
            Self::InvalidTransition => "invalid_transition",
            Self::AlreadyAccepted => "already_accepted",
            Self::InsufficientFunds {
                balance: _,
                shortfall: _,
            } => "insufficient_funds",
            Self::NoDriversAvailable => "no_drivers_available",
            Self::UpstreamUnavailable => "upstream_unavailable",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidInput => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::InvalidTransition | Self::AlreadyAccepted => StatusCode::CONFLICT,
            Self::InsufficientFunds {
                balance: _,
                shortfall: _,
            } => StatusCode::PAYMENT_REQUIRED,
            Self::NoDriversAvailable => StatusCode::UNPROCESSABLE_ENTITY,
            Self::UpstreamUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
}

impl Error {
    pub fn is_not_found_error(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }

    pub fn is_upstream_error(&self) -> bool {
        self.kind == ErrorKind::UpstreamUnavailable
    }

    /// Balance and shortfall carried by an `InsufficientFunds` error.
    pub fn shortfall(&self) -> Option<(Decimal, Decimal)> {
        match self.kind {
            ErrorKind::InsufficientFunds { balance, shortfall } => Some((balance, shortfall)),
            _ => None,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.name(), self.message)
    }
}

impl std::error::Error for Error {}

impl From<env::VarError> for Error {
    fn from(err: env::VarError) -> Self {
        invalid_input_error(format!("environment variable error: {}", err))
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => not_found_error("row not found"),
            err => database_error(err),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        tracing::warn!("reqwest error: {:?}", err);
        upstream_error("route provider request failed")
    }
}

impl From<oso::OsoError> for Error {
    fn from(err: oso::OsoError) -> Self {
        tracing::error!("authorization policy error: {:?}", err);
        upstream_error("authorization policy unavailable")
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        tracing::error!("serialization error: {:?}", err);
        upstream_error("stored record could not be decoded")
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.kind.status_code();

        let message = match self.kind {
            ErrorKind::UpstreamUnavailable => "Service Unavailable".to_string(),
            ErrorKind::AlreadyAccepted => "ride no longer available".to_string(),
            _ => self.message.clone(),
        };

        let body = Json(json!({
            "kind": self.kind,
            "error": message,
        }));

        (status, body).into_response()
    }
}

pub fn invalid_input_error(message: impl Into<String>) -> Error {
    Error {
        kind: ErrorKind::InvalidInput,
        message: message.into(),
    }
}

pub fn unauthorized_error() -> Error {
    Error {
        kind: ErrorKind::Unauthorized,
        message: "unauthorized".into(),
    }
}

pub fn not_found_error(message: impl Into<String>) -> Error {
    Error {
        kind: ErrorKind::NotFound,
        message: message.into(),
    }
}

pub fn invalid_transition_error(message: impl Into<String>) -> Error {
    Error {
        kind: ErrorKind::InvalidTransition,
        message: message.into(),
    }
}

pub fn already_accepted_error() -> Error {
    Error {
        kind: ErrorKind::AlreadyAccepted,
        message: "ride no longer available".into(),
    }
}

pub fn insufficient_funds_error(balance: Decimal, shortfall: Decimal) -> Error {
    Error {
        kind: ErrorKind::InsufficientFunds { balance, shortfall },
        message: format!(
            "insufficient wallet balance: {} available, {} short",
            balance, shortfall
        ),
    }
}

pub fn no_drivers_available_error() -> Error {
    Error {
        kind: ErrorKind::NoDriversAvailable,
        message: "no drivers available in your area".into(),
    }
}

pub fn upstream_error(message: impl Into<String>) -> Error {
    Error {
        kind: ErrorKind::UpstreamUnavailable,
        message: message.into(),
    }
}

pub fn database_error<T: Debug>(err: T) -> Error {
    tracing::error!("database error: {:?}", err);
    upstream_error("database error")
}

#[test]
fn error_kind_names_are_stable() {
    use rust_decimal_macros::dec;

    assert_eq!(invalid_input_error("x").kind.name(), "invalid_input");
    assert_eq!(already_accepted_error().kind.name(), "already_accepted");
    assert_eq!(
        insufficient_funds_error(dec!(100), dec!(110)).kind.name(),
        "insufficient_funds"
    );
    assert_eq!(
        insufficient_funds_error(dec!(100), dec!(110)).shortfall(),
        Some((dec!(100), dec!(110)))
    );
}

#[test]
fn already_accepted_renders_as_conflict() {
    let response = already_accepted_error().into_response();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = upstream_error("db down").into_response();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}
