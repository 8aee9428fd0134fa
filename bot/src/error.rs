use reqwest::StatusCode;
use serenity::http::HttpError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("datafeed unreachable: {0}")]
    Unreachable(#[from] reqwest::Error),
    #[error("datafeed returned status {0}")]
    BadStatus(StatusCode),
    #[error("datafeed payload did not deserialize: {0}")]
    Deserialize(#[from] serde_json::Error),
}

/// Message-level delivery failures, classified so call sites can decide
/// between recreate (NotFound), abandon/fallback (Forbidden) and propagate.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("missing permissions")]
    Forbidden,
    #[error("message or channel not found")]
    NotFound,
    #[error(transparent)]
    Other(serenity::Error),
}

impl From<serenity::Error> for DeliveryError {
    fn from(err: serenity::Error) -> Self {
        if let serenity::Error::Http(HttpError::UnsuccessfulRequest(ref resp)) = err {
            match resp.status_code {
                StatusCode::FORBIDDEN => return Self::Forbidden,
                StatusCode::NOT_FOUND => return Self::NotFound,
                _ => {}
            }
        }
        Self::Other(err)
    }
}
