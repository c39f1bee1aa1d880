use axum::Json;
use axum_extra::extract::WithRejection;

use crate::error::CredtrackError;

/// JSON body whose rejections render as `CredtrackError` responses.
pub type ApiJson<T> = WithRejection<Json<T>, CredtrackError>;
