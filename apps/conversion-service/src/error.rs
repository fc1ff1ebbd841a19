//! # Conversion Service エラー定義
//!
//! Conversion Service 固有のエラーと、HTTP レスポンスへの変換を定義する。

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use leadconv_domain::DomainError;
use leadconv_infra::{InfraError, InfraErrorKind};
use leadconv_shared::ErrorResponse;
use thiserror::Error;

/// Conversion Service で発生するエラー
#[derive(Debug, Error)]
pub enum CoreError {
    /// リソースが見つからない
    #[error("リソースが見つかりません: {0}")]
    NotFound(String),

    /// 不正なリクエスト
    #[error("不正なリクエスト: {0}")]
    BadRequest(String),

    /// 競合（重複登録、実行中、許可されない状態遷移）
    #[error("競合が発生しました: {0}")]
    Conflict(String),

    /// データベースエラー
    #[error("データベースエラー: {0}")]
    Database(InfraError),

    /// 内部エラー
    #[error("内部エラー: {0}")]
    Internal(String),
}

impl From<DomainError> for CoreError {
    fn from(error: DomainError) -> Self {
        match error {
            DomainError::Validation(msg) => CoreError::BadRequest(msg),
            e @ DomainError::NotFound { .. } => CoreError::NotFound(e.to_string()),
            DomainError::Conflict(msg) | DomainError::InvalidState(msg) => CoreError::Conflict(msg),
        }
    }
}

impl From<InfraError> for CoreError {
    fn from(error: InfraError) -> Self {
        match error.kind() {
            InfraErrorKind::Conflict { .. } | InfraErrorKind::Duplicate { .. } => {
                CoreError::Conflict(error.to_string())
            }
            _ => CoreError::Database(error),
        }
    }
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let body = match &self {
            CoreError::NotFound(msg) => ErrorResponse::not_found(msg.clone()),
            CoreError::BadRequest(msg) => ErrorResponse::bad_request(msg.clone()),
            CoreError::Conflict(msg) => ErrorResponse::conflict(msg.clone()),
            CoreError::Database(e) => {
                tracing::error!(
                    error.kind = "database",
                    span_trace = %e.span_trace(),
                    "データベースエラー: {}",
                    e
                );
                ErrorResponse::internal_error()
            }
            CoreError::Internal(msg) => {
                tracing::error!(error.kind = "internal", "内部エラー: {}", msg);
                ErrorResponse::internal_error()
            }
        };

        let status =
            StatusCode::from_u16(body.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(CoreError::NotFound("x".into()), StatusCode::NOT_FOUND)]
    #[case(CoreError::BadRequest("x".into()), StatusCode::BAD_REQUEST)]
    #[case(CoreError::Conflict("x".into()), StatusCode::CONFLICT)]
    #[case(CoreError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR)]
    fn test_エラー種別ごとのステータスコード(
        #[case] error: CoreError,
        #[case] expected: StatusCode,
    ) {
        assert_eq!(error.into_response().status(), expected);
    }

    #[test]
    fn test_状態遷移エラーは競合になる() {
        let error: CoreError = DomainError::InvalidState("完了済み".into()).into();

        assert!(matches!(error, CoreError::Conflict(msg) if msg == "完了済み"));
    }

    #[test]
    fn test_重複登録は競合になる() {
        let error: CoreError = InfraError::duplicate("ConversionRecord", "L1").into();

        assert!(matches!(error, CoreError::Conflict(_)));
    }

    #[test]
    fn test_想定外のインフラエラーはデータベースエラーになる() {
        let error: CoreError = InfraError::unexpected("壊れた行").into();

        assert!(matches!(error, CoreError::Database(_)));
    }
}
