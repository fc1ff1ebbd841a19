//! # ドメイン層エラー定義
//!
//! ビジネスルール違反やドメイン固有の例外状態を表現するエラー型。
//!
//! ## エラーの種類と HTTP ステータスの対応
//!
//! | エラー種別 | HTTP ステータス | 用途 |
//! |-----------|----------------|------|
//! | `Validation` | 400 Bad Request | 入力値の検証失敗 |
//! | `NotFound` | 404 Not Found | エンティティが存在しない |
//! | `Conflict` | 409 Conflict | 重複登録・楽観的ロックの失敗 |
//! | `InvalidState` | 409 Conflict | 現在の状態では許可されない状態遷移 |
//!
//! ## 使用例
//!
//! ```rust
//! use leadconv_domain::DomainError;
//!
//! fn require_failed(status: &str) -> Result<(), DomainError> {
//!     if status != "failed" {
//!         return Err(DomainError::InvalidState(format!(
//!             "失敗状態のみリトライできます（現在: {status}）"
//!         )));
//!     }
//!     Ok(())
//! }
//!
//! assert!(require_failed("completed").is_err());
//! ```

use thiserror::Error;

/// ドメイン層で発生するエラー
///
/// API 層でこのエラーを受け取り、適切な HTTP レスポンスに変換する。
#[derive(Debug, Error)]
pub enum DomainError {
    /// バリデーションエラー
    ///
    /// 入力値や DB から復元したデータがビジネスルールに違反している場合に使用する。
    #[error("バリデーションエラー: {0}")]
    Validation(String),

    /// エンティティが見つからない
    ///
    /// `entity_type` にはエンティティの種類（"ConversionRecord", "Lead" など）を指定する。
    #[error("{entity_type} が見つかりません: {id}")]
    NotFound {
        /// エンティティの種類
        entity_type: &'static str,
        /// 検索に使用した識別子
        id:          String,
    },

    /// 競合エラー
    ///
    /// 同一リードの重複コンバージョンや、楽観的ロック（バージョン番号チェック）の
    /// 失敗時に使用する。
    #[error("競合が発生しました: {0}")]
    Conflict(String),

    /// 不正な状態遷移
    ///
    /// 例: 完了済みレコードのリトライ、待機中でないステップの開始。
    #[error("状態遷移エラー: {0}")]
    InvalidState(String),
}
