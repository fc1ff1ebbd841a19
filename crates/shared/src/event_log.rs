//! # ビジネスイベントログとエラーコンテキストの構造化ヘルパー
//!
//! `jq` で効率的に調査できるよう、ログフィールドの命名規約と
//! ヘルパーマクロを提供する。
//!
//! ## ビジネスイベント
//!
//! [`log_business_event!`] マクロで出力する。`event.kind = "business_event"` マーカーが
//! 自動付与され、`jq 'select(.["event.kind"] == "business_event")'` でフィルタできる。
//!
//! ## フィールド命名規約
//!
//! ドット記法（`event.category`、`error.kind`）を使用。tracing の
//! `$($field:ident).+` パターンでサポートされ、JSON 出力でフラットなキーになる。

/// ビジネスイベントを構造化ログとして出力する。
///
/// `event.kind = "business_event"` マーカーを自動付与し、
/// `tracing::info!` レベルで出力する。呼び出し側クレートは `tracing` に依存すること。
///
/// ## 必須フィールド（慣例）
///
/// - `event.category`: イベントカテゴリ（[`event::category`] の定数を使用）
/// - `event.action`: アクション名（[`event::action`] の定数を使用）
/// - `event.result`: 結果（[`event::result`] の定数を使用）
///
/// ## 推奨フィールド
///
/// - `event.entity_type`: エンティティ種別（[`event::entity_type`] の定数を使用）
/// - `event.entity_id`: エンティティ ID
#[macro_export]
macro_rules! log_business_event {
    ($($args:tt)*) => {
        ::tracing::info!(
            event.kind = "business_event",
            $($args)*
        )
    };
}

/// イベントフィールドの定数
pub mod event {
    /// イベントカテゴリ
    pub mod category {
        pub const CONVERSION: &str = "conversion";
        pub const LEAD: &str = "lead";
        pub const NOTIFICATION: &str = "notification";
    }

    /// イベントアクション
    pub mod action {
        // コンバージョン
        pub const CONVERSION_CREATED: &str = "conversion.created";
        pub const CONVERSION_STARTED: &str = "conversion.started";
        pub const CONVERSION_COMPLETED: &str = "conversion.completed";
        pub const CONVERSION_FAILED: &str = "conversion.failed";
        pub const CONVERSION_RETRIED: &str = "conversion.retried";
        pub const CONVERSION_CANCELLED: &str = "conversion.cancelled";

        // リード
        pub const LEAD_REGISTERED: &str = "lead.registered";

        // 通知
        pub const NOTIFICATION_SENT: &str = "notification.sent";
        pub const NOTIFICATION_FAILED: &str = "notification.failed";
    }

    /// エンティティ種別
    pub mod entity_type {
        pub const CONVERSION_RECORD: &str = "conversion_record";
        pub const LEAD: &str = "lead";
        pub const CUSTOMER: &str = "customer";
    }

    /// イベント結果
    pub mod result {
        pub const SUCCESS: &str = "success";
        pub const FAILURE: &str = "failure";
    }
}

/// エラーコンテキストフィールドの定数
pub mod error {
    /// エラーカテゴリ
    pub mod category {
        /// インフラストラクチャ（DB、SMTP）
        pub const INFRASTRUCTURE: &str = "infrastructure";
        /// コンバージョンステップの外部協調サービス呼び出し
        pub const COLLABORATOR: &str = "collaborator";
    }

    /// エラー種別
    pub mod kind {
        pub const DATABASE: &str = "database";
        pub const INTERNAL: &str = "internal";
        pub const STEP_FAILURE: &str = "step_failure";
        pub const STEP_TIMEOUT: &str = "step_timeout";
    }
}
