//! # HTTP リクエストハンドラ
//!
//! axum のルートに対応するハンドラ関数を定義する。
//!
//! ## 設計方針
//!
//! - 各ハンドラはサブモジュールに配置
//! - 親モジュール（この `handler.rs`）で re-export し、フラットな API を提供
//! - ハンドラは薄く保ち、ビジネスロジックはユースケースに委譲
//! - レスポンスは `{ "data": ... }`、エラーは Problem Details 形式

pub mod conversion;
pub mod conversion_step;
pub mod health;
pub mod lead;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
pub use conversion::{
    ConversionAppState,
    cancel_conversion,
    create_conversion,
    execute_conversion,
    get_conversion,
    list_conversions,
    retry_conversion,
    stream_conversion_events,
};
pub use conversion_step::list_conversion_steps;
pub use health::health_check;
pub use lead::{LeadAppState, create_lead, list_leads};

/// 全エンドポイントのルーターを構築する
pub fn router(conversion_state: Arc<ConversionAppState>, lead_state: Arc<LeadAppState>) -> Router {
    let conversions = Router::new()
        .route(
            "/conversions",
            get(list_conversions).post(create_conversion),
        )
        .route("/conversions/{id}", get(get_conversion))
        .route("/conversions/{id}/retry", post(retry_conversion))
        .route("/conversions/{id}/execute", post(execute_conversion))
        .route("/conversions/{id}/cancel", post(cancel_conversion))
        .route("/conversions/{id}/events", get(stream_conversion_events))
        .with_state(conversion_state);

    let leads = Router::new()
        .route("/leads", get(list_leads).post(create_lead))
        .with_state(lead_state);

    Router::new()
        .route("/health", get(health_check))
        .route("/conversion-steps", get(list_conversion_steps))
        .merge(conversions)
        .merge(leads)
}
