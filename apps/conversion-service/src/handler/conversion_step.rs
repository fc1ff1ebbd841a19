//! # ステップカタログハンドラ
//!
//! ## エンドポイント
//!
//! ```text
//! GET /conversion-steps
//! ```

use axum::Json;
use leadconv_domain::conversion::{CONVERSION_STEPS, ConversionStepDefinition, ConversionStepId};
use leadconv_shared::ApiResponse;
use serde::Serialize;

/// ステップ定義 DTO
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionStepDto {
    pub index:                      usize,
    pub id:                         ConversionStepId,
    pub title:                      &'static str,
    pub description:                &'static str,
    pub required:                   bool,
    pub estimated_duration_minutes: u32,
}

impl From<&ConversionStepDefinition> for ConversionStepDto {
    fn from(step: &ConversionStepDefinition) -> Self {
        Self {
            index:                      step.id.index(),
            id:                         step.id,
            title:                      step.title,
            description:                step.description,
            required:                   step.required,
            estimated_duration_minutes: step.estimated_duration_minutes,
        }
    }
}

/// ステップカタログをカタログ順に返す
pub async fn list_conversion_steps() -> Json<ApiResponse<Vec<ConversionStepDto>>> {
    Json(ApiResponse::new(
        CONVERSION_STEPS.iter().map(ConversionStepDto::from).collect(),
    ))
}
