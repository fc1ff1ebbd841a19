//! # コンバージョン
//!
//! リードを顧客に変換するパイプラインのドメインモデル。
//!
//! - [`step`] - 固定順序のステップカタログ
//! - [`step_instance`] - レコードごとのステップ実行状態
//! - [`record`] - コンバージョンレコード（集約）
//! - [`error`] - ステップ実行エラーの分類
//! - [`event`] - 進捗イベント

pub mod error;
pub mod event;
pub mod record;
pub mod step;
pub mod step_instance;

pub use error::ConversionStepError;
pub use event::{ConversionEvent, ConversionEventKind};
pub use record::{
    CompletedState,
    ConversionRecord,
    ConversionRecordRow,
    ConversionState,
    ConversionStatus,
    FailedState,
    InProgressState,
    NewConversionRecord,
};
pub use step::{CONVERSION_STEPS, ConversionStepDefinition, ConversionStepId, TOTAL_STEPS, step_at};
pub use step_instance::{StepInstance, StepInstanceRecord, StepState, StepStatus};

/// コンバージョンレコード ID（UUID v7）
///
/// 作成順に並ぶため、一覧の並び順にもそのまま使える。
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    serde::Serialize,
    serde::Deserialize,
    derive_more::Display,
)]
#[serde(transparent)]
#[display("{_0}")]
pub struct ConversionId(uuid::Uuid);

impl ConversionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7())
    }

    pub fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for ConversionId {
    fn default() -> Self {
        Self::new()
    }
}
