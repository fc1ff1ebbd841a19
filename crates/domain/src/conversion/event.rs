//! # 進捗イベント
//!
//! 実行中のコンバージョンが購読者に通知する進捗。
//! ステップの開始・完了・失敗ごとに 1 件発行される。

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{
    ConversionId,
    record::{ConversionRecord, ConversionStatus},
    step::ConversionStepId,
};
use crate::customer::CustomerId;

/// イベント種別
///
/// `&'static str` への変換は serde の `type` タグと同じ名前を返す。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, strum::IntoStaticStr)]
#[serde(tag = "type", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConversionEventKind {
    /// 実行開始（再開を含む）
    Started,
    StepStarted {
        index:   usize,
        step_id: ConversionStepId,
    },
    StepCompleted {
        index:   usize,
        step_id: ConversionStepId,
    },
    StepFailed {
        index:    usize,
        step_id:  ConversionStepId,
        required: bool,
        message:  String,
    },
    /// 全ステップ完了
    Completed { customer_id: CustomerId },
    /// 失敗で停止
    Failed { message: String },
    /// キャンセルにより `index` の手前で停止
    Cancelled { index: usize },
}

/// 進捗イベント
///
/// 発行時点のレコードのスナップショット（ステータスと完了済みステップ数）を含む。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversionEvent {
    pub conversion_id:      ConversionId,
    pub status:             ConversionStatus,
    pub current_step_index: usize,
    #[serde(flatten)]
    pub kind:               ConversionEventKind,
    pub occurred_at:        DateTime<Utc>,
}

impl ConversionEvent {
    pub fn new(record: &ConversionRecord, kind: ConversionEventKind, now: DateTime<Utc>) -> Self {
        Self {
            conversion_id: record.id().clone(),
            status: record.status(),
            current_step_index: record.current_step_index(),
            kind,
            occurred_at: now,
        }
    }

    /// 実行の終わりを示すイベントか
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind,
            ConversionEventKind::Completed { .. }
                | ConversionEventKind::Failed { .. }
                | ConversionEventKind::Cancelled { .. }
        )
    }
}
