//! # コンバージョンレコード
//!
//! リード 1 件の顧客化の進捗を追跡する集約。
//!
//! 全体ステータスは ADT（[`ConversionState`]）で表現し、状態ごとに有効な
//! フィールドだけを持たせる。`current_step_index` は保持せず、完了済み
//! ステップ数から導出する。
//!
//! ## 状態遷移
//!
//! ```text
//! NotStarted ──started──▶ InProgress ──step_completed(最終)──▶ Completed
//!     ▲                      │
//!     │                      └──step_failed──▶ Failed
//!     └──────────────retried─────────────────────┘
//! ```
//!
//! すべての遷移は `version` をインクリメントし、`updated_at` を更新する。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;

use super::{
    ConversionId,
    step::{CONVERSION_STEPS, TOTAL_STEPS},
    step_instance::{StepInstance, StepStatus},
};
use crate::{
    DomainError,
    customer::CustomerId,
    lead::{Lead, LeadId},
    value_objects::{TerritoryManagerId, Version},
};

/// コンバージョンの全体ステータス
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    IntoStaticStr,
    strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConversionStatus {
    /// 未開始
    NotStarted,
    /// 実行中
    InProgress,
    /// 完了（顧客作成済み）
    Completed,
    /// 失敗
    Failed,
}

impl std::str::FromStr for ConversionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_started" => Ok(Self::NotStarted),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(DomainError::Validation(format!(
                "不正なコンバージョンステータス: {}",
                s
            ))),
        }
    }
}

/// コンバージョンの状態（ADT ベースステートマシン）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionState {
    /// 未開始
    NotStarted,
    /// 実行中
    InProgress(InProgressState),
    /// 完了
    Completed(CompletedState),
    /// 失敗
    Failed(FailedState),
}

/// InProgress 状態の固有フィールド
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InProgressState {
    pub started_at: DateTime<Utc>,
}

/// Completed 状態の固有フィールド
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedState {
    pub started_at:   DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub customer_id:  CustomerId,
}

/// Failed 状態の固有フィールド
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedState {
    pub started_at:        DateTime<Utc>,
    /// 空でないことを保証する
    pub validation_errors: Vec<String>,
}

/// コンバージョンレコードエンティティ
///
/// ## 楽観的ロック
///
/// `version` フィールドにより、並行更新時の競合を検出する。
/// 永続化時は遷移前の version と DB の version を比較し、
/// 一致しない場合は競合エラーとする。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRecord {
    id: ConversionId,
    lead_id: LeadId,
    assigned_to: TerritoryManagerId,
    steps: Vec<StepInstance>,
    version: Version,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    state: ConversionState,
}

/// コンバージョンレコードの新規作成パラメータ
pub struct NewConversionRecord {
    pub id: ConversionId,
    pub lead_id: LeadId,
    pub assigned_to: TerritoryManagerId,
    pub now: DateTime<Utc>,
}

impl NewConversionRecord {
    /// リードからパラメータを組み立てる
    pub fn for_lead(lead: &Lead, now: DateTime<Utc>) -> Self {
        Self {
            id: ConversionId::new(),
            lead_id: lead.id().clone(),
            assigned_to: lead.assigned_to().clone(),
            now,
        }
    }
}

/// コンバージョンレコードの DB 復元パラメータ
///
/// DB スキーマのフラット構造を表現する。`from_db()` で不変条件を検証して ADT に変換する。
pub struct ConversionRecordRow {
    pub id: ConversionId,
    pub lead_id: LeadId,
    pub assigned_to: TerritoryManagerId,
    pub status: ConversionStatus,
    pub steps: Vec<StepInstance>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub customer_id: Option<CustomerId>,
    pub validation_errors: Vec<String>,
    pub version: Version,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversionRecord {
    /// 新しいコンバージョンレコードを作成する
    ///
    /// 全ステップを未着手で初期化する。
    pub fn new(params: NewConversionRecord) -> Self {
        Self {
            id: params.id,
            lead_id: params.lead_id,
            assigned_to: params.assigned_to,
            steps: pending_steps(),
            version: Version::initial(),
            created_at: params.now,
            updated_at: params.now,
            state: ConversionState::NotStarted,
        }
    }

    /// 既存のデータから復元する
    ///
    /// # Errors
    ///
    /// - `DomainError::Validation`: ステップ数・ステップ順序・ステータスと付随フィールドの不整合
    pub fn from_db(row: ConversionRecordRow) -> Result<Self, DomainError> {
        let invalid = |detail: String| {
            DomainError::Validation(format!("コンバージョンレコード {}: {}", row.id, detail))
        };

        if row.steps.len() != TOTAL_STEPS {
            return Err(invalid(format!(
                "ステップ数が不正です（期待: {}, 実際: {}）",
                TOTAL_STEPS,
                row.steps.len()
            )));
        }
        for (step, definition) in row.steps.iter().zip(CONVERSION_STEPS.iter()) {
            if step.step_id() != definition.id {
                return Err(invalid(format!(
                    "ステップ順序が不正です（期待: {}, 実際: {}）",
                    definition.id,
                    step.step_id()
                )));
            }
        }

        // 完了済みの接頭辞、高々 1 つの実行中/失敗、残りは未着手
        let completed = row.steps.iter().take_while(|s| s.is_completed()).count();
        let frontier = row.steps.get(completed).map(StepInstance::status);
        if row.steps.iter().skip(completed + 1).any(|s| s.status() != StepStatus::Pending) {
            return Err(invalid(
                "未完了ステップの後続に未着手以外のステップがあります".to_string(),
            ));
        }

        let has_errors = !row.validation_errors.is_empty();
        let has_completion = row.completed_at.is_some() || row.customer_id.is_some();
        if has_errors && row.status != ConversionStatus::Failed {
            return Err(invalid(
                "失敗以外で validation_errors が設定されています".to_string(),
            ));
        }
        if has_completion && row.status != ConversionStatus::Completed {
            return Err(invalid(
                "完了以外で completed_at または customer_id が設定されています".to_string(),
            ));
        }

        let state = match row.status {
            ConversionStatus::NotStarted => {
                if completed != 0 || frontier != Some(StepStatus::Pending) {
                    return Err(invalid(
                        "未開始レコードのステップはすべて未着手である必要があります".to_string(),
                    ));
                }
                if row.started_at.is_some() {
                    return Err(invalid(
                        "未開始レコードに started_at が設定されています".to_string(),
                    ));
                }
                ConversionState::NotStarted
            }
            ConversionStatus::InProgress => {
                if !matches!(frontier, Some(StepStatus::Pending | StepStatus::InProgress)) {
                    return Err(invalid(
                        "実行中レコードには未完了かつ未失敗のステップが必要です".to_string(),
                    ));
                }
                let started_at = row.started_at.ok_or_else(|| {
                    invalid("実行中レコードには started_at が必要です".to_string())
                })?;
                ConversionState::InProgress(InProgressState { started_at })
            }
            ConversionStatus::Completed => {
                if completed != TOTAL_STEPS {
                    return Err(invalid(
                        "完了レコードは全ステップ完了である必要があります".to_string(),
                    ));
                }
                let started_at = row.started_at.ok_or_else(|| {
                    invalid("完了レコードには started_at が必要です".to_string())
                })?;
                let completed_at = row.completed_at.ok_or_else(|| {
                    invalid("完了レコードには completed_at が必要です".to_string())
                })?;
                let customer_id = row.customer_id.ok_or_else(|| {
                    invalid("完了レコードには customer_id が必要です".to_string())
                })?;
                ConversionState::Completed(CompletedState {
                    started_at,
                    completed_at,
                    customer_id,
                })
            }
            ConversionStatus::Failed => {
                if frontier != Some(StepStatus::Failed) {
                    return Err(invalid(
                        "失敗レコードには失敗したステップが必要です".to_string(),
                    ));
                }
                if !has_errors {
                    return Err(invalid(
                        "失敗レコードには validation_errors が必要です".to_string(),
                    ));
                }
                let started_at = row.started_at.ok_or_else(|| {
                    invalid("失敗レコードには started_at が必要です".to_string())
                })?;
                ConversionState::Failed(FailedState {
                    started_at,
                    validation_errors: row.validation_errors,
                })
            }
        };

        Ok(Self {
            id: row.id,
            lead_id: row.lead_id,
            assigned_to: row.assigned_to,
            steps: row.steps,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
            state,
        })
    }

    // Getter メソッド

    pub fn id(&self) -> &ConversionId {
        &self.id
    }

    pub fn lead_id(&self) -> &LeadId {
        &self.lead_id
    }

    pub fn assigned_to(&self) -> &TerritoryManagerId {
        &self.assigned_to
    }

    pub fn steps(&self) -> &[StepInstance] {
        &self.steps
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// 状態への直接アクセス（パターンマッチ用）
    pub fn state(&self) -> &ConversionState {
        &self.state
    }

    pub fn status(&self) -> ConversionStatus {
        match &self.state {
            ConversionState::NotStarted => ConversionStatus::NotStarted,
            ConversionState::InProgress(_) => ConversionStatus::InProgress,
            ConversionState::Completed(_) => ConversionStatus::Completed,
            ConversionState::Failed(_) => ConversionStatus::Failed,
        }
    }

    /// 完了済みステップ数
    pub fn current_step_index(&self) -> usize {
        self.steps.iter().take_while(|s| s.is_completed()).count()
    }

    pub fn total_steps(&self) -> usize {
        self.steps.len()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        match &self.state {
            ConversionState::NotStarted => None,
            ConversionState::InProgress(s) => Some(s.started_at),
            ConversionState::Completed(s) => Some(s.started_at),
            ConversionState::Failed(s) => Some(s.started_at),
        }
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        match &self.state {
            ConversionState::Completed(s) => Some(s.completed_at),
            _ => None,
        }
    }

    pub fn customer_id(&self) -> Option<&CustomerId> {
        match &self.state {
            ConversionState::Completed(s) => Some(&s.customer_id),
            _ => None,
        }
    }

    pub fn validation_errors(&self) -> &[String] {
        match &self.state {
            ConversionState::Failed(s) => &s.validation_errors,
            _ => &[],
        }
    }

    /// 実行（再開を含む）が可能な状態か
    pub fn is_runnable(&self) -> bool {
        matches!(
            self.state,
            ConversionState::NotStarted | ConversionState::InProgress(_)
        )
    }

    // 状態遷移メソッド

    /// 実行を開始したレコードを返す
    ///
    /// # Errors
    ///
    /// - `DomainError::InvalidState`: 未開始以外の場合
    pub fn started(self, now: DateTime<Utc>) -> Result<Self, DomainError> {
        match self.state {
            ConversionState::NotStarted => Ok(Self {
                state: ConversionState::InProgress(InProgressState { started_at: now }),
                version: self.version.next(),
                updated_at: now,
                ..self
            }),
            _ => Err(DomainError::InvalidState(format!(
                "未開始のコンバージョンのみ開始できます（現在: {}）",
                self.status()
            ))),
        }
    }

    /// `index` のステップを実行中にしたレコードを返す
    ///
    /// # Errors
    ///
    /// - `DomainError::InvalidState`: 実行中でない、または `index` が次に実行すべきステップでない場合
    pub fn step_started(self, index: usize, now: DateTime<Utc>) -> Result<Self, DomainError> {
        self.ensure_frontier(index)?;
        let mut steps = self.steps;
        let step = steps.remove(index);
        steps.insert(index, step.started(now)?);
        Ok(Self {
            steps,
            version: self.version.next(),
            updated_at: now,
            ..self
        })
    }

    /// `index` のステップを完了したレコードを返す
    ///
    /// 最終ステップの完了でレコード全体が完了し、顧客 ID が確定する。
    ///
    /// # Errors
    ///
    /// - `DomainError::InvalidState`: 実行中でない、または `index` のステップが実行中でない場合
    pub fn step_completed(self, index: usize, now: DateTime<Utc>) -> Result<Self, DomainError> {
        let started_at = self.ensure_frontier(index)?;
        let mut steps = self.steps;
        let step = steps.remove(index);
        steps.insert(index, step.completed(now)?);

        let state = if steps.iter().all(StepInstance::is_completed) {
            ConversionState::Completed(CompletedState {
                started_at,
                completed_at: now,
                customer_id: CustomerId::for_lead(&self.lead_id),
            })
        } else {
            self.state
        };

        Ok(Self {
            steps,
            state,
            version: self.version.next(),
            updated_at: now,
            ..self
        })
    }

    /// `index` のステップを失敗させたレコードを返す
    ///
    /// 後続ステップは未着手のまま残る。
    ///
    /// # Errors
    ///
    /// - `DomainError::InvalidState`: 実行中でない、または `index` のステップが実行中でない場合
    pub fn step_failed(
        self,
        index: usize,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let started_at = self.ensure_frontier(index)?;
        let message = message.into();
        let mut steps = self.steps;
        let step = steps.remove(index);
        steps.insert(index, step.failed(message.clone())?);

        Ok(Self {
            steps,
            state: ConversionState::Failed(FailedState {
                started_at,
                validation_errors: vec![message],
            }),
            version: self.version.next(),
            updated_at: now,
            ..self
        })
    }

    /// 失敗したレコードを未開始に戻したレコードを返す
    ///
    /// 全ステップを未着手に戻し、開始日時とエラーを消去する。
    ///
    /// # Errors
    ///
    /// - `DomainError::InvalidState`: 失敗以外の場合
    pub fn retried(self, now: DateTime<Utc>) -> Result<Self, DomainError> {
        match self.state {
            ConversionState::Failed(_) => Ok(Self {
                steps: self.steps.into_iter().map(StepInstance::reset).collect(),
                state: ConversionState::NotStarted,
                version: self.version.next(),
                updated_at: now,
                ..self
            }),
            _ => Err(DomainError::InvalidState(format!(
                "失敗したコンバージョンのみリトライできます（現在: {}）",
                self.status()
            ))),
        }
    }

    /// 実行中であり、`index` が次に処理するステップであることを確認する
    ///
    /// 実行開始日時を返す。
    fn ensure_frontier(&self, index: usize) -> Result<DateTime<Utc>, DomainError> {
        let ConversionState::InProgress(in_progress) = &self.state else {
            return Err(DomainError::InvalidState(format!(
                "実行中のコンバージョンのみステップを進められます（現在: {}）",
                self.status()
            )));
        };
        let current = self.current_step_index();
        if index != current || index >= self.steps.len() {
            return Err(DomainError::InvalidState(format!(
                "ステップは順番に実行する必要があります（次: {}, 指定: {}）",
                current, index
            )));
        }
        Ok(in_progress.started_at)
    }
}

/// カタログ順に並んだ未着手ステップ一式
fn pending_steps() -> Vec<StepInstance> {
    CONVERSION_STEPS
        .iter()
        .map(|definition| StepInstance::pending(definition.id))
        .collect()
}
