//! # ステップインスタンス
//!
//! コンバージョンレコードごと、カタログのステップごとに 1 つ存在する実行状態。
//!
//! 完了日時とエラーメッセージは同時に存在し得ないため、状態ごとに
//! 有効なフィールドだけを持つ ADT（[`StepState`]）で表現する。
//! 永続化（JSONB）ではフラットな [`StepInstanceRecord`] を経由し、
//! 復元時に不変条件を検証する。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;

use super::step::ConversionStepId;
use crate::DomainError;

/// ステップの実行ステータス
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    IntoStaticStr,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// ステップの状態（ADT ベースステートマシン）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepState {
    /// 未着手
    Pending,
    /// 実行中
    InProgress { started_at: DateTime<Utc> },
    /// 完了
    Completed {
        started_at:   DateTime<Utc>,
        completed_at: DateTime<Utc>,
    },
    /// 失敗
    Failed {
        started_at:    DateTime<Utc>,
        error_message: String,
    },
}

/// ステップインスタンス
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "StepInstanceRecord", try_from = "StepInstanceRecord")]
pub struct StepInstance {
    step_id: ConversionStepId,
    state:   StepState,
}

/// ステップインスタンスのフラット表現
///
/// JSONB カラムへの保存形式。`StepInstance::try_from` で ADT に変換する。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepInstanceRecord {
    pub step_id:       ConversionStepId,
    pub status:        StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at:    Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at:  Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl StepInstance {
    /// 未着手のステップを作成する
    pub fn pending(step_id: ConversionStepId) -> Self {
        Self {
            step_id,
            state: StepState::Pending,
        }
    }

    pub fn step_id(&self) -> ConversionStepId {
        self.step_id
    }

    pub fn state(&self) -> &StepState {
        &self.state
    }

    pub fn status(&self) -> StepStatus {
        match &self.state {
            StepState::Pending => StepStatus::Pending,
            StepState::InProgress { .. } => StepStatus::InProgress,
            StepState::Completed { .. } => StepStatus::Completed,
            StepState::Failed { .. } => StepStatus::Failed,
        }
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        match &self.state {
            StepState::Pending => None,
            StepState::InProgress { started_at }
            | StepState::Completed { started_at, .. }
            | StepState::Failed { started_at, .. } => Some(*started_at),
        }
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        match &self.state {
            StepState::Completed { completed_at, .. } => Some(*completed_at),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.state {
            StepState::Failed { error_message, .. } => Some(error_message),
            _ => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.state, StepState::Completed { .. })
    }

    // 状態遷移メソッド

    /// 実行を開始したステップを返す
    pub fn started(self, now: DateTime<Utc>) -> Result<Self, DomainError> {
        match self.state {
            StepState::Pending => Ok(Self {
                state: StepState::InProgress { started_at: now },
                ..self
            }),
            _ => Err(DomainError::InvalidState(format!(
                "未着手のステップのみ開始できます（{}: {}）",
                self.step_id,
                self.status()
            ))),
        }
    }

    /// 完了したステップを返す
    pub fn completed(self, now: DateTime<Utc>) -> Result<Self, DomainError> {
        match self.state {
            StepState::InProgress { started_at } => Ok(Self {
                state: StepState::Completed {
                    started_at,
                    completed_at: now,
                },
                ..self
            }),
            _ => Err(DomainError::InvalidState(format!(
                "実行中のステップのみ完了できます（{}: {}）",
                self.step_id,
                self.status()
            ))),
        }
    }

    /// 失敗したステップを返す
    pub fn failed(self, error_message: impl Into<String>) -> Result<Self, DomainError> {
        match self.state {
            StepState::InProgress { started_at } => Ok(Self {
                state: StepState::Failed {
                    started_at,
                    error_message: error_message.into(),
                },
                ..self
            }),
            _ => Err(DomainError::InvalidState(format!(
                "実行中のステップのみ失敗にできます（{}: {}）",
                self.step_id,
                self.status()
            ))),
        }
    }

    /// 未着手に戻したステップを返す（リトライ用）
    pub fn reset(self) -> Self {
        Self::pending(self.step_id)
    }
}

impl From<StepInstance> for StepInstanceRecord {
    fn from(step: StepInstance) -> Self {
        let status = step.status();
        let started_at = step.started_at();
        let (completed_at, error_message) = match step.state {
            StepState::Completed { completed_at, .. } => (Some(completed_at), None),
            StepState::Failed { error_message, .. } => (None, Some(error_message)),
            StepState::Pending | StepState::InProgress { .. } => (None, None),
        };
        Self {
            step_id: step.step_id,
            status,
            started_at,
            completed_at,
            error_message,
        }
    }
}

impl TryFrom<StepInstanceRecord> for StepInstance {
    type Error = DomainError;

    fn try_from(record: StepInstanceRecord) -> Result<Self, Self::Error> {
        let invalid = |detail: &str| {
            DomainError::Validation(format!(
                "ステップ {} ({}) {}",
                record.step_id, record.status, detail
            ))
        };

        let state = match record.status {
            StepStatus::Pending => {
                if record.started_at.is_some()
                    || record.completed_at.is_some()
                    || record.error_message.is_some()
                {
                    return Err(invalid("に日時またはエラーメッセージが設定されています"));
                }
                StepState::Pending
            }
            StepStatus::InProgress => {
                if record.completed_at.is_some() || record.error_message.is_some() {
                    return Err(invalid("に完了日時またはエラーメッセージが設定されています"));
                }
                let started_at = record
                    .started_at
                    .ok_or_else(|| invalid("には started_at が必要です"))?;
                StepState::InProgress { started_at }
            }
            StepStatus::Completed => {
                if record.error_message.is_some() {
                    return Err(invalid("にエラーメッセージが設定されています"));
                }
                let started_at = record
                    .started_at
                    .ok_or_else(|| invalid("には started_at が必要です"))?;
                let completed_at = record
                    .completed_at
                    .ok_or_else(|| invalid("には completed_at が必要です"))?;
                StepState::Completed {
                    started_at,
                    completed_at,
                }
            }
            StepStatus::Failed => {
                if record.completed_at.is_some() {
                    return Err(invalid("に completed_at が設定されています"));
                }
                let started_at = record
                    .started_at
                    .ok_or_else(|| invalid("には started_at が必要です"))?;
                let error_message = record
                    .error_message
                    .clone()
                    .ok_or_else(|| invalid("には error_message が必要です"))?;
                StepState::Failed {
                    started_at,
                    error_message,
                }
            }
        };

        Ok(Self {
            step_id: record.step_id,
            state,
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};
    use serde_json::json;

    use super::*;

    #[fixture]
    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[rstest]
    fn test_開始から完了までの遷移(now: DateTime<Utc>) {
        let later = now + chrono::Duration::seconds(5);

        let sut = StepInstance::pending(ConversionStepId::ValidateLead)
            .started(now)
            .unwrap()
            .completed(later)
            .unwrap();

        assert_eq!(sut.status(), StepStatus::Completed);
        assert_eq!(sut.started_at(), Some(now));
        assert_eq!(sut.completed_at(), Some(later));
        assert_eq!(sut.error_message(), None);
    }

    #[rstest]
    fn test_失敗したステップはエラーメッセージのみ持つ(now: DateTime<Utc>) {
        let sut = StepInstance::pending(ConversionStepId::AssignTerritory)
            .started(now)
            .unwrap()
            .failed("No territory found")
            .unwrap();

        assert_eq!(sut.status(), StepStatus::Failed);
        assert_eq!(sut.error_message(), Some("No territory found"));
        assert_eq!(sut.completed_at(), None);
    }

    #[rstest]
    fn test_未着手のステップは完了できない(now: DateTime<Utc>) {
        let result = StepInstance::pending(ConversionStepId::ValidateLead).completed(now);

        assert!(matches!(result, Err(DomainError::InvalidState(_))));
    }

    #[rstest]
    fn test_完了済みのステップは再開始できない(now: DateTime<Utc>) {
        let step = StepInstance::pending(ConversionStepId::ValidateLead)
            .started(now)
            .unwrap()
            .completed(now)
            .unwrap();

        assert!(step.started(now).is_err());
    }

    #[rstest]
    fn test_resetで未着手に戻る(now: DateTime<Utc>) {
        let sut = StepInstance::pending(ConversionStepId::NotifyTeam)
            .started(now)
            .unwrap()
            .failed("smtp down")
            .unwrap()
            .reset();

        assert_eq!(sut, StepInstance::pending(ConversionStepId::NotifyTeam));
    }

    #[rstest]
    fn test_jsonのフラット表現(now: DateTime<Utc>) {
        let step = StepInstance::pending(ConversionStepId::CreateCustomer)
            .started(now)
            .unwrap()
            .failed("insert failed")
            .unwrap();

        let value = serde_json::to_value(&step).unwrap();

        assert_eq!(
            value,
            json!({
                "step_id": "create-customer",
                "status": "failed",
                "started_at": "2023-11-14T22:13:20Z",
                "error_message": "insert failed",
            })
        );
        let restored: StepInstance = serde_json::from_value(value).unwrap();
        assert_eq!(restored, step);
    }

    #[test]
    fn test_完了日時とエラーメッセージの両方を持つjsonは復元できない() {
        let value = json!({
            "step_id": "create-customer",
            "status": "completed",
            "started_at": "2023-11-14T22:13:20Z",
            "completed_at": "2023-11-14T22:13:25Z",
            "error_message": "boom",
        });

        assert!(serde_json::from_value::<StepInstance>(value).is_err());
    }

    #[test]
    fn test_日時を持つpendingは復元できない() {
        let record = StepInstanceRecord {
            step_id:       ConversionStepId::ValidateLead,
            status:        StepStatus::Pending,
            started_at:    None,
            completed_at:  None,
            error_message: Some("stale".to_string()),
        };

        assert!(StepInstance::try_from(record).is_err());
    }
}
