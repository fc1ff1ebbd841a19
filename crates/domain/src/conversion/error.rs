//! # ステップ実行エラー
//!
//! ステップハンドラが返す失敗の分類。
//! 表示文字列はそのままレコードの `validation_errors` とステップの
//! エラーメッセージに記録されるため、メッセージ本文のみを返す。

use strum::IntoStaticStr;
use thiserror::Error;

use super::step::ConversionStepId;

/// ステップ実行時のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ConversionStepError {
    /// リードの入力値不備（validate-lead）
    #[error("{0}")]
    Validation(String),

    /// 既存顧客との重複（check-duplicates）
    #[error("{0}")]
    Duplicate(String),

    /// テリトリー割り当ての失敗（assign-territory）
    #[error("{0}")]
    Assignment(String),

    /// 顧客レコード作成の失敗（create-customer）
    #[error("{0}")]
    Provisioning(String),

    /// オンボーディング開始の失敗（setup-onboarding）
    #[error("{0}")]
    Onboarding(String),

    /// 通知送信の失敗（notify-team）
    #[error("{0}")]
    Notification(String),

    /// ステップが制限時間内に終わらなかった
    #[error("Step {step_id} timed out after {seconds}s")]
    Timeout {
        step_id: ConversionStepId,
        seconds: u64,
    },
}

impl ConversionStepError {
    /// ログ出力用のエラー種別
    pub fn kind(&self) -> &'static str {
        self.into()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_表示文字列はメッセージ本文のみ() {
        let err = ConversionStepError::Assignment("No territory found".to_string());

        assert_eq!(err.to_string(), "No territory found");
        assert_eq!(err.kind(), "assignment");
    }

    #[test]
    fn test_タイムアウトの表示文字列() {
        let err = ConversionStepError::Timeout {
            step_id: ConversionStepId::SetupOnboarding,
            seconds: 600,
        };

        assert_eq!(err.to_string(), "Step setup-onboarding timed out after 600s");
        assert_eq!(err.kind(), "timeout");
    }
}
