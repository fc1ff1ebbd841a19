//! # 通知
//!
//! コンバージョン完了時に営業チームへ送るメール通知のドメインモデル。
//!
//! 通知イベントとメール本文の生成は分離する。
//! [`LeadConvertedNotification`] からメールを組み立てるのは
//! conversion-service の TemplateRenderer の責務。

use thiserror::Error;

use crate::{conversion::ConversionId, customer::CustomerId, lead::Lead};

/// 通知送信エラー
#[derive(Debug, Error)]
pub enum NotificationError {
    /// メール送信に失敗
    #[error("Failed to send email: {0}")]
    SendFailed(String),

    /// テンプレートレンダリングに失敗
    #[error("Failed to render email template: {0}")]
    TemplateFailed(String),
}

/// メールメッセージ
///
/// テンプレートレンダリングの出力。NotificationSender に渡される。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    /// 送信先メールアドレス
    pub to:        String,
    /// 件名
    pub subject:   String,
    /// HTML 本文
    pub html_body: String,
    /// プレーンテキスト本文
    pub text_body: String,
}

/// リード顧客化の通知イベント
///
/// `notify-team` ステップで営業チームのアドレスへ送信される。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeadConvertedNotification {
    pub conversion_id:   ConversionId,
    pub customer_id:     CustomerId,
    pub lead_id:         String,
    pub company_name:    String,
    pub contact_name:    String,
    pub account_manager: String,
    pub recipient_email: String,
}

impl LeadConvertedNotification {
    pub fn new(
        conversion_id: ConversionId,
        lead: &Lead,
        recipient_email: impl Into<String>,
    ) -> Self {
        Self {
            conversion_id,
            customer_id: CustomerId::for_lead(lead.id()),
            lead_id: lead.id().to_string(),
            company_name: lead.company_name().trim().to_string(),
            contact_name: lead.contact_name().trim().to_string(),
            account_manager: lead.assigned_to().to_string(),
            recipient_email: recipient_email.into(),
        }
    }
}
