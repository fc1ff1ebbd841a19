//! # テンプレートレンダラー
//!
//! tera テンプレートエンジンで通知メールを HTML/plaintext 両形式で生成する。
//!
//! - テンプレートは `include_str!` でバイナリに埋め込む
//! - 件名パターン: `[LeadConv] Lead converted: {company_name} ({lead_id})`
//! - コンバージョン詳細リンク: `{base_url}/conversions/{conversion_id}`

use leadconv_domain::notification::{EmailMessage, LeadConvertedNotification, NotificationError};
use tera::{Context, Tera};

const TEMPLATE_NAME: &str = "lead_converted";

/// テンプレートレンダラー
pub struct TemplateRenderer {
    engine: Tera,
}

impl TemplateRenderer {
    /// 埋め込みテンプレートを登録したレンダラーを作成する
    pub fn new() -> Result<Self, NotificationError> {
        let mut engine = Tera::default();

        engine
            .add_raw_templates(vec![
                (
                    "lead_converted.html",
                    include_str!("../../../templates/notifications/lead_converted.html"),
                ),
                (
                    "lead_converted.txt",
                    include_str!("../../../templates/notifications/lead_converted.txt"),
                ),
            ])
            .map_err(|e| NotificationError::TemplateFailed(e.to_string()))?;

        Ok(Self { engine })
    }

    /// 通知イベントからメールメッセージを生成する
    ///
    /// - `base_url`: アプリケーションのベース URL（例: `http://localhost:5173`）
    pub fn render(
        &self,
        notification: &LeadConvertedNotification,
        base_url: &str,
    ) -> Result<EmailMessage, NotificationError> {
        let conversion_url = format!(
            "{}/conversions/{}",
            base_url.trim_end_matches('/'),
            notification.conversion_id
        );

        let mut context = Context::new();
        context.insert("lead_id", &notification.lead_id);
        context.insert("customer_id", notification.customer_id.as_str());
        context.insert("company_name", &notification.company_name);
        context.insert("contact_name", &notification.contact_name);
        context.insert("account_manager", &notification.account_manager);
        context.insert("conversion_url", &conversion_url);

        let html_body = self
            .engine
            .render(&format!("{TEMPLATE_NAME}.html"), &context)
            .map_err(|e| NotificationError::TemplateFailed(e.to_string()))?;

        let text_body = self
            .engine
            .render(&format!("{TEMPLATE_NAME}.txt"), &context)
            .map_err(|e| NotificationError::TemplateFailed(e.to_string()))?;

        Ok(EmailMessage {
            to: notification.recipient_email.clone(),
            subject: format!(
                "[LeadConv] Lead converted: {} ({})",
                notification.company_name, notification.lead_id
            ),
            html_body,
            text_body,
        })
    }
}
