//! # 通知サービス
//!
//! テンプレートレンダリング → メール送信 → ログ記録を統合するサービス。
//!
//! 送信失敗は `notify-team` ステップの失敗として扱うため、
//! エラーは呼び出し側に返す。

use std::sync::Arc;

use leadconv_domain::notification::{LeadConvertedNotification, NotificationError};
use leadconv_infra::NotificationSender;
use leadconv_shared::{event_log::event, log_business_event};

use super::TemplateRenderer;

/// 通知サービス
pub struct NotificationService {
    sender: Arc<dyn NotificationSender>,
    template_renderer: TemplateRenderer,
    base_url: String,
    team_address: String,
}

impl NotificationService {
    pub fn new(
        sender: Arc<dyn NotificationSender>,
        template_renderer: TemplateRenderer,
        base_url: String,
        team_address: String,
    ) -> Self {
        Self {
            sender,
            template_renderer,
            base_url,
            team_address,
        }
    }

    /// 営業チームの送信先アドレス
    pub fn team_address(&self) -> &str {
        &self.team_address
    }

    /// リード顧客化の通知を送信する
    pub async fn notify(
        &self,
        notification: &LeadConvertedNotification,
    ) -> Result<(), NotificationError> {
        let email = self
            .template_renderer
            .render(notification, &self.base_url)?;

        match self.sender.send_email(&email).await {
            Ok(()) => {
                log_business_event!(
                    event.category = event::category::NOTIFICATION,
                    event.action = event::action::NOTIFICATION_SENT,
                    event.entity_type = event::entity_type::CUSTOMER,
                    event.entity_id = %notification.customer_id,
                    event.result = event::result::SUCCESS,
                    conversion.id = %notification.conversion_id,
                    "リード顧客化の通知を送信"
                );
                Ok(())
            }
            Err(e) => {
                log_business_event!(
                    event.category = event::category::NOTIFICATION,
                    event.action = event::action::NOTIFICATION_FAILED,
                    event.entity_type = event::entity_type::CUSTOMER,
                    event.entity_id = %notification.customer_id,
                    event.result = event::result::FAILURE,
                    conversion.id = %notification.conversion_id,
                    error = %e,
                    "リード顧客化の通知送信に失敗"
                );
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::DateTime;
    use leadconv_domain::{
        conversion::ConversionId,
        lead::{Lead, LeadId, LeadStatus, NewLead},
        notification::EmailMessage,
        value_objects::TerritoryManagerId,
    };
    use pretty_assertions::assert_eq;
    use tokio::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<EmailMessage>>,
        fail: bool,
    }

    #[async_trait]
    impl NotificationSender for RecordingSender {
        async fn send_email(&self, email: &EmailMessage) -> Result<(), NotificationError> {
            if self.fail {
                return Err(NotificationError::SendFailed("relay refused".to_string()));
            }
            self.sent.lock().await.push(email.clone());
            Ok(())
        }
    }

    fn notification() -> LeadConvertedNotification {
        let lead = Lead::new(NewLead {
            id: LeadId::new("L1").unwrap(),
            company_name: "Arctic Air Mechanical".to_string(),
            contact_name: "Dana Whitfield".to_string(),
            email: "dana@arcticair.example.com".to_string(),
            phone: None,
            region: "TX".to_string(),
            status: LeadStatus::Won,
            assigned_to: TerritoryManagerId::new("tm-001").unwrap(),
            created_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        });
        LeadConvertedNotification::new(ConversionId::new(), &lead, "sales-team@example.com")
    }

    fn service(sender: Arc<RecordingSender>) -> NotificationService {
        NotificationService::new(
            sender,
            TemplateRenderer::new().unwrap(),
            "http://localhost:5173".to_string(),
            "sales-team@example.com".to_string(),
        )
    }

    #[tokio::test]
    async fn test_レンダリングしたメールを送信する() {
        let sender = Arc::new(RecordingSender::default());
        let sut = service(sender.clone());

        sut.notify(&notification()).await.unwrap();

        let sent = sender.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "sales-team@example.com");
    }

    #[tokio::test]
    async fn test_送信失敗はエラーとして返す() {
        let sender = Arc::new(RecordingSender {
            fail: true,
            ..Default::default()
        });
        let sut = service(sender);

        let result = sut.notify(&notification()).await;

        assert!(matches!(result, Err(NotificationError::SendFailed(_))));
    }
}
