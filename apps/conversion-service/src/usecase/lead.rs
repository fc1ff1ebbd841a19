//! # リードユースケース
//!
//! コンバージョンの入力となるリードの登録と一覧。

use std::sync::Arc;

use leadconv_domain::{
    clock::Clock,
    lead::{Lead, LeadId, LeadStatus, NewLead},
    value_objects::TerritoryManagerId,
};
use leadconv_infra::repository::LeadRepository;
use leadconv_shared::{event_log::event, log_business_event};

use crate::error::CoreError;

/// リード登録の入力
#[derive(Debug, Clone)]
pub struct RegisterLeadInput {
    pub id:           LeadId,
    pub company_name: String,
    pub contact_name: String,
    pub email:        String,
    pub phone:        Option<String>,
    pub region:       String,
    pub status:       LeadStatus,
    pub assigned_to:  TerritoryManagerId,
}

pub struct LeadUseCaseImpl {
    leads: Arc<dyn LeadRepository>,
    clock: Arc<dyn Clock>,
}

impl LeadUseCaseImpl {
    pub fn new(leads: Arc<dyn LeadRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { leads, clock }
    }

    /// リードを登録する
    ///
    /// 入力内容の妥当性はコンバージョンの `validate-lead` ステップで検証するため、
    /// ここでは ID の重複だけを確認する。
    pub async fn register(&self, input: RegisterLeadInput) -> Result<Lead, CoreError> {
        let lead = Lead::new(NewLead {
            id:           input.id,
            company_name: input.company_name,
            contact_name: input.contact_name,
            email:        input.email,
            phone:        input.phone,
            region:       input.region,
            status:       input.status,
            assigned_to:  input.assigned_to,
            created_at:   self.clock.now(),
        });
        self.leads.insert(&lead).await?;

        log_business_event!(
            event.category = event::category::LEAD,
            event.action = event::action::LEAD_REGISTERED,
            event.entity_type = event::entity_type::LEAD,
            event.entity_id = %lead.id(),
            event.result = event::result::SUCCESS,
            "リードを登録"
        );
        Ok(lead)
    }

    /// リード一覧を登録順に取得する
    ///
    /// `eligible_only` の場合はコンバージョン対象のステータスのリードだけを返す。
    pub async fn list(&self, eligible_only: bool) -> Result<Vec<Lead>, CoreError> {
        let leads = self.leads.find_all().await?;
        Ok(if eligible_only {
            leads
                .into_iter()
                .filter(Lead::is_eligible_for_conversion)
                .collect()
        } else {
            leads
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;
    use leadconv_domain::clock::FixedClock;
    use leadconv_infra::repository::InMemoryLeadRepository;
    use pretty_assertions::assert_eq;

    use super::*;

    fn input(id: &str, status: LeadStatus) -> RegisterLeadInput {
        RegisterLeadInput {
            id: LeadId::new(id).unwrap(),
            company_name: "Arctic Air Mechanical".to_string(),
            contact_name: "Dana Whitfield".to_string(),
            email: "dana@arcticair.example.com".to_string(),
            phone: None,
            region: "TX".to_string(),
            status,
            assigned_to: TerritoryManagerId::new("tm-001").unwrap(),
        }
    }

    fn sut() -> LeadUseCaseImpl {
        LeadUseCaseImpl::new(
            Arc::new(InMemoryLeadRepository::new()),
            Arc::new(FixedClock::new(
                DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            )),
        )
    }

    #[tokio::test]
    async fn test_対象ステータスのリードだけに絞り込める() {
        let sut = sut();
        sut.register(input("L1", LeadStatus::Qualified)).await.unwrap();
        sut.register(input("L2", LeadStatus::New)).await.unwrap();
        sut.register(input("L3", LeadStatus::Won)).await.unwrap();

        let eligible = sut.list(true).await.unwrap();
        let all = sut.list(false).await.unwrap();

        assert_eq!(
            eligible.iter().map(|l| l.id().as_str()).collect::<Vec<_>>(),
            vec!["L1", "L3"]
        );
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_同じidのリードは競合になる() {
        let sut = sut();
        sut.register(input("L1", LeadStatus::Qualified)).await.unwrap();

        let result = sut.register(input("L1", LeadStatus::Won)).await;

        assert!(matches!(result, Err(CoreError::Conflict(_))));
    }
}
