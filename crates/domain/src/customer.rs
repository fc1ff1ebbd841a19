//! # 顧客
//!
//! コンバージョンの `create-customer` ステップで作成される顧客レコード。
//!
//! 顧客 ID はリード ID から決定的に導出する（`customer-{leadId}`）。
//! リード 1 件につきコンバージョンレコードは 1 件のみのため、ID の一意性はそこから従う。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    lead::{Lead, LeadId},
    territory::TerritoryId,
    value_objects::TerritoryManagerId,
};

/// 顧客 ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display)]
#[serde(transparent)]
#[display("{_0}")]
pub struct CustomerId(String);

impl CustomerId {
    const PREFIX: &'static str = "customer-";

    /// リード ID から顧客 ID を導出する
    pub fn for_lead(lead_id: &LeadId) -> Self {
        Self(format!("{}{}", Self::PREFIX, lead_id))
    }

    /// 永続化済みの値から復元する
    pub fn from_string(value: String) -> Self {
        Self(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// 顧客エンティティ
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    id: CustomerId,
    lead_id: LeadId,
    company_name: String,
    contact_name: String,
    email: String,
    territory_id: TerritoryId,
    account_manager: TerritoryManagerId,
    created_at: DateTime<Utc>,
}

/// 顧客の DB 復元パラメータ
pub struct CustomerRecord {
    pub id: CustomerId,
    pub lead_id: LeadId,
    pub company_name: String,
    pub contact_name: String,
    pub email: String,
    pub territory_id: TerritoryId,
    pub account_manager: TerritoryManagerId,
    pub created_at: DateTime<Utc>,
}

impl Customer {
    /// リードから顧客を作成する
    ///
    /// 担当営業はリードの `assigned_to` を引き継ぐ。
    pub fn from_lead(lead: &Lead, territory_id: TerritoryId, now: DateTime<Utc>) -> Self {
        Self {
            id: CustomerId::for_lead(lead.id()),
            lead_id: lead.id().clone(),
            company_name: lead.company_name().trim().to_string(),
            contact_name: lead.contact_name().trim().to_string(),
            email: lead.email().trim().to_string(),
            territory_id,
            account_manager: lead.assigned_to().clone(),
            created_at: now,
        }
    }

    pub fn from_db(record: CustomerRecord) -> Self {
        Self {
            id: record.id,
            lead_id: record.lead_id,
            company_name: record.company_name,
            contact_name: record.contact_name,
            email: record.email,
            territory_id: record.territory_id,
            account_manager: record.account_manager,
            created_at: record.created_at,
        }
    }

    pub fn id(&self) -> &CustomerId {
        &self.id
    }

    pub fn lead_id(&self) -> &LeadId {
        &self.lead_id
    }

    pub fn company_name(&self) -> &str {
        &self.company_name
    }

    pub fn contact_name(&self) -> &str {
        &self.contact_name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn territory_id(&self) -> &TerritoryId {
        &self.territory_id
    }

    pub fn account_manager(&self) -> &TerritoryManagerId {
        &self.account_manager
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// 重複判定
    ///
    /// リード ID、メールアドレス（大文字小文字を無視）、会社名（同）のいずれかが一致すれば重複とみなす。
    pub fn duplicates(&self, lead: &Lead) -> bool {
        self.lead_id == *lead.id()
            || self.email.eq_ignore_ascii_case(lead.email().trim())
            || self
                .company_name
                .eq_ignore_ascii_case(lead.company_name().trim())
    }
}
