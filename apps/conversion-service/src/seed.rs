//! # デモデータ
//!
//! `STORAGE_BACKEND=memory` で起動したときに投入するリード。
//! 成功するリードのほか、各ステップで失敗するリードを含む。

use chrono::{DateTime, Utc};
use leadconv_domain::{
    DomainError,
    lead::{Lead, LeadId, LeadStatus, NewLead},
    value_objects::TerritoryManagerId,
};

/// デモ用のリード一覧
pub fn demo_leads(now: DateTime<Utc>) -> Result<Vec<Lead>, DomainError> {
    let lead = |id: &str,
                company: &str,
                contact: &str,
                email: &str,
                region: &str,
                status: LeadStatus,
                assigned_to: &str|
     -> Result<Lead, DomainError> {
        Ok(Lead::new(NewLead {
            id: LeadId::new(id)?,
            company_name: company.to_string(),
            contact_name: contact.to_string(),
            email: email.to_string(),
            phone: None,
            region: region.to_string(),
            status,
            assigned_to: TerritoryManagerId::new(assigned_to)?,
            created_at: now,
        }))
    };

    Ok(vec![
        lead(
            "L1",
            "Arctic Air Mechanical",
            "Dana Whitfield",
            "dana@arcticair.example.com",
            "TX",
            LeadStatus::Qualified,
            "tm-001",
        )?,
        lead(
            "L2",
            "Pacific Climate Systems",
            "Marco Ruiz",
            "marco@pacificclimate.example.com",
            "CA",
            LeadStatus::Proposal,
            "tm-003",
        )?,
        lead(
            "L3",
            "Great Lakes Heating",
            "Priya Natarajan",
            "priya@greatlakesheat.example.com",
            "OH",
            LeadStatus::Won,
            "tm-005",
        )?,
        // テリトリーのない地域
        lead(
            "L4",
            "Yukon Ventilation",
            "Sam Okafor",
            "sam@yukonvent.example.com",
            "AK",
            LeadStatus::Discovery,
            "tm-001",
        )?,
        // メールアドレス不正
        lead(
            "L5",
            "Harbor HVAC Supply",
            "Lee Chen",
            "lee.harborhvac.example.com",
            "NY",
            LeadStatus::Qualified,
            "tm-004",
        )?,
        // コンバージョン対象外のステータス
        lead(
            "L6",
            "Desert Cooling Co",
            "Ana Flores",
            "ana@desertcooling.example.com",
            "AZ",
            LeadStatus::New,
            "tm-003",
        )?,
    ])
}
