//! # リード
//!
//! コンバージョンの入力となる見込み顧客を表す。
//!
//! リードの入力値検証はコンバージョンの `validate-lead` ステップまで遅延させる。
//! そのため [`Lead`] は識別子と担当者以外の項目を生の文字列として保持し、
//! [`Lead::conversion_issues`] で変換可否を判定する。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;

use crate::{DomainError, value_objects::TerritoryManagerId};

define_validated_string! {
    /// リード ID
    ///
    /// 上流のリード管理システムが採番した識別子（例: `L1`）。
    pub struct LeadId {
        label: "リード ID",
        max_length: 64,
    }
}

/// リードの営業パイプライン上のステータス
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
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LeadStatus {
    /// 新規
    New,
    /// 見込みあり
    Qualified,
    /// ヒアリング中
    Discovery,
    /// 提案中
    Proposal,
    /// 受注
    Won,
    /// 失注
    Lost,
}

impl LeadStatus {
    /// コンバージョン対象となるステータスか
    ///
    /// qualified / discovery / proposal / won が対象。
    pub fn is_convertible(&self) -> bool {
        matches!(
            self,
            Self::Qualified | Self::Discovery | Self::Proposal | Self::Won
        )
    }
}

/// リードエンティティ
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lead {
    id: LeadId,
    company_name: String,
    contact_name: String,
    email: String,
    phone: Option<String>,
    region: String,
    status: LeadStatus,
    assigned_to: TerritoryManagerId,
    created_at: DateTime<Utc>,
}

/// リードの作成・復元パラメータ
#[derive(Debug, Clone)]
pub struct NewLead {
    pub id: LeadId,
    pub company_name: String,
    pub contact_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub region: String,
    pub status: LeadStatus,
    pub assigned_to: TerritoryManagerId,
    pub created_at: DateTime<Utc>,
}

impl Lead {
    pub fn new(params: NewLead) -> Self {
        Self {
            id: params.id,
            company_name: params.company_name,
            contact_name: params.contact_name,
            email: params.email,
            phone: params.phone,
            region: params.region,
            status: params.status,
            assigned_to: params.assigned_to,
            created_at: params.created_at,
        }
    }

    // Getter メソッド

    pub fn id(&self) -> &LeadId {
        &self.id
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

    pub fn phone(&self) -> Option<&str> {
        self.phone.as_deref()
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn status(&self) -> LeadStatus {
        self.status
    }

    pub fn assigned_to(&self) -> &TerritoryManagerId {
        &self.assigned_to
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    // ビジネスロジックメソッド

    /// コンバージョン対象として選択可能か
    pub fn is_eligible_for_conversion(&self) -> bool {
        self.status.is_convertible()
    }

    /// 顧客化を妨げる問題点を列挙する
    ///
    /// 空であれば `validate-lead` ステップを通過できる。
    pub fn conversion_issues(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if self.company_name.trim().is_empty() {
            issues.push("Company name is required".to_string());
        }
        if self.contact_name.trim().is_empty() {
            issues.push("Contact name is required".to_string());
        }
        if !is_well_formed_email(&self.email) {
            issues.push(format!("Invalid email address: {}", self.email));
        }
        if self.region.trim().is_empty() {
            issues.push("Region is required".to_string());
        }
        if !self.status.is_convertible() {
            issues.push(format!(
                "Lead in status {} is not eligible for conversion",
                self.status
            ));
        }

        issues
    }

    /// 変換可否を検証する
    ///
    /// # Errors
    ///
    /// - `DomainError::Validation`: [`conversion_issues`](Self::conversion_issues) が空でない場合
    pub fn validate_for_conversion(&self) -> Result<(), DomainError> {
        let issues = self.conversion_issues();
        if issues.is_empty() {
            Ok(())
        } else {
            Err(DomainError::Validation(issues.join("; ")))
        }
    }
}

/// `local@domain.tld` の最低限の構造を満たすか
fn is_well_formed_email(value: &str) -> bool {
    let value = value.trim();
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}
