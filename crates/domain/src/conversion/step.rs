//! # ステップカタログ
//!
//! コンバージョンパイプラインを構成するステップの固定された順序付きカタログ。
//!
//! 順序は `validate-lead → check-duplicates → assign-territory →
//! create-customer → setup-onboarding → notify-team` で固定。
//! 先頭 4 ステップが必須、末尾 2 ステップは任意だが常に実行され、
//! `current_step_index` にも計上される。

use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;

/// ステップ識別子
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
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ConversionStepId {
    /// リードの入力内容を検証する
    ValidateLead,
    /// 既存顧客との重複を検査する
    CheckDuplicates,
    /// テリトリーと担当者を照合する
    AssignTerritory,
    /// 顧客レコードを作成する
    CreateCustomer,
    /// オンボーディングを開始する
    SetupOnboarding,
    /// 営業チームへ通知する
    NotifyTeam,
}

impl ConversionStepId {
    /// カタログ上の位置（0 始まり）
    pub fn index(&self) -> usize {
        match self {
            Self::ValidateLead => 0,
            Self::CheckDuplicates => 1,
            Self::AssignTerritory => 2,
            Self::CreateCustomer => 3,
            Self::SetupOnboarding => 4,
            Self::NotifyTeam => 5,
        }
    }

    /// カタログ上の定義
    pub fn definition(&self) -> &'static ConversionStepDefinition {
        &CONVERSION_STEPS[self.index()]
    }
}

/// ステップ定義（テンプレート）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConversionStepDefinition {
    pub id: ConversionStepId,
    pub title: &'static str,
    pub description: &'static str,
    /// 失敗時にパイプラインを止める必須ステップか
    pub required: bool,
    /// 計画上の所要時間。ステップタイムアウトの既定値に使う
    pub estimated_duration_minutes: u32,
}

/// コンバージョンステップのカタログ
pub const CONVERSION_STEPS: [ConversionStepDefinition; 6] = [
    ConversionStepDefinition {
        id: ConversionStepId::ValidateLead,
        title: "Validate Lead Data",
        description: "Verify that the lead has complete contact details and a convertible status",
        required: true,
        estimated_duration_minutes: 2,
    },
    ConversionStepDefinition {
        id: ConversionStepId::CheckDuplicates,
        title: "Check for Duplicates",
        description: "Search existing customers for a matching lead, email or company name",
        required: true,
        estimated_duration_minutes: 3,
    },
    ConversionStepDefinition {
        id: ConversionStepId::AssignTerritory,
        title: "Assign Territory",
        description: "Match the lead's region to a territory managed by the assigned sales rep",
        required: true,
        estimated_duration_minutes: 1,
    },
    ConversionStepDefinition {
        id: ConversionStepId::CreateCustomer,
        title: "Create Customer Record",
        description: "Create the customer account from the lead's company and contact data",
        required: true,
        estimated_duration_minutes: 5,
    },
    ConversionStepDefinition {
        id: ConversionStepId::SetupOnboarding,
        title: "Setup Onboarding",
        description: "Open the onboarding workflow for the new customer",
        required: false,
        estimated_duration_minutes: 10,
    },
    ConversionStepDefinition {
        id: ConversionStepId::NotifyTeam,
        title: "Notify Sales Team",
        description: "Send a lead converted notification to the sales team",
        required: false,
        estimated_duration_minutes: 1,
    },
];

/// ステップ総数（全レコードで共通）
pub const TOTAL_STEPS: usize = CONVERSION_STEPS.len();

/// インデックスでステップ定義を取得する
pub fn step_at(index: usize) -> Option<&'static ConversionStepDefinition> {
    CONVERSION_STEPS.get(index)
}
