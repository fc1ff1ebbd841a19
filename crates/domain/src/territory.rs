//! # テリトリー
//!
//! 地域コードの集合と、その地域を担当するテリトリーマネージャーの集合。
//! `assign-territory` ステップでリードの地域と担当者を照合するために使う。

use serde::{Deserialize, Serialize};

use crate::value_objects::TerritoryManagerId;

define_validated_string! {
    /// テリトリー ID
    pub struct TerritoryId {
        label: "テリトリー ID",
        max_length: 64,
    }
}

/// テリトリーエンティティ
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Territory {
    id: TerritoryId,
    name: String,
    regions: Vec<String>,
    managers: Vec<TerritoryManagerId>,
}

impl Territory {
    pub fn new(
        id: TerritoryId,
        name: impl Into<String>,
        regions: Vec<String>,
        managers: Vec<TerritoryManagerId>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            regions,
            managers,
        }
    }

    pub fn id(&self) -> &TerritoryId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn regions(&self) -> &[String] {
        &self.regions
    }

    pub fn managers(&self) -> &[TerritoryManagerId] {
        &self.managers
    }

    /// 地域コードを担当しているか（大文字小文字は区別しない）
    pub fn covers(&self, region: &str) -> bool {
        let region = region.trim();
        self.regions.iter().any(|r| r.eq_ignore_ascii_case(region))
    }

    pub fn is_managed_by(&self, manager: &TerritoryManagerId) -> bool {
        self.managers.contains(manager)
    }
}
