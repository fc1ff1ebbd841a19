//! # テリトリーディレクトリ
//!
//! 地域コードからテリトリーを引く外部ディレクトリの抽象化。
//! `assign-territory` ステップが使用する。

use async_trait::async_trait;
use leadconv_domain::{
    territory::{Territory, TerritoryId},
    value_objects::TerritoryManagerId,
};

use crate::error::InfraError;

/// テリトリーディレクトリトレイト
#[async_trait]
pub trait TerritoryDirectory: Send + Sync {
    /// 地域コードを担当するテリトリーを取得する
    async fn find_by_region(&self, region: &str) -> Result<Option<Territory>, InfraError>;

    async fn find_all(&self) -> Result<Vec<Territory>, InfraError>;
}

/// 固定データを保持するテリトリーディレクトリ
pub struct InMemoryTerritoryDirectory {
    territories: Vec<Territory>,
}

impl InMemoryTerritoryDirectory {
    pub fn new(territories: Vec<Territory>) -> Self {
        Self { territories }
    }

    /// 既定のテリトリー構成で作成する
    pub fn seeded() -> Result<Self, InfraError> {
        fn territory(
            id: &str,
            name: &str,
            regions: &[&str],
            managers: &[&str],
        ) -> Result<Territory, InfraError> {
            let managers = managers
                .iter()
                .map(|m| TerritoryManagerId::new(*m))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Territory::new(
                TerritoryId::new(id)?,
                name,
                regions.iter().map(|r| (*r).to_string()).collect(),
                managers,
            ))
        }

        Ok(Self::new(vec![
            territory(
                "south",
                "South Central",
                &["TX", "OK", "LA", "AR"],
                &["tm-001", "tm-002"],
            )?,
            territory("west", "West Coast", &["CA", "NV", "AZ", "OR", "WA"], &["tm-003"])?,
            territory("northeast", "Northeast", &["NY", "NJ", "PA", "MA"], &["tm-004"])?,
            territory("midwest", "Midwest", &["IL", "OH", "MI", "IN"], &["tm-005"])?,
        ]))
    }
}

#[async_trait]
impl TerritoryDirectory for InMemoryTerritoryDirectory {
    async fn find_by_region(&self, region: &str) -> Result<Option<Territory>, InfraError> {
        Ok(self.territories.iter().find(|t| t.covers(region)).cloned())
    }

    async fn find_all(&self) -> Result<Vec<Territory>, InfraError> {
        Ok(self.territories.clone())
    }
}
