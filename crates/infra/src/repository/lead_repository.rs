//! # LeadRepository
//!
//! コンバージョンの入力となるリードの保管庫。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use leadconv_domain::{
    lead::{Lead, LeadId, LeadStatus, NewLead},
    value_objects::TerritoryManagerId,
};
use sqlx::PgPool;
use tokio::sync::RwLock;

use crate::{db::is_unique_violation, error::InfraError};

/// リードリポジトリトレイト
#[async_trait]
pub trait LeadRepository: Send + Sync {
    /// リードを登録する
    ///
    /// 同じ ID のリードが存在する場合は `Duplicate` を返す。
    async fn insert(&self, lead: &Lead) -> Result<(), InfraError>;

    async fn find_by_id(&self, id: &LeadId) -> Result<Option<Lead>, InfraError>;

    /// 全リードを登録順に取得する
    async fn find_all(&self) -> Result<Vec<Lead>, InfraError>;
}

/// インメモリのリードリポジトリ
#[derive(Default)]
pub struct InMemoryLeadRepository {
    leads: RwLock<Vec<Lead>>,
}

impl InMemoryLeadRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 初期データ付きで作成する
    pub fn with_leads(leads: Vec<Lead>) -> Self {
        Self {
            leads: RwLock::new(leads),
        }
    }
}

#[async_trait]
impl LeadRepository for InMemoryLeadRepository {
    async fn insert(&self, lead: &Lead) -> Result<(), InfraError> {
        let mut leads = self.leads.write().await;
        if leads.iter().any(|l| l.id() == lead.id()) {
            return Err(InfraError::duplicate("Lead", lead.id().as_str()));
        }
        leads.push(lead.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &LeadId) -> Result<Option<Lead>, InfraError> {
        Ok(self.leads.read().await.iter().find(|l| l.id() == id).cloned())
    }

    async fn find_all(&self) -> Result<Vec<Lead>, InfraError> {
        Ok(self.leads.read().await.clone())
    }
}

/// PostgreSQL 実装の LeadRepository
#[derive(Debug, Clone)]
pub struct PostgresLeadRepository {
    pool: PgPool,
}

impl PostgresLeadRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct LeadRow {
    id: String,
    company_name: String,
    contact_name: String,
    email: String,
    phone: Option<String>,
    region: String,
    status: String,
    assigned_to: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<LeadRow> for Lead {
    type Error = InfraError;

    fn try_from(row: LeadRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<LeadStatus>()
            .map_err(|e| InfraError::unexpected(format!("不正なリードステータス {}: {e}", row.status)))?;
        Ok(Lead::new(NewLead {
            id: LeadId::new(row.id)?,
            company_name: row.company_name,
            contact_name: row.contact_name,
            email: row.email,
            phone: row.phone,
            region: row.region,
            status,
            assigned_to: TerritoryManagerId::new(row.assigned_to)?,
            created_at: row.created_at,
        }))
    }
}

#[async_trait]
impl LeadRepository for PostgresLeadRepository {
    #[tracing::instrument(skip_all, level = "debug", fields(id = %lead.id()))]
    async fn insert(&self, lead: &Lead) -> Result<(), InfraError> {
        let status: &str = lead.status().into();
        let result = sqlx::query(
            r#"
            INSERT INTO leads (
                id, company_name, contact_name, email, phone,
                region, status, assigned_to, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(lead.id().as_str())
        .bind(lead.company_name())
        .bind(lead.contact_name())
        .bind(lead.email())
        .bind(lead.phone())
        .bind(lead.region())
        .bind(status)
        .bind(lead.assigned_to().as_str())
        .bind(lead.created_at())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(InfraError::duplicate("Lead", lead.id().as_str())),
            Err(e) => Err(e.into()),
        }
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%id))]
    async fn find_by_id(&self, id: &LeadId) -> Result<Option<Lead>, InfraError> {
        let row = sqlx::query_as::<_, LeadRow>(
            r#"
            SELECT id, company_name, contact_name, email, phone,
                   region, status, assigned_to, created_at
            FROM leads
            WHERE id = $1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Lead::try_from).transpose()
    }

    #[tracing::instrument(skip_all, level = "debug")]
    async fn find_all(&self) -> Result<Vec<Lead>, InfraError> {
        let rows = sqlx::query_as::<_, LeadRow>(
            r#"
            SELECT id, company_name, contact_name, email, phone,
                   region, status, assigned_to, created_at
            FROM leads
            ORDER BY seq
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Lead::try_from).collect()
    }
}
