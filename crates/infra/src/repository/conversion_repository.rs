//! # ConversionRepository
//!
//! コンバージョンレコードの永続化を担当するリポジトリ（レジストリ）。
//!
//! - リード 1 件につきレコードは 1 件まで。二重登録は `Duplicate` エラー
//! - 一覧は登録順で返す
//! - 更新は楽観的ロック（`update_with_version_check`）で行う
//!
//! ステップ一覧は JSONB カラムに [`StepInstance`] のフラット表現で保存する。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use leadconv_domain::{
    conversion::{
        ConversionId,
        ConversionRecord,
        ConversionRecordRow,
        ConversionStatus,
        StepInstance,
    },
    customer::CustomerId,
    lead::LeadId,
    value_objects::{TerritoryManagerId, Version},
};
use sqlx::{PgPool, types::Json};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{db::is_unique_violation, error::InfraError};

const ENTITY: &str = "ConversionRecord";

/// コンバージョンリポジトリトレイト
#[async_trait]
pub trait ConversionRepository: Send + Sync {
    /// 新規レコードを登録する
    ///
    /// # 戻り値
    ///
    /// - `Err(Duplicate)`: 同じリードのレコードが既に存在する場合
    async fn insert(&self, record: &ConversionRecord) -> Result<(), InfraError>;

    /// バージョンを検証してレコードを更新する
    ///
    /// `expected_version` は遷移前のバージョン。保存済みのバージョンと
    /// 一致しない場合は `Conflict` を返し、何も更新しない。
    async fn update_with_version_check(
        &self,
        record: &ConversionRecord,
        expected_version: Version,
    ) -> Result<(), InfraError>;

    /// ID でレコードを取得する
    async fn find_by_id(&self, id: &ConversionId) -> Result<Option<ConversionRecord>, InfraError>;

    /// リード ID でレコードを取得する
    async fn find_by_lead_id(
        &self,
        lead_id: &LeadId,
    ) -> Result<Option<ConversionRecord>, InfraError>;

    /// 全レコードを登録順に取得する
    async fn find_all(&self) -> Result<Vec<ConversionRecord>, InfraError>;

    /// 指定ステータスのレコードを登録順に取得する
    async fn find_by_status(
        &self,
        status: ConversionStatus,
    ) -> Result<Vec<ConversionRecord>, InfraError>;
}

// =============================================================================
// インメモリ実装
// =============================================================================

/// インメモリのコンバージョンリポジトリ
///
/// `STORAGE_BACKEND=memory`（既定）で使用する。プロセス終了で内容は失われる。
#[derive(Default)]
pub struct InMemoryConversionRepository {
    state: RwLock<InMemoryState>,
}

#[derive(Default)]
struct InMemoryState {
    /// 登録順
    records: Vec<ConversionRecord>,
    by_lead: HashMap<LeadId, usize>,
}

impl InMemoryConversionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversionRepository for InMemoryConversionRepository {
    async fn insert(&self, record: &ConversionRecord) -> Result<(), InfraError> {
        let mut state = self.state.write().await;
        if state.by_lead.contains_key(record.lead_id()) {
            return Err(InfraError::duplicate(ENTITY, record.lead_id().as_str()));
        }
        let position = state.records.len();
        state.by_lead.insert(record.lead_id().clone(), position);
        state.records.push(record.clone());
        Ok(())
    }

    async fn update_with_version_check(
        &self,
        record: &ConversionRecord,
        expected_version: Version,
    ) -> Result<(), InfraError> {
        let mut state = self.state.write().await;
        let Some(stored) = state.records.iter_mut().find(|r| r.id() == record.id()) else {
            return Err(InfraError::conflict(ENTITY, record.id().to_string()));
        };
        if stored.version() != expected_version {
            return Err(InfraError::conflict(ENTITY, record.id().to_string()));
        }
        *stored = record.clone();
        Ok(())
    }

    async fn find_by_id(&self, id: &ConversionId) -> Result<Option<ConversionRecord>, InfraError> {
        let state = self.state.read().await;
        Ok(state.records.iter().find(|r| r.id() == id).cloned())
    }

    async fn find_by_lead_id(
        &self,
        lead_id: &LeadId,
    ) -> Result<Option<ConversionRecord>, InfraError> {
        let state = self.state.read().await;
        Ok(state
            .by_lead
            .get(lead_id)
            .and_then(|&position| state.records.get(position))
            .cloned())
    }

    async fn find_all(&self) -> Result<Vec<ConversionRecord>, InfraError> {
        Ok(self.state.read().await.records.clone())
    }

    async fn find_by_status(
        &self,
        status: ConversionStatus,
    ) -> Result<Vec<ConversionRecord>, InfraError> {
        let state = self.state.read().await;
        Ok(state
            .records
            .iter()
            .filter(|r| r.status() == status)
            .cloned()
            .collect())
    }
}

// =============================================================================
// PostgreSQL 実装
// =============================================================================

/// PostgreSQL 実装の ConversionRepository
#[derive(Debug, Clone)]
pub struct PostgresConversionRepository {
    pool: PgPool,
}

impl PostgresConversionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// conversion_records テーブルの行
#[derive(sqlx::FromRow)]
struct ConversionRow {
    id: Uuid,
    lead_id: String,
    assigned_to: String,
    status: String,
    steps: Json<Vec<StepInstance>>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    customer_id: Option<String>,
    validation_errors: Vec<String>,
    version: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ConversionRow> for ConversionRecord {
    type Error = InfraError;

    fn try_from(row: ConversionRow) -> Result<Self, Self::Error> {
        let record = ConversionRecord::from_db(ConversionRecordRow {
            id: ConversionId::from_uuid(row.id),
            lead_id: LeadId::new(row.lead_id)?,
            assigned_to: TerritoryManagerId::new(row.assigned_to)?,
            status: row.status.parse::<ConversionStatus>()?,
            steps: row.steps.0,
            started_at: row.started_at,
            completed_at: row.completed_at,
            customer_id: row.customer_id.map(CustomerId::from_string),
            validation_errors: row.validation_errors,
            version: Version::try_from(row.version)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })?;
        Ok(record)
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT
        id, lead_id, assigned_to, status, steps,
        started_at, completed_at, customer_id, validation_errors,
        version, created_at, updated_at
    FROM conversion_records
"#;

#[async_trait]
impl ConversionRepository for PostgresConversionRepository {
    #[tracing::instrument(skip_all, level = "debug", fields(id = %record.id(), lead_id = %record.lead_id()))]
    async fn insert(&self, record: &ConversionRecord) -> Result<(), InfraError> {
        let status: &str = record.status().into();
        let result = sqlx::query(
            r#"
            INSERT INTO conversion_records (
                id, lead_id, assigned_to, status, steps,
                started_at, completed_at, customer_id, validation_errors,
                version, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(record.id().as_uuid())
        .bind(record.lead_id().as_str())
        .bind(record.assigned_to().as_str())
        .bind(status)
        .bind(Json(record.steps()))
        .bind(record.started_at())
        .bind(record.completed_at())
        .bind(record.customer_id().map(CustomerId::as_str))
        .bind(record.validation_errors())
        .bind(record.version().as_i32())
        .bind(record.created_at())
        .bind(record.updated_at())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => {
                Err(InfraError::duplicate(ENTITY, record.lead_id().as_str()))
            }
            Err(e) => Err(e.into()),
        }
    }

    #[tracing::instrument(skip_all, level = "debug", fields(id = %record.id(), %expected_version))]
    async fn update_with_version_check(
        &self,
        record: &ConversionRecord,
        expected_version: Version,
    ) -> Result<(), InfraError> {
        let status: &str = record.status().into();
        let result = sqlx::query(
            r#"
            UPDATE conversion_records SET
                status = $1,
                steps = $2,
                started_at = $3,
                completed_at = $4,
                customer_id = $5,
                validation_errors = $6,
                version = $7,
                updated_at = $8
            WHERE id = $9 AND version = $10
            "#,
        )
        .bind(status)
        .bind(Json(record.steps()))
        .bind(record.started_at())
        .bind(record.completed_at())
        .bind(record.customer_id().map(CustomerId::as_str))
        .bind(record.validation_errors())
        .bind(record.version().as_i32())
        .bind(record.updated_at())
        .bind(record.id().as_uuid())
        .bind(expected_version.as_i32())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(InfraError::conflict(ENTITY, record.id().to_string()));
        }

        Ok(())
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%id))]
    async fn find_by_id(&self, id: &ConversionId) -> Result<Option<ConversionRecord>, InfraError> {
        let row = sqlx::query_as::<_, ConversionRow>(&format!("{SELECT_COLUMNS} WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(ConversionRecord::try_from).transpose()
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%lead_id))]
    async fn find_by_lead_id(
        &self,
        lead_id: &LeadId,
    ) -> Result<Option<ConversionRecord>, InfraError> {
        let row =
            sqlx::query_as::<_, ConversionRow>(&format!("{SELECT_COLUMNS} WHERE lead_id = $1"))
                .bind(lead_id.as_str())
                .fetch_optional(&self.pool)
                .await?;

        row.map(ConversionRecord::try_from).transpose()
    }

    #[tracing::instrument(skip_all, level = "debug")]
    async fn find_all(&self) -> Result<Vec<ConversionRecord>, InfraError> {
        let rows = sqlx::query_as::<_, ConversionRow>(&format!("{SELECT_COLUMNS} ORDER BY seq"))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(ConversionRecord::try_from).collect()
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%status))]
    async fn find_by_status(
        &self,
        status: ConversionStatus,
    ) -> Result<Vec<ConversionRecord>, InfraError> {
        let status_str: &str = status.into();
        let rows = sqlx::query_as::<_, ConversionRow>(&format!(
            "{SELECT_COLUMNS} WHERE status = $1 ORDER BY seq"
        ))
        .bind(status_str)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ConversionRecord::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use leadconv_domain::conversion::NewConversionRecord;
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    use super::*;

    #[fixture]
    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn record_for(lead_id: &str, now: DateTime<Utc>) -> ConversionRecord {
        ConversionRecord::new(NewConversionRecord {
            id: ConversionId::new(),
            lead_id: LeadId::new(lead_id).unwrap(),
            assigned_to: TerritoryManagerId::new("tm-001").unwrap(),
            now,
        })
    }

    #[test]
    fn test_トレイトはsendとsyncを実装している() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<InMemoryConversionRepository>();
        assert_send_sync::<PostgresConversionRepository>();
    }

    #[rstest]
    #[tokio::test]
    async fn test_登録したレコードをidとリードidで取得できる(now: DateTime<Utc>) {
        let sut = InMemoryConversionRepository::new();
        let record = record_for("L1", now);

        sut.insert(&record).await.unwrap();

        assert_eq!(sut.find_by_id(record.id()).await.unwrap(), Some(record.clone()));
        assert_eq!(
            sut.find_by_lead_id(record.lead_id()).await.unwrap(),
            Some(record)
        );
    }

    #[rstest]
    #[tokio::test]
    async fn test_同じリードの二重登録は重複エラー(now: DateTime<Utc>) {
        let sut = InMemoryConversionRepository::new();
        sut.insert(&record_for("L1", now)).await.unwrap();

        let result = sut.insert(&record_for("L1", now)).await;

        assert!(matches!(
            result.unwrap_err().kind(),
            crate::error::InfraErrorKind::Duplicate { key, .. } if key == "L1"
        ));
        assert_eq!(sut.find_all().await.unwrap().len(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn test_一覧は登録順でステータスで絞り込める(now: DateTime<Utc>) {
        let sut = InMemoryConversionRepository::new();
        let first = record_for("L3", now);
        let second = record_for("L1", now);
        let third = record_for("L2", now);
        for record in [&first, &second, &third] {
            sut.insert(record).await.unwrap();
        }
        let started = second.clone().started(now).unwrap();
        sut.update_with_version_check(&started, second.version())
            .await
            .unwrap();

        let all: Vec<String> = sut
            .find_all()
            .await
            .unwrap()
            .iter()
            .map(|r| r.lead_id().to_string())
            .collect();
        let not_started: Vec<String> = sut
            .find_by_status(ConversionStatus::NotStarted)
            .await
            .unwrap()
            .iter()
            .map(|r| r.lead_id().to_string())
            .collect();

        assert_eq!(all, vec!["L3", "L1", "L2"]);
        assert_eq!(not_started, vec!["L3", "L2"]);
    }

    #[rstest]
    #[tokio::test]
    async fn test_古いバージョンでの更新は競合エラー(now: DateTime<Utc>) {
        let sut = InMemoryConversionRepository::new();
        let record = record_for("L1", now);
        sut.insert(&record).await.unwrap();
        let started = record.clone().started(now).unwrap();
        sut.update_with_version_check(&started, record.version())
            .await
            .unwrap();

        // 同じ遷移前バージョンでもう一度更新する
        let result = sut.update_with_version_check(&started, record.version()).await;

        assert!(matches!(
            result.unwrap_err().kind(),
            crate::error::InfraErrorKind::Conflict { .. }
        ));
    }

    #[rstest]
    #[tokio::test]
    async fn test_未登録レコードの更新は競合エラー(now: DateTime<Utc>) {
        let sut = InMemoryConversionRepository::new();
        let record = record_for("L1", now);

        let result = sut
            .update_with_version_check(&record, record.version())
            .await;

        assert!(result.is_err());
    }
}
