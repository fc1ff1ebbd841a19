//! # CustomerRepository
//!
//! コンバージョンで作成された顧客の保管庫。
//! `check-duplicates` ステップの重複検索と `create-customer` ステップの登録に使う。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use leadconv_domain::{
    customer::{Customer, CustomerId, CustomerRecord},
    lead::{Lead, LeadId},
    territory::TerritoryId,
    value_objects::TerritoryManagerId,
};
use sqlx::PgPool;
use tokio::sync::RwLock;

use crate::{db::is_unique_violation, error::InfraError};

/// 顧客リポジトリトレイト
#[async_trait]
pub trait CustomerRepository: Send + Sync {
    /// 顧客を登録する
    ///
    /// 同じ ID の顧客が存在する場合は `Duplicate` を返す。
    async fn insert(&self, customer: &Customer) -> Result<(), InfraError>;

    async fn find_by_id(&self, id: &CustomerId) -> Result<Option<Customer>, InfraError>;

    /// リードと重複する顧客を検索する
    ///
    /// リード ID、メールアドレス、会社名のいずれかが一致する顧客を返す。
    async fn find_matching(&self, lead: &Lead) -> Result<Vec<Customer>, InfraError>;
}

/// インメモリの顧客リポジトリ
#[derive(Default)]
pub struct InMemoryCustomerRepository {
    customers: RwLock<Vec<Customer>>,
}

impl InMemoryCustomerRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 初期データ付きで作成する
    pub fn with_customers(customers: Vec<Customer>) -> Self {
        Self {
            customers: RwLock::new(customers),
        }
    }
}

#[async_trait]
impl CustomerRepository for InMemoryCustomerRepository {
    async fn insert(&self, customer: &Customer) -> Result<(), InfraError> {
        let mut customers = self.customers.write().await;
        if customers.iter().any(|c| c.id() == customer.id()) {
            return Err(InfraError::duplicate("Customer", customer.id().as_str()));
        }
        customers.push(customer.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &CustomerId) -> Result<Option<Customer>, InfraError> {
        Ok(self
            .customers
            .read()
            .await
            .iter()
            .find(|c| c.id() == id)
            .cloned())
    }

    async fn find_matching(&self, lead: &Lead) -> Result<Vec<Customer>, InfraError> {
        Ok(self
            .customers
            .read()
            .await
            .iter()
            .filter(|c| c.duplicates(lead))
            .cloned()
            .collect())
    }
}

/// PostgreSQL 実装の CustomerRepository
#[derive(Debug, Clone)]
pub struct PostgresCustomerRepository {
    pool: PgPool,
}

impl PostgresCustomerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct CustomerRow {
    id: String,
    lead_id: String,
    company_name: String,
    contact_name: String,
    email: String,
    territory_id: String,
    account_manager: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<CustomerRow> for Customer {
    type Error = InfraError;

    fn try_from(row: CustomerRow) -> Result<Self, Self::Error> {
        Ok(Customer::from_db(CustomerRecord {
            id: CustomerId::from_string(row.id),
            lead_id: LeadId::new(row.lead_id)?,
            company_name: row.company_name,
            contact_name: row.contact_name,
            email: row.email,
            territory_id: TerritoryId::new(row.territory_id)?,
            account_manager: TerritoryManagerId::new(row.account_manager)?,
            created_at: row.created_at,
        }))
    }
}

#[async_trait]
impl CustomerRepository for PostgresCustomerRepository {
    #[tracing::instrument(skip_all, level = "debug", fields(id = %customer.id()))]
    async fn insert(&self, customer: &Customer) -> Result<(), InfraError> {
        let result = sqlx::query(
            r#"
            INSERT INTO customers (
                id, lead_id, company_name, contact_name, email,
                territory_id, account_manager, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(customer.id().as_str())
        .bind(customer.lead_id().as_str())
        .bind(customer.company_name())
        .bind(customer.contact_name())
        .bind(customer.email())
        .bind(customer.territory_id().as_str())
        .bind(customer.account_manager().as_str())
        .bind(customer.created_at())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => {
                Err(InfraError::duplicate("Customer", customer.id().as_str()))
            }
            Err(e) => Err(e.into()),
        }
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%id))]
    async fn find_by_id(&self, id: &CustomerId) -> Result<Option<Customer>, InfraError> {
        let row = sqlx::query_as::<_, CustomerRow>(
            r#"
            SELECT id, lead_id, company_name, contact_name, email,
                   territory_id, account_manager, created_at
            FROM customers
            WHERE id = $1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Customer::try_from).transpose()
    }

    #[tracing::instrument(skip_all, level = "debug", fields(lead_id = %lead.id()))]
    async fn find_matching(&self, lead: &Lead) -> Result<Vec<Customer>, InfraError> {
        let rows = sqlx::query_as::<_, CustomerRow>(
            r#"
            SELECT id, lead_id, company_name, contact_name, email,
                   territory_id, account_manager, created_at
            FROM customers
            WHERE lead_id = $1
               OR lower(email) = lower($2)
               OR lower(company_name) = lower($3)
            ORDER BY created_at
            "#,
        )
        .bind(lead.id().as_str())
        .bind(lead.email().trim())
        .bind(lead.company_name().trim())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Customer::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use leadconv_domain::lead::{LeadStatus, NewLead};
    use pretty_assertions::assert_eq;

    use super::*;

    fn lead(id: &str, company: &str, email: &str) -> Lead {
        Lead::new(NewLead {
            id: LeadId::new(id).unwrap(),
            company_name: company.to_string(),
            contact_name: "Dana Whitfield".to_string(),
            email: email.to_string(),
            phone: None,
            region: "TX".to_string(),
            status: LeadStatus::Qualified,
            assigned_to: TerritoryManagerId::new("tm-001").unwrap(),
            created_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        })
    }

    fn customer_from(lead: &Lead) -> Customer {
        Customer::from_lead(lead, TerritoryId::new("south").unwrap(), lead.created_at())
    }

    #[tokio::test]
    async fn test_会社名が一致する顧客は重複として検出される() {
        let existing = customer_from(&lead("L1", "Arctic Air", "dana@arctic.example.com"));
        let sut = InMemoryCustomerRepository::with_customers(vec![existing.clone()]);

        let found = sut
            .find_matching(&lead("L9", "arctic air", "other@example.com"))
            .await
            .unwrap();

        assert_eq!(found, vec![existing]);
    }

    #[tokio::test]
    async fn test_一致しないリードには空を返す() {
        let sut = InMemoryCustomerRepository::with_customers(vec![customer_from(&lead(
            "L1",
            "Arctic Air",
            "dana@arctic.example.com",
        ))]);

        let found = sut
            .find_matching(&lead("L2", "Bayou Cooling", "ops@bayou.example.com"))
            .await
            .unwrap();

        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_同じidの顧客は登録できない() {
        let sut = InMemoryCustomerRepository::new();
        let customer = customer_from(&lead("L1", "Arctic Air", "dana@arctic.example.com"));
        sut.insert(&customer).await.unwrap();

        let result = sut.insert(&customer).await;

        assert!(result.is_err());
        assert_eq!(sut.find_by_id(customer.id()).await.unwrap(), Some(customer));
    }
}
