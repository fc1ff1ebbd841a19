//! # オンボーディング
//!
//! 新規顧客のオンボーディング（導入支援ワークフロー）を開始する外部連携の抽象化。
//! `setup-onboarding` ステップが使用する。

use async_trait::async_trait;
use leadconv_domain::customer::{Customer, CustomerId};
use tokio::sync::RwLock;

use crate::error::InfraError;

/// オンボーディング開始トレイト
#[async_trait]
pub trait OnboardingInitializer: Send + Sync {
    /// 顧客のオンボーディングを開始する
    ///
    /// 既に開始済みの顧客に対しては `Duplicate` を返す。
    async fn open_onboarding(&self, customer: &Customer) -> Result<(), InfraError>;
}

/// 開始済みの顧客をメモリ上に記録するオンボーディング実装
#[derive(Default)]
pub struct InMemoryOnboardingInitializer {
    opened: RwLock<Vec<CustomerId>>,
}

impl InMemoryOnboardingInitializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// オンボーディングを開始した顧客 ID の一覧
    pub async fn opened(&self) -> Vec<CustomerId> {
        self.opened.read().await.clone()
    }
}

#[async_trait]
impl OnboardingInitializer for InMemoryOnboardingInitializer {
    async fn open_onboarding(&self, customer: &Customer) -> Result<(), InfraError> {
        let mut opened = self.opened.write().await;
        if opened.contains(customer.id()) {
            return Err(InfraError::duplicate("Onboarding", customer.id().as_str()));
        }
        opened.push(customer.id().clone());

        tracing::info!(
            customer.id = %customer.id(),
            customer.account_manager = %customer.account_manager(),
            "オンボーディングを開始"
        );
        Ok(())
    }
}
