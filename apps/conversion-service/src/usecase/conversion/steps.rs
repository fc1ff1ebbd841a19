//! # ステップハンドラ
//!
//! カタログの各ステップを、対応する外部連携を呼び出して実行する。
//!
//! | ステップ | 連携先 | 失敗時のエラー |
//! |---------|-------|--------------|
//! | `validate-lead` | リード自身の検証 | `Validation` |
//! | `check-duplicates` | CustomerRepository | `Duplicate` |
//! | `assign-territory` | TerritoryDirectory | `Assignment` |
//! | `create-customer` | CustomerRepository | `Provisioning` |
//! | `setup-onboarding` | OnboardingInitializer | `Onboarding` |
//! | `notify-team` | NotificationService | `Notification` |

use std::sync::Arc;

use async_trait::async_trait;
use leadconv_domain::{
    clock::Clock,
    conversion::{ConversionId, ConversionStepError, ConversionStepId, TOTAL_STEPS},
    customer::{Customer, CustomerId},
    lead::Lead,
    notification::LeadConvertedNotification,
    territory::Territory,
};
use leadconv_infra::{
    InfraErrorKind,
    OnboardingInitializer,
    TerritoryDirectory,
    repository::CustomerRepository,
};

use crate::{error::CoreError, usecase::notification::NotificationService};

/// ステップ実行時に渡される入力
#[derive(Debug, Clone)]
pub struct StepContext {
    pub conversion_id: ConversionId,
    pub lead:          Lead,
}

/// ステップハンドラトレイト
#[async_trait]
pub trait ConversionStepHandler: Send + Sync {
    /// 担当するステップ
    fn step_id(&self) -> ConversionStepId;

    async fn run(&self, context: &StepContext) -> Result<(), ConversionStepError>;
}

/// カタログ順に並んだステップハンドラの列
pub struct StepPipeline {
    handlers: Vec<Arc<dyn ConversionStepHandler>>,
}

impl StepPipeline {
    /// ハンドラの列からパイプラインを作成する
    ///
    /// ハンドラはカタログと同じ順序で全ステップ分そろっている必要がある。
    pub fn new(handlers: Vec<Arc<dyn ConversionStepHandler>>) -> Result<Self, CoreError> {
        if handlers.len() != TOTAL_STEPS {
            return Err(CoreError::Internal(format!(
                "ステップハンドラの数が不正です: {}（期待値: {TOTAL_STEPS}）",
                handlers.len()
            )));
        }
        if let Some((index, handler)) = handlers
            .iter()
            .enumerate()
            .find(|(index, handler)| handler.step_id().index() != *index)
        {
            return Err(CoreError::Internal(format!(
                "{} 番目のハンドラが {} を担当しています",
                index,
                handler.step_id()
            )));
        }
        Ok(Self { handlers })
    }

    /// 標準の 6 ステップで構成したパイプラインを作成する
    pub fn standard(deps: StepDependencies) -> Self {
        let StepDependencies {
            customers,
            territories,
            onboarding,
            notifications,
            clock,
        } = deps;

        let handlers: Vec<Arc<dyn ConversionStepHandler>> = vec![
            Arc::new(ValidateLeadStep),
            Arc::new(CheckDuplicatesStep {
                customers: customers.clone(),
            }),
            Arc::new(AssignTerritoryStep {
                territories: territories.clone(),
            }),
            Arc::new(CreateCustomerStep {
                customers: customers.clone(),
                territories,
                clock,
            }),
            Arc::new(SetupOnboardingStep {
                customers,
                onboarding,
            }),
            Arc::new(NotifyTeamStep { notifications }),
        ];
        Self { handlers }
    }

    pub fn handler(&self, index: usize) -> Option<&Arc<dyn ConversionStepHandler>> {
        self.handlers.get(index)
    }
}

/// 標準ステップが使う外部連携
pub struct StepDependencies {
    pub customers:     Arc<dyn CustomerRepository>,
    pub territories:   Arc<dyn TerritoryDirectory>,
    pub onboarding:    Arc<dyn OnboardingInitializer>,
    pub notifications: Arc<NotificationService>,
    pub clock:         Arc<dyn Clock>,
}

/// リードの入力内容とステータスを検証する
pub struct ValidateLeadStep;

#[async_trait]
impl ConversionStepHandler for ValidateLeadStep {
    fn step_id(&self) -> ConversionStepId {
        ConversionStepId::ValidateLead
    }

    async fn run(&self, context: &StepContext) -> Result<(), ConversionStepError> {
        let issues = context.lead.conversion_issues();
        if issues.is_empty() {
            Ok(())
        } else {
            Err(ConversionStepError::Validation(issues.join("; ")))
        }
    }
}

/// 既存顧客との重複を検査する
pub struct CheckDuplicatesStep {
    customers: Arc<dyn CustomerRepository>,
}

#[async_trait]
impl ConversionStepHandler for CheckDuplicatesStep {
    fn step_id(&self) -> ConversionStepId {
        ConversionStepId::CheckDuplicates
    }

    async fn run(&self, context: &StepContext) -> Result<(), ConversionStepError> {
        let matches = self
            .customers
            .find_matching(&context.lead)
            .await
            .map_err(|e| ConversionStepError::Duplicate(format!("Duplicate search failed: {e}")))?;

        // 自身の前回実行で作成した顧客は重複として扱わない
        let own_customer = CustomerId::for_lead(context.lead.id());
        match matches.iter().find(|c| *c.id() != own_customer) {
            None => Ok(()),
            Some(existing) => Err(ConversionStepError::Duplicate(format!(
                "Lead matches existing customer {} ({})",
                existing.id(),
                existing.company_name()
            ))),
        }
    }
}

/// リードの地域を担当するテリトリーを引き、担当者がそのテリトリーに属するか確認する
async fn resolve_territory(
    territories: &dyn TerritoryDirectory,
    lead: &Lead,
) -> Result<Territory, ConversionStepError> {
    let territory = territories
        .find_by_region(lead.region())
        .await
        .map_err(|e| ConversionStepError::Assignment(format!("Territory lookup failed: {e}")))?
        .ok_or_else(|| ConversionStepError::Assignment("No territory found".to_string()))?;

    if !territory.is_managed_by(lead.assigned_to()) {
        return Err(ConversionStepError::Assignment(format!(
            "Territory manager {} does not cover territory {}",
            lead.assigned_to(),
            territory.id()
        )));
    }
    Ok(territory)
}

/// テリトリーと担当者を照合する
pub struct AssignTerritoryStep {
    territories: Arc<dyn TerritoryDirectory>,
}

#[async_trait]
impl ConversionStepHandler for AssignTerritoryStep {
    fn step_id(&self) -> ConversionStepId {
        ConversionStepId::AssignTerritory
    }

    async fn run(&self, context: &StepContext) -> Result<(), ConversionStepError> {
        let territory = resolve_territory(self.territories.as_ref(), &context.lead).await?;
        tracing::debug!(
            lead.id = %context.lead.id(),
            territory.id = %territory.id(),
            "テリトリーを割り当て"
        );
        Ok(())
    }
}

/// 顧客レコードを作成する
pub struct CreateCustomerStep {
    customers:   Arc<dyn CustomerRepository>,
    territories: Arc<dyn TerritoryDirectory>,
    clock:       Arc<dyn Clock>,
}

#[async_trait]
impl ConversionStepHandler for CreateCustomerStep {
    fn step_id(&self) -> ConversionStepId {
        ConversionStepId::CreateCustomer
    }

    async fn run(&self, context: &StepContext) -> Result<(), ConversionStepError> {
        let customer_id = CustomerId::for_lead(context.lead.id());
        let existing = self
            .customers
            .find_by_id(&customer_id)
            .await
            .map_err(|e| ConversionStepError::Provisioning(format!("Customer lookup failed: {e}")))?;
        if let Some(existing) = existing {
            if existing.lead_id() == context.lead.id() {
                tracing::debug!(customer.id = %customer_id, "顧客は作成済み");
                return Ok(());
            }
            return Err(ConversionStepError::Provisioning(format!(
                "Customer {customer_id} belongs to lead {}",
                existing.lead_id()
            )));
        }

        let territory = resolve_territory(self.territories.as_ref(), &context.lead)
            .await
            .map_err(|e| ConversionStepError::Provisioning(e.to_string()))?;
        let customer = Customer::from_lead(
            &context.lead,
            territory.id().clone(),
            self.clock.now(),
        );

        self.customers.insert(&customer).await.map_err(|e| {
            ConversionStepError::Provisioning(format!(
                "Failed to create customer {}: {e}",
                customer.id()
            ))
        })
    }
}

/// 作成した顧客のオンボーディングを開始する
pub struct SetupOnboardingStep {
    customers:  Arc<dyn CustomerRepository>,
    onboarding: Arc<dyn OnboardingInitializer>,
}

#[async_trait]
impl ConversionStepHandler for SetupOnboardingStep {
    fn step_id(&self) -> ConversionStepId {
        ConversionStepId::SetupOnboarding
    }

    async fn run(&self, context: &StepContext) -> Result<(), ConversionStepError> {
        let customer_id = CustomerId::for_lead(context.lead.id());
        let customer = self
            .customers
            .find_by_id(&customer_id)
            .await
            .map_err(|e| ConversionStepError::Onboarding(format!("Customer lookup failed: {e}")))?
            .ok_or_else(|| {
                ConversionStepError::Onboarding(format!("Customer {customer_id} not found"))
            })?;

        match self.onboarding.open_onboarding(&customer).await {
            Ok(()) => Ok(()),
            Err(e) if matches!(e.kind(), InfraErrorKind::Duplicate { .. }) => {
                tracing::debug!(customer.id = %customer_id, "オンボーディングは開始済み");
                Ok(())
            }
            Err(e) => Err(ConversionStepError::Onboarding(format!(
                "Failed to open onboarding: {e}"
            ))),
        }
    }
}

/// 営業チームへ通知する
pub struct NotifyTeamStep {
    notifications: Arc<NotificationService>,
}

#[async_trait]
impl ConversionStepHandler for NotifyTeamStep {
    fn step_id(&self) -> ConversionStepId {
        ConversionStepId::NotifyTeam
    }

    async fn run(&self, context: &StepContext) -> Result<(), ConversionStepError> {
        let notification = LeadConvertedNotification::new(
            context.conversion_id.clone(),
            &context.lead,
            self.notifications.team_address(),
        );
        self.notifications
            .notify(&notification)
            .await
            .map_err(|e| ConversionStepError::Notification(e.to_string()))
    }
}
