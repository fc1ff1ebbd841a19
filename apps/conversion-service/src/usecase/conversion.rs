//! # コンバージョンユースケース
//!
//! コンバージョンレコードの作成・照会・実行・キャンセル・リトライを扱う。
//!
//! - レコードの変更は実行器（[`ConversionExecutor`]）とリトライだけが行う
//! - 同じレコードの実行は [`RunRegistry`] で 1 つに制限する
//! - 異なるレコードの実行は独立した tokio タスクとして並行に進む

mod event_bus;
mod executor;
mod run_registry;
mod steps;

use std::sync::Arc;

pub use event_bus::{EventBus, EventChannel};
pub use executor::ConversionExecutor;
use leadconv_domain::{
    DomainError,
    clock::Clock,
    conversion::{
        ConversionEvent,
        ConversionId,
        ConversionRecord,
        ConversionStatus,
        NewConversionRecord,
    },
    lead::{Lead, LeadId},
};
use leadconv_infra::repository::{ConversionRepository, LeadRepository};
use leadconv_shared::{event_log::event, log_business_event};
pub use run_registry::{RunGuard, RunRegistry};
pub use steps::{
    AssignTerritoryStep,
    CheckDuplicatesStep,
    ConversionStepHandler,
    CreateCustomerStep,
    NotifyTeamStep,
    SetupOnboardingStep,
    StepContext,
    StepDependencies,
    StepPipeline,
    ValidateLeadStep,
};
use tokio::{sync::broadcast, task::JoinHandle};

use crate::{config::ExecutionConfig, error::CoreError};

/// 実行開始の準備が整ったレコード
struct PreparedRun {
    record:  ConversionRecord,
    lead:    Lead,
    guard:   RunGuard,
    channel: EventChannel,
}

/// コンバージョンユースケースの実装
pub struct ConversionUseCaseImpl {
    conversions: Arc<dyn ConversionRepository>,
    leads:       Arc<dyn LeadRepository>,
    executor:    Arc<ConversionExecutor>,
    runs:        RunRegistry,
    events:      EventBus,
    clock:       Arc<dyn Clock>,
}

impl ConversionUseCaseImpl {
    pub fn new(
        conversions: Arc<dyn ConversionRepository>,
        leads: Arc<dyn LeadRepository>,
        pipeline: StepPipeline,
        clock: Arc<dyn Clock>,
        settings: ExecutionConfig,
    ) -> Self {
        let events = EventBus::new();
        let executor = Arc::new(ConversionExecutor::new(
            conversions.clone(),
            Arc::new(pipeline),
            events.clone(),
            clock.clone(),
            settings,
        ));
        Self {
            conversions,
            leads,
            executor,
            runs: RunRegistry::new(),
            events,
            clock,
        }
    }

    /// リードのコンバージョンレコードを作成する
    ///
    /// 1 リードにつきレコードは 1 つ。既にある場合は `Conflict` を返す。
    pub async fn create_conversion(&self, lead_id: &LeadId) -> Result<ConversionRecord, CoreError> {
        let lead = self.find_lead(lead_id).await?;

        if self.conversions.find_by_lead_id(lead_id).await?.is_some() {
            return Err(CoreError::Conflict(format!(
                "リード {lead_id} のコンバージョンは既に存在します"
            )));
        }

        let record = ConversionRecord::new(NewConversionRecord::for_lead(&lead, self.clock.now()));
        self.conversions.insert(&record).await?;

        log_business_event!(
            event.category = event::category::CONVERSION,
            event.action = event::action::CONVERSION_CREATED,
            event.entity_type = event::entity_type::CONVERSION_RECORD,
            event.entity_id = %record.id(),
            event.result = event::result::SUCCESS,
            lead.id = %lead_id,
            "コンバージョンを作成"
        );
        Ok(record)
    }

    /// レコードを作成し、実行をバックグラウンドで開始する
    ///
    /// 返すのは実行開始前のスナップショット。
    pub async fn start_conversion(&self, lead_id: &LeadId) -> Result<ConversionRecord, CoreError> {
        let record = self.create_conversion(lead_id).await?;
        self.spawn(record.id()).await?;
        Ok(record)
    }

    /// 実行（または再開）をバックグラウンドで開始する
    ///
    /// 返すのは実行開始前のスナップショットとタスクのハンドル。
    pub async fn spawn(
        &self,
        id: &ConversionId,
    ) -> Result<(ConversionRecord, JoinHandle<()>), CoreError> {
        let PreparedRun {
            record,
            lead,
            guard,
            channel,
        } = self.prepare(id).await?;

        let snapshot = record.clone();
        let executor = self.executor.clone();
        let handle = tokio::spawn(async move {
            let id = record.id().clone();
            if let Err(e) = executor.run(record, lead, guard.token()).await {
                tracing::error!(conversion.id = %id, error = %e, "コンバージョンの実行が異常終了");
            }
            // チャネルを閉じてから実行枠を解放する
            drop(channel);
            drop(guard);
        });

        Ok((snapshot, handle))
    }

    /// 実行（または再開）し、終端かキャンセルまで待つ
    pub async fn execute(&self, id: &ConversionId) -> Result<ConversionRecord, CoreError> {
        let PreparedRun {
            record,
            lead,
            guard,
            channel,
        } = self.prepare(id).await?;
        let result = self.executor.run(record, lead, guard.token()).await;
        drop(channel);
        drop(guard);
        result
    }

    /// 実行中のコンバージョンにキャンセルを要求する
    ///
    /// キャンセルは実行中のステップが終わった時点で効く。
    pub async fn cancel(&self, id: &ConversionId) -> Result<ConversionRecord, CoreError> {
        let record = self.get(id).await?;
        if !self.runs.cancel(id) {
            return Err(CoreError::Conflict(format!(
                "コンバージョン {id} は実行中ではありません"
            )));
        }
        tracing::info!(conversion.id = %id, "キャンセルを要求");
        Ok(record)
    }

    /// 失敗したレコードを未開始に戻す
    ///
    /// 新しいレコードは作らず、同じレコードをやり直す。
    pub async fn retry(&self, id: &ConversionId) -> Result<ConversionRecord, CoreError> {
        let record = self.get(id).await?;
        if self.runs.is_running(id) {
            return Err(CoreError::Conflict(format!(
                "コンバージョン {id} は実行中です"
            )));
        }

        let expected = record.version();
        let retried = record.retried(self.clock.now())?;
        self.conversions
            .update_with_version_check(&retried, expected)
            .await?;

        log_business_event!(
            event.category = event::category::CONVERSION,
            event.action = event::action::CONVERSION_RETRIED,
            event.entity_type = event::entity_type::CONVERSION_RECORD,
            event.entity_id = %retried.id(),
            event.result = event::result::SUCCESS,
            "コンバージョンをリトライ"
        );
        Ok(retried)
    }

    pub async fn get(&self, id: &ConversionId) -> Result<ConversionRecord, CoreError> {
        self.conversions
            .find_by_id(id)
            .await?
            .ok_or_else(|| {
                DomainError::NotFound {
                    entity_type: "ConversionRecord",
                    id:          id.to_string(),
                }
                .into()
            })
    }

    pub async fn find_by_lead_id(
        &self,
        lead_id: &LeadId,
    ) -> Result<Option<ConversionRecord>, CoreError> {
        Ok(self.conversions.find_by_lead_id(lead_id).await?)
    }

    /// レコード一覧を作成順に取得する
    ///
    /// `status` を指定した場合はそのステータスのレコードだけを返す。
    pub async fn list(
        &self,
        status: Option<ConversionStatus>,
    ) -> Result<Vec<ConversionRecord>, CoreError> {
        let records = match status {
            Some(status) => self.conversions.find_by_status(status).await?,
            None => self.conversions.find_all().await?,
        };
        Ok(records)
    }

    /// 実行中のコンバージョンの進捗イベントを購読する
    ///
    /// 購読より前に発行されたイベントは届かない。実行中でなければ `Conflict` を返す。
    pub async fn subscribe(
        &self,
        id: &ConversionId,
    ) -> Result<broadcast::Receiver<ConversionEvent>, CoreError> {
        self.get(id).await?;
        self.events.subscribe(id).ok_or_else(|| {
            CoreError::Conflict(format!("コンバージョン {id} は実行中ではありません"))
        })
    }

    pub fn is_running(&self, id: &ConversionId) -> bool {
        self.runs.is_running(id)
    }

    async fn prepare(&self, id: &ConversionId) -> Result<PreparedRun, CoreError> {
        let guard = self.runs.try_acquire(id).ok_or_else(|| {
            CoreError::Conflict(format!("コンバージョン {id} は既に実行中です"))
        })?;

        let record = self.get(id).await?;
        if !record.is_runnable() {
            return Err(CoreError::Conflict(format!(
                "{} のコンバージョンは実行できません。失敗した場合はリトライしてください",
                record.status()
            )));
        }
        let lead = self.find_lead(record.lead_id()).await?;
        let channel = self.events.open(id);

        Ok(PreparedRun {
            record,
            lead,
            guard,
            channel,
        })
    }

    async fn find_lead(&self, lead_id: &LeadId) -> Result<Lead, CoreError> {
        self.leads.find_by_id(lead_id).await?.ok_or_else(|| {
            DomainError::NotFound {
                entity_type: "Lead",
                id:          lead_id.to_string(),
            }
            .into()
        })
    }
}
