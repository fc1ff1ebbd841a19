//! # コンバージョン実行
//!
//! レコードのステップを `current_step_index` から順に 1 つずつ実行する。
//!
//! ## 処理フロー
//!
//! 1. 未開始なら実行中に遷移して保存、`Started` を発行
//! 2. 各ステップの前にキャンセル要求を確認（ステップの途中では中断しない）
//! 3. ステップを実行中にして保存、`StepStarted` を発行
//! 4. ハンドラを制限時間付きで実行
//! 5. 成功なら完了にして保存、`StepCompleted` を発行
//! 6. 失敗ならレコードを失敗にして保存、`StepFailed` と `Failed` を発行して停止
//!
//! ステップの失敗は呼び出し側に返さず、失敗したレコードとして返す。
//! 返す `Err` は保存や状態遷移の異常のみ。

use std::{sync::Arc, time::Duration};

use leadconv_domain::{
    clock::Clock,
    conversion::{
        ConversionEvent,
        ConversionEventKind,
        ConversionRecord,
        ConversionStatus,
        ConversionStepDefinition,
        ConversionStepError,
        StepStatus,
    },
    lead::Lead,
    value_objects::Version,
};
use leadconv_infra::repository::ConversionRepository;
use leadconv_shared::{event_log::event, log_business_event};
use tokio_util::sync::CancellationToken;

use super::{
    event_bus::EventBus,
    steps::{ConversionStepHandler, StepContext, StepPipeline},
};
use crate::{config::ExecutionConfig, error::CoreError};

/// コンバージョン実行器
pub struct ConversionExecutor {
    repository: Arc<dyn ConversionRepository>,
    pipeline:   Arc<StepPipeline>,
    events:     EventBus,
    clock:      Arc<dyn Clock>,
    settings:   ExecutionConfig,
}

impl ConversionExecutor {
    pub fn new(
        repository: Arc<dyn ConversionRepository>,
        pipeline: Arc<StepPipeline>,
        events: EventBus,
        clock: Arc<dyn Clock>,
        settings: ExecutionConfig,
    ) -> Self {
        Self {
            repository,
            pipeline,
            events,
            clock,
            settings,
        }
    }

    /// レコードを終端（完了・失敗）またはキャンセルまで進める
    #[tracing::instrument(
        skip_all,
        fields(conversion.id = %record.id(), lead.id = %record.lead_id())
    )]
    pub async fn run(
        &self,
        record: ConversionRecord,
        lead: Lead,
        cancel: &CancellationToken,
    ) -> Result<ConversionRecord, CoreError> {
        let mut record = match record.status() {
            ConversionStatus::NotStarted => {
                let expected = record.version();
                let started = record.started(self.clock.now())?;
                self.save(started, expected).await?
            }
            ConversionStatus::InProgress => record,
            status => {
                return Err(CoreError::Conflict(format!(
                    "実行できないコンバージョンです（現在: {status}）"
                )));
            }
        };
        self.publish(&record, ConversionEventKind::Started);
        log_business_event!(
            event.category = event::category::CONVERSION,
            event.action = event::action::CONVERSION_STARTED,
            event.entity_type = event::entity_type::CONVERSION_RECORD,
            event.entity_id = %record.id(),
            event.result = event::result::SUCCESS,
            conversion.resume_from = record.current_step_index(),
            "コンバージョンの実行を開始"
        );

        let context = StepContext {
            conversion_id: record.id().clone(),
            lead,
        };

        while record.status() == ConversionStatus::InProgress {
            let index = record.current_step_index();

            if cancel.is_cancelled() {
                self.publish(&record, ConversionEventKind::Cancelled { index });
                log_business_event!(
                    event.category = event::category::CONVERSION,
                    event.action = event::action::CONVERSION_CANCELLED,
                    event.entity_type = event::entity_type::CONVERSION_RECORD,
                    event.entity_id = %record.id(),
                    event.result = event::result::SUCCESS,
                    conversion.current_step_index = index,
                    "コンバージョンの実行をキャンセル"
                );
                return Ok(record);
            }

            let handler = self.pipeline.handler(index).ok_or_else(|| {
                CoreError::Internal(format!("ステップ {index} のハンドラがありません"))
            })?;
            let step_id = handler.step_id();
            let definition = step_id.definition();

            // 中断された実行の再開では、実行中のステップをそのまま再実行する
            if record.steps()[index].status() == StepStatus::Pending {
                let expected = record.version();
                let next = record.step_started(index, self.clock.now())?;
                record = self.save(next, expected).await?;
            }
            self.publish(&record, ConversionEventKind::StepStarted { index, step_id });

            match self.run_step(handler.as_ref(), definition, &context).await {
                Ok(()) => {
                    let expected = record.version();
                    let next = record.step_completed(index, self.clock.now())?;
                    record = self.save(next, expected).await?;
                    tracing::debug!(step.id = %step_id, step.index = index, "ステップ完了");
                    self.publish(&record, ConversionEventKind::StepCompleted { index, step_id });
                }
                Err(e) => {
                    let message = e.to_string();
                    if definition.required {
                        tracing::error!(
                            step.id = %step_id,
                            step.index = index,
                            error.kind = e.kind(),
                            "必須ステップが失敗: {}",
                            message
                        );
                    } else {
                        tracing::warn!(
                            step.id = %step_id,
                            step.index = index,
                            error.kind = e.kind(),
                            "任意ステップが失敗: {}",
                            message
                        );
                    }

                    let expected = record.version();
                    let next = record.step_failed(index, message.clone(), self.clock.now())?;
                    record = self.save(next, expected).await?;
                    self.publish(
                        &record,
                        ConversionEventKind::StepFailed {
                            index,
                            step_id,
                            required: definition.required,
                            message: message.clone(),
                        },
                    );
                    self.publish(&record, ConversionEventKind::Failed {
                        message: message.clone(),
                    });
                    log_business_event!(
                        event.category = event::category::CONVERSION,
                        event.action = event::action::CONVERSION_FAILED,
                        event.entity_type = event::entity_type::CONVERSION_RECORD,
                        event.entity_id = %record.id(),
                        event.result = event::result::FAILURE,
                        step.id = %step_id,
                        error.kind = e.kind(),
                        "コンバージョンが失敗: {}",
                        message
                    );
                }
            }
        }

        if let Some(customer_id) = record.customer_id() {
            self.publish(&record, ConversionEventKind::Completed {
                customer_id: customer_id.clone(),
            });
            log_business_event!(
                event.category = event::category::CONVERSION,
                event.action = event::action::CONVERSION_COMPLETED,
                event.entity_type = event::entity_type::CONVERSION_RECORD,
                event.entity_id = %record.id(),
                event.result = event::result::SUCCESS,
                customer.id = %customer_id,
                "コンバージョンが完了"
            );
        }

        Ok(record)
    }

    /// ステップの制限時間
    fn timeout_for(&self, definition: &ConversionStepDefinition) -> Duration {
        self.settings.step_timeout.unwrap_or_else(|| {
            Duration::from_secs(u64::from(definition.estimated_duration_minutes) * 60)
        })
    }

    async fn run_step(
        &self,
        handler: &dyn ConversionStepHandler,
        definition: &ConversionStepDefinition,
        context: &StepContext,
    ) -> Result<(), ConversionStepError> {
        let limit = self.timeout_for(definition);
        let delay = self.settings.step_delay;

        let work = async {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            handler.run(context).await
        };

        match tokio::time::timeout(limit, work).await {
            Ok(result) => result,
            Err(_) => Err(ConversionStepError::Timeout {
                step_id: definition.id,
                seconds: limit.as_secs(),
            }),
        }
    }

    async fn save(
        &self,
        record: ConversionRecord,
        expected: Version,
    ) -> Result<ConversionRecord, CoreError> {
        self.repository
            .update_with_version_check(&record, expected)
            .await?;
        Ok(record)
    }

    fn publish(&self, record: &ConversionRecord, kind: ConversionEventKind) {
        self.events
            .publish(ConversionEvent::new(record, kind, self.clock.now()));
    }
}
