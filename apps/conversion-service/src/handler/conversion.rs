//! # コンバージョン API ハンドラ
//!
//! コンバージョンレコードの作成・照会・実行制御のエンドポイントを実装する。

use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        IntoResponse,
        Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use chrono::{DateTime, Utc};
use leadconv_domain::{
    conversion::{ConversionId, ConversionRecord, ConversionStatus, StepInstance, StepStatus},
    lead::LeadId,
};
use leadconv_shared::ApiResponse;
use serde::{Deserialize, Serialize};
use tokio_stream::{
    Stream,
    StreamExt as _,
    wrappers::{BroadcastStream, errors::BroadcastStreamRecvError},
};
use uuid::Uuid;

use crate::{error::CoreError, usecase::ConversionUseCaseImpl};

/// コンバージョンハンドラの State
pub struct ConversionAppState {
    pub usecase: ConversionUseCaseImpl,
}

/// コンバージョン作成リクエスト
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversionRequest {
    pub lead_id: String,
}

/// 一覧のクエリパラメータ
#[derive(Debug, Deserialize)]
pub struct ListConversionsQuery {
    /// ステータスで絞り込む（`not_started` など）
    pub status: Option<String>,
}

/// ステップインスタンス DTO
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepInstanceDto {
    pub step_id:       String,
    pub title:         &'static str,
    pub required:      bool,
    pub status:        StepStatus,
    pub started_at:    Option<DateTime<Utc>>,
    pub completed_at:  Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl From<&StepInstance> for StepInstanceDto {
    fn from(step: &StepInstance) -> Self {
        let definition = step.step_id().definition();
        Self {
            step_id:       step.step_id().to_string(),
            title:         definition.title,
            required:      definition.required,
            status:        step.status(),
            started_at:    step.started_at(),
            completed_at:  step.completed_at(),
            error_message: step.error_message().map(str::to_string),
        }
    }
}

/// コンバージョンレコード DTO
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionRecordDto {
    pub id:                 String,
    pub lead_id:            String,
    pub status:             ConversionStatus,
    pub current_step_index: usize,
    pub total_steps:        usize,
    pub assigned_to:        String,
    pub started_at:         Option<DateTime<Utc>>,
    pub completed_at:       Option<DateTime<Utc>>,
    pub customer_id:        Option<String>,
    pub validation_errors:  Vec<String>,
    pub steps:              Vec<StepInstanceDto>,
    pub version:            u32,
    pub created_at:         DateTime<Utc>,
    pub updated_at:         DateTime<Utc>,
}

impl From<&ConversionRecord> for ConversionRecordDto {
    fn from(record: &ConversionRecord) -> Self {
        Self {
            id:                 record.id().to_string(),
            lead_id:            record.lead_id().to_string(),
            status:             record.status(),
            current_step_index: record.current_step_index(),
            total_steps:        record.total_steps(),
            assigned_to:        record.assigned_to().to_string(),
            started_at:         record.started_at(),
            completed_at:       record.completed_at(),
            customer_id:        record.customer_id().map(ToString::to_string),
            validation_errors:  record.validation_errors().to_vec(),
            steps:              record.steps().iter().map(StepInstanceDto::from).collect(),
            version:            record.version().as_u32(),
            created_at:         record.created_at(),
            updated_at:         record.updated_at(),
        }
    }
}

/// コンバージョンを作成し、実行を開始する
///
/// ## エンドポイント
/// POST /conversions
///
/// ## 処理フロー
/// 1. リクエストからリード ID を取得
/// 2. レコードを作成してバックグラウンド実行を開始
/// 3. 作成時点のレコードを 201 で返す
pub async fn create_conversion(
    State(state): State<Arc<ConversionAppState>>,
    Json(req): Json<CreateConversionRequest>,
) -> Result<Response, CoreError> {
    let lead_id = LeadId::new(req.lead_id)?;

    let record = state.usecase.start_conversion(&lead_id).await?;

    let response = ApiResponse::new(ConversionRecordDto::from(&record));
    Ok((StatusCode::CREATED, Json(response)).into_response())
}

/// コンバージョンを取得する
///
/// ## エンドポイント
/// GET /conversions/{id}
pub async fn get_conversion(
    State(state): State<Arc<ConversionAppState>>,
    Path(id): Path<Uuid>,
) -> Result<Response, CoreError> {
    let record = state.usecase.get(&ConversionId::from_uuid(id)).await?;

    let response = ApiResponse::new(ConversionRecordDto::from(&record));
    Ok((StatusCode::OK, Json(response)).into_response())
}

/// コンバージョン一覧を取得する
///
/// ## エンドポイント
/// GET /conversions?status={status}
///
/// ## 処理フロー
/// 1. ステータスを解釈（不明な値は 400）
/// 2. 作成順の一覧を返す
pub async fn list_conversions(
    State(state): State<Arc<ConversionAppState>>,
    Query(query): Query<ListConversionsQuery>,
) -> Result<Response, CoreError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<ConversionStatus>)
        .transpose()?;

    let records = state.usecase.list(status).await?;

    let response = ApiResponse::new(
        records
            .iter()
            .map(ConversionRecordDto::from)
            .collect::<Vec<_>>(),
    );
    Ok((StatusCode::OK, Json(response)).into_response())
}

/// 失敗したコンバージョンを未開始に戻す
///
/// ## エンドポイント
/// POST /conversions/{id}/retry
///
/// 失敗以外のレコードには 409 を返し、レコードは変更しない。
pub async fn retry_conversion(
    State(state): State<Arc<ConversionAppState>>,
    Path(id): Path<Uuid>,
) -> Result<Response, CoreError> {
    let record = state.usecase.retry(&ConversionId::from_uuid(id)).await?;

    let response = ApiResponse::new(ConversionRecordDto::from(&record));
    Ok((StatusCode::OK, Json(response)).into_response())
}

/// コンバージョンの実行を開始（再開）する
///
/// ## エンドポイント
/// POST /conversions/{id}/execute
///
/// ## 処理フロー
/// 1. 実行中でないこと、終端状態でないことを確認（違反は 409）
/// 2. バックグラウンド実行を開始
/// 3. 開始時点のレコードを 202 で返す
pub async fn execute_conversion(
    State(state): State<Arc<ConversionAppState>>,
    Path(id): Path<Uuid>,
) -> Result<Response, CoreError> {
    let (record, _handle) = state.usecase.spawn(&ConversionId::from_uuid(id)).await?;

    let response = ApiResponse::new(ConversionRecordDto::from(&record));
    Ok((StatusCode::ACCEPTED, Json(response)).into_response())
}

/// 実行中のコンバージョンにキャンセルを要求する
///
/// ## エンドポイント
/// POST /conversions/{id}/cancel
///
/// 実行中でなければ 409 を返す。
pub async fn cancel_conversion(
    State(state): State<Arc<ConversionAppState>>,
    Path(id): Path<Uuid>,
) -> Result<Response, CoreError> {
    let record = state.usecase.cancel(&ConversionId::from_uuid(id)).await?;

    let response = ApiResponse::new(ConversionRecordDto::from(&record));
    Ok((StatusCode::ACCEPTED, Json(response)).into_response())
}

/// 実行中のコンバージョンの進捗を Server-Sent Events で配信する
///
/// ## エンドポイント
/// GET /conversions/{id}/events
///
/// イベント名は種別（`step_completed` など）、データは進捗イベントの JSON。
/// 実行が終わるとストリームも終わる。実行中でなければ 409 を返す。
pub async fn stream_conversion_events(
    State(state): State<Arc<ConversionAppState>>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, CoreError> {
    let receiver = state
        .usecase
        .subscribe(&ConversionId::from_uuid(id))
        .await?;

    let stream = BroadcastStream::new(receiver).filter_map(|received| match received {
        Ok(event) => {
            let name: &'static str = (&event.kind).into();
            match Event::default().event(name).json_data(&event) {
                Ok(sse) => Some(Ok(sse)),
                Err(e) => {
                    tracing::warn!(error = %e, "進捗イベントのシリアライズに失敗");
                    None
                }
            }
        }
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            tracing::warn!(skipped, "進捗イベントを取りこぼした");
            None
        }
    });

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    ))
}
