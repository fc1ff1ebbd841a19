//! # リード API ハンドラ

use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use leadconv_domain::{
    lead::{Lead, LeadId, LeadStatus},
    value_objects::TerritoryManagerId,
};
use leadconv_shared::ApiResponse;
use serde::{Deserialize, Serialize};

use crate::{
    error::CoreError,
    usecase::{LeadUseCaseImpl, RegisterLeadInput},
};

/// リードハンドラの State
pub struct LeadAppState {
    pub usecase: LeadUseCaseImpl,
}

/// リード登録リクエスト
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLeadRequest {
    pub id:           String,
    pub company_name: String,
    pub contact_name: String,
    pub email:        String,
    pub phone:        Option<String>,
    pub region:       String,
    /// 省略時は `qualified`
    pub status:       Option<String>,
    pub assigned_to:  String,
}

#[derive(Debug, Deserialize)]
pub struct ListLeadsQuery {
    /// `true` ならコンバージョン対象のリードだけを返す
    #[serde(default)]
    pub eligible: bool,
}

/// リード DTO
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadDto {
    pub id:           String,
    pub company_name: String,
    pub contact_name: String,
    pub email:        String,
    pub phone:        Option<String>,
    pub region:       String,
    pub status:       LeadStatus,
    pub assigned_to:  String,
    pub eligible:     bool,
    pub created_at:   DateTime<Utc>,
}

impl From<&Lead> for LeadDto {
    fn from(lead: &Lead) -> Self {
        Self {
            id:           lead.id().to_string(),
            company_name: lead.company_name().to_string(),
            contact_name: lead.contact_name().to_string(),
            email:        lead.email().to_string(),
            phone:        lead.phone().map(str::to_string),
            region:       lead.region().to_string(),
            status:       lead.status(),
            assigned_to:  lead.assigned_to().to_string(),
            eligible:     lead.is_eligible_for_conversion(),
            created_at:   lead.created_at(),
        }
    }
}

/// リードを登録する
///
/// ## エンドポイント
/// POST /leads
pub async fn create_lead(
    State(state): State<Arc<LeadAppState>>,
    Json(req): Json<CreateLeadRequest>,
) -> Result<Response, CoreError> {
    let status = match req.status.as_deref() {
        Some(value) => value
            .parse::<LeadStatus>()
            .map_err(|_| CoreError::BadRequest(format!("不正なリードステータス: {value}")))?,
        None => LeadStatus::Qualified,
    };

    let input = RegisterLeadInput {
        id: LeadId::new(req.id)?,
        company_name: req.company_name,
        contact_name: req.contact_name,
        email: req.email,
        phone: req.phone,
        region: req.region,
        status,
        assigned_to: TerritoryManagerId::new(req.assigned_to)?,
    };
    let lead = state.usecase.register(input).await?;

    let response = ApiResponse::new(LeadDto::from(&lead));
    Ok((StatusCode::CREATED, Json(response)).into_response())
}

/// リード一覧を取得する
///
/// ## エンドポイント
/// GET /leads?eligible=true
pub async fn list_leads(
    State(state): State<Arc<LeadAppState>>,
    Query(query): Query<ListLeadsQuery>,
) -> Result<Response, CoreError> {
    let leads = state.usecase.list(query.eligible).await?;

    let response = ApiResponse::new(leads.iter().map(LeadDto::from).collect::<Vec<_>>());
    Ok((StatusCode::OK, Json(response)).into_response())
}
