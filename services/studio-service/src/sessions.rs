use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use ipf_api_types::{
    AnswerRequest, PilAttachRequest, PilTerms, QuestionView, SessionCreateRequest, SessionView,
    SubmitReceiptView, SubmitResponse, SummaryView, ip_to_wei,
};
use ipf_cards::{CardConfig, Question, find_card};
use ipf_protocol_client::TxReceipt;
use ipf_submit::{SubmitError, SubmitOutcome};
use ipf_wizard::{SessionError, WizardEffect, WizardSession};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::{
    ApiResult, AppState, ErrorResponse, bad_gateway, bad_request, conflict, not_found,
};

#[derive(Debug, Serialize)]
pub(crate) struct CardListResponse {
    cards: Vec<CardConfig>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SessionCancelResponse {
    session_id: Uuid,
    cancelled: bool,
}

pub(crate) async fn list_cards() -> Json<CardListResponse> {
    Json(CardListResponse {
        cards: ipf_cards::catalog(),
    })
}

pub(crate) async fn get_card(Path(card_id): Path<String>) -> ApiResult<CardConfig> {
    match find_card(&card_id) {
        Ok(card) => Ok(Json(card)),
        Err(err) => Err(not_found(&err.to_string())),
    }
}

pub(crate) async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SessionCreateRequest>,
) -> ApiResult<SessionView> {
    let card = find_card(&request.card_id).map_err(|err| bad_request(&err.to_string()))?;
    let session_id = Uuid::new_v4();
    let session = WizardSession::new(card);
    let view = session_view(session_id, &session, &[]);
    state.sessions.write().await.insert(session_id, session);
    info!(%session_id, card_id = %request.card_id, "wizard session opened");
    Ok(Json(view))
}

pub(crate) async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<SessionView> {
    let sessions = state.sessions.read().await;
    let session = sessions.get(&id).ok_or_else(|| not_found("session not found"))?;
    Ok(Json(session_view(id, session, &[])))
}

pub(crate) async fn cancel_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<SessionCancelResponse> {
    if state.sessions.write().await.remove(&id).is_none() {
        return Err(not_found("session not found"));
    }
    info!(session_id = %id, "wizard session cancelled");
    Ok(Json(SessionCancelResponse {
        session_id: id,
        cancelled: true,
    }))
}

pub(crate) async fn answer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<AnswerRequest>,
) -> ApiResult<SessionView> {
    let mut sessions = state.sessions.write().await;
    let session = sessions.get_mut(&id).ok_or_else(|| not_found("session not found"))?;
    let effects = session
        .answer(&request.question_id, request.value)
        .map_err(session_error)?;
    Ok(Json(session_view(id, session, &effects)))
}

pub(crate) async fn next_step(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<SessionView> {
    let mut sessions = state.sessions.write().await;
    let session = sessions.get_mut(&id).ok_or_else(|| not_found("session not found"))?;
    session.next().map_err(session_error)?;
    Ok(Json(session_view(id, session, &[])))
}

pub(crate) async fn back_step(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<SessionView> {
    let mut sessions = state.sessions.write().await;
    let session = sessions.get_mut(&id).ok_or_else(|| not_found("session not found"))?;
    session.back().map_err(session_error)?;
    Ok(Json(session_view(id, session, &[])))
}

pub(crate) async fn attach_pil(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<PilAttachRequest>,
) -> ApiResult<SessionView> {
    let mut terms = resolve_terms(&request)?;
    if let Some(fee) = &request.minting_fee_ip {
        if ip_to_wei(fee).is_none() {
            return Err(bad_request("minting_fee_ip must be a decimal IP amount"));
        }
        terms = terms.with_minting_fee(fee);
    }

    let mut sessions = state.sessions.write().await;
    let session = sessions.get_mut(&id).ok_or_else(|| not_found("session not found"))?;
    session.attach_pil(terms).map_err(session_error)?;
    Ok(Json(session_view(id, session, &[])))
}

/// Turns an attach request into terms: a full custom object wins, otherwise
/// one of the three named templates is expanded.
fn resolve_terms(
    request: &PilAttachRequest,
) -> Result<PilTerms, (StatusCode, Json<ErrorResponse>)> {
    if let Some(custom) = &request.custom {
        return Ok(custom.clone());
    }
    match request.template.as_deref() {
        Some("Non-commercial social remixing") => Ok(PilTerms::non_commercial_social_remixing()),
        Some("Commercial use") => Ok(PilTerms::commercial_use()),
        Some("Commercial remix") => {
            let share = request
                .rev_share_percent
                .ok_or_else(|| bad_request("Commercial remix needs rev_share_percent"))?;
            if share > 100 {
                return Err(bad_request("rev_share_percent must be at most 100"));
            }
            Ok(PilTerms::commercial_remix(share))
        }
        Some(other) => Err(bad_request(&format!("unknown PIL template '{other}'"))),
        None => Err(bad_request("either template or custom terms are required")),
    }
}

pub(crate) async fn clear_pil(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<SessionView> {
    let mut sessions = state.sessions.write().await;
    let session = sessions.get_mut(&id).ok_or_else(|| not_found("session not found"))?;
    session.clear_pil();
    Ok(Json(session_view(id, session, &[])))
}

pub(crate) async fn register_more(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<SessionView> {
    let mut sessions = state.sessions.write().await;
    let session = sessions.get_mut(&id).ok_or_else(|| not_found("session not found"))?;
    session.register_more().map_err(session_error)?;
    Ok(Json(session_view(id, session, &[])))
}

pub(crate) async fn summary(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<SummaryView> {
    let sessions = state.sessions.read().await;
    let session = sessions.get(&id).ok_or_else(|| not_found("session not found"))?;
    Ok(Json(session.summary()))
}

pub(crate) async fn submit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<SubmitResponse> {
    // The plan is built under the lock, the protocol calls run outside it.
    let plan = {
        let mut sessions = state.sessions.write().await;
        let session = sessions.get_mut(&id).ok_or_else(|| not_found("session not found"))?;
        session.begin_submit().map_err(session_error)?
    };

    match state.router.dispatch(&plan).await {
        Ok(outcome) => {
            state.sessions.write().await.remove(&id);
            info!(session_id = %id, function = %plan.function, "submission settled");
            Ok(Json(submit_response(&plan, &outcome)))
        }
        Err(err) => {
            if let Some(session) = state.sessions.write().await.get_mut(&id) {
                session.submit_failed();
            }
            Err(submit_error(err))
        }
    }
}

fn session_view(id: Uuid, session: &WizardSession, effects: &[WizardEffect]) -> SessionView {
    let visible = session.visible_questions();
    SessionView {
        session_id: id.to_string(),
        card_id: session.card().id.clone(),
        card_title: session.card().title.clone(),
        step: session.step(),
        visible_steps: visible.len(),
        question: session.current_question().map(|q| question_view(session, q)),
        can_go_next: session.can_go_next(),
        is_review: session.is_review(),
        batch_len: session.batch_len(),
        pil_attached: session.pil().is_some(),
        effects: effects.iter().map(|e| e.as_str().to_owned()).collect(),
    }
}

fn question_view(session: &WizardSession, question: &Question) -> QuestionView {
    QuestionView {
        id: question.id.clone(),
        prompt: question.prompt.clone(),
        control: question.kind.control_name().to_owned(),
        options: question.kind.options().to_vec(),
        required: session.rule_for(question).required,
    }
}

pub(crate) fn receipt_view(receipt: &TxReceipt) -> SubmitReceiptView {
    SubmitReceiptView {
        tx_hash: receipt.tx_hash.0.clone(),
        ip_id: receipt.ip_id.as_ref().map(|id| id.0.clone()),
        token_id: receipt.token_id.as_ref().map(|t| t.0),
        license_terms_ids: receipt.license_terms_ids.iter().map(|t| t.0).collect(),
    }
}

fn submit_response(plan: &ipf_wizard::SubmitPlan, outcome: &SubmitOutcome) -> SubmitResponse {
    SubmitResponse {
        function: plan.function.as_str().to_owned(),
        receipts: outcome.receipts().iter().map(receipt_view).collect(),
        listing: match outcome {
            SubmitOutcome::Listed(listing) => Some(listing.clone()),
            SubmitOutcome::Receipts(_) => None,
        },
    }
}

fn session_error(err: SessionError) -> (StatusCode, Json<ErrorResponse>) {
    match err {
        SessionError::SubmitInProgress => conflict(&err.to_string()),
        _ => bad_request(&err.to_string()),
    }
}

fn submit_error(err: SubmitError) -> (StatusCode, Json<ErrorResponse>) {
    match err {
        SubmitError::Market(inner) => crate::market::market_error(inner),
        SubmitError::Client(_) => bad_gateway(err),
        SubmitError::Batch {
            completed, index, source,
        } => (
            StatusCode::BAD_GATEWAY,
            Json(ErrorResponse {
                error: format!(
                    "batch entry {index} failed after {} registered: {source}",
                    completed.len()
                ),
                partial_receipts: Some(completed.iter().map(receipt_view).collect()),
            }),
        ),
        _ => bad_request(&err.to_string()),
    }
}
