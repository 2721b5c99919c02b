use axum::{Json, extract::State};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use ipf_api_types::{UploadFileRequest, UploadJsonRequest, UploadResponse};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::{ApiResult, AppState, bad_gateway, bad_request, internal_error, to_hex};

#[derive(Debug, Deserialize)]
struct PinnerResponse {
    uri: String,
}

#[derive(Debug, Serialize)]
struct PinFileBody<'a> {
    file_name: &'a str,
    media_type: &'a str,
    content_base64: &'a str,
}

/// Pins an IP metadata document. Without a configured pinning service the
/// document is not stored anywhere; the returned URI is derived from the
/// content hash so downstream registration stays deterministic.
pub(crate) async fn upload_json(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UploadJsonRequest>,
) -> ApiResult<UploadResponse> {
    if request.content.is_null() {
        return Err(bad_request("content is required"));
    }
    let body = serde_json::to_vec(&request.content).map_err(internal_error)?;
    let content_hash = to_hex(&Sha256::digest(&body));

    let uri = match &state.config.pinning_url {
        Some(endpoint) => pin_remote(&state, endpoint, "/pins/json", &request.content).await?,
        None => {
            debug!("IPF_PINNING_URL not set; returning content-addressed uri");
            format!("ipfs://{content_hash}")
        }
    };
    Ok(Json(UploadResponse { uri, content_hash }))
}

pub(crate) async fn upload_file(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UploadFileRequest>,
) -> ApiResult<UploadResponse> {
    if request.file_name.trim().is_empty() {
        return Err(bad_request("file_name is required"));
    }
    let bytes = STANDARD
        .decode(request.content_base64.as_bytes())
        .map_err(|_| bad_request("content_base64 must be valid base64"))?;
    if bytes.is_empty() {
        return Err(bad_request("file content is empty"));
    }
    let content_hash = to_hex(&Sha256::digest(&bytes));

    let uri = match &state.config.pinning_url {
        Some(endpoint) => {
            let body = PinFileBody {
                file_name: &request.file_name,
                media_type: &request.media_type,
                content_base64: &request.content_base64,
            };
            pin_remote(&state, endpoint, "/pins/file", &body).await?
        }
        None => {
            debug!("IPF_PINNING_URL not set; returning content-addressed uri");
            format!("ipfs://{content_hash}")
        }
    };
    Ok(Json(UploadResponse { uri, content_hash }))
}

async fn pin_remote<B: Serialize>(
    state: &AppState,
    endpoint: &str,
    path: &str,
    body: &B,
) -> Result<String, (axum::http::StatusCode, Json<crate::ErrorResponse>)> {
    let url = format!("{}{}", endpoint.trim_end_matches('/'), path);
    let response = state
        .http
        .post(&url)
        .json(body)
        .send()
        .await
        .map_err(bad_gateway)?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        warn!(%status, "pinning upload rejected");
        return Err(bad_gateway(format!(
            "pinning service returned {status}: {text}"
        )));
    }
    let parsed: PinnerResponse = response.json().await.map_err(bad_gateway)?;
    Ok(parsed.uri)
}
