use axum::{Json, extract::State};
use ipf_api_types::{IP_DECIMALS, ProtocolConfigResponse};
use ipf_market::NETWORK_FEE_IP;
use std::sync::Arc;

use crate::AppState;

/// Protocol parameters the dashboard needs before any session exists:
/// which Loreweave chain this deployment talks to and how amounts are
/// denominated. Serving them from the service keeps clients free of
/// per-environment constants.
pub(crate) async fn protocol_config(
    State(state): State<Arc<AppState>>,
) -> Json<ProtocolConfigResponse> {
    Json(ProtocolConfigResponse {
        chain_slug: state.config.chain_slug().to_owned(),
        native_symbol: "IP".to_owned(),
        decimals: IP_DECIMALS,
        network_fee_ip: NETWORK_FEE_IP,
        environment: state.config.environment.clone(),
    })
}
