use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use ipf_api_types::{
    EvmAddress, IpId, ListingCreateRequest, ListingStatus, PurchaseRequest, PurchaseResponse,
    RoyaltyListing, TokenId,
};
use ipf_market::{MarketError, NewListing};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{
    ApiResult, AppState, ErrorResponse, bad_gateway, bad_request, conflict, internal_error,
    not_found,
};

#[derive(Debug, Deserialize)]
pub(crate) struct ListingsQuery {
    status: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ListingsResponse {
    listings: Vec<RoyaltyListing>,
}

pub(crate) fn market_error(err: MarketError) -> (StatusCode, Json<ErrorResponse>) {
    match err {
        MarketError::NotFound(_) => not_found(&err.to_string()),
        MarketError::AlreadySold(_) => conflict(&err.to_string()),
        MarketError::Transfer { .. } => bad_gateway(err.user_message()),
        MarketError::Store(_) => internal_error(err),
        _ => bad_request(&err.to_string()),
    }
}

pub(crate) async fn list_listings(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListingsQuery>,
) -> ApiResult<ListingsResponse> {
    let wanted = match query.status.as_deref() {
        None => None,
        Some("active") => Some(ListingStatus::Active),
        Some("sold") => Some(ListingStatus::Sold),
        Some(other) => {
            return Err(bad_request(&format!(
                "status must be 'active' or 'sold', got '{other}'"
            )));
        }
    };

    let mut listings = state.market.listings().await.map_err(market_error)?;
    if let Some(status) = wanted {
        listings.retain(|l| l.status == status);
    }
    Ok(Json(ListingsResponse { listings }))
}

pub(crate) async fn create_listing(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ListingCreateRequest>,
) -> ApiResult<RoyaltyListing> {
    let new = NewListing {
        ip_id: IpId::parse(&request.ip_id).map_err(|err| bad_request(&err.to_string()))?,
        royalty_vault: EvmAddress::parse(&request.royalty_vault)
            .map_err(|err| bad_request(&err.to_string()))?,
        nft_contract: EvmAddress::parse(&request.nft_contract)
            .map_err(|err| bad_request(&err.to_string()))?,
        nft_token_id: TokenId(request.nft_token_id),
        percentage_to_sell: request.percentage_to_sell,
        price_per_token_ip: request.price_per_token_ip,
    };
    let listing = state.market.create_listing(new).await.map_err(market_error)?;
    Ok(Json(listing))
}

pub(crate) async fn purchase(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<PurchaseRequest>,
) -> ApiResult<PurchaseResponse> {
    let buyer = EvmAddress::parse(&request.buyer).map_err(|err| bad_request(&err.to_string()))?;
    let outcome = state
        .market
        .purchase(
            &id,
            buyer,
            request.percentage,
            request.accepted_terms,
            request.read_ratio,
        )
        .await
        .map_err(market_error)?;

    Ok(Json(PurchaseResponse {
        listing_id: outcome.listing.id,
        tx_hash: outcome.tx_hash.0,
        percentage: outcome.quote.percentage,
        token_cost_ip: outcome.quote.token_cost_ip,
        network_fee_ip: outcome.quote.network_fee_ip,
        total_ip: outcome.quote.total_ip,
        status: outcome.listing.status,
    }))
}
