use anyhow::{Context, Result};
use async_trait::async_trait;
use ipf_api_types::{IpMetadata, PilTerms};
use ipf_protocol_client::{
    AttachTermsRequest, ClaimRevenueRequest, DerivativeWithTokensRequest,
    MintAndRegisterDerivativeRequest, MintAndRegisterIpRequest, MintLicenseTokensRequest,
    PayRoyaltyRequest, ProtocolClient, RegisterDerivativeRequest, RegisterIpRequest,
    TransferRoyaltyTokensRequest, TxReceipt,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const LOREWEAVE_TESTNET: &str = "loreweave-testnet";
pub const LOREWEAVE_MAINNET: &str = "loreweave-mainnet";

/// HTTP client for a Loreweave protocol gateway node.
///
/// Reads `LOREWEAVE_GATEWAY_URL` from environment at construction time
/// (default: `http://localhost:3100`).
pub struct LoreweaveGateway {
    chain: String,
    endpoint: String,
    http: reqwest::Client,
}

impl LoreweaveGateway {
    pub fn new(chain: impl Into<String>, endpoint: Option<String>) -> Self {
        let endpoint = endpoint
            .or_else(|| std::env::var("LOREWEAVE_GATEWAY_URL").ok())
            .unwrap_or_else(|| "http://localhost:3100".to_string());
        Self {
            chain: chain.into(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn testnet() -> Self {
        Self::new(LOREWEAVE_TESTNET, None)
    }

    async fn post<B: Serialize>(&self, path: &str, body: &B, op: &'static str) -> Result<TxReceipt> {
        let url = format!("{}{}", self.endpoint, path);
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("loreweave {op} transport"))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        debug!(op, %status, "loreweave gateway response");

        if !status.is_success() {
            // Chain revert text arrives as {"error": "..."}. Surface it
            // verbatim so callers can match on the revert message.
            if let Ok(err) = serde_json::from_str::<GatewayErrorResponse>(&text) {
                anyhow::bail!("{}", err.error);
            }
            anyhow::bail!("loreweave {op} HTTP {status}: {text}");
        }

        let receipt: ReceiptResponse =
            serde_json::from_str(&text).with_context(|| format!("loreweave {op} parse"))?;
        Ok(receipt.into())
    }
}

// ── Loreweave gateway REST API types ─────────────────────────────────

#[derive(Debug, Serialize)]
struct RegisterIpBody {
    nft_contract: String,
    nft_token_id: u64,
    metadata: IpMetadata,
}

#[derive(Debug, Serialize)]
struct MintAndRegisterBody {
    spg_collection: String,
    metadata: IpMetadata,
    pil: Option<PilTerms>,
}

#[derive(Debug, Serialize)]
struct RegisterDerivativeBody {
    child_ip_id: String,
    parent_ip_ids: Vec<String>,
    license_terms_ids: Vec<u64>,
}

#[derive(Debug, Serialize)]
struct MintDerivativeBody {
    spg_collection: String,
    metadata: IpMetadata,
    parent_ip_ids: Vec<String>,
    license_terms_ids: Vec<u64>,
}

#[derive(Debug, Serialize)]
struct DerivativeWithTokensBody {
    child_ip_id: String,
    license_token_ids: Vec<u64>,
}

#[derive(Debug, Serialize)]
struct AttachTermsBody {
    ip_id: String,
    license_terms_id: u64,
}

#[derive(Debug, Serialize)]
struct MintLicenseTokensBody {
    licensor_ip_id: String,
    license_terms_id: u64,
    amount: u64,
    receiver: String,
}

#[derive(Debug, Serialize)]
struct TransferRoyaltyBody {
    ip_id: String,
    royalty_vault: String,
    to: String,
    // Decimal string: wei amounts do not fit a JSON number.
    amount_wei: String,
}

#[derive(Debug, Serialize)]
struct ClaimRevenueBody {
    ancestor_ip_id: String,
    claimer: String,
    child_ip_ids: Vec<String>,
    from_snapshots: bool,
    from_wallet_balance: bool,
}

#[derive(Debug, Serialize)]
struct PayRoyaltyBody {
    receiver_ip_id: String,
    payer_ip_id: Option<String>,
    amount_wei: String,
}

#[derive(Debug, Deserialize)]
struct GatewayErrorResponse {
    error: String,
}

#[derive(Debug, Deserialize)]
struct ReceiptResponse {
    tx_hash: String,
    ip_id: Option<String>,
    token_id: Option<u64>,
    #[serde(default)]
    license_terms_ids: Vec<u64>,
}

impl From<ReceiptResponse> for TxReceipt {
    fn from(body: ReceiptResponse) -> Self {
        TxReceipt {
            tx_hash: ipf_api_types::TxHash(body.tx_hash),
            ip_id: body.ip_id.map(ipf_api_types::IpId),
            token_id: body.token_id.map(ipf_api_types::TokenId),
            license_terms_ids: body
                .license_terms_ids
                .into_iter()
                .map(ipf_api_types::LicenseTermsId)
                .collect(),
        }
    }
}

#[async_trait]
impl ProtocolClient for LoreweaveGateway {
    fn chain(&self) -> &str {
        &self.chain
    }

    async fn register_ip(&self, req: RegisterIpRequest) -> Result<TxReceipt> {
        let body = RegisterIpBody {
            nft_contract: req.nft_contract.0,
            nft_token_id: req.nft_token_id.0,
            metadata: req.metadata,
        };
        self.post("/ip/register", &body, "register_ip").await
    }

    async fn mint_and_register_ip(&self, req: MintAndRegisterIpRequest) -> Result<TxReceipt> {
        let body = MintAndRegisterBody {
            spg_collection: req.spg_collection.0,
            metadata: req.metadata,
            pil: req.pil,
        };
        self.post("/ip/mint-register", &body, "mint_and_register_ip")
            .await
    }

    async fn register_derivative(&self, req: RegisterDerivativeRequest) -> Result<TxReceipt> {
        let body = RegisterDerivativeBody {
            child_ip_id: req.child_ip_id.0,
            parent_ip_ids: req.parent_ip_ids.into_iter().map(|p| p.0).collect(),
            license_terms_ids: req.license_terms_ids.into_iter().map(|t| t.0).collect(),
        };
        self.post("/derivative/register", &body, "register_derivative")
            .await
    }

    async fn mint_and_register_derivative(
        &self,
        req: MintAndRegisterDerivativeRequest,
    ) -> Result<TxReceipt> {
        let body = MintDerivativeBody {
            spg_collection: req.spg_collection.0,
            metadata: req.metadata,
            parent_ip_ids: req.parent_ip_ids.into_iter().map(|p| p.0).collect(),
            license_terms_ids: req.license_terms_ids.into_iter().map(|t| t.0).collect(),
        };
        self.post(
            "/derivative/mint-register",
            &body,
            "mint_and_register_derivative",
        )
        .await
    }

    async fn register_derivative_with_license_tokens(
        &self,
        req: DerivativeWithTokensRequest,
    ) -> Result<TxReceipt> {
        let body = DerivativeWithTokensBody {
            child_ip_id: req.child_ip_id.0,
            license_token_ids: req.license_token_ids.into_iter().map(|t| t.0).collect(),
        };
        self.post(
            "/derivative/register-with-tokens",
            &body,
            "register_derivative_with_license_tokens",
        )
        .await
    }

    async fn register_pil_terms(&self, terms: PilTerms) -> Result<TxReceipt> {
        self.post("/license/terms/register", &terms, "register_pil_terms")
            .await
    }

    async fn attach_license_terms(&self, req: AttachTermsRequest) -> Result<TxReceipt> {
        let body = AttachTermsBody {
            ip_id: req.ip_id.0,
            license_terms_id: req.license_terms_id.0,
        };
        self.post("/license/terms/attach", &body, "attach_license_terms")
            .await
    }

    async fn mint_license_tokens(&self, req: MintLicenseTokensRequest) -> Result<TxReceipt> {
        let body = MintLicenseTokensBody {
            licensor_ip_id: req.licensor_ip_id.0,
            license_terms_id: req.license_terms_id.0,
            amount: req.amount,
            receiver: req.receiver.0,
        };
        self.post("/license/tokens/mint", &body, "mint_license_tokens")
            .await
    }

    async fn transfer_royalty_tokens(
        &self,
        req: TransferRoyaltyTokensRequest,
    ) -> Result<TxReceipt> {
        let body = TransferRoyaltyBody {
            ip_id: req.ip_id.0,
            royalty_vault: req.royalty_vault.0,
            to: req.to.0,
            amount_wei: req.amount_wei.to_string(),
        };
        self.post("/royalty/transfer", &body, "transfer_royalty_tokens")
            .await
    }

    async fn claim_revenue(&self, req: ClaimRevenueRequest) -> Result<TxReceipt> {
        let body = ClaimRevenueBody {
            ancestor_ip_id: req.ancestor_ip_id.0,
            claimer: req.claimer.0,
            child_ip_ids: req.child_ip_ids.into_iter().map(|c| c.0).collect(),
            from_snapshots: req.from_snapshots,
            from_wallet_balance: req.from_wallet_balance,
        };
        self.post("/royalty/claim", &body, "claim_revenue").await
    }

    async fn pay_royalty(&self, req: PayRoyaltyRequest) -> Result<TxReceipt> {
        let body = PayRoyaltyBody {
            receiver_ip_id: req.receiver_ip_id.0,
            payer_ip_id: req.payer_ip_id.map(|p| p.0),
            amount_wei: req.amount_wei.to_string(),
        };
        self.post("/royalty/pay", &body, "pay_royalty").await
    }
}
