use anyhow::Result;
use async_trait::async_trait;
use ipf_api_types::{EvmAddress, IpId, IpMetadata, LicenseTermsId, PilTerms, TokenId, TxHash};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
pub struct RegisterIpRequest {
    pub nft_contract: EvmAddress,
    pub nft_token_id: TokenId,
    pub metadata: IpMetadata,
}

#[derive(Debug, Clone)]
pub struct MintAndRegisterIpRequest {
    pub spg_collection: EvmAddress,
    pub metadata: IpMetadata,
    pub pil: Option<PilTerms>,
}

#[derive(Debug, Clone)]
pub struct RegisterDerivativeRequest {
    pub child_ip_id: IpId,
    pub parent_ip_ids: Vec<IpId>,
    pub license_terms_ids: Vec<LicenseTermsId>,
}

#[derive(Debug, Clone)]
pub struct MintAndRegisterDerivativeRequest {
    pub spg_collection: EvmAddress,
    pub metadata: IpMetadata,
    pub parent_ip_ids: Vec<IpId>,
    pub license_terms_ids: Vec<LicenseTermsId>,
}

#[derive(Debug, Clone)]
pub struct DerivativeWithTokensRequest {
    pub child_ip_id: IpId,
    pub license_token_ids: Vec<TokenId>,
}

#[derive(Debug, Clone)]
pub struct AttachTermsRequest {
    pub ip_id: IpId,
    pub license_terms_id: LicenseTermsId,
}

#[derive(Debug, Clone)]
pub struct MintLicenseTokensRequest {
    pub licensor_ip_id: IpId,
    pub license_terms_id: LicenseTermsId,
    pub amount: u64,
    pub receiver: EvmAddress,
}

#[derive(Debug, Clone)]
pub struct TransferRoyaltyTokensRequest {
    pub ip_id: IpId,
    pub royalty_vault: EvmAddress,
    pub to: EvmAddress,
    pub amount_wei: u128,
}

#[derive(Debug, Clone)]
pub struct ClaimRevenueRequest {
    pub ancestor_ip_id: IpId,
    pub claimer: EvmAddress,
    pub child_ip_ids: Vec<IpId>,
    pub from_snapshots: bool,
    pub from_wallet_balance: bool,
}

#[derive(Debug, Clone)]
pub struct PayRoyaltyRequest {
    pub receiver_ip_id: IpId,
    pub payer_ip_id: Option<IpId>,
    pub amount_wei: u128,
}

/// What every protocol call resolves to. Fields absent from a given
/// operation come back as None/empty.
#[derive(Debug, Clone)]
pub struct TxReceipt {
    pub tx_hash: TxHash,
    pub ip_id: Option<IpId>,
    pub token_id: Option<TokenId>,
    pub license_terms_ids: Vec<LicenseTermsId>,
}

/// Opaque RPC boundary to the Loreweave protocol. Everything on-chain
/// happens behind these methods; callers marshal strings and amounts in
/// and get receipt-shaped records out.
#[async_trait]
pub trait ProtocolClient: Send + Sync {
    fn chain(&self) -> &str;
    async fn register_ip(&self, req: RegisterIpRequest) -> Result<TxReceipt>;
    async fn mint_and_register_ip(&self, req: MintAndRegisterIpRequest) -> Result<TxReceipt>;
    async fn register_derivative(&self, req: RegisterDerivativeRequest) -> Result<TxReceipt>;
    async fn mint_and_register_derivative(
        &self,
        req: MintAndRegisterDerivativeRequest,
    ) -> Result<TxReceipt>;
    async fn register_derivative_with_license_tokens(
        &self,
        req: DerivativeWithTokensRequest,
    ) -> Result<TxReceipt>;
    async fn register_pil_terms(&self, terms: PilTerms) -> Result<TxReceipt>;
    async fn attach_license_terms(&self, req: AttachTermsRequest) -> Result<TxReceipt>;
    async fn mint_license_tokens(&self, req: MintLicenseTokensRequest) -> Result<TxReceipt>;
    async fn transfer_royalty_tokens(&self, req: TransferRoyaltyTokensRequest)
    -> Result<TxReceipt>;
    async fn claim_revenue(&self, req: ClaimRevenueRequest) -> Result<TxReceipt>;
    async fn pay_royalty(&self, req: PayRoyaltyRequest) -> Result<TxReceipt>;
}

#[derive(Default)]
pub struct ProtocolRegistry {
    clients: HashMap<String, Arc<dyn ProtocolClient>>,
}

impl ProtocolRegistry {
    pub fn register(&mut self, client: Arc<dyn ProtocolClient>) {
        self.clients.insert(client.chain().to_owned(), client);
    }

    pub fn client(&self, chain: &str) -> Option<Arc<dyn ProtocolClient>> {
        self.clients.get(chain).cloned()
    }
}

#[derive(Debug, Clone)]
pub enum RecordedCall {
    RegisterIp(RegisterIpRequest),
    MintAndRegisterIp(MintAndRegisterIpRequest),
    RegisterDerivative(RegisterDerivativeRequest),
    MintAndRegisterDerivative(MintAndRegisterDerivativeRequest),
    DerivativeWithTokens(DerivativeWithTokensRequest),
    RegisterPilTerms(PilTerms),
    AttachTerms(AttachTermsRequest),
    MintLicenseTokens(MintLicenseTokensRequest),
    TransferRoyaltyTokens(TransferRoyaltyTokensRequest),
    ClaimRevenue(ClaimRevenueRequest),
    PayRoyalty(PayRoyaltyRequest),
}

/// Local client with no chain behind it. Receipts are derived from a
/// per-client sequence number, so runs are deterministic, and every call
/// is recorded for inspection. Serves demo deployments and tests.
pub struct StaticProtocolClient {
    chain: String,
    seq: AtomicU64,
    calls: RwLock<Vec<RecordedCall>>,
}

impl StaticProtocolClient {
    pub fn new(chain: impl Into<String>) -> Self {
        Self {
            chain: chain.into(),
            seq: AtomicU64::new(0),
            calls: RwLock::new(Vec::new()),
        }
    }

    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.read().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.read().await.len()
    }

    async fn record(&self, call: RecordedCall) {
        self.calls.write().await.push(call);
    }

    fn next_digest(&self, op: &str) -> [u8; 32] {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let mut hasher = Sha256::new();
        hasher.update(self.chain.as_bytes());
        hasher.update(op.as_bytes());
        hasher.update(seq.to_le_bytes());
        hasher.finalize().into()
    }

    fn receipt(&self, op: &str, with_ip: bool, with_token: bool) -> TxReceipt {
        let digest = self.next_digest(op);
        TxReceipt {
            tx_hash: TxHash(format!("0x{}", to_hex(&digest))),
            ip_id: with_ip.then(|| IpId(format!("0x{}", to_hex(&digest[..20])))),
            token_id: with_token.then(|| TokenId(word_at(&digest, 0))),
            license_terms_ids: Vec::new(),
        }
    }

    fn terms_id_from(digest: &[u8; 32]) -> LicenseTermsId {
        LicenseTermsId(word_at(digest, 8) % 100_000 + 1)
    }
}

impl Default for StaticProtocolClient {
    fn default() -> Self {
        Self::new("loreweave-static")
    }
}

#[async_trait]
impl ProtocolClient for StaticProtocolClient {
    fn chain(&self) -> &str {
        &self.chain
    }

    async fn register_ip(&self, req: RegisterIpRequest) -> Result<TxReceipt> {
        self.record(RecordedCall::RegisterIp(req)).await;
        Ok(self.receipt("register_ip", true, false))
    }

    async fn mint_and_register_ip(&self, req: MintAndRegisterIpRequest) -> Result<TxReceipt> {
        let with_terms = req.pil.is_some();
        self.record(RecordedCall::MintAndRegisterIp(req)).await;
        let mut receipt = self.receipt("mint_and_register_ip", true, true);
        if with_terms {
            let digest = self.next_digest("mint_and_register_ip.terms");
            receipt.license_terms_ids.push(Self::terms_id_from(&digest));
        }
        Ok(receipt)
    }

    async fn register_derivative(&self, req: RegisterDerivativeRequest) -> Result<TxReceipt> {
        let child = req.child_ip_id.clone();
        self.record(RecordedCall::RegisterDerivative(req)).await;
        let mut receipt = self.receipt("register_derivative", false, false);
        receipt.ip_id = Some(child);
        Ok(receipt)
    }

    async fn mint_and_register_derivative(
        &self,
        req: MintAndRegisterDerivativeRequest,
    ) -> Result<TxReceipt> {
        self.record(RecordedCall::MintAndRegisterDerivative(req))
            .await;
        Ok(self.receipt("mint_and_register_derivative", true, true))
    }

    async fn register_derivative_with_license_tokens(
        &self,
        req: DerivativeWithTokensRequest,
    ) -> Result<TxReceipt> {
        let child = req.child_ip_id.clone();
        self.record(RecordedCall::DerivativeWithTokens(req)).await;
        let mut receipt = self.receipt("register_derivative_with_license_tokens", false, false);
        receipt.ip_id = Some(child);
        Ok(receipt)
    }

    async fn register_pil_terms(&self, terms: PilTerms) -> Result<TxReceipt> {
        self.record(RecordedCall::RegisterPilTerms(terms)).await;
        let digest = self.next_digest("register_pil_terms");
        Ok(TxReceipt {
            tx_hash: TxHash(format!("0x{}", to_hex(&digest))),
            ip_id: None,
            token_id: None,
            license_terms_ids: vec![Self::terms_id_from(&digest)],
        })
    }

    async fn attach_license_terms(&self, req: AttachTermsRequest) -> Result<TxReceipt> {
        let ip_id = req.ip_id.clone();
        let terms = req.license_terms_id;
        self.record(RecordedCall::AttachTerms(req)).await;
        let mut receipt = self.receipt("attach_license_terms", false, false);
        receipt.ip_id = Some(ip_id);
        receipt.license_terms_ids.push(terms);
        Ok(receipt)
    }

    async fn mint_license_tokens(&self, req: MintLicenseTokensRequest) -> Result<TxReceipt> {
        self.record(RecordedCall::MintLicenseTokens(req)).await;
        Ok(self.receipt("mint_license_tokens", false, true))
    }

    async fn transfer_royalty_tokens(
        &self,
        req: TransferRoyaltyTokensRequest,
    ) -> Result<TxReceipt> {
        self.record(RecordedCall::TransferRoyaltyTokens(req)).await;
        Ok(self.receipt("transfer_royalty_tokens", false, false))
    }

    async fn claim_revenue(&self, req: ClaimRevenueRequest) -> Result<TxReceipt> {
        self.record(RecordedCall::ClaimRevenue(req)).await;
        Ok(self.receipt("claim_revenue", false, false))
    }

    async fn pay_royalty(&self, req: PayRoyaltyRequest) -> Result<TxReceipt> {
        self.record(RecordedCall::PayRoyalty(req)).await;
        Ok(self.receipt("pay_royalty", false, false))
    }
}

fn to_hex(input: &[u8]) -> String {
    let mut output = String::with_capacity(input.len() * 2);
    for byte in input {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}

fn word_at(digest: &[u8; 32], offset: usize) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&digest[offset..offset + 8]);
    u64::from_le_bytes(word)
}
