use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const IP_DECIMALS: u32 = 18;
pub const WEI_PER_IP: u128 = 1_000_000_000_000_000_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct IpId(pub String);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EvmAddress(pub String);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TxHash(pub String);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TokenId(pub u64);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct LicenseTermsId(pub u64);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("address '{0}' must start with 0x")]
    MissingPrefix(String),
    #[error("address '{0}' must be 0x followed by 40 hex chars")]
    BadLength(String),
    #[error("address '{0}' contains non-hex characters")]
    NotHex(String),
}

impl EvmAddress {
    /// Parses and normalizes a `0x`-prefixed 20-byte hex address.
    pub fn parse(raw: &str) -> Result<Self, AddressError> {
        let trimmed = raw.trim();
        let Some(body) = trimmed.strip_prefix("0x") else {
            return Err(AddressError::MissingPrefix(trimmed.to_owned()));
        };
        if body.len() != 40 {
            return Err(AddressError::BadLength(trimmed.to_owned()));
        }
        if !is_hex_str(body) {
            return Err(AddressError::NotHex(trimmed.to_owned()));
        }
        Ok(Self(format!("0x{}", body.to_ascii_lowercase())))
    }
}

impl IpId {
    /// IP asset ids share the EVM address format on Loreweave.
    pub fn parse(raw: &str) -> Result<Self, AddressError> {
        EvmAddress::parse(raw).map(|addr| Self(addr.0))
    }
}

fn is_hex_str(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_hexdigit())
}

// ── IP metadata ──

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IpMetadata {
    pub title: String,
    pub description: String,
    pub external_url: String,
    pub image: String,
    #[serde(flatten)]
    pub media: Option<MediaAttachment>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MediaAttachment {
    pub media_url: String,
    pub media_hash: String,
    pub media_type: String,
}

// ── PIL terms ──

/// Minting fee for a license. Templates may ship without a concrete amount;
/// such terms are incomplete until the creator settles the fee.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MintingFee {
    SetByCreator,
    Fixed { ip: String },
}

impl MintingFee {
    pub fn is_settled(&self) -> bool {
        match self {
            Self::SetByCreator => false,
            Self::Fixed { ip } => !ip.trim().is_empty(),
        }
    }

    pub fn amount_ip(&self) -> Option<&str> {
        match self {
            Self::SetByCreator => None,
            Self::Fixed { ip } => Some(ip.as_str()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PilTerms {
    pub transferable: bool,
    pub commercial_use: bool,
    pub commercial_attribution: bool,
    pub derivatives_allowed: bool,
    pub derivatives_attribution: bool,
    pub derivatives_approval: bool,
    pub derivatives_reciprocal: bool,
    pub commercial_rev_share_percent: u8,
    pub default_minting_fee: MintingFee,
    pub currency: EvmAddress,
    pub uri: String,
}

/// Zero address doubles as "native IP token" for the fee currency.
pub const NATIVE_CURRENCY: &str = "0x0000000000000000000000000000000000000000";

impl PilTerms {
    pub fn non_commercial_social_remixing() -> Self {
        Self {
            transferable: true,
            commercial_use: false,
            commercial_attribution: false,
            derivatives_allowed: true,
            derivatives_attribution: true,
            derivatives_approval: false,
            derivatives_reciprocal: true,
            commercial_rev_share_percent: 0,
            default_minting_fee: MintingFee::Fixed { ip: "0".to_owned() },
            currency: EvmAddress(NATIVE_CURRENCY.to_owned()),
            uri: "https://loreweave.xyz/pil/non-commercial-social-remixing".to_owned(),
        }
    }

    pub fn commercial_use() -> Self {
        Self {
            transferable: true,
            commercial_use: true,
            commercial_attribution: true,
            derivatives_allowed: false,
            derivatives_attribution: false,
            derivatives_approval: false,
            derivatives_reciprocal: false,
            commercial_rev_share_percent: 0,
            default_minting_fee: MintingFee::SetByCreator,
            currency: EvmAddress(NATIVE_CURRENCY.to_owned()),
            uri: "https://loreweave.xyz/pil/commercial-use".to_owned(),
        }
    }

    pub fn commercial_remix(rev_share_percent: u8) -> Self {
        Self {
            transferable: true,
            commercial_use: true,
            commercial_attribution: true,
            derivatives_allowed: true,
            derivatives_attribution: true,
            derivatives_approval: false,
            derivatives_reciprocal: true,
            commercial_rev_share_percent: rev_share_percent,
            default_minting_fee: MintingFee::SetByCreator,
            currency: EvmAddress(NATIVE_CURRENCY.to_owned()),
            uri: "https://loreweave.xyz/pil/commercial-remix".to_owned(),
        }
    }

    pub fn with_minting_fee(mut self, amount_ip: &str) -> Self {
        self.default_minting_fee = MintingFee::Fixed {
            ip: amount_ip.to_owned(),
        };
        self
    }
}

// ── Royalty-token listings ──

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    Active,
    Sold,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoyaltyListing {
    pub id: String,
    pub ip_id: IpId,
    pub royalty_vault: EvmAddress,
    pub nft_contract: EvmAddress,
    pub nft_token_id: TokenId,
    pub percentage_to_sell: f64,
    pub price_per_token_ip: f64,
    pub listed_at_epoch_ms: u128,
    pub status: ListingStatus,
}

// ── Answer values ──

/// One answer in a wizard form: the value side of the question-id map.
/// Shape mirrors what each control kind can produce.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnswerValue {
    Text(String),
    Choice(String),
    MultiChoice(Vec<String>),
    FileRef {
        file_name: String,
        media_type: String,
        content_base64: String,
    },
    Flag(bool),
}

impl AnswerValue {
    /// Empty answers never satisfy a required question.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(s) | Self::Choice(s) => s.trim().is_empty(),
            Self::MultiChoice(items) => items.is_empty(),
            Self::FileRef { content_base64, .. } => content_base64.is_empty(),
            Self::Flag(_) => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) | Self::Choice(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

// ── Currency helpers ──

/// Converts a decimal IP amount like "1.5" into wei (18 decimals).
/// Returns None for malformed input or more than 18 fractional digits.
pub fn ip_to_wei(amount_ip: &str) -> Option<u128> {
    let amount_ip = amount_ip.trim();
    let (whole, frac) = match amount_ip.split_once('.') {
        Some((w, f)) => (w, f),
        None => (amount_ip, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    if frac.len() as u32 > IP_DECIMALS {
        return None;
    }
    let whole: u128 = if whole.is_empty() {
        0
    } else {
        whole.parse().ok()?
    };
    let frac_value: u128 = if frac.is_empty() {
        0
    } else {
        let padded = format!("{frac:0<18}");
        padded.parse().ok()?
    };
    whole
        .checked_mul(WEI_PER_IP)
        .and_then(|w| w.checked_add(frac_value))
}

pub fn wei_to_ip(wei: u128) -> f64 {
    wei as f64 / WEI_PER_IP as f64
}

pub fn format_ip(wei: u128) -> String {
    let whole = wei / WEI_PER_IP;
    let frac = wei % WEI_PER_IP;
    if frac == 0 {
        return format!("{whole} IP");
    }
    let frac = format!("{frac:018}");
    format!("{whole}.{} IP", frac.trim_end_matches('0'))
}

// ── Service wire types ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCreateRequest {
    pub card_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRequest {
    pub question_id: String,
    pub value: AnswerValue,
}

/// Payload of the PIL editor. Either a named template (with the knobs the
/// template leaves open) or a fully custom terms record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PilAttachRequest {
    pub template: Option<String>,
    pub rev_share_percent: Option<u8>,
    pub minting_fee_ip: Option<String>,
    pub custom: Option<PilTerms>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionView {
    pub id: String,
    pub prompt: String,
    pub control: String,
    #[serde(default)]
    pub options: Vec<String>,
    pub required: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionView {
    pub session_id: String,
    pub card_id: String,
    pub card_title: String,
    pub step: usize,
    pub visible_steps: usize,
    pub question: Option<QuestionView>,
    pub can_go_next: bool,
    pub is_review: bool,
    pub batch_len: usize,
    pub pil_attached: bool,
    #[serde(default)]
    pub effects: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryRowView {
    pub question_id: String,
    pub prompt: String,
    pub answer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryView {
    pub card_id: String,
    pub rows: Vec<SummaryRowView>,
    pub pil: Option<PilTerms>,
    pub batch_len: usize,
    pub total_entries: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitReceiptView {
    pub tx_hash: String,
    pub ip_id: Option<String>,
    pub token_id: Option<u64>,
    pub license_terms_ids: Vec<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub function: String,
    pub receipts: Vec<SubmitReceiptView>,
    /// Present only for the marketplace listing workflow, which stores a
    /// listing instead of sending a transaction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listing: Option<RoyaltyListing>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingCreateRequest {
    pub ip_id: String,
    pub royalty_vault: String,
    pub nft_contract: String,
    pub nft_token_id: u64,
    pub percentage_to_sell: f64,
    pub price_per_token_ip: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseRequest {
    pub buyer: String,
    pub percentage: f64,
    pub accepted_terms: bool,
    /// How far through the license terms text the buyer scrolled, 0..=1.
    pub read_ratio: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseResponse {
    pub listing_id: String,
    pub tx_hash: String,
    pub percentage: f64,
    pub token_cost_ip: f64,
    pub network_fee_ip: f64,
    pub total_ip: f64,
    pub status: ListingStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfigResponse {
    pub chain_slug: String,
    pub native_symbol: String,
    pub decimals: u32,
    pub network_fee_ip: f64,
    pub environment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadJsonRequest {
    pub content: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadFileRequest {
    pub file_name: String,
    pub media_type: String,
    pub content_base64: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub uri: String,
    pub content_hash: String,
}
