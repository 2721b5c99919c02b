mod catalog;
mod rules;

pub use catalog::catalog;
pub use rules::{FieldRule, field_rule};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    Radio { options: Vec<String> },
    Text,
    Textarea,
    FileUpload,
    Checkbox { options: Vec<String> },
}

impl QuestionKind {
    pub fn control_name(&self) -> &'static str {
        match self {
            Self::Radio { .. } => "radio",
            Self::Text => "text",
            Self::Textarea => "textarea",
            Self::FileUpload => "file",
            Self::Checkbox { .. } => "checkbox",
        }
    }

    pub fn options(&self) -> &[String] {
        match self {
            Self::Radio { options } | Self::Checkbox { options } => options,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Question {
    pub id: String,
    pub prompt: String,
    pub kind: QuestionKind,
    pub required: bool,
}

/// Wire names of the submission handlers. Parsing happens when a card
/// catalog is built, so an unknown handler name can never reach dispatch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum SubmitFunction {
    RegisterIp,
    MintAndRegisterIp,
    RegisterIpWithPil,
    BatchMintAndRegister,
    RegisterDerivative,
    MintAndRegisterDerivative,
    RegisterDerivativeWithLicenseTokens,
    AttachPilToIp,
    RegisterPil,
    MintLicenseTokens,
    ListRoyaltyTokens,
    ClaimRevenue,
    PayRoyalty,
}

impl SubmitFunction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RegisterIp => "register-ip",
            Self::MintAndRegisterIp => "mint-and-register-ip",
            Self::RegisterIpWithPil => "register-ip-with-pil",
            Self::BatchMintAndRegister => "batch-mint-and-register",
            Self::RegisterDerivative => "register-derivative",
            Self::MintAndRegisterDerivative => "mint-and-register-derivative",
            Self::RegisterDerivativeWithLicenseTokens => {
                "register-derivative-with-license-tokens"
            }
            Self::AttachPilToIp => "attach-pil-to-ip",
            Self::RegisterPil => "register-pil",
            Self::MintLicenseTokens => "mint-license-tokens",
            Self::ListRoyaltyTokens => "list-royalty-tokens",
            Self::ClaimRevenue => "claim-revenue",
            Self::PayRoyalty => "pay-royalty",
        }
    }
}

impl std::str::FromStr for SubmitFunction {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let all = [
            Self::RegisterIp,
            Self::MintAndRegisterIp,
            Self::RegisterIpWithPil,
            Self::BatchMintAndRegister,
            Self::RegisterDerivative,
            Self::MintAndRegisterDerivative,
            Self::RegisterDerivativeWithLicenseTokens,
            Self::AttachPilToIp,
            Self::RegisterPil,
            Self::MintLicenseTokens,
            Self::ListRoyaltyTokens,
            Self::ClaimRevenue,
            Self::PayRoyalty,
        ];
        all.into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| CatalogError::UnknownFunction(s.to_owned()))
    }
}

impl std::fmt::Display for SubmitFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CardConfig {
    pub id: String,
    pub title: String,
    pub description: String,
    pub questions: Vec<Question>,
    pub submit_function: SubmitFunction,
    /// Whether the wizard offers "register more" before final submission.
    pub batch_capable: bool,
}

impl CardConfig {
    pub fn question(&self, question_id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == question_id)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("unknown card '{0}'")]
    UnknownCard(String),
    #[error("unknown submit function '{0}'")]
    UnknownFunction(String),
}

pub fn find_card(card_id: &str) -> Result<CardConfig, CatalogError> {
    catalog()
        .into_iter()
        .find(|card| card.id == card_id)
        .ok_or_else(|| CatalogError::UnknownCard(card_id.to_owned()))
}
