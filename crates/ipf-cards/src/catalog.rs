use crate::{CardConfig, Question, QuestionKind, SubmitFunction};

fn text(id: &str, prompt: &str, required: bool) -> Question {
    Question {
        id: id.to_owned(),
        prompt: prompt.to_owned(),
        kind: QuestionKind::Text,
        required,
    }
}

fn textarea(id: &str, prompt: &str, required: bool) -> Question {
    Question {
        id: id.to_owned(),
        prompt: prompt.to_owned(),
        kind: QuestionKind::Textarea,
        required,
    }
}

fn radio(id: &str, prompt: &str, options: &[&str], required: bool) -> Question {
    Question {
        id: id.to_owned(),
        prompt: prompt.to_owned(),
        kind: QuestionKind::Radio {
            options: options.iter().map(|s| (*s).to_owned()).collect(),
        },
        required,
    }
}

fn file(id: &str, prompt: &str, required: bool) -> Question {
    Question {
        id: id.to_owned(),
        prompt: prompt.to_owned(),
        kind: QuestionKind::FileUpload,
        required,
    }
}

fn checkbox(id: &str, prompt: &str, options: &[&str], required: bool) -> Question {
    Question {
        id: id.to_owned(),
        prompt: prompt.to_owned(),
        kind: QuestionKind::Checkbox {
            options: options.iter().map(|s| (*s).to_owned()).collect(),
        },
        required,
    }
}

const METADATA_MODES: &[&str] = &["Basic", "Media"];
const YES_NO: &[&str] = &["Yes", "No"];
const PIL_TEMPLATES: &[&str] = &[
    "Non-commercial social remixing",
    "Commercial use",
    "Commercial remix",
];

/// The built-in registration workflow variants. Static configuration: the
/// engine never mutates a card at runtime.
pub fn catalog() -> Vec<CardConfig> {
    vec![
        CardConfig {
            id: "register-ip".to_owned(),
            title: "Register existing NFT as IP".to_owned(),
            description: "Turn an NFT you already own into a registered IP asset.".to_owned(),
            questions: vec![
                text("nft_contract", "NFT contract address", true),
                text("nft_token_id", "NFT token id", true),
                radio("metadata_mode", "Metadata shape", METADATA_MODES, true),
                text("title", "Title of the work", true),
                textarea("description", "Describe the work", true),
                text("external_url", "External URL", false),
                text("image", "Image URI", true),
                text("media_url", "Media URI", false),
                text("media_hash", "Media hash", false),
                radio(
                    "media_type",
                    "Media type",
                    &["image/png", "image/jpeg", "audio/mpeg", "video/mp4"],
                    false,
                ),
                radio("attach_pil", "Attach license terms now?", YES_NO, true),
            ],
            submit_function: SubmitFunction::RegisterIp,
            batch_capable: false,
        },
        CardConfig {
            id: "mint-and-register-ip".to_owned(),
            title: "Mint and register new IP".to_owned(),
            description: "Mint an NFT into a collection and register it as IP in one step."
                .to_owned(),
            questions: vec![
                text("spg_collection", "Collection address to mint into", true),
                radio("metadata_mode", "Metadata shape", METADATA_MODES, true),
                text("title", "Title of the work", true),
                textarea("description", "Describe the work", true),
                text("external_url", "External URL", false),
                text("image", "Image URI", true),
                text("media_url", "Media URI", false),
                text("media_hash", "Media hash", false),
                radio(
                    "media_type",
                    "Media type",
                    &["image/png", "image/jpeg", "audio/mpeg", "video/mp4"],
                    false,
                ),
                radio("attach_pil", "Attach license terms now?", YES_NO, true),
            ],
            submit_function: SubmitFunction::MintAndRegisterIp,
            batch_capable: false,
        },
        CardConfig {
            id: "register-ip-with-pil".to_owned(),
            title: "Mint, register, and license".to_owned(),
            description: "Mint an NFT, register it as IP, and attach license terms in one \
                          transaction."
                .to_owned(),
            questions: vec![
                text("spg_collection", "Collection address to mint into", true),
                text("title", "Title of the work", true),
                textarea("description", "Describe the work", true),
                text("external_url", "External URL", false),
                text("image", "Image URI", true),
                radio("license_template", "License template", PIL_TEMPLATES, true),
            ],
            submit_function: SubmitFunction::RegisterIpWithPil,
            batch_capable: false,
        },
        CardConfig {
            id: "batch-mint-and-register".to_owned(),
            title: "Batch mint and register".to_owned(),
            description: "Register several works in one submission. Use \"register more\" to \
                          queue the next one."
                .to_owned(),
            questions: vec![
                text("spg_collection", "Collection address to mint into", true),
                text("title", "Title of the work", true),
                textarea("description", "Describe the work", true),
                text("image", "Image URI", true),
                radio("attach_pil", "Attach license terms now?", YES_NO, true),
            ],
            submit_function: SubmitFunction::BatchMintAndRegister,
            batch_capable: true,
        },
        CardConfig {
            id: "register-derivative".to_owned(),
            title: "Register derivative".to_owned(),
            description: "Link an already-registered IP asset to its parents.".to_owned(),
            questions: vec![
                text("child_ip_id", "Derivative IP id", true),
                textarea(
                    "parent_ip_ids",
                    "Parent IP ids (comma separated)",
                    true,
                ),
                textarea(
                    "license_terms_ids",
                    "License terms ids, one per parent (comma separated)",
                    true,
                ),
            ],
            submit_function: SubmitFunction::RegisterDerivative,
            batch_capable: false,
        },
        CardConfig {
            id: "mint-and-register-derivative".to_owned(),
            title: "Mint and register derivative".to_owned(),
            description: "Mint a new NFT and register it as a derivative of existing IP."
                .to_owned(),
            questions: vec![
                text("spg_collection", "Collection address to mint into", true),
                text("title", "Title of the work", true),
                textarea("description", "Describe the work", true),
                text("image", "Image URI", true),
                textarea(
                    "parent_ip_ids",
                    "Parent IP ids (comma separated)",
                    true,
                ),
                textarea(
                    "license_terms_ids",
                    "License terms ids, one per parent (comma separated)",
                    true,
                ),
            ],
            submit_function: SubmitFunction::MintAndRegisterDerivative,
            batch_capable: false,
        },
        CardConfig {
            id: "register-derivative-with-license-tokens".to_owned(),
            title: "Register derivative with license tokens".to_owned(),
            description: "Burn license tokens you hold to register a derivative.".to_owned(),
            questions: vec![
                text("child_ip_id", "Derivative IP id", true),
                textarea(
                    "license_token_ids",
                    "License token ids to burn (comma separated)",
                    true,
                ),
            ],
            submit_function: SubmitFunction::RegisterDerivativeWithLicenseTokens,
            batch_capable: false,
        },
        CardConfig {
            id: "attach-pil-to-ip".to_owned(),
            title: "Attach license terms to IP".to_owned(),
            description: "Attach existing or new license terms to a registered IP asset."
                .to_owned(),
            questions: vec![
                text("ip_id", "IP asset id", true),
                radio(
                    "terms_source",
                    "Where do the terms come from?",
                    &["Existing terms ID", "New terms"],
                    true,
                ),
                text("license_terms_id", "License terms id", false),
                radio("license_template", "License template", PIL_TEMPLATES, false),
            ],
            submit_function: SubmitFunction::AttachPilToIp,
            batch_capable: false,
        },
        CardConfig {
            id: "register-pil".to_owned(),
            title: "Create license terms".to_owned(),
            description: "Register a reusable set of license terms on the protocol.".to_owned(),
            questions: vec![
                radio("license_template", "License template", PIL_TEMPLATES, true),
                text("minting_fee_ip", "Minting fee (IP)", false),
                text("rev_share_percent", "Commercial revenue share (%)", false),
            ],
            submit_function: SubmitFunction::RegisterPil,
            batch_capable: false,
        },
        CardConfig {
            id: "mint-license-tokens".to_owned(),
            title: "Mint license tokens".to_owned(),
            description: "Mint tokens that grant the right to register derivatives.".to_owned(),
            questions: vec![
                text("licensor_ip_id", "Licensor IP id", true),
                text("license_terms_id", "License terms id", true),
                text("amount", "Number of tokens", true),
                text("receiver", "Receiver address", true),
            ],
            submit_function: SubmitFunction::MintLicenseTokens,
            batch_capable: false,
        },
        CardConfig {
            id: "list-royalty-tokens".to_owned(),
            title: "List royalty tokens for sale".to_owned(),
            description: "Offer a share of an IP asset's royalty vault on the marketplace."
                .to_owned(),
            questions: vec![
                text("ip_id", "IP asset id", true),
                text("royalty_vault", "Royalty vault address", true),
                text("nft_contract", "Underlying NFT contract", true),
                text("nft_token_id", "Underlying NFT token id", true),
                text("percentage_to_sell", "Percentage of vault to sell", true),
                text("price_per_token_ip", "Price per royalty token (IP)", true),
            ],
            submit_function: SubmitFunction::ListRoyaltyTokens,
            batch_capable: false,
        },
        CardConfig {
            id: "claim-revenue".to_owned(),
            title: "Claim revenue".to_owned(),
            description: "Claim accumulated royalty revenue for an ancestor IP.".to_owned(),
            questions: vec![
                text("ancestor_ip_id", "Ancestor IP id", true),
                text("claimer", "Claimer address", true),
                textarea(
                    "child_ip_ids",
                    "Child IP ids to claim from (comma separated, optional)",
                    false,
                ),
                checkbox(
                    "claim_options",
                    "Claim options",
                    &["Unclaimed snapshots", "Wallet balance"],
                    false,
                ),
            ],
            submit_function: SubmitFunction::ClaimRevenue,
            batch_capable: false,
        },
        CardConfig {
            id: "pay-royalty".to_owned(),
            title: "Pay royalty".to_owned(),
            description: "Pay royalties to an IP asset on behalf of yourself or another IP."
                .to_owned(),
            questions: vec![
                text("receiver_ip_id", "Receiver IP id", true),
                text("payer_ip_id", "Payer IP id (optional)", false),
                text("amount_ip", "Amount (IP)", true),
                file("payment_note", "Attach a payment note (optional)", false),
            ],
            submit_function: SubmitFunction::PayRoyalty,
            batch_capable: false,
        },
    ]
}
