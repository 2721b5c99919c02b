use ipf_api_types::{
    AnswerValue, EvmAddress, IpId, IpMetadata, LicenseTermsId, MediaAttachment, PilTerms,
    RoyaltyListing, TokenId, ip_to_wei,
};
use ipf_cards::SubmitFunction;
use ipf_market::{MarketError, Marketplace, NewListing};
use ipf_protocol_client::{
    AttachTermsRequest, ClaimRevenueRequest, DerivativeWithTokensRequest,
    MintAndRegisterDerivativeRequest, MintAndRegisterIpRequest, MintLicenseTokensRequest,
    PayRoyaltyRequest, ProtocolClient, RegisterDerivativeRequest, RegisterIpRequest, TxReceipt,
};
use ipf_wizard::{CompletedEntry, SubmitPlan};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("missing required field '{0}'")]
    MissingField(&'static str),
    #[error("field '{field}' is invalid: {reason}")]
    InvalidField { field: &'static str, reason: String },
    #[error("parent IP ids and license terms ids must pair up ({parents} vs {terms})")]
    ListLengthMismatch { parents: usize, terms: usize },
    #[error("'{0}' accepts exactly one entry")]
    SingleEntryOnly(&'static str),
    #[error(transparent)]
    Market(#[from] MarketError),
    #[error("protocol call failed: {0}")]
    Client(#[source] anyhow::Error),
    #[error("batch entry {index} failed after {} registered", .completed.len())]
    Batch {
        completed: Vec<TxReceipt>,
        index: usize,
        #[source]
        source: Box<SubmitError>,
    },
}

/// What a dispatch produced. Chain handlers return the receipts of every
/// protocol call they made, in call order; the marketplace handler returns
/// the listing it stored.
#[derive(Debug)]
pub enum SubmitOutcome {
    Receipts(Vec<TxReceipt>),
    Listed(RoyaltyListing),
}

impl SubmitOutcome {
    pub fn receipts(&self) -> &[TxReceipt] {
        match self {
            Self::Receipts(receipts) => receipts,
            Self::Listed(_) => &[],
        }
    }
}

/// Splits a comma-separated id string, dropping surrounding whitespace and
/// empty segments.
pub fn parse_id_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

// ── Field access over one completed form ─────────────────────────────

struct Fields<'a>(&'a BTreeMap<String, AnswerValue>);

impl Fields<'_> {
    fn text_opt(&self, field: &str) -> Option<&str> {
        self.0
            .get(field)
            .and_then(AnswerValue::as_text)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    fn text(&self, field: &'static str) -> Result<&str, SubmitError> {
        self.text_opt(field).ok_or(SubmitError::MissingField(field))
    }

    fn address(&self, field: &'static str) -> Result<EvmAddress, SubmitError> {
        EvmAddress::parse(self.text(field)?).map_err(|err| SubmitError::InvalidField {
            field,
            reason: err.to_string(),
        })
    }

    fn ip_id(&self, field: &'static str) -> Result<IpId, SubmitError> {
        IpId::parse(self.text(field)?).map_err(|err| SubmitError::InvalidField {
            field,
            reason: err.to_string(),
        })
    }

    fn u64_value(&self, field: &'static str) -> Result<u64, SubmitError> {
        let raw = self.text(field)?;
        raw.parse().map_err(|_| SubmitError::InvalidField {
            field,
            reason: format!("'{raw}' is not a whole number"),
        })
    }

    fn wei_amount(&self, field: &'static str) -> Result<u128, SubmitError> {
        let raw = self.text(field)?;
        ip_to_wei(raw).ok_or_else(|| SubmitError::InvalidField {
            field,
            reason: format!("'{raw}' is not a valid IP amount"),
        })
    }

    fn f64_value(&self, field: &'static str) -> Result<f64, SubmitError> {
        let raw = self.text(field)?;
        match raw.parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(value),
            _ => Err(SubmitError::InvalidField {
                field,
                reason: format!("'{raw}' is not a number"),
            }),
        }
    }

    fn multi(&self, field: &str) -> &[String] {
        match self.0.get(field) {
            Some(AnswerValue::MultiChoice(items)) => items,
            _ => &[],
        }
    }

    fn ip_id_list(&self, field: &'static str) -> Result<Vec<IpId>, SubmitError> {
        parse_id_list(self.text(field)?)
            .iter()
            .map(|raw| {
                IpId::parse(raw).map_err(|err| SubmitError::InvalidField {
                    field,
                    reason: err.to_string(),
                })
            })
            .collect()
    }

    fn terms_id_list(&self, field: &'static str) -> Result<Vec<LicenseTermsId>, SubmitError> {
        parse_id_list(self.text(field)?)
            .iter()
            .map(|raw| {
                raw.parse()
                    .map(LicenseTermsId)
                    .map_err(|_| SubmitError::InvalidField {
                        field,
                        reason: format!("'{raw}' is not a terms id"),
                    })
            })
            .collect()
    }

    fn token_id_list(&self, field: &'static str) -> Result<Vec<TokenId>, SubmitError> {
        parse_id_list(self.text(field)?)
            .iter()
            .map(|raw| {
                raw.parse()
                    .map(TokenId)
                    .map_err(|_| SubmitError::InvalidField {
                        field,
                        reason: format!("'{raw}' is not a token id"),
                    })
            })
            .collect()
    }
}

/// Shapes the IP metadata record from form answers. The media block only
/// exists when the metadata mode selector said so; otherwise the record
/// serializes as the basic four fields.
fn shape_metadata(fields: &Fields<'_>) -> Result<IpMetadata, SubmitError> {
    let media = match fields.text_opt("metadata_mode") {
        Some("Media") => Some(MediaAttachment {
            media_url: fields.text("media_url")?.to_owned(),
            media_hash: fields.text_opt("media_hash").unwrap_or_default().to_owned(),
            media_type: fields.text("media_type")?.to_owned(),
        }),
        _ => None,
    };
    Ok(IpMetadata {
        title: fields.text("title")?.to_owned(),
        description: fields.text("description")?.to_owned(),
        external_url: fields.text_opt("external_url").unwrap_or_default().to_owned(),
        image: fields.text("image")?.to_owned(),
        media,
    })
}

/// Builds PIL terms from a template answer. `fee_required` matches cards
/// that surface a fee field for commercial templates; elsewhere a missing
/// fee settles to zero.
fn template_terms(fields: &Fields<'_>, fee_required: bool) -> Result<PilTerms, SubmitError> {
    let template = fields.text("license_template")?;
    let base = match template {
        "Non-commercial social remixing" => return Ok(PilTerms::non_commercial_social_remixing()),
        "Commercial use" => PilTerms::commercial_use(),
        "Commercial remix" => {
            let share = match fields.text_opt("rev_share_percent") {
                Some(raw) => {
                    let parsed: u8 = raw.parse().map_err(|_| SubmitError::InvalidField {
                        field: "rev_share_percent",
                        reason: format!("'{raw}' is not a percentage"),
                    })?;
                    if parsed > 100 {
                        return Err(SubmitError::InvalidField {
                            field: "rev_share_percent",
                            reason: format!("{parsed} is over 100"),
                        });
                    }
                    parsed
                }
                None if fee_required => return Err(SubmitError::MissingField("rev_share_percent")),
                None => 0,
            };
            PilTerms::commercial_remix(share)
        }
        other => {
            return Err(SubmitError::InvalidField {
                field: "license_template",
                reason: format!("unknown template '{other}'"),
            });
        }
    };

    let fee = match fields.text_opt("minting_fee_ip") {
        Some(raw) => raw,
        None if fee_required => return Err(SubmitError::MissingField("minting_fee_ip")),
        None => "0",
    };
    if ip_to_wei(fee).is_none() {
        return Err(SubmitError::InvalidField {
            field: "minting_fee_ip",
            reason: format!("'{fee}' is not a valid IP amount"),
        });
    }
    Ok(base.with_minting_fee(fee))
}

fn attached_pil(entry: &CompletedEntry) -> Result<Option<PilTerms>, SubmitError> {
    let fields = Fields(&entry.answers);
    match fields.text_opt("attach_pil") {
        Some("Yes") => match &entry.pil {
            Some(terms) => Ok(Some(terms.clone())),
            None => Err(SubmitError::MissingField("pil")),
        },
        _ => Ok(None),
    }
}

// ── Router ───────────────────────────────────────────────────────────

/// Maps a submit function to its handler. Every handler validates and
/// marshals first, then talks to the protocol client, so a bad form never
/// costs a chain call.
pub struct SubmissionRouter {
    client: Arc<dyn ProtocolClient>,
    market: Arc<Marketplace>,
}

impl SubmissionRouter {
    pub fn new(client: Arc<dyn ProtocolClient>, market: Arc<Marketplace>) -> Self {
        Self { client, market }
    }

    pub async fn dispatch(&self, plan: &SubmitPlan) -> Result<SubmitOutcome, SubmitError> {
        info!(
            function = %plan.function,
            entries = plan.entries.len(),
            "dispatching submission"
        );
        let outcome = self.route(plan).await;
        if let Err(err) = &outcome {
            error!(function = %plan.function, error = %err, "submission failed");
        }
        outcome
    }

    async fn route(&self, plan: &SubmitPlan) -> Result<SubmitOutcome, SubmitError> {
        match plan.function {
            SubmitFunction::RegisterIp => self.handle_register_ip(single(plan)?).await,
            SubmitFunction::MintAndRegisterIp => {
                self.handle_mint_and_register_ip(single(plan)?).await
            }
            SubmitFunction::RegisterIpWithPil => {
                self.handle_register_ip_with_pil(single(plan)?).await
            }
            SubmitFunction::BatchMintAndRegister => {
                self.handle_batch_mint_and_register(&plan.entries).await
            }
            SubmitFunction::RegisterDerivative => {
                self.handle_register_derivative(single(plan)?).await
            }
            SubmitFunction::MintAndRegisterDerivative => {
                self.handle_mint_and_register_derivative(single(plan)?).await
            }
            SubmitFunction::RegisterDerivativeWithLicenseTokens => {
                self.handle_derivative_with_license_tokens(single(plan)?)
                    .await
            }
            SubmitFunction::AttachPilToIp => self.handle_attach_pil_to_ip(single(plan)?).await,
            SubmitFunction::RegisterPil => self.handle_register_pil(single(plan)?).await,
            SubmitFunction::MintLicenseTokens => {
                self.handle_mint_license_tokens(single(plan)?).await
            }
            SubmitFunction::ListRoyaltyTokens => {
                self.handle_list_royalty_tokens(single(plan)?).await
            }
            SubmitFunction::ClaimRevenue => self.handle_claim_revenue(single(plan)?).await,
            SubmitFunction::PayRoyalty => self.handle_pay_royalty(single(plan)?).await,
        }
    }

    async fn handle_register_ip(
        &self,
        entry: &CompletedEntry,
    ) -> Result<SubmitOutcome, SubmitError> {
        let fields = Fields(&entry.answers);
        let request = RegisterIpRequest {
            nft_contract: fields.address("nft_contract")?,
            nft_token_id: TokenId(fields.u64_value("nft_token_id")?),
            metadata: shape_metadata(&fields)?,
        };
        let pil = attached_pil(entry)?;

        let register = self
            .client
            .register_ip(request)
            .await
            .map_err(SubmitError::Client)?;
        let mut receipts = vec![register];

        // Registering terms and attaching them are separate protocol calls;
        // both receipts join the response.
        if let Some(terms) = pil {
            let ip_id = receipts[0]
                .ip_id
                .clone()
                .ok_or_else(|| SubmitError::Client(anyhow::anyhow!("receipt carried no ip id")))?;
            let registered = self
                .client
                .register_pil_terms(terms)
                .await
                .map_err(SubmitError::Client)?;
            let terms_id = registered.license_terms_ids.first().copied().ok_or_else(|| {
                SubmitError::Client(anyhow::anyhow!("receipt carried no license terms id"))
            })?;
            receipts.push(registered);
            let attached = self
                .client
                .attach_license_terms(AttachTermsRequest {
                    ip_id,
                    license_terms_id: terms_id,
                })
                .await
                .map_err(SubmitError::Client)?;
            receipts.push(attached);
        }
        Ok(SubmitOutcome::Receipts(receipts))
    }

    async fn handle_mint_and_register_ip(
        &self,
        entry: &CompletedEntry,
    ) -> Result<SubmitOutcome, SubmitError> {
        let receipt = self.mint_one(entry).await?;
        Ok(SubmitOutcome::Receipts(vec![receipt]))
    }

    // Shared by the single and batch mint flows.
    async fn mint_one(&self, entry: &CompletedEntry) -> Result<TxReceipt, SubmitError> {
        let fields = Fields(&entry.answers);
        let request = MintAndRegisterIpRequest {
            spg_collection: fields.address("spg_collection")?,
            metadata: shape_metadata(&fields)?,
            pil: attached_pil(entry)?,
        };
        self.client
            .mint_and_register_ip(request)
            .await
            .map_err(SubmitError::Client)
    }

    async fn handle_register_ip_with_pil(
        &self,
        entry: &CompletedEntry,
    ) -> Result<SubmitOutcome, SubmitError> {
        let fields = Fields(&entry.answers);
        let request = MintAndRegisterIpRequest {
            spg_collection: fields.address("spg_collection")?,
            metadata: shape_metadata(&fields)?,
            pil: Some(template_terms(&fields, false)?),
        };
        let receipt = self
            .client
            .mint_and_register_ip(request)
            .await
            .map_err(SubmitError::Client)?;
        Ok(SubmitOutcome::Receipts(vec![receipt]))
    }

    /// Entries go out one at a time in queue order. A failure stops the
    /// batch where it stands: receipts for the registered prefix ride along
    /// on the error, and nothing is rolled back.
    async fn handle_batch_mint_and_register(
        &self,
        entries: &[CompletedEntry],
    ) -> Result<SubmitOutcome, SubmitError> {
        let mut receipts = Vec::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            match self.mint_one(entry).await {
                Ok(receipt) => receipts.push(receipt),
                Err(source) => {
                    return Err(SubmitError::Batch {
                        completed: receipts,
                        index,
                        source: Box::new(source),
                    });
                }
            }
        }
        Ok(SubmitOutcome::Receipts(receipts))
    }

    async fn handle_register_derivative(
        &self,
        entry: &CompletedEntry,
    ) -> Result<SubmitOutcome, SubmitError> {
        let fields = Fields(&entry.answers);
        let child_ip_id = fields.ip_id("child_ip_id")?;
        let (parent_ip_ids, license_terms_ids) = paired_parents_and_terms(&fields)?;
        let receipt = self
            .client
            .register_derivative(RegisterDerivativeRequest {
                child_ip_id,
                parent_ip_ids,
                license_terms_ids,
            })
            .await
            .map_err(SubmitError::Client)?;
        Ok(SubmitOutcome::Receipts(vec![receipt]))
    }

    async fn handle_mint_and_register_derivative(
        &self,
        entry: &CompletedEntry,
    ) -> Result<SubmitOutcome, SubmitError> {
        let fields = Fields(&entry.answers);
        let spg_collection = fields.address("spg_collection")?;
        let metadata = shape_metadata(&fields)?;
        let (parent_ip_ids, license_terms_ids) = paired_parents_and_terms(&fields)?;
        let receipt = self
            .client
            .mint_and_register_derivative(MintAndRegisterDerivativeRequest {
                spg_collection,
                metadata,
                parent_ip_ids,
                license_terms_ids,
            })
            .await
            .map_err(SubmitError::Client)?;
        Ok(SubmitOutcome::Receipts(vec![receipt]))
    }

    async fn handle_derivative_with_license_tokens(
        &self,
        entry: &CompletedEntry,
    ) -> Result<SubmitOutcome, SubmitError> {
        let fields = Fields(&entry.answers);
        let license_token_ids = fields.token_id_list("license_token_ids")?;
        if license_token_ids.is_empty() {
            return Err(SubmitError::MissingField("license_token_ids"));
        }
        let receipt = self
            .client
            .register_derivative_with_license_tokens(DerivativeWithTokensRequest {
                child_ip_id: fields.ip_id("child_ip_id")?,
                license_token_ids,
            })
            .await
            .map_err(SubmitError::Client)?;
        Ok(SubmitOutcome::Receipts(vec![receipt]))
    }

    async fn handle_attach_pil_to_ip(
        &self,
        entry: &CompletedEntry,
    ) -> Result<SubmitOutcome, SubmitError> {
        let fields = Fields(&entry.answers);
        let ip_id = fields.ip_id("ip_id")?;
        match fields.text("terms_source")? {
            "Existing terms ID" => {
                let receipt = self
                    .client
                    .attach_license_terms(AttachTermsRequest {
                        ip_id,
                        license_terms_id: LicenseTermsId(fields.u64_value("license_terms_id")?),
                    })
                    .await
                    .map_err(SubmitError::Client)?;
                Ok(SubmitOutcome::Receipts(vec![receipt]))
            }
            "New terms" => {
                let terms = template_terms(&fields, false)?;
                let registered = self
                    .client
                    .register_pil_terms(terms)
                    .await
                    .map_err(SubmitError::Client)?;
                let terms_id =
                    registered.license_terms_ids.first().copied().ok_or_else(|| {
                        SubmitError::Client(anyhow::anyhow!("receipt carried no license terms id"))
                    })?;
                let attached = self
                    .client
                    .attach_license_terms(AttachTermsRequest {
                        ip_id,
                        license_terms_id: terms_id,
                    })
                    .await
                    .map_err(SubmitError::Client)?;
                Ok(SubmitOutcome::Receipts(vec![registered, attached]))
            }
            other => Err(SubmitError::InvalidField {
                field: "terms_source",
                reason: format!("unknown source '{other}'"),
            }),
        }
    }

    async fn handle_register_pil(
        &self,
        entry: &CompletedEntry,
    ) -> Result<SubmitOutcome, SubmitError> {
        let fields = Fields(&entry.answers);
        let terms = template_terms(&fields, true)?;
        let receipt = self
            .client
            .register_pil_terms(terms)
            .await
            .map_err(SubmitError::Client)?;
        Ok(SubmitOutcome::Receipts(vec![receipt]))
    }

    async fn handle_mint_license_tokens(
        &self,
        entry: &CompletedEntry,
    ) -> Result<SubmitOutcome, SubmitError> {
        let fields = Fields(&entry.answers);
        let amount = fields.u64_value("amount")?;
        if amount == 0 {
            return Err(SubmitError::InvalidField {
                field: "amount",
                reason: "must mint at least one token".to_owned(),
            });
        }
        let receipt = self
            .client
            .mint_license_tokens(MintLicenseTokensRequest {
                licensor_ip_id: fields.ip_id("licensor_ip_id")?,
                license_terms_id: LicenseTermsId(fields.u64_value("license_terms_id")?),
                amount,
                receiver: fields.address("receiver")?,
            })
            .await
            .map_err(SubmitError::Client)?;
        Ok(SubmitOutcome::Receipts(vec![receipt]))
    }

    async fn handle_list_royalty_tokens(
        &self,
        entry: &CompletedEntry,
    ) -> Result<SubmitOutcome, SubmitError> {
        let fields = Fields(&entry.answers);
        let listing = self
            .market
            .create_listing(NewListing {
                ip_id: fields.ip_id("ip_id")?,
                royalty_vault: fields.address("royalty_vault")?,
                nft_contract: fields.address("nft_contract")?,
                nft_token_id: TokenId(fields.u64_value("nft_token_id")?),
                percentage_to_sell: fields.f64_value("percentage_to_sell")?,
                price_per_token_ip: fields.f64_value("price_per_token_ip")?,
            })
            .await?;
        Ok(SubmitOutcome::Listed(listing))
    }

    async fn handle_claim_revenue(
        &self,
        entry: &CompletedEntry,
    ) -> Result<SubmitOutcome, SubmitError> {
        let fields = Fields(&entry.answers);
        let child_ip_ids = match fields.text_opt("child_ip_ids") {
            Some(_) => fields.ip_id_list("child_ip_ids")?,
            None => Vec::new(),
        };
        let options = fields.multi("claim_options");
        // No boxes ticked means claim everything available.
        let all = options.is_empty();
        let receipt = self
            .client
            .claim_revenue(ClaimRevenueRequest {
                ancestor_ip_id: fields.ip_id("ancestor_ip_id")?,
                claimer: fields.address("claimer")?,
                child_ip_ids,
                from_snapshots: all || options.iter().any(|o| o == "Unclaimed snapshots"),
                from_wallet_balance: all || options.iter().any(|o| o == "Wallet balance"),
            })
            .await
            .map_err(SubmitError::Client)?;
        Ok(SubmitOutcome::Receipts(vec![receipt]))
    }

    async fn handle_pay_royalty(
        &self,
        entry: &CompletedEntry,
    ) -> Result<SubmitOutcome, SubmitError> {
        let fields = Fields(&entry.answers);
        let payer_ip_id = match fields.text_opt("payer_ip_id") {
            Some(_) => Some(fields.ip_id("payer_ip_id")?),
            None => None,
        };
        let receipt = self
            .client
            .pay_royalty(PayRoyaltyRequest {
                receiver_ip_id: fields.ip_id("receiver_ip_id")?,
                payer_ip_id,
                amount_wei: fields.wei_amount("amount_ip")?,
            })
            .await
            .map_err(SubmitError::Client)?;
        Ok(SubmitOutcome::Receipts(vec![receipt]))
    }
}

fn single(plan: &SubmitPlan) -> Result<&CompletedEntry, SubmitError> {
    match plan.entries.as_slice() {
        [entry] => Ok(entry),
        _ => Err(SubmitError::SingleEntryOnly(plan.function.as_str())),
    }
}

fn paired_parents_and_terms(
    fields: &Fields<'_>,
) -> Result<(Vec<IpId>, Vec<LicenseTermsId>), SubmitError> {
    let parents = fields.ip_id_list("parent_ip_ids")?;
    let terms = fields.terms_id_list("license_terms_ids")?;
    if parents.is_empty() {
        return Err(SubmitError::MissingField("parent_ip_ids"));
    }
    if parents.len() != terms.len() {
        return Err(SubmitError::ListLengthMismatch {
            parents: parents.len(),
            terms: terms.len(),
        });
    }
    Ok((parents, terms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ipf_cards::find_card;
    use ipf_market::{InMemoryListingStore, ListingStore};
    use ipf_protocol_client::{RecordedCall, StaticProtocolClient};
    use ipf_wizard::WizardSession;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn addr(n: u8) -> String {
        format!("0x{n:040x}")
    }

    fn entry(pairs: &[(&str, &str)]) -> CompletedEntry {
        CompletedEntry {
            answers: pairs
                .iter()
                .map(|(k, v)| ((*k).to_owned(), AnswerValue::Text((*v).to_owned())))
                .collect(),
            pil: None,
        }
    }

    fn plan(function: SubmitFunction, entries: Vec<CompletedEntry>) -> SubmitPlan {
        SubmitPlan { function, entries }
    }

    struct Rig {
        client: Arc<StaticProtocolClient>,
        store: Arc<InMemoryListingStore>,
        router: SubmissionRouter,
    }

    fn rig() -> Rig {
        let client = Arc::new(StaticProtocolClient::default());
        let store = Arc::new(InMemoryListingStore::default());
        let market = Arc::new(Marketplace::new(store.clone(), client.clone()));
        let router = SubmissionRouter::new(client.clone(), market);
        Rig {
            client,
            store,
            router,
        }
    }

    #[test]
    fn id_list_parsing_drops_blanks_and_trims() {
        assert_eq!(parse_id_list("0x1, 0x2 ,,0x3"), vec!["0x1", "0x2", "0x3"]);
        assert_eq!(parse_id_list("  "), Vec::<String>::new());
        assert_eq!(parse_id_list("a"), vec!["a"]);
    }

    #[tokio::test]
    async fn derivative_parity_mismatch_fails_before_any_call() -> anyhow::Result<()> {
        let rig = rig();
        let entry = entry(&[
            ("child_ip_id", &addr(1)),
            ("parent_ip_ids", &format!("{}, {}", addr(2), addr(3))),
            ("license_terms_ids", "7"),
        ]);
        let err = rig
            .router
            .dispatch(&plan(SubmitFunction::RegisterDerivative, vec![entry]))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SubmitError::ListLengthMismatch {
                parents: 2,
                terms: 1
            }
        ));
        assert_eq!(rig.client.call_count().await, 0);
        Ok(())
    }

    #[tokio::test]
    async fn derivative_dispatch_parses_both_id_lists() -> anyhow::Result<()> {
        let rig = rig();
        let entry = entry(&[
            ("child_ip_id", &addr(1)),
            ("parent_ip_ids", &format!(" {} ,, {}", addr(2), addr(3))),
            ("license_terms_ids", "7, 9"),
        ]);
        rig.router
            .dispatch(&plan(SubmitFunction::RegisterDerivative, vec![entry]))
            .await?;

        let calls = rig.client.calls().await;
        assert!(matches!(
            &calls[0],
            RecordedCall::RegisterDerivative(r)
                if r.parent_ip_ids.len() == 2
                    && r.license_terms_ids == vec![LicenseTermsId(7), LicenseTermsId(9)]
        ));
        Ok(())
    }

    #[tokio::test]
    async fn register_ip_basic_metadata_serializes_the_four_fields() -> anyhow::Result<()> {
        let rig = rig();
        let entry = entry(&[
            ("nft_contract", &addr(4)),
            ("nft_token_id", "12"),
            ("metadata_mode", "Basic"),
            ("title", "Stormlight"),
            ("description", "saga"),
            ("external_url", "https://example.org"),
            ("image", "ipfs://cover"),
            ("attach_pil", "No"),
        ]);
        rig.router
            .dispatch(&plan(SubmitFunction::RegisterIp, vec![entry]))
            .await?;

        let calls = rig.client.calls().await;
        assert_eq!(calls.len(), 1);
        let RecordedCall::RegisterIp(request) = &calls[0] else {
            panic!("expected a register_ip call");
        };
        let json = serde_json::to_value(&request.metadata)?;
        let object = json.as_object().expect("metadata is an object");
        let mut keys: Vec<_> = object.keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, ["description", "external_url", "image", "title"]);
        assert_eq!(object["title"], "Stormlight");
        Ok(())
    }

    #[tokio::test]
    async fn register_ip_with_media_mode_carries_the_media_block() -> anyhow::Result<()> {
        let rig = rig();
        let entry = entry(&[
            ("nft_contract", &addr(4)),
            ("nft_token_id", "12"),
            ("metadata_mode", "Media"),
            ("title", "Stormlight"),
            ("description", "saga"),
            ("image", "ipfs://cover"),
            ("media_url", "ipfs://track"),
            ("media_type", "audio/mpeg"),
            ("attach_pil", "No"),
        ]);
        rig.router
            .dispatch(&plan(SubmitFunction::RegisterIp, vec![entry]))
            .await?;

        let calls = rig.client.calls().await;
        let RecordedCall::RegisterIp(request) = &calls[0] else {
            panic!("expected a register_ip call");
        };
        let media = request.metadata.media.as_ref().expect("media block");
        assert_eq!(media.media_url, "ipfs://track");
        assert_eq!(media.media_type, "audio/mpeg");
        assert_eq!(media.media_hash, "");
        Ok(())
    }

    #[tokio::test]
    async fn register_ip_with_pil_answer_makes_three_calls() -> anyhow::Result<()> {
        let rig = rig();
        let mut with_pil = entry(&[
            ("nft_contract", &addr(4)),
            ("nft_token_id", "12"),
            ("metadata_mode", "Basic"),
            ("title", "t"),
            ("description", "d"),
            ("image", "ipfs://i"),
            ("attach_pil", "Yes"),
        ]);
        with_pil.pil = Some(PilTerms::non_commercial_social_remixing());

        let outcome = rig
            .router
            .dispatch(&plan(SubmitFunction::RegisterIp, vec![with_pil]))
            .await?;

        assert_eq!(outcome.receipts().len(), 3);
        let calls = rig.client.calls().await;
        assert!(matches!(calls[0], RecordedCall::RegisterIp(_)));
        assert!(matches!(calls[1], RecordedCall::RegisterPilTerms(_)));
        assert!(matches!(calls[2], RecordedCall::AttachTerms(_)));
        Ok(())
    }

    #[tokio::test]
    async fn attach_pil_answer_without_terms_is_refused() {
        let rig = rig();
        let no_terms = entry(&[
            ("nft_contract", &addr(4)),
            ("nft_token_id", "12"),
            ("metadata_mode", "Basic"),
            ("title", "t"),
            ("description", "d"),
            ("image", "ipfs://i"),
            ("attach_pil", "Yes"),
        ]);
        let err = rig
            .router
            .dispatch(&plan(SubmitFunction::RegisterIp, vec![no_terms]))
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::MissingField("pil")));
    }

    #[tokio::test]
    async fn batch_dispatch_registers_every_entry_in_order() -> anyhow::Result<()> {
        let rig = rig();
        let entries: Vec<CompletedEntry> = ["first", "second", "third"]
            .iter()
            .map(|title| {
                entry(&[
                    ("spg_collection", &addr(9)),
                    ("title", title),
                    ("description", "d"),
                    ("image", "ipfs://i"),
                    ("attach_pil", "No"),
                ])
            })
            .collect();

        let outcome = rig
            .router
            .dispatch(&plan(SubmitFunction::BatchMintAndRegister, entries))
            .await?;

        assert_eq!(outcome.receipts().len(), 3);
        let calls = rig.client.calls().await;
        assert_eq!(calls.len(), 3);
        assert!(matches!(
            &calls[1],
            RecordedCall::MintAndRegisterIp(r) if r.metadata.title == "second"
        ));
        Ok(())
    }

    #[tokio::test]
    async fn wizard_register_more_flow_reaches_batch_handler_with_all_entries()
    -> anyhow::Result<()> {
        let rig = rig();
        let mut session = WizardSession::new(find_card("batch-mint-and-register")?);
        for title in ["first", "second"] {
            session.answer("spg_collection", AnswerValue::Text(addr(9)))?;
            session.answer("title", AnswerValue::Text(title.to_owned()))?;
            session.answer("description", AnswerValue::Text("d".to_owned()))?;
            session.answer("image", AnswerValue::Text("ipfs://i".to_owned()))?;
            session.answer("attach_pil", AnswerValue::Choice("No".to_owned()))?;
            session.register_more()?;
        }
        session.answer("spg_collection", AnswerValue::Text(addr(9)))?;
        session.answer("title", AnswerValue::Text("third".to_owned()))?;
        session.answer("description", AnswerValue::Text("d".to_owned()))?;
        session.answer("image", AnswerValue::Text("ipfs://i".to_owned()))?;
        session.answer("attach_pil", AnswerValue::Choice("No".to_owned()))?;

        let batched = session.batch_len();
        let plan = session.begin_submit()?;
        assert_eq!(plan.entries.len(), batched + 1);

        let outcome = rig.router.dispatch(&plan).await?;
        assert_eq!(outcome.receipts().len(), 3);
        assert_eq!(rig.client.call_count().await, 3);
        Ok(())
    }

    struct FailsOnSecondMint {
        inner: StaticProtocolClient,
        minted: AtomicUsize,
    }

    #[async_trait]
    impl ProtocolClient for FailsOnSecondMint {
        fn chain(&self) -> &str {
            self.inner.chain()
        }
        async fn register_ip(&self, req: RegisterIpRequest) -> anyhow::Result<TxReceipt> {
            self.inner.register_ip(req).await
        }
        async fn mint_and_register_ip(
            &self,
            req: MintAndRegisterIpRequest,
        ) -> anyhow::Result<TxReceipt> {
            if self.minted.fetch_add(1, Ordering::SeqCst) == 1 {
                anyhow::bail!("execution reverted in executeBatch")
            }
            self.inner.mint_and_register_ip(req).await
        }
        async fn register_derivative(
            &self,
            req: RegisterDerivativeRequest,
        ) -> anyhow::Result<TxReceipt> {
            self.inner.register_derivative(req).await
        }
        async fn mint_and_register_derivative(
            &self,
            req: MintAndRegisterDerivativeRequest,
        ) -> anyhow::Result<TxReceipt> {
            self.inner.mint_and_register_derivative(req).await
        }
        async fn register_derivative_with_license_tokens(
            &self,
            req: DerivativeWithTokensRequest,
        ) -> anyhow::Result<TxReceipt> {
            self.inner.register_derivative_with_license_tokens(req).await
        }
        async fn register_pil_terms(&self, terms: PilTerms) -> anyhow::Result<TxReceipt> {
            self.inner.register_pil_terms(terms).await
        }
        async fn attach_license_terms(
            &self,
            req: AttachTermsRequest,
        ) -> anyhow::Result<TxReceipt> {
            self.inner.attach_license_terms(req).await
        }
        async fn mint_license_tokens(
            &self,
            req: MintLicenseTokensRequest,
        ) -> anyhow::Result<TxReceipt> {
            self.inner.mint_license_tokens(req).await
        }
        async fn transfer_royalty_tokens(
            &self,
            req: ipf_protocol_client::TransferRoyaltyTokensRequest,
        ) -> anyhow::Result<TxReceipt> {
            self.inner.transfer_royalty_tokens(req).await
        }
        async fn claim_revenue(&self, req: ClaimRevenueRequest) -> anyhow::Result<TxReceipt> {
            self.inner.claim_revenue(req).await
        }
        async fn pay_royalty(&self, req: PayRoyaltyRequest) -> anyhow::Result<TxReceipt> {
            self.inner.pay_royalty(req).await
        }
    }

    #[tokio::test]
    async fn batch_failure_reports_index_and_registered_prefix() {
        let client = Arc::new(FailsOnSecondMint {
            inner: StaticProtocolClient::default(),
            minted: AtomicUsize::new(0),
        });
        let store = Arc::new(InMemoryListingStore::default());
        let market = Arc::new(Marketplace::new(store, client.clone()));
        let router = SubmissionRouter::new(client, market);

        let entries: Vec<CompletedEntry> = ["a", "b", "c"]
            .iter()
            .map(|title| {
                entry(&[
                    ("spg_collection", &addr(9)),
                    ("title", title),
                    ("description", "d"),
                    ("image", "ipfs://i"),
                    ("attach_pil", "No"),
                ])
            })
            .collect();

        let err = router
            .dispatch(&plan(SubmitFunction::BatchMintAndRegister, entries))
            .await
            .unwrap_err();
        let SubmitError::Batch {
            completed, index, ..
        } = err
        else {
            panic!("expected a batch error");
        };
        assert_eq!(index, 1);
        assert_eq!(completed.len(), 1);
    }

    #[tokio::test]
    async fn attach_pil_routes_on_terms_source() -> anyhow::Result<()> {
        let rig = rig();
        let existing = entry(&[
            ("ip_id", &addr(5)),
            ("terms_source", "Existing terms ID"),
            ("license_terms_id", "42"),
        ]);
        rig.router
            .dispatch(&plan(SubmitFunction::AttachPilToIp, vec![existing]))
            .await?;

        let fresh = entry(&[
            ("ip_id", &addr(5)),
            ("terms_source", "New terms"),
            ("license_template", "Commercial use"),
        ]);
        rig.router
            .dispatch(&plan(SubmitFunction::AttachPilToIp, vec![fresh]))
            .await?;

        let calls = rig.client.calls().await;
        assert!(matches!(
            &calls[0],
            RecordedCall::AttachTerms(r) if r.license_terms_id == LicenseTermsId(42)
        ));
        assert!(matches!(calls[1], RecordedCall::RegisterPilTerms(_)));
        assert!(matches!(calls[2], RecordedCall::AttachTerms(_)));
        Ok(())
    }

    #[tokio::test]
    async fn register_pil_commercial_requires_fee_and_share() {
        let rig = rig();
        let missing_fee = entry(&[("license_template", "Commercial remix")]);
        let err = rig
            .router
            .dispatch(&plan(SubmitFunction::RegisterPil, vec![missing_fee]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SubmitError::MissingField("rev_share_percent")
        ));

        let bad_share = entry(&[
            ("license_template", "Commercial remix"),
            ("rev_share_percent", "120"),
            ("minting_fee_ip", "1"),
        ]);
        let err = rig
            .router
            .dispatch(&plan(SubmitFunction::RegisterPil, vec![bad_share]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SubmitError::InvalidField {
                field: "rev_share_percent",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn register_pil_builds_terms_from_template_answers() -> anyhow::Result<()> {
        let rig = rig();
        let remix = entry(&[
            ("license_template", "Commercial remix"),
            ("rev_share_percent", "15"),
            ("minting_fee_ip", "2.5"),
        ]);
        rig.router
            .dispatch(&plan(SubmitFunction::RegisterPil, vec![remix]))
            .await?;

        let calls = rig.client.calls().await;
        let RecordedCall::RegisterPilTerms(terms) = &calls[0] else {
            panic!("expected a register_pil_terms call");
        };
        assert!(terms.commercial_use);
        assert!(terms.derivatives_allowed);
        assert_eq!(terms.commercial_rev_share_percent, 15);
        assert_eq!(terms.default_minting_fee.amount_ip(), Some("2.5"));
        Ok(())
    }

    #[tokio::test]
    async fn mint_license_tokens_rejects_zero_amount() {
        let rig = rig();
        let zero = entry(&[
            ("licensor_ip_id", &addr(6)),
            ("license_terms_id", "3"),
            ("amount", "0"),
            ("receiver", &addr(7)),
        ]);
        let err = rig
            .router
            .dispatch(&plan(SubmitFunction::MintLicenseTokens, vec![zero]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SubmitError::InvalidField { field: "amount", .. }
        ));
    }

    #[tokio::test]
    async fn list_royalty_tokens_persists_a_listing() -> anyhow::Result<()> {
        let rig = rig();
        let listing_entry = entry(&[
            ("ip_id", &addr(8)),
            ("royalty_vault", &addr(9)),
            ("nft_contract", &addr(10)),
            ("nft_token_id", "77"),
            ("percentage_to_sell", "25"),
            ("price_per_token_ip", "0.5"),
        ]);
        let outcome = rig
            .router
            .dispatch(&plan(SubmitFunction::ListRoyaltyTokens, vec![listing_entry]))
            .await?;

        let SubmitOutcome::Listed(listing) = outcome else {
            panic!("expected a listing outcome");
        };
        assert_eq!(listing.percentage_to_sell, 25.0);
        assert_eq!(rig.client.call_count().await, 0);
        let stored = rig.store.load(&listing.id).await?;
        assert!(stored.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn pay_royalty_converts_ip_amount_to_wei() -> anyhow::Result<()> {
        let rig = rig();
        let payment = entry(&[
            ("receiver_ip_id", &addr(11)),
            ("amount_ip", "1.5"),
        ]);
        rig.router
            .dispatch(&plan(SubmitFunction::PayRoyalty, vec![payment]))
            .await?;

        let calls = rig.client.calls().await;
        assert!(matches!(
            &calls[0],
            RecordedCall::PayRoyalty(r)
                if r.amount_wei == 1_500_000_000_000_000_000 && r.payer_ip_id.is_none()
        ));
        Ok(())
    }

    #[tokio::test]
    async fn claim_revenue_defaults_to_claiming_everything() -> anyhow::Result<()> {
        let rig = rig();
        let claim = entry(&[
            ("ancestor_ip_id", &addr(12)),
            ("claimer", &addr(13)),
        ]);
        rig.router
            .dispatch(&plan(SubmitFunction::ClaimRevenue, vec![claim]))
            .await?;

        let calls = rig.client.calls().await;
        assert!(matches!(
            &calls[0],
            RecordedCall::ClaimRevenue(r) if r.from_snapshots && r.from_wallet_balance
        ));
        Ok(())
    }

    #[tokio::test]
    async fn single_entry_functions_refuse_batches() {
        let rig = rig();
        let entries = vec![
            entry(&[("license_template", "Non-commercial social remixing")]),
            entry(&[("license_template", "Commercial use")]),
        ];
        let err = rig
            .router
            .dispatch(&plan(SubmitFunction::RegisterPil, entries))
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::SingleEntryOnly("register-pil")));
    }
}
