use crate::{CardConfig, Question};
use ipf_api_types::AnswerValue;
use std::collections::BTreeMap;

/// Resolved visibility for one question given the answers so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRule {
    pub visible: bool,
    pub required: bool,
}

impl FieldRule {
    fn shown(required: bool) -> Self {
        Self {
            visible: true,
            required,
        }
    }

    const HIDDEN: Self = Self {
        visible: false,
        required: false,
    };
}

fn choice<'a>(answers: &'a BTreeMap<String, AnswerValue>, question_id: &str) -> Option<&'a str> {
    answers.get(question_id).and_then(AnswerValue::as_text)
}

/// Per-card follow-up field logic. This is deliberately a fixed decision
/// tree over known card/question id pairs, not a rule engine: each arm
/// states one special case the registration flows need.
pub fn field_rule(
    card: &CardConfig,
    question: &Question,
    answers: &BTreeMap<String, AnswerValue>,
) -> FieldRule {
    match (card.id.as_str(), question.id.as_str()) {
        ("register-ip" | "mint-and-register-ip", "media_url" | "media_hash" | "media_type") => {
            if choice(answers, "metadata_mode") == Some("Media") {
                FieldRule::shown(question.id != "media_hash")
            } else {
                FieldRule::HIDDEN
            }
        }
        ("attach-pil-to-ip", "license_terms_id") => {
            if choice(answers, "terms_source") == Some("Existing terms ID") {
                FieldRule::shown(true)
            } else {
                FieldRule::HIDDEN
            }
        }
        ("attach-pil-to-ip", "license_template") => {
            if choice(answers, "terms_source") == Some("New terms") {
                FieldRule::shown(true)
            } else {
                FieldRule::HIDDEN
            }
        }
        ("register-pil", "minting_fee_ip") => match choice(answers, "license_template") {
            Some(template) if template != "Non-commercial social remixing" => {
                FieldRule::shown(true)
            }
            _ => FieldRule::HIDDEN,
        },
        ("register-pil", "rev_share_percent") => {
            if choice(answers, "license_template") == Some("Commercial remix") {
                FieldRule::shown(true)
            } else {
                FieldRule::HIDDEN
            }
        }
        _ => FieldRule::shown(question.required),
    }
}
