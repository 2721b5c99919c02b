use ipf_api_types::{AnswerValue, PilTerms, SummaryRowView, SummaryView};
use ipf_cards::{CardConfig, FieldRule, Question, QuestionKind, SubmitFunction, field_rule};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("card has no question '{0}'")]
    UnknownQuestion(String),
    #[error("question '{0}' is hidden for the current answers")]
    HiddenQuestion(String),
    #[error("'{value}' is not an option of question '{question_id}'")]
    NotAnOption { question_id: String, value: String },
    #[error("question '{question_id}' expects a {expected} answer")]
    WrongAnswerShape {
        question_id: String,
        expected: &'static str,
    },
    #[error("uploaded file for question '{0}' has no content")]
    EmptyFile(String),
    #[error("required question '{0}' is unanswered")]
    Unanswered(String),
    #[error("already at the first step")]
    AtFirstStep,
    #[error("already at the review step")]
    AtReview,
    #[error("current step is incomplete")]
    StepIncomplete,
    #[error("card '{0}' does not support queueing multiple entries")]
    BatchUnsupported(String),
    #[error("minting fee is set by creator; enter an amount before attaching")]
    MintingFeeUnset,
    #[error("license terms were requested but never attached")]
    PilNotAttached,
    #[error("a submission for this session is already in flight")]
    SubmitInProgress,
}

/// Side effect the caller should act on after an answer lands. The engine
/// itself never opens anything; it only reports what the flow asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardEffect {
    OpenPilEditor,
}

impl WizardEffect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenPilEditor => "open_pil_editor",
        }
    }
}

/// One fully answered form, either queued for a batch submission or the
/// in-progress entry at finalize time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedEntry {
    pub answers: BTreeMap<String, AnswerValue>,
    pub pil: Option<PilTerms>,
}

/// Everything a dispatcher needs: which handler to run and the entries to
/// feed it. `entries` is the queued batch followed by the final form.
#[derive(Debug, Clone)]
pub struct SubmitPlan {
    pub function: SubmitFunction,
    pub entries: Vec<CompletedEntry>,
}

/// State for one run through a registration card. Steps index into the
/// currently visible question list, so follow-up questions that appear
/// after a controlling answer slot into the walk without renumbering
/// anything the user already passed.
#[derive(Debug, Clone)]
pub struct WizardSession {
    card: CardConfig,
    step: usize,
    answers: BTreeMap<String, AnswerValue>,
    pil: Option<PilTerms>,
    batch: Vec<CompletedEntry>,
    submitting: bool,
}

impl WizardSession {
    pub fn new(card: CardConfig) -> Self {
        Self {
            card,
            step: 0,
            answers: BTreeMap::new(),
            pil: None,
            batch: Vec::new(),
            submitting: false,
        }
    }

    pub fn card(&self) -> &CardConfig {
        &self.card
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn batch_len(&self) -> usize {
        self.batch.len()
    }

    pub fn pil(&self) -> Option<&PilTerms> {
        self.pil.as_ref()
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    pub fn visible_questions(&self) -> Vec<&Question> {
        self.card
            .questions
            .iter()
            .filter(|q| field_rule(&self.card, q, &self.answers).visible)
            .collect()
    }

    /// The branch-resolved rule for a question given the answers so far.
    pub fn rule_for(&self, question: &Question) -> FieldRule {
        field_rule(&self.card, question, &self.answers)
    }

    /// The question at the current step, or None once the walk has reached
    /// the review position past the last visible question.
    pub fn current_question(&self) -> Option<&Question> {
        self.visible_questions().get(self.step).copied()
    }

    pub fn is_review(&self) -> bool {
        self.step >= self.visible_questions().len()
    }

    /// Records one answer. The value must match the control kind and, for
    /// choices, must be one of the declared options. Returns the effects
    /// the caller should react to.
    pub fn answer(
        &mut self,
        question_id: &str,
        value: AnswerValue,
    ) -> Result<Vec<WizardEffect>, SessionError> {
        let question = self
            .card
            .question(question_id)
            .ok_or_else(|| SessionError::UnknownQuestion(question_id.to_owned()))?;
        if !field_rule(&self.card, question, &self.answers).visible {
            return Err(SessionError::HiddenQuestion(question_id.to_owned()));
        }
        check_shape(question, &value)?;

        let mut effects = Vec::new();
        if question_id == "attach_pil" {
            match value.as_text() {
                Some("Yes") => effects.push(WizardEffect::OpenPilEditor),
                _ => self.pil = None,
            }
        }

        self.answers.insert(question_id.to_owned(), value);
        self.prune_hidden();
        // An edit can hide questions behind the cursor; keep the cursor on
        // the list.
        self.step = self.step.min(self.visible_questions().len());
        Ok(effects)
    }

    // Drops answers whose question just went invisible, so the summary and
    // the submit payload only ever carry live fields. Loops because hiding
    // one controller can hide its own follow-ups.
    fn prune_hidden(&mut self) {
        loop {
            let stale: Vec<String> = self
                .card
                .questions
                .iter()
                .filter(|q| {
                    self.answers.contains_key(&q.id)
                        && !field_rule(&self.card, q, &self.answers).visible
                })
                .map(|q| q.id.clone())
                .collect();
            if stale.is_empty() {
                return;
            }
            for id in &stale {
                self.answers.remove(id);
            }
        }
    }

    /// Gate for the next button: true when the active question is answered
    /// or not required. Always false at the review position, where the
    /// action changes to submit.
    pub fn can_go_next(&self) -> bool {
        let visible = self.visible_questions();
        let Some(question) = visible.get(self.step) else {
            return false;
        };
        let rule = field_rule(&self.card, question, &self.answers);
        if !rule.required {
            return true;
        }
        self.answers
            .get(&question.id)
            .is_some_and(|a| !a.is_empty())
    }

    pub fn next(&mut self) -> Result<(), SessionError> {
        if self.is_review() {
            return Err(SessionError::AtReview);
        }
        if !self.can_go_next() {
            return Err(SessionError::StepIncomplete);
        }
        self.step += 1;
        Ok(())
    }

    /// Moves back one step. Unlike `next` this never checks completion.
    pub fn back(&mut self) -> Result<(), SessionError> {
        if self.step == 0 {
            return Err(SessionError::AtFirstStep);
        }
        self.step -= 1;
        Ok(())
    }

    /// Attaches finished license terms. Terms whose minting fee is still
    /// "set by creator" are refused until an amount is filled in.
    pub fn attach_pil(&mut self, terms: PilTerms) -> Result<(), SessionError> {
        if !terms.default_minting_fee.is_settled() {
            return Err(SessionError::MintingFeeUnset);
        }
        self.pil = Some(terms);
        Ok(())
    }

    pub fn clear_pil(&mut self) {
        self.pil = None;
    }

    fn wants_pil(&self) -> bool {
        self.answers.get("attach_pil").and_then(AnswerValue::as_text) == Some("Yes")
    }

    fn first_missing(&self) -> Option<&Question> {
        self.card.questions.iter().find(|q| {
            let rule = field_rule(&self.card, q, &self.answers);
            rule.visible
                && rule.required
                && !self.answers.get(&q.id).is_some_and(|a| !a.is_empty())
        })
    }

    fn check_complete(&self) -> Result<(), SessionError> {
        if let Some(question) = self.first_missing() {
            return Err(SessionError::Unanswered(question.id.clone()));
        }
        if self.wants_pil() && self.pil.is_none() {
            return Err(SessionError::PilNotAttached);
        }
        Ok(())
    }

    /// Queues the current form for a batch submission and resets the walk
    /// to step zero for the next entry.
    pub fn register_more(&mut self) -> Result<(), SessionError> {
        if !self.card.batch_capable {
            return Err(SessionError::BatchUnsupported(self.card.id.clone()));
        }
        if self.submitting {
            return Err(SessionError::SubmitInProgress);
        }
        self.check_complete()?;
        self.batch.push(CompletedEntry {
            answers: std::mem::take(&mut self.answers),
            pil: self.pil.take(),
        });
        self.step = 0;
        Ok(())
    }

    pub fn summary(&self) -> SummaryView {
        let rows = self
            .visible_questions()
            .into_iter()
            .filter_map(|q| {
                let value = self.answers.get(&q.id)?;
                if value.is_empty() {
                    return None;
                }
                Some(SummaryRowView {
                    question_id: q.id.clone(),
                    prompt: q.prompt.clone(),
                    answer: display_answer(value),
                })
            })
            .collect();
        SummaryView {
            card_id: self.card.id.clone(),
            rows,
            pil: self.pil.clone(),
            batch_len: self.batch.len(),
            total_entries: self.batch.len() + 1,
        }
    }

    /// Builds the dispatch plan: queued batch entries first, then the form
    /// currently on screen. Fails if any visible required question is still
    /// open or requested license terms were never attached.
    pub fn finalize(&self) -> Result<SubmitPlan, SessionError> {
        self.check_complete()?;
        let mut entries = self.batch.clone();
        entries.push(CompletedEntry {
            answers: self.answers.clone(),
            pil: self.pil.clone(),
        });
        Ok(SubmitPlan {
            function: self.card.submit_function,
            entries,
        })
    }

    /// Finalizes and flips the in-flight flag so a second submit for the
    /// same session is refused until `submit_failed` clears it.
    pub fn begin_submit(&mut self) -> Result<SubmitPlan, SessionError> {
        if self.submitting {
            return Err(SessionError::SubmitInProgress);
        }
        let plan = self.finalize()?;
        self.submitting = true;
        Ok(plan)
    }

    /// Re-arms the session after a failed dispatch so the user can retry.
    pub fn submit_failed(&mut self) {
        self.submitting = false;
    }
}

fn check_shape(question: &Question, value: &AnswerValue) -> Result<(), SessionError> {
    let mismatch = |expected: &'static str| SessionError::WrongAnswerShape {
        question_id: question.id.clone(),
        expected,
    };
    match (&question.kind, value) {
        (QuestionKind::Radio { options }, AnswerValue::Choice(picked)) => {
            if options.iter().any(|o| o == picked) {
                Ok(())
            } else {
                Err(SessionError::NotAnOption {
                    question_id: question.id.clone(),
                    value: picked.clone(),
                })
            }
        }
        (QuestionKind::Radio { .. }, _) => Err(mismatch("choice")),
        (QuestionKind::Text | QuestionKind::Textarea, AnswerValue::Text(_)) => Ok(()),
        (QuestionKind::Text | QuestionKind::Textarea, _) => Err(mismatch("text")),
        (QuestionKind::Checkbox { options }, AnswerValue::MultiChoice(picked)) => {
            match picked.iter().find(|p| !options.contains(p)) {
                Some(bad) => Err(SessionError::NotAnOption {
                    question_id: question.id.clone(),
                    value: bad.clone(),
                }),
                None => Ok(()),
            }
        }
        (QuestionKind::Checkbox { .. }, _) => Err(mismatch("multi-choice")),
        (QuestionKind::FileUpload, AnswerValue::FileRef { content_base64, .. }) => {
            if content_base64.is_empty() {
                Err(SessionError::EmptyFile(question.id.clone()))
            } else {
                Ok(())
            }
        }
        (QuestionKind::FileUpload, _) => Err(mismatch("file")),
    }
}

/// Flattens an answer into the one-line form shown on the review screen.
pub fn display_answer(value: &AnswerValue) -> String {
    match value {
        AnswerValue::Text(s) | AnswerValue::Choice(s) => s.clone(),
        AnswerValue::MultiChoice(items) => items.join(", "),
        AnswerValue::FileRef { file_name, .. } => file_name.clone(),
        AnswerValue::Flag(true) => "Yes".to_owned(),
        AnswerValue::Flag(false) => "No".to_owned(),
    }
}
