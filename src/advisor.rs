//! One consultation: profile + question in, Kalorin's answer out.
//!
//! The transcript only grows after the model has answered: the user turn and
//! the assistant turn are appended together, so a failed call leaves the
//! session untouched.

use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::calories::{self, CalorieError, ExerciseLevel};
use crate::gemini::{Completion, ModelError, TextGenerator};
use crate::prompt::{self, PromptInputs};
use crate::session::SessionStore;
use crate::transcript::{ChatTurn, Transcript};

#[derive(Debug, Error)]
pub enum AdviceError {
    #[error("question is empty")]
    EmptyQuestion,
    #[error(transparent)]
    Profile(#[from] CalorieError),
    #[error("no API key was provided")]
    MissingApiKey,
    #[error("failed to render prompt: {0}")]
    Prompt(#[from] minijinja::Error),
    #[error("{source}")]
    Model { source: ModelError, prompt: String },
}

impl AdviceError {
    /// Inline message shown to the user.
    pub fn user_message(&self) -> String {
        match self {
            AdviceError::EmptyQuestion => "🍩 今食べたいものを入力してね。".to_string(),
            AdviceError::Profile(CalorieError::DeadlineNotInFuture { .. }) => {
                "⚠️ 達成期限が過ぎています。未来の日付を選んでください。".to_string()
            }
            AdviceError::Profile(CalorieError::WeightOutOfRange(_)) => format!(
                "⚠️ 体重は{}〜{}kgで入力してください。",
                calories::MIN_WEIGHT_KG,
                calories::MAX_WEIGHT_KG
            ),
            AdviceError::Profile(err) => format!("⚠️ {err}"),
            AdviceError::MissingApiKey => "🔑 左のサイドバーで Gemini APIキーを入力してください。".to_string(),
            AdviceError::Prompt(err) => format!("エラー発生: {err}"),
            AdviceError::Model { source, .. } => format!("エラー発生: {source}"),
        }
    }

    /// The prompt that was sent when the failure came from the model call.
    pub fn prompt(&self) -> Option<&str> {
        match self {
            AdviceError::Model { prompt, .. } => Some(prompt),
            _ => None,
        }
    }
}

/// What the user told us about themselves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub weight_kg: u32,
    pub goal_weight_kg: u32,
    pub deadline: NaiveDate,
    pub exercise: ExerciseLevel,
    #[serde(default)]
    pub food_today: String,
}

impl Profile {
    /// Starting values of the form: 60 kg → 55 kg, eight weeks after tomorrow.
    pub fn default_for(today: NaiveDate) -> Self {
        Self {
            weight_kg: 60,
            goal_weight_kg: 55,
            deadline: earliest_deadline(today) + Duration::weeks(8),
            exercise: ExerciseLevel::default(),
            food_today: String::new(),
        }
    }

    /// Exercise-adjusted daily target.
    pub fn target_kcal(&self, today: NaiveDate) -> Result<i64, CalorieError> {
        let weight = calories::check_weight(self.weight_kg)?;
        let goal = calories::check_weight(self.goal_weight_kg)?;
        let base = calories::target_calories(weight.into(), goal.into(), self.deadline, today)?;
        Ok(self.exercise.adjust(base))
    }

    pub fn estimated_intake_kcal(&self) -> u32 {
        calories::estimate_food_calories(&self.food_today)
    }
}

/// First selectable deadline.
pub fn earliest_deadline(today: NaiveDate) -> NaiveDate {
    today + Duration::days(1)
}

#[derive(Debug, Clone)]
pub struct Consultation {
    pub profile: Profile,
    pub question: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Advice {
    pub target_kcal: i64,
    pub estimated_intake_kcal: u32,
    pub prompt: String,
    pub answer: String,
    pub raw_response: Option<String>,
}

pub struct Advisor {
    generator: Arc<dyn TextGenerator>,
    fallback_api_key: Option<String>,
    include_history: bool,
}

impl Advisor {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator,
            fallback_api_key: None,
            include_history: false,
        }
    }

    pub fn with_fallback_api_key(mut self, key: Option<String>) -> Self {
        self.fallback_api_key = key.filter(|k| !k.trim().is_empty());
        self
    }

    pub fn with_history(mut self, include_history: bool) -> Self {
        self.include_history = include_history;
        self
    }

    pub fn has_fallback_api_key(&self) -> bool {
        self.fallback_api_key.is_some()
    }

    /// Runs one consultation against `history` without touching it.
    pub async fn consult(
        &self,
        history: &Transcript,
        consultation: &Consultation,
        today: NaiveDate,
    ) -> Result<Advice, AdviceError> {
        let question = consultation.question.trim();
        if question.is_empty() {
            return Err(AdviceError::EmptyQuestion);
        }

        let profile = &consultation.profile;
        let target_kcal = profile.target_kcal(today)?;

        let api_key = consultation
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .or(self.fallback_api_key.as_deref())
            .ok_or(AdviceError::MissingApiKey)?;

        let estimated_intake_kcal = profile.estimated_intake_kcal();
        let prompt = prompt::build_prompt(&PromptInputs {
            food_today: &profile.food_today,
            exercise: profile.exercise,
            target_kcal,
            estimated_intake_kcal,
            question,
            history: self.include_history.then_some(history),
        })?;
        debug!(%prompt, "Built consultation prompt");

        let Completion { text, raw } = match self.generator.complete(api_key, &prompt).await {
            Ok(completion) => completion,
            Err(source) => return Err(AdviceError::Model { source, prompt }),
        };

        Ok(Advice {
            target_kcal,
            estimated_intake_kcal,
            prompt,
            answer: text,
            raw_response: raw,
        })
    }

    /// Consults and, on success only, appends the question and answer to the session.
    ///
    /// A reset that lands while the model is answering wins: the turns are dropped.
    pub async fn ask(
        &self,
        sessions: &SessionStore,
        session_id: Uuid,
        consultation: &Consultation,
        today: NaiveDate,
    ) -> Result<Advice, AdviceError> {
        let (history, generation) = sessions.checkout(session_id).await;
        match self.consult(&history, consultation, today).await {
            Ok(advice) => {
                let appended = sessions
                    .append(
                        session_id,
                        generation,
                        [
                            ChatTurn::user(consultation.question.trim()),
                            ChatTurn::assistant(advice.answer.clone()),
                        ],
                    )
                    .await;
                if appended {
                    info!(%session_id, target_kcal = advice.target_kcal, "Consultation answered");
                } else {
                    info!(%session_id, "Session was reset while the model was answering; turns dropped");
                }
                Ok(advice)
            }
            Err(e) => {
                warn!(%session_id, error = %e, "Consultation failed");
                Err(e)
            }
        }
    }
}
