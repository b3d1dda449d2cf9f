use minijinja::Environment;
use serde::Serialize;

use crate::calories::ExerciseLevel;
use crate::transcript::Transcript;

const PROMPT_SOURCE: &str = include_str!("../templates/prompt.txt");

/// Values interpolated into the prompt verbatim.
#[derive(Debug, Clone)]
pub struct PromptInputs<'a> {
    pub food_today: &'a str,
    pub exercise: ExerciseLevel,
    pub target_kcal: i64,
    pub estimated_intake_kcal: u32,
    pub question: &'a str,
    pub history: Option<&'a Transcript>,
}

#[derive(Serialize)]
struct PromptContext<'a> {
    food_today: &'a str,
    exercise: &'static str,
    target_kcal: i64,
    estimated_intake_kcal: u32,
    question: &'a str,
    history: String,
}

pub fn build_prompt(inputs: &PromptInputs<'_>) -> Result<String, minijinja::Error> {
    let context = PromptContext {
        food_today: inputs.food_today,
        exercise: inputs.exercise.label(),
        target_kcal: inputs.target_kcal,
        estimated_intake_kcal: inputs.estimated_intake_kcal,
        question: inputs.question,
        history: inputs.history.map(Transcript::render_plain).unwrap_or_default(),
    };

    // Templates loaded from a string are not auto-escaped.
    let env = Environment::new();
    let rendered = env.template_from_str(PROMPT_SOURCE)?.render(context)?;
    Ok(rendered.trim().to_string())
}
