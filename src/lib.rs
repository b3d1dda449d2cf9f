//! Kalorin: a nutritionist chat persona that judges whether a snack fits
//! today's calorie budget.
//!
//! The arithmetic lives in [`calories`], the wording sent to the hosted model
//! in [`prompt`], and a full round trip in [`advisor`]. [`web_server`] and
//! [`chat`] are the two front ends.

pub mod advisor;
pub mod calories;
pub mod chat;
pub mod constants;
pub mod gemini;
pub mod prompt;
pub mod session;
pub mod transcript;
pub mod web_server;

pub use advisor::{Advice, AdviceError, Advisor, Consultation, Profile};
pub use calories::{estimate_food_calories, target_calories, CalorieError, ExerciseLevel};
pub use gemini::{GeminiClient, ModelError, TextGenerator};
pub use transcript::{ChatTurn, Role, Transcript};
