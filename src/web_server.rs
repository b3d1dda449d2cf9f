use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    extract::{Form, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    serve, Router,
};
use chrono::{Local, NaiveDate};
use minijinja::Environment;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use uuid::Uuid;

use crate::advisor::{earliest_deadline, Advisor, Consultation, Profile};
use crate::calories::{ExerciseLevel, MAX_WEIGHT_KG, MIN_WEIGHT_KG};
use crate::constants::{self, SESSION_COOKIE};
use crate::session::SessionStore;
use crate::transcript::Role;

// Shared application state
#[derive(Clone)]
pub struct AppState {
    templates: Arc<Environment<'static>>,
    sessions: Arc<SessionStore>,
    advisor: Arc<Advisor>,
    today: fn() -> NaiveDate,
}

impl AppState {
    pub fn new(advisor: Advisor) -> Result<Self> {
        let templates = create_minijinja_env().context("Failed to initialize template engine")?;
        Ok(Self {
            templates: Arc::new(templates),
            sessions: Arc::new(SessionStore::with_limits(
                Duration::from_secs(*constants::KALORIN_SESSION_TTL_SECS),
                *constants::KALORIN_MAX_SESSIONS,
            )),
            advisor: Arc::new(advisor),
            today: local_today,
        })
    }

    /// Replaces the clock used for deadline checks.
    pub fn with_today(mut self, today: fn() -> NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }
}

fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

fn create_minijinja_env() -> Result<Environment<'static>> {
    let mut env = Environment::new();
    // `.html` names get HTML auto-escaping, which covers model output too
    env.add_template("index.html", include_str!("../templates/index.html"))?;
    Ok(env)
}

/// Fields posted by the chat page.
#[derive(Debug, Deserialize)]
pub struct AskForm {
    #[serde(default)]
    pub api_key: String,
    pub weight_kg: u32,
    pub goal_weight_kg: u32,
    pub deadline: NaiveDate,
    #[serde(default)]
    pub exercise: ExerciseLevel,
    #[serde(default)]
    pub food_today: String,
    #[serde(default)]
    pub question: String,
    pub show_prompt: Option<String>,
    pub show_response: Option<String>,
}

impl AskForm {
    fn profile(&self) -> Profile {
        Profile {
            weight_kg: self.weight_kg,
            goal_weight_kg: self.goal_weight_kg,
            deadline: self.deadline,
            exercise: self.exercise,
            food_today: self.food_today.clone(),
        }
    }
}

#[derive(Serialize)]
struct ExerciseOption {
    value: &'static str,
    label: &'static str,
    selected: bool,
}

#[derive(Serialize)]
struct TurnView {
    role: Role,
    content: String,
}

/// Everything the page needs besides the transcript.
///
/// The posted API key is never part of it, so the page cannot echo it back.
struct PageView {
    profile: Profile,
    api_key_given: bool,
    question: String,
    error: Option<String>,
    show_prompt: bool,
    show_response: bool,
    prompt: Option<String>,
    raw_response: Option<String>,
}

impl PageView {
    fn new(profile: Profile) -> Self {
        Self {
            profile,
            api_key_given: false,
            question: String::new(),
            error: None,
            show_prompt: false,
            show_response: false,
            prompt: None,
            raw_response: None,
        }
    }
}

async fn render_page(state: &AppState, session_id: Uuid, view: PageView) -> Result<Html<String>, Response> {
    let today = (state.today)();
    let transcript = state.sessions.transcript(session_id).await;
    let turns: Vec<TurnView> = transcript
        .turns()
        .iter()
        .map(|turn| TurnView {
            role: turn.role,
            content: turn.content.clone(),
        })
        .collect();
    let exercise_options: Vec<ExerciseOption> = ExerciseLevel::ALL
        .into_iter()
        .map(|level| ExerciseOption {
            value: level.keyword(),
            label: level.label(),
            selected: level == view.profile.exercise,
        })
        .collect();
    let target_kcal = view.profile.target_kcal(today).ok();
    let estimated_intake_kcal = view.profile.estimated_intake_kcal();
    let needs_api_key = !view.api_key_given && !state.advisor.has_fallback_api_key();

    let context = minijinja::context! {
        title => "カロりんに聞いてみよう",
        assistant_name => Role::Assistant.display_name(),
        min_weight => MIN_WEIGHT_KG,
        max_weight => MAX_WEIGHT_KG,
        min_deadline => earliest_deadline(today).to_string(),
        profile => minijinja::context! {
            weight_kg => view.profile.weight_kg,
            goal_weight_kg => view.profile.goal_weight_kg,
            deadline => view.profile.deadline.to_string(),
            food_today => view.profile.food_today,
        },
        exercise_options => exercise_options,
        target_kcal => target_kcal,
        estimated_intake_kcal => estimated_intake_kcal,
        needs_api_key => needs_api_key,
        question => view.question,
        error => view.error,
        show_prompt => view.show_prompt,
        show_response => view.show_response,
        prompt => view.prompt,
        raw_response => view.raw_response,
        turns => turns,
    };

    state
        .templates
        .get_template("index.html")
        .and_then(|tmpl| tmpl.render(context))
        .map(Html)
        .map_err(|e| {
            error!("Failed to get or render template: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Html(format!("Internal Server Error: {}", e))).into_response()
        })
}

/// Reads the session id from the cookie header, minting a new one if absent.
fn session_id(headers: &HeaderMap) -> (Uuid, bool) {
    let existing = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .and_then(|(_, value)| Uuid::parse_str(value).ok());

    match existing {
        Some(id) => (id, false),
        None => (Uuid::new_v4(), true),
    }
}

fn with_session_cookie(mut response: Response, id: Uuid, is_new: bool) -> Response {
    if is_new {
        let cookie = format!("{SESSION_COOKIE}={id}; Path=/; HttpOnly; SameSite=Lax");
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }
    response
}

async fn index_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let (id, is_new) = session_id(&headers);
    let view = PageView::new(Profile::default_for((state.today)()));
    let response = match render_page(&state, id, view).await {
        Ok(html) => html.into_response(),
        Err(response) => response,
    };
    with_session_cookie(response, id, is_new)
}

async fn ask_handler(State(state): State<AppState>, headers: HeaderMap, Form(form): Form<AskForm>) -> Response {
    let (id, is_new) = session_id(&headers);
    let today = (state.today)();
    let profile = form.profile();

    let mut view = PageView::new(profile.clone());
    view.api_key_given = !form.api_key.trim().is_empty();
    view.show_prompt = form.show_prompt.is_some();
    view.show_response = form.show_response.is_some();

    if !form.question.trim().is_empty() {
        let consultation = Consultation {
            profile,
            question: form.question.clone(),
            api_key: Some(form.api_key.clone()),
        };
        match state.advisor.ask(&state.sessions, id, &consultation, today).await {
            Ok(advice) => {
                if view.show_prompt {
                    view.prompt = Some(advice.prompt);
                }
                if view.show_response {
                    view.raw_response = Some(advice.raw_response.unwrap_or(advice.answer));
                }
            }
            Err(e) => {
                if view.show_prompt {
                    view.prompt = e.prompt().map(str::to_string);
                }
                view.question = form.question;
                view.error = Some(e.user_message());
            }
        }
    }

    let response = match render_page(&state, id, view).await {
        Ok(html) => html.into_response(),
        Err(response) => response,
    };
    with_session_cookie(response, id, is_new)
}

async fn reset_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let (id, is_new) = session_id(&headers);
    state.sessions.reset(id).await;
    info!(session_id = %id, "Transcript reset");
    with_session_cookie(Redirect::to("/").into_response(), id, is_new)
}

async fn health_handler() -> &'static str {
    "ok"
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/ask", post(ask_handler))
        .route("/reset", post(reset_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http()) // Add request logging
}

pub async fn start_web_server(host: [u8; 4], port: u16, state: AppState) -> Result<()> {
    let app = build_router(state);

    let addr = SocketAddr::from((host, port));
    info!("Web server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context(format!("Failed to bind to address {}", addr))?;

    serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl-C received, initiating shutdown...");
            }
        })
        .await
        .context("Web server failed")?;

    info!("Shutdown complete.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_from_cookie() {
        let id = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("theme=dark; {SESSION_COOKIE}={id}")).unwrap(),
        );
        assert_eq!(session_id(&headers), (id, false));
    }

    #[test]
    fn test_session_id_minted_when_missing_or_garbled() {
        let (_, is_new) = session_id(&HeaderMap::new());
        assert!(is_new);

        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("kalorin_session=not-a-uuid"));
        assert!(session_id(&headers).1);
    }

    #[test]
    fn test_templates_parse() {
        assert!(create_minijinja_env().is_ok());
    }
}
