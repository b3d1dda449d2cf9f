// Terminal chat with Kalorin, sharing the advisor used by the web UI.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::info;
use uuid::Uuid;

use crate::advisor::{AdviceError, Advisor, Consultation, Profile};
use crate::session::SessionStore;
use crate::transcript::Role;

const RESET_COMMAND: &str = "/reset";
const QUIT_COMMAND: &str = "/quit";
const HISTORY_COMMAND: &str = "/history";

// The web wording points at the sidebar, which the terminal does not have.
const MISSING_KEY_MESSAGE: &str = "🔑 --api-key か環境変数 GEMINI_API_KEY で Gemini APIキーを指定してください。";

pub async fn run_terminal_chat(advisor: &Advisor, profile: Profile, api_key: Option<String>) -> Result<()> {
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    run_chat(advisor, profile, api_key, Local::now().date_naive(), stdin, stdout).await
}

/// Reads one question per line until EOF or `/quit`.
pub async fn run_chat<R, W>(
    advisor: &Advisor,
    profile: Profile,
    api_key: Option<String>,
    today: NaiveDate,
    input: R,
    mut output: W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    info!("Starting terminal chat session...");
    let sessions = SessionStore::new();
    let session_id = Uuid::new_v4();

    let intro = match profile.target_kcal(today) {
        Ok(target) => format!("🔵 目標摂取カロリー: {target} kcal\n"),
        Err(_) => String::new(),
    };
    output
        .write_all(format!("🧡 カロりんに聞いてみよう（{RESET_COMMAND} で履歴リセット、{QUIT_COMMAND} で終了）\n{intro}").as_bytes())
        .await?;

    let mut lines = input.lines();
    loop {
        output.write_all("🍩 > ".as_bytes()).await?;
        output.flush().await?;

        let Some(line) = lines.next_line().await.context("Failed to read from input")? else {
            break;
        };
        let question = line.trim();

        match question {
            "" => continue,
            QUIT_COMMAND => break,
            RESET_COMMAND => {
                sessions.reset(session_id).await;
                output.write_all("🧹 チャット履歴をリセットしました\n".as_bytes()).await?;
                continue;
            }
            HISTORY_COMMAND => {
                let transcript = sessions.transcript(session_id).await;
                output.write_all(format!("{}\n", transcript.render_plain()).as_bytes()).await?;
                continue;
            }
            _ => {}
        }

        let consultation = Consultation {
            profile: profile.clone(),
            question: question.to_string(),
            api_key: api_key.clone(),
        };
        let reply = match advisor.ask(&sessions, session_id, &consultation, today).await {
            Ok(advice) => format!("{}\n{}\n", Role::Assistant.display_name(), advice.answer),
            Err(AdviceError::MissingApiKey) => format!("{MISSING_KEY_MESSAGE}\n"),
            Err(e) => format!("{}\n", e.user_message()),
        };
        output.write_all(reply.as_bytes()).await?;
    }

    output.flush().await?;
    info!("Chat session finished.");
    Ok(())
}
