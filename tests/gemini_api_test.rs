use std::time::Duration;

use kalorin::gemini::{GeminiClient, ModelError, TextGenerator};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ENDPOINT: &str = "/v1beta/models/gemini-2.0-flash-lite:generateContent";

fn client_for(server: &MockServer) -> GeminiClient {
    GeminiClient::new(server.uri(), "gemini-2.0-flash-lite", Duration::from_secs(5)).unwrap()
}

#[test_log::test(tokio::test)]
async fn test_generate_sends_prompt_and_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .and(header("x-goog-api-key", "secret-key"))
        .and(body_json(json!({"contents": [{"parts": [{"text": "ドーナツ食べていい？"}]}]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "1個ならOKだよ♪\n"}]},
                "finishReason": "STOP"
            }],
            "modelVersion": "gemini-2.0-flash-lite"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let answer = client_for(&server)
        .generate("secret-key", "ドーナツ食べていい？")
        .await
        .unwrap();

    assert_eq!(answer, "1個ならOKだよ♪");
}

#[test_log::test(tokio::test)]
async fn test_complete_keeps_raw_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": {"parts": [{"text": "少しならいいよ"}]},
                "finishReason": "STOP"
            }],
            "modelVersion": "gemini-2.0-flash-lite-001"
        })))
        .mount(&server)
        .await;

    let completion = client_for(&server).complete("key", "prompt").await.unwrap();

    assert_eq!(completion.text, "少しならいいよ");
    let raw = completion.raw.unwrap();
    assert!(raw.contains("STOP"));
    assert!(raw.contains("gemini-2.0-flash-lite-001"));
}

#[test_log::test(tokio::test)]
async fn test_generate_reports_api_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(400).set_body_string("API key not valid"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client_for(&server).generate("bad-key", "prompt").await.unwrap_err();

    match err {
        ModelError::Api { status, body } => {
            assert_eq!(status.as_u16(), 400);
            assert_eq!(body, "API key not valid");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test_log::test(tokio::test)]
async fn test_generate_rejects_blocked_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"finishReason": "SAFETY"}]
        })))
        .mount(&server)
        .await;

    let err = client_for(&server).generate("key", "prompt").await.unwrap_err();
    assert!(matches!(err, ModelError::EmptyResponse));
}

#[test_log::test(tokio::test)]
async fn test_generate_reports_malformed_json() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = client_for(&server).generate("key", "prompt").await.unwrap_err();
    assert!(matches!(err, ModelError::Http(_)));
}

#[test_log::test(tokio::test)]
async fn test_generate_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let client = GeminiClient::new(server.uri(), "gemini-2.0-flash-lite", Duration::from_millis(200)).unwrap();
    let err = client.generate("key", "prompt").await.unwrap_err();
    match err {
        ModelError::Http(e) => assert!(e.is_timeout()),
        other => panic!("unexpected error: {other:?}"),
    }
}
