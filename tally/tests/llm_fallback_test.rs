//! Model-first parsing against a mocked OpenAI-compatible endpoint.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tally::config::ParserConfig;
use tally::llm::{CommandModel, LlmProvider};
use tally::models::{keys, Frequency, Intent, ParseSource, PaymentType};
use tally::parser::CommandParser;

fn parser(server: &MockServer, ai_timeout_ms: u64) -> CommandParser {
    let provider = LlmProvider::new(Some(&common::llm_config(server.uri())));
    assert!(provider.is_available());
    let model: Arc<dyn CommandModel> = Arc::new(provider);
    let config = ParserConfig {
        ai_timeout_ms,
        ..Default::default()
    };
    CommandParser::new(Some(model), &config)
}

#[tokio::test]
async fn test_tool_call_is_used_with_full_confidence() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::tool_call(json!({
            "intent": "CREATE",
            "entities": {
                "name": "Netflix",
                "amount": 15.99,
                "currency": "GBP",
                "frequency": "monthly",
                "payment_type": "subscription"
            }
        }))))
        .expect(1)
        .mount(&server)
        .await;

    let command = parser(&server, 3000)
        .parse("Add Netflix for £15.99 monthly", None)
        .await
        .unwrap();

    assert_eq!(command.source, ParseSource::Ai);
    assert_eq!(command.confidence, 1.0);
    assert_eq!(command.intent, Intent::Create);
    assert_eq!(command.name(), Some("Netflix"));
    assert_eq!(command.number(keys::AMOUNT), Some(15.99));
    assert_eq!(command.frequency(), Some(Frequency::Monthly));
    assert_eq!(command.payment_type(), Some(PaymentType::Subscription));
}

#[tokio::test]
async fn test_server_error_falls_back_to_rules() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let command = parser(&server, 3000)
        .parse("Add Netflix for £15.99 monthly", None)
        .await
        .unwrap();

    assert_eq!(command.source, ParseSource::Rules);
    assert!(command.confidence < 1.0);
    assert_eq!(command.intent, Intent::Create);
    assert_eq!(command.name(), Some("Netflix"));
    assert_eq!(command.number(keys::AMOUNT), Some(15.99));
}

#[tokio::test]
async fn test_slow_model_falls_back_within_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(common::tool_call(json!({ "intent": "SUMMARY", "entities": {} })))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let started = std::time::Instant::now();
    let command = parser(&server, 200)
        .parse("cancel netflix", None)
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(command.source, ParseSource::Rules);
    assert_eq!(command.intent, Intent::Delete);
    assert_eq!(command.name(), Some("Netflix"));
}

#[tokio::test]
async fn test_unusable_arguments_fall_back_to_rules() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(common::tool_call(json!({ "intent": "TELEPORT", "entities": {} }))),
        )
        .mount(&server)
        .await;

    let command = parser(&server, 3000)
        .parse("pause spotify", None)
        .await
        .unwrap();

    assert_eq!(command.source, ParseSource::Rules);
    assert_eq!(command.intent, Intent::Pause);
}

#[tokio::test]
async fn test_blank_input_never_reaches_the_model() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let result = parser(&server, 3000).parse("   ", None).await;
    assert!(matches!(result, Err(tally::error::TallyError::EmptyInput)));
}
