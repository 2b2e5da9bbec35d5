//! Full-stack command pipeline over libsql with a mocked embeddings API.

mod common;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tally::agent::CommandPipeline;
use tally::models::{Intent, Outcome};

async fn pipeline(dir: &tempfile::TempDir, server: &MockServer) -> CommandPipeline {
    let config = common::config(dir, server.uri());
    let db = common::open_db(dir).await;
    CommandPipeline::from_config(&config, db).expect("pipeline should wire")
}

#[tokio::test]
async fn test_create_then_cancel_it() {
    let server = MockServer::start().await;
    common::mount_embeddings(&server).await;
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(&dir, &server).await;
    assert!(!pipeline.uses_model());

    let created = pipeline
        .handle_command("Add Netflix £15.99 monthly", "alice", "s1")
        .await;
    assert!(created.success, "{}", created.message);
    assert_eq!(created.intent, Some(Intent::Create));
    let data = created.data.expect("created payment is returned");
    assert_eq!(data["name"], "Netflix");
    assert_eq!(data["currency"], "GBP");
    assert_eq!(data["payment_type"], "subscription");

    let deleted = pipeline.handle_command("cancel it", "alice", "s1").await;
    assert!(deleted.success, "{}", deleted.message);
    assert_eq!(deleted.intent, Some(Intent::Delete));
    assert_eq!(deleted.message, "Deleted Netflix.");

    let listed = pipeline.handle_command("list my payments", "alice", "s1").await;
    assert_eq!(listed.intent, Some(Intent::Read));
    assert_eq!(listed.message, "You don't have any payments yet.");
}

#[tokio::test]
async fn test_new_session_resolves_reference_from_history() {
    let server = MockServer::start().await;
    common::mount_embeddings(&server).await;
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(&dir, &server).await;

    let created = pipeline
        .handle_command("Add Spotify £10.99 monthly", "alice", "morning")
        .await;
    assert!(created.success, "{}", created.message);

    let paused = pipeline.handle_command("pause it", "alice", "evening").await;
    assert!(paused.success, "{}", paused.message);
    assert_eq!(paused.intent, Some(Intent::Pause));
    assert_eq!(paused.data.unwrap()["is_active"], false);
}

#[tokio::test]
async fn test_history_never_crosses_users() {
    let server = MockServer::start().await;
    common::mount_embeddings(&server).await;
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(&dir, &server).await;

    pipeline
        .handle_command("Add Spotify £10.99 monthly", "alice", "s1")
        .await;

    let result = pipeline.handle_command("pause it", "bob", "s1").await;
    assert_eq!(result.outcome, Outcome::Clarification);
    assert!(!result.success);
}

#[tokio::test]
async fn test_embedding_outage_degrades_to_recent_turns() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(500).set_body_string("down"))
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(&dir, &server).await;

    let created = pipeline
        .handle_command("Add Netflix £15.99 monthly", "alice", "s1")
        .await;
    assert!(created.success, "{}", created.message);

    let deleted = pipeline.handle_command("delete it", "alice", "s1").await;
    assert!(deleted.success, "{}", deleted.message);
    assert_eq!(deleted.message, "Deleted Netflix.");
}

#[tokio::test]
async fn test_payments_survive_restart() {
    let server = MockServer::start().await;
    common::mount_embeddings(&server).await;
    let dir = tempfile::tempdir().unwrap();

    {
        let pipeline = pipeline(&dir, &server).await;
        let created = pipeline
            .handle_command("Add credit card debt £200 monthly, total owed £5000", "alice", "s1")
            .await;
        assert!(created.success, "{}", created.message);
    }

    let pipeline = pipeline(&dir, &server).await;
    let found = pipeline.handle_command("show Credit Card", "alice", "s2").await;
    assert!(found.success, "{}", found.message);
    let data = found.data.unwrap();
    assert_eq!(data["payment_type"], "debt");
    assert_eq!(data["total_owed"], 5000.0);
    assert_eq!(data["remaining_balance"], 5000.0);

    let summary = pipeline.handle_command("give me a summary", "alice", "s2").await;
    assert!(summary.success, "{}", summary.message);
    assert_eq!(summary.intent, Some(Intent::Summary));
}
