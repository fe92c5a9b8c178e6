use httpmock::prelude::*;
use lead_etl::core::campaign::{draft_pitches, PitchGenerator, PitchSender};
use lead_etl::core::dispatcher::{BatchDispatcher, Progress};
use lead_etl::core::template::TemplateEngine;
use lead_etl::core::Record;
use lead_etl::domain::model::{PitchStatus, PitchTemplate, SenderIdentity};
use lead_etl::domain::ports::{PitchStore, QuotaStore};
use lead_etl::{EtlError, MemoryStore, OpenAiClient, SendGridClient};
use std::time::Duration;

fn template() -> PitchTemplate {
    PitchTemplate {
        name: "spring".to_string(),
        subject: "About {{Address}}".to_string(),
        raw_text: "Write to {{Name}} about selling {{Address}}.".to_string(),
    }
}

fn sender_identity() -> SenderIdentity {
    SenderIdentity {
        from_email: "agent@realty.test".to_string(),
        from_name: "DFW Lands".to_string(),
        reply_to: None,
    }
}

fn leads() -> Vec<Record> {
    vec![
        Record::new()
            .with("Name", "Ada")
            .with("Email", "ada@example.com")
            .with("Address", "1 Elm St"),
        Record::new()
            .with("Name", "Bo")
            .with("Email", "bo@example.com")
            .with("Address", "22 Oak Ave"),
        Record::new()
            .with("Name", "Cy")
            .with("Email", "not-an-email")
            .with("Address", "3 Pine Rd"),
    ]
}

fn sender(
    server: &MockServer,
    store: &MemoryStore,
) -> PitchSender<SendGridClient, MemoryStore, MemoryStore> {
    let client = SendGridClient::new(&server.url("/v3/mail/send"), "SG.test").unwrap();
    PitchSender::new(
        client,
        store.clone(),
        store.clone(),
        sender_identity(),
        "Email",
        BatchDispatcher::new(2, Duration::ZERO),
    )
    .with_name_column("Name")
}

#[tokio::test]
async fn test_generate_then_send_updates_quota_and_statuses() {
    let server = MockServer::start();
    let openai_mock = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/chat/completions")
            .header("Authorization", "Bearer sk-test");
        then.status(200).json_body(serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "  Hello from DFW Lands.  " } }]
        }));
    });
    let sendgrid_mock = server.mock(|when, then| {
        when.method(POST)
            .path("/v3/mail/send")
            .header("Authorization", "Bearer SG.test");
        then.status(202).header("X-Message-Id", "msg-1");
    });

    let store = MemoryStore::new();
    store.set_daily_limit("user-1", 10).await.unwrap();

    let openai = OpenAiClient::new(&server.url("/v1"), "sk-test", "gpt-5-mini").unwrap();
    let generator = PitchGenerator::new(openai, Duration::ZERO).unwrap();
    let outcomes = generator
        .generate("user-1", &template(), leads(), |_: Progress| {})
        .await;
    openai_mock.assert_hits(3);

    let pitches: Vec<_> = outcomes.into_iter().map(|o| o.result.unwrap()).collect();
    assert_eq!(pitches[0].subject, "About 1 Elm St");
    assert_eq!(pitches[0].content, "Hello from DFW Lands.");
    assert_eq!(pitches[0].status, PitchStatus::Generated);

    let mut progress = Vec::new();
    let report = sender(&server, &store)
        .send_all("user-1", pitches, |p: Progress| progress.push(p.completed))
        .await
        .unwrap();

    sendgrid_mock.assert_hits(2);
    assert_eq!(report.sent, 2);
    assert_eq!(report.failed, 0);
    assert_eq!(report.skipped, 1);
    assert_eq!(progress, vec![2]);

    let quota = store.get("user-1").await.unwrap();
    assert_eq!(quota.sent_today, 2);
    assert_eq!(quota.remaining(), 8);

    let stored = store.pitches_for_user("user-1").await.unwrap();
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|p| p.status == PitchStatus::Sent));
    assert!(stored.iter().all(|p| p.message_id.as_deref() == Some("msg-1")));
    assert!(stored.iter().all(|p| p.email_sent_at.is_some()));
}

#[tokio::test]
async fn test_quota_is_checked_before_any_email_is_sent() {
    let server = MockServer::start();
    let sendgrid_mock = server.mock(|when, then| {
        when.method(POST).path("/v3/mail/send");
        then.status(202);
    });

    let store = MemoryStore::new();
    store.set_daily_limit("user-1", 1).await.unwrap();

    let engine = TemplateEngine::new().unwrap();
    let pitches = draft_pitches(&engine, "user-1", &template(), &leads());

    let err = sender(&server, &store)
        .send_all("user-1", pitches, |_: Progress| {})
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        EtlError::QuotaExceeded {
            remaining: 1,
            requested: 2
        }
    ));
    sendgrid_mock.assert_hits(0);
    assert_eq!(store.get("user-1").await.unwrap().sent_today, 0);
    assert!(store.pitches_for_user("user-1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_provider_rejection_marks_only_that_pitch_failed() {
    let server = MockServer::start();
    let rejected = server.mock(|when, then| {
        when.method(POST)
            .path("/v3/mail/send")
            .body_contains("bo@example.com");
        then.status(400).json_body(serde_json::json!({
            "errors": [{ "message": "Does not contain a valid address." }]
        }));
    });
    let accepted = server.mock(|when, then| {
        when.method(POST)
            .path("/v3/mail/send")
            .body_contains("ada@example.com");
        then.status(202).header("X-Message-Id", "msg-ada");
    });

    let store = MemoryStore::new();
    let engine = TemplateEngine::new().unwrap();
    let pitches = draft_pitches(&engine, "user-1", &template(), &leads());

    let report = sender(&server, &store)
        .send_all("user-1", pitches, |_: Progress| {})
        .await
        .unwrap();

    rejected.assert_hits(1);
    accepted.assert_hits(1);
    assert_eq!(report.sent, 1);
    assert_eq!(report.failed, 1);
    assert!(report.outcomes[0].is_success());
    assert!(matches!(
        report.outcomes[1].result,
        Err(EtlError::ProviderError { ref message, .. }) if message == "Does not contain a valid address."
    ));

    assert_eq!(store.get("user-1").await.unwrap().sent_today, 1);

    let stored = store.pitches_for_user("user-1").await.unwrap();
    let failed = stored
        .iter()
        .find(|p| p.status == PitchStatus::Failed)
        .unwrap();
    assert_eq!(
        failed.error_message.as_deref(),
        Some("Does not contain a valid address.")
    );
    assert!(failed.email_sent_at.is_none());
}

#[tokio::test]
async fn test_rows_without_valid_emails_are_rejected() {
    let server = MockServer::start();
    let store = MemoryStore::new();
    let engine = TemplateEngine::new().unwrap();
    let rows = vec![Record::new().with("Name", "Cy").with("Email", "not-an-email")];
    let pitches = draft_pitches(&engine, "user-1", &template(), &rows);

    let err = sender(&server, &store)
        .send_all("user-1", pitches, |_: Progress| {})
        .await
        .unwrap_err();

    assert!(matches!(err, EtlError::ValidationError { ref message } if message == "No valid emails to send"));
}
