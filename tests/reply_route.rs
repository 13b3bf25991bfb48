use chrono::{TimeZone, Utc};
use rocket::http::{ContentType, Header, Status};
use rocket::routes;
use serde_json::json;
use std::sync::Arc;
use unibox_server::models::{ReplyResponse, SentStatus};
use unibox_server::routes::unibox::reply_to_record;
use unibox_server::test_support::{
    MockTransport, TestDatabase, TestDatabaseError, TestFixtures, TestRocketBuilder,
};
use unibox_server::transport::MailTransport;

fn owner_header(owner_id: i64) -> Header<'static> {
    Header::new("X-Owner-Id", owner_id.to_string())
}

fn reply_body() -> String {
    json!({
        "to": "them@example.com",
        "subject": "Re: hello",
        "content": "thanks, will do"
    })
    .to_string()
}

async fn provision() -> Option<TestDatabase> {
    match TestDatabase::new().await {
        Ok(db) => Some(db),
        Err(TestDatabaseError::Container(err)) => {
            eprintln!("skipping integration test: container runtime unavailable: {err}");
            None
        }
        Err(err) => panic!("failed to provision test database: {err:?}"),
    }
}

async fn seed_received(
    fixtures: &TestFixtures<'_>,
    owner_id: i64,
    with_smtp: bool,
    message_id: &str,
) -> i64 {
    let account = fixtures
        .insert_account(owner_id, "me@example.com", with_smtp)
        .await
        .expect("account");
    fixtures
        .insert_received_with_message_id(
            owner_id,
            account,
            "hello",
            Utc.with_ymd_and_hms(2026, 2, 10, 10, 0, 0).unwrap(),
            message_id,
        )
        .await
        .expect("received")
}

#[tokio::test]
async fn successful_reply_persists_and_links_the_thread() {
    let Some(test_db) = provision().await else {
        return;
    };
    let pool = test_db.pool_clone();
    let fixtures = TestFixtures::new(&pool);
    let original = seed_received(&fixtures, 1, true, "<orig@example.com>").await;

    let mock = Arc::new(MockTransport::succeeding());
    let client = TestRocketBuilder::new()
        .manage_pg_pool(pool.clone())
        .manage_transport(mock.clone() as Arc<dyn MailTransport>)
        .mount_api_routes(routes![reply_to_record])
        .async_client()
        .await;

    let response = client
        .post(format!("/api/unibox/{original}/reply"))
        .header(ContentType::JSON)
        .header(owner_header(1))
        .body(reply_body())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);

    let reply: ReplyResponse = response.into_json().await.expect("payload");
    assert!(reply.delivery_error.is_none());
    assert_eq!(reply.data.status, SentStatus::Sent);
    assert!(reply.data.message_id.is_some());
    // a first reply roots the thread at the original message
    assert_eq!(reply.data.thread_id.as_deref(), Some("<orig@example.com>"));
    assert_eq!(
        reply.data.in_reply_to.as_deref(),
        Some("<orig@example.com>")
    );

    let (is_replied_to, sent_email_id): (bool, Option<i64>) = sqlx::query_as(
        "SELECT is_replied_to, sent_email_id FROM received_emails WHERE id = $1",
    )
    .bind(original)
    .fetch_one(&pool)
    .await
    .expect("row");
    assert!(is_replied_to);
    assert_eq!(sent_email_id, Some(reply.data.id));

    let deliveries = mock.deliveries();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].to, "them@example.com");
    assert_eq!(
        deliveries[0].in_reply_to.as_deref(),
        Some("<orig@example.com>")
    );
    assert_eq!(
        deliveries[0].references.as_deref(),
        Some("<orig@example.com>")
    );

    drop(client);
    test_db.close().await.expect("failed to drop test database");
}

#[tokio::test]
async fn reply_inherits_an_existing_thread() {
    let Some(test_db) = provision().await else {
        return;
    };
    let pool = test_db.pool_clone();
    let fixtures = TestFixtures::new(&pool);
    let original = seed_received(&fixtures, 1, true, "<second@example.com>").await;
    sqlx::query("UPDATE received_emails SET thread_id = '<root@example.com>' WHERE id = $1")
        .bind(original)
        .execute(&pool)
        .await
        .expect("thread");

    let mock = Arc::new(MockTransport::succeeding());
    let client = TestRocketBuilder::new()
        .manage_pg_pool(pool.clone())
        .manage_transport(mock.clone() as Arc<dyn MailTransport>)
        .mount_api_routes(routes![reply_to_record])
        .async_client()
        .await;

    let reply: ReplyResponse = client
        .post(format!("/api/unibox/{original}/reply"))
        .header(ContentType::JSON)
        .header(owner_header(1))
        .body(reply_body())
        .dispatch()
        .await
        .into_json()
        .await
        .expect("payload");

    assert_eq!(reply.data.thread_id.as_deref(), Some("<root@example.com>"));
    assert_eq!(
        reply.data.in_reply_to.as_deref(),
        Some("<second@example.com>")
    );

    // References chains thread root, then the message being answered
    let deliveries = mock.deliveries();
    assert_eq!(
        deliveries[0].references.as_deref(),
        Some("<root@example.com> <second@example.com>")
    );

    drop(client);
    test_db.close().await.expect("failed to drop test database");
}

#[tokio::test]
async fn failed_delivery_is_durably_recorded() {
    let Some(test_db) = provision().await else {
        return;
    };
    let pool = test_db.pool_clone();
    let fixtures = TestFixtures::new(&pool);
    let original = seed_received(&fixtures, 1, true, "<orig@example.com>").await;

    let mock = Arc::new(MockTransport::failing("connection refused"));
    let client = TestRocketBuilder::new()
        .manage_pg_pool(pool.clone())
        .manage_transport(mock.clone() as Arc<dyn MailTransport>)
        .mount_api_routes(routes![reply_to_record])
        .async_client()
        .await;

    let response = client
        .post(format!("/api/unibox/{original}/reply"))
        .header(ContentType::JSON)
        .header(owner_header(1))
        .body(reply_body())
        .dispatch()
        .await;
    // a transport failure is still a bookkeeping success
    assert_eq!(response.status(), Status::Ok);

    let reply: ReplyResponse = response.into_json().await.expect("payload");
    assert_eq!(reply.data.status, SentStatus::Failed);
    assert!(reply.data.message_id.is_none());
    let error = reply.delivery_error.expect("delivery error surfaced");
    assert!(error.contains("connection refused"), "got: {error}");
    assert_eq!(reply.data.error.as_deref(), Some(error.as_str()));

    // the original is not flagged as answered
    let is_replied_to: bool =
        sqlx::query_scalar("SELECT is_replied_to FROM received_emails WHERE id = $1")
            .bind(original)
            .fetch_one(&pool)
            .await
            .expect("row");
    assert!(!is_replied_to);

    drop(client);
    test_db.close().await.expect("failed to drop test database");
}

#[tokio::test]
async fn incomplete_reply_payloads_are_rejected() {
    let Some(test_db) = provision().await else {
        return;
    };
    let pool = test_db.pool_clone();
    let fixtures = TestFixtures::new(&pool);
    let original = seed_received(&fixtures, 1, true, "<orig@example.com>").await;

    let mock = Arc::new(MockTransport::succeeding());
    let client = TestRocketBuilder::new()
        .manage_pg_pool(pool.clone())
        .manage_transport(mock.clone() as Arc<dyn MailTransport>)
        .mount_api_routes(routes![reply_to_record])
        .async_client()
        .await;

    for body in [
        json!({"subject": "Re: hello", "content": "hi"}),
        json!({"to": "them@example.com", "content": "hi"}),
        json!({"to": "them@example.com", "subject": "Re: hello", "content": "  "}),
    ] {
        let response = client
            .post(format!("/api/unibox/{original}/reply"))
            .header(ContentType::JSON)
            .header(owner_header(1))
            .body(body.to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::BadRequest, "body {body}");
    }

    assert!(mock.deliveries().is_empty());

    // no bookkeeping rows were written for rejected requests
    let sent_rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sent_emails")
        .fetch_one(&pool)
        .await
        .expect("count");
    assert_eq!(sent_rows, 0);

    drop(client);
    test_db.close().await.expect("failed to drop test database");
}

#[tokio::test]
async fn account_without_credentials_is_unprocessable() {
    let Some(test_db) = provision().await else {
        return;
    };
    let pool = test_db.pool_clone();
    let fixtures = TestFixtures::new(&pool);
    let original = seed_received(&fixtures, 1, false, "<orig@example.com>").await;

    let mock = Arc::new(MockTransport::succeeding());
    let client = TestRocketBuilder::new()
        .manage_pg_pool(pool.clone())
        .manage_transport(mock.clone() as Arc<dyn MailTransport>)
        .mount_api_routes(routes![reply_to_record])
        .async_client()
        .await;

    let response = client
        .post(format!("/api/unibox/{original}/reply"))
        .header(ContentType::JSON)
        .header(owner_header(1))
        .body(reply_body())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::UnprocessableEntity);
    assert!(mock.deliveries().is_empty());

    drop(response);
    drop(client);
    test_db.close().await.expect("failed to drop test database");
}

#[tokio::test]
async fn replying_to_a_foreign_record_is_not_found() {
    let Some(test_db) = provision().await else {
        return;
    };
    let pool = test_db.pool_clone();
    let fixtures = TestFixtures::new(&pool);
    let original = seed_received(&fixtures, 1, true, "<orig@example.com>").await;

    let mock = Arc::new(MockTransport::succeeding());
    let client = TestRocketBuilder::new()
        .manage_pg_pool(pool.clone())
        .manage_transport(mock.clone() as Arc<dyn MailTransport>)
        .mount_api_routes(routes![reply_to_record])
        .async_client()
        .await;

    let response = client
        .post(format!("/api/unibox/{original}/reply"))
        .header(ContentType::JSON)
        .header(owner_header(2))
        .body(reply_body())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::NotFound);
    assert!(mock.deliveries().is_empty());

    drop(response);
    drop(client);
    test_db.close().await.expect("failed to drop test database");
}
