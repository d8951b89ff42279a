// ABOUTME: Integration tests for dumping a user from a real PostgreSQL database
// ABOUTME: Builds the user tables in a throwaway schema and checks the generated SQL

use pg_user_dump::dump::{self, DumpError, FailurePolicy, Identifier, TableCatalog};
use pg_user_dump::postgres::{connect, RowSource};
use std::env;

/// Helper to get test PostgreSQL URL from environment
fn get_test_database_url() -> Option<String> {
    env::var("TEST_DATABASE_URL").ok()
}

/// Create the user tables inside a fresh schema and point the session at it
async fn setup_schema(client: &tokio_postgres::Client, schema: &str) -> anyhow::Result<()> {
    client
        .batch_execute(&format!(
            "
            DROP SCHEMA IF EXISTS {schema} CASCADE;
            CREATE SCHEMA {schema};
            SET search_path TO {schema};

            CREATE TABLE users (
                id BIGINT PRIMARY KEY,
                email TEXT NOT NULL,
                balance NUMERIC(12, 2),
                avatar BYTEA,
                last_sign_in_ip INET,
                tags TEXT[],
                created_at TIMESTAMPTZ NOT NULL
            );
            CREATE TABLE accounts (
                id TEXT PRIMARY KEY,
                user_id BIGINT,
                active BOOLEAN NOT NULL
            );
            CREATE TABLE user_identities (
                id SERIAL PRIMARY KEY,
                user_id BIGINT NOT NULL,
                provider TEXT NOT NULL,
                display_name TEXT
            );
            CREATE TABLE app_auth_tokens (
                id UUID PRIMARY KEY,
                user_id BIGINT NOT NULL,
                expires_at TIMESTAMP
            );
            CREATE TABLE user_preferences (
                user_id BIGINT PRIMARY KEY,
                settings JSONB
            );

            INSERT INTO users VALUES
                (42, 'ada@example.com', 1234.50, '\\x4869', '10.0.0.1', '{{admin,\"o''k\"}}',
                 '2024-01-02 03:04:05.678+00'),
                (43, 'bob@example.com', NULL, NULL, NULL, NULL, '2024-02-02 00:00:00+00');
            INSERT INTO accounts VALUES
                ('acct_42', 42, true),
                ('acct_orphan', NULL, false),
                ('acct_deleted', 77, false);
            INSERT INTO user_identities (user_id, provider, display_name) VALUES
                (42, 'github', 'O''Neil'),
                (42, 'google', NULL),
                (43, 'github', NULL);
            "
        ))
        .await?;
    Ok(())
}

async fn teardown_schema(client: &tokio_postgres::Client, schema: &str) {
    let _ = client
        .batch_execute(&format!("DROP SCHEMA IF EXISTS {} CASCADE", schema))
        .await;
}

#[tokio::test]
#[ignore]
async fn test_dump_user_from_postgres() {
    let url = match get_test_database_url() {
        Some(url) => url,
        None => {
            println!("Skipping test: TEST_DATABASE_URL not set");
            return;
        }
    };

    let client = connect(&url).await.expect("Failed to connect");
    let schema = "pg_user_dump_it_dump";
    setup_schema(&client, schema).await.expect("Failed to set up schema");

    let catalog = TableCatalog::user_tables().unwrap();
    let result = dump::run(
        &client,
        &Identifier::User("42".into()),
        &catalog,
        FailurePolicy::Abort,
    )
    .await;

    teardown_schema(&client, schema).await;
    let output = result.expect("Dump failed");

    assert_eq!(output.user_id, "42");
    assert!(output.text.contains(
        "INSERT INTO \"users\" (id, email, balance, avatar, last_sign_in_ip, tags, created_at) \
         VALUES ('42', 'ada@example.com', '1234.50', '\\x4869', '10.0.0.1', \
         '{\"admin\",\"o''k\"}', '2024-01-02T03:04:05Z');"
    ));
    assert!(output
        .text
        .contains("INSERT INTO \"accounts\" (id, user_id, active) VALUES ('acct_42', '42', true);"));
    assert_eq!(output.text.matches("INSERT INTO \"user_identities\"").count(), 2);
    assert!(output.text.contains("'O''Neil'"));
    assert!(output.text.contains("-- Insert for app_auth_tokens\n\n"));
    assert!(!output.text.contains("INSERT INTO \"app_auth_tokens\""));
}

#[tokio::test]
#[ignore]
async fn test_resolve_account_from_postgres() {
    let url = match get_test_database_url() {
        Some(url) => url,
        None => {
            println!("Skipping test: TEST_DATABASE_URL not set");
            return;
        }
    };

    let client = connect(&url).await.expect("Failed to connect");
    let schema = "pg_user_dump_it_resolve";
    setup_schema(&client, schema).await.expect("Failed to set up schema");

    let found = dump::resolve_user_id(&client, &Identifier::Account("acct_42".into())).await;
    let orphan = dump::resolve_user_id(&client, &Identifier::Account("acct_orphan".into())).await;
    let deleted_owner =
        dump::resolve_user_id(&client, &Identifier::Account("acct_deleted".into())).await;
    let missing_user = dump::resolve_user_id(&client, &Identifier::User("999".into())).await;
    let bad_user = dump::resolve_user_id(&client, &Identifier::User("abc".into())).await;
    let no_row = client
        .fetch_optional("SELECT id FROM users WHERE id = $1", "7")
        .await;

    teardown_schema(&client, schema).await;

    assert_eq!(found.unwrap(), "42");
    assert_eq!(
        orphan.unwrap_err().downcast_ref::<DumpError>(),
        Some(&DumpError::AccountNotFound("acct_orphan".into()))
    );
    assert_eq!(
        deleted_owner.unwrap_err().downcast_ref::<DumpError>(),
        Some(&DumpError::UserNotFound("77".into()))
    );
    assert_eq!(
        missing_user.unwrap_err().downcast_ref::<DumpError>(),
        Some(&DumpError::UserNotFound("999".into()))
    );
    assert_eq!(
        bad_user.unwrap_err().downcast_ref::<DumpError>(),
        Some(&DumpError::UserNotFound("abc".into()))
    );
    assert_eq!(no_row.unwrap(), None);
}
