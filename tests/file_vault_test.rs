use std::path::Path;
use std::sync::Arc;
use stokvel_session::testing::constants::TEST_USER_ID;
use stokvel_session::testing::{MockTransport, TestTokens};
use stokvel_session::{FileStore, SecureStore, SessionClient, SessionClientFactory, SessionError};

const SECRET: &str = "vault-test-secret";

fn open(path: &Path, secret: &str, transport: &Arc<MockTransport>) -> SessionClient {
    let store: Arc<dyn SecureStore> = Arc::new(FileStore::new(path, secret));
    SessionClientFactory::with_parts(transport.clone(), store, chrono::Duration::minutes(5))
}

#[tokio::test]
async fn test_session_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("session.json");
    let transport = Arc::new(MockTransport::new());
    let access = TestTokens::valid("persisted", 3600);

    let first = open(&path, SECRET, &transport);
    first.session.establish(&access, "R1", Some(3600)).await.unwrap();
    assert_eq!(first.session.current_user_id().await.unwrap(), TEST_USER_ID);
    drop(first);

    let raw = std::fs::read_to_string(&path).unwrap();
    assert!(!raw.contains(&access));
    assert!(!raw.contains("R1\""));

    let second = open(&path, SECRET, &transport);
    assert!(second.session.restore().await);
    assert_eq!(second.session.get_valid_access_token().await.unwrap(), access);
    assert_eq!(second.session.current_user_id().await.unwrap(), TEST_USER_ID);
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn test_wrong_secret_cannot_read_the_vault() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    let transport = Arc::new(MockTransport::new());

    let owner = open(&path, SECRET, &transport);
    owner
        .session
        .establish(&TestTokens::valid("owned", 3600), "R1", None)
        .await
        .unwrap();

    let intruder = open(&path, "another-secret", &transport);
    assert!(!intruder.session.restore().await);
    assert_eq!(
        intruder.session.get_valid_access_token().await,
        Err(SessionError::NotAuthenticated)
    );

    let store = FileStore::new(&path, "another-secret");
    assert!(matches!(
        store.get("access_token").await,
        Err(SessionError::Storage(_))
    ));
}

#[tokio::test]
async fn test_invalidate_clears_persisted_session() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    let transport = Arc::new(MockTransport::new());

    let client = open(&path, SECRET, &transport);
    client
        .session
        .establish(&TestTokens::valid("gone", 3600), "R1", None)
        .await
        .unwrap();
    client.session.invalidate().await.unwrap();

    let reopened = open(&path, SECRET, &transport);
    assert!(!reopened.session.restore().await);
}
