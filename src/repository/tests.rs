use super::*;
use crate::connect::test_support::{
    oauth1_factory, oauth2_factory_with_token_url, test_registry, AlphaApi, BetaApi,
};
use crate::connect::{
    Connection, ConnectionCredentials, ConnectionFactory, ConnectionData,
    ConnectionFactoryRegistry, ConnectionKey, ServiceProfile,
};
use crate::credentials::TokenCipher;
use crate::error::ConnectError;
use chrono::{Duration, Utc};
use mockito::Server;
use std::collections::HashSet;
use std::sync::Arc;
use tempfile::tempdir;

fn cipher(byte: u8) -> TokenCipher {
    TokenCipher::from_key_bytes(&[byte; 32]).unwrap()
}

fn repository() -> UsersConnectionRepository {
    UsersConnectionRepository::new(":memory:", Arc::new(test_registry()), cipher(7)).unwrap()
}

fn alpha_data(provider_user_id: &str, access_token: &str) -> ConnectionData {
    ConnectionData {
        provider_id: "p1".to_string(),
        provider_user_id: provider_user_id.to_string(),
        display_name: Some(format!("User {}", provider_user_id)),
        profile_url: Some(format!("https://alpha.example/{}", provider_user_id)),
        image_url: None,
        access_token: access_token.to_string(),
        secret: None,
        refresh_token: Some(format!("refresh-{}", access_token)),
        expire_time: None,
    }
}

fn alpha(registry: &ConnectionFactoryRegistry, data: &ConnectionData) -> Connection<AlphaApi> {
    registry
        .lookup_by_api_type::<AlphaApi>()
        .unwrap()
        .create_connection_from_data(data)
        .unwrap()
}

fn add_alpha(users: &UsersConnectionRepository, local_user_id: &str, provider_user_id: &str) {
    let connection = alpha(users.registry(), &alpha_data(provider_user_id, "AT"));
    users
        .scope_to_user(local_user_id)
        .add_connection(&connection)
        .unwrap();
}

#[test]
fn test_add_then_find_all() {
    let users = repository();
    add_alpha(&users, "local-1", "U42");

    let all = users.scope_to_user("local-1").find_all_connections().unwrap();
    assert_eq!(all.len(), 2);
    assert!(all["beta"].is_empty());
    assert_eq!(all["p1"].len(), 1);
    assert_eq!(all["p1"][0].key(), &ConnectionKey::new("p1", "U42"));
    assert_eq!(all["p1"][0].display_name(), Some("User U42"));
}

#[test]
fn test_find_all_for_unknown_user_has_empty_entries() {
    let users = repository();
    add_alpha(&users, "local-1", "U42");

    let all = users.scope_to_user("nobody").find_all_connections().unwrap();
    assert_eq!(all.keys().cloned().collect::<Vec<_>>(), vec!["beta", "p1"]);
    assert!(all.values().all(Vec::is_empty));
}

#[test]
fn test_find_connection_restores_tokens() {
    let users = repository();
    let repo = users.scope_to_user("local-1");
    let data = alpha_data("U42", "access-42");
    repo.add_connection(&alpha(users.registry(), &data)).unwrap();

    let found = repo.find_connection(&ConnectionKey::new("p1", "U42")).unwrap();
    assert_eq!(found.create_data(), data);

    let typed = found.downcast::<AlphaApi>().unwrap();
    assert_eq!(typed.api().access_token, "access-42");
}

#[test]
fn test_find_connection_missing() {
    let users = repository();
    let err = users
        .scope_to_user("local-1")
        .find_connection(&ConnectionKey::new("p1", "U42"))
        .unwrap_err();

    assert!(matches!(err, ConnectError::NoSuchConnection(ref key) if key.provider_user_id() == "U42"));
    assert!(err.is_not_found());
}

#[test]
fn test_primary_connection_is_first_added() {
    let users = repository();
    add_alpha(&users, "local-1", "first");
    add_alpha(&users, "local-1", "second");

    let repo = users.scope_to_user("local-1");
    let primary = repo.find_primary_connection::<AlphaApi>().unwrap();
    assert_eq!(primary.key().provider_user_id(), "first");

    let ordered: Vec<String> = repo
        .find_connections_by_api::<AlphaApi>()
        .unwrap()
        .iter()
        .map(|c| c.key().provider_user_id().to_string())
        .collect();
    assert_eq!(ordered, vec!["first", "second"]);

    // Removing the primary promotes the next one
    repo.remove_connection(&ConnectionKey::new("p1", "first")).unwrap();
    let primary = repo.find_primary_connection::<AlphaApi>().unwrap();
    assert_eq!(primary.key().provider_user_id(), "second");
}

#[test]
fn test_primary_connection_not_connected() {
    let users = repository();
    let err = users
        .scope_to_user("local-1")
        .find_primary_connection::<AlphaApi>()
        .unwrap_err();

    assert!(matches!(err, ConnectError::NotConnected(ref id) if id == "p1"));
}

#[test]
fn test_find_connection_by_api() {
    let users = repository();
    add_alpha(&users, "local-1", "U42");

    let repo = users.scope_to_user("local-1");
    let connection = repo.find_connection_by_api::<AlphaApi>("U42").unwrap();
    assert_eq!(connection.key(), &ConnectionKey::new("p1", "U42"));

    assert!(matches!(
        repo.find_connection_by_api::<AlphaApi>("U43"),
        Err(ConnectError::NoSuchConnection(_))
    ));
    assert!(matches!(
        repo.find_connections_by_api::<String>(),
        Err(ConnectError::ApiTypeNotFound(_))
    ));
}

#[test]
fn test_duplicate_connection_rejected_across_users() {
    let users = repository();
    add_alpha(&users, "local-1", "U42");

    let connection = alpha(users.registry(), &alpha_data("U42", "AT"));

    let err = users
        .scope_to_user("local-1")
        .add_connection(&connection)
        .unwrap_err();
    assert!(matches!(err, ConnectError::DuplicateConnection(_)));

    let err = users
        .scope_to_user("local-2")
        .add_connection(&connection)
        .unwrap_err();
    assert_eq!(err.to_string(), "connection p1:U42 already exists");

    assert_eq!(
        users
            .find_local_user_id_connected_to(&ConnectionKey::new("p1", "U42"))
            .unwrap()
            .as_deref(),
        Some("local-1")
    );
}

#[test]
fn test_add_connection_with_blank_provider_user_id() {
    let users = repository();
    let connection = Connection::new(
        ConnectionKey::new("p1", "   "),
        ServiceProfile::default(),
        ConnectionCredentials::OAuth2 {
            access_token: "AT".to_string(),
            refresh_token: None,
            expire_time: None,
        },
        AlphaApi {
            access_token: "AT".to_string(),
        },
    );

    let err = users
        .scope_to_user("local-1")
        .add_connection(&connection)
        .unwrap_err();
    assert!(matches!(err, ConnectError::InvalidConnectionData(_)));
    assert!(users
        .scope_to_user("local-1")
        .find_connections_to_provider("p1")
        .unwrap()
        .is_empty());
}

#[test]
fn test_add_connection_for_unregistered_provider() {
    let users = repository();
    let connection = Connection::new(
        ConnectionKey::new("myspace", "1"),
        ServiceProfile::default(),
        ConnectionCredentials::OAuth2 {
            access_token: "AT".to_string(),
            refresh_token: None,
            expire_time: None,
        },
        AlphaApi {
            access_token: "AT".to_string(),
        },
    );

    let err = users
        .scope_to_user("local-1")
        .add_connection(&connection)
        .unwrap_err();
    assert!(matches!(err, ConnectError::FactoryNotFound(ref id) if id == "myspace"));
}

#[test]
fn test_find_local_user_id_connected_to() {
    let users = repository();
    add_alpha(&users, "local-1", "U42");

    assert_eq!(
        users
            .find_local_user_id_connected_to(&ConnectionKey::new("p1", "U42"))
            .unwrap(),
        Some("local-1".to_string())
    );
    assert_eq!(
        users
            .find_local_user_id_connected_to(&ConnectionKey::new("p1", "U99"))
            .unwrap(),
        None
    );
}

#[test]
fn test_find_local_user_ids_connected_to_batch() {
    let users = repository();
    add_alpha(&users, "local-1", "id1");
    add_alpha(&users, "local-2", "id3");

    let found = users
        .find_local_user_ids_connected_to("p1", &["id1", "id2", "id3"])
        .unwrap();
    let expected: HashSet<String> = ["local-1", "local-2"].iter().map(|s| s.to_string()).collect();
    assert_eq!(found, expected);

    let none: &[&str] = &[];
    assert!(users.find_local_user_ids_connected_to("p1", none).unwrap().is_empty());
    assert!(users
        .find_local_user_ids_connected_to("beta", &["id1"])
        .unwrap()
        .is_empty());
}

#[test]
fn test_batch_lookups_beyond_parameter_limit() {
    let users = repository();
    add_alpha(&users, "local-1", "id0");
    add_alpha(&users, "local-1", "id39999");
    add_alpha(&users, "local-2", "id20000");

    let ids: Vec<String> = (0..40_000).map(|i| format!("id{}", i)).collect();

    let found = users.find_local_user_ids_connected_to("p1", &ids).unwrap();
    let expected: HashSet<String> = ["local-1", "local-2"].iter().map(|s| s.to_string()).collect();
    assert_eq!(found, expected);

    // Rank order survives the split into separate queries
    let mut reversed = ids.clone();
    reversed.reverse();
    let connections = users
        .scope_to_user("local-1")
        .find_connections_to_users("p1", &reversed)
        .unwrap();
    let keys: Vec<&str> = connections
        .iter()
        .map(|c| c.key().provider_user_id())
        .collect();
    assert_eq!(keys, vec!["id0", "id39999"]);
}

#[test]
fn test_find_connections_to_users_ignores_repeated_ids() {
    let users = repository();
    add_alpha(&users, "local-1", "id1");

    let found = users
        .scope_to_user("local-1")
        .find_connections_to_users("p1", &["id1", "id1"])
        .unwrap();
    assert_eq!(found.len(), 1);
}

#[test]
fn test_find_connections_to_users() {
    let users = repository();
    add_alpha(&users, "local-1", "id1");
    add_alpha(&users, "local-1", "id2");
    add_alpha(&users, "local-2", "id3");

    let found = users
        .scope_to_user("local-1")
        .find_connections_to_users("p1", &["id2", "id3", "id4"])
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].key().provider_user_id(), "id2");
}

#[test]
fn test_remove_is_scoped_to_user() {
    let users = repository();
    add_alpha(&users, "local-1", "U42");
    let key = ConnectionKey::new("p1", "U42");

    assert!(!users.scope_to_user("local-2").remove_connection(&key).unwrap());
    assert!(users.scope_to_user("local-1").find_connection(&key).is_ok());

    assert!(users.scope_to_user("local-1").remove_connection(&key).unwrap());
    assert!(users.find_local_user_id_connected_to(&key).unwrap().is_none());
}

#[test]
fn test_remove_connections_to_provider() {
    let users = repository();
    add_alpha(&users, "local-1", "a");
    add_alpha(&users, "local-1", "b");
    add_alpha(&users, "local-2", "c");

    let repo = users.scope_to_user("local-1");
    assert_eq!(repo.remove_connections_to_provider("p1").unwrap(), 2);
    assert!(repo.find_connections_to_provider("p1").unwrap().is_empty());
    assert_eq!(
        users
            .scope_to_user("local-2")
            .find_connections_to_provider("p1")
            .unwrap()
            .len(),
        1
    );

    // Freed remote accounts can be linked again
    add_alpha(&users, "local-2", "a");
}

#[test]
fn test_update_connection() {
    let users = repository();
    add_alpha(&users, "local-1", "U42");
    let repo = users.scope_to_user("local-1");

    let mut data = alpha_data("U42", "new-token");
    data.display_name = Some("Renamed".to_string());
    data.expire_time = Some(Utc::now() - Duration::minutes(5));
    repo.update_connection(&alpha(users.registry(), &data)).unwrap();

    let found = repo.find_connection_by_api::<AlphaApi>("U42").unwrap();
    assert_eq!(found.api().access_token, "new-token");
    assert_eq!(found.display_name(), Some("Renamed"));
    assert!(found.has_expired());
    assert_eq!(found.create_data(), data);
}

#[test]
fn test_update_missing_connection() {
    let users = repository();
    let connection = alpha(users.registry(), &alpha_data("U42", "AT"));

    let err = users
        .scope_to_user("local-1")
        .update_connection(&connection)
        .unwrap_err();
    assert!(matches!(err, ConnectError::NoSuchConnection(_)));
}

#[test]
fn test_oauth1_connection_roundtrip() {
    let users = repository();
    let data = ConnectionData {
        provider_id: "beta".to_string(),
        provider_user_id: "B7".to_string(),
        display_name: Some("beta7".to_string()),
        profile_url: None,
        image_url: None,
        access_token: "token".to_string(),
        secret: Some("token-secret".to_string()),
        refresh_token: None,
        expire_time: None,
    };
    let connection = users
        .registry()
        .lookup_by_api_type::<BetaApi>()
        .unwrap()
        .create_connection_from_data(&data)
        .unwrap();

    let repo = users.scope_to_user("local-1");
    repo.add_connection(&connection).unwrap();

    let found = repo.find_connection_by_api::<BetaApi>("B7").unwrap();
    assert_eq!(found.api().access_token, "token");
    assert_eq!(found.api().secret, "token-secret");
    assert_eq!(found.create_data(), data);
}

#[test]
fn test_tokens_encrypted_at_rest() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("connections.db");

    let users =
        UsersConnectionRepository::new(&db_path, Arc::new(test_registry()), cipher(7)).unwrap();
    let connection = alpha(users.registry(), &alpha_data("U42", "plain-access-token"));
    users.scope_to_user("local-1").add_connection(&connection).unwrap();

    let raw = rusqlite::Connection::open(&db_path).unwrap();
    let (access_token, refresh_token): (String, String) = raw
        .query_row(
            "SELECT access_token, refresh_token FROM connections WHERE provider_user_id = 'U42'",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();

    assert!(!access_token.contains("plain-access-token"));
    assert!(!refresh_token.contains("refresh-plain-access-token"));
}

#[test]
fn test_wrong_key_fails_to_decrypt() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("connections.db");

    {
        let users =
            UsersConnectionRepository::new(&db_path, Arc::new(test_registry()), cipher(7)).unwrap();
        add_alpha(&users, "local-1", "U42");
    }

    let users =
        UsersConnectionRepository::new(&db_path, Arc::new(test_registry()), cipher(8)).unwrap();
    let err = users
        .scope_to_user("local-1")
        .find_connection(&ConnectionKey::new("p1", "U42"))
        .unwrap_err();
    assert!(matches!(err, ConnectError::Decryption(_)));

    // Lookups that never touch tokens still work
    assert!(users
        .find_local_user_id_connected_to(&ConnectionKey::new("p1", "U42"))
        .unwrap()
        .is_some());
}

#[test]
fn test_persistence_across_reopen() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("connections.db");

    {
        let users =
            UsersConnectionRepository::new(&db_path, Arc::new(test_registry()), cipher(7)).unwrap();
        add_alpha(&users, "local-1", "U42");
    }

    let users =
        UsersConnectionRepository::new(&db_path, Arc::new(test_registry()), cipher(7)).unwrap();
    let found = users
        .scope_to_user("local-1")
        .find_connection_by_api::<AlphaApi>("U42")
        .unwrap();
    assert_eq!(found.api().access_token, "AT");
}

#[tokio::test]
async fn test_grant_save_find_scenario() {
    use crate::oauth::AccessGrant;

    let users = repository();
    let grant = AccessGrant::new("AT1")
        .with_refresh_token("RT1")
        .with_extra("user_id", "U42");

    let connection = users
        .registry()
        .lookup_by_provider_id("p1")
        .unwrap()
        .create_any_connection(&grant.into())
        .await
        .unwrap();
    users
        .scope_to_user("local-1")
        .add_connection(connection.as_ref())
        .unwrap();

    let key = ConnectionKey::new("p1", "U42");
    let found = users.scope_to_user("local-1").find_connection(&key).unwrap();
    assert_eq!(found.key(), &key);

    let data = found.create_data();
    assert_eq!(data.access_token, "AT1");
    assert_eq!(data.refresh_token.as_deref(), Some("RT1"));
    assert!(data.expire_time.is_none());

    assert_eq!(
        users.find_local_user_id_connected_to(&key).unwrap().as_deref(),
        Some("local-1")
    );
    assert!(users
        .find_local_user_id_connected_to(&ConnectionKey::new("p1", "U99"))
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_refreshed_connection_persists() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/token")
        .with_status(200)
        .with_body(r#"{"access_token": "AT2", "expires_in": 3600}"#)
        .create_async()
        .await;

    let token_url = format!("{}/token", server.url());
    let registry = ConnectionFactoryRegistry::builder()
        .register(oauth2_factory_with_token_url("p1", &token_url))
        .and_then(|b| b.register(oauth1_factory("beta")))
        .unwrap()
        .build();
    let users = UsersConnectionRepository::new(":memory:", Arc::new(registry), cipher(7)).unwrap();
    let repo = users.scope_to_user("local-1");
    repo.add_connection(&alpha(users.registry(), &alpha_data("U42", "AT1")))
        .unwrap();

    let factory = users.registry().lookup_by_api_type::<AlphaApi>().unwrap();
    let mut connection = repo.find_connection_by_api::<AlphaApi>("U42").unwrap();
    match factory.as_ref() {
        ConnectionFactory::OAuth2(oauth2) => oauth2.refresh(&mut connection).await.unwrap(),
        ConnectionFactory::OAuth1(_) => panic!("p1 is an OAuth2 provider"),
    }
    repo.update_connection(&connection).unwrap();

    let found = repo.find_connection(&ConnectionKey::new("p1", "U42")).unwrap();
    let data = found.create_data();
    assert_eq!(data.access_token, "AT2");
    assert_eq!(data.refresh_token.as_deref(), Some("refresh-AT1"));
    assert!(data.expire_time.is_some());
    assert_eq!(found.downcast::<AlphaApi>().unwrap().api().access_token, "AT2");
}
