//! Fixture Command Integration Tests
//!
//! Runs the fixture commands against an in-process fake of `api.php`


use mock_wiki::{CSRF_TOKEN, MockWiki};
use mwapi_fixtures::{CommandRegistry, FixtureContext, FixtureError, SessionKind};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

async fn setup() -> (MockWiki, CommandRegistry) {
    let wiki = MockWiki::start().await.expect("Failed to start mock wiki");
    let ctx = FixtureContext::new(wiki.config()).expect("Invalid fixture config");
    (wiki, CommandRegistry::new(Arc::new(ctx)))
}

fn submitted_data(wiki: &MockWiki) -> Value {
    let edits = wiki.requests_for("wbeditentity");
    let data = edits
        .last()
        .and_then(|r| r.param("data"))
        .expect("wbeditentity should carry data");
    serde_json::from_str(data).expect("data should be JSON")
}

#[tokio::test]
async fn test_root_session_cached_is_same_instance() {
    let (wiki, commands) = setup().await;
    let ctx = commands.context();

    let first = assert_ok!(ctx.root_session(true).await);
    let second = assert_ok!(ctx.session(SessionKind::Root).await);

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(wiki.requests_for("login").len(), 1);

    wiki.shutdown();
}

#[tokio::test]
async fn test_root_session_uncached_logs_in_every_time() {
    let (wiki, commands) = setup().await;
    let ctx = commands.context();

    let first = assert_ok!(ctx.root_session(false).await);
    let second = assert_ok!(ctx.root_session(false).await);

    assert!(!Arc::ptr_eq(&first, &second));
    let logins = wiki.requests_for("login");
    assert_eq!(logins.len(), 2);
    assert!(logins.iter().all(|r| r.param("lgname") == Some("Admin")));
    assert!(logins.iter().all(|r| r.method == "POST"));

    wiki.shutdown();
}

#[tokio::test]
async fn test_root_session_uncached_leaves_cache_untouched() {
    let (wiki, commands) = setup().await;
    let ctx = commands.context();

    let cached = assert_ok!(ctx.root_session(true).await);
    let fresh = assert_ok!(ctx.root_session(false).await);
    let cached_again = assert_ok!(ctx.root_session(true).await);

    assert!(Arc::ptr_eq(&cached, &cached_again));
    assert!(!Arc::ptr_eq(&cached, &fresh));
    assert_eq!(wiki.requests_for("login").len(), 2);

    wiki.shutdown();
}

#[tokio::test]
async fn test_bot_session_does_not_fill_root_cache() {
    let (wiki, commands) = setup().await;
    let ctx = commands.context();

    let bot = assert_ok!(ctx.bot_session().await);
    // Uncached root login, then the bot login on the same client
    assert_eq!(wiki.requests_for("login").len(), 2);

    let root = assert_ok!(ctx.root_session(true).await);
    assert!(!Arc::ptr_eq(&bot, &root));
    assert_eq!(wiki.requests_for("login").len(), 3);
    assert_eq!(root.username().await.as_deref(), Some("Admin"));
    assert_ne!(bot.username().await.as_deref(), Some("Admin"));

    wiki.shutdown();
}

#[tokio::test]
async fn test_root_session_rejects_denied_rights_token() {
    let (wiki, commands) = setup().await;
    wiki.deny_rights_token();

    let result = commands.context().root_session(true).await;
    assert!(matches!(result, Err(FixtureError::Authorization { .. })));

    wiki.shutdown();
}

#[tokio::test]
async fn test_bot_session_created_once() {
    let (wiki, commands) = setup().await;
    let ctx = commands.context();

    let first = assert_ok!(ctx.bot_session().await);
    let second = assert_ok!(ctx.session(SessionKind::Bot).await);
    assert!(Arc::ptr_eq(&first, &second));

    let accounts = wiki.requests_for("createaccount");
    assert_eq!(accounts.len(), 1);
    let bot_name = accounts[0].param("username").unwrap().to_string();
    assert!(bot_name.starts_with("r2d2"));

    let rights = wiki.requests_for("userrights");
    assert_eq!(rights.len(), 1);
    assert_eq!(rights[0].param("user"), Some(bot_name.as_str()));
    assert_eq!(rights[0].param("add"), Some("bot"));

    assert_eq!(first.username().await.as_deref(), Some(bot_name.as_str()));

    wiki.shutdown();
}

#[tokio::test]
async fn test_bot_edit_token_missing_is_token_error() {
    let (wiki, commands) = setup().await;
    wiki.omit_csrf_token();
    let ctx = commands.context();

    let bot = assert_ok!(ctx.bot_session().await);
    let result = ctx.bot_edit_token(&bot).await;
    assert!(matches!(result, Err(FixtureError::Token { .. })));

    wiki.shutdown();
}

#[tokio::test]
async fn test_bot_edit_token_cached() {
    let (wiki, commands) = setup().await;
    let ctx = commands.context();

    let bot = assert_ok!(ctx.bot_session().await);
    let before = wiki.requests_for("query").len();
    assert_eq!(assert_ok!(ctx.bot_edit_token(&bot).await), CSRF_TOKEN);
    assert_eq!(assert_ok!(ctx.bot_edit_token(&bot).await), CSRF_TOKEN);
    assert_eq!(wiki.requests_for("query").len(), before + 1);

    wiki.shutdown();
}

#[tokio::test]
async fn test_create_item_with_string_label() {
    let (wiki, commands) = setup().await;

    let id = assert_ok!(
        commands
            .invoke("MwApi:CreateItem", json!({ "label": "Test item" }))
            .await
    );
    assert_eq!(id, json!("Q1"));

    let edit = wiki.requests_for("wbeditentity").pop().unwrap();
    assert_eq!(edit.method, "POST");
    assert_eq!(edit.param("new"), Some("item"));
    assert_eq!(edit.param("token"), Some(CSRF_TOKEN));

    let data = submitted_data(&wiki);
    assert_eq!(
        data["labels"],
        json!({ "en": { "language": "en", "value": "Test item" } })
    );

    wiki.shutdown();
}

#[tokio::test]
async fn test_create_entity_with_label_map_and_data() {
    let (wiki, commands) = setup().await;
    let labels = json!({
        "en": { "language": "en", "value": "color" },
        "de": { "language": "de", "value": "Farbe" }
    });

    let id = assert_ok!(
        commands
            .invoke(
                "CreateEntity",
                json!({
                    "entityType": "lexeme",
                    "label": labels,
                    "data": { "lemmas": { "en": { "language": "en", "value": "color" } } }
                }),
            )
            .await
    );
    assert_eq!(id, json!("Q1"));

    assert_eq!(
        wiki.requests_for("wbeditentity")[0].param("new"),
        Some("lexeme")
    );
    let data = submitted_data(&wiki);
    assert_eq!(data["labels"], labels);
    assert_eq!(data["lemmas"]["en"]["value"], "color");

    wiki.shutdown();
}

#[tokio::test]
async fn test_create_property_as_root() {
    let (wiki, commands) = setup().await;

    let id = assert_ok!(
        commands
            .invoke(
                "MwApi:CreateProperty",
                json!({ "datatype": "string", "label": "name" }),
            )
            .await
    );
    assert_eq!(id, json!("P1"));

    // Properties are created by root; no bot account is needed
    assert!(wiki.requests_for("createaccount").is_empty());

    let edit = wiki.requests_for("wbeditentity").pop().unwrap();
    assert_eq!(edit.param("new"), Some("property"));
    let data = submitted_data(&wiki);
    assert_eq!(data["datatype"], "string");
    assert_eq!(data["labels"]["en"]["value"], "name");

    wiki.shutdown();
}

#[tokio::test]
async fn test_get_or_create_property_id_memoized() {
    let (wiki, commands) = setup().await;
    let params = json!({ "datatype": "external-id" });

    let first = assert_ok!(
        commands
            .invoke("MwApi:GetOrCreatePropertyIdByDataType", params.clone())
            .await
    );
    let second = assert_ok!(
        commands
            .invoke("MwApi:GetOrCreatePropertyIdByDataType", params)
            .await
    );

    assert_eq!(first, second);
    assert_eq!(wiki.requests_for("wbeditentity").len(), 1);

    let ids = commands.context().property_ids().await;
    assert_eq!(ids.get("external-id").map(String::as_str), first.as_str());

    wiki.shutdown();
}

#[tokio::test]
async fn test_get_or_create_property_id_uses_configured_ids() {
    let wiki = MockWiki::start().await.expect("Failed to start mock wiki");
    let mut config = wiki.config();
    config
        .property_ids
        .insert("string".to_string(), "P99".to_string());
    let ctx = FixtureContext::new(config).unwrap();

    assert_eq!(assert_ok!(ctx.get_or_create_property_id("string").await), "P99");
    assert!(wiki.requests().is_empty());

    wiki.shutdown();
}

#[tokio::test]
async fn test_block_user_resolves_to_null() {
    let (wiki, commands) = setup().await;

    let result = assert_ok!(
        commands
            .invoke("MwApi:BlockUser", json!({ "username": "Vandal" }))
            .await
    );
    assert_eq!(result, Value::Null);

    let block = wiki.requests_for("block").pop().unwrap();
    assert_eq!(block.param("user"), Some("Vandal"));
    assert_eq!(block.param("assert"), Some("user"));
    assert_eq!(block.param("reason"), Some("Set up blocked user"));
    assert_eq!(block.param("expiry"), Some("never"));
    assert_eq!(block.param("token"), Some(CSRF_TOKEN));

    wiki.shutdown();
}

#[tokio::test]
async fn test_block_user_without_marker_rejects() {
    let (wiki, commands) = setup().await;
    wiki.stop_confirming_blocks();

    let err = assert_err!(
        commands
            .invoke(
                "MwApi:BlockUser",
                json!({ "username": "Vandal", "reason": "spam", "expiry": "1 day" }),
            )
            .await
    );
    assert!(matches!(err, FixtureError::OperationFailed(_)));
    assert_eq!(err.to_string(), "Failed to block user.");

    wiki.shutdown();
}

#[tokio::test]
async fn test_unblock_user() {
    let (wiki, commands) = setup().await;

    let result = assert_ok!(
        commands
            .invoke("MwApi:UnblockUser", json!({ "username": "Vandal" }))
            .await
    );
    assert_eq!(result, Value::Null);
    let unblock = wiki.requests_for("unblock").pop().unwrap();
    assert_eq!(unblock.param("reason"), Some("Unblocked user"));

    wiki.stop_confirming_blocks();
    let err = assert_err!(
        commands
            .invoke("MwApi:UnblockUser", json!({ "username": "Vandal" }))
            .await
    );
    assert_eq!(err.to_string(), "Failed to unblock user.");

    wiki.shutdown();
}

#[tokio::test]
async fn test_create_user_returns_credentials() {
    let (wiki, commands) = setup().await;

    let user = assert_ok!(
        commands
            .invoke("MwApi:CreateUser", json!({ "usernamePrefix": "Alice" }))
            .await
    );
    let username = user["username"].as_str().unwrap();
    assert!(username.starts_with("Alice-"));
    assert!(!user["password"].as_str().unwrap().is_empty());

    let created = wiki.requests_for("createaccount").pop().unwrap();
    assert_eq!(created.param("username"), Some(username));
    assert_eq!(created.param("createtoken"), Some("create-token+\\"));

    wiki.shutdown();
}

#[tokio::test]
async fn test_get_entity_data() {
    let (wiki, commands) = setup().await;

    let entity = assert_ok!(
        commands
            .invoke("MwApi:GetEntityData", json!({ "entityId": "Q42" }))
            .await
    );
    assert_eq!(entity, json!({ "id": "Q42", "type": "item" }));

    let get = wiki.requests_for("wbgetentities").pop().unwrap();
    assert_eq!(get.method, "GET");
    assert_eq!(get.param("format"), Some("json"));

    wiki.shutdown();
}

#[tokio::test]
async fn test_bot_request_with_edit_attaches_token() {
    let (wiki, commands) = setup().await;

    let body = assert_ok!(
        commands
            .invoke(
                "MwApi:BotRequest",
                json!({
                    "isEdit": true,
                    "isPost": true,
                    "parameters": { "action": "edit", "title": "Sandbox", "text": "hello" }
                }),
            )
            .await
    );
    assert_eq!(body["echo"]["token"], CSRF_TOKEN);

    let edit = wiki.requests_for("edit").pop().unwrap();
    assert_eq!(edit.method, "POST");
    assert_eq!(edit.param("token"), Some(CSRF_TOKEN));
    assert_eq!(edit.param("title"), Some("Sandbox"));

    wiki.shutdown();
}

#[tokio::test]
async fn test_bot_request_without_edit_has_no_token() {
    let (wiki, commands) = setup().await;

    assert_ok!(
        commands
            .invoke(
                "MwApi:BotRequest",
                json!({ "parameters": { "action": "parse", "text": "''hi''" } }),
            )
            .await
    );

    let parse = wiki.requests_for("parse").pop().unwrap();
    assert_eq!(parse.method, "GET");
    assert_eq!(parse.param("token"), None);

    wiki.shutdown();
}
