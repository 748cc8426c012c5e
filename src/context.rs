//! Fixture context
//!
//! Owns the cached API sessions (root and bot), the bot edit token and the
//! datatype -> property id map for one test run. Sessions are created lazily on
//! first use; concurrent first callers wait on a single initialisation.

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};
use url::Url;

use crate::api_client::{ActionClient, params};
use crate::config::FixtureConfig;
use crate::entity::{self, Label};
use crate::error::FixtureError;
use crate::util;

/// Token value MediaWiki hands out when the session lacks the right
const NO_PERMISSION_TOKEN: &str = "+\\";

/// Which cached session to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKind {
    /// The configured administrator
    Root,
    /// A generated account in the `bot` group
    Bot,
}

/// Credentials of an account created by [`FixtureContext::create_user`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedUser {
    pub username: String,
    pub password: String,
}

pub struct FixtureContext {
    config: FixtureConfig,
    endpoint: Url,
    root: OnceCell<Arc<ActionClient>>,
    bot: OnceCell<Arc<ActionClient>>,
    bot_token: OnceCell<String>,
    property_ids: Mutex<HashMap<String, String>>,
}

impl FixtureContext {
    pub fn new(config: FixtureConfig) -> Result<Self, FixtureError> {
        config.validate()?;
        let endpoint = config.api_endpoint()?;
        let property_ids = config.property_ids.clone();

        Ok(Self {
            config,
            endpoint,
            root: OnceCell::new(),
            bot: OnceCell::new(),
            bot_token: OnceCell::new(),
            property_ids: Mutex::new(property_ids),
        })
    }

    /// Context configured from `MW_*` environment variables
    pub fn from_env() -> Result<Self, FixtureError> {
        Self::new(FixtureConfig::from_env()?)
    }

    pub fn config(&self) -> &FixtureConfig {
        &self.config
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Cached session of the given kind, created on first use
    pub async fn session(&self, kind: SessionKind) -> Result<Arc<ActionClient>, FixtureError> {
        match kind {
            SessionKind::Root => self.root_session(true).await,
            SessionKind::Bot => self.bot_session().await,
        }
    }

    /// Administrator session
    ///
    /// With `use_cache` the first session is kept and returned on later calls.
    /// Without it a fresh login is performed and the cache is left untouched.
    pub async fn root_session(&self, use_cache: bool) -> Result<Arc<ActionClient>, FixtureError> {
        if !use_cache {
            return self.login_root().await;
        }

        self.root
            .get_or_try_init(|| self.login_root())
            .await
            .cloned()
    }

    async fn login_root(&self) -> Result<Arc<ActionClient>, FixtureError> {
        let client = ActionClient::with_timeout(self.endpoint.clone(), self.config.timeout())?;
        client
            .login(&self.config.admin_username, &self.config.admin_password)
            .await?;
        client
            .load_tokens(&["createaccount", "userrights", "csrf"])
            .await?;

        let rights_token = client.token("userrights").await?;
        if rights_token == NO_PERMISSION_TOKEN {
            warn!(user = %self.config.admin_username, "Root user was denied the userrights token");
            return Err(FixtureError::Authorization {
                username: self.config.admin_username.clone(),
            });
        }

        info!(user = %self.config.admin_username, "Root session established");
        Ok(Arc::new(client))
    }

    /// Session of a freshly created bot account, cached after the first call
    pub async fn bot_session(&self) -> Result<Arc<ActionClient>, FixtureError> {
        self.bot
            .get_or_try_init(|| async {
                let name = util::title("r2d2");
                let password = util::title("very-secret-");

                let client = self.root_session(false).await?;
                client.create_account(&name, &password).await?;
                client.add_groups(&name, &["bot"]).await?;
                client.login(&name, &password).await?;

                info!(user = %name, "Bot session established");
                Ok::<_, FixtureError>(client)
            })
            .await
            .cloned()
    }

    /// The bot's CSRF token, fetched through `session` on first use
    ///
    /// The token is cached for the lifetime of the context and never refreshed.
    pub async fn bot_edit_token(&self, session: &ActionClient) -> Result<String, FixtureError> {
        self.bot_token
            .get_or_try_init(|| fetch_edit_token(session))
            .await
            .cloned()
    }

    /// Create a Wikibase entity of `entity_type` as the bot and return its id
    pub async fn create_entity(
        &self,
        entity_type: &str,
        label: Option<&Label>,
        extra: Option<&Value>,
    ) -> Result<String, FixtureError> {
        let payload = entity::entity_payload(label, extra);

        let bot = self.bot_session().await?;
        let token = self.bot_edit_token(&bot).await?;

        let response = bot
            .request(
                &params(json!({
                    "action": "wbeditentity",
                    "new": entity_type,
                    "data": Value::Object(payload).to_string(),
                    "token": token,
                })),
                true,
            )
            .await?;

        let id = created_entity_id(&response.body)?;
        info!(entity_type, id = %id, "Created entity");
        Ok(id)
    }

    /// Create a property with `datatype` as root and return its id
    pub async fn create_property(
        &self,
        datatype: &str,
        label: Option<&Label>,
        extra: Option<&Value>,
    ) -> Result<String, FixtureError> {
        let payload = entity::property_payload(datatype, label, extra);

        let root = self.root_session(true).await?;
        let token = root.csrf_token().await?;
        let body = root
            .action(
                "wbeditentity",
                params(json!({
                    "new": "property",
                    "data": Value::Object(payload).to_string(),
                    "token": token,
                })),
                Method::POST,
            )
            .await?;

        let id = created_entity_id(&body)?;
        info!(datatype, id = %id, "Created property");
        Ok(id)
    }

    /// Property id for `datatype`, creating one the first time it is asked for
    pub async fn get_or_create_property_id(&self, datatype: &str) -> Result<String, FixtureError> {
        let mut ids = self.property_ids.lock().await;
        if let Some(id) = ids.get(datatype) {
            debug!(datatype, id = %id, "Reusing property");
            return Ok(id.clone());
        }

        let label = Label::Text(util::title(datatype));
        let id = self.create_property(datatype, Some(&label), None).await?;
        ids.insert(datatype.to_string(), id.clone());
        Ok(id)
    }

    /// Snapshot of the datatype -> property id map
    pub async fn property_ids(&self) -> HashMap<String, String> {
        self.property_ids.lock().await.clone()
    }

    pub async fn block_user(
        &self,
        username: &str,
        reason: Option<&str>,
        expiry: Option<&str>,
    ) -> Result<(), FixtureError> {
        let root = self.root_session(true).await?;
        let token = root.csrf_token().await?;
        let result = root
            .action(
                "block",
                params(json!({
                    "user": username,
                    "assert": "user",
                    "reason": reason.unwrap_or("Set up blocked user"),
                    "expiry": expiry.unwrap_or("never"),
                    "token": token,
                })),
                Method::POST,
            )
            .await?;

        if !has_marker(&result, "block") {
            warn!(user = username, "Block was not confirmed by the API");
            return Err(FixtureError::OperationFailed("Failed to block user.".to_string()));
        }

        info!(user = username, "Blocked user");
        Ok(())
    }

    pub async fn unblock_user(&self, username: &str, reason: Option<&str>) -> Result<(), FixtureError> {
        let root = self.root_session(true).await?;
        let token = root.csrf_token().await?;
        let result = root
            .action(
                "unblock",
                params(json!({
                    "user": username,
                    "assert": "user",
                    "reason": reason.unwrap_or("Unblocked user"),
                    "token": token,
                })),
                Method::POST,
            )
            .await?;

        if !has_marker(&result, "unblock") {
            warn!(user = username, "Unblock was not confirmed by the API");
            return Err(FixtureError::OperationFailed(
                "Failed to unblock user.".to_string(),
            ));
        }

        info!(user = username, "Unblocked user");
        Ok(())
    }

    /// Create a regular account named `<prefix>-<unique>` with a random password
    pub async fn create_user(&self, username_prefix: &str) -> Result<CreatedUser, FixtureError> {
        let root = self.root_session(true).await?;
        let username = util::title(&format!("{username_prefix}-"));
        let password = util::uniq();
        root.create_account(&username, &password).await?;

        Ok(CreatedUser { username, password })
    }

    /// The `wbgetentities` record for `entity_id`, or `null` if absent
    pub async fn get_entity_data(&self, entity_id: &str) -> Result<Value, FixtureError> {
        let bot = self.bot_session().await?;
        let response = bot
            .request(
                &params(json!({ "action": "wbgetentities", "ids": entity_id })),
                false,
            )
            .await?;

        Ok(response.body["entities"][entity_id].clone())
    }

    /// Arbitrary request as the bot; `is_edit` attaches the bot edit token
    pub async fn bot_request(
        &self,
        parameters: &Value,
        is_edit: bool,
        is_post: bool,
    ) -> Result<Value, FixtureError> {
        let bot = self.bot_session().await?;
        let mut request = match parameters {
            Value::Object(map) => map.clone(),
            Value::Null => Default::default(),
            _ => {
                return Err(FixtureError::InvalidParams {
                    command: "BotRequest".to_string(),
                    reason: "parameters must be an object".to_string(),
                });
            }
        };

        if is_edit {
            let token = self.bot_edit_token(&bot).await?;
            request.insert("token".to_string(), Value::from(token));
        }

        Ok(bot.request(&request, is_post).await?.body)
    }
}

async fn fetch_edit_token(session: &ActionClient) -> Result<String, FixtureError> {
    let response = session
        .request(
            &params(json!({ "action": "query", "meta": "tokens", "type": "csrf" })),
            false,
        )
        .await?;

    csrf_token_from(&response.body).ok_or(FixtureError::Token {
        response: response.body,
    })
}

fn csrf_token_from(body: &Value) -> Option<String> {
    body["query"]["tokens"]["csrftoken"]
        .as_str()
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

fn created_entity_id(body: &Value) -> Result<String, FixtureError> {
    if let Some(error) = body.get("error") {
        return Err(FixtureError::from_api_error(error));
    }

    entity::entity_id(body).ok_or_else(|| {
        FixtureError::UnexpectedResponse("wbeditentity returned no entity id".to_string())
    })
}

fn has_marker(body: &Value, key: &str) -> bool {
    match body.get(key) {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_) | Value::Object(_)) => true,
    }
}
