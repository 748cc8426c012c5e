//! MediaWiki Action API Client
//!
//! A cookie-backed session against a single `api.php` endpoint. Covers the small
//! set of primitives fixture setup needs: login, token loading, generic action
//! dispatch, account creation and user group assignment.
//!
//! Every request is sent with `format=json&formatversion=2`. GET requests carry
//! their parameters in the query string, POST requests as a urlencoded form.

use reqwest::Method;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;

use crate::error::FixtureError;

/// Parameters of a single Action API request
pub type ApiParams = Map<String, Value>;

/// Default request timeout (30 seconds)
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Raw response of an Action API request
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// HTTP status code
    pub status: u16,

    /// Decoded JSON body
    pub body: Value,
}

/// Authenticated handle to the Action API
#[derive(Debug)]
pub struct ActionClient {
    http: reqwest::Client,
    endpoint: Url,
    /// Tokens by short name (`csrf`, `userrights`, ...), bound to the current login
    tokens: Mutex<HashMap<String, String>>,
    username: Mutex<Option<String>>,
}

impl ActionClient {
    /// Create an anonymous client for the given `api.php` URL
    pub fn new(endpoint: Url) -> Result<Self, FixtureError> {
        Self::with_timeout(endpoint, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(endpoint: Url, timeout: Duration) -> Result<Self, FixtureError> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(timeout)
            .build()
            .map_err(|e| FixtureError::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint,
            tokens: Mutex::new(HashMap::new()),
            username: Mutex::new(None),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Name of the account this session is logged in as, if any
    pub async fn username(&self) -> Option<String> {
        self.username.lock().await.clone()
    }

    /// Send a request and return the raw response, API errors included
    pub async fn request(
        &self,
        params: &ApiParams,
        is_post: bool,
    ) -> Result<ApiResponse, FixtureError> {
        let pairs = encode_params(params);
        debug!(
            action = params.get("action").and_then(serde_json::Value::as_str).unwrap_or("?"),
            post = is_post,
            "Sending API request"
        );

        let request = if is_post {
            self.http.post(self.endpoint.clone()).form(&pairs)
        } else {
            self.http.get(self.endpoint.clone()).query(&pairs)
        };

        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.json::<Value>().await?;

        Ok(ApiResponse { status, body })
    }

    /// Run `action=<name>` and return the response body
    ///
    /// Fails if the HTTP status is not 2xx or the body carries an `error` object.
    pub async fn action(
        &self,
        name: &str,
        mut params: ApiParams,
        method: Method,
    ) -> Result<Value, FixtureError> {
        params.insert("action".to_string(), Value::from(name));

        let response = self.request(&params, method == Method::POST).await?;

        if !(200..300).contains(&response.status) {
            return Err(FixtureError::Http(format!(
                "{} returned HTTP {}",
                name, response.status
            )));
        }

        if let Some(error) = response.body.get("error") {
            return Err(FixtureError::from_api_error(error));
        }

        Ok(response.body)
    }

    /// Log in with a bot password or main account credentials
    pub async fn login(&self, username: &str, password: &str) -> Result<(), FixtureError> {
        let body = self
            .action(
                "query",
                params(json!({ "meta": "tokens", "type": "login" })),
                Method::GET,
            )
            .await?;
        let login_token = body["query"]["tokens"]["logintoken"]
            .as_str()
            .ok_or_else(|| FixtureError::UnexpectedResponse("missing logintoken".to_string()))?
            .to_string();

        let body = self
            .action(
                "login",
                params(json!({
                    "lgname": username,
                    "lgpassword": password,
                    "lgtoken": login_token,
                })),
                Method::POST,
            )
            .await?;

        if body["login"]["result"].as_str() != Some("Success") {
            return Err(FixtureError::Api {
                code: "loginfailed".to_string(),
                info: body["login"]["reason"]
                    .as_str()
                    .unwrap_or("login did not succeed")
                    .to_string(),
            });
        }

        // Tokens belong to the previous session
        self.tokens.lock().await.clear();
        *self.username.lock().await = Some(username.to_string());

        info!(user = username, "Logged in to MediaWiki API");
        Ok(())
    }

    /// Fetch the named tokens in one request and cache them on this session
    pub async fn load_tokens(&self, names: &[&str]) -> Result<(), FixtureError> {
        let body = self
            .action(
                "query",
                params(json!({ "meta": "tokens", "type": names.join("|") })),
                Method::GET,
            )
            .await?;

        let mut tokens = self.tokens.lock().await;
        for name in names {
            if let Some(token) = body["query"]["tokens"][format!("{name}token")].as_str() {
                tokens.insert((*name).to_string(), token.to_string());
            }
        }

        debug!(count = tokens.len(), "Loaded API tokens");
        Ok(())
    }

    /// Return a token by short name, fetching it if it is not cached yet
    pub async fn token(&self, name: &str) -> Result<String, FixtureError> {
        if let Some(token) = self.tokens.lock().await.get(name) {
            return Ok(token.clone());
        }

        self.load_tokens(&[name]).await?;

        self.tokens
            .lock()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| FixtureError::UnexpectedResponse(format!("no {name} token returned")))
    }

    /// The `csrf` token used by most write actions
    pub async fn csrf_token(&self) -> Result<String, FixtureError> {
        self.token("csrf").await
    }

    /// Create a new account
    pub async fn create_account(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Value, FixtureError> {
        let token = self.token("createaccount").await?;
        let body = self
            .action(
                "createaccount",
                params(json!({
                    "username": username,
                    "password": password,
                    "retype": password,
                    "createreturnurl": self.endpoint.as_str(),
                    "createtoken": token,
                })),
                Method::POST,
            )
            .await?;

        let result = &body["createaccount"];
        if result["status"].as_str() != Some("PASS") {
            return Err(FixtureError::OperationFailed(format!(
                "Failed to create account {}: {}",
                username,
                result["message"].as_str().unwrap_or("unknown reason")
            )));
        }

        info!(user = username, "Created account");
        Ok(result.clone())
    }

    /// Add a user to the given groups
    pub async fn add_groups(
        &self,
        username: &str,
        groups: &[&str],
    ) -> Result<Value, FixtureError> {
        let token = self.token("userrights").await?;
        let body = self
            .action(
                "userrights",
                params(json!({
                    "user": username,
                    "add": groups.join("|"),
                    "token": token,
                })),
                Method::POST,
            )
            .await?;

        debug!(user = username, groups = ?groups, "Added user to groups");
        Ok(body["userrights"].clone())
    }
}

/// Turn a `json!({...})` object into request parameters
///
/// Non-object values produce an empty parameter set.
pub fn params(value: Value) -> ApiParams {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Flatten parameters to the string pairs the Action API expects
///
/// `true` is sent as `1` and `false`/`null` are omitted, since MediaWiki treats
/// any present boolean parameter as set. Arrays are joined with `|`.
pub fn encode_params(params: &ApiParams) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = params
        .iter()
        .filter_map(|(key, value)| encode_value(value).map(|v| (key.clone(), v)))
        .collect();

    if !params.contains_key("format") {
        pairs.push(("format".to_string(), "json".to_string()));
    }
    if !params.contains_key("formatversion") {
        pairs.push(("formatversion".to_string(), "2".to_string()));
    }

    pairs
}

fn encode_value(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::Bool(true) => Some("1".to_string()),
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(encode_value)
                .collect::<Vec<_>>()
                .join("|"),
        ),
        Value::Object(_) => Some(value.to_string()),
    }
}
