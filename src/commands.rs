//! Fixture commands exposed to the test runner
//!
//! Each command is registered under a `MwApi:` name and takes a single JSON
//! parameter object (camelCase keys). Results are plain JSON values: an id
//! string, an object, or `null`.

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::context::FixtureContext;
use crate::entity::Label;
use crate::error::FixtureError;

/// Namespace prefix of every registered command
pub const COMMAND_PREFIX: &str = "MwApi:";

/// A named fixture operation
#[async_trait]
pub trait FixtureCommand: Send + Sync {
    /// Name without the `MwApi:` prefix
    fn name(&self) -> &'static str;

    /// Run the command with its JSON parameter object
    async fn run(&self, ctx: &FixtureContext, params: Value) -> Result<Value, FixtureError>;
}

/// Name -> command map handed to the test runner
pub struct CommandRegistry {
    context: Arc<FixtureContext>,
    commands: BTreeMap<String, Box<dyn FixtureCommand>>,
}

impl CommandRegistry {
    /// Registry with every built-in command
    pub fn new(context: Arc<FixtureContext>) -> Self {
        let mut registry = Self::empty(context);
        registry.register(Box::new(BlockUser));
        registry.register(Box::new(CreateUser));
        registry.register(Box::new(CreateItem));
        registry.register(Box::new(CreateEntity));
        registry.register(Box::new(CreateProperty));
        registry.register(Box::new(GetOrCreatePropertyIdByDataType));
        registry.register(Box::new(GetEntityData));
        registry.register(Box::new(UnblockUser));
        registry.register(Box::new(BotRequest));
        registry
    }

    pub fn empty(context: Arc<FixtureContext>) -> Self {
        Self {
            context,
            commands: BTreeMap::new(),
        }
    }

    /// Add or replace a command
    pub fn register(&mut self, command: Box<dyn FixtureCommand>) {
        let name = format!("{COMMAND_PREFIX}{}", command.name());
        debug!("Registering fixture command {}", name);
        self.commands.insert(name, command);
    }

    /// Registered names in alphabetical order, not registration order
    pub fn names(&self) -> Vec<&str> {
        self.commands.keys().map(String::as_str).collect()
    }

    pub fn context(&self) -> &Arc<FixtureContext> {
        &self.context
    }

    /// Run a command by its full name (`MwApi:CreateItem`) or bare name (`CreateItem`)
    pub async fn invoke(&self, name: &str, params: Value) -> Result<Value, FixtureError> {
        let key = if name.starts_with(COMMAND_PREFIX) {
            name.to_string()
        } else {
            format!("{COMMAND_PREFIX}{name}")
        };

        let command = self
            .commands
            .get(&key)
            .ok_or_else(|| FixtureError::UnknownCommand(name.to_string()))?;

        debug!(command = %key, "Invoking fixture command");
        command.run(&self.context, params).await.inspect_err(|e| {
            warn!(command = %key, error = %e, "Fixture command failed");
        })
    }
}

fn parse<T: DeserializeOwned>(command: &str, params: Value) -> Result<T, FixtureError> {
    // A missing parameter object is treated like `{}`
    let params = if params.is_null() {
        Value::Object(Default::default())
    } else {
        params
    };

    serde_json::from_value(params).map_err(|e| FixtureError::InvalidParams {
        command: command.to_string(),
        reason: e.to_string(),
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockUserParams {
    username: String,
    reason: Option<String>,
    expiry: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UnblockUserParams {
    username: String,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateUserParams {
    username_prefix: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateItemParams {
    label: Option<Label>,
    data: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateEntityParams {
    entity_type: String,
    label: Option<Label>,
    data: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatePropertyParams {
    datatype: String,
    label: Option<Label>,
    data: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatatypeParams {
    datatype: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetEntityDataParams {
    entity_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BotRequestParams {
    #[serde(default)]
    is_edit: bool,
    #[serde(default)]
    is_post: bool,
    #[serde(default)]
    parameters: Value,
}

pub struct BlockUser;

#[async_trait]
impl FixtureCommand for BlockUser {
    fn name(&self) -> &'static str {
        "BlockUser"
    }

    async fn run(&self, ctx: &FixtureContext, params: Value) -> Result<Value, FixtureError> {
        let p: BlockUserParams = parse(self.name(), params)?;
        ctx.block_user(&p.username, p.reason.as_deref(), p.expiry.as_deref())
            .await?;
        Ok(Value::Null)
    }
}

pub struct UnblockUser;

#[async_trait]
impl FixtureCommand for UnblockUser {
    fn name(&self) -> &'static str {
        "UnblockUser"
    }

    async fn run(&self, ctx: &FixtureContext, params: Value) -> Result<Value, FixtureError> {
        let p: UnblockUserParams = parse(self.name(), params)?;
        ctx.unblock_user(&p.username, p.reason.as_deref()).await?;
        Ok(Value::Null)
    }
}

pub struct CreateUser;

#[async_trait]
impl FixtureCommand for CreateUser {
    fn name(&self) -> &'static str {
        "CreateUser"
    }

    async fn run(&self, ctx: &FixtureContext, params: Value) -> Result<Value, FixtureError> {
        let p: CreateUserParams = parse(self.name(), params)?;
        let user = ctx.create_user(&p.username_prefix).await?;
        Ok(serde_json::to_value(user)?)
    }
}

pub struct CreateItem;

#[async_trait]
impl FixtureCommand for CreateItem {
    fn name(&self) -> &'static str {
        "CreateItem"
    }

    async fn run(&self, ctx: &FixtureContext, params: Value) -> Result<Value, FixtureError> {
        let p: CreateItemParams = parse(self.name(), params)?;
        let id = ctx
            .create_entity("item", p.label.as_ref(), p.data.as_ref())
            .await?;
        Ok(Value::String(id))
    }
}

pub struct CreateEntity;

#[async_trait]
impl FixtureCommand for CreateEntity {
    fn name(&self) -> &'static str {
        "CreateEntity"
    }

    async fn run(&self, ctx: &FixtureContext, params: Value) -> Result<Value, FixtureError> {
        let p: CreateEntityParams = parse(self.name(), params)?;
        let id = ctx
            .create_entity(&p.entity_type, p.label.as_ref(), p.data.as_ref())
            .await?;
        Ok(Value::String(id))
    }
}

pub struct CreateProperty;

#[async_trait]
impl FixtureCommand for CreateProperty {
    fn name(&self) -> &'static str {
        "CreateProperty"
    }

    async fn run(&self, ctx: &FixtureContext, params: Value) -> Result<Value, FixtureError> {
        let p: CreatePropertyParams = parse(self.name(), params)?;
        let id = ctx
            .create_property(&p.datatype, p.label.as_ref(), p.data.as_ref())
            .await?;
        Ok(Value::String(id))
    }
}

pub struct GetOrCreatePropertyIdByDataType;

#[async_trait]
impl FixtureCommand for GetOrCreatePropertyIdByDataType {
    fn name(&self) -> &'static str {
        "GetOrCreatePropertyIdByDataType"
    }

    async fn run(&self, ctx: &FixtureContext, params: Value) -> Result<Value, FixtureError> {
        let p: DatatypeParams = parse(self.name(), params)?;
        let id = ctx.get_or_create_property_id(&p.datatype).await?;
        Ok(Value::String(id))
    }
}

pub struct GetEntityData;

#[async_trait]
impl FixtureCommand for GetEntityData {
    fn name(&self) -> &'static str {
        "GetEntityData"
    }

    async fn run(&self, ctx: &FixtureContext, params: Value) -> Result<Value, FixtureError> {
        let p: GetEntityDataParams = parse(self.name(), params)?;
        ctx.get_entity_data(&p.entity_id).await
    }
}

pub struct BotRequest;

#[async_trait]
impl FixtureCommand for BotRequest {
    fn name(&self) -> &'static str {
        "BotRequest"
    }

    async fn run(&self, ctx: &FixtureContext, params: Value) -> Result<Value, FixtureError> {
        let p: BotRequestParams = parse(self.name(), params)?;
        ctx.bot_request(&p.parameters, p.is_edit, p.is_post).await
    }
}
