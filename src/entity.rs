//! Wikibase entity payloads for `wbeditentity`

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Label argument of the entity creation commands
///
/// A plain string becomes an English label; a map is used as the `labels`
/// object verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Label {
    Text(String),
    Map(Map<String, Value>),
}

impl From<&str> for Label {
    fn from(text: &str) -> Self {
        Label::Text(text.to_string())
    }
}

impl From<String> for Label {
    fn from(text: String) -> Self {
        Label::Text(text)
    }
}

/// Build the `labels` object for an optional label
pub fn label_map(label: Option<&Label>) -> Value {
    match label {
        Some(Label::Map(map)) => Value::Object(map.clone()),
        Some(Label::Text(text)) if !text.is_empty() => json!({
            "en": { "language": "en", "value": text }
        }),
        _ => Value::Object(Map::new()),
    }
}

/// `{labels}` shallow-merged with `extra`; keys in `extra` win
pub fn entity_payload(label: Option<&Label>, extra: Option<&Value>) -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert("labels".to_string(), label_map(label));
    merge(&mut payload, extra);
    payload
}

/// `{datatype, labels}` shallow-merged with `extra`; keys in `extra` win
pub fn property_payload(
    datatype: &str,
    label: Option<&Label>,
    extra: Option<&Value>,
) -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert("datatype".to_string(), Value::from(datatype));
    payload.insert("labels".to_string(), label_map(label));
    merge(&mut payload, extra);
    payload
}

fn merge(payload: &mut Map<String, Value>, extra: Option<&Value>) {
    if let Some(Value::Object(extra)) = extra {
        for (key, value) in extra {
            payload.insert(key.clone(), value.clone());
        }
    }
}

/// Pull `entity.id` out of a `wbeditentity` response
pub fn entity_id(body: &Value) -> Option<String> {
    body["entity"]["id"].as_str().map(str::to_string)
}
