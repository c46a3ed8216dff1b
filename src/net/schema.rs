use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("expected a JSON object, found {0}")]
    NotAnObject(&'static str),
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct HubSnapshot {
    #[serde(alias = "uuid", deserialize_with = "id_text")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "connectedHubs", deserialize_with = "id_list")]
    pub connected_hubs: Vec<String>,
    #[serde(default, rename = "connectedDevices", deserialize_with = "id_list")]
    pub connected_devices: Vec<String>,
}

/// A device as listed by the service.
///
/// The streaming indicator is read from `isStreaming`; `streaming` is accepted
/// as an alias. The snake_case spelling some older payloads carried is not read.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct DeviceSnapshot {
    #[serde(alias = "uuid", deserialize_with = "id_text")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "hubUuid", deserialize_with = "optional_id")]
    pub hub_id: Option<String>,
    #[serde(
        default,
        rename = "isStreaming",
        alias = "streaming",
        deserialize_with = "lenient_bool"
    )]
    pub streaming: bool,
}

trait Identified {
    fn id(&self) -> &str;
}

impl Identified for HubSnapshot {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Identified for DeviceSnapshot {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    pub hubs: Vec<HubSnapshot>,
    pub devices: Vec<DeviceSnapshot>,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.hubs.is_empty() && self.devices.is_empty()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct PacketRecord {
    #[serde(default, rename = "type", deserialize_with = "optional_id")]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "optional_id")]
    pub sender: Option<String>,
    #[serde(default, deserialize_with = "optional_id")]
    pub recipient: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub ttl: Option<i64>,
    #[serde(default, rename = "originalTtl")]
    pub original_ttl: Option<i64>,
}

impl PacketRecord {
    pub fn type_label(&self) -> String {
        self.kind
            .as_deref()
            .filter(|kind| !kind.is_empty())
            .map(str::to_ascii_uppercase)
            .unwrap_or_else(|| "UNKNOWN".to_owned())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PacketTransfer {
    pub source: String,
    pub target: String,
    pub packet: PacketRecord,
}

#[derive(Clone, Debug, PartialEq)]
pub enum StateMessage {
    Keepalive,
    Ready,
    PacketTransfer(PacketTransfer),
    FullState {
        event: Option<String>,
        reason: Option<String>,
        snapshot: Snapshot,
    },
    Ignored(Option<String>),
}

#[derive(Clone, Debug, PartialEq)]
pub enum FeedMessage {
    Ready,
    Keepalive,
    Payload(Value),
}

pub fn decode_snapshot(hubs: &Value, devices: &Value) -> Snapshot {
    Snapshot {
        hubs: decode_entities(hubs, "hub"),
        devices: decode_entities(devices, "device"),
    }
}

fn decode_entities<T>(value: &Value, kind: &'static str) -> Vec<T>
where
    T: DeserializeOwned + Identified,
{
    let Some(items) = value.as_array() else {
        warn!(kind, found = json_kind(value), "snapshot collection is not an array");
        return Vec::new();
    };

    items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| match T::deserialize(item) {
            Ok(entity) if !entity.id().trim().is_empty() => Some(entity),
            Ok(_) => {
                warn!(kind, index, "skipping snapshot entry with an empty id");
                None
            }
            Err(error) => {
                warn!(kind, index, %error, "skipping malformed snapshot entry");
                None
            }
        })
        .collect()
}

pub fn parse_state_message(raw: &str) -> Result<StateMessage, SchemaError> {
    let value: Value = serde_json::from_str(raw)?;
    let object = as_object(&value)?;
    let event = object.get("event").and_then(Value::as_str);

    match event {
        Some("keepalive") => return Ok(StateMessage::Keepalive),
        Some("ready") => return Ok(StateMessage::Ready),
        Some("packet.transfer") => return Ok(parse_packet_transfer(object)),
        _ => {}
    }

    let hubs = object.get("hubs").filter(|value| value.is_array());
    let devices = object.get("devices").filter(|value| value.is_array());
    let (Some(hubs), Some(devices)) = (hubs, devices) else {
        return Ok(StateMessage::Ignored(event.map(str::to_owned)));
    };

    let reason = object
        .get("reason")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .or_else(|| (event == Some("state.init")).then(|| "init".to_owned()));

    Ok(StateMessage::FullState {
        event: event.map(str::to_owned),
        reason,
        snapshot: decode_snapshot(hubs, devices),
    })
}

fn parse_packet_transfer(object: &Map<String, Value>) -> StateMessage {
    let source = object.get("sourceUuid").and_then(value_text);
    let target = object.get("targetUuid").and_then(value_text);
    let (Some(source), Some(target)) = (source, target) else {
        warn!("packet transfer without source or target");
        return StateMessage::Ignored(Some("packet.transfer".to_owned()));
    };

    let packet = match object.get("packet") {
        Some(value) if value.is_object() => PacketRecord::deserialize(value).unwrap_or_else(|error| {
            warn!(%error, "packet transfer carried an unreadable packet");
            PacketRecord::default()
        }),
        _ => PacketRecord::default(),
    };

    StateMessage::PacketTransfer(PacketTransfer {
        source,
        target,
        packet,
    })
}

pub fn parse_feed_message(raw: &str) -> Result<FeedMessage, SchemaError> {
    let value: Value = serde_json::from_str(raw)?;
    let event = as_object(&value)?.get("event").and_then(Value::as_str);
    let signal = match event {
        Some("ready") => Some(FeedMessage::Ready),
        Some("keepalive") => Some(FeedMessage::Keepalive),
        _ => None,
    };
    Ok(signal.unwrap_or(FeedMessage::Payload(value)))
}

fn as_object(value: &Value) -> Result<&Map<String, Value>, SchemaError> {
    value
        .as_object()
        .ok_or_else(|| SchemaError::NotAnObject(json_kind(value)))
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Ids arrive as strings, but numeric ids are tolerated.
pub(crate) fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_owned()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn id_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_text(&value).unwrap_or_default())
}

fn optional_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_text(&value))
}

fn id_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => items.iter().filter_map(value_text).collect(),
        _ => Vec::new(),
    })
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(matches!(value, Value::Bool(true)))
}
