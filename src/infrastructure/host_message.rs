// Host window messages - inbound parsing and outbound announcements
use serde::{Deserialize, Serialize};
use serde_json::Value;

const PLUGIN_TARGET: &str = "plugin";
const FORBIDDEN_KEYS: [&str; 2] = ["__proto__", "constructor"];

#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    WakeupPlugin { url: String },
    SwitchLanguage { lang: String },
    SetTheme { is_dark: bool },
    RemoteImport { project_name: String },
    RemoteRemove,
    RemoteReset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OutboundEvent {
    #[serde(rename = "pluginMounted")]
    PluginMounted,
    #[serde(rename = "getLanguage")]
    GetLanguage,
    #[serde(rename = "getTheme")]
    GetTheme,
}

/// What the panel posts back to its parent window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OutboundMessage {
    pub event: OutboundEvent,
}

impl OutboundMessage {
    pub fn new(event: OutboundEvent) -> Self {
        Self { event }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    body: Value,
}

/// Parses JSON text and drops prototype-polluting keys at every depth.
/// Anything unparsable is `None`.
pub fn safe_json_parse(raw: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(raw) {
        Ok(mut value) => {
            strip_forbidden_keys(&mut value);
            Some(value)
        }
        Err(e) => {
            tracing::warn!("Ignoring unparsable host message: {}", e);
            None
        }
    }
}

fn strip_forbidden_keys(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|key, _| !FORBIDDEN_KEYS.contains(&key.as_str()));
            map.values_mut().for_each(strip_forbidden_keys);
        }
        Value::Array(items) => items.iter_mut().for_each(strip_forbidden_keys),
        _ => {}
    }
}

/// Accepts the raw request body: an object, or a string holding one.
pub fn parse_host_message(raw: &str) -> Option<HostEvent> {
    let value = match safe_json_parse(raw)? {
        Value::String(inner) => safe_json_parse(&inner)?,
        value => value,
    };
    parse_host_value(value)
}

pub fn parse_host_value(mut value: Value) -> Option<HostEvent> {
    strip_forbidden_keys(&mut value);
    let envelope: Envelope = match serde_json::from_value(value) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!("Host message is not an envelope: {}", e);
            return None;
        }
    };
    if envelope.target.as_deref() != Some(PLUGIN_TARGET) {
        return None;
    }

    let event = envelope.event.unwrap_or_default();
    let parsed = match event.as_str() {
        "wakeupPlugin" => text_at(&envelope.data, &["url"]).map(|url| HostEvent::WakeupPlugin { url }),
        "switchLanguage" => {
            text_at(&envelope.body, &["lang"]).map(|lang| HostEvent::SwitchLanguage { lang })
        }
        "setTheme" => Some(HostEvent::SetTheme {
            is_dark: envelope.body.get("isDark").and_then(Value::as_bool).unwrap_or(false),
        }),
        "remote/import" => text_at(&envelope.body, &["dataSource", "projectName"])
            .map(|project_name| HostEvent::RemoteImport { project_name }),
        "remote/remove" => Some(HostEvent::RemoteRemove),
        "remote/reset" => Some(HostEvent::RemoteReset),
        _ => None,
    };
    if parsed.is_none() {
        tracing::debug!("Unhandled host event {:?}", event);
    }
    parsed
}

fn text_at(value: &Value, path: &[&str]) -> Option<String> {
    path.iter()
        .try_fold(value, |node, key| node.get(key))
        .and_then(Value::as_str)
        .map(str::to_string)
}
