use std::collections::{HashMap, VecDeque};

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::schema::{PacketRecord, value_text};

pub const PACKET_HISTORY_LIMIT: usize = 200;
pub const DEVICE_HISTORY_LIMIT: usize = 400;

const DEFAULT_REPLY_KEY: &str = "__default";

#[derive(Clone, Debug, PartialEq)]
pub struct PacketEntry {
    pub packet: PacketRecord,
    pub received_at: Option<String>,
}

/// Recent packets observed by one hub, oldest first.
#[derive(Debug)]
pub struct PacketFeed {
    entries: VecDeque<PacketEntry>,
    limit: usize,
}

impl Default for PacketFeed {
    fn default() -> Self {
        Self::with_limit(PACKET_HISTORY_LIMIT)
    }
}

impl PacketFeed {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            limit: limit.max(1),
        }
    }

    pub fn entries(&self) -> &VecDeque<PacketEntry> {
        &self.entries
    }

    /// Returns `true` when the payload carried a packet.
    pub fn push_payload(&mut self, payload: &Value) -> bool {
        let Some(raw) = payload.get("packet").filter(|packet| packet.is_object()) else {
            return false;
        };

        let packet = match PacketRecord::deserialize(raw) {
            Ok(packet) => packet,
            Err(error) => {
                warn!(%error, "skipping unreadable packet in hub feed");
                return false;
            }
        };

        self.entries.push_back(PacketEntry {
            packet,
            received_at: payload
                .get("receivedAt")
                .and_then(Value::as_str)
                .map(str::to_owned),
        });
        while self.entries.len() > self.limit {
            self.entries.pop_front();
        }
        true
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplyStatus {
    Streaming,
    Completed,
    Interrupted,
}

impl ReplyStatus {
    fn from_finish_reason(reason: &str) -> Self {
        if reason == "interrupted" {
            Self::Interrupted
        } else {
            Self::Completed
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ChatBody {
    User {
        content: String,
    },
    Assistant {
        response_id: Option<String>,
        content: String,
        reasoning: Vec<String>,
        status: ReplyStatus,
        finish_reason: Option<String>,
    },
    ToolCall {
        call_id: String,
        name: Option<String>,
        arguments: Option<String>,
        result: Option<String>,
    },
    ToolResult {
        call_id: Option<String>,
        result: String,
    },
    System {
        content: String,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChatMessage {
    pub seq: u64,
    pub timestamp: Option<String>,
    pub body: ChatBody,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Contact {
    pub alias: String,
    pub uuid: String,
    pub display_name: Option<String>,
    pub kind: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RawDeviceEvent {
    #[serde(rename = "type")]
    kind: Option<String>,
    timestamp: Option<String>,
    received_at: Option<String>,
    message: Option<Value>,
    response_id: Option<Value>,
    delta: Option<Value>,
    finish_reason: Option<Value>,
    reasoning: Option<Value>,
    tool_call_id: Option<Value>,
    name: Option<Value>,
    arguments: Option<Value>,
    result: Option<Value>,
    reason: Option<Value>,
    entries: Option<Value>,
}

impl RawDeviceEvent {
    fn message_content(&self) -> Option<String> {
        self.message
            .as_ref()
            .and_then(|message| message.get("content"))
            .and_then(Value::as_str)
            .map(str::to_owned)
    }

    fn finish_reason(&self) -> Option<String> {
        self.finish_reason.as_ref().and_then(value_text)
    }
}

/// Conversation history, tool activity and contacts reported by one device.
///
/// Messages carry a monotonically increasing `seq`, so a message can be found
/// by offset from the oldest retained one. Reply and tool-call indexes hold
/// sequence numbers and are pruned when their message is evicted.
#[derive(Debug)]
pub struct DeviceFeed {
    messages: VecDeque<ChatMessage>,
    replies: HashMap<String, u64>,
    tool_calls: HashMap<String, u64>,
    contacts: Vec<Contact>,
    contacts_updated: Option<String>,
    streaming: bool,
    next_seq: u64,
    limit: usize,
}

impl Default for DeviceFeed {
    fn default() -> Self {
        Self::new(false)
    }
}

impl DeviceFeed {
    pub fn new(streaming: bool) -> Self {
        Self::with_limit(streaming, DEVICE_HISTORY_LIMIT)
    }

    pub fn with_limit(streaming: bool, limit: usize) -> Self {
        Self {
            messages: VecDeque::new(),
            replies: HashMap::new(),
            tool_calls: HashMap::new(),
            contacts: Vec::new(),
            contacts_updated: None,
            streaming,
            next_seq: 0,
            limit: limit.max(1),
        }
    }

    pub fn messages(&self) -> &VecDeque<ChatMessage> {
        &self.messages
    }

    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    pub fn contacts_updated(&self) -> Option<&str> {
        self.contacts_updated.as_deref()
    }

    pub fn streaming(&self) -> bool {
        self.streaming
    }

    pub fn override_streaming(&mut self, streaming: bool) {
        self.streaming = streaming;
    }

    /// Streaming while any tracked reply is still streaming. With no tracked
    /// replies the last known flag stands.
    pub fn refresh_streaming(&mut self) -> bool {
        if !self.replies.is_empty() {
            let streaming = self.replies.values().any(|seq| {
                matches!(
                    self.message(*seq),
                    Some(ChatMessage {
                        body: ChatBody::Assistant {
                            status: ReplyStatus::Streaming,
                            ..
                        },
                        ..
                    })
                )
            });
            self.streaming = streaming;
        }
        self.streaming
    }

    /// Applies one device event and returns the resulting streaming flag.
    pub fn process(&mut self, payload: &Value) -> bool {
        if !payload.is_object() {
            return self.streaming;
        }

        let event = RawDeviceEvent::deserialize(payload).unwrap_or_else(|error| {
            debug!(%error, "device event does not match the known shape");
            RawDeviceEvent::default()
        });
        let timestamp = event.timestamp.clone().or_else(|| event.received_at.clone());

        match event.kind.as_deref().unwrap_or("unknown") {
            "user.message" => {
                let content = event.message_content().unwrap_or_default();
                self.push(timestamp, ChatBody::User { content });
            }
            "assistant.delta" => self.apply_delta(&event, timestamp),
            "assistant.message" => self.apply_reply(&event, timestamp),
            "assistant.tool_call" => {
                let call_id = event
                    .tool_call_id
                    .as_ref()
                    .and_then(value_text)
                    .unwrap_or_else(|| format!("tool-{}", self.next_seq));
                let seq = self.push(
                    timestamp,
                    ChatBody::ToolCall {
                        call_id: call_id.clone(),
                        name: event.name.as_ref().and_then(value_text),
                        arguments: event.arguments.as_ref().map(display_text),
                        result: None,
                    },
                );
                self.tool_calls.insert(call_id, seq);
            }
            "tool.result" => self.apply_tool_result(&event, timestamp),
            "assistant.interrupted" => {
                let content = match event.reason.as_ref().and_then(value_text).as_deref() {
                    Some("new_input") => "reply interrupted by new input".to_owned(),
                    Some(reason) => format!("reply interrupted ({reason})"),
                    None => "reply interrupted (reason unknown)".to_owned(),
                };
                if let Some(ChatMessage {
                    timestamp: stamp,
                    body:
                        ChatBody::Assistant {
                            status,
                            finish_reason,
                            ..
                        },
                    ..
                }) = self
                    .messages
                    .iter_mut()
                    .rev()
                    .find(|message| matches!(message.body, ChatBody::Assistant { .. }))
                {
                    *status = ReplyStatus::Interrupted;
                    *finish_reason = Some("interrupted".to_owned());
                    *stamp = timestamp.clone();
                }
                self.push(timestamp, ChatBody::System { content });
            }
            "contacts.directory" => {
                self.contacts = event
                    .entries
                    .as_ref()
                    .and_then(Value::as_array)
                    .map(|entries| entries.iter().filter_map(contact_from).collect())
                    .unwrap_or_default();
                self.contacts_updated = timestamp;
            }
            _ => {
                self.push(
                    timestamp,
                    ChatBody::System {
                        content: display_text(payload),
                    },
                );
            }
        }

        self.refresh_streaming()
    }

    fn apply_delta(&mut self, event: &RawDeviceEvent, timestamp: Option<String>) {
        let response_id = event.response_id.as_ref().and_then(value_text);
        let finish = event.finish_reason();
        let seq = self.reply_seq(&response_id).unwrap_or_else(|| {
            self.start_reply(
                response_id.clone(),
                timestamp.clone(),
                ChatBody::Assistant {
                    response_id: response_id.clone(),
                    content: String::new(),
                    reasoning: Vec::new(),
                    status: ReplyStatus::Streaming,
                    finish_reason: finish.clone(),
                },
            )
        });

        let Some(ChatMessage {
            timestamp: stamp,
            body:
                ChatBody::Assistant {
                    content,
                    reasoning,
                    status,
                    finish_reason,
                    ..
                },
            ..
        }) = self.message_mut(seq)
        else {
            return;
        };

        if let Some(delta) = &event.delta {
            if let Some(text) = delta.get("content").and_then(Value::as_str) {
                content.push_str(text);
            }
            if let Some(extra) = delta.get("reasoning") {
                reasoning.extend(reasoning_fragments(extra));
            }
        }
        if let Some(reason) = finish {
            *status = ReplyStatus::from_finish_reason(&reason);
            *finish_reason = Some(reason);
        }
        *stamp = timestamp;
    }

    fn apply_reply(&mut self, event: &RawDeviceEvent, timestamp: Option<String>) {
        let response_id = event.response_id.as_ref().and_then(value_text);
        let incoming = event.message_content();
        let finish = event.finish_reason();

        let Some(seq) = self.reply_seq(&response_id) else {
            self.start_reply(
                response_id.clone(),
                timestamp,
                ChatBody::Assistant {
                    response_id,
                    content: incoming.unwrap_or_default(),
                    reasoning: event
                        .reasoning
                        .as_ref()
                        .map(reasoning_fragments)
                        .unwrap_or_default(),
                    status: ReplyStatus::Completed,
                    finish_reason: finish,
                },
            );
            return;
        };

        let Some(ChatMessage {
            timestamp: stamp,
            body:
                ChatBody::Assistant {
                    content,
                    reasoning,
                    status,
                    finish_reason,
                    ..
                },
            ..
        }) = self.message_mut(seq)
        else {
            return;
        };

        if let Some(text) = incoming.filter(|text| !text.is_empty())
            && content.is_empty()
        {
            *content = text;
        }
        *status = finish
            .as_deref()
            .map_or(ReplyStatus::Completed, ReplyStatus::from_finish_reason);
        *stamp = timestamp;
        if finish.is_some() {
            *finish_reason = finish;
        }
        let fragments = event
            .reasoning
            .as_ref()
            .map(reasoning_fragments)
            .unwrap_or_default();
        if !fragments.is_empty() {
            *reasoning = fragments;
        }
    }

    fn apply_tool_result(&mut self, event: &RawDeviceEvent, timestamp: Option<String>) {
        let call_id = event.tool_call_id.as_ref().and_then(value_text);
        let text = event.result.as_ref().map(display_text).unwrap_or_default();

        let known = call_id
            .as_ref()
            .and_then(|id| self.tool_calls.get(id).copied());
        if let Some(seq) = known
            && let Some(ChatMessage {
                timestamp: stamp,
                body: ChatBody::ToolCall { result, .. },
                ..
            }) = self.message_mut(seq)
        {
            *result = Some(text);
            *stamp = timestamp;
            return;
        }

        self.push(
            timestamp,
            ChatBody::ToolResult {
                call_id,
                result: text,
            },
        );
    }

    fn reply_seq(&self, response_id: &Option<String>) -> Option<u64> {
        let key = response_id.as_deref().unwrap_or(DEFAULT_REPLY_KEY);
        self.replies.get(key).copied()
    }

    fn start_reply(
        &mut self,
        response_id: Option<String>,
        timestamp: Option<String>,
        body: ChatBody,
    ) -> u64 {
        let seq = self.push(timestamp, body);
        let key = response_id.unwrap_or_else(|| DEFAULT_REPLY_KEY.to_owned());
        self.replies.insert(key, seq);
        seq
    }

    fn push(&mut self, timestamp: Option<String>, body: ChatBody) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.messages.push_back(ChatMessage {
            seq,
            timestamp,
            body,
        });

        while self.messages.len() > self.limit {
            let Some(evicted) = self.messages.pop_front() else {
                break;
            };
            match &evicted.body {
                ChatBody::Assistant { .. } => self.replies.retain(|_, seq| *seq != evicted.seq),
                ChatBody::ToolCall { call_id, .. } => {
                    if self.tool_calls.get(call_id) == Some(&evicted.seq) {
                        self.tool_calls.remove(call_id);
                    }
                }
                ChatBody::User { .. } | ChatBody::ToolResult { .. } | ChatBody::System { .. } => {}
            }
        }
        seq
    }

    fn message(&self, seq: u64) -> Option<&ChatMessage> {
        let first = self.messages.front()?.seq;
        let index = usize::try_from(seq.checked_sub(first)?).ok()?;
        self.messages.get(index)
    }

    fn message_mut(&mut self, seq: u64) -> Option<&mut ChatMessage> {
        let first = self.messages.front()?.seq;
        let index = usize::try_from(seq.checked_sub(first)?).ok()?;
        self.messages.get_mut(index)
    }
}

fn contact_from(item: &Value) -> Option<Contact> {
    let object = item.as_object()?;
    let field = |key: &str| match object.get(key) {
        None | Some(Value::Null) => None,
        Some(value) => Some(display_text(value)),
    };

    Some(Contact {
        alias: field("alias").unwrap_or_default(),
        uuid: field("uuid").unwrap_or_default(),
        display_name: field("displayName"),
        kind: field("kind")
            .filter(|kind| !kind.is_empty())
            .unwrap_or_else(|| "unknown".to_owned()),
    })
}

fn reasoning_fragments(value: &Value) -> Vec<String> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items
            .iter()
            .flat_map(|item| match item {
                Value::Array(inner) => inner.iter().collect::<Vec<_>>(),
                other => vec![other],
            })
            .filter(|item| !item.is_null())
            .map(display_text)
            .collect(),
        other => vec![display_text(other)],
    }
}

/// Strings as-is, everything else as pretty JSON.
pub fn display_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn body(feed: &DeviceFeed, index: usize) -> &ChatBody {
        &feed.messages()[index].body
    }

    #[test]
    fn packet_history_is_bounded_and_needs_a_packet() {
        let mut feed = PacketFeed::with_limit(2);
        assert!(!feed.push_payload(&json!({"event": "noise"})));
        assert!(!feed.push_payload(&json!({"packet": "TALK"})));

        for ttl in 1..=3 {
            assert!(feed.push_payload(&json!({
                "packet": {"type": "talk", "ttl": ttl},
                "receivedAt": format!("t{ttl}")
            })));
        }

        let ttls = feed
            .entries()
            .iter()
            .map(|entry| entry.packet.ttl)
            .collect::<Vec<_>>();
        assert_eq!(ttls, vec![Some(2), Some(3)]);
        assert_eq!(feed.entries()[1].received_at.as_deref(), Some("t3"));
    }

    #[test]
    fn deltas_accumulate_into_one_streaming_reply() {
        let mut feed = DeviceFeed::default();
        assert!(feed.process(&json!({
            "type": "assistant.delta", "responseId": "r1",
            "delta": {"content": "Hel", "reasoning": "thinking"}
        })));
        assert!(feed.process(&json!({
            "type": "assistant.delta", "responseId": "r1",
            "delta": {"content": "lo", "reasoning": ["more", ["nested"], null]}
        })));
        assert_eq!(feed.messages().len(), 1);

        assert!(!feed.process(&json!({
            "type": "assistant.delta", "responseId": "r1", "finishReason": "stop"
        })));

        match body(&feed, 0) {
            ChatBody::Assistant {
                content,
                reasoning,
                status,
                finish_reason,
                ..
            } => {
                assert_eq!(content, "Hello");
                assert_eq!(reasoning, &vec!["thinking", "more", "nested"]);
                assert_eq!(*status, ReplyStatus::Completed);
                assert_eq!(finish_reason.as_deref(), Some("stop"));
            }
            other => panic!("expected an assistant reply, got {other:?}"),
        }
    }

    #[test]
    fn full_message_completes_a_streaming_reply() {
        let mut feed = DeviceFeed::default();
        feed.process(&json!({"type": "user.message", "message": {"content": "hi"}}));
        assert!(feed.process(&json!({"type": "assistant.delta", "delta": {}})));
        assert!(!feed.process(&json!({
            "type": "assistant.message", "message": {"content": "hello there"}
        })));

        assert_eq!(feed.messages().len(), 2);
        assert_eq!(
            body(&feed, 0),
            &ChatBody::User {
                content: "hi".to_owned()
            }
        );
        assert!(matches!(
            body(&feed, 1),
            ChatBody::Assistant { content, status: ReplyStatus::Completed, .. } if content == "hello there"
        ));
    }

    #[test]
    fn tool_results_attach_to_their_call() {
        let mut feed = DeviceFeed::default();
        feed.process(&json!({
            "type": "assistant.tool_call", "toolCallId": "c1",
            "name": "lookup", "arguments": {"q": "x"}
        }));
        feed.process(&json!({"type": "tool.result", "toolCallId": "c1", "result": "found"}));
        feed.process(&json!({"type": "tool.result", "toolCallId": "c9", "result": {"ok": true}}));

        assert_eq!(feed.messages().len(), 2);
        assert!(matches!(
            body(&feed, 0),
            ChatBody::ToolCall { name: Some(name), result: Some(result), .. }
                if name == "lookup" && result == "found"
        ));
        assert!(matches!(
            body(&feed, 1),
            ChatBody::ToolResult { call_id: Some(id), .. } if id == "c9"
        ));
    }

    #[test]
    fn interruption_marks_the_latest_reply() {
        let mut feed = DeviceFeed::default();
        feed.process(&json!({"type": "assistant.delta", "responseId": "r1", "delta": {"content": "a"}}));
        assert!(!feed.process(&json!({"type": "assistant.interrupted", "reason": "new_input"})));

        assert!(matches!(
            body(&feed, 0),
            ChatBody::Assistant { status: ReplyStatus::Interrupted, .. }
        ));
        assert_eq!(
            body(&feed, 1),
            &ChatBody::System {
                content: "reply interrupted by new input".to_owned()
            }
        );
    }

    #[test]
    fn contacts_directory_replaces_the_list() {
        let mut feed = DeviceFeed::default();
        feed.process(&json!({
            "type": "contacts.directory", "timestamp": "t1",
            "entries": [
                {"alias": "bob", "uuid": "D2", "displayName": "Bob", "kind": "device"},
                {"alias": 7, "uuid": null},
                "junk"
            ]
        }));

        assert_eq!(feed.contacts().len(), 2);
        assert_eq!(feed.contacts()[0].display_name.as_deref(), Some("Bob"));
        assert_eq!(feed.contacts()[1].alias, "7");
        assert_eq!(feed.contacts()[1].uuid, "");
        assert_eq!(feed.contacts()[1].kind, "unknown");
        assert_eq!(feed.contacts_updated(), Some("t1"));
        assert!(feed.messages().is_empty());
    }

    #[test]
    fn unknown_events_become_system_lines() {
        let mut feed = DeviceFeed::new(true);
        assert!(feed.process(&json!({"type": "device.rebooted", "ok": true})));
        match body(&feed, 0) {
            ChatBody::System { content } => assert!(content.contains("device.rebooted")),
            other => panic!("expected a system line, got {other:?}"),
        }
    }

    #[test]
    fn evicted_replies_are_forgotten() {
        let mut feed = DeviceFeed::with_limit(false, 2);
        feed.process(&json!({"type": "assistant.delta", "responseId": "r1", "delta": {"content": "a"}}));
        feed.process(&json!({"type": "user.message", "message": {"content": "1"}}));
        feed.process(&json!({"type": "user.message", "message": {"content": "2"}}));
        feed.process(&json!({"type": "assistant.delta", "responseId": "r1", "delta": {"content": "b"}}));

        assert_eq!(feed.messages().len(), 2);
        assert!(matches!(
            body(&feed, 1),
            ChatBody::Assistant { content, .. } if content == "b"
        ));
        assert_eq!(feed.messages()[1].seq, 3);
    }

    #[test]
    fn override_sets_the_flag_until_replies_say_otherwise() {
        let mut feed = DeviceFeed::default();
        feed.override_streaming(true);
        assert!(feed.streaming());
        assert!(feed.refresh_streaming());

        feed.process(&json!({"type": "assistant.message", "message": {"content": "done"}}));
        assert!(!feed.streaming());
    }
}
