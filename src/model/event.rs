use serde_json::Value;

/// Column id the board reports when the item's name changed.
pub const NAME_COLUMN: &str = "name";

/// What an inbound webhook body turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundPayload {
    /// Verification handshake; the value is echoed back untouched.
    Challenge(Value),
    Event(WebhookEvent),
    /// No usable event in the body.
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEvent {
    pub item_id: u64,
    pub board_id: u64,
    pub column_id: Option<String>,
    /// Inline new value, when the board sends one.
    pub value: Option<Value>,
}

impl WebhookEvent {
    /// Linked item ids carried inline for relation columns, if any.
    pub fn inline_linked_ids(&self) -> Option<Vec<u64>> {
        let value = self.value.as_ref()?;
        let linked = value
            .get("linkedPulseIds")
            .or_else(|| value.get("linkedItemIds"))?
            .as_array()?;
        Some(
            linked
                .iter()
                .filter_map(|entry| {
                    entry
                        .get("linkedPulseId")
                        .map_or_else(|| as_id(entry), as_id)
                })
                .collect(),
        )
    }
}

/// Ids arrive as numbers or numeric strings depending on the event type.
pub fn as_id(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Classify a raw webhook body. Never fails: anything unusable is `Empty`.
pub fn parse_inbound(body: &[u8]) -> InboundPayload {
    let json: Value = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(_) => return InboundPayload::Empty,
    };

    if let Some(challenge) = json.get("challenge") {
        return InboundPayload::Challenge(challenge.clone());
    }

    let Some(event) = json.get("event") else {
        return InboundPayload::Empty;
    };

    let item_id = event
        .get("pulseId")
        .and_then(as_id)
        .or_else(|| event.get("itemId").and_then(as_id));
    let board_id = event.get("boardId").and_then(as_id);

    match (item_id, board_id) {
        (Some(item_id), Some(board_id)) => InboundPayload::Event(WebhookEvent {
            item_id,
            board_id,
            column_id: event
                .get("columnId")
                .and_then(Value::as_str)
                .map(String::from),
            value: event.get("value").filter(|v| !v.is_null()).cloned(),
        }),
        _ => InboundPayload::Empty,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn challenge_is_kept_verbatim() {
        let body = br#"{"challenge":"3eZbrw1aBm2rZgRNFdxV2595E9CY3gmdALWMmHkvFXO7tYXAYM8P"}"#;
        assert_eq!(
            parse_inbound(body),
            InboundPayload::Challenge(json!("3eZbrw1aBm2rZgRNFdxV2595E9CY3gmdALWMmHkvFXO7tYXAYM8P"))
        );
    }

    #[test]
    fn event_with_pulse_id() {
        let body = json!({"event": {"pulseId": 12, "boardId": "34", "columnId": "date4"}});
        let InboundPayload::Event(event) = parse_inbound(body.to_string().as_bytes()) else {
            panic!("expected event");
        };
        assert_eq!(event.item_id, 12);
        assert_eq!(event.board_id, 34);
        assert_eq!(event.column_id.as_deref(), Some("date4"));
        assert!(event.value.is_none());
    }

    #[test]
    fn event_with_item_id_alias() {
        let body = json!({"event": {"itemId": "99", "boardId": 1}});
        let InboundPayload::Event(event) = parse_inbound(body.to_string().as_bytes()) else {
            panic!("expected event");
        };
        assert_eq!(event.item_id, 99);
        assert_eq!(event.column_id, None);
    }

    #[test]
    fn garbage_and_missing_event_are_empty() {
        assert_eq!(parse_inbound(b"not json"), InboundPayload::Empty);
        assert_eq!(parse_inbound(b"{}"), InboundPayload::Empty);
        assert_eq!(
            parse_inbound(br#"{"event": {"boardId": 1}}"#),
            InboundPayload::Empty
        );
    }

    #[test]
    fn inline_relation_ids() {
        let body = json!({"event": {
            "pulseId": 1, "boardId": 2, "columnId": "connect_boards",
            "value": {"linkedPulseIds": [{"linkedPulseId": 501}, {"linkedPulseId": 502}]}
        }});
        let InboundPayload::Event(event) = parse_inbound(body.to_string().as_bytes()) else {
            panic!("expected event");
        };
        assert_eq!(event.inline_linked_ids(), Some(vec![501, 502]));
    }

    #[test]
    fn no_inline_ids_without_value() {
        let event = WebhookEvent {
            item_id: 1,
            board_id: 2,
            column_id: Some(NAME_COLUMN.into()),
            value: None,
        };
        assert_eq!(event.inline_linked_ids(), None);
    }
}
