//! Event publisher (C8): turns decoded telegrams into the two structured
//! event kinds the host subscribes to.

use serde_json::{json, Value};

use crate::model::{GatewayState, MlTelegram, MlgwTelegram};

/// Either of the two event kinds the facade (C7) forwards to the host
#[derive(Debug, Clone)]
pub enum Event {
    /// One decoded MasterLink bus telegram (§4.8 `ML_TELEGRAM`)
    MlTelegram(Value),
    /// One decoded MLGW frame (§4.8 `MLGW_TELEGRAM`)
    MlgwTelegram(Value),
}

/// Build an `ML_TELEGRAM` event payload: the decoded telegram plus arrival
/// metadata and, when either end resolves to a tracked product, the
/// `{mln,name,entity_id}` triples for that end.
pub fn ml_event(state: &GatewayState, telegram: &MlTelegram, timestamp: String, bytes_hex: String) -> Value {
    let mut out = serde_json::to_value(telegram).unwrap_or(Value::Null);
    let obj = out.as_object_mut().expect("MlTelegram serialises to an object");
    obj.insert("timestamp".to_string(), json!(timestamp));
    obj.insert("bytes".to_string(), json!(bytes_hex));

    if let Some((product, _)) = state.product_by_ml_address(&telegram.from_device) {
        obj.insert("from_mln".to_string(), json!(product.mln));
        obj.insert("from_name".to_string(), json!(product.name));
        obj.insert("from_entity_id".to_string(), json!(entity_id(product.mln)));
    }
    if let Some((product, _)) = state.product_by_ml_address(&telegram.to_device) {
        obj.insert("to_mln".to_string(), json!(product.mln));
        obj.insert("to_name".to_string(), json!(product.name));
        obj.insert("to_entity_id".to_string(), json!(entity_id(product.mln)));
    }
    out
}

/// Build an `MLGW_TELEGRAM` event payload. `MlgwPayload` already tags itself
/// with `payload_type` in snake_case, so this is a straight serialisation.
pub fn mlgw_event(telegram: &MlgwTelegram) -> Value {
    serde_json::to_value(&telegram.payload).unwrap_or(Value::Null)
}

fn entity_id(mln: u8) -> String {
    format!("media_player.mlgw_{mln}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MlPayload, Product};

    fn product(mln: u8, ml_address: &str) -> Product {
        Product {
            mln,
            ml_address: Some(ml_address.to_string()),
            name: format!("Product {mln}"),
            zone_number: 1,
            zone_name: "Living Room".to_string(),
            sources: vec![],
            serial: None,
        }
    }

    fn telegram() -> MlTelegram {
        MlTelegram {
            to_device: "AUDIO_MASTER".to_string(),
            from_device: "VIDEO_MASTER".to_string(),
            telegram_type: "COMMAND".to_string(),
            src_dest: "NONE".to_string(),
            orig_src: "NONE".to_string(),
            payload_type: "GOTO_SOURCE".to_string(),
            payload_len: 2,
            payload: MlPayload::GotoSource {
                source: "RADIO".to_string(),
                channel_track: 2,
            },
        }
    }

    #[test]
    fn ml_event_tags_both_ends_when_known() {
        let mut state = GatewayState::new(vec![product(1, "VIDEO_MASTER"), product(2, "AUDIO_MASTER")]);
        state.serial = None;
        let event = ml_event(&state, &telegram(), "2024-01-15T12:00:00Z".to_string(), "c1c0".to_string());
        assert_eq!(event["from_mln"], json!(1));
        assert_eq!(event["to_mln"], json!(2));
        assert_eq!(event["timestamp"], json!("2024-01-15T12:00:00Z"));
        assert_eq!(event["payload"]["source"], json!("RADIO"));
    }

    #[test]
    fn ml_event_omits_unknown_ends() {
        let state = GatewayState::new(vec![]);
        let event = ml_event(&state, &telegram(), "t".to_string(), "c1c0".to_string());
        assert!(event.get("from_mln").is_none());
        assert!(event.get("to_mln").is_none());
    }

    #[test]
    fn mlgw_event_tags_payload_type() {
        let telegram = MlgwTelegram {
            payload_type: 0x05,
            payload: crate::model::MlgwPayload::AllStandby,
        };
        let event = mlgw_event(&telegram);
        assert_eq!(event["payload_type"], json!("all_standby"));
    }
}
