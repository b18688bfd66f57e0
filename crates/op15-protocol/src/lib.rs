//! Wire Codec: frames and parses the Request/Response/control-message
//! family carried over the long-lived channel between the Bridge Manager
//! and the Agent Daemon. UTF-8 text frames only; no binary frames.

pub mod control;
pub mod operation;
pub mod request;
pub mod response;

pub use control::ControlMessage;
pub use op15_domain::error::Error;
pub use operation::Operation;
pub use request::Request;
pub use response::Response;

/// Maximum size, in bytes, of a single text frame either side will accept
/// before treating the peer as sending something pathological.
pub const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

/// The three shapes a raw text frame can decode into.
#[derive(Debug, Clone)]
pub enum WireMessage {
    Control(ControlMessage),
    Request(Request),
    Response(Response),
}

/// Decode a raw text frame. Returns `Error::MalformedFrame` on a JSON
/// parse error or when the JSON value doesn't match any of the three
/// known shapes — the recipient is expected to close the channel with
/// code `policy` when this happens.
pub fn decode_frame(raw: &str) -> Result<WireMessage, Error> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| Error::MalformedFrame(e.to_string()))?;

    if value.get("type").is_some() {
        let control: ControlMessage = serde_json::from_value(value)
            .map_err(|e| Error::MalformedFrame(e.to_string()))?;
        return Ok(WireMessage::Control(control));
    }

    if value.get("operation").is_some() {
        let request: Request = serde_json::from_value(value)
            .map_err(|e| Error::MalformedFrame(e.to_string()))?;
        return Ok(WireMessage::Request(request));
    }

    if value.get("id").is_some() {
        let response: Response = serde_json::from_value(value)
            .map_err(|e| Error::MalformedFrame(e.to_string()))?;
        return Ok(WireMessage::Response(response));
    }

    Err(Error::MalformedFrame("unrecognized frame shape".to_string()))
}

/// Encode any of the three shapes to a single-line JSON text frame.
pub fn encode_frame(msg: &WireMessage) -> Result<String, Error> {
    let json = match msg {
        WireMessage::Control(c) => serde_json::to_string(c),
        WireMessage::Request(r) => serde_json::to_string(r),
        WireMessage::Response(r) => serde_json::to_string(r),
    };
    json.map_err(Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_request_by_operation_field() {
        let raw = r#"{"id":"r1","operation":"fs.list","path":"/tmp"}"#;
        match decode_frame(raw).unwrap() {
            WireMessage::Request(r) => assert_eq!(r.id, "r1"),
            _ => panic!("expected Request"),
        }
    }

    #[test]
    fn decodes_response_by_absence_of_type_and_operation() {
        let raw = r#"{"id":"r1","data":{"ok":true}}"#;
        match decode_frame(raw).unwrap() {
            WireMessage::Response(r) => assert!(r.is_ok()),
            _ => panic!("expected Response"),
        }
    }

    #[test]
    fn decodes_control_by_type_field() {
        let raw = r#"{"type":"ping","timestamp":1}"#;
        match decode_frame(raw).unwrap() {
            WireMessage::Control(ControlMessage::Ping { timestamp }) => assert_eq!(timestamp, 1),
            _ => panic!("expected Ping"),
        }
    }

    #[test]
    fn malformed_json_is_malformed_frame() {
        let err = decode_frame("{not json").unwrap_err();
        assert_eq!(err.kind(), "malformed-frame");
    }

    #[test]
    fn unrecognized_shape_is_malformed_frame() {
        let err = decode_frame("{}").unwrap_err();
        assert_eq!(err.kind(), "malformed-frame");
    }

    #[test]
    fn round_trips_through_encode_and_decode() {
        let resp = Response::ok("r1", serde_json::json!({"x": 1}));
        let encoded = encode_frame(&WireMessage::Response(resp)).unwrap();
        match decode_frame(&encoded).unwrap() {
            WireMessage::Response(r) => assert_eq!(r.id, "r1"),
            _ => panic!("expected Response"),
        }
    }
}
