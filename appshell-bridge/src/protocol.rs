use serde::{Deserialize, Serialize};
use serde_json::Value;

use appshell_core::ErrorCode;

// ---------------------------------------------------------------------------
// Messages: JS → native (sent via postMessage)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// The shim finished installing `window.appshell`.
    Ready,
    /// Invoke a named native operation. `id <= 0` asks for no response.
    Call {
        id: i64,
        name: String,
        #[serde(default)]
        args: Vec<Value>,
    },
    /// Answer to an `ExecuteCommand` sent by the native side.
    CommandResult { callback_id: i64, handled: bool },
}

// ---------------------------------------------------------------------------
// Messages: native → JS (sent via evaluate_javascript)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ShellMessage {
    Response {
        id: i64,
        err: i32,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        result: Vec<Value>,
    },
    /// Run a JS-owned command, e.g. a menu item or `file.close_window`.
    /// `callback_id == 0` means the result is not wanted.
    ExecuteCommand { callback_id: i64, command: String },
    FilesDropped { paths: Vec<String> },
}

impl ShellMessage {
    pub fn response(id: i64, result: Result<Vec<Value>, ErrorCode>) -> Self {
        match result {
            Ok(result) => ShellMessage::Response {
                id,
                err: ErrorCode::NoError.code(),
                result,
            },
            Err(code) => ShellMessage::Response {
                id,
                err: code.code(),
                result: Vec::new(),
            },
        }
    }
}

/// Name of the script message handler the shim posts to.
pub const MESSAGE_HANDLER_NAME: &str = "appshell";

/// JS function the shim exposes for native → JS delivery.
pub const RECEIVE_FUNCTION: &str = "appshellReceive";

/// Build the script that delivers `message` to the page.
pub fn delivery_script(message: &ShellMessage) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string(message)?;
    // Escape for embedding in a JS string literal
    let escaped = json.replace('\\', "\\\\").replace('\'', "\\'");
    Ok(format!("{}('{}')", RECEIVE_FUNCTION, escaped))
}

pub fn parse_client_message(json: &str) -> Result<ClientMessage, serde_json::Error> {
    serde_json::from_str(json)
}

/// Id of a `Call` that failed to parse but still names who to answer.
pub fn malformed_call_id(json: &str) -> Option<i64> {
    let value: Value = serde_json::from_str(json).ok()?;
    if value.get("type")?.as_str()? != "Call" {
        return None;
    }
    value.get("id")?.as_i64().filter(|id| *id > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn call_parses_with_and_without_args() {
        let msg = parse_client_message(
            r#"{"type":"Call","id":7,"name":"ReadFile","args":["/tmp/a","utf8"]}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            ClientMessage::Call {
                id: 7,
                name: "ReadFile".to_string(),
                args: vec![json!("/tmp/a"), json!("utf8")],
            }
        );

        let msg = parse_client_message(r#"{"type":"Call","id":0,"name":"AbortQuit"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Call { args, .. } if args.is_empty()));
    }

    #[test]
    fn command_result_parses() {
        let msg =
            parse_client_message(r#"{"type":"CommandResult","callback_id":3,"handled":true}"#)
                .unwrap();
        assert_eq!(
            msg,
            ClientMessage::CommandResult {
                callback_id: 3,
                handled: true
            }
        );
    }

    #[test]
    fn error_response_has_no_result() {
        let msg = ShellMessage::response(4, Err(ErrorCode::NotFound));
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json, json!({"type": "Response", "id": 4, "err": 3}));
    }

    #[test]
    fn delivery_script_escapes_quotes() {
        let msg = ShellMessage::response(1, Ok(vec![json!("it's a \\ path")]));
        let script = delivery_script(&msg).unwrap();
        assert!(script.starts_with("appshellReceive('"));
        assert!(script.contains("it\\'s"));
        assert!(script.contains("\\\\\\\\ path"));
    }

    #[test]
    fn malformed_call_keeps_its_id() {
        let json = r#"{"type":"Call","id":12,"name":42,"args":"nope"}"#;
        assert!(parse_client_message(json).is_err());
        assert_eq!(malformed_call_id(json), Some(12));

        assert_eq!(malformed_call_id(r#"{"type":"Call","id":0,"name":7}"#), None);
        assert_eq!(malformed_call_id(r#"{"type":"CommandResult","id":3}"#), None);
        assert_eq!(malformed_call_id(r#"{"type":"Call","name":"ReadDir"}"#), None);
        assert_eq!(malformed_call_id("not json"), None);
    }
}
