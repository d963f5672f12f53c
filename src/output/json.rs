use serde::Serialize;

use crate::models::{CallRecord, Contact};

/// Serialize any serializable value to pretty JSON string.
pub fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

/// A call with the local proxy paths a client can open.
#[derive(Debug, Serialize)]
pub struct CallJson<'a> {
    #[serde(flatten)]
    pub call: &'a CallRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_path: Option<String>,
}

impl<'a> CallJson<'a> {
    pub fn new(call: &'a CallRecord) -> Self {
        let (stream_path, player_path) = if call.has_recording {
            (
                Some(format!("/stream/{}", call.id)),
                Some(format!("/player/{}", call.id)),
            )
        } else {
            (None, None)
        };
        Self {
            call,
            stream_path,
            player_path,
        }
    }
}

pub fn format_calls(calls: &[CallRecord]) -> String {
    let items: Vec<CallJson> = calls.iter().map(CallJson::new).collect();
    to_json(&items)
}

/// Call detail with its contact inlined.
pub fn format_call_detail(call: &CallRecord, contact: Option<&Contact>) -> String {
    #[derive(Serialize)]
    struct Detail<'a> {
        #[serde(flatten)]
        call: CallJson<'a>,
        contact: Option<&'a Contact>,
    }
    to_json(&Detail {
        call: CallJson::new(call),
        contact,
    })
}
