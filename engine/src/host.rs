//! Line-delimited JSON spoken with the editor host.
//!
//! Each stdin line is one [`HostEvent`]; each stdout line is one
//! [`HostMessage`]. Both are tagged by `type`.

use kestrel_lsp::{ClientError, ClientNotice, DiagnosticsSnapshot};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum HostEvent {
    AddFolder {
        uri: Url,
        name: Option<String>,
    },
    RemoveFolder {
        uri: Url,
    },
    /// The editor switched documents. `uri` is absent when nothing is open.
    ActiveDocument {
        uri: Option<Url>,
    },
    ConfigurationChanged,
    DidOpen {
        uri: Url,
        language_id: String,
        text: String,
    },
    DidChange {
        uri: Url,
        text: String,
    },
    DidClose {
        uri: Url,
    },
    Completion {
        id: u64,
        uri: Url,
        line: u32,
        character: u32,
    },
    Definition {
        id: u64,
        uri: Url,
        line: u32,
        character: u32,
    },
    Request {
        id: u64,
        uri: Url,
        method: String,
        #[serde(default)]
        params: Option<Value>,
    },
    Diagnostics {
        id: u64,
    },
}

impl HostEvent {
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponseError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HostMessage {
    Response {
        id: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<ResponseError>,
    },
    Notice {
        notice: ClientNotice,
    },
    PromptReload {
        settings: Vec<String>,
        message: String,
    },
    Error {
        message: String,
    },
}

impl HostMessage {
    #[must_use]
    pub fn result(id: u64, result: Value) -> Self {
        Self::Response {
            id,
            result: Some(result),
            error: None,
        }
    }

    #[must_use]
    pub fn failure(id: u64, error: &ClientError) -> Self {
        Self::Response {
            id,
            result: None,
            error: Some(ResponseError {
                code: error.code(),
                message: error.to_string(),
            }),
        }
    }

    #[must_use]
    pub fn reply(id: u64, outcome: Result<Value, ClientError>) -> Self {
        match outcome {
            Ok(result) => Self::result(id, result),
            Err(e) => Self::failure(id, &e),
        }
    }

    /// Reload requests become a prompt; everything else is passed through.
    #[must_use]
    pub fn from_notice(notice: ClientNotice) -> Self {
        match notice {
            ClientNotice::ReloadRequired { settings } => {
                let message = format!(
                    "Changing {} requires reloading the extension host.",
                    settings.join(", ")
                );
                Self::PromptReload { settings, message }
            }
            notice => Self::Notice { notice },
        }
    }

    #[must_use]
    pub fn diagnostics(id: u64, snapshot: &DiagnosticsSnapshot) -> Self {
        match serde_json::to_value(snapshot) {
            Ok(value) => Self::result(id, value),
            Err(e) => Self::Response {
                id,
                result: None,
                error: Some(ResponseError {
                    code: -32603,
                    message: format!("serializing diagnostics: {e}"),
                }),
            },
        }
    }

    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
