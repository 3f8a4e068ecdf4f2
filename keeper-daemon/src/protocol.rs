use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use keeper_core::DaemonError;

use crate::error::{io_err, ProxyError};

/// JSON newline-delimited request, tagged by `cmd`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum DaemonRequest {
    Ping,
    GetConfig {
        section: String,
        key: String,
    },
    SetConfig {
        section: String,
        key: String,
        value: Value,
    },
    Status,
    Paused,
    PendingErrors,
    ClearErrors,
    StartSync,
    PauseSync,
    ResumeSync,
    StopSync,
    RebuildIndex,
    DropboxPath,
    ToLocalPath {
        path: String,
    },
    CheckForUpdates,
    /// Queue an error for the front-end; sent by the sync engine.
    ReportError {
        error: DaemonError,
    },
    Shutdown,
}

impl DaemonRequest {
    /// How long the caller waits for a reply. Update checks go out to the network.
    pub fn timeout(&self) -> Duration {
        match self {
            DaemonRequest::CheckForUpdates => Duration::from_secs(30),
            _ => Duration::from_secs(5),
        }
    }
}

/// JSON newline-delimited response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DaemonResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }

    /// Unwrap the payload, turning a daemon-side failure into [`ProxyError::Protocol`].
    pub fn into_data(self) -> Result<Value, ProxyError> {
        if self.ok {
            Ok(self.data.unwrap_or(Value::Null))
        } else {
            Err(ProxyError::Protocol(
                self.error
                    .unwrap_or_else(|| "unknown daemon error".to_string()),
            ))
        }
    }
}

/// Send one JSON request to the daemon socket and return one response.
pub fn send_request(socket: &Path, request: &DaemonRequest) -> Result<DaemonResponse, ProxyError> {
    if !socket.exists() {
        return Err(ProxyError::DaemonNotRunning {
            socket: socket.to_path_buf(),
        });
    }

    let mut stream = UnixStream::connect(socket).map_err(|err| {
        if matches!(
            err.kind(),
            std::io::ErrorKind::NotFound
                | std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::ConnectionReset
        ) {
            ProxyError::DaemonNotRunning {
                socket: socket.to_path_buf(),
            }
        } else {
            io_err(socket, err)
        }
    })?;
    let timeout = request.timeout();
    let _ = stream.set_read_timeout(Some(timeout));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));

    let payload = serde_json::to_string(request)?;
    stream
        .write_all(payload.as_bytes())
        .map_err(|e| io_err(socket, e))?;
    stream.write_all(b"\n").map_err(|e| io_err(socket, e))?;
    stream.flush().map_err(|e| io_err(socket, e))?;

    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    let read = reader.read_line(&mut line).map_err(|e| io_err(socket, e))?;
    if read == 0 {
        return Err(ProxyError::DaemonNotRunning {
            socket: socket.to_path_buf(),
        });
    }

    let response: DaemonResponse = serde_json::from_str(line.trim_end())?;
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use keeper_core::DaemonErrorKind;

    #[test]
    fn requests_are_tagged_by_cmd() {
        let encoded = serde_json::to_value(DaemonRequest::GetConfig {
            section: "account".into(),
            key: "usage".into(),
        })
        .expect("encode");
        assert_eq!(
            encoded,
            json!({"cmd": "get_config", "section": "account", "key": "usage"})
        );

        let decoded: DaemonRequest =
            serde_json::from_str(r#"{"cmd":"pending_errors"}"#).expect("decode");
        assert_eq!(decoded, DaemonRequest::PendingErrors);
    }

    #[test]
    fn report_error_carries_wire_type_name() {
        let request = DaemonRequest::ReportError {
            error: DaemonError::new(DaemonErrorKind::AuthRevoked, "Revoked", "relink"),
        };
        let encoded = serde_json::to_value(&request).expect("encode");
        assert_eq!(encoded["error"]["type"], "DropboxAuthError");
    }

    #[test]
    fn error_response_becomes_protocol_error() {
        let err = DaemonResponse::error("unknown command")
            .into_data()
            .unwrap_err();
        assert!(matches!(err, ProxyError::Protocol(ref m) if m == "unknown command"));
        assert!(!err.is_connection_loss());
    }

    #[test]
    fn missing_socket_is_daemon_not_running() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let err = send_request(&dir.path().join("daemon.sock"), &DaemonRequest::Ping).unwrap_err();
        assert!(matches!(err, ProxyError::DaemonNotRunning { .. }));
        assert!(err.is_connection_loss());
    }
}
