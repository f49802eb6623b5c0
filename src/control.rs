//! Command surface in front of the connection manager.
//!
//! Validates command input, delegates to [`ConnectionManager`] and turns every
//! outcome into `Ok` or a typed [`ControlError`]. Nothing here panics on bad
//! input; optional parameters that are missing or malformed fall back to their
//! defaults.

use serde_json::{Map, Value};

use crate::ipc::IpcCommandKind;
use crate::manager::{ConnectionManager, ConnectionSnapshot, ManagerError};
use crate::target::{ConnectionConfig, LegacyConfig, StructuredConfig, DEFAULT_PATH};

/// Parameter mapping accompanying a named command.
pub type Params = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControlError {
    /// Missing or malformed required input. Rejected before any I/O.
    #[error("{0}")]
    InvalidArgument(String),

    /// The transport refused to start an attempt. A retry is still scheduled.
    #[error("{0}")]
    ConnectionError(String),

    #[error("{0}")]
    DisconnectionError(String),

    #[error("{0}")]
    SendError(String),

    #[error("unknown command: {0}")]
    NotImplemented(String),
}

impl ControlError {
    /// Stable code used on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            ControlError::InvalidArgument(_) => "INVALID_ARGUMENT",
            ControlError::ConnectionError(_) => "CONNECTION_ERROR",
            ControlError::DisconnectionError(_) => "DISCONNECTION_ERROR",
            ControlError::SendError(_) => "SEND_ERROR",
            ControlError::NotImplemented(_) => "NOT_IMPLEMENTED",
        }
    }

    fn invalid(message: &str) -> Self {
        ControlError::InvalidArgument(message.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct ControlSurface {
    manager: ConnectionManager,
}

impl ControlSurface {
    pub fn new(manager: ConnectionManager) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    pub async fn connect_direct(&self, url: &str) -> Result<(), ControlError> {
        if url.trim().is_empty() {
            return Err(ControlError::invalid("URL is required"));
        }
        self.connect(ConnectionConfig::Direct {
            url: url.to_string(),
        })
        .await
    }

    pub async fn connect_structured(&self, config: StructuredConfig) -> Result<(), ControlError> {
        if config.host.trim().is_empty() || config.port == 0 {
            return Err(ControlError::invalid("Host and port are required"));
        }
        self.connect(ConnectionConfig::Structured(config)).await
    }

    pub async fn connect_legacy(&self, config: LegacyConfig) -> Result<(), ControlError> {
        if config.host.trim().is_empty() || config.port == 0 {
            return Err(ControlError::invalid("Required parameters are missing"));
        }
        self.connect(ConnectionConfig::LegacyParams(config)).await
    }

    async fn connect(&self, config: ConnectionConfig) -> Result<(), ControlError> {
        self.manager
            .connect(config)
            .await
            .map_err(|e| ControlError::ConnectionError(e.to_string()))
    }

    /// Succeeds whenever the manager is running, connected or not.
    pub async fn disconnect(&self) -> Result<(), ControlError> {
        self.manager
            .disconnect()
            .await
            .map_err(|e| ControlError::DisconnectionError(e.to_string()))
    }

    pub async fn send_message(&self, message: &str) -> Result<(), ControlError> {
        if message.is_empty() {
            return Err(ControlError::invalid("Message is required"));
        }
        self.manager.send(message).await.map_err(|e| match e {
            ManagerError::NotConnected => ControlError::SendError("not connected".to_string()),
            other => ControlError::SendError(other.to_string()),
        })
    }

    pub async fn status(&self) -> Result<ConnectionSnapshot, ControlError> {
        self.manager
            .snapshot()
            .await
            .map_err(|e| ControlError::ConnectionError(e.to_string()))
    }

    /// Runs the command called `name` with `params`.
    ///
    /// Connection commands return `true`; `status` returns the snapshot.
    /// `subscribe` needs a streaming connection and is handled by the daemon.
    pub async fn dispatch(&self, name: &str, params: &Params) -> Result<Value, ControlError> {
        let kind: IpcCommandKind = name
            .parse()
            .map_err(|_| ControlError::NotImplemented(name.to_string()))?;

        match kind {
            IpcCommandKind::ConnectDirect => {
                let url = string_param(params, &["url"]).unwrap_or_default();
                self.connect_direct(&url).await?;
            }
            IpcCommandKind::ConnectStructured => {
                self.connect_structured(structured_from_params(params)?)
                    .await?;
            }
            IpcCommandKind::ConnectLegacy => {
                self.connect_legacy(legacy_from_params(params)?).await?;
            }
            IpcCommandKind::Disconnect => self.disconnect().await?,
            IpcCommandKind::SendMessage => {
                let message = string_param(params, &["message"]).unwrap_or_default();
                self.send_message(&message).await?;
            }
            IpcCommandKind::Status => {
                let snapshot = self.status().await?;
                return serde_json::to_value(snapshot)
                    .map_err(|e| ControlError::ConnectionError(e.to_string()));
            }
            IpcCommandKind::Subscribe => {
                return Err(ControlError::NotImplemented(name.to_string()));
            }
        }
        Ok(Value::Bool(true))
    }
}

/// Parses `connectStructured` parameters.
pub fn structured_from_params(params: &Params) -> Result<StructuredConfig, ControlError> {
    let missing = || ControlError::invalid("Host and port are required");
    let host = string_param(params, &["host"])
        .filter(|h| !h.trim().is_empty())
        .ok_or_else(missing)?;
    let port = port_param(params).ok_or_else(missing)?;

    let mut config = StructuredConfig::new(host, port);
    config.path = string_param(params, &["path"]).unwrap_or_else(|| DEFAULT_PATH.to_string());
    if let Some(secure) = lookup(params, &["useSecure", "useSSL"]).and_then(Value::as_bool) {
        config.use_secure = secure;
    }
    config.query_params = pairs_param(lookup(params, &["queryParams"]));
    config.headers = pairs_param(lookup(params, &["headers"]))
        .into_iter()
        .collect();
    Ok(config)
}

/// Parses `connectLegacy` parameters. All seven identity fields are required.
pub fn legacy_from_params(params: &Params) -> Result<LegacyConfig, ControlError> {
    let missing = || ControlError::invalid("Required parameters are missing");
    let field = |keys: &[&str]| string_param(params, keys).ok_or_else(missing);

    let host = field(&["host"])?;
    if host.trim().is_empty() {
        return Err(missing());
    }
    let port = port_param(params).ok_or_else(missing)?;

    Ok(LegacyConfig {
        host,
        port,
        api_key: field(&["apiKey"])?,
        employee_id: field(&["employeeId", "empId"])?,
        employee_name: field(&["employeeName", "empName"])?,
        department_id: field(&["departmentId", "depId"])?,
        account_id: field(&["accountId", "accId"])?,
        extra_params: pairs_param(lookup(params, &["extraParams", "additionalParams"])),
    })
}

fn lookup<'a>(params: &'a Params, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| params.get(*k))
        .find(|v| !v.is_null())
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn string_param(params: &Params, keys: &[&str]) -> Option<String> {
    lookup(params, keys).and_then(scalar_to_string)
}

/// Port as a number or numeric string, within 1..=65535.
fn port_param(params: &Params) -> Option<u16> {
    let raw = match lookup(params, &["port"])? {
        Value::Number(n) => n.as_u64()?,
        Value::String(s) => s.trim().parse::<u64>().ok()?,
        _ => return None,
    };
    u16::try_from(raw).ok().filter(|p| *p != 0)
}

/// Accepts an object (insertion order kept) or an array of `[key, value]`
/// pairs. Anything else, and any malformed entry, is skipped.
fn pairs_param(value: Option<&Value>) -> Vec<(String, String)> {
    match value {
        Some(Value::Object(map)) => map
            .iter()
            .filter_map(|(k, v)| scalar_to_string(v).map(|v| (k.clone(), v)))
            .collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item.as_array().map(Vec::as_slice) {
                Some([k, v]) => Some((k.as_str()?.to_string(), scalar_to_string(v)?)),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::EventBridge;
    use crate::manager::{ManagerConfig, Phase};
    use crate::transport::mock::MockClient;
    use serde_json::json;
    use std::sync::Arc;

    fn params(value: Value) -> Params {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {}", other),
        }
    }

    fn surface() -> (ControlSurface, MockClient) {
        let client = MockClient::new();
        let manager = ConnectionManager::spawn(
            Arc::new(client.clone()),
            EventBridge::new(),
            ManagerConfig::default(),
        );
        (ControlSurface::new(manager), client)
    }

    fn legacy_params() -> Value {
        json!({
            "host": "pbx", "port": 8089, "apiKey": "k", "employeeId": 7,
            "employeeName": "ann", "departmentId": "d", "accountId": "a"
        })
    }

    #[tokio::test]
    async fn empty_url_is_invalid() {
        let (surface, client) = surface();
        let err = surface
            .dispatch("connectDirect", &params(json!({"url": ""})))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_ARGUMENT");
        assert_eq!(client.open_count(), 0);
    }

    #[tokio::test]
    async fn direct_connect_returns_true() {
        let (surface, client) = surface();
        let result = surface
            .dispatch("connectDirect", &params(json!({"url": "wss://x/ws"})))
            .await;
        assert_eq!(result, Ok(Value::Bool(true)));
        assert_eq!(client.last_open().target.url(), "wss://x/ws");
    }

    #[tokio::test]
    async fn structured_port_must_be_in_range() {
        let (surface, client) = surface();
        for port in [json!(0), json!(70000), json!("abc"), json!(-1), json!(null)] {
            let err = surface
                .dispatch("connectStructured", &params(json!({"host": "h", "port": port})))
                .await
                .unwrap_err();
            assert!(matches!(err, ControlError::InvalidArgument(_)));
        }
        assert_eq!(client.open_count(), 0);
    }

    #[test]
    fn structured_params_accept_numeric_string_port_and_pairs() {
        let config = structured_from_params(&params(json!({
            "host": "h",
            "port": "9443",
            "path": "/x",
            "queryParams": [["a", "1"], ["b", 2]],
            "headers": {"Authorization": "Bearer t"}
        })))
        .unwrap();
        assert_eq!(config.port, 9443);
        assert_eq!(config.path, "/x");
        assert!(config.use_secure);
        assert_eq!(
            config.query_params,
            vec![("a".to_string(), "1".to_string()), ("b".to_string(), "2".to_string())]
        );
        assert_eq!(config.headers.get("Authorization").map(String::as_str), Some("Bearer t"));
    }

    #[test]
    fn structured_optionals_degrade_to_defaults() {
        let config = structured_from_params(&params(json!({
            "host": "h",
            "port": 80,
            "path": ["not", "a", "string"],
            "useSecure": "yes",
            "queryParams": 5
        })))
        .unwrap();
        assert_eq!(config.path, "/ws");
        assert!(config.use_secure);
        assert!(config.query_params.is_empty());
    }

    #[test]
    fn query_object_keeps_insertion_order() {
        let config = structured_from_params(&params(json!({
            "host": "h", "port": 1, "queryParams": {"z": "1", "a": "2"}
        })))
        .unwrap();
        assert_eq!(config.query_params[0].0, "z");
        assert_eq!(config.query_params[1].0, "a");
    }

    #[test]
    fn legacy_requires_every_identity_field() {
        for key in ["host", "port", "apiKey", "employeeId", "employeeName", "departmentId", "accountId"] {
            let mut p = params(legacy_params());
            p.remove(key);
            let err = legacy_from_params(&p).unwrap_err();
            assert_eq!(err.code(), "INVALID_ARGUMENT", "missing {}", key);
        }
        let config = legacy_from_params(&params(legacy_params())).unwrap();
        assert_eq!(config.employee_id, "7");
    }

    #[tokio::test]
    async fn legacy_connect_builds_secure_target() {
        let (surface, client) = surface();
        let mut p = params(legacy_params());
        p.insert("extraParams".to_string(), json!({"x": "y"}));
        surface.dispatch("connectLegacy", &p).await.unwrap();
        assert_eq!(
            client.last_open().target.url(),
            "wss://pbx:8089/ws?api_key=k&emp_id=7&emp_name=ann&dep_id=d&acc_id=a&x=y"
        );
    }

    #[tokio::test]
    async fn transport_refusal_is_connection_error() {
        let (surface, client) = surface();
        client.fail_next_open();
        let err = surface.connect_direct("wss://x/ws").await.unwrap_err();
        assert_eq!(err.code(), "CONNECTION_ERROR");
        assert_eq!(surface.status().await.unwrap().phase, Phase::Reconnecting);
    }

    #[tokio::test]
    async fn send_validation_and_errors() {
        let (surface, _) = surface();
        let err = surface.send_message("").await.unwrap_err();
        assert_eq!(err.code(), "INVALID_ARGUMENT");

        let err = surface.send_message("hi").await.unwrap_err();
        assert_eq!(err, ControlError::SendError("not connected".to_string()));
    }

    #[tokio::test]
    async fn disconnect_succeeds_when_idle() {
        let (surface, _) = surface();
        assert_eq!(surface.dispatch("disconnect", &Params::new()).await, Ok(Value::Bool(true)));
    }

    #[tokio::test]
    async fn disconnect_after_shutdown_is_disconnection_error() {
        let (surface, _) = surface();
        surface.manager().shutdown().await.unwrap();
        let err = surface.disconnect().await.unwrap_err();
        assert_eq!(err.code(), "DISCONNECTION_ERROR");
    }

    #[tokio::test]
    async fn unknown_command_is_not_implemented() {
        let (surface, _) = surface();
        let err = surface.dispatch("reboot", &Params::new()).await.unwrap_err();
        assert_eq!(err.code(), "NOT_IMPLEMENTED");
    }

    #[tokio::test]
    async fn status_returns_snapshot_json() {
        let (surface, _) = surface();
        let value = surface.dispatch("status", &Params::new()).await.unwrap();
        assert_eq!(value["phase"], json!("idle"));
        assert_eq!(value["reconnectAttempts"], json!(0));
    }
}
