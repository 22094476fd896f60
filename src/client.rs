//! Client for external varlink peers.
//!
//! Speaks NUL-terminated JSON frames over a unix or tcp connection:
//! the same request/reply shapes as the in-process transport, plus the
//! `org.varlink.service` introspection methods used to discover a
//! peer's interfaces and method signatures.

use crate::error::CallError;
use crate::registry::Record;
use crate::service::{Reply, Request};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpStream, UnixStream};

/// Buffered duplex wire to a peer.
trait Wire: AsyncBufRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncBufRead + AsyncWrite + Unpin + Send> Wire for T {}

/// One method discovered in a peer's interface description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMethod {
    pub interface: String,
    pub method: String,
    /// Normalized `((in) -> (out))` signature text.
    pub signature: String,
}

impl RemoteMethod {
    /// Fully qualified method name.
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.interface, self.method)
    }
}

static METHOD_DECL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"method\s+([A-Za-z]\w*)\s*(\([^)]*\))\s*->\s*(\([^)]*\))").unwrap());

/// Extract method declarations from varlink IDL text.
pub fn parse_methods(interface: &str, description: &str) -> Vec<RemoteMethod> {
    METHOD_DECL
        .captures_iter(description)
        .map(|caps| RemoteMethod {
            interface: interface.to_string(),
            method: caps[1].to_string(),
            signature: format!("{} -> {}", squeeze(&caps[2]), squeeze(&caps[3])),
        })
        .collect()
}

/// Collapse all whitespace runs to single spaces.
fn squeeze(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A connected varlink peer.
pub struct VarlinkClient {
    address: String,
    stream: Box<dyn Wire>,
}

impl std::fmt::Debug for VarlinkClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VarlinkClient")
            .field("address", &self.address)
            .finish()
    }
}

impl VarlinkClient {
    /// Connect to `unix:<path>` or `tcp:<host>:<port>`.
    pub async fn connect(address: &str) -> Result<Self, CallError> {
        let failed = |message: String| CallError::VarlinkConnectionFailed {
            address: address.to_string(),
            message,
        };
        let stream: Box<dyn Wire> = if let Some(path) = address.strip_prefix("unix:") {
            Box::new(BufReader::new(
                UnixStream::connect(path)
                    .await
                    .map_err(|err| failed(err.to_string()))?,
            ))
        } else if let Some(host) = address.strip_prefix("tcp:") {
            Box::new(BufReader::new(
                TcpStream::connect(host)
                    .await
                    .map_err(|err| failed(err.to_string()))?,
            ))
        } else {
            return Err(failed("unsupported address, expected unix: or tcp:".to_string()));
        };
        Ok(VarlinkClient {
            address: address.to_string(),
            stream,
        })
    }

    fn failed(&self, message: impl Into<String>) -> CallError {
        CallError::VarlinkConnectionFailed {
            address: self.address.clone(),
            message: message.into(),
        }
    }

    /// Call a method and drain every reply frame.
    ///
    /// Remote error replies become [`CallError::VarlinkCallFailed`].
    pub async fn call(
        &mut self,
        method: &str,
        parameters: Record,
        more: bool,
    ) -> Result<Vec<Record>, CallError> {
        let request = Request {
            method: method.to_string(),
            more,
            parameters,
        };
        let mut frame = serde_json::to_vec(&request).map_err(|err| self.failed(err.to_string()))?;
        frame.push(0);

        let address = self.address.clone();
        let failed = |message: String| CallError::VarlinkConnectionFailed {
            address: address.clone(),
            message,
        };

        self.stream
            .write_all(&frame)
            .await
            .map_err(|err| failed(err.to_string()))?;
        self.stream
            .flush()
            .await
            .map_err(|err| failed(err.to_string()))?;

        let mut records = Vec::new();
        loop {
            let mut buf = Vec::new();
            let n = self
                .stream
                .read_until(0, &mut buf)
                .await
                .map_err(|err| failed(err.to_string()))?;
            if n == 0 {
                return Err(failed("connection closed mid-reply".to_string()));
            }
            if buf.last() == Some(&0) {
                buf.pop();
            }
            let reply: Reply = serde_json::from_slice(&buf)
                .map_err(|err| failed(format!("bad reply frame: {err}")))?;
            if let Some(error) = reply.error {
                return Err(CallError::VarlinkCallFailed {
                    method: method.to_string(),
                    error,
                    parameters: Value::Object(reply.parameters),
                });
            }
            let continues = reply.continues.unwrap_or(false);
            records.push(reply.parameters);
            if !continues {
                break;
            }
        }
        Ok(records)
    }

    /// The interface names the peer reports via `GetInfo`.
    pub async fn interfaces(&mut self) -> Result<Vec<String>, CallError> {
        let records = self
            .call("org.varlink.service.GetInfo", Record::new(), false)
            .await?;
        let record = records
            .into_iter()
            .next()
            .ok_or_else(|| self.failed("empty GetInfo reply"))?;
        match record.get("interfaces") {
            Some(Value::Array(items)) => Ok(items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()),
            _ => Err(self.failed("GetInfo reply carries no interfaces")),
        }
    }

    /// The IDL text of one interface.
    pub async fn describe(&mut self, interface: &str) -> Result<String, CallError> {
        let mut parameters = Record::new();
        parameters.insert(
            "interface".to_string(),
            Value::String(interface.to_string()),
        );
        let records = self
            .call(
                "org.varlink.service.GetInterfaceDescription",
                parameters,
                false,
            )
            .await?;
        records
            .into_iter()
            .next()
            .and_then(|record| {
                record
                    .get("description")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .ok_or_else(|| self.failed("interface description missing"))
    }

    /// Every method of every interface the peer reports.
    pub async fn introspect(&mut self) -> Result<Vec<RemoteMethod>, CallError> {
        let mut methods = Vec::new();
        for interface in self.interfaces().await? {
            let description = self.describe(&interface).await?;
            methods.extend(parse_methods(&interface, &description));
        }
        Ok(methods)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_methods_extracts_signatures() {
        let methods = parse_methods("org.example.demo", testpeer::DESCRIPTION);
        assert_eq!(methods.len(), 3);
        assert_eq!(methods[0].method, "Ping");
        assert_eq!(methods[0].signature, "(msg: string) -> (pong: string)");
        assert_eq!(methods[0].qualified(), "org.example.demo.Ping");
        assert_eq!(methods[2].signature, "() -> ()");
    }

    #[test]
    fn test_parse_methods_collapses_multiline_signatures() {
        let idl = "method Widen(\n  a: int,\n  b: int\n) -> (\n  wide: int\n)";
        let methods = parse_methods("org.example.demo", idl);
        assert_eq!(methods[0].signature, "( a: int, b: int ) -> ( wide: int )");
    }

    #[tokio::test]
    async fn test_connect_rejects_unknown_scheme() {
        let err = VarlinkClient::connect("ipx:whatever").await.unwrap_err();
        assert!(matches!(err, CallError::VarlinkConnectionFailed { .. }));
    }

    #[tokio::test]
    async fn test_connect_failure_carries_address() {
        let err = VarlinkClient::connect("unix:/nonexistent/peer.sock")
            .await
            .unwrap_err();
        match err {
            CallError::VarlinkConnectionFailed { address, .. } => {
                assert_eq!(address, "unix:/nonexistent/peer.sock");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_call_and_streaming_drain() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("peer.sock");
        testpeer::spawn(&socket);

        let address = format!("unix:{}", socket.display());
        let mut client = VarlinkClient::connect(&address).await.unwrap();

        let mut parameters = Record::new();
        parameters.insert("msg".to_string(), json!("hi"));
        let records = client
            .call("org.example.demo.Ping", parameters, true)
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["pong"], "hi");

        let mut parameters = Record::new();
        parameters.insert("count".to_string(), json!(3));
        let records = client
            .call("org.example.demo.Range", parameters, true)
            .await
            .unwrap();
        let ns: Vec<i64> = records.iter().map(|r| r["n"].as_i64().unwrap()).collect();
        assert_eq!(ns, [0, 1, 2]);
    }

    #[tokio::test]
    async fn test_remote_error_is_call_failed() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("peer.sock");
        testpeer::spawn(&socket);

        let address = format!("unix:{}", socket.display());
        let mut client = VarlinkClient::connect(&address).await.unwrap();
        let err = client
            .call("org.example.demo.Fail", Record::new(), true)
            .await
            .unwrap_err();
        match err {
            CallError::VarlinkCallFailed { error, parameters, .. } => {
                assert_eq!(error, "org.example.demo.Boom");
                assert_eq!(parameters["why"], "asked");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_introspect_lists_methods() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("peer.sock");
        testpeer::spawn(&socket);

        let address = format!("unix:{}", socket.display());
        let mut client = VarlinkClient::connect(&address).await.unwrap();
        let methods = client.introspect().await.unwrap();
        let names: Vec<&str> = methods.iter().map(|m| m.method.as_str()).collect();
        assert_eq!(names, ["Ping", "Range", "Fail"]);
    }
}
