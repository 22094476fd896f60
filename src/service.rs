//! The in-process service and its request/reply transport.
//!
//! A [`Service`] owns the registered builtin handlers. [`Service::handle`]
//! accepts one serialized request frame and returns the serialized reply
//! frames for it: every reply but the last carries `continues: true`,
//! the last carries no `continues` (or `false`), and a handler error
//! produces exactly one error reply frame. A handler that yields no
//! records produces no frames at all.

use crate::builtins;
use crate::error::CallError;
use crate::registry::{Builtin, CallParams, MethodDescriptor, Object, Record};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One request frame on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Fully qualified method name, e.g. `sh.builtin.Sort`.
    pub method: String,
    /// Whether the caller accepts a streaming (multi-frame) reply.
    #[serde(default)]
    pub more: bool,
    /// The typed parameter record.
    #[serde(default)]
    pub parameters: Record,
}

/// One reply frame on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reply {
    /// `true` on every frame except the final one of a stream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continues: Option<bool>,
    /// Qualified error name; when present this is the final frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Output record, or error details when `error` is present.
    #[serde(default)]
    pub parameters: Record,
}

impl Reply {
    fn output(parameters: Record, continues: bool) -> Self {
        Reply {
            continues: continues.then_some(true),
            error: None,
            parameters,
        }
    }

    fn from_error(err: &CallError) -> Self {
        Reply {
            continues: None,
            error: Some(err.qualified_name().to_string()),
            parameters: err.parameters(),
        }
    }
}

/// The in-process RPC service hosting the `sh.builtin` interface.
///
/// Populated once at construction and read-only afterwards.
pub struct Service {
    members: Vec<Box<dyn Builtin>>,
}

impl Default for Service {
    fn default() -> Self {
        Self::new()
    }
}

impl Service {
    /// Build a service with every builtin registered.
    pub fn new() -> Self {
        Service {
            members: builtins::register(),
        }
    }

    /// Look up a member by fully qualified method name.
    pub fn find_method(&self, qualified: &str) -> Option<&dyn Builtin> {
        self.members
            .iter()
            .map(|m| m.as_ref())
            .find(|m| m.descriptor().qualified() == qualified)
    }

    /// Look up a member by shell command name.
    pub fn find_command(&self, command: &str) -> Option<&dyn Builtin> {
        self.members
            .iter()
            .map(|m| m.as_ref())
            .find(|m| m.descriptor().command == command)
    }

    /// Descriptors of all registered members, in registration order.
    pub fn descriptors(&self) -> impl Iterator<Item = &'static MethodDescriptor> + '_ {
        self.members.iter().map(|m| m.descriptor())
    }

    /// Handle one serialized request frame, returning serialized reply
    /// frames.
    pub async fn handle(&self, request: &[u8]) -> Vec<Vec<u8>> {
        let request: Request = match serde_json::from_slice(request) {
            Ok(req) => req,
            Err(err) => {
                debug!(error = %err, "unparseable request frame");
                return vec![serialize(&Reply::from_error(&CallError::invalid_parameter(
                    "request",
                )))];
            }
        };

        let member = match self.find_method(&request.method) {
            Some(member) => member,
            None => {
                return vec![serialize(&Reply::from_error(&CallError::MethodNotFound {
                    method: request.method,
                }))]
            }
        };

        let params = match extract_params(member.descriptor(), &request) {
            Ok(params) => params,
            Err(err) => return vec![serialize(&Reply::from_error(&err))],
        };

        debug!(method = %request.method, more = request.more, "dispatch");
        match member.invoke(self, params).await {
            Ok(records) => {
                let total = records.len();
                records
                    .into_iter()
                    .take(if request.more { total } else { 1 })
                    .enumerate()
                    .map(|(i, record)| {
                        serialize(&Reply::output(record, request.more && i + 1 < total))
                    })
                    .collect()
            }
            Err(err) => vec![serialize(&Reply::from_error(&err))],
        }
    }
}

fn serialize(reply: &Reply) -> Vec<u8> {
    serde_json::to_vec(reply).expect("serialize reply frame")
}

/// Validate the request parameters against the method's declared
/// schema and pull out the typed fields.
fn extract_params(
    descriptor: &MethodDescriptor,
    request: &Request,
) -> Result<CallParams, CallError> {
    let mut params = CallParams::default();

    if descriptor.accepts_args {
        let args = request
            .parameters
            .get("args")
            .ok_or_else(|| CallError::invalid_parameter("args"))?;
        let items = args
            .as_array()
            .ok_or_else(|| CallError::invalid_parameter("args"))?;
        params.args = items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| CallError::invalid_parameter("args"))
            })
            .collect::<Result<_, _>>()?;
    }

    if descriptor.accepts_input {
        if let Some(input) = request.parameters.get("input") {
            let items = input
                .as_array()
                .ok_or_else(|| CallError::invalid_parameter("input"))?;
            let objects: Vec<Object> = items
                .iter()
                .map(|item| {
                    item.as_object()
                        .cloned()
                        .ok_or_else(|| CallError::invalid_parameter("input"))
                })
                .collect::<Result<_, _>>()?;
            params.input = Some(objects);
        }
    }

    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    pub(crate) async fn call(service: &Service, method: &str, parameters: Value) -> Vec<Reply> {
        let request = json!({
            "method": format!("sh.builtin.{method}"),
            "more": true,
            "parameters": parameters,
        });
        let bytes = serde_json::to_vec(&request).unwrap();
        service
            .handle(&bytes)
            .await
            .iter()
            .map(|frame| serde_json::from_slice(frame).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_echo_wire_single_final_frame() {
        let service = Service::new();
        let replies = call(&service, "Echo", json!({"args": ["x=1"]})).await;
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].parameters["object"], json!({"x": "1"}));
        assert_ne!(replies[0].continues, Some(true));
        assert!(replies[0].error.is_none());
    }

    #[tokio::test]
    async fn test_grep_wire_continues_tagging() {
        let service = Service::new();
        let replies = call(
            &service,
            "Grep",
            json!({
                "args": ["color=red"],
                "input": [
                    {"color": "red", "size": 1},
                    {"color": "blue", "size": 2},
                    {"color": "darkred", "size": 3},
                ],
            }),
        )
        .await;
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0].continues, Some(true));
        assert_eq!(
            replies[0].parameters["object"],
            json!({"color": "red", "size": 1})
        );
        assert_ne!(replies[1].continues, Some(true));
        assert_eq!(
            replies[1].parameters["object"],
            json!({"color": "darkred", "size": 3})
        );
    }

    #[tokio::test]
    async fn test_count_wire_unwrapped_record() {
        let service = Service::new();
        let replies = call(&service, "Count", json!({"input": [{"a": 1}, {"b": 2}]})).await;
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].parameters, json!({"count": 2}).as_object().unwrap().clone());
    }

    #[tokio::test]
    async fn test_empty_output_emits_zero_frames() {
        let service = Service::new();
        let replies = call(&service, "Map", json!({"args": ["x"]})).await;
        assert!(replies.is_empty());
    }

    #[tokio::test]
    async fn test_ls_wire_continues() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a", "b"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        let service = Service::new();
        let replies = call(
            &service,
            "Ls",
            json!({"args": [dir.path().to_str().unwrap()]}),
        )
        .await;
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0].continues, Some(true));
        assert_eq!(replies[0].parameters["name"], "a");
        assert_ne!(replies[1].continues, Some(true));
    }

    #[tokio::test]
    async fn test_method_not_found() {
        let service = Service::new();
        let replies = call(&service, "Nonesuch", json!({})).await;
        assert_eq!(replies.len(), 1);
        assert_eq!(
            replies[0].error.as_deref(),
            Some("org.varlink.service.MethodNotFound")
        );
        assert_eq!(replies[0].parameters["method"], "sh.builtin.Nonesuch");
    }

    #[tokio::test]
    async fn test_missing_declared_args_rejected() {
        let service = Service::new();
        let replies = call(&service, "Echo", json!({})).await;
        assert_eq!(replies.len(), 1);
        assert_eq!(
            replies[0].error.as_deref(),
            Some("org.varlink.service.InvalidParameter")
        );
        assert_eq!(replies[0].parameters["parameter"], "args");
    }

    #[tokio::test]
    async fn test_malformed_input_rejected() {
        let service = Service::new();
        let replies = call(
            &service,
            "Count",
            json!({"input": [1, 2]}),
        )
        .await;
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].parameters["parameter"], "input");
    }

    #[tokio::test]
    async fn test_handler_error_is_single_error_frame() {
        let service = Service::new();
        let replies = call(
            &service,
            "Map",
            json!({"args": [], "input": [{"a": 1}]}),
        )
        .await;
        assert_eq!(replies.len(), 1);
        assert_eq!(
            replies[0].error.as_deref(),
            Some("org.varlink.service.InvalidParameter")
        );
    }

    #[tokio::test]
    async fn test_more_false_gets_single_final_frame() {
        let service = Service::new();
        let request = json!({
            "method": "sh.builtin.Echo",
            "more": false,
            "parameters": {
                "args": [],
                "input": [{"a": 1}, {"a": 2}],
            },
        });
        let frames = service
            .handle(&serde_json::to_vec(&request).unwrap())
            .await;
        assert_eq!(frames.len(), 1);
        let reply: Reply = serde_json::from_slice(&frames[0]).unwrap();
        assert_ne!(reply.continues, Some(true));
        assert_eq!(reply.parameters["object"], json!({"a": 1}));
    }

    #[tokio::test]
    async fn test_unparseable_request_is_error_frame() {
        let service = Service::new();
        let frames = service.handle(b"not json").await;
        assert_eq!(frames.len(), 1);
        let reply: Reply = serde_json::from_slice(&frames[0]).unwrap();
        assert_eq!(
            reply.error.as_deref(),
            Some("org.varlink.service.InvalidParameter")
        );
    }

    #[test]
    fn test_reply_final_frame_omits_continues_key() {
        let reply = Reply::output(Record::new(), false);
        let text = serde_json::to_string(&reply).unwrap();
        assert!(!text.contains("continues"));
        assert!(!text.contains("error"));
    }
}
