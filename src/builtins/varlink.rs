//! The `varlink` builtin: call out to an external varlink peer.

use crate::client::VarlinkClient;
use crate::error::CallError;
use crate::registry::{BoxFut, Builtin, CallParams, CallResult, MethodDescriptor, Record};
use crate::service::Service;
use serde_json::Value;

/// `varlink` -- introspect a peer, or call one of its methods.
pub struct Varlink;

const VARLINK: MethodDescriptor = MethodDescriptor {
    name: "Varlink",
    command: "varlink",
    accepts_args: true,
    accepts_input: true,
    positional: &[],
    doc: "Introspect or call a remote varlink service.\n\
          \n\
          usage: varlink ADDRESS [METHOD] [KEY=VALUE]...\n\
          ADDRESS is unix:PATH or tcp:HOST:PORT. Without METHOD the\n\
          peer is introspected, emitting one {interface, method,\n\
          signature} object per discovered method. METHOD may be fully\n\
          qualified or bare; a bare name is resolved by scanning the\n\
          peer's interfaces. Call parameters come from KEY=VALUE\n\
          arguments (values coerced to int, float, bool or JSON where\n\
          they parse) or, when objects are piped in, from one call per\n\
          input object. All reply records are emitted.",
};

impl Builtin for Varlink {
    fn descriptor(&self) -> &'static MethodDescriptor {
        &VARLINK
    }

    fn invoke<'a>(&'a self, _service: &'a Service, mut params: CallParams) -> BoxFut<'a, CallResult> {
        Box::pin(async move {
            if params.args.is_empty() {
                return Err(CallError::invalid_parameter("args"));
            }
            let address = params.args[0].clone();
            let mut method: Option<String> = None;
            let mut call_args: Vec<(String, String)> = Vec::new();
            for arg in &params.args[1..] {
                match arg.split_once('=') {
                    Some((key, value)) => call_args.push((key.to_string(), value.to_string())),
                    None if method.is_none() => method = Some(arg.clone()),
                    None => return Err(CallError::invalid_parameter("args")),
                }
            }

            let mut client = VarlinkClient::connect(&address).await?;

            let Some(method) = method else {
                let records = client
                    .introspect()
                    .await?
                    .into_iter()
                    .map(|m| {
                        let mut record = Record::new();
                        record.insert("interface".to_string(), Value::String(m.interface));
                        record.insert("method".to_string(), Value::String(m.method));
                        record.insert("signature".to_string(), Value::String(m.signature));
                        record
                    })
                    .collect();
                return Ok(records);
            };

            let qualified = if method.contains('.') {
                method
            } else {
                let matches: Vec<_> = client
                    .introspect()
                    .await?
                    .into_iter()
                    .filter(|m| m.method == method)
                    .collect();
                match matches.as_slice() {
                    [only] => only.qualified(),
                    _ => {
                        return Err(CallError::VarlinkMethodNotFound {
                            method,
                            address,
                        })
                    }
                }
            };

            let mut records = Vec::new();
            match params.input.take().filter(|objects| !objects.is_empty()) {
                Some(input) => {
                    for obj in input {
                        records.extend(client.call(&qualified, obj, true).await?);
                    }
                }
                None => {
                    let mut parameters = Record::new();
                    for (key, value) in call_args {
                        parameters.insert(key, coerce(&value));
                    }
                    records.extend(client.call(&qualified, parameters, true).await?);
                }
            }
            Ok(records)
        })
    }
}

/// Coerce a CLI token into a typed call parameter: int, then float,
/// then bool, then JSON for `{`/`[` prefixes, else string.
fn coerce(token: &str) -> Value {
    if let Ok(int) = token.parse::<i64>() {
        return Value::from(int);
    }
    if let Ok(float) = token.parse::<f64>() {
        return Value::from(float);
    }
    match token {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if token.starts_with('{') || token.starts_with('[') {
        if let Ok(value) = serde_json::from_str(token) {
            return value;
        }
    }
    Value::String(token.to_string())
}
