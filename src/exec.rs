//! The pipeline executor.
//!
//! For each stage the executor builds a request parameter record from
//! the method's declared schema, issues one streaming call through the
//! in-process transport, drains every reply into a list of objects and
//! feeds that list to the next stage as its `input`.

use crate::error::{Result, ShellError};
use crate::parser;
use crate::registry::{method_for_command, Object, Record, INTERFACE};
use crate::service::{Reply, Request, Service};
use serde_json::Value;
use tracing::debug;

/// Parse and execute a pipeline, returning the final object list.
///
/// Stages run strictly sequentially; each stage is fully drained
/// before the next begins. An empty line is a no-op yielding no
/// objects.
pub async fn execute(service: &Service, line: &str) -> Result<Vec<Object>> {
    let stages = parser::parse(line)?;
    let mut objects: Option<Vec<Object>> = None;
    for (command, args) in stages {
        objects = Some(call_stage(service, &command, &args, objects).await?);
    }
    Ok(objects.unwrap_or_default())
}

/// Issue one streaming call for a stage and collect its output objects.
async fn call_stage(
    service: &Service,
    command: &str,
    args: &[String],
    input: Option<Vec<Object>>,
) -> Result<Vec<Object>> {
    let descriptor = service.find_command(command).map(|m| m.descriptor());

    let mut parameters = Record::new();
    match descriptor {
        Some(desc) => {
            if desc.accepts_args {
                parameters.insert(
                    "args".to_string(),
                    Value::Array(args.iter().map(|a| Value::String(a.clone())).collect()),
                );
            } else {
                for (name, token) in desc.positional.iter().zip(args) {
                    parameters.insert((*name).to_string(), Value::String(token.clone()));
                }
            }
            if desc.accepts_input {
                if let Some(objects) = input {
                    parameters.insert(
                        "input".to_string(),
                        Value::Array(objects.into_iter().map(Value::Object).collect()),
                    );
                }
            }
        }
        // Unknown command: send the request anyway and let the service
        // answer with MethodNotFound.
        None => {}
    }

    let request = Request {
        method: descriptor
            .map(|d| d.qualified())
            .unwrap_or_else(|| format!("{INTERFACE}.{}", method_for_command(command))),
        more: true,
        parameters,
    };
    debug!(command, method = %request.method, "stage call");

    let mut objects = Vec::new();
    for frame in service.handle(&serde_json::to_vec(&request)?).await {
        let reply: Reply = serde_json::from_slice(&frame)?;
        if let Some(error) = reply.error {
            return Err(ShellError::Call {
                error,
                parameters: reply.parameters,
            });
        }
        let mut record = reply.parameters;
        if record.is_empty() {
            continue;
        }
        // A record whose only field is `object` unwraps to the inner
        // object; any other record is itself the stage output.
        let object = if record.len() == 1 {
            match record.remove("object") {
                Some(Value::Object(inner)) => inner,
                Some(other) => {
                    record.insert("object".to_string(), other);
                    record
                }
                None => record,
            }
        } else {
            record
        };
        objects.push(object);
    }
    Ok(objects)
}
