//! Source builtins: stages that create objects.

use crate::builtins::wrap_object;
use crate::error::CallError;
use crate::registry::{BoxFut, Builtin, CallParams, CallResult, MethodDescriptor, Object, Record};
use crate::service::Service;
use serde_json::Value;
use tracing::debug;

/// `echo` -- build one object from `k=v` arguments, or pass input through.
pub struct Echo;

const ECHO: MethodDescriptor = MethodDescriptor {
    name: "Echo",
    command: "echo",
    accepts_args: true,
    accepts_input: true,
    positional: &[],
    doc: "Build an object from k=v arguments, or pass piped input through.\n\
          \n\
          usage: echo [KEY=VALUE | FLAG]...\n\
          Each KEY=VALUE argument becomes a string field; a bare FLAG\n\
          argument becomes the boolean field FLAG: true. With piped\n\
          input the arguments are ignored and every input object is\n\
          emitted unchanged.",
};

impl Builtin for Echo {
    fn descriptor(&self) -> &'static MethodDescriptor {
        &ECHO
    }

    fn invoke<'a>(&'a self, _service: &'a Service, params: CallParams) -> BoxFut<'a, CallResult> {
        Box::pin(async move {
            if let Some(input) = params.input.filter(|objects| !objects.is_empty()) {
                return Ok(input.into_iter().map(wrap_object).collect());
            }
            let mut obj = Object::new();
            for arg in &params.args {
                match arg.split_once('=') {
                    Some((key, value)) => {
                        obj.insert(key.to_string(), Value::String(value.to_string()))
                    }
                    None => obj.insert(arg.clone(), Value::Bool(true)),
                };
            }
            Ok(vec![wrap_object(obj)])
        })
    }
}

/// `ls` -- list a directory as `{name, type, size}` objects.
pub struct Ls;

const LS: MethodDescriptor = MethodDescriptor {
    name: "Ls",
    command: "ls",
    accepts_args: true,
    accepts_input: false,
    positional: &[],
    doc: "List a directory as {name, type, size} objects.\n\
          \n\
          usage: ls [PATH]\n\
          PATH defaults to the current directory. Entries are sorted\n\
          by name; type is one of dir, link or file, with symlinks\n\
          reported as links rather than their targets. Entries whose\n\
          metadata cannot be read are skipped.",
};

impl Builtin for Ls {
    fn descriptor(&self) -> &'static MethodDescriptor {
        &LS
    }

    fn invoke<'a>(&'a self, _service: &'a Service, params: CallParams) -> BoxFut<'a, CallResult> {
        Box::pin(async move {
            let path = params.args.first().map(String::as_str).unwrap_or(".");
            let mut dir = tokio::fs::read_dir(path)
                .await
                .map_err(|_| CallError::invalid_parameter("path"))?;

            let mut entries = Vec::new();
            while let Some(entry) = dir
                .next_entry()
                .await
                .map_err(|_| CallError::invalid_parameter("path"))?
            {
                entries.push(entry);
            }
            entries.sort_by_key(|entry| entry.file_name());

            let mut records = Vec::new();
            for entry in entries {
                // DirEntry::metadata does not traverse symlinks, so a
                // symlink reports itself rather than its target.
                let meta = match entry.metadata().await {
                    Ok(meta) => meta,
                    Err(err) => {
                        debug!(name = %entry.file_name().to_string_lossy(), error = %err, "skipping unstattable entry");
                        continue;
                    }
                };
                let ftype = if meta.file_type().is_symlink() {
                    "link"
                } else if meta.is_dir() {
                    "dir"
                } else {
                    "file"
                };
                let mut record = Record::new();
                record.insert(
                    "name".to_string(),
                    Value::String(entry.file_name().to_string_lossy().into_owned()),
                );
                record.insert("type".to_string(), Value::String(ftype.to_string()));
                record.insert("size".to_string(), Value::from(meta.len()));
                records.push(record);
            }
            Ok(records)
        })
    }
}

/// `jsexec` -- run an external command and turn its JSON stdout into objects.
pub struct Jsexec;

const JSEXEC: MethodDescriptor = MethodDescriptor {
    name: "Jsexec",
    command: "jsexec",
    accepts_args: true,
    accepts_input: false,
    positional: &[],
    doc: "Run a command and emit its JSON stdout as objects.\n\
          \n\
          usage: jsexec COMMAND [ARG]...\n\
          The command's stdout must parse as JSON. A single-key object\n\
          whose only value is an array unwraps to that array; a\n\
          non-array value becomes a one-element stream. Array elements\n\
          that are not objects are wrapped as {value: element}. A\n\
          non-zero exit or unparseable stdout fails the pipeline.",
};

impl Builtin for Jsexec {
    fn descriptor(&self) -> &'static MethodDescriptor {
        &JSEXEC
    }

    fn invoke<'a>(&'a self, _service: &'a Service, params: CallParams) -> BoxFut<'a, CallResult> {
        Box::pin(async move {
            if params.args.is_empty() {
                return Err(CallError::invalid_parameter("args"));
            }
            let command = params.args.join(" ");
            let output = tokio::process::Command::new(&params.args[0])
                .args(&params.args[1..])
                .output()
                .await
                .map_err(|err| CallError::ExecFailed {
                    command: command.clone(),
                    exitcode: -1,
                    message: err.to_string(),
                })?;

            if !output.status.success() {
                return Err(CallError::ExecFailed {
                    command,
                    exitcode: i64::from(output.status.code().unwrap_or(-1)),
                    message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                });
            }

            let stdout = String::from_utf8_lossy(&output.stdout);
            let parsed: Value = serde_json::from_str(stdout.trim())
                .map_err(|err| CallError::InvalidJson {
                    message: err.to_string(),
                })?;
            Ok(normalize(parsed))
        })
    }
}

/// Normalize parsed JSON into a stream of wrapped objects.
fn normalize(parsed: Value) -> Vec<Record> {
    // {items: [...]} unwraps to the array; any other object shape is
    // kept whole.
    let root = match parsed {
        Value::Object(map)
            if map.len() == 1 && matches!(map.values().next(), Some(Value::Array(_))) =>
        {
            map.into_iter()
                .next()
                .map(|(_, value)| value)
                .unwrap_or(Value::Null)
        }
        other => other,
    };
    let elements = match root {
        Value::Array(items) => items,
        other => vec![other],
    };
    elements
        .into_iter()
        .map(|element| match element {
            Value::Object(obj) => wrap_object(obj),
            other => {
                let mut obj = Object::new();
                obj.insert("value".to_string(), other);
                wrap_object(obj)
            }
        })
        .collect()
}

/// `help` -- list commands, or show one command's full help.
pub struct Help;

const HELP: MethodDescriptor = MethodDescriptor {
    name: "Help",
    command: "help",
    accepts_args: true,
    accepts_input: false,
    positional: &[],
    doc: "List available commands, or show help for one command.\n\
          \n\
          usage: help [COMMAND]\n\
          Without arguments, emits one {command, description} object\n\
          per registered command. With a command name, emits its full\n\
          help one line per object; the command field is populated on\n\
          the first line only.",
};

impl Builtin for Help {
    fn descriptor(&self) -> &'static MethodDescriptor {
        &HELP
    }

    fn invoke<'a>(&'a self, service: &'a Service, params: CallParams) -> BoxFut<'a, CallResult> {
        Box::pin(async move {
            let mut records = Vec::new();
            match params.args.first() {
                None => {
                    for desc in service.descriptors() {
                        let mut record = Record::new();
                        record.insert(
                            "command".to_string(),
                            Value::String(desc.command.to_string()),
                        );
                        record.insert(
                            "description".to_string(),
                            Value::String(desc.short_description()),
                        );
                        records.push(record);
                    }
                }
                Some(command) => {
                    let desc = service
                        .find_command(command)
                        .map(|member| member.descriptor())
                        .ok_or_else(|| CallError::invalid_parameter("args"))?;
                    for (i, line) in desc.doc.lines().enumerate() {
                        let mut record = Record::new();
                        record.insert(
                            "command".to_string(),
                            Value::String(if i == 0 { desc.command.to_string() } else { String::new() }),
                        );
                        record.insert(
                            "description".to_string(),
                            Value::String(line.trim().to_string()),
                        );
                        records.push(record);
                    }
                }
            }
            Ok(records)
        })
    }
}
