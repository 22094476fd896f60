use serde_json::{Map, Value};
use thiserror::Error;

/// Fatal errors surfaced to the caller of a pipeline.
///
/// Handler-level failures travel the wire as error reply frames and are
/// converted into [`ShellError::Call`] by the executor; everything else
/// here is a problem with the line itself or with frame encoding.
#[derive(Error, Debug)]
pub enum ShellError {
    /// A pipeline stage had no command (leading, trailing or doubled `|`).
    #[error("empty pipeline stage")]
    EmptyStage,

    /// The line could not be split into shell words (unbalanced quotes).
    #[error("{0}")]
    Tokenize(#[from] shell_words::ParseError),

    /// A handler replied with a qualified error; fatal to the line.
    #[error("{error}: {}", Value::Object(.parameters.clone()))]
    Call {
        /// Qualified error name, e.g. `org.varlink.service.InvalidParameter`.
        error: String,
        /// Error detail record carried by the reply frame.
        parameters: Map<String, Value>,
    },

    /// A request or reply frame failed to encode or decode.
    #[error("frame error: {0}")]
    Frame(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ShellError>;

/// Qualified Varlink-style errors a method handler can raise.
///
/// Each variant knows its qualified name and the parameter record that
/// accompanies it on the wire, so the transport can serialize any of
/// them into a single error reply frame.
#[derive(Error, Debug)]
pub enum CallError {
    /// A required or malformed request parameter.
    #[error("org.varlink.service.InvalidParameter: {parameter}")]
    InvalidParameter { parameter: String },

    /// The requested method is not registered.
    #[error("org.varlink.service.MethodNotFound: {method}")]
    MethodNotFound { method: String },

    /// A `jsexec` child process exited non-zero or failed to spawn.
    #[error("sh.builtin.ExecFailed: {command} exited {exitcode}: {message}")]
    ExecFailed {
        command: String,
        exitcode: i64,
        message: String,
    },

    /// A `jsexec` child produced stdout that is not valid JSON.
    #[error("sh.builtin.InvalidJson: {message}")]
    InvalidJson { message: String },

    /// Could not connect to or converse with a varlink peer.
    #[error("sh.builtin.VarlinkConnectionFailed: {address}: {message}")]
    VarlinkConnectionFailed { address: String, message: String },

    /// A bare method name resolved to zero or several remote methods.
    #[error("sh.builtin.VarlinkMethodNotFound: {method} at {address}")]
    VarlinkMethodNotFound { method: String, address: String },

    /// The remote peer answered a call with an error reply.
    #[error("sh.builtin.VarlinkCallFailed: {method}: {error}")]
    VarlinkCallFailed {
        method: String,
        error: String,
        parameters: Value,
    },

    /// An already-qualified error re-raised verbatim (sub-pipelines).
    #[error("{error}")]
    Raised {
        error: String,
        parameters: Map<String, Value>,
    },
}

impl CallError {
    /// Shorthand for the most common failure: a bad or missing argument.
    pub fn invalid_parameter(name: impl Into<String>) -> Self {
        CallError::InvalidParameter {
            parameter: name.into(),
        }
    }

    /// The qualified error name serialized into the reply frame.
    pub fn qualified_name(&self) -> &str {
        match self {
            CallError::InvalidParameter { .. } => "org.varlink.service.InvalidParameter",
            CallError::MethodNotFound { .. } => "org.varlink.service.MethodNotFound",
            CallError::ExecFailed { .. } => "sh.builtin.ExecFailed",
            CallError::InvalidJson { .. } => "sh.builtin.InvalidJson",
            CallError::VarlinkConnectionFailed { .. } => "sh.builtin.VarlinkConnectionFailed",
            CallError::VarlinkMethodNotFound { .. } => "sh.builtin.VarlinkMethodNotFound",
            CallError::VarlinkCallFailed { .. } => "sh.builtin.VarlinkCallFailed",
            CallError::Raised { error, .. } => error,
        }
    }

    /// The parameter record serialized into the reply frame.
    pub fn parameters(&self) -> Map<String, Value> {
        let mut map = Map::new();
        match self {
            CallError::InvalidParameter { parameter } => {
                map.insert("parameter".into(), Value::String(parameter.clone()));
            }
            CallError::MethodNotFound { method } => {
                map.insert("method".into(), Value::String(method.clone()));
            }
            CallError::ExecFailed {
                command,
                exitcode,
                message,
            } => {
                map.insert("command".into(), Value::String(command.clone()));
                map.insert("exitcode".into(), Value::from(*exitcode));
                map.insert("message".into(), Value::String(message.clone()));
            }
            CallError::InvalidJson { message } => {
                map.insert("message".into(), Value::String(message.clone()));
            }
            CallError::VarlinkConnectionFailed { address, message } => {
                map.insert("address".into(), Value::String(address.clone()));
                map.insert("message".into(), Value::String(message.clone()));
            }
            CallError::VarlinkMethodNotFound { method, address } => {
                map.insert("method".into(), Value::String(method.clone()));
                map.insert("address".into(), Value::String(address.clone()));
            }
            CallError::VarlinkCallFailed {
                method,
                error,
                parameters,
            } => {
                map.insert("method".into(), Value::String(method.clone()));
                map.insert("error".into(), Value::String(error.clone()));
                map.insert("parameters".into(), parameters.clone());
            }
            CallError::Raised { parameters, .. } => {
                return parameters.clone();
            }
        }
        map
    }
}
