//! Method descriptors and the object-safe handler trait.
//!
//! Every builtin declares its wire schema explicitly through a
//! [`MethodDescriptor`]: whether it takes the raw argument token list,
//! whether it consumes the previous stage's output, and its docstring.
//! The executor routes CLI tokens from these declarations; nothing is
//! reflected at runtime.

use crate::error::CallError;
use crate::service::Service;
use serde_json::{Map, Value};
use std::future::Future;
use std::pin::Pin;

/// An ordered key/JSON-value map; the unit of data flowing between
/// pipeline stages. Insertion order is observable.
pub type Object = Map<String, Value>;

/// One reply frame's parameter record. A record whose only field is
/// `object` unwraps to that inner [`Object`] at the executor.
pub type Record = Map<String, Value>;

/// A boxed, pinned, Send future -- the return type of [`Builtin::invoke`].
pub type BoxFut<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a handler invocation produces: reply records, or one qualified
/// error that ends the stream.
pub type CallResult = Result<Vec<Record>, CallError>;

/// The interface every builtin is registered under.
pub const INTERFACE: &str = "sh.builtin";

/// Declared wire schema and documentation for one method.
#[derive(Debug, Clone, Copy)]
pub struct MethodDescriptor {
    /// Method name within the interface, e.g. `FilterMap`.
    pub name: &'static str,
    /// Shell command dispatching to this method, e.g. `filter_map`.
    pub command: &'static str,
    /// Whether the method declares an `args` parameter carrying the
    /// full CLI token list.
    pub accepts_args: bool,
    /// Whether the method declares an `input` parameter carrying the
    /// previous stage's objects.
    pub accepts_input: bool,
    /// Positional parameter names, zipped with CLI tokens only when
    /// `accepts_args` is false.
    pub positional: &'static [&'static str],
    /// Help text; the first paragraph is the short description.
    pub doc: &'static str,
}

impl MethodDescriptor {
    /// Fully qualified method name, e.g. `sh.builtin.Sort`.
    pub fn qualified(&self) -> String {
        format!("{INTERFACE}.{}", self.name)
    }

    /// First paragraph of the docstring.
    pub fn short_description(&self) -> String {
        self.doc
            .split("\n\n")
            .next()
            .unwrap_or("")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Map a shell command to its method name by capitalizing each
/// `_`-separated segment: `filter_map` becomes `FilterMap`.
pub fn method_for_command(command: &str) -> String {
    command
        .split('_')
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

/// Validated parameters delivered to a handler by the transport.
#[derive(Debug, Clone, Default)]
pub struct CallParams {
    /// CLI argument tokens (present only when the method accepts args).
    pub args: Vec<String>,
    /// The previous stage's output, when the method accepts input and
    /// the caller supplied one.
    pub input: Option<Vec<Object>>,
}

impl CallParams {
    /// The input stream, owned; absent input is an empty stream.
    pub fn take_input(&mut self) -> Vec<Object> {
        self.input.take().unwrap_or_default()
    }
}

/// Object-safe trait implemented by every builtin method handler.
///
/// Handlers receive the service so that introspecting builtins
/// (`help`) and re-entrant ones (`foreach`) can reach the registry and
/// the executor. They return the full finite sequence of reply
/// records; the transport applies `continues` tagging.
pub trait Builtin: Send + Sync {
    /// The method's declared schema and documentation.
    fn descriptor(&self) -> &'static MethodDescriptor;

    /// Execute the method.
    fn invoke<'a>(&'a self, service: &'a Service, params: CallParams) -> BoxFut<'a, CallResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_for_command() {
        assert_eq!(method_for_command("sort"), "Sort");
        assert_eq!(method_for_command("filter_map"), "FilterMap");
        assert_eq!(method_for_command("jsexec"), "Jsexec");
    }

    #[test]
    fn test_short_description_is_first_paragraph() {
        let desc = MethodDescriptor {
            name: "Demo",
            command: "demo",
            accepts_args: false,
            accepts_input: false,
            positional: &[],
            doc: "First paragraph\nstill first.\n\nSecond paragraph.",
        };
        assert_eq!(desc.short_description(), "First paragraph still first.");
        assert_eq!(desc.qualified(), "sh.builtin.Demo");
    }
}
