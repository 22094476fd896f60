//! # objsh
//!
//! An interactive shell whose pipelines carry **structured objects**
//! (ordered maps of string keys to JSON values) instead of byte
//! streams. A line like
//!
//! ```text
//! ls /tmp | where size>1024 | sort -size | head 5
//! ```
//!
//! is parsed into stages, and each stage is dispatched as a streaming
//! RPC call against an in-process service speaking a Varlink-style
//! wire protocol: JSON request/reply frames with a `continues` flag on
//! every reply but the last. The output objects of one stage become
//! the `input` parameter of the next.
//!
//! ## Core Concepts
//!
//! - **[`parser::parse`]** — split a line into `(command, args)`
//!   stages at unquoted `|` tokens.
//! - **[`Service`]** — the registry of builtin method handlers plus
//!   the transport that frames their replies.
//! - **[`execute`]** — the pipeline executor: one streaming call per
//!   stage, each fully drained before the next begins.
//! - **[`Builtin`]** — object-safe trait implemented by the roughly
//!   twenty stage operators (`echo`, `ls`, `grep`, `sort`, `where`,
//!   `map`, ...), each declaring its wire schema in a
//!   [`MethodDescriptor`].
//! - **[`interp`]** — the `{field}` template sublanguage shared by
//!   `map`, `filter_map` and `foreach`; a template that is exactly one
//!   placeholder preserves the field's raw JSON type.
//! - **[`client::VarlinkClient`]** — the `varlink` builtin's client
//!   side for introspecting and calling external peers.
//!
//! ## Quick Start
//!
//! ```
//! use objsh::{execute, Service};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> objsh::Result<()> {
//!     let service = Service::new();
//!     let objects = execute(&service, "echo name=alice | map greeting=\"hi {name}\"").await?;
//!     assert_eq!(objects[0]["greeting"], "hi alice");
//!     Ok(())
//! }
//! ```

pub mod builtins;
pub mod client;
pub mod error;
pub mod exec;
pub mod interp;
pub mod parser;
pub mod registry;
pub mod render;
pub mod service;

pub use error::{CallError, Result, ShellError};
pub use exec::execute;
pub use registry::{Builtin, CallParams, CallResult, MethodDescriptor, Object, Record};
pub use service::{Reply, Request, Service};
