//! The object-algebra builtins registered under `sh.builtin`.
//!
//! Grouped by role: sources that create objects (`echo`, `ls`,
//! `jsexec`, `help`), transforms (`map`, `filter_map`, `foreach`,
//! `enumerate`, `print`), filters (`grep`, `where`, `head`, `tail`,
//! `uniq`, `reverse`), aggregates (`count`, `sum`, `min`, `max`,
//! `group`, `sort`) and the external RPC client (`varlink`).

mod aggregate;
mod filters;
mod sources;
mod transform;
mod varlink;

pub use aggregate::{Count, Group, Max, Min, Sort, Sum};
pub use filters::{Grep, Head, Reverse, Tail, Uniq, Where};
pub use sources::{Echo, Help, Jsexec, Ls};
pub use transform::{Enumerate, FilterMap, Foreach, Map, Print};
pub use varlink::Varlink;

use crate::registry::{Builtin, Object, Record};
use serde_json::Value;

/// Every builtin, in the order `help` lists them.
pub(crate) fn register() -> Vec<Box<dyn Builtin>> {
    vec![
        Box::new(Echo),
        Box::new(Ls),
        Box::new(Grep),
        Box::new(Count),
        Box::new(Help),
        Box::new(Jsexec),
        Box::new(Map),
        Box::new(FilterMap),
        Box::new(Foreach),
        Box::new(Sort),
        Box::new(Head),
        Box::new(Tail),
        Box::new(Uniq),
        Box::new(Reverse),
        Box::new(Sum),
        Box::new(Min),
        Box::new(Max),
        Box::new(Where),
        Box::new(Group),
        Box::new(Enumerate),
        Box::new(Print),
        Box::new(Varlink),
    ]
}

/// Wrap a stage output object into the `{object: ...}` reply record
/// the executor unwraps on the other side.
pub(crate) fn wrap_object(obj: Object) -> Record {
    let mut record = Record::new();
    record.insert("object".to_string(), Value::Object(obj));
    record
}

/// Canonical JSON text of a value: object keys sorted recursively, so
/// two objects differing only in key order serialize identically.
pub(crate) fn canonical(value: &Value) -> String {
    fn sorted(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                Value::Object(
                    keys.into_iter()
                        .map(|k| (k.clone(), sorted(&map[k])))
                        .collect(),
                )
            }
            Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
            other => other.clone(),
        }
    }
    sorted(value).to_string()
}
