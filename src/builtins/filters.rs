//! Filter builtins: stages that select or reorder input objects.

use crate::builtins::{canonical, wrap_object};
use crate::error::CallError;
use crate::interp::{numeric, stringify};
use crate::registry::{BoxFut, Builtin, CallParams, CallResult, MethodDescriptor};
use crate::service::Service;
use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashSet;

/// `grep` -- keep objects whose fields contain the given substrings.
pub struct Grep;

const GREP: MethodDescriptor = MethodDescriptor {
    name: "Grep",
    command: "grep",
    accepts_args: true,
    accepts_input: true,
    positional: &[],
    doc: "Keep objects whose fields contain the given substrings.\n\
          \n\
          usage: grep [FIELD=SUBSTRING]...\n\
          An object passes when every named field's stringified value\n\
          contains its substring (plain match, not a regex). An object\n\
          missing a named field is dropped.",
};

impl Builtin for Grep {
    fn descriptor(&self) -> &'static MethodDescriptor {
        &GREP
    }

    fn invoke<'a>(&'a self, _service: &'a Service, mut params: CallParams) -> BoxFut<'a, CallResult> {
        Box::pin(async move {
            let mut conditions = Vec::new();
            for arg in &params.args {
                let (field, needle) = arg
                    .split_once('=')
                    .ok_or_else(|| CallError::invalid_parameter("args"))?;
                conditions.push((field.to_string(), needle.to_string()));
            }
            let records = params
                .take_input()
                .into_iter()
                .filter(|obj| {
                    conditions.iter().all(|(field, needle)| {
                        obj.get(field)
                            .map(|value| stringify(value).contains(needle.as_str()))
                            .unwrap_or(false)
                    })
                })
                .map(wrap_object)
                .collect();
            Ok(records)
        })
    }
}

/// One parsed `where` condition.
struct Condition {
    field: String,
    op: Op,
    value: String,
}

enum Op {
    Ge,
    Le,
    Ne,
    Gt,
    Lt,
    Match(Regex),
    Eq,
}

impl Condition {
    /// Parse `field OP value`, trying operators longest-first so
    /// `>=` wins over `>`.
    fn parse(arg: &str) -> Result<Condition, CallError> {
        for (text, op) in [
            (">=", Some(Op::Ge)),
            ("<=", Some(Op::Le)),
            ("!=", Some(Op::Ne)),
            (">", Some(Op::Gt)),
            ("<", Some(Op::Lt)),
            ("~", None),
            ("=", Some(Op::Eq)),
        ] {
            if let Some(index) = arg.find(text) {
                let field = arg[..index].to_string();
                let value = arg[index + text.len()..].to_string();
                let op = match op {
                    Some(op) => op,
                    None => Op::Match(
                        Regex::new(&value)
                            .map_err(|_| CallError::invalid_parameter("args"))?,
                    ),
                };
                return Ok(Condition { field, op, value });
            }
        }
        Err(CallError::invalid_parameter("args"))
    }

    fn matches(&self, actual: &Value) -> bool {
        let text = stringify(actual);
        match &self.op {
            Op::Eq => text == self.value,
            Op::Ne => text != self.value,
            Op::Match(regex) => regex.is_match(&text),
            Op::Gt => self.compare(actual, &text) == Ordering::Greater,
            Op::Lt => self.compare(actual, &text) == Ordering::Less,
            Op::Ge => self.compare(actual, &text) != Ordering::Less,
            Op::Le => self.compare(actual, &text) != Ordering::Greater,
        }
    }

    /// Numeric comparison when both sides parse, string comparison
    /// otherwise.
    fn compare(&self, actual: &Value, text: &str) -> Ordering {
        match (numeric(actual), self.value.trim().parse::<f64>().ok()) {
            (Some(a), Some(b)) => a.total_cmp(&b),
            _ => text.cmp(&self.value),
        }
    }
}

/// `where` -- keep objects matching every comparison condition.
pub struct Where;

const WHERE: MethodDescriptor = MethodDescriptor {
    name: "Where",
    command: "where",
    accepts_args: true,
    accepts_input: true,
    positional: &[],
    doc: "Keep objects matching every condition.\n\
          \n\
          usage: where CONDITION...\n\
          A condition is FIELD OP VALUE with OP one of >=, <=, !=, >,\n\
          <, ~ or =. Equality compares stringified values, ~ is a\n\
          regex search, and the ordering operators compare numerically\n\
          when both sides parse as numbers, falling back to string\n\
          order. An object missing the field fails the condition; all\n\
          conditions must hold.",
};

impl Builtin for Where {
    fn descriptor(&self) -> &'static MethodDescriptor {
        &WHERE
    }

    fn invoke<'a>(&'a self, _service: &'a Service, mut params: CallParams) -> BoxFut<'a, CallResult> {
        Box::pin(async move {
            if params.args.is_empty() {
                return Err(CallError::invalid_parameter("args"));
            }
            let conditions = params
                .args
                .iter()
                .map(|arg| Condition::parse(arg))
                .collect::<Result<Vec<_>, _>>()?;
            let records = params
                .take_input()
                .into_iter()
                .filter(|obj| {
                    conditions.iter().all(|cond| {
                        obj.get(&cond.field)
                            .map(|value| cond.matches(value))
                            .unwrap_or(false)
                    })
                })
                .map(wrap_object)
                .collect();
            Ok(records)
        })
    }
}

/// `head` -- keep the first N objects.
pub struct Head;

const HEAD: MethodDescriptor = MethodDescriptor {
    name: "Head",
    command: "head",
    accepts_args: true,
    accepts_input: true,
    positional: &[],
    doc: "Keep the first N objects.\n\
          \n\
          usage: head [N]\n\
          N defaults to 10.",
};

impl Builtin for Head {
    fn descriptor(&self) -> &'static MethodDescriptor {
        &HEAD
    }

    fn invoke<'a>(&'a self, _service: &'a Service, mut params: CallParams) -> BoxFut<'a, CallResult> {
        Box::pin(async move {
            let count = parse_count(&params.args)?;
            Ok(params
                .take_input()
                .into_iter()
                .take(count)
                .map(wrap_object)
                .collect())
        })
    }
}

/// `tail` -- keep the last N objects.
pub struct Tail;

const TAIL: MethodDescriptor = MethodDescriptor {
    name: "Tail",
    command: "tail",
    accepts_args: true,
    accepts_input: true,
    positional: &[],
    doc: "Keep the last N objects.\n\
          \n\
          usage: tail [N]\n\
          N defaults to 10; input order is preserved.",
};

impl Builtin for Tail {
    fn descriptor(&self) -> &'static MethodDescriptor {
        &TAIL
    }

    fn invoke<'a>(&'a self, _service: &'a Service, mut params: CallParams) -> BoxFut<'a, CallResult> {
        Box::pin(async move {
            let count = parse_count(&params.args)?;
            let input = params.take_input();
            let skip = input.len().saturating_sub(count);
            Ok(input.into_iter().skip(skip).map(wrap_object).collect())
        })
    }
}

fn parse_count(args: &[String]) -> Result<usize, CallError> {
    match args.first() {
        Some(token) => token
            .parse::<usize>()
            .map_err(|_| CallError::invalid_parameter("args")),
        None => Ok(10),
    }
}

/// `uniq` -- drop duplicate objects, keeping first occurrences.
pub struct Uniq;

const UNIQ: MethodDescriptor = MethodDescriptor {
    name: "Uniq",
    command: "uniq",
    accepts_args: true,
    accepts_input: true,
    positional: &[],
    doc: "Drop duplicates, keeping the first occurrence of each key.\n\
          \n\
          usage: uniq [FIELD]...\n\
          With fields, two objects are duplicates when those field\n\
          values all match; without, when the whole objects are equal\n\
          (ignoring key order). Input order is preserved.",
};

impl Builtin for Uniq {
    fn descriptor(&self) -> &'static MethodDescriptor {
        &UNIQ
    }

    fn invoke<'a>(&'a self, _service: &'a Service, mut params: CallParams) -> BoxFut<'a, CallResult> {
        Box::pin(async move {
            let mut seen = HashSet::new();
            let records = params
                .take_input()
                .into_iter()
                .filter(|obj| {
                    let key = if params.args.is_empty() {
                        canonical(&Value::Object(obj.clone()))
                    } else {
                        let values: Vec<Value> = params
                            .args
                            .iter()
                            .map(|field| obj.get(field).cloned().unwrap_or(Value::Null))
                            .collect();
                        canonical(&Value::Array(values))
                    };
                    seen.insert(key)
                })
                .map(wrap_object)
                .collect();
            Ok(records)
        })
    }
}

/// `reverse` -- emit the input in reverse order.
pub struct Reverse;

const REVERSE: MethodDescriptor = MethodDescriptor {
    name: "Reverse",
    command: "reverse",
    accepts_args: false,
    accepts_input: true,
    positional: &[],
    doc: "Emit the input objects in reverse order.\n\
          \n\
          usage: reverse",
};

impl Builtin for Reverse {
    fn descriptor(&self) -> &'static MethodDescriptor {
        &REVERSE
    }

    fn invoke<'a>(&'a self, _service: &'a Service, mut params: CallParams) -> BoxFut<'a, CallResult> {
        Box::pin(async move {
            Ok(params
                .take_input()
                .into_iter()
                .rev()
                .map(wrap_object)
                .collect())
        })
    }
}
