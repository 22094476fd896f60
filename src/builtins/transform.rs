//! Transform builtins: stages that reshape each input object.

use crate::builtins::wrap_object;
use crate::error::{CallError, ShellError};
use crate::exec;
use crate::interp;
use crate::registry::{BoxFut, Builtin, CallParams, CallResult, MethodDescriptor, Object};
use crate::render;
use crate::service::Service;
use serde_json::Value;

/// `map` -- project and rename fields through interpolation templates.
pub struct Map;

const MAP: MethodDescriptor = MethodDescriptor {
    name: "Map",
    command: "map",
    accepts_args: true,
    accepts_input: true,
    positional: &[],
    doc: "Build new objects from field mappings.\n\
          \n\
          usage: map [KEY=TEMPLATE | FIELD]...\n\
          Each mapping evaluates its template against the input object.\n\
          A bare FIELD is shorthand for FIELD={FIELD}. A template that\n\
          is exactly one {field} placeholder keeps the field's raw\n\
          type, and is omitted from the output when the field is\n\
          missing; any other template produces a string.",
};

impl Builtin for Map {
    fn descriptor(&self) -> &'static MethodDescriptor {
        &MAP
    }

    fn invoke<'a>(&'a self, _service: &'a Service, mut params: CallParams) -> BoxFut<'a, CallResult> {
        Box::pin(async move {
            if params.args.is_empty() {
                return Err(CallError::invalid_parameter("args"));
            }
            let mappings = interp::parse_mappings(&params.args);
            let records = params
                .take_input()
                .into_iter()
                .map(|obj| wrap_object(apply_mappings(&mappings, &obj, true)))
                .collect();
            Ok(records)
        })
    }
}

/// `filter_map` -- like `map`, dropping objects missing a required field.
pub struct FilterMap;

const FILTER_MAP: MethodDescriptor = MethodDescriptor {
    name: "FilterMap",
    command: "filter_map",
    accepts_args: true,
    accepts_input: true,
    positional: &[],
    doc: "Map objects, dropping those missing a referenced field.\n\
          \n\
          usage: filter_map [KEY=TEMPLATE | FIELD]...\n\
          Mappings work as in map, but an input object that lacks any\n\
          field referenced by any template is dropped instead of\n\
          producing partial output. Every emitted object therefore\n\
          carries all mapped keys.",
};

impl Builtin for FilterMap {
    fn descriptor(&self) -> &'static MethodDescriptor {
        &FILTER_MAP
    }

    fn invoke<'a>(&'a self, _service: &'a Service, mut params: CallParams) -> BoxFut<'a, CallResult> {
        Box::pin(async move {
            if params.args.is_empty() {
                return Err(CallError::invalid_parameter("args"));
            }
            let mappings = interp::parse_mappings(&params.args);
            let mut required: Vec<String> = Vec::new();
            for (_, template) in &mappings {
                for field in interp::template_fields(template) {
                    if !required.contains(&field) {
                        required.push(field);
                    }
                }
            }
            let records = params
                .take_input()
                .into_iter()
                .filter(|obj| required.iter().all(|field| interp::lookup(obj, field).is_some()))
                .map(|obj| wrap_object(apply_mappings(&mappings, &obj, false)))
                .collect();
            Ok(records)
        })
    }
}

/// Evaluate mappings against one object. When `omit_missing` is set,
/// single-placeholder templates whose field is absent drop their key.
fn apply_mappings(mappings: &[(String, String)], obj: &Object, omit_missing: bool) -> Object {
    let mut out = Object::new();
    for (key, template) in mappings {
        if let Some(field) = interp::single_field(template) {
            match interp::lookup(obj, field) {
                Some(value) => {
                    out.insert(key.clone(), value.clone());
                }
                None if omit_missing => {}
                None => {
                    out.insert(key.clone(), Value::Null);
                }
            }
        } else {
            out.insert(key.clone(), interp::render(template, obj));
        }
    }
    out
}

/// `foreach` -- run a sub-pipeline per input object.
pub struct Foreach;

const FOREACH: MethodDescriptor = MethodDescriptor {
    name: "Foreach",
    command: "foreach",
    accepts_args: true,
    accepts_input: true,
    positional: &[],
    doc: "Run a pipeline template once per input object.\n\
          \n\
          usage: foreach LINE...\n\
          The arguments form a pipeline line in which {field}\n\
          placeholders are substituted (shell-quoted) from each input\n\
          object; the line is then executed as its own pipeline and\n\
          all outputs are concatenated in input order.",
};

impl Builtin for Foreach {
    fn descriptor(&self) -> &'static MethodDescriptor {
        &FOREACH
    }

    fn invoke<'a>(&'a self, service: &'a Service, mut params: CallParams) -> BoxFut<'a, CallResult> {
        Box::pin(async move {
            if params.args.is_empty() {
                return Err(CallError::invalid_parameter("args"));
            }
            let template = params.args.join(" ");
            let mut records = Vec::new();
            for obj in params.take_input() {
                let line = interp::render_quoted(&template, &obj);
                let objects = exec::execute(service, &line).await.map_err(|err| match err {
                    ShellError::Call { error, parameters } => {
                        CallError::Raised { error, parameters }
                    }
                    _ => CallError::invalid_parameter("args"),
                })?;
                records.extend(objects.into_iter().map(wrap_object));
            }
            Ok(records)
        })
    }
}

/// `enumerate` -- prepend a 0-based `index` field to each object.
pub struct Enumerate;

const ENUMERATE: MethodDescriptor = MethodDescriptor {
    name: "Enumerate",
    command: "enumerate",
    accepts_args: false,
    accepts_input: true,
    positional: &[],
    doc: "Prepend a 0-based index field to each object.\n\
          \n\
          usage: enumerate\n\
          Each object gains an index field counting from 0 in input\n\
          order; existing fields follow unchanged.",
};

impl Builtin for Enumerate {
    fn descriptor(&self) -> &'static MethodDescriptor {
        &ENUMERATE
    }

    fn invoke<'a>(&'a self, _service: &'a Service, mut params: CallParams) -> BoxFut<'a, CallResult> {
        Box::pin(async move {
            let records = params
                .take_input()
                .into_iter()
                .enumerate()
                .map(|(i, obj)| {
                    let mut out = Object::new();
                    out.insert("index".to_string(), Value::from(i));
                    for (key, value) in obj {
                        out.insert(key, value);
                    }
                    wrap_object(out)
                })
                .collect();
            Ok(records)
        })
    }
}

/// `print` -- pass objects through while pretty-printing them.
pub struct Print;

const PRINT: MethodDescriptor = MethodDescriptor {
    name: "Print",
    command: "print",
    accepts_args: false,
    accepts_input: true,
    positional: &[],
    doc: "Pretty-print the stream and pass it through unchanged.\n\
          \n\
          usage: print\n\
          Renders the objects seen so far (table when key order is\n\
          uniform, JSON lines otherwise) without consuming them, so a\n\
          pipeline can be inspected mid-flight.",
};

impl Builtin for Print {
    fn descriptor(&self) -> &'static MethodDescriptor {
        &PRINT
    }

    fn invoke<'a>(&'a self, _service: &'a Service, mut params: CallParams) -> BoxFut<'a, CallResult> {
        Box::pin(async move {
            let input = params.take_input();
            let rendered = render::render_objects(&input);
            if !rendered.is_empty() {
                print!("{rendered}");
            }
            Ok(input.into_iter().map(wrap_object).collect())
        })
    }
}
