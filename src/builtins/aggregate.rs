//! Aggregate and ordering builtins.

use crate::builtins::{canonical, wrap_object};
use crate::error::CallError;
use crate::interp::{numeric, stringify};
use crate::registry::{BoxFut, Builtin, CallParams, CallResult, MethodDescriptor, Object, Record};
use crate::service::Service;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;

/// `count` -- emit the input length as a single `{count}` object.
pub struct Count;

const COUNT: MethodDescriptor = MethodDescriptor {
    name: "Count",
    command: "count",
    accepts_args: false,
    accepts_input: true,
    positional: &[],
    doc: "Count the input objects.\n\
          \n\
          usage: count\n\
          Always emits exactly one {count: N} object; with no piped\n\
          input the count is 0.",
};

impl Builtin for Count {
    fn descriptor(&self) -> &'static MethodDescriptor {
        &COUNT
    }

    fn invoke<'a>(&'a self, _service: &'a Service, params: CallParams) -> BoxFut<'a, CallResult> {
        Box::pin(async move {
            let count = params.input.map(|objects| objects.len()).unwrap_or(0);
            let mut record = Record::new();
            record.insert("count".to_string(), Value::from(count));
            Ok(vec![record])
        })
    }
}

/// `sum` -- add a field across the stream.
pub struct Sum;

const SUM: MethodDescriptor = MethodDescriptor {
    name: "Sum",
    command: "sum",
    accepts_args: true,
    accepts_input: true,
    positional: &[],
    doc: "Sum a numeric field across all input objects.\n\
          \n\
          usage: sum FIELD\n\
          Values are coerced to floats; missing or unparseable values\n\
          contribute 0. Emits one {sum: N} object even for empty\n\
          input, with N narrowed back to an integer when whole.",
};

impl Builtin for Sum {
    fn descriptor(&self) -> &'static MethodDescriptor {
        &SUM
    }

    fn invoke<'a>(&'a self, _service: &'a Service, mut params: CallParams) -> BoxFut<'a, CallResult> {
        Box::pin(async move {
            let field = params
                .args
                .first()
                .cloned()
                .ok_or_else(|| CallError::invalid_parameter("args"))?;
            let total: f64 = params
                .take_input()
                .iter()
                .map(|obj| obj.get(&field).and_then(numeric).unwrap_or(0.0))
                .sum();
            let mut record = Record::new();
            record.insert("sum".to_string(), narrow(total));
            Ok(vec![record])
        })
    }
}

/// Represent a whole-valued float as a JSON integer.
fn narrow(total: f64) -> Value {
    if total.is_finite() && total.fract() == 0.0 && total.abs() <= i64::MAX as f64 {
        Value::from(total as i64)
    } else {
        Value::from(total)
    }
}

/// Ordering key for `min`/`max`: numeric-parseable values sort before
/// everything else.
#[derive(Debug, PartialEq)]
enum ExtremeKey {
    Num(f64),
    Text(String),
}

impl ExtremeKey {
    fn of(obj: &Object, field: &str) -> ExtremeKey {
        match obj.get(field) {
            Some(value) => match numeric(value) {
                Some(n) => ExtremeKey::Num(n),
                None => ExtremeKey::Text(stringify(value)),
            },
            None => ExtremeKey::Text(String::new()),
        }
    }

    fn cmp(&self, other: &ExtremeKey) -> Ordering {
        match (self, other) {
            (ExtremeKey::Num(a), ExtremeKey::Num(b)) => a.total_cmp(b),
            (ExtremeKey::Num(_), ExtremeKey::Text(_)) => Ordering::Less,
            (ExtremeKey::Text(_), ExtremeKey::Num(_)) => Ordering::Greater,
            (ExtremeKey::Text(a), ExtremeKey::Text(b)) => a.cmp(b),
        }
    }
}

/// Pick the extreme object by field, keeping the first among ties.
fn extreme(mut params: CallParams, want: Ordering) -> CallResult {
    let field = params
        .args
        .first()
        .cloned()
        .ok_or_else(|| CallError::invalid_parameter("args"))?;
    let mut best: Option<(ExtremeKey, Object)> = None;
    for obj in params.take_input() {
        let key = ExtremeKey::of(&obj, &field);
        // Replace only on a strictly better key, so ties keep the
        // earliest object.
        let replace = match &best {
            None => true,
            Some((best_key, _)) => key.cmp(best_key) == want,
        };
        if replace {
            best = Some((key, obj));
        }
    }
    Ok(best.map(|(_, obj)| vec![wrap_object(obj)]).unwrap_or_default())
}

/// `min` -- emit the object with the smallest field value.
pub struct Min;

const MIN: MethodDescriptor = MethodDescriptor {
    name: "Min",
    command: "min",
    accepts_args: true,
    accepts_input: true,
    positional: &[],
    doc: "Emit the object with the smallest field value.\n\
          \n\
          usage: min FIELD\n\
          Numeric-parseable values order before non-numeric ones; ties\n\
          keep the earliest object. Empty input emits nothing.",
};

impl Builtin for Min {
    fn descriptor(&self) -> &'static MethodDescriptor {
        &MIN
    }

    fn invoke<'a>(&'a self, _service: &'a Service, params: CallParams) -> BoxFut<'a, CallResult> {
        Box::pin(async move { extreme(params, Ordering::Less) })
    }
}

/// `max` -- emit the object with the largest field value.
pub struct Max;

const MAX: MethodDescriptor = MethodDescriptor {
    name: "Max",
    command: "max",
    accepts_args: true,
    accepts_input: true,
    positional: &[],
    doc: "Emit the object with the largest field value.\n\
          \n\
          usage: max FIELD\n\
          Numeric-parseable values order before non-numeric ones; ties\n\
          keep the earliest object. Empty input emits nothing.",
};

impl Builtin for Max {
    fn descriptor(&self) -> &'static MethodDescriptor {
        &MAX
    }

    fn invoke<'a>(&'a self, _service: &'a Service, params: CallParams) -> BoxFut<'a, CallResult> {
        Box::pin(async move { extreme(params, Ordering::Greater) })
    }
}

/// `group` -- tally occurrences of a field's values.
pub struct Group;

const GROUP: MethodDescriptor = MethodDescriptor {
    name: "Group",
    command: "group",
    accepts_args: true,
    accepts_input: true,
    positional: &[],
    doc: "Tally distinct values of a field.\n\
          \n\
          usage: group FIELD\n\
          Emits one {FIELD: value, count: N} object per distinct value\n\
          in first-seen order; objects missing the field group under\n\
          null.",
};

impl Builtin for Group {
    fn descriptor(&self) -> &'static MethodDescriptor {
        &GROUP
    }

    fn invoke<'a>(&'a self, _service: &'a Service, mut params: CallParams) -> BoxFut<'a, CallResult> {
        Box::pin(async move {
            let field = params
                .args
                .first()
                .cloned()
                .ok_or_else(|| CallError::invalid_parameter("args"))?;
            let mut tallies: Vec<(Value, u64)> = Vec::new();
            let mut index: HashMap<String, usize> = HashMap::new();
            for obj in params.take_input() {
                let value = obj.get(&field).cloned().unwrap_or(Value::Null);
                let key = canonical(&value);
                match index.get(&key) {
                    Some(&at) => tallies[at].1 += 1,
                    None => {
                        index.insert(key, tallies.len());
                        tallies.push((value, 1));
                    }
                }
            }
            let records = tallies
                .into_iter()
                .map(|(value, count)| {
                    let mut record = Record::new();
                    record.insert(field.clone(), value);
                    record.insert("count".to_string(), Value::from(count));
                    record
                })
                .collect();
            Ok(records)
        })
    }
}

/// `sort` -- stable multi-key ordering.
pub struct Sort;

const SORT: MethodDescriptor = MethodDescriptor {
    name: "Sort",
    command: "sort",
    accepts_args: true,
    accepts_input: true,
    positional: &[],
    doc: "Sort objects by one or more fields.\n\
          \n\
          usage: sort [[-]FIELD]...\n\
          A leading - sorts that field descending. Fields compare\n\
          numerically when both values parse as numbers and as strings\n\
          otherwise; a missing value compares as the empty string. The\n\
          sort is stable.",
};

impl Builtin for Sort {
    fn descriptor(&self) -> &'static MethodDescriptor {
        &SORT
    }

    fn invoke<'a>(&'a self, _service: &'a Service, mut params: CallParams) -> BoxFut<'a, CallResult> {
        Box::pin(async move {
            let keys: Vec<(String, bool)> = params
                .args
                .iter()
                .map(|arg| match arg.strip_prefix('-') {
                    Some(field) => (field.to_string(), true),
                    None => (arg.clone(), false),
                })
                .collect();
            let mut objects = params.take_input();
            objects.sort_by(|a, b| {
                for (field, descending) in &keys {
                    let ord = compare_field(a.get(field), b.get(field));
                    let ord = if *descending { ord.reverse() } else { ord };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
            Ok(objects.into_iter().map(wrap_object).collect())
        })
    }
}

/// Per-field comparison: numeric when both sides parse, stringified
/// otherwise, with missing values reading as the empty string.
fn compare_field(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let num_a = a.and_then(numeric);
    let num_b = b.and_then(numeric);
    match (num_a, num_b) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        _ => {
            let text_a = a.map(stringify).unwrap_or_default();
            let text_b = b.map(stringify).unwrap_or_default();
            text_a.cmp(&text_b)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::testutil::{invoke, run};
    use serde_json::json;

    #[tokio::test]
    async fn test_count_input() {
        let out = run(&Count, &[], Some(json!([{"a": 1}, {"b": 2}]))).await;
        assert_eq!(out, vec![json!({"count": 2})]);
    }

    #[tokio::test]
    async fn test_count_no_input_is_zero() {
        let out = run(&Count, &[], None).await;
        assert_eq!(out, vec![json!({"count": 0})]);
    }

    #[tokio::test]
    async fn test_sum_integers() {
        let out = run(&Sum, &["v"], Some(json!([{"v": 10}, {"v": 20}, {"v": 30}]))).await;
        assert_eq!(out, vec![json!({"sum": 60})]);
    }

    #[tokio::test]
    async fn test_sum_skips_missing_and_unparseable() {
        let out = run(
            &Sum,
            &["v"],
            Some(json!([{"v": 10}, {"x": 5}, {"v": "oops"}, {"v": 20}])),
        )
        .await;
        assert_eq!(out, vec![json!({"sum": 30})]);
    }

    #[tokio::test]
    async fn test_sum_coerces_numeric_strings() {
        let out = run(&Sum, &["v"], Some(json!([{"v": "1.5"}, {"v": 2}]))).await;
        assert_eq!(out, vec![json!({"sum": 3.5})]);
    }

    #[tokio::test]
    async fn test_sum_empty_emits_zero() {
        let out = run(&Sum, &["size"], None).await;
        assert_eq!(out, vec![json!({"sum": 0})]);
    }

    #[tokio::test]
    async fn test_sum_no_args_is_error() {
        let err = invoke(&Sum, &[], Some(json!([{"a": 1}]))).await.unwrap_err();
        assert!(matches!(err, CallError::InvalidParameter { .. }));
    }

    #[tokio::test]
    async fn test_min_max_pick_whole_object() {
        let input = json!([
            {"n": "a", "v": 3},
            {"n": "b", "v": 1},
            {"n": "c", "v": 2},
        ]);
        let out = run(&Min, &["v"], Some(input.clone())).await;
        assert_eq!(out, vec![json!({"n": "b", "v": 1})]);
        let out = run(&Max, &["v"], Some(input)).await;
        assert_eq!(out, vec![json!({"n": "a", "v": 3})]);
    }

    #[tokio::test]
    async fn test_min_max_numeric_before_text() {
        let input = json!([{"v": "zebra"}, {"v": 1000}, {"v": "5"}]);
        let out = run(&Min, &["v"], Some(input.clone())).await;
        assert_eq!(out, vec![json!({"v": "5"})]);
        let out = run(&Max, &["v"], Some(input)).await;
        assert_eq!(out, vec![json!({"v": "zebra"})]);
    }

    #[tokio::test]
    async fn test_min_max_ties_keep_first() {
        let input = json!([{"n": "x", "v": 1}, {"n": "y", "v": 1}]);
        let out = run(&Min, &["v"], Some(input.clone())).await;
        assert_eq!(out, vec![json!({"n": "x", "v": 1})]);
        let out = run(&Max, &["v"], Some(input)).await;
        assert_eq!(out, vec![json!({"n": "x", "v": 1})]);
    }

    #[tokio::test]
    async fn test_min_max_empty_emit_nothing() {
        assert!(run(&Min, &["v"], None).await.is_empty());
        assert!(run(&Max, &["v"], None).await.is_empty());
    }

    #[tokio::test]
    async fn test_min_no_args_is_error() {
        let err = invoke(&Min, &[], Some(json!([{"a": 1}]))).await.unwrap_err();
        assert!(matches!(err, CallError::InvalidParameter { .. }));
    }

    #[tokio::test]
    async fn test_group_tallies_in_first_seen_order() {
        let out = run(
            &Group,
            &["t"],
            Some(json!([{"t": "file"}, {"t": "dir"}, {"t": "file"}, {"t": "file"}])),
        )
        .await;
        assert_eq!(
            out,
            vec![json!({"t": "file", "count": 3}), json!({"t": "dir", "count": 1})]
        );
    }

    #[tokio::test]
    async fn test_group_counts_sum_to_input_length() {
        let input = json!([{"t": "a"}, {"t": "b"}, {"t": "a"}, {}]);
        let out = run(&Group, &["t"], Some(input)).await;
        let total: u64 = out.iter().map(|o| o["count"].as_u64().unwrap()).sum();
        assert_eq!(total, 4);
        assert_eq!(out[2]["t"], Value::Null);
    }

    #[tokio::test]
    async fn test_group_keeps_raw_value_type() {
        let out = run(&Group, &["v"], Some(json!([{"v": 5}, {"v": 5}]))).await;
        assert_eq!(out, vec![json!({"v": 5, "count": 2})]);
    }

    #[tokio::test]
    async fn test_group_no_args_is_error() {
        let err = invoke(&Group, &[], Some(json!([{"a": 1}]))).await.unwrap_err();
        assert!(matches!(err, CallError::InvalidParameter { .. }));
    }

    #[tokio::test]
    async fn test_sort_by_string_field() {
        let input = json!([{"n": "b"}, {"n": "a"}, {"n": "c"}]);
        let out = run(&Sort, &["n"], Some(input)).await;
        let names: Vec<&str> = out.iter().map(|o| o["n"].as_str().unwrap()).collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_sort_descending() {
        let input = json!([{"v": 1}, {"v": 3}, {"v": 2}]);
        let out = run(&Sort, &["-v"], Some(input)).await;
        let values: Vec<i64> = out.iter().map(|o| o["v"].as_i64().unwrap()).collect();
        assert_eq!(values, [3, 2, 1]);
    }

    #[tokio::test]
    async fn test_sort_numeric_not_lexicographic() {
        let input = json!([{"s": 100}, {"s": 20}, {"s": 3}]);
        let out = run(&Sort, &["s"], Some(input)).await;
        let values: Vec<i64> = out.iter().map(|o| o["s"].as_i64().unwrap()).collect();
        assert_eq!(values, [3, 20, 100]);
    }

    #[tokio::test]
    async fn test_sort_multi_key() {
        let input = json!([
            {"t": "b", "s": 2},
            {"t": "a", "s": 1},
            {"t": "a", "s": 3},
        ]);
        let out = run(&Sort, &["t", "-s"], Some(input)).await;
        let pairs: Vec<(String, i64)> = out
            .iter()
            .map(|o| (o["t"].as_str().unwrap().to_string(), o["s"].as_i64().unwrap()))
            .collect();
        assert_eq!(
            pairs,
            [
                ("a".to_string(), 3),
                ("a".to_string(), 1),
                ("b".to_string(), 2),
            ]
        );
    }

    #[tokio::test]
    async fn test_sort_is_stable_on_ties() {
        let input = json!([
            {"k": 1, "tag": "first"},
            {"k": 1, "tag": "second"},
            {"k": 0, "tag": "third"},
        ]);
        let out = run(&Sort, &["k"], Some(input)).await;
        assert_eq!(out[0]["tag"], "third");
        assert_eq!(out[1]["tag"], "first");
        assert_eq!(out[2]["tag"], "second");
    }

    #[tokio::test]
    async fn test_sort_missing_field_reads_empty() {
        let input = json!([{"n": "b"}, {}, {"n": "a"}]);
        let out = run(&Sort, &["n"], Some(input)).await;
        assert_eq!(out[0], json!({}));
    }

    #[tokio::test]
    async fn test_sort_no_args_passthrough() {
        let input = json!([{"b": 1}, {"a": 2}]);
        let out = run(&Sort, &[], Some(input.clone())).await;
        assert_eq!(Value::Array(out), input);
    }
}
