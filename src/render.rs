//! Pretty-printing of object streams.
//!
//! When every object carries the same keys in the same order the
//! stream renders as an aligned column table; otherwise each object is
//! printed as one compact JSON line.

use crate::interp::stringify;
use crate::registry::Object;
use serde_json::Value;

/// Render a stream to text, each line newline-terminated. An empty
/// stream renders as the empty string.
pub fn render_objects(objects: &[Object]) -> String {
    if objects.is_empty() {
        return String::new();
    }
    let keys: Vec<&String> = objects[0].keys().collect();
    let uniform = objects
        .iter()
        .all(|obj| obj.keys().collect::<Vec<_>>() == keys);
    if uniform {
        render_table(objects, &keys)
    } else {
        objects
            .iter()
            .map(|obj| {
                let mut line = Value::Object(obj.clone()).to_string();
                line.push('\n');
                line
            })
            .collect()
    }
}

/// Print a stream to stdout.
pub fn print_objects(objects: &[Object]) {
    let rendered = render_objects(objects);
    if !rendered.is_empty() {
        print!("{rendered}");
    }
}

fn render_table(objects: &[Object], keys: &[&String]) -> String {
    let headers: Vec<String> = keys.iter().map(|key| key.to_uppercase()).collect();
    let rows: Vec<Vec<String>> = objects
        .iter()
        .map(|obj| {
            keys.iter()
                .map(|key| obj.get(*key).map(stringify).unwrap_or_default())
                .collect()
        })
        .collect();

    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(i, header)| {
            rows.iter()
                .map(|row| row[i].len())
                .chain([header.len()])
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut out = String::new();
    out.push_str(&join_row(&headers, &widths));
    out.push_str(&join_row(
        &widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>(),
        &widths,
    ));
    for row in &rows {
        out.push_str(&join_row(row, &widths));
    }
    out
}

fn join_row(cells: &[String], widths: &[usize]) -> String {
    let mut line = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{cell:<width$}"))
        .collect::<Vec<_>>()
        .join("  ");
    while line.ends_with(' ') {
        line.pop();
    }
    line.push('\n');
    line
}
