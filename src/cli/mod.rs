use serde_json::Value;

use crate::client::ApiOutcome;

const MAX_COL_WIDTH: usize = 48;

/// Render a listing (array of objects, or an object wrapping one under `items`/`data`/`listings`)
/// as an ASCII table. Returns `None` when the value has no tabular shape.
pub fn render_listing(val: &Value) -> Option<String> {
    let rows = listing_rows(val)?;
    if rows.is_empty() { return None; }

    let mut cols: Vec<String> = Vec::new();
    for row in rows {
        let obj = row.as_object()?;
        for k in obj.keys() {
            if !cols.contains(k) { cols.push(k.clone()); }
        }
    }
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|r| cols.iter().map(|c| cell_text(r.get(c).unwrap_or(&Value::Null))).collect())
        .collect();

    let mut widths: Vec<usize> = cols.iter().map(|c| c.chars().count().min(MAX_COL_WIDTH)).collect();
    for row in &cells {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count().min(MAX_COL_WIDTH));
        }
    }

    let sep = separator(&widths);
    let mut out = vec![sep.clone(), line(&cols, &widths), sep.clone()];
    out.extend(cells.iter().map(|r| line(r, &widths)));
    out.push(sep);
    out.push(format!("rows: {}", cells.len()));
    Some(out.join("\n"))
}

/// Text for an outcome: a table for listings, pretty JSON otherwise.
pub fn render_outcome(out: &ApiOutcome) -> String {
    match out {
        ApiOutcome::Success(v) => render_listing(v).unwrap_or_else(|| pretty(v)),
        ApiOutcome::Failure(e) => match e.status {
            Some(s) => format!("error: {} (HTTP {})", e.message, s),
            None => format!("error: {}", e.message),
        },
    }
}

fn pretty(v: &Value) -> String { serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string()) }

fn listing_rows(val: &Value) -> Option<&Vec<Value>> {
    match val {
        Value::Array(a) => Some(a),
        Value::Object(o) => ["items", "data", "listings"].iter().find_map(|k| o.get(*k).and_then(|v| v.as_array())),
        _ => None,
    }
}

fn cell_text(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn separator(widths: &[usize]) -> String {
    let mut s = String::from("+");
    for w in widths {
        s.push_str(&"-".repeat(w + 2));
        s.push('+');
    }
    s
}

fn line(cells: &[String], widths: &[usize]) -> String {
    let mut s = String::from("|");
    for (i, w) in widths.iter().enumerate() {
        let text = truncate(cells.get(i).map(String::as_str).unwrap_or(""), *w);
        let pad = w.saturating_sub(text.chars().count());
        if is_numeric_like(&text) {
            s.push_str(&format!(" {}{} |", " ".repeat(pad), text));
        } else {
            s.push_str(&format!(" {}{} |", text, " ".repeat(pad)));
        }
    }
    s
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max { return s.to_string(); }
    if max <= 1 { return "…".to_string(); }
    s.chars().take(max - 1).collect::<String>() + "…"
}

fn is_numeric_like(s: &str) -> bool {
    let st = s.trim();
    !st.is_empty() && st.chars().any(|c| c.is_ascii_digit()) && st.chars().all(|c| c.is_ascii_digit() || ".-+eE".contains(c))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use serde_json::json;

    #[test]
    fn renders_market_listing() {
        let v = json!({"items": [{"name": "basic", "price": 5}, {"name": "pro", "price": 12, "note": "popular"}]});
        let out = render_listing(&v).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[1], "| name  | price | note    |");
        assert_eq!(lines[3], "| basic |     5 |         |");
        assert_eq!(lines[4], "| pro   |    12 | popular |");
        assert_eq!(*lines.last().unwrap(), "rows: 2");
    }

    #[test]
    fn non_tabular_values_fall_back_to_json() {
        assert!(render_listing(&json!({"version": "1.0.0"})).is_none());
        assert!(render_listing(&json!([1, 2])).is_none());
        assert!(render_listing(&json!([])).is_none());
        let out = render_outcome(&ApiOutcome::Success(json!({"version": "1.0.0"})));
        assert!(out.contains("\"version\": \"1.0.0\""));
    }

    #[test]
    fn failures_render_message_and_status() {
        let out = render_outcome(&ApiOutcome::Failure(ApiError::new("Unauthorized").with_status(401)));
        assert_eq!(out, "error: Unauthorized (HTTP 401)");
    }

    #[test]
    fn long_cells_are_truncated() {
        assert_eq!(truncate("abcdef", 4), "abc…");
        assert_eq!(truncate("abc", 4), "abc");
    }
}
