//! Server-rendered readings page.
//!
//! Readings are opaque rows, so the table header is the union of their
//! columns in first-seen order. Every cell is HTML-escaped.

use std::fmt::Write as _;

use serde_json::Value;

use nanoc6_core::ReadingsPage;
use nanoc6_types::Reading;

/// Escape text for HTML element content and attribute values.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Columns present in any reading, in first-seen order.
pub fn columns(readings: &[Reading]) -> Vec<&str> {
    let mut columns: Vec<&str> = Vec::new();
    for reading in readings {
        for key in reading.columns().keys() {
            if !columns.contains(&key.as_str()) {
                columns.push(key.as_str());
            }
        }
    }
    columns
}

fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Render the readings page.
pub fn render(title: &str, page: &ReadingsPage) -> String {
    let title = escape_html(title);
    let mut html = String::new();

    let _ = write!(
        html,
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{title}</title>\n</head>\n<body>\n<h1>{title}</h1>\n"
    );

    if let Some(ref error) = page.error {
        let _ = writeln!(
            html,
            "<p class=\"error\" role=\"alert\">Could not load readings: {}</p>",
            escape_html(error)
        );
    }

    if page.readings.is_empty() {
        html.push_str("<p class=\"empty\">No readings yet.</p>\n");
    } else {
        let columns = columns(&page.readings);

        html.push_str("<table>\n<thead>\n<tr>");
        for column in &columns {
            let _ = write!(html, "<th>{}</th>", escape_html(column));
        }
        html.push_str("</tr>\n</thead>\n<tbody>\n");

        for reading in &page.readings {
            html.push_str("<tr>");
            for column in &columns {
                let _ = write!(html, "<td>{}</td>", escape_html(&cell_text(reading.get(column))));
            }
            html.push_str("</tr>\n");
        }
        html.push_str("</tbody>\n</table>\n");
    }

    html.push_str("</body>\n</html>\n");
    html
}
