//! Response Normalizer
//!
//! The analysis backend does not commit to one response schema. The answer
//! may sit at the top level, under `response`, or under `analysis.response`;
//! older deployments return `{executed_code, result: {type, data}}`. This
//! module probes those locations in a fixed order and turns the first
//! recognizable payload into exactly one [`Reply`].
//!
//! Inside a payload object the keys are checked as `chart`, then `table`,
//! then `text`. When a chart or table is present, `text` becomes its caption.

use serde_json::{Map, Value};
use tracing::debug;

use crate::models::{AxisLabels, Cell, ChartData, ChartKind, ChartPoint, MessageBody, TableData};

/// Candidate answer locations, probed in order.
const ANSWER_PATHS: &[&[&str]] = &[&[], &["response"], &["analysis", "response"]];

/// Location of the `{type, data}` result shape, probed after [`ANSWER_PATHS`].
const TAGGED_RESULT_PATH: &[&str] = &["result"];

const TABLE_CAPTION: &str = "Here's a detailed table of the data:";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NormalizationError {
    #[error("no text, chart or table payload found in analysis response")]
    NoRecognizablePayload,

    #[error("invalid chart payload: {0}")]
    InvalidChart(String),

    #[error("invalid table payload: {0}")]
    InvalidTable(String),

    #[error("text payload is empty or not a string")]
    InvalidText,
}

/// A normalized assistant answer, ready to become a message.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    /// Display text, or caption for charts and tables
    pub content: String,
    pub body: MessageBody,
}

impl Reply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            body: MessageBody::Text,
        }
    }
}

/// What was found at a candidate location.
enum Payload<'a> {
    Plain(&'a str),
    Keyed(&'a Map<String, Value>),
    Tagged { kind: &'a str, data: &'a Value },
}

pub fn normalize(raw: &Value, question: &str) -> Result<Reply, NormalizationError> {
    let payload = resolve(raw).ok_or(NormalizationError::NoRecognizablePayload)?;

    let reply = match payload {
        Payload::Plain(text) => Reply::text(text.trim()),
        Payload::Keyed(map) => normalize_keyed(map)?,
        Payload::Tagged { kind, data } => normalize_tagged(kind, data)?,
    };

    debug!(
        question_len = question.len(),
        kind = ?reply.body.kind(),
        "Normalized analysis response"
    );
    Ok(reply)
}

fn resolve(raw: &Value) -> Option<Payload<'_>> {
    ANSWER_PATHS
        .iter()
        .filter_map(|path| lookup(raw, path))
        .find_map(recognize)
        .or_else(|| lookup(raw, TAGGED_RESULT_PATH).and_then(recognize_tagged))
}

fn lookup<'a>(root: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(root, |value, segment| value.get(*segment))
}

fn recognize(value: &Value) -> Option<Payload<'_>> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(Payload::Plain(s)),
        Value::Object(map) if ["chart", "table", "text"].iter().any(|k| field(map, k).is_some()) => {
            Some(Payload::Keyed(map))
        }
        _ => None,
    }
}

fn recognize_tagged(value: &Value) -> Option<Payload<'_>> {
    let kind = value.get("type")?.as_str()?;
    let data = value.get("data")?;
    Some(Payload::Tagged { kind, data })
}

fn normalize_keyed(map: &Map<String, Value>) -> Result<Reply, NormalizationError> {
    let caption = field(map, "text").and_then(text_of);

    if let Some(chart) = field(map, "chart") {
        let chart = normalize_chart(chart)?;
        return Ok(chart_reply(chart, caption));
    }
    if let Some(table) = field(map, "table") {
        let table = normalize_table(table)?;
        return Ok(table_reply(table, caption));
    }

    caption
        .map(Reply::text)
        .ok_or(NormalizationError::InvalidText)
}

/// Payload keys set to `null` count as absent.
fn field<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    map.get(key).filter(|value| !value.is_null())
}

fn normalize_tagged(kind: &str, data: &Value) -> Result<Reply, NormalizationError> {
    match kind.to_ascii_lowercase().as_str() {
        "text" => text_of(data).map(Reply::text).ok_or(NormalizationError::InvalidText),
        "chart" => Ok(chart_reply(normalize_chart(data)?, None)),
        "table" => Ok(table_reply(normalize_table(data)?, None)),
        _ => Err(NormalizationError::NoRecognizablePayload),
    }
}

/// Accepts `"..."` or `{"content": "..."}`.
fn text_of(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.as_str(),
        Value::Object(map) => map.get("content")?.as_str()?,
        _ => return None,
    };
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn chart_reply(chart: ChartData, caption: Option<String>) -> Reply {
    let content = caption.unwrap_or_else(|| {
        if chart.title.is_empty() {
            format!("Here's a {} chart of the data:", chart.kind)
        } else {
            chart.title.clone()
        }
    });
    Reply {
        content,
        body: MessageBody::Chart(chart),
    }
}

fn table_reply(table: TableData, caption: Option<String>) -> Reply {
    Reply {
        content: caption.unwrap_or_else(|| TABLE_CAPTION.to_string()),
        body: MessageBody::Table(table),
    }
}

/// Chart payloads come either keyed by kind (`{default?, bar?, line?, pie?}`)
/// or as a single series (`{type?, data: [...]}`).
fn normalize_chart(value: &Value) -> Result<ChartData, NormalizationError> {
    let map = value
        .as_object()
        .ok_or_else(|| NormalizationError::InvalidChart("chart payload is not an object".into()))?;

    let hint = ["default", "type", "kind"]
        .iter()
        .find_map(|field| map.get(*field).and_then(Value::as_str))
        .and_then(ChartKind::parse);

    let keyed: Vec<(ChartKind, &Value)> = ChartKind::ALL
        .iter()
        .filter_map(|kind| map.get(kind.as_str()).map(|series| (*kind, series)))
        .collect();

    if keyed.is_empty() {
        if map.contains_key("data") {
            return normalize_series(hint.unwrap_or(ChartKind::Bar), value);
        }
        return Err(NormalizationError::InvalidChart("no bar, line or pie series".into()));
    }

    let (kind, series) = hint
        .and_then(|hint| keyed.iter().find(|(kind, _)| *kind == hint))
        .unwrap_or(&keyed[0]);
    normalize_series(*kind, series)
}

fn normalize_series(kind: ChartKind, series: &Value) -> Result<ChartData, NormalizationError> {
    let (points, meta) = match series {
        Value::Array(points) => (points, None),
        Value::Object(map) => {
            let points = map
                .get("data")
                .and_then(Value::as_array)
                .ok_or_else(|| NormalizationError::InvalidChart(format!("{} series has no data array", kind)))?;
            (points, Some(map))
        }
        _ => {
            return Err(NormalizationError::InvalidChart(format!(
                "{} series is neither an object nor an array",
                kind
            )))
        }
    };

    if points.is_empty() {
        return Err(NormalizationError::InvalidChart(format!("{} series has no points", kind)));
    }

    let series = points
        .iter()
        .enumerate()
        .map(|(idx, point)| normalize_point(point).ok_or_else(|| {
            NormalizationError::InvalidChart(format!("point {} is not {{x, y}} or {{name, value}}", idx))
        }))
        .collect::<Result<Vec<_>, _>>()?;

    let title = meta
        .and_then(|m| m.get("title"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let axis_labels = AxisLabels {
        x: meta.and_then(|m| axis_title(m, "xAxis")),
        y: meta.and_then(|m| axis_title(m, "yAxis")),
    };

    Ok(ChartData {
        kind,
        series,
        title,
        axis_labels,
    })
}

fn axis_title(meta: &Map<String, Value>, axis: &str) -> Option<String> {
    match meta.get(axis)? {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map.get("title").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

fn normalize_point(point: &Value) -> Option<ChartPoint> {
    let map = point.as_object()?;
    let label = ["x", "name", "label"].iter().find_map(|k| map.get(*k))?;
    let value = ["y", "value"].iter().find_map(|k| map.get(*k))?;

    let label = match label {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    let value = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    Some(ChartPoint { label, value })
}

fn normalize_table(value: &Value) -> Result<TableData, NormalizationError> {
    let map = value
        .as_object()
        .ok_or_else(|| NormalizationError::InvalidTable("table payload is not an object".into()))?;

    let headers = map
        .get("headers")
        .and_then(Value::as_array)
        .ok_or_else(|| NormalizationError::InvalidTable("missing headers array".into()))?
        .iter()
        .map(|h| h.as_str().map(str::to_string))
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| NormalizationError::InvalidTable("headers must be strings".into()))?;

    if headers.is_empty() {
        return Err(NormalizationError::InvalidTable("headers are empty".into()));
    }

    let raw_rows = map
        .get("rows")
        .and_then(Value::as_array)
        .ok_or_else(|| NormalizationError::InvalidTable("missing rows array".into()))?;

    let mut rows = Vec::with_capacity(raw_rows.len());
    for (idx, row) in raw_rows.iter().enumerate() {
        let cells = row
            .as_array()
            .ok_or_else(|| NormalizationError::InvalidTable(format!("row {} is not an array", idx)))?;
        if cells.len() != headers.len() {
            return Err(NormalizationError::InvalidTable(format!(
                "row {} has {} cells, expected {}",
                idx,
                cells.len(),
                headers.len()
            )));
        }
        let cells = cells
            .iter()
            .map(scalar_cell)
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| NormalizationError::InvalidTable(format!("row {} has a non-scalar cell", idx)))?;
        rows.push(cells);
    }

    Ok(TableData { headers, rows })
}

fn scalar_cell(value: &Value) -> Option<Cell> {
    match value {
        Value::String(s) => Some(Cell::Text(s.clone())),
        Value::Number(n) => n.as_f64().map(Cell::Number),
        Value::Bool(b) => Some(Cell::Bool(*b)),
        Value::Null => Some(Cell::Empty),
        Value::Array(_) | Value::Object(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_under_response() {
        let reply = normalize(&json!({"response": {"text": {"content": "a"}}}), "q").unwrap();
        assert_eq!(reply, Reply::text("a"));
    }

    #[test]
    fn test_table_under_analysis_response() {
        let raw = json!({"analysis": {"response": {"table": {"headers": ["h"], "rows": [["v"]]}}}});
        let reply = normalize(&raw, "show a table").unwrap();

        assert_eq!(reply.content, TABLE_CAPTION);
        assert_eq!(
            reply.body,
            MessageBody::Table(TableData {
                headers: vec!["h".into()],
                rows: vec![vec![Cell::Text("v".into())]],
            })
        );
    }

    #[test]
    fn test_unrecognized_payload() {
        for raw in [
            json!({"status": "success"}),
            json!({"response": {"answer": 42}}),
            json!({"analysis": {}}),
            json!(null),
            json!({"response": "   "}),
        ] {
            assert_eq!(normalize(&raw, "q"), Err(NormalizationError::NoRecognizablePayload));
        }
    }

    #[test]
    fn test_top_level_wins_over_nested() {
        let raw = json!({
            "text": "top",
            "response": {"text": "nested"},
        });
        assert_eq!(normalize(&raw, "q").unwrap().content, "top");
    }

    #[test]
    fn test_plain_string_payloads() {
        assert_eq!(normalize(&json!("42 rows"), "q").unwrap(), Reply::text("42 rows"));
        assert_eq!(
            normalize(&json!({"response": "The total is 5"}), "q").unwrap(),
            Reply::text("The total is 5")
        );
    }

    #[test]
    fn test_tagged_result_shape() {
        let raw = json!({
            "executed_code": "df['sales'].sum()",
            "result": {"type": "text", "data": "450"}
        });
        assert_eq!(normalize(&raw, "q").unwrap(), Reply::text("450"));

        let raw = json!({"result": {"type": "sparkline", "data": []}});
        assert_eq!(normalize(&raw, "q"), Err(NormalizationError::NoRecognizablePayload));
    }

    #[test]
    fn test_chart_default_hint_selects_series() {
        let raw = json!({"response": {
            "text": "Sales by product",
            "chart": {
                "default": "line",
                "bar": {"data": [{"x": "A", "y": 1}]},
                "line": {
                    "title": "Trend",
                    "xAxis": {"title": "Product"},
                    "yAxis": {"title": "Units"},
                    "data": [{"x": "A", "y": 100}, {"x": "B", "y": 150.5}]
                }
            }
        }});
        let reply = normalize(&raw, "chart please").unwrap();
        assert_eq!(reply.content, "Sales by product");

        let MessageBody::Chart(chart) = reply.body else {
            panic!("expected chart");
        };
        assert_eq!(chart.kind, ChartKind::Line);
        assert_eq!(chart.title, "Trend");
        assert_eq!(chart.axis_labels.x.as_deref(), Some("Product"));
        assert_eq!(chart.axis_labels.y.as_deref(), Some("Units"));
        assert_eq!(
            chart.series,
            vec![
                ChartPoint { label: "A".into(), value: 100.0 },
                ChartPoint { label: "B".into(), value: 150.5 },
            ]
        );
    }

    #[test]
    fn test_chart_without_usable_hint_takes_first_available() {
        let raw = json!({"chart": {
            "default": "area",
            "pie": {"data": [{"name": "North", "value": 3}]},
            "line": {"data": [{"name": "Q1", "value": "7.5"}]}
        }});
        let MessageBody::Chart(chart) = normalize(&raw, "q").unwrap().body else {
            panic!("expected chart");
        };
        assert_eq!(chart.kind, ChartKind::Line);
        assert_eq!(chart.series, vec![ChartPoint { label: "Q1".into(), value: 7.5 }]);
    }

    #[test]
    fn test_single_series_chart() {
        let raw = json!({"chart": {"type": "pie", "data": [{"name": "A", "value": 100}, {"x": 2024, "y": 3}]}});
        let reply = normalize(&raw, "q").unwrap();
        assert_eq!(reply.content, "Here's a pie chart of the data:");

        let MessageBody::Chart(chart) = reply.body else {
            panic!("expected chart");
        };
        assert_eq!(chart.kind, ChartKind::Pie);
        assert_eq!(chart.series[1], ChartPoint { label: "2024".into(), value: 3.0 });
    }

    #[test]
    fn test_chart_rejects_bad_points() {
        let raw = json!({"chart": {"bar": {"data": [{"x": "A", "y": "lots"}]}}});
        assert!(matches!(normalize(&raw, "q"), Err(NormalizationError::InvalidChart(_))));

        let raw = json!({"chart": {"bar": {"data": []}}});
        assert!(matches!(normalize(&raw, "q"), Err(NormalizationError::InvalidChart(_))));

        let raw = json!({"chart": {"default": "bar"}});
        assert!(matches!(normalize(&raw, "q"), Err(NormalizationError::InvalidChart(_))));
    }

    #[test]
    fn test_table_rejects_mismatched_rows() {
        let raw = json!({"table": {"headers": ["a", "b"], "rows": [[1, 2], [3]]}});
        assert!(matches!(normalize(&raw, "q"), Err(NormalizationError::InvalidTable(_))));

        let raw = json!({"table": {"headers": ["a"], "rows": [[1, 2]]}});
        assert!(matches!(normalize(&raw, "q"), Err(NormalizationError::InvalidTable(_))));
    }

    #[test]
    fn test_table_rejects_non_scalar_cells() {
        let raw = json!({"table": {"headers": ["a"], "rows": [[{"nested": true}]]}});
        assert!(matches!(normalize(&raw, "q"), Err(NormalizationError::InvalidTable(_))));
    }

    #[test]
    fn test_table_scalar_cells() {
        let raw = json!({"table": {"headers": ["name", "sales", "active", "note"], "rows": [["A", 100, true, null]]}});
        let MessageBody::Table(table) = normalize(&raw, "q").unwrap().body else {
            panic!("expected table");
        };
        assert_eq!(
            table.rows[0],
            vec![Cell::Text("A".into()), Cell::Number(100.0), Cell::Bool(true), Cell::Empty]
        );
    }

    #[test]
    fn test_present_but_invalid_path_does_not_fall_through() {
        let raw = json!({
            "response": {"table": {"headers": ["a"], "rows": [[1, 2]]}},
            "analysis": {"response": {"text": "fine"}}
        });
        assert!(matches!(normalize(&raw, "q"), Err(NormalizationError::InvalidTable(_))));
    }

    #[test]
    fn test_null_siblings_are_absent() {
        let raw = json!({"response": {"text": "Total is 450", "chart": null, "table": null}});
        assert_eq!(normalize(&raw, "q"), Ok(Reply::text("Total is 450")));

        let raw = json!({"response": {"text": null, "chart": null}, "analysis": {"response": {"text": "nested"}}});
        assert_eq!(normalize(&raw, "q"), Ok(Reply::text("nested")));
    }

    #[test]
    fn test_empty_text_is_invalid() {
        assert_eq!(normalize(&json!({"text": {"content": ""}}), "q"), Err(NormalizationError::InvalidText));
    }
}
