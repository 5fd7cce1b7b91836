//! Conversion of Genie query results into chart specs.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Bar chart spec consumed by the chat UI's chart component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Vec<Map<String, Value>>,
    #[serde(rename = "xKey")]
    pub x_key: String,
    #[serde(rename = "yKey")]
    pub y_key: String,
    #[serde(rename = "dataKey")]
    pub data_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TablePreview {
    pub columns: Vec<String>,
    pub rows: Vec<Value>,
}

/// Response of `POST /api/genie/chart`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartHydration {
    pub spec: ChartSpec,
    pub table: Option<TablePreview>,
}

fn statement(result: &Value) -> Result<&Value> {
    result
        .get("statement_response")
        .filter(|v| !v.is_null())
        .ok_or_else(|| Error::Lookup("no statement_response in query result".to_string()))
}

fn column_names(statement: &Value) -> Vec<String> {
    statement
        .pointer("/manifest/schema/columns")
        .and_then(Value::as_array)
        .map(|cols| {
            cols.iter()
                .map(|c| c.get("name").and_then(Value::as_str).unwrap_or_default().to_string())
                .collect()
        })
        .unwrap_or_default()
}

fn data_rows(statement: &Value) -> &[Value] {
    statement
        .pointer("/result/data_array")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Build a bar chart spec: first column on the x axis, second (or the only
/// one) as the value.
pub fn to_chart_spec(result: &Value) -> Result<ChartSpec> {
    let statement = statement(result)?;
    let columns = column_names(statement);
    if columns.is_empty() {
        return Err(Error::Lookup("no columns found in query result".to_string()));
    }

    let data: Vec<Map<String, Value>> = data_rows(statement)
        .iter()
        .map(|row| {
            let cells = row.as_array();
            columns
                .iter()
                .enumerate()
                .map(|(idx, col)| {
                    let cell = cells.and_then(|c| c.get(idx)).cloned().unwrap_or(Value::Null);
                    (col.clone(), cell)
                })
                .collect()
        })
        .collect();

    let x_key = columns[0].clone();
    let y_key = columns.get(1).unwrap_or(&columns[0]).clone();
    if columns.len() < 2 {
        tracing::warn!(column = %x_key, "Single column query result charted against itself");
    }
    tracing::debug!(rows = data.len(), columns = columns.len(), "Built chart spec");

    Ok(ChartSpec {
        kind: "bar".to_string(),
        data,
        x_key,
        data_key: y_key.clone(),
        y_key,
    })
}

/// First `limit` rows of the result, or `None` when there is no statement.
pub fn table_preview(result: &Value, limit: usize) -> Option<TablePreview> {
    let statement = statement(result).ok()?;
    Some(TablePreview {
        columns: column_names(statement),
        rows: data_rows(statement).iter().take(limit).cloned().collect(),
    })
}

pub fn hydrate(result: &Value, preview_limit: usize) -> Result<ChartHydration> {
    Ok(ChartHydration {
        spec: to_chart_spec(result)?,
        table: table_preview(result, preview_limit),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result(columns: &[&str], rows: Value) -> Value {
        json!({
            "statement_response": {
                "manifest": {"schema": {"columns": columns.iter().map(|c| json!({"name": c})).collect::<Vec<_>>()}},
                "result": {"data_array": rows}
            }
        })
    }

    #[test]
    fn two_columns_make_a_bar_chart() {
        let spec = to_chart_spec(&result(
            &["region", "revenue"],
            json!([["EMEA", "10"], ["APAC", "7"]]),
        ))
        .unwrap();
        assert_eq!(spec.kind, "bar");
        assert_eq!(spec.x_key, "region");
        assert_eq!(spec.y_key, "revenue");
        assert_eq!(spec.data_key, "revenue");
        assert_eq!(spec.data[1]["region"], "APAC");

        let v = serde_json::to_value(&spec).unwrap();
        assert_eq!(v["xKey"], "region");
        assert_eq!(v["dataKey"], "revenue");
    }

    #[test]
    fn single_column_and_short_rows() {
        let spec = to_chart_spec(&result(&["total"], json!([["5"]]))).unwrap();
        assert_eq!(spec.x_key, "total");
        assert_eq!(spec.y_key, "total");

        let spec = to_chart_spec(&result(&["a", "b"], json!([["1"]]))).unwrap();
        assert!(spec.data[0]["b"].is_null());
    }

    #[test]
    fn missing_statement_or_columns_is_an_error() {
        assert!(to_chart_spec(&json!({})).is_err());
        assert!(to_chart_spec(&result(&[], json!([]))).is_err());
        assert!(table_preview(&json!({}), 10).is_none());
    }

    #[test]
    fn preview_is_limited() {
        let rows: Vec<Value> = (0..150).map(|i| json!([i.to_string(), "x"])).collect();
        let h = hydrate(&result(&["n", "v"], Value::Array(rows)), 100).unwrap();
        let table = h.table.unwrap();
        assert_eq!(table.rows.len(), 100);
        assert_eq!(table.columns, vec!["n", "v"]);
        assert_eq!(h.spec.data.len(), 150);
    }
}
