use std::collections::HashMap;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::table::RecordTable;

#[derive(Debug, Error)]
pub enum FlattenError {
    #[error("record {index} is not a JSON object (found {kind})")]
    NotAnObject { index: usize, kind: &'static str },
}

/// Converts a batch of JSON records into a single table with one row per record.
///
/// Nested objects become dotted column names (`address.geolocation.lat`), arrays
/// are kept as compact JSON text, and `null` becomes a null cell. Columns appear
/// in the order they are first seen across the batch.
pub fn flatten_records(records: &[Value]) -> Result<RecordTable, FlattenError> {
    let mut columns: Vec<String> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut flat_rows: Vec<Vec<(usize, Option<String>)>> = Vec::with_capacity(records.len());

    for (index, record) in records.iter().enumerate() {
        let Value::Object(map) = record else {
            return Err(FlattenError::NotAnObject {
                index,
                kind: value_kind(record),
            });
        };

        let mut cells = Vec::new();
        flatten_object(map, None, &mut cells);

        let mut row = Vec::with_capacity(cells.len());
        for (name, cell) in cells {
            let position = match positions.get(&name) {
                Some(&position) => position,
                None => {
                    let position = columns.len();
                    positions.insert(name.clone(), position);
                    columns.push(name);
                    position
                }
            };
            row.push((position, cell));
        }
        flat_rows.push(row);
    }

    let width = columns.len();
    let mut table = RecordTable::new(columns);
    for sparse in flat_rows {
        let mut row = vec![None; width];
        for (position, cell) in sparse {
            row[position] = cell;
        }
        table.rows.push(row);
    }
    Ok(table)
}

/// Accepts either a JSON array of records or a single record.
pub fn records_from_body(body: Value) -> Vec<Value> {
    match body {
        Value::Array(items) => items,
        other => vec![other],
    }
}

fn flatten_object(
    map: &Map<String, Value>,
    prefix: Option<&str>,
    out: &mut Vec<(String, Option<String>)>,
) {
    for (key, value) in map {
        let name = match prefix {
            Some(prefix) => format!("{prefix}.{key}"),
            None => key.clone(),
        };

        match value {
            Value::Object(nested) => flatten_object(nested, Some(&name), out),
            Value::Null => out.push((name, None)),
            Value::String(text) => out.push((name, Some(text.clone()))),
            Value::Array(_) | Value::Bool(_) | Value::Number(_) => {
                out.push((name, Some(value.to_string())))
            }
        }
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn nested_objects_become_dotted_columns() {
        let records = vec![json!({
            "id": 1,
            "email": "john@gmail.com",
            "address": {
                "city": "kilcoole",
                "geolocation": { "lat": "-37.3159", "long": "81.1496" }
            },
            "name": { "firstname": "john", "lastname": "doe" }
        })];

        let table = flatten_records(&records).expect("flatten");
        assert_eq!(
            table.columns,
            vec![
                "id",
                "email",
                "address.city",
                "address.geolocation.lat",
                "address.geolocation.long",
                "name.firstname",
                "name.lastname",
            ]
        );
        assert_eq!(table.rows[0][0].as_deref(), Some("1"));
        assert_eq!(table.rows[0][3].as_deref(), Some("-37.3159"));
    }

    #[test]
    fn later_records_append_new_columns_and_leave_gaps_null() {
        let records = vec![
            json!({ "id": 1, "title": "Backpack" }),
            json!({ "id": 2, "rating": { "rate": 3.9 }, "title": null }),
        ];

        let table = flatten_records(&records).expect("flatten");
        assert_eq!(table.columns, vec!["id", "title", "rating.rate"]);
        assert_eq!(
            table.rows,
            vec![
                vec![Some("1".into()), Some("Backpack".into()), None],
                vec![Some("2".into()), None, Some("3.9".into())],
            ]
        );
    }

    #[test]
    fn arrays_are_kept_as_json_text() {
        let records = vec![json!({
            "id": 5,
            "products": [{ "productId": 1, "quantity": 4 }]
        })];

        let table = flatten_records(&records).expect("flatten");
        assert_eq!(
            table.rows[0][1].as_deref(),
            Some(r#"[{"productId":1,"quantity":4}]"#)
        );
    }

    #[test]
    fn scalar_records_are_rejected() {
        let err = flatten_records(&[json!({ "id": 1 }), json!(7)]).expect_err("scalar");
        assert!(matches!(err, FlattenError::NotAnObject { index: 1, kind: "number" }));
    }

    #[test]
    fn single_object_body_is_one_record() {
        assert_eq!(records_from_body(json!({ "id": 1 })).len(), 1);
        assert_eq!(records_from_body(json!([{ "id": 1 }, { "id": 2 }])).len(), 2);
    }
}
