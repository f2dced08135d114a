//! Declarations of root entities and their child relations

use serde_json::{Map, Value};

use crate::db::{Query, Row};

/// Top-level entity driving one document per row
#[derive(Debug, Clone, Copy)]
pub struct RootSpec {
    pub query: Query,
    /// Column holding the primary key that child queries filter on
    pub key_column: &'static str,
}

/// How many rows a relation contributes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// Ordered array, possibly empty
    Many,
    /// Single object, or null when the fetch returns nothing
    One,
}

/// How fetched rows are attached to the document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationShape {
    /// Rows attached as-is
    Rows,
    /// `{name, value}` rows folded into one object keyed by name
    Pivot {
        name_column: &'static str,
        value_column: &'static str,
    },
}

/// A foreign-key-linked child collection
///
/// The query takes the root key as `$1`; its `ORDER BY` fixes the order of
/// the attached rows.
#[derive(Debug, Clone, Copy)]
pub struct RelationSpec {
    pub name: &'static str,
    pub query: Query,
    pub cardinality: Cardinality,
    pub shape: RelationShape,
    /// A failed fetch of a required relation excludes the whole document
    pub required: bool,
}

impl RelationSpec {
    /// One-to-many relation
    pub const fn many(name: &'static str, query: Query) -> Self {
        RelationSpec {
            name,
            query,
            cardinality: Cardinality::Many,
            shape: RelationShape::Rows,
            required: true,
        }
    }

    /// One-to-one relation (e.g. an aggregate)
    pub const fn one(name: &'static str, query: Query) -> Self {
        RelationSpec {
            name,
            query,
            cardinality: Cardinality::One,
            shape: RelationShape::Rows,
            required: true,
        }
    }

    /// Key/value relation folded into a flat object
    pub const fn pivot(
        name: &'static str,
        query: Query,
        name_column: &'static str,
        value_column: &'static str,
    ) -> Self {
        RelationSpec {
            name,
            query,
            cardinality: Cardinality::Many,
            shape: RelationShape::Pivot { name_column, value_column },
            required: true,
        }
    }

    /// Fall back to the empty value instead of failing the document
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Value attached when the relation has no rows
    pub fn empty_value(&self) -> Value {
        match (self.shape, self.cardinality) {
            (RelationShape::Pivot { .. }, _) => Value::Object(Map::new()),
            (RelationShape::Rows, Cardinality::Many) => Value::Array(Vec::new()),
            (RelationShape::Rows, Cardinality::One) => Value::Null,
        }
    }

    /// Shape fetched rows into the value stored under [`RelationSpec::name`]
    pub fn assemble(&self, rows: Vec<Row>) -> Value {
        match self.shape {
            RelationShape::Pivot { name_column, value_column } => {
                Value::Object(pivot(&rows, name_column, value_column))
            }
            RelationShape::Rows => match self.cardinality {
                Cardinality::Many => Value::Array(rows.into_iter().map(Value::Object).collect()),
                Cardinality::One => rows
                    .into_iter()
                    .next()
                    .map(Value::Object)
                    .unwrap_or(Value::Null),
            },
        }
    }
}

/// Fold `{name, value}` rows into one object
///
/// A repeated name keeps its last value at the position it was first seen.
/// Rows with a null or missing name are skipped, and non-string names use
/// their JSON text.
pub fn pivot(rows: &[Row], name_column: &str, value_column: &str) -> Map<String, Value> {
    let mut out = Map::new();
    for row in rows {
        let name = match row.get(name_column) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => continue,
            Some(other) => other.to_string(),
        };
        let value = row.get(value_column).cloned().unwrap_or(Value::Null);
        out.insert(name, value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const Q: Query = Query::new("test", "SELECT 1");

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => panic!("row must be an object"),
        }
    }

    #[test]
    fn test_pivot_last_write_wins() {
        let rows = vec![
            row(json!({"attribute_name": "a", "attribute_value": "1"})),
            row(json!({"attribute_name": "a", "attribute_value": "2"})),
        ];
        let folded = pivot(&rows, "attribute_name", "attribute_value");
        assert_eq!(Value::Object(folded), json!({"a": "2"}));
    }

    #[test]
    fn test_pivot_skips_null_names_and_keeps_null_values() {
        let rows = vec![
            row(json!({"attribute_name": null, "attribute_value": "x"})),
            row(json!({"attribute_name": "origin", "attribute_value": null})),
            row(json!({"attribute_name": 7, "attribute_value": "seven"})),
        ];
        let folded = pivot(&rows, "attribute_name", "attribute_value");
        assert_eq!(Value::Object(folded), json!({"origin": null, "7": "seven"}));
    }

    #[test]
    fn test_empty_values_per_shape() {
        assert_eq!(RelationSpec::many("variants", Q).empty_value(), json!([]));
        assert_eq!(RelationSpec::one("order_summary", Q).empty_value(), json!(null));
        assert_eq!(
            RelationSpec::pivot("attributes", Q, "n", "v").empty_value(),
            json!({})
        );
    }

    #[test]
    fn test_assemble_empty_rows_matches_empty_value() {
        for spec in [
            RelationSpec::many("variants", Q),
            RelationSpec::one("order_summary", Q),
            RelationSpec::pivot("attributes", Q, "n", "v"),
        ] {
            assert_eq!(spec.assemble(Vec::new()), spec.empty_value());
        }
    }

    #[test]
    fn test_assemble_one_takes_first_row() {
        let spec = RelationSpec::one("order_summary", Q);
        let value = spec.assemble(vec![
            row(json!({"total_orders": 3})),
            row(json!({"total_orders": 9})),
        ]);
        assert_eq!(value, json!({"total_orders": 3}));
    }

    #[test]
    fn test_assemble_many_keeps_row_order() {
        let spec = RelationSpec::many("variants", Q);
        let value = spec.assemble(vec![row(json!({"sku": "B"})), row(json!({"sku": "A"}))]);
        assert_eq!(value, json!([{"sku": "B"}, {"sku": "A"}]));
    }

    #[test]
    fn test_optional_flag() {
        assert!(RelationSpec::many("variants", Q).required);
        assert!(!RelationSpec::many("variants", Q).optional().required);
    }
}
