//! Query filters
//!
//! The filter element accepted by the count and query endpoints, e.g.
//! `{"op": "gte", "field": "createDate", "value": "2024-01-01T00:00:00Z"}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Comparison operator for a [`QueryFilter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterOp {
    Eq,
    #[serde(rename = "noteq")]
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
    BeginsWith,
    EndsWith,
    Contains,
    Exist,
    NotExist,
    In,
    NotIn,
}

impl FilterOp {
    /// Whether the operator bounds a value by comparison, i.e. can narrow a
    /// date field to a range
    pub fn is_range(self) -> bool {
        matches!(
            self,
            FilterOp::Eq | FilterOp::Gt | FilterOp::Gte | FilterOp::Lt | FilterOp::Lte
        )
    }

    /// Whether the operator takes no value
    pub fn is_unary(self) -> bool {
        matches!(self, FilterOp::Exist | FilterOp::NotExist)
    }
}

impl std::fmt::Display for FilterOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FilterOp::Eq => "eq",
            FilterOp::NotEq => "noteq",
            FilterOp::Gt => "gt",
            FilterOp::Gte => "gte",
            FilterOp::Lt => "lt",
            FilterOp::Lte => "lte",
            FilterOp::BeginsWith => "beginsWith",
            FilterOp::EndsWith => "endsWith",
            FilterOp::Contains => "contains",
            FilterOp::Exist => "exist",
            FilterOp::NotExist => "notExist",
            FilterOp::In => "in",
            FilterOp::NotIn => "notIn",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for FilterOp {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "eq" | "=" => Ok(FilterOp::Eq),
            "noteq" | "ne" | "!=" => Ok(FilterOp::NotEq),
            "gt" | ">" => Ok(FilterOp::Gt),
            "gte" | ">=" => Ok(FilterOp::Gte),
            "lt" | "<" => Ok(FilterOp::Lt),
            "lte" | "<=" => Ok(FilterOp::Lte),
            "beginswith" => Ok(FilterOp::BeginsWith),
            "endswith" => Ok(FilterOp::EndsWith),
            "contains" => Ok(FilterOp::Contains),
            "exist" | "exists" => Ok(FilterOp::Exist),
            "notexist" => Ok(FilterOp::NotExist),
            "in" => Ok(FilterOp::In),
            "notin" => Ok(FilterOp::NotIn),
            _ => Err(format!("Unknown filter operator: {}", s)),
        }
    }
}

/// A single filter condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryFilter {
    pub op: FilterOp,
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl QueryFilter {
    /// Create a filter with a value
    pub fn new(field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        Self {
            op,
            field: field.into(),
            value: Some(value.into()),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::Eq, value)
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::Gte, value)
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::Lt, value)
    }

    /// Match every record that has `field` set
    pub fn exist(field: impl Into<String>) -> Self {
        Self {
            op: FilterOp::Exist,
            field: field.into(),
            value: None,
        }
    }

    /// Parse a `field:op:value` expression
    ///
    /// The value is read as JSON when it parses (numbers, booleans, quoted
    /// strings), otherwise as a plain string. `in`/`notIn` split on commas.
    /// Unary operators take no value: `field:exist`.
    pub fn parse(expr: &str) -> Result<Self> {
        let mut parts = expr.splitn(3, ':');
        let field = parts.next().unwrap_or_default().trim();
        let op = parts.next().map(str::trim).unwrap_or_default();
        let raw_value = parts.next();

        if field.is_empty() || op.is_empty() {
            return Err(Error::validation(format!(
                "Filter must look like field:op:value, got {:?}",
                expr
            )));
        }

        let op: FilterOp = op.parse().map_err(Error::validation)?;

        if op.is_unary() {
            return Ok(Self {
                op,
                field: field.to_string(),
                value: None,
            });
        }

        let raw_value = raw_value.ok_or_else(|| {
            Error::validation(format!("Filter {:?} is missing a value", expr))
        })?;

        let value = match op {
            FilterOp::In | FilterOp::NotIn => Value::Array(
                raw_value
                    .split(',')
                    .map(|item| parse_scalar(item.trim()))
                    .collect(),
            ),
            _ => parse_scalar(raw_value),
        };

        Ok(Self {
            op,
            field: field.to_string(),
            value: Some(value),
        })
    }
}

impl std::str::FromStr for QueryFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn parse_scalar(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) if !value.is_object() && !value.is_array() => value,
        _ => Value::String(raw.to_string()),
    }
}

/// Whether a query asks for the most recent records
///
/// A query is "latest-N" when nothing constrains its date field, so the
/// caller wants whatever happened most recently rather than a fixed range.
pub fn is_latest_query(filters: &[QueryFilter], date_field: &str) -> bool {
    !filters
        .iter()
        .any(|f| f.field.eq_ignore_ascii_case(date_field) && f.op.is_range())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_serializes_like_the_api() {
        let filter = QueryFilter::gte("createDate", "2024-01-01T00:00:00Z");
        assert_eq!(
            serde_json::to_value(&filter).unwrap(),
            json!({"op": "gte", "field": "createDate", "value": "2024-01-01T00:00:00Z"})
        );

        let exist = QueryFilter::exist("id");
        assert_eq!(
            serde_json::to_value(&exist).unwrap(),
            json!({"op": "exist", "field": "id"})
        );
    }

    #[test]
    fn test_filter_op_names() {
        assert_eq!(serde_json::to_value(FilterOp::NotEq).unwrap(), json!("noteq"));
        assert_eq!(serde_json::to_value(FilterOp::BeginsWith).unwrap(), json!("beginsWith"));
        assert_eq!(FilterOp::NotExist.to_string(), "notExist");
        assert_eq!("GTE".parse::<FilterOp>().unwrap(), FilterOp::Gte);
        assert!("between".parse::<FilterOp>().is_err());
    }

    #[test]
    fn test_parse_typed_values() {
        let status = QueryFilter::parse("status:eq:1").unwrap();
        assert_eq!(status.value, Some(json!(1)));

        let title = QueryFilter::parse("title:contains:printer").unwrap();
        assert_eq!(title.value, Some(json!("printer")));

        let flag = QueryFilter::parse("isActive:eq:true").unwrap();
        assert_eq!(flag.value, Some(json!(true)));
    }

    #[test]
    fn test_parse_keeps_colons_in_value() {
        let filter = QueryFilter::parse("createDate:gte:2024-01-01T00:00:00Z").unwrap();
        assert_eq!(filter.op, FilterOp::Gte);
        assert_eq!(filter.value, Some(json!("2024-01-01T00:00:00Z")));
    }

    #[test]
    fn test_parse_list_and_unary() {
        let filter = QueryFilter::parse("queueID:in:5,8,29682833").unwrap();
        assert_eq!(filter.value, Some(json!([5, 8, 29682833])));

        let filter = QueryFilter::parse("completedDate:notExist").unwrap();
        assert_eq!(filter.op, FilterOp::NotExist);
        assert!(filter.value.is_none());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(QueryFilter::parse("status").is_err());
        assert!(QueryFilter::parse("status:eq").is_err());
        assert!(QueryFilter::parse("status:like:x").is_err());
    }

    #[test]
    fn test_is_latest_query() {
        let open = vec![QueryFilter::eq("status", 1)];
        assert!(is_latest_query(&open, "createDate"));

        let bounded = vec![
            QueryFilter::eq("status", 1),
            QueryFilter::gte("createdate", "2024-01-01T00:00:00Z"),
        ];
        assert!(!is_latest_query(&bounded, "createDate"));

        let exists_only = vec![QueryFilter::exist("createDate")];
        assert!(is_latest_query(&exists_only, "createDate"));
    }
}
