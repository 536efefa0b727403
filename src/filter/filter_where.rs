use std::cmp::Ordering;

use serde_json::{Map, Value};

use super::error::FilterError;
use super::types::{FilterOp, FilterWhereInfo};

#[derive(Debug, Clone)]
enum Condition {
    Field(FilterWhereInfo),
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
}

/// Parsed WHERE clause evaluated against in-memory rows
#[derive(Debug, Clone)]
pub struct FilterWhere {
    root: Condition,
}

impl FilterWhere {
    pub fn parse(where_data: &Value) -> Result<Self, FilterError> {
        Ok(Self { root: Self::parse_where_data(where_data)? })
    }

    pub fn validate(where_data: &Value) -> Result<(), FilterError> {
        Self::parse(where_data).map(|_| ())
    }

    /// Evaluate the clause against one row. Missing fields read as null.
    pub fn matches(&self, row: &Map<String, Value>) -> bool {
        Self::evaluate(&self.root, row)
    }

    fn parse_where_data(where_data: &Value) -> Result<Condition, FilterError> {
        match where_data {
            Value::Null => Ok(Condition::And(vec![])),
            Value::Object(obj) => {
                let mut conditions = Vec::with_capacity(obj.len());
                for (key, value) in obj {
                    if key.starts_with('$') {
                        conditions.push(Self::parse_logical_operator(key, value)?);
                    } else {
                        conditions.extend(Self::parse_field_condition(key, value)?);
                    }
                }
                Ok(Condition::And(conditions))
            }
            Value::String(_) => Err(FilterError::InvalidWhereClause(
                "raw predicates are not supported".to_string(),
            )),
            _ => Err(FilterError::InvalidWhereClause("WHERE must be an object".to_string())),
        }
    }

    fn parse_logical_operator(op: &str, value: &Value) -> Result<Condition, FilterError> {
        match op {
            "$and" | "$or" => {
                let arr = value
                    .as_array()
                    .ok_or_else(|| FilterError::InvalidOperatorData(format!("{} requires array", op)))?;
                let parts = arr
                    .iter()
                    .map(Self::parse_where_data)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(if op == "$and" { Condition::And(parts) } else { Condition::Or(parts) })
            }
            "$not" => Ok(Condition::Not(Box::new(Self::parse_where_data(value)?))),
            _ => Err(FilterError::UnsupportedOperator(op.to_string())),
        }
    }

    fn parse_field_condition(field: &str, value: &Value) -> Result<Vec<Condition>, FilterError> {
        let column = if field == "pk" { "id".to_string() } else { field.to_string() };

        let Value::Object(obj) = value else {
            // Implicit equality: { field: value }
            return Ok(vec![Condition::Field(FilterWhereInfo {
                column,
                operator: FilterOp::Eq,
                data: value.clone(),
            })]);
        };

        let mut out = Vec::with_capacity(obj.len());
        for (op_key, op_val) in obj {
            let operator = FilterOp::parse(op_key)
                .ok_or_else(|| FilterError::UnsupportedOperator(op_key.clone()))?;
            Self::validate_operator_data(operator, op_val)?;
            out.push(Condition::Field(FilterWhereInfo {
                column: column.clone(),
                operator,
                data: op_val.clone(),
            }));
        }
        Ok(out)
    }

    fn validate_operator_data(operator: FilterOp, data: &Value) -> Result<(), FilterError> {
        match operator {
            FilterOp::In | FilterOp::NIn if !data.is_array() => Err(FilterError::InvalidOperatorData(
                "$in/$nin require an array".to_string(),
            )),
            FilterOp::Between => match data.as_array() {
                Some(values) if values.len() == 2 => Ok(()),
                _ => Err(FilterError::InvalidOperatorData(
                    "$between requires exactly 2 values".to_string(),
                )),
            },
            FilterOp::Like | FilterOp::NLike | FilterOp::ILike | FilterOp::NILike if !data.is_string() => {
                Err(FilterError::InvalidOperatorData("LIKE patterns must be strings".to_string()))
            }
            FilterOp::Exists | FilterOp::Null if !data.is_boolean() => Err(FilterError::InvalidOperatorData(
                "$exists/$null require a boolean".to_string(),
            )),
            _ => Ok(()),
        }
    }

    fn evaluate(condition: &Condition, row: &Map<String, Value>) -> bool {
        match condition {
            Condition::And(parts) => parts.iter().all(|c| Self::evaluate(c, row)),
            Condition::Or(parts) => parts.iter().any(|c| Self::evaluate(c, row)),
            Condition::Not(inner) => !Self::evaluate(inner, row),
            Condition::Field(info) => Self::evaluate_field(info, row),
        }
    }

    fn evaluate_field(info: &FilterWhereInfo, row: &Map<String, Value>) -> bool {
        let value = row.get(&info.column).unwrap_or(&Value::Null);
        let data = &info.data;

        match info.operator {
            FilterOp::Eq => values_equal(value, data),
            FilterOp::Ne => !values_equal(value, data),
            FilterOp::Gt => compare_values(value, data) == Some(Ordering::Greater),
            FilterOp::Gte => matches!(compare_values(value, data), Some(Ordering::Greater | Ordering::Equal)),
            FilterOp::Lt => compare_values(value, data) == Some(Ordering::Less),
            FilterOp::Lte => matches!(compare_values(value, data), Some(Ordering::Less | Ordering::Equal)),
            FilterOp::Like => like(value, data, false),
            FilterOp::NLike => !like(value, data, false),
            FilterOp::ILike => like(value, data, true),
            FilterOp::NILike => !like(value, data, true),
            FilterOp::In => data.as_array().is_some_and(|values| values.iter().any(|v| values_equal(value, v))),
            FilterOp::NIn => !data.as_array().is_some_and(|values| values.iter().any(|v| values_equal(value, v))),
            FilterOp::Between => match data.as_array().map(Vec::as_slice) {
                Some([low, high]) => {
                    matches!(compare_values(value, low), Some(Ordering::Greater | Ordering::Equal))
                        && matches!(compare_values(value, high), Some(Ordering::Less | Ordering::Equal))
                }
                _ => false,
            },
            FilterOp::Exists => row.contains_key(&info.column) == data.as_bool().unwrap_or(true),
            FilterOp::Null => value.is_null() == data.as_bool().unwrap_or(true),
        }
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn like(value: &Value, pattern: &Value, case_insensitive: bool) -> bool {
    let (Some(text), Some(pattern)) = (value.as_str(), pattern.as_str()) else {
        return false;
    };
    if case_insensitive {
        like_match(&text.to_lowercase(), &pattern.to_lowercase())
    } else {
        like_match(text, pattern)
    }
}

/// SQL LIKE: `%` matches any run, `_` matches one character
fn like_match(text: &str, pattern: &str) -> bool {
    let t: Vec<char> = text.chars().collect();
    let p: Vec<char> = pattern.chars().collect();
    let (mut ti, mut pi) = (0, 0);
    let mut star: Option<usize> = None;
    let mut mark = 0;

    while ti < t.len() {
        if pi < p.len() && p[pi] != '%' && (p[pi] == '_' || p[pi] == t[ti]) {
            ti += 1;
            pi += 1;
        } else if pi < p.len() && p[pi] == '%' {
            star = Some(pi);
            mark = ti;
            pi += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            mark += 1;
            ti = mark;
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '%' {
        pi += 1;
    }
    pi == p.len()
}
