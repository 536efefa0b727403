use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    #[serde(rename = "$eq")] Eq,
    #[serde(rename = "$ne")] Ne,
    #[serde(rename = "$gt")] Gt,
    #[serde(rename = "$gte")] Gte,
    #[serde(rename = "$lt")] Lt,
    #[serde(rename = "$lte")] Lte,

    #[serde(rename = "$like")] Like,
    #[serde(rename = "$nlike")] NLike,
    #[serde(rename = "$ilike")] ILike,
    #[serde(rename = "$nilike")] NILike,

    #[serde(rename = "$in")] In,
    #[serde(rename = "$nin")] NIn,

    #[serde(rename = "$between")] Between,

    #[serde(rename = "$exists")] Exists,
    #[serde(rename = "$null")] Null,
}

impl FilterOp {
    pub fn parse(op_key: &str) -> Option<Self> {
        Some(match op_key {
            "$eq" => FilterOp::Eq,
            "$ne" | "$neq" => FilterOp::Ne,
            "$gt" => FilterOp::Gt,
            "$gte" => FilterOp::Gte,
            "$lt" => FilterOp::Lt,
            "$lte" => FilterOp::Lte,
            "$like" => FilterOp::Like,
            "$nlike" => FilterOp::NLike,
            "$ilike" => FilterOp::ILike,
            "$nilike" => FilterOp::NILike,
            "$in" => FilterOp::In,
            "$nin" => FilterOp::NIn,
            "$between" => FilterOp::Between,
            "$exists" => FilterOp::Exists,
            "$null" => FilterOp::Null,
            _ => return None,
        })
    }
}

/// Serializable snapshot of a queryset's filter state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterData {
    pub where_clause: Option<serde_json::Value>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    #[serde(default)]
    pub empty: bool,
}

#[derive(Debug, Clone)]
pub struct FilterWhereInfo {
    pub column: String,
    pub operator: FilterOp,
    pub data: serde_json::Value,
}
