use serde_json::{json, Map, Value};

use super::error::FilterError;
use super::filter_where::FilterWhere;
use super::types::FilterData;

/// Filtering state of a queryset: WHERE clause, slice and the `none()` flag.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    where_data: Option<Value>,
    compiled: Option<FilterWhere>,
    limit: Option<usize>,
    offset: Option<usize>,
    empty: bool,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&mut self, data: FilterData) -> Result<&mut Self, FilterError> {
        self.set_where(data.where_clause)?;
        self.limit = data.limit;
        self.offset = data.offset;
        self.empty = data.empty;
        Ok(self)
    }

    /// Replace the WHERE clause outright (`None` matches every row)
    pub fn set_where(&mut self, conditions: Option<Value>) -> Result<&mut Self, FilterError> {
        let compiled = match conditions {
            Some(ref c) if !c.is_null() => Some(FilterWhere::parse(c)?),
            _ => None,
        };
        self.where_data = conditions.filter(|c| !c.is_null());
        self.compiled = compiled;
        Ok(self)
    }

    /// AND a clause onto the existing one
    pub fn narrow(&mut self, conditions: Value) -> Result<&mut Self, FilterError> {
        FilterWhere::validate(&conditions)?;
        let combined = match self.where_data.take() {
            Some(existing) => json!({ "$and": [existing, conditions] }),
            None => conditions,
        };
        self.set_where(Some(combined))
    }

    pub fn exclude(&mut self, conditions: Value) -> Result<&mut Self, FilterError> {
        self.narrow(json!({ "$not": conditions }))
    }

    /// Slice the current selection. Slicing again takes a slice of the slice.
    pub fn slice(&mut self, offset: usize, limit: Option<usize>) -> Result<&mut Self, FilterError> {
        if limit == Some(0) && offset > 0 {
            return Err(FilterError::InvalidSlice("empty slice with an offset".to_string()));
        }
        let limit = match (self.limit, limit) {
            (None, limit) => limit,
            (Some(current), None) => Some(current.saturating_sub(offset)),
            (Some(current), Some(limit)) => Some(limit.min(current.saturating_sub(offset))),
        };
        let offset = self.offset.unwrap_or(0).saturating_add(offset);
        self.offset = if offset > 0 { Some(offset) } else { None };
        self.limit = limit;
        Ok(self)
    }

    pub fn set_empty(&mut self, empty: bool) -> &mut Self {
        self.empty = empty;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn is_sliced(&self) -> bool {
        self.limit.is_some() || self.offset.is_some()
    }

    pub fn where_clause(&self) -> Option<&Value> {
        self.where_data.as_ref()
    }

    pub fn matches(&self, row: &Map<String, Value>) -> bool {
        if self.empty {
            return false;
        }
        self.compiled.as_ref().map_or(true, |w| w.matches(row))
    }

    /// Apply offset and limit to rows already filtered and ordered
    pub fn apply_slice<T>(&self, rows: Vec<T>) -> Vec<T> {
        let offset = self.offset.unwrap_or(0);
        let iter = rows.into_iter().skip(offset);
        match self.limit {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        }
    }

    pub fn data(&self) -> FilterData {
        FilterData {
            where_clause: self.where_data.clone(),
            limit: self.limit,
            offset: self.offset,
            empty: self.empty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn narrow_ands_clauses() {
        let mut filter = Filter::new();
        filter.narrow(json!({"username": "test1"})).unwrap();
        filter.narrow(json!({"last_name": "John"})).unwrap();

        assert!(filter.matches(&row(json!({"username": "test1", "last_name": "John"}))));
        assert!(!filter.matches(&row(json!({"username": "test1"}))));
        assert_eq!(
            filter.where_clause(),
            Some(&json!({"$and": [{"username": "test1"}, {"last_name": "John"}]}))
        );
    }

    #[test]
    fn invalid_narrow_leaves_filter_untouched() {
        let mut filter = Filter::new();
        filter.narrow(json!({"username": "test1"})).unwrap();
        assert!(filter.narrow(json!({"id": {"$bogus": 1}})).is_err());
        assert_eq!(filter.where_clause(), Some(&json!({"username": "test1"})));
    }

    #[test]
    fn empty_filter_matches_nothing() {
        let mut filter = Filter::new();
        assert!(filter.matches(&row(json!({"id": 1}))));
        filter.set_empty(true);
        assert!(!filter.matches(&row(json!({"id": 1}))));
    }

    #[test]
    fn slice_applies_offset_and_limit() {
        let mut filter = Filter::new();
        filter.slice(1, Some(2)).unwrap();
        assert!(filter.is_sliced());
        assert_eq!(filter.apply_slice(vec![1, 2, 3, 4]), vec![2, 3]);
    }

    #[test]
    fn chained_slices_compose() {
        let mut filter = Filter::new();
        filter.slice(1, Some(3)).unwrap();
        filter.slice(1, Some(5)).unwrap();
        assert_eq!(filter.apply_slice(vec![1, 2, 3, 4, 5, 6]), vec![3, 4]);

        // an open-ended second slice stays inside the first
        let mut filter = Filter::new();
        filter.slice(0, Some(4)).unwrap();
        filter.slice(2, None).unwrap();
        assert_eq!(filter.apply_slice(vec![1, 2, 3, 4, 5, 6]), vec![3, 4]);
    }

    #[test]
    fn assign_round_trips_data() {
        let mut filter = Filter::new();
        let data = FilterData {
            where_clause: Some(json!({"id": 1})),
            limit: Some(5),
            offset: None,
            empty: false,
        };
        filter.assign(data.clone()).unwrap();
        assert_eq!(filter.data(), data);
    }
}
