//! Query Result Wrapper
//!
//! Opaque wrapper around a query's JSON payload. Displays as indented,
//! key-sorted JSON so two identical results always print identically.

use serde_json::Value;

/// One successful query's response body.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    data: Value,
}

impl QueryResult {
    pub fn new(data: Value) -> Self {
        Self { data }
    }

    /// Borrow the raw JSON payload.
    pub fn json(&self) -> &Value {
        &self.data
    }

    /// Take ownership of the raw JSON payload.
    pub fn into_json(self) -> Value {
        self.data
    }
}

impl std::fmt::Display for QueryResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // serde_json's default map is a BTreeMap, so pretty output is
        // already key-sorted.
        match serde_json::to_string_pretty(&self.data) {
            Ok(pretty) => f.write_str(&pretty),
            Err(_) => write!(f, "{}", self.data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_display_is_sorted_and_indented() {
        let result = QueryResult::new(json!({"zebra": 1, "apple": 2}));
        let printed = result.to_string();
        assert!(printed.contains("\n"));
        assert!(printed.find("apple").unwrap() < printed.find("zebra").unwrap());
    }

    #[test]
    fn test_json_accessor_round_trips() {
        let payload = json!({"data": [[{"value": "x"}]]});
        let result = QueryResult::new(payload.clone());
        assert_eq!(result.json(), &payload);
        assert_eq!(result.into_json(), payload);
    }
}
