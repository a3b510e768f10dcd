//! Object entry filters
//!
//! Decides which produced key/value pairs make it into an output object.

use crate::error::Result;
use crate::value::Value;

pub trait ObjectFilter: Send + Sync {
    fn keep(&self, value: &Value) -> Result<bool>;
}

/// Drops null, `{}` and `[]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultObjectFilter;

impl ObjectFilter for DefaultObjectFilter {
    fn keep(&self, value: &Value) -> Result<bool> {
        Ok(value.is_valuable())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct KeepAll;

impl ObjectFilter for KeepAll {
    fn keep(&self, _value: &Value) -> Result<bool> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Map;

    #[test]
    fn test_default_filter_drops_empty_values() {
        let filter = DefaultObjectFilter;
        assert!(!filter.keep(&Value::Null).unwrap());
        assert!(!filter.keep(&Value::Array(vec![])).unwrap());
        assert!(!filter.keep(&Value::Object(Map::new())).unwrap());
        assert!(filter.keep(&Value::Integer(0)).unwrap());
        assert!(filter.keep(&Value::from("")).unwrap());
    }

    #[test]
    fn test_keep_all() {
        assert!(KeepAll.keep(&Value::Null).unwrap());
    }
}
