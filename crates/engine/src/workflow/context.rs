use serde_json::{Map, Value};

/// The mutable key/value store shared by every step of one execution.
///
/// Owned by exactly one execution and mutated in place; there is no
/// versioning, the last write wins.
#[derive(Debug, Clone, Default)]
pub struct VariableContext {
    vars: Map<String, Value>,
}

impl VariableContext {
    pub fn new() -> Self {
        Self { vars: Map::new() }
    }

    pub fn from_map(vars: Map<String, Value>) -> Self {
        Self { vars }
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.vars.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.vars.get(key)
    }

    /// Resolve a dot-separated path against the variables.
    ///
    /// Objects descend by key, arrays by numeric index. Any segment that
    /// cannot be descended yields `None`; lookups never fail.
    pub fn resolve_path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.vars.get(segments.next()?)?;

        for segment in segments {
            match current {
                Value::Object(map) => {
                    current = map.get(segment)?;
                }
                Value::Array(items) => {
                    let index: usize = segment.parse().ok()?;
                    current = items.get(index)?;
                }
                _ => return None,
            }
        }

        Some(current)
    }

    /// The full variable map as one JSON object, for snapshotting onto the
    /// execution record.
    pub fn snapshot(&self) -> Value {
        Value::Object(self.vars.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> VariableContext {
        let vars = json!({
            "order": {
                "total": 42,
                "lines": [{"sku": "A-1"}, {"sku": "B-2"}],
            },
            "approved": true,
        });
        match vars {
            Value::Object(map) => VariableContext::from_map(map),
            _ => unreachable!(),
        }
    }

    #[test]
    fn resolves_nested_object_paths() {
        let ctx = context();
        assert_eq!(ctx.resolve_path("order.total"), Some(&json!(42)));
        assert_eq!(ctx.resolve_path("approved"), Some(&json!(true)));
    }

    #[test]
    fn resolves_array_indices() {
        let ctx = context();
        assert_eq!(ctx.resolve_path("order.lines.1.sku"), Some(&json!("B-2")));
    }

    #[test]
    fn absent_paths_yield_none() {
        let ctx = context();
        assert_eq!(ctx.resolve_path("missing"), None);
        assert_eq!(ctx.resolve_path("order.missing.deeper"), None);
        assert_eq!(ctx.resolve_path("order.total.beyond"), None);
        assert_eq!(ctx.resolve_path("order.lines.9"), None);
        assert_eq!(ctx.resolve_path("order.lines.x"), None);
    }

    #[test]
    fn last_write_wins() {
        let mut ctx = context();
        ctx.set("approved", json!(false));
        ctx.set("approved", json!("maybe"));
        assert_eq!(ctx.get("approved"), Some(&json!("maybe")));
    }

    #[test]
    fn snapshot_contains_all_variables() {
        let mut ctx = VariableContext::new();
        ctx.set("a", json!(1));
        ctx.set("b", json!({"c": 2}));
        assert_eq!(ctx.snapshot(), json!({"a": 1, "b": {"c": 2}}));
    }
}
