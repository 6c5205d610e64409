//! Built-in clock tools

use async_trait::async_trait;
use chrono::Local;
use serde_json::Value;

use crate::registry::Tool;
use crate::ToolError;

/// Current wall-clock time in `HH:MM AM/PM` form
pub struct CurrentTimeTool;

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "get_current_time"
    }

    fn description(&self) -> &str {
        "Get the current time."
    }

    async fn execute(&self, _arguments: Value) -> Result<Value, ToolError> {
        Ok(Value::String(Local::now().format("%I:%M %p").to_string()))
    }
}

/// Current date in `YYYY-MM-DD` form
pub struct CurrentDateTool;

#[async_trait]
impl Tool for CurrentDateTool {
    fn name(&self) -> &str {
        "get_current_date"
    }

    fn description(&self) -> &str {
        "Get the current date."
    }

    async fn execute(&self, _arguments: Value) -> Result<Value, ToolError> {
        Ok(Value::String(Local::now().format("%Y-%m-%d").to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::default_registry;

    #[tokio::test]
    async fn test_time_format() {
        let result = CurrentTimeTool
            .execute(Value::Object(Default::default()))
            .await
            .unwrap();
        let text = result.as_str().unwrap();
        // e.g. "03:14 PM"
        assert_eq!(text.len(), 8);
        assert!(text.ends_with("AM") || text.ends_with("PM"));
        assert_eq!(&text[2..3], ":");
    }

    #[tokio::test]
    async fn test_date_format() {
        let result = CurrentDateTool
            .execute(Value::Object(Default::default()))
            .await
            .unwrap();
        let text = result.as_str().unwrap();
        assert_eq!(text.len(), 10);
        assert_eq!(&text[4..5], "-");
        assert_eq!(&text[7..8], "-");
    }

    #[test]
    fn test_default_registry_contents() {
        let registry = default_registry();
        assert_eq!(registry.len(), 2);
        let names: Vec<String> = registry
            .schemas()
            .into_iter()
            .map(|s| s.function.name)
            .collect();
        assert!(names.contains(&"get_current_time".to_string()));
        assert!(names.contains(&"get_current_date".to_string()));
    }
}
