//! Tool-call delta accumulation
//!
//! Providers stream tool calls as per-index fragments: the id and name may
//! arrive once or in pieces, and the argument string always arrives as a
//! sequence of deltas that must be concatenated in arrival order.

use std::collections::BTreeMap;

use uuid::Uuid;

use crate::types::{FunctionCall, ToolCallDelta, ToolCallPayload};

#[derive(Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Accumulates tool-call deltas keyed by index.
#[derive(Default)]
pub struct ToolCallAccumulator {
    calls: BTreeMap<u32, PartialToolCall>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn push(&mut self, delta: ToolCallDelta) {
        let entry = self.calls.entry(delta.index).or_default();
        if let Some(id) = delta.id {
            entry.id.push_str(&id);
        }
        if let Some(function) = delta.function {
            if let Some(name) = function.name {
                entry.name.push_str(&name);
            }
            if let Some(arguments) = function.arguments {
                entry.arguments.push_str(&arguments);
            }
        }
    }

    /// Completed calls in index order, synthesizing an id where the provider
    /// omitted one.
    pub fn finish(self) -> Vec<ToolCallPayload> {
        self.calls
            .into_iter()
            .map(|(index, partial)| {
                let id = if partial.id.is_empty() {
                    format!("call_{}_{}", index, Uuid::new_v4().simple())
                } else {
                    partial.id
                };
                ToolCallPayload {
                    id,
                    kind: "function".to_string(),
                    function: FunctionCall {
                        name: partial.name,
                        arguments: partial.arguments,
                    },
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FunctionDelta;

    fn delta(index: u32, id: Option<&str>, name: Option<&str>, args: Option<&str>) -> ToolCallDelta {
        ToolCallDelta {
            index,
            id: id.map(String::from),
            function: Some(FunctionDelta {
                name: name.map(String::from),
                arguments: args.map(String::from),
            }),
        }
    }

    #[test]
    fn test_arguments_concatenate_in_arrival_order() {
        let mut acc = ToolCallAccumulator::new();
        acc.push(delta(0, Some("call_a"), Some("lookup"), Some("{\"q\":")));
        acc.push(delta(0, None, None, Some("\"rust\"}")));

        let calls = acc.finish();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_a");
        assert_eq!(calls[0].function.name, "lookup");
        assert_eq!(calls[0].function.arguments, "{\"q\":\"rust\"}");
    }

    #[test]
    fn test_indexes_sort_even_when_interleaved() {
        let mut acc = ToolCallAccumulator::new();
        acc.push(delta(1, Some("call_b"), Some("second"), None));
        acc.push(delta(0, Some("call_a"), Some("first"), None));

        let calls = acc.finish();
        assert_eq!(calls[0].function.name, "first");
        assert_eq!(calls[1].function.name, "second");
    }

    #[test]
    fn test_missing_id_gets_fallback() {
        let mut acc = ToolCallAccumulator::new();
        acc.push(delta(2, None, Some("noid"), Some("")));

        let calls = acc.finish();
        assert!(calls[0].id.starts_with("call_2_"));
        assert!(calls[0].id.len() > "call_2_".len());
    }

    #[test]
    fn test_empty_accumulator() {
        let acc = ToolCallAccumulator::new();
        assert!(acc.is_empty());
        assert!(acc.finish().is_empty());
    }
}
