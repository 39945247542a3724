// Tool Call Accumulator
// Reassembles tool calls that arrive as indexed fragments in a chat stream.

use crate::openai::{ChunkToolCall, FunctionCall, ToolCall};
use std::collections::BTreeMap;

/// Merges streamed tool-call fragments by their `index`.
///
/// The first fragment for an index sets id, type and name. Later fragments
/// append to the argument text; id and name are only filled while empty.
#[derive(Debug, Default, Clone)]
pub struct ToolCallAccumulator {
    calls: BTreeMap<u32, ToolCall>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fragment: &ChunkToolCall) {
        let function = fragment.function.as_ref();
        let name = function.and_then(|f| f.name.as_deref()).unwrap_or("");
        let arguments = function.and_then(|f| f.arguments.as_deref()).unwrap_or("");

        match self.calls.get_mut(&fragment.index) {
            None => {
                self.calls.insert(
                    fragment.index,
                    ToolCall {
                        id: fragment.id.clone().unwrap_or_default(),
                        call_type: fragment
                            .call_type
                            .clone()
                            .unwrap_or_else(|| "function".to_string()),
                        function: FunctionCall {
                            name: name.to_string(),
                            arguments: arguments.to_string(),
                        },
                    },
                );
            }
            Some(call) => {
                if call.id.is_empty() {
                    if let Some(id) = fragment.id.as_deref() {
                        call.id = id.to_string();
                    }
                }
                if call.function.name.is_empty() && !name.is_empty() {
                    call.function.name = name.to_string();
                }
                call.function.arguments.push_str(arguments);
            }
        }
    }

    pub fn extend<'a>(&mut self, fragments: impl IntoIterator<Item = &'a ChunkToolCall>) {
        for fragment in fragments {
            self.push(fragment);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Merged calls ordered by index, `None` when nothing arrived
    pub fn finish(self) -> Option<Vec<ToolCall>> {
        if self.calls.is_empty() {
            None
        } else {
            Some(self.calls.into_values().collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openai::ChunkFunctionCall;

    fn fragment(
        index: u32,
        id: Option<&str>,
        name: Option<&str>,
        arguments: Option<&str>,
    ) -> ChunkToolCall {
        ChunkToolCall {
            index,
            id: id.map(String::from),
            call_type: id.map(|_| "function".to_string()),
            function: Some(ChunkFunctionCall {
                name: name.map(String::from),
                arguments: arguments.map(String::from),
            }),
        }
    }

    #[test]
    fn test_fragments_merge_by_index() {
        let mut acc = ToolCallAccumulator::new();
        acc.push(&fragment(0, Some("c1"), Some("f"), Some("{\"a\":")));
        acc.push(&fragment(0, None, None, Some("1}")));

        let calls = acc.finish().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "c1");
        assert_eq!(calls[0].call_type, "function");
        assert_eq!(calls[0].function.name, "f");
        assert_eq!(calls[0].function.arguments, "{\"a\":1}");
    }

    #[test]
    fn test_later_fragments_never_overwrite() {
        let mut acc = ToolCallAccumulator::new();
        acc.push(&fragment(0, Some("c1"), Some("first"), Some("")));
        acc.push(&fragment(0, Some("c2"), Some("second"), Some("{}")));

        let calls = acc.finish().unwrap();
        assert_eq!(calls[0].id, "c1");
        assert_eq!(calls[0].function.name, "first");
        assert_eq!(calls[0].function.arguments, "{}");
    }

    #[test]
    fn test_interleaved_indices() {
        let mut acc = ToolCallAccumulator::new();
        acc.extend(&[
            fragment(1, Some("b"), Some("g"), Some("[")),
            fragment(0, Some("a"), Some("f"), Some("{")),
            fragment(1, None, None, Some("]")),
            fragment(0, None, None, Some("}")),
        ]);

        let calls = acc.finish().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "a");
        assert_eq!(calls[0].function.arguments, "{}");
        assert_eq!(calls[1].id, "b");
        assert_eq!(calls[1].function.arguments, "[]");
    }

    #[test]
    fn test_missing_id_filled_later() {
        let mut acc = ToolCallAccumulator::new();
        acc.push(&fragment(0, None, None, Some("{")));
        acc.push(&fragment(0, Some("late"), Some("f"), Some("}")));

        let calls = acc.finish().unwrap();
        assert_eq!(calls[0].id, "late");
        assert_eq!(calls[0].function.name, "f");
        assert_eq!(calls[0].function.arguments, "{}");
    }

    #[test]
    fn test_empty() {
        let acc = ToolCallAccumulator::new();
        assert!(acc.is_empty());
        assert!(acc.finish().is_none());
    }
}
