//! Reassembles complete tool calls from streamed fragments.
//!
//! Both transports deliver tool calls in pieces: a name here, a few bytes of
//! the argument JSON there, correlated by a response-local `index`, a stable
//! `id`, or both. The aggregator owns the table of in-progress drafts,
//! routes each fragment to the right draft, and freezes a draft into an
//! immutable [`ToolCall`] once a completion signal arrives. Fragments are
//! applied strictly in arrival order; the table never reorders or
//! deduplicates.

use crate::tools::ToolCall;
use crate::value::Value;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

/// A draft could not be frozen into a dispatchable call.
#[derive(Debug, Error)]
pub enum ToolCallError {
    /// The concatenated argument fragments were not valid JSON. The call is
    /// dropped; dispatching malformed input is worse than skipping it.
    #[error("malformed arguments for tool call '{id}': {source}")]
    MalformedArguments {
        id: String,
        #[source]
        source: serde_json::Error,
    },
}

/// One incremental piece of a tool call, as it appears on either wire.
#[derive(Debug, Clone, Default)]
pub struct ToolCallFragment {
    /// Position of the call within the current response. Present on the
    /// first fragments of the line-oriented protocol before an id exists.
    pub index: Option<u32>,
    /// Stable correlation id, once the upstream has assigned one.
    pub id: Option<String>,
    /// The tool name. Arrives at most once per logical call.
    pub name: Option<String>,
    /// A slice of the argument JSON, to be appended verbatim.
    pub arguments: Option<String>,
}

#[derive(Debug)]
struct Draft {
    index: Option<u32>,
    id: Option<String>,
    name: String,
    arguments: String,
}

impl Draft {
    /// The id used for the frozen call. An index-only draft (possible on
    /// the line protocol if the stream ends before an id arrives) gets a
    /// synthetic one so the dispatch path stays uniform.
    fn call_id(&self) -> String {
        match (&self.id, self.index) {
            (Some(id), _) => id.clone(),
            (None, Some(index)) => format!("call_index_{index}"),
            (None, None) => "call_unknown".to_string(),
        }
    }

    fn freeze(self) -> Result<ToolCall, ToolCallError> {
        let id = self.call_id();
        let arguments: BTreeMap<String, Value> = if self.arguments.is_empty() {
            BTreeMap::new()
        } else {
            serde_json::from_str(&self.arguments)
                .map_err(|source| ToolCallError::MalformedArguments { id: id.clone(), source })?
        };
        Ok(ToolCall {
            id,
            name: self.name,
            arguments,
        })
    }
}

/// The draft table. Drafts are stored in arrival order; lookups go by id
/// first, then by index, so a draft promoted from index to id keeps
/// receiving fragments addressed either way.
#[derive(Debug, Default)]
pub struct DeltaAggregator {
    drafts: Vec<Draft>,
}

impl DeltaAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of drafts not yet frozen.
    pub fn in_flight(&self) -> usize {
        self.drafts.len()
    }

    /// True if a fragment with this id would land on an existing draft.
    pub fn has_draft(&self, id: &str) -> bool {
        self.drafts.iter().any(|d| d.id.as_deref() == Some(id))
    }

    /// True if a fragment with this index would land on an existing draft.
    pub fn has_index(&self, index: u32) -> bool {
        self.drafts.iter().any(|d| d.index == Some(index))
    }

    /// Merge one fragment into the table.
    ///
    /// First sight of an unknown correlation creates a draft. A fragment
    /// carrying both an index and an id promotes the matching index-keyed
    /// draft: from then on the id is the authoritative key and the index is
    /// just an alias back to the same draft.
    pub fn apply(&mut self, fragment: ToolCallFragment) {
        let position = self.find(&fragment);
        let draft = match position {
            Some(i) => &mut self.drafts[i],
            None => {
                self.drafts.push(Draft {
                    index: fragment.index,
                    id: None,
                    name: String::new(),
                    arguments: String::new(),
                });
                self.drafts.last_mut().unwrap()
            }
        };

        if draft.id.is_none() {
            draft.id = fragment.id;
        }
        if draft.name.is_empty() {
            if let Some(name) = fragment.name {
                draft.name = name;
            }
        }
        if let Some(chunk) = fragment.arguments {
            draft.arguments.push_str(&chunk);
        }
    }

    fn find(&self, fragment: &ToolCallFragment) -> Option<usize> {
        if let Some(id) = &fragment.id {
            if let Some(i) = self.drafts.iter().position(|d| d.id.as_deref() == Some(id)) {
                return Some(i);
            }
        }
        if let Some(index) = fragment.index {
            return self.drafts.iter().position(|d| d.index == Some(index));
        }
        None
    }

    /// Freeze the draft with this id on an explicit completion signal.
    ///
    /// Returns `None` when no such draft exists (a duplicate or stray
    /// completion event); a frozen call can therefore never be produced
    /// twice.
    pub fn finish(&mut self, id: &str) -> Option<Result<ToolCall, ToolCallError>> {
        let i = self.drafts.iter().position(|d| d.id.as_deref() == Some(id))?;
        Some(self.drafts.remove(i).freeze())
    }

    /// Flush every in-flight draft at end of stream.
    ///
    /// The line-oriented protocol has no per-call completion event, only the
    /// stream sentinel, so any draft that at least learned its name is
    /// frozen here. Nameless drafts are dropped; there is nothing to
    /// dispatch them to.
    pub fn finish_all(&mut self) -> Vec<Result<ToolCall, ToolCallError>> {
        let drafts = std::mem::take(&mut self.drafts);
        drafts
            .into_iter()
            .filter_map(|draft| {
                if draft.name.is_empty() {
                    debug!(id = %draft.call_id(), "dropping nameless draft at end of stream");
                    None
                } else {
                    Some(draft.freeze())
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frag(
        index: Option<u32>,
        id: Option<&str>,
        name: Option<&str>,
        arguments: Option<&str>,
    ) -> ToolCallFragment {
        ToolCallFragment {
            index,
            id: id.map(str::to_string),
            name: name.map(str::to_string),
            arguments: arguments.map(str::to_string),
        }
    }

    #[test]
    fn index_then_id_promotion() {
        let mut agg = DeltaAggregator::new();
        agg.apply(frag(Some(0), None, Some("log_set"), Some("{\"rep")));
        agg.apply(frag(Some(0), Some("call_1"), None, Some("s\":5}")));
        assert_eq!(agg.in_flight(), 1);

        let call = agg.finish("call_1").unwrap().unwrap();
        assert_eq!(call.id, "call_1");
        assert_eq!(call.name, "log_set");
        assert_eq!(call.arguments["reps"], Value::Int(5));
        assert_eq!(agg.in_flight(), 0);
    }

    #[test]
    fn fragments_after_promotion_reach_the_same_draft() {
        let mut agg = DeltaAggregator::new();
        agg.apply(frag(Some(0), None, Some("navigate"), Some("{\"destina")));
        agg.apply(frag(Some(0), Some("call_9"), None, None));
        // Later fragments may carry only the index or only the id.
        agg.apply(frag(Some(0), None, None, Some("tion\":\"hist")));
        agg.apply(frag(None, Some("call_9"), None, Some("ory\"}")));

        let call = agg.finish("call_9").unwrap().unwrap();
        assert_eq!(call.arguments["destination"], Value::from("history"));
    }

    #[test]
    fn id_only_flow() {
        let mut agg = DeltaAggregator::new();
        agg.apply(frag(None, Some("call_a"), Some("undo_last_set"), Some("{}")));
        let call = agg.finish("call_a").unwrap().unwrap();
        assert_eq!(call.name, "undo_last_set");
        assert!(call.arguments.is_empty());
    }

    #[test]
    fn two_interleaved_calls_stay_separate() {
        let mut agg = DeltaAggregator::new();
        agg.apply(frag(Some(0), Some("call_a"), Some("select_exercise"), Some("{\"name\":")));
        agg.apply(frag(Some(1), Some("call_b"), Some("undo_last_set"), Some("{")));
        agg.apply(frag(Some(0), None, None, Some("\"Squat\"}")));
        agg.apply(frag(Some(1), None, None, Some("}")));

        let a = agg.finish("call_a").unwrap().unwrap();
        let b = agg.finish("call_b").unwrap().unwrap();
        assert_eq!(a.arguments["name"], Value::from("Squat"));
        assert!(b.arguments.is_empty());
    }

    #[test]
    fn finish_is_single_shot() {
        let mut agg = DeltaAggregator::new();
        agg.apply(frag(None, Some("call_a"), Some("summarize_history"), Some("{}")));
        assert!(agg.finish("call_a").is_some());
        assert!(agg.finish("call_a").is_none());
    }

    #[test]
    fn malformed_arguments_surface_an_error() {
        let mut agg = DeltaAggregator::new();
        agg.apply(frag(None, Some("call_a"), Some("log_set"), Some("{\"reps\": ")));
        let err = agg.finish("call_a").unwrap().unwrap_err();
        assert!(matches!(err, ToolCallError::MalformedArguments { .. }));
        assert_eq!(agg.in_flight(), 0);
    }

    #[test]
    fn stream_end_freezes_named_drafts_only() {
        let mut agg = DeltaAggregator::new();
        agg.apply(frag(Some(0), Some("call_a"), Some("log_set"), Some("{\"reps\":8}")));
        agg.apply(frag(Some(1), None, None, Some("{\"ignored\":true}")));

        let calls = agg.finish_all();
        assert_eq!(calls.len(), 1);
        let call = calls.into_iter().next().unwrap().unwrap();
        assert_eq!(call.name, "log_set");
        assert_eq!(call.arguments["reps"], Value::Int(8));
        assert_eq!(agg.in_flight(), 0);
    }

    #[test]
    fn empty_arguments_freeze_to_an_empty_map() {
        let mut agg = DeltaAggregator::new();
        agg.apply(frag(None, Some("call_a"), Some("suggest_workout_day"), None));
        let call = agg.finish("call_a").unwrap().unwrap();
        assert!(call.arguments.is_empty());
    }
}
