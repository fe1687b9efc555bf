//! Filters that keep internal-stage tokens out of the answer stream.
//!
//! Every generation call of an exchange streams over the same channel. Only
//! the final response is meant for the human, so fragments from the history
//! summary, user characterization and query rewriting must be dropped.

use personae_types::config::FilterMode;
use personae_types::conversation::TokenFragment;

pub trait FragmentFilter: Send {
    /// Called once per exchange, before any fragment, with the number of
    /// generation calls that precede the answer.
    fn start(&mut self, _internal_calls: usize) {}

    /// Whether `fragment` belongs in the caller-facing stream.
    fn accept(&mut self, fragment: &TokenFragment) -> bool;
}

/// Forwards non-empty fragments tagged with the user-visible stage.
#[derive(Debug, Default)]
pub struct StageFilter;

impl FragmentFilter for StageFilter {
    fn accept(&mut self, fragment: &TokenFragment) -> bool {
        fragment.stage.is_user_visible() && !fragment.text.is_empty()
    }
}

/// Forwards fragments once the generation id has changed past every
/// internal call.
///
/// Each new generation id marks the start of a call. Fragments of the first
/// `internal_calls` calls are dropped; every non-empty fragment after that is
/// forwarded in arrival order. An internal call that streams no text at all
/// is invisible to this filter, which is why [`StageFilter`] is the default.
#[derive(Debug, Default)]
pub struct CallBoundaryFilter {
    internal_calls: usize,
    calls_seen: usize,
    previous_id: Option<String>,
}

impl FragmentFilter for CallBoundaryFilter {
    fn start(&mut self, internal_calls: usize) {
        self.internal_calls = internal_calls;
        self.calls_seen = 0;
        self.previous_id = None;
    }

    fn accept(&mut self, fragment: &TokenFragment) -> bool {
        if self.previous_id.as_deref() != Some(fragment.generation_id.as_str()) {
            self.calls_seen += 1;
            self.previous_id = Some(fragment.generation_id.clone());
        }
        self.calls_seen > self.internal_calls && !fragment.text.is_empty()
    }
}

pub fn filter_for(mode: FilterMode) -> Box<dyn FragmentFilter> {
    match mode {
        FilterMode::StageTag => Box::new(StageFilter),
        FilterMode::CallBoundary => Box::new(CallBoundaryFilter::default()),
    }
}
