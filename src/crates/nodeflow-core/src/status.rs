//! Node status model and status aggregation.
//!
//! Every node instance carries a [`Status`]. Structural containers reduce
//! their children's statuses to a single value with [`aggregate`], using a
//! fixed priority: a fatal child outweighs everything, a limited child
//! outweighs a paused one, and so on down to `ready`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a node instance.
///
/// Transitions within one `execute()` call are monotonic:
/// `ready|done → executing → (done | pause | limit | fatal)`. A `done` node
/// may be re-invoked (loops re-enter finished nodes); `execute()` then resets
/// it to `executing` before the next terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Instantiated, never run (or not yet run since instantiation)
    #[default]
    Ready,
    /// Currently inside `execute()`
    Executing,
    /// Last `execute()` produced a result
    Done,
    /// Suspended awaiting external input; resumable through the parent
    Pause,
    /// A resource limit was hit; sticky until a parent intervenes
    Limit,
    /// The behavior failed; cause readable via `read_error()`
    Fatal,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Ready => "ready",
            Status::Executing => "executing",
            Status::Done => "done",
            Status::Pause => "pause",
            Status::Limit => "limit",
            Status::Fatal => "fatal",
        };
        write!(f, "{}", s)
    }
}

/// Aggregation priority, most significant first.
const PRIORITY: [Status; 6] = [
    Status::Fatal,
    Status::Limit,
    Status::Pause,
    Status::Executing,
    Status::Done,
    Status::Ready,
];

/// Reduce a set of child statuses to a single status.
///
/// Returns the first status of `[fatal, limit, pause, executing, done,
/// ready]` that appears among the children; an empty slice aggregates to
/// [`Status::Ready`].
pub fn aggregate(statuses: &[Status]) -> Status {
    for candidate in PRIORITY {
        if statuses.contains(&candidate) {
            return candidate;
        }
    }
    Status::Ready
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_aggregates_to_ready() {
        assert_eq!(aggregate(&[]), Status::Ready);
    }

    #[test]
    fn fatal_outweighs_everything() {
        let statuses = [Status::Done, Status::Limit, Status::Fatal, Status::Pause];
        assert_eq!(aggregate(&statuses), Status::Fatal);
    }

    #[test]
    fn limit_outweighs_pause() {
        assert_eq!(
            aggregate(&[Status::Pause, Status::Limit]),
            Status::Limit
        );
    }

    #[test]
    fn done_and_ready_mix_aggregates_to_done() {
        assert_eq!(aggregate(&[Status::Ready, Status::Done]), Status::Done);
    }

    #[test]
    fn serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Status::Fatal).unwrap(), "\"fatal\"");
        assert_eq!(Status::Pause.to_string(), "pause");
    }

    fn arb_status() -> impl Strategy<Value = Status> {
        prop_oneof![
            Just(Status::Ready),
            Just(Status::Executing),
            Just(Status::Done),
            Just(Status::Pause),
            Just(Status::Limit),
            Just(Status::Fatal),
        ]
    }

    proptest! {
        // Aggregation law: the result is always the highest-priority status
        // present in the input.
        #[test]
        fn aggregation_law(statuses in proptest::collection::vec(arb_status(), 0..12)) {
            let agg = aggregate(&statuses);
            let expected = PRIORITY
                .iter()
                .copied()
                .find(|s| statuses.contains(s))
                .unwrap_or(Status::Ready);
            prop_assert_eq!(agg, expected);
        }
    }
}
