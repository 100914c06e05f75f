//! Declarative transition tables.
//!
//! A machine is a finite state set, one initial state, one or more terminal
//! states, and per-state lists of guarded transitions. Transitions out of a
//! state are tried in declaration order and the first whose guard holds wins.
//! Terminal states have no outbound transitions; an entity entering one is
//! destroyed by its service instead of moving on.
//!
//! ```
//! use realm_core::state_machine::TransitionTable;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! enum Door { Open, Closed, Gone }
//!
//! let table = TransitionTable::<Door, u8, &str>::builder(Door::Closed)
//!     .transition(Door::Closed, Door::Open, |_, signal| *signal == "push")
//!     .transition(Door::Open, Door::Closed, |_, signal| *signal == "pull")
//!     .transition(Door::Open, Door::Gone, |_, signal| *signal == "kick")
//!     .terminal(Door::Gone)
//!     .build()
//!     .expect("valid table");
//!
//! assert_eq!(table.next(Door::Closed, &0, &"push"), Some(Door::Open));
//! assert_eq!(table.next(Door::Closed, &0, &"pull"), None);
//! ```

use crate::error::{RealmError, RealmResult};
use std::fmt::Debug;

/// Predicate over the current record and the triggering signal.
pub type Guard<R, S> = fn(&R, &S) -> bool;

struct Edge<St, R, S> {
    from: St,
    to: St,
    guard: Guard<R, S>,
}

/// Immutable transition table for states `St` over records `R` and signals `S`.
pub struct TransitionTable<St, R, S> {
    initial: St,
    terminal: Vec<St>,
    states: Vec<St>,
    edges: Vec<Edge<St, R, S>>,
}

impl<St, R, S> std::fmt::Debug for TransitionTable<St, R, S>
where
    St: Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransitionTable")
            .field("initial", &self.initial)
            .field("terminal", &self.terminal)
            .field("states", &self.states)
            .finish_non_exhaustive()
    }
}

impl<St, R, S> TransitionTable<St, R, S>
where
    St: Copy + Eq + Debug,
{
    /// Start building a table.
    #[must_use]
    pub fn builder(initial: St) -> TransitionTableBuilder<St, R, S> {
        TransitionTableBuilder {
            initial,
            terminal: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Initial state.
    #[must_use]
    pub const fn initial(&self) -> St {
        self.initial
    }

    /// Every state mentioned by the table.
    #[must_use]
    pub fn states(&self) -> &[St] {
        &self.states
    }

    /// Whether a state is known to the table.
    #[must_use]
    pub fn contains(&self, state: St) -> bool {
        self.states.contains(&state)
    }

    /// Whether a state is terminal.
    #[must_use]
    pub fn is_terminal(&self, state: St) -> bool {
        self.terminal.contains(&state)
    }

    /// First transition out of `current` whose guard holds.
    #[must_use]
    pub fn next(&self, current: St, record: &R, signal: &S) -> Option<St> {
        if self.is_terminal(current) {
            return None;
        }
        self.edges
            .iter()
            .filter(|edge| edge.from == current)
            .find(|edge| (edge.guard)(record, signal))
            .map(|edge| edge.to)
    }

    /// Like [`next`](Self::next) but reports a refused signal as an error.
    ///
    /// # Errors
    ///
    /// Returns [`RealmError::InvalidState`] when no transition applies.
    pub fn fire(
        &self,
        entity: &'static str,
        id: impl ToString,
        current: St,
        record: &R,
        signal: &S,
        operation: &'static str,
    ) -> RealmResult<St> {
        self.next(current, record, signal).ok_or_else(|| {
            RealmError::invalid_state(entity, id, format!("{current:?}"), operation)
        })
    }
}

/// Builder for [`TransitionTable`].
pub struct TransitionTableBuilder<St, R, S> {
    initial: St,
    terminal: Vec<St>,
    edges: Vec<Edge<St, R, S>>,
}

impl<St, R, S> TransitionTableBuilder<St, R, S>
where
    St: Copy + Eq + Debug,
{
    /// Add a guarded transition. Declaration order is evaluation order.
    #[must_use]
    pub fn transition(mut self, from: St, to: St, guard: Guard<R, S>) -> Self {
        self.edges.push(Edge { from, to, guard });
        self
    }

    /// Mark a state terminal.
    #[must_use]
    pub fn terminal(mut self, state: St) -> Self {
        if !self.terminal.contains(&state) {
            self.terminal.push(state);
        }
        self
    }

    /// Validate and freeze the table.
    ///
    /// # Errors
    ///
    /// Returns [`RealmError::Validation`] if no terminal state was declared or a
    /// terminal state has outbound transitions.
    pub fn build(self) -> RealmResult<TransitionTable<St, R, S>> {
        if self.terminal.is_empty() {
            return Err(RealmError::validation("state machine has no terminal state"));
        }
        if let Some(edge) = self.edges.iter().find(|e| self.terminal.contains(&e.from)) {
            return Err(RealmError::validation(format!(
                "terminal state {:?} has an outbound transition to {:?}",
                edge.from, edge.to
            )));
        }
        let mut states = vec![self.initial];
        for state in self
            .edges
            .iter()
            .flat_map(|e| [e.from, e.to])
            .chain(self.terminal.iter().copied())
        {
            if !states.contains(&state) {
                states.push(state);
            }
        }
        Ok(TransitionTable {
            initial: self.initial,
            terminal: self.terminal,
            states,
            edges: self.edges,
        })
    }
}
