//! Conversation state machine for the guided flows
//!
//! Implements the Elm Architecture pattern with pure state transitions:
//! `(state, context, event) -> (state, effects)`.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::{Effect, Outbound};
pub use event::{Event, UserInput};
pub use state::{BrowseSession, BrowseStep, CreateStep, FlowState, ItemDraft, SessionContext};
pub use transition::{transition, TransitionError};
