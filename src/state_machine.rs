//! Intake conversation state machine
//!
//! Implements the Elm Architecture pattern with pure state transitions:
//! the session snapshot and an event go in, an ordered list of effects
//! comes out. The runtime owns every side effect.

mod context;
mod effect;
pub mod event;
pub mod prompts;
pub(crate) mod transition;


pub use context::{EmptySubmissionPolicy, IntakeContext};
pub use effect::{ChoiceOption, Effect};
pub use event::{AttachmentKind, AttachmentRef, Command, Event, InboundEvent, InboundKind, TerminalOutcome};
pub use transition::{transition, TransitionError};
