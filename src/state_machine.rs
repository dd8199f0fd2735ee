//! Stream relay state machine
//!
//! Pure transitions in the Elm style: the executor feeds events in and
//! performs the effects that come back out.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::{ClientEvent, RelayEffect};
pub use event::RelayEvent;
pub use state::{Accumulator, RelayState};
pub use transition::transition;
