mod machine;
mod timer;

pub use machine::{CooldownMachine, CooldownPhase, CooldownState, LogDecision};
pub use timer::ExpiryTimer;
