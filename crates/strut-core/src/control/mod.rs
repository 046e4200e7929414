//! Control core
//!
//! The fixed-period scheduler and the wanted/system state cell that every
//! subsystem builds on.

mod looper;
mod state_machine;

pub use looper::{on_scheduler_thread, Loop, Looper, LooperStats, Registrar};
pub use state_machine::{EdgeTrigger, Snapshot, StateCell, Tick, Wanted};
