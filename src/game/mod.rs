//! Session timing and the local target loop

pub mod clock;
pub mod scheduler;
pub mod targets;

pub use clock::{SessionClock, SessionPhase};
pub use scheduler::{FrameScheduler, SchedulerTick};
pub use targets::{Crosshair, Target, TargetField};
