// Cooperative timer scheduler
// Single core, no preemption. Alarm ISRs only push timer ids onto the
// job queue; the main loop drains it and runs every callback.
//
// alarm: platform seams plus SoftAlarms, a tick-driven one-shot table.
// queue: the ISR/loop handoff, guarded by a critical section.
// scheduler: factory API and the post-firing rearm/expire/chain logic.

pub mod alarm;
pub mod config;
pub mod queue;
pub mod registry;
pub mod scheduler;
pub mod timer;
pub mod wake;

pub use alarm::{Alarm, Entropy, Hal, NoWatchdog, Platform, SoftAlarms, Watchdog};
pub use config::Config;
pub use queue::{JobQueue, PushError};
pub use scheduler::{Scheduler, Stats, Task, then};
pub use timer::{Repeat, TimerId};
