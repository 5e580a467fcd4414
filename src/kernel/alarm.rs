// Platform seams: one-shot alarms, entropy, watchdog
//
// SoftAlarms is the default alarm backend: a table of countdowns that a
// periodic timer ISR ticks. Expired entries push their id onto the job
// queue and leave the table; nothing auto-repeats.

use alloc::vec::Vec;
use core::cell::RefCell;

use super::queue::JobQueue;
use super::timer::TimerId;

/// Fires `id` into the job queue once, roughly `delay_ms` from now.
pub trait Alarm {
    fn arm_once(&mut self, id: TimerId, delay_ms: u32);

    /// Forget a pending alarm. No-op if `id` is not armed.
    fn disarm(&mut self, id: TimerId);
}

/// Random source for jittered intervals and random repeat counts.
pub trait Entropy {
    /// Uniform in `[lo, hi)`; `lo` when the range is empty.
    fn between(&mut self, lo: u32, hi: u32) -> u32;
}

/// Liveness hook serviced while the loop drains a burst of jobs.
pub trait Watchdog {
    fn feed(&mut self);
}

/// Everything the scheduler consumes from the board.
pub trait Platform: Alarm + Entropy + Watchdog {}

impl<T: Alarm + Entropy + Watchdog> Platform for T {}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoWatchdog;

impl Watchdog for NoWatchdog {
    fn feed(&mut self) {}
}

/// Bundles independent alarm, entropy and watchdog parts into a
/// [`Platform`].
#[derive(Debug)]
pub struct Hal<A, E, W = NoWatchdog> {
    pub alarm: A,
    pub entropy: E,
    pub watchdog: W,
}

impl<A, E> Hal<A, E> {
    pub fn new(alarm: A, entropy: E) -> Self {
        Self {
            alarm,
            entropy,
            watchdog: NoWatchdog,
        }
    }
}

impl<A, E, W> Hal<A, E, W> {
    pub fn with_watchdog<W2>(self, watchdog: W2) -> Hal<A, E, W2> {
        Hal {
            alarm: self.alarm,
            entropy: self.entropy,
            watchdog,
        }
    }
}

impl<A: Alarm, E, W> Alarm for Hal<A, E, W> {
    fn arm_once(&mut self, id: TimerId, delay_ms: u32) {
        self.alarm.arm_once(id, delay_ms);
    }

    fn disarm(&mut self, id: TimerId) {
        self.alarm.disarm(id);
    }
}

impl<A, E: Entropy, W> Entropy for Hal<A, E, W> {
    fn between(&mut self, lo: u32, hi: u32) -> u32 {
        self.entropy.between(lo, hi)
    }
}

impl<A, E, W: Watchdog> Watchdog for Hal<A, E, W> {
    fn feed(&mut self) {
        self.watchdog.feed();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Countdown {
    id: TimerId,
    remaining_ms: u32,
}

struct Table {
    pending: Vec<Countdown>,
    now_ms: u32,
}

/// Software one-shot alarms driven by a periodic tick.
///
/// `arm`/`disarm` run in loop context and may allocate; `tick` runs in
/// the ISR and only removes entries. A zero delay fires on the next tick.
pub struct SoftAlarms {
    table: critical_section::Mutex<RefCell<Table>>,
}

impl SoftAlarms {
    pub const fn new() -> Self {
        Self {
            table: critical_section::Mutex::new(RefCell::new(Table {
                pending: Vec::new(),
                now_ms: 0,
            })),
        }
    }

    /// Arm (or re-arm) `id`.
    pub fn arm(&self, id: TimerId, delay_ms: u32) {
        critical_section::with(|cs| {
            let mut table = self.table.borrow_ref_mut(cs);
            table.pending.retain(|c| c.id != id);
            table.pending.push(Countdown {
                id,
                remaining_ms: delay_ms,
            });
        });
    }

    pub fn disarm(&self, id: TimerId) -> bool {
        critical_section::with(|cs| {
            let mut table = self.table.borrow_ref_mut(cs);
            let before = table.pending.len();
            table.pending.retain(|c| c.id != id);
            table.pending.len() != before
        })
    }

    /// ISR entry: advance by `elapsed_ms`, fire what expired (arming order).
    pub fn tick(&self, elapsed_ms: u32, jobs: &JobQueue) {
        critical_section::with(|cs| {
            let mut table = self.table.borrow_ref_mut(cs);
            table.now_ms = table.now_ms.wrapping_add(elapsed_ms);
            table.pending.retain_mut(|c| {
                c.remaining_ms = c.remaining_ms.saturating_sub(elapsed_ms);
                if c.remaining_ms > 0 {
                    return true;
                }
                // a full queue already counts the drop
                let _ = jobs.enqueue(c.id);
                false
            });
        });
    }

    /// Tick `ms` times by 1ms, the way a 1ms ISR would.
    pub fn advance(&self, ms: u32, jobs: &JobQueue) {
        for _ in 0..ms {
            self.tick(1, jobs);
        }
    }

    /// Milliseconds until `id` fires, if armed.
    pub fn remaining(&self, id: TimerId) -> Option<u32> {
        critical_section::with(|cs| {
            self.table
                .borrow_ref(cs)
                .pending
                .iter()
                .find(|c| c.id == id)
                .map(|c| c.remaining_ms)
        })
    }

    pub fn armed(&self) -> usize {
        critical_section::with(|cs| self.table.borrow_ref(cs).pending.len())
    }

    /// Time seen by the table since boot (wrapping).
    pub fn now_ms(&self) -> u32 {
        critical_section::with(|cs| self.table.borrow_ref(cs).now_ms)
    }
}

impl Default for SoftAlarms {
    fn default() -> Self {
        Self::new()
    }
}

impl Alarm for &SoftAlarms {
    fn arm_once(&mut self, id: TimerId, delay_ms: u32) {
        self.arm(id, delay_ms);
    }

    fn disarm(&mut self, id: TimerId) {
        SoftAlarms::disarm(self, id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u32) -> TimerId {
        TimerId::from_raw(raw)
    }

    fn rig() -> (SoftAlarms, JobQueue) {
        let jobs = JobQueue::new();
        jobs.reserve(8);
        (SoftAlarms::new(), jobs)
    }

    #[test]
    fn test_fires_once_after_delay() {
        let (alarms, jobs) = rig();
        alarms.arm(id(1), 5);

        alarms.advance(4, &jobs);
        assert!(jobs.is_empty());
        assert_eq!(alarms.remaining(id(1)), Some(1));

        alarms.advance(1, &jobs);
        assert_eq!(jobs.pop(), Some(id(1)));
        assert_eq!(alarms.armed(), 0);

        alarms.advance(100, &jobs);
        assert!(jobs.is_empty());
    }

    #[test]
    fn test_due_order() {
        let (alarms, jobs) = rig();
        alarms.arm(id(1), 30);
        alarms.arm(id(2), 10);
        alarms.arm(id(3), 20);
        alarms.advance(30, &jobs);

        let order: Vec<u32> = core::iter::from_fn(|| jobs.pop()).map(TimerId::get).collect();
        assert_eq!(order, vec![2, 3, 1]);
    }

    #[test]
    fn test_same_tick_fires_in_arming_order() {
        let (alarms, jobs) = rig();
        alarms.arm(id(7), 10);
        alarms.arm(id(3), 10);
        alarms.tick(10, &jobs);
        assert_eq!(jobs.pop(), Some(id(7)));
        assert_eq!(jobs.pop(), Some(id(3)));
    }

    #[test]
    fn test_zero_delay_fires_next_tick() {
        let (alarms, jobs) = rig();
        alarms.arm(id(1), 0);
        assert!(jobs.is_empty());
        alarms.tick(1, &jobs);
        assert_eq!(jobs.pop(), Some(id(1)));
    }

    #[test]
    fn test_rearm_replaces() {
        let (alarms, jobs) = rig();
        alarms.arm(id(1), 5);
        alarms.arm(id(1), 50);
        assert_eq!(alarms.armed(), 1);
        alarms.advance(10, &jobs);
        assert!(jobs.is_empty());
        assert_eq!(alarms.remaining(id(1)), Some(40));
    }

    #[test]
    fn test_disarm() {
        let (alarms, jobs) = rig();
        alarms.arm(id(1), 5);
        assert!(alarms.disarm(id(1)));
        assert!(!alarms.disarm(id(1)));
        alarms.advance(10, &jobs);
        assert!(jobs.is_empty());
    }

    #[test]
    fn test_now_tracks_ticks() {
        let (alarms, jobs) = rig();
        alarms.advance(12, &jobs);
        alarms.tick(8, &jobs);
        assert_eq!(alarms.now_ms(), 20);
    }

    #[test]
    fn test_hal_delegates() {
        struct Fixed(u32);
        impl Entropy for Fixed {
            fn between(&mut self, lo: u32, _hi: u32) -> u32 {
                lo + self.0
            }
        }
        struct Counting(u32);
        impl Watchdog for Counting {
            fn feed(&mut self) {
                self.0 += 1;
            }
        }

        let (alarms, _jobs) = rig();
        let mut hal = Hal::new(&alarms, Fixed(2)).with_watchdog(Counting(0));
        hal.arm_once(id(4), 9);
        assert_eq!(alarms.remaining(id(4)), Some(9));
        assert_eq!(hal.between(10, 20), 12);
        hal.feed();
        hal.feed();
        assert_eq!(hal.watchdog.0, 2);
        Alarm::disarm(&mut hal, id(4));
        assert_eq!(alarms.armed(), 0);
    }
}
