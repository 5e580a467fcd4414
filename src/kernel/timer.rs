// Timer entities: interval, jitter bound, repeat policy, callbacks
//
// Arming is one-shot. An entity only knows how long to wait next and
// what its repeat policy says after a firing; the scheduler owns the
// actual re-arm, chain and removal.

use alloc::boxed::Box;
use core::fmt;
use core::num::NonZeroU32;

use super::alarm::Entropy;

/// Identity of a live timer. Assigned monotonically from 1; 0 is never
/// handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TimerId(u32);

impl TimerId {
    /// Reserved, never assigned to a timer.
    pub const NONE: TimerId = TimerId(0);

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Boxed callback; `S` is the scheduler handed back to it.
pub type Callback<S> = Box<dyn FnMut(&mut S)>;

/// Polled condition for `when` / `whenever`.
pub type Ready = Box<dyn FnMut() -> bool>;

/// What happens to a timer after each firing.
pub enum Repeat {
    /// Rearms after every firing until cancelled.
    Forever,
    /// Remaining firings. Decremented per firing, expires at zero.
    Times(NonZeroU32),
    /// Polls `ready` on every firing. Once it reports true the timer
    /// either expires (`rearm == false`) or queues its completion and
    /// resumes polling once that has run (`rearm == true`).
    Until { ready: Ready, rearm: bool },
}

impl Repeat {
    /// Counted policy; a count of zero is treated as one.
    pub fn times(n: u32) -> Self {
        Repeat::Times(NonZeroU32::new(n).unwrap_or(NonZeroU32::MIN))
    }

    // decrement-then-compare: Times(n) reports Rearm n-1 times, then Expire
    fn fired(&mut self) -> Fate {
        match self {
            Repeat::Forever => Fate::Rearm,
            Repeat::Times(left) => match NonZeroU32::new(left.get() - 1) {
                Some(next) => {
                    *left = next;
                    Fate::Rearm
                }
                None => Fate::Expire,
            },
            Repeat::Until { ready, rearm } => {
                if !ready() {
                    Fate::Rearm
                } else if *rearm {
                    Fate::Trigger
                } else {
                    Fate::Expire
                }
            }
        }
    }
}

impl fmt::Debug for Repeat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Repeat::Forever => write!(f, "Forever"),
            Repeat::Times(n) => write!(f, "Times({})", n),
            Repeat::Until { rearm: false, .. } => write!(f, "When"),
            Repeat::Until { rearm: true, .. } => write!(f, "Whenever"),
        }
    }
}

/// Outcome of a firing, decided by the repeat policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fate {
    /// Arm again with a freshly computed delay.
    Rearm,
    /// Chain the completion callback, then remove.
    Expire,
    /// Queue the completion callback; arm again after it ran.
    Trigger,
}

pub struct Timer<S> {
    id: TimerId,
    interval_ms: u32,
    random_max_ms: u32,
    repeat: Repeat,
    // None only while the callback is executing
    callback: Option<Callback<S>>,
    on_complete: Option<Callback<S>>,
}

impl<S> Timer<S> {
    pub fn new(id: TimerId, interval_ms: u32, callback: Callback<S>) -> Self {
        Self {
            id,
            interval_ms,
            random_max_ms: 0,
            repeat: Repeat::Forever,
            callback: Some(callback),
            on_complete: None,
        }
    }

    /// Draw each delay from `[interval_ms, random_max_ms)`. Values not
    /// above the interval keep it fixed.
    pub fn with_jitter(mut self, random_max_ms: u32) -> Self {
        self.random_max_ms = random_max_ms;
        self
    }

    pub fn with_repeat(mut self, repeat: Repeat) -> Self {
        self.repeat = repeat;
        self
    }

    pub fn with_completion(mut self, on_complete: Option<Callback<S>>) -> Self {
        self.on_complete = on_complete;
        self
    }

    pub fn id(&self) -> TimerId {
        self.id
    }

    pub fn interval_ms(&self) -> u32 {
        self.interval_ms
    }

    pub fn repeat(&self) -> &Repeat {
        &self.repeat
    }

    pub fn is_random(&self) -> bool {
        self.random_max_ms > self.interval_ms
    }

    /// Firings left for a counted timer.
    pub fn remaining(&self) -> Option<u32> {
        match self.repeat {
            Repeat::Times(n) => Some(n.get()),
            _ => None,
        }
    }

    pub fn next_delay<E: Entropy + ?Sized>(&self, entropy: &mut E) -> u32 {
        if self.is_random() {
            entropy.between(self.interval_ms, self.random_max_ms)
        } else {
            self.interval_ms
        }
    }

    pub(crate) fn fired(&mut self) -> Fate {
        self.repeat.fired()
    }

    pub(crate) fn take_callback(&mut self) -> Option<Callback<S>> {
        self.callback.take()
    }

    pub(crate) fn restore_callback(&mut self, callback: Callback<S>) {
        self.callback = Some(callback);
    }

    pub(crate) fn take_completion(&mut self) -> Option<Callback<S>> {
        self.on_complete.take()
    }

    pub(crate) fn restore_completion(&mut self, on_complete: Callback<S>) {
        self.on_complete = Some(on_complete);
    }
}

impl<S> fmt::Debug for Timer<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("id", &self.id)
            .field("interval_ms", &self.interval_ms)
            .field("random_max_ms", &self.random_max_ms)
            .field("repeat", &self.repeat)
            .field("chained", &self.on_complete.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    // hands out lo, lo+1, ... wrapping inside [lo, hi)
    struct Stepper(u32);

    impl Entropy for Stepper {
        fn between(&mut self, lo: u32, hi: u32) -> u32 {
            let v = lo + self.0 % (hi - lo);
            self.0 += 1;
            v
        }
    }

    fn noop() -> Callback<()> {
        Box::new(|_: &mut ()| {})
    }

    #[test]
    fn test_timer_id_reserved_zero() {
        assert!(TimerId::NONE.is_none());
        assert!(!TimerId::from_raw(1).is_none());
        assert_eq!(TimerId::from_raw(7).get(), 7);
        assert_eq!(format!("{}", TimerId::from_raw(7)), "#7");
    }

    #[test]
    fn test_fixed_delay_ignores_entropy() {
        let timer = Timer::new(TimerId::from_raw(1), 250, noop());
        let mut rng = Stepper(3);
        assert!(!timer.is_random());
        assert_eq!(timer.next_delay(&mut rng), 250);
        assert_eq!(timer.next_delay(&mut rng), 250);
    }

    #[test]
    fn test_jitter_not_above_interval_stays_fixed() {
        let timer = Timer::new(TimerId::from_raw(1), 100, noop()).with_jitter(100);
        assert!(!timer.is_random());
        assert_eq!(timer.next_delay(&mut Stepper(5)), 100);
    }

    #[test]
    fn test_random_delay_within_bounds() {
        let timer = Timer::new(TimerId::from_raw(1), 10, noop()).with_jitter(14);
        let mut rng = Stepper(0);
        let delays: Vec<u32> = (0..8).map(|_| timer.next_delay(&mut rng)).collect();
        assert_eq!(delays, vec![10, 11, 12, 13, 10, 11, 12, 13]);
    }

    #[test]
    fn test_forever_always_rearms() {
        let mut timer = Timer::new(TimerId::from_raw(1), 5, noop());
        for _ in 0..100 {
            assert_eq!(timer.fired(), Fate::Rearm);
        }
        assert_eq!(timer.remaining(), None);
    }

    #[test]
    fn test_countdown_exact_fire_counts() {
        for n in 1..=3u32 {
            let mut timer =
                Timer::new(TimerId::from_raw(1), 5, noop()).with_repeat(Repeat::times(n));
            let mut fates = Vec::new();
            loop {
                let fate = timer.fired();
                fates.push(fate);
                if fate == Fate::Expire {
                    break;
                }
            }
            assert_eq!(fates.len(), n as usize);
            assert!(fates[..n as usize - 1].iter().all(|f| *f == Fate::Rearm));
        }
    }

    #[test]
    fn test_countdown_decrements_remaining() {
        let mut timer = Timer::new(TimerId::from_raw(1), 5, noop()).with_repeat(Repeat::times(3));
        assert_eq!(timer.remaining(), Some(3));
        timer.fired();
        assert_eq!(timer.remaining(), Some(2));
        timer.fired();
        assert_eq!(timer.remaining(), Some(1));
        assert_eq!(timer.fired(), Fate::Expire);
    }

    #[test]
    fn test_zero_count_treated_as_once() {
        let mut timer = Timer::new(TimerId::from_raw(1), 5, noop()).with_repeat(Repeat::times(0));
        assert_eq!(timer.remaining(), Some(1));
        assert_eq!(timer.fired(), Fate::Expire);
    }

    #[test]
    fn test_until_polls_predicate() {
        let flag = Rc::new(Cell::new(false));
        let probe = flag.clone();
        let mut timer = Timer::new(TimerId::from_raw(1), 1, noop()).with_repeat(Repeat::Until {
            ready: Box::new(move || probe.get()),
            rearm: false,
        });
        assert_eq!(timer.fired(), Fate::Rearm);
        assert_eq!(timer.fired(), Fate::Rearm);
        flag.set(true);
        assert_eq!(timer.fired(), Fate::Expire);
    }

    #[test]
    fn test_until_rearming_triggers() {
        let mut timer = Timer::new(TimerId::from_raw(1), 1, noop()).with_repeat(Repeat::Until {
            ready: Box::new(|| true),
            rearm: true,
        });
        assert_eq!(timer.fired(), Fate::Trigger);
        assert_eq!(timer.fired(), Fate::Trigger);
    }

    #[test]
    fn test_callback_take_and_restore() {
        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        let mut timer: Timer<()> =
            Timer::new(TimerId::from_raw(1), 1, Box::new(move |_: &mut ()| h.set(h.get() + 1)));
        let mut cb = timer.take_callback().unwrap();
        assert!(timer.take_callback().is_none());
        cb(&mut ());
        timer.restore_callback(cb);
        let mut again = timer.take_callback().unwrap();
        again(&mut ());
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn test_debug_names_policy() {
        let timer = Timer::new(TimerId::from_raw(4), 5, noop()).with_repeat(Repeat::times(2));
        let s = format!("{:?}", timer);
        assert!(s.contains("Times(2)"));
        assert!(s.contains("chained: false"));
    }
}
