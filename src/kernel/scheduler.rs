// Timer scheduler: factory API, drain loop, post-firing decisions
//
// Alarms fire in interrupt context and only enqueue an id. Everything
// else (callbacks, arming, registry changes) happens here on the main
// loop, outside the queue lock. Callbacks get the scheduler back so they
// can cancel or schedule more work without global state.
//
// Per timer: Armed -> Queued -> Executing -> Armed | Removed.
// Cancelling removes the timer, disarms it and purges its queued jobs.

use alloc::boxed::Box;
use core::fmt;

use log::{debug, trace, warn};

use super::alarm::{Alarm, Entropy, Platform, Watchdog};
use super::config::Config;
use super::queue::JobQueue;
use super::registry::Registry;
use super::timer::{Callback, Fate, Ready, Repeat, Timer, TimerId};

/// Callback type accepted by the scheduler.
pub type Task<P> = Callback<Scheduler<P>>;

/// Wrap a closure as an optional completion callback.
pub fn then<P, F>(f: F) -> Option<Task<P>>
where
    F: FnMut(&mut Scheduler<P>) + 'static,
{
    Some(Box::new(f))
}

/// Snapshot of scheduler bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stats {
    /// Timers in the registry
    pub live: usize,
    /// Jobs fired but not yet run
    pub queued: usize,
    /// Timers created since boot (wrapping)
    pub created: u32,
    /// Firings lost to a full job queue since boot
    pub dropped: u32,
    /// Timers created during the last load window, see `track_load`
    pub load: u32,
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "live={} queued={} created={} dropped={} load={}",
            self.live, self.queued, self.created, self.dropped, self.load
        )
    }
}

pub struct Scheduler<P> {
    registry: Registry<Scheduler<P>>,
    jobs: &'static JobQueue,
    platform: P,
    config: Config,
    last_id: u32,
    created: u32,
    load: u32,
    load_mark: u32,
    dropped_seen: u32,
}

impl<P: Platform + 'static> Scheduler<P> {
    pub fn new(jobs: &'static JobQueue, platform: P) -> Self {
        Self::with_config(jobs, platform, Config::DEFAULT)
    }

    pub fn with_config(jobs: &'static JobQueue, platform: P, config: Config) -> Self {
        debug!("scheduler: {}", config);
        Self {
            registry: Registry::new(),
            jobs,
            platform,
            config,
            last_id: 0,
            created: 0,
            load: 0,
            load_mark: 0,
            dropped_seen: jobs.dropped(),
        }
    }

    // ── Factory API ─────────────────────────────────────────────────

    /// Run `f` every `ms` until cancelled.
    pub fn every<F>(&mut self, ms: u32, f: F) -> TimerId
    where
        F: FnMut(&mut Self) + 'static,
    {
        self.spawn(ms, 0, Repeat::Forever, Box::new(f), None)
    }

    /// Run `f` repeatedly, each delay drawn from `[rmin, rmax)`.
    pub fn every_random<F>(&mut self, rmin: u32, rmax: u32, f: F) -> TimerId
    where
        F: FnMut(&mut Self) + 'static,
    {
        self.spawn(rmin, rmax, Repeat::Forever, Box::new(f), None)
    }

    /// Run `f` once after `ms`, then `on_complete`.
    pub fn once<F>(&mut self, ms: u32, f: F, on_complete: Option<Task<P>>) -> TimerId
    where
        F: FnMut(&mut Self) + 'static,
    {
        self.spawn(ms, 0, Repeat::times(1), Box::new(f), on_complete)
    }

    pub fn once_random<F>(
        &mut self,
        rmin: u32,
        rmax: u32,
        f: F,
        on_complete: Option<Task<P>>,
    ) -> TimerId
    where
        F: FnMut(&mut Self) + 'static,
    {
        self.spawn(rmin, rmax, Repeat::times(1), Box::new(f), on_complete)
    }

    /// Run `f` `n` times, `ms` apart; `on_complete` follows the last run.
    /// `n == 0` behaves like `once`.
    pub fn n_times<F>(&mut self, n: u32, ms: u32, f: F, on_complete: Option<Task<P>>) -> TimerId
    where
        F: FnMut(&mut Self) + 'static,
    {
        self.spawn(ms, 0, Repeat::times(n), Box::new(f), on_complete)
    }

    pub fn n_times_random<F>(
        &mut self,
        n: u32,
        rmin: u32,
        rmax: u32,
        f: F,
        on_complete: Option<Task<P>>,
    ) -> TimerId
    where
        F: FnMut(&mut Self) + 'static,
    {
        self.spawn(rmin, rmax, Repeat::times(n), Box::new(f), on_complete)
    }

    /// Like `n_times` with `n` drawn once from `[tmin, tmax)`.
    pub fn random_times<F>(
        &mut self,
        tmin: u32,
        tmax: u32,
        ms: u32,
        f: F,
        on_complete: Option<Task<P>>,
    ) -> TimerId
    where
        F: FnMut(&mut Self) + 'static,
    {
        let n = self.platform.between(tmin, tmax);
        self.spawn(ms, 0, Repeat::times(n), Box::new(f), on_complete)
    }

    pub fn random_times_random<F>(
        &mut self,
        tmin: u32,
        tmax: u32,
        rmin: u32,
        rmax: u32,
        f: F,
        on_complete: Option<Task<P>>,
    ) -> TimerId
    where
        F: FnMut(&mut Self) + 'static,
    {
        let n = self.platform.between(tmin, tmax);
        self.spawn(rmin, rmax, Repeat::times(n), Box::new(f), on_complete)
    }

    /// Queue `f` for the next drain, no delay.
    pub fn run_now<F>(&mut self, f: F) -> TimerId
    where
        F: FnMut(&mut Self) + 'static,
    {
        self.spawn(0, 0, Repeat::times(1), Box::new(f), None)
    }

    /// Same as [`run_now`](Self::run_now).
    pub fn queue_function<F>(&mut self, f: F) -> TimerId
    where
        F: FnMut(&mut Self) + 'static,
    {
        self.run_now(f)
    }

    /// Run `f` once, the first time `ready` returns true. Polled every
    /// `poll_interval_ms`.
    pub fn when<W, F>(&mut self, ready: W, f: F) -> TimerId
    where
        W: FnMut() -> bool + 'static,
        F: FnMut(&mut Self) + 'static,
    {
        self.poll_until(Box::new(ready), false, Box::new(f))
    }

    /// Run `f` every time `ready` returns true, then keep polling under the
    /// same id. `f` is queued behind jobs already waiting; polling resumes
    /// after it ran. `f` must make `ready` false again, otherwise it runs
    /// on every poll.
    pub fn whenever<W, F>(&mut self, ready: W, f: F) -> TimerId
    where
        W: FnMut() -> bool + 'static,
        F: FnMut(&mut Self) + 'static,
    {
        self.poll_until(Box::new(ready), true, Box::new(f))
    }

    /// Start sampling `Stats::load` every `load_window_ms`.
    pub fn track_load(&mut self) -> TimerId {
        let window = self.config.load_window_ms;
        self.every(window, Self::sample_load)
    }

    // ── Cancellation ────────────────────────────────────────────────

    /// Cancel one timer. Returns false (and does nothing) for an unknown id.
    pub fn never(&mut self, id: TimerId) -> bool {
        if id.is_none() {
            return false;
        }
        self.remove(id)
    }

    /// Cancel every timer, including one that is currently running.
    pub fn never_all(&mut self) -> usize {
        let mut n = 0;
        while let Some(id) = self.registry.oldest() {
            self.remove(id);
            n += 1;
        }
        if n > 0 {
            debug!("cancelled all {} timers", n);
        }
        n
    }

    // ── Main loop ───────────────────────────────────────────────────

    /// Drain the job queue. Call from the main loop as often as possible.
    /// Feeds the watchdog on entry and after every job. Returns how many
    /// jobs ran.
    pub fn run(&mut self) -> usize {
        self.platform.feed();
        let mut ran = 0;
        while self.run_one() {
            ran += 1;
            self.platform.feed();
        }
        ran
    }

    /// Run the oldest queued job, if any.
    pub fn run_one(&mut self) -> bool {
        self.note_drops();

        let Some(id) = self.jobs.pop() else {
            return false;
        };
        let Some(mut callback) = self.registry.get_mut(id).and_then(Timer::take_callback) else {
            trace!("timer {} gone before it ran", id);
            return true;
        };

        trace!("timer {} fired", id);
        callback(&mut *self);
        if let Some(timer) = self.registry.get_mut(id) {
            timer.restore_callback(callback);
        }

        self.settle(id);
        true
    }

    // ── Introspection ───────────────────────────────────────────────

    pub fn is_live(&self, id: TimerId) -> bool {
        self.registry.contains(id)
    }

    pub fn timer(&self, id: TimerId) -> Option<&Timer<Self>> {
        self.registry.get(id)
    }

    pub fn timers(&self) -> impl Iterator<Item = &Timer<Self>> {
        self.registry.iter()
    }

    pub fn live(&self) -> usize {
        self.registry.len()
    }

    pub fn pending(&self) -> usize {
        self.jobs.len()
    }

    pub fn stats(&self) -> Stats {
        Stats {
            live: self.registry.len(),
            queued: self.jobs.len(),
            created: self.created,
            dropped: self.jobs.dropped(),
            load: self.load,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn jobs(&self) -> &'static JobQueue {
        self.jobs
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    // ── Internals ───────────────────────────────────────────────────

    fn spawn(
        &mut self,
        interval_ms: u32,
        random_max_ms: u32,
        repeat: Repeat,
        callback: Task<P>,
        on_complete: Option<Task<P>>,
    ) -> TimerId {
        let id = self.allocate_id();
        let timer = Timer::new(id, interval_ms, callback)
            .with_jitter(random_max_ms)
            .with_repeat(repeat)
            .with_completion(on_complete);
        debug!("timer {} created: {:?}", id, timer);

        self.registry.insert(timer);
        // one pending job per live timer at most
        self.jobs.reserve(self.registry.len());
        self.created = self.created.wrapping_add(1);
        self.arm(id, true);
        id
    }

    fn poll_until(&mut self, ready: Ready, rearm: bool, f: Task<P>) -> TimerId {
        let poll = self.config.poll_interval_ms;
        self.spawn(
            poll,
            0,
            Repeat::Until { ready, rearm },
            Box::new(|_: &mut Self| {}),
            Some(f),
        )
    }

    // skips 0 and anything still live after the counter wraps
    fn allocate_id(&mut self) -> TimerId {
        loop {
            self.last_id = self.last_id.wrapping_add(1);
            let id = TimerId::from_raw(self.last_id);
            if !id.is_none() && !self.registry.contains(id) {
                return id;
            }
        }
    }

    fn arm(&mut self, id: TimerId, fresh: bool) {
        let Some(timer) = self.registry.get(id) else {
            return;
        };
        let delay = timer.next_delay(&mut self.platform);

        // a brand-new zero-delay timer skips the alarm; rearms never do,
        // so a zero interval cannot starve the loop
        if fresh && delay == 0 {
            if let Err(e) = self.jobs.enqueue(id) {
                warn!("{}", e);
            }
            return;
        }
        trace!("timer {} armed for {}ms", id, delay);
        self.platform.arm_once(id, delay);
    }

    // post-firing decision, once per executed job
    fn settle(&mut self, id: TimerId) {
        let Some(timer) = self.registry.get_mut(id) else {
            trace!("timer {} cancelled while running", id);
            return;
        };

        match timer.fired() {
            Fate::Rearm => self.arm(id, false),
            Fate::Expire => {
                if let Some(chain) = timer.take_completion() {
                    self.spawn(0, 0, Repeat::times(1), chain, None);
                }
                self.remove(id);
            }
            Fate::Trigger => match timer.take_completion() {
                Some(on_ready) => {
                    let job = Self::resume_after(id, on_ready);
                    self.spawn(0, 0, Repeat::times(1), job, None);
                }
                None => self.arm(id, false),
            },
        }
    }

    // queued `whenever` completion: runs only if the poller is still live,
    // then hands the callback back and re-arms the poller
    fn resume_after(id: TimerId, on_ready: Task<P>) -> Task<P> {
        let mut slot = Some(on_ready);
        Box::new(move |s: &mut Self| {
            let Some(mut on_ready) = slot.take() else {
                return;
            };
            if !s.is_live(id) {
                return;
            }
            on_ready(&mut *s);
            if let Some(timer) = s.registry.get_mut(id) {
                timer.restore_completion(on_ready);
                s.arm(id, false);
            }
        })
    }

    fn remove(&mut self, id: TimerId) -> bool {
        let Some(timer) = self.registry.remove(id) else {
            return false;
        };
        // disarm before purging so a firing in between is caught
        self.platform.disarm(id);
        let purged = self.jobs.purge(id);
        debug!("timer {} removed ({} queued jobs purged)", id, purged);
        drop(timer);
        true
    }

    fn sample_load(&mut self) {
        self.load = self.created.wrapping_sub(self.load_mark);
        self.load_mark = self.created;
        trace!("load: {} timers/window", self.load);
    }

    fn note_drops(&mut self) {
        let dropped = self.jobs.dropped();
        if dropped != self.dropped_seen {
            warn!(
                "job queue full: {} firings dropped",
                dropped.wrapping_sub(self.dropped_seen)
            );
            self.dropped_seen = dropped;
        }
    }
}
