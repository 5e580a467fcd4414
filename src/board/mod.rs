//! ESP32-C3 binding for the timer scheduler
//!
//! TIMG0 timer0 runs the 1ms periodic interrupt that ticks [`ALARMS`];
//! expired alarms land on [`JOBS`]. TIMG0's watchdog is fed between jobs
//! and the hardware RNG supplies jitter.

use core::cell::RefCell;

use critical_section::Mutex;
use esp_hal::peripherals::TIMG0;
use esp_hal::rng::Rng;
use esp_hal::time::Duration;
use esp_hal::timer::PeriodicTimer;
use esp_hal::timer::timg::{MwdtStage, TimerGroup, Wdt};
use log::info;

use crate::kernel::config::TICK_MS;
use crate::kernel::{Entropy, Hal, JobQueue, Scheduler, SoftAlarms, Watchdog, wake};

/// Fired timer ids, shared with the tick ISR.
pub static JOBS: JobQueue = JobQueue::new();

/// One-shot alarms ticked from the ISR.
pub static ALARMS: SoftAlarms = SoftAlarms::new();

const WATCHDOG_TIMEOUT_SECS: u64 = 5;

static TICK: Mutex<RefCell<Option<PeriodicTimer<'static, esp_hal::Blocking>>>> =
    Mutex::new(RefCell::new(None));

#[esp_hal::handler(priority = esp_hal::interrupt::Priority::Priority1)]
fn tick_handler() {
    critical_section::with(|cs| {
        if let Some(timer) = TICK.borrow_ref_mut(cs).as_mut() {
            timer.clear_interrupt();
        }
    });
    ALARMS.tick(TICK_MS, &JOBS);
    wake::signal_tick(TICK_MS);
}

/// Hardware RNG. Modulo bias is irrelevant at millisecond spans.
pub struct HwEntropy(Rng);

impl Entropy for HwEntropy {
    fn between(&mut self, lo: u32, hi: u32) -> u32 {
        if hi <= lo {
            return lo;
        }
        lo + self.0.random() % (hi - lo)
    }
}

pub struct TimgWatchdog(Wdt<TIMG0<'static>>);

impl Watchdog for TimgWatchdog {
    fn feed(&mut self) {
        self.0.feed();
    }
}

pub type Board = Hal<&'static SoftAlarms, HwEntropy, TimgWatchdog>;
pub type BoardScheduler = Scheduler<Board>;

/// Start the tick interrupt and watchdog, hand back a scheduler bound to
/// the board statics.
pub fn init(timg0: TIMG0<'static>) -> BoardScheduler {
    let timg0 = TimerGroup::new(timg0);

    let mut wdt = timg0.wdt;
    wdt.set_timeout(MwdtStage::Stage0, Duration::from_secs(WATCHDOG_TIMEOUT_SECS));
    wdt.enable();

    let mut tick = PeriodicTimer::new(timg0.timer0);
    critical_section::with(|cs| {
        tick.set_interrupt_handler(tick_handler);
        if tick.start(Duration::from_millis(TICK_MS as u64)).is_err() {
            log::error!("tick timer failed to start");
        }
        tick.listen();
        TICK.borrow_ref_mut(cs).replace(tick);
    });
    info!("tick running every {}ms.", TICK_MS);

    let hal = Hal::new(&ALARMS, HwEntropy(Rng::new())).with_watchdog(TimgWatchdog(wdt));
    Scheduler::new(&JOBS, hal)
}
