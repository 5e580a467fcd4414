// pulp-ticker demo firmware
//
// Boot: logger -> heap -> tick timer -> scheduler -> demo timers.
// Main loop: drain scheduler -> WFI until the tick ISR queues work.

#![no_std]
#![no_main]

use alloc::rc::Rc;
use core::cell::Cell;

use esp_backtrace as _;
use esp_hal::clock::CpuClock;
use log::info;

use pulp_ticker::board;
use pulp_ticker::kernel::wake::{try_wake, uptime_ms, wait_for_interrupt};
use pulp_ticker::then;

extern crate alloc;

esp_bootloader_esp_idf::esp_app_desc!();

const STATUS_INTERVAL_MS: u32 = 5000;

#[esp_hal::main]
fn main() -> ! {
    esp_println::logger::init_logger_from_env();
    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);
    esp_alloc::heap_allocator!(size: 65536);

    info!("booting...");

    let mut sched = board::init(peripherals.TIMG0);
    sched.track_load();

    sched.every(STATUS_INTERVAL_MS, |s| {
        info!("uptime {}ms: {}", uptime_ms(), s.stats());
    });
    sched.every_random(800, 1200, |_| info!("jittered heartbeat"));

    // countdown, then an encore chained off the completion
    let mut left = 3;
    sched.n_times(
        left,
        1000,
        move |_| {
            left -= 1;
            info!("countdown: {} left", left);
        },
        then(|s| {
            info!("countdown done");
            s.once(2000, |_| info!("encore"), None);
        }),
    );

    // a flag flipped by one timer releases a waiting `when`
    let door = Rc::new(Cell::new(false));
    let opener = door.clone();
    sched.once(3000, move |_| opener.set(true), None);
    sched.when(move || door.get(), |_| info!("door open"));

    info!("kernel ready.");

    loop {
        sched.run();
        if !try_wake() {
            wait_for_interrupt();
        }
    }
}
