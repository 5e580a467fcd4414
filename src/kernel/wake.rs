// Wake signalling between the tick ISR and the main loop
//
// The ISR bumps uptime and the job queue raises WAKE_JOBS on every
// enqueue; the main loop sleeps (WFI) only when nothing is pending.
// Critical section guards riscv32imc (no atomic RMW).

use core::sync::atomic::{AtomicBool, Ordering};

static WAKE_JOBS: AtomicBool = AtomicBool::new(false);

// cs: riscv32imc has no atomic add
static UPTIME_MS: critical_section::Mutex<core::cell::Cell<u32>> =
    critical_section::Mutex::new(core::cell::Cell::new(0));

#[inline]
pub fn signal_jobs() {
    WAKE_JOBS.store(true, Ordering::Release);
}

#[inline]
pub fn signal_tick(elapsed_ms: u32) {
    critical_section::with(|cs| {
        let uptime = UPTIME_MS.borrow(cs);
        uptime.set(uptime.get().wrapping_add(elapsed_ms));
    });
}

/// Consume the "jobs were queued" flag.
pub fn try_wake() -> bool {
    critical_section::with(|_| {
        let pending = WAKE_JOBS.load(Ordering::Relaxed);
        if pending {
            WAKE_JOBS.store(false, Ordering::Relaxed);
        }
        pending
    })
}

pub fn uptime_ms() -> u32 {
    critical_section::with(|cs| UPTIME_MS.borrow(cs).get())
}

#[inline]
pub fn wait_for_interrupt() {
    #[cfg(target_arch = "riscv32")]
    unsafe {
        core::arch::asm!("wfi", options(nomem, nostack));
    }

    #[cfg(not(target_arch = "riscv32"))]
    core::hint::spin_loop();
}
