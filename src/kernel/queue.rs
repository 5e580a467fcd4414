// Job queue: the only thing ISRs and the main loop share
//
// FIFO of fired timer ids behind a critical-section mutex. The ISR side
// (enqueue) never allocates; when the ring is full the id is dropped and
// counted. The loop grows the ring ahead of time (reserve) so it can hold
// one pending job per live timer, which is all a one-shot alarm can
// produce.

use alloc::vec;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt;

use embassy_sync::blocking_mutex::CriticalSectionMutex;

use super::timer::TimerId;
use super::wake;

/// Smallest ring the loop allocates once any timer exists.
pub const MIN_CAPACITY: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    /// Ring is full, contains the rejected id
    Full(TimerId),
}

impl fmt::Display for PushError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushError::Full(id) => write!(f, "job queue full, rejected {}", id),
        }
    }
}

// ring buffer of ids
struct JobRing {
    buf: Vec<Option<TimerId>>,
    head: usize, // next to read
    tail: usize, // next to write
    len: usize,
    dropped: u32,
}

impl JobRing {
    const fn new() -> Self {
        Self {
            buf: Vec::new(),
            head: 0,
            tail: 0,
            len: 0,
            dropped: 0,
        }
    }

    fn capacity(&self) -> usize {
        self.buf.len()
    }

    fn push(&mut self, id: TimerId) -> Result<(), TimerId> {
        let cap = self.capacity();
        if self.len >= cap {
            self.dropped = self.dropped.wrapping_add(1);
            return Err(id);
        }
        self.buf[self.tail] = Some(id);
        self.tail = (self.tail + 1) % cap;
        self.len += 1;
        Ok(())
    }

    fn pop(&mut self) -> Option<TimerId> {
        if self.len == 0 {
            return None;
        }
        let id = self.buf[self.head].take();
        self.head = (self.head + 1) % self.capacity();
        self.len -= 1;
        id
    }

    fn peek(&self) -> Option<TimerId> {
        if self.len == 0 {
            None
        } else {
            self.buf[self.head]
        }
    }

    fn contains(&self, id: TimerId) -> bool {
        let cap = self.capacity();
        (0..self.len).any(|i| self.buf[(self.head + i) % cap] == Some(id))
    }

    // compacts in place, FIFO order of survivors kept
    fn retain(&mut self, mut keep: impl FnMut(TimerId) -> bool) -> usize {
        let cap = self.capacity();
        let len = self.len;
        let mut write = self.head;
        let mut kept = 0;
        for i in 0..len {
            let read = (self.head + i) % cap;
            let Some(id) = self.buf[read].take() else {
                continue;
            };
            if keep(id) {
                self.buf[write] = Some(id);
                write = (write + 1) % cap;
                kept += 1;
            }
        }
        self.len = kept;
        self.tail = write;
        len - kept
    }

    // moves pending ids into `fresh` (front first); hands the old buffer back
    fn regrow(&mut self, mut fresh: Vec<Option<TimerId>>) -> Vec<Option<TimerId>> {
        let mut n = 0;
        while let Some(id) = self.pop() {
            fresh[n] = Some(id);
            n += 1;
        }
        let cap = fresh.len();
        let stale = core::mem::replace(&mut self.buf, fresh);
        self.head = 0;
        self.tail = n % cap;
        self.len = n;
        stale
    }

    fn clear(&mut self) {
        while self.pop().is_some() {}
    }
}

pub struct JobQueue {
    ring: CriticalSectionMutex<RefCell<JobRing>>,
}

impl JobQueue {
    pub const fn new() -> Self {
        Self {
            ring: CriticalSectionMutex::new(RefCell::new(JobRing::new())),
        }
    }

    /// ISR side. Never allocates or blocks beyond the critical section.
    pub fn enqueue(&self, id: TimerId) -> Result<(), PushError> {
        let pushed = self.ring.lock(|ring| ring.borrow_mut().push(id));
        match pushed {
            Ok(()) => {
                wake::signal_jobs();
                Ok(())
            }
            Err(id) => Err(PushError::Full(id)),
        }
    }

    /// Oldest pending job. The lock is released before this returns.
    pub fn pop(&self) -> Option<TimerId> {
        self.ring.lock(|ring| ring.borrow_mut().pop())
    }

    pub fn peek(&self) -> Option<TimerId> {
        self.ring.lock(|ring| ring.borrow().peek())
    }

    /// Drop every pending job for `id`; returns how many were removed.
    pub fn purge(&self, id: TimerId) -> usize {
        self.ring
            .lock(|ring| ring.borrow_mut().retain(|queued| queued != id))
    }

    pub fn contains(&self, id: TimerId) -> bool {
        self.ring.lock(|ring| ring.borrow().contains(id))
    }

    /// Loop side: make room for at least `capacity` pending jobs. The new
    /// buffer is allocated and the old one freed outside the lock.
    pub fn reserve(&self, capacity: usize) {
        if self.capacity() >= capacity {
            return;
        }
        let target = capacity.next_power_of_two().max(MIN_CAPACITY);
        let fresh = vec![None; target];
        let stale = self.ring.lock(|ring| ring.borrow_mut().regrow(fresh));
        drop(stale);
    }

    pub fn len(&self) -> usize {
        self.ring.lock(|ring| ring.borrow().len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.ring.lock(|ring| ring.borrow().capacity())
    }

    /// Firings rejected because the ring was full, since boot.
    pub fn dropped(&self) -> u32 {
        self.ring.lock(|ring| ring.borrow().dropped)
    }

    pub fn clear(&self) {
        self.ring.lock(|ring| ring.borrow_mut().clear())
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}
