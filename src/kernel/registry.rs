// Live timer set, keyed by id
//
// Loop context only; the ISR never touches it. Lookups are a linear
// scan, fine for the handful of timers firmware keeps alive.

use alloc::vec::Vec;

use super::timer::{Timer, TimerId};

pub struct Registry<S> {
    timers: Vec<Timer<S>>,
}

impl<S> Registry<S> {
    pub const fn new() -> Self {
        Self { timers: Vec::new() }
    }

    pub fn insert(&mut self, timer: Timer<S>) {
        self.timers.push(timer);
    }

    pub fn get(&self, id: TimerId) -> Option<&Timer<S>> {
        self.timers.iter().find(|t| t.id() == id)
    }

    pub fn get_mut(&mut self, id: TimerId) -> Option<&mut Timer<S>> {
        self.timers.iter_mut().find(|t| t.id() == id)
    }

    pub fn contains(&self, id: TimerId) -> bool {
        self.get(id).is_some()
    }

    /// Detach a timer; creation order of the rest is kept.
    pub fn remove(&mut self, id: TimerId) -> Option<Timer<S>> {
        let pos = self.timers.iter().position(|t| t.id() == id)?;
        Some(self.timers.remove(pos))
    }

    pub fn oldest(&self) -> Option<TimerId> {
        self.timers.first().map(Timer::id)
    }

    pub fn ids(&self) -> impl Iterator<Item = TimerId> + '_ {
        self.timers.iter().map(Timer::id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Timer<S>> {
        self.timers.iter()
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

impl<S> Default for Registry<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::timer::Repeat;

    fn timer(raw: u32) -> Timer<()> {
        Timer::new(TimerId::from_raw(raw), raw * 10, Box::new(|_: &mut ()| {}))
    }

    #[test]
    fn test_insert_and_find() {
        let mut reg = Registry::new();
        reg.insert(timer(1));
        reg.insert(timer(2));

        assert_eq!(reg.len(), 2);
        assert_eq!(reg.get(TimerId::from_raw(2)).unwrap().interval_ms(), 20);
        assert!(reg.get(TimerId::from_raw(3)).is_none());
        assert!(reg.contains(TimerId::from_raw(1)));
    }

    #[test]
    fn test_get_mut_updates_in_place() {
        let mut reg = Registry::new();
        reg.insert(timer(1).with_repeat(Repeat::times(2)));

        let t = reg.get_mut(TimerId::from_raw(1)).unwrap();
        t.fired();
        assert_eq!(reg.get(TimerId::from_raw(1)).unwrap().remaining(), Some(1));
    }

    #[test]
    fn test_remove_keeps_order() {
        let mut reg = Registry::new();
        for raw in 1..=4 {
            reg.insert(timer(raw));
        }

        let gone = reg.remove(TimerId::from_raw(2)).unwrap();
        assert_eq!(gone.id(), TimerId::from_raw(2));
        assert!(reg.remove(TimerId::from_raw(2)).is_none());

        let ids: Vec<u32> = reg.ids().map(TimerId::get).collect();
        assert_eq!(ids, vec![1, 3, 4]);
        assert_eq!(reg.oldest(), Some(TimerId::from_raw(1)));
    }

    #[test]
    fn test_empty_registry() {
        let mut reg: Registry<()> = Registry::default();
        assert!(reg.is_empty());
        assert_eq!(reg.oldest(), None);
        assert!(reg.remove(TimerId::from_raw(1)).is_none());
    }
}
