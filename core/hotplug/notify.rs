//! Hotplug notifications
//!
//! Subsystems that keep per-core state (timers, interrupt affinity, power
//! management) register a [`HotplugNotifier`] together with the events they
//! care about. Events are delivered after every hotplug lock is released.

use bitflags::bitflags;
use heapless::Vec;

use super::CoreId;
use crate::core::sync::SpinLock;
use crate::Error;

/// CPU hotplug event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotplugEvent {
    /// Runnable tasks were evacuated off the core
    TasksMigrated(CoreId),
    /// Core was powered down
    Offline(CoreId),
    /// An offline request for the core failed
    OfflineFailed(CoreId, Error),
}

impl HotplugEvent {
    /// Interest bit matching this event
    pub fn kind(&self) -> HotplugEvents {
        match self {
            HotplugEvent::TasksMigrated(_) => HotplugEvents::TASKS_MIGRATED,
            HotplugEvent::Offline(_) => HotplugEvents::OFFLINE,
            HotplugEvent::OfflineFailed(..) => HotplugEvents::OFFLINE_FAILED,
        }
    }

    /// Core the event refers to
    pub fn core(&self) -> CoreId {
        match *self {
            HotplugEvent::TasksMigrated(core)
            | HotplugEvent::Offline(core)
            | HotplugEvent::OfflineFailed(core, _) => core,
        }
    }
}

bitflags! {
    /// Set of hotplug events a notifier subscribes to
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HotplugEvents: u8 {
        /// Tasks evacuated off a core
        const TASKS_MIGRATED = 1 << 0;
        /// Core powered down
        const OFFLINE = 1 << 1;
        /// Offline request failed
        const OFFLINE_FAILED = 1 << 2;
    }
}

/// CPU hotplug notification callback
///
/// Called without any hotplug or notifier lock held, so an implementation may
/// register further notifiers. Those only see later events.
pub trait HotplugNotifier: Sync {
    /// Called once per subscribed event
    fn notify(&self, event: HotplugEvent);
}

#[derive(Clone, Copy)]
struct Registration<'a> {
    interest: HotplugEvents,
    notifier: &'a dyn HotplugNotifier,
}

/// Bounded notifier table
pub struct NotifierChain<'a, const M: usize> {
    entries: SpinLock<Vec<Registration<'a>, M>>,
}

impl<'a, const M: usize> NotifierChain<'a, M> {
    /// Create an empty chain
    pub const fn new() -> Self {
        Self {
            entries: SpinLock::new(Vec::new()),
        }
    }

    /// Add a notifier for the events in `interest`
    pub fn register(
        &self,
        interest: HotplugEvents,
        notifier: &'a dyn HotplugNotifier,
    ) -> Result<(), Error> {
        self.entries
            .lock()
            .push(Registration { interest, notifier })
            .map_err(|_| Error::NotifierTableFull)
    }

    /// Number of registered notifiers
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Check if no notifier is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `event` to every subscribed notifier, in registration order
    pub fn notify(&self, event: HotplugEvent) {
        log::debug!("Hotplug: Event {:?}", event);
        let kind = event.kind();
        let targets: Vec<&'a dyn HotplugNotifier, M> = self
            .entries
            .lock()
            .iter()
            .filter(|entry| entry.interest.contains(kind))
            .map(|entry| entry.notifier)
            .collect();
        for notifier in targets {
            notifier.notify(event);
        }
    }
}

impl<'a, const M: usize> Default for NotifierChain<'a, M> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::boxed::Box;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<std::vec::Vec<HotplugEvent>>,
    }

    impl HotplugNotifier for Recorder {
        fn notify(&self, event: HotplugEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    #[test]
    fn test_delivery_respects_interest() {
        let all = Recorder::default();
        let failures = Recorder::default();
        let chain: NotifierChain<'_, 4> = NotifierChain::new();
        chain.register(HotplugEvents::all(), &all).unwrap();
        chain.register(HotplugEvents::OFFLINE_FAILED, &failures).unwrap();

        chain.notify(HotplugEvent::TasksMigrated(CoreId::new(1)));
        chain.notify(HotplugEvent::Offline(CoreId::new(1)));
        chain.notify(HotplugEvent::OfflineFailed(CoreId::new(2), Error::Busy));

        assert_eq!(all.events.lock().unwrap().len(), 3);
        assert_eq!(
            *failures.events.lock().unwrap(),
            [HotplugEvent::OfflineFailed(CoreId::new(2), Error::Busy)]
        );
    }

    #[test]
    fn test_table_full() {
        let recorder = Recorder::default();
        let chain: NotifierChain<'_, 2> = NotifierChain::new();
        assert!(chain.is_empty());
        chain.register(HotplugEvents::OFFLINE, &recorder).unwrap();
        chain.register(HotplugEvents::OFFLINE, &recorder).unwrap();
        assert_eq!(
            chain.register(HotplugEvents::OFFLINE, &recorder),
            Err(Error::NotifierTableFull)
        );
        assert_eq!(chain.len(), 2);
    }

    struct Subscriber {
        chain: &'static NotifierChain<'static, 4>,
        late: &'static Recorder,
        seen_len: Mutex<std::vec::Vec<usize>>,
    }

    impl HotplugNotifier for Subscriber {
        fn notify(&self, _event: HotplugEvent) {
            self.seen_len.lock().unwrap().push(self.chain.len());
            let _ = self.chain.register(HotplugEvents::OFFLINE, self.late);
        }
    }

    #[test]
    fn test_notifier_registers_from_callback() {
        let chain: &'static NotifierChain<'static, 4> = Box::leak(Box::new(NotifierChain::new()));
        let late: &'static Recorder = Box::leak(Box::default());
        let subscriber: &'static Subscriber = Box::leak(Box::new(Subscriber {
            chain,
            late,
            seen_len: Mutex::new(std::vec::Vec::new()),
        }));
        chain.register(HotplugEvents::OFFLINE, subscriber).unwrap();

        chain.notify(HotplugEvent::Offline(CoreId::new(1)));
        assert_eq!(chain.len(), 2);
        assert!(late.events.lock().unwrap().is_empty());

        chain.notify(HotplugEvent::Offline(CoreId::new(2)));
        assert_eq!(*subscriber.seen_len.lock().unwrap(), [1, 2]);
        assert_eq!(
            *late.events.lock().unwrap(),
            [HotplugEvent::Offline(CoreId::new(2))]
        );
        assert!(!chain.entries.is_locked());
    }

    #[test]
    fn test_event_core_and_kind() {
        let event = HotplugEvent::OfflineFailed(CoreId::new(3), Error::Busy);
        assert_eq!(event.core(), CoreId::new(3));
        assert_eq!(event.kind(), HotplugEvents::OFFLINE_FAILED);
    }
}
