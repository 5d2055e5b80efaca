use std::sync::atomic::{AtomicU64, Ordering};

use super::protocol::MessageKind;

/// Per-node message accounting.
#[derive(Debug, Default)]
pub struct MessageCounters {
    election: AtomicU64,
    coordinator: AtomicU64,
    ping: AtomicU64,
    bootup: AtomicU64,
    id_query: AtomicU64,
    inbound: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CounterSnapshot {
    pub election: u64,
    pub coordinator: u64,
    pub ping: u64,
    pub bootup: u64,
    pub id_query: u64,
    pub inbound: u64,
}

impl CounterSnapshot {
    pub fn outbound(&self) -> u64 {
        self.election + self.coordinator + self.ping + self.bootup + self.id_query
    }
}

impl MessageCounters {
    pub fn record_outbound(&self, kind: MessageKind) {
        let counter = match kind {
            MessageKind::Election => &self.election,
            MessageKind::Coordinator => &self.coordinator,
            MessageKind::Ping => &self.ping,
            MessageKind::MembershipAnnounce => &self.bootup,
            MessageKind::IdQuery => &self.id_query,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_inbound(&self) {
        self.inbound.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            election: self.election.load(Ordering::Relaxed),
            coordinator: self.coordinator.load(Ordering::Relaxed),
            ping: self.ping.load(Ordering::Relaxed),
            bootup: self.bootup.load(Ordering::Relaxed),
            id_query: self.id_query.load(Ordering::Relaxed),
            inbound: self.inbound.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.election,
            &self.coordinator,
            &self.ping,
            &self.bootup,
            &self.id_query,
            &self.inbound,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbound_total_excludes_inbound() {
        let counters = MessageCounters::default();
        counters.record_outbound(MessageKind::Election);
        counters.record_outbound(MessageKind::Election);
        counters.record_outbound(MessageKind::Coordinator);
        counters.record_inbound();

        let snap = counters.snapshot();
        assert_eq!(snap.election, 2);
        assert_eq!(snap.outbound(), 3);
        assert_eq!(snap.inbound, 1);

        counters.reset();
        assert_eq!(counters.snapshot(), CounterSnapshot::default());
    }
}
