use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::models::error::CaptureError;
use crate::models::sample_block::CapturedBlock;
use crate::session::consumer::LoopbackConsumer;
use crate::traits::analyzer::Analyzer;

/// Capture-thread side of a subscribed consumer.
pub(crate) trait SampleConsumer: Send + Sync {
    /// Mirror the shared block and run the consumer's analysis.
    fn process(&self);

    /// Associate with a source. Fails if already associated.
    fn link(&self, link: SourceLink) -> Result<(), CaptureError>;

    /// Drop the association, returning it if there was one.
    fn unlink(&self) -> Option<SourceLink>;
}

/// A consumer's association with one registry and its shared block.
#[derive(Clone)]
pub(crate) struct SourceLink {
    pub(crate) block: Arc<Mutex<CapturedBlock>>,
    pub(crate) registry: Weak<RegistryShared>,
    pub(crate) id: u64,
}

impl SourceLink {
    /// Removes the owning entry from its registry, if the registry still exists.
    pub(crate) fn detach_from_registry(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.entries.lock().retain(|entry| entry.id != self.id);
        }
    }
}

struct Entry {
    id: u64,
    /// Address of the consumer, for lookups by reference.
    address: usize,
    consumer: Weak<dyn SampleConsumer>,
}

pub(crate) struct RegistryShared {
    entries: Mutex<Vec<Entry>>,
    block: Arc<Mutex<CapturedBlock>>,
    next_id: AtomicU64,
}

/// Thread-safe list of consumers fed by one capture source.
///
/// Holds only weak handles: a consumer's lifetime is owned by its caller.
/// Entries whose consumer has been dropped are purged at the start of each
/// dispatch. Cloning yields another handle to the same list.
#[derive(Clone)]
pub struct ConsumerRegistry {
    shared: Arc<RegistryShared>,
}

impl ConsumerRegistry {
    pub fn new(block: Arc<Mutex<CapturedBlock>>) -> Self {
        Self {
            shared: Arc::new(RegistryShared {
                entries: Mutex::new(Vec::new()),
                block,
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Add `consumer` to the fan-out list and wire it to the shared block.
    ///
    /// A consumer already associated with a source (this one or another) is
    /// left untouched and `AlreadySubscribed` is returned.
    pub fn subscribe<A: Analyzer>(&self, consumer: &Arc<LoopbackConsumer<A>>) -> Result<(), CaptureError> {
        let mut entries = self.shared.entries.lock();
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let link = SourceLink {
            block: Arc::clone(&self.shared.block),
            registry: Arc::downgrade(&self.shared),
            id,
        };
        if let Err(e) = consumer.link(link) {
            log::warn!("Consumer is already associated with a sample source; remove it from that source first");
            return Err(e);
        }

        let weak: Weak<LoopbackConsumer<A>> = Arc::downgrade(consumer);
        let weak: Weak<dyn SampleConsumer> = weak;
        entries.push(Entry {
            id,
            address: address_of(consumer),
            consumer: weak,
        });
        log::debug!("Consumer {} subscribed ({} total)", id, entries.len());
        Ok(())
    }

    /// Remove `consumer` from the fan-out list and clear its association.
    ///
    /// Returns `NotSubscribed`, changing nothing, if it is not in this list.
    pub fn unsubscribe<A: Analyzer>(&self, consumer: &Arc<LoopbackConsumer<A>>) -> Result<(), CaptureError> {
        let mut entries = self.shared.entries.lock();
        let address = address_of(consumer);
        let Some(position) = entries.iter().position(|entry| entry.address == address) else {
            log::warn!("Consumer is not associated with this sample source");
            return Err(CaptureError::NotSubscribed);
        };
        let entry = entries.remove(position);
        consumer.unlink();
        log::debug!("Consumer {} unsubscribed ({} remaining)", entry.id, entries.len());
        Ok(())
    }

    /// Whether `consumer` is in this list.
    pub fn contains<A: Analyzer>(&self, consumer: &Arc<LoopbackConsumer<A>>) -> bool {
        let address = address_of(consumer);
        self.shared
            .entries
            .lock()
            .iter()
            .any(|entry| entry.address == address)
    }

    pub fn len(&self) -> usize {
        self.shared.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.entries.lock().is_empty()
    }

    /// The block consumers mirror from.
    pub fn block(&self) -> &Arc<Mutex<CapturedBlock>> {
        &self.shared.block
    }

    /// Purge dropped consumers, then process every live one in
    /// subscription order. Returns the number processed.
    ///
    /// The list lock is released before consumers run, so a consumer may
    /// unsubscribe (or be dropped) from inside the fan-out without deadlock.
    pub(crate) fn dispatch(&self) -> usize {
        let live: Vec<Arc<dyn SampleConsumer>> = {
            let mut entries = self.shared.entries.lock();
            let before = entries.len();
            entries.retain(|entry| entry.consumer.strong_count() > 0);
            if entries.len() != before {
                log::debug!("Purged {} dropped consumers", before - entries.len());
            }
            entries
                .iter()
                .filter_map(|entry| entry.consumer.upgrade())
                .collect()
        };

        for consumer in &live {
            consumer.process();
        }
        live.len()
    }
}

fn address_of<T>(consumer: &Arc<T>) -> usize {
    Arc::as_ptr(consumer) as *const () as usize
}
