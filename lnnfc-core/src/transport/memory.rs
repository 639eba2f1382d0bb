// File: lnnfc-core/src/transport/memory.rs
//
// In-process reader emulating NTAG21x tags. Cloning yields another handle
// onto the same emulated reader, so a test can keep one while the loader or
// processor owns the other.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, trace};

use lnnfc_common::error::TransportError;
use lnnfc_common::models::tag::TagId;
use lnnfc_common::traits::TagTransport;

/// NTAG215 user memory.
pub const NTAG215_CAPACITY: usize = 504;

/// What `clear()` leaves behind: an empty NDEF TLV, terminator, padding.
pub const CLEARED_IMAGE: [u8; 4] = [0x03, 0x00, 0xFE, 0x00];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportOp {
    Connect,
    Wait,
    Read,
    Write,
    Clear,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryTag {
    pub id: TagId,
    pub memory: Vec<u8>,
    pub capacity: usize,
    pub write_protected: bool,
}

impl MemoryTag {
    /// Formatted, empty NTAG215.
    pub fn blank(id: TagId) -> Self {
        Self {
            id,
            memory: CLEARED_IMAGE.to_vec(),
            capacity: NTAG215_CAPACITY,
            write_protected: false,
        }
    }

    pub fn with_memory(id: TagId, memory: Vec<u8>) -> Self {
        Self { memory, ..Self::blank(id) }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn write_protected(mut self) -> Self {
        self.write_protected = true;
        self
    }
}

#[derive(Debug, Default)]
struct ReaderState {
    connected: bool,
    /// `None` entries are empty poll cycles.
    script: VecDeque<Option<TagId>>,
    /// Tag lying on the reader once the script runs out.
    resting: Option<TagId>,
    current: Option<TagId>,
    tags: HashMap<TagId, MemoryTag>,
    faults: HashMap<TransportOp, VecDeque<TransportError>>,
    corrupt_writes: bool,
    realtime: bool,
    connects: usize,
    disconnects: usize,
    writes: usize,
    clears: usize,
}

impl ReaderState {
    fn take_fault(&mut self, op: TransportOp) -> Result<(), TransportError> {
        match self.faults.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => {
                debug!("Simulated transport fault on {op:?}: {err}");
                Err(err)
            }
            None => Ok(()),
        }
    }

    fn ensure_connected(&self) -> Result<(), TransportError> {
        if self.connected { Ok(()) } else { Err(TransportError::NotConnected) }
    }

    fn current_tag(&mut self) -> Result<&mut MemoryTag, TransportError> {
        let id = self.current.clone().ok_or(TransportError::TagLost)?;
        Ok(self
            .tags
            .entry(id.clone())
            .or_insert_with(|| MemoryTag::blank(id)))
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<ReaderState>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ReaderState> {
        // a panicking test thread must not wedge the other handles
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Empty waits sleep for their full timeout instead of returning at once.
    pub fn with_realtime(self, realtime: bool) -> Self {
        self.state().realtime = realtime;
        self
    }

    pub fn insert_tag(&self, tag: MemoryTag) {
        self.state().tags.insert(tag.id.clone(), tag);
    }

    /// Queues one detection of `id` (a blank tag is created if unknown).
    pub fn present(&self, id: TagId) {
        self.state().script.push_back(Some(id));
    }

    /// Queues one poll cycle that sees no tag.
    pub fn present_nothing(&self) {
        self.state().script.push_back(None);
    }

    /// Leaves a tag on the reader until `remove` is called.
    pub fn place(&self, id: TagId) {
        self.state().resting = Some(id);
    }

    pub fn remove(&self) {
        let mut state = self.state();
        state.resting = None;
        state.current = None;
    }

    pub fn fail_next(&self, op: TransportOp, err: TransportError) {
        self.state().faults.entry(op).or_default().push_back(err);
    }

    /// Accepted writes land with one payload byte flipped.
    pub fn set_corrupt_writes(&self, corrupt: bool) {
        self.state().corrupt_writes = corrupt;
    }

    pub fn tag_memory(&self, id: &TagId) -> Option<Vec<u8>> {
        self.state().tags.get(id).map(|t| t.memory.clone())
    }

    pub fn is_connected(&self) -> bool {
        self.state().connected
    }

    pub fn connects(&self) -> usize {
        self.state().connects
    }

    pub fn disconnects(&self) -> usize {
        self.state().disconnects
    }

    pub fn writes(&self) -> usize {
        self.state().writes
    }

    pub fn clears(&self) -> usize {
        self.state().clears
    }

    pub fn pending_presentations(&self) -> usize {
        self.state().script.len()
    }
}

#[async_trait]
impl TagTransport for MemoryTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        let mut state = self.state();
        state.take_fault(TransportOp::Connect)?;
        state.connected = true;
        state.connects += 1;
        debug!("Simulated reader connected");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        let mut state = self.state();
        state.connected = false;
        state.current = None;
        state.disconnects += 1;
        debug!("Simulated reader disconnected");
        Ok(())
    }

    async fn wait_for_tag(&mut self, timeout: Duration) -> Result<Option<TagId>, TransportError> {
        let idle_sleep = {
            let mut state = self.state();
            state.ensure_connected()?;
            state.take_fault(TransportOp::Wait)?;

            let next = match state.script.pop_front() {
                Some(scripted) => scripted,
                None => state.resting.clone(),
            };
            state.current = next.clone();
            match next {
                Some(id) => {
                    trace!("Simulated tag {id} in field");
                    return Ok(Some(id));
                }
                None => state.realtime,
            }
        };

        if idle_sleep {
            tokio::time::sleep(timeout).await;
        }
        Ok(None)
    }

    async fn read_message(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        let mut state = self.state();
        state.ensure_connected()?;
        state.take_fault(TransportOp::Read)?;
        let tag = state.current_tag()?;
        if tag.memory.is_empty() {
            return Ok(None);
        }
        Ok(Some(tag.memory.clone()))
    }

    async fn write_message(&mut self, data: &[u8]) -> Result<bool, TransportError> {
        let mut state = self.state();
        state.ensure_connected()?;
        state.take_fault(TransportOp::Write)?;
        let corrupt = state.corrupt_writes;

        let tag = state.current_tag()?;
        if tag.write_protected {
            debug!("Simulated tag {} is write-protected", tag.id);
            return Ok(false);
        }
        if data.len() > tag.capacity {
            debug!("{} bytes exceed simulated capacity {}", data.len(), tag.capacity);
            return Ok(false);
        }

        let mut image = data.to_vec();
        if corrupt && image.len() >= 2 {
            let i = image.len() - 2;
            image[i] ^= 0x01;
        }
        tag.memory = image;
        state.writes += 1;
        Ok(true)
    }

    async fn clear(&mut self) -> Result<bool, TransportError> {
        let mut state = self.state();
        state.ensure_connected()?;
        state.take_fault(TransportOp::Clear)?;

        let tag = state.current_tag()?;
        if tag.write_protected {
            return Ok(false);
        }
        tag.memory = CLEARED_IMAGE.to_vec();
        state.clears += 1;
        Ok(true)
    }
}
