//! Inbound table that stitches fragment chunks back into packets.
//!
//! [`FragmentTable`] mirrors the outbound
//! [`Fragmenter`](crate::fragment::Fragmenter): chunks are collected per
//! [`FragmentId`] under a single lock and the assembled packet is returned
//! exactly once, when the terminal chunk and every chunk before it have
//! arrived. Stale groups are evicted by [`FragmentTable::purge_expired`].
//! Clock readings come from `tokio::time` so paused-clock tests can drive
//! expiry deterministically.

use std::{
    collections::{HashMap, hash_map::Entry},
    sync::Mutex,
    time::Duration,
};

use bytes::{Bytes, BytesMut};
use tokio::time::Instant;

use super::{FragmentHeader, FragmentId, FragmentIndex, ReassemblyError};

#[derive(Debug)]
struct FragmentGroup {
    chunks: Vec<Option<Bytes>>,
    received: usize,
    last: Option<FragmentIndex>,
    created_at: Instant,
}

impl FragmentGroup {
    fn new(created_at: Instant) -> Self {
        Self {
            chunks: Vec::new(),
            received: 0,
            last: None,
            created_at,
        }
    }

    /// Store a chunk, returning whether the group is now complete.
    fn insert(&mut self, header: FragmentHeader, payload: Bytes) -> Result<bool, ReassemblyError> {
        let index = header.index();
        if header.is_last() {
            if let Some(first) = self.last
                && first != index
            {
                return Err(ReassemblyError::ConflictingTerminal {
                    id: header.id(),
                    first,
                    second: index,
                });
            }
            if self.chunks.len() > index.as_usize() + 1 {
                let beyond = self.chunks.len() - 1;
                return Err(ReassemblyError::IndexBeyondTerminal {
                    id: header.id(),
                    index: FragmentIndex::try_from(beyond).unwrap_or(FragmentIndex::MAX),
                    last: index,
                });
            }
            self.last = Some(index);
        } else if let Some(last) = self.last
            && index > last
        {
            return Err(ReassemblyError::IndexBeyondTerminal {
                id: header.id(),
                index,
                last,
            });
        }

        let slot = index.as_usize();
        if self.chunks.len() <= slot {
            self.chunks.resize(slot + 1, None);
        }
        if self.chunks[slot].replace(payload).is_none() {
            self.received += 1;
        }
        Ok(self
            .last
            .is_some_and(|last| self.received == last.as_usize() + 1))
    }

    fn assemble(self) -> Bytes {
        let total = self.chunks.iter().flatten().map(Bytes::len).sum();
        let mut packet = BytesMut::with_capacity(total);
        for chunk in self.chunks.into_iter().flatten() {
            packet.extend_from_slice(&chunk);
        }
        packet.freeze()
    }
}

/// Lock-protected reassembly state for one connection.
#[derive(Debug)]
pub struct FragmentTable {
    expiry: Duration,
    groups: Mutex<HashMap<FragmentId, FragmentGroup>>,
}

impl FragmentTable {
    /// Create an empty table evicting groups older than `expiry`.
    #[must_use]
    pub fn new(expiry: Duration) -> Self {
        Self {
            expiry,
            groups: Mutex::new(HashMap::new()),
        }
    }

    /// Feed one chunk using the current time.
    ///
    /// Returns `Ok(Some(packet))` when the chunk completes its group and
    /// `Ok(None)` while more chunks are required.
    ///
    /// # Errors
    ///
    /// Returns [`ReassemblyError`] if the chunk contradicts the group's
    /// terminal chunk. The whole group is discarded in that case.
    pub fn accept(
        &self,
        header: FragmentHeader,
        payload: Bytes,
    ) -> Result<Option<Bytes>, ReassemblyError> {
        self.accept_at(header, payload, Instant::now())
    }

    /// Feed one chunk using an explicit clock reading.
    ///
    /// `now` only matters for the first chunk of a group, which records the
    /// group's creation time.
    ///
    /// # Errors
    ///
    /// See [`accept`](Self::accept).
    pub fn accept_at(
        &self,
        header: FragmentHeader,
        payload: Bytes,
        now: Instant,
    ) -> Result<Option<Bytes>, ReassemblyError> {
        let mut groups = self.groups.lock().expect("lock poisoned");
        match groups.entry(header.id()) {
            Entry::Occupied(mut occupied) => match occupied.get_mut().insert(header, payload) {
                Ok(true) => Ok(Some(occupied.remove().assemble())),
                Ok(false) => Ok(None),
                Err(err) => {
                    occupied.remove();
                    Err(err)
                }
            },
            Entry::Vacant(vacant) => {
                let mut group = FragmentGroup::new(now);
                if group.insert(header, payload)? {
                    Ok(Some(group.assemble()))
                } else {
                    vacant.insert(group);
                    Ok(None)
                }
            }
        }
    }

    /// Evict incomplete groups older than the expiry threshold.
    ///
    /// Returns the identifiers of evicted groups.
    pub fn purge_expired(&self) -> Vec<FragmentId> { self.purge_expired_at(Instant::now()) }

    /// Evict incomplete groups using an explicit clock reading.
    pub fn purge_expired_at(&self, now: Instant) -> Vec<FragmentId> {
        let mut evicted = Vec::new();
        let expiry = self.expiry;
        let mut groups = self.groups.lock().expect("lock poisoned");
        groups.retain(|id, group| {
            let expired = now.saturating_duration_since(group.created_at) >= expiry;
            if expired {
                evicted.push(*id);
            }
            !expired
        });
        evicted
    }

    /// Drop every buffered group.
    pub fn clear(&self) { self.groups.lock().expect("lock poisoned").clear(); }

    /// Number of incomplete groups currently buffered.
    #[must_use]
    pub fn len(&self) -> usize { self.groups.lock().expect("lock poisoned").len() }

    /// Whether no group is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// The configured expiry threshold.
    #[must_use]
    pub fn expiry(&self) -> Duration { self.expiry }
}
