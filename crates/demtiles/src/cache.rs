//! Bounded decoded-tile cache with fetch coalescing.
//!
//! The store owns every decoded tile, keyed by tile address, with
//! least-recently-used eviction at a capacity fixed at construction. Reads
//! and inserts both mark an entry most-recently-used.
//!
//! Concurrent requests for the same address are coalesced: the first caller
//! becomes the leader and performs the fetch + decode, later callers wait on
//! a per-tile slot and observe the leader's outcome (tile, absence, or
//! failure). The slot is removed once the outcome is published, so at most
//! one fetch per address is ever in flight system-wide.

use crate::archive::ArchiveClient;
use crate::coord::TileCoord;
use crate::tile::TerrainTile;
use crate::{DemError, Result};
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Condvar, Mutex};
use tracing::debug;

/// Default maximum number of decoded tiles held in memory.
pub const DEFAULT_CACHE_CAPACITY: usize = 100;

/// Shared result of a coalesced fetch.
#[derive(Clone)]
enum FetchOutcome {
    /// Fetch and decode succeeded.
    Loaded(Arc<TerrainTile>),
    /// The archive has no tile at this address.
    Missing,
    /// The fetch failed; waiters surface the leader's error message.
    Failed(String),
}

/// Per-tile rendezvous between the fetching leader and its waiters.
type FlightSlot = Arc<(Mutex<Option<FetchOutcome>>, Condvar)>;

enum Role {
    Leader(FlightSlot),
    Waiter(FlightSlot),
}

/// Bounded store of decoded tiles over one archive.
pub struct TileStore {
    client: Arc<ArchiveClient>,
    tiles: Mutex<LruCache<TileCoord, Arc<TerrainTile>>>,
    in_flight: Mutex<HashMap<TileCoord, FlightSlot>>,
}

impl TileStore {
    /// Create a store with the given capacity (entries, minimum 1).
    ///
    /// Capacity cannot be changed afterwards; construct a new store for a
    /// different capacity.
    pub fn new(client: Arc<ArchiveClient>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            client,
            tiles: Mutex::new(LruCache::new(capacity)),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Cached tile for `coord`, marking it most-recently-used on a hit.
    pub fn get(&self, coord: TileCoord) -> Option<Arc<TerrainTile>> {
        self.tiles.lock().ok()?.get(&coord).cloned()
    }

    /// Number of resident tiles.
    pub fn len(&self) -> usize {
        self.tiles.lock().map(|tiles| tiles.len()).unwrap_or(0)
    }

    /// Whether the cache holds no tiles.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all resident tiles.
    pub fn clear(&self) {
        if let Ok(mut tiles) = self.tiles.lock() {
            tiles.clear();
        }
    }

    /// Return the tile for `coord`, fetching and decoding it on a miss.
    ///
    /// `Ok(None)` means the archive has no tile at this address. Concurrent
    /// callers for the same address share one underlying fetch.
    pub fn get_or_fetch(&self, coord: TileCoord) -> Result<Option<Arc<TerrainTile>>> {
        loop {
            if let Some(tile) = self.get(coord) {
                return Ok(Some(tile));
            }

            let role = {
                let mut in_flight = self.in_flight.lock().map_err(|_| DemError::LockPoisoned)?;
                if let Some(slot) = in_flight.get(&coord) {
                    Role::Waiter(slot.clone())
                } else {
                    let slot: FlightSlot = Arc::new((Mutex::new(None), Condvar::new()));
                    in_flight.insert(coord, slot.clone());
                    Role::Leader(slot)
                }
            };

            match role {
                Role::Waiter(slot) => {
                    let (outcome, done) = &*slot;
                    let mut guard = outcome.lock().map_err(|_| DemError::LockPoisoned)?;
                    while guard.is_none() {
                        guard = done.wait(guard).map_err(|_| DemError::LockPoisoned)?;
                    }
                    match guard.clone() {
                        Some(FetchOutcome::Loaded(tile)) => return Ok(Some(tile)),
                        Some(FetchOutcome::Missing) => return Ok(None),
                        Some(FetchOutcome::Failed(reason)) => {
                            return Err(DemError::TileFetchFailed {
                                z: coord.z,
                                x: coord.x,
                                y: coord.y,
                                reason,
                            });
                        }
                        // Cannot happen past the wait loop; retry from the top.
                        None => continue,
                    }
                }
                Role::Leader(slot) => {
                    let result = self.fetch_and_insert(coord);
                    let outcome = match &result {
                        Ok(Some(tile)) => FetchOutcome::Loaded(tile.clone()),
                        Ok(None) => FetchOutcome::Missing,
                        Err(err) => FetchOutcome::Failed(err.to_string()),
                    };
                    // Publish to waiters holding the slot, then clear the
                    // in-flight marker so later callers start fresh.
                    {
                        let (slot_outcome, done) = &*slot;
                        if let Ok(mut guard) = slot_outcome.lock() {
                            *guard = Some(outcome);
                        }
                        done.notify_all();
                    }
                    if let Ok(mut in_flight) = self.in_flight.lock() {
                        in_flight.remove(&coord);
                    }
                    return result;
                }
            }
        }
    }

    fn fetch_and_insert(&self, coord: TileCoord) -> Result<Option<Arc<TerrainTile>>> {
        let metadata = self.client.metadata()?;
        let Some(bytes) = self.client.fetch_tile(coord)? else {
            return Ok(None);
        };
        let tile = Arc::new(TerrainTile::decode(
            coord,
            metadata.tile_format,
            &bytes,
            metadata.tile_size,
        )?);
        if let Ok(mut tiles) = self.tiles.lock() {
            if let Some((evicted, _)) = tiles.push(coord, tile.clone()) {
                if evicted != coord {
                    debug!(
                        "evicted tile z={} x={} y={} from cache",
                        evicted.z, evicted.x, evicted.y
                    );
                }
            }
        }
        Ok(Some(tile))
    }
}
