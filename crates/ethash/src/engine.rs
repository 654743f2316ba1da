// Copyright 2015-2020 Parity Technologies (UK) Ltd.
// This file is part of the ethash crate.

// The ethash crate is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// The ethash crate is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with the ethash crate.  If not, see <http://www.gnu.org/licenses/>.

//! The engine: epoch-scoped cache/dataset maps, one-ahead pre-generation,
//! and the mode façade (full / shared / tester / faker variants).
//!
//! All mutable engine state — the two maps, their "future" slots, the rand
//! source and the thread count — sits behind one mutex, mirroring the
//! single `sync.Mutex` the upstream engine struct embeds. `Engine` itself
//! is a cheap `Arc` handle so callers can clone and share it across
//! threads the way callers share a `*Wshash` in the original.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use rand::rngs::StdRng;

use crate::artifact::{Cache, Dataset};
use crate::compute;
use crate::hashrate::Meter;

/// Directories and in-memory/on-disk retention knobs. `cache_dir`/`dag_dir`
/// of `None` disables disk-backed artifacts entirely (always heap/mmap
/// from RAM); `*_on_disk` is the sweep retention limit passed to
/// [`crate::artifact`]'s file cleanup.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub cache_dir: Option<PathBuf>,
    pub caches_in_mem: usize,
    pub caches_on_disk: u64,
    pub dag_dir: Option<PathBuf>,
    pub dags_in_mem: usize,
    pub dags_on_disk: u64,
}

impl EngineConfig {
    fn clamp(mut self) -> Self {
        if self.caches_in_mem < 1 {
            log::warn!(target: "ethash", "caches_in_mem must be >= 1, clamping from {}", self.caches_in_mem);
            self.caches_in_mem = 1;
        }
        if self.dags_in_mem < 1 {
            log::warn!(target: "ethash", "dags_in_mem must be >= 1, clamping from {}", self.dags_in_mem);
            self.dags_in_mem = 1;
        }
        self
    }

    /// The modest defaults the shared singleton engine runs with upstream:
    /// no disk persistence, 3 caches and 1 dataset kept in memory.
    fn shared_defaults() -> Self {
        EngineConfig {
            cache_dir: None,
            caches_in_mem: 3,
            caches_on_disk: 0,
            dag_dir: None,
            dags_in_mem: 1,
            dags_on_disk: 0,
        }
    }
}

struct EngineState {
    caches: HashMap<u64, Arc<Cache>>,
    fcache: Option<Arc<Cache>>,
    datasets: HashMap<u64, Arc<Dataset>>,
    fdataset: Option<Arc<Dataset>>,
    threads: i64,
    rand: Option<StdRng>,
}

pub(crate) struct EngineInner {
    config: EngineConfig,
    state: Mutex<EngineState>,
    update_tx: crossbeam_channel::Sender<()>,
    pub(crate) update_rx: crossbeam_channel::Receiver<()>,
    hashrate: Meter,
    pub(crate) tester: bool,
    pub(crate) fake_mode: bool,
    pub(crate) fake_full: bool,
    pub(crate) fake_fail: Option<u64>,
    pub(crate) fake_delay: Option<Duration>,
    pub(crate) shared: Option<Engine>,
}

/// A cheap, cloneable handle onto the engine's shared state.
#[derive(Clone)]
pub struct Engine(pub(crate) Arc<EngineInner>);

static SHARED_ENGINE: Lazy<Engine> = Lazy::new(|| Engine::new(EngineConfig::shared_defaults()));

impl Engine {
    fn from_inner(inner: EngineInner) -> Self {
        Engine(Arc::new(inner))
    }

    /// Full mining/verification engine: real work, cache/dataset generated
    /// for real and optionally persisted to disk.
    pub fn new(config: EngineConfig) -> Self {
        Self::build(config.clamp(), false, false, false, None, None, None)
    }

    /// Cut-down engine for tests: tiny fixed-size cache/dataset, generated
    /// in memory only, regardless of `config`.
    pub fn new_tester() -> Self {
        Self::build(EngineConfig::shared_defaults(), true, false, false, None, None, None)
    }

    /// Accepts any seal instantly without running the PoW search at all.
    pub fn new_faker() -> Self {
        Self::build(EngineConfig::shared_defaults(), false, true, false, None, None, None)
    }

    /// Like [`Engine::new_faker`] but rejects blocks numbered `fail` and above.
    pub fn new_fake_failer(fail: u64) -> Self {
        Self::build(EngineConfig::shared_defaults(), false, true, false, Some(fail), None, None)
    }

    /// Like [`Engine::new_faker`] but sleeps `delay` before accepting a seal.
    pub fn new_fake_delayer(delay: Duration) -> Self {
        Self::build(EngineConfig::shared_defaults(), false, true, false, None, Some(delay), None)
    }

    /// Fakes verification but still runs the real, full PoW search when sealing.
    pub fn new_full_faker() -> Self {
        Self::build(EngineConfig::shared_defaults(), false, true, true, None, None, None)
    }

    /// Delegates every call to a process-wide singleton engine, so unrelated
    /// components that each construct their own façade still share one
    /// cache/dataset cache and thread pool.
    pub fn new_shared() -> Self {
        Engine(Arc::new(EngineInner {
            config: EngineConfig::shared_defaults(),
            state: Mutex::new(EngineState {
                caches: HashMap::new(),
                fcache: None,
                datasets: HashMap::new(),
                fdataset: None,
                threads: 0,
                rand: None,
            }),
            update_tx: crossbeam_channel::bounded(0).0,
            update_rx: crossbeam_channel::bounded(0).1,
            hashrate: Meter::new(),
            tester: false,
            fake_mode: false,
            fake_full: false,
            fake_fail: None,
            fake_delay: None,
            shared: Some(SHARED_ENGINE.clone()),
        }))
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        config: EngineConfig,
        tester: bool,
        fake_mode: bool,
        fake_full: bool,
        fake_fail: Option<u64>,
        fake_delay: Option<Duration>,
        shared: Option<Engine>,
    ) -> Self {
        let (update_tx, update_rx) = crossbeam_channel::bounded(0);
        Self::from_inner(EngineInner {
            config,
            state: Mutex::new(EngineState {
                caches: HashMap::new(),
                fcache: None,
                datasets: HashMap::new(),
                fdataset: None,
                threads: 0,
                rand: None,
            }),
            update_tx,
            update_rx,
            hashrate: Meter::new(),
            tester,
            fake_mode,
            fake_full,
            fake_fail,
            fake_delay,
            shared,
        })
    }

    pub(crate) fn is_fake_mode(&self) -> bool {
        self.0.fake_mode
    }

    /// Whether this is a `new_full_faker()` engine. Sealing always fakes
    /// itself under `fake_mode` regardless of this flag; `fake_full` only
    /// bears on consensus-rule verification, which an embedding node owns
    /// and checks against this flag itself.
    pub fn is_fake_full(&self) -> bool {
        self.0.fake_full
    }

    pub(crate) fn fake_fail_block(&self) -> Option<u64> {
        self.0.fake_fail
    }

    pub(crate) fn fake_delay(&self) -> Option<Duration> {
        self.0.fake_delay
    }

    pub(crate) fn shared_target(&self) -> Option<&Engine> {
        self.0.shared.as_ref()
    }

    pub(crate) fn mark_hashrate(&self, attempts: i64) {
        self.0.hashrate.mark(attempts);
    }

    /// Moving 1-minute average of sealing attempts per second.
    pub fn hashrate(&self) -> f64 {
        if let Some(shared) = self.shared_target() {
            return shared.hashrate();
        }
        self.0.hashrate.rate1()
    }

    pub fn threads(&self) -> i64 {
        if let Some(shared) = self.shared_target() {
            return shared.threads();
        }
        self.0.state.lock().threads
    }

    /// Sets the sealing thread count (`0` means "use all logical CPUs") and
    /// wakes an in-flight `seal` so it restarts with the new count.
    pub fn set_threads(&self, threads: i64) {
        if let Some(shared) = self.shared_target() {
            shared.set_threads(threads);
            return;
        }
        self.0.state.lock().threads = threads;
        let _ = self.0.update_tx.try_send(());
    }

    /// Seed hash for the epoch containing `block_number`.
    pub fn seed_hash(block_number: u64) -> [u8; 32] {
        compute::seed_hash(compute::epoch(block_number))
    }

    /// Verification cache for the epoch containing `block_number`: returns
    /// the current epoch's artifact, evicting the least-recently-used one
    /// if the in-memory map is full, and kicks off background generation
    /// of the next epoch's cache if nothing is already warming.
    pub fn cache(&self, block_number: u64) -> Arc<Cache> {
        if let Some(shared) = self.shared_target() {
            return shared.cache(block_number);
        }
        let epoch = compute::epoch(block_number);
        let limit = self.0.config.caches_in_mem;

        let (current, future) = {
            let mut state = self.0.state.lock();
            if let Some(existing) = state.caches.get(&epoch) {
                (existing.clone(), None)
            } else {
                evict_lru(&mut state.caches, limit);

                let current = if matches!(&state.fcache, Some(f) if f.epoch == epoch) {
                    state.fcache.take().unwrap()
                } else {
                    Arc::new(Cache::new(epoch))
                };
                state.caches.insert(epoch, current.clone());

                let future = match &state.fcache {
                    Some(f) if f.epoch > epoch => None,
                    _ => {
                        let next = Arc::new(Cache::new(epoch + 1));
                        state.fcache = Some(next.clone());
                        Some(next)
                    }
                };
                (current, future)
            }
        };

        current.generate(self.0.config.cache_dir.as_deref(), self.0.config.caches_on_disk, self.0.tester);
        current.touch();

        if let Some(future) = future {
            let dir = self.0.config.cache_dir.clone();
            let sweep = self.0.config.caches_on_disk;
            let tester = self.0.tester;
            std::thread::spawn(move || future.generate(dir.as_deref(), sweep, tester));
        }

        current
    }

    /// Mining dataset for the epoch containing `block_number`; same eviction
    /// and one-ahead warming shape as [`Engine::cache`].
    pub fn dataset(&self, block_number: u64) -> Arc<Dataset> {
        if let Some(shared) = self.shared_target() {
            return shared.dataset(block_number);
        }
        let epoch = compute::epoch(block_number);
        let limit = self.0.config.dags_in_mem;

        let (current, future) = {
            let mut state = self.0.state.lock();
            if let Some(existing) = state.datasets.get(&epoch) {
                (existing.clone(), None)
            } else {
                evict_lru(&mut state.datasets, limit);

                let current = if matches!(&state.fdataset, Some(f) if f.epoch == epoch) {
                    state.fdataset.take().unwrap()
                } else {
                    Arc::new(Dataset::new(epoch))
                };
                state.datasets.insert(epoch, current.clone());

                let future = match &state.fdataset {
                    Some(f) if f.epoch > epoch => None,
                    _ => {
                        let next = Arc::new(Dataset::new(epoch + 1));
                        state.fdataset = Some(next.clone());
                        Some(next)
                    }
                };
                (current, future)
            }
        };

        current.generate(self.0.config.dag_dir.as_deref(), self.0.config.dags_on_disk, self.0.tester);
        current.touch();

        if let Some(future) = future {
            let dir = self.0.config.dag_dir.clone();
            let sweep = self.0.config.dags_on_disk;
            let tester = self.0.tester;
            std::thread::spawn(move || future.generate(dir.as_deref(), sweep, tester));
        }

        current
    }

    pub(crate) fn seal_rand(&self) -> u64 {
        use rand::{Rng, SeedableRng};
        let mut state = self.0.state.lock();
        if state.rand.is_none() {
            state.rand = Some(StdRng::from_entropy());
        }
        state.rand.as_mut().unwrap().gen()
    }

    pub(crate) fn seal_threads(&self) -> i64 {
        self.0.state.lock().threads
    }
}

fn evict_lru<T>(map: &mut HashMap<u64, Arc<T>>, limit: usize)
where
    T: EvictionKey,
{
    while map.len() >= limit.max(1) {
        let Some((&oldest, _)) = map.iter().min_by_key(|(_, v)| v.last_used()) else {
            break;
        };
        map.remove(&oldest);
    }
}

trait EvictionKey {
    fn last_used(&self) -> std::time::Instant;
}

impl EvictionKey for Cache {
    fn last_used(&self) -> std::time::Instant {
        Cache::last_used(self)
    }
}

impl EvictionKey for Dataset {
    fn last_used(&self) -> std::time::Instant {
        Dataset::last_used(self)
    }
}

/// Generates and writes a standalone verification cache for the epoch
/// containing `block_number` to `dir`, releasing it once written. Used by
/// the `makecache` CLI subcommand; independent of any running engine.
pub fn make_cache(block_number: u64, dir: &std::path::Path) {
    let cache = Cache::new(compute::epoch(block_number));
    cache.generate(Some(dir), u64::MAX, false);
}

/// Generates and writes a standalone mining dataset for the epoch
/// containing `block_number` to `dir`. Used by the `makedag` CLI subcommand.
pub fn make_dataset(block_number: u64, dir: &std::path::Path) {
    let dataset = Dataset::new(compute::epoch(block_number));
    dataset.generate(Some(dir), u64::MAX, false);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tester_config() -> EngineConfig {
        EngineConfig {
            cache_dir: None,
            caches_in_mem: 2,
            caches_on_disk: 0,
            dag_dir: None,
            dags_in_mem: 2,
            dags_on_disk: 0,
        }
    }

    #[test]
    fn cache_is_memoized_per_epoch() {
        let engine = Engine::new_tester();
        let a = engine.cache(0);
        let b = engine.cache(1);
        assert!(Arc::ptr_eq(&a, &b), "block 0 and 1 share epoch 0");
    }

    #[test]
    fn cache_map_respects_in_memory_bound() {
        let mut config = tester_config();
        config.caches_in_mem = 2;
        let engine = Engine::new(config);
        for epoch in 0..3u64 {
            engine.cache(epoch * compute::EPOCH_LENGTH);
        }
        let resident: Vec<u64> = {
            let mut eps: Vec<u64> = engine.0.state.lock().caches.keys().copied().collect();
            eps.sort_unstable();
            eps
        };
        assert_eq!(resident, vec![1, 2], "epoch 0 should have been evicted first");
    }

    #[test]
    fn future_cache_gets_promoted_into_the_map() {
        let engine = Engine::new_tester();
        let _ = engine.cache(0);
        // Give the background warmer a moment to finish; the future slot
        // for epoch 1 should then promote instead of regenerating.
        std::thread::sleep(Duration::from_millis(50));
        let first_epoch1 = engine.cache(compute::EPOCH_LENGTH);
        let second_epoch1 = engine.cache(compute::EPOCH_LENGTH);
        assert!(Arc::ptr_eq(&first_epoch1, &second_epoch1));
    }

    #[test]
    fn set_threads_is_observable() {
        let engine = Engine::new_tester();
        engine.set_threads(4);
        assert_eq!(engine.threads(), 4);
    }

    #[test]
    fn shared_engines_observe_each_others_state() {
        let a = Engine::new_shared();
        let b = Engine::new_shared();
        a.set_threads(7);
        assert_eq!(b.threads(), 7);
    }
}
