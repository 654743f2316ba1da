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

//! Single-epoch artifacts (verification cache / mining dataset): one-shot
//! generation, last-use bookkeeping, and RAII release.
//!
//! Both kinds are returned to callers as `Arc<Cache>` / `Arc<Dataset>`. The
//! engine's in-memory maps hold one reference each; a caller that has
//! obtained its own clone keeps the artifact (and any backing mmap) alive
//! even after the engine evicts its own reference — eviction becomes an
//! ordinary `Arc` drop, and `MappedWords`'s field order (map before file)
//! guarantees unmap-then-close without a hand-written `release`.

use std::path::Path;
use std::time::Instant;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::compute::{self, EPOCH_LENGTH};
use crate::mmap::{artifact_path, create_and_generate, open_mapped};
use crate::words::WordStorage;

const TESTER_CACHE_BYTES: usize = 1024;
const TESTER_DATASET_BYTES: usize = 32 * 1024;

/// Deletes on-disk files for every epoch from `epoch - limit` down to `0`,
/// i.e. keeps at most `limit` epochs' worth of files (including the
/// current one) on disk. If `limit > epoch` there is nothing old enough to
/// sweep yet.
fn sweep_old_files(dir: &Path, prefix: &str, epoch: u64, limit: u64) {
    if epoch < limit {
        return;
    }
    let mut ep = epoch - limit;
    loop {
        let seed = compute::seed_hash(ep);
        let path = artifact_path(dir, prefix, &seed);
        let _ = std::fs::remove_file(path);
        if ep == 0 {
            break;
        }
        ep -= 1;
    }
}

macro_rules! artifact_kind {
    ($name:ident) => {
        pub struct $name {
            pub epoch: u64,
            words: OnceCell<WordStorage>,
            used: Mutex<Instant>,
        }

        impl $name {
            pub fn new(epoch: u64) -> Self {
                $name { epoch, words: OnceCell::new(), used: Mutex::new(Instant::now()) }
            }

            /// Word slice; panics if called before `generate` — the engine
            /// never does this, as `generate` always runs (and blocks
            /// concurrent callers) before a handle is returned.
            pub fn words(&self) -> &[u32] {
                self.words
                    .get()
                    .expect("artifact read before generate()")
                    .words()
            }

            pub fn touch(&self) {
                *self.used.lock() = Instant::now();
            }

            pub fn last_used(&self) -> Instant {
                *self.used.lock()
            }

            fn heap_fallback(epoch: u64, seed: &[u8; 32], size_words: usize) -> WordStorage {
                let mut buf = vec![0u32; size_words];
                Self::fill(&mut buf, epoch, seed);
                WordStorage::heap(buf)
            }
        }
    };
}

artifact_kind!(Cache);

impl Cache {
    fn fill(buf: &mut [u32], epoch: u64, seed: &[u8; 32]) {
        compute::generate_cache(buf, epoch, seed);
    }

    /// Runs the one-shot generator if it hasn't run yet; all concurrent
    /// callers block on the same `OnceCell` until the first completes.
    pub fn generate(&self, dir: Option<&Path>, sweep_limit: u64, tester: bool) {
        self.words.get_or_init(|| {
            if tester {
                let seed = compute::seed_hash(self.epoch);
                return Self::heap_fallback(self.epoch, &seed, TESTER_CACHE_BYTES / 4);
            }
            let seed = compute::seed_hash(self.epoch);
            let size = compute::cache_size(self.epoch * EPOCH_LENGTH + 1);
            let size_words = size / 4;

            let dir = match dir {
                None => return Self::heap_fallback(self.epoch, &seed, size_words),
                Some(dir) => dir,
            };

            let path = artifact_path(dir, "cache", &seed);
            match open_mapped(&path) {
                Ok(mapped) => {
                    log::debug!(target: "ethash", "loaded cache for epoch {} from disk", self.epoch);
                    return WordStorage::mapped(mapped);
                }
                Err(e) => log::debug!(target: "ethash", "failed to load cache for epoch {}: {e}", self.epoch),
            }

            let epoch = self.epoch;
            match create_and_generate(&path, size_words, |buf| Self::fill(buf, epoch, &seed)) {
                Ok(mapped) => {
                    sweep_old_files(dir, "cache", self.epoch, sweep_limit);
                    WordStorage::mapped(mapped)
                }
                Err(e) => {
                    log::error!(target: "ethash", "failed to generate mapped cache for epoch {}: {e}", self.epoch);
                    Self::heap_fallback(self.epoch, &seed, size_words)
                }
            }
        });
    }
}

artifact_kind!(Dataset);

impl Dataset {
    fn fill(buf: &mut [u32], epoch: u64, seed: &[u8; 32]) {
        // The dataset is derived from a freshly generated cache, never a
        // disk/mmap-backed one — the cache only needs to exist transiently.
        let cache_size = compute::cache_size(epoch * EPOCH_LENGTH + 1) / 4;
        let mut cache = vec![0u32; cache_size];
        compute::generate_cache(&mut cache, epoch, seed);
        compute::generate_dataset(buf, epoch, &cache);
    }

    pub fn generate(&self, dir: Option<&Path>, sweep_limit: u64, tester: bool) {
        self.words.get_or_init(|| {
            if tester {
                let seed = compute::seed_hash(self.epoch);
                let mut cache = vec![0u32; TESTER_CACHE_BYTES / 4];
                compute::generate_cache(&mut cache, self.epoch, &seed);
                let mut buf = vec![0u32; TESTER_DATASET_BYTES / 4];
                compute::generate_dataset(&mut buf, self.epoch, &cache);
                return WordStorage::heap(buf);
            }
            let seed = compute::seed_hash(self.epoch);
            let size = compute::dataset_size(self.epoch * EPOCH_LENGTH + 1);
            let size_words = size / 4;

            let dir = match dir {
                None => return Self::heap_fallback(self.epoch, &seed, size_words),
                Some(dir) => dir,
            };

            let path = artifact_path(dir, "full", &seed);
            match open_mapped(&path) {
                Ok(mapped) => {
                    log::debug!(target: "ethash", "loaded dataset for epoch {} from disk", self.epoch);
                    return WordStorage::mapped(mapped);
                }
                Err(e) => log::debug!(target: "ethash", "failed to load dataset for epoch {}: {e}", self.epoch),
            }

            let epoch = self.epoch;
            match create_and_generate(&path, size_words, |buf| Self::fill(buf, epoch, &seed)) {
                Ok(mapped) => {
                    sweep_old_files(dir, "full", self.epoch, sweep_limit);
                    WordStorage::mapped(mapped)
                }
                Err(e) => {
                    log::error!(target: "ethash", "failed to generate mapped dataset for epoch {}: {e}", self.epoch);
                    // NOTE: the upstream source falls back to a buffer of
                    // `size/2` words here — a pre-existing bug. This
                    // implementation deliberately uses `size/4` like every
                    // other path; see DESIGN.md.
                    Self::heap_fallback(self.epoch, &seed, size_words)
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempdir::TempDir;

    #[test]
    fn tester_cache_has_expected_word_count() {
        let cache = Cache::new(0);
        cache.generate(None, 0, true);
        assert_eq!(cache.words().len(), 256);
    }

    #[test]
    fn tester_cache_is_byte_identical_across_independent_instances() {
        let a = Cache::new(0);
        a.generate(None, 0, true);
        let b = Cache::new(0);
        b.generate(None, 0, true);
        assert_eq!(a.words(), b.words());
    }

    #[test]
    fn corrupted_file_is_rejected_and_regenerated_on_next_load() {
        let dir = TempDir::new("ethash-artifact").unwrap();
        let cache = Cache::new(2);
        cache.generate(Some(dir.path()), 0, false);
        let good: Vec<u32> = cache.words().to_vec();

        let seed = compute::seed_hash(2);
        let path = crate::mmap::artifact_path(dir.path(), "cache", &seed);
        std::fs::write(&path, vec![0u8; 16]).unwrap();

        let reloaded = Cache::new(2);
        reloaded.generate(Some(dir.path()), 0, false);
        assert_eq!(reloaded.words(), good.as_slice());
    }

    #[test]
    fn generation_runs_once_under_concurrency() {
        let cache = Arc::new(Cache::new(3));
        let calls = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(std::thread::spawn(move || {
                cache.generate(None, 0, true);
                calls.fetch_add(1, Ordering::SeqCst);
                cache.words().to_vec()
            }));
        }
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(calls.load(Ordering::SeqCst), 8);
        for r in &results[1..] {
            assert_eq!(&results[0], r);
        }
    }

    #[test]
    fn disk_backed_cache_round_trips() {
        let dir = TempDir::new("ethash-artifact").unwrap();
        let cache = Cache::new(1);
        cache.generate(Some(dir.path()), 1024, false);
        let first: Vec<u32> = cache.words().to_vec();

        let reloaded = Cache::new(1);
        reloaded.generate(Some(dir.path()), 1024, false);
        assert_eq!(first, reloaded.words());
    }

    #[test]
    fn sweep_removes_old_epoch_files_but_keeps_current() {
        let dir = TempDir::new("ethash-artifact").unwrap();
        for e in 0..3u64 {
            let cache = Cache::new(e);
            cache.generate(Some(dir.path()), 1, false);
        }
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1, "only the newest epoch's file should remain");
    }
}
