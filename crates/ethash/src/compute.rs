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

//! Pure, deterministic primitives pinned by the algorithm: seed derivation,
//! cache/dataset sizing and generation, and the hashimoto mixing function.
//!
//! These are "given" by the wider consensus spec — this module fixes a
//! concrete, internally consistent implementation of the well known
//! Ethash construction (RandMemoHash cache, FNV-mixed dataset items,
//! hashimoto) so the rest of the crate has something real to drive. No
//! claim is made that this matches any particular upstream client
//! bit-for-bit; see DESIGN.md for why that's an accepted Open Question.

use crunchy::unroll;
use tiny_keccak::{Hasher, Keccak};

/// Number of blocks per epoch; cache and dataset are constant within an epoch.
pub const EPOCH_LENGTH: u64 = 30_000;

const WORD_BYTES: usize = 4;
const HASH_BYTES: usize = 64;
const HASH_WORDS: usize = HASH_BYTES / WORD_BYTES;
const MIX_BYTES: usize = 128;
const DATASET_PARENTS: u32 = 256;
const CACHE_ROUNDS: usize = 3;
const ACCESSES: usize = 64;

const CACHE_BYTES_INIT: u64 = 1 << 24;
const CACHE_BYTES_GROWTH: u64 = 1 << 17;
const DATASET_BYTES_INIT: u64 = 1 << 30;
const DATASET_BYTES_GROWTH: u64 = 1 << 23;

const FNV_PRIME: u32 = 0x0100_0193;

fn keccak512(data: &[u8]) -> [u8; 64] {
    let mut out = [0u8; 64];
    let mut hasher = Keccak::v512();
    hasher.update(data);
    hasher.finalize(&mut out);
    out
}

fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    let mut hasher = Keccak::v256();
    hasher.update(data);
    hasher.finalize(&mut out);
    out
}

fn words_to_bytes(words: &[u32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(words.len() * WORD_BYTES);
    for w in words {
        out.extend_from_slice(&w.to_le_bytes());
    }
    out
}

fn bytes_to_words(bytes: &[u8], out: &mut [u32]) {
    for (chunk, word) in bytes.chunks_exact(WORD_BYTES).zip(out.iter_mut()) {
        *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
}

#[inline]
fn fnv(a: u32, b: u32) -> u32 {
    a.wrapping_mul(FNV_PRIME) ^ b
}

fn fnv_hash_words(mix: &mut [u32], other: &[u32]) {
    for (m, o) in mix.iter_mut().zip(other.iter()) {
        *m = fnv(*m, *o);
    }
}

/// epoch for a given block number.
pub fn epoch(block_number: u64) -> u64 {
    block_number / EPOCH_LENGTH
}

/// `seedHash(epoch*EPOCH_LENGTH+1)` — deterministic per epoch, derived by
/// repeated keccak256 hashing of the zero hash.
pub fn seed_hash(epoch: u64) -> [u8; 32] {
    let mut seed = [0u8; 32];
    for _ in 0..epoch {
        seed = keccak256(&seed);
    }
    seed
}

/// Size in bytes of the verification cache for the epoch containing `block_number`.
pub fn cache_size(block_number: u64) -> usize {
    let mut size = CACHE_BYTES_INIT + CACHE_BYTES_GROWTH * epoch(block_number);
    size -= HASH_BYTES as u64;
    while !primal::is_prime(size / HASH_BYTES as u64) {
        size -= 2 * HASH_BYTES as u64;
    }
    size as usize
}

/// Size in bytes of the mining dataset for the epoch containing `block_number`.
pub fn dataset_size(block_number: u64) -> usize {
    let mut size = DATASET_BYTES_INIT + DATASET_BYTES_GROWTH * epoch(block_number);
    size -= MIX_BYTES as u64;
    while !primal::is_prime(size / MIX_BYTES as u64) {
        size -= 2 * MIX_BYTES as u64;
    }
    size as usize
}

/// Fills `buf` (length `cache_size(epoch*EPOCH_LENGTH+1)/4`) with the
/// RandMemoHash verification cache for `epoch`, seeded by `seed`.
pub fn generate_cache(buf: &mut [u32], _epoch: u64, seed: &[u8; 32]) {
    assert_eq!(buf.len() % HASH_WORDS, 0, "cache buffer must be a whole number of hash-words");
    let n_nodes = buf.len() / HASH_WORDS;
    assert!(n_nodes > 0);

    let mut nodes: Vec<[u32; HASH_WORDS]> = Vec::with_capacity(n_nodes);
    let mut node = [0u32; HASH_WORDS];
    bytes_to_words(&keccak512(seed), &mut node);
    nodes.push(node);
    for i in 1..n_nodes {
        let mut next = [0u32; HASH_WORDS];
        bytes_to_words(&keccak512(&words_to_bytes(&nodes[i - 1])), &mut next);
        nodes.push(next);
    }

    for _ in 0..CACHE_ROUNDS {
        for i in 0..n_nodes {
            let v = nodes[i][0] as usize % n_nodes;
            let parent1 = nodes[(i + n_nodes - 1) % n_nodes];
            let parent2 = nodes[v];
            let mut xored = [0u32; HASH_WORDS];
            for j in 0..HASH_WORDS {
                xored[j] = parent1[j] ^ parent2[j];
            }
            let mut out = [0u32; HASH_WORDS];
            bytes_to_words(&keccak512(&words_to_bytes(&xored)), &mut out);
            nodes[i] = out;
        }
    }

    for (i, node) in nodes.into_iter().enumerate() {
        buf[i * HASH_WORDS..(i + 1) * HASH_WORDS].copy_from_slice(&node);
    }
}

fn calc_dataset_item(cache: &[u32], i: u32) -> [u32; HASH_WORDS] {
    let n_nodes = (cache.len() / HASH_WORDS) as u32;
    let mut mix = [0u32; HASH_WORDS];
    let off = ((i % n_nodes) as usize) * HASH_WORDS;
    mix.copy_from_slice(&cache[off..off + HASH_WORDS]);
    mix[0] ^= i;

    let mut hashed = [0u32; HASH_WORDS];
    bytes_to_words(&keccak512(&words_to_bytes(&mix)), &mut hashed);
    mix = hashed;

    // `unroll!` needs a literal range; kept in lockstep with `DATASET_PARENTS`.
    debug_assert_eq!(DATASET_PARENTS, 256);
    unroll! {
        for j in 0..256 {
            let cache_index = fnv(i ^ j, mix[(j as usize) % HASH_WORDS]) % n_nodes;
            let off = (cache_index as usize) * HASH_WORDS;
            fnv_hash_words(&mut mix, &cache[off..off + HASH_WORDS]);
        }
    }

    let mut out = [0u32; HASH_WORDS];
    bytes_to_words(&keccak512(&words_to_bytes(&mix)), &mut out);
    out
}

/// Fills `buf` (length `dataset_size(...)/4`) with mining dataset items
/// derived from `cache` (a freshly generated verification cache's words).
pub fn generate_dataset(buf: &mut [u32], _epoch: u64, cache: &[u32]) {
    assert_eq!(buf.len() % HASH_WORDS, 0, "dataset buffer must be a whole number of hash-words");
    let n_items = buf.len() / HASH_WORDS;
    for i in 0..n_items {
        let item = calc_dataset_item(cache, i as u32);
        buf[i * HASH_WORDS..(i + 1) * HASH_WORDS].copy_from_slice(&item);
    }
}

/// The hashimoto mixing function, parameterized over an item lookup so it
/// can run against either a full in-memory dataset or an on-the-fly cache
/// (light verification).
pub fn hashimoto(
    header_hash: &[u8; 32],
    nonce: u64,
    full_size: usize,
    lookup: impl Fn(u32) -> [u32; HASH_WORDS],
) -> ([u8; 32], [u8; 32]) {
    let rows = (full_size / MIX_BYTES) as u32;

    let mut seed_input = [0u8; 40];
    seed_input[..32].copy_from_slice(header_hash);
    seed_input[32..].copy_from_slice(&nonce.to_le_bytes());
    let seed = keccak512(&seed_input);

    let mix_words = MIX_BYTES / WORD_BYTES; // 32
    let mut mix = vec![0u32; mix_words];
    for (i, m) in mix.iter_mut().enumerate() {
        let off = (i % HASH_WORDS) * WORD_BYTES;
        *m = u32::from_le_bytes([seed[off], seed[off + 1], seed[off + 2], seed[off + 3]]);
    }
    let seed_head = u32::from_le_bytes([seed[0], seed[1], seed[2], seed[3]]);

    // `unroll!` needs a literal range; kept in lockstep with `ACCESSES`.
    debug_assert_eq!(ACCESSES, 64);
    unroll! {
        for i in 0..64 {
            let parent = fnv(i as u32 ^ seed_head, mix[i % mix_words]) % rows;
            let mut temp = vec![0u32; mix_words];
            let item0 = lookup(2 * parent);
            let item1 = lookup(2 * parent + 1);
            temp[..HASH_WORDS].copy_from_slice(&item0);
            temp[HASH_WORDS..].copy_from_slice(&item1);
            fnv_hash_words(&mut mix, &temp);
        }
    }

    let mut cmix = [0u32; HASH_WORDS / 2];
    for (i, c) in cmix.iter_mut().enumerate() {
        let base = i * 4;
        *c = fnv(fnv(fnv(mix[base], mix[base + 1]), mix[base + 2]), mix[base + 3]);
    }
    let digest_bytes = words_to_bytes(&cmix);
    let mut mix_digest = [0u8; 32];
    mix_digest.copy_from_slice(&digest_bytes);

    let mut result_input = Vec::with_capacity(64 + 32);
    result_input.extend_from_slice(&seed);
    result_input.extend_from_slice(&digest_bytes);
    let result = keccak256(&result_input);

    (mix_digest, result)
}

/// Full (mining-side) hashimoto: looks items up directly in the in-memory dataset.
pub fn hashimoto_full(dataset: &[u32], header_hash: &[u8; 32], nonce: u64) -> ([u8; 32], [u8; 32]) {
    let full_size = dataset.len() * WORD_BYTES;
    hashimoto(header_hash, nonce, full_size, |index| {
        let off = (index as usize) * HASH_WORDS;
        let mut item = [0u32; HASH_WORDS];
        item.copy_from_slice(&dataset[off..off + HASH_WORDS]);
        item
    })
}

/// Light (verification-side) hashimoto: recomputes each dataset item on the
/// fly from the small cache instead of touching the multi-gigabyte dataset.
pub fn hashimoto_light(
    full_size: usize,
    cache: &[u32],
    header_hash: &[u8; 32],
    nonce: u64,
) -> ([u8; 32], [u8; 32]) {
    hashimoto(header_hash, nonce, full_size, |index| calc_dataset_item(cache, index))
}

/// `2^256 / difficulty`, as a 32-byte big-endian boundary. A valid PoW
/// result interpreted as a big-endian integer must be <= this boundary.
pub fn difficulty_to_boundary(difficulty: ethereum_types::U256) -> ethereum_types::U256 {
    if difficulty <= ethereum_types::U256::one() {
        ethereum_types::U256::MAX
    } else {
        (ethereum_types::U256::one() << 255) / difficulty * 2u32
    }
}

/// Incrementally-memoized seed hash computation: successive calls for
/// increasing epochs avoid re-hashing from the zero seed each time.
pub struct SeedHashCompute {
    epoch: u64,
    seed: [u8; 32],
}

impl Default for SeedHashCompute {
    fn default() -> Self {
        SeedHashCompute { epoch: 0, seed: [0u8; 32] }
    }
}

impl SeedHashCompute {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed hash for the epoch containing `block_number`.
    pub fn hash_block_number(&mut self, block_number: u64) -> [u8; 32] {
        let target = epoch(block_number);
        if target < self.epoch {
            self.epoch = 0;
            self.seed = [0u8; 32];
        }
        while self.epoch < target {
            self.seed = keccak256(&self.seed);
            self.epoch += 1;
        }
        self.seed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_hash_zero_epoch_is_zero() {
        assert_eq!(seed_hash(0), [0u8; 32]);
    }

    #[test]
    fn seed_hash_deterministic() {
        assert_eq!(seed_hash(5), seed_hash(5));
        assert_ne!(seed_hash(5), seed_hash(6));
    }

    #[test]
    fn seed_hash_compute_matches_direct() {
        let mut compute = SeedHashCompute::new();
        for e in 0..5u64 {
            let bn = e * EPOCH_LENGTH + 1;
            assert_eq!(compute.hash_block_number(bn), seed_hash(e));
        }
    }

    #[test]
    fn cache_size_grows_and_stays_aligned() {
        let s0 = cache_size(1);
        let s1 = cache_size(EPOCH_LENGTH + 1);
        assert!(s1 > s0);
        assert_eq!(s0 % HASH_BYTES, 0);
        assert_eq!(s1 % HASH_BYTES, 0);
    }

    #[test]
    fn dataset_size_grows_and_stays_aligned() {
        let s0 = dataset_size(1);
        let s1 = dataset_size(EPOCH_LENGTH + 1);
        assert!(s1 > s0);
        assert_eq!(s0 % MIX_BYTES, 0);
    }

    #[test]
    fn cache_generation_deterministic() {
        let seed = seed_hash(0);
        let mut a = vec![0u32; 1024 / WORD_BYTES];
        let mut b = vec![0u32; 1024 / WORD_BYTES];
        generate_cache(&mut a, 0, &seed);
        generate_cache(&mut b, 0, &seed);
        assert_eq!(a, b);
    }

    #[test]
    fn dataset_generation_deterministic_and_derived_from_cache() {
        let seed = seed_hash(0);
        let mut cache = vec![0u32; 1024 / WORD_BYTES];
        generate_cache(&mut cache, 0, &seed);

        let mut d1 = vec![0u32; 32 * 1024 / WORD_BYTES];
        let mut d2 = vec![0u32; 32 * 1024 / WORD_BYTES];
        generate_dataset(&mut d1, 0, &cache);
        generate_dataset(&mut d2, 0, &cache);
        assert_eq!(d1, d2);

        let mut other_cache = vec![0u32; 1024 / WORD_BYTES];
        generate_cache(&mut other_cache, 1, &seed_hash(1));
        let mut d3 = vec![0u32; 32 * 1024 / WORD_BYTES];
        generate_dataset(&mut d3, 1, &other_cache);
        assert_ne!(d1, d3);
    }

    #[test]
    fn hashimoto_full_and_light_agree() {
        let seed = seed_hash(0);
        let mut cache = vec![0u32; 1024 / WORD_BYTES];
        generate_cache(&mut cache, 0, &seed);
        let mut dataset = vec![0u32; 32 * 1024 / WORD_BYTES];
        generate_dataset(&mut dataset, 0, &cache);

        let header_hash = [7u8; 32];
        let (full_digest, full_result) = hashimoto_full(&dataset, &header_hash, 42);
        let (light_digest, light_result) =
            hashimoto_light(dataset.len() * WORD_BYTES, &cache, &header_hash, 42);

        assert_eq!(full_digest, light_digest);
        assert_eq!(full_result, light_result);
    }

    #[test]
    fn hashimoto_changes_with_nonce() {
        let seed = seed_hash(0);
        let mut cache = vec![0u32; 1024 / WORD_BYTES];
        generate_cache(&mut cache, 0, &seed);
        let mut dataset = vec![0u32; 32 * 1024 / WORD_BYTES];
        generate_dataset(&mut dataset, 0, &cache);

        let header_hash = [1u8; 32];
        let (_, r1) = hashimoto_full(&dataset, &header_hash, 1);
        let (_, r2) = hashimoto_full(&dataset, &header_hash, 2);
        assert_ne!(r1, r2);
    }
}
