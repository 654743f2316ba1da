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

//! Parallel nonce search: spins up one worker per thread, rendezvous on
//! whichever of "stop requested", "nonce found" or "live-restart requested"
//! fires first.
//!
//! Cancellation is modeled the way the original closes its abort channel:
//! every worker holds a clone of a zero-capacity `crossbeam-channel`
//! receiver, and dropping every sender broadcasts disconnection to all of
//! them at once — no explicit "stop" message needs to be sent.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{select, Receiver, RecvTimeoutError, Sender, TryRecvError};
use ethereum_types::U256;

use crate::compute;
use crate::engine::Engine;
use crate::types::Block;

/// Attempts per thread between hashrate meter updates.
const HASHRATE_MARK_INTERVAL: i64 = 1 << 15;

impl Engine {
    /// Seals `block`, blocking until a valid nonce is found or `stop` fires
    /// (closes). Returns `None` if sealing was cancelled.
    ///
    /// Fake-mode façades (`new_faker`, `new_fake_failer`, `new_fake_delayer`,
    /// `new_full_faker`) all skip the PoW search entirely and just stamp a
    /// seal — `fakeFull` only relaxes verification, which is out of scope
    /// here, so it has no bearing on whether sealing itself is faked.
    pub fn seal(&self, block: &Block, stop: &Receiver<()>) -> Option<Block> {
        if let Some(shared) = self.shared_target() {
            return shared.seal(block, stop);
        }

        if self.is_fake_mode() {
            if let Some(fail_at) = self.fake_fail_block() {
                if block.header.number >= fail_at {
                    return None;
                }
            }
            if let Some(delay) = self.fake_delay() {
                match stop.recv_timeout(delay) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => return None,
                    Err(RecvTimeoutError::Timeout) => {}
                }
            }
            return Some(block.with_seal(block.header.clone()));
        }

        loop {
            let (abort_tx, abort_rx) = crossbeam_channel::bounded::<()>(0);
            let (found_tx, found_rx) = crossbeam_channel::bounded::<Block>(0);

            let mut threads = self.seal_threads();
            if threads <= 0 {
                threads = num_cpus::get() as i64;
            }

            let mut handles = Vec::with_capacity(threads as usize);
            for id in 0..threads {
                let engine = self.clone();
                let block = block.clone();
                let abort_rx = abort_rx.clone();
                let found_tx = found_tx.clone();
                let seed = self.seal_rand();
                handles.push(std::thread::spawn(move || {
                    engine.mine(&block, id, seed, &abort_rx, &found_tx)
                }));
            }
            drop(found_tx);

            let update_rx = self.0.update_rx.clone();
            select! {
                recv(stop) -> _ => {
                    drop(abort_tx);
                    for h in handles { let _ = h.join(); }
                    return None;
                }
                recv(found_rx) -> msg => {
                    drop(abort_tx);
                    for h in handles { let _ = h.join(); }
                    return msg.ok();
                }
                recv(update_rx) -> _ => {
                    drop(abort_tx);
                    for h in handles { let _ = h.join(); }
                }
            };
        }
    }

    fn mine(&self, block: &Block, thread_id: i64, seed: u64, abort_rx: &Receiver<()>, found_tx: &Sender<Block>) {
        let header = block.header.clone();
        let header_hash = header.hash_without_nonce().0;
        let target = compute::difficulty_to_boundary(header.difficulty);
        let dataset = self.dataset(header.number);

        let mut nonce = seed.wrapping_add(thread_id as u64);
        let mut attempts: i64 = 0;

        loop {
            match abort_rx.try_recv() {
                Ok(()) => {
                    self.mark_hashrate(attempts);
                    return;
                }
                Err(TryRecvError::Disconnected) => {
                    self.mark_hashrate(attempts);
                    return;
                }
                Err(TryRecvError::Empty) => {}
            }

            attempts += 1;
            if attempts >= HASHRATE_MARK_INTERVAL {
                self.mark_hashrate(attempts);
                attempts = 0;
            }

            let (mix_digest, result) = compute::hashimoto_full(dataset.words(), &header_hash, nonce);
            if U256::from_big_endian(&result) <= target {
                let mut sealed = header.clone();
                sealed.nonce = nonce;
                sealed.mix_digest = ethereum_types::H256(mix_digest);
                let sealed_block = block.with_seal(sealed);
                let _ = select! {
                    send(found_tx, sealed_block) -> res => res,
                    recv(abort_rx) -> _ => Ok(()),
                };
                return;
            }

            nonce = nonce.wrapping_add(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Header;
    use ethereum_types::U256;

    #[test]
    fn tester_engine_finds_a_seal_quickly() {
        let engine = Engine::new_tester();
        let header = Header::new(compute::EPOCH_LENGTH, U256::from(2u64));
        let block = Block::new(header);
        let (_stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);

        let sealed = engine.seal(&block, &stop_rx).expect("tester difficulty must be trivially satisfiable");
        let dataset = engine.dataset(block.header.number);
        let (_, result) = compute::hashimoto_full(dataset.words(), &sealed.header.hash_without_nonce().0, sealed.header.nonce);
        let target = compute::difficulty_to_boundary(sealed.header.difficulty);
        assert!(U256::from_big_endian(&result) <= target);
    }

    #[test]
    fn stop_channel_cancels_seal() {
        let engine = Engine::new_tester();
        // An effectively unreachable target forces the search to run until cancelled.
        let header = Header::new(compute::EPOCH_LENGTH, U256::MAX);
        let block = Block::new(header);
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);

        let handle = std::thread::spawn(move || engine.seal(&block, &stop_rx));
        std::thread::sleep(Duration::from_millis(50));
        drop(stop_tx);
        assert_eq!(handle.join().unwrap(), None);
    }

    #[test]
    fn faker_accepts_any_block_instantly() {
        let engine = Engine::new_faker();
        let header = Header::new(1, U256::MAX);
        let block = Block::new(header);
        let (_stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        assert!(engine.seal(&block, &stop_rx).is_some());
    }

    #[test]
    fn fake_failer_rejects_blocks_at_or_past_the_configured_number() {
        let engine = Engine::new_fake_failer(10);
        let header = Header::new(10, U256::MAX);
        let block = Block::new(header);
        let (_stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        assert_eq!(engine.seal(&block, &stop_rx), None);
    }
}
