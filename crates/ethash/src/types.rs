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

//! Minimal stand-ins for the block/header types the sealer operates on.
//!
//! The real schema (RLP encoding, full header field set, transaction root,
//! etc.) is owned by the embedding node and out of scope here — see
//! spec.md §1. This crate only needs enough shape to drive and exercise
//! the sealer: a number, a difficulty, and a nonce/mix-digest pair to fill
//! in once a seal is found.

use ethereum_types::{H256, U256};

/// Stand-in for the consensus header type. Real nodes hash a full RLP
/// encoding "without nonce"; this crate hashes whatever fields it has.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    pub number: u64,
    pub difficulty: U256,
    pub nonce: u64,
    pub mix_digest: H256,
}

impl Header {
    pub fn new(number: u64, difficulty: U256) -> Self {
        Header { number, difficulty, nonce: 0, mix_digest: H256::zero() }
    }

    /// Hash of the header's sealing-independent fields.
    pub fn hash_without_nonce(&self) -> H256 {
        use tiny_keccak::{Hasher, Keccak};
        let mut diff_bytes = [0u8; 32];
        self.difficulty.to_big_endian(&mut diff_bytes);

        let mut out = [0u8; 32];
        let mut hasher = Keccak::v256();
        hasher.update(&self.number.to_be_bytes());
        hasher.update(&diff_bytes);
        hasher.finalize(&mut out);
        H256(out)
    }
}

/// Stand-in for a sealed/unsealed block: just its header, since sealing
/// only ever touches header fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub header: Header,
}

impl Block {
    pub fn new(header: Header) -> Self {
        Block { header }
    }

    /// Returns a copy of this block with `header` substituted — mirrors
    /// the upstream `Block::WithSeal` used to attach a found nonce.
    pub fn with_seal(&self, header: Header) -> Block {
        Block { header }
    }
}
