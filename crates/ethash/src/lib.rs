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

//! Epoch-indexed proof-of-work cache and dataset engine: generates and
//! retains the verification caches and mining datasets a hashimoto-style
//! consensus engine needs, memory-maps them to and from disk, and drives a
//! parallel nonce search against them.
//!
//! Consumers typically only touch [`engine::Engine`] and [`types`]; the
//! other modules are the machinery underneath it.

pub mod artifact;
pub mod compute;
pub mod engine;
pub mod error;
pub mod hashrate;
pub mod mmap;
mod sealer;
pub mod types;
pub mod words;

pub use artifact::{Cache, Dataset};
pub use compute::{difficulty_to_boundary, SeedHashCompute};
pub use engine::{make_cache, make_dataset, Engine, EngineConfig};
pub use error::{Error, Result};
pub use types::{Block, Header};
