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

//! Error taxonomy for the cache/dataset engine.
//!
//! Per the engine's policy, `IoError`/`InvalidDumpMagic` never reach a PoW
//! consumer: `Artifact::generate` catches them internally and degrades to a
//! heap-backed artifact, logging instead of propagating. They're public
//! here only so `mmap`/`artifact` internals have something typed to return.

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An on-disk artifact file's header doesn't match `DUMP_MAGIC`.
    #[error("invalid dump magic")]
    InvalidDumpMagic,

    /// File open/create/truncate/rename/mmap failure.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Invalid block-number argument to a CLI shim.
    #[error("usage error: {0}")]
    Usage(String),

    /// Invalid mode combination at engine construction.
    #[error("config mismatch: {0}")]
    ConfigMismatch(String),
}

pub type Result<T> = std::result::Result<T, Error>;
