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

//! The backing storage behind an artifact's word slice: either an owned
//! heap buffer or a live memory map. Mirrors the `Either<Vec<Node>, Mmap>`
//! shape used by the upstream `ethash` crate's node cache.

use crate::mmap::MappedWords;
use either::Either;

pub struct WordStorage(Either<Box<[u32]>, MappedWords>);

impl WordStorage {
    pub fn heap(words: Vec<u32>) -> Self {
        WordStorage(Either::Left(words.into_boxed_slice()))
    }

    pub fn mapped(mapped: MappedWords) -> Self {
        WordStorage(Either::Right(mapped))
    }

    pub fn words(&self) -> &[u32] {
        match &self.0 {
            Either::Left(heap) => heap,
            Either::Right(mapped) => mapped.words(),
        }
    }

    pub fn is_mapped(&self) -> bool {
        self.0.is_right()
    }
}
