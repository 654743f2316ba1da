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

//! Word-array memory mapping: a file on disk exposed as a contiguous, read
//! only sequence of 32-bit words preceded by a two-word magic header.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use memmap::{Mmap, Protection};

use crate::error::{Error, Result};

/// Data structure revision, baked into on-disk file names.
pub const ALGORITHM_REVISION: u32 = 23;

/// Magic header words (host byte order); used to detect truncated or
/// foreign files before ever handing a mapping to a reader.
pub const DUMP_MAGIC: [u32; 2] = [0xbadd_cafe, 0xfee1_dead];

const WORD_BYTES: usize = 4;

/// Whether this host is little-endian. Only affects the on-disk file name
/// suffix: payload words are always written in host order.
pub fn is_little_endian() -> bool {
    cfg!(target_endian = "little")
}

/// Suffix appended to on-disk artifact file names on big-endian hosts, so a
/// BE-generated file is never mistakenly loaded by an LE host (or vice
/// versa) on shared storage.
pub fn endian_suffix() -> &'static str {
    if is_little_endian() {
        ""
    } else {
        ".be"
    }
}

fn read_word(bytes: &[u8], index: usize) -> u32 {
    let off = index * WORD_BYTES;
    u32::from_ne_bytes([bytes[off], bytes[off + 1], bytes[off + 2], bytes[off + 3]])
}

fn write_word(bytes: &mut [u8], index: usize, value: u32) {
    let off = index * WORD_BYTES;
    bytes[off..off + WORD_BYTES].copy_from_slice(&value.to_ne_bytes());
}

/// A read-only file backing for a word array: the open file descriptor plus
/// its live memory map. `words()` aliases the mapping and is only valid
/// while `self` lives — dropping this drops the map, then the file, in
/// that order.
pub struct MappedWords {
    map: Mmap,
    file: File,
}

impl MappedWords {
    /// Word slice following the two-word magic header.
    pub fn words(&self) -> &[u32] {
        // SAFETY: `map` is a read-only mapping of a file whose length is a
        // multiple of 4 past the 8-byte header (enforced at creation/open
        // time below), and mmap-ed pages are word aligned on every
        // platform this crate targets.
        let body = unsafe { &self.map.as_slice()[8..] };
        debug_assert_eq!(body.len() % WORD_BYTES, 0);
        unsafe { std::slice::from_raw_parts(body.as_ptr() as *const u32, body.len() / WORD_BYTES) }
    }
}

/// Open an existing artifact file read-only, memory-map it whole, and
/// verify the magic header. Fails with `InvalidDumpMagic` if the header
/// doesn't match; on any failure the file is closed and no mapping leaks.
pub fn open_mapped(path: &Path) -> Result<MappedWords> {
    let file = File::open(path)?;
    let map = match Mmap::open(&file, Protection::Read) {
        Ok(m) => m,
        Err(e) => return Err(Error::Io(e)),
    };
    let bytes = unsafe { map.as_slice() };
    if bytes.len() < 8 || (bytes.len() - 8) % WORD_BYTES != 0 {
        return Err(Error::InvalidDumpMagic);
    }
    if read_word(bytes, 0) != DUMP_MAGIC[0] || read_word(bytes, 1) != DUMP_MAGIC[1] {
        return Err(Error::InvalidDumpMagic);
    }
    Ok(MappedWords { file, map })
}

/// Create a fresh temp file, truncate it to `8 + payload_words.len() * 4`
/// bytes, mmap it read-write, write the magic header, run `generator` over
/// the word slice past the header, unmap, close, rename temp -> `path`
/// atomically, then reopen via [`open_mapped`]. Any failure removes the
/// partial temp file.
pub fn create_and_generate(
    path: &Path,
    payload_words: usize,
    generator: impl FnOnce(&mut [u32]),
) -> Result<MappedWords> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let temp: PathBuf = {
        let mut name = path.as_os_str().to_owned();
        name.push(".");
        name.push(rand_suffix().to_string());
        PathBuf::from(name)
    };

    let result = (|| -> Result<()> {
        let dump = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp)?;
        let total_bytes = 8 + payload_words * WORD_BYTES;
        dump.set_len(total_bytes as u64)?;

        let mut map = Mmap::open(&dump, Protection::ReadWrite)?;
        {
            let bytes = unsafe { map.as_mut_slice() };
            write_word(bytes, 0, DUMP_MAGIC[0]);
            write_word(bytes, 1, DUMP_MAGIC[1]);

            let body = &mut bytes[8..];
            // SAFETY: same alignment/length argument as `MappedWords::words`.
            let words = unsafe {
                std::slice::from_raw_parts_mut(body.as_mut_ptr() as *mut u32, body.len() / WORD_BYTES)
            };
            generator(words);
        }

        map.flush()?;
        drop(map);
        drop(dump);
        fs::rename(&temp, path)?;
        Ok(())
    })();

    match result {
        Ok(()) => open_mapped(path),
        Err(e) => {
            let _ = fs::remove_file(&temp);
            Err(e)
        }
    }
}

/// Build the on-disk path for an artifact: `dir/{prefix}-R{rev}-{hex8(seed)}[.be]`.
pub fn artifact_path(dir: &Path, prefix: &str, seed: &[u8; 32]) -> PathBuf {
    let hex8: String = seed[..8].iter().map(|b| format!("{b:02x}")).collect();
    dir.join(format!("{prefix}-R{}-{hex8}{}", ALGORITHM_REVISION, endian_suffix()))
}

fn rand_suffix() -> u32 {
    use std::time::{SystemTime, UNIX_EPOCH};
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    nanos ^ COUNTER.fetch_add(1, Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hex::FromHex;
    use std::io::Write;
    use tempdir::TempDir;

    #[test]
    fn artifact_path_hex8_segment_decodes_back_to_the_seed_prefix() {
        let dir = Path::new("/tmp/ethash-fixture");
        let seed = [0xabu8; 32];
        let path = artifact_path(dir, "cache", &seed);
        let name = path.file_name().unwrap().to_str().unwrap().to_owned();
        let hex8 = name.rsplit('-').next().unwrap();
        let decoded: Vec<u8> = hex8.from_hex().unwrap();
        assert_eq!(decoded, seed[..8]);
    }

    #[test]
    fn round_trip_through_create_and_open() {
        let dir = TempDir::new("ethash-mmap").unwrap();
        let path = dir.path().join("artifact");
        create_and_generate(&path, 16, |buf| {
            for (i, w) in buf.iter_mut().enumerate() {
                *w = i as u32;
            }
        })
        .unwrap();

        let mapped = open_mapped(&path).unwrap();
        let words: Vec<u32> = mapped.words().to_vec();
        assert_eq!(words, (0..16).collect::<Vec<u32>>());
    }

    #[test]
    fn corrupted_magic_is_rejected_and_leaves_nothing_open() {
        let dir = TempDir::new("ethash-mmap").unwrap();
        let path = dir.path().join("artifact");
        let mut file = File::create(&path).unwrap();
        file.write_all(&[0u8; 16]).unwrap();
        drop(file);

        let err = open_mapped(&path).unwrap_err();
        assert!(matches!(err, Error::InvalidDumpMagic));
    }

    #[test]
    fn no_partial_file_left_on_generator_panic_free_error_path() {
        let dir = TempDir::new("ethash-mmap").unwrap();
        let missing_parent = dir.path().join("nested").join("artifact");
        create_and_generate(&missing_parent, 4, |buf| buf.fill(1)).unwrap();
        assert!(missing_parent.exists());
        let leftover: Vec<_> = fs::read_dir(missing_parent.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_none() && e.path() != missing_parent)
            .collect();
        assert!(leftover.is_empty());
    }
}
