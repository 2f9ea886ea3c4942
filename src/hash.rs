/*!
Keyed hash family used by every sketch (CMS, Bloom filters) in the core.

Tofino-style dataplanes reach for CRC over anything cryptographic because the
hash table is wired into fixed-function ALUs; we follow the reference
(`common.py::hash_crc`) and reproduce that with four distinct 32-bit CRC
polynomials (CRC-32, CRC-32C, CRC-32D, CRC-32K), each configured
`init=0xFFFFFFFF`, `xorout=0xFFFFFFFF`, fully reflected.
*/

use crc::{Algorithm, Crc};
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::LazyLock;

use crate::error::{CerberusError, Result};

const MAX_N_HASH: usize = 4;

/// `crc_polynomial_degree` values the config schema accepts at all (spec.md
/// §6). Only 32 has an actual CRC family wired up below; anything else is a
/// valid-looking but unimplemented degree and is rejected as a config error.
const VALID_CRC_DEGREES: [u32; 5] = [8, 16, 24, 32, 64];
const IMPLEMENTED_CRC_DEGREE: u32 = 32;

const ALGORITHMS: [Algorithm<u32>; MAX_N_HASH] = [
    // CRC-32 (ISO-HDLC polynomial, reflected)
    Algorithm {
        width: 32,
        poly: 0x04C1_1DB7,
        init: 0xFFFF_FFFF,
        refin: true,
        refout: true,
        xorout: 0xFFFF_FFFF,
        check: 0,
        residue: 0,
    },
    // CRC-32C (Castagnoli polynomial, reflected)
    Algorithm {
        width: 32,
        poly: 0x1EDC_6F41,
        init: 0xFFFF_FFFF,
        refin: true,
        refout: true,
        xorout: 0xFFFF_FFFF,
        check: 0,
        residue: 0,
    },
    // CRC-32D (Koopman-style polynomial used in the reference as "crc32d")
    Algorithm {
        width: 32,
        poly: 0xA833_982B,
        init: 0xFFFF_FFFF,
        refin: true,
        refout: true,
        xorout: 0xFFFF_FFFF,
        check: 0,
        residue: 0,
    },
    // CRC-32K (Koopman polynomial used in the reference as "crc32k")
    Algorithm {
        width: 32,
        poly: 0x741B_8CD7,
        init: 0xFFFF_FFFF,
        refin: true,
        refout: true,
        xorout: 0xFFFF_FFFF,
        check: 0,
        residue: 0,
    },
];

static TABLES: LazyLock<[Crc<u32>; MAX_N_HASH]> = LazyLock::new(|| {
    [
        Crc::<u32>::new(&ALGORITHMS[0]),
        Crc::<u32>::new(&ALGORITHMS[1]),
        Crc::<u32>::new(&ALGORITHMS[2]),
        Crc::<u32>::new(&ALGORITHMS[3]),
    ]
});

/// A family of `n_hash` independent deterministic hash functions over byte
/// strings. Purely a function of `(key, depth)`; safe to call from anywhere
/// but not `Sync` once memoisation is enabled (see module docs in `SPEC_FULL.md` §9).
#[derive(Debug)]
pub struct Hasher {
    n_hash: usize,
    cache: Option<RefCell<HashMap<(Box<[u8]>, u8), u32>>>,
}

impl Hasher {
    /// `crc_polynomial_degree` is checked against the config schema's valid
    /// set ({8,16,24,32,64}) and then against what's actually implemented
    /// (32 only, via the four CRC-32 variants in `ALGORITHMS`); both failure
    /// modes are `CerberusError::Config`, matching §7's "unsupported CRC
    /// degree" fatal-at-construction case.
    ///
    /// `cache_capacity_hint` is advisory only (`HashMap` has no hard cap); pass
    /// `None` to disable memoisation entirely.
    pub fn new(n_hash: usize, crc_polynomial_degree: u32, cache_capacity_hint: Option<usize>) -> Result<Self> {
        if n_hash == 0 || n_hash > MAX_N_HASH {
            return Err(CerberusError::Config(format!(
                "n_hash must be in 1..={MAX_N_HASH}, got {n_hash}"
            )));
        }
        if !VALID_CRC_DEGREES.contains(&crc_polynomial_degree) {
            return Err(CerberusError::Config(format!(
                "crc_polynomial_degree must be one of {VALID_CRC_DEGREES:?}, got {crc_polynomial_degree}"
            )));
        }
        if crc_polynomial_degree != IMPLEMENTED_CRC_DEGREE {
            return Err(CerberusError::Config(format!(
                "crc_polynomial_degree {crc_polynomial_degree} is not implemented; only {IMPLEMENTED_CRC_DEGREE} is"
            )));
        }
        Ok(Self {
            n_hash,
            cache: cache_capacity_hint.map(|cap| RefCell::new(HashMap::with_capacity(cap))),
        })
    }

    pub fn n_hash(&self) -> usize {
        self.n_hash
    }

    /// Hash `key` with the `depth`-th function (`depth < n_hash`).
    pub fn hash(&self, key: &[u8], depth: usize) -> u32 {
        debug_assert!(depth < self.n_hash, "hash depth out of range");
        let Some(cache) = &self.cache else {
            return TABLES[depth].checksum(key);
        };
        // No borrowed-key lookup here: a cache miss is the common case for a
        // sketch this wide, so we pay one allocation rather than fight
        // `HashMap`'s `Borrow` requirements for a composite tuple key.
        let cache_key: (Box<[u8]>, u8) = (key.into(), depth as u8);
        if let Some(hit) = cache.borrow().get(&cache_key) {
            return *hit;
        }
        let value = TABLES[depth].checksum(key);
        cache.borrow_mut().insert(cache_key, value);
        value
    }

    /// Hash `key` into a column index within `[0, array_size)`.
    pub fn hash_index(&self, key: &[u8], depth: usize, array_size: usize) -> usize {
        (self.hash(key, depth) as usize) % array_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_or_too_many_hashes() {
        assert!(Hasher::new(0, 32, None).is_err());
        assert!(Hasher::new(5, 32, None).is_err());
        assert!(Hasher::new(4, 32, None).is_ok());
    }

    #[test]
    fn rejects_unsupported_crc_degrees() {
        assert!(Hasher::new(4, 7, None).is_err(), "not even in the config schema's valid set");
        assert!(Hasher::new(4, 16, None).is_err(), "valid per schema but not implemented");
        assert!(Hasher::new(4, 32, None).is_ok());
    }

    #[test]
    fn is_deterministic_and_varies_by_depth() {
        let h = Hasher::new(4, 32, None).unwrap();
        let a = h.hash(b"flow-key", 0);
        let b = h.hash(b"flow-key", 0);
        assert_eq!(a, b);

        let c = h.hash(b"flow-key", 1);
        assert_ne!(a, c, "different polynomials should (almost always) diverge");
    }

    #[test]
    fn memoised_and_unmemoised_agree() {
        let cached = Hasher::new(4, 32, Some(16)).unwrap();
        let plain = Hasher::new(4, 32, None).unwrap();
        for depth in 0..4 {
            assert_eq!(cached.hash(b"abc", depth), plain.hash(b"abc", depth));
        }
    }

    #[test]
    fn hash_index_is_in_range() {
        let h = Hasher::new(4, 32, None).unwrap();
        for depth in 0..4 {
            assert!(h.hash_index(b"x", depth, 64) < 64);
        }
    }
}
