/*!
Per-flow block decisions, one Bloom filter per window.

The reference does not define a separate bitset type for this: it reuses
`CountMinSketch` with `counter_size = 2` (so each cell's representable range
is exactly `{0, 1}`) and drives it with `setbitFalse` (unconditional assign).
We keep that reuse rather than introduce a second bit-array representation
that would need to be kept consistent with the CMS's own saturation rules —
see `cerberus.py`'s `self.blocklist = [cms.CountMinSketch(2, ...) for _ in range(2)]`.
*/

use std::rc::Rc;

use crate::cms::CountMinSketch;
use crate::error::Result;
use crate::hash::Hasher;

pub struct Blocklist {
    /// One Bloom filter per window, indexed by task 0's `current_window`.
    filters: [CountMinSketch; 2],
}

impl Blocklist {
    pub fn new(width: usize, hasher: Rc<Hasher>) -> Result<Self> {
        Ok(Self {
            filters: [
                CountMinSketch::new(2, width, hasher.clone())?,
                CountMinSketch::new(2, width, hasher)?,
            ],
        })
    }

    /// `true` iff every one of the `d` bits for `key` is set.
    pub fn test(&self, key: &[u8], window: usize) -> bool {
        self.filters[window]
            .read(key)
            .into_iter()
            .min()
            .unwrap_or(0)
            != 0
    }

    pub fn set(&mut self, key: &[u8], window: usize) {
        self.filters[window].setbit_assign(key, 1);
    }

    pub fn clear(&mut self, window: usize) {
        self.filters[window].clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_test_is_true_only_for_set_window() {
        let hasher = Rc::new(Hasher::new(4, 32, None).unwrap());
        let mut bl = Blocklist::new(1024, hasher).unwrap();
        assert!(!bl.test(b"10.0.0.1", 0));
        bl.set(b"10.0.0.1", 0);
        assert!(bl.test(b"10.0.0.1", 0));
        assert!(!bl.test(b"10.0.0.1", 1));
    }

    #[test]
    fn clear_resets_window() {
        let hasher = Rc::new(Hasher::new(4, 32, None).unwrap());
        let mut bl = Blocklist::new(1024, hasher).unwrap();
        bl.set(b"x", 0);
        bl.clear(0);
        assert!(!bl.test(b"x", 0));
    }
}
