/*!
Count-Min Sketch: the d×w counter grid at the heart of every measurement task.

Storage is a single flat `Vec<i64>` of length `depth * width` (row-major),
mirroring the teacher's flat-array discipline (`Bus`'s RAM, `Ppu`'s OAM) rather
than a `Vec<Vec<i64>>` of rows — resizing is then a rebuild of one slice
instead of a nested one.

Cells are non-negative integers strictly below `2^(counter_size-1)`; any
operation that would push a cell past that bound saturates it and returns the
overflow as a separate d-length vector the caller is responsible for routing
to the control plane. `counter_size` therefore always leaves the top bit free
to report overflow through, matching `cms.py`.
*/

use std::rc::Rc;

use crate::error::{CerberusError, Result};
use crate::hash::Hasher;

/// Update applied to every row of a sketch cell. Mirrors the reference's
/// `plus`/`minus`/`setbitTrue`/`setbitFalse` operation labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Plus,
    Minus,
    SetBitTrue,
    SetBitFalse,
}

impl Operation {
    fn apply(self, old: i64, value: i64) -> i64 {
        match self {
            Operation::Plus => old + value,
            Operation::Minus => old - value,
            Operation::SetBitTrue => old | value,
            Operation::SetBitFalse => value,
        }
    }

    pub fn parse(label: &str) -> Result<Self> {
        match label {
            "plus" => Ok(Operation::Plus),
            "minus" => Ok(Operation::Minus),
            "setbitTrue" => Ok(Operation::SetBitTrue),
            "setbitFalse" => Ok(Operation::SetBitFalse),
            other => Err(CerberusError::Config(format!(
                "unknown operation label: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CountMinSketch {
    counter_size: u32,
    width: usize,
    depth: usize,
    max: i64,
    cells: Vec<i64>,
    hasher: Rc<Hasher>,
}

impl CountMinSketch {
    pub fn new(counter_size: u32, width: usize, hasher: Rc<Hasher>) -> Result<Self> {
        if counter_size == 0 {
            return Err(CerberusError::Config(
                "counter_size must be positive".into(),
            ));
        }
        if width == 0 {
            return Err(CerberusError::Config("width must be positive".into()));
        }
        let depth = hasher.n_hash();
        Ok(Self {
            counter_size,
            width,
            depth,
            max: cell_max(counter_size),
            cells: vec![0; depth * width],
            hasher,
        })
    }

    pub fn counter_size(&self) -> u32 {
        self.counter_size
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn max(&self) -> i64 {
        self.max
    }

    #[inline]
    fn index(&self, row: usize, col: usize) -> usize {
        row * self.width + col
    }

    fn columns(&self, key: &[u8]) -> impl Iterator<Item = usize> + '_ {
        (0..self.depth).map(move |row| self.hasher.hash_index(key, row, self.width))
    }

    /// Zero every cell (used on window rotation).
    pub fn clear(&mut self) {
        self.cells.fill(0);
    }

    /// Apply `op` with operand `value` at every row for `key`.
    ///
    /// Returns `(overflow, read_back)`, both length `depth`. `overflow[i]` is
    /// the floor-divided high part of the raw result (`raw.div_euclid(2^(cs-1))`);
    /// `read_back[i]` is the saturated stored value after the update.
    pub fn operate(&mut self, key: &[u8], op: Operation, value: i64) -> (Vec<i64>, Vec<i64>) {
        let modulus = 1i64 << (self.counter_size - 1);
        let mut overflow = Vec::with_capacity(self.depth);
        let mut read_back = Vec::with_capacity(self.depth);
        let columns: Vec<usize> = self.columns(key).collect();
        for (row, col) in columns.into_iter().enumerate() {
            let idx = self.index(row, col);
            let old = self.cells[idx];
            let raw = op.apply(old, value);
            // Floor division / non-negative modulo, replicating Python's `//`
            // and `%` for possibly-negative `raw` (see SPEC_FULL.md §9).
            let stored = raw.rem_euclid(modulus);
            let over = raw.div_euclid(modulus);
            self.cells[idx] = stored;
            overflow.push(over);
            read_back.push(stored);
        }
        (overflow, read_back)
    }

    pub fn plus(&mut self, key: &[u8], value: i64) -> (Vec<i64>, Vec<i64>) {
        self.operate(key, Operation::Plus, value)
    }

    pub fn minus(&mut self, key: &[u8], value: i64) -> (Vec<i64>, Vec<i64>) {
        self.operate(key, Operation::Minus, value)
    }

    pub fn setbit_or(&mut self, key: &[u8], value: i64) -> (Vec<i64>, Vec<i64>) {
        self.operate(key, Operation::SetBitTrue, value)
    }

    pub fn setbit_assign(&mut self, key: &[u8], value: i64) -> (Vec<i64>, Vec<i64>) {
        self.operate(key, Operation::SetBitFalse, value)
    }

    /// Stored values per row, no overflow tracking.
    pub fn read(&self, key: &[u8]) -> Vec<i64> {
        self.columns(key)
            .enumerate()
            .map(|(row, col)| self.cells[self.index(row, col)])
            .collect()
    }

    /// Overwrite the stored value at each of `key`'s rows directly (no
    /// further saturation check — the caller has already clamped). Used by
    /// the control plane after it computes a saturated combine.
    pub fn assign_row_values(&mut self, key: &[u8], values: &[i64]) {
        let columns: Vec<usize> = self.columns(key).collect();
        for (row, col) in columns.into_iter().enumerate() {
            let idx = self.index(row, col);
            self.cells[idx] = values[row];
        }
    }

    /// Split the low `s` bits out of every cell for shipment elsewhere,
    /// retaining the high bits in place. Matches
    /// `control_plane.py::send_to_dataplane`.
    pub fn split_low_bits(&mut self, s: u32) -> Vec<i64> {
        let modulus = 1i64 << s;
        let mut low = Vec::with_capacity(self.cells.len());
        for cell in self.cells.iter_mut() {
            low.push(cell.rem_euclid(modulus));
            *cell = cell.div_euclid(modulus);
        }
        low
    }

    /// Fold previously-split low bits back in: multiply every cell by
    /// `2^(-s)` (`s` is negative, the magnitude of the narrowing that
    /// produced `received`) and add the corresponding received bits,
    /// saturating at the current max. Matches
    /// `control_plane.py::receive_from_dataplane`.
    pub fn merge_low_bits(&mut self, s: i32, received: &[i64]) {
        debug_assert!(s < 0, "merge_low_bits expects a negative slicing magnitude");
        let shift = 1i64 << (-s) as u32;
        for (cell, &recv) in self.cells.iter_mut().zip(received) {
            *cell = (*cell * shift + recv).min(self.max);
        }
    }

    /// Column resize first, then counter-width resize, matching
    /// `cms.py::resize_bucket`.
    ///
    /// `upper_bits` is consulted only when widening (`delta_cs > 0`), as a
    /// `depth * new_width`-length flat matrix of high bits received from the
    /// control plane. The return value is `Some(flat matrix)` only when
    /// narrowing (`delta_cs < 0`), holding the bits the control plane must
    /// absorb; otherwise `None`.
    pub fn resize_bucket(
        &mut self,
        delta_cs: i32,
        new_width: usize,
        upper_bits: Option<&[i64]>,
    ) -> Result<Option<Vec<i64>>> {
        self.resize_width(new_width)?;
        self.resize_counter(delta_cs, upper_bits)
    }

    fn resize_width(&mut self, new_width: usize) -> Result<()> {
        use std::cmp::Ordering;
        match new_width.cmp(&self.width) {
            Ordering::Equal => Ok(()),
            Ordering::Greater => {
                if new_width % self.width != 0 {
                    return Err(CerberusError::Config(format!(
                        "new width {new_width} is not a multiple of current width {}",
                        self.width
                    )));
                }
                let ratio = new_width / self.width;
                let mut enlarged = vec![0i64; self.depth * new_width];
                for row in 0..self.depth {
                    for col in 0..self.width {
                        let value = self.cells[self.index(row, col)];
                        for k in 0..ratio {
                            enlarged[row * new_width + col + self.width * k] = value;
                        }
                    }
                }
                self.cells = enlarged;
                self.width = new_width;
                Ok(())
            }
            Ordering::Less => {
                if self.width % new_width != 0 {
                    return Err(CerberusError::Config(format!(
                        "current width {} is not a multiple of new width {new_width}",
                        self.width
                    )));
                }
                let mut compressed = vec![0i64; self.depth * new_width];
                for row in 0..self.depth {
                    for col in 0..new_width {
                        let mut m = i64::MIN;
                        let mut src = col;
                        while src < self.width {
                            m = m.max(self.cells[row * self.width + src]);
                            src += new_width;
                        }
                        compressed[row * new_width + col] = m;
                    }
                }
                self.cells = compressed;
                self.width = new_width;
                Ok(())
            }
        }
    }

    fn resize_counter(
        &mut self,
        delta_cs: i32,
        upper_bits: Option<&[i64]>,
    ) -> Result<Option<Vec<i64>>> {
        let new_cs = self.counter_size as i32 + delta_cs;
        if new_cs <= 0 {
            return Err(CerberusError::Config(format!(
                "new counter_size can't be non-positive: {new_cs}"
            )));
        }
        let new_cs = new_cs as u32;
        match delta_cs.cmp(&0) {
            std::cmp::Ordering::Equal => Ok(None),
            std::cmp::Ordering::Greater => {
                let upper = upper_bits.ok_or_else(|| {
                    CerberusError::Config("widening requires upper_bits from control plane".into())
                })?;
                if upper.len() != self.cells.len() {
                    return Err(CerberusError::Config(format!(
                        "upper_bits length {} does not match cell count {}",
                        upper.len(),
                        self.cells.len()
                    )));
                }
                let shift = 1i64 << (self.counter_size - 1);
                for (cell, up) in self.cells.iter_mut().zip(upper) {
                    *cell += up * shift;
                }
                self.counter_size = new_cs;
                self.max = cell_max(new_cs);
                Ok(None)
            }
            std::cmp::Ordering::Less => {
                let modulus = 1i64 << (new_cs - 1);
                let mut result = Vec::with_capacity(self.cells.len());
                for cell in self.cells.iter_mut() {
                    result.push(cell.div_euclid(modulus));
                    *cell = cell.rem_euclid(modulus);
                }
                self.counter_size = new_cs;
                self.max = cell_max(new_cs);
                Ok(Some(result))
            }
        }
    }
}

fn cell_max(counter_size: u32) -> i64 {
    (1i64 << (counter_size - 1)) - 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher(n_hash: usize) -> Rc<Hasher> {
        Rc::new(Hasher::new(n_hash, 32, None).unwrap())
    }

    #[test]
    fn saturates_and_overflows_on_eighth_increment() {
        let mut cms = CountMinSketch::new(4, 8, hasher(4)).unwrap();
        for _ in 0..7 {
            cms.plus(b"a", 1);
        }
        assert_eq!(cms.read(b"a"), vec![7, 7, 7, 7]);
        let (overflow, read_back) = cms.plus(b"a", 1);
        assert_eq!(overflow, vec![1, 1, 1, 1]);
        assert_eq!(read_back, vec![0, 0, 0, 0]);
        assert_eq!(cms.read(b"a"), vec![0, 0, 0, 0]);
    }

    #[test]
    fn widening_adds_upper_bits_scaled_by_old_modulus() {
        let mut cms = CountMinSketch::new(4, 8, hasher(4)).unwrap();
        let upper = vec![1i64; 4 * 8];
        cms.resize_bucket(2, 8, Some(&upper)).unwrap();
        assert_eq!(cms.counter_size(), 6);
        assert_eq!(cms.max(), (1i64 << 5) - 1);
        for &c in &cms.cells {
            assert_eq!(c, 8);
        }
    }

    #[test]
    fn narrowing_then_widening_preserves_mass() {
        let mut cms = CountMinSketch::new(9, 8, hasher(4)).unwrap();
        for i in 0..20u8 {
            cms.plus(&[i], (i as i64) % 5 + 1);
        }
        let before = cms.cells.clone();
        let high = cms.resize_bucket(-2, 8, None).unwrap().unwrap();
        assert_eq!(cms.counter_size(), 7);
        cms.resize_bucket(2, 8, Some(&high)).unwrap();
        assert_eq!(cms.counter_size(), 9);
        assert_eq!(cms.cells, before);
    }

    #[test]
    fn column_enlargement_is_idempotent_on_reads() {
        let mut cms = CountMinSketch::new(9, 8, hasher(4)).unwrap();
        let keys: Vec<Vec<u8>> = (0..20u8).map(|i| vec![i]).collect();
        for (i, k) in keys.iter().enumerate() {
            cms.plus(k, (i as i64) % 7 + 1);
        }
        let before: Vec<Vec<i64>> = keys.iter().map(|k| cms.read(k)).collect();
        cms.resize_bucket(0, 16, None).unwrap();
        let after: Vec<Vec<i64>> = keys.iter().map(|k| cms.read(k)).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn column_compression_is_max_across_collapsing_rows() {
        let mut cms = CountMinSketch::new(9, 8, hasher(1)).unwrap();
        cms.cells = vec![1, 5, 2, 9, 0, 0, 0, 0];
        cms.resize_bucket(0, 4, None).unwrap();
        assert_eq!(cms.cells, vec![1, 5, 2, 9]);
    }

    #[test]
    fn rejects_non_divisible_resize() {
        let mut cms = CountMinSketch::new(9, 8, hasher(4)).unwrap();
        assert!(cms.resize_bucket(0, 12, None).is_err());
        assert!(cms.resize_bucket(0, 3, None).is_err());
    }

    #[test]
    fn plus_never_decreases_read_until_saturation() {
        let mut cms = CountMinSketch::new(16, 8, hasher(4)).unwrap();
        let mut last = 0i64;
        for _ in 0..100 {
            cms.plus(b"steady", 1);
            let now = *cms.read(b"steady").iter().min().unwrap();
            assert!(now >= last);
            last = now;
        }
    }
}
