/*!
A Register bundles the Count-Min Sketches for every task that shares one
physical memory bank, plus each task's optional elephant region — a small
exact-counter map that isolates heavy hitters from the approximate sketch.

Grounded on `register.py::Register`.
*/

use std::collections::HashMap;
use std::rc::Rc;

use crate::cms::{CountMinSketch, Operation};
use crate::error::Result;
use crate::hash::Hasher;

pub struct Register {
    /// Bit width used for elephant-region counters; the spec calls this the
    /// "register default" counter size.
    default_counter_size: u32,
    cms: Vec<CountMinSketch>,
    /// `elephant[task]` is `None` when the elephant region is disabled
    /// entirely (not just empty) for this register.
    elephant: Vec<Option<HashMap<Box<[u8]>, i64>>>,
    elephant_capacity: Vec<usize>,
}

impl Register {
    pub fn new(
        default_counter_size: u32,
        counter_sizes: &[u32],
        widths: &[usize],
        elephant_capacities: Option<&[usize]>,
        hasher: Rc<Hasher>,
    ) -> Result<Self> {
        let n_task = counter_sizes.len();
        let mut cms = Vec::with_capacity(n_task);
        for i in 0..n_task {
            cms.push(CountMinSketch::new(counter_sizes[i], widths[i], hasher.clone())?);
        }
        let (elephant, elephant_capacity) = match elephant_capacities {
            Some(caps) => (
                (0..n_task).map(|_| Some(HashMap::new())).collect(),
                caps.to_vec(),
            ),
            None => (vec![None; n_task], vec![0; n_task]),
        };
        Ok(Self {
            default_counter_size,
            cms,
            elephant,
            elephant_capacity,
        })
    }

    pub fn n_task(&self) -> usize {
        self.cms.len()
    }

    pub fn cms(&self, task: usize) -> &CountMinSketch {
        &self.cms[task]
    }

    pub fn cms_mut(&mut self, task: usize) -> &mut CountMinSketch {
        &mut self.cms[task]
    }

    pub fn elephant_capacity(&self, task: usize) -> usize {
        self.elephant_capacity[task]
    }

    pub fn has_elephant_region(&self) -> bool {
        self.elephant.iter().any(Option::is_some)
    }

    /// Keys currently promoted into `task`'s elephant region, if any.
    pub fn elephant_keys(&self, task: usize) -> Vec<Box<[u8]>> {
        match &self.elephant[task] {
            Some(map) => map.keys().cloned().collect(),
            None => Vec::new(),
        }
    }

    fn is_elephant(&self, task: usize, key: &[u8]) -> bool {
        self.elephant[task]
            .as_ref()
            .is_some_and(|m| m.contains_key(key))
    }

    /// Routes to the elephant counter if `key` is currently promoted,
    /// otherwise to the task's CMS. Matches `register.py::update_cms`.
    pub fn update_cms(&mut self, task: usize, op: Operation, key: &[u8], value: i64) -> (Vec<i64>, Vec<i64>) {
        if self.is_elephant(task, key) {
            return self.update_elephant(task, op, key, value);
        }
        self.cms[task].operate(key, op, value)
    }

    fn update_elephant(&mut self, task: usize, op: Operation, key: &[u8], value: i64) -> (Vec<i64>, Vec<i64>) {
        let modulus = 1i64 << (self.default_counter_size - 1);
        let map = self.elephant[task].as_mut().expect("elephant region enabled");
        let old = *map.get(key).unwrap_or(&0);
        let raw = match op {
            Operation::Plus => old + value,
            Operation::Minus => old - value,
            Operation::SetBitTrue => old | value,
            Operation::SetBitFalse => value,
        };
        let stored = raw.rem_euclid(modulus);
        let overflow_quotient = raw.div_euclid(modulus);
        map.insert(key.into(), stored);

        // Scale the overflow up so the control plane sees it at the
        // magnitude the task's (narrower) CMS counters would have produced.
        let task_cs = self.cms[task].counter_size();
        let scale = 1i64 << (self.default_counter_size - task_cs);
        let overflow = vec![overflow_quotient * scale; self.cms[task].depth()];
        (overflow, self.read(task, key))
    }

    /// Read `key`'s current value: CMS read, plus the elephant contribution
    /// if promoted.
    pub fn read(&self, task: usize, key: &[u8]) -> Vec<i64> {
        let base = self.cms[task].read(key);
        if let Some(map) = &self.elephant[task] {
            if let Some(&extra) = map.get(key) {
                return base.into_iter().map(|v| v + extra).collect();
            }
        }
        base
    }

    /// Promote `inserted` keys (zero-initialised) and evict `evicted` keys
    /// back into the task CMS, returning each evicted key's per-row overflow
    /// contribution for the control plane to absorb.
    /// Matches `register.py::change_top_k`.
    pub fn change_top_k(
        &mut self,
        task: usize,
        inserted: &[Box<[u8]>],
        evicted: &[Box<[u8]>],
    ) -> Vec<(Box<[u8]>, Vec<i64>)> {
        let mut result = Vec::with_capacity(evicted.len());
        for key in evicted {
            let value = self.elephant[task]
                .as_mut()
                .expect("elephant region enabled")
                .remove(key)
                .unwrap_or(0);
            let (overflow, _) = self.cms[task].plus(key, value);
            result.push((key.clone(), overflow));
        }
        for key in inserted {
            self.elephant[task]
                .as_mut()
                .expect("elephant region enabled")
                .insert(key.clone(), 0);
        }
        result
    }

    /// Zero every CMS and, if present, wipe the elephant region entirely
    /// (the reference recreates fresh empty maps on window refresh).
    pub fn clear(&mut self) {
        for cms in &mut self.cms {
            cms.clear();
        }
        for slot in &mut self.elephant {
            if slot.is_some() {
                *slot = Some(HashMap::new());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> Rc<Hasher> {
        Rc::new(Hasher::new(4, 32, None).unwrap())
    }

    #[test]
    fn elephant_region_absorbs_updates_and_read_includes_both() {
        let mut reg = Register::new(32, &[16, 16], &[16, 16], Some(&[4, 4]), hasher()).unwrap();
        reg.change_top_k(0, &[b"hot".as_slice().into()], &[]);
        assert!(reg.is_elephant(0, b"hot"));
        reg.update_cms(0, Operation::Plus, b"hot", 5);
        reg.update_cms(0, Operation::Plus, b"hot", 3);
        assert_eq!(reg.read(0, b"hot"), vec![8; 4]);
    }

    #[test]
    fn evicting_feeds_counter_back_into_cms() {
        let mut reg = Register::new(32, &[16], &[16], Some(&[4]), hasher()).unwrap();
        reg.change_top_k(0, &[b"hot".as_slice().into()], &[]);
        reg.update_cms(0, Operation::Plus, b"hot", 42);
        let evicted = reg.change_top_k(0, &[], &[b"hot".as_slice().into()]);
        assert_eq!(evicted.len(), 1);
        assert!(!reg.is_elephant(0, b"hot"));
        assert_eq!(reg.read(0, b"hot"), vec![42; 4]);
    }

    #[test]
    fn clear_zeroes_cms_and_resets_elephant_maps() {
        let mut reg = Register::new(32, &[16], &[16], Some(&[4]), hasher()).unwrap();
        reg.change_top_k(0, &[b"hot".as_slice().into()], &[]);
        reg.update_cms(0, Operation::Plus, b"hot", 7);
        reg.update_cms(0, Operation::Plus, b"cold", 9);
        reg.clear();
        assert_eq!(reg.read(0, b"hot"), vec![0; 4]);
        assert_eq!(reg.read(0, b"cold"), vec![0; 4]);
        assert!(!reg.is_elephant(0, b"hot"));
    }
}
