/*!
The control plane: a per-task pair of CMS (one per window) that absorbs
overflow from the data plane once a flow is hot enough to spill past its
narrow data-plane counters.

Grounded on `control_plane.py::ControlPlane`.
*/

use std::rc::Rc;

use crate::cms::{CountMinSketch, Operation};
use crate::data_plane::prev_window;
use crate::error::Result;
use crate::hash::Hasher;

pub struct ControlPlane {
    /// `cms[window][task]`.
    cms: [Vec<CountMinSketch>; 2],
}

impl ControlPlane {
    pub fn new(counter_sizes: &[u32], widths: &[usize], hasher: Rc<Hasher>) -> Result<Self> {
        let build = |hasher: Rc<Hasher>| -> Result<Vec<CountMinSketch>> {
            counter_sizes
                .iter()
                .zip(widths)
                .map(|(&cs, &w)| CountMinSketch::new(cs, w, hasher.clone()))
                .collect()
        };
        Ok(Self {
            cms: [build(hasher.clone())?, build(hasher)?],
        })
    }

    pub fn cms(&self, window: usize, task: usize) -> &CountMinSketch {
        &self.cms[window][task]
    }

    pub fn cms_mut(&mut self, window: usize, task: usize) -> &mut CountMinSketch {
        &mut self.cms[window][task]
    }

    pub fn read(&self, task: usize, key: &[u8], current_window: usize) -> Vec<i64> {
        self.cms[prev_window(current_window)][task].read(key)
    }

    /// Ingest data-plane overflow for `key`, saturating at the CMS max.
    /// Matches `control_plane.py::co_monitoring`.
    pub fn co_monitor(
        &mut self,
        task: usize,
        key: &[u8],
        overflow: &[i64],
        op: Operation,
        window: usize,
    ) -> Vec<i64> {
        let target = &mut self.cms[window][task];
        let max = target.max();
        let current = target.read(key);
        let combined: Vec<i64> = current
            .iter()
            .zip(overflow)
            .map(|(&cur, &ov)| {
                let raw = match op {
                    Operation::Plus | Operation::Minus => cur + ov,
                    Operation::SetBitTrue => cur | ov,
                    Operation::SetBitFalse => ov,
                };
                raw.min(max)
            })
            .collect();
        target.assign_row_values(key, &combined);
        combined
    }

    /// Split out the low `s` bits for shipment to the data plane, retaining
    /// the high bits here. Matches `control_plane.py::send_to_dataplane`.
    pub fn send_to_dataplane(&mut self, window: usize, task: usize, s: u32) -> Vec<i64> {
        self.cms[window][task].split_low_bits(s)
    }

    /// Fold `s`-bit-narrowed data back in (the inverse of narrowing a
    /// data-plane counter): multiply by `2^|s|` and add the received bits,
    /// saturating. Matches `control_plane.py::receive_from_dataplane`.
    pub fn receive_from_dataplane(&mut self, window: usize, task: usize, s: i32, received: &[i64]) {
        self.cms[window][task].merge_low_bits(s, received);
    }

    /// Per promoted/evicted key, add its control-plane-scaled elephant
    /// contribution, saturating. Matches
    /// `control_plane.py::receive_from_dataplane_elephant`.
    pub fn receive_from_dataplane_elephant(
        &mut self,
        task: usize,
        received: &[(Box<[u8]>, Vec<i64>)],
        current_window: usize,
    ) {
        for (key, contribution) in received {
            self.co_monitor(task, key, contribution, Operation::Plus, current_window);
        }
    }
}
