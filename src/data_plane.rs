/*!
The data plane: two parallel arrays of [`Register`]s, one per window. Writes
always land in the current window; reads consult the previous one, so a
rotation never has to migrate live counters — it just swaps which buffer is
"current" and clears the one that becomes current next.

Grounded on `data_plane.py::DataPlane`.
*/

use crate::cms::Operation;
use crate::register::Register;

pub struct DataPlane {
    /// `registers[window][reg_index]`.
    registers: [Vec<Register>; 2],
}

impl DataPlane {
    pub fn new(registers_per_window: [Vec<Register>; 2]) -> Self {
        Self {
            registers: registers_per_window,
        }
    }

    pub fn register(&self, window: usize, reg_index: usize) -> &Register {
        &self.registers[window][reg_index]
    }

    pub fn register_mut(&mut self, window: usize, reg_index: usize) -> &mut Register {
        &mut self.registers[window][reg_index]
    }

    /// Apply an update to `register[current_window][reg_index]`.
    pub fn update_register(
        &mut self,
        reg_index: usize,
        task_index: usize,
        op: Operation,
        key: &[u8],
        value: i64,
        current_window: usize,
    ) -> (Vec<i64>, Vec<i64>) {
        self.registers[current_window][reg_index].update_cms(task_index, op, key, value)
    }

    /// Read from the *previous* window, i.e. the window not currently being
    /// written.
    pub fn read(&self, reg_index: usize, task_index: usize, key: &[u8], current_window: usize) -> Vec<i64> {
        self.registers[prev_window(current_window)][reg_index].read(task_index, key)
    }

    /// Sum of row-minima across both windows — the combined two-window
    /// estimate used for defense threshold checks.
    pub fn read_all(&self, reg_index: usize, task_index: usize, key: &[u8]) -> i64 {
        (0..2)
            .map(|w| {
                self.registers[w][reg_index]
                    .read(task_index, key)
                    .into_iter()
                    .min()
                    .unwrap_or(0)
            })
            .sum()
    }

    pub fn change_top_k(
        &mut self,
        reg_index: usize,
        task_index: usize,
        inserted: &[Box<[u8]>],
        evicted: &[Box<[u8]>],
        current_window: usize,
    ) -> Vec<(Box<[u8]>, Vec<i64>)> {
        self.registers[current_window][reg_index].change_top_k(task_index, inserted, evicted)
    }
}

pub fn prev_window(current_window: usize) -> usize {
    (current_window + 1) % 2
}
