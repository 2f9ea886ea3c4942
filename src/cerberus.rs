/*!
The orchestrator: wires together the data plane, control plane, and
blocklist, and implements the per-packet and per-tick algorithms that
decide what each task counts, when overflow escalates to the control
plane, and when a flow gets blocked.

Grounded on `cerberus.py::Cerberus`.
*/

use std::collections::HashMap;
use std::rc::Rc;

use crate::blocklist::Blocklist;
use crate::cms::Operation;
use crate::config::CerberusConfig;
use crate::control_plane::ControlPlane;
use crate::data_plane::{prev_window, DataPlane};
use crate::defense::DefenseDescriptor;
use crate::error::{invariant, CerberusError, Result};
use crate::flowkey::{calculate_flowkey, find_flowkey, find_flowkey_fields, FlowKeyDescriptor};
use crate::hash::Hasher;
use crate::packet::{FieldKey, Packet};
use crate::register::Register;
use crate::share::calculate_shares;
use crate::stats::Stats;

pub struct Cerberus {
    task_per_reg: Vec<Vec<usize>>,
    adaptive_task_per_reg: Vec<Vec<usize>>,
    n_task: usize,
    data_plane: DataPlane,
    control_plane: ControlPlane,
    blocklist: Blocklist,
    flowkey_table: Vec<FlowKeyDescriptor>,
    defense_table: Vec<DefenseDescriptor>,
    current_window: Vec<usize>,
    hps_i: Vec<HashMap<Box<[u8]>, f64>>,
    rtps: Vec<f64>,
    cb: Vec<f64>,
    cp_max: Vec<i64>,
    cp_max_bits: Vec<i64>,
    stats: Stats,
    config: CerberusConfig,
}

impl Cerberus {
    pub fn new(config: CerberusConfig) -> Result<Self> {
        config.validate()?;
        let n_task = config.tasks.len();
        let hasher = Rc::new(Hasher::new(config.n_hash, config.crc_polynomial_degree, None)?);

        let mut task_per_reg: Vec<Vec<usize>> = vec![Vec::new(); config.n_register];
        for (task_id, task) in config.tasks.iter().enumerate() {
            task_per_reg[task.register_index].push(task_id);
        }

        if config.adaptive_memory {
            for ids in &task_per_reg {
                if let Some(&first) = ids.first() {
                    let first_exp = config.tasks[first].array_size_exp;
                    invariant!(
                        !ids.iter().any(|&t| config.tasks[t].array_size_exp != first_exp),
                        "adaptive memory requires every task in a register to share one array size"
                    );
                }
            }
        }

        let mut registers_per_window: [Vec<Register>; 2] = [Vec::new(), Vec::new()];
        for registers in registers_per_window.iter_mut() {
            for ids in &task_per_reg {
                let counter_sizes: Vec<u32> = ids.iter().map(|&t| config.tasks[t].dp_counter_size).collect();
                let widths: Vec<usize> = ids.iter().map(|&t| 1usize << config.tasks[t].array_size_exp).collect();
                let elephant_capacities = if config.elephant_region {
                    let mut caps = Vec::with_capacity(ids.len());
                    for &t in ids {
                        let exp = config.tasks[t].elephant_array_size_exp.ok_or_else(|| {
                            CerberusError::Config(format!("task {t} has no elephant_array_size_exp but elephant_region is enabled"))
                        })?;
                        caps.push(1usize << exp);
                    }
                    Some(caps)
                } else {
                    None
                };
                registers.push(Register::new(
                    config.elephant_default_counter_size,
                    &counter_sizes,
                    &widths,
                    elephant_capacities.as_deref(),
                    hasher.clone(),
                )?);
            }
        }
        let data_plane = DataPlane::new(registers_per_window);

        let cp_counter_sizes: Vec<u32> = config.tasks.iter().map(|t| t.cp_counter_size).collect();
        let cp_widths: Vec<usize> = config.tasks.iter().map(|t| 1usize << t.array_size_exp).collect();
        let control_plane = ControlPlane::new(&cp_counter_sizes, &cp_widths, hasher.clone())?;

        let blocklist = Blocklist::new(1usize << config.blocklist_size_exp, hasher)?;

        let flowkey_table: Vec<FlowKeyDescriptor> = config
            .tasks
            .iter()
            .map(|t| t.profile.flowkey_descriptor())
            .collect::<Result<_>>()?;
        let defense_table: Vec<DefenseDescriptor> = config
            .tasks
            .iter()
            .map(|t| t.profile.defense_descriptor())
            .collect::<Result<_>>()?;

        let adaptive_task_per_reg: Vec<Vec<usize>> = task_per_reg
            .iter()
            .map(|ids| ids.iter().copied().filter(|&t| !flowkey_table[t].is_bloom_filter).collect())
            .collect();

        Ok(Self {
            task_per_reg,
            adaptive_task_per_reg,
            n_task,
            data_plane,
            control_plane,
            blocklist,
            flowkey_table,
            defense_table,
            current_window: vec![0; n_task],
            hps_i: vec![HashMap::new(); n_task],
            rtps: vec![0.0; n_task],
            cb: vec![0.0; n_task],
            cp_max: vec![0; n_task],
            cp_max_bits: vec![0; n_task],
            stats: Stats::new(n_task),
            config,
        })
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn n_task(&self) -> usize {
        self.n_task
    }

    fn find_task(&self, task_id: usize) -> (usize, usize) {
        let mut remaining = task_id;
        for (reg_index, ids) in self.task_per_reg.iter().enumerate() {
            if remaining < ids.len() {
                return (reg_index, remaining);
            }
            remaining -= ids.len();
        }
        log::error!("invariant violated: task_id {task_id} exceeds {} tasks", self.n_task);
        unreachable!("task_id {task_id} exceeds {} tasks", self.n_task)
    }

    fn flat_task_ids(&self) -> Vec<usize> {
        self.task_per_reg.iter().flatten().copied().collect()
    }

    fn shrink(&self, value: i64) -> f64 {
        value as f64 / 2f64.powi(self.config.shrink_ratio_exp as i32)
    }

    /// Feed one packet through every task's flow-key match and defense
    /// check, returning whether the flow is now blocked, per window.
    /// Matches `cerberus.py::update`.
    pub fn update(&mut self, p: &Packet) -> [bool; 2] {
        let c2_key = calculate_flowkey(&[FieldKey::SrcIp, FieldKey::DstIp], p);
        let mut blocked = [self.blocklist.test(&c2_key, 0), self.blocklist.test(&c2_key, 1)];

        let mut overflow = vec![false; self.n_task];
        let mut blocklist_update_request = vec![false; self.n_task];
        let cp_active = self.stats.bandwidth_utilization() <= self.config.cp_processing_threshold_bps / self.config.tick_divisor;

        for task_id in self.flat_task_ids() {
            let condition_key = find_flowkey(&self.flowkey_table[task_id], p);
            let defense_key = find_flowkey_fields(&self.defense_table[task_id].conditions, &self.defense_table[task_id].task_key, p);

            if let Some(flow_key) = &condition_key {
                let descriptor_value = self.flowkey_table[task_id].value;
                let amount = if descriptor_value == 0 { p.packet_size as i64 } else { descriptor_value };
                let threshold = self.defense_table[task_id].threshold;
                let keys_match = self.flowkey_table[task_id].task_key == self.defense_table[task_id].task_key;
                let operations = self.flowkey_table[task_id].operations.clone();
                for operation in operations {
                    let df_active = defense_key.is_some() && keys_match && !blocked[self.current_window[0]];
                    let (ovf, blr) =
                        self.update_task(task_id, operation, flow_key, amount, p.packet_size, cp_active, threshold, df_active);
                    overflow[task_id] = ovf;
                    blocklist_update_request[task_id] = blr;
                }
            } else if let Some(defense_flow_key) = &defense_key {
                let (reg_index, task_index) = self.find_task(task_id);
                let threshold = self.shrink(self.defense_table[task_id].threshold);
                if (self.data_plane.read_all(reg_index, task_index, defense_flow_key) as f64) < threshold {
                    blocklist_update_request[task_id] = !blocked[self.current_window[0]];
                }
            }

            if overflow[task_id] {
                self.stats.record_overflow(task_id);
            }
            if overflow[task_id] || blocklist_update_request[task_id] {
                self.stats.record_upload(task_id);
            }
            if condition_key.is_some() || defense_key.is_some() {
                self.stats.record_packet(task_id);
            }
        }

        if cp_active && blocklist_update_request.iter().any(|&x| x) {
            log::trace!("blocking flow after threshold crossing");
            self.blocklist.set(&c2_key, self.current_window[0]);
            blocked[self.current_window[0]] = true;
        }

        if overflow.iter().any(|&x| x) {
            self.stats.record_overflow(self.n_task);
        }
        if overflow.iter().any(|&x| x) || blocklist_update_request.iter().any(|&x| x) {
            self.stats.add_bandwidth(p.packet_size);
            self.stats.record_upload(self.n_task);
        }
        if !cp_active {
            log::debug!("control-plane channel saturated this subtick, packet not escalatable");
            self.stats.record_cp_not_processed();
        }
        self.stats.record_packet(self.n_task);

        blocked
    }

    /// Apply one CMS operation for `task`'s flow key, escalate overflow to
    /// the control plane if active, and report whether this packet
    /// overflowed and/or should trip the blocklist. Matches
    /// `cerberus.py::update_task`.
    #[allow(clippy::too_many_arguments)]
    fn update_task(
        &mut self,
        task: usize,
        operation: Operation,
        element: &[u8],
        value: i64,
        packet_size: u32,
        cp_active: bool,
        threshold: i64,
        df_active: bool,
    ) -> (bool, bool) {
        let mut blocklist_update_request = false;
        let (reg_index, task_index) = self.find_task(task);
        let window = self.current_window[task];
        let (overflow_value, data_plane_data) = self.data_plane.update_register(reg_index, task_index, operation, element, value, window);
        let diff_data_plane_data = self.data_plane.read(reg_index, task_index, element, window);
        let threshold_scaled = self.shrink(threshold);

        if df_active {
            let sum_min = min_or_zero(&data_plane_data) + min_or_zero(&diff_data_plane_data);
            if sum_min as f64 >= threshold_scaled {
                blocklist_update_request = true;
            }
        }

        if cp_active && overflow_value.iter().any(|&v| v != 0) {
            let control_plane_data = self.control_plane.co_monitor(task, element, &overflow_value, operation, window);
            let diff_control_plane_data = self.control_plane.read(task, element, window);

            let combined_minus: Vec<i64> = control_plane_data.iter().zip(&overflow_value).map(|(c, o)| c - o).collect();
            let cp_data = min_indices(&combined_minus)
                .into_iter()
                .map(|i| overflow_value[i])
                .min()
                .unwrap_or(0);
            let hps_ij = self.calc_hps_ij(task, cp_data, packet_size);
            *self.hps_i[task].entry(element.into()).or_insert(0.0) += hps_ij;
            self.rtps[task] += hps_ij;
            self.cb[task] += hps_ij * packet_size as f64;

            let cp_max_now = *control_plane_data.iter().max().unwrap_or(&0);
            let max_bit = if cp_max_now > 0 { intlog2(cp_max_now) + 1 } else { 0 };
            self.cp_max[task] = self.cp_max[task].max(cp_max_now);
            self.cp_max_bits[task] = self.cp_max_bits[task].max(max_bit);

            if df_active {
                let counter_size = self.data_plane.register(window, reg_index).cms(task_index).counter_size();
                let scale = 1i64 << (counter_size - 1);
                let sum_min = (min_or_zero(&control_plane_data) + min_or_zero(&diff_control_plane_data)) * scale;
                if sum_min as f64 >= threshold_scaled {
                    blocklist_update_request = true;
                }
            }
        }

        (overflow_value.iter().any(|&v| v != 0), blocklist_update_request)
    }

    fn calc_hps_ij(&self, task: usize, cp_data: i64, packet_size: u32) -> f64 {
        let control_plane_data = relu(cp_data) as f64;
        let value = self.flowkey_table[task].value;
        if value == 0 {
            control_plane_data / (self.config.refresh_cycle[task] as f64 * packet_size as f64)
        } else {
            control_plane_data / (self.config.refresh_cycle[task] as f64 * value as f64)
        }
    }

    /// Called once per subtick; rolls the subtick accumulators into history
    /// on the configured cadence. Matches `cerberus.py::update_subtick`.
    pub fn update_subtick(&mut self, subtick: u64) {
        if (subtick + 1) % self.config.statistics_cycle_subtick == 0 {
            self.stats.collect_subtick(
                self.config.statistics_cycle_subtick,
                self.config.tick_divisor,
                self.config.data_to_control_channel_bandwidth_bps,
                self.config.shrink_ratio_exp,
            );
        }
    }

    /// Called once per tick: elephant-region rotation, tick-level
    /// statistics, adaptive-memory resizing, and window refreshes, in that
    /// order. Matches `cerberus.py::update_tick`.
    pub fn update_tick(&mut self, tick: u64) -> Result<()> {
        if self.config.elephant_region && (tick + 1) % self.config.elephant_cycle == 0 {
            self.change_top_k();
        }

        if (tick + 1) % self.config.statistics_cycle_tick == 0 {
            let counter_size: Vec<u32> = (0..self.n_task)
                .map(|t| {
                    let (reg_index, task_index) = self.find_task(t);
                    self.data_plane.register(self.current_window[t], reg_index).cms(task_index).counter_size()
                })
                .collect();
            self.stats.collect_tick(&counter_size, &self.cp_max, &self.cp_max_bits);
        }

        if self.config.adaptive_memory && (tick + 1) % self.config.adaptive_memory_cycle == 0 {
            self.change_adaptive_memory()?;
        }

        for task_id in 0..self.n_task {
            if (tick + 1) % self.config.refresh_cycle[task_id] == 0 {
                self.change_current_window(task_id);
            }
        }
        Ok(())
    }

    /// `task`'s live data-plane counter width, in its current window. Lets
    /// callers observe adaptive-memory resizing directly rather than waiting
    /// on the next `statistics_cycle_tick` sample.
    pub fn counter_size(&self, task: usize) -> u32 {
        let (reg_index, task_index) = self.find_task(task);
        let window = self.current_window[task];
        self.data_plane.register(window, reg_index).cms(task_index).counter_size()
    }

    /// Read `task`'s best current estimate for `element`: the data-plane
    /// minimum plus the control-plane overflow scaled back up to full
    /// magnitude. Matches `cerberus.py::read`.
    pub fn read(&self, task: usize, element: &[u8]) -> i64 {
        let (reg_index, task_index) = self.find_task(task);
        let window = self.current_window[task];
        let data_plane_data = self.data_plane.read(reg_index, task_index, element, window);
        let control_plane_data = self.control_plane.read(task, element, window);
        let counter_size = self
            .data_plane
            .register(prev_window(window), reg_index)
            .cms(task_index)
            .counter_size();
        let scale = 1i64 << (counter_size - 1);
        data_plane_data
            .iter()
            .zip(&control_plane_data)
            .map(|(&d, &c)| d + c * scale)
            .min()
            .unwrap_or(0)
    }

    /// Reallocate each register's counter-size budget across its tasks by
    /// how much control-plane overflow each has recently needed. Matches
    /// `cerberus.py::change_adaptive_memory`.
    fn change_adaptive_memory(&mut self) -> Result<()> {
        for reg_index in 0..self.adaptive_task_per_reg.len() {
            let tasks = self.adaptive_task_per_reg[reg_index].clone();
            if tasks.len() <= 1 {
                continue;
            }
            let mut current_counter_sizes = Vec::with_capacity(tasks.len());
            let mut ideal_shares = Vec::with_capacity(tasks.len());
            let mut new_array_size_exps = Vec::with_capacity(tasks.len());
            for &task_id in &tasks {
                let (_, task_index) = self.find_task(task_id);
                let cms = self.data_plane.register(self.current_window[task_id], reg_index).cms(task_index);
                let cs = cms.counter_size();
                current_counter_sizes.push(cs as i64);
                ideal_shares.push((cs as f64 - 1.0) + bits_used(self.cp_max[task_id]));
                new_array_size_exps.push(intlog2(cms.width() as i64));
            }
            let register_size: i64 = current_counter_sizes.iter().sum();
            let base_shares = calculate_shares(register_size, &ideal_shares, true)?;
            let slicings: Vec<i64> = base_shares.iter().zip(&current_counter_sizes).map(|(b, c)| b - c).collect();
            self.resize(&tasks, &slicings, &new_array_size_exps)?;
            for (i, &task_id) in tasks.iter().enumerate() {
                self.cp_max[task_id] = (self.cp_max[task_id] as f64 * 2f64.powi(-(slicings[i] as i32))) as i64;
                self.cp_max_bits[task_id] = relu(self.cp_max_bits[task_id] - slicings[i]);
            }
        }
        Ok(())
    }

    /// Ship or absorb the bits each task's counters grow or shrink by,
    /// across both windows. Matches `cerberus.py::resize`.
    fn resize(&mut self, task_ids: &[usize], slicings: &[i64], array_size_exps: &[i64]) -> Result<()> {
        for window in 0..2 {
            for (i, &task_id) in task_ids.iter().enumerate() {
                let (reg_index, task_index) = self.find_task(task_id);
                let new_width = 1usize << array_size_exps[i];

                self.control_plane.cms_mut(window, task_id).resize_bucket(0, new_width, None)?;

                let sending_data = if slicings[i] > 0 {
                    Some(self.control_plane.send_to_dataplane(window, task_id, slicings[i] as u32))
                } else {
                    None
                };

                let received = self
                    .data_plane
                    .register_mut(window, reg_index)
                    .cms_mut(task_index)
                    .resize_bucket(slicings[i] as i32, new_width, sending_data.as_deref())?;

                if slicings[i] < 0 {
                    if let Some(received) = received {
                        self.control_plane.receive_from_dataplane(window, task_id, slicings[i] as i32, &received);
                    }
                }
            }
        }
        Ok(())
    }

    /// Rotate `task_id`'s window and clear the register + control plane +
    /// (if this is task 0) the blocklist for the window that is about to
    /// become current. Matches `cerberus.py::change_current_window`.
    fn change_current_window(&mut self, task_id: usize) {
        self.current_window[task_id] = prev_window(self.current_window[task_id]);
        self.clear_register(task_id);
        for map in &mut self.hps_i {
            map.clear();
        }
        self.rtps.iter_mut().for_each(|v| *v = 0.0);
        self.cb.iter_mut().for_each(|v| *v = 0.0);
    }

    /// Matches `cerberus.py::clear_register`.
    fn clear_register(&mut self, task_id: usize) {
        let window = self.current_window[task_id];
        self.control_plane.cms_mut(window, task_id).clear();
        self.cp_max[task_id] = 0;
        self.cp_max_bits[task_id] = 0;

        let (reg_index, _) = self.find_task(task_id);
        self.data_plane.register_mut(window, reg_index).clear();

        if task_id == 0 {
            self.blocklist.clear(window);
        }
    }

    /// Re-pick which flows occupy each task's elephant region, based on
    /// the per-flow hit rate accumulated since the last rotation. Matches
    /// `cerberus.py::change_top_k`.
    fn change_top_k(&mut self) {
        for task in 0..self.n_task {
            let (reg_index, task_index) = self.find_task(task);
            let window = self.current_window[task];
            let top_k_keys = self.top_k_keys_with_largest_values(task, reg_index, task_index);
            let existing = self.data_plane.register(window, reg_index).elephant_keys(task_index);
            let (inserted, evicted) = list_difference(&top_k_keys, &existing);
            let received = self.data_plane.change_top_k(reg_index, task_index, &inserted, &evicted, window);
            self.control_plane.receive_from_dataplane_elephant(task, &received, window);
        }
    }

    /// The `k` flow keys with the largest accumulated hit-rate since the
    /// last rotation, `k` being the task's elephant-region capacity.
    /// Matches `cerberus.py::top_k_keys_with_largest_values`.
    fn top_k_keys_with_largest_values(&self, task: usize, reg_index: usize, task_index: usize) -> Vec<Box<[u8]>> {
        let k = self.data_plane.register(self.current_window[task], reg_index).elephant_capacity(task_index);
        let mut items: Vec<(&Box<[u8]>, &f64)> = self.hps_i[task].iter().collect();
        items.sort_by(|a, b| b.1.partial_cmp(a.1).unwrap());
        items.into_iter().take(k).map(|(k, _)| k.clone()).collect()
    }
}

fn min_or_zero(values: &[i64]) -> i64 {
    values.iter().copied().min().unwrap_or(0)
}

fn relu(x: i64) -> i64 {
    x.max(0)
}

/// `floor(log2(n))` for `n > 0`.
fn intlog2(n: i64) -> i64 {
    debug_assert!(n > 0, "intlog2 requires a positive input");
    let mut n = n;
    let mut result = 0;
    while n > 1 {
        n /= 2;
        result += 1;
    }
    result
}

fn bits_used(n: i64) -> f64 {
    if n > 0 {
        (n as f64).log2() + 1.0
    } else {
        0.0
    }
}

fn min_indices(values: &[i64]) -> Vec<usize> {
    let min = values.iter().copied().min().unwrap_or(0);
    values.iter().enumerate().filter(|&(_, &x)| x == min).map(|(i, _)| i).collect()
}

/// `(only in list1, only in list2)`, order-insensitive. Matches
/// `common.py::list_difference`.
fn list_difference(list1: &[Box<[u8]>], list2: &[Box<[u8]>]) -> (Vec<Box<[u8]>>, Vec<Box<[u8]>>) {
    let only_in_1 = list1.iter().filter(|k| !list2.contains(k)).cloned().collect();
    let only_in_2 = list2.iter().filter(|k| !list1.contains(k)).cloned().collect();
    (only_in_1, only_in_2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{TaskConfig, TaskProfile};
    use crate::packet::Protocol;

    fn single_task_config(defense_no: u32) -> CerberusConfig {
        CerberusConfig {
            tasks: vec![TaskConfig {
                register_index: 0,
                profile: TaskProfile::Builtin { defense_no },
                dp_counter_size: 8,
                cp_counter_size: 24,
                array_size_exp: 8,
                elephant_array_size_exp: None,
            }],
            n_register: 1,
            blocklist_size_exp: 12,
            n_hash: 4,
            crc_polynomial_degree: 32,
            refresh_cycle: vec![1_000_000],
            elephant_region: false,
            elephant_cycle: 1_000_000,
            adaptive_memory: false,
            adaptive_memory_cycle: 1_000_000,
            statistics_cycle_tick: 1_000_000,
            statistics_cycle_subtick: 1_000_000,
            tick_divisor: 1000.0,
            cp_processing_threshold_bps: 1_000_000_000.0,
            data_to_control_channel_bandwidth_bps: 1_000_000_000.0,
            elephant_default_counter_size: 32,
            shrink_ratio_exp: 0,
        }
    }

    #[test]
    fn icmp_flood_trips_blocklist_at_threshold() {
        let mut cerb = Cerberus::new(single_task_config(1)).unwrap();
        let mut tripped_at = None;
        for i in 0..500 {
            let p = Packet::new([10, 0, 0, 1], 0, [10, 0, 0, 2], 0, Protocol::IcmpRequest, 64, i, 1);
            let blocked = cerb.update(&p);
            if blocked[0] && tripped_at.is_none() {
                tripped_at = Some(i + 1);
            }
        }
        assert_eq!(tripped_at, Some(401));
    }

    #[test]
    fn non_icmp_traffic_never_trips_the_icmp_profile() {
        let mut cerb = Cerberus::new(single_task_config(1)).unwrap();
        for i in 0..1000 {
            let p = Packet::new([10, 0, 0, 1], 53, [10, 0, 0, 2], 53, Protocol::Udp, 64, i, 0);
            let blocked = cerb.update(&p);
            assert!(!blocked[0]);
            assert!(!blocked[1]);
        }
    }

    #[test]
    fn read_after_plain_counting_reflects_packet_count() {
        let mut cerb = Cerberus::new(single_task_config(0)).unwrap();
        for i in 0..10 {
            let p = Packet::new([10, 0, 0, 1], 0, [10, 0, 0, 2], 0, Protocol::Tcp, 40, i, 0);
            cerb.update(&p);
        }
        let key = calculate_flowkey(&[FieldKey::SrcIp, FieldKey::DstIp], &Packet::new([10, 0, 0, 1], 0, [10, 0, 0, 2], 0, Protocol::Tcp, 40, 0, 0));
        assert_eq!(cerb.read(0, &key), 10);
    }
}
