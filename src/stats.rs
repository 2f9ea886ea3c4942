/*!
Statistics collected per subtick and per tick: bandwidth spent recirculating
overflow to the control plane, the fraction of packets each task uploaded
or dropped on the floor, and the history of each task's counter width and
observed control-plane maxima.

Grounded on `cerberus.py::collect_statistics_subtick`/`collect_statistics_tick`.
*/

#[derive(Debug, Clone, Default)]
pub struct Stats {
    n_task: usize,

    bandwidth_utilization: f64,
    overflowed_packet: Vec<u64>,
    uploaded_packet: Vec<u64>,
    num_packet: Vec<u64>,
    cp_not_processed_packet: u64,

    pub bandwidth_utilization_history: Vec<f64>,
    pub overflowed_packet_ratio_history: Vec<Vec<f64>>,
    pub uploaded_packet_history: Vec<Vec<f64>>,
    pub uploaded_packet_ratio_history: Vec<Vec<f64>>,
    pub cp_not_processed_packet_history: Vec<f64>,
    pub counter_size_history: Vec<Vec<u32>>,
    pub cp_max_history: Vec<Vec<i64>>,
    pub cp_max_bits_history: Vec<Vec<i64>>,
}

impl Stats {
    pub fn new(n_task: usize) -> Self {
        Self {
            n_task,
            overflowed_packet: vec![0; n_task + 1],
            uploaded_packet: vec![0; n_task + 1],
            num_packet: vec![0; n_task + 1],
            overflowed_packet_ratio_history: vec![Vec::new(); n_task + 1],
            uploaded_packet_history: vec![Vec::new(); n_task + 1],
            uploaded_packet_ratio_history: vec![Vec::new(); n_task + 1],
            counter_size_history: vec![Vec::new(); n_task],
            cp_max_history: vec![Vec::new(); n_task],
            cp_max_bits_history: vec![Vec::new(); n_task],
            ..Default::default()
        }
    }

    pub fn bandwidth_utilization(&self) -> f64 {
        self.bandwidth_utilization
    }

    pub fn add_bandwidth(&mut self, bytes: u32) {
        self.bandwidth_utilization += bytes as f64;
    }

    pub fn record_overflow(&mut self, task: usize) {
        self.overflowed_packet[task] += 1;
    }

    pub fn record_upload(&mut self, task: usize) {
        self.uploaded_packet[task] += 1;
    }

    pub fn record_packet(&mut self, task: usize) {
        self.num_packet[task] += 1;
    }

    pub fn record_cp_not_processed(&mut self) {
        self.cp_not_processed_packet += 1;
    }

    pub fn total_task_index(&self) -> usize {
        self.n_task
    }

    /// Fold the accumulators of the subtick just finished into history and
    /// reset them for the next one. Matches
    /// `cerberus.py::collect_statistics_subtick`.
    pub fn collect_subtick(
        &mut self,
        statistics_cycle_subtick: u64,
        tick_divisor: f64,
        data_to_control_channel_bandwidth_bps: f64,
        shrink_ratio_exp: u32,
    ) {
        self.bandwidth_utilization_history.push(
            self.bandwidth_utilization / (statistics_cycle_subtick as f64 / tick_divisor)
                / data_to_control_channel_bandwidth_bps
                * 100.0,
        );
        // Scaled-down experiments (`shrink_ratio_exp > 0`) shrink every volume
        // by `2^shrink_ratio_exp`; this restores the upload history to what it
        // would read at full scale. Matches `cerberus.py:238`.
        let shrink_factor = 2f64.powi(shrink_ratio_exp as i32);
        for task in 0..=self.n_task {
            self.uploaded_packet_history[task].push(self.uploaded_packet[task] as f64 / 1_000_000.0 * 10.0 * shrink_factor);
            if self.num_packet[task] != 0 {
                self.overflowed_packet_ratio_history[task]
                    .push(self.overflowed_packet[task] as f64 / self.num_packet[task] as f64 * 100.0);
                self.uploaded_packet_ratio_history[task]
                    .push(self.uploaded_packet[task] as f64 / self.num_packet[task] as f64 * 100.0);
            } else {
                self.overflowed_packet_ratio_history[task].push(0.0);
                self.uploaded_packet_ratio_history[task].push(0.0);
            }
        }
        if self.num_packet[self.n_task] != 0 {
            self.cp_not_processed_packet_history
                .push(self.cp_not_processed_packet as f64 / self.num_packet[self.n_task] as f64 * 100.0);
        } else {
            self.cp_not_processed_packet_history.push(0.0);
        }
        self.cp_not_processed_packet = 0;
        self.bandwidth_utilization = 0.0;
        self.overflowed_packet.iter_mut().for_each(|v| *v = 0);
        self.uploaded_packet.iter_mut().for_each(|v| *v = 0);
        self.num_packet.iter_mut().for_each(|v| *v = 0);
    }

    /// Append one sample per task of counter width, observed control-plane
    /// max, and bits that max currently needs. Matches
    /// `cerberus.py::collect_statistics_tick`.
    pub fn collect_tick(&mut self, counter_size: &[u32], cp_max: &[i64], cp_max_bits: &[i64]) {
        for task in 0..self.n_task {
            self.counter_size_history[task].push(counter_size[task]);
            self.cp_max_history[task].push(cp_max[task]);
            self.cp_max_bits_history[task].push(cp_max_bits[task]);
        }
    }
}
