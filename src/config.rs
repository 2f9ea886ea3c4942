/*!
Configuration for a [`crate::cerberus::Cerberus`] instance, loaded from JSON.

Grounded on `params.py::Params`, scoped to the fields the core dataplane
actually consumes: the traffic-generation and pcap-replay harness fields
(`pcap_file`, `benign_volume`, `atk_profile`, `seed`, ...) belong to the
experiment driver this crate does not reimplement, and are dropped — see
DESIGN.md.
*/

use serde::{Deserialize, Serialize};

use crate::cms::Operation;
use crate::defense::{self, DefenseDescriptor, SuggestedAction};
use crate::error::{CerberusError, Result};
use crate::flowkey::{ConditionRow, FlowKeyDescriptor};
use crate::packet::FieldKey;

/// Which flow-key/defense behavior a task uses: one of the 16 built-in
/// profiles (`defense.rs`), or an explicit descriptor supplied in config.
/// Untagged so existing configs that only ever set `defense_no` keep
/// deserializing unchanged; a config that instead sets `condition_key` (and
/// the other `Custom` fields) gets a profile with no built-in counterpart.
/// Mirrors `params.py::Params.task_match_action_table`, where each task entry
/// is either a bare `defense_no` or a full hand-written condition/action row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskProfile {
    Builtin {
        defense_no: u32,
    },
    Custom {
        condition_key: Vec<ConditionRow>,
        task_key: Vec<FieldKey>,
        /// Operation labels (`"plus"`, `"minus"`, `"setbitTrue"`,
        /// `"setbitFalse"`), parsed at resolution time via
        /// [`Operation::parse`] rather than deriving `Operation` itself, to
        /// keep the wire format the same string labels `cms.py` uses.
        action: Vec<String>,
        value: i64,
        is_bf: bool,
        defense_condition_key: Vec<ConditionRow>,
        defense_task_key: Vec<FieldKey>,
        defense_threshold: i64,
    },
}

impl TaskProfile {
    pub fn flowkey_descriptor(&self) -> Result<FlowKeyDescriptor> {
        match self {
            TaskProfile::Builtin { defense_no } => defense::flowkey_profile(*defense_no),
            TaskProfile::Custom {
                condition_key,
                task_key,
                action,
                value,
                is_bf,
                ..
            } => Ok(FlowKeyDescriptor {
                conditions: condition_key.clone(),
                task_key: task_key.clone(),
                operations: action.iter().map(|label| Operation::parse(label)).collect::<Result<Vec<_>>>()?,
                value: *value,
                is_bloom_filter: *is_bf,
            }),
        }
    }

    /// Custom profiles carry no suggested-action strings (spec.md §6 doesn't
    /// list them for the explicit-descriptor case); both sides default to
    /// `Pass`, consistent with `defense.rs`'s own note that these are
    /// descriptive metadata the reference never acts on.
    pub fn defense_descriptor(&self) -> Result<DefenseDescriptor> {
        match self {
            TaskProfile::Builtin { defense_no } => defense::defense_profile(*defense_no),
            TaskProfile::Custom {
                defense_condition_key,
                defense_task_key,
                defense_threshold,
                ..
            } => Ok(DefenseDescriptor {
                conditions: defense_condition_key.clone(),
                task_key: defense_task_key.clone(),
                threshold: *defense_threshold,
                if_over_threshold: SuggestedAction::Pass,
                if_under_threshold: SuggestedAction::Pass,
            }),
        }
    }
}

/// One task's placement: which register it lives in, its data-plane and
/// control-plane counter widths, and its flow-key/defense profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    pub register_index: usize,
    pub profile: TaskProfile,
    pub dp_counter_size: u32,
    pub cp_counter_size: u32,
    /// `log2` of the data-plane array width.
    pub array_size_exp: u32,
    /// `log2` of the elephant-region capacity, or `None` to disable it for
    /// this task.
    pub elephant_array_size_exp: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CerberusConfig {
    pub tasks: Vec<TaskConfig>,
    pub n_register: usize,
    pub blocklist_size_exp: u32,
    pub n_hash: usize,
    /// Width, in bits, of the CRC polynomial family used by [`crate::hash::Hasher`].
    /// Schema accepts `{8,16,24,32,64}` (`common.py::hash_crc`'s degree
    /// parameter); only 32 is actually implemented today, so anything else is
    /// rejected both here and in `Hasher::new`.
    pub crc_polynomial_degree: u32,
    /// Ticks between window rotations, per task.
    pub refresh_cycle: Vec<u64>,
    pub elephant_region: bool,
    pub elephant_cycle: u64,
    pub adaptive_memory: bool,
    pub adaptive_memory_cycle: u64,
    pub statistics_cycle_tick: u64,
    pub statistics_cycle_subtick: u64,
    pub tick_divisor: f64,
    pub cp_processing_threshold_bps: f64,
    pub data_to_control_channel_bandwidth_bps: f64,
    /// Elephant-region exact counters are stored at this width; must exceed
    /// every task's `dp_counter_size`.
    pub elephant_default_counter_size: u32,
    /// Experiments that shrink every volume/threshold by `2^shrink_ratio_exp`
    /// to run a scaled-down simulation still need thresholds compared
    /// against shrunk counters; this rescales `threshold` at comparison
    /// time rather than baking it into the defense tables.
    pub shrink_ratio_exp: u32,
}

impl CerberusConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: CerberusConfig = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.refresh_cycle.len() != self.tasks.len() {
            return Err(CerberusError::Config(format!(
                "refresh_cycle has {} entries but there are {} tasks",
                self.refresh_cycle.len(),
                self.tasks.len()
            )));
        }
        for task in &self.tasks {
            if task.register_index >= self.n_register {
                return Err(CerberusError::Config(format!(
                    "task references register {} but only {} registers exist",
                    task.register_index, self.n_register
                )));
            }
            if task.dp_counter_size >= self.elephant_default_counter_size {
                return Err(CerberusError::Config(format!(
                    "task dp_counter_size {} must be smaller than elephant_default_counter_size {}",
                    task.dp_counter_size, self.elephant_default_counter_size
                )));
            }
        }
        if self.n_hash == 0 {
            return Err(CerberusError::Config("n_hash must be at least 1".into()));
        }
        const VALID_CRC_DEGREES: [u32; 5] = [8, 16, 24, 32, 64];
        if !VALID_CRC_DEGREES.contains(&self.crc_polynomial_degree) {
            return Err(CerberusError::Config(format!(
                "crc_polynomial_degree must be one of {VALID_CRC_DEGREES:?}, got {}",
                self.crc_polynomial_degree
            )));
        }
        if self.crc_polynomial_degree != 32 {
            return Err(CerberusError::Config(format!(
                "crc_polynomial_degree {} is not implemented; only 32 is",
                self.crc_polynomial_degree
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_refresh_cycle_length_mismatch() {
        let config = CerberusConfig {
            tasks: vec![TaskConfig {
                register_index: 0,
                profile: TaskProfile::Builtin { defense_no: 1 },
                dp_counter_size: 8,
                cp_counter_size: 24,
                array_size_exp: 16,
                elephant_array_size_exp: None,
            }],
            n_register: 1,
            blocklist_size_exp: 16,
            n_hash: 4,
            crc_polynomial_degree: 32,
            refresh_cycle: vec![],
            elephant_region: false,
            elephant_cycle: 100,
            adaptive_memory: false,
            adaptive_memory_cycle: 100,
            statistics_cycle_tick: 1,
            statistics_cycle_subtick: 1,
            tick_divisor: 1000.0,
            cp_processing_threshold_bps: 1.0,
            data_to_control_channel_bandwidth_bps: 1.0,
            elephant_default_counter_size: 32,
            shrink_ratio_exp: 0,
        };
        assert!(config.validate().is_err());
    }

    fn base_config(profile: TaskProfile) -> CerberusConfig {
        CerberusConfig {
            tasks: vec![TaskConfig {
                register_index: 0,
                profile,
                dp_counter_size: 8,
                cp_counter_size: 24,
                array_size_exp: 16,
                elephant_array_size_exp: None,
            }],
            n_register: 1,
            blocklist_size_exp: 16,
            n_hash: 4,
            crc_polynomial_degree: 32,
            refresh_cycle: vec![100],
            elephant_region: false,
            elephant_cycle: 100,
            adaptive_memory: false,
            adaptive_memory_cycle: 100,
            statistics_cycle_tick: 1,
            statistics_cycle_subtick: 1,
            tick_divisor: 1000.0,
            cp_processing_threshold_bps: 1.0,
            data_to_control_channel_bandwidth_bps: 1.0,
            elephant_default_counter_size: 32,
            shrink_ratio_exp: 0,
        }
    }

    #[test]
    fn rejects_unsupported_crc_polynomial_degree() {
        let mut config = base_config(TaskProfile::Builtin { defense_no: 1 });
        config.crc_polynomial_degree = 16;
        assert!(config.validate().is_err());
    }

    #[test]
    fn custom_task_profile_resolves_to_explicit_descriptors() {
        use crate::flowkey::Matcher;

        let profile = TaskProfile::Custom {
            condition_key: vec![[None, None, None, None, Some(Matcher::ProtocolPrefix("UDP".to_string()))]],
            task_key: vec![FieldKey::SrcIp, FieldKey::DstIp],
            action: vec!["plus".to_string()],
            value: 1,
            is_bf: false,
            defense_condition_key: vec![[None, None, None, None, Some(Matcher::ProtocolPrefix("UDP".to_string()))]],
            defense_task_key: vec![FieldKey::DstIp],
            defense_threshold: 1000,
        };
        let flowkey = profile.flowkey_descriptor().unwrap();
        assert_eq!(flowkey.operations, vec![Operation::Plus]);
        assert!(!flowkey.is_bloom_filter);

        let defense = profile.defense_descriptor().unwrap();
        assert_eq!(defense.threshold, 1000);
        assert_eq!(defense.task_key, vec![FieldKey::DstIp]);

        let config = base_config(profile);
        assert!(config.validate().is_ok());
    }
}
