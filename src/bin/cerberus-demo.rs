/*!
Feeds a synthetic ICMP flood through a single-task [`Cerberus`] instance and
prints the resulting statistics. Run with `RUST_LOG=debug` to see the
per-packet detail the library logs at `log::debug!`/`log::trace!`.
*/

use cerberus_sim::config::{TaskConfig, TaskProfile};
use cerberus_sim::packet::Protocol;
use cerberus_sim::{Cerberus, CerberusConfig, Packet, Result};

fn demo_config() -> CerberusConfig {
    CerberusConfig {
        tasks: vec![TaskConfig {
            register_index: 0,
            profile: TaskProfile::Builtin { defense_no: 1 }, // icmp_flood
            dp_counter_size: 8,
            cp_counter_size: 24,
            array_size_exp: 10,
            elephant_array_size_exp: None,
        }],
        n_register: 1,
        blocklist_size_exp: 14,
        n_hash: 4,
        crc_polynomial_degree: 32,
        refresh_cycle: vec![10_000],
        elephant_region: false,
        elephant_cycle: 10_000,
        adaptive_memory: false,
        adaptive_memory_cycle: 10_000,
        statistics_cycle_tick: 10_000,
        statistics_cycle_subtick: 1_000,
        tick_divisor: 1000.0,
        cp_processing_threshold_bps: 1_000_000_000.0,
        data_to_control_channel_bandwidth_bps: 1_000_000_000.0,
        elephant_default_counter_size: 32,
        shrink_ratio_exp: 0,
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let config = demo_config();
    let mut cerberus = Cerberus::new(config)?;

    let attacker = [203, 0, 113, 7];
    let victim = [198, 51, 100, 9];
    for subtick in 0..1_000u64 {
        let p = Packet::new(attacker, 0, victim, 0, Protocol::IcmpRequest, 64, subtick, 1);
        let blocked = cerberus.update(&p);
        if blocked[0] || blocked[1] {
            log::info!("flow blocked after {} packets", subtick + 1);
            break;
        }
        cerberus.update_subtick(subtick);
    }
    cerberus.update_tick(0)?;

    let stats = cerberus.stats();
    println!("subtick bandwidth history: {:?}", stats.bandwidth_utilization_history);
    println!("task 0 counter-size history: {:?}", stats.counter_size_history.first());

    Ok(())
}
