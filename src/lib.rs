/*!
An in-network DDoS detection and mitigation dataplane simulator.

A small data-plane budget of narrow Count-Min Sketch counters tracks every
flow approximately; when a counter saturates, the overflow escalates to a
wider control-plane sketch that can afford exact-ish bookkeeping for the
much smaller set of flows that actually misbehave. A handful of built-in
attack profiles (ICMP floods, amplification attacks, SYN floods, ...) each
own one task: a flow-key extractor deciding which bytes identify a flow,
and a defense check deciding when that flow's rate trips a block.

Module map:
- [`hash`] — the keyed CRC-32 family shared by every sketch.
- [`cms`] — the Count-Min Sketch: saturating updates, column and
  counter-width resizing.
- [`register`] — one task's CMS plus its optional elephant (exact-counter)
  region.
- [`data_plane`] / [`control_plane`] — the two-window double buffer and the
  wider overflow sketch it escalates to.
- [`blocklist`] — the per-window Bloom filter blocked flows are tested
  against.
- [`share`] — largest-remainder bit allocation for adaptive memory.
- [`packet`] / [`flowkey`] / [`defense`] — packet fields, flow-key
  extraction, and the 16 built-in attack profiles.
- [`config`] — JSON-loadable configuration.
- [`stats`] — per-subtick/per-tick statistics collection.
- [`cerberus`] — the orchestrator tying all of the above together.
*/

pub mod blocklist;
pub mod cerberus;
pub mod cms;
pub mod config;
pub mod control_plane;
pub mod data_plane;
pub mod defense;
pub mod error;
pub mod flowkey;
pub mod hash;
pub mod packet;
pub mod register;
pub mod share;
pub mod stats;

pub use cerberus::Cerberus;
pub use config::{CerberusConfig, TaskConfig};
pub use error::{CerberusError, Result};
pub use packet::{FieldKey, Packet, Protocol};
