//! Boot configuration: the serialized description a machine is brought up
//! from, consumed by `CpuSupervisor::boot`/`Machine::boot`.

use serde::{Deserialize, Serialize};

use crate::core::BootState;

/// The initial architectural state one core boots into, in serializable
/// form (mirrors `core::BootState`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CoreBootState {
    pub cs: u8,
    pub ds: u8,
    pub sp: u16,
    pub ip: u16,
    #[serde(default)]
    pub privileged: bool,
}

impl From<CoreBootState> for BootState {
    fn from(s: CoreBootState) -> Self {
        BootState { cs: s.cs, ds: s.ds, sp: s.sp, ip: s.ip, privileged: s.privileged }
    }
}

/// One CPU's worth of cores, each with its own boot state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpuBootConfig {
    pub cores: Vec<CoreBootState>,
}

/// A storage device to attach before boot: `path` is opened read/write and
/// registered under `device_id` in the block-I/O virtual interrupt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageBootConfig {
    pub device_id: u16,
    pub path: String,
}

/// Full machine boot configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootConfig {
    pub cpus: Vec<CpuBootConfig>,
    #[serde(default)]
    pub storage: Vec<StorageBootConfig>,
    #[serde(default = "default_interrupt_table_base")]
    pub interrupt_table_base: u32,
    #[serde(default = "default_irq_table_base")]
    pub irq_table_base: u32,
}

fn default_interrupt_table_base() -> u32 {
    0
}

fn default_irq_table_base() -> u32 {
    0x400
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let cfg = BootConfig {
            cpus: vec![CpuBootConfig {
                cores: vec![CoreBootState { cs: 0, ds: 1, sp: 0x1000, ip: 0, privileged: true }],
            }],
            storage: vec![StorageBootConfig { device_id: 0, path: "disk.img".into() }],
            interrupt_table_base: 0,
            irq_table_base: 0x400,
        };
        let json = serde_json::to_string(&cfg).unwrap();
        let back: BootConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.cpus[0].cores[0].sp, 0x1000);
        assert_eq!(back.storage[0].device_id, 0);
    }
}
