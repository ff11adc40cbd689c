//! Snapshot formats consumed by test harnesses: a per-core register/flag
//! dump and a whole-machine dump that adds memory pages.

use serde::{Deserialize, Serialize};

use crate::core::ExecutionCore;
use crate::memory::page::PAGE_SIZE;
use crate::registers::REGISTER_COUNT;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreDump {
    pub cpu_id: u16,
    pub core_id: u16,
    pub registers: [u16; REGISTER_COUNT],
    pub flags: u16,
    pub exit_code: i32,
    pub idle: bool,
    pub keep_running: bool,
}

impl CoreDump {
    pub fn capture(core: &ExecutionCore) -> Self {
        let mut registers = [0u16; REGISTER_COUNT];
        for (i, slot) in registers.iter_mut().enumerate() {
            *slot = core.regs().get(i);
        }
        CoreDump {
            cpu_id: core.id.cpu_id,
            core_id: core.id.core_id,
            registers,
            flags: core.regs().flags(),
            exit_code: core.exit_code(),
            idle: core.is_idle(),
            keep_running: core.is_running(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageDump {
    pub index: u32,
    #[serde(with = "serde_bytes_page")]
    pub bytes: Vec<u8>,
}

mod serde_bytes_page {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Vec<u8>, D::Error> {
        <Vec<u8>>::deserialize(d)
    }
}

impl PageDump {
    pub fn capture(index: u32, bytes: &[u8; PAGE_SIZE]) -> Self {
        PageDump { index, bytes: bytes.to_vec() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineDump {
    pub cores: Vec<CoreDump>,
    pub pages: Vec<PageDump>,
}
