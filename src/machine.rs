//! `Machine` ties every shared resource together and drives the boot/halt
//! lifecycle: memory controller, then devices, then cores, then CPUs on
//! boot; the reverse on halt, flushing pending storage I/O first.

use std::sync::Arc;

use log::info;

use crate::bus::MessageBus;
use crate::config::BootConfig;
use crate::coredump::MachineDump;
use crate::devices::{BlockIoVirtualInterrupt, FileBackedStorage};
use crate::interrupts::VirtualInterruptTable;
use crate::io::PortBus;
use crate::memory::MemoryController;
use crate::supervisor::{Cpu, CpuSupervisor};

/// The virtual-interrupt index the block-storage device is registered
/// under. Out-of-band from the opcode table since it is a convention this
/// crate's devices agree on, not part of the instruction set itself.
pub const BLOCKIO_INTERRUPT: u8 = 0x10;

pub struct Machine {
    memory: Arc<MemoryController>,
    port_bus: Arc<PortBus>,
    virtual_interrupts: Arc<VirtualInterruptTable>,
    bus: Arc<MessageBus>,
    block_io: Arc<BlockIoVirtualInterrupt>,
    supervisors: Vec<CpuSupervisor>,
}

impl Machine {
    /// Boot a machine from `config`: allocate the shared memory controller
    /// and port bus, open and register every configured storage device,
    /// then construct and boot one CPU (with its cores) per entry.
    pub fn boot(config: &BootConfig) -> std::io::Result<Self> {
        info!("booting machine: {} cpu(s)", config.cpus.len());

        let memory = Arc::new(MemoryController::new());
        let port_bus = Arc::new(PortBus::new());
        let bus = Arc::new(MessageBus::new());
        let virtual_interrupts = Arc::new(VirtualInterruptTable::new());
        let block_io = Arc::new(BlockIoVirtualInterrupt::new());

        for storage in &config.storage {
            let device = FileBackedStorage::open(&storage.path)?;
            block_io.register_device(storage.device_id, Box::new(device));
            info!("attached storage device {} at {}", storage.device_id, storage.path);
        }
        virtual_interrupts.register(BLOCKIO_INTERRUPT, Box::new(ClonedBlockIo(block_io.clone())));

        let mut supervisors = Vec::with_capacity(config.cpus.len());
        for (cpu_id, cpu_cfg) in config.cpus.iter().enumerate() {
            let mut cpu = Cpu::new(
                cpu_id as u16,
                cpu_cfg.cores.len() as u16,
                memory.clone(),
                port_bus.clone(),
                virtual_interrupts.clone(),
                bus.clone(),
                config.interrupt_table_base,
                config.irq_table_base,
            );
            let states: Vec<_> = cpu_cfg.cores.iter().map(|s| (*s).into()).collect();
            cpu.boot(&states);
            supervisors.push(CpuSupervisor::new(cpu));
        }

        Ok(Machine { memory, port_bus, virtual_interrupts, bus, block_io, supervisors })
    }

    /// Run every CPU's cores to completion and return their final dumps.
    /// Flushes storage devices before returning.
    pub fn run(self) -> MachineDump {
        let mut cores = Vec::new();
        for supervisor in self.supervisors {
            cores.extend(supervisor.run());
        }
        self.block_io.flush_all();
        info!("machine halted");

        let pages = self.memory.dump_pages();
        MachineDump { cores, pages }
    }
}

/// Adapter so the shared `Arc<BlockIoVirtualInterrupt>` can be registered
/// as a boxed `VirtualInterruptHandler` without cloning the device map.
struct ClonedBlockIo(Arc<BlockIoVirtualInterrupt>);

impl crate::interrupts::VirtualInterruptHandler for ClonedBlockIo {
    fn run(&self, core: &mut crate::core::ExecutionCore) -> crate::error::Result<()> {
        self.0.run(core)
    }
}
