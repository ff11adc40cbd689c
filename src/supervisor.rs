//! The CPU supervisor: owns every core belonging to one CPU, spawns one OS
//! thread per core, and blocks until they have all stopped running.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::info;

use crate::bus::MessageBus;
use crate::core::{BootState, CoreId, ExecutionCore};
use crate::coredump::CoreDump;
use crate::interrupts::VirtualInterruptTable;
use crate::io::PortBus;
use crate::memory::MemoryController;

/// One CPU: a fixed set of cores that boot and halt together.
pub struct Cpu {
    pub cpu_id: u16,
    cores: Vec<ExecutionCore>,
}

impl Cpu {
    pub fn new(
        cpu_id: u16,
        core_count: u16,
        memory: Arc<MemoryController>,
        port_bus: Arc<PortBus>,
        virtual_interrupts: Arc<VirtualInterruptTable>,
        bus: Arc<MessageBus>,
        interrupt_table_base: u32,
        irq_table_base: u32,
    ) -> Self {
        let cores = (0..core_count)
            .map(|core_id| {
                ExecutionCore::new(
                    CoreId { cpu_id, core_id },
                    memory.clone(),
                    port_bus.clone(),
                    virtual_interrupts.clone(),
                    bus.clone(),
                    interrupt_table_base,
                    irq_table_base,
                )
            })
            .collect();
        Cpu { cpu_id, cores }
    }

    /// Boot each core with its corresponding entry in `states`. Extra
    /// states beyond the core count are ignored; missing ones leave that
    /// core un-booted (it will not run until `boot` is called again).
    pub fn boot(&mut self, states: &[BootState]) {
        for (core, state) in self.cores.iter_mut().zip(states.iter()) {
            core.boot(*state);
        }
    }
}

/// Supervises one CPU's cores: spawns a worker thread per core and a
/// joining supervisor thread that waits for every core to stop running.
pub struct CpuSupervisor {
    cpu: Option<Cpu>,
}

impl CpuSupervisor {
    pub fn new(cpu: Cpu) -> Self {
        CpuSupervisor { cpu: Some(cpu) }
    }

    pub fn boot(&mut self, states: &[BootState]) {
        if let Some(cpu) = self.cpu.as_mut() {
            cpu.boot(states);
        }
    }

    /// Run every core to completion, each on its own thread, and return
    /// their final dumps once all have stopped.
    pub fn run(mut self) -> Vec<CoreDump> {
        let cpu = self.cpu.take().expect("CpuSupervisor::run called twice");
        let cpu_id = cpu.cpu_id;
        let handles: Vec<JoinHandle<CoreDump>> = cpu
            .cores
            .into_iter()
            .map(|mut core| {
                thread::spawn(move || {
                    core.run();
                    CoreDump::capture(&core)
                })
            })
            .collect();

        let mut dumps = Vec::with_capacity(handles.len());
        for handle in handles {
            dumps.push(handle.join().expect("core worker thread panicked"));
        }
        info!("CPU {cpu_id}: all cores stopped");
        dumps
    }
}
