// Licensed under the Apache-2.0 license

//! Host-side stand-ins for the hardware collaborators.

use crate::common::Logger;
use crate::dma::{DmaInitParam, DmaPlatform, DmaXfer};
use crate::error::Error;
use crate::i3c::ccc::{self, Ccc};
use crate::i3c::common::{CccInfo, CccTransfer, I3cTarget, I3C_BCAST_ADDR};
use crate::i3c::stm32_hal::{
    HalError, HalState, HalTargetEntry, HalTiming, HalXfer, Stm32I3cHal, XferKind,
    STM32_I3C_DEVR_COUNT,
};
use crate::i3c::traits::{DaaContext, I3cPlatform};
use crate::irq::{IrqController, IrqSource};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::Arguments;
use std::sync::{Arc, Mutex, MutexGuard};

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct RecordingLogger {
    pub lines: Arc<Mutex<Vec<String>>>,
}

impl RecordingLogger {
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.lock().unwrap().iter().any(|l| l.contains(needle))
    }
}

impl Logger for RecordingLogger {
    fn debug(&self, args: Arguments<'_>) {
        self.lines.lock().unwrap().push(args.to_string());
    }

    fn error(&self, args: Arguments<'_>) {
        self.lines.lock().unwrap().push(args.to_string());
    }
}

// ---------------------------------------------------------------------------
// Interrupt controller
// ---------------------------------------------------------------------------

#[derive(Default, Debug)]
pub struct MockIrqState {
    pub registered: Vec<(u32, IrqSource)>,
    pub enabled: HashSet<u32>,
    pub priorities: HashMap<u32, u32>,
    pub fail_priority: bool,
    pub unregistered: usize,
}

#[derive(Default)]
pub struct MockIrq {
    state: Mutex<MockIrqState>,
}

impl MockIrq {
    pub fn state(&self) -> MutexGuard<'_, MockIrqState> {
        self.state.lock().unwrap()
    }
}

impl IrqController for MockIrq {
    fn register_callback(&self, irq: u32, source: IrqSource) -> Result<(), Error> {
        self.state().registered.push((irq, source));
        Ok(())
    }

    fn unregister_callback(&self, irq: u32, source: IrqSource) -> Result<(), Error> {
        let mut st = self.state();
        let pos = st
            .registered
            .iter()
            .position(|r| *r == (irq, source))
            .ok_or(Error::InvalidArgument)?;
        st.registered.remove(pos);
        st.unregistered += 1;
        Ok(())
    }

    fn enable(&self, irq: u32) -> Result<(), Error> {
        self.state().enabled.insert(irq);
        Ok(())
    }

    fn disable(&self, irq: u32) -> Result<(), Error> {
        self.state().enabled.remove(&irq);
        Ok(())
    }

    fn set_priority(&self, irq: u32, priority: u32) -> Result<(), Error> {
        let mut st = self.state();
        if st.fail_priority {
            return Err(Error::InvalidArgument);
        }
        st.priorities.insert(irq, priority);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// DMA platform
// ---------------------------------------------------------------------------

#[derive(Default, Debug)]
pub struct MockDmaState {
    pub inits: usize,
    pub removes: usize,
    pub programmed: Vec<(usize, DmaXfer)>,
    pub started: Vec<usize>,
    pub aborted: Vec<usize>,
    pub released: Vec<usize>,
    /// Channels the hardware reports as still moving data.
    pub busy: HashSet<usize>,
    /// Hand out a channel the controller marked ineligible.
    pub pick_ineligible: bool,
    /// Fail `config_xfer` with `Error::Io` once this many descriptors were programmed.
    pub fail_config_at: Option<usize>,
}

#[derive(Default)]
pub struct MockDma {
    state: Mutex<MockDmaState>,
}

impl MockDma {
    pub fn state(&self) -> MutexGuard<'_, MockDmaState> {
        self.state.lock().unwrap()
    }
}

impl DmaPlatform for MockDma {
    fn init(&self, _param: &DmaInitParam<'_>) -> Result<(), Error> {
        self.state().inits += 1;
        Ok(())
    }

    fn remove(&self) -> Result<(), Error> {
        self.state().removes += 1;
        Ok(())
    }

    fn acquire_channel(&self, eligible: &[bool]) -> Result<usize, Error> {
        let want = !self.state().pick_ineligible;
        eligible
            .iter()
            .position(|e| *e == want)
            .ok_or(Error::OutOfMemory)
    }

    fn release_channel(&self, ch: usize) -> Result<(), Error> {
        self.state().released.push(ch);
        Ok(())
    }

    fn config_xfer(&self, ch: usize, xfer: &DmaXfer) -> Result<(), Error> {
        let mut st = self.state();
        if st.fail_config_at == Some(st.programmed.len()) {
            return Err(Error::Io);
        }
        st.programmed.push((ch, *xfer));
        Ok(())
    }

    fn xfer_start(&self, ch: usize) -> Result<(), Error> {
        self.state().started.push(ch);
        Ok(())
    }

    fn xfer_abort(&self, ch: usize) -> Result<(), Error> {
        self.state().aborted.push(ch);
        Ok(())
    }

    fn ch_in_progress(&self, ch: usize) -> Result<bool, Error> {
        Ok(self.state().busy.contains(&ch))
    }
}

/// Platform with only the mandatory operations.
#[derive(Default)]
pub struct BareDma;

impl DmaPlatform for BareDma {
    fn init(&self, _param: &DmaInitParam<'_>) -> Result<(), Error> {
        Ok(())
    }

    fn remove(&self) -> Result<(), Error> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Generic I3C platform
// ---------------------------------------------------------------------------

#[derive(Default, Debug)]
pub struct MockI3cLog {
    pub ccc: Vec<(u8, Ccc, Vec<u8>)>,
    pub daa: Vec<bool>,
    pub assigned: Vec<(u64, u8)>,
    pub writes: Vec<(u8, Vec<u8>)>,
    pub reads: Vec<u8>,
    pub init_devices: Vec<(usize, u8)>,
    pub removed_devices: Vec<usize>,
    pub removed_bus: usize,
    pub irq_conf: Vec<(u32, bool)>,
    pub ccc_info: Option<CccInfo>,
    /// Returned by private reads and read CCCs.
    pub read_data: Vec<u8>,
}

#[derive(Clone, Default)]
pub struct MockI3cConfig {
    pub log: Arc<Mutex<MockI3cLog>>,
    /// Targets answering `ENTDAA`: pid, BCR, DCR.
    pub responders: Vec<(u64, u8, u8)>,
    pub fail_init: bool,
    pub fail_ccc: bool,
    /// Addresses that do not acknowledge the readiness probe.
    pub not_ready: Vec<u8>,
}

impl MockI3cConfig {
    pub fn log(&self) -> MutexGuard<'_, MockI3cLog> {
        self.log.lock().unwrap()
    }
}

pub struct MockI3c {
    cfg: MockI3cConfig,
}

impl MockI3c {
    fn log(&self) -> MutexGuard<'_, MockI3cLog> {
        self.cfg.log()
    }

    fn fill(&self, data: &mut [u8]) {
        let log = self.log();
        for (dst, src) in data.iter_mut().zip(log.read_data.iter()) {
            *dst = *src;
        }
    }
}

impl I3cPlatform for MockI3c {
    type Config = MockI3cConfig;

    fn init_bus(config: &Self::Config, _device_id: u8) -> Result<Self, Error> {
        if config.fail_init {
            return Err(Error::Io);
        }
        Ok(Self {
            cfg: config.clone(),
        })
    }

    fn remove_bus(&mut self) -> Result<(), Error> {
        self.log().removed_bus += 1;
        Ok(())
    }

    fn init_device(&mut self, slot: usize, target: &I3cTarget) -> Result<(), Error> {
        self.log().init_devices.push((slot, target.addr));
        Ok(())
    }

    fn remove_device(&mut self, slot: usize, _target: &I3cTarget) -> Result<(), Error> {
        self.log().removed_devices.push(slot);
        Ok(())
    }

    fn is_dev_ready(&mut self, _slot: usize, target: &I3cTarget) -> Result<(), Error> {
        if self.cfg.not_ready.contains(&target.addr) {
            Err(Error::Io)
        } else {
            Ok(())
        }
    }

    fn do_daa(&mut self, daa: &mut DaaContext<'_>, rstdaa: bool) -> Result<(), Error> {
        self.log().daa.push(rstdaa);
        for (pid, bcr, dcr) in self.cfg.responders.clone() {
            let addr = daa.assign(pid, bcr, dcr)?;
            self.log().assigned.push((pid, addr));
        }
        Ok(())
    }

    fn send_ccc(&mut self, ccc: &mut CccTransfer<'_>) -> Result<(), Error> {
        if self.cfg.fail_ccc {
            return Err(Error::Io);
        }
        if ccc.ccc.is_read() {
            self.fill(ccc.data);
        }
        self.log().ccc.push((ccc.addr, ccc.ccc, ccc.data.to_vec()));
        Ok(())
    }

    fn write(&mut self, target: &I3cTarget, data: &[u8]) -> Result<(), Error> {
        self.log().writes.push((target.addr, data.to_vec()));
        Ok(())
    }

    fn read(&mut self, target: &I3cTarget, data: &mut [u8]) -> Result<(), Error> {
        self.fill(data);
        self.log().reads.push(target.addr);
        Ok(())
    }

    fn write_and_read(&mut self, target: &I3cTarget, tx: &[u8], rx: &mut [u8]) -> Result<(), Error> {
        self.write(target, tx)?;
        self.read(target, rx)
    }

    fn conf_irq(&mut self, events: u32, enable: bool) -> Result<(), Error> {
        self.log().irq_conf.push((events, enable));
        Ok(())
    }

    fn get_ccc_info(&mut self, _events: u32) -> Result<CccInfo, Error> {
        self.log().ccc_info.ok_or(Error::Fault)
    }
}

/// Platform with only the mandatory operations.
pub struct BareI3c;

impl I3cPlatform for BareI3c {
    type Config = ();

    fn init_bus(_config: &Self::Config, _device_id: u8) -> Result<Self, Error> {
        Ok(Self)
    }

    fn remove_bus(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn init_device(&mut self, _slot: usize, _target: &I3cTarget) -> Result<(), Error> {
        Ok(())
    }

    fn remove_device(&mut self, _slot: usize, _target: &I3cTarget) -> Result<(), Error> {
        Ok(())
    }

    fn is_dev_ready(&mut self, _slot: usize, _target: &I3cTarget) -> Result<(), Error> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// STM32 HAL simulation
// ---------------------------------------------------------------------------

pub const SIM_TX_FIFO: usize = 0x4000_6010;
pub const SIM_RX_FIFO: usize = 0x4000_6014;

#[derive(Clone, Debug, Default)]
pub struct SimTarget {
    pub pid: u64,
    pub bcr: u8,
    pub dcr: u8,
    pub is_i3c: bool,
    pub static_addr: Option<u8>,
    pub dyn_addr: Option<u8>,
    /// Last private write; returned by private reads.
    pub mem: Vec<u8>,
}

impl SimTarget {
    pub fn i3c(pid: u64, bcr: u8, dcr: u8) -> Self {
        Self {
            pid,
            bcr,
            dcr,
            is_i3c: true,
            ..Self::default()
        }
    }

    pub fn i2c(addr: u8) -> Self {
        Self {
            static_addr: Some(addr),
            ..Self::default()
        }
    }

    fn answers(&self, addr: u8) -> bool {
        if self.is_i3c {
            self.dyn_addr == Some(addr)
        } else {
            self.static_addr == Some(addr)
        }
    }
}

#[derive(Debug)]
pub struct HalSim {
    pub state: HalState,
    pub error: HalError,
    pub timing: Option<HalTiming>,
    pub targets: Vec<SimTarget>,
    pub daa_queue: VecDeque<usize>,
    /// Every started transfer: address, kind, transmitted bytes, DMA-driven.
    pub xfers: Vec<(u8, XferKind, Vec<u8>, bool)>,
    pub devr: [Option<HalTargetEntry>; STM32_I3C_DEVR_COUNT],
    pub notifications: u32,
    pub ccc_info: Option<CccInfo>,
    pub aborts: usize,
    /// Reject `set_dynamic_addr`.
    pub fail_set_addr: bool,
}

impl Default for HalSim {
    fn default() -> Self {
        Self {
            state: HalState::Reset,
            error: HalError::Protocol,
            timing: None,
            targets: Vec::new(),
            daa_queue: VecDeque::new(),
            xfers: Vec::new(),
            devr: [None; STM32_I3C_DEVR_COUNT],
            notifications: 0,
            ccc_info: None,
            aborts: 0,
            fail_set_addr: false,
        }
    }
}

#[derive(Clone, Default)]
pub struct MockHal {
    pub sim: Arc<Mutex<HalSim>>,
}

impl MockHal {
    pub fn with_targets(targets: Vec<SimTarget>) -> Self {
        let hal = Self::default();
        hal.sim().targets = targets;
        hal
    }

    pub fn sim(&self) -> MutexGuard<'_, HalSim> {
        self.sim.lock().unwrap()
    }

    fn start(&mut self, xfer: &HalXfer<'_>, dma: bool) -> Result<(), HalError> {
        let mut sim = self.sim();
        if !matches!(sim.state, HalState::Ready | HalState::Error) {
            return Err(HalError::Busy);
        }
        sim.xfers.push((xfer.addr, xfer.kind, xfer.tx.to_vec(), dma));
        sim.state = HalState::Busy;
        Ok(())
    }
}

fn complete_broadcast(sim: &mut HalSim, id: u8) {
    if id == ccc::SETAASA.id() {
        for t in sim.targets.iter_mut().filter(|t| t.is_i3c) {
            if let Some(addr) = t.static_addr {
                t.dyn_addr = Some(addr);
            }
        }
    } else if id == ccc::RSTDAA_BCAST.id() {
        for t in sim.targets.iter_mut().filter(|t| t.static_addr.is_none()) {
            t.dyn_addr = None;
        }
    }
}

fn complete_direct(target: &mut SimTarget, id: u8, xfer: &mut HalXfer<'_>) {
    let reply: Vec<u8> = if id == ccc::GETPID.id() {
        target.pid.to_be_bytes()[2..].to_vec()
    } else if id == ccc::GETBCR.id() {
        vec![target.bcr]
    } else if id == ccc::GETDCR.id() {
        vec![target.dcr]
    } else if id == ccc::GETSTATUS.id() {
        vec![0x00, 0x01]
    } else {
        Vec::new()
    };
    for (dst, src) in xfer.rx.iter_mut().zip(reply.iter()) {
        *dst = *src;
    }
}

impl Stm32I3cHal for MockHal {
    fn init(&mut self, timing: &HalTiming) -> Result<(), HalError> {
        let mut sim = self.sim();
        sim.timing = Some(*timing);
        sim.state = HalState::Ready;
        Ok(())
    }

    fn deinit(&mut self) -> Result<(), HalError> {
        self.sim().state = HalState::Reset;
        Ok(())
    }

    fn state(&self) -> HalState {
        self.sim().state
    }

    fn last_error(&self) -> HalError {
        self.sim().error
    }

    fn start_xfer_it(&mut self, xfer: &HalXfer<'_>) -> Result<(), HalError> {
        self.start(xfer, false)
    }

    fn start_xfer_dma(&mut self, xfer: &HalXfer<'_>) -> Result<(), HalError> {
        self.start(xfer, true)
    }

    fn service(&mut self, xfer: &mut HalXfer<'_>) {
        let mut sim = self.sim();
        if sim.state != HalState::Busy {
            return;
        }
        let sim = &mut *sim;
        if let XferKind::Ccc { id, .. } = xfer.kind {
            if xfer.addr == I3C_BCAST_ADDR {
                complete_broadcast(sim, id);
                sim.state = HalState::Ready;
                return;
            }
        }
        let Some(target) = sim.targets.iter_mut().find(|t| t.answers(xfer.addr)) else {
            sim.error = HalError::Nack;
            sim.state = HalState::Error;
            return;
        };
        match xfer.kind {
            XferKind::Ccc { id, .. } => complete_direct(target, id, xfer),
            XferKind::I3cPrivate | XferKind::I2cPrivate => {
                if !xfer.tx.is_empty() {
                    target.mem = xfer.tx.to_vec();
                }
                for (dst, src) in xfer.rx.iter_mut().zip(target.mem.iter()) {
                    *dst = *src;
                }
            }
        }
        sim.state = HalState::Ready;
    }

    fn abort(&mut self) -> Result<(), HalError> {
        let mut sim = self.sim();
        sim.daa_queue.clear();
        sim.aborts += 1;
        sim.state = HalState::Ready;
        Ok(())
    }

    fn tx_fifo_addr(&self) -> usize {
        SIM_TX_FIFO
    }

    fn rx_fifo_addr(&self) -> usize {
        SIM_RX_FIFO
    }

    fn start_daa(&mut self, rstdaa: bool) -> Result<(), HalError> {
        let mut sim = self.sim();
        if rstdaa {
            complete_broadcast(&mut sim, ccc::RSTDAA_BCAST.id());
        }
        let queue: VecDeque<usize> = sim
            .targets
            .iter()
            .enumerate()
            .filter(|(_, t)| t.is_i3c && t.dyn_addr.is_none())
            .map(|(i, _)| i)
            .collect();
        sim.state = if queue.is_empty() {
            HalState::Ready
        } else {
            HalState::BusyDaa
        };
        sim.daa_queue = queue;
        Ok(())
    }

    fn daa_request(&mut self) -> Option<[u8; 8]> {
        let sim = self.sim();
        let t = sim.targets.get(*sim.daa_queue.front()?)?;
        let mut payload = [0u8; 8];
        payload[..6].copy_from_slice(&t.pid.to_be_bytes()[2..]);
        payload[6] = t.bcr;
        payload[7] = t.dcr;
        Some(payload)
    }

    fn set_dynamic_addr(&mut self, addr: u8) -> Result<(), HalError> {
        let mut sim = self.sim();
        if sim.fail_set_addr {
            return Err(HalError::Protocol);
        }
        let idx = sim.daa_queue.pop_front().ok_or(HalError::Protocol)?;
        if let Some(t) = sim.targets.get_mut(idx) {
            t.dyn_addr = Some(addr);
        }
        if sim.daa_queue.is_empty() {
            sim.state = HalState::Ready;
        }
        Ok(())
    }

    fn config_target(&mut self, index: usize, entry: &HalTargetEntry) -> Result<(), HalError> {
        let mut sim = self.sim();
        let slot = sim.devr.get_mut(index).ok_or(HalError::Protocol)?;
        *slot = Some(*entry);
        Ok(())
    }

    fn is_device_ready(&mut self, addr: u8, _is_i3c: bool) -> Result<bool, HalError> {
        Ok(self.sim().targets.iter().any(|t| t.answers(addr)))
    }

    fn notifications(&mut self, events: u32, enable: bool) -> Result<(), HalError> {
        let mut sim = self.sim();
        if enable {
            sim.notifications |= events;
        } else {
            sim.notifications &= !events;
        }
        Ok(())
    }

    fn ccc_info(&mut self, _events: u32) -> Result<CccInfo, HalError> {
        self.sim().ccc_info.ok_or(HalError::Protocol)
    }
}
