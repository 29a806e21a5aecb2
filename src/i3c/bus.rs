// Licensed under the Apache-2.0 license

//! I3C bus manager.
//!
//! Owns the backend, the address occupancy table, the DAA candidate table and the
//! device descriptor slots of one controller. All of it sits behind a single
//! mutex; the pending-interrupt word lives outside it so that interrupt context
//! can latch events without waiting for the lock.
//!
//! Bring-up order:
//!
//! ```text
//! init_bus -> reserve addresses / record candidates
//!          -> RSTACT (whole target) -> SETAASA (if any static I3C target)
//!          -> RSTDAA + ENTDAA
//! ```

use crate::common::{Logger, NoOpLogger};
use crate::error::Error;
use crate::i3c::addr_slots::{AddrSlots, AddrStatus};
use crate::i3c::ccc::{self, Ccc};
use crate::i3c::common::{
    CccInfo, CccTransfer, DaaCandidate, I3cBusInitParam, I3cEventCallback, I3cIrqEvent,
    I3cTarget, I3C_BCAST_ADDR, I3C_MAX_BUS_NUMBER, I3C_MAX_DEV_NUMBER,
};
use crate::i3c::traits::{DaaContext, I3cPlatform};
use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::once_lock::OnceLock;

#[derive(Copy, Clone, Debug)]
struct DeviceSlot {
    target: I3cTarget,
    callback: Option<I3cEventCallback>,
}

struct BusCore<P> {
    platform: P,
    addr_slots: AddrSlots,
    daa_candidates: [DaaCandidate; I3C_MAX_DEV_NUMBER],
    devs: [Option<DeviceSlot>; I3C_MAX_DEV_NUMBER],
    ccc_info: CccInfo,
}

/// Check broadcast/direct framing of `ccc` against `addr`.
///
/// Broadcast commands must target [`I3C_BCAST_ADDR`] and cannot read; direct
/// commands must name a target.
///
/// # Errors
///
/// `Error::InvalidArgument` on any framing violation.
pub fn validate_ccc(addr: u8, ccc: Ccc) -> Result<(), Error> {
    let bcast = addr == I3C_BCAST_ADDR;
    if bcast && (ccc.is_read() || ccc.is_direct()) {
        return Err(Error::InvalidArgument);
    }
    if !bcast && !ccc.is_direct() {
        return Err(Error::InvalidArgument);
    }
    Ok(())
}

fn bus_index(id: u8) -> Result<usize, Error> {
    let id = usize::from(id);
    if id == 0 || id > I3C_MAX_BUS_NUMBER {
        return Err(Error::InvalidArgument);
    }
    Ok(id - 1)
}

impl<P: I3cPlatform> BusCore<P> {
    fn new(platform: P) -> Self {
        Self {
            platform,
            addr_slots: AddrSlots::new(),
            daa_candidates: [DaaCandidate::default(); I3C_MAX_DEV_NUMBER],
            devs: [None; I3C_MAX_DEV_NUMBER],
            ccc_info: CccInfo::default(),
        }
    }

    fn is_candidate_addr(&self, addr: u8) -> bool {
        self.daa_candidates
            .iter()
            .any(|c| c.is_used() && c.addr == addr)
    }

    fn declare(&mut self, devs: &[I3cTarget]) -> Result<bool, Error> {
        let mut has_static = false;
        let mut next_candidate = 0;
        for dev in devs {
            if !self.addr_slots.is_avail(dev.addr) || self.is_candidate_addr(dev.addr) {
                return Err(Error::InvalidArgument);
            }
            if !dev.is_i3c {
                self.addr_slots.set_status(dev.addr, AddrStatus::I2cDev);
            } else if dev.is_static {
                self.addr_slots.set_status(dev.addr, AddrStatus::I3cDev);
                has_static = true;
            } else {
                let slot = self
                    .daa_candidates
                    .get_mut(next_candidate)
                    .ok_or(Error::OutOfMemory)?;
                *slot = DaaCandidate {
                    pid: dev.pid,
                    addr: dev.addr,
                    ..DaaCandidate::default()
                };
                next_candidate += 1;
            }
        }
        Ok(has_static)
    }

    fn bring_up(&mut self, devs: &[I3cTarget]) -> Result<(), Error> {
        let has_static = self.declare(devs)?;

        let mut rst = [ccc::RSTACT_RESET_WHOLE_TARGET];
        self.send_ccc(I3C_BCAST_ADDR, ccc::RSTACT_BCAST, &mut rst)?;
        if has_static {
            self.send_ccc(I3C_BCAST_ADDR, ccc::SETAASA, &mut [])?;
        }
        self.do_daa(true)
    }

    fn send_ccc(&mut self, addr: u8, ccc: Ccc, data: &mut [u8]) -> Result<(), Error> {
        validate_ccc(addr, ccc)?;
        let len = ccc.payload_len();
        let data = data.get_mut(..len).ok_or(Error::InvalidArgument)?;
        self.platform.send_ccc(&mut CccTransfer { addr, ccc, data })
    }

    fn do_daa(&mut self, rstdaa: bool) -> Result<(), Error> {
        let mut daa = DaaContext::new(&mut self.daa_candidates, &mut self.addr_slots);
        self.platform.do_daa(&mut daa, rstdaa)
    }

    fn slot_mut(&mut self, slot: usize) -> Result<&mut DeviceSlot, Error> {
        self.devs
            .get_mut(slot)
            .and_then(Option::as_mut)
            .ok_or(Error::InvalidArgument)
    }
}

/// Device attachment resolved by [`I3cBus::attach`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct Attachment {
    pub slot: usize,
    pub target: I3cTarget,
    pub bcr: u8,
    pub dcr: u8,
}

/// One I3C bus controller and everything known about the targets on it.
pub struct I3cBus<P, M, L = NoOpLogger>
where
    P: I3cPlatform,
    M: RawMutex,
    L: Logger,
{
    id: u8,
    core: Mutex<M, RefCell<BusCore<P>>>,
    irq_events: AtomicU32,
    async_irq: AtomicBool,
    logger: L,
}

impl<P, M, L> I3cBus<P, M, L>
where
    P: I3cPlatform,
    M: RawMutex,
    L: Logger,
{
    /// Bring up the bus described by `param`.
    ///
    /// Declared I2C and static I3C targets claim their addresses immediately;
    /// dynamic targets are recorded as DAA candidates. The bus then resets every
    /// target, lets static targets adopt their addresses and runs DAA.
    ///
    /// # Errors
    ///
    /// `Error::InvalidArgument` for a bad bus id or a duplicate or reserved target
    /// address; otherwise the backend error. The backend is torn down again on any
    /// failure after it came up.
    pub fn init(param: &I3cBusInitParam<'_, P::Config>, logger: L) -> Result<Self, Error> {
        bus_index(param.device_id)?;
        let platform = P::init_bus(&param.config, param.device_id)?;
        let mut core = BusCore::new(platform);

        if let Err(err) = core.bring_up(param.devs) {
            logger.error(format_args!(
                "i3c{}: bring-up failed: {err}",
                param.device_id
            ));
            if let Err(rm) = core.platform.remove_bus() {
                logger.error(format_args!("i3c{}: teardown failed: {rm}", param.device_id));
            }
            return Err(err);
        }

        logger.debug(format_args!(
            "i3c{}: up, {} targets declared",
            param.device_id,
            param.devs.len()
        ));
        Ok(Self {
            id: param.device_id,
            core: Mutex::new(RefCell::new(core)),
            irq_events: AtomicU32::new(0),
            async_irq: AtomicBool::new(false),
            logger,
        })
    }

    /// Tear the backend down.
    ///
    /// # Errors
    ///
    /// `Error::InvalidArgument` while device descriptors are still attached,
    /// otherwise the backend error.
    pub fn remove(&mut self) -> Result<(), Error> {
        let core = self.core.get_mut().get_mut();
        if core.devs.iter().any(Option::is_some) {
            return Err(Error::InvalidArgument);
        }
        core.platform.remove_bus()
    }

    #[must_use]
    pub const fn id(&self) -> u8 {
        self.id
    }

    fn with_core<R>(&self, f: impl FnOnce(&mut BusCore<P>) -> R) -> R {
        self.core.lock(|cell| f(&mut cell.borrow_mut()))
    }

    /// Run `f` against the backend with the bus locked.
    pub fn with_platform<R>(&self, f: impl FnOnce(&mut P) -> R) -> R {
        self.with_core(|core| f(&mut core.platform))
    }

    pub fn addr_set_status(&self, addr: u8, status: AddrStatus) {
        self.with_core(|core| core.addr_slots.set_status(addr, status));
    }

    #[must_use]
    pub fn addr_get_status(&self, addr: u8) -> AddrStatus {
        self.with_core(|core| core.addr_slots.status(addr))
    }

    #[must_use]
    pub fn addr_is_avail(&self, addr: u8) -> bool {
        self.with_core(|core| core.addr_slots.is_avail(addr))
    }

    /// Lowest free address at or above `start`, `0` if none.
    #[must_use]
    pub fn addr_get_free(&self, start: u8) -> u8 {
        self.with_core(|core| core.addr_slots.get_free(start))
    }

    /// Snapshot of the DAA candidate table.
    #[must_use]
    pub fn daa_candidates(&self) -> [DaaCandidate; I3C_MAX_DEV_NUMBER] {
        self.with_core(|core| core.daa_candidates)
    }

    #[must_use]
    pub fn daa_candidate(&self, pid: u64) -> Option<DaaCandidate> {
        self.with_core(|core| {
            core.daa_candidates
                .iter()
                .find(|c| c.is_used() && c.pid == pid)
                .copied()
        })
    }

    /// Re-run dynamic address assignment, e.g. after a hot-join.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub fn do_daa(&self, rstdaa: bool) -> Result<(), Error> {
        self.with_core(|core| core.do_daa(rstdaa))
    }

    /// Send a broadcast or direct CCC. `data` must hold at least
    /// `ccc.payload_len()` bytes; only that prefix is transferred.
    ///
    /// # Errors
    ///
    /// `Error::InvalidArgument` for a framing violation or a short buffer,
    /// otherwise the backend error.
    pub fn send_ccc(&self, addr: u8, ccc: Ccc, data: &mut [u8]) -> Result<(), Error> {
        self.with_core(|core| core.send_ccc(addr, ccc, data))
            .inspect_err(|err| {
                self.logger.debug(format_args!(
                    "i3c{}: ccc {:#04x} to {addr:#04x} failed: {err}",
                    self.id,
                    ccc.id()
                ));
            })
    }

    /// Enable or disable backend interrupt sources.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub fn conf_irq(&self, events: u32, enable: bool) -> Result<(), Error> {
        self.with_platform(|p| p.conf_irq(events, enable))
    }

    /// Select interrupt delivery: `true` dispatches callbacks from
    /// [`I3cBus::on_irq`], `false` leaves them to [`I3cBus::wait_irq`].
    pub fn async_irq(&self, enable: bool) {
        self.async_irq.store(enable, Ordering::Release);
    }

    #[must_use]
    pub fn is_async_irq(&self) -> bool {
        self.async_irq.load(Ordering::Acquire)
    }

    /// Events latched and not yet dispatched.
    #[must_use]
    pub fn irq_events(&self) -> u32 {
        self.irq_events.load(Ordering::Acquire)
    }

    /// Record of the last dispatched interrupt.
    #[must_use]
    pub fn ccc_info(&self) -> CccInfo {
        self.with_core(|core| core.ccc_info)
    }

    /// Interrupt entry point: latch `events` and, in asynchronous mode, dispatch.
    pub fn on_irq(&self, events: u32) {
        self.irq_events.fetch_or(events, Ordering::AcqRel);
        if self.is_async_irq() {
            if let Err(err) = self.call_irq() {
                self.logger
                    .error(format_args!("i3c{}: irq dispatch failed: {err}", self.id));
            }
        }
    }

    /// Block until one of the `irq` event bits is pending, then dispatch.
    ///
    /// # Errors
    ///
    /// `Error::InvalidArgument` in asynchronous mode, otherwise the dispatch error.
    pub fn wait_irq(&self, irq: u32) -> Result<(), Error> {
        if self.is_async_irq() {
            return Err(Error::InvalidArgument);
        }
        while self.irq_events.load(Ordering::Acquire) & irq == 0 {
            core::hint::spin_loop();
        }
        self.call_irq()
    }

    /// Fetch the event record for the pending events and invoke the callback of
    /// the device that raised the in-band interrupt, if one is registered.
    ///
    /// The callback runs without the bus lock held, so it may issue transfers.
    ///
    /// # Errors
    ///
    /// Returns the backend error; pending events stay latched in that case.
    pub fn call_irq(&self) -> Result<(), Error> {
        let events = self.irq_events.load(Ordering::Acquire);
        let (info, dispatch) = self.with_core(|core| {
            let info = core.platform.get_ccc_info(events)?;
            core.ccc_info = info;
            let dispatch = core
                .devs
                .iter()
                .flatten()
                .find(|d| d.target.addr == info.ibi_addr)
                .and_then(|d| d.callback.map(|cb| (cb, d.target.pid)));
            Ok::<_, Error>((info, dispatch))
        })?;
        self.irq_events.fetch_and(!events, Ordering::AcqRel);

        match dispatch {
            Some((cb, pid)) => {
                let event = I3cIrqEvent {
                    events,
                    addr: info.ibi_addr,
                    pid,
                    payload: info.payload(),
                };
                (cb.func)(&event, cb.ctx);
            }
            None => self.logger.debug(format_args!(
                "i3c{}: events {events:#x} from {:#04x} without handler",
                self.id, info.ibi_addr
            )),
        }
        Ok(())
    }

    /// Claim a descriptor slot for `target` and bring it up in the backend.
    ///
    /// Dynamic I3C targets must have been discovered by DAA; their address is the
    /// one DAA assigned.
    pub(crate) fn attach(&self, target: &I3cTarget) -> Result<Attachment, Error> {
        self.with_core(|core| {
            let mut target = *target;
            let (bcr, dcr) = if target.needs_daa() {
                let cand = core
                    .daa_candidates
                    .iter()
                    .find(|c| c.is_used() && c.pid == target.pid)
                    .ok_or(Error::Fault)?;
                if !cand.is_attached {
                    return Err(Error::PermissionDenied);
                }
                target.addr = cand.addr;
                (cand.bcr, cand.dcr)
            } else {
                (0, 0)
            };

            let slot = core
                .devs
                .iter()
                .position(Option::is_none)
                .ok_or(Error::OutOfMemory)?;
            if let Some(entry) = core.devs.get_mut(slot) {
                *entry = Some(DeviceSlot {
                    target,
                    callback: None,
                });
            }

            let ready = core
                .platform
                .init_device(slot, &target)
                .and_then(|()| core.platform.is_dev_ready(slot, &target));
            if let Err(err) = ready {
                if let Some(entry) = core.devs.get_mut(slot) {
                    *entry = None;
                }
                return Err(err);
            }

            Ok(Attachment {
                slot,
                target,
                bcr,
                dcr,
            })
        })
        .inspect(|a| {
            self.logger.debug(format_args!(
                "i3c{}: slot {} -> {:#04x}",
                self.id, a.slot, a.target.addr
            ));
        })
    }

    /// Free `slot` and tell the backend. Failures are logged here.
    pub(crate) fn detach(&self, slot: usize) -> Result<(), Error> {
        self.with_core(|core| {
            let dev = *core.slot_mut(slot)?;
            if let Some(entry) = core.devs.get_mut(slot) {
                *entry = None;
            }
            core.platform.remove_device(slot, &dev.target)
        })
        .inspect_err(|err| {
            self.logger
                .error(format_args!("i3c{}: slot {slot} detach: {err}", self.id));
        })
    }

    pub(crate) fn set_callback(
        &self,
        slot: usize,
        callback: Option<I3cEventCallback>,
    ) -> Result<(), Error> {
        self.with_core(|core| {
            core.slot_mut(slot)?.callback = callback;
            Ok(())
        })
    }

    /// Number of occupied device slots.
    #[must_use]
    pub fn device_count(&self) -> usize {
        self.with_core(|core| core.devs.iter().flatten().count())
    }
}

/// The buses of the system, indexed by bus id.
///
/// Buses are created lazily by the first device descriptor that names them.
/// The constructor is `const`, so the registry can live in a `static` shared
/// with interrupt handlers:
///
/// ```ignore
/// static I3C: I3cBusRegistry<Stm32I3c<'static, Hal>, CriticalSectionRawMutex> =
///     I3cBusRegistry::new(NoOpLogger);
///
/// fn i3c1_ev() {
///     if let Some(bus) = I3C.get(1) {
///         bus.on_irq(I3C_IRQ_IBI);
///     }
/// }
/// ```
///
/// A registered bus is only torn down through `&mut self`.
pub struct I3cBusRegistry<P, M, L = NoOpLogger>
where
    P: I3cPlatform,
    M: RawMutex,
    L: Logger,
{
    buses: [OnceLock<I3cBus<P, M, L>>; I3C_MAX_BUS_NUMBER],
    logger: L,
}

impl<P, M, L> I3cBusRegistry<P, M, L>
where
    P: I3cPlatform,
    M: RawMutex,
    L: Logger + Clone,
{
    pub const fn new(logger: L) -> Self {
        Self {
            buses: [const { OnceLock::new() }; I3C_MAX_BUS_NUMBER],
            logger,
        }
    }

    #[must_use]
    pub fn get(&self, id: u8) -> Option<&I3cBus<P, M, L>> {
        let idx = bus_index(id).ok()?;
        self.buses.get(idx)?.try_get()
    }

    /// Bring up bus `param.device_id` and register it.
    ///
    /// # Errors
    ///
    /// `Error::InvalidArgument` for a bad id or one already in use, otherwise the
    /// bring-up error.
    pub fn init_bus(
        &self,
        param: &I3cBusInitParam<'_, P::Config>,
    ) -> Result<&I3cBus<P, M, L>, Error> {
        let cell = self
            .buses
            .get(bus_index(param.device_id)?)
            .ok_or(Error::InvalidArgument)?;
        if cell.is_set() {
            return Err(Error::InvalidArgument);
        }
        let bus = I3cBus::init(param, self.logger.clone())?;
        if let Err(mut bus) = cell.init(bus) {
            self.logger.error(format_args!(
                "i3c{}: registered concurrently, dropping duplicate",
                param.device_id
            ));
            if let Err(err) = bus.remove() {
                self.logger.error(format_args!(
                    "i3c{}: duplicate teardown failed: {err}",
                    param.device_id
                ));
            }
            return Err(Error::InvalidArgument);
        }
        cell.try_get().ok_or(Error::Fault)
    }

    /// Tear down bus `id` and free its registry slot.
    ///
    /// # Errors
    ///
    /// `Error::InvalidArgument` if the bus does not exist or still has devices,
    /// otherwise the backend error (the bus stays registered).
    pub fn remove_bus(&mut self, id: u8) -> Result<(), Error> {
        let cell = self
            .buses
            .get_mut(bus_index(id)?)
            .ok_or(Error::InvalidArgument)?;
        let mut bus = cell.take().ok_or(Error::InvalidArgument)?;
        if let Err(err) = bus.remove() {
            cell.init(bus).map_err(|_| Error::Fault)?;
            return Err(err);
        }
        self.logger.debug(format_args!("i3c{id}: removed"));
        Ok(())
    }
}
