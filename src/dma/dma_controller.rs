// Licensed under the Apache-2.0 license

//! Generic DMA controller with per-channel scatter/gather lists.
//!
//! Locking is two-tier. The controller mutex only guards channel *acquisition*;
//! configure, start, abort and release take the mutex of the channel they operate
//! on, so transfers on different channels never contend with each other.
//!
//! Channel life cycle:
//!
//! ```text
//! Free --acquire--> Configured --xfer_start--> Running --completion--+
//!   ^                                             ^                  |
//!   |                                             +-- next entry ----+
//!   +------------------- list empty -------------------------------+
//! ```

use crate::common::{Logger, NoOpLogger};
use crate::dma::common::{default_sg_handler, DmaInitParam, DmaXfer, SgHandler};
use crate::dma::traits::{DmaEngine, DmaPlatform};
use crate::error::Error;
use crate::irq::{IrqController, IrqSource};
use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use heapless::Deque;

/// Default channel capacity of a controller.
pub const DMA_MAX_CHANNELS: usize = 8;
/// Default scatter/gather list depth per channel.
pub const DMA_MAX_SG_ENTRIES: usize = 16;

struct ChannelState<const SG: usize> {
    xfers: Deque<DmaXfer, SG>,
    irq_handler: Option<SgHandler>,
    irq_source: Option<IrqSource>,
}

/// One DMA channel and its pending transfer list.
pub struct DmaChannel<M: RawMutex, const SG: usize> {
    id: usize,
    /// No transfer queued or running and not held by a consumer.
    free: AtomicBool,
    /// Manual reservation; keeps the channel out of `acquire_channel`.
    sync_lock: AtomicBool,
    irq_num: AtomicU32,
    state: Mutex<M, RefCell<ChannelState<SG>>>,
}

impl<M: RawMutex, const SG: usize> DmaChannel<M, SG> {
    fn new(id: usize) -> Self {
        Self {
            id,
            free: AtomicBool::new(true),
            sync_lock: AtomicBool::new(false),
            irq_num: AtomicU32::new(0),
            state: Mutex::new(RefCell::new(ChannelState {
                xfers: Deque::new(),
                irq_handler: None,
                irq_source: None,
            })),
        }
    }

    #[must_use]
    pub const fn id(&self) -> usize {
        self.id
    }

    #[must_use]
    pub fn is_free(&self) -> bool {
        self.free.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_sync_locked(&self) -> bool {
        self.sync_lock.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn irq_num(&self) -> u32 {
        self.irq_num.load(Ordering::Relaxed)
    }

    /// Number of transfers queued or running.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.with_state(|st| st.xfers.len())
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut ChannelState<SG>) -> R) -> R {
        self.state.lock(|cell| f(&mut cell.borrow_mut()))
    }

    fn reset(&self, irq_num: u32) {
        self.with_state(|st| {
            st.xfers.clear();
            st.irq_handler = None;
            st.irq_source = None;
        });
        self.irq_num.store(irq_num, Ordering::Relaxed);
        self.sync_lock.store(false, Ordering::Release);
        self.free.store(true, Ordering::Release);
    }
}

struct ControllerState {
    num_ch: usize,
    sg_handler: Option<SgHandler>,
}

/// DMA controller: a platform binding, an optional interrupt controller and `CH`
/// channels with `SG`-deep scatter/gather lists.
pub struct DmaController<
    'a,
    P,
    M,
    L = NoOpLogger,
    const CH: usize = DMA_MAX_CHANNELS,
    const SG: usize = DMA_MAX_SG_ENTRIES,
> where
    P: DmaPlatform,
    M: RawMutex,
    L: Logger,
{
    platform: P,
    irq_ctrl: Option<&'a (dyn IrqController + Sync)>,
    logger: L,
    state: Mutex<M, RefCell<ControllerState>>,
    refcnt: AtomicUsize,
    channels: [DmaChannel<M, SG>; CH],
}

impl<'a, P, M, L, const CH: usize, const SG: usize> DmaController<'a, P, M, L, CH, SG>
where
    P: DmaPlatform,
    M: RawMutex,
    L: Logger,
{
    pub fn new(platform: P, irq_ctrl: Option<&'a (dyn IrqController + Sync)>, logger: L) -> Self {
        Self {
            platform,
            irq_ctrl,
            logger,
            state: Mutex::new(RefCell::new(ControllerState {
                num_ch: 0,
                sg_handler: None,
            })),
            refcnt: AtomicUsize::new(0),
            channels: core::array::from_fn(DmaChannel::new),
        }
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    #[must_use]
    pub fn ref_count(&self) -> usize {
        self.refcnt.load(Ordering::Acquire)
    }

    /// Number of channels brought up by [`DmaController::init`].
    #[must_use]
    pub fn num_channels(&self) -> usize {
        self.state.lock(|s| s.borrow().num_ch)
    }

    /// Look up an initialised channel.
    ///
    /// # Errors
    ///
    /// `Error::InvalidArgument` if `id` is not an initialised channel.
    pub fn channel(&self, id: usize) -> Result<&DmaChannel<M, SG>, Error> {
        if id >= self.num_channels() {
            return Err(Error::InvalidArgument);
        }
        self.channels.get(id).ok_or(Error::InvalidArgument)
    }

    /// Bring the controller up, or take another reference if it already is.
    ///
    /// # Errors
    ///
    /// `Error::InvalidArgument` if the channel count is zero, exceeds `CH`, or has no
    /// matching interrupt line; otherwise the platform error.
    pub fn init(&self, param: &DmaInitParam<'_>) -> Result<(), Error> {
        if self.refcnt.load(Ordering::Acquire) > 0 {
            self.refcnt.fetch_add(1, Ordering::AcqRel);
            return Ok(());
        }
        if param.num_ch == 0 || param.num_ch > CH || param.irq_nums.len() < param.num_ch {
            return Err(Error::InvalidArgument);
        }

        self.platform.init(param)?;

        for (chan, irq_num) in self.channels.iter().zip(param.irq_nums).take(param.num_ch) {
            chan.reset(*irq_num);
        }
        self.state.lock(|s| {
            let mut s = s.borrow_mut();
            s.num_ch = param.num_ch;
            s.sg_handler = param.sg_handler;
        });
        self.refcnt.fetch_add(1, Ordering::AcqRel);
        self.logger.debug(format_args!(
            "dma{}: {} channels up",
            param.id, param.num_ch
        ));
        Ok(())
    }

    /// Drop one reference; the last one tears the controller down.
    ///
    /// Teardown drains every channel list and unregisters any interrupt callback
    /// still installed before the platform is removed.
    ///
    /// # Errors
    ///
    /// Returns the interrupt controller or platform error.
    pub fn remove(&self) -> Result<(), Error> {
        match self.refcnt.load(Ordering::Acquire) {
            0 => return Ok(()),
            1 => {}
            _ => {
                self.refcnt.fetch_sub(1, Ordering::AcqRel);
                return Ok(());
            }
        }

        for chan in self.channels.iter().take(self.num_channels()) {
            let source = chan.with_state(|st| {
                st.xfers.clear();
                st.irq_handler = None;
                st.irq_source.take()
            });
            if let (Some(irq), Some(source)) = (self.irq_ctrl, source) {
                irq.unregister_callback(chan.irq_num(), source)?;
            }
            chan.sync_lock.store(false, Ordering::Release);
            chan.free.store(true, Ordering::Release);
        }

        self.platform.remove()?;
        self.state.lock(|s| s.borrow_mut().num_ch = 0);
        self.refcnt.store(0, Ordering::Release);
        Ok(())
    }

    /// Hand out a channel that is free and not sync-locked.
    ///
    /// # Errors
    ///
    /// `Error::OutOfMemory` if no channel is eligible, `Error::Fault` if the platform
    /// picked an ineligible one, otherwise the platform error.
    pub fn acquire_channel(&self) -> Result<usize, Error> {
        self.state.lock(|state| {
            let num_ch = state.borrow().num_ch;
            let mut eligible = [false; CH];
            for (slot, chan) in eligible.iter_mut().zip(&self.channels).take(num_ch) {
                *slot = chan.is_free() && !chan.is_sync_locked();
            }
            let eligible = eligible.get(..num_ch).ok_or(Error::InvalidArgument)?;
            if !eligible.contains(&true) {
                self.logger.debug(format_args!("dma: no eligible channel"));
                return Err(Error::OutOfMemory);
            }

            let id = self.platform.acquire_channel(eligible)?;
            if !eligible.get(id).copied().unwrap_or(false) {
                self.logger
                    .error(format_args!("dma: platform returned ineligible ch{id}"));
                return Err(Error::Fault);
            }
            let chan = self.channels.get(id).ok_or(Error::Fault)?;
            chan.free.store(false, Ordering::Release);
            self.logger.debug(format_args!("dma: acquired ch{id}"));
            Ok(id)
        })
    }

    /// Return a channel to the pool.
    ///
    /// # Errors
    ///
    /// `Error::InvalidArgument` if transfers are still queued (abort them first),
    /// otherwise the platform error.
    pub fn release_channel(&self, ch: usize) -> Result<(), Error> {
        let chan = self.channel(ch)?;
        chan.state.lock(|cell| {
            if !cell.borrow().xfers.is_empty() {
                return Err(Error::InvalidArgument);
            }
            self.platform.release_channel(ch)?;
            chan.free.store(true, Ordering::Release);
            Ok(())
        })
    }

    /// Reserve `ch` so that `acquire_channel` never hands it out.
    ///
    /// # Errors
    ///
    /// `Error::InvalidArgument` if `ch` is unknown.
    pub fn sync_lock_channel(&self, ch: usize) -> Result<(), Error> {
        self.set_sync_lock(ch, true)
    }

    /// # Errors
    ///
    /// `Error::InvalidArgument` if `ch` is unknown.
    pub fn sync_unlock_channel(&self, ch: usize) -> Result<(), Error> {
        self.set_sync_lock(ch, false)
    }

    fn set_sync_lock(&self, ch: usize, locked: bool) -> Result<(), Error> {
        let chan = self.channel(ch)?;
        self.state.lock(|_| chan.sync_lock.store(locked, Ordering::Release));
        Ok(())
    }

    /// Append `xfers` to the list of `ch` and program the list head.
    ///
    /// With an interrupt controller present, the completion event is derived from
    /// the first descriptor's direction, the scatter/gather handler is installed and
    /// the line priority is taken from the first descriptor.
    ///
    /// # Errors
    ///
    /// `Error::InvalidArgument` for an empty slice or a direction without a
    /// completion event, `Error::OutOfMemory` if the list overflows. On any error
    /// the entries added by this call are removed again.
    pub fn config_xfer(&self, ch: usize, xfers: &[DmaXfer]) -> Result<(), Error> {
        let first = xfers.first().ok_or(Error::InvalidArgument)?;
        let chan = self.channel(ch)?;
        let handler = self
            .state
            .lock(|s| s.borrow().sg_handler)
            .unwrap_or(default_sg_handler);

        chan.state.lock(|cell| {
            let mut st = cell.borrow_mut();
            let before = st.xfers.len();
            let result = self.queue_xfers(chan, &mut st, xfers, first, handler);
            if let Err(err) = result {
                while st.xfers.len() > before {
                    st.xfers.pop_back();
                }
                self.logger
                    .error(format_args!("dma: ch{ch} config rolled back: {err}"));
            }
            result
        })
    }

    fn queue_xfers(
        &self,
        chan: &DmaChannel<M, SG>,
        st: &mut ChannelState<SG>,
        xfers: &[DmaXfer],
        first: &DmaXfer,
        handler: SgHandler,
    ) -> Result<(), Error> {
        for xfer in xfers {
            st.xfers
                .push_back(*xfer)
                .map_err(|_| Error::OutOfMemory)?;
        }
        let head = st.xfers.front().copied().ok_or(Error::Fault)?;

        let Some(irq) = self.irq_ctrl else {
            return self.platform.config_xfer(chan.id, &head);
        };

        let source = IrqSource {
            peripheral: first.periph,
            handle: chan.id,
            event: first.xfer_type.irq_event()?,
        };
        self.platform.config_xfer(chan.id, &head)?;

        if let Some(prev) = st.irq_source.take() {
            st.irq_handler = None;
            irq.unregister_callback(chan.irq_num(), prev)?;
        }
        irq.register_callback(chan.irq_num(), source)?;
        st.irq_source = Some(source);
        st.irq_handler = Some(handler);

        if let Err(err) = irq.set_priority(chan.irq_num(), first.irq_priority) {
            st.irq_source = None;
            st.irq_handler = None;
            if let Err(unreg) = irq.unregister_callback(chan.irq_num(), source) {
                self.logger.error(format_args!(
                    "dma: ch{} unregister after priority failure: {unreg}",
                    chan.id
                ));
            }
            return Err(err);
        }
        Ok(())
    }

    /// Unmask the channel interrupt and start the list head.
    ///
    /// # Errors
    ///
    /// `Error::InvalidArgument` if nothing is queued, otherwise the interrupt
    /// controller or platform error.
    pub fn xfer_start(&self, ch: usize) -> Result<(), Error> {
        let chan = self.channel(ch)?;
        chan.state.lock(|cell| {
            if cell.borrow().xfers.is_empty() {
                return Err(Error::InvalidArgument);
            }
            if let Some(irq) = self.irq_ctrl {
                irq.enable(chan.irq_num())?;
            }
            self.platform.xfer_start(ch)
        })
    }

    /// Mask the channel interrupt, drain the list and stop the hardware.
    ///
    /// Returns once the hardware has been told to stop; bytes already on the bus may
    /// still land. Poll [`DmaController::in_progress`] if that matters.
    ///
    /// # Errors
    ///
    /// The first interrupt controller or platform error. The list is drained even
    /// when masking the interrupt fails.
    pub fn xfer_abort(&self, ch: usize) -> Result<(), Error> {
        let chan = self.channel(ch)?;
        chan.state.lock(|cell| {
            let masked = self
                .irq_ctrl
                .map_or(Ok(()), |irq| irq.disable(chan.irq_num()));
            {
                let mut st = cell.borrow_mut();
                while st.xfers.pop_front().is_some() {}
            }
            let aborted = self.platform.xfer_abort(ch);
            masked.and(aborted)
        })
    }

    /// Whether every queued transfer on `ch` has retired.
    ///
    /// # Errors
    ///
    /// `Error::InvalidArgument` if `ch` is unknown.
    pub fn is_completed(&self, ch: usize) -> Result<bool, Error> {
        Ok(self.channel(ch)?.pending() == 0)
    }

    /// # Errors
    ///
    /// `Error::NotImplemented` if the platform cannot report channel activity.
    pub fn in_progress(&self, ch: usize) -> Result<bool, Error> {
        self.channel(ch)?;
        self.platform.ch_in_progress(ch)
    }

    /// Interrupt entry point for channel `ch`.
    ///
    /// Dispatches to the scatter/gather handler installed by `config_xfer`. An
    /// interrupt on a channel with nothing queued is spurious: its list was
    /// already retired by [`DmaController::sg_complete`] or an abort.
    pub fn on_irq(&self, ch: usize) {
        let handler = self.channels.get(ch).and_then(|chan| {
            chan.with_state(|st| {
                if st.xfers.is_empty() {
                    None
                } else {
                    st.irq_handler
                }
            })
        });
        match handler {
            Some(handler) => handler(self, ch),
            None => self
                .logger
                .debug(format_args!("dma: spurious interrupt on ch{ch}")),
        }
    }

    /// Polled completion. Without an interrupt controller, runs the scatter/gather
    /// step itself once the platform reports the channel idle.
    ///
    /// # Errors
    ///
    /// `nb::Error::WouldBlock` while transfers remain queued. With the built-in
    /// handler, a failed step is returned as `nb::Error::Other`.
    pub fn poll_xfer(&self, ch: usize) -> nb::Result<(), Error> {
        let chan = self.channel(ch)?;
        if chan.pending() == 0 {
            return Ok(());
        }
        if self.irq_ctrl.is_some() || self.platform.ch_in_progress(ch)? {
            return Err(nb::Error::WouldBlock);
        }

        match self.state.lock(|s| s.borrow().sg_handler) {
            Some(handler) => handler(self, ch),
            None => self.sg_complete(ch)?,
        }

        if chan.pending() == 0 {
            Ok(())
        } else {
            Err(nb::Error::WouldBlock)
        }
    }

    /// Built-in scatter/gather step.
    ///
    /// Pops the finished transfer, reports it together with the next pending one,
    /// then either programs and starts the next entry or, when the list is empty,
    /// masks the interrupt and frees the channel.
    ///
    /// Every failure is logged.
    ///
    /// # Errors
    ///
    /// `Error::Fault` if the list was empty on entry; the channel is aborted
    /// instead of reprogramming undefined state. If the next entry cannot be
    /// programmed or started, the rest of the list is aborted, the channel is
    /// freed and the platform error is returned.
    pub fn sg_complete(&self, ch: usize) -> Result<(), Error> {
        let chan = self.channel(ch).map_err(|err| {
            self.logger
                .error(format_args!("dma: completion on unknown ch{ch}"));
            err
        })?;
        let (old, next) = chan.with_state(|st| {
            let old = st.xfers.pop_front();
            (old, st.xfers.front().copied())
        });

        let Some(old) = old else {
            self.logger
                .error(format_args!("dma: ch{ch} completion on empty list, aborting"));
            self.abort_logged(ch);
            return Err(Error::Fault);
        };

        if let Some(done) = old.complete {
            (done.func)(&old, next.as_ref(), done.ctx);
        }

        // Re-read the head: the completion callback may have chained more work.
        let head = chan.with_state(|st| st.xfers.front().copied());
        match head {
            Some(next) => {
                let started = chan.state.lock(|_| {
                    self.platform.config_xfer(ch, &next)?;
                    self.platform.xfer_start(ch)
                });
                if let Err(err) = started {
                    self.logger.error(format_args!(
                        "dma: ch{ch} next entry not started: {err}, aborting"
                    ));
                    self.abort_logged(ch);
                    chan.free.store(true, Ordering::Release);
                    return Err(err);
                }
                Ok(())
            }
            None => {
                let masked = self
                    .irq_ctrl
                    .map_or(Ok(()), |irq| irq.disable(chan.irq_num()));
                chan.free.store(true, Ordering::Release);
                if let Err(err) = masked {
                    self.logger
                        .error(format_args!("dma: ch{ch} mask failed: {err}"));
                }
                masked
            }
        }
    }

    fn abort_logged(&self, ch: usize) {
        if let Err(err) = self.xfer_abort(ch) {
            self.logger.error(format_args!("dma: ch{ch} abort failed: {err}"));
        }
    }
}

impl<P, M, L, const CH: usize, const SG: usize> DmaEngine for DmaController<'_, P, M, L, CH, SG>
where
    P: DmaPlatform,
    M: RawMutex,
    L: Logger,
{
    fn acquire_channel(&self) -> Result<usize, Error> {
        DmaController::acquire_channel(self)
    }

    fn release_channel(&self, ch: usize) -> Result<(), Error> {
        DmaController::release_channel(self, ch)
    }

    fn config_xfer(&self, ch: usize, xfers: &[DmaXfer]) -> Result<(), Error> {
        DmaController::config_xfer(self, ch, xfers)
    }

    fn xfer_start(&self, ch: usize) -> Result<(), Error> {
        DmaController::xfer_start(self, ch)
    }

    fn xfer_abort(&self, ch: usize) -> Result<(), Error> {
        DmaController::xfer_abort(self, ch)
    }

    fn is_completed(&self, ch: usize) -> Result<bool, Error> {
        DmaController::is_completed(self, ch)
    }

    fn in_progress(&self, ch: usize) -> Result<bool, Error> {
        DmaController::in_progress(self, ch)
    }

    fn poll_xfer(&self, ch: usize) -> nb::Result<(), Error> {
        DmaController::poll_xfer(self, ch)
    }

    fn sg_complete(&self, ch: usize) -> Result<(), Error> {
        DmaController::sg_complete(self, ch)
    }
}
