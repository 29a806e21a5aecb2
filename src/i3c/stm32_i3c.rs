// Licensed under the Apache-2.0 license

//! STM32 I3C controller backend.
//!
//! Every operation is synchronous: the transfer is handed to the HAL and the
//! backend spins on the HAL state until it settles. In DMA mode, private
//! transfers move their payload through channels of a [`DmaEngine`].
//!
//! Transfers run with the bus locked, so a DMA completion interrupt cannot be
//! taken while the backend waits. Once the HAL reports the transfer done, the
//! backend retires the channel lists itself with [`DmaEngine::sg_complete`];
//! an interrupt that arrives afterwards finds an empty list and is ignored.

use crate::common::{Logger, NoOpLogger};
use crate::dma::{DmaEngine, DmaXfer, DmaXferType};
use crate::error::Error;
use crate::i3c::common::{CccInfo, CccTransfer, I3cTarget};
use crate::i3c::stm32_hal::{
    HalState, HalTargetEntry, HalTiming, HalXfer, Stm32I3cHal, XferKind, STM32_I3C_DEVR_COUNT,
};
use crate::i3c::traits::{DaaContext, I3cPlatform};
use crate::irq::Peripheral;
use fugit::HertzU32;
use heapless::Vec;
use zerocopy::{FromBytes, Immutable, KnownLayout};

const SDR_FREQ_MAX: HertzU32 = HertzU32::kHz(12_500);
const I2C_FREQ_MAX: HertzU32 = HertzU32::MHz(1);

#[derive(Copy, Clone)]
pub enum Stm32XferMode<'d> {
    Interrupt,
    /// Private transfers go through DMA channels of `engine`.
    Dma {
        engine: &'d (dyn DmaEngine + Sync),
        irq_priority: u32,
    },
}

pub struct Stm32I3cConfig<'d, H, L = NoOpLogger> {
    pub hal: H,
    pub timing: HalTiming,
    pub xfer_mode: Stm32XferMode<'d>,
    pub logger: L,
}

pub struct Stm32I3cConfigBuilder<'d, H, L = NoOpLogger> {
    hal: H,
    kernel_clk: HertzU32,
    sdr_freq: HertzU32,
    i2c_freq: HertzU32,
    xfer_mode: Stm32XferMode<'d>,
    logger: L,
}

impl<'d, H> Stm32I3cConfigBuilder<'d, H> {
    #[must_use]
    pub fn new(hal: H) -> Self {
        Self {
            hal,
            kernel_clk: HertzU32::MHz(250),
            sdr_freq: SDR_FREQ_MAX,
            i2c_freq: HertzU32::kHz(400),
            xfer_mode: Stm32XferMode::Interrupt,
            logger: NoOpLogger,
        }
    }
}

impl<'d, H, L> Stm32I3cConfigBuilder<'d, H, L> {
    #[must_use]
    pub fn kernel_clk(mut self, freq: HertzU32) -> Self {
        self.kernel_clk = freq;
        self
    }
    #[must_use]
    pub fn sdr_freq(mut self, freq: HertzU32) -> Self {
        self.sdr_freq = freq;
        self
    }
    #[must_use]
    pub fn i2c_freq(mut self, freq: HertzU32) -> Self {
        self.i2c_freq = freq;
        self
    }
    #[must_use]
    pub fn dma(mut self, engine: &'d (dyn DmaEngine + Sync), irq_priority: u32) -> Self {
        self.xfer_mode = Stm32XferMode::Dma {
            engine,
            irq_priority,
        };
        self
    }
    #[must_use]
    pub fn logger<L2>(self, logger: L2) -> Stm32I3cConfigBuilder<'d, H, L2> {
        Stm32I3cConfigBuilder {
            hal: self.hal,
            kernel_clk: self.kernel_clk,
            sdr_freq: self.sdr_freq,
            i2c_freq: self.i2c_freq,
            xfer_mode: self.xfer_mode,
            logger,
        }
    }

    /// # Errors
    ///
    /// `Error::InvalidArgument` if a bus clock is zero, above its protocol limit
    /// or above half the kernel clock.
    pub fn build(self) -> Result<Stm32I3cConfig<'d, H, L>, Error> {
        let half_kernel = self.kernel_clk.raw() / 2;
        for (freq, max) in [(self.sdr_freq, SDR_FREQ_MAX), (self.i2c_freq, I2C_FREQ_MAX)] {
            if freq.raw() == 0 || freq > max || freq.raw() > half_kernel {
                return Err(Error::InvalidArgument);
            }
        }
        Ok(Stm32I3cConfig {
            hal: self.hal,
            timing: HalTiming {
                kernel_clk: self.kernel_clk,
                sdr_freq: self.sdr_freq,
                i2c_freq: self.i2c_freq,
            },
            xfer_mode: self.xfer_mode,
            logger: self.logger,
        })
    }
}

/// `ENTDAA` response as reported by the HAL.
#[derive(FromBytes, KnownLayout, Immutable)]
#[repr(C)]
struct DaaRequest {
    pid: [u8; 6],
    bcr: u8,
    dcr: u8,
}

impl DaaRequest {
    fn pid(&self) -> u64 {
        self.pid
            .iter()
            .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte))
    }
}

pub struct Stm32I3c<'d, H: Stm32I3cHal, L: Logger = NoOpLogger> {
    hal: H,
    device_id: u8,
    xfer_mode: Stm32XferMode<'d>,
    logger: L,
}

impl<'d, H: Stm32I3cHal, L: Logger> Stm32I3c<'d, H, L> {
    pub fn hal(&self) -> &H {
        &self.hal
    }

    pub fn hal_mut(&mut self) -> &mut H {
        &mut self.hal
    }

    #[must_use]
    pub const fn device_id(&self) -> u8 {
        self.device_id
    }

    fn wait_ready(&mut self, xfer: &mut HalXfer<'_>) -> Result<(), Error> {
        loop {
            self.hal.service(xfer);
            match self.hal.state() {
                HalState::Ready => return Ok(()),
                HalState::Error => {
                    let err = self.hal.last_error();
                    self.logger.error(format_args!(
                        "i3c{}: xfer to {:#04x} failed: {err:?}",
                        self.device_id, xfer.addr
                    ));
                    return Err(err.into());
                }
                _ => core::hint::spin_loop(),
            }
        }
    }

    fn transfer(&mut self, mut xfer: HalXfer<'_>) -> Result<(), Error> {
        match (self.xfer_mode, xfer.kind) {
            (
                Stm32XferMode::Dma {
                    engine,
                    irq_priority,
                },
                XferKind::I3cPrivate | XferKind::I2cPrivate,
            ) => self.transfer_dma(engine, irq_priority, &mut xfer),
            _ => {
                self.hal.start_xfer_it(&xfer)?;
                self.wait_ready(&mut xfer)
            }
        }
    }

    fn transfer_dma(
        &mut self,
        engine: &dyn DmaEngine,
        irq_priority: u32,
        xfer: &mut HalXfer<'_>,
    ) -> Result<(), Error> {
        let mut chans: Vec<usize, 2> = Vec::new();
        let result = self.run_dma(engine, irq_priority, xfer, &mut chans);
        for ch in chans {
            if result.is_err() {
                if let Err(err) = engine.xfer_abort(ch) {
                    self.logger.error(format_args!(
                        "i3c{}: dma ch{ch} abort failed: {err}",
                        self.device_id
                    ));
                }
            }
            if let Err(err) = engine.release_channel(ch) {
                self.logger.error(format_args!(
                    "i3c{}: dma ch{ch} release failed: {err}",
                    self.device_id
                ));
            }
        }
        result
    }

    fn run_dma(
        &mut self,
        engine: &dyn DmaEngine,
        irq_priority: u32,
        xfer: &mut HalXfer<'_>,
        chans: &mut Vec<usize, 2>,
    ) -> Result<(), Error> {
        if !xfer.tx.is_empty() {
            let desc = DmaXfer::new(
                xfer.tx.as_ptr() as usize,
                self.hal.tx_fifo_addr(),
                xfer.tx.len(),
                DmaXferType::MemToDev,
                Peripheral::I3c,
            )
            .with_irq_priority(irq_priority);
            chans
                .push(self.queue_dma(engine, &desc)?)
                .map_err(|_| Error::OutOfMemory)?;
        }
        if !xfer.rx.is_empty() {
            let desc = DmaXfer::new(
                self.hal.rx_fifo_addr(),
                xfer.rx.as_mut_ptr() as usize,
                xfer.rx.len(),
                DmaXferType::DevToMem,
                Peripheral::I3c,
            )
            .with_irq_priority(irq_priority);
            chans
                .push(self.queue_dma(engine, &desc)?)
                .map_err(|_| Error::OutOfMemory)?;
        }

        for ch in chans.iter() {
            engine.xfer_start(*ch)?;
        }
        self.hal.start_xfer_dma(xfer)?;
        self.wait_ready(xfer)?;
        for ch in chans.iter() {
            while !engine.is_completed(*ch)? {
                engine.sg_complete(*ch)?;
            }
        }
        Ok(())
    }

    fn queue_dma(&self, engine: &dyn DmaEngine, desc: &DmaXfer) -> Result<usize, Error> {
        let ch = engine.acquire_channel()?;
        if let Err(err) = engine.config_xfer(ch, core::slice::from_ref(desc)) {
            if let Err(rel) = engine.release_channel(ch) {
                self.logger.error(format_args!(
                    "i3c{}: dma ch{ch} release failed: {rel}",
                    self.device_id
                ));
            }
            return Err(err);
        }
        Ok(ch)
    }
}

const fn private_kind(target: &I3cTarget) -> XferKind {
    if target.is_i3c {
        XferKind::I3cPrivate
    } else {
        XferKind::I2cPrivate
    }
}

impl<'d, H, L> I3cPlatform for Stm32I3c<'d, H, L>
where
    H: Stm32I3cHal + Clone,
    L: Logger + Clone,
{
    type Config = Stm32I3cConfig<'d, H, L>;

    fn init_bus(config: &Self::Config, device_id: u8) -> Result<Self, Error> {
        let mut hal = config.hal.clone();
        hal.init(&config.timing)?;
        config.logger.debug(format_args!(
            "i3c{device_id}: sdr {} Hz, i2c {} Hz",
            config.timing.sdr_freq.raw(),
            config.timing.i2c_freq.raw()
        ));
        Ok(Self {
            hal,
            device_id,
            xfer_mode: config.xfer_mode,
            logger: config.logger.clone(),
        })
    }

    fn remove_bus(&mut self) -> Result<(), Error> {
        Ok(self.hal.deinit()?)
    }

    fn init_device(&mut self, slot: usize, target: &I3cTarget) -> Result<(), Error> {
        if !target.is_i3c || slot >= STM32_I3C_DEVR_COUNT {
            return Ok(());
        }
        let entry = HalTargetEntry {
            addr: target.addr,
            ibi_ack: true,
            ibi_payload: true,
            ctrl_role_ack: false,
        };
        Ok(self.hal.config_target(slot, &entry)?)
    }

    fn remove_device(&mut self, slot: usize, target: &I3cTarget) -> Result<(), Error> {
        if !target.is_i3c || slot >= STM32_I3C_DEVR_COUNT {
            return Ok(());
        }
        let entry = HalTargetEntry {
            addr: 0,
            ibi_ack: false,
            ibi_payload: false,
            ctrl_role_ack: false,
        };
        Ok(self.hal.config_target(slot, &entry)?)
    }

    fn is_dev_ready(&mut self, _slot: usize, target: &I3cTarget) -> Result<(), Error> {
        if self.hal.is_device_ready(target.addr, target.is_i3c)? {
            Ok(())
        } else {
            Err(Error::Io)
        }
    }

    fn do_daa(&mut self, daa: &mut DaaContext<'_>, rstdaa: bool) -> Result<(), Error> {
        self.hal.start_daa(rstdaa)?;
        loop {
            if let Some(raw) = self.hal.daa_request() {
                let req = DaaRequest::read_from_bytes(&raw).map_err(|_| Error::Fault)?;
                let pid = req.pid();
                let hal = &mut self.hal;
                let assigned = daa.assign_with(pid, req.bcr, req.dcr, |addr| {
                    hal.set_dynamic_addr(addr).map_err(Error::from)
                });
                let addr = match assigned {
                    Ok(addr) => addr,
                    Err(err) => {
                        self.logger.error(format_args!(
                            "i3c{}: daa stopped at pid {pid:#014x}: {err}",
                            self.device_id
                        ));
                        if let Err(abort) = self.hal.abort() {
                            self.logger.error(format_args!(
                                "i3c{}: daa abort failed: {abort:?}",
                                self.device_id
                            ));
                        }
                        return Err(err);
                    }
                };
                self.logger.debug(format_args!(
                    "i3c{}: pid {pid:#014x} -> {addr:#04x}",
                    self.device_id
                ));
                continue;
            }
            match self.hal.state() {
                HalState::Ready => return Ok(()),
                HalState::Error => return Err(self.hal.last_error().into()),
                _ => core::hint::spin_loop(),
            }
        }
    }

    fn send_ccc(&mut self, ccc: &mut CccTransfer<'_>) -> Result<(), Error> {
        let kind = XferKind::Ccc {
            id: ccc.ccc.id(),
            def_byte: ccc.ccc.has_def_byte(),
        };
        let xfer = if ccc.ccc.is_read() {
            HalXfer {
                addr: ccc.addr,
                kind,
                tx: &[],
                rx: &mut *ccc.data,
            }
        } else {
            HalXfer {
                addr: ccc.addr,
                kind,
                tx: &*ccc.data,
                rx: &mut [],
            }
        };
        self.transfer(xfer)
    }

    fn write(&mut self, target: &I3cTarget, data: &[u8]) -> Result<(), Error> {
        self.transfer(HalXfer {
            addr: target.addr,
            kind: private_kind(target),
            tx: data,
            rx: &mut [],
        })
    }

    fn read(&mut self, target: &I3cTarget, data: &mut [u8]) -> Result<(), Error> {
        self.transfer(HalXfer {
            addr: target.addr,
            kind: private_kind(target),
            tx: &[],
            rx: data,
        })
    }

    fn write_and_read(&mut self, target: &I3cTarget, tx: &[u8], rx: &mut [u8]) -> Result<(), Error> {
        self.transfer(HalXfer {
            addr: target.addr,
            kind: private_kind(target),
            tx,
            rx,
        })
    }

    fn conf_irq(&mut self, events: u32, enable: bool) -> Result<(), Error> {
        Ok(self.hal.notifications(events, enable)?)
    }

    fn get_ccc_info(&mut self, events: u32) -> Result<CccInfo, Error> {
        Ok(self.hal.ccc_info(events)?)
    }
}
