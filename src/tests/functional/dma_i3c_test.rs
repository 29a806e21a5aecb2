// Licensed under the Apache-2.0 license

//! STM32 backend in DMA mode, with a second thread raising DMA channel
//! interrupts the whole time, the way a pending completion interrupt would
//! fire as soon as the bus lock is released.

use crate::common::NoOpLogger;
use crate::dma::{DmaController, DmaInitParam, DmaXferType};
use crate::i3c::stm32_i3c::{Stm32I3c, Stm32I3cConfigBuilder};
use crate::i3c::{I3cBus, I3cBusInitParam, I3cDevice, I3cTarget};
use crate::irq::{IrqEvent, IrqSource, Peripheral};
use crate::tests::mock::{MockDma, MockHal, MockIrq, SimTarget, SIM_RX_FIFO, SIM_TX_FIFO};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

type Ctrl<'a> = DmaController<'a, MockDma, CriticalSectionRawMutex, NoOpLogger, 4, 3>;
type Bus<'d> = I3cBus<Stm32I3c<'d, MockHal>, CriticalSectionRawMutex>;
type Device<'b, 'd> = I3cDevice<'b, Stm32I3c<'d, MockHal>, CriticalSectionRawMutex>;

const NUM_CH: usize = 2;
const IRQS: [u32; NUM_CH] = [40, 41];
const SENSOR_PID: u64 = 0x0204_0000_0001;
const DEVS: [I3cTarget; 2] = [I3cTarget::i2c(0x50), I3cTarget::dynamic(SENSOR_PID, 0x20)];

struct StopOnDrop<'a>(&'a AtomicBool);

impl Drop for StopOnDrop<'_> {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

const fn source(ch: usize, event: IrqEvent) -> IrqSource {
    IrqSource {
        peripheral: Peripheral::I3c,
        handle: ch,
        event,
    }
}

#[test]
fn run_dma_i3c_tests() {
    let irq = MockIrq::default();
    let dma = Ctrl::new(MockDma::default(), Some(&irq), NoOpLogger);
    dma.init(&DmaInitParam {
        id: 1,
        num_ch: NUM_CH,
        irq_nums: &IRQS,
        sg_handler: None,
    })
    .unwrap();

    let hal = MockHal::with_targets(vec![
        SimTarget::i2c(0x50),
        SimTarget::i3c(SENSOR_PID, 0x06, 0xc6),
    ]);
    let config = Stm32I3cConfigBuilder::new(hal.clone())
        .dma(&dma, 3)
        .build()
        .unwrap();
    let bus = Bus::init(
        &I3cBusInitParam {
            device_id: 1,
            devs: &DEVS,
            config,
        },
        NoOpLogger,
    )
    .unwrap();

    let done = AtomicBool::new(false);
    let raised = AtomicUsize::new(0);
    thread::scope(|s| {
        s.spawn(|| {
            while !done.load(Ordering::Acquire) {
                for ch in 0..NUM_CH {
                    dma.on_irq(ch);
                }
                raised.fetch_add(1, Ordering::Relaxed);
                thread::yield_now();
            }
        });
        let _stop = StopOnDrop(&done);

        let eeprom = Device::attach(&bus, &DEVS[0]).unwrap();
        let sensor = Device::attach(&bus, &DEVS[1]).unwrap();
        assert_eq!(sensor.addr(), 0x20);

        test_combined_transfer(&eeprom, &dma, &irq);
        test_ccc_bypasses_dma(&sensor, &dma);
        test_channels_are_reused(&sensor, &dma, &irq);
        test_late_interrupts_are_ignored(&sensor, &dma, &raised);

        sensor.remove().unwrap();
        eeprom.remove().unwrap();
    });

    assert_eq!(hal.sim().xfers.iter().filter(|x| x.3).count(), 5);
    assert!(dma.platform().state().aborted.is_empty());
    dma.remove().unwrap();
    let st = irq.state();
    assert!(st.registered.is_empty());
}

fn test_combined_transfer(dev: &Device<'_, '_>, dma: &Ctrl<'_>, irq: &MockIrq) {
    let tx = [0x00, 0x10];
    let mut rx = [0u8; 2];
    dev.write_and_read(&tx, &mut rx).unwrap();
    assert_eq!(rx, tx);

    let st = dma.platform().state();
    assert_eq!(st.programmed.len(), 2);
    let (_, tx_desc) = st.programmed[0];
    assert_eq!((tx_desc.dst, tx_desc.xfer_type), (SIM_TX_FIFO, DmaXferType::MemToDev));
    let (_, rx_desc) = st.programmed[1];
    assert_eq!((rx_desc.src, rx_desc.xfer_type), (SIM_RX_FIFO, DmaXferType::DevToMem));
    assert_eq!(st.released, [0, 1]);
    drop(st);
    for ch in 0..NUM_CH {
        assert!(dma.is_completed(ch).unwrap());
        assert!(dma.channel(ch).unwrap().is_free());
    }

    let st = irq.state();
    assert!(!st.enabled.contains(&40) && !st.enabled.contains(&41));
    assert_eq!(
        st.registered,
        [
            (40, source(0, IrqEvent::DmaTxComplete)),
            (41, source(1, IrqEvent::DmaRxComplete)),
        ]
    );
    assert_eq!(st.priorities.get(&40), Some(&3));
}

fn test_ccc_bypasses_dma(dev: &Device<'_, '_>, dma: &Ctrl<'_>) {
    let before = dma.platform().state().programmed.len();
    assert_eq!(dev.get_pid(), Ok(SENSOR_PID));
    assert_eq!(dev.get_bcr(), Ok(0x06));
    assert_eq!(dma.platform().state().programmed.len(), before);
}

fn test_channels_are_reused(dev: &Device<'_, '_>, dma: &Ctrl<'_>, irq: &MockIrq) {
    dev.write(&[0xc0, 0xff, 0xee]).unwrap();
    let mut rx = [0u8; 3];
    dev.read(&mut rx).unwrap();
    assert_eq!(rx, [0xc0, 0xff, 0xee]);

    let st = dma.platform().state();
    let channels: std::vec::Vec<usize> = st.programmed.iter().skip(2).map(|(ch, _)| *ch).collect();
    assert_eq!(channels, [0, 0]);
    assert!(dma.channel(0).unwrap().is_free());
    drop(st);

    // ch0 now carries the receive completion; ch1 still holds its earlier one.
    let st = irq.state();
    assert_eq!(
        st.registered,
        [
            (41, source(1, IrqEvent::DmaRxComplete)),
            (40, source(0, IrqEvent::DmaRxComplete)),
        ]
    );
}

fn test_late_interrupts_are_ignored(dev: &Device<'_, '_>, dma: &Ctrl<'_>, raised: &AtomicUsize) {
    // Let the interrupt thread get a few rounds in on the idle channels.
    let seen = raised.load(Ordering::Relaxed);
    while raised.load(Ordering::Relaxed) < seen + 3 {
        thread::yield_now();
    }
    let started = dma.platform().state().started.len();
    assert!(dma.platform().state().aborted.is_empty());

    dev.write(&[0x5a]).unwrap();
    let mut rx = [0u8; 1];
    dev.read(&mut rx).unwrap();
    assert_eq!(rx, [0x5a]);
    assert_eq!(dma.platform().state().started.len(), started + 2);
    assert!(dma.channel(0).unwrap().is_free());
}
