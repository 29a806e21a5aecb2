// Licensed under the Apache-2.0 license

//! Bus bring-up through device removal against the generic mock backend.

use crate::common::{Logger, NoOpLogger};
use crate::error::Error;
use crate::i3c::{
    ccc, AddrStatus, I3cBusInitParam, I3cBusRegistry, I3cDevice, I3cInitParam, I3cTarget,
};
use crate::tests::mock::{MockI3c, MockI3cConfig, RecordingLogger};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

type Registry<L> = I3cBusRegistry<MockI3c, CriticalSectionRawMutex, L>;

const DEV_A: I3cTarget = I3cTarget::static_i3c(0x0000_0000_00aa, 0x10);
const DEV_B: I3cTarget = I3cTarget::dynamic(0x1234, 0x20);
const DEV_C: I3cTarget = I3cTarget::i2c(0x50);
const DEVS: [I3cTarget; 3] = [DEV_A, DEV_B, DEV_C];

fn config() -> MockI3cConfig {
    MockI3cConfig {
        responders: vec![(0x1234, 0x06, 0xc6)],
        ..MockI3cConfig::default()
    }
}

#[test]
fn run_i3c_bus_tests() {
    let log = RecordingLogger::default();
    log.debug(format_args!("=== I3C bus tests ==="));

    test_bring_up_and_attach(&log);
    test_undeclared_target_rejected(&log);
    test_bus_outlives_devices(&log);

    log.debug(format_args!("=== All I3C bus tests passed ==="));
    assert!(log.contains("All I3C bus tests passed"));
}

fn test_bring_up_and_attach(log: &RecordingLogger) {
    log.debug(format_args!("bring-up and attach"));
    let cfg = config();
    let reg = Registry::new(log.clone());
    let bus_param = I3cBusInitParam {
        device_id: 1,
        devs: &DEVS,
        config: cfg.clone(),
    };

    let a = I3cDevice::init(&reg, &I3cInitParam { bus: &bus_param, target: DEV_A }).unwrap();
    let b = I3cDevice::init(&reg, &I3cInitParam { bus: &bus_param, target: DEV_B }).unwrap();
    let c = I3cDevice::init(&reg, &I3cInitParam { bus: &bus_param, target: DEV_C }).unwrap();
    let bus = a.bus();

    assert_eq!(a.addr(), 0x10);
    assert_eq!(bus.addr_get_status(0x10), AddrStatus::I3cDev);

    assert_eq!(b.addr(), 0x20);
    assert!(bus.daa_candidate(0x1234).unwrap().is_attached);
    assert_eq!((b.bcr(), b.dcr()), (0x06, 0xc6));
    assert_eq!(bus.addr_get_status(0x20), AddrStatus::I3cDev);

    assert_eq!(c.addr(), 0x50);
    assert_eq!(bus.addr_get_status(0x50), AddrStatus::I2cDev);
    assert_eq!(bus.device_count(), 3);

    {
        let l = cfg.log();
        let sent: std::vec::Vec<_> = l.ccc.iter().map(|(addr, ccc, _)| (*addr, *ccc)).collect();
        assert_eq!(
            sent,
            [(0x7e, ccc::RSTACT_BCAST), (0x7e, ccc::SETAASA)]
        );
        assert_eq!(l.daa, [true]);
        assert_eq!(l.assigned, [(0x1234, 0x20)]);
    }

    b.enable_events(ccc::EVENT_INT).unwrap();
    c.write(&[0x01, 0x02]).unwrap();
    assert_eq!(cfg.log().writes, [(0x50, vec![0x01, 0x02])]);
    assert!(log.contains("i3c1: up, 3 targets declared"));
}

fn test_undeclared_target_rejected(log: &RecordingLogger) {
    log.debug(format_args!("undeclared target"));
    let cfg = config();
    let reg = Registry::new(NoOpLogger);
    let bus_param = I3cBusInitParam {
        device_id: 2,
        devs: &DEVS,
        config: cfg.clone(),
    };
    let stranger = I3cTarget::dynamic(0x9999, 0x30);

    let err = I3cDevice::init(&reg, &I3cInitParam { bus: &bus_param, target: stranger });
    assert_eq!(err.err(), Some(Error::Fault));

    // The bus stays up for well-formed descriptors.
    let bus = reg.get(2).unwrap();
    assert_eq!(bus.device_count(), 0);
    assert!(I3cDevice::init(&reg, &I3cInitParam { bus: &bus_param, target: DEV_B }).is_ok());
}

fn test_bus_outlives_devices(log: &RecordingLogger) {
    log.debug(format_args!("bus teardown"));
    let cfg = config();
    let mut reg = Registry::new(NoOpLogger);
    let bus_param = I3cBusInitParam {
        device_id: 3,
        devs: &DEVS,
        config: cfg.clone(),
    };

    let dev = I3cDevice::init(&reg, &I3cInitParam { bus: &bus_param, target: DEV_C }).unwrap();
    let slot = dev.slot();
    dev.remove().unwrap();
    assert_eq!(cfg.log().removed_devices, [slot]);
    assert_eq!(cfg.log().removed_bus, 0);

    reg.remove_bus(3).unwrap();
    assert_eq!(cfg.log().removed_bus, 1);
    assert!(reg.get(3).is_none());
}
