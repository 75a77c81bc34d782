use rawhid::backends::simulated::{SimulatedBus, SimulatedDevice};
use rawhid::{strip_nulls, Connection, HidBackend, HidError, MatchCriteria, Status};
use std::thread;
use std::time::{Duration, Instant};

/// Slack allowed on top of a timeout before a test calls it late.
const EPSILON: Duration = Duration::from_millis(500);

fn debug_interface() -> MatchCriteria {
    MatchCriteria::new(0, 0, 0xff31, 0x0074)
}

#[test]
fn dont_care_fields_never_affect_the_outcome() {
    let variants = [0x0001u16, 0x16c0, 0xff31, 0xffff];

    // Usage page and usage fixed; vendor and product ignored.
    for vid in variants {
        for pid in variants {
            let bus = SimulatedBus::new();
            bus.plug(SimulatedDevice::new(vid, pid).with_usage(0xff31, 0x74));
            assert!(
                bus.open_first_match(&debug_interface()).is_ok(),
                "{vid:04x}:{pid:04x} should match"
            );
        }
    }

    // Vendor fixed; everything else ignored, including missing usage data.
    let criteria = MatchCriteria::any().vendor_id(0x16c0);
    for up in variants {
        for usage in variants {
            let bus = SimulatedBus::new();
            bus.plug(SimulatedDevice::new(0x16c0, 0x0479).with_usage(up, usage));
            assert!(bus.open_first_match(&criteria).is_ok());
        }
    }
    let bus = SimulatedBus::new();
    bus.plug(SimulatedDevice::new(0x16c0, 0x0479));
    assert!(bus.open_first_match(&criteria).is_ok());
}

#[test]
fn specified_fields_must_all_match() {
    let bus = SimulatedBus::new();
    bus.plug(SimulatedDevice::new(0x16c0, 0x0479).with_usage(0xff31, 0x75));
    // Device without usage data never satisfies a usage constraint.
    bus.plug(SimulatedDevice::new(0x16c0, 0x0479));
    assert_eq!(
        bus.open_first_match(&debug_interface()).unwrap_err(),
        HidError::NotFound
    );
}

#[test]
fn empty_inventory_is_not_found() {
    let bus = SimulatedBus::new();
    assert!(bus.is_empty());
    let err = bus.open_first_match(&MatchCriteria::any()).unwrap_err();
    assert_eq!(err, HidError::NotFound);
    assert!(err.is_not_found());
}

#[test]
fn match_is_found_in_any_position() {
    for matching_first in [true, false] {
        let bus = SimulatedBus::new();
        let wanted = SimulatedDevice::new(0x16c0, 0x0486).with_usage(0xff31, 0x74);
        let other = SimulatedDevice::new(0x046d, 0xc52b).with_usage(0x0001, 0x0006);
        let handle = if matching_first {
            let h = bus.plug(wanted);
            bus.plug(other);
            h
        } else {
            bus.plug(other);
            bus.plug(wanted)
        };

        let conn = bus.open_first_match(&debug_interface()).unwrap();
        assert_eq!(conn.attributes(), handle.attributes());
        assert!(handle.is_open());
    }
}

#[test]
fn candidates_that_fail_to_open_are_skipped() {
    let bus = SimulatedBus::new();
    bus.plug(
        SimulatedDevice::new(0x16c0, 0x0001)
            .with_usage(0xff31, 0x74)
            .failing_open(),
    );
    let good = bus.plug(SimulatedDevice::new(0x16c0, 0x0002).with_usage(0xff31, 0x74));

    let conn = bus.open_first_match(&debug_interface()).unwrap();
    assert_eq!(conn.attributes().product_id, 0x0002);
    assert!(good.is_open());
}

#[test]
fn resource_exhaustion_is_distinguishable() {
    let bus = SimulatedBus::new();
    bus.plug(
        SimulatedDevice::new(0x16c0, 0x0479)
            .with_usage(0xff31, 0x74)
            .exhausting_resources(),
    );
    bus.plug(SimulatedDevice::new(0x046d, 0xc52b).with_usage(0x0001, 0x0006));

    let err = bus.open_first_match(&debug_interface()).unwrap_err();
    assert!(matches!(err, HidError::Unavailable(_)), "got {err:?}");
    // Pollers still treat it as "try again later".
    assert!(err.is_not_found());

    // A later candidate that opens still wins.
    let good = bus.plug(SimulatedDevice::new(0x16c0, 0x0486).with_usage(0xff31, 0x74));
    let conn = bus.open_first_match(&debug_interface()).unwrap();
    assert_eq!(conn.attributes(), good.attributes());
}

#[test]
fn read_times_out_with_zero_bytes() {
    let bus = SimulatedBus::new();
    bus.plug(SimulatedDevice::new(1, 2));
    let mut conn = bus.open_first_match(&MatchCriteria::any()).unwrap();

    let timeout = Duration::from_millis(100);
    let mut buf = [0u8; 64];
    let start = Instant::now();
    assert_eq!(conn.read(&mut buf, timeout), Ok(0));
    let elapsed = start.elapsed();
    assert!(elapsed >= timeout, "returned early after {elapsed:?}");
    assert!(elapsed < timeout + EPSILON, "returned late after {elapsed:?}");

    // A timeout is not a disconnect.
    assert_eq!(conn.status(), Status::Online);
}

#[test]
fn pending_report_returns_immediately() {
    let bus = SimulatedBus::new();
    let dev = bus.plug(SimulatedDevice::new(1, 2));
    let mut conn = bus.open_first_match(&MatchCriteria::any()).unwrap();
    dev.send_report(b"ready");

    let mut buf = [0u8; 64];
    let start = Instant::now();
    assert_eq!(conn.read(&mut buf, Duration::from_secs(10)), Ok(5));
    assert!(start.elapsed() < EPSILON);
    assert_eq!(&buf[..5], b"ready");
}

#[test]
fn report_arriving_during_read_is_returned() {
    let bus = SimulatedBus::new();
    let dev = bus.plug(SimulatedDevice::new(1, 2));
    let mut conn = bus.open_first_match(&MatchCriteria::any()).unwrap();

    let sender = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        dev.send_report(b"late");
    });

    let mut buf = [0u8; 64];
    let start = Instant::now();
    assert_eq!(conn.read(&mut buf, Duration::from_secs(5)), Ok(4));
    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(&buf[..4], b"late");
    sender.join().unwrap();
}

#[test]
fn removal_during_blocked_read_disconnects_for_good() {
    let bus = SimulatedBus::new();
    let dev = bus.plug(SimulatedDevice::new(1, 2));
    let mut conn = bus.open_first_match(&MatchCriteria::any()).unwrap();

    let unplugger = {
        let dev = dev.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            dev.unplug();
        })
    };

    let timeout = Duration::from_secs(2);
    let mut buf = [0u8; 64];
    let start = Instant::now();
    assert_eq!(conn.read(&mut buf, timeout), Err(HidError::Disconnected));
    assert!(start.elapsed() < timeout + EPSILON);
    unplugger.join().unwrap();

    // No resurrection, not even when the same device shows up again.
    dev.send_report(b"ghost");
    bus.plug(SimulatedDevice::new(1, 2)).send_report(b"new");
    assert_eq!(conn.read(&mut buf, Duration::ZERO), Err(HidError::Disconnected));
    assert_eq!(conn.write(&[0, 1], Duration::ZERO), Err(HidError::Disconnected));
    assert_eq!(conn.status(), Status::Offline);
}

#[test]
fn short_write_is_an_error() {
    let bus = SimulatedBus::new();
    let dev = bus.plug(SimulatedDevice::new(1, 2).accepting_at_most(3));
    let mut conn = bus.open_first_match(&MatchCriteria::any()).unwrap();

    let report = [0u8, 1, 2, 3, 4, 5, 6, 7];
    assert_eq!(
        conn.write(&report, Duration::from_millis(100)),
        Err(HidError::ShortWrite {
            written: 3,
            expected: 8
        })
    );
    // The device only saw the accepted prefix.
    assert_eq!(dev.written(), vec![vec![0u8, 1, 2]]);

    // A report that fits goes through whole.
    assert_eq!(conn.write(&[0, 9, 9], Duration::from_millis(100)), Ok(()));
}

#[test]
fn write_reaches_device() {
    let bus = SimulatedBus::new();
    let dev = bus.plug(SimulatedDevice::new(1, 2));
    let mut conn = bus.open_first_match(&MatchCriteria::any()).unwrap();

    let mut report = vec![0u8; 65];
    report[1..6].copy_from_slice(b"hello");
    assert_eq!(conn.write(&report, Duration::from_millis(100)), Ok(()));
    assert_eq!(dev.written(), vec![report]);
}

#[test]
fn close_after_disconnect_releases_once() {
    let bus = SimulatedBus::new();
    let dev = bus.plug(SimulatedDevice::new(1, 2));
    let mut conn = bus.open_first_match(&MatchCriteria::any()).unwrap();

    dev.unplug();
    let mut buf = [0u8; 8];
    assert_eq!(conn.read(&mut buf, Duration::ZERO), Err(HidError::Disconnected));
    assert_eq!(dev.releases(), 0);

    // `close` consumes the connection; a second call does not compile.
    conn.close();
    assert_eq!(dev.releases(), 1);
    assert!(!dev.is_open());
}

#[test]
fn open_then_close_releases() {
    let bus = SimulatedBus::new();
    let dev = bus.plug(SimulatedDevice::new(1, 2));

    bus.open_first_match(&MatchCriteria::any()).unwrap().close();
    assert_eq!(dev.releases(), 1);

    // Dropping without an explicit close releases as well.
    drop(bus.open_first_match(&MatchCriteria::any()).unwrap());
    assert_eq!(dev.releases(), 2);
}

#[test]
fn status_follows_presence() {
    let bus = SimulatedBus::new();
    let dev = bus.plug(SimulatedDevice::new(1, 2));
    let mut conn = bus.open_first_match(&MatchCriteria::any()).unwrap();

    assert_eq!(conn.status(), Status::Online);
    dev.unplug();
    assert_eq!(conn.status(), Status::Offline);
    assert_eq!(conn.status(), Status::Offline);
}

#[test]
fn debug_interface_end_to_end() {
    let bus = SimulatedBus::new();
    bus.plug(SimulatedDevice::new(0x046d, 0xc52b).with_usage(0x0001, 0x0002));
    let dev = bus.plug(SimulatedDevice::new(0xff31, 0x0000).with_usage(0xff31, 0x0074));

    let mut conn = bus
        .open_first_match(&MatchCriteria::new(0, 0, 0xff31, 0x0074))
        .unwrap();
    assert_eq!(conn.attributes().vendor_id, 0xff31);

    let mut report = [0u8; 64];
    report[..6].copy_from_slice(b"H\0i\0!\n");
    report[20..24].copy_from_slice(b"\0ok\0");
    dev.send_report(&report);

    let mut buf = [0u8; 64];
    let n = conn.read(&mut buf, Duration::from_millis(200)).unwrap();
    assert_eq!(n, 64);
    assert_eq!(strip_nulls(&buf[..n]), b"Hi!\nok");
}

#[test]
fn descriptor_signature_end_to_end() {
    // No capability data; the device is recognised by its descriptor prefix.
    let descriptor = hex::decode("0631ff0974a1010975150026ff00950875018102c0").unwrap();
    let mouse = hex::decode("05010902a101").unwrap();
    let bus = SimulatedBus::new();
    bus.plug(SimulatedDevice::new(0x16c0, 0x0479).with_descriptor(&mouse));
    let dev = bus.plug(SimulatedDevice::new(0x16c0, 0x0479).with_descriptor(&descriptor));

    let conn = bus.open_first_match(&debug_interface()).unwrap();
    assert_eq!(conn.attributes(), dev.attributes());
}

#[test]
fn not_found_until_plugged() {
    let bus = SimulatedBus::new();
    let criteria = debug_interface();
    let poll = Duration::from_millis(20);

    let plugger = {
        let bus = bus.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            bus.plug(SimulatedDevice::new(0x16c0, 0x0479).with_usage(0xff31, 0x74))
        })
    };

    let mut misses = 0;
    let conn = loop {
        match bus.open_first_match(&criteria) {
            Ok(conn) => break conn,
            Err(e) => {
                assert_eq!(e, HidError::NotFound);
                misses += 1;
                assert!(misses < 500, "device never showed up");
                thread::sleep(poll);
            }
        }
    };
    let dev = plugger.join().unwrap();
    assert!(misses >= 1);
    assert_eq!(conn.attributes(), dev.attributes());
}
