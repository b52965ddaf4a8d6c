//! End-to-end transaction sequences, driven through the host model.

use usb_device::UsbDirection;
use usb_eptri::sim::{Handshake, Host};
use usb_eptri::{EndpointEngine, Stage, UsbCsr, UsbEvents};

const GET_DESCRIPTOR: [u8; 8] = [0x80, 0x06, 0x00, 0x01, 0x00, 0x00, 0x12, 0x00];
const SET_ADDRESS_5: [u8; 8] = [0x00, 0x05, 0x05, 0x00, 0x00, 0x00, 0x00, 0x00];

fn device() -> (Host, UsbCsr) {
    let (engine, csr) = EndpointEngine::new();
    csr.enable_endpoint(UsbDirection::In, 0, true);
    csr.enable_endpoint(UsbDirection::Out, 0, true);
    (Host::new(engine), csr)
}

#[test]
fn get_descriptor_control_read() {
    let (mut host, csr) = device();

    assert_eq!(host.setup(0, GET_DESCRIPTOR), Handshake::Ack);
    assert_eq!(host.engine().stage(), Stage::ControlIn);
    assert!(csr.setup_status().have());
    assert_eq!(csr.setup_status().epno(), 0);

    // data stage is held off until the request is read out
    let (hs, data, _) = host.in_transfer(0);
    assert_eq!(hs, Handshake::Nak);
    assert!(data.is_empty());

    let record = csr.setup_drain();
    assert_eq!(record.len(), 10);
    assert_eq!(&record[..8], &GET_DESCRIPTOR);

    // first 8 descriptor bytes
    let chunk_a = [0x12u8, 0x01, 0x00, 0x02, 0x00, 0x00, 0x00, 0x40];
    for &b in chunk_a.iter() {
        assert!(csr.in_data(b));
    }
    csr.in_arm(0);
    let (hs, data, toggle) = host.in_transfer(0);
    assert_eq!(hs, Handshake::Ack);
    assert_eq!(data, chunk_a);
    assert!(toggle, "control data stage starts on DATA1");
    assert!(csr.in_status().idle());

    // remaining 10 bytes, toggle flipped
    let chunk_b = [0x09u8, 0x12, 0x34, 0x56, 0x00, 0x01, 0x02, 0x03, 0x01, 0x01];
    for &b in chunk_b.iter() {
        assert!(csr.in_data(b));
    }
    csr.in_arm(0);
    let (hs, data, toggle) = host.in_transfer(0);
    assert_eq!(hs, Handshake::Ack);
    assert_eq!(data, chunk_b);
    assert!(!toggle);

    // host's zero-length status packet closes the transfer
    assert_eq!(host.out_transfer(0, &[]), Handshake::Ack);
    assert_eq!(host.engine().stage(), Stage::Idle);
}

#[test]
fn set_address_takes_effect_after_status() {
    let (mut host, csr) = device();
    assert_eq!(host.device_address(), 0);

    assert_eq!(host.setup(0, SET_ADDRESS_5), Handshake::Ack);
    assert_eq!(host.engine().stage(), Stage::WaitControlAckOut);

    // status IN is NAKed until the request is read out
    let (hs, _, _) = host.in_transfer(0);
    assert_eq!(hs, Handshake::Nak);

    csr.setup_drain();
    csr.set_address(5);

    let (hs, data, toggle) = host.in_transfer(0);
    assert_eq!(hs, Handshake::Ack);
    assert!(data.is_empty());
    assert!(toggle, "status packet is DATA1");
    assert_eq!(host.engine().stage(), Stage::Idle);
    assert_eq!(host.device_address(), 5);
}

#[test]
fn zero_length_in_request_holds_status_until_drain() {
    let (mut host, csr) = device();
    // device-to-host request with wLength 0: no data stage, status is OUT
    let request = [0xA0u8, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
    assert_eq!(host.setup(0, request), Handshake::Ack);
    assert_eq!(host.engine().stage(), Stage::WaitControlAckIn);

    assert_eq!(host.out_transfer(0, &[]), Handshake::Nak);
    assert_eq!(host.engine().stage(), Stage::WaitControlAckIn);

    let record = csr.setup_drain();
    assert_eq!(&record[..8], &request);

    assert_eq!(host.out_transfer(0, &[]), Handshake::Ack);
    assert_eq!(host.engine().stage(), Stage::Idle);
}

#[test]
fn disabled_endpoint_stalls_despite_queued_data() {
    let (mut host, csr) = device();

    csr.in_data(0xAA);
    csr.in_arm(1);
    let (hs, data, _) = host.in_transfer(1);
    assert_eq!(hs, Handshake::Stall);
    assert!(data.is_empty());

    csr.enable_endpoint(UsbDirection::In, 1, true);
    let (hs, data, _) = host.in_transfer(1);
    assert_eq!(hs, Handshake::Ack);
    assert_eq!(data, [0xAA]);
}

#[test]
fn setup_mid_transfer_supersedes_control_sequence() {
    let (mut host, csr) = device();

    assert_eq!(host.setup(0, GET_DESCRIPTOR), Handshake::Ack);
    assert_eq!(host.engine().stage(), Stage::ControlIn);

    // the host abandons the transfer; the unread record is discarded and
    // the new one captured
    assert_eq!(host.setup(0, SET_ADDRESS_5), Handshake::Ack);
    assert_eq!(host.engine().stage(), Stage::WaitControlAckOut);
    let record = csr.setup_drain();
    assert_eq!(&record[..8], &SET_ADDRESS_5);
}

#[test]
fn single_in_transfer_in_flight() {
    let (mut host, csr) = device();
    csr.enable_endpoint(UsbDirection::In, 1, true);
    csr.enable_endpoint(UsbDirection::In, 2, true);

    csr.in_data(0x11);
    csr.in_data(0x22);
    csr.in_arm(1);
    assert!(!csr.in_status().idle());

    // queued for endpoint 1; endpoint 2 has nothing to say
    let (hs, _, _) = host.in_transfer(2);
    assert_eq!(hs, Handshake::Nak);

    let (hs, data, _) = host.in_transfer(1);
    assert_eq!(hs, Handshake::Ack);
    assert_eq!(data, [0x11, 0x22]);
    assert!(csr.in_status().idle());

    // nothing left queued
    let (hs, _, _) = host.in_transfer(1);
    assert_eq!(hs, Handshake::Nak);
}

#[test]
fn out_acceptance_rearms_per_control_write() {
    let (mut host, csr) = device();
    csr.enable_endpoint(UsbDirection::Out, 2, true);
    csr.out_enable(true);

    let payload = [0xDEu8, 0xAD, 0xBE, 0xEF];
    assert_eq!(host.out_transfer(2, &payload), Handshake::Ack);
    let status = csr.out_status();
    assert!(status.have());
    assert!(status.idle());
    assert_eq!(status.epno(), 2);
    assert_eq!(csr.out_drain(), payload);

    // draining left the accept latch clear
    assert_eq!(host.out_transfer(2, &payload), Handshake::Nak);
    csr.out_enable(true);
    assert_eq!(host.out_transfer(2, &payload), Handshake::Ack);
}

#[test]
fn zero_length_out_updates_endpoint_status() {
    let (mut host, csr) = device();
    csr.enable_endpoint(UsbDirection::Out, 2, true);
    csr.enable_endpoint(UsbDirection::Out, 3, true);
    csr.out_enable(true);

    assert_eq!(host.out_transfer(2, &[0x5A]), Handshake::Ack);
    assert_eq!(csr.out_status().epno(), 2);
    csr.out_drain();
    csr.out_enable(true);

    // a data-less packet still retargets the status register
    assert_eq!(host.out_transfer(3, &[]), Handshake::Ack);
    assert_eq!(csr.out_status().epno(), 3);
}

#[test]
fn in_toggle_alternates_per_committed_transfer() {
    let (mut host, csr) = device();
    csr.enable_endpoint(UsbDirection::In, 3, true);

    let mut toggles = Vec::new();
    for round in 0u8..3 {
        csr.in_data(round);
        csr.in_arm(3);
        let (hs, data, toggle) = host.in_transfer(3);
        assert_eq!(hs, Handshake::Ack);
        assert_eq!(data, [round]);
        toggles.push(toggle);
    }
    // toggles reset to DATA1 and alternate on every handshake
    assert_eq!(toggles, [true, false, true]);
}

#[test]
fn bus_reset_rehomes_engine_and_clears_address() {
    let (mut host, csr) = device();
    csr.set_address(5);
    assert_eq!(host.device_address(), 5);

    assert_eq!(host.setup(0, GET_DESCRIPTOR), Handshake::Ack);
    assert_eq!(host.engine().stage(), Stage::ControlIn);

    host.bus_reset();
    assert_eq!(host.engine().stage(), Stage::Idle);
    assert_eq!(csr.address(), 0);
    assert_eq!(host.device_address(), 0);
    // the committed record survives for the CPU to inspect
    assert_eq!(csr.setup_drain().len(), 10);
}

#[test]
fn protocol_error_counts_and_recovers() {
    let (mut host, csr) = device();
    assert_eq!(host.setup(0, GET_DESCRIPTOR), Handshake::Ack);

    host.protocol_error();
    assert_eq!(host.engine().stage(), Stage::Idle);
    assert_eq!(csr.error_count(), 1);

    // the engine keeps running after the error
    csr.setup_drain();
    assert_eq!(host.setup(0, SET_ADDRESS_5), Handshake::Ack);
}

#[test]
fn event_line_follows_enable_mask() {
    let (mut host, csr) = device();
    let mut mask = UsbEvents(0);
    mask.set_setup(true);
    csr.ev_enable(mask);
    assert!(!csr.irq());

    assert_eq!(host.setup(0, GET_DESCRIPTOR), Handshake::Ack);
    assert!(csr.irq());
    assert!(csr.ev_pending().setup());

    csr.ev_clear(csr.ev_pending());
    assert!(!csr.irq());
}

#[test]
fn control_read_across_threads() {
    let (mut host, csr) = device();
    let descriptor = [0x12u8, 0x01, 0x00, 0x02, 0x00, 0x00, 0x00, 0x40];

    let bus = std::thread::spawn(move || {
        assert_eq!(host.setup(0, GET_DESCRIPTOR), Handshake::Ack);
        loop {
            let (hs, data, _) = host.in_transfer(0);
            match hs {
                Handshake::Ack => break data,
                Handshake::Nak => std::thread::yield_now(),
                Handshake::Stall => panic!("unexpected stall"),
            }
        }
    });

    while !csr.setup_status().have() {
        std::thread::yield_now();
    }
    assert_eq!(&csr.setup_drain()[..8], &GET_DESCRIPTOR);
    for &b in descriptor.iter() {
        assert!(csr.in_data(b));
    }
    csr.in_arm(0);

    let data = bus.join().unwrap();
    assert_eq!(data, descriptor);
}
