//! Runs a scripted host against the transaction engine: bus reset,
//! SET_ADDRESS, a device-descriptor read, then a bulk loopback burst.
//! `RUST_LOG=trace` shows every stage transition.

use usb_device::UsbDirection;
use usb_eptri::sim::{Handshake, Host};
use usb_eptri::{EndpointEngine, Stage, UsbCsr, UsbEvents};

const DEVICE_DESCRIPTOR: [u8; 18] = [
    0x12, 0x01, 0x00, 0x02, 0x00, 0x00, 0x00, 0x40, 0x09, 0x12, 0x5B, 0xB0, 0x01, 0x01, 0x01,
    0x02, 0x03, 0x01,
];

fn expect(hs: Handshake, want: Handshake, what: &str) {
    if hs != want {
        panic!("{}: got {:?}, wanted {:?}", what, hs, want);
    }
    log::info!("{}: {:?}", what, hs);
}

/// CPU side of a control read: drain the request, feed the response in
/// 8-byte packets as the host polls IN.
fn serve_control_read(host: &mut Host, csr: &UsbCsr, response: &[u8]) {
    let record = csr.setup_drain();
    log::info!("request {:02x?}", &record[..8]);
    for chunk in response.chunks(8) {
        for &b in chunk {
            csr.in_data(b);
        }
        csr.in_arm(0);
        let (hs, data, toggle) = host.in_transfer(0);
        expect(hs, Handshake::Ack, "descriptor packet");
        log::info!("  sent {} bytes, DATA{}", data.len(), toggle as u8);
        assert_eq!(&data[..], chunk);
    }
    expect(host.out_transfer(0, &[]), Handshake::Ack, "status OUT");
    csr.ev_clear(csr.ev_pending());
}

fn main() {
    env_logger::init();

    let (engine, csr) = EndpointEngine::new();
    csr.enable_endpoint(UsbDirection::In, 0, true);
    csr.enable_endpoint(UsbDirection::Out, 0, true);
    csr.enable_endpoint(UsbDirection::In, 1, true);
    csr.enable_endpoint(UsbDirection::Out, 2, true);
    csr.ev_enable(UsbEvents(0xFF));
    csr.set_pullup(true);
    let mut host = Host::new(engine);

    host.bus_reset();
    host.sof();

    // SET_ADDRESS(0x12)
    expect(
        host.setup(0, [0x00, 0x05, 0x12, 0x00, 0x00, 0x00, 0x00, 0x00]),
        Handshake::Ack,
        "SET_ADDRESS setup",
    );
    csr.setup_drain();
    csr.set_address(0x12);
    let (hs, _, _) = host.in_transfer(0);
    expect(hs, Handshake::Ack, "SET_ADDRESS status");
    log::info!("device address now {:#x}", host.device_address());

    // GET_DESCRIPTOR(device)
    expect(
        host.setup(0, [0x80, 0x06, 0x00, 0x01, 0x00, 0x00, 0x12, 0x00]),
        Handshake::Ack,
        "GET_DESCRIPTOR setup",
    );
    serve_control_read(&mut host, &csr, &DEVICE_DESCRIPTOR);

    // bulk loopback: host writes EP2 OUT, device echoes on EP1 IN
    for round in 0u8..4 {
        let payload: Vec<u8> = (0..16).map(|i| i * 3 + round).collect();
        csr.out_enable(true);
        expect(host.out_transfer(2, &payload), Handshake::Ack, "bulk OUT");
        let received = csr.out_drain();
        assert_eq!(received, payload);

        for &b in received.iter() {
            csr.in_data(b);
        }
        csr.in_arm(1);
        let (hs, echoed, toggle) = host.in_transfer(1);
        expect(hs, Handshake::Ack, "bulk IN");
        log::info!("  echoed {} bytes, DATA{}", echoed.len(), toggle as u8);
        assert_eq!(echoed, payload);
    }

    assert_eq!(host.engine().stage(), Stage::Idle);
    log::info!(
        "done: stage {:?}, errors {}, invalid {}, token waits {}",
        host.engine().stage(),
        csr.error_count(),
        csr.invalid_state_count(),
        csr.token_wait_count(),
    );
}
