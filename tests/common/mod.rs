#![allow(dead_code)]

use balboa_proto::{encode_frame, Channel, PublishSink, SpaClient, ToggleItem};

/// Records published telemetry for assertions.
#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<(String, String)>,
}

impl PublishSink for RecordingSink {
    fn publish(&mut self, topic: &str, value: &str) {
        self.events.push((topic.to_string(), value.to_string()));
    }
}

/// Builds the wire bytes of one frame, checksummed by the crate codec.
pub fn frame(channel: u8, message_type: u8, payload: &[u8]) -> Vec<u8> {
    encode_frame(Channel::from(channel), message_type, payload)
        .expect("test frame too long")
        .to_vec()
}

/// A broadcast status update; `edit` gets the payload, whose index `i`
/// lands at frame offset `i + 5`.
pub fn status_frame(edit: impl FnOnce(&mut [u8; 24])) -> Vec<u8> {
    let mut payload = [0u8; 24];
    edit(&mut payload);
    frame(0xff, 0x13, &payload)
}

pub fn config_report() -> Vec<u8> {
    frame(0x10, 0x2e, &[0x21, 0x42, 0x06, 0x83, 0x32, 0x00])
}

pub fn fault_report() -> Vec<u8> {
    frame(0x10, 0x28, &[4, 1, 17, 3, 11, 30, 0, 0, 0, 0])
}

pub fn filter_report() -> Vec<u8> {
    frame(0x10, 0x23, &[19, 30, 2, 0, 0x86, 15, 1, 30])
}

/// Plays the mainboard side of the bus: feeds bytes into the client one
/// at a time and flushes every reply frame, the way a host loop would.
pub struct Mainboard {
    client: Option<SpaClient>,
    pub sink: RecordingSink,
}

impl Mainboard {
    pub fn new() -> Self {
        Self {
            client: Some(SpaClient::new()),
            sink: RecordingSink::default(),
        }
    }

    /// Send `bytes` to the client, returning everything it wrote back.
    pub fn send(&mut self, bytes: &[u8]) -> Vec<u8> {
        let mut replies = Vec::new();
        for &byte in bytes {
            let mut client = self.client.take().unwrap();
            client = match client {
                SpaClient::Receive(recv) => recv.receive_byte(byte, &mut self.sink),
                SpaClient::Transmit(_) => panic!("byte fed while a reply was pending"),
            };
            if let SpaClient::Transmit(send) = client {
                replies.extend_from_slice(send.get_data());
                client = send.data_sent();
            }
            self.client = Some(client);
        }
        replies
    }

    pub fn clear_to_send(&mut self) -> Vec<u8> {
        self.send(&frame(0x10, 0x06, &[]))
    }

    pub fn on_tick(&mut self, now_ms: u64) {
        self.client.as_mut().unwrap().on_tick(now_ms);
    }

    pub fn request_toggle(&mut self, item: ToggleItem) {
        self.client.as_mut().unwrap().request_toggle(item);
    }

    pub fn request_set_temp(&mut self, raw_temp: u8) {
        self.client.as_mut().unwrap().request_set_temp(raw_temp);
    }

    /// Drain the telemetry recorded so far.
    pub fn events(&mut self) -> Vec<(String, String)> {
        std::mem::take(&mut self.sink.events)
    }

    /// Runs the discovery exchange, registering the client at channel
    /// 0x10.
    pub fn register(&mut self) {
        let reply = self.send(&frame(0xfe, 0x00, &[]));
        assert_eq!(reply, frame(0xfe, 0x01, &[0x02, 0xf1, 0x73]));
        let reply = self.send(&frame(0xfe, 0x02, &[0x10]));
        assert_eq!(reply, frame(0x10, 0x03, &[]));
        self.events();
    }

    /// Walks the full acquisition sequence so every polled resource is
    /// consumed.
    pub fn acquire_all(&mut self) {
        assert_eq!(self.clear_to_send(), frame(0x10, 0x22, &[0x00, 0x00, 0x01]));
        self.send(&config_report());
        assert_eq!(self.clear_to_send(), frame(0x10, 0x22, &[0x20, 0xff, 0x00]));
        self.send(&fault_report());
        assert_eq!(self.clear_to_send(), frame(0x10, 0x22, &[0x01, 0x00, 0x00]));
        self.send(&filter_report());
        self.events();
    }
}
