//! Client-side implementation of the Balboa spa RS-485 bus protocol.
//!
//! A Balboa mainboard owns the half-duplex bus and polls everything on
//! it. A client (Wi-Fi module, topside panel) first answers the
//! broadcast new-client query to get a channel assigned, then answers
//! each Clear-To-Send token on that channel with exactly one frame: a
//! queued user command, a data request, or a nothing-to-send marker.
//! Broadcast status updates and the requested reports are decoded into
//! `topic:value` telemetry events.
//!
//! The crate is transport-agnostic: the host owns the serial port and
//! feeds bytes into [`SpaClient`], which hands back frames to write and
//! delivers telemetry through a [`PublishSink`]. See [`SpaClient`] for
//! the main loop structure.

mod codec;
pub mod client;
pub mod messages;
mod nom_parser;
pub mod types;

pub use client::{Receive, SpaClient, Transmit};
pub use codec::{encode_frame, EncodeError, Frame, FrameReader};
pub use types::{Channel, ClientId, TemperatureScale, ToggleItem};

/// Sink for telemetry emitted by the protocol client.
///
/// Values arrive preformatted: decimal integers, `"ON"`/`"OFF"` flags,
/// two-decimal temperatures. Delivery is fire-and-forget; the client
/// never retries or buffers a publish.
pub trait PublishSink {
    fn publish(&mut self, topic: &str, value: &str);
}

/// Calculates the CRC-8 used on the Balboa bus: polynomial 0x07,
/// initial value 0x02, final XOR 0x02, no reflection.
///
/// On the wire the checksum covers the length byte through the last
/// payload byte.
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc: u8 = 0x02;
    for byte in data {
        crc ^= *byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ 0x07
            } else {
                crc << 1
            };
        }
    }
    crc ^ 0x02
}
