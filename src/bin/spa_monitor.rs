//! Live-bus monitor: joins the bus on a real serial port and prints
//! every telemetry event to stdout.

use std::io::{Read, Write};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serialport::{DataBits, Parity, StopBits};

use balboa_proto::{PublishSink, SpaClient};

struct StdoutSink;

impl PublishSink for StdoutSink {
    fn publish(&mut self, topic: &str, value: &str) {
        println!("{}:{}", topic, value);
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let mut args = std::env::args();
    args.next(); // Skip program name
    let port = args.next().unwrap_or_else(|| "/dev/ttyUSB0".to_string());

    let mut serial = serialport::new(&port, 115_200)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .timeout(Duration::from_millis(100))
        .open()
        .with_context(|| format!("Failed to open serial port {}", port))?;

    let mut sink = StdoutSink;
    let started = Instant::now();

    let mut client = SpaClient::new();
    loop {
        client.on_tick(started.elapsed().as_millis() as u64);
        client = match client {
            SpaClient::Receive(recv) => {
                let mut buf = [0; 1];
                match serial.read(&mut buf) {
                    Ok(0) => return Ok(()),
                    Ok(_) => recv.receive_byte(buf[0], &mut sink),
                    Err(err) if err.kind() == std::io::ErrorKind::TimedOut => recv.into(),
                    Err(err) => return Err(err.into()),
                }
            }

            SpaClient::Transmit(send) => {
                serial.write_all(send.get_data())?;
                send.data_sent()
            }
        };
    }
}
