//! Test-harness bridge: bus bytes on stdin/stdout, telemetry as
//! `topic:value` lines on stderr.

use std::io::{self, Read, Write};
use std::time::Instant;

use anyhow::Result;
use balboa_proto::{PublishSink, SpaClient};

struct StderrSink;

impl PublishSink for StderrSink {
    fn publish(&mut self, topic: &str, value: &str) {
        eprintln!("{}:{}", topic, value);
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut input = stdin.lock();
    let mut output = stdout.lock();
    let mut sink = StderrSink;
    let started = Instant::now();

    let mut client = SpaClient::new();
    loop {
        client.on_tick(started.elapsed().as_millis() as u64);
        client = match client {
            SpaClient::Receive(recv) => {
                let mut buf = [0; 1];
                if input.read(&mut buf)? == 0 {
                    return Ok(());
                }
                recv.receive_byte(buf[0], &mut sink)
            }

            SpaClient::Transmit(send) => {
                output.write_all(send.get_data())?;
                output.flush()?;
                send.data_sent()
            }
        };
    }
}
