//! See [`SpaClient`] for more details.

use log::debug;

use crate::codec::{
    encode_frame, Frame, FrameReader, MT_ID_ACK, MT_NEW_CLIENT_REQUEST, MT_NOTHING_TO_SEND,
    MT_REQUEST_INFO, MT_SET_TEMPERATURE, MT_TOGGLE_ITEM,
};
use crate::messages::{SpaConfig, SpaFaultLog, SpaFilterSettings, SpaStatus};
use crate::nom_parser::{parse_message, MessageToken};
use crate::types::{Channel, ClientId, TemperatureScale, ToggleItem};
use crate::PublishSink;

/// Device identification sent when asking for a channel.
const NEW_CLIENT_IDENT: [u8; 3] = [0x02, 0xf1, 0x73];
/// How long an unanswered channel request stays pending before the next
/// new-client query may trigger another one.
const ASSIGNMENT_RETRY_MS: u64 = 2_000;

const REQUEST_CONFIG: [u8; 3] = [0x00, 0x00, 0x01];
const REQUEST_FAULT_LOG: [u8; 3] = [0x20, 0xff, 0x00];
const REQUEST_FILTER_CYCLES: [u8; 3] = [0x01, 0x00, 0x00];

/// Acquisition stage of a resource the client polls from the mainboard.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Copy, Clone)]
pub enum Stage {
    /// Not on hand; request at the next opportunity.
    Want,
    /// Requested, waiting for the report.
    Requested,
    /// Report decoded, telemetry not yet delivered.
    Received,
    /// Decoded and delivered.
    Consumed,
}

/// A user command waiting for the next Clear-To-Send slot.
///
/// At most one command is held; a newer one replaces it.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Command {
    Toggle(ToggleItem),
    SetTemp(u8),
}

#[derive(Debug)]
enum Registration {
    Unassigned,
    Requesting { since_ms: u64 },
    Assigned { id: ClientId },
}

/// Bus client session for a Balboa mainboard.
///
/// This enum represents the two I/O states of the session: feeding
/// inbound bytes, and flushing a reply frame. The type makes the bus
/// discipline structural: a reply produced by one frame must be written
/// out before the next byte can be fed.
///
/// Create a new session with `SpaClient::new()`.
///
/// # Example
///
/// ```
/// use balboa_proto::{PublishSink, SpaClient};
/// # use std::io::{Cursor, Read, Write};
/// # fn connect_serial_interface() -> std::io::Result<Cursor<Vec<u8>>> {
/// #     Ok(Cursor::new(Vec::new()))
/// # }
///
/// struct StderrSink;
///
/// impl PublishSink for StderrSink {
///     fn publish(&mut self, topic: &str, value: &str) {
///         eprintln!("{}:{}", topic, value);
///     }
/// }
///
/// # fn main() -> std::io::Result<()> {
/// let mut serial = connect_serial_interface()?;
/// let mut sink = StderrSink;
/// let mut client = SpaClient::new();
///
/// 'main: loop {
///     client = match client {
///         SpaClient::Receive(recv) => {
///             let mut buf = [0; 1];
///             let len = serial.read(&mut buf)?;
///             if len == 0 {
///                 break 'main;
///             }
///             recv.receive_byte(buf[0], &mut sink)
///         }
///
///         SpaClient::Transmit(send) => {
///             serial.write_all(send.get_data())?;
///             send.data_sent()
///         }
///     };
/// }
/// # Ok(()) }
/// ```
#[derive(Debug)]
pub enum SpaClient {
    /// More bus bytes are needed. Use `receive_byte()` on the inner
    /// struct.
    Receive(Receive),
    /// A frame is waiting to be written to the bus.
    Transmit(Transmit),
}

impl SpaClient {
    /// Create a new, unregistered session.
    pub fn new() -> SpaClient {
        Receive::create()
    }

    /// Update the session's monotonic clock, in milliseconds from any
    /// fixed origin. Only stage timers depend on it; no frame is ever
    /// produced here.
    pub fn on_tick(&mut self, now_ms: u64) {
        self.state_mut().now_ms = now_ms;
    }

    /// Queue a toggle command for the next Clear-To-Send slot,
    /// replacing any command still waiting.
    pub fn request_toggle(&mut self, item: ToggleItem) {
        self.state_mut().pending = Some(Command::Toggle(item));
    }

    /// Queue a set-temperature command with the raw on-wire byte:
    /// whole degrees in Fahrenheit, half degrees in Celsius.
    pub fn request_set_temp(&mut self, raw_temp: u8) {
        self.state_mut().pending = Some(Command::SetTemp(raw_temp));
    }

    /// The channel the mainboard assigned, once registration completed.
    pub fn client_id(&self) -> Option<ClientId> {
        self.state().client_id()
    }

    fn state(&self) -> &SessionStateStruct {
        match self {
            SpaClient::Receive(Receive { state, .. }) => state,
            SpaClient::Transmit(Transmit { state, .. }) => state,
        }
    }

    fn state_mut(&mut self) -> &mut SessionStateStruct {
        match self {
            SpaClient::Receive(Receive { state, .. }) => state,
            SpaClient::Transmit(Transmit { state, .. }) => state,
        }
    }
}

impl Default for SpaClient {
    fn default() -> Self {
        SpaClient::new()
    }
}

impl From<Receive> for SpaClient {
    fn from(x: Receive) -> Self {
        Self::Receive(x)
    }
}

impl From<Transmit> for SpaClient {
    fn from(x: Transmit) -> Self {
        Self::Transmit(x)
    }
}

type SessionState = Box<SessionStateStruct>;

#[derive(Debug)]
struct SessionStateStruct {
    registration: Registration,
    now_ms: u64,
    pending: Option<Command>,
    config_stage: Stage,
    fault_log_stage: Stage,
    filter_stage: Stage,
    config: Option<SpaConfig>,
    last_status_crc: Option<u8>,
    last_config_crc: Option<u8>,
    last_fault_crc: Option<u8>,
    last_filter_crc: Option<u8>,
    /// Spa clock minute from the latest status update.
    clock_minute: Option<u8>,
    fault_refreshed_minute: Option<u8>,
    filter_refreshed_minute: Option<u8>,
}

impl SessionStateStruct {
    fn new() -> SessionState {
        Box::new(SessionStateStruct {
            registration: Registration::Unassigned,
            now_ms: 0,
            pending: None,
            config_stage: Stage::Want,
            fault_log_stage: Stage::Want,
            filter_stage: Stage::Want,
            config: None,
            last_status_crc: None,
            last_config_crc: None,
            last_fault_crc: None,
            last_filter_crc: None,
            clock_minute: None,
            fault_refreshed_minute: None,
            filter_refreshed_minute: None,
        })
    }

    fn client_id(&self) -> Option<ClientId> {
        match self.registration {
            Registration::Assigned { id } => Some(id),
            _ => None,
        }
    }

    fn temp_scale(&self) -> TemperatureScale {
        self.config
            .map(|config| config.temp_scale)
            .unwrap_or_default()
    }
}

/// Struct with methods for the "receive bytes from the bus" state.
#[derive(Debug)]
pub struct Receive {
    state: SessionState,
    reader: FrameReader,
}

impl Receive {
    fn create() -> SpaClient {
        Receive {
            state: SessionStateStruct::new(),
            reader: FrameReader::new(),
        }
        .into()
    }

    fn from_state(state: SessionState) -> SpaClient {
        Receive {
            state,
            reader: FrameReader::new(),
        }
        .into()
    }

    /// Feed one byte read from the bus.
    ///
    /// Telemetry derived from a completed frame is delivered to `sink`
    /// before the call returns. A transition to [`SpaClient::Transmit`]
    /// carries a reply that must be flushed before the next byte is
    /// fed.
    pub fn receive_byte(mut self, byte: u8, sink: &mut dyn PublishSink) -> SpaClient {
        match self.reader.accept(byte) {
            Some(frame) => self.handle_frame(&frame, sink),
            None => self.into(),
        }
    }

    fn handle_frame(self, frame: &[u8], sink: &mut dyn PublishSink) -> SpaClient {
        let inbound = match parse_message(frame) {
            Ok(inbound) => inbound,
            Err(err) => {
                debug!("Dropping frame: {}", err);
                return self.into();
            }
        };

        let own_channel = self.state.client_id().map(Channel::from);
        match inbound.token {
            MessageToken::NewClientQuery if inbound.channel == Channel::MulticastDiscovery => {
                self.on_new_client_query()
            }
            MessageToken::AssignId { proposed_id }
                if inbound.channel == Channel::MulticastDiscovery =>
            {
                self.on_assignment(proposed_id, sink)
            }
            MessageToken::StatusUpdate if inbound.channel == Channel::BroadcastStatus => {
                self.on_status(frame, inbound.crc, sink)
            }
            MessageToken::ClearToSend if Some(inbound.channel) == own_channel => {
                self.on_clear_to_send()
            }
            MessageToken::ConfigReport if Some(inbound.channel) == own_channel => {
                self.on_config(frame, inbound.crc, sink)
            }
            MessageToken::FaultLogReport if Some(inbound.channel) == own_channel => {
                self.on_fault_log(frame, inbound.crc, sink)
            }
            MessageToken::FilterCycleReport if Some(inbound.channel) == own_channel => {
                self.on_filter_cycles(frame, inbound.crc, sink)
            }
            _ => self.into(),
        }
    }

    fn on_new_client_query(mut self) -> SpaClient {
        let now_ms = self.state.now_ms;
        match self.state.registration {
            Registration::Unassigned => {}
            Registration::Requesting { since_ms }
                if now_ms.saturating_sub(since_ms) >= ASSIGNMENT_RETRY_MS => {}
            _ => return self.into(),
        }
        self.state.registration = Registration::Requesting { since_ms: now_ms };
        Transmit::reply(
            self.state,
            Channel::MulticastDiscovery,
            MT_NEW_CLIENT_REQUEST,
            &NEW_CLIENT_IDENT,
        )
    }

    fn on_assignment(mut self, proposed_id: u8, sink: &mut dyn PublishSink) -> SpaClient {
        if matches!(self.state.registration, Registration::Assigned { .. }) {
            return self.into();
        }
        let id = ClientId::from_assignment(proposed_id);
        self.state.registration = Registration::Assigned { id };
        sink.publish("Spa/node/id", &id.to_string());
        Transmit::reply(self.state, Channel::from(id), MT_ID_ACK, &[])
    }

    fn on_status(mut self, frame: &[u8], crc: u8, sink: &mut dyn PublishSink) -> SpaClient {
        if self.state.last_status_crc == Some(crc) {
            return self.into();
        }
        let status = match SpaStatus::decode(frame, self.state.temp_scale()) {
            Ok(status) => status,
            Err(err) => {
                debug!("Dropping status update: {}", err);
                return self.into();
            }
        };
        self.state.last_status_crc = Some(crc);
        self.state.clock_minute = Some(status.minute);
        status.publish(sink);
        self.into()
    }

    fn on_config(mut self, frame: &[u8], crc: u8, sink: &mut dyn PublishSink) -> SpaClient {
        if self.state.last_config_crc == Some(crc) {
            self.state.config_stage = Stage::Consumed;
            return self.into();
        }
        let config = match SpaConfig::decode(frame) {
            Ok(config) => config,
            Err(err) => {
                debug!("Dropping configuration report: {}", err);
                return self.into();
            }
        };
        self.state.last_config_crc = Some(crc);
        self.state.config_stage = Stage::Received;
        self.state.config = Some(config);
        config.publish(sink);
        sink.publish("Spa/node/state", "ON");
        sink.publish("Spa/node/debug", "RECONNECT");
        sink.publish("Spa/node/version", env!("CARGO_PKG_VERSION"));
        // A scale change must push the next status update through even
        // if its bytes did not change
        self.state.last_status_crc = None;
        self.state.config_stage = Stage::Consumed;
        self.into()
    }

    fn on_fault_log(mut self, frame: &[u8], crc: u8, sink: &mut dyn PublishSink) -> SpaClient {
        if self.state.last_fault_crc == Some(crc) {
            self.state.fault_log_stage = Stage::Consumed;
            return self.into();
        }
        let fault = match SpaFaultLog::decode(frame) {
            Ok(fault) => fault,
            Err(err) => {
                debug!("Dropping fault log report: {}", err);
                return self.into();
            }
        };
        self.state.last_fault_crc = Some(crc);
        self.state.fault_log_stage = Stage::Received;
        fault.publish(sink);
        self.state.fault_log_stage = Stage::Consumed;
        self.into()
    }

    fn on_filter_cycles(mut self, frame: &[u8], crc: u8, sink: &mut dyn PublishSink) -> SpaClient {
        if self.state.last_filter_crc == Some(crc) {
            self.state.filter_stage = Stage::Consumed;
            return self.into();
        }
        let filters = match SpaFilterSettings::decode(frame) {
            Ok(filters) => filters,
            Err(err) => {
                debug!("Dropping filter cycle report: {}", err);
                return self.into();
            }
        };
        self.state.last_filter_crc = Some(crc);
        self.state.filter_stage = Stage::Received;
        filters.publish(sink);
        self.state.filter_stage = Stage::Consumed;
        self.into()
    }

    /// Answer a Clear-To-Send token with exactly one frame, by
    /// priority: the queued user command, then missing resources, then
    /// a nothing-to-send marker.
    fn on_clear_to_send(mut self) -> SpaClient {
        let id = match self.state.client_id() {
            Some(id) => id,
            None => return self.into(),
        };
        self.refresh_stages();

        match self.state.pending.take() {
            Some(Command::SetTemp(raw)) => {
                return Transmit::reply(self.state, id.into(), MT_SET_TEMPERATURE, &[raw]);
            }
            Some(Command::Toggle(item)) => {
                return Transmit::reply(
                    self.state,
                    id.into(),
                    MT_TOGGLE_ITEM,
                    &[item.code(), 0x00],
                );
            }
            None => {}
        }

        if self.state.config_stage == Stage::Want {
            self.state.config_stage = Stage::Requested;
            return Transmit::reply(self.state, id.into(), MT_REQUEST_INFO, &REQUEST_CONFIG);
        }
        if self.state.fault_log_stage == Stage::Want {
            self.state.fault_log_stage = Stage::Requested;
            return Transmit::reply(self.state, id.into(), MT_REQUEST_INFO, &REQUEST_FAULT_LOG);
        }
        if self.state.filter_stage == Stage::Want && self.state.fault_log_stage >= Stage::Received
        {
            self.state.filter_stage = Stage::Requested;
            return Transmit::reply(
                self.state,
                id.into(),
                MT_REQUEST_INFO,
                &REQUEST_FILTER_CYCLES,
            );
        }
        Transmit::reply(self.state, id.into(), MT_NOTHING_TO_SEND, &[])
    }

    fn refresh_stages(&mut self) {
        let minute = match self.state.clock_minute {
            Some(minute) if minute % 5 == 0 => minute,
            _ => return,
        };
        let state = &mut *self.state;
        refresh(minute, &mut state.fault_log_stage, &mut state.fault_refreshed_minute);
        refresh(minute, &mut state.filter_stage, &mut state.filter_refreshed_minute);
    }
}

/// Demote a resource so it is requested again, at most once per
/// five-minute mark of the spa clock.
fn refresh(minute: u8, stage: &mut Stage, refreshed_minute: &mut Option<u8>) {
    if *refreshed_minute == Some(minute) {
        return;
    }
    if matches!(stage, Stage::Requested | Stage::Consumed) {
        *stage = Stage::Want;
        *refreshed_minute = Some(minute);
    }
}

/// Struct with methods for the "write a frame to the bus" state.
///
/// Call [`get_data()`](Self::get_data()) for the bytes to write, then
/// [`data_sent()`](Self::data_sent()) once they are on the wire.
#[derive(Debug)]
pub struct Transmit {
    state: SessionState,
    data: Frame,
}

impl Transmit {
    fn reply(state: SessionState, channel: Channel, message_type: u8, payload: &[u8]) -> SpaClient {
        let data = encode_frame(channel, message_type, payload)
            .expect("BUG: reply frame exceeds the bus frame size");
        Transmit { state, data }.into()
    }

    /// Returns the frame to be written to the bus.
    pub fn get_data(&self) -> &[u8] {
        &self.data
    }

    /// Signals that the frame was written; the session goes back to
    /// listening.
    pub fn data_sent(self) -> SpaClient {
        Receive::from_state(self.state)
    }
}
