//! Decoders for the downstream report messages.
//!
//! Every decoder takes a complete, CRC-verified frame and indexes it
//! from the start delimiter, so the offsets below match the on-wire
//! layout (payload starts at offset 5). Bit fields are extracted with
//! explicit masks and shifts.

use snafu::{ensure, Snafu};

use crate::types::{Temperature, TemperatureScale};
use crate::PublishSink;

const ON: &str = "ON";
const OFF: &str = "OFF";

/// Error raised when a report frame is shorter than its layout needs.
#[derive(Debug, Snafu)]
#[snafu(display("{report} report of {len} bytes is too short"))]
pub struct TruncatedReport {
    report: &'static str,
    len: usize,
}

/// Capability record from a configuration report (message type 0x2E).
///
/// Pump fields carry the number of supported speeds, light fields the
/// number of supported levels; zero means not installed.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct SpaConfig {
    pub pumps: [u8; 6],
    pub light1: u8,
    pub light2: u8,
    pub circ: bool,
    pub blower: bool,
    pub mister: bool,
    pub aux1: bool,
    pub aux2: bool,
    pub temp_scale: TemperatureScale,
}

impl SpaConfig {
    pub(crate) fn decode(frame: &[u8]) -> Result<Self, TruncatedReport> {
        ensure!(
            frame.len() >= 12,
            TruncatedReportSnafu {
                report: "configuration",
                len: frame.len()
            }
        );
        Ok(Self {
            pumps: [
                frame[5] & 0x03,
                (frame[5] & 0x0c) >> 2,
                (frame[5] & 0x30) >> 4,
                (frame[5] & 0xc0) >> 6,
                frame[6] & 0x03,
                (frame[6] & 0xc0) >> 6,
            ],
            light1: frame[7] & 0x03,
            light2: (frame[7] >> 2) & 0x03,
            circ: frame[8] & 0x80 != 0,
            blower: frame[8] & 0x03 != 0,
            mister: frame[9] & 0x30 != 0,
            aux1: frame[9] & 0x01 != 0,
            aux2: frame[9] & 0x02 != 0,
            temp_scale: if frame[3] & 0x01 != 0 {
                TemperatureScale::Celsius
            } else {
                TemperatureScale::Fahrenheit
            },
        })
    }

    pub(crate) fn publish(&self, sink: &mut dyn PublishSink) {
        for (i, speeds) in self.pumps.iter().enumerate() {
            sink.publish(&format!("Spa/config/pumps{}", i + 1), &speeds.to_string());
        }
        sink.publish("Spa/config/light1", &self.light1.to_string());
        sink.publish("Spa/config/light2", &self.light2.to_string());
        sink.publish("Spa/config/circ", flag(self.circ));
        sink.publish("Spa/config/blower", flag(self.blower));
        sink.publish("Spa/config/mister", flag(self.mister));
        sink.publish("Spa/config/aux1", flag(self.aux1));
        sink.publish("Spa/config/aux2", flag(self.aux2));
        let scale = match self.temp_scale {
            TemperatureScale::Fahrenheit => "0",
            TemperatureScale::Celsius => "1",
        };
        sink.publish("Spa/config/temp_scale", scale);
    }
}

/// Heating mode reported in a status update.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum HeatingMode {
    Ready,
    Rest,
    ReadyInRest,
}

/// Heater element state.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum HeatingState {
    Off,
    Heating1,
    Heating2,
}

/// Set-point range the spa is operating in.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum TemperatureRange {
    Low,
    High,
}

/// Telemetry snapshot from a broadcast status update (message type
/// 0x13).
#[derive(Debug, PartialEq, Copy, Clone)]
pub struct SpaStatus {
    pub set_temp: Temperature,
    /// `None` while the mainboard reports the temperature as unknown.
    pub current_temp: Option<Temperature>,
    pub hour: u8,
    pub minute: u8,
    /// `None` for heating mode codes the protocol does not define.
    pub heating_mode: Option<HeatingMode>,
    pub heating_state: Option<HeatingState>,
    pub range: TemperatureRange,
    pub jet1: bool,
    pub jet2: bool,
    pub circ: bool,
    pub blower: bool,
    pub light: bool,
}

impl SpaStatus {
    pub(crate) fn decode(frame: &[u8], scale: TemperatureScale) -> Result<Self, TruncatedReport> {
        ensure!(
            frame.len() >= 28,
            TruncatedReportSnafu {
                report: "status",
                len: frame.len()
            }
        );
        Ok(Self {
            set_temp: Temperature::from_raw(frame[25], scale),
            current_temp: match frame[7] {
                0xff => None,
                raw => Some(Temperature::from_raw(raw, scale)),
            },
            hour: frame[8],
            minute: frame[9],
            heating_mode: match frame[10] {
                0 => Some(HeatingMode::Ready),
                1 => Some(HeatingMode::Rest),
                3 => Some(HeatingMode::ReadyInRest),
                _ => None,
            },
            heating_state: match (frame[15] >> 4) & 0x03 {
                0 => Some(HeatingState::Off),
                1 => Some(HeatingState::Heating1),
                2 => Some(HeatingState::Heating2),
                _ => None,
            },
            range: if frame[15] & 0x04 != 0 {
                TemperatureRange::High
            } else {
                TemperatureRange::Low
            },
            jet1: frame[16] & 0x02 != 0,
            jet2: frame[16] & 0x08 != 0,
            circ: frame[18] & 0x02 != 0,
            blower: frame[18] & 0x04 != 0,
            light: frame[19] == 0x03,
        })
    }

    pub(crate) fn publish(&self, sink: &mut dyn PublishSink) {
        sink.publish("Spa/target_temp/state", &self.set_temp.to_string());
        if let Some(temp) = self.current_temp {
            sink.publish("Spa/temperature/state", &temp.to_string());
        }
        sink.publish(
            "Spa/time/state",
            &format!("{:02}:{:02}", self.hour, self.minute),
        );
        match self.heating_mode {
            Some(HeatingMode::Ready) => {
                sink.publish("Spa/heatingmode/state", ON);
                sink.publish("Spa/heat_mode/state", "heat");
            }
            Some(HeatingMode::Rest) => {
                sink.publish("Spa/heatingmode/state", OFF);
                sink.publish("Spa/heat_mode/state", "off");
            }
            // Ready-in-Rest reports neither mode
            _ => {}
        }
        match self.heating_state {
            Some(HeatingState::Off) => sink.publish("Spa/heatstate/state", OFF),
            Some(_) => sink.publish("Spa/heatstate/state", ON),
            None => {}
        }
        sink.publish(
            "Spa/highrange/state",
            on_off(self.range == TemperatureRange::High),
        );
        sink.publish("Spa/jet_1/state", on_off(self.jet1));
        sink.publish("Spa/jet_2/state", on_off(self.jet2));
        sink.publish("Spa/circ/state", on_off(self.circ));
        sink.publish("Spa/blower/state", on_off(self.blower));
        sink.publish("Spa/light/state", on_off(self.light));
        // No relays are driven by this client
        sink.publish("Spa/relay_1/state", OFF);
        sink.publish("Spa/relay_2/state", OFF);
    }
}

/// One entry of the mainboard's fault log (message type 0x28).
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct SpaFaultLog {
    pub total_entries: u8,
    pub current_entry: u8,
    pub code: u8,
    pub days_ago: u8,
    pub hour: u8,
    pub minute: u8,
}

impl SpaFaultLog {
    pub(crate) fn decode(frame: &[u8]) -> Result<Self, TruncatedReport> {
        ensure!(
            frame.len() >= 13,
            TruncatedReportSnafu {
                report: "fault log",
                len: frame.len()
            }
        );
        Ok(Self {
            total_entries: frame[5],
            current_entry: frame[6],
            code: frame[7],
            days_ago: frame[8],
            hour: frame[9],
            minute: frame[10],
        })
    }

    /// Human-readable description of the fault code.
    pub fn message(&self) -> &'static str {
        match self.code {
            15 => "Sensors are out of sync",
            16 => "The water flow is low",
            17 => "The water flow has failed",
            18 => "The settings have been reset",
            19 => "Priming Mode",
            20 => "The clock has failed",
            21 => "The settings have been reset",
            22 => "Program memory failure",
            26 => "Sensors are out of sync -- Call for service",
            27 => "The heater is dry",
            28 => "The heater may be dry",
            29 => "The water is too hot",
            30 => "The heater is too hot",
            31 => "Sensor A Fault",
            32 => "Sensor B Fault",
            34 => "A pump may be stuck on",
            35 => "Hot fault",
            36 => "The GFCI test failed",
            37 => "Standby Mode (Hold Mode)",
            _ => "Unknown error",
        }
    }

    pub(crate) fn publish(&self, sink: &mut dyn PublishSink) {
        sink.publish("Spa/fault/Entries", &self.total_entries.to_string());
        sink.publish("Spa/fault/Entry", &self.current_entry.to_string());
        sink.publish("Spa/fault/Code", &self.code.to_string());
        sink.publish("Spa/fault/Message", self.message());
        sink.publish("Spa/fault/DaysAgo", &self.days_ago.to_string());
        sink.publish("Spa/fault/Hours", &self.hour.to_string());
        sink.publish("Spa/fault/Minutes", &self.minute.to_string());
    }
}

/// A filter cycle start time and duration.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct FilterCycle {
    pub hour: u8,
    pub minute: u8,
    pub duration_hour: u8,
    pub duration_minute: u8,
}

impl FilterCycle {
    /// Key order is part of the published format.
    fn to_json(&self) -> String {
        format!(
            r#"{{"start":"{:02}:{:02}","duration":"{:02}:{:02}"}}"#,
            self.hour, self.minute, self.duration_hour, self.duration_minute
        )
    }
}

/// Filter cycle programming (message type 0x23).
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct SpaFilterSettings {
    pub filter1: FilterCycle,
    pub filter2_enabled: bool,
    pub filter2: FilterCycle,
}

impl SpaFilterSettings {
    pub(crate) fn decode(frame: &[u8]) -> Result<Self, TruncatedReport> {
        ensure!(
            frame.len() >= 15,
            TruncatedReportSnafu {
                report: "filter cycle",
                len: frame.len()
            }
        );
        Ok(Self {
            filter1: FilterCycle {
                hour: frame[5],
                minute: frame[6],
                duration_hour: frame[7],
                duration_minute: frame[8],
            },
            // the second cycle's enable flag rides on its hour byte
            filter2_enabled: frame[9] & 0x80 != 0,
            filter2: FilterCycle {
                hour: frame[9] & 0x7f,
                minute: frame[10],
                duration_hour: frame[11],
                duration_minute: frame[12],
            },
        })
    }

    pub(crate) fn publish(&self, sink: &mut dyn PublishSink) {
        sink.publish("Spa/filter1/state", &self.filter1.to_json());
        sink.publish("Spa/filter2_enabled/state", on_off(self.filter2_enabled));
        sink.publish("Spa/filter2/state", &self.filter2.to_json());
    }
}

fn on_off(value: bool) -> &'static str {
    if value {
        ON
    } else {
        OFF
    }
}

fn flag(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}
