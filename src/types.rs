use snafu::{ensure, OptionExt, Snafu};

use std::convert::TryInto;
use std::fmt;
use std::ops::Deref;

/// Error type for this module
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    /// The value isn't a valid bus client id.
    #[snafu(display("Invalid client id"))]
    InvalidClientId,
}

/// `ClientId` is a range-checked integer, representing the bus address
/// a mainboard hands out to a client.
///
/// ## Example
/// ```
/// use balboa_proto::ClientId;
/// use std::convert::TryInto;
/// let id = ClientId::new(0x10).unwrap();
/// let id: ClientId = 0x10.try_into().unwrap();
/// ```
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Copy, Clone, Hash)]
#[repr(transparent)]
pub struct ClientId(u8);

impl ClientId {
    /// Highest address a mainboard may assign.
    pub const MAX: u8 = 0x2f;

    /// Create a new client id, checking that it is within the polled
    /// address space.
    /// # Errors
    /// Returns [`Error::InvalidClientId`] if `id` is out of range.
    pub fn new(id: impl TryInto<u8>) -> Result<Self, Error> {
        let id = id.try_into().ok().context(InvalidClientIdSnafu)?;
        ensure!(id <= Self::MAX, InvalidClientIdSnafu);
        Ok(Self(id))
    }

    /// Accept an id proposed by the mainboard. Out-of-range proposals
    /// are clamped to [`ClientId::MAX`] rather than refused.
    pub(crate) fn from_assignment(proposed: u8) -> Self {
        Self(proposed.min(Self::MAX))
    }
}

impl Deref for ClientId {
    type Target = u8;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::convert::TryFrom<u8> for ClientId {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// Address ranges seen in the channel byte of a frame.
#[derive(Debug, PartialEq, Eq, Copy, Clone, Hash)]
pub enum Channel {
    /// `0xfe`, multicast channel for discovery and id assignment.
    MulticastDiscovery,
    /// `0xff`, mainboard broadcasts decoded by every bus member.
    BroadcastStatus,
    /// `0x10..=0x2f`, a polled client address.
    Client(u8),
    /// Anything else; carried so unknown traffic stays observable.
    Unknown(u8),
}

impl Channel {
    /// The magic byte a frame on this channel is stamped with.
    pub(crate) fn magic_byte(self) -> u8 {
        match self {
            Channel::BroadcastStatus => crate::codec::MAGIC_BROADCAST,
            _ => crate::codec::MAGIC,
        }
    }
}

impl From<u8> for Channel {
    fn from(value: u8) -> Self {
        match value {
            c @ 0x10..=0x2f => Channel::Client(c),
            0xfe => Channel::MulticastDiscovery,
            0xff => Channel::BroadcastStatus,
            c => Channel::Unknown(c),
        }
    }
}

impl From<Channel> for u8 {
    fn from(value: Channel) -> Self {
        match value {
            Channel::MulticastDiscovery => 0xfe,
            Channel::BroadcastStatus => 0xff,
            Channel::Client(c) => c,
            Channel::Unknown(c) => c,
        }
    }
}

impl From<ClientId> for Channel {
    fn from(id: ClientId) -> Self {
        Channel::Client(id.0)
    }
}

/// Temperature scale the spa is configured for.
///
/// Status updates carry raw temperature bytes whose meaning depends on
/// this: whole degrees in Fahrenheit, half degrees in Celsius.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum TemperatureScale {
    Fahrenheit,
    Celsius,
}

impl Default for TemperatureScale {
    /// Until a configuration report arrives, raw bytes read as whole
    /// degrees Fahrenheit.
    fn default() -> Self {
        TemperatureScale::Fahrenheit
    }
}

/// A raw on-wire temperature byte and the scale it was received under.
#[derive(Debug, PartialEq, Copy, Clone)]
pub struct Temperature {
    raw: u8,
    scale: TemperatureScale,
}

impl Temperature {
    pub(crate) fn from_raw(raw: u8, scale: TemperatureScale) -> Self {
        Self { raw, scale }
    }

    pub fn degrees(&self) -> f64 {
        match self.scale {
            TemperatureScale::Fahrenheit => f64::from(self.raw),
            TemperatureScale::Celsius => f64::from(self.raw) / 2.0,
        }
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.degrees())
    }
}

/// Items a client can flip with a toggle command.
#[derive(Debug, PartialEq, Eq, Copy, Clone, Hash)]
pub enum ToggleItem {
    NormalOperation = 0x01,
    ClearNotification = 0x03,
    Pump1 = 0x04,
    Pump2 = 0x05,
    Pump3 = 0x06,
    Pump4 = 0x07,
    Pump5 = 0x08,
    Pump6 = 0x09,
    Blower = 0x0c,
    Mister = 0x0e,
    Light1 = 0x11,
    Light2 = 0x12,
    Aux1 = 0x16,
    Aux2 = 0x17,
    SoakMode = 0x1d,
    HoldMode = 0x3c,
    TemperatureRange = 0x50,
    HeatMode = 0x51,
}

impl ToggleItem {
    /// The on-wire item code.
    pub fn code(self) -> u8 {
        self as u8
    }
}




#[cfg(test)]
mod toggle_item_tests {
    use super::ToggleItem;

    #[test]
    fn test_item_codes() {
        assert_eq!(ToggleItem::Pump1.code(), 0x04);
        assert_eq!(ToggleItem::Light1.code(), 0x11);
        assert_eq!(ToggleItem::HoldMode.code(), 0x3c);
        assert_eq!(ToggleItem::TemperatureRange.code(), 0x50);
    }
}
