//! Logical to physical channel addressing.
//!
//! The host addresses channels 0-based; the vendor SDK numbers them 1..=4.
//! Nothing outside the configured range ever reaches the device session.

use std::fmt;

use crate::error::{Ob1Error, Result};

/// Number of pressure channels on an OB1 chassis.
pub const MAX_CHANNELS: usize = 4;

/// 1-based channel number as the vendor SDK expects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PhysicalChannel(u8);

impl PhysicalChannel {
    /// Build from a 1-based channel number.
    pub fn new(number: u8) -> Option<Self> {
        if (1..=MAX_CHANNELS as u8).contains(&number) {
            Some(Self(number))
        } else {
            None
        }
    }

    /// All physical channels of the chassis, in order.
    pub fn all() -> impl Iterator<Item = PhysicalChannel> {
        (1..=MAX_CHANNELS as u8).map(PhysicalChannel)
    }

    /// The 1-based number passed to the SDK.
    pub fn number(self) -> u8 {
        self.0
    }

    /// 0-based index for per-channel tables.
    pub fn index(self) -> usize {
        usize::from(self.0) - 1
    }
}

impl fmt::Display for PhysicalChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "physical channel {}", self.0)
    }
}

/// Validates logical addresses against the configured channel count.
#[derive(Debug, Clone, Copy)]
pub struct ChannelResolver {
    configured: usize,
}

impl ChannelResolver {
    /// Resolver for `configured` logical channels.
    ///
    /// Fails when `configured` is zero or exceeds [`MAX_CHANNELS`].
    pub fn new(configured: usize) -> Result<Self> {
        if configured == 0 || configured > MAX_CHANNELS {
            return Err(Ob1Error::Config(format!(
                "channel count must be 1..={}, got {}",
                MAX_CHANNELS, configured
            )));
        }
        Ok(Self { configured })
    }

    /// Number of logical channels in use.
    pub fn configured(&self) -> usize {
        self.configured
    }

    /// Map a logical address to its physical channel.
    pub fn resolve(&self, logical: usize) -> Result<PhysicalChannel> {
        if logical >= self.configured {
            return Err(Ob1Error::ChannelOutOfRange {
                channel: logical,
                configured: self.configured,
            });
        }
        // configured <= MAX_CHANNELS, so logical + 1 fits
        Ok(PhysicalChannel(logical as u8 + 1))
    }

    /// Iterate over the configured logical channels.
    pub fn logical_channels(&self) -> std::ops::Range<usize> {
        0..self.configured
    }
}
