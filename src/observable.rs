//! Last-known values with change notification.
//!
//! Every (parameter, channel) pair owns a `tokio::sync::watch` channel
//! holding its latest [`ParamUpdate`]. Dispatch publishes after each
//! operation, successful or not, so subscribers see the attempted value
//! together with its [`UpdateStatus`].
//!
//! ```rust
//! use elveflow_ob1::observable::{UpdateStatus, ValueCache};
//! use elveflow_ob1::parameter::{Ob1Param, ParamValue};
//!
//! let cache = ValueCache::new(2);
//! let rx = cache.subscribe(Ob1Param::SetPressure, 1).unwrap();
//! cache.publish(Ob1Param::SetPressure, 1, ParamValue::Float64(500.0), UpdateStatus::Ok);
//! assert_eq!(rx.borrow().value, ParamValue::Float64(500.0));
//! ```

use tokio::sync::watch;

use crate::parameter::{Ob1Param, ParamValue};

/// Outcome attached to a published value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStatus {
    /// Value came from (or reached) the hardware.
    Ok,
    /// The operation failed; the value is the attempted or stale one.
    Alarm,
}

/// One published value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamUpdate {
    pub param: Ob1Param,
    /// Logical channel.
    pub channel: usize,
    pub value: ParamValue,
    pub status: UpdateStatus,
}

impl ParamUpdate {
    /// Whether the last operation on this slot failed.
    pub fn is_alarm(&self) -> bool {
        self.status == UpdateStatus::Alarm
    }
}

fn slot(param: Ob1Param) -> usize {
    match param {
        Ob1Param::SetPressure => 0,
        Ob1Param::ReadPressure => 1,
        Ob1Param::ReadFlow => 2,
        Ob1Param::SensorType => 3,
    }
}

/// Per-channel value cache.
#[derive(Debug)]
pub struct ValueCache {
    channels: Vec<[watch::Sender<ParamUpdate>; Ob1Param::ALL.len()]>,
}

impl ValueCache {
    /// Cache for `channels` logical channels, every slot at zero.
    pub fn new(channels: usize) -> Self {
        let channels = (0..channels)
            .map(|channel| {
                Ob1Param::ALL.map(|param| {
                    let (tx, _rx) = watch::channel(ParamUpdate {
                        param,
                        channel,
                        value: ParamValue::zero(param.kind()),
                        status: UpdateStatus::Ok,
                    });
                    tx
                })
            })
            .collect();
        Self { channels }
    }

    fn sender(&self, param: Ob1Param, channel: usize) -> Option<&watch::Sender<ParamUpdate>> {
        self.channels.get(channel).map(|slots| &slots[slot(param)])
    }

    /// Store a value and wake subscribers. Out-of-range channels are ignored.
    pub fn publish(&self, param: Ob1Param, channel: usize, value: ParamValue, status: UpdateStatus) {
        if let Some(tx) = self.sender(param, channel) {
            tx.send_replace(ParamUpdate {
                param,
                channel,
                value,
                status,
            });
        }
    }

    /// Republish the current value flagged as [`UpdateStatus::Alarm`].
    pub fn mark_alarm(&self, param: Ob1Param, channel: usize) {
        if let Some(tx) = self.sender(param, channel) {
            tx.send_modify(|update| update.status = UpdateStatus::Alarm);
        }
    }

    /// Wake subscribers with the slot's current update unchanged.
    pub fn republish(&self, param: Ob1Param, channel: usize) -> Option<ParamUpdate> {
        let tx = self.sender(param, channel)?;
        tx.send_modify(|_| {});
        Some(*tx.borrow())
    }

    /// Latest update for a slot.
    pub fn get(&self, param: Ob1Param, channel: usize) -> Option<ParamUpdate> {
        self.sender(param, channel).map(|tx| *tx.borrow())
    }

    /// Latest value for a slot.
    pub fn value(&self, param: Ob1Param, channel: usize) -> Option<ParamValue> {
        self.get(param, channel).map(|update| update.value)
    }

    /// Receiver notified on every publish to a slot.
    pub fn subscribe(&self, param: Ob1Param, channel: usize) -> Option<watch::Receiver<ParamUpdate>> {
        self.sender(param, channel).map(watch::Sender::subscribe)
    }

    /// Number of logical channels cached.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}
