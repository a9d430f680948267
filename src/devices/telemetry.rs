//! telemetry.rs
//! Fire-and-forget per-cycle telemetry.
//!
//! The loop never blocks on telemetry: samples go through a bounded channel with
//! `try_send`, and a full channel drops the sample and bumps a counter.

use crossbeam::channel::{Receiver, Sender, TrySendError, bounded};
use log::{debug, info};
use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    thread::{self, JoinHandle},
};

pub const TOPIC_TEMPERATURE: &str = "temperature";
pub const TOPIC_HEATER: &str = "heater";
pub const TOPIC_SETPOINT: &str = "setpoint";
pub const TOPIC_MODEL_ENERGY_BALANCE: &str = "model/energy_balance";
pub const TOPIC_MODEL_FOPDT: &str = "model/fopdt";
pub const TOPIC_ERROR_ENERGY_BALANCE: &str = "error/energy_balance";
pub const TOPIC_ERROR_FOPDT: &str = "error/fopdt";
pub const TOPIC_ERROR_SETPOINT: &str = "error/setpoint";

pub trait TelemetryPublisher: Send {
    fn publish(&self, topic: &'static str, value: f64);
}

impl<T: TelemetryPublisher + ?Sized> TelemetryPublisher for Box<T> {
    fn publish(&self, topic: &'static str, value: f64) {
        (**self).publish(topic, value)
    }
}

/// Discards every sample.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPublisher;

impl TelemetryPublisher for NullPublisher {
    fn publish(&self, _topic: &'static str, _value: f64) {}
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub topic: &'static str,
    pub value: f64,
}

/// Non-blocking producer side of a bounded telemetry channel.
#[derive(Clone)]
pub struct ChannelPublisher {
    tx: Sender<Sample>,
    dropped: Arc<AtomicU64>,
}

impl ChannelPublisher {
    /// Bounded channel; the caller owns the receiving end.
    pub fn new(capacity: usize) -> (Self, Receiver<Sample>) {
        let (tx, rx) = bounded(capacity);
        (
            Self {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }

    /// Bounded channel drained by a background thread that logs each sample at debug.
    /// The thread exits once every publisher clone is dropped and returns the count
    /// of samples it saw.
    pub fn with_logger(capacity: usize) -> (Self, JoinHandle<u64>) {
        let (publisher, rx) = Self::new(capacity);
        let handle = thread::spawn(move || {
            let mut seen = 0u64;
            for sample in rx.iter() {
                debug!("[Telemetry] {} = {:.4}", sample.topic, sample.value);
                seen += 1;
            }
            info!("[Telemetry] consumer stopped after {} samples", seen);
            seen
        });
        (publisher, handle)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl TelemetryPublisher for ChannelPublisher {
    fn publish(&self, topic: &'static str, value: f64) {
        match self.tx.try_send(Sample { topic, value }) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_arrive_in_order() {
        let (publisher, rx) = ChannelPublisher::new(8);
        publisher.publish(TOPIC_TEMPERATURE, 23.5);
        publisher.publish(TOPIC_HEATER, 40.0);
        assert_eq!(rx.try_recv().unwrap(), Sample { topic: "temperature", value: 23.5 });
        assert_eq!(rx.try_recv().unwrap().topic, "heater");
        assert_eq!(publisher.dropped(), 0);
    }

    #[test]
    fn full_channel_drops_instead_of_blocking() {
        let (publisher, rx) = ChannelPublisher::new(2);
        for i in 0..5 {
            publisher.publish(TOPIC_SETPOINT, i as f64);
        }
        assert_eq!(publisher.dropped(), 3);
        assert_eq!(rx.len(), 2);
    }

    #[test]
    fn disconnected_receiver_counts_as_dropped() {
        let (publisher, rx) = ChannelPublisher::new(2);
        drop(rx);
        publisher.publish(TOPIC_ERROR_FOPDT, 1.0);
        assert_eq!(publisher.dropped(), 1);
    }

    #[test]
    fn logger_thread_drains_until_publishers_drop() {
        let (publisher, handle) = ChannelPublisher::with_logger(16);
        for _ in 0..4 {
            publisher.publish(TOPIC_MODEL_FOPDT, 30.0);
        }
        drop(publisher);
        assert_eq!(handle.join().unwrap(), 4);
    }
}
