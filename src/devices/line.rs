//! line.rs
//! Line-based request/response heater board over any byte stream.
//!
//! Protocol (ASCII, newline terminated, one reply line per request, each reply tagged
//! with the command it answers):
//! - `Q1 <pct>`  → `Q1 <applied pct>`
//! - `LED <pct>` → `LED <applied pct>`
//! - `T1`        → `T1 <°C>`
//! - `X`         → `X`; the board switches every output off
//!
//! Reads are bounded by the stream's own timeout (`TcpStream::set_read_timeout` for
//! serial-over-TCP bridges). A request whose read times out leaves its reply owed; a
//! late reply is recognised by its tag and discarded before the next request's own
//! reply is read. A partial line survives a timeout and is completed by the next
//! read. A closed stream marks the board offline.

use log::{debug, info, warn};
use parking_lot::Mutex;
use std::{
    collections::VecDeque,
    io::{self, BufRead, BufReader, ErrorKind, Read, Write},
    mem,
    net::{TcpStream, ToSocketAddrs},
    sync::Arc,
    time::Duration,
};

use crate::devices::{actuator::Actuator, sensor::TemperatureSensor, sensor::checked_reading};
use crate::error::{ActuatorError, SensorError};

/// Board handle owning the stream. Use [`LineDevice::shared`] to hand the same board
/// to the loop as both sensor and actuator.
pub struct LineDevice<S: Read + Write> {
    reader: BufReader<S>,
    /// Bytes of a reply line not yet terminated.
    partial: String,
    /// Tags of timed-out requests whose replies may still arrive, oldest first.
    owed: VecDeque<String>,
    online: bool,
}

enum LineFault {
    Timeout,
    Closed(String),
    Unexpected(String),
}

impl<S: Read + Write> LineDevice<S> {
    pub fn new(stream: S) -> Self {
        Self {
            reader: BufReader::new(stream),
            partial: String::new(),
            owed: VecDeque::new(),
            online: true,
        }
    }

    pub fn shared(self) -> SharedLineDevice<S> {
        SharedLineDevice(Arc::new(Mutex::new(self)))
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    /// Send `tag [arg]` and return the payload of the first reply `accept` takes.
    fn request(
        &mut self,
        tag: &str,
        arg: Option<String>,
        accept: impl Fn(&str) -> bool,
    ) -> Result<String, LineFault> {
        let line = match arg {
            Some(arg) => format!("{tag} {arg}"),
            None => tag.to_string(),
        };
        debug!("[Line] -> {}", line);
        if let Err(e) = write_line(self.reader.get_mut(), &line) {
            return Err(self.fault(e));
        }

        loop {
            let reply = match self.read_reply() {
                Ok(reply) => reply,
                Err(LineFault::Timeout) => {
                    self.owed.push_back(tag.to_string());
                    return Err(LineFault::Timeout);
                }
                Err(fault) => return Err(fault),
            };
            let (reply_tag, payload) = match reply.split_once(' ') {
                Some((t, p)) => (t, p.trim()),
                None => (reply.as_str(), ""),
            };

            // Replies come back in request order, so owed ones arrive first. An owed
            // tag that does not match was never answered.
            while let Some(front) = self.owed.front() {
                if front == reply_tag {
                    break;
                }
                self.owed.pop_front();
            }
            if self.owed.pop_front().is_some() {
                warn!("[Line] discarding late reply {:?} (waiting for {})", reply, tag);
                continue;
            }

            if reply_tag == tag && accept(payload) {
                return Ok(payload.to_string());
            }
            return Err(LineFault::Unexpected(reply));
        }
    }

    /// Next complete reply line, trimmed.
    fn read_reply(&mut self) -> Result<String, LineFault> {
        match self.reader.read_line(&mut self.partial) {
            Ok(_) if self.partial.ends_with('\n') => {
                let reply = mem::take(&mut self.partial).trim().to_string();
                debug!("[Line] <- {}", reply);
                Ok(reply)
            }
            // End of stream, with or without an unterminated fragment.
            Ok(_) => {
                self.online = false;
                Err(LineFault::Closed("connection closed".into()))
            }
            Err(e) => Err(self.fault(e)),
        }
    }

    fn fault(&mut self, e: io::Error) -> LineFault {
        match e.kind() {
            ErrorKind::WouldBlock | ErrorKind::TimedOut => LineFault::Timeout,
            _ => {
                self.online = false;
                LineFault::Closed(e.to_string())
            }
        }
    }

    fn set_output(&mut self, command: &str, percent: f64) -> Result<(), ActuatorError> {
        let echoes = |payload: &str| {
            payload
                .parse::<f64>()
                .is_ok_and(|echo| (echo - percent).abs() <= 0.01)
        };
        self.request(command, Some(format!("{:.2}", percent)), echoes)
            .map(|_| ())
            .map_err(|f| match f {
                LineFault::Timeout => ActuatorError::Timeout,
                LineFault::Closed(msg) => ActuatorError::Write(msg),
                LineFault::Unexpected(reply) => ActuatorError::Protocol(reply),
            })
    }
}

fn write_line<W: Write>(w: &mut W, line: &str) -> io::Result<()> {
    w.write_all(line.as_bytes())?;
    w.write_all(b"\n")?;
    w.flush()
}

impl LineDevice<TcpStream> {
    /// Connect to a serial-over-TCP bridge with bounded read/write timeouts.
    pub fn connect_tcp(addr: &str, timeout: Duration) -> io::Result<Self> {
        let target = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(ErrorKind::NotFound, format!("no address for {addr}")))?;
        let stream = TcpStream::connect_timeout(&target, timeout)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        stream.set_nodelay(true)?;
        info!("[Line] connected to {}", target);
        Ok(Self::new(stream))
    }
}

impl<S: Read + Write> TemperatureSensor for LineDevice<S> {
    fn read(&mut self) -> Result<f64, SensorError> {
        let payload = self.request("T1", None, |_| true).map_err(|f| match f {
            LineFault::Timeout => SensorError::Timeout,
            LineFault::Closed(msg) => SensorError::Unavailable(msg),
            LineFault::Unexpected(reply) => SensorError::Malformed(reply),
        })?;
        let value = payload
            .parse::<f64>()
            .map_err(|_| SensorError::Malformed(payload.clone()))?;
        checked_reading(value)
    }

    fn is_online(&self) -> bool {
        self.online
    }
}

impl<S: Read + Write> Actuator for LineDevice<S> {
    fn set_heater_percent(&mut self, percent: f64) -> Result<(), ActuatorError> {
        self.set_output("Q1", percent)
    }

    fn set_indicator(&mut self, percent: f64) -> Result<(), ActuatorError> {
        self.set_output("LED", percent)
    }

    fn release(&mut self) -> Result<(), ActuatorError> {
        let result = match self.request("X", None, |_| true) {
            Ok(_) => Ok(()),
            Err(LineFault::Timeout) => Err(ActuatorError::Timeout),
            Err(LineFault::Closed(msg)) => Err(ActuatorError::Write(msg)),
            Err(LineFault::Unexpected(reply)) => Err(ActuatorError::Protocol(reply)),
        };
        self.online = false;
        result
    }
}

/// Clonable handle to one board shared by the sensor and actuator roles.
pub struct SharedLineDevice<S: Read + Write>(Arc<Mutex<LineDevice<S>>>);

impl<S: Read + Write> Clone for SharedLineDevice<S> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<S: Read + Write> TemperatureSensor for SharedLineDevice<S> {
    fn read(&mut self) -> Result<f64, SensorError> {
        self.0.lock().read()
    }

    fn is_online(&self) -> bool {
        self.0.lock().is_online()
    }
}

impl<S: Read + Write> Actuator for SharedLineDevice<S> {
    fn set_heater_percent(&mut self, percent: f64) -> Result<(), ActuatorError> {
        self.0.lock().set_heater_percent(percent)
    }

    fn set_indicator(&mut self, percent: f64) -> Result<(), ActuatorError> {
        self.0.lock().set_indicator(percent)
    }

    fn release(&mut self) -> Result<(), ActuatorError> {
        self.0.lock().release()
    }
}
