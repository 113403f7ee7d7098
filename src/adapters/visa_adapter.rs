//! VISA link for the DSP 7265 (GPIB/USB/Ethernet)
//!
//! Maps register names onto the instrument's ASCII command set and converts
//! between its integer codes and the raw physical values the attribute layer
//! expects. VISA I/O is blocking, so it runs on Tokio's blocking pool with the
//! session behind a `std::sync::Mutex`.
//!
//! The session carries an I/O timeout equal to the link timeout, so a blocking
//! exchange ends on its own after the caller's own timeout fires. Exchanges
//! never queue on the session: if an earlier exchange still holds it, or the
//! caller has already given up, the request fails with `LinkUnavailable`
//! without reaching the instrument. A write reported as failed is therefore
//! not applied later behind a subsequent read.
//!
//! Supports resource strings like:
//! - "GPIB::12::INSTR" (factory default address)
//! - "GPIB0::12::INSTR"
//! - "TCPIP0::192.168.1.100::INSTR"

use async_trait::async_trait;
use std::time::Duration;

use crate::error::{AppResult, DaqError};
use crate::link::{dsp7265, registers, InstrumentLink};

#[cfg(any(test, feature = "instrument_visa"))]
use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(any(test, feature = "instrument_visa"))]
use std::sync::{Arc, Mutex, TryLockError};
#[cfg(feature = "instrument_visa")]
use tracing::{debug, info};

/// Conversion between the instrument's reply/argument and the raw value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Codec {
    /// Floating-point reply and argument.
    Float,
    /// Integer code, `raw = code * factor + offset`.
    Linear {
        /// Raw units per code step.
        factor: f64,
        /// Raw value of code 0.
        offset: f64,
    },
    /// Floating-point reply, integer argument indexing `table`.
    Table(&'static [f64]),
    /// 0/1 code, `raw = 1 - code`.
    Inverted,
}

/// Command pair for one register.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegisterCommand {
    /// Query mnemonic, sent as-is.
    pub query: &'static str,
    /// `None` for registers the instrument does not accept writes to.
    pub set: Option<&'static str>,
    /// Reply/argument conversion.
    pub codec: Codec,
}

/// DSP 7265 command for `register`.
///
/// # Errors
///
/// [`DaqError::Instrument`] for register names the instrument has no command for.
pub fn command_for(register: &str) -> AppResult<RegisterCommand> {
    Ok(match register {
        registers::X => cmd("X.", None, Codec::Float),
        registers::Y => cmd("Y.", None, Codec::Float),
        registers::MAGNITUDE => cmd("MAG.", None, Codec::Float),
        registers::PHASE => cmd("PHA.", None, Codec::Float),
        registers::TIME_CONSTANT => cmd("TC.", Some("TC"), Codec::Table(&dsp7265::TIME_CONSTANTS)),
        registers::SENSITIVITY => cmd("SEN.", Some("SEN"), Codec::Table(&dsp7265::SENSITIVITIES)),
        registers::GAIN => cmd(
            "ACGAIN",
            Some("ACGAIN"),
            Codec::Linear {
                factor: 10.0,
                offset: 0.0,
            },
        ),
        registers::SLOPE => cmd(
            "SLOPE",
            Some("SLOPE"),
            Codec::Linear {
                factor: 6.0,
                offset: 6.0,
            },
        ),
        registers::FREQUENCY => cmd("OF.", Some("OF."), Codec::Float),
        registers::REFERENCE => cmd(
            "IE",
            Some("IE"),
            Codec::Linear {
                factor: 1.0,
                offset: 0.0,
            },
        ),
        registers::COUPLING => cmd(
            "CP",
            Some("CP"),
            Codec::Linear {
                factor: 1.0,
                offset: 0.0,
            },
        ),
        registers::GROUND => cmd("FLOAT", Some("FLOAT"), Codec::Inverted),
        other => {
            return Err(DaqError::Instrument(format!(
                "no DSP 7265 command for register '{other}'"
            )))
        }
    })
}

const fn cmd(query: &'static str, set: Option<&'static str>, codec: Codec) -> RegisterCommand {
    RegisterCommand { query, set, codec }
}

impl RegisterCommand {
    /// Parse a reply into the raw value.
    ///
    /// The 7265 terminates replies with CR LF and may append a NUL.
    pub fn decode(&self, reply: &str) -> AppResult<f64> {
        let trimmed = reply.trim_matches(|c: char| c.is_whitespace() || c == '\0');
        let value: f64 = trimmed.parse().map_err(|_| {
            DaqError::Instrument(format!("unparseable reply '{trimmed}' to {}", self.query))
        })?;
        Ok(match self.codec {
            Codec::Float | Codec::Table(_) => value,
            Codec::Linear { factor, offset } => value * factor + offset,
            Codec::Inverted => 1.0 - value,
        })
    }

    /// Build the command line that writes `raw`.
    pub fn encode(&self, raw: f64) -> AppResult<String> {
        let set = self.set.ok_or_else(|| {
            DaqError::Instrument(format!("{} cannot be written", self.query))
        })?;
        let argument = match self.codec {
            Codec::Float => format!("{raw}"),
            Codec::Linear { factor, offset } => format!("{}", ((raw - offset) / factor).round() as i64),
            Codec::Table(table) => {
                let code = table
                    .iter()
                    .position(|c| (c - raw).abs() <= 1e-9 * c.abs().max(1e-12))
                    .ok_or_else(|| {
                        DaqError::Instrument(format!("{raw} is not a valid {set} setting"))
                    })?;
                code.to_string()
            }
            Codec::Inverted => format!("{}", (1.0 - raw).round() as i64),
        };
        Ok(format!("{set} {argument}"))
    }
}

/// DSP 7265 over VISA.
pub struct VisaLink {
    /// VISA resource string (e.g., "GPIB::12::INSTR")
    pub(crate) resource_string: String,

    /// Open and I/O timeout
    pub(crate) timeout: Duration,

    /// Line terminator for commands
    pub(crate) line_terminator: String,

    #[cfg(feature = "instrument_visa")]
    session: Arc<Mutex<Option<visa::Session>>>,
}

impl VisaLink {
    /// Create an unopened link with default settings.
    pub fn new(resource_string: impl Into<String>) -> Self {
        Self {
            resource_string: resource_string.into(),
            timeout: Duration::from_secs(2),
            line_terminator: "\n".to_string(),
            #[cfg(feature = "instrument_visa")]
            session: Arc::new(Mutex::new(None)),
        }
    }

    /// Bound on opening the resource and on every VISA read or write.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Terminator appended to every command line.
    pub fn with_line_terminator(mut self, terminator: impl Into<String>) -> Self {
        self.line_terminator = terminator.into();
        self
    }

    /// Open the VISA session, closing any previous one first.
    ///
    /// Waits for an exchange that is still running on the blocking pool; the
    /// I/O timeout bounds that wait.
    #[cfg(feature = "instrument_visa")]
    pub async fn connect(&self) -> AppResult<()> {
        let resource = self.resource_string.clone();
        let timeout = self.timeout;
        let slot = self.session.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = slot
                .lock()
                .map_err(|_| DaqError::unavailable("session", "VISA session lock poisoned"))?;
            *guard = None;
            *guard = Some(visa::Session::open(&resource, timeout)?);
            Ok::<(), DaqError>(())
        })
        .await
        .map_err(|e| DaqError::unavailable("session", format!("VISA open task failed: {e}")))??;

        info!("VISA resource '{}' opened", self.resource_string);
        Ok(())
    }

    /// Always fails: built without VISA support.
    #[cfg(not(feature = "instrument_visa"))]
    pub async fn connect(&self) -> AppResult<()> {
        Err(DaqError::unavailable(
            "session",
            "VISA support not enabled. Rebuild with --features instrument_visa",
        ))
    }

    /// Send `line` and, if `expect_reply`, read one reply line.
    ///
    /// If the caller stops waiting (timeout), the exchange is marked abandoned
    /// and is skipped when it has not reached the instrument yet.
    #[cfg(feature = "instrument_visa")]
    async fn transact(&self, register: &str, line: String, expect_reply: bool) -> AppResult<String> {
        let slot = self.session.clone();
        let abandoned = AbandonOnDrop::new();
        let flag = abandoned.flag();
        let register_owned = register.to_string();
        let terminator = self.line_terminator.clone();
        let reply = tokio::task::spawn_blocking(move || {
            exchange_exclusive(&*slot, &flag, &register_owned, |session| {
                session.exchange(&format!("{line}{terminator}"), expect_reply)
            })
        })
        .await
        .map_err(|e| DaqError::unavailable(register, format!("VISA I/O task failed: {e}")))??;
        drop(abandoned);
        debug!("VISA '{}' -> '{}'", register, reply.trim());
        Ok(reply)
    }

    #[cfg(not(feature = "instrument_visa"))]
    async fn transact(&self, register: &str, _line: String, _expect_reply: bool) -> AppResult<String> {
        Err(DaqError::unavailable(
            register,
            "VISA support not enabled. Rebuild with --features instrument_visa",
        ))
    }
}

/// Marks a blocking exchange abandoned when the awaiting future is dropped.
#[cfg(any(test, feature = "instrument_visa"))]
struct AbandonOnDrop(Arc<AtomicBool>);

#[cfg(any(test, feature = "instrument_visa"))]
impl AbandonOnDrop {
    fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    fn flag(&self) -> Arc<AtomicBool> {
        self.0.clone()
    }
}

#[cfg(any(test, feature = "instrument_visa"))]
impl Drop for AbandonOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Run `exchange` on the open session without queueing.
///
/// A session still held by an earlier exchange, or a request whose caller has
/// already given up, fails with `LinkUnavailable` and never reaches the
/// instrument.
#[cfg(any(test, feature = "instrument_visa"))]
fn exchange_exclusive<S, T>(
    slot: &Mutex<Option<S>>,
    abandoned: &AtomicBool,
    register: &str,
    exchange: impl FnOnce(&mut S) -> Result<T, String>,
) -> AppResult<T> {
    let mut guard = match slot.try_lock() {
        Ok(guard) => guard,
        Err(TryLockError::WouldBlock) => {
            return Err(DaqError::unavailable(
                register,
                "previous VISA exchange still in progress",
            ))
        }
        Err(TryLockError::Poisoned(_)) => {
            return Err(DaqError::unavailable(register, "VISA session lock poisoned"))
        }
    };
    if abandoned.load(Ordering::SeqCst) {
        return Err(DaqError::unavailable(
            register,
            "request abandoned before reaching the instrument",
        ));
    }
    let session = guard
        .as_mut()
        .ok_or_else(|| DaqError::unavailable(register, "VISA session not open"))?;
    exchange(session).map_err(|e| DaqError::unavailable(register, e))
}

#[async_trait]
impl InstrumentLink for VisaLink {
    async fn get_register(&self, register: &str) -> AppResult<f64> {
        let command = command_for(register)?;
        let reply = self
            .transact(register, command.query.to_string(), true)
            .await?;
        command.decode(&reply)
    }

    async fn set_register(&self, register: &str, value: f64) -> AppResult<()> {
        let line = command_for(register)?.encode(value)?;
        self.transact(register, line, false).await.map(|_| ())
    }

    async fn reconnect(&self) -> AppResult<()> {
        self.connect().await
    }

    fn time_constants(&self) -> Vec<f64> {
        dsp7265::TIME_CONSTANTS.to_vec()
    }

    fn sensitivities(&self) -> Vec<f64> {
        dsp7265::SENSITIVITIES.to_vec()
    }

    fn references(&self) -> Vec<f64> {
        dsp7265::REFERENCES.to_vec()
    }

    fn info(&self) -> String {
        format!(
            "VisaLink({} @ {}ms timeout)",
            self.resource_string,
            self.timeout.as_millis()
        )
    }
}

#[cfg(feature = "instrument_visa")]
mod visa {
    //! Thin wrapper over the blocking visa-rs session.

    use std::ffi::CString;
    use std::io::{BufRead, BufReader, Write};
    use std::time::Duration;
    use visa_rs::attribute::{AttrTmoValue, HasAttribute};
    use visa_rs::prelude::*;

    use crate::error::{AppResult, DaqError};

    pub(super) struct Session {
        // Sessions close when their resource manager drops.
        _rm: DefaultRM,
        instrument: Instrument,
    }

    impl Session {
        /// Open `resource` and set its I/O timeout to `timeout`.
        pub(super) fn open(resource: &str, timeout: Duration) -> AppResult<Self> {
            let unavailable = |e: &dyn std::fmt::Display| DaqError::unavailable("session", e.to_string());
            let rm = DefaultRM::new().map_err(|e| unavailable(&e))?;
            let name = VisaString::from(CString::new(resource).map_err(|e| unavailable(&e))?);
            let instrument = rm
                .open(&name, AccessMode::NO_LOCK, timeout)
                .map_err(|e| unavailable(&e))?;

            let millis = u32::try_from(timeout.as_millis())
                .unwrap_or(u32::MAX)
                .clamp(1, 0xFFFF_FFFE);
            let io_timeout = AttrTmoValue::new_checked(millis)
                .ok_or_else(|| unavailable(&format!("invalid VISA timeout {millis}ms")))?;
            instrument.set_attr(io_timeout).map_err(|e| unavailable(&e))?;

            Ok(Self {
                _rm: rm,
                instrument,
            })
        }

        pub(super) fn exchange(&mut self, line: &str, expect_reply: bool) -> Result<String, String> {
            (&self.instrument)
                .write_all(line.as_bytes())
                .map_err(|e| e.to_string())?;
            if !expect_reply {
                return Ok(String::new());
            }
            let mut reply = String::new();
            BufReader::new(&self.instrument)
                .read_line(&mut reply)
                .map_err(|e| e.to_string())?;
            Ok(reply)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visa_link_creation() {
        let link = VisaLink::new("GPIB::12::INSTR");
        assert_eq!(link.resource_string, "GPIB::12::INSTR");
        assert_eq!(link.timeout, Duration::from_secs(2));
        assert_eq!(link.line_terminator, "\n");
    }

    #[test]
    fn test_info_string() {
        let link = VisaLink::new("GPIB0::12::INSTR")
            .with_timeout(Duration::from_millis(3000))
            .with_line_terminator("\r\n");
        let info = link.info();
        assert!(info.contains("GPIB0::12::INSTR"));
        assert!(info.contains("3000ms"));
        assert_eq!(link.line_terminator, "\r\n");
    }

    #[test]
    fn test_every_register_has_a_command() {
        for register in registers::ALL {
            assert!(command_for(register).is_ok(), "{register}");
        }
        assert!(command_for("bogus").is_err());
    }

    #[test]
    fn test_gain_codes() {
        let gain = command_for(registers::GAIN).unwrap();
        assert_eq!(gain.decode("3\r\n").unwrap(), 30.0);
        assert_eq!(gain.encode(30.0).unwrap(), "ACGAIN 3");
    }

    #[test]
    fn test_slope_codes() {
        let slope = command_for(registers::SLOPE).unwrap();
        assert_eq!(slope.decode("0").unwrap(), 6.0);
        assert_eq!(slope.decode("3").unwrap(), 24.0);
        assert_eq!(slope.encode(18.0).unwrap(), "SLOPE 2");
    }

    #[test]
    fn test_time_constant_table() {
        let tc = command_for(registers::TIME_CONSTANT).unwrap();
        assert_eq!(tc.decode("5.0E-03\r\n\0").unwrap(), 5.0e-3);
        assert_eq!(tc.encode(5.0e-3).unwrap(), "TC 7");
        assert_eq!(tc.encode(50.0e3).unwrap(), "TC 28");
        assert!(tc.encode(3.0e-3).is_err());
    }

    #[test]
    fn test_ground_inverts_float() {
        let ground = command_for(registers::GROUND).unwrap();
        assert_eq!(ground.decode("0").unwrap(), 1.0);
        assert_eq!(ground.decode("1").unwrap(), 0.0);
        assert_eq!(ground.encode(1.0).unwrap(), "FLOAT 0");
    }

    #[test]
    fn test_signal_channels_not_writable() {
        let x = command_for(registers::X).unwrap();
        assert!(x.encode(1.0).is_err());
        assert!(x.decode("garbage").is_err());
    }

    #[test]
    fn test_exchange_runs_on_free_session() {
        let slot = Mutex::new(Some(Vec::<String>::new()));
        let flag = AtomicBool::new(false);
        let reply = exchange_exclusive(&slot, &flag, registers::GAIN, |sent| {
            sent.push("ACGAIN 3".to_string());
            Ok("ok".to_string())
        })
        .unwrap();
        assert_eq!(reply, "ok");
        assert_eq!(slot.lock().unwrap().as_deref(), Some(&["ACGAIN 3".to_string()][..]));
    }

    #[test]
    fn test_busy_session_rejects_instead_of_queueing() {
        let slot = Mutex::new(Some(Vec::<String>::new()));
        let flag = AtomicBool::new(false);

        // An earlier, timed-out exchange still owns the session.
        let held = slot.lock().unwrap();
        let err = exchange_exclusive(&slot, &flag, registers::GAIN, |sent| {
            sent.push("ACGAIN 3".to_string());
            Ok(())
        })
        .unwrap_err();
        drop(held);

        assert!(matches!(err, DaqError::LinkUnavailable { ref register, .. } if register == "gain"));
        assert!(slot.lock().unwrap().as_ref().unwrap().is_empty());
    }

    #[test]
    fn test_abandoned_write_never_reaches_instrument() {
        let slot = Mutex::new(Some(Vec::<String>::new()));
        let guard = AbandonOnDrop::new();
        let flag = guard.flag();
        assert!(!flag.load(Ordering::SeqCst));

        // The caller's timeout drops the awaiting future before the blocking
        // task gets the session.
        drop(guard);
        let err = exchange_exclusive(&slot, &flag, registers::GAIN, |sent| {
            sent.push("ACGAIN 3".to_string());
            Ok(())
        })
        .unwrap_err();

        assert!(err.is_transient());
        assert!(slot.lock().unwrap().as_ref().unwrap().is_empty());
    }

    #[test]
    fn test_closed_session_is_unavailable() {
        let slot: Mutex<Option<Vec<String>>> = Mutex::new(None);
        let flag = AtomicBool::new(false);
        let err = exchange_exclusive(&slot, &flag, registers::X, |_| Ok(())).unwrap_err();
        assert!(matches!(err, DaqError::LinkUnavailable { .. }));

        let slot = Mutex::new(Some(()));
        let err = exchange_exclusive::<_, ()>(&slot, &flag, registers::X, |_| {
            Err("VI_ERROR_TMO".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("VI_ERROR_TMO"));
    }

    #[tokio::test]
    #[cfg(not(feature = "instrument_visa"))]
    async fn test_without_feature_link_is_unavailable() {
        let link = VisaLink::new("GPIB::12::INSTR");
        assert!(link.connect().await.is_err());
        let err = link.get_register(registers::GAIN).await.unwrap_err();
        assert!(err.is_transient());
    }
}
