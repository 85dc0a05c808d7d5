//! A rust driver and acquisition engine for the Keithley 2000 bench multimeter.
//!
//! This crate provides the command layer for the Keithley 2000 (measurement function
//! configuration, digital filter, display and auto-zero control, trigger setup, single
//! and burst readings via the internal trace buffer), resource discovery for finding a
//! meter on the bus, and a threaded acquisition controller that feeds a bounded live
//! sample store for display, statistics, and export.
//!
//! # Example
//!
//! This example shows the usage via the serial interface.
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use keithley_2000::{
//!     AcquisitionController, AcquisitionMode, ContinuousSettings, Keithley2000,
//!     MeasFunction, MeasurementConfig, SerialInterfaceKeithley2000,
//! };
//!
//! // The port where the Keithley 2000 is connected to
//! let port = "/dev/ttyUSB0";
//!
//! let interface = SerialInterfaceKeithley2000::simple(port).expect("Failed to open serial port");
//! let mut inst = Keithley2000::new(interface);
//!
//! // Query the name of the instrument
//! println!("{}", inst.identify().unwrap());
//!
//! // Acquire DC voltage for ten seconds and print what came in.
//! let mut controller = AcquisitionController::new(inst);
//! controller
//!     .configure(MeasurementConfig {
//!         function: MeasFunction::VoltageDc,
//!         nplc: Some(1.0),
//!         ..MeasurementConfig::default()
//!     })
//!     .unwrap();
//! controller
//!     .start(AcquisitionMode::Continuous(ContinuousSettings {
//!         duration_limit: Some(Duration::from_secs(10)),
//!         ..ContinuousSettings::default()
//!     }))
//!     .unwrap();
//! while controller.status().state != keithley_2000::RunState::Idle {
//!     std::thread::sleep(Duration::from_millis(100));
//! }
//! for sample in controller.snapshot() {
//!     println!("{:.3} s: {} V", sample.elapsed, sample.value);
//! }
//! ```

#![warn(missing_docs)]

mod acquisition;
mod config;
pub mod discovery;
mod interface;
mod store;

pub use acquisition::{
    AcquisitionController, AcquisitionMode, BufferProgress, BufferedSettings,
    ContinuousSettings, DEFAULT_STORE_CAPACITY, RunState, RunStatus, synthesize_timestamps,
};
pub use config::{
    FilterConfig, FilterMode, FunctionCaps, MeasFunction, MeasurementConfig, RangeSetting,
    TriggerSource,
};
pub use interface::SerialInterfaceKeithley2000;
pub use store::{Sample, SampleStore};

use std::{
    sync::{Arc, Mutex},
    thread,
    time::Duration,
};

use dmmrs::{DmmError, Transport};
use measurements::{Current, Frequency, Resistance, Temperature, Voltage};

/// Number of points the instrument's internal trace buffer can hold.
pub const BUFFER_CAPACITY: usize = 1024;

/// A rust driver for the Keithley 2000.
///
/// The driver wraps any transport implementing the [`Transport`] trait and provides the
/// full command layer of the meter. It is cheap to clone; clones share the underlying
/// connection, which is how the acquisition worker thread gets its own handle.
///
/// See the top-level documentation for an example on how to use this driver.
pub struct Keithley2000<T: Transport> {
    interface: Arc<Mutex<Option<T>>>,
}

impl<T: Transport> Keithley2000<T> {
    /// Create a new Keithley 2000 instance with the given transport.
    ///
    /// # Arguments
    /// * `interface` - A transport that implements the [`Transport`] trait.
    pub fn new(interface: T) -> Self {
        Keithley2000 {
            interface: Arc::new(Mutex::new(Some(interface))),
        }
    }

    /// Whether the driver still holds an open connection.
    pub fn is_connected(&self) -> bool {
        self.interface
            .lock()
            .expect("Mutex should not be poisoned")
            .is_some()
    }

    /// Return the meter to local (front panel) operation and drop the connection.
    ///
    /// The local-mode command is best effort; if it fails the failure is logged and the
    /// connection is dropped anyway. Every subsequent operation on this driver or any of
    /// its clones fails with [`DmmError::NotConnected`].
    pub fn disconnect(&mut self) {
        if let Err(e) = self.set_local() {
            log::warn!("Failed to return the meter to local mode: {e}");
        }
        self.interface
            .lock()
            .expect("Mutex should not be poisoned")
            .take();
    }

    /// Return the meter to local (front panel) operation without closing the connection.
    ///
    /// Any subsequent command puts it back under remote control.
    pub fn set_local(&mut self) -> Result<(), DmmError> {
        self.sendcmd("SYST:LOC")
    }

    /// Query the identification of the instrument.
    ///
    /// Returns a comma-separated string of manufacturer, model, serial number, and
    /// firmware version.
    pub fn identify(&mut self) -> Result<String, DmmError> {
        self.query("*IDN?")
    }

    /// Reset the instrument to its power-on defaults.
    ///
    /// The meter needs a moment to settle after a reset before it accepts the next
    /// command.
    pub fn reset(&mut self) -> Result<(), DmmError> {
        self.sendcmd("*RST")?;
        thread::sleep(Duration::from_millis(500));
        Ok(())
    }

    /// Clear the instrument's status registers and error queue.
    pub fn clear_status(&mut self) -> Result<(), DmmError> {
        self.sendcmd("*CLS")
    }

    /// Read one entry from the instrument's error queue.
    ///
    /// Returns the error code and message; code 0 means no error is pending.
    pub fn read_error(&mut self) -> Result<(i32, String), DmmError> {
        let resp = self.query("SYST:ERR?")?;
        let (code, message) = resp
            .split_once(',')
            .ok_or_else(|| DmmError::ResponseParse(resp.clone()))?;
        let code = code
            .trim()
            .parse::<i32>()
            .map_err(|_| DmmError::ResponseParse(resp.clone()))?;
        Ok((code, message.trim().trim_matches('"').to_string()))
    }

    /// Check the instrument's error queue and fail if the meter reports a fault.
    pub fn check_error(&mut self) -> Result<(), DmmError> {
        let (code, message) = self.read_error()?;
        if code != 0 {
            return Err(DmmError::Device { code, message });
        }
        Ok(())
    }

    /// Emit a beep from the instrument.
    ///
    /// # Arguments
    /// * `frequency` - Beep frequency in hertz.
    /// * `duration` - Beep duration in seconds.
    pub fn beep(&mut self, frequency: u32, duration: f64) -> Result<(), DmmError> {
        self.sendcmd(&format!("SYST:BEEP {frequency},{duration}"))
    }

    /// Configure the measurement function, range, and integration time.
    ///
    /// Emits `CONF:<func>`, then the range commands if the function supports range
    /// selection, then the NPLC command if the function supports integration-time
    /// control. Range and NPLC settings for functions outside their capability sets are
    /// accepted and silently withheld; sending them would make the device error instead.
    /// Filter, display, auto-zero, and trigger settings from the config are applied
    /// with their own commands afterwards.
    ///
    /// # Arguments
    /// * `cfg` - The measurement configuration to apply.
    pub fn configure(&mut self, cfg: &MeasurementConfig) -> Result<(), DmmError> {
        cfg.validate()?;
        let func = cfg.function.scpi_name();
        let caps = cfg.function.capabilities();

        self.sendcmd(&format!("CONF:{func}"))?;

        if caps.range {
            match cfg.range {
                RangeSetting::Auto => self.sendcmd(&format!("{func}:RANG:AUTO ON"))?,
                RangeSetting::Fixed(value) => {
                    self.sendcmd(&format!("{func}:RANG:AUTO OFF"))?;
                    self.sendcmd(&format!("{func}:RANG {value}"))?;
                }
            }
        }

        if caps.nplc
            && let Some(nplc) = cfg.nplc
        {
            self.sendcmd(&format!("{func}:NPLC {nplc}"))?;
        }

        self.set_filter(&cfg.filter)?;
        self.set_display(cfg.display_enabled)?;
        self.set_autozero(cfg.autozero_enabled)?;
        self.set_trigger_source(cfg.trigger_source)?;
        Ok(())
    }

    /// Set the integration time in power line cycles for a function.
    ///
    /// Functions without NPLC support accept the call but nothing is sent; the device
    /// would reject the command.
    ///
    /// # Arguments
    /// * `function` - The measurement function to set the NPLC for.
    /// * `nplc` - Integration time in power line cycles, 0.01 to 10.
    pub fn set_nplc(&mut self, function: MeasFunction, nplc: f64) -> Result<(), DmmError> {
        if !nplc.is_finite() || !(0.01..=10.0).contains(&nplc) {
            return Err(DmmError::Config(format!(
                "NPLC value {nplc} is out of range. Allowed range is [0.01, 10]."
            )));
        }
        if !function.capabilities().nplc {
            return Ok(());
        }
        self.sendcmd(&format!("{}:NPLC {nplc}", function.scpi_name()))
    }

    /// Configure the digital averaging filter.
    ///
    /// When enabling, the averaging mode and window size are sent before the filter is
    /// armed; arming first would apply stale parameters. Disabling sends a single
    /// command.
    ///
    /// # Arguments
    /// * `filter` - The filter configuration to apply.
    pub fn set_filter(&mut self, filter: &FilterConfig) -> Result<(), DmmError> {
        if filter.enabled {
            self.sendcmd(&format!("AVER:TCON {}", filter.mode.scpi_name()))?;
            self.sendcmd(&format!("AVER:COUN {}", filter.window))?;
            self.sendcmd("AVER:STAT ON")
        } else {
            self.sendcmd("AVER:STAT OFF")
        }
    }

    /// Turn the instrument's front panel display on or off.
    ///
    /// Turning the display off gains roughly 10-15% measurement speed.
    pub fn set_display(&mut self, enabled: bool) -> Result<(), DmmError> {
        self.sendcmd(&format!("DISP:ENAB {}", if enabled { 1 } else { 0 }))
    }

    /// Turn auto-zero on or off.
    ///
    /// With auto-zero off the meter skips its periodic zero-reference measurement,
    /// trading long-term accuracy for speed.
    pub fn set_autozero(&mut self, enabled: bool) -> Result<(), DmmError> {
        self.sendcmd(&format!("SYST:AZER:STAT {}", if enabled { 1 } else { 0 }))
    }

    /// Select the trigger source.
    pub fn set_trigger_source(&mut self, source: TriggerSource) -> Result<(), DmmError> {
        self.sendcmd(&format!("TRIG:SOUR {}", source.scpi_name()))
    }

    /// Trigger one measurement and return the reading.
    pub fn measure_single(&mut self) -> Result<f64, DmmError> {
        let resp = self.query("READ?")?;
        parse_reading(&resp)
    }

    /// Trigger one measurement with trigger and fetch combined in a single transaction.
    ///
    /// Faster than [`Keithley2000::measure_single`] since it skips the implicit
    /// reconfiguration of `READ?` and saves one bus round trip. The meter must already
    /// be configured with an immediate trigger source.
    pub fn measure_fast(&mut self) -> Result<f64, DmmError> {
        let resp = self.query("INIT;:FETC?")?;
        parse_reading(&resp)
    }

    /// Initiate a measurement without fetching the result.
    pub fn initiate(&mut self) -> Result<(), DmmError> {
        self.sendcmd("INIT")
    }

    /// Fetch the most recent reading.
    pub fn fetch(&mut self) -> Result<f64, DmmError> {
        let resp = self.query("FETC?")?;
        parse_reading(&resp)
    }

    /// Take a single voltage reading.
    ///
    /// The meter must be configured for a voltage function; the reading is wrapped
    /// as-is.
    pub fn measure_voltage(&mut self) -> Result<Voltage, DmmError> {
        Ok(Voltage::from_volts(self.measure_single()?))
    }

    /// Take a single current reading.
    pub fn measure_current(&mut self) -> Result<Current, DmmError> {
        Ok(Current::from_amperes(self.measure_single()?))
    }

    /// Take a single resistance reading.
    pub fn measure_resistance(&mut self) -> Result<Resistance, DmmError> {
        Ok(Resistance::from_ohms(self.measure_single()?))
    }

    /// Take a single frequency reading.
    pub fn measure_frequency(&mut self) -> Result<Frequency, DmmError> {
        Ok(Frequency::from_hertz(self.measure_single()?))
    }

    /// Take a single temperature reading.
    pub fn measure_temperature(&mut self) -> Result<Temperature, DmmError> {
        Ok(Temperature::from_celsius(self.measure_single()?))
    }

    /// Clear the instrument's trace buffer.
    pub fn buffer_clear(&mut self) -> Result<(), DmmError> {
        self.sendcmd("TRAC:CLE")?;
        thread::sleep(Duration::from_millis(100));
        Ok(())
    }

    /// Configure the trace buffer for a burst capture.
    ///
    /// Stops the feed first, clears the buffer, sets its size, points the feed at the
    /// sense function, and arms it to fill once. The point count is capped at the
    /// instrument's [`BUFFER_CAPACITY`]. The short waits between the feed and clear
    /// commands keep the meter from dropping the follow-up command while it reorganizes
    /// the buffer.
    ///
    /// # Arguments
    /// * `points` - Number of points to capture.
    pub fn buffer_configure(&mut self, points: usize) -> Result<(), DmmError> {
        let points = points.clamp(1, BUFFER_CAPACITY);
        self.sendcmd("TRAC:FEED:CONT NEV")?;
        thread::sleep(Duration::from_millis(50));
        self.sendcmd("TRAC:CLE")?;
        thread::sleep(Duration::from_millis(50));
        self.sendcmd(&format!("TRAC:POIN {points}"))?;
        self.sendcmd("TRAC:FEED SENS1")?;
        self.sendcmd("TRAC:FEED:CONT NEXT")?;
        Ok(())
    }

    /// Start a burst capture into the trace buffer, measuring as fast as possible.
    ///
    /// Enables the buffer-full bit in the measurement status register, sets the trigger
    /// count, selects immediate triggering, and initiates.
    ///
    /// # Arguments
    /// * `count` - Number of measurements to take, capped at [`BUFFER_CAPACITY`].
    pub fn buffer_start(&mut self, count: usize) -> Result<(), DmmError> {
        let count = count.clamp(1, BUFFER_CAPACITY);
        self.sendcmd("STAT:MEAS:ENAB 512")?;
        self.sendcmd(&format!("TRIG:COUN {count}"))?;
        self.sendcmd("TRIG:SOUR IMM")?;
        self.sendcmd("INIT")
    }

    /// Number of points currently stored in the trace buffer.
    ///
    /// The meter sometimes reports the count as a float, so the reply is parsed
    /// float-tolerantly.
    pub fn buffer_count(&mut self) -> Result<usize, DmmError> {
        let resp = self.query("TRAC:POIN:ACT?")?;
        let count = resp
            .trim()
            .parse::<f64>()
            .map_err(|_| DmmError::ResponseParse(resp))?;
        Ok(count as usize)
    }

    /// Whether a burst capture started with [`Keithley2000::buffer_start`] has finished.
    ///
    /// Checks the status byte first and falls back to comparing the fill count against
    /// the target; either signal counts as complete.
    ///
    /// # Arguments
    /// * `target` - The point count the capture was started with.
    pub fn buffer_is_complete(&mut self, target: usize) -> Result<bool, DmmError> {
        let resp = self.query("*STB?")?;
        let stb = resp
            .trim()
            .parse::<i32>()
            .map_err(|_| DmmError::ResponseParse(resp))?;
        if stb & 1 != 0 {
            return Ok(true);
        }
        Ok(self.buffer_count()? >= target.clamp(1, BUFFER_CAPACITY))
    }

    /// Abort any running capture and read the whole trace buffer back.
    ///
    /// The reply is a comma-separated list of readings; an empty reply yields an empty
    /// vector. A value that does not parse as a number is a
    /// [`DmmError::ResponseParse`].
    pub fn buffer_read(&mut self) -> Result<Vec<f64>, DmmError> {
        self.sendcmd("ABOR")?;
        thread::sleep(Duration::from_millis(100));
        let resp = self.query("TRAC:DATA?")?;
        if resp.trim().is_empty() {
            return Ok(Vec::new());
        }
        resp.split(',')
            .filter(|v| !v.trim().is_empty())
            .map(|v| {
                v.trim()
                    .parse::<f64>()
                    .map_err(|_| DmmError::ResponseParse(resp.clone()))
            })
            .collect()
    }

    /// Send a command to the instrument.
    fn sendcmd(&mut self, cmd: &str) -> Result<(), DmmError> {
        let mut guard = self.interface.lock().expect("Mutex should not be poisoned");
        let intf = guard.as_mut().ok_or(DmmError::NotConnected)?;
        intf.sendcmd(cmd)
    }

    /// Query the instrument with a command and return the response as a String.
    fn query(&mut self, cmd: &str) -> Result<String, DmmError> {
        let mut guard = self.interface.lock().expect("Mutex should not be poisoned");
        let intf = guard.as_mut().ok_or(DmmError::NotConnected)?;
        intf.query(cmd)
    }
}

impl<T: Transport> Clone for Keithley2000<T> {
    fn clone(&self) -> Self {
        Self {
            interface: self.interface.clone(),
        }
    }
}

/// Parse a measurement reply as a number.
///
/// Replies are plain decimal or scientific-notation text. A reply that does not parse is
/// a parse error, never coerced to zero.
fn parse_reading(resp: &str) -> Result<f64, DmmError> {
    resp.trim()
        .parse::<f64>()
        .map_err(|_| DmmError::ResponseParse(resp.to_string()))
}
