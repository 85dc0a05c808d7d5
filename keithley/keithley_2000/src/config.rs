//! Measurement configuration for the Keithley 2000.
//!
//! A [`MeasurementConfig`] collects everything the meter needs to know before a run:
//! the measurement function, range, integration time, digital filter, display and
//! auto-zero state, and the trigger source. The acquisition controller applies a full
//! config when a run starts; the individual pieces can also be sent directly through
//! the driver.

use std::fmt::Display;

use dmmrs::DmmError;

/// The logical measurement functions the Keithley 2000 supports.
///
/// Each function maps to a device mnemonic used in `CONF:` and function-prefixed
/// commands. Which optional configuration a function accepts is captured in its
/// [`FunctionCaps`] record; range and integration-time commands are withheld for
/// functions that do not support them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeasFunction {
    /// DC voltage.
    VoltageDc,
    /// AC voltage.
    VoltageAc,
    /// DC current.
    CurrentDc,
    /// AC current.
    CurrentAc,
    /// Two-wire resistance.
    Resistance2W,
    /// Four-wire resistance.
    Resistance4W,
    /// Frequency.
    Frequency,
    /// Period.
    Period,
    /// Temperature (thermocouple input).
    Temperature,
    /// Diode test.
    Diode,
    /// Continuity test.
    Continuity,
}

/// Capability record for one measurement function.
///
/// Queried before optional commands are emitted, so that, e.g., an NPLC request for an
/// AC function is never sent to the device (where it would error).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionCaps {
    /// The function accepts range selection (`RANG`/`RANG:AUTO`).
    pub range: bool,
    /// The function accepts an integration time in power line cycles (`NPLC`).
    pub nplc: bool,
}

impl MeasFunction {
    /// The device mnemonic for this function, as used in `CONF:` and command prefixes.
    pub fn scpi_name(&self) -> &'static str {
        match self {
            MeasFunction::VoltageDc => "VOLT:DC",
            MeasFunction::VoltageAc => "VOLT:AC",
            MeasFunction::CurrentDc => "CURR:DC",
            MeasFunction::CurrentAc => "CURR:AC",
            MeasFunction::Resistance2W => "RES",
            MeasFunction::Resistance4W => "FRES",
            MeasFunction::Frequency => "FREQ",
            MeasFunction::Period => "PER",
            MeasFunction::Temperature => "TEMP",
            MeasFunction::Diode => "DIOD",
            MeasFunction::Continuity => "CONT",
        }
    }

    /// The capability record for this function.
    ///
    /// Static lookup: ranges exist for the voltage, current, and resistance functions;
    /// NPLC only for the DC and resistance functions plus temperature.
    pub fn capabilities(&self) -> FunctionCaps {
        match self {
            MeasFunction::VoltageDc
            | MeasFunction::CurrentDc
            | MeasFunction::Resistance2W
            | MeasFunction::Resistance4W => FunctionCaps {
                range: true,
                nplc: true,
            },
            MeasFunction::VoltageAc | MeasFunction::CurrentAc => FunctionCaps {
                range: true,
                nplc: false,
            },
            MeasFunction::Temperature => FunctionCaps {
                range: false,
                nplc: true,
            },
            MeasFunction::Frequency
            | MeasFunction::Period
            | MeasFunction::Diode
            | MeasFunction::Continuity => FunctionCaps {
                range: false,
                nplc: false,
            },
        }
    }

    /// The display unit for readings taken with this function, for labelling exports.
    pub fn unit(&self) -> &'static str {
        match self {
            MeasFunction::VoltageDc | MeasFunction::VoltageAc | MeasFunction::Diode => "V",
            MeasFunction::CurrentDc | MeasFunction::CurrentAc => "A",
            MeasFunction::Resistance2W | MeasFunction::Resistance4W | MeasFunction::Continuity => {
                "Ω"
            }
            MeasFunction::Frequency => "Hz",
            MeasFunction::Period => "s",
            MeasFunction::Temperature => "°C",
        }
    }
}

impl Display for MeasFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.scpi_name())
    }
}

/// Range selection for a measurement function.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum RangeSetting {
    /// The instrument selects the scale itself.
    #[default]
    Auto,
    /// Fixed full-scale value in base units (volts, amperes, ohms).
    Fixed(f64),
}

/// Averaging mode of the digital filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterMode {
    /// Moving average over the filter window.
    #[default]
    Moving,
    /// Repeating average: the window fills completely before a reading is produced.
    Repeating,
}

impl FilterMode {
    /// The device mnemonic for this averaging mode.
    pub fn scpi_name(&self) -> &'static str {
        match self {
            FilterMode::Moving => "MOV",
            FilterMode::Repeating => "REP",
        }
    }
}

/// Digital filter configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterConfig {
    /// Whether the filter is armed.
    pub enabled: bool,
    /// Number of readings in the filter window, 2 to 100.
    pub window: u16,
    /// Averaging mode.
    pub mode: FilterMode,
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            enabled: false,
            window: 10,
            mode: FilterMode::default(),
        }
    }
}

/// Trigger source for measurements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriggerSource {
    /// Trigger immediately, as fast as the meter can.
    #[default]
    Immediate,
    /// Trigger on a bus trigger command.
    Bus,
    /// Trigger on the external trigger input.
    External,
    /// Trigger on the internal timer.
    Timer,
}

impl TriggerSource {
    /// The device mnemonic for this trigger source.
    pub fn scpi_name(&self) -> &'static str {
        match self {
            TriggerSource::Immediate => "IMM",
            TriggerSource::Bus => "BUS",
            TriggerSource::External => "EXT",
            TriggerSource::Timer => "TIM",
        }
    }
}

/// The full measurement configuration applied when an acquisition run starts.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementConfig {
    /// The measurement function to configure.
    pub function: MeasFunction,
    /// Range selection. Ignored (never sent) for functions without range support.
    pub range: RangeSetting,
    /// Integration time in power line cycles, 0.01 to 10. Ignored (never sent) for
    /// functions without NPLC support.
    pub nplc: Option<f64>,
    /// Digital filter settings.
    pub filter: FilterConfig,
    /// Whether the instrument display stays on during the run. Turning it off gains
    /// measurement speed.
    pub display_enabled: bool,
    /// Whether auto-zero stays on during the run. Turning it off gains speed at the
    /// cost of long-term accuracy.
    pub autozero_enabled: bool,
    /// Trigger source for the run.
    pub trigger_source: TriggerSource,
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        MeasurementConfig {
            function: MeasFunction::VoltageDc,
            range: RangeSetting::Auto,
            nplc: None,
            filter: FilterConfig::default(),
            display_enabled: true,
            autozero_enabled: true,
            trigger_source: TriggerSource::default(),
        }
    }
}

impl MeasurementConfig {
    /// Check the numeric fields against the instrument's accepted bounds.
    ///
    /// Values for unsupported capabilities are not an error (they are withheld when the
    /// config is applied), but a value the instrument itself would reject is.
    pub fn validate(&self) -> Result<(), DmmError> {
        if let Some(nplc) = self.nplc {
            if !nplc.is_finite() || !(0.01..=10.0).contains(&nplc) {
                return Err(DmmError::Config(format!(
                    "NPLC value {nplc} is out of range. Allowed range is [0.01, 10]."
                )));
            }
        }
        if let RangeSetting::Fixed(value) = self.range {
            if !value.is_finite() || value < 0.0 {
                return Err(DmmError::Config(format!(
                    "Range value {value} is not a valid full-scale value."
                )));
            }
        }
        if self.filter.enabled && !(2..=100).contains(&self.filter.window) {
            return Err(DmmError::Config(format!(
                "Filter window {} is out of range. Allowed range is [2, 100].",
                self.filter.window
            )));
        }
        Ok(())
    }
}
