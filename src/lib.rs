//! Driver for reading pool probes (pH, ORP) through ADS1119 delta-sigma
//! converters on a shared I2C bus.
//!
//! The crate splits into three layers:
//!
//! - [`transport`]: the [`BusTransport`] seam the driver talks through, plus
//!   an adapter over any [`embedded_hal::i2c::I2c`] bus.
//! - [`protocol`]: the [`Ads1119`] command protocol - reset, configure,
//!   start, poll for readiness, read the signed 16-bit result.
//! - [`convert`]: pure math from raw codes to volts and from volts to pH via
//!   a two-point calibration.
//!
//! The `poolprobe` binary wires these together into a fixed-interval polling
//! loop over the pH and ORP channels.

pub mod convert;
pub mod protocol;
pub mod transport;

pub use convert::{
    code_to_voltage, voltage_to_input_signal, voltage_to_ph_uncalibrated, CalibrationError,
    CalibrationPoint, PhCalibration, FRONT_END_GAIN_ORP, FRONT_END_GAIN_PH,
    VOLTS_PER_PH_THEORETICAL,
};
pub use protocol::{
    Ads1119, CaptureOutcome, CmdFlags, ConfigError, ConversionConfig, ConversionMode, DataRate,
    GainSetting, MuxSelection, PollTiming, RegSelectFlags, VoltageReference, WaitOutcome,
    STATUS_CONV_RDY,
};
pub use transport::{BusTransport, I2cBus};

/// The device's internal reference, used when [`VoltageReference::Internal`]
/// is selected.
/// See 8.3.3 Voltage Reference
pub const INTERNAL_REFERENCE_VOLTAGE: f64 = 2.048;
