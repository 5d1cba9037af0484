//! Pure signal math: raw codes to volts, volts to pH.
//!
//! Nothing here touches the bus. Every function is a stateless mapping over
//! explicit inputs, and calibration is validated once at construction rather
//! than checked mid-capture.

/// Full-scale divisor for the 16-bit signed output code.
const CODE_RANGE: f64 = 32768.0;

/// Theoretical Nernstian electrode response at room temperature, used as a
/// calibration-free sanity value next to the calibrated reading.
pub const VOLTS_PER_PH_THEORETICAL: f64 = -0.0592;

/// Fixed op-amp gain ahead of the converter input on the pH channel
/// (1 + 1M/151k in the reference hardware).
pub const FRONT_END_GAIN_PH: f64 = 1.0 + 1.0e6 / 151.0e3;

/// Fixed op-amp gain ahead of the converter input on the ORP channel
/// (1 + 200k/151k).
pub const FRONT_END_GAIN_ORP: f64 = 1.0 + 200.0e3 / 151.0e3;

/// Interpret a raw code as the voltage seen at the converter input.
///
/// `gain_divisor` undoes the converter's internal amplifier (1 for gain-1x
/// reads, 4 for gain-4x reads). Distinct from the external front-end gain,
/// which [voltage_to_input_signal] removes.
pub fn code_to_voltage(code: i16, reference_voltage: f64, gain_divisor: f64) -> f64 {
    f64::from(code) * reference_voltage / CODE_RANGE / gain_divisor
}

/// Undo the fixed op-amp stage between the probe and the converter input.
pub fn voltage_to_input_signal(volts: f64, front_end_gain: f64) -> f64 {
    volts / front_end_gain
}

/// pH from probe volts using the theoretical slope only. A reference value to
/// print next to the calibrated reading, independent of calibration quality.
pub fn voltage_to_ph_uncalibrated(volts: f64) -> f64 {
    7.0 + volts / VOLTS_PER_PH_THEORETICAL
}

/// One buffer-solution reading: known pH, measured probe volts.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CalibrationPoint {
    pub ph: f64,
    pub volts: f64,
}

impl CalibrationPoint {
    pub fn new(ph: f64, volts: f64) -> Self {
        CalibrationPoint { ph, volts }
    }
}

/// Calibration points that cannot define a line.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum CalibrationError {
    #[error("calibration points share the same pH value ({0})")]
    EqualPh(f64),

    #[error("calibration points share the same voltage ({0}V), slope would be zero")]
    ZeroSlope(f64),
}

/// Two-point linear pH calibration.
///
/// Derived once at startup from the low/high buffer readings and never
/// mutated during the run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PhCalibration {
    slope_volts_per_ph: f64,
    volts_at_ph7: f64,
}

impl PhCalibration {
    /// Fit the line through two calibration points.
    ///
    /// The points must differ in pH (the slope divides by the pH delta) and
    /// in volts (pH conversion divides by the slope).
    pub fn derive(low: CalibrationPoint, high: CalibrationPoint) -> Result<Self, CalibrationError> {
        if high.ph == low.ph {
            return Err(CalibrationError::EqualPh(low.ph));
        }
        let slope = (high.volts - low.volts) / (high.ph - low.ph);
        if slope == 0.0 {
            return Err(CalibrationError::ZeroSlope(low.volts));
        }
        Ok(PhCalibration {
            slope_volts_per_ph: slope,
            volts_at_ph7: (7.0 - low.ph) * slope + low.volts,
        })
    }

    /// Probe response in volts per pH unit (negative for a working probe).
    pub fn slope_volts_per_ph(&self) -> f64 {
        self.slope_volts_per_ph
    }

    /// Expected probe voltage in a neutral solution.
    pub fn volts_at_ph7(&self) -> f64 {
        self.volts_at_ph7
    }

    /// pH from probe volts.
    pub fn voltage_to_ph(&self, volts: f64) -> f64 {
        7.0 + (volts - self.volts_at_ph7) / self.slope_volts_per_ph
    }
}
