//! The ADS1119 command protocol: reset, configure, start, poll for readiness,
//! read the conversion result.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::transport::BusTransport;
use crate::INTERNAL_REFERENCE_VOLTAGE;

/// Command Flags
/// See 8.5.3
pub struct CmdFlags;
impl CmdFlags {
    pub const RESET: u8 = 0b0000_0110;
    pub const START_SYNC: u8 = 0b0000_1000;
    pub const RDATA: u8 = 0b0001_0000;
    pub const RREG: u8 = 0b0010_0000;
    pub const WREG: u8 = 0b0100_0000;
}

/// Register flags meant to be combined with the RREG command to select
/// the correct register
/// See 8.5.3 (RREG)
/// See 8.6.1 - Table 8 (Register column)
pub struct RegSelectFlags;
impl RegSelectFlags {
    pub const CONFIG: u8 = 0b0000_0000;
    pub const STATUS: u8 = 0b0000_0100;
}

/// Status register bit mask for checking the status register for a
/// "conversion result ready" value
/// See 8.6.2.2
pub const STATUS_CONV_RDY: u8 = 0b1000_0000;

/// Input multiplexer selection, config register bits 7:5.
/// See 8.3.1 Multiplexer
/// See 8.6.2.1 Configuration Register
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MuxSelection {
    /// AINP = AIN0, AINN = AIN1 (differential)
    Ain0Ain1 = 0b000,
    /// AINP = AIN2, AINN = AIN3 (differential)
    Ain2Ain3 = 0b001,
    /// AINP = AIN1, AINN = AIN2 (differential)
    Ain1Ain2 = 0b010,
    /// AINP = AIN0, AINN = AGND (single-ended)
    Ain0Gnd = 0b011,
    /// AINP = AIN1, AINN = AGND (single-ended)
    Ain1Gnd = 0b100,
    /// AINP = AIN2, AINN = AGND (single-ended)
    Ain2Gnd = 0b101,
    /// AINP = AIN3, AINN = AGND (single-ended)
    Ain3Gnd = 0b110,
    /// Both inputs shorted to AVDD / 2
    HalfAvdd = 0b111,
}

impl MuxSelection {
    pub const ALL: [MuxSelection; 8] = [
        MuxSelection::Ain0Ain1,
        MuxSelection::Ain2Ain3,
        MuxSelection::Ain1Ain2,
        MuxSelection::Ain0Gnd,
        MuxSelection::Ain1Gnd,
        MuxSelection::Ain2Gnd,
        MuxSelection::Ain3Gnd,
        MuxSelection::HalfAvdd,
    ];

    pub fn bits(self) -> u8 {
        self as u8
    }
}

/// Internal amplifier gain, config register bit 4.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GainSetting {
    X1 = 0b0,
    X4 = 0b1,
}

impl GainSetting {
    pub fn bits(self) -> u8 {
        self as u8
    }

    /// Divisor that undoes the internal amplifier when scaling a raw code to
    /// volts.
    pub fn divisor(self) -> f64 {
        match self {
            GainSetting::X1 => 1.0,
            GainSetting::X4 => 4.0,
        }
    }
}

/// Sample rate, config register bits 3:2.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataRate {
    Sps20 = 0b00,
    Sps90 = 0b01,
    Sps330 = 0b10,
    Sps1000 = 0b11,
}

/// Conversion mode, config register bit 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConversionMode {
    SingleShot = 0b0,
    Continuous = 0b1,
}

/// Conversion reference source, config register bit 0.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum VoltageReference {
    /// Internal 2.048 V reference (device default).
    Internal,
    /// External reference on REFP/REFN, with its known voltage.
    External(f64),
}

impl VoltageReference {
    /// The voltage used to scale raw codes.
    pub fn volts(self) -> f64 {
        match self {
            VoltageReference::Internal => INTERNAL_REFERENCE_VOLTAGE,
            VoltageReference::External(volts) => volts,
        }
    }
}

/// Invalid conversion configuration, rejected before any bus traffic happens.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("external reference voltage must be positive, got {0}V")]
    NonPositiveReference(f64),
}

/// One conversion's worth of configuration.
///
/// All config register fields are modeled so callers state them explicitly,
/// but only `mux` and `gain` are placed in the command byte today: the device
/// is left at its defaults for data rate (20 SPS), conversion mode
/// (single-shot), and reference source (internal). A known simplification,
/// kept visible here rather than silently dropped.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConversionConfig {
    pub mux: MuxSelection,
    pub gain: GainSetting,
    pub data_rate: DataRate,
    pub mode: ConversionMode,
    pub reference: VoltageReference,
}

impl ConversionConfig {
    /// Config for a single-shot read of `mux` at the given gain, using the
    /// internal reference at the default data rate.
    pub fn new(mux: MuxSelection, gain: GainSetting) -> Self {
        ConversionConfig {
            mux,
            gain,
            data_rate: DataRate::Sps20,
            mode: ConversionMode::SingleShot,
            reference: VoltageReference::Internal,
        }
    }

    /// Replace the reference source. An external reference must carry a
    /// positive voltage since it divides into every converted sample.
    pub fn with_reference(self, reference: VoltageReference) -> Result<Self, ConfigError> {
        if let VoltageReference::External(volts) = reference {
            if volts <= 0.0 {
                return Err(ConfigError::NonPositiveReference(volts));
            }
        }
        Ok(ConversionConfig { reference, ..self })
    }

    /// The byte written to the config register.
    ///
    /// | Bit 7 | Bit 6 | Bit 5 | Bit 4 | Bit 3 | Bit 2 | Bit 1     | Bit 0 |
    /// | MUX Selection         | GAIN  | Data Rate     | Conv Mode | VREF  |
    pub fn command_byte(&self) -> u8 {
        (self.mux.bits() << 5) | (self.gain.bits() << 4)
    }

    /// The reference voltage that scales raw codes for this config.
    pub fn reference_voltage(&self) -> f64 {
        self.reference.volts()
    }
}

/// Deadline and inter-poll sleep for [`Ads1119::wait_for_ready`].
///
/// Injected rather than hard-coded so tests can poll with zero sleeps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollTiming {
    pub max_wait: Duration,
    pub poll_interval: Duration,
}

impl Default for PollTiming {
    fn default() -> Self {
        PollTiming {
            max_wait: Duration::from_millis(1000),
            poll_interval: Duration::from_millis(1),
        }
    }
}

/// Result of polling the status register.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitOutcome {
    Ready { elapsed: Duration },
    TimedOut { elapsed: Duration },
}

/// Result of a full capture cycle.
///
/// A timeout is a designed outcome, not an error: a missed sample is expected
/// transient behavior under continuous polling, and callers log it and move
/// on rather than abort.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureOutcome {
    Ready(i16),
    TimedOut,
}

impl CaptureOutcome {
    /// The raw code, with `-1` standing in for a timeout. Matches the
    /// single-value convention of the original command-line tooling around
    /// this device.
    pub fn raw_code(self) -> i16 {
        match self {
            CaptureOutcome::Ready(code) => code,
            CaptureOutcome::TimedOut => -1,
        }
    }
}

pub struct Ads1119<B> {
    bus: B,
}

impl<B> Ads1119<B>
where
    B: BusTransport,
{
    pub fn new(bus: B) -> Self {
        Ads1119 { bus }
    }

    /// Destroy the `Ads1119` instance and return its transport
    pub fn destroy(self) -> B {
        self.bus
    }

    /// Address the converter that subsequent operations talk to. The bus has
    /// one addressed target at a time, so channels are read strictly in turn.
    pub fn select_channel(&mut self, address: u8) -> Result<(), B::Error> {
        self.bus.select_address(address)
    }

    /// Resets the device to a default state.
    /// See 8.5.3.2
    pub fn reset(&mut self) -> Result<(), B::Error> {
        self.bus.write_command(CmdFlags::RESET)
    }

    /// Write the config register. See [ConversionConfig::command_byte] for
    /// the byte structure.
    pub fn write_config(&mut self, config: &ConversionConfig) -> Result<(), B::Error> {
        self.bus
            .write_command_with_data(CmdFlags::WREG | RegSelectFlags::CONFIG, config.command_byte())
    }

    /// Read the config register back.
    /// See 8.5.3.6 RREG
    pub fn read_config(&mut self) -> Result<u8, B::Error> {
        self.bus.read_byte(CmdFlags::RREG | RegSelectFlags::CONFIG)
    }

    /// Read the status register.
    ///
    /// The only bit that matters is the MSB. If set, a new conversion is ready
    /// to be read with [read_raw_sample](Self::read_raw_sample). If it isn't
    /// set, the application should wait and check the status register again.
    pub fn read_status(&mut self) -> Result<u8, B::Error> {
        self.bus.read_byte(CmdFlags::RREG | RegSelectFlags::STATUS)
    }

    /// In single-shot conversion mode (the only one currently exercised),
    /// this starts a conversion.
    /// See 8.5.3.3
    pub fn start_sync(&mut self) -> Result<(), B::Error> {
        self.bus.write_command(CmdFlags::START_SYNC)
    }

    /// Poll the status register until the ready bit is set or `timing`'s
    /// deadline passes.
    ///
    /// The deadline is measured from the instant polling begins, not from
    /// start-of-conversion, which tolerates slow status reads on a loaded
    /// bus.
    pub fn wait_for_ready(&mut self, timing: &PollTiming) -> Result<WaitOutcome, B::Error> {
        let start_time = Instant::now();
        loop {
            let status = self.read_status()?;
            let elapsed = start_time.elapsed();

            if status & STATUS_CONV_RDY != 0 {
                debug!("result available after {}ms", elapsed.as_millis());
                return Ok(WaitOutcome::Ready { elapsed });
            }
            if elapsed >= timing.max_wait {
                debug!("no result available after {}ms", elapsed.as_millis());
                return Ok(WaitOutcome::TimedOut { elapsed });
            }

            std::thread::sleep(timing.poll_interval)
        }
    }

    /// Reads the 16-bit data register.
    ///
    /// The device transmits the result MSB first, opposite the transport's
    /// native word order, so the word is byte-swapped before being
    /// interpreted as a signed code.
    /// See 8.5.3.5 RDATA
    /// See 8.5.2 Data Format
    pub fn read_raw_sample(&mut self) -> Result<i16, B::Error> {
        let word = self.bus.read_word(CmdFlags::RDATA)?;
        Ok(word.swap_bytes() as i16)
    }

    /// Run one complete conversion cycle:
    /// reset, write config, start, wait for ready, read.
    ///
    /// The order is a hard protocol requirement. Starting before configuring,
    /// or reading before readiness, produces stale or undefined data.
    ///
    /// **IMPORTANT PRECONDITION**
    /// This function requires exclusive access to the ADS1119 for the duration
    /// of the call. This is enforced, implicitly, by the API, but this must
    /// also be true globally: no other process with access to this bus can
    /// touch the device during the call.
    pub fn capture(
        &mut self,
        config: &ConversionConfig,
        timing: &PollTiming,
    ) -> Result<CaptureOutcome, B::Error> {
        debug!("reset");
        self.reset()?;

        debug!("set config {:#04x}", config.command_byte());
        self.write_config(config)?;

        debug!("start");
        self.start_sync()?;

        debug!("waiting");
        match self.wait_for_ready(timing)? {
            WaitOutcome::TimedOut { .. } => Ok(CaptureOutcome::TimedOut),
            WaitOutcome::Ready { .. } => Ok(CaptureOutcome::Ready(self.read_raw_sample()?)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::convert::code_to_voltage;
    use crate::transport::I2cBus;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTransaction};

    const DEVICE_ADDRESS: u8 = 0x40;
    // Since the only bit that is checked is the MSB
    // the "not ready" status should have MSB == 0
    const NOT_READY_STATUS: u8 = !STATUS_CONV_RDY;

    fn new_ads1119(transactions: &[I2cTransaction]) -> Ads1119<I2cBus<I2cMock>> {
        Ads1119::new(I2cBus::new(I2cMock::new(transactions), DEVICE_ADDRESS))
    }

    fn destroy_ads1119(device: Ads1119<I2cBus<I2cMock>>) {
        device.destroy().destroy().done();
    }

    fn fast_timing() -> PollTiming {
        PollTiming {
            max_wait: Duration::from_secs(1),
            poll_interval: Duration::ZERO,
        }
    }

    // deadline of zero: the first not-ready status read times out
    fn expired_timing() -> PollTiming {
        PollTiming {
            max_wait: Duration::ZERO,
            poll_interval: Duration::ZERO,
        }
    }

    #[test]
    fn command_byte_packs_mux_and_gain() {
        for mux in MuxSelection::ALL {
            for gain in [GainSetting::X1, GainSetting::X4] {
                let byte = ConversionConfig::new(mux, gain).command_byte();
                assert_eq!(byte >> 5, mux.bits());
                assert_eq!((byte >> 4) & 0b1, gain.bits());
                // reserved fields stay at their device defaults
                assert_eq!(byte & 0b0000_1111, 0);
            }
        }
    }

    #[test]
    fn external_reference_must_be_positive() {
        let config = ConversionConfig::new(MuxSelection::Ain0Ain1, GainSetting::X1);
        assert_eq!(
            config.with_reference(VoltageReference::External(0.0)),
            Err(ConfigError::NonPositiveReference(0.0))
        );
        assert_eq!(
            config.with_reference(VoltageReference::External(-2.5)),
            Err(ConfigError::NonPositiveReference(-2.5))
        );

        let external = config
            .with_reference(VoltageReference::External(3.3))
            .unwrap();
        assert_eq!(external.reference_voltage(), 3.3);
        assert_eq!(config.reference_voltage(), 2.048);
    }

    #[test]
    fn can_reset() {
        let mut device =
            new_ads1119(&[I2cTransaction::write(DEVICE_ADDRESS, vec![CmdFlags::RESET])]);
        device.reset().unwrap();
        destroy_ads1119(device);
    }

    #[test]
    fn can_write_config() {
        let config = ConversionConfig::new(MuxSelection::Ain0Gnd, GainSetting::X4);
        let mut device = new_ads1119(&[I2cTransaction::write(
            DEVICE_ADDRESS,
            vec![
                CmdFlags::WREG | RegSelectFlags::CONFIG,
                config.command_byte(),
            ],
        )]);
        device.write_config(&config).unwrap();
        destroy_ads1119(device);
    }

    #[test]
    fn can_read_status() {
        let mut device = new_ads1119(&[I2cTransaction::write_read(
            DEVICE_ADDRESS,
            vec![CmdFlags::RREG | RegSelectFlags::STATUS],
            vec![NOT_READY_STATUS],
        )]);
        assert_eq!(device.read_status().unwrap(), NOT_READY_STATUS);
        destroy_ads1119(device);
    }

    #[test]
    fn read_raw_sample_corrects_byte_order() {
        // the device puts 0x1234 on the wire MSB first; an uncorrected
        // little-endian word read would hand back 0x3412
        let mut device = new_ads1119(&[I2cTransaction::write_read(
            DEVICE_ADDRESS,
            vec![CmdFlags::RDATA],
            vec![0x12, 0x34],
        )]);
        assert_eq!(device.read_raw_sample().unwrap(), 0x1234);
        destroy_ads1119(device);
    }

    #[test]
    fn read_raw_sample_keeps_sign() {
        // wire bytes 0x80 0x00: most negative code
        let mut device = new_ads1119(&[I2cTransaction::write_read(
            DEVICE_ADDRESS,
            vec![CmdFlags::RDATA],
            vec![0x80, 0x00],
        )]);
        assert_eq!(device.read_raw_sample().unwrap(), i16::MIN);
        destroy_ads1119(device);
    }

    #[test]
    fn byte_swap_is_an_involution() {
        for word in [0x0000u16, 0x1234, 0x3412, 0x80FF, 0xFFFF] {
            assert_eq!(word.swap_bytes().swap_bytes(), word);
        }
    }

    #[test]
    fn wait_for_ready_returns_as_soon_as_ready() {
        let mut device = new_ads1119(&[I2cTransaction::write_read(
            DEVICE_ADDRESS,
            vec![CmdFlags::RREG | RegSelectFlags::STATUS],
            vec![STATUS_CONV_RDY],
        )]);
        let timing = fast_timing();
        match device.wait_for_ready(&timing).unwrap() {
            WaitOutcome::Ready { elapsed } => assert!(elapsed < timing.max_wait),
            other => panic!("expected Ready, got {other:?}"),
        }
        destroy_ads1119(device);
    }

    #[test]
    fn wait_for_ready_times_out() {
        let mut device = new_ads1119(&[I2cTransaction::write_read(
            DEVICE_ADDRESS,
            vec![CmdFlags::RREG | RegSelectFlags::STATUS],
            vec![NOT_READY_STATUS],
        )]);
        assert!(matches!(
            device.wait_for_ready(&expired_timing()).unwrap(),
            WaitOutcome::TimedOut { .. }
        ));
        destroy_ads1119(device);
    }

    #[test]
    fn capture_runs_the_full_sequence() {
        let config = ConversionConfig::new(MuxSelection::Ain0Ain1, GainSetting::X1);
        let mut device = new_ads1119(&[
            I2cTransaction::write(DEVICE_ADDRESS, vec![CmdFlags::RESET]),
            I2cTransaction::write(
                DEVICE_ADDRESS,
                vec![
                    CmdFlags::WREG | RegSelectFlags::CONFIG,
                    config.command_byte(),
                ],
            ),
            I2cTransaction::write(DEVICE_ADDRESS, vec![CmdFlags::START_SYNC]),
            // first poll reports "not ready yet"
            I2cTransaction::write_read(
                DEVICE_ADDRESS,
                vec![CmdFlags::RREG | RegSelectFlags::STATUS],
                vec![NOT_READY_STATUS],
            ),
            I2cTransaction::write_read(
                DEVICE_ADDRESS,
                vec![CmdFlags::RREG | RegSelectFlags::STATUS],
                vec![STATUS_CONV_RDY],
            ),
            // device sends MSB first: these wire bytes are the code 0x3412,
            // seen by the transport's word read as 0x1234
            I2cTransaction::write_read(DEVICE_ADDRESS, vec![CmdFlags::RDATA], vec![0x34, 0x12]),
        ]);

        let outcome = device.capture(&config, &fast_timing()).unwrap();
        assert_eq!(outcome, CaptureOutcome::Ready(0x3412));

        let volts = code_to_voltage(
            outcome.raw_code(),
            config.reference_voltage(),
            config.gain.divisor(),
        );
        assert_eq!(volts, 0x3412 as f64 * 2.048 / 32768.0);
        destroy_ads1119(device);
    }

    #[test]
    fn capture_reports_timeout_and_skips_the_data_read() {
        let config = ConversionConfig::new(MuxSelection::Ain0Ain1, GainSetting::X1);
        let mut device = new_ads1119(&[
            I2cTransaction::write(DEVICE_ADDRESS, vec![CmdFlags::RESET]),
            I2cTransaction::write(
                DEVICE_ADDRESS,
                vec![
                    CmdFlags::WREG | RegSelectFlags::CONFIG,
                    config.command_byte(),
                ],
            ),
            I2cTransaction::write(DEVICE_ADDRESS, vec![CmdFlags::START_SYNC]),
            I2cTransaction::write_read(
                DEVICE_ADDRESS,
                vec![CmdFlags::RREG | RegSelectFlags::STATUS],
                vec![NOT_READY_STATUS],
            ),
        ]);

        let outcome = device.capture(&config, &expired_timing()).unwrap();
        assert_eq!(outcome, CaptureOutcome::TimedOut);
        assert_eq!(outcome.raw_code(), -1);
        destroy_ads1119(device);
    }
}
