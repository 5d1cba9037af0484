//! Polls the pool's pH and ORP probes on a fixed interval and logs one
//! summary line per cycle.

use std::{thread, time::Duration};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use linux_embedded_hal::I2cdev;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use poolprobe::{
    code_to_voltage, voltage_to_input_signal, voltage_to_ph_uncalibrated, Ads1119, BusTransport,
    CalibrationPoint, CaptureOutcome, ConversionConfig, GainSetting, I2cBus, MuxSelection,
    PhCalibration, PollTiming, FRONT_END_GAIN_ORP, FRONT_END_GAIN_PH,
};

#[derive(Parser, Debug)]
#[command(
    name = "poolprobe",
    about = "Poll pool pH and ORP probes through ADS1119 converters"
)]
struct Args {
    /// I2C bus device path
    #[arg(long, default_value = "/dev/i2c-1")]
    bus: String,

    /// Converter address of the pH channel (decimal or 0x-prefixed hex)
    #[arg(long, default_value = "0x40", value_parser = parse_address)]
    ph_address: u8,

    /// Converter address of the ORP channel
    #[arg(long, default_value = "0x45", value_parser = parse_address)]
    orp_address: u8,

    /// Seconds between polling cycles
    #[arg(long, default_value_t = 5)]
    interval_secs: u64,

    /// pH of the low calibration buffer
    #[arg(long, default_value_t = 4.00)]
    cal_low_ph: f64,

    /// Probe volts measured in the low calibration buffer
    #[arg(long, default_value_t = 0.170, allow_hyphen_values = true)]
    cal_low_volts: f64,

    /// pH of the high calibration buffer
    #[arg(long, default_value_t = 9.18)]
    cal_high_ph: f64,

    /// Probe volts measured in the high calibration buffer
    #[arg(long, default_value_t = -0.129, allow_hyphen_values = true)]
    cal_high_volts: f64,

    /// Dump raw codes and ADC voltages for extra mux/gain configurations on
    /// each channel instead of the pH/ORP summary
    #[arg(long)]
    debug_voltages: bool,
}

fn parse_address(s: &str) -> Result<u8, String> {
    let s = s.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    }
    .map_err(|e| e.to_string())
}

/// One physical probe channel: a converter address plus the fixed op-amp
/// gain sitting in front of that converter's input.
struct ChannelDescriptor {
    name: &'static str,
    address: u8,
    front_end_gain: f64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let calibration = PhCalibration::derive(
        CalibrationPoint::new(args.cal_low_ph, args.cal_low_volts),
        CalibrationPoint::new(args.cal_high_ph, args.cal_high_volts),
    )
    .context("invalid pH calibration points")?;
    info!(
        "PH calibration={:.3}V/PH, {:.3}V at PH 7",
        calibration.slope_volts_per_ph(),
        calibration.volts_at_ph7()
    );

    let ph_channel = ChannelDescriptor {
        name: "PH",
        address: args.ph_address,
        front_end_gain: FRONT_END_GAIN_PH,
    };
    let orp_channel = ChannelDescriptor {
        name: "ORP",
        address: args.orp_address,
        front_end_gain: FRONT_END_GAIN_ORP,
    };

    let dev = I2cdev::new(&args.bus).with_context(|| format!("opening {}", args.bus))?;
    let mut adc = Ads1119::new(I2cBus::new(dev, ph_channel.address));
    let timing = PollTiming::default();
    let interval = Duration::from_secs(args.interval_secs);

    loop {
        if args.debug_voltages {
            debug_channel(&mut adc, &ph_channel, &timing)?;
            debug_channel(&mut adc, &orp_channel, &timing)?;
        } else {
            poll_once(&mut adc, &ph_channel, &orp_channel, &calibration, &timing)?;
        }
        thread::sleep(interval);
    }
}

/// Capture the differential probe voltage on one channel, with the front-end
/// gain divided out. `None` means the conversion timed out and this cycle's
/// sample is skipped.
fn capture_input_voltage<B: BusTransport>(
    adc: &mut Ads1119<B>,
    channel: &ChannelDescriptor,
    timing: &PollTiming,
) -> Result<Option<f64>> {
    adc.select_channel(channel.address).map_err(bus_err)?;
    let config = ConversionConfig::new(MuxSelection::Ain0Ain1, GainSetting::X1);
    match adc.capture(&config, timing).map_err(bus_err)? {
        CaptureOutcome::TimedOut => {
            warn!(
                "{} channel at {:#04x}: conversion timed out, skipping sample",
                channel.name, channel.address
            );
            Ok(None)
        }
        CaptureOutcome::Ready(code) => {
            let volts = code_to_voltage(code, config.reference_voltage(), config.gain.divisor());
            Ok(Some(voltage_to_input_signal(
                volts,
                channel.front_end_gain,
            )))
        }
    }
}

fn poll_once<B: BusTransport>(
    adc: &mut Ads1119<B>,
    ph_channel: &ChannelDescriptor,
    orp_channel: &ChannelDescriptor,
    calibration: &PhCalibration,
    timing: &PollTiming,
) -> Result<()> {
    let ph_volts = capture_input_voltage(adc, ph_channel, timing)?;
    let orp_volts = capture_input_voltage(adc, orp_channel, timing)?;
    let (Some(ph_volts), Some(orp_volts)) = (ph_volts, orp_volts) else {
        return Ok(());
    };

    let ph = calibration.voltage_to_ph(ph_volts);
    let ph_uncalibrated = voltage_to_ph_uncalibrated(ph_volts);
    info!(
        "ORP={}mV, PH={:.2}, ({:.3}V, {:.2} without calibration)",
        (orp_volts * 1000.0).round() as i64,
        ph,
        ph_volts,
        ph_uncalibrated
    );
    Ok(())
}

/// Read one channel under several mux/gain configurations and dump the raw
/// codes, useful when checking the analog front end against a multimeter.
fn debug_channel<B: BusTransport>(
    adc: &mut Ads1119<B>,
    channel: &ChannelDescriptor,
    timing: &PollTiming,
) -> Result<()> {
    adc.select_channel(channel.address).map_err(bus_err)?;
    info!("{} channel at {:#04x}", channel.name, channel.address);

    let reads = [
        ("Diff", ConversionConfig::new(MuxSelection::Ain0Ain1, GainSetting::X1)),
        ("Diff X4", ConversionConfig::new(MuxSelection::Ain0Ain1, GainSetting::X4)),
        ("A0", ConversionConfig::new(MuxSelection::Ain0Gnd, GainSetting::X1)),
        ("A1", ConversionConfig::new(MuxSelection::Ain1Gnd, GainSetting::X1)),
    ];
    for (label, config) in reads {
        let outcome = adc.capture(&config, timing).map_err(bus_err)?;
        // read the config back as a sanity check
        let config_byte = adc.read_config().map_err(bus_err)?;
        match outcome {
            CaptureOutcome::TimedOut => warn!("{label}: conversion timed out"),
            CaptureOutcome::Ready(code) => {
                let volts =
                    code_to_voltage(code, config.reference_voltage(), config.gain.divisor());
                let input_volts = voltage_to_input_signal(volts, channel.front_end_gain);
                info!(
                    "{label}: raw value={:#06X}, ADC={:.3}V, VIn={:.3}V, config={:#04x}",
                    code as u16, volts, input_volts, config_byte
                );
            }
        }
    }
    Ok(())
}

fn bus_err<E: core::fmt::Debug>(e: E) -> anyhow::Error {
    anyhow!("i2c transport error: {e:?}")
}
