//! Enumerations shared by the instrument drivers.
//!
//! Each enum knows its mnemonic on the wire (`mnemonic()` / `Display`) and
//! parses case-insensitively from either that mnemonic or the variant name,
//! which is what the command line interface accepts.

use crate::error::InstrumentError;

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $wire:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            /// All variants in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Mnemonic sent to the instrument.
            pub fn mnemonic(self) -> &'static str {
                match self {
                    $(Self::$variant => $wire),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.mnemonic())
            }
        }

        impl std::str::FromStr for $name {
            type Err = InstrumentError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let wanted = s.trim();
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| {
                        wanted.eq_ignore_ascii_case(v.mnemonic())
                            || wanted.eq_ignore_ascii_case(&format!("{v:?}"))
                    })
                    .ok_or_else(|| {
                        InstrumentError::InvalidArguments(format!(
                            "unknown {} '{}'",
                            stringify!($name),
                            s
                        ))
                    })
            }
        }
    };
}

// ============================================================================
// Source-measure units
// ============================================================================

wire_enum! {
    /// SMU channel.
    pub enum SmuChannel {
        /// Channel A (`smua`)
        A => "a",
        /// Channel B (`smub`)
        B => "b",
    }
}

wire_enum! {
    /// Measured or sourced quantity.
    pub enum Unit {
        /// Volts
        Voltage => "v",
        /// Amperes
        Current => "i",
        /// Ohms
        Resistance => "r",
        /// Watts
        Power => "p",
    }
}

wire_enum! {
    /// Reference and zero measurement behaviour.
    pub enum AutoZero {
        /// Disabled
        Off => "AUTOZERO_OFF",
        /// Perform once, then disable
        Once => "AUTOZERO_ONCE",
        /// Performed automatically when needed
        Auto => "AUTOZERO_AUTO",
    }
}

wire_enum! {
    /// Source function.
    pub enum SourceFunction {
        /// Current source
        DcAmps => "OUTPUT_DCAMPS",
        /// Voltage source
        DcVolts => "OUTPUT_DCVOLTS",
    }
}

wire_enum! {
    /// Source state while the output is off.
    pub enum SourceOffMode {
        /// Follows `source.offfunc`
        Normal => "OUTPUT_NORMAL",
        /// 0 V output
        Zero => "OUTPUT_ZERO",
        /// Output relay open
        HighZ => "OUTPUT_HIGH_Z",
    }
}

wire_enum! {
    /// Source settling behaviour.
    pub enum SourceSettling {
        /// No additional settling operations
        Smooth => "SETTLE_SMOOTH",
        /// Faster procedure when changing ranges
        FastRange => "SETTLE_FAST_RANGE",
        /// Change polarity without going to zero
        FastPolarity => "SETTLE_FAST_POLARITY",
        /// Change the current range directly
        DirectIRange => "SETTLE_DIRECT_IRANGE",
        /// Range rampers for the 100 nA range
        Smooth100nA => "SETTLE_SMOOTH_100NA",
        /// All fast settling operations
        FastAll => "SETTLE_FAST_ALL",
    }
}

wire_enum! {
    /// Measurement shown on the front panel.
    pub enum SmuDisplay {
        /// Current
        DcAmps => "MEASURE_DCAMPS",
        /// Voltage
        DcVolts => "MEASURE_DCVOLTS",
        /// Resistance
        Ohms => "MEASURE_OHMS",
        /// Power
        Watts => "MEASURE_WATTS",
    }
}

wire_enum! {
    /// Sense wiring.
    pub enum SmuSense {
        /// 2-wire
        Local => "SENSE_LOCAL",
        /// 4-wire
        Remote => "SENSE_REMOTE",
        /// Calibration sense
        Calibration => "SENSE_CALA",
    }
}

// ============================================================================
// Oscilloscopes
// ============================================================================

wire_enum! {
    /// Analog input channel.
    pub enum OscChannel {
        /// Channel 1
        C1 => "1",
        /// Channel 2
        C2 => "2",
        /// Channel 3
        C3 => "3",
        /// Channel 4
        C4 => "4",
    }
}

wire_enum! {
    /// Trigger slope.
    pub enum TriggerEdge {
        /// Rising edge
        Positive => "POS",
        /// Falling edge
        Negative => "NEG",
        /// Either edge
        Either => "EITH",
        /// Alternating edges
        Alternating => "ALT",
    }
}

wire_enum! {
    /// Timebase display mode.
    pub enum DisplayMode {
        /// Normal time display
        Main => "MAIN",
        /// Zoomed window
        Window => "WIND",
        /// XY display
        Xy => "XY",
        /// Rolling display
        Roll => "ROLL",
    }
}

wire_enum! {
    /// Waveform transfer encoding.
    pub enum WaveformFormat {
        /// Comma separated text
        Ascii => "ASCII",
        /// 16 bit words
        Word => "WORD",
        /// 8 bit samples
        Byte => "BYTE",
    }
}

wire_enum! {
    /// Which record waveform transfers read from.
    pub enum PointsMode {
        /// Measurement record
        Normal => "NORMal",
        /// Raw record when stopped, measurement record otherwise
        Maximum => "MAXimum",
        /// Raw acquisition record
        Raw => "RAW",
    }
}

wire_enum! {
    /// Unit of a vertical range value.
    pub enum VoltageUnit {
        /// Volts
        Volt => "V",
        /// Millivolts
        MilliVolt => "mV",
    }
}

// ============================================================================
// Function generators
// ============================================================================

wire_enum! {
    /// Generator output channel.
    pub enum FuncChannel {
        /// Channel 1
        A => "1",
        /// Channel 2
        B => "2",
    }
}

wire_enum! {
    /// Output waveform shape.
    pub enum FunctionType {
        /// Sine
        Sine => "SIN",
        /// Square
        Square => "SQU",
        /// Rising ramp
        Ramp => "RAMP",
        /// Falling ramp
        NegativeRamp => "NRAM",
        /// Triangle
        Triangle => "TRI",
        /// Noise
        Noise => "NOIS",
        /// Pseudo random bit stream
        PseudoRandomBitStream => "PRBS",
        /// Arbitrary waveform
        Arbitrary => "ARB",
        /// Constant DC level set by the offset
        DcVoltage => "DC",
    }
}

wire_enum! {
    /// Set the high or low level instead of the peak-to-peak amplitude.
    pub enum AmplitudeLevel {
        /// High level
        High => "HIGH",
        /// Low level
        Low => "LOW",
    }
}

// ============================================================================
// DC power supplies
// ============================================================================

wire_enum! {
    /// Supply output channel.
    pub enum DcChannel {
        /// Channel 1
        Ch1 => "1",
        /// Channel 2
        Ch2 => "2",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mnemonics() {
        assert_eq!(SmuChannel::B.to_string(), "b");
        assert_eq!(Unit::Power.mnemonic(), "p");
        assert_eq!(SourceSettling::Smooth100nA.mnemonic(), "SETTLE_SMOOTH_100NA");
        assert_eq!(SmuSense::Calibration.mnemonic(), "SENSE_CALA");
        assert_eq!(TriggerEdge::Either.mnemonic(), "EITH");
        assert_eq!(FunctionType::NegativeRamp.mnemonic(), "NRAM");
        assert_eq!(OscChannel::C3.to_string(), "3");
    }

    #[test]
    fn test_parse_by_mnemonic_or_name() {
        assert_eq!("a".parse::<SmuChannel>().unwrap(), SmuChannel::A);
        assert_eq!("voltage".parse::<Unit>().unwrap(), Unit::Voltage);
        assert_eq!("I".parse::<Unit>().unwrap(), Unit::Current);
        assert_eq!("auto".parse::<AutoZero>().unwrap(), AutoZero::Auto);
        assert_eq!("sense_remote".parse::<SmuSense>().unwrap(), SmuSense::Remote);
        assert_eq!(" sin ".parse::<FunctionType>().unwrap(), FunctionType::Sine);
        assert_eq!("raw".parse::<PointsMode>().unwrap(), PointsMode::Raw);
        assert_eq!("mv".parse::<VoltageUnit>().unwrap(), VoltageUnit::MilliVolt);
    }

    #[test]
    fn test_parse_unknown() {
        let err = "c".parse::<SmuChannel>().unwrap_err();
        assert_eq!(err.to_string(), "Invalid arguments: unknown SmuChannel 'c'");
        assert!("5".parse::<OscChannel>().is_err());
    }

    #[test]
    fn test_all_variants_listed() {
        assert_eq!(SourceSettling::ALL.len(), 6);
        assert_eq!(FunctionType::ALL.len(), 9);
        assert_eq!(OscChannel::ALL.len(), 4);
    }
}
