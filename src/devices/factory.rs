//! Map identification strings to drivers.

use super::capabilities::{DcPowerSupply, FunctionGenerator, Oscilloscope, Smu};
use super::kei2600::{self, Kei2600};
use super::kst3000::{self, Kst3000};
use super::kst33500::{self, Kst33500};
use super::spd1305::{self, Spd1305};
use crate::device::{Device, DeviceKind, Instrument};
use crate::error::InstrumentError;
use std::fmt;
use std::str::FromStr;

/// Instrument models with a dedicated driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceModel {
    /// Keithley 2600B source-measure unit
    Kei2600,
    /// Keysight 3000 X-series oscilloscope
    Kst3000,
    /// Keysight 33500B waveform generator
    Kst33500,
    /// Siglent SPD1305X power supply
    Spd1305,
}

/// `*IDN?` fragments identifying each model.
const IDENTITY_PATTERNS: &[(&str, DeviceModel)] = &[
    ("Keithley Instruments Inc., Model 26", DeviceModel::Kei2600),
    ("Agilent Technologies,33522B", DeviceModel::Kst33500),
    ("Keysight Technologies,335", DeviceModel::Kst33500),
    ("DSO-X 3", DeviceModel::Kst3000),
    ("MSO-X 3", DeviceModel::Kst3000),
    ("SPD13", DeviceModel::Spd1305),
];

impl DeviceModel {
    /// All supported models.
    pub const ALL: &'static [Self] = &[Self::Kei2600, Self::Kst3000, Self::Kst33500, Self::Spd1305];

    /// Recognise the model from an identification string.
    pub fn from_identity(identity: &str) -> Option<Self> {
        IDENTITY_PATTERNS
            .iter()
            .find(|(pattern, _)| identity.contains(pattern))
            .map(|(_, model)| *model)
    }

    /// Short name used on the command line.
    pub fn id(self) -> &'static str {
        match self {
            Self::Kei2600 => "kei2600",
            Self::Kst3000 => "kst3000",
            Self::Kst33500 => "kst33500",
            Self::Spd1305 => "spd1305",
        }
    }

    /// Name the driver gives the device.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Kei2600 => kei2600::DEVICE_NAME,
            Self::Kst3000 => kst3000::DEVICE_NAME,
            Self::Kst33500 => kst33500::DEVICE_NAME,
            Self::Spd1305 => spd1305::DEVICE_NAME,
        }
    }

    /// Instrument category.
    pub fn kind(self) -> DeviceKind {
        match self {
            Self::Kei2600 => DeviceKind::Smu,
            Self::Kst3000 => DeviceKind::Oscilloscope,
            Self::Kst33500 => DeviceKind::FunctionGenerator,
            Self::Spd1305 => DeviceKind::DcPowerSupply,
        }
    }
}

impl fmt::Display for DeviceModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for DeviceModel {
    type Err = InstrumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|m| wanted.eq_ignore_ascii_case(m.id()))
            .ok_or_else(|| InstrumentError::InvalidArguments(format!("unknown device model '{s}'")))
    }
}

/// A device wrapped in the driver for its model.
#[derive(Debug)]
pub enum AnyInstrument {
    /// Source-measure unit
    Kei2600(Kei2600),
    /// Oscilloscope
    Kst3000(Kst3000),
    /// Function generator
    Kst33500(Kst33500),
    /// DC power supply
    Spd1305(Spd1305),
    /// Unrecognised device, raw commands only
    Generic(Device),
}

/// Wrap `device` in the driver for `model`, or keep it generic.
pub fn into_instrument(device: Device, model: Option<DeviceModel>) -> AnyInstrument {
    match model {
        Some(DeviceModel::Kei2600) => AnyInstrument::Kei2600(Kei2600::from_device(device)),
        Some(DeviceModel::Kst3000) => AnyInstrument::Kst3000(Kst3000::from_device(device)),
        Some(DeviceModel::Kst33500) => AnyInstrument::Kst33500(Kst33500::from_device(device)),
        Some(DeviceModel::Spd1305) => AnyInstrument::Spd1305(Spd1305::from_device(device)),
        None => AnyInstrument::Generic(device),
    }
}

impl AnyInstrument {
    /// Query `*IDN?` on a connected device and wrap it accordingly.
    pub async fn identify(mut device: Device) -> (Self, Result<String, InstrumentError>) {
        match device.identify().await {
            Ok(identity) => {
                let model = DeviceModel::from_identity(&identity);
                tracing::debug!(host = %device.host(), ?model, "Identified device");
                (into_instrument(device, model), Ok(identity))
            }
            Err(err) => (Self::Generic(device), Err(err)),
        }
    }

    /// The driver as a source-measure unit.
    pub fn as_smu(&mut self) -> Option<&mut dyn Smu> {
        match self {
            Self::Kei2600(smu) => Some(smu),
            _ => None,
        }
    }

    /// The driver as an oscilloscope.
    pub fn as_oscilloscope(&mut self) -> Option<&mut dyn Oscilloscope> {
        match self {
            Self::Kst3000(scope) => Some(scope),
            _ => None,
        }
    }

    /// The driver as a function generator.
    pub fn as_function_generator(&mut self) -> Option<&mut dyn FunctionGenerator> {
        match self {
            Self::Kst33500(generator) => Some(generator),
            _ => None,
        }
    }

    /// The driver as a DC power supply.
    pub fn as_dc_power_supply(&mut self) -> Option<&mut dyn DcPowerSupply> {
        match self {
            Self::Spd1305(supply) => Some(supply),
            _ => None,
        }
    }

    fn inner(&self) -> &dyn Instrument {
        match self {
            Self::Kei2600(i) => i,
            Self::Kst3000(i) => i,
            Self::Kst33500(i) => i,
            Self::Spd1305(i) => i,
            Self::Generic(i) => i,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Instrument {
        match self {
            Self::Kei2600(i) => i,
            Self::Kst3000(i) => i,
            Self::Kst33500(i) => i,
            Self::Spd1305(i) => i,
            Self::Generic(i) => i,
        }
    }
}

impl Instrument for AnyInstrument {
    fn device(&self) -> &Device {
        self.inner().device()
    }

    fn device_mut(&mut self) -> &mut Device {
        self.inner_mut().device_mut()
    }

    fn kind(&self) -> DeviceKind {
        self.inner().kind()
    }

    fn model(&self) -> Option<DeviceModel> {
        self.inner().model()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceConfig;
    use crate::transport::MockTransport;

    #[test]
    fn test_from_identity() {
        let cases = [
            ("Keithley Instruments Inc., Model 2636B, 4480001, 3.2.2", Some(DeviceModel::Kei2600)),
            ("Agilent Technologies,33522B,MY52800000,3.05", Some(DeviceModel::Kst33500)),
            ("Keysight Technologies,33510B,MY57000000,4.00", Some(DeviceModel::Kst33500)),
            ("KEYSIGHT TECHNOLOGIES,DSO-X 3024T,MY58000000,07.20", Some(DeviceModel::Kst3000)),
            ("AGILENT TECHNOLOGIES,MSO-X 3054A,MY52000000,02.43", Some(DeviceModel::Kst3000)),
            ("Siglent Technologies,SPD1305X,SPD13DCC000000,1.01", Some(DeviceModel::Spd1305)),
            ("Rigol Technologies,DS1054Z,DS1ZA000000000,00.04.04", None),
        ];
        for (identity, expected) in cases {
            assert_eq!(DeviceModel::from_identity(identity), expected, "{identity}");
        }
    }

    #[test]
    fn test_model_names() {
        assert_eq!("KST3000".parse::<DeviceModel>().unwrap(), DeviceModel::Kst3000);
        assert!("hp34401".parse::<DeviceModel>().is_err());
        assert_eq!(DeviceModel::Spd1305.to_string(), "DC Power Supply");
        assert_eq!(DeviceModel::Kei2600.kind(), DeviceKind::Smu);
    }

    #[test]
    fn test_into_instrument() {
        let device = Device::new(DeviceConfig::new("10.0.0.5"));
        let mut instrument = into_instrument(device, Some(DeviceModel::Kst33500));
        assert_eq!(instrument.kind(), DeviceKind::FunctionGenerator);
        assert_eq!(instrument.device().name(), kst33500::DEVICE_NAME);
        assert!(instrument.as_function_generator().is_some());
        assert!(instrument.as_smu().is_none());

        let generic = into_instrument(Device::new(DeviceConfig::new("10.0.0.6")), None);
        assert_eq!(generic.kind(), DeviceKind::Generic);
        assert_eq!(generic.model(), None);
        assert_eq!(generic.device().name(), "10.0.0.6");
    }

    #[tokio::test]
    async fn test_identify_wraps_driver() {
        let mock = MockTransport::new();
        mock.push_response("Siglent Technologies,SPD1305X,SPD13DCC000000,1.01\n");
        let device = Device::with_transport(DeviceConfig::new("10.0.0.7"), mock.clone());
        let (mut instrument, identity) = AnyInstrument::identify(device).await;
        assert!(identity.unwrap().starts_with("Siglent"));
        assert_eq!(instrument.model(), Some(DeviceModel::Spd1305));
        assert!(instrument.as_dc_power_supply().is_some());
        assert_eq!(mock.written(), vec!["*IDN?"]);
    }

    #[tokio::test]
    async fn test_identify_failure_keeps_device() {
        let mock = MockTransport::new();
        let device = Device::with_transport(DeviceConfig::new("10.0.0.8"), mock);
        let (instrument, identity) = AnyInstrument::identify(device).await;
        assert!(identity.is_err());
        assert_eq!(instrument.kind(), DeviceKind::Generic);
    }
}
