//! Instrument drivers.
//!
//! | Model | Driver | Capability |
//! |-------|--------|------------|
//! | Keithley 2600B | [`Kei2600`] | [`Smu`] |
//! | Keysight 3000 X-series | [`Kst3000`] | [`Oscilloscope`] |
//! | Keysight 33500B | [`Kst33500`] | [`FunctionGenerator`] |
//! | Siglent SPD1305X | [`Spd1305`] | [`DcPowerSupply`] |

pub mod capabilities;
pub mod factory;
pub mod kei2600;
pub mod kst3000;
pub mod kst33500;
pub mod spd1305;
pub mod types;

pub use capabilities::{DcPowerSupply, FunctionGenerator, Oscilloscope, Smu};
pub use factory::{into_instrument, AnyInstrument, DeviceModel};
pub use kei2600::{Kei2600, ScriptUploadTiming};
pub use kst3000::{Kst3000, WaveformPreamble, WaveformSample};
pub use kst33500::Kst33500;
pub use spd1305::Spd1305;
