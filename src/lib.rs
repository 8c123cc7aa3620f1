//! **Mod**ulator **Sweep**s: asynchronous calibration and characterization of RF modulator devices
//!
//! A bench of five SCPI instruments (LO generator, modulation generator, dual-rail supply, multimeter
//! and spectrum analyzer) is swept over a grid of LO powers and frequencies. Raw analyzer readings
//! are corrected with a calibrated LO loss table and an optional per-profile adjustment template,
//! then accumulated into plot-ready series and an exportable record log.
//!
//! Procedures talk to instruments only through [`Instrument`], so a live bus and a recorded
//! [`replay`] fixture follow exactly the same control path.

#[macro_use]
pub mod units;

pub mod cmd;
pub mod executor;
pub mod instrument;
pub mod replay;
pub mod devices;
pub mod sweep;
pub mod params;
pub mod correction;
pub mod cancel;
pub mod measure;
pub mod calibrate;
pub mod result;
pub mod controller;
pub mod worker;
pub mod error;

pub use cancel::CancelToken;
pub use calibrate::CalibrationKind;
pub use controller::{ Controller, RunOutcome };
pub use devices::{ InstrumentSet, Role };
pub use error::{ Error, Result };
pub use instrument::{ BusInstrument, Instrument };
pub use params::{ DeviceProfile, ProfileSet, SecondaryParameters };
pub use result::{ ProcessedRecord, RawPoint, ResultAccumulator };
pub use worker::{ spawn_worker, Job, WorkerHandle };
