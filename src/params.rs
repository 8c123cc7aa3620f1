//! Run configuration: secondary sweep parameters and device profiles

use std::path::Path;
use serde::{ Deserialize, Serialize };
use tracing::info;
use crate::{
    error::{ Error, Result },
    sweep::{ SweepAxis, SweepGrid },
    units::Hertz,
};

/// Snapshot of everything a sweep needs besides the device profile
///
/// Taken once when a run starts. Editing the configuration afterwards never reaches an in-flight
/// sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecondaryParameters
{
    /// Lowest LO power, dBm
    pub plo_min: f64,
    /// Highest LO power, dBm
    pub plo_max: f64,
    /// LO power step, dBm. Ignored when `plo_min == plo_max`.
    pub plo_delta: f64,
    /// Lowest LO frequency, GHz
    pub flo_min: f64,
    /// Highest LO frequency, GHz
    pub flo_max: f64,
    /// LO frequency step, GHz
    pub flo_delta: f64,
    /// The device divides the LO by two, so the generator runs at twice the nominal frequency
    pub flo_div2: bool,
    /// The generator's frequency multiplier is set to 2 and the analyzer tracks half the carrier
    pub lo_doubler: bool,
    /// Modulation frequency, MHz
    pub fmod: f64,
    /// Modulation depth as ARB runtime scaling, percent
    pub umod: f64,
    /// External IQ common offset, mV
    pub uoffs: f64,
    /// Main supply rail, V
    pub usrc: f64,
    /// Auxiliary supply rail, V
    pub usrc_d: f64,
    /// Auxiliary rail current limit, mA
    pub isrc_d_max: f64,
    /// Analyzer reference level, dB
    pub sa_rlev: f64,
    /// Analyzer vertical scale, dB per division
    pub sa_scale_y: f64,
    /// Analyzer span, MHz
    pub sa_span: f64,
    pub sa_avg_state: bool,
    pub sa_avg_count: u32,
}

impl Default for SecondaryParameters
{
    fn default() -> Self
    {
        Self {
            plo_min: -10.0,
            plo_max: 0.0,
            plo_delta: 5.0,
            flo_min: 0.05,
            flo_max: 6.05,
            flo_delta: 0.1,
            flo_div2: false,
            lo_doubler: false,
            fmod: 1.0,
            umod: 30.0,
            uoffs: 250.0,
            usrc: 5.0,
            usrc_d: 3.3,
            isrc_d_max: 20.0,
            sa_rlev: 10.0,
            sa_scale_y: 10.0,
            sa_span: 10.0,
            sa_avg_state: true,
            sa_avg_count: 16,
        }
    }
}

impl SecondaryParameters
{
    /// LO power axis in dBm
    pub fn power_axis(&self) -> SweepAxis
    {
        SweepAxis::new(self.plo_min, self.plo_max, self.plo_delta)
    }

    /// LO frequency axis in Hz
    ///
    /// Always steps through its bounds, even when they are equal.
    pub fn freq_axis(&self) -> SweepAxis
    {
        SweepAxis::spanning(
            hz!(self.flo_min, Giga).0,
            hz!(self.flo_max, Giga).0,
            hz!(self.flo_delta, Giga).0,
        )
    }

    pub fn grid(&self) -> Result<SweepGrid>
    {
        SweepGrid::with(&self.power_axis(), &self.freq_axis())
    }

    pub fn lo_start_freq(&self) -> Hertz
    {
        hz!(self.flo_min, Giga)
    }

    pub fn mod_freq(&self) -> Hertz
    {
        hz!(self.fmod, Mega)
    }

    pub fn span(&self) -> Hertz
    {
        hz!(self.sa_span, Mega)
    }

    /// IQ common offset in volts
    pub fn iq_offset_volts(&self) -> f64
    {
        self.uoffs / 1000.0
    }

    /// Auxiliary rail current limit in amperes
    pub fn aux_current_limit(&self) -> f64
    {
        self.isrc_d_max / 1000.0
    }

    pub fn validate(&self) -> Result<()>
    {
        self.power_axis().validate()?;
        self.freq_axis().validate()?;

        if !(self.fmod >= 0.0) {
            return Err(Error::InvalidParams(format!("modulation frequency {} MHz is negative", self.fmod)));
        }
        if !(self.sa_span > 0.0) {
            return Err(Error::InvalidParams(format!("analyzer span {} MHz must be positive", self.sa_span)));
        }
        if self.sa_avg_count == 0 {
            return Err(Error::InvalidParams("analyzer average count must be at least 1".to_string()));
        }
        if !(self.usrc >= 0.0 && self.usrc_d >= 0.0 && self.isrc_d_max >= 0.0) {
            return Err(Error::InvalidParams("supply settings must not be negative".to_string()));
        }

        Ok(())
    }

    /// Loads from TOML, falling back to defaults when the file does not exist
    ///
    /// The result is validated once here rather than on each access.
    pub fn load(path: &Path) -> Result<Self>
    {
        let params = match std::fs::read_to_string(path) {
            Ok(text) => toml::from_str::<Self>(&text)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no parameter file, using defaults");
                Self::default()
            }
            Err(err) => return Err(Error::file(path, err)),
        };
        params.validate()?;

        Ok(params)
    }

    pub fn save(&self, path: &Path) -> Result<()>
    {
        let text = toml::to_string_pretty(self)?;
        crate::correction::write_replacing(path, text.as_bytes())
    }
}

/// Per-device-profile file names
///
/// Adjustment templates are per profile, never global.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProfile
{
    pub name: String,
    /// Adjustment template file, relative to the data directory
    pub adjust: String,
    /// Processed-record export file, relative to the data directory
    pub result: String,
}

impl DeviceProfile
{
    pub fn named(name: &str) -> Self
    {
        Self {
            name: name.to_string(),
            adjust: format!("adjust_{}.json", name),
            result: format!("table_{}.csv", name),
        }
    }
}

/// The set of known device profiles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSet
{
    pub profiles: Vec<DeviceProfile>,
}

impl Default for ProfileSet
{
    /// Operating-temperature profiles of the bench
    fn default() -> Self
    {
        Self {
            profiles: vec![
                DeviceProfile::named("+25"),
                DeviceProfile::named("-60"),
                DeviceProfile::named("+85"),
            ],
        }
    }
}

impl ProfileSet
{
    pub fn get(&self, name: &str) -> Result<&DeviceProfile>
    {
        self.profiles
            .iter()
            .find(|profile| profile.name == name)
            .ok_or_else(|| Error::UnknownProfile(name.to_string()))
    }
}
