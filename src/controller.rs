//! Run control surface: check, calibrate and measure against one bench
//!
//! The controller owns the bench, the loss tables and the result accumulator. Each operation
//! validates its request before any instrument is touched, so a bad profile name or an
//! unconnected bench fails without bus traffic.

use std::{
    fmt,
    path::PathBuf,
    sync::{ Arc, Mutex, MutexGuard, PoisonError },
};
use tracing::{ info, warn };
use crate::{
    calibrate::{ self, CalibrationKind },
    cancel::CancelToken,
    correction::LossTable,
    devices::{ InstrumentSet, Role },
    error::{ Error, Result },
    measure,
    params::{ DeviceProfile, ProfileSet, SecondaryParameters },
    result::ResultAccumulator,
};

/// How a run ended, as the run owner sees it
#[derive(Debug)]
pub enum RunOutcome
{
    Completed,
    /// Stopped through the cancellation token. Instruments were shut down.
    Cancelled,
    Failed(Error),
}

impl RunOutcome
{
    pub fn is_completed(&self) -> bool
    {
        matches!(self, Self::Completed)
    }
}

impl <T> From<Result<T>> for RunOutcome
{
    fn from(result: Result<T>) -> Self
    {
        match result {
            Ok(_) => Self::Completed,
            Err(Error::Cancelled) => Self::Cancelled,
            Err(err) => Self::Failed(err),
        }
    }
}

impl fmt::Display for RunOutcome
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Self::Completed => f.write_str("completed"),
            Self::Cancelled => f.write_str("cancelled"),
            Self::Failed(err) => write!(f, "failed: {}", err),
        }
    }
}

pub type SharedResults = Arc<Mutex<ResultAccumulator>>;

pub struct Controller
{
    bench: InstrumentSet,
    profiles: ProfileSet,
    data_dir: PathBuf,
    losses_lo: LossTable,
    losses_rf: LossTable,
    results: SharedResults,
    present: bool,
}

impl Controller
{
    /// Take ownership of a bench, loading whatever calibration `data_dir` already holds
    pub fn with(bench: InstrumentSet, data_dir: impl Into<PathBuf>) -> Result<Self>
    {
        let data_dir = data_dir.into();
        let losses_lo = LossTable::load(&data_dir.join(CalibrationKind::Lo.file_name()))?;
        let losses_rf = LossTable::load(&data_dir.join(CalibrationKind::Rf.file_name()))?;
        info!(dir = %data_dir.display(), lo_entries = losses_lo.len(), "controller ready");

        Ok(Self {
            bench: bench,
            profiles: ProfileSet::default(),
            data_dir: data_dir,
            losses_lo: losses_lo,
            losses_rf: losses_rf,
            results: Arc::new(Mutex::new(ResultAccumulator::new())),
            present: false,
        })
    }

    pub fn losses(&self, kind: CalibrationKind) -> &LossTable
    {
        match kind {
            CalibrationKind::Lo => &self.losses_lo,
            CalibrationKind::Rf => &self.losses_rf,
        }
    }

    /// Shared handle to the result accumulator
    ///
    /// Readers should lock only long enough to copy what they need.
    pub fn results(&self) -> SharedResults
    {
        Arc::clone(&self.results)
    }

    fn lock_results(&self) -> MutexGuard<'_, ResultAccumulator>
    {
        self.results.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the last check found the device present
    pub fn is_present(&self) -> bool
    {
        self.present
    }

    /// Probe every instrument
    pub async fn connect(&mut self) -> bool
    {
        let found = self.bench.find_all().await;
        for (role, status) in self.bench.status() {
            info!(%role, found = status, "instrument probed");
        }

        found
    }

    pub fn status(&self) -> Vec<(Role, bool)>
    {
        self.bench.status()
    }

    /// Roles which did not answer the last probe
    pub fn missing(&self) -> Vec<Role>
    {
        self.bench.missing()
    }

    fn ensure_connected(&self) -> Result<()>
    {
        let missing = self.missing();
        if missing.is_empty() {
            Ok(())
        }
        else {
            Err(Error::NotConnected(missing))
        }
    }

    fn profile(&self, name: &str) -> Result<DeviceProfile>
    {
        self.profiles.get(name).cloned()
    }

    fn profile_path(&self, file_name: &str) -> PathBuf
    {
        self.data_dir.join(file_name)
    }

    /// Reset every instrument and mark the device present
    pub async fn check(&mut self, token: &CancelToken, profile: &str, params: &SecondaryParameters) -> Result<()>
    {
        let profile = self.profile(profile)?;
        params.validate()?;
        self.ensure_connected()?;

        if token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.bench.reset_all().await?;
        self.present = true;
        info!(profile = %profile.name, "device present");

        Ok(())
    }

    /// Run a calibration and persist the resulting table
    pub async fn calibrate(
        &mut self,
        token: &CancelToken,
        kind: CalibrationKind,
        params: &SecondaryParameters,
    ) -> Result<usize>
    {
        params.validate()?;

        let table = match kind {
            CalibrationKind::Lo => {
                self.ensure_connected()?;
                calibrate::calibrate_lo(&mut self.bench, token, params).await?
            }
            CalibrationKind::Rf => calibrate::calibrate_rf(),
        };

        let path = self.profile_path(kind.file_name());
        table.save(&path)?;
        info!(?kind, entries = table.len(), path = %path.display(), "calibration saved");

        let entries = table.len();
        match kind {
            CalibrationKind::Lo => self.losses_lo = table,
            CalibrationKind::Rf => self.losses_rf = table,
        }

        Ok(entries)
    }

    /// Run a measurement sweep into the result accumulator
    ///
    /// The accumulator is reset against the profile's adjustment template first. It is finalized only
    /// when the sweep completes.
    pub async fn measure(&mut self, token: &CancelToken, profile: &str, params: SecondaryParameters) -> Result<usize>
    {
        let profile = self.profile(profile)?;
        params.validate()?;
        self.ensure_connected()?;

        let template_path = self.profile_path(&profile.adjust);
        self.lock_results().select_template(template_path)?;
        info!(profile = %profile.name, "measurement requested");

        let results = Arc::clone(&self.results);
        let points = measure::run(&mut self.bench, token, &params, &self.losses_lo, move |point| {
            results
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .add_point(point.clone());
        }).await?;

        self.lock_results().finalize();

        Ok(points.len())
    }

    /// Save the current run as the profile's zero-correction baseline, unless one exists
    pub fn capture_template(&self) -> Result<bool>
    {
        self.lock_results().capture_adjustment_template()
    }

    /// Where the profile's processed records are exported
    pub fn result_path(&self, profile: &str) -> Result<PathBuf>
    {
        let profile = self.profile(profile)?;
        Ok(self.profile_path(&profile.result))
    }

    /// Write the processed log to the profile's result file
    pub fn export(&self, profile: &str) -> Result<PathBuf>
    {
        let path = self.result_path(profile)?;
        self.lock_results().export_csv(&path)?;

        Ok(path)
    }

    /// Delete the profile's adjustment template
    ///
    /// A template only corrects runs of the same shape, so it is dropped when parameters change.
    pub fn invalidate_template(&self, profile: &str) -> Result<()>
    {
        let profile = self.profile(profile)?;
        let path = self.profile_path(&profile.adjust);

        match std::fs::remove_file(&path) {
            Ok(()) => {
                info!(path = %path.display(), "adjustment template removed");
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => {
                warn!(path = %path.display(), %err, "adjustment template not removed");
                Err(Error::file(path, err))
            }
        }
    }
}
