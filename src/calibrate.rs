//! LO delivery-loss calibration
//!
//! Drives only the LO generator and the analyzer. No device, modulation or supply is involved: the
//! generator output is cabled straight to the analyzer, and the loss at each point is the distance
//! between the programmed and the measured power.

use std::time::Duration;
use tracing::{ debug, info };
use crate::{
    cancel::CancelToken,
    cmd::{ AnalyzerParam, CmdSet },
    correction::LossTable,
    devices::InstrumentSet,
    error::{ Error, Result },
    measure::{ settle_outcome, Unwind },
    params::SecondaryParameters,
};

const OUTPUT_SETTLE: Duration = Duration::from_millis(500);
const CENTER_SETTLE: Duration = Duration::from_millis(500);
const SHUTDOWN_SETTLE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationKind
{
    /// LO power delivery loss, measured on the analyzer
    Lo,
    /// Placeholder which always yields an empty table
    Rf,
}

impl CalibrationKind
{
    /// File the kind's table is persisted to, relative to the data directory
    pub fn file_name(&self) -> &'static str
    {
        match self {
            Self::Lo => "cal_lo.json",
            Self::Rf => "cal_rf.json",
        }
    }
}

/// Measure the LO loss at every (power, generator frequency) pair of the sweep
///
/// Keys use the generator frequency, doubled in divide-by-2 mode, as the measurement sweep looks
/// them up.
pub async fn calibrate_lo(
    bench: &mut InstrumentSet,
    token: &CancelToken,
    params: &SecondaryParameters,
) -> Result<LossTable>
{
    let grid = params.grid()?;
    info!(points = grid.len(), "LO calibration started");

    let outcome = async {
        bench.analyzer.exec(CmdSet::SetAnalyzerParam(AnalyzerParam::AutoCalibration(false))).await?;
        bench.lo.exec(CmdSet::ModulationState(false)).await?;
        bench.analyzer.exec_all(&[
            CmdSet::SetAnalyzerParam(AnalyzerParam::MarkerPositionMode),
            CmdSet::SetAnalyzerParam(AnalyzerParam::Span(params.span())),
            CmdSet::SetAnalyzerParam(AnalyzerParam::ReferenceLevel(params.sa_rlev)),
            CmdSet::SetAnalyzerParam(AnalyzerParam::ScalePerDivision(params.sa_scale_y)),
        ]).await?;

        let mut table = LossTable::default();
        for (power, freq) in grid.points() {
            if token.is_cancelled() {
                info!(completed = table.len(), "LO calibration cancelled");
                return Err(Error::Cancelled);
            }

            let freq_gen = if params.flo_div2 { freq * 2 } else { freq };

            bench.lo.exec_all(&[
                CmdSet::Power(power.as_f64()),
                CmdSet::Frequency(freq_gen.into()),
                CmdSet::Output(true),
            ]).await?;
            bench.lo.settle(OUTPUT_SETTLE).await;

            bench.analyzer.exec(CmdSet::SetAnalyzerParam(AnalyzerParam::Center(freq_gen.into()))).await?;
            bench.analyzer.settle(CENTER_SETTLE).await;
            bench.analyzer.exec(CmdSet::SetAnalyzerParam(AnalyzerParam::MarkerX(freq_gen.into()))).await?;
            let read = bench.analyzer.read(CmdSet::ReadMarkerPower).await?;

            let loss = (power.as_f64() - read).abs();
            debug!(%power, %freq_gen, read, loss, "calibration point");
            table.insert(power, freq_gen, loss);
        }

        Ok::<_, Error>(table)
    }.await;

    let shutdown = shutdown(bench, params).await;
    let table = settle_outcome(outcome, shutdown)?;
    info!(entries = table.len(), "LO calibration finished");

    Ok(table)
}

/// RF path calibration is not measured. The table is always empty.
pub fn calibrate_rf() -> LossTable
{
    info!("RF calibration yields an empty table");
    LossTable::default()
}

async fn shutdown(bench: &mut InstrumentSet, params: &SecondaryParameters) -> Result<()>
{
    let mut unwind = Unwind::default();

    unwind.step(bench.lo.exec(CmdSet::Output(false)).await);
    bench.lo.settle(SHUTDOWN_SETTLE).await;
    unwind.step(bench.lo.exec(CmdSet::Power(params.power_axis().start())).await);
    unwind.step(bench.lo.exec(CmdSet::Frequency(params.lo_start_freq())).await);
    unwind.step(bench.analyzer.exec(CmdSet::SetAnalyzerParam(AnalyzerParam::AutoCalibration(true))).await);

    unwind.finish()
}
