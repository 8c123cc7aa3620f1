//! The measurement sweep
//!
//! # Sequence
//! One-time setup programs every instrument with outputs left off. Then for each LO power and each
//! LO frequency, in that nesting order:
//!
//! 1. The cancellation token is polled. Nothing has been reprogrammed for the point yet.
//! 2. The generator frequency is doubled in divide-by-2 mode. The analyzer keeps tracking the nominal
//!    frequency.
//! 3. Half the calibrated loss at (power, generator frequency) is added to the programmed power.
//! 4. Supply, LO and modulator outputs go on, and the analyzer is re-centred.
//! 5. Four marker powers and the supply current are read and emitted as a [`RawPoint`].
//!
//! Whether the sweep completes, is cancelled or fails, the shutdown sequence turns every output off and
//! restores the generator to the sweep's starting power and frequency.

use std::time::Duration;
use tracing::{ debug, info, warn };
use crate::{
    cancel::CancelToken,
    cmd::{ AnalyzerParam, CmdSet, ModParam, Rail },
    correction::LossTable,
    devices::InstrumentSet,
    error::{ Error, Result },
    params::SecondaryParameters,
    result::RawPoint,
    units::{ Hertz, SetPoint },
};

/// Arbitrary waveform played by the modulation generator
pub const WAVEFORM: &str = "WFM1:SINE_TEST_WFM";

/// Main rail current limit, A
pub const MAIN_RAIL_LIMIT: f64 = 0.2;

const OUTPUT_SETTLE: Duration = Duration::from_millis(600);
const CENTER_SETTLE: Duration = Duration::from_secs(1);
const MARKER_SETTLE: Duration = Duration::from_millis(10);
const SHUTDOWN_SETTLE: Duration = Duration::from_millis(500);

/// Fixed part of the ARB base frequency offset
fn base_offset() -> Hertz
{
    hz!(0.5, Mega)
}

/// Collects the outcome of shutdown steps which must all be attempted
///
/// A failed step is logged and remembered. Later steps still run.
#[derive(Default)]
pub(crate) struct Unwind
{
    first: Option<Error>,
}

impl Unwind
{
    pub(crate) fn step(&mut self, result: Result<()>)
    {
        if let Err(err) = result {
            warn!(%err, "shutdown step failed");
            self.first.get_or_insert(err);
        }
    }

    pub(crate) fn finish(self) -> Result<()>
    {
        match self.first {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Combine a procedure's outcome with its shutdown
///
/// A procedure error wins over a shutdown error, which has already been logged.
pub(crate) fn settle_outcome<T>(outcome: Result<T>, shutdown: Result<()>) -> Result<T>
{
    match (outcome, shutdown) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(err)) => Err(err),
        (Err(err), _) => Err(err),
    }
}

/// Run a full measurement sweep
///
/// `on_point` is called once per completed point, before the next point starts. On cancellation the
/// instruments are shut down and [`Error::Cancelled`] is returned. Points already passed to `on_point`
/// stay with whoever received them.
pub async fn run<F>(
    bench: &mut InstrumentSet,
    token: &CancelToken,
    params: &SecondaryParameters,
    losses: &LossTable,
    mut on_point: F,
) -> Result<Vec<RawPoint>>
    where F: FnMut(&RawPoint) + Send
{
    let grid = params.grid()?;
    info!(
        points = grid.len(),
        div2 = params.flo_div2,
        doubler = params.lo_doubler,
        calibrated = !losses.is_empty(),
        "measurement started"
    );

    let outcome = async {
        setup(bench, params).await?;

        let mut points = Vec::with_capacity(grid.len());
        for (lo_pow, freq) in grid.points() {
            if token.is_cancelled() {
                info!(completed = points.len(), "measurement cancelled");
                return Err(Error::Cancelled);
            }

            let point = measure_point(bench, params, losses, lo_pow, freq).await?;
            debug!(?point, "raw point");
            on_point(&point);
            points.push(point);
        }

        Ok::<_, Error>(points)
    }.await;

    let shutdown = shutdown(bench, params).await;
    let points = settle_outcome(outcome, shutdown)?;
    info!(points = points.len(), "measurement finished");

    Ok(points)
}

async fn setup(bench: &mut InstrumentSet, params: &SecondaryParameters) -> Result<()>
{
    bench.lo.exec(CmdSet::ModulationState(false)).await?;
    bench.modulator.exec(CmdSet::ModulationState(false)).await?;
    bench.lo.exec(CmdSet::FreqMultiplier(if params.lo_doubler { 2 } else { 1 })).await?;

    bench.modulator.exec_all(&[
        CmdSet::SetModParam(ModParam::Arb(false)),
        CmdSet::SetModParam(ModParam::Waveform(WAVEFORM)),
        CmdSet::SetModParam(ModParam::BaseFreqOffset(params.mod_freq() + base_offset())),
        CmdSet::SetModParam(ModParam::Scale(params.umod)),
        CmdSet::SetModParam(ModParam::IqCommonOffset(params.iq_offset_volts())),
        CmdSet::SetModParam(ModParam::IqAdjust(true)),
        CmdSet::SetModParam(ModParam::DigitalModulation(true)),
        CmdSet::SetModParam(ModParam::IqAttenuation(0.0)),
    ]).await?;

    bench.supply.exec_all(&[
        CmdSet::Apply(Rail::Main, params.usrc, MAIN_RAIL_LIMIT),
        CmdSet::Apply(Rail::Aux, params.usrc_d, params.aux_current_limit()),
    ]).await?;

    bench.analyzer.exec_all(&[
        CmdSet::SetAnalyzerParam(AnalyzerParam::AutoCalibration(false)),
        CmdSet::SetAnalyzerParam(AnalyzerParam::Span(params.span())),
        CmdSet::SetAnalyzerParam(AnalyzerParam::ReferenceLevel(params.sa_rlev)),
        CmdSet::SetAnalyzerParam(AnalyzerParam::ScalePerDivision(params.sa_scale_y)),
        CmdSet::SetAnalyzerParam(AnalyzerParam::MarkerPositionMode),
        CmdSet::SetAnalyzerParam(AnalyzerParam::AverageCount(params.sa_avg_count)),
        CmdSet::SetAnalyzerParam(AnalyzerParam::Average(params.sa_avg_state)),
    ]).await
}

async fn read_marker(bench: &mut InstrumentSet, freq: Hertz) -> Result<f64>
{
    bench.analyzer.exec(CmdSet::SetAnalyzerParam(AnalyzerParam::MarkerX(freq))).await?;
    bench.analyzer.settle(MARKER_SETTLE).await;
    bench.analyzer.read(CmdSet::ReadMarkerPower).await
}

async fn measure_point(
    bench: &mut InstrumentSet,
    params: &SecondaryParameters,
    losses: &LossTable,
    lo_pow: SetPoint,
    freq: SetPoint,
) -> Result<RawPoint>
{
    let lo_freq = if params.flo_div2 { freq * 2 } else { freq };
    let loss = losses.get(lo_pow, lo_freq) / 2.0;

    bench.lo.exec(CmdSet::Power(lo_pow.as_f64() + loss)).await?;
    bench.lo.exec(CmdSet::Frequency(lo_freq.into())).await?;

    bench.supply.exec(CmdSet::SupplyOutput(true)).await?;
    bench.lo.exec(CmdSet::Output(true)).await?;
    bench.modulator.exec(CmdSet::Output(true)).await?;
    bench.modulator.exec(CmdSet::SetModParam(ModParam::Arb(true))).await?;
    bench.lo.settle(OUTPUT_SETTLE).await;

    let carrier: Hertz = freq.into();
    let (center, offset) = if params.lo_doubler {
        (carrier * 0.5, carrier * 0.5)
    }
    else {
        (carrier, Hertz(0.0))
    };
    bench.analyzer.exec_all(&[
        CmdSet::SetAnalyzerParam(AnalyzerParam::DisplayOffset(Hertz(0.0))),
        CmdSet::SetAnalyzerParam(AnalyzerParam::Center(center)),
        CmdSet::SetAnalyzerParam(AnalyzerParam::DisplayOffset(offset)),
    ]).await?;
    bench.analyzer.settle(CENTER_SETTLE).await;

    let mod_f = params.mod_freq();
    let (f_out, f_sb, f_spur) = if params.flo_div2 {
        (carrier + mod_f, carrier - mod_f, carrier - mod_f * 3.0)
    }
    else {
        (carrier - mod_f, carrier + mod_f, carrier + mod_f * 3.0)
    };
    let sa_p_out = read_marker(bench, f_out).await?;
    let sa_p_carr = read_marker(bench, carrier).await?;
    let sa_p_sb = read_marker(bench, f_sb).await?;
    let sa_p_3_harm = read_marker(bench, f_spur).await?;

    let src_i = bench.meter.read(CmdSet::ReadDcCurrent).await?;

    Ok(RawPoint {
        lo_p: lo_pow,
        lo_f: lo_freq,
        src_u: params.usrc,
        src_i: src_i,
        sa_p_out: sa_p_out,
        sa_p_carr: sa_p_carr,
        sa_p_sb: sa_p_sb,
        sa_p_3_harm: sa_p_3_harm,
        loss: loss,
    })
}

/// Outputs off, supply off, generator back at the sweep's start, analyzer auto-calibration on
async fn shutdown(bench: &mut InstrumentSet, params: &SecondaryParameters) -> Result<()>
{
    let mut unwind = Unwind::default();

    unwind.step(bench.lo.exec(CmdSet::Output(false)).await);
    unwind.step(bench.modulator.exec(CmdSet::Output(false)).await);
    unwind.step(bench.modulator.exec(CmdSet::SetModParam(ModParam::Arb(false))).await);
    bench.supply.settle(SHUTDOWN_SETTLE).await;
    unwind.step(bench.supply.exec(CmdSet::SupplyOutput(false)).await);

    unwind.step(bench.lo.exec(CmdSet::Power(params.power_axis().start())).await);
    unwind.step(bench.lo.exec(CmdSet::Frequency(params.lo_start_freq())).await);
    unwind.step(bench.analyzer.exec(CmdSet::SetAnalyzerParam(AnalyzerParam::AutoCalibration(true))).await);

    unwind.finish()
}
