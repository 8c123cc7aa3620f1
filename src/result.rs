//! Raw sweep points, their corrected derivations and the per-run result log
//!
//! # Derivation
//! Each raw point's four analyzer readings are compensated by adding the loss applied when the point
//! was acquired. Sideband and spur suppression are the compensated output minus the compensated
//! sideband and spur respectively. When the selected profile has an adjustment template, entry `i`
//! is added to output, carrier and both suppressions of the `i`-th record. Gain is the final output
//! power minus the LO set-point power. Everything shown is rounded to hundredths except frequency,
//! which is shown in GHz to thousandths.
//!
//! # Observers
//! [`ResultAccumulator::subscribe`] hands out a receiver which gets one [`PointReady`] per accumulated
//! point. The notification carries nothing. Observers lock the accumulator and copy what they need.

use std::{
    collections::BTreeMap,
    path::{ Path, PathBuf },
};
use serde::{ Deserialize, Serialize };
use tokio::sync::broadcast;
use tracing::{ debug, info, warn };
use crate::{
    correction::{ self, AdjustmentEntry, AdjustmentTemplate },
    error::Result,
    units::{ round_to, Hertz, Giga, SetPoint },
};

/// One sweep sample as read from the instruments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPoint
{
    /// LO power set-point, dBm
    pub lo_p: SetPoint,
    /// Programmed generator frequency, Hz
    pub lo_f: SetPoint,
    /// Commanded main rail voltage, V
    pub src_u: f64,
    /// Supply current, A
    pub src_i: f64,
    /// dBm at the output tone
    pub sa_p_out: f64,
    /// dBm at the carrier
    pub sa_p_carr: f64,
    /// dBm at the sideband
    pub sa_p_sb: f64,
    /// dBm at the third-order spur
    pub sa_p_3_harm: f64,
    /// Loss correction added to the programmed LO power, dB
    pub loss: f64,
}

/// A corrected, display-ready record. Field names are the export column names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedRecord
{
    pub lo_p: f64,
    /// GHz
    pub lo_f: f64,
    pub src_u: f64,
    /// mA
    pub src_i: f64,
    pub p_out: f64,
    pub p_carr: f64,
    pub p_sb: f64,
    pub p_mod_f_x3: f64,
    pub a_sb: f64,
    pub a_x3: f64,
    pub gain: f64,
    pub loss: f64,
}

pub type Series = BTreeMap<SetPoint, Vec<(f64, f64)>>;

/// Plot-ready `(frequency GHz, value)` series keyed by LO power
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesAggregate
{
    /// Output power
    pub data1: Series,
    /// Carrier power
    pub data2: Series,
    /// Sideband suppression
    pub data3: Series,
    /// Spur suppression
    pub data4: Series,
}

impl SeriesAggregate
{
    fn push(&mut self, power: SetPoint, record: &ProcessedRecord)
    {
        self.data1.entry(power).or_default().push((record.lo_f, record.p_out));
        self.data2.entry(power).or_default().push((record.lo_f, record.p_carr));
        self.data3.entry(power).or_default().push((record.lo_f, record.a_sb));
        self.data4.entry(power).or_default().push((record.lo_f, record.a_x3));
    }

    fn clear(&mut self)
    {
        self.data1.clear();
        self.data2.clear();
        self.data3.clear();
        self.data4.clear();
    }
}

/// Notifications a receiver may fall behind by before it starts missing them
pub const NOTIFY_DEPTH: usize = 64;

/// Fired once per accumulated point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointReady;

pub struct ResultAccumulator
{
    template_path: Option<PathBuf>,
    adjustment: Option<AdjustmentTemplate>,
    raw: Vec<RawPoint>,
    processed: Vec<ProcessedRecord>,
    series: SeriesAggregate,
    ready: bool,
    notify: broadcast::Sender<PointReady>,
}

impl Default for ResultAccumulator
{
    fn default() -> Self
    {
        Self::new()
    }
}

impl ResultAccumulator
{
    /// An accumulator with no adjustment template
    pub fn new() -> Self
    {
        let (notify, _) = broadcast::channel(NOTIFY_DEPTH);
        Self {
            template_path: None,
            adjustment: None,
            raw: Vec::new(),
            processed: Vec::new(),
            series: SeriesAggregate::default(),
            ready: false,
            notify: notify,
        }
    }

    /// Select the profile's template file and reset against it
    pub fn select_template(&mut self, path: impl Into<PathBuf>) -> Result<()>
    {
        self.template_path = Some(path.into());
        self.reset()
    }

    pub fn adjustment(&self) -> Option<&AdjustmentTemplate>
    {
        self.adjustment.as_ref()
    }

    /// Receiver for one [`PointReady`] per accumulated point
    ///
    /// A receiver more than [`NOTIFY_DEPTH`] notifications behind gets
    /// [`broadcast::error::RecvError::Lagged`] with the number it missed, then resumes. Nothing is
    /// lost with them, since the accumulator itself holds every point.
    pub fn subscribe(&self) -> broadcast::Receiver<PointReady>
    {
        self.notify.subscribe()
    }

    /// Clear every log and series, then reload the selected profile's template
    pub fn reset(&mut self) -> Result<()>
    {
        self.raw.clear();
        self.processed.clear();
        self.series.clear();
        self.ready = false;

        self.adjustment = match &self.template_path {
            Some(path) => AdjustmentTemplate::load(path)?,
            None => None,
        };
        if let Some(template) = &self.adjustment {
            debug!(entries = template.len(), "adjustment template loaded");
        }

        Ok(())
    }

    pub fn add_point(&mut self, point: RawPoint) -> &ProcessedRecord
    {
        let index = self.processed.len();
        let record = self.derive(index, &point);
        debug!(index, ?record, "point processed");

        self.series.push(point.lo_p, &record);
        self.raw.push(point);
        self.processed.push(record);
        let _ = self.notify.send(PointReady);

        &self.processed[index]
    }

    fn derive(&self, index: usize, point: &RawPoint) -> ProcessedRecord
    {
        let mut p_out = point.sa_p_out + point.loss;
        let mut p_carr = point.sa_p_carr + point.loss;
        let p_sb = point.sa_p_sb + point.loss;
        let p_spur = point.sa_p_3_harm + point.loss;

        let mut a_sb = p_out - p_sb;
        let mut a_x3 = p_out - p_spur;

        if let Some(template) = &self.adjustment {
            match template.get(index) {
                Some(entry) => {
                    p_out += entry.p_out;
                    p_carr += entry.p_carr;
                    a_sb += entry.a_sb;
                    a_x3 += entry.a_x3;
                }
                None => warn!(index, entries = template.len(), "adjustment template is shorter than the run"),
            }
        }

        let lo_p = point.lo_p.as_f64();
        ProcessedRecord {
            lo_p: lo_p,
            lo_f: round_to(Hertz(point.lo_f.as_f64()).as_f64::<Giga>(), 3),
            src_u: round_to(point.src_u, 2),
            src_i: round_to(point.src_i * 1000.0, 2),
            p_out: round_to(p_out, 2),
            p_carr: round_to(p_carr, 2),
            p_sb: round_to(p_sb, 2),
            p_mod_f_x3: round_to(p_spur, 2),
            a_sb: round_to(a_sb, 2),
            a_x3: round_to(a_x3, 2),
            gain: round_to(p_out - lo_p, 2),
            loss: round_to(point.loss, 2),
        }
    }

    /// Mark the run's processing as finished
    pub fn finalize(&mut self)
    {
        self.ready = true;
        info!(points = self.processed.len(), "results finalized");
    }

    pub fn is_complete(&self) -> bool
    {
        self.ready
    }

    pub fn raw(&self) -> &[RawPoint]
    {
        &self.raw
    }

    pub fn processed(&self) -> &[ProcessedRecord]
    {
        &self.processed
    }

    pub fn series(&self) -> &SeriesAggregate
    {
        &self.series
    }

    /// Turn the current run into the profile's zero-correction baseline
    ///
    /// Does nothing and returns `false` when a template is already loaded.
    pub fn capture_adjustment_template(&mut self) -> Result<bool>
    {
        if self.adjustment.is_some() {
            return Ok(false);
        }

        let template = AdjustmentTemplate::with(
            self.processed
                .iter()
                .map(|record| AdjustmentEntry {
                    lo_p: record.lo_p,
                    lo_f: record.lo_f,
                    ..Default::default()
                })
                .collect()
        );
        if let Some(path) = &self.template_path {
            template.save(path)?;
            info!(path = %path.display(), entries = template.len(), "adjustment template captured");
        }
        self.adjustment = Some(template);

        Ok(true)
    }

    /// Human-readable summary of the most recent record
    pub fn report(&self) -> Option<String>
    {
        let record = self.processed.last()?;
        Some(format!(
            "LO generator:\n\
             \x20 P, dBm = {}\n\
             \x20 F, GHz = {:.2}\n\
             Power supply:\n\
             \x20 U, V = {}\n\
             \x20 I, mA = {}\n\
             Analyzer:\n\
             \x20 P out, dBm = {:.3}\n\
             \x20 P carrier, dBm = {:.3}\n\
             \x20 P sideband, dBm = {}\n\
             \x20 P 3rd harmonic, dBm = {}\n\
             Derived:\n\
             \x20 sideband suppression, dB = {}\n\
             \x20 3rd harmonic suppression, dB = {}\n\
             \x20 gain, dB = {}\n",
            record.lo_p,
            record.lo_f,
            record.src_u,
            record.src_i,
            record.p_out,
            record.p_carr,
            record.p_sb,
            record.p_mod_f_x3,
            record.a_sb,
            record.a_x3,
            record.gain,
        ))
    }

    /// Write the processed log as CSV with the record's field names as the header
    pub fn write_csv<W: std::io::Write>(&self, writer: W) -> Result<()>
    {
        let mut writer = csv::Writer::from_writer(writer);
        for record in self.processed.iter() {
            writer.serialize(record)?;
        }
        writer.flush().map_err(csv::Error::from)?;

        Ok(())
    }

    pub fn export_csv(&self, path: &Path) -> Result<()>
    {
        let mut buffer = Vec::new();
        self.write_csv(&mut buffer)?;
        correction::write_replacing(path, &buffer)?;
        info!(path = %path.display(), records = self.processed.len(), "results exported");

        Ok(())
    }

    /// Dump the raw log as JSON
    pub fn dump_raw(&self, path: &Path) -> Result<()>
    {
        let text = serde_json::to_vec_pretty(&self.raw)?;
        correction::write_replacing(path, &text)
    }
}

#[cfg(test)]
mod tests
{
    use super::{ PointReady, RawPoint, ResultAccumulator, NOTIFY_DEPTH };
    use tokio::sync::broadcast::error::TryRecvError;
    use crate::{
        correction::{ AdjustmentEntry, AdjustmentTemplate },
        units::SetPoint,
    };

    fn point(lo_p: f64, lo_f_hz: f64, out: f64, sb: f64) -> RawPoint
    {
        RawPoint {
            lo_p: SetPoint::from_f64(lo_p),
            lo_f: SetPoint::from_f64(lo_f_hz),
            src_u: 5.0,
            src_i: 0.0125,
            sa_p_out: out,
            sa_p_carr: -40.0,
            sa_p_sb: sb,
            sa_p_3_harm: -50.0,
            loss: 0.0,
        }
    }

    #[test]
    fn suppression_is_output_minus_sideband()
    {
        let mut results = ResultAccumulator::new();
        let record = results.add_point(point(-10.0, 50e6, -10.0, -30.0)).clone();

        assert_eq!(record.a_sb, 20.0);
        assert_eq!(record.a_x3, 40.0);
        assert_eq!(record.gain, 0.0);
        assert_eq!(record.lo_f, 0.05);
        assert_eq!(record.src_i, 12.5);
    }

    #[test]
    fn loss_compensates_every_reading()
    {
        let mut results = ResultAccumulator::new();
        let record = results.add_point(RawPoint { loss: 1.5, ..point(-5.0, 150e6, -10.0, -30.0) }).clone();

        assert_eq!(record.p_out, -8.5);
        assert_eq!(record.p_carr, -38.5);
        assert_eq!(record.p_sb, -28.5);
        assert_eq!(record.a_sb, 20.0);
        assert_eq!(record.gain, -3.5);
    }

    #[test]
    fn short_template_leaves_later_records_alone()
    {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("adjust_+25.json");
        AdjustmentTemplate::with(vec![AdjustmentEntry { p_out: 1.0, a_sb: 0.5, ..Default::default() }])
            .save(&path)
            .unwrap();

        let mut results = ResultAccumulator::new();
        results.select_template(&path).unwrap();
        let first = results.add_point(point(-10.0, 50e6, -10.0, -30.0)).clone();
        let second = results.add_point(point(-10.0, 150e6, -10.0, -30.0)).clone();

        assert_eq!(first.p_out, -9.0);
        assert_eq!(first.a_sb, 20.5);
        assert_eq!(second.p_out, -10.0);
        assert_eq!(second.a_sb, 20.0);
    }

    #[test]
    fn capture_is_idempotent()
    {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("adjust_-60.json");

        let mut results = ResultAccumulator::new();
        results.select_template(&path).unwrap();
        results.add_point(point(-10.0, 50e6, -10.0, -30.0));
        results.add_point(point(-10.0, 150e6, -11.0, -30.0));

        assert!(results.capture_adjustment_template().unwrap());
        let captured = std::fs::read_to_string(&path).unwrap();
        assert!(!results.capture_adjustment_template().unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), captured);

        let template = AdjustmentTemplate::load(&path).unwrap().unwrap();
        assert_eq!(template.len(), 2);
        assert_eq!(template.get(1).unwrap().lo_f, 0.15);
        assert_eq!(template.get(1).unwrap().p_out, 0.0);
    }

    #[test]
    fn reset_clears_and_reloads()
    {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("adjust_+85.json");

        let mut results = ResultAccumulator::new();
        results.select_template(&path).unwrap();
        results.add_point(point(0.0, 50e6, -10.0, -30.0));
        results.capture_adjustment_template().unwrap();
        results.finalize();
        assert!(results.is_complete());

        results.reset().unwrap();
        assert!(!results.is_complete());
        assert!(results.processed().is_empty());
        assert!(results.raw().is_empty());
        assert!(results.series().data1.is_empty());
        assert_eq!(results.adjustment().map(|template| template.len()), Some(1));
    }

    #[test]
    fn point_ready_fires_per_point()
    {
        let mut results = ResultAccumulator::new();
        let mut ready = results.subscribe();

        results.add_point(point(0.0, 50e6, -10.0, -30.0));
        results.add_point(point(0.0, 150e6, -10.0, -30.0));

        assert_eq!(ready.try_recv().unwrap(), PointReady);
        assert_eq!(ready.try_recv().unwrap(), PointReady);
        assert!(ready.try_recv().is_err());
    }

    #[test]
    fn slow_observer_lags_then_resumes()
    {
        let mut results = ResultAccumulator::new();
        let mut ready = results.subscribe();

        for index in 0..NOTIFY_DEPTH + 6 {
            results.add_point(point(0.0, 50e6 + index as f64 * 1e6, -10.0, -30.0));
        }

        assert!(matches!(ready.try_recv(), Err(TryRecvError::Lagged(6))));
        let mut seen = 0;
        while ready.try_recv().is_ok() {
            seen += 1;
        }
        assert_eq!(seen, NOTIFY_DEPTH);
        assert_eq!(results.processed().len(), NOTIFY_DEPTH + 6);
    }

    #[test]
    fn csv_uses_record_field_names()
    {
        let mut results = ResultAccumulator::new();
        results.add_point(point(-10.0, 50e6, -10.0, -30.0));

        let mut buffer = Vec::new();
        results.write_csv(&mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let mut lines = text.lines();

        assert_eq!(
            lines.next().unwrap(),
            "lo_p,lo_f,src_u,src_i,p_out,p_carr,p_sb,p_mod_f_x3,a_sb,a_x3,gain,loss"
        );
        assert_eq!(lines.next().unwrap(), "-10.0,0.05,5.0,12.5,-10.0,-40.0,-30.0,-50.0,20.0,40.0,0.0,0.0");
    }

    #[test]
    fn report_needs_a_record()
    {
        let mut results = ResultAccumulator::new();
        assert!(results.report().is_none());

        results.add_point(point(-10.0, 50e6, -10.0, -30.0));
        let report = results.report().unwrap();
        assert!(report.contains("sideband suppression, dB = 20"));
        assert!(report.contains("F, GHz = 0.05"));
    }
}
