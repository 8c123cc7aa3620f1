//! Correction data: the LO delivery-loss table and per-profile adjustment templates
//!
//! Both are loaded before a run and never mutated during it. Missing data is never an error: a
//! missing file loads as an empty table, a missing entry corrects by nothing.

use std::{
    collections::BTreeMap,
    io::Write,
    path::Path,
};
use serde::{ Deserialize, Serialize, de::DeserializeOwned };
use tracing::debug;
use crate::{
    error::{ Error, Result },
    units::SetPoint,
};

/// Replace `path` wholesale with `contents`
///
/// Writes a sibling temp file first so a reader never sees a half-written table.
pub(crate) fn write_replacing(path: &Path, contents: &[u8]) -> Result<()>
{
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = Path::new(&tmp_name);

    let mut file = std::fs::File::create(tmp_path).map_err(|err| Error::file(tmp_path, err))?;
    file.write_all(contents).map_err(|err| Error::file(tmp_path, err))?;
    file.sync_all().map_err(|err| Error::file(tmp_path, err))?;
    drop(file);

    std::fs::rename(tmp_path, path).map_err(|err| Error::file(path, err))
}

/// Read a JSON document, or `None` when the file does not exist
fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>>
{
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no correction file");
            Ok(None)
        }
        Err(err) => Err(Error::file(path, err)),
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()>
{
    let text = serde_json::to_vec_pretty(value)?;
    write_replacing(path, &text)
}

/// One measured loss, as stored on disk
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LossEntry
{
    /// LO power set-point, dBm
    pub power: SetPoint,
    /// Generator frequency set-point, Hz
    pub frequency: SetPoint,
    /// dB
    pub loss: f64,
}

/// Measured LO delivery loss by power set-point, then generator frequency set-point
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<LossEntry>", into = "Vec<LossEntry>")]
pub struct LossTable
{
    table: BTreeMap<SetPoint, BTreeMap<SetPoint, f64>>,
}

impl LossTable
{
    /// Loss at `(power, frequency)`, or 0 for a pair that was never calibrated
    pub fn get(&self, power: SetPoint, frequency: SetPoint) -> f64
    {
        self.table
            .get(&power)
            .and_then(|row| row.get(&frequency))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn insert(&mut self, power: SetPoint, frequency: SetPoint, loss: f64)
    {
        self.table.entry(power).or_default().insert(frequency, loss);
    }

    pub fn len(&self) -> usize
    {
        self.table.values().map(|row| row.len()).sum()
    }

    pub fn is_empty(&self) -> bool
    {
        self.len() == 0
    }

    pub fn entries(&self) -> impl Iterator<Item = LossEntry> + '_
    {
        self.table.iter().flat_map(|(power, row)| {
            row.iter().map(move |(frequency, loss)| LossEntry {
                power: *power,
                frequency: *frequency,
                loss: *loss,
            })
        })
    }

    pub fn load(path: &Path) -> Result<Self>
    {
        Ok(read_json(path)?.unwrap_or_default())
    }

    pub fn save(&self, path: &Path) -> Result<()>
    {
        write_json(path, self)
    }
}

impl From<Vec<LossEntry>> for LossTable
{
    fn from(entries: Vec<LossEntry>) -> Self
    {
        let mut table = Self::default();
        for entry in entries {
            table.insert(entry.power, entry.frequency, entry.loss);
        }

        table
    }
}

impl From<LossTable> for Vec<LossEntry>
{
    fn from(table: LossTable) -> Self
    {
        table.entries().collect()
    }
}

/// Correction applied to one processed record
///
/// `p_out`, `p_carr`, `a_sb` and `a_x3` are added to the matching derived quantities. `lo_p` and
/// `lo_f` record which point the entry was captured at and are not applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentEntry
{
    pub lo_p: f64,
    pub lo_f: f64,
    pub p_out: f64,
    pub p_carr: f64,
    pub a_sb: f64,
    pub a_x3: f64,
}

/// Per-index corrections captured from a reference run
///
/// Entry `i` corrects the `i`-th processed record of a run with the same sweep shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdjustmentTemplate
{
    entries: Vec<AdjustmentEntry>,
}

impl AdjustmentTemplate
{
    pub fn with(entries: Vec<AdjustmentEntry>) -> Self
    {
        Self { entries: entries }
    }

    pub fn get(&self, index: usize) -> Option<&AdjustmentEntry>
    {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize
    {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.entries.is_empty()
    }

    /// `None` when the profile has no template yet
    pub fn load(path: &Path) -> Result<Option<Self>>
    {
        read_json(path)
    }

    pub fn save(&self, path: &Path) -> Result<()>
    {
        write_json(path, self)
    }
}

#[cfg(test)]
mod tests
{
    use super::{ AdjustmentEntry, AdjustmentTemplate, LossTable };
    use crate::units::SetPoint;

    fn sp(value: f64) -> SetPoint
    {
        SetPoint::from_f64(value)
    }

    #[test]
    fn missing_entry_is_zero()
    {
        let mut table = LossTable::default();
        table.insert(sp(-10.0), sp(50_000_000.0), 1.25);

        assert_eq!(table.get(sp(-10.0), sp(50_000_000.0)), 1.25);
        assert_eq!(table.get(sp(-10.0), sp(150_000_000.0)), 0.0);
        assert_eq!(table.get(sp(-5.0), sp(50_000_000.0)), 0.0);
    }

    #[test]
    fn loss_table_round_trip()
    {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cal_lo.json");

        let mut table = LossTable::default();
        for (power, freq, loss) in [(-10.0, 50e6, 0.5), (-10.0, 150e6, 0.75), (0.0, 50e6, 1.125)] {
            table.insert(sp(power), sp(freq), loss);
        }
        table.save(&path).unwrap();

        let loaded = LossTable::load(&path).unwrap();
        assert_eq!(loaded.len(), 3);
        for entry in table.entries() {
            assert_eq!(loaded.get(entry.power, entry.frequency), entry.loss);
        }
        assert!(!dir.path().join("cal_lo.json.tmp").exists());
    }

    #[test]
    fn missing_files_load_empty()
    {
        let dir = tempfile::tempdir().unwrap();
        assert!(LossTable::load(&dir.path().join("cal_lo.json")).unwrap().is_empty());
        assert!(AdjustmentTemplate::load(&dir.path().join("adjust_+25.json")).unwrap().is_none());
    }

    #[test]
    fn template_is_a_plain_list()
    {
        let template = AdjustmentTemplate::with(vec![AdjustmentEntry { p_out: 0.5, ..Default::default() }]);
        let json = serde_json::to_value(&template).unwrap();
        assert!(json.is_array());
        assert_eq!(json[0]["p_out"], 0.5);
        assert!(template.get(1).is_none());
    }
}
