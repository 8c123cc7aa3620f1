//! Fixture-replaying instrument backend
//!
//! Replays recorded replies instead of talking to hardware. Everything the procedures send is
//! appended to a shared [`Journal`], so a test can assert on the exact command traffic a sweep would
//! have put on the bus.

use std::{
    collections::{ HashMap, VecDeque },
    io,
    path::Path,
    sync::{ Arc, Mutex },
};
use async_trait::async_trait;
use serde::{ Deserialize, Serialize };
use crate::{
    devices::{ InstrumentSet, Role },
    error::{ Error, Result },
    instrument::Instrument,
};

/// Replies one instrument gives, keyed by the exact query text
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Script
{
    /// Replies consumed in order for each query
    #[serde(default)]
    pub replies: HashMap<String, VecDeque<String>>,
    /// Reply used once a query's queue is empty. Without one an exhausted query fails.
    #[serde(default)]
    pub fallback: Option<String>,
    /// Commands starting with this text fail with a broken pipe
    #[serde(default)]
    pub fail_on: Option<String>,
}

impl Script
{
    pub fn reply(mut self, query: &str, replies: &[&str]) -> Self
    {
        self.replies
            .entry(query.to_string())
            .or_default()
            .extend(replies.iter().map(|reply| reply.to_string()));
        self
    }

    pub fn fallback(mut self, reply: &str) -> Self
    {
        self.fallback = Some(reply.to_string());
        self
    }

    pub fn fail_on(mut self, prefix: &str) -> Self
    {
        self.fail_on = Some(prefix.to_string());
        self
    }
}

/// Shared, ordered record of `(instrument, command)` pairs
#[derive(Debug, Clone, Default)]
pub struct Journal
{
    entries: Arc<Mutex<Vec<(String, String)>>>,
}

impl Journal
{
    fn record(&self, name: &str, cmd: &str)
    {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push((name.to_string(), cmd.to_string()));
        }
    }

    pub fn entries(&self) -> Vec<(String, String)>
    {
        self.entries.lock().map(|entries| entries.clone()).unwrap_or_default()
    }

    pub fn commands_for(&self, name: &str) -> Vec<String>
    {
        self.entries()
            .into_iter()
            .filter(|(instrument, _)| instrument == name)
            .map(|(_, cmd)| cmd)
            .collect()
    }

    pub fn clear(&self)
    {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

pub struct ReplayInstrument
{
    name: String,
    script: Script,
    journal: Journal,
    found: bool,
}

impl ReplayInstrument
{
    pub fn with(name: impl Into<String>, script: Script, journal: Journal) -> Self
    {
        Self {
            name: name.into(),
            script: script,
            journal: journal,
            found: false,
        }
    }

    fn check_fault(&self, cmd: &str) -> io::Result<()>
    {
        match &self.script.fail_on {
            Some(prefix) if cmd.starts_with(prefix.as_str()) => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                format!("{} dropped off the bus", self.name),
            )),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl Instrument for ReplayInstrument
{
    async fn send(&mut self, cmd: &str) -> io::Result<()>
    {
        self.check_fault(cmd)?;
        self.journal.record(&self.name, cmd);
        Ok(())
    }

    async fn query(&mut self, cmd: &str) -> io::Result<String>
    {
        self.check_fault(cmd)?;
        self.journal.record(&self.name, cmd);

        let queued = self.script.replies.get_mut(cmd).and_then(|replies| replies.pop_front());
        queued
            .or_else(|| self.script.fallback.clone())
            .ok_or_else(|| io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("fixture for {} has no reply to {:?}", self.name, cmd),
            ))
    }

    async fn find(&mut self) -> bool
    {
        self.found = true;
        self.found
    }

    fn status(&self) -> bool
    {
        self.found
    }
}

/// Scripts for a whole bench, loadable from JSON
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Fixture
{
    #[serde(default)]
    pub lo: Script,
    #[serde(default)]
    pub modulator: Script,
    #[serde(default)]
    pub supply: Script,
    #[serde(default)]
    pub meter: Script,
    #[serde(default)]
    pub analyzer: Script,
}

impl Fixture
{
    pub fn load(path: &Path) -> Result<Self>
    {
        let text = std::fs::read_to_string(path).map_err(|err| Error::file(path, err))?;
        Ok(serde_json::from_str(&text)?)
    }

    fn script(&self, role: Role) -> Script
    {
        match role {
            Role::Lo => self.lo.clone(),
            Role::Modulator => self.modulator.clone(),
            Role::Supply => self.supply.clone(),
            Role::Meter => self.meter.clone(),
            Role::Analyzer => self.analyzer.clone(),
        }
    }
}

/// Build a simulated bench whose instruments all write to `journal`
///
/// Instruments are named by [`Role::key`] in the journal.
pub fn bench(fixture: &Fixture, journal: &Journal) -> InstrumentSet
{
    let instrument = |role: Role| -> Box<dyn Instrument> {
        Box::new(ReplayInstrument::with(role.key(), fixture.script(role), journal.clone()))
    };

    InstrumentSet::with(
        instrument(Role::Lo),
        instrument(Role::Modulator),
        instrument(Role::Supply),
        instrument(Role::Meter),
        instrument(Role::Analyzer),
    )
}

#[cfg(test)]
mod tests
{
    use super::{ Fixture, Journal, ReplayInstrument, Script };
    use crate::instrument::Instrument;

    #[tokio::test]
    async fn queued_replies_then_fallback()
    {
        let script = Script::default()
            .reply("MEAS:CURR:DC? 1A,DEF", &["0.011", "0.012"])
            .fallback("0.0");
        let mut meter = ReplayInstrument::with("meter", script, Journal::default());

        assert_eq!(&meter.query("MEAS:CURR:DC? 1A,DEF").await.unwrap(), "0.011");
        assert_eq!(&meter.query("MEAS:CURR:DC? 1A,DEF").await.unwrap(), "0.012");
        assert_eq!(&meter.query("MEAS:CURR:DC? 1A,DEF").await.unwrap(), "0.0");
    }

    #[tokio::test]
    async fn exhausted_without_fallback_fails()
    {
        let mut analyzer = ReplayInstrument::with("analyzer", Script::default(), Journal::default());
        let err = analyzer.query(":CALCulate:MARKer:Y?").await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn fault_injection_is_not_journaled()
    {
        let journal = Journal::default();
        let mut supply = ReplayInstrument::with("supply", Script::default().fail_on("OUTPut ON"), journal.clone());

        supply.send("OUTPut OFF").await.unwrap();
        assert!(supply.send("OUTPut ON").await.is_err());
        assert_eq!(journal.commands_for("supply"), vec!["OUTPut OFF".to_string()]);
    }

    #[test]
    fn fixture_from_json()
    {
        let fixture: Fixture = serde_json::from_str(r#"{
            "analyzer": { "replies": { ":CALCulate:MARKer:Y?": ["-10.5", "-31"] }, "fallback": "-60" },
            "meter": { "fallback": "0.015" }
        }"#).unwrap();

        assert_eq!(fixture.analyzer.replies[":CALCulate:MARKer:Y?"].len(), 2);
        assert_eq!(fixture.meter.fallback.as_deref(), Some("0.015"));
        assert!(fixture.lo.replies.is_empty());
    }
}
