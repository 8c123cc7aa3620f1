//! Instrument roles and typed device handles
//!
//! # Purpose
//! A bench for a sweep has five instruments, each with a fixed role: the LO generator, the modulation
//! generator, the dual-rail supply, the multimeter reading supply current and the spectrum analyzer.
//! This module wraps each one in a [`Device`] which turns [`CmdSet`] values into bus traffic and
//! classifies failures by role, so that an error names the instrument which caused it.
//!
//! # Ownership
//! Whichever procedure is running holds `&mut InstrumentSet` for its whole duration. An instrument in
//! the middle of a sweep cannot safely serve a second one, and the borrow makes that impossible to
//! express.

use std::{ fmt, time::Duration };
use crate::{
    cmd::CmdSet,
    error::{ Error, Result },
    instrument::Instrument,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role
{
    Lo,
    Modulator,
    Supply,
    Meter,
    Analyzer,
}

impl Role
{
    pub const ALL: [Role; 5] = [Role::Lo, Role::Modulator, Role::Supply, Role::Meter, Role::Analyzer];

    /// Short key used in configuration files and fixtures
    pub fn key(&self) -> &'static str
    {
        match self {
            Self::Lo => "lo",
            Self::Modulator => "modulator",
            Self::Supply => "supply",
            Self::Meter => "meter",
            Self::Analyzer => "analyzer",
        }
    }
}

impl fmt::Display for Role
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Self::Lo => f.write_str("LO generator"),
            Self::Modulator => f.write_str("modulation generator"),
            Self::Supply => f.write_str("power supply"),
            Self::Meter => f.write_str("multimeter"),
            Self::Analyzer => f.write_str("spectrum analyzer"),
        }
    }
}

/// A connected instrument in a known role
pub struct Device
{
    role: Role,
    io_handle: Box<dyn Instrument>,
}

impl Device
{
    pub fn with(role: Role, io_handle: Box<dyn Instrument>) -> Self
    {
        Self {
            role: role,
            io_handle: io_handle,
        }
    }

    pub fn role(&self) -> Role
    {
        self.role
    }

    pub async fn exec(&mut self, cmd: CmdSet) -> Result<()>
    {
        let role = self.role;
        self.io_handle
            .send(&cmd.to_string())
            .await
            .map_err(|err| Error::Io { role: role, source: err })
    }

    pub async fn exec_all(&mut self, cmds: &[CmdSet]) -> Result<()>
    {
        for cmd in cmds.iter() {
            self.exec(cmd.clone()).await?;
        }

        Ok(())
    }

    /// Runs a query and parses the reply as a number
    pub async fn read(&mut self, cmd: CmdSet) -> Result<f64>
    {
        let role = self.role;
        let command = cmd.to_string();
        let reply = self.io_handle
            .query(&command)
            .await
            .map_err(|err| Error::Io { role: role, source: err })?;

        reply.trim().parse::<f64>().map_err(|_| Error::Parse {
            role: role,
            command: command,
            reply: reply,
        })
    }

    pub async fn settle(&mut self, dwell: Duration)
    {
        self.io_handle.settle(dwell).await
    }

    pub async fn find(&mut self) -> bool
    {
        self.io_handle.find().await
    }

    pub fn status(&self) -> bool
    {
        self.io_handle.status()
    }
}

/// The full bench, one device per role
pub struct InstrumentSet
{
    pub lo: Device,
    pub modulator: Device,
    pub supply: Device,
    pub meter: Device,
    pub analyzer: Device,
}

impl InstrumentSet
{
    /// Assemble a bench from backends given in [`Role::ALL`] order
    pub fn with(
        lo: Box<dyn Instrument>,
        modulator: Box<dyn Instrument>,
        supply: Box<dyn Instrument>,
        meter: Box<dyn Instrument>,
        analyzer: Box<dyn Instrument>,
    ) -> Self
    {
        Self {
            lo: Device::with(Role::Lo, lo),
            modulator: Device::with(Role::Modulator, modulator),
            supply: Device::with(Role::Supply, supply),
            meter: Device::with(Role::Meter, meter),
            analyzer: Device::with(Role::Analyzer, analyzer),
        }
    }

    fn devices(&self) -> [&Device; 5]
    {
        [&self.lo, &self.modulator, &self.supply, &self.meter, &self.analyzer]
    }

    fn devices_mut(&mut self) -> [&mut Device; 5]
    {
        [&mut self.lo, &mut self.modulator, &mut self.supply, &mut self.meter, &mut self.analyzer]
    }

    /// Probe every instrument. Returns `true` only when all of them answered.
    pub async fn find_all(&mut self) -> bool
    {
        let mut all_found = true;
        for device in self.devices_mut() {
            all_found &= device.find().await;
        }

        all_found
    }

    pub fn status(&self) -> Vec<(Role, bool)>
    {
        self.devices()
            .iter()
            .map(|device| (device.role(), device.status()))
            .collect()
    }

    /// Roles which did not answer the last probe
    pub fn missing(&self) -> Vec<Role>
    {
        self.status()
            .into_iter()
            .filter(|(_, found)| !found)
            .map(|(role, _)| role)
            .collect()
    }

    /// Send `*RST` to every instrument
    pub async fn reset_all(&mut self) -> Result<()>
    {
        for device in self.devices_mut() {
            device.exec(CmdSet::Reset).await?;
        }

        Ok(())
    }
}
