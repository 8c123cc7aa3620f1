//! Instrument command definition and SCPI serialization

use std::fmt;
use crate::units::Hertz;

/// Output rails of the dual-rail bench supply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rail
{
    /// Main device rail, `p6v`
    Main,
    /// Auxiliary device rail, `p25v`
    Aux,
}

/// Settings of the modulation generator's arbitrary waveform and IQ stages
#[derive(Debug, Clone, PartialEq)]
pub enum ModParam
{
    /// Command: `:RAD:ARB <ON|OFF>`
    Arb(bool),
    /// Command: `:RAD:ARB:WAV "<name>"`
    Waveform(&'static str),
    /// Command: `:RAD:ARB:BASE:FREQ:OFFS <hz>Hz`
    BaseFreqOffset(Hertz),
    /// Waveform runtime scaling in percent
    ///
    /// Command: `:RAD:ARB:RSC <percent>`
    Scale(f64),
    /// External IQ common offset voltage
    ///
    /// Command: `:DM:IQAD:EXT:COFF <volts>V`
    IqCommonOffset(f64),
    /// Command: `:DM:IQAD <ON|OFF>`
    IqAdjust(bool),
    /// Command: `:DM:STAT <ON|OFF>`
    DigitalModulation(bool),
    /// Command: `:DM:IQAD:EXT:IQAT <db>db`
    IqAttenuation(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnalyzerParam
{
    /// Command: `:CAL:AUTO <ON|OFF>`
    AutoCalibration(bool),
    /// Command: `:SENS:FREQ:SPAN <hz>Hz`
    Span(Hertz),
    /// Command: `DISP:WIND:TRAC:Y:RLEV <db>`
    ReferenceLevel(f64),
    /// Command: `DISP:WIND:TRAC:Y:PDIV <db>`
    ScalePerDivision(f64),
    /// Put marker 1 in position mode
    ///
    /// Command: `:CALC:MARK1:MODE POS`
    MarkerPositionMode,
    /// Command: `AVER:COUNT <n>`
    AverageCount(u32),
    /// Command: `AVER <ON|OFF>`
    Average(bool),
    /// Command: `:SENSe:FREQuency:CENTer <hz>Hz`
    Center(Hertz),
    /// Offset added to the displayed frequency axis
    ///
    /// Command: `DISP:WIND:TRAC:X:OFFS <hz>Hz`
    DisplayOffset(Hertz),
    /// Move marker 1
    ///
    /// Command: `:CALCulate:MARKer1:X <hz>Hz`
    MarkerX(Hertz),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CmdSet
{
    /// Return the instrument to its power-on state
    ///
    /// Command: `*RST`
    Reset,
    /// Ask the instrument to identify itself
    ///
    /// Query: `*IDN?`
    Identify,
    /// Enable or disable the generator's internal modulation
    ///
    /// Command: `:OUTP:MOD:STAT <ON|OFF>`
    ModulationState(bool),
    /// Command: `:FREQ:MULT <n>`
    FreqMultiplier(u32),
    /// Generator output power in dBm
    ///
    /// Command: `SOUR:POW <dbm>dbm`
    Power(f64),
    /// Command: `SOUR:FREQ <hz>Hz`
    Frequency(Hertz),
    /// Generator RF output
    ///
    /// Command: `OUTP:STAT <ON|OFF>`
    Output(bool),
    SetModParam(ModParam),
    /// Program a supply rail's voltage and current limit
    ///
    /// Command: `APPLY <rail>,<volts>V,<amps>A`
    Apply(Rail, f64, f64),
    /// Command: `OUTPut <ON|OFF>`
    SupplyOutput(bool),
    /// Read the DC current through the multimeter on its 1 A range
    ///
    /// Query: `MEAS:CURR:DC? 1A,DEF`
    ReadDcCurrent,
    SetAnalyzerParam(AnalyzerParam),
    /// Read the power at marker 1
    ///
    /// Query: `:CALCulate:MARKer:Y?`
    ReadMarkerPower,
}

fn on_off(state: bool) -> &'static str
{
    if state { "ON" } else { "OFF" }
}

impl fmt::Display for ModParam
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Self::Arb(state) => write!(f, ":RAD:ARB {}", on_off(*state)),
            Self::Waveform(name) => write!(f, ":RAD:ARB:WAV \"{}\"", name),
            Self::BaseFreqOffset(offset) => write!(f, ":RAD:ARB:BASE:FREQ:OFFS {}Hz", offset.0),
            Self::Scale(percent) => write!(f, ":RAD:ARB:RSC {}", percent),
            Self::IqCommonOffset(volts) => write!(f, ":DM:IQAD:EXT:COFF {}V", volts),
            Self::IqAdjust(state) => write!(f, ":DM:IQAD {}", on_off(*state)),
            Self::DigitalModulation(state) => write!(f, ":DM:STAT {}", on_off(*state)),
            Self::IqAttenuation(db) => write!(f, ":DM:IQAD:EXT:IQAT {}db", db),
        }
    }
}

impl fmt::Display for AnalyzerParam
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Self::AutoCalibration(state) => write!(f, ":CAL:AUTO {}", on_off(*state)),
            Self::Span(span) => write!(f, ":SENS:FREQ:SPAN {}Hz", span.0),
            Self::ReferenceLevel(db) => write!(f, "DISP:WIND:TRAC:Y:RLEV {}", db),
            Self::ScalePerDivision(db) => write!(f, "DISP:WIND:TRAC:Y:PDIV {}", db),
            Self::MarkerPositionMode => write!(f, ":CALC:MARK1:MODE POS"),
            Self::AverageCount(count) => write!(f, "AVER:COUNT {}", count),
            Self::Average(state) => write!(f, "AVER {}", on_off(*state)),
            Self::Center(freq) => write!(f, ":SENSe:FREQuency:CENTer {}Hz", freq.0),
            Self::DisplayOffset(offset) => write!(f, "DISP:WIND:TRAC:X:OFFS {}Hz", offset.0),
            Self::MarkerX(freq) => write!(f, ":CALCulate:MARKer1:X {}Hz", freq.0),
        }
    }
}

impl fmt::Display for CmdSet
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Self::Reset => write!(f, "*RST"),
            Self::Identify => write!(f, "*IDN?"),
            Self::ModulationState(state) => write!(f, ":OUTP:MOD:STAT {}", on_off(*state)),
            Self::FreqMultiplier(mult) => write!(f, ":FREQ:MULT {}", mult),
            Self::Power(dbm) => write!(f, "SOUR:POW {}dbm", dbm),
            Self::Frequency(freq) => write!(f, "SOUR:FREQ {}Hz", freq.0),
            Self::Output(state) => write!(f, "OUTP:STAT {}", on_off(*state)),
            Self::SetModParam(param) => write!(f, "{}", param),
            Self::Apply(rail, volts, amps) => write!(
                f,
                "APPLY {},{}V,{}A",
                match rail {
                    Rail::Main => "p6v",
                    Rail::Aux => "p25v",
                },
                volts,
                amps
            ),
            Self::SupplyOutput(state) => write!(f, "OUTPut {}", on_off(*state)),
            Self::ReadDcCurrent => write!(f, "MEAS:CURR:DC? 1A,DEF"),
            Self::SetAnalyzerParam(param) => write!(f, "{}", param),
            Self::ReadMarkerPower => write!(f, ":CALCulate:MARKer:Y?"),
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::{ CmdSet, ModParam, AnalyzerParam, Rail };

    #[test]
    fn serialize_generator()
    {
        assert_eq!(&CmdSet::Reset.to_string(), "*RST");
        assert_eq!(&CmdSet::ModulationState(false).to_string(), ":OUTP:MOD:STAT OFF");
        assert_eq!(&CmdSet::FreqMultiplier(2).to_string(), ":FREQ:MULT 2");
        assert_eq!(&CmdSet::Power(-7.5).to_string(), "SOUR:POW -7.5dbm");
        assert_eq!(&CmdSet::Frequency(hz!(0.05, Giga)).to_string(), "SOUR:FREQ 50000000Hz");
        assert_eq!(&CmdSet::Output(true).to_string(), "OUTP:STAT ON");
    }

    #[test]
    fn serialize_modulator()
    {
        assert_eq!(&CmdSet::SetModParam(ModParam::Arb(false)).to_string(), ":RAD:ARB OFF");
        assert_eq!(
            &CmdSet::SetModParam(ModParam::Waveform("WFM1:SINE_TEST_WFM")).to_string(),
            ":RAD:ARB:WAV \"WFM1:SINE_TEST_WFM\""
        );
        assert_eq!(
            &CmdSet::SetModParam(ModParam::BaseFreqOffset(hz!(1.5, Mega))).to_string(),
            ":RAD:ARB:BASE:FREQ:OFFS 1500000Hz"
        );
        assert_eq!(&CmdSet::SetModParam(ModParam::Scale(30.0)).to_string(), ":RAD:ARB:RSC 30");
        assert_eq!(&CmdSet::SetModParam(ModParam::IqCommonOffset(0.25)).to_string(), ":DM:IQAD:EXT:COFF 0.25V");
        assert_eq!(&CmdSet::SetModParam(ModParam::IqAttenuation(0.0)).to_string(), ":DM:IQAD:EXT:IQAT 0db");
    }

    #[test]
    fn serialize_supply_and_meter()
    {
        assert_eq!(&CmdSet::Apply(Rail::Main, 5.0, 0.2).to_string(), "APPLY p6v,5V,0.2A");
        assert_eq!(&CmdSet::Apply(Rail::Aux, 3.3, 0.02).to_string(), "APPLY p25v,3.3V,0.02A");
        assert_eq!(&CmdSet::SupplyOutput(false).to_string(), "OUTPut OFF");
        assert_eq!(&CmdSet::ReadDcCurrent.to_string(), "MEAS:CURR:DC? 1A,DEF");
    }

    #[test]
    fn serialize_analyzer()
    {
        assert_eq!(&CmdSet::SetAnalyzerParam(AnalyzerParam::AutoCalibration(true)).to_string(), ":CAL:AUTO ON");
        assert_eq!(&CmdSet::SetAnalyzerParam(AnalyzerParam::Span(hz!(10.0, Mega))).to_string(), ":SENS:FREQ:SPAN 10000000Hz");
        assert_eq!(&CmdSet::SetAnalyzerParam(AnalyzerParam::ReferenceLevel(10.0)).to_string(), "DISP:WIND:TRAC:Y:RLEV 10");
        assert_eq!(&CmdSet::SetAnalyzerParam(AnalyzerParam::Average(true)).to_string(), "AVER ON");
        assert_eq!(&CmdSet::SetAnalyzerParam(AnalyzerParam::MarkerX(hz!(149_000_000.0))).to_string(), ":CALCulate:MARKer1:X 149000000Hz");
        assert_eq!(&CmdSet::ReadMarkerPower.to_string(), ":CALCulate:MARKer:Y?");
    }
}
