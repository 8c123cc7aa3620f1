//! Sweep axes and the power × frequency grid shared by measurement and calibration

use crate::{
    error::{ Error, Result },
    units::SetPoint,
};

/// Upper bound on the number of points one axis may produce
const MAX_AXIS_POINTS: usize = 100_000;

/// Fraction of a step added to `stop` before truncating, enough to absorb floating-point drift
const DRIFT_SLACK: f64 = 1e-6;

/// An inclusive, evenly stepped range of set-points
///
/// Values are `start, start + step, start + 2 * step, ...` up to and including `stop`. The upper bound
/// is widened by a millionth of a step before the point count is truncated, so a `stop` which
/// floating-point stepping lands a hair past is still included but no value beyond it ever is. Every
/// value is rounded to thousandths.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepAxis
{
    start: f64,
    stop: f64,
    step: f64,
    collapse_single: bool,
}

impl SweepAxis
{
    /// An axis which collapses to the single value `start` when `start == stop`, whatever `step` is
    pub fn new(start: f64, stop: f64, step: f64) -> Self
    {
        Self {
            start: start,
            stop: stop,
            step: step,
            collapse_single: true,
        }
    }

    /// An axis which always steps through its bounds
    ///
    /// Unlike [`SweepAxis::new`], `step` must be positive even when `start == stop`.
    pub fn spanning(start: f64, stop: f64, step: f64) -> Self
    {
        Self {
            collapse_single: false,
            ..Self::new(start, stop, step)
        }
    }

    pub fn start(&self) -> f64
    {
        self.start
    }

    fn is_single(&self) -> bool
    {
        self.collapse_single && self.start == self.stop
    }

    pub fn validate(&self) -> Result<()>
    {
        if !(self.start.is_finite() && self.stop.is_finite() && self.step.is_finite()) {
            return Err(Error::InvalidParams(format!("non-finite axis {:?}", self)));
        }
        if self.is_single() {
            return Ok(());
        }
        if self.stop < self.start {
            return Err(Error::InvalidParams(format!("axis stop {} is below start {}", self.stop, self.start)));
        }
        if self.step <= 0.0 {
            return Err(Error::InvalidParams(format!("axis step {} must be positive", self.step)));
        }
        if (self.stop - self.start) / self.step >= MAX_AXIS_POINTS as f64 {
            return Err(Error::InvalidParams(format!(
                "axis {}..{} step {} exceeds {} points",
                self.start, self.stop, self.step, MAX_AXIS_POINTS
            )));
        }

        Ok(())
    }

    pub fn values(&self) -> Result<Vec<SetPoint>>
    {
        self.validate()?;

        if self.is_single() {
            return Ok(vec![SetPoint::from_f64(self.start)]);
        }

        let count = ((self.stop - self.start) / self.step + DRIFT_SLACK).floor() as usize + 1;
        let mut values: Vec<SetPoint> = (0..count)
            .map(|index| SetPoint::from_f64(self.start + index as f64 * self.step))
            .collect();
        values.dedup();

        Ok(values)
    }
}

/// The ordered cross-product of LO power and LO frequency set-points
///
/// Power is the outer axis, frequency the inner one.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepGrid
{
    pub powers: Vec<SetPoint>,
    pub freqs: Vec<SetPoint>,
}

impl SweepGrid
{
    pub fn with(power_axis: &SweepAxis, freq_axis: &SweepAxis) -> Result<Self>
    {
        Ok(Self {
            powers: power_axis.values()?,
            freqs: freq_axis.values()?,
        })
    }

    pub fn len(&self) -> usize
    {
        self.powers.len() * self.freqs.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.len() == 0
    }

    /// Every `(power, frequency)` pair in sweep order
    pub fn points(&self) -> impl Iterator<Item = (SetPoint, SetPoint)> + '_
    {
        self.powers
            .iter()
            .flat_map(move |power| self.freqs.iter().map(move |freq| (*power, *freq)))
    }
}

#[cfg(test)]
mod tests
{
    use super::{ SweepAxis, SweepGrid };
    use crate::units::SetPoint;
    use proptest::prelude::*;

    fn as_f64(values: &[SetPoint]) -> Vec<f64>
    {
        values.iter().map(|value| value.as_f64()).collect()
    }

    #[test]
    fn inclusive_upper_bound()
    {
        let values = SweepAxis::new(-10.0, 0.0, 5.0).values().unwrap();
        assert_eq!(as_f64(&values), vec![-10.0, -5.0, 0.0]);
    }

    #[test]
    fn drift_is_rounded_away()
    {
        let values = SweepAxis::new(0.05, 0.35, 0.1).values().unwrap();
        assert_eq!(as_f64(&values), vec![0.05, 0.15, 0.25, 0.35]);
    }

    #[test]
    fn stop_between_steps_is_not_reached()
    {
        let values = SweepAxis::new(0.0, 9.0, 2.0).values().unwrap();
        assert_eq!(as_f64(&values), vec![0.0, 2.0, 4.0, 6.0, 8.0]);
    }

    #[test]
    fn fine_step_never_passes_stop()
    {
        let values = SweepAxis::new(0.0, 0.01, 0.001).values().unwrap();
        assert_eq!(values.len(), 11);
        assert_eq!(values[10], SetPoint::from_f64(0.01));

        let values = SweepAxis::spanning(1e9, 1e9 + 200.0, 50.0).values().unwrap();
        assert_eq!(as_f64(&values), vec![1e9, 1e9 + 50.0, 1e9 + 100.0, 1e9 + 150.0, 1e9 + 200.0]);
    }

    #[test]
    fn equal_bounds_collapse_regardless_of_step()
    {
        assert_eq!(as_f64(&SweepAxis::new(3.0, 3.0, 0.0).values().unwrap()), vec![3.0]);
        assert_eq!(as_f64(&SweepAxis::new(3.0, 3.0, -1.0).values().unwrap()), vec![3.0]);
    }

    #[test]
    fn spanning_axis_still_needs_a_step()
    {
        assert!(SweepAxis::spanning(3.0, 3.0, 0.0).values().is_err());
        assert_eq!(as_f64(&SweepAxis::spanning(3.0, 3.0, 1.0).values().unwrap()), vec![3.0]);
    }

    #[test]
    fn reversed_bounds_are_rejected()
    {
        assert!(SweepAxis::new(1.0, 0.0, 0.5).values().is_err());
    }

    #[test]
    fn grid_is_power_major()
    {
        let grid = SweepGrid::with(
            &SweepAxis::new(-10.0, -5.0, 5.0),
            &SweepAxis::spanning(1.0, 2.0, 1.0),
        ).unwrap();

        let points: Vec<(f64, f64)> = grid.points().map(|(p, f)| (p.as_f64(), f.as_f64())).collect();
        assert_eq!(points, vec![(-10.0, 1.0), (-10.0, 2.0), (-5.0, 1.0), (-5.0, 2.0)]);
        assert_eq!(grid.len(), 4);
    }

    proptest! {
        #[test]
        fn axis_length_and_bounds(
            start_centi in -5000i64..5000,
            step_milli in 1i64..10_000,
            steps in 0usize..60,
            remainder in 0.0f64..0.9,
        ) {
            let start = start_centi as f64 / 100.0;
            let step = step_milli as f64 / 1000.0;
            let stop = start + (steps as f64 + remainder) * step;

            let values = SweepAxis::new(start, stop, step).values().unwrap();

            // floor((stop - start) / step) + 1, without the drift of recomputing it
            prop_assert_eq!(values.len(), steps + 1);
            prop_assert_eq!(values[0], SetPoint::from_f64(start));
            prop_assert!(values.windows(2).all(|pair| pair[0] <= pair[1]));
            let last = values[values.len() - 1].as_f64();
            prop_assert!(last <= stop + 0.001);
            prop_assert!(last + step > stop);
        }

        #[test]
        fn equal_bounds_yield_one_value(start in -100.0f64..100.0, step in -10.0f64..10.0)
        {
            let values = SweepAxis::new(start, start, step).values().unwrap();
            prop_assert_eq!(values, vec![SetPoint::from_f64(start)]);
        }
    }
}
