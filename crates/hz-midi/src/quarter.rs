//! Beat-quarter position of an absolute tick
//!
//! A fixed-width window of `ticks_per_quarter_note` ticks is stepped forward
//! until it contains the tick; the number of steps modulo 4 is the quarter
//! of a four-beat bar. Time-signature changes are not interpreted.

/// Number of quarters in the bar grouping
pub const QUARTERS_PER_BAR: u64 = 4;

/// Half-open window `[lower, upper)` stepped in multiples of its width
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuarterStepper {
    lower: u64,
    upper: u64,
    steps: u64,
}

impl QuarterStepper {
    /// Window `[0, width)` with zero steps taken.
    pub fn new(width: u64) -> Self {
        Self {
            lower: 0,
            upper: width,
            steps: 0,
        }
    }

    #[inline]
    pub fn width(&self) -> u64 {
        self.upper - self.lower
    }

    #[inline]
    pub fn lower_bound(&self) -> u64 {
        self.lower
    }

    #[inline]
    pub fn upper_bound(&self) -> u64 {
        self.upper
    }

    #[inline]
    pub fn step_count(&self) -> u64 {
        self.steps
    }

    /// Move both bounds forward by `n` widths.
    pub fn step_by(&mut self, n: u64) {
        let delta = self.width() * n;
        self.lower += delta;
        self.upper += delta;
        self.steps += n;
    }

    /// A tick on the upper boundary belongs to the next window.
    #[inline]
    pub fn contains(&self, tick: u64) -> bool {
        tick >= self.lower && tick < self.upper
    }

    /// Quarter index (0-3) of the current window
    #[inline]
    pub fn position(&self) -> u8 {
        (self.steps % QUARTERS_PER_BAR) as u8
    }

    /// Step forward until the window contains `tick` and return its position.
    ///
    /// Jumps straight to the containing window when `tick` lies past the
    /// upper bound. A tick behind the window restarts from the origin. A
    /// zero-width window never contains anything and reports position 0.
    pub fn advance_to(&mut self, tick: u64) -> u8 {
        let width = self.width();
        if width == 0 {
            return 0;
        }
        if tick < self.lower {
            *self = Self::new(width);
        }
        while !self.contains(tick) {
            if tick >= self.upper {
                self.step_by(((tick - self.lower) / width).max(1));
            } else {
                self.step_by(1);
            }
        }
        self.position()
    }
}

/// Quarter index (0-3) of `tick` for a file with the given division.
///
/// Timecode files carry no ticks-per-quarter value (0); they map to 0.
pub fn quarter_position(tick: u64, ticks_per_quarter_note: u16) -> u8 {
    QuarterStepper::new(ticks_per_quarter_note as u64).advance_to(tick)
}
