//! Velocity acceptance window

use serde::{Deserialize, Serialize};

use crate::error::{HumanizeError, HumanizeResult};

/// Exclusive bounds `(min, max)` a sampled velocity must fall strictly inside
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VelocityWindow {
    pub min: u8,
    pub max: u8,
}

impl Default for VelocityWindow {
    fn default() -> Self {
        Self { min: 0, max: 127 }
    }
}

impl VelocityWindow {
    pub fn new(min: u8, max: u8) -> HumanizeResult<Self> {
        let window = Self { min, max };
        window.validate()?;
        Ok(window)
    }

    #[inline]
    pub fn accepts(&self, velocity: u8) -> bool {
        velocity > self.min && velocity < self.max
    }

    pub fn validate(&self) -> HumanizeResult<()> {
        if self.min >= self.max {
            return Err(HumanizeError::InvalidWindow {
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_are_exclusive() {
        let window = VelocityWindow::default();
        assert!(!window.accepts(0));
        assert!(window.accepts(1));
        assert!(window.accepts(126));
        assert!(!window.accepts(127));
    }

    #[test]
    fn test_inverted_window_rejected() {
        assert!(matches!(
            VelocityWindow::new(90, 40),
            Err(HumanizeError::InvalidWindow { min: 90, max: 40 })
        ));
        assert!(VelocityWindow::new(64, 64).is_err());
        assert!(VelocityWindow::new(63, 65).unwrap().accepts(64));
    }
}
