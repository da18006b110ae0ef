//! Millisecond countdown used for shields, fades, zoom and fire cooldowns

/// Countdown timer.
///
/// `current` counts down toward zero; `period` is the full length used by
/// [`Timer::fraction`]. Pure value type, no failure modes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timer {
    current: u32,
    period: u32,
}

impl Timer {
    pub const fn new(period_ms: u32) -> Self {
        Self {
            current: period_ms,
            period: period_ms,
        }
    }

    /// Restart at the full duration
    #[inline]
    pub fn reset(&mut self, duration_ms: u32) {
        self.current = duration_ms;
        self.period = duration_ms;
    }

    /// Restart with partial progress against a period.
    ///
    /// Used to re-trigger a fade mid-way so it picks up from where the
    /// previous one left off.
    #[inline]
    pub fn reset_with_period(&mut self, current_ms: u32, period_ms: u32) {
        self.current = current_ms.min(period_ms);
        self.period = period_ms;
    }

    /// Count down by `elapsed_ms`. Returns true only on the update that reaches zero.
    pub fn update(&mut self, elapsed_ms: u32) -> bool {
        if self.current == 0 {
            return false;
        }
        if elapsed_ms >= self.current {
            self.current = 0;
            true
        } else {
            self.current -= elapsed_ms;
            false
        }
    }

    #[inline]
    pub fn clear(&mut self) {
        self.current = 0;
    }

    #[inline]
    pub fn current(&self) -> u32 {
        self.current
    }

    #[inline]
    pub fn period(&self) -> u32 {
        self.period
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.current != 0
    }

    /// current / period, 0 when the period is 0
    pub fn fraction(&self) -> f32 {
        if self.period == 0 {
            0.0
        } else {
            self.current as f32 / self.period as f32
        }
    }
}
