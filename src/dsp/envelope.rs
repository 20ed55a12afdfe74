//! Breakpoint automation, modelled on WebAudio `AudioParam` scheduling.
//!
//! A timeline is a sorted list of events on the graph clock (seconds).
//! Between two events the value either holds (next event is a `Set`) or
//! interpolates toward the next event (linear or exponential ramp).

/// Near-zero target used in place of silence. Exponential ramps are
/// undefined at zero, so every decay to "off" lands here instead.
pub const GAIN_FLOOR: f64 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Kind {
    Set,
    Linear,
    Exponential,
}

#[derive(Debug, Clone, Copy)]
struct AutomationEvent {
    kind: Kind,
    time: f64,
    value: f64,
}

/// An automated parameter value.
#[derive(Debug, Clone)]
pub struct Automation {
    default_value: f64,
    events: Vec<AutomationEvent>,
}

impl Automation {
    pub fn new(default_value: f64) -> Self {
        Automation {
            default_value,
            events: Vec::new(),
        }
    }

    /// Build a timeline from `(offset, value)` breakpoints anchored at `start`.
    ///
    /// Adjacent breakpoints sharing a time are a jump; otherwise the value
    /// ramps linearly. With `exponential_tail`, the last segment is an
    /// exponential ramp toward `max(value, GAIN_FLOOR)`.
    pub fn from_breakpoints(points: &[(f64, f64)], start: f64, exponential_tail: bool) -> Self {
        let mut automation = Automation::new(points.first().map_or(0.0, |p| p.1));
        let Some(&(t0, v0)) = points.first() else {
            return automation;
        };
        automation.set_value_at(v0, start + t0);

        let mut prev = (t0, v0);
        for (i, &(t, v)) in points.iter().enumerate().skip(1) {
            let at = start + t;
            let is_last = i == points.len() - 1;
            if t <= prev.0 {
                automation.set_value_at(v, at);
            } else if is_last && exponential_tail && prev.1 > GAIN_FLOOR {
                automation.exponential_ramp_to(v, at);
            } else {
                automation.linear_ramp_to(v, at);
            }
            prev = (t, v);
        }
        automation
    }

    pub fn set_value_at(&mut self, value: f64, time: f64) {
        self.insert(AutomationEvent {
            kind: Kind::Set,
            time,
            value,
        });
    }

    pub fn linear_ramp_to(&mut self, value: f64, end_time: f64) {
        self.insert(AutomationEvent {
            kind: Kind::Linear,
            time: end_time,
            value,
        });
    }

    /// Exponential ramp ending at `end_time`. Targets at or below zero are
    /// raised to `GAIN_FLOOR`.
    pub fn exponential_ramp_to(&mut self, value: f64, end_time: f64) {
        self.insert(AutomationEvent {
            kind: Kind::Exponential,
            time: end_time,
            value: value.max(GAIN_FLOOR),
        });
    }

    /// Freeze the value the timeline has at `time` and drop everything
    /// scheduled from then on.
    pub fn hold_at(&mut self, time: f64) {
        let value = self.value_at(time);
        self.events.retain(|e| e.time < time);
        self.set_value_at(value, time);
    }

    pub fn value_at(&self, time: f64) -> f64 {
        let idx = self.events.partition_point(|e| e.time <= time);
        if idx == 0 {
            return self.default_value;
        }
        let prev = self.events[idx - 1];
        let Some(next) = self.events.get(idx) else {
            return prev.value;
        };

        let span = next.time - prev.time;
        let frac = ((time - prev.time) / span).clamp(0.0, 1.0);
        match next.kind {
            Kind::Set => prev.value,
            Kind::Linear => prev.value + (next.value - prev.value) * frac,
            Kind::Exponential => {
                if prev.value <= 0.0 {
                    prev.value
                } else {
                    prev.value * (next.value / prev.value).powf(frac)
                }
            }
        }
    }

    /// Insert keeping events sorted; equal times keep insertion order.
    fn insert(&mut self, event: AutomationEvent) {
        let idx = self.events.partition_point(|e| e.time <= event.time);
        self.events.insert(idx, event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_timeline_returns_default() {
        let a = Automation::new(0.25);
        assert_eq!(a.value_at(0.0), 0.25);
        assert_eq!(a.value_at(10.0), 0.25);
    }

    #[test]
    fn linear_ramp_midpoint() {
        let mut a = Automation::new(0.0);
        a.set_value_at(0.0, 1.0);
        a.linear_ramp_to(1.0, 2.0);
        assert!((a.value_at(1.5) - 0.5).abs() < 1e-12);
        assert_eq!(a.value_at(3.0), 1.0);
    }

    #[test]
    fn exponential_ramp_is_geometric_and_never_zero() {
        let mut a = Automation::new(1.0);
        a.set_value_at(1.0, 0.0);
        a.exponential_ramp_to(0.0, 1.0);
        let mid = a.value_at(0.5);
        assert!((mid - GAIN_FLOOR.sqrt()).abs() < 1e-9, "got {mid}");
        let end = a.value_at(1.0);
        assert!(end > 0.0);
        assert!((end - GAIN_FLOOR).abs() < 1e-12);
    }

    #[test]
    fn coincident_breakpoints_jump() {
        let points = [(0.0, 2000.0), (0.05, 4000.0), (0.05, 3000.0), (0.1, 3500.0)];
        let a = Automation::from_breakpoints(&points, 10.0, false);
        assert!((a.value_at(10.025) - 3000.0).abs() < 1e-6);
        assert_eq!(a.value_at(10.05), 3000.0);
        assert!((a.value_at(10.075) - 3250.0).abs() < 1e-6);
    }

    #[test]
    fn exponential_tail_decays_toward_floor() {
        let points = [(0.0, 0.0), (0.01, 0.1), (0.3, 0.001)];
        let a = Automation::from_breakpoints(&points, 0.0, true);
        assert!((a.value_at(0.005) - 0.05).abs() < 1e-9, "attack is linear");
        let v = a.value_at(0.155);
        let expected = 0.1 * (0.001_f64 / 0.1).powf(0.5);
        assert!((v - expected).abs() < 1e-9, "decay is exponential, got {v}");
    }

    #[test]
    fn tail_from_silence_falls_back_to_linear() {
        let points = [(0.0, 0.0), (0.2, 0.5)];
        let a = Automation::from_breakpoints(&points, 0.0, true);
        assert!((a.value_at(0.1) - 0.25).abs() < 1e-9);
    }

    #[test]
    fn hold_at_freezes_mid_ramp() {
        let mut a = Automation::new(0.0);
        a.set_value_at(0.0, 0.0);
        a.linear_ramp_to(1.0, 1.0);
        a.hold_at(0.5);
        a.exponential_ramp_to(0.0, 1.5);
        assert!((a.value_at(0.5) - 0.5).abs() < 1e-12);
        assert!((a.value_at(1.5) - GAIN_FLOOR).abs() < 1e-12);
        assert!(a.value_at(1.0) < 0.5);
    }
}
