//! Threshold edge detection on a trigger signal
//!
//! A rising edge is the first sample at or above the upper threshold after
//! the signal has been at or below the lower threshold; a falling edge is
//! the mirror image. Between the two rails the signal may wander freely
//! without producing edges (hysteresis).

use crate::config::EventConfig;
use std::fmt;

/// Role of a detected edge in the event record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Start,
    Stop,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Start => "Start",
            EventType::Stop => "Stop",
        }
    }

    /// `1` for Start, `0` for Stop
    pub fn value(&self) -> i64 {
        match self {
            EventType::Start => 1,
            EventType::Stop => 0,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One detected edge, pointing at a row of the analysed frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub row: usize,
    pub event_type: EventType,
}

/// Two-threshold edge detector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeDetector {
    lower_threshold: f64,
    upper_threshold: f64,
    exact_match: bool,
    rising_as_start: bool,
}

impl EdgeDetector {
    pub fn new(lower_threshold: f64, upper_threshold: f64) -> Self {
        Self {
            lower_threshold,
            upper_threshold,
            exact_match: false,
            rising_as_start: true,
        }
    }

    pub fn from_config(config: &EventConfig) -> Self {
        Self::new(config.lower_threshold, config.upper_threshold)
            .with_exact_match(config.exact_match)
            .with_rising_as_start(config.rising_as_start)
    }

    /// Builder method: compare with equality instead of <= / >=
    pub fn with_exact_match(mut self, exact: bool) -> Self {
        self.exact_match = exact;
        self
    }

    /// Builder method: choose whether rising edges start the event
    pub fn with_rising_as_start(mut self, rising_as_start: bool) -> Self {
        self.rising_as_start = rising_as_start;
        self
    }

    fn below_lower(&self, values: &[Option<f64>]) -> Vec<bool> {
        values
            .iter()
            .map(|v| match v {
                Some(v) if self.exact_match => *v == self.lower_threshold,
                Some(v) => *v <= self.lower_threshold,
                None => false,
            })
            .collect()
    }

    fn above_upper(&self, values: &[Option<f64>]) -> Vec<bool> {
        values
            .iter()
            .map(|v| match v {
                Some(v) if self.exact_match => *v == self.upper_threshold,
                Some(v) => *v >= self.upper_threshold,
                None => false,
            })
            .collect()
    }

    /// Rows of rising edges, in row order
    pub fn rising_edges(&self, values: &[Option<f64>]) -> Vec<usize> {
        armed_crossings(&self.above_upper(values), &self.below_lower(values))
    }

    /// Rows of falling edges, in row order
    pub fn falling_edges(&self, values: &[Option<f64>]) -> Vec<usize> {
        armed_crossings(&self.below_lower(values), &self.above_upper(values))
    }

    /// Start and Stop edges ordered by timestamp
    ///
    /// `t` and `values` are the rows of one frame. Starts precede Stops
    /// sharing a timestamp.
    pub fn detect(&self, t: &[i64], values: &[Option<f64>]) -> Vec<Edge> {
        let (start_rows, stop_rows) = if self.rising_as_start {
            (self.rising_edges(values), self.falling_edges(values))
        } else {
            (self.falling_edges(values), self.rising_edges(values))
        };

        let mut edges: Vec<Edge> = start_rows
            .into_iter()
            .map(|row| Edge {
                row,
                event_type: EventType::Start,
            })
            .chain(stop_rows.into_iter().map(|row| Edge {
                row,
                event_type: EventType::Stop,
            }))
            .collect();
        edges.sort_by_key(|edge| t[edge.row]);
        edges
    }
}

/// Rows where `hit` holds after `armed` has held at some earlier row
///
/// Only the first such row per run of equal `armed` values is kept, so the
/// signal has to return to the arming rail before the next crossing counts.
fn armed_crossings(hit: &[bool], armed: &[bool]) -> Vec<usize> {
    let mut rows = Vec::new();
    let mut was_armed = false;
    let mut run = 0usize;
    let mut last_run = None;

    for row in 0..hit.len() {
        if row > 0 && armed[row] != armed[row - 1] {
            run += 1;
        }
        if hit[row] && was_armed && last_run != Some(run) {
            rows.push(row);
            last_run = Some(run);
        }
        was_armed |= armed[row];
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(raw: &[f64]) -> Vec<Option<f64>> {
        raw.iter().map(|v| Some(*v)).collect()
    }

    fn times(n: usize) -> Vec<i64> {
        (0..n as i64).collect()
    }

    fn start(row: usize) -> Edge {
        Edge {
            row,
            event_type: EventType::Start,
        }
    }

    fn stop(row: usize) -> Edge {
        Edge {
            row,
            event_type: EventType::Stop,
        }
    }

    #[test]
    fn test_rising_then_falling() {
        let v = values(&[0.0, 0.0, 6.0, 6.0, 6.0, 2.0, 2.0, 0.0]);
        let edges = EdgeDetector::new(1.0, 5.0).detect(&times(v.len()), &v);
        assert_eq!(edges, vec![start(2), stop(7)]);
    }

    #[test]
    fn test_inverted_roles() {
        let v = values(&[0.0, 0.0, 6.0, 6.0, 6.0, 2.0, 2.0, 0.0]);
        let edges = EdgeDetector::new(1.0, 5.0)
            .with_rising_as_start(false)
            .detect(&times(v.len()), &v);
        assert_eq!(edges, vec![stop(2), start(7)]);
    }

    #[test]
    fn test_no_edge_without_prior_rail() {
        // starts high: no rising edge until the signal has been low
        let v = values(&[6.0, 6.0, 0.0, 6.0]);
        let detector = EdgeDetector::new(1.0, 5.0);
        assert_eq!(detector.rising_edges(&v), vec![3]);
        assert_eq!(detector.falling_edges(&v), vec![2]);
    }

    #[test]
    fn test_one_rising_edge_per_excursion() {
        // wandering between the rails does not re-arm the detector
        let v = values(&[0.0, 6.0, 3.0, 6.0, 0.0, 7.0]);
        let detector = EdgeDetector::new(1.0, 5.0);
        assert_eq!(detector.rising_edges(&v), vec![1, 5]);
    }

    #[test]
    fn test_rising_edges_never_share_an_upper_run() {
        let raw = [0.0, 9.0, 9.0, 0.0, 0.0, 9.0, 2.0, 9.0, 9.0, 0.0, 9.0];
        let v = values(&raw);
        let rising = EdgeDetector::new(1.0, 5.0).rising_edges(&v);
        let above: Vec<bool> = raw.iter().map(|x| *x >= 5.0).collect();
        for pair in rising.windows(2) {
            let gap_has_low = (pair[0]..pair[1]).any(|row| !above[row]);
            assert!(gap_has_low, "edges {:?} share an upper run", pair);
        }
        assert_eq!(rising, vec![1, 5, 10]);
    }

    #[test]
    fn test_exact_match() {
        let v = values(&[0.0, 5.0, -1.0, 5.0, 0.0, 6.0]);
        let detector = EdgeDetector::new(0.0, 5.0).with_exact_match(true);
        assert_eq!(detector.rising_edges(&v), vec![1]);
        assert_eq!(detector.falling_edges(&v), vec![4]);
    }

    #[test]
    fn test_inverted_thresholds_track_a_transition() {
        // gear 3 -> 1 starts, 1 -> 3 stops
        let v = values(&[3.0, 3.0, 1.0, 1.0, 3.0]);
        let edges = EdgeDetector::new(3.0, 1.0)
            .with_exact_match(true)
            .detect(&times(v.len()), &v);
        assert_eq!(edges, vec![start(2), stop(4)]);
    }

    #[test]
    fn test_nulls_never_classify() {
        let v = vec![Some(0.0), None, Some(6.0), None, Some(0.0)];
        let detector = EdgeDetector::new(1.0, 5.0);
        assert_eq!(detector.rising_edges(&v), vec![2]);
        assert_eq!(detector.falling_edges(&v), vec![4]);
    }

    #[test]
    fn test_starts_sort_before_stops_at_same_time() {
        let v = values(&[6.0, 0.0, 6.0]);
        let edges = EdgeDetector::new(1.0, 5.0).detect(&[0, 5, 5], &v);
        assert_eq!(edges, vec![start(2), stop(1)]);
    }

    #[test]
    fn test_event_type_values() {
        assert_eq!(EventType::Start.value(), 1);
        assert_eq!(EventType::Stop.value(), 0);
        assert_eq!(EventType::Stop.to_string(), "Stop");
    }
}
