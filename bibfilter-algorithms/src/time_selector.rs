//! Arrival-time selection for tracker hits.

use crate::classifier::SPEED_OF_LIGHT_MM_PER_NS;
use bibfilter_core::{Event, EventFilter, EventSummary, Hit, HitCollection, Result};
use serde::{Deserialize, Serialize};

/// Open arrival-time window for barrel tracker hits.
///
/// The arrival time is `hit.time - r / c + offset`, with `r` the transverse
/// distance from the beam axis. A hit passes when `min < t < max`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArrivalWindow {
    /// Lower edge, exclusive (ns).
    pub min: f64,
    /// Upper edge, exclusive (ns).
    pub max: f64,
    /// Digitizer time offset added to the arrival time (ns).
    pub offset: f64,
}

impl Default for ArrivalWindow {
    /// Vertex-detector window around the bunch crossing.
    fn default() -> Self {
        Self {
            min: -0.15,
            max: 0.15,
            offset: 0.2167,
        }
    }
}

impl ArrivalWindow {
    /// Flight time over the transverse radius (ns).
    #[inline]
    #[must_use]
    pub fn flight_time(hit: &Hit) -> f64 {
        hit.position.perp() / SPEED_OF_LIGHT_MM_PER_NS
    }

    /// Arrival time of `hit` (ns).
    #[inline]
    #[must_use]
    pub fn arrival_time(&self, hit: &Hit) -> f64 {
        hit.time - Self::flight_time(hit) + self.offset
    }

    /// Returns true if the hit arrives strictly inside the window.
    #[inline]
    #[must_use]
    pub fn contains(&self, hit: &Hit) -> bool {
        let t = self.arrival_time(hit);
        self.min < t && t < self.max
    }
}

/// Event filter keeping tracker hits whose flight-corrected time falls in
/// an [`ArrivalWindow`].
pub struct TimeSelector {
    window: ArrivalWindow,
    input: String,
    output: String,
}

impl TimeSelector {
    /// Default input collection.
    pub const DEFAULT_INPUT: &'static str = "VertexBarrelCollection";
    /// Default output collection.
    pub const DEFAULT_OUTPUT: &'static str = "VertexBarrelGoodCollection";

    /// Creates the filter.
    #[must_use]
    pub fn new(
        window: ArrivalWindow,
        input: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            window,
            input: input.into(),
            output: output.into(),
        }
    }

    /// The gate in use.
    #[must_use]
    pub fn window(&self) -> &ArrivalWindow {
        &self.window
    }
}

impl EventFilter for TimeSelector {
    fn name(&self) -> &'static str {
        "time-window"
    }

    fn process_event(&mut self, event: &mut Event) -> Result<EventSummary> {
        let collection = event.hit_collection(&self.input)?;
        let mut good = HitCollection::like(collection, collection.len());

        for hit in &collection.hits {
            let t = self.window.arrival_time(hit);
            if self.window.contains(hit) {
                log::debug!("accepted hit at t_arr {t:.4}");
                good.push(*hit);
            }
        }

        let summary = EventSummary::new(collection.len(), good.len());
        event.add_hits(self.output.clone(), good);
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bibfilter_core::{Error, Position};

    #[test]
    fn test_selects_prompt_hits() {
        let r = 60.0;
        let tof = r / SPEED_OF_LIGHT_MM_PER_NS;
        let mut hits = HitCollection::new("layer:8");
        hits.push(Hit::new(0, Position::new(r, 0.0, 0.0), 1e-5, tof - 0.2167));
        hits.push(Hit::new(1, Position::new(r, 0.0, 0.0), 1e-5, tof + 1.0));
        hits.push(Hit::new(2, Position::new(0.0, r, 0.0), 1e-5, tof - 0.3));

        let mut event = Event::new(0, 0);
        event.add_hits("in", hits);

        let mut selector = TimeSelector::new(ArrivalWindow::default(), "in", "out");
        let summary = selector.process_event(&mut event).unwrap();
        assert_eq!(summary, EventSummary::new(3, 2));

        let out = event.hit_collection("out").unwrap();
        assert_eq!(out.hits[0].cell_id, 0);
        assert_eq!(out.hits[1].cell_id, 2);
        assert_eq!(out.encoding, "layer:8");
    }

    #[test]
    fn test_missing_collection() {
        let mut selector = TimeSelector::new(ArrivalWindow::default(), "in", "out");
        let mut event = Event::new(0, 0);
        assert_eq!(
            selector.process_event(&mut event),
            Err(Error::MissingCollection("in".into()))
        );
        assert!(event.hits.is_empty());
    }

    #[test]
    fn test_forward_hit_uses_transverse_radius() {
        let mut hits = HitCollection::new("layer:8");
        let mut forward = Hit::new(0, Position::new(30.0, 0.0, 100.0), 1e-5, 0.0);
        forward.time = 30.0 / SPEED_OF_LIGHT_MM_PER_NS - 0.2167;
        hits.push(forward);

        let mut event = Event::new(0, 0);
        event.add_hits("in", hits);

        let window = ArrivalWindow::default();
        assert!(window.arrival_time(&forward).abs() < 1e-12);
        let mut selector = TimeSelector::new(window, "in", "out");
        assert_eq!(
            selector.process_event(&mut event).unwrap(),
            EventSummary::new(1, 1)
        );
    }

    #[test]
    fn test_window_edges_are_open() {
        let window = ArrivalWindow {
            min: -0.15,
            max: 0.15,
            offset: 0.0,
        };
        let at_min = Hit::new(0, Position::default(), 1e-5, -0.15);
        let at_max = Hit::new(0, Position::default(), 1e-5, 0.15);
        let inside = Hit::new(0, Position::default(), 1e-5, -0.149);
        assert!(!window.contains(&at_min));
        assert!(!window.contains(&at_max));
        assert!(window.contains(&inside));
    }
}
