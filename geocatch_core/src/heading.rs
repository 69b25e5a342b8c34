//! Heading filter - turns noisy compass samples into a stable rotation
//!
//! Device compasses jitter and wrap between 359° and 0°. The filter treats
//! heading as a circular quantity: every update moves the current estimate a
//! fraction of the *shortest* angular distance towards the new sample, so a
//! reading crossing north travels 10°, not 350°.
//!
//! Cadence: one smoothing step per orientation sample (discrete-sample
//! smoothing, default factor 0.1). The filter is not ticked per animation
//! frame.

use geocatch_env::OrientationSample;

use crate::config::HeadingConfig;
use crate::geodesy::{shortest_delta_degrees, wrap_degrees};

/// Exponential smoothing over circular compass headings.
#[derive(Debug, Clone)]
pub struct HeadingFilter {
    /// Smoothed heading in [0, 360); `None` until the first valid sample
    current: Option<f64>,

    /// Fraction of the angular delta applied per sample (0, 1]
    factor: f64,

    /// Deltas below this snap straight to the raw value (degrees)
    dead_band: f64,

    /// Number of samples accepted
    samples: u64,
}

impl HeadingFilter {
    /// Create a new filter
    ///
    /// # Arguments
    /// * `config` - Smoothing factor and dead band
    pub fn new(config: &HeadingConfig) -> Self {
        Self {
            current: None,
            factor: config.smoothing_factor,
            dead_band: config.dead_band_deg,
            samples: 0,
        }
    }

    /// The single sanitization point for platform orientation readings.
    ///
    /// A vendor compass heading is already clockwise from north and wins when
    /// present; otherwise `alpha` (counter-clockwise) is converted with
    /// `360 - alpha`. Non-finite readings are treated as absent.
    ///
    /// # Returns
    /// Heading in [0, 360), or `None` when neither reading is usable.
    pub fn normalize(raw_alpha: Option<f64>, raw_webkit_compass: Option<f64>) -> Option<f64> {
        if let Some(compass) = raw_webkit_compass.filter(|v| v.is_finite()) {
            return Some(wrap_degrees(compass));
        }
        raw_alpha
            .filter(|v| v.is_finite())
            .map(|alpha| wrap_degrees(360.0 - alpha))
    }

    /// Normalizes a platform sample and feeds it to the filter.
    ///
    /// # Returns
    /// The updated heading, or `None` if the sample carried no usable reading
    /// (the state is left untouched in that case).
    pub fn update_from_sample(&mut self, sample: &OrientationSample) -> Option<f64> {
        let raw = Self::normalize(sample.alpha, sample.webkit_compass_heading)?;
        self.update(raw)
    }

    /// Applies one raw heading (any real number, degrees).
    ///
    /// The first sample initializes the estimate directly so the needle does
    /// not sweep in from 0° on startup. Non-finite input is ignored.
    ///
    /// # Returns
    /// The smoothed heading, which is `None` only while no finite sample has
    /// been seen.
    pub fn update(&mut self, raw: f64) -> Option<f64> {
        if !raw.is_finite() {
            return self.current;
        }
        let raw = wrap_degrees(raw);
        self.samples += 1;

        let next = match self.current {
            None => raw,
            Some(current) => {
                let delta = shortest_delta_degrees(current, raw);
                if delta.abs() < self.dead_band {
                    raw
                } else {
                    wrap_degrees(current + delta * self.factor)
                }
            }
        };

        self.current = Some(next);
        self.current
    }

    /// Current smoothed heading in [0, 360), `None` before the first sample.
    pub fn heading(&self) -> Option<f64> {
        self.current
    }

    /// Number of samples accepted since creation or the last reset.
    pub fn sample_count(&self) -> u64 {
        self.samples
    }

    /// Forgets the current estimate.
    pub fn reset(&mut self) {
        self.current = None;
        self.samples = 0;
    }
}

impl Default for HeadingFilter {
    fn default() -> Self {
        Self::new(&HeadingConfig::default())
    }
}
