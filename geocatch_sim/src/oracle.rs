//! Ground truth oracle for simulation.
//!
//! The Oracle knows where the simulated user really is:
//! - True position (East/North meters around an origin) and facing
//! - Walking kinematics along a list of waypoints
//! - Sensor reading generation (GPS and compass, with noise)

use geocatch_core::geodesy::wrap_degrees;
use geocatch_core::GeoPoint;
use geocatch_env::{LocationSample, OrientationSample};
use nalgebra::Vector2;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// How the simulated device reports its heading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompassConvention {
    /// Vendor compass heading, clockwise from north
    Webkit,

    /// `alpha` rotation, heading = 360 - alpha
    Alpha,
}

/// The Oracle - walks the user and generates sensor readings.
pub struct Oracle {
    /// Origin of the local East/North frame
    origin: GeoPoint,

    /// RNG for sensor noise
    rng: ChaCha8Rng,

    /// True offset from the origin [east, north] in meters
    position: Vector2<f64>,

    /// Remaining waypoints [east, north]
    waypoints: VecDeque<Vector2<f64>>,

    /// Walking speed (m/s)
    speed_mps: f64,

    /// True facing, clockwise from north
    facing_deg: f64,

    /// Scheduled facing changes (time, degrees), sorted by time
    facing_schedule: VecDeque<(f64, f64)>,

    /// Scheduled spurious fixes (time, reported position), sorted by time
    outliers: VecDeque<(f64, GeoPoint)>,

    /// Current simulation time (seconds)
    current_time: f64,

    /// GPS noise standard deviation per axis (meters)
    gps_noise_std: f64,

    /// Compass noise standard deviation (degrees)
    compass_noise_std: f64,

    /// Probability that a GPS poll yields nothing
    gps_miss_rate: f64,

    convention: CompassConvention,
}

impl Oracle {
    /// Creates an Oracle standing at `origin`, facing north.
    pub fn new(origin: GeoPoint, rng: ChaCha8Rng) -> Self {
        Self {
            origin,
            rng,
            position: Vector2::zeros(),
            waypoints: VecDeque::new(),
            speed_mps: 1.4,
            facing_deg: 0.0,
            facing_schedule: VecDeque::new(),
            outliers: VecDeque::new(),
            current_time: 0.0,
            gps_noise_std: 0.0,
            compass_noise_std: 0.0,
            gps_miss_rate: 0.0,
            convention: CompassConvention::Webkit,
        }
    }

    /// Sets the GPS noise standard deviation (meters per axis).
    pub fn set_gps_noise(&mut self, std_dev: f64) {
        self.gps_noise_std = std_dev.abs();
    }

    /// Sets the compass noise standard deviation (degrees).
    pub fn set_compass_noise(&mut self, std_dev: f64) {
        self.compass_noise_std = std_dev.abs();
    }

    /// Sets the fraction of GPS polls that produce no reading.
    pub fn set_gps_miss_rate(&mut self, rate: f64) {
        self.gps_miss_rate = rate.clamp(0.0, 1.0);
    }

    pub fn set_speed(&mut self, speed_mps: f64) {
        self.speed_mps = speed_mps.max(0.0);
    }

    pub fn set_convention(&mut self, convention: CompassConvention) {
        self.convention = convention;
    }

    /// Turns the user to face `deg` right now.
    pub fn set_facing(&mut self, deg: f64) {
        self.facing_deg = wrap_degrees(deg);
    }

    /// Turns the user to face `deg` at simulation time `at_secs`.
    pub fn schedule_facing(&mut self, at_secs: f64, deg: f64) {
        self.facing_schedule.push_back((at_secs, wrap_degrees(deg)));
        self.facing_schedule
            .make_contiguous()
            .sort_by(|a, b| a.0.total_cmp(&b.0));
    }

    /// Makes the first GPS reading at or after `at_secs` report `reported`
    /// instead of the true position.
    pub fn inject_outlier(&mut self, at_secs: f64, reported: GeoPoint) {
        self.outliers.push_back((at_secs, reported));
        self.outliers
            .make_contiguous()
            .sort_by(|a, b| a.0.total_cmp(&b.0));
    }

    /// Teleports the user to an offset from the origin.
    pub fn place_at(&mut self, east: f64, north: f64) {
        self.position = Vector2::new(east, north);
    }

    /// Appends a waypoint [east, north] in meters from the origin.
    pub fn push_waypoint(&mut self, east: f64, north: f64) {
        self.waypoints.push_back(Vector2::new(east, north));
    }

    /// Seconds needed to walk the remaining waypoints.
    pub fn remaining_walk_secs(&self) -> f64 {
        if self.speed_mps <= 0.0 {
            return 0.0;
        }
        let mut from = self.position;
        let mut total = 0.0;
        for wp in &self.waypoints {
            total += (wp - from).norm();
            from = *wp;
        }
        total / self.speed_mps
    }

    /// True once every waypoint has been reached.
    pub fn is_idle(&self) -> bool {
        self.waypoints.is_empty()
    }

    /// Advances the walk by dt seconds.
    pub fn step(&mut self, dt: f64) {
        self.current_time += dt;

        while let Some(&(at, deg)) = self.facing_schedule.front() {
            if at > self.current_time {
                break;
            }
            self.facing_deg = deg;
            self.facing_schedule.pop_front();
        }

        let mut budget = self.speed_mps * dt;
        while budget > 0.0 {
            let Some(target) = self.waypoints.front().copied() else {
                break;
            };
            let to_target = target - self.position;
            let remaining = to_target.norm();

            if remaining > 0.0 {
                // Face the direction of travel
                self.facing_deg = wrap_degrees(to_target.x.atan2(to_target.y).to_degrees());
            }

            if remaining <= budget {
                self.position = target;
                budget -= remaining;
                self.waypoints.pop_front();
            } else {
                self.position += to_target * (budget / remaining);
                budget = 0.0;
            }
        }
    }

    /// Returns the current simulation time.
    pub fn time(&self) -> f64 {
        self.current_time
    }

    /// True offset from the origin [east, north].
    pub fn offset(&self) -> Vector2<f64> {
        self.position
    }

    /// True facing, clockwise from north.
    pub fn facing(&self) -> f64 {
        self.facing_deg
    }

    /// True position of the user.
    pub fn true_position(&self) -> GeoPoint {
        self.origin
            .offset_by(self.position.x, self.position.y)
            .unwrap_or(self.origin)
    }

    fn noise(&mut self, std_dev: f64) -> f64 {
        if std_dev <= 0.0 {
            return 0.0;
        }
        match Normal::new(0.0, std_dev) {
            Ok(normal) => normal.sample(&mut self.rng),
            Err(_) => 0.0,
        }
    }

    /// Generates a GPS reading.
    ///
    /// # Returns
    /// `None` for a missed poll, otherwise the true position plus Gaussian
    /// noise, or a pending outlier whose time has come.
    pub fn gps_sample(&mut self, timestamp_ms: u64) -> Option<LocationSample> {
        if self.gps_miss_rate > 0.0 && self.rng.gen_bool(self.gps_miss_rate) {
            return None;
        }

        let accuracy = (self.gps_noise_std * 2.0).max(1.0);

        if let Some(&(at, reported)) = self.outliers.front() {
            if at <= self.current_time {
                self.outliers.pop_front();
                return Some(LocationSample::new(
                    reported.lat(),
                    reported.lon(),
                    accuracy,
                    timestamp_ms,
                ));
            }
        }

        let east = self.position.x + self.noise(self.gps_noise_std);
        let north = self.position.y + self.noise(self.gps_noise_std);
        let observed = self.origin.offset_by(east, north).unwrap_or(self.origin);

        Some(LocationSample::new(
            observed.lat(),
            observed.lon(),
            accuracy,
            timestamp_ms,
        ))
    }

    /// Generates a compass reading in the configured convention.
    pub fn compass_sample(&mut self, timestamp_ms: u64) -> OrientationSample {
        let noise = self.noise(self.compass_noise_std);
        let heading = wrap_degrees(self.facing_deg + noise);
        match self.convention {
            CompassConvention::Webkit => OrientationSample::from_compass(heading, timestamp_ms),
            CompassConvention::Alpha => {
                OrientationSample::from_alpha(wrap_degrees(360.0 - heading), timestamp_ms)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geocatch_core::distance_meters;
    use geocatch_core::HeadingFilter;
    use proptest::prelude::*;
    use rand::SeedableRng;

    fn origin() -> GeoPoint {
        GeoPoint::new(10.767406, 78.813385).unwrap()
    }

    fn oracle(seed: u64) -> Oracle {
        Oracle::new(origin(), ChaCha8Rng::seed_from_u64(seed))
    }

    #[test]
    fn test_walks_to_waypoint_and_stops() {
        let mut o = oracle(1);
        o.set_speed(2.0);
        o.push_waypoint(0.0, 10.0);
        assert!((o.remaining_walk_secs() - 5.0).abs() < 1e-9);

        o.step(2.5);
        assert!((o.offset().y - 5.0).abs() < 1e-9);
        assert_eq!(o.facing(), 0.0);

        o.step(10.0);
        assert!(o.is_idle());
        assert_eq!(o.offset(), Vector2::new(0.0, 10.0));
    }

    #[test]
    fn test_faces_direction_of_travel() {
        let mut o = oracle(1);
        o.push_waypoint(10.0, 0.0);
        o.step(1.0);
        assert!((o.facing() - 90.0).abs() < 1e-9);

        o.push_waypoint(10.0, -10.0);
        o.step(20.0);
        assert!((o.facing() - 180.0).abs() < 1e-9);
    }

    #[test]
    fn test_noise_free_gps_matches_truth() {
        let mut o = oracle(1);
        o.place_at(3.0, -4.0);
        let sample = o.gps_sample(0).unwrap();
        let reported = GeoPoint::new(sample.lat, sample.lon).unwrap();
        assert!(distance_meters(reported, o.true_position()) < 1e-6);
        assert!((distance_meters(reported, origin()) - 5.0).abs() < 0.01);
    }

    #[test]
    fn test_outlier_replaces_one_reading() {
        let mut o = oracle(1);
        let spurious = origin().offset_by(0.0, 40.0).unwrap();
        o.inject_outlier(5.0, spurious);

        let before = o.gps_sample(0).unwrap();
        assert!(distance_meters(GeoPoint::new(before.lat, before.lon).unwrap(), origin()) < 1e-6);

        o.step(6.0);
        let outlier = o.gps_sample(0).unwrap();
        assert_eq!((outlier.lat, outlier.lon), (spurious.lat(), spurious.lon()));

        let after = o.gps_sample(0).unwrap();
        assert!(distance_meters(GeoPoint::new(after.lat, after.lon).unwrap(), origin()) < 1e-6);
    }

    #[test]
    fn test_compass_conventions_agree_after_normalize() {
        let mut o = oracle(1);
        o.set_facing(30.0);
        let webkit = o.compass_sample(0);
        o.set_convention(CompassConvention::Alpha);
        let alpha = o.compass_sample(0);

        assert_eq!(webkit.webkit_compass_heading, Some(30.0));
        assert_eq!(alpha.alpha, Some(330.0));
        assert_eq!(
            HeadingFilter::normalize(alpha.alpha, alpha.webkit_compass_heading),
            Some(30.0)
        );
    }

    #[test]
    fn test_scheduled_facing() {
        let mut o = oracle(1);
        o.set_facing(355.0);
        o.schedule_facing(5.0, 5.0);
        o.step(4.9);
        assert_eq!(o.facing(), 355.0);
        o.step(0.2);
        assert_eq!(o.facing(), 5.0);
    }

    #[test]
    fn test_miss_rate_one_never_reports() {
        let mut o = oracle(1);
        o.set_gps_miss_rate(1.0);
        assert!(o.gps_sample(0).is_none());
    }

    proptest! {
        #[test]
        fn prop_same_seed_same_readings(seed in any::<u64>(), std in 0.1f64..5.0) {
            let mut a = oracle(seed);
            let mut b = oracle(seed);
            a.set_gps_noise(std);
            b.set_gps_noise(std);
            for _ in 0..5 {
                prop_assert_eq!(a.gps_sample(0), b.gps_sample(0));
            }
        }
    }
}
