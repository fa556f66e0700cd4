//! Temporal multi-target tracking.
//!
//! Maintains persistent identity-stamped 3D trajectories over the
//! per-frame point sets coming out of reconstruction. Each target owns
//! an independent constant-velocity Kalman filter; association between
//! predictions and incoming points is an optimal bipartite assignment
//! with a distance gate. Targets are born from unassociated points and
//! retired when their covariance or missed-observation count exceeds
//! the configured ceilings. Retirement is an expected lifecycle event,
//! not an error.

use nalgebra::{Matrix3, Matrix3x6, Matrix6, Point3, Vector3, Vector6};
use ndarray::Array2;
use shared::algo::min_cost_assignment;
use shared::output::TrackedRow;
use std::collections::BTreeMap;
use std::io::Write;
use thiserror::Error;

/// Errors from the tracker's output stream.
#[derive(Debug, Error)]
pub enum TrackError {
    #[error("failed to write tracked output: {0}")]
    Output(#[from] csv::Error),
}

/// Tracker tuning. Defaults keep every ceiling unbounded, matching the
/// most permissive configuration.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Kalman timestep between consecutive frames (seconds)
    pub dt: f64,
    /// Distance gate: an association costing more than this is
    /// rejected and the point spawns a new target instead.
    pub max_distance: f64,
    /// Missed-observation ceiling; exceeding it retires the target.
    pub max_missed: u64,
    /// Ceiling on any diagonal covariance term; exceeding it retires
    /// the target.
    pub max_covariance: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            dt: 0.01,
            max_distance: f64::INFINITY,
            max_missed: u64::MAX,
            max_covariance: f64::INFINITY,
        }
    }
}

/// Constant-velocity motion model shared by every target.
///
/// State layout is position/velocity interleaved per axis:
/// `[x, vx, y, vy, z, vz]`; observations are positions.
#[derive(Debug, Clone)]
pub struct MotionModel {
    transition: Matrix6<f64>,
    process_noise: Matrix6<f64>,
    observation: Matrix3x6<f64>,
    measurement_noise: Matrix3<f64>,
}

impl MotionModel {
    /// Build the model for a fixed timestep.
    pub fn constant_velocity(dt: f64) -> Self {
        #[rustfmt::skip]
        let transition = Matrix6::new(
            1.0, dt,  0.0, 0.0, 0.0, 0.0,
            0.0, 1.0, 0.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 1.0, dt,  0.0, 0.0,
            0.0, 0.0, 0.0, 1.0, 0.0, 0.0,
            0.0, 0.0, 0.0, 0.0, 1.0, dt,
            0.0, 0.0, 0.0, 0.0, 0.0, 1.0,
        );

        #[rustfmt::skip]
        let observation = Matrix3x6::new(
            1.0, 0.0, 0.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 1.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 0.0, 0.0, 1.0, 0.0,
        );

        // Fixed noise terms: 2 cm measurement noise, 1 mm / 50 cm/s
        // process noise per axis.
        let q_pos = 1.0f64.powi(2);
        let q_vel = 50.0f64.powi(2);
        let process_noise = Matrix6::from_diagonal(&Vector6::new(
            q_pos, q_vel, q_pos, q_vel, q_pos, q_vel,
        ));
        let measurement_noise = Matrix3::identity() * 2.0f64.powi(2);

        Self {
            transition,
            process_noise,
            observation,
            measurement_noise,
        }
    }
}

/// One tracked target: an independent Kalman filter plus lifecycle
/// bookkeeping.
#[derive(Debug, Clone)]
pub struct Target {
    id: u64,
    state: Vector6<f64>,
    covariance: Matrix6<f64>,
    frames_without_observation: u64,
    age: u64,
    alive: bool,
}

impl Target {
    /// Initialize a target at an observed position with zero velocity.
    fn new(id: u64, position: &Point3<f64>) -> Self {
        let p_pos = 10.0f64.powi(2);
        let p_vel = 100.0f64.powi(2);
        Self {
            id,
            state: Vector6::new(position.x, 0.0, position.y, 0.0, position.z, 0.0),
            covariance: Matrix6::from_diagonal(&Vector6::new(
                p_pos, p_vel, p_pos, p_vel, p_pos, p_vel,
            )),
            frames_without_observation: 0,
            age: 0,
            alive: true,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn age(&self) -> u64 {
        self.age
    }

    pub fn frames_without_observation(&self) -> u64 {
        self.frames_without_observation
    }

    /// Current position estimate.
    pub fn position(&self) -> Point3<f64> {
        Point3::new(self.state[0], self.state[2], self.state[4])
    }

    /// Current velocity estimate.
    pub fn velocity(&self) -> Vector3<f64> {
        Vector3::new(self.state[1], self.state[3], self.state[5])
    }

    /// Diagonal position variances (x, y, z).
    pub fn position_variance(&self) -> Vector3<f64> {
        Vector3::new(
            self.covariance[(0, 0)],
            self.covariance[(2, 2)],
            self.covariance[(4, 4)],
        )
    }

    /// Position the filter predicts for the next frame, used for
    /// association before the actual advance.
    fn predicted_position(&self, model: &MotionModel) -> Point3<f64> {
        let predicted = model.transition * self.state;
        Point3::new(predicted[0], predicted[2], predicted[4])
    }

    /// Advance one frame: predict, then update if an observation was
    /// associated. Returns whether the target is still alive.
    fn advance(
        &mut self,
        model: &MotionModel,
        observation: Option<&Point3<f64>>,
        config: &TrackerConfig,
    ) -> bool {
        // Predict
        self.state = model.transition * self.state;
        self.covariance = model.transition * self.covariance * model.transition.transpose()
            + model.process_noise;
        self.frames_without_observation += 1;
        self.age += 1;

        // Update
        if let Some(observed) = observation {
            let z = Vector3::new(observed.x, observed.y, observed.z);
            let innovation = z - model.observation * self.state;
            let innovation_covariance = model.observation
                * self.covariance
                * model.observation.transpose()
                + model.measurement_noise;

            match innovation_covariance.try_inverse() {
                Some(inverse) => {
                    let gain = self.covariance * model.observation.transpose() * inverse;
                    self.state += gain * innovation;
                    self.covariance =
                        (Matrix6::identity() - gain * model.observation) * self.covariance;
                    self.frames_without_observation = 0;
                }
                None => {
                    tracing::warn!(
                        "target {} innovation covariance not invertible, skipping update",
                        self.id
                    );
                }
            }
        }

        // Lifecycle: divergence retires the target, it does not error
        if self
            .position_variance()
            .iter()
            .chain([
                &self.covariance[(1, 1)],
                &self.covariance[(3, 3)],
                &self.covariance[(5, 5)],
            ])
            .any(|&v| v > config.max_covariance)
        {
            self.alive = false;
        }
        if self.frames_without_observation > config.max_missed {
            self.alive = false;
        }

        self.alive
    }
}

/// Multi-target tracker over per-frame 3D point sets.
pub struct Tracker {
    config: TrackerConfig,
    model: MotionModel,
    targets: Vec<Target>,
    next_target_id: u64,
    output: Option<csv::Writer<Box<dyn Write + Send>>>,
}

impl Tracker {
    pub fn new(config: TrackerConfig) -> Self {
        let model = MotionModel::constant_velocity(config.dt);
        Self {
            config,
            model,
            targets: Vec::new(),
            next_target_id: 0,
            output: None,
        }
    }

    /// Attach an output stream; one row per live target per frame is
    /// appended in `reconstruction/tracked.csv` layout.
    pub fn with_output(mut self, writer: Box<dyn Write + Send>) -> Self {
        self.output = Some(csv::Writer::from_writer(writer));
        self
    }

    /// Live targets, in creation order.
    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    /// Ids are strictly increasing and never reused; the first target
    /// gets id 1.
    fn add_target(&mut self, position: &Point3<f64>) {
        self.next_target_id += 1;
        self.targets.push(Target::new(self.next_target_id, position));
        tracing::debug!("target {} born at {position}", self.next_target_id);
    }

    /// Process the point set of one frame.
    pub fn process_frame(
        &mut self,
        frame_number: u64,
        observations: &[Point3<f64>],
    ) -> Result<(), TrackError> {
        if self.targets.is_empty() {
            // Nothing to associate: every point founds a target
            for observation in observations {
                self.add_target(observation);
            }
            return Ok(());
        }

        let (assignment, costs) = if observations.is_empty() {
            (vec![None; self.targets.len()], None)
        } else {
            let mut costs = Array2::zeros((self.targets.len(), observations.len()));
            for (t, target) in self.targets.iter().enumerate() {
                let predicted = target.predicted_position(&self.model);
                for (o, observed) in observations.iter().enumerate() {
                    costs[[t, o]] = (predicted - observed).norm();
                }
            }
            let solution = min_cost_assignment(&costs.view());
            (solution.row_to_col, Some(costs))
        };

        // Advance every target; gate-rejected associations queue their
        // point for a new target and leave this target unobserved. A
        // tight gate can therefore duplicate a live track, inherited
        // behavior, kept as-is.
        let mut spawn_positions: Vec<Point3<f64>> = Vec::new();
        for (t, target) in self.targets.iter_mut().enumerate() {
            let observation = assignment[t].and_then(|o| {
                let cost = costs
                    .as_ref()
                    .map(|c| c[[t, o]])
                    .unwrap_or(f64::INFINITY);
                if cost > self.config.max_distance {
                    spawn_positions.push(observations[o]);
                    None
                } else {
                    Some(&observations[o])
                }
            });
            target.advance(&self.model, observation, &self.config);
        }

        // Retire the dead, then instantiate queued targets
        self.targets.retain(Target::is_alive);
        for position in &spawn_positions {
            self.add_target(position);
        }

        self.document(frame_number)?;
        Ok(())
    }

    /// Iterate frames in increasing order; frames absent from the map
    /// are processed as empty observation sets. Resume is only
    /// supported at a frame boundary.
    pub fn process_batch(
        &mut self,
        frames: &BTreeMap<u64, Vec<Point3<f64>>>,
        start: Option<u64>,
        stop: Option<u64>,
    ) -> Result<(), TrackError> {
        let Some((&first, _)) = frames.iter().next() else {
            return Ok(());
        };
        let (&last, _) = frames.iter().next_back().expect("non-empty map");
        let start = start.unwrap_or(first);
        let stop = stop.unwrap_or(last);

        let empty = Vec::new();
        for frame_number in start..=stop {
            let observations = frames.get(&frame_number).unwrap_or(&empty);
            self.process_frame(frame_number, observations)?;
        }
        Ok(())
    }

    /// Flush the output stream.
    pub fn finish(mut self) -> Result<(), TrackError> {
        if let Some(writer) = &mut self.output {
            writer.flush().map_err(csv::Error::from)?;
        }
        Ok(())
    }

    fn document(&mut self, frame_number: u64) -> Result<(), TrackError> {
        let Some(writer) = &mut self.output else {
            return Ok(());
        };
        for target in &self.targets {
            let position = target.position();
            let velocity = target.velocity();
            let variance = target.position_variance();
            writer.serialize(TrackedRow {
                frame_number,
                target_id: target.id,
                n_missed_observations: target.frames_without_observation,
                x: position.x,
                x_variance: variance.x,
                x_velocity: velocity.x,
                y: position.y,
                y_variance: variance.y,
                y_velocity: velocity.y,
                z: position.z,
                z_variance: variance.z,
                z_velocity: velocity.z,
            })?;
        }
        Ok(())
    }
}
