//! [`ReachLoop`] – drives one arm toward goal poses from the bus.
//!
//! Motion requests block for the whole plan-and-execute cycle, so each reach
//! runs on Tokio's blocking pool.  Only one reach is in flight at a time;
//! goals that arrive meanwhile are dropped, since a fresher one follows on
//! the next locked frame.

use std::sync::Arc;

use facereach_middleware::{EventBus, Topic, TopicReceiver};
use facereach_motion::{ApproachOffset, MotionServiceFacade, PlanOutcome};
use facereach_perception::localizer::WORLD_FRAME;
use facereach_types::{ArmSide, Event, EventPayload, GoToPose, GoalPose, ReachError};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast::error::RecvError, watch};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

const SOURCE: &str = "facereach-runtime::reach_loop";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReachConfig {
    pub side: ArmSide,
    /// Vertical offset from the forehead to the commanded end-effector
    /// position.
    pub approach_z_offset_m: f64,
    /// Frame goal poses are expressed in.  The localizer produces them in
    /// the world frame.
    pub frame: String,
}

impl Default for ReachConfig {
    fn default() -> Self {
        Self {
            side: ArmSide::Left,
            approach_z_offset_m: -0.1,
            frame: WORLD_FRAME.to_string(),
        }
    }
}

/// Counters returned when the loop stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReachStats {
    pub attempted: u64,
    pub succeeded: u64,
    /// Goals ignored because a reach was already running.
    pub dropped: u64,
}

type Reach = JoinHandle<Result<PlanOutcome, ReachError>>;

pub struct ReachLoop {
    facade: Arc<MotionServiceFacade>,
    bus: EventBus,
    goals: TopicReceiver,
    config: ReachConfig,
}

impl ReachLoop {
    /// Subscribes to goal poses immediately, so goals published after this
    /// returns are not missed.
    pub fn new(facade: Arc<MotionServiceFacade>, bus: EventBus, config: ReachConfig) -> Self {
        let goals = bus.subscribe_to(Topic::GoalPoses);
        Self {
            facade,
            bus,
            goals,
            config,
        }
    }

    /// Position-only request for `goal`, keeping the arm's current
    /// orientation.
    pub fn request_for(facade: &MotionServiceFacade, config: &ReachConfig, goal: &GoalPose) -> GoToPose {
        let mut request = GoToPose::position(config.frame.clone(), goal.x, goal.y, goal.z);
        match facade.get_pose(config.side) {
            Ok(current) => {
                request.roll = current.roll;
                request.pitch = current.pitch;
                request.yaw = current.yaw;
            }
            Err(e) => debug!(error = %e, "current orientation unknown, using neutral"),
        }
        request
    }

    /// Run until `shutdown` flips to `true` (or its sender is dropped).  An
    /// in-flight reach is awaited before returning.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> ReachStats {
        let mut stats = ReachStats::default();
        let mut in_flight: Option<Reach> = None;
        info!(side = %self.config.side, "reach loop started");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                joined = wait_for(&mut in_flight) => {
                    in_flight = None;
                    self.finish(joined, &mut stats);
                }
                event = self.goals.recv() => match event {
                    Ok(Event { payload: EventPayload::GoalPose(goal), .. }) => {
                        if in_flight.is_some() {
                            stats.dropped += 1;
                            debug!(x = goal.x, y = goal.y, z = goal.z, "reach in flight, goal dropped");
                            continue;
                        }
                        stats.attempted += 1;
                        in_flight = Some(self.spawn_reach(goal));
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(n)) => warn!(skipped = n, "goal subscriber lagged"),
                    Err(RecvError::Closed) => break,
                },
            }
        }

        if let Some(handle) = in_flight.take() {
            let joined = handle.await;
            self.finish(joined, &mut stats);
        }
        info!(?stats, "reach loop stopped");
        stats
    }

    fn spawn_reach(&self, goal: GoalPose) -> Reach {
        let facade = Arc::clone(&self.facade);
        let config = self.config.clone();
        info!(side = %config.side, x = goal.x, y = goal.y, z = goal.z, "reaching for goal");
        tokio::task::spawn_blocking(move || {
            let request = Self::request_for(&facade, &config, &goal);
            facade.plan_to_pose(config.side, &request, ApproachOffset::new(config.approach_z_offset_m))
        })
    }

    fn finish(&self, joined: Result<Result<PlanOutcome, ReachError>, JoinError>, stats: &mut ReachStats) {
        let side = self.config.side;
        let (success, fraction) = match joined {
            Ok(Ok(outcome)) => (self.facade.succeeded(&outcome), outcome.fraction),
            Ok(Err(e)) => {
                warn!(%side, error = %e, "reach failed");
                (false, 0.0)
            }
            Err(e) => {
                error!(%side, error = %e, "reach task aborted");
                self.bus.publish_lossy(
                    Topic::SystemAlerts,
                    Event::new(
                        SOURCE,
                        EventPayload::Fault {
                            component: "reach_loop".to_string(),
                            message: e.to_string(),
                        },
                    ),
                );
                (false, 0.0)
            }
        };
        if success {
            stats.succeeded += 1;
        }
        self.bus.publish_lossy(
            Topic::MotionResults,
            Event::new(
                SOURCE,
                EventPayload::MotionResult {
                    side,
                    success,
                    fraction,
                },
            ),
        );
    }
}

async fn wait_for(reach: &mut Option<Reach>) -> Result<Result<PlanOutcome, ReachError>, JoinError> {
    match reach {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}
