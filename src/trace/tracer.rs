//! The boundary tracer state machine.

use crate::cancel::CancelToken;
use crate::config::{RefineConfig, TraceConfig};
use crate::error::TraceError;
use crate::oracle::MembershipOracle;
use crate::progress::ProgressThrottle;
use crate::trace::classifier::BorderClassifier;
use crate::trace::frontier::Frontier;
use crate::trace::refine::PointRefiner;
use crate::trace::seen::SeenCache;
use crate::trace::trail::Trail;
use crate::types::{LatticePoint, Offset, PlanePoint, NEIGHBOR_OFFSETS};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Pops processed by one call to [`BoundaryTracer::step`] when no checkpoint comes due.
const POP_BUDGET: u64 = 10_000;

/// Steps between cancellation polls in [`BoundaryTracer::run`]
const CANCEL_CHECK_INTERVAL_STEPS: u64 = 64;

/// Snapshot reported after each step
#[derive(Debug, Clone, Copy)]
pub struct TraceProgress {
    pub cost: u64,
    pub pops: u64,
    pub frontier: usize,
    pub trail_len: usize,
    pub checkpoints: u64,
    pub position: PlanePoint,
    pub unleashed: bool,
}

#[derive(Debug, Clone)]
pub enum TraceStep {
    Progress(TraceProgress),
    Completed(Trail),
}

/// Uniform-cost search along the border, from a start point found by scanning right from the
/// origin, back around to the point directly below the start.
///
/// Until the search has reached `unleash_x` it may not step below the start row, which forces
/// it the long way around instead of closing the loop at once.
pub struct BoundaryTracer {
    config: TraceConfig,
    classifier: BorderClassifier,
    seen: SeenCache,
    frontier: Frontier,
    refiner: Option<(PointRefiner, bool)>,
    start: LatticePoint,
    target: LatticePoint,
    unleash_x: f64,
    unleashed: bool,
    last_checkpoint_cost: u64,
    checkpoints: u64,
    pops: u64,
    refine_misses: u64,
    trail: Vec<PlanePoint>,
    completed: Option<Trail>,
}

impl BoundaryTracer {
    /// Locate the start and target points and prepare the search.
    pub fn new(
        oracle: Arc<dyn MembershipOracle>,
        config: &TraceConfig,
        refine: &RefineConfig,
    ) -> Result<Self, TraceError> {
        let mut classifier = BorderClassifier::new(
            oracle.clone(),
            config.scale,
            config.border_iter,
            config.membership_cache,
        );

        let origin = config.origin.to_lattice(config.scale);
        let limit = (config.scan_limit * config.scale).ceil() as i64;
        let (start, target) = seek_start(&mut classifier, origin, limit)?;

        let start_plane = start.to_plane(config.scale);
        if config.unleash_x >= start_plane.x {
            return Err(TraceError::InvalidGate {
                unleash_x: config.unleash_x,
                start_x: start_plane.x,
            });
        }

        info!(
            start_x = start_plane.x,
            start_y = start_plane.y,
            "Found start of border"
        );

        let mut seen = SeenCache::new(config.seen_threshold);
        seen.has_been_seen(start);

        let refiner = config.refine.then(|| {
            let fallback = config.border_iter <= refine.fallback_max_iter;
            let refiner = PointRefiner::new(
                oracle,
                config.border_iter,
                1.0 / config.scale,
                refine.clone(),
            );
            (refiner, fallback)
        });

        Ok(Self {
            config: config.clone(),
            classifier,
            seen,
            frontier: Frontier::with_root(start, Offset::new(-1, 0)),
            refiner,
            start,
            target,
            unleash_x: config.unleash_x * config.scale,
            unleashed: false,
            last_checkpoint_cost: 0,
            checkpoints: 0,
            pops: 0,
            refine_misses: 0,
            trail: vec![start_plane],
            completed: None,
        })
    }

    pub fn start(&self) -> LatticePoint {
        self.start
    }

    pub fn target(&self) -> LatticePoint {
        self.target
    }

    pub fn seen(&self) -> &SeenCache {
        &self.seen
    }

    pub fn checkpoints(&self) -> u64 {
        self.checkpoints
    }

    /// Advance the search until the next checkpoint or until the pop budget is spent.
    pub fn step(&mut self) -> Result<TraceStep, TraceError> {
        if let Some(trail) = &self.completed {
            return Ok(TraceStep::Completed(trail.clone()));
        }

        for _ in 0..POP_BUDGET {
            let index = match self.frontier.pop() {
                Some(index) => index,
                None => {
                    return Err(TraceError::FrontierExhausted {
                        end: self.target,
                        pops: self.pops,
                    })
                }
            };
            self.pops += 1;
            let node = *self.frontier.node(index);

            if node.position == self.target {
                self.checkpoint(index, node.cost);
                let trail = Trail::closed_from_path(&self.trail, 0.0);
                info!(
                    points = trail.len(),
                    cost = node.cost,
                    pops = self.pops,
                    refine_misses = self.refine_misses,
                    "Found trail"
                );
                self.completed = Some(trail.clone());
                return Ok(TraceStep::Completed(trail));
            }

            let checkpoint_due = self.frontier.is_empty()
                || node.cost >= self.last_checkpoint_cost + self.config.checkpoint_interval;

            self.expand(index, node.position, node.cost);

            if checkpoint_due {
                self.checkpoint(index, node.cost);
                return Ok(TraceStep::Progress(self.progress(node.cost, node.position)));
            }
        }

        let node = *self.frontier.node(0);
        Ok(TraceStep::Progress(self.progress(node.cost, node.position)))
    }

    /// Drive [`step`](Self::step) to completion, polling `cancel` between steps.
    pub fn run(&mut self, cancel: &dyn CancelToken) -> Result<Trail, TraceError> {
        let mut throttle = ProgressThrottle::new();
        let mut steps: u64 = 0;
        loop {
            if steps % CANCEL_CHECK_INTERVAL_STEPS == 0 && cancel.is_cancelled() {
                warn!(pops = self.pops, "Trace cancelled");
                return Err(TraceError::Cancelled);
            }
            steps += 1;

            match self.step()? {
                TraceStep::Completed(trail) => return Ok(trail),
                TraceStep::Progress(progress) => {
                    if throttle.ready() {
                        info!(
                            cost = progress.cost,
                            pops = progress.pops,
                            frontier = progress.frontier,
                            trail = progress.trail_len,
                            x = progress.position.x,
                            y = progress.position.y,
                            "Border, working"
                        );
                    }
                }
            }
        }
    }

    fn expand(&mut self, parent: usize, position: LatticePoint, cost: u64) {
        for offset in NEIGHBOR_OFFSETS {
            let next = position.offset(offset);
            if !self.unleashed {
                let blocked = next.y < self.start.y;
                if next.x as f64 <= self.unleash_x {
                    self.unleashed = true;
                    info!(cost, pops = self.pops, "Search unleashed");
                }
                if blocked {
                    continue;
                }
            }

            if self.seen.has_been_seen(next) {
                continue;
            }

            if let Some(trigger) = self.classifier.is_border(next) {
                self.frontier.push(cost + 1, next, trigger, parent);
            }
        }
    }

    /// Commit the path to `index`, then make it the new root.
    fn checkpoint(&mut self, index: usize, cost: u64) {
        let path = self.frontier.path_from_root(index);
        for point in path {
            let plane = point.to_plane(self.config.scale);
            if !self.spaced(&plane) {
                continue;
            }
            match self.refine(plane) {
                Some(refined) if self.spaced(&refined) => self.trail.push(refined),
                _ => {}
            }
        }

        self.frontier.rebase(index);
        self.last_checkpoint_cost = cost;
        self.checkpoints += 1;

        if self.seen.maybe_rotate() {
            debug!(
                rotations = self.seen.rotations(),
                checkpoint = self.checkpoints,
                "Rotated seen set"
            );
        }
    }

    fn spaced(&self, point: &PlanePoint) -> bool {
        self.trail
            .last()
            .map_or(true, |last| last.distance(point) >= self.config.min_spacing)
    }

    fn refine(&mut self, point: PlanePoint) -> Option<PlanePoint> {
        let Some((refiner, fallback)) = &self.refiner else {
            return Some(point);
        };
        match refiner.refine(point) {
            Some(refined) => Some(refined),
            None => {
                self.refine_misses += 1;
                debug!(x = point.x, y = point.y, fallback = *fallback, "Refinement missed");
                fallback.then_some(point)
            }
        }
    }

    fn progress(&self, cost: u64, position: LatticePoint) -> TraceProgress {
        TraceProgress {
            cost,
            pops: self.pops,
            frontier: self.frontier.len(),
            trail_len: self.trail.len(),
            checkpoints: self.checkpoints,
            position: position.to_plane(self.config.scale),
            unleashed: self.unleashed,
        }
    }
}

/// Scan right from `origin` to the outer edge of the first border run.
///
/// Returns the start (last border point of the run) and the target directly below it.
fn seek_start(
    classifier: &mut BorderClassifier,
    origin: LatticePoint,
    limit: i64,
) -> Result<(LatticePoint, LatticePoint), TraceError> {
    let no_start = || TraceError::NoStartFound { origin, limit };

    let mut x = origin.x;
    while classifier
        .is_border(LatticePoint::new(x + 1, origin.y))
        .is_none()
    {
        x += 1;
        if x - origin.x > limit {
            return Err(no_start());
        }
    }
    while classifier
        .is_border(LatticePoint::new(x + 1, origin.y))
        .is_some()
    {
        x += 1;
        if x - origin.x > limit {
            return Err(no_start());
        }
    }

    let start = LatticePoint::new(x, origin.y);
    let target = LatticePoint::new(x, origin.y - 1);
    if classifier.is_border(target).is_none() {
        return Err(TraceError::Disconnected { start, end: target });
    }
    Ok((start, target))
}
