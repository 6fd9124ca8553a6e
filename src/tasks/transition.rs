//! Transition engine: one crossfade/transform between the two display surfaces at a time.

pub mod tween;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::{debug, trace};

use crate::assets::{Asset, AssetCache, AssetError};
use crate::show::TransitionPlan;
pub use tween::{Transform, TransitionStyle, Tween};

/// One of the two layers the presentation draws.
#[derive(Debug, Clone, Default)]
pub struct Surface {
    pub index: Option<usize>,
    pub asset: Option<Arc<Asset>>,
    pub transform: Transform,
}

impl Surface {
    fn empty() -> Self {
        Self {
            index: None,
            asset: None,
            transform: Transform::HIDDEN,
        }
    }
}

/// Snapshot of both surfaces, published after every frame.
#[derive(Debug, Clone)]
pub struct SurfacePair {
    pub current: Surface,
    pub next: Surface,
    /// Progress of the running transition in [0, 1]; 0 when idle.
    pub progress: f32,
}

impl Default for SurfacePair {
    fn default() -> Self {
        Self {
            current: Surface::empty(),
            next: Surface::empty(),
            progress: 0.0,
        }
    }
}

impl SurfacePair {
    fn swap(&mut self) {
        self.current = std::mem::replace(&mut self.next, Surface::empty());
        self.progress = 0.0;
    }
}

#[derive(Debug, Clone)]
pub struct TransitionRequest {
    pub plan: TransitionPlan,
    pub asset_ref: String,
    pub style: TransitionStyle,
}

#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("transition to slide {requested} rejected: another transition is in flight")]
    Busy { requested: usize },
    #[error("slide {index} could not be loaded")]
    Asset {
        index: usize,
        #[source]
        source: AssetError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionReport {
    pub index: usize,
    pub frames: u32,
    pub elapsed: Duration,
}

/// Runs transitions and owns the surface state.
///
/// Whether a transition may start is decided here and nowhere else: `begin`
/// claims the engine synchronously, and the claim is released when the
/// returned [`PendingTransition`] finishes or is dropped.
#[derive(Clone)]
pub struct TransitionEngine {
    cache: Arc<AssetCache>,
    surfaces: Arc<watch::Sender<SurfacePair>>,
    busy: Arc<AtomicBool>,
    frame_interval: Duration,
}

impl TransitionEngine {
    pub fn new(cache: Arc<AssetCache>, frame_interval: Duration) -> Self {
        let (surfaces, _) = watch::channel(SurfacePair::default());
        Self {
            cache,
            surfaces: Arc::new(surfaces),
            busy: Arc::new(AtomicBool::new(false)),
            frame_interval,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SurfacePair> {
        self.surfaces.subscribe()
    }

    pub fn surfaces(&self) -> SurfacePair {
        self.surfaces.borrow().clone()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    pub fn begin(&self, request: TransitionRequest) -> Result<PendingTransition, TransitionError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!(requested = request.plan.to, "engine busy; rejecting transition");
            return Err(TransitionError::Busy {
                requested: request.plan.to,
            });
        }
        Ok(PendingTransition {
            engine: self.clone(),
            request,
            _guard: BusyGuard(self.busy.clone()),
        })
    }

    /// Puts the first slide on screen without animating.
    pub async fn prime(&self, index: usize, asset_ref: &str) -> Result<(), TransitionError> {
        let asset = self
            .cache
            .load(asset_ref)
            .await
            .map_err(|source| TransitionError::Asset { index, source })?;
        self.surfaces.send_modify(|pair| {
            pair.current = Surface {
                index: Some(index),
                asset: Some(asset),
                transform: Transform::IDENTITY,
            };
        });
        Ok(())
    }
}

struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// A transition that holds the engine but has not run yet.
pub struct PendingTransition {
    engine: TransitionEngine,
    request: TransitionRequest,
    _guard: BusyGuard,
}

impl PendingTransition {
    pub fn plan(&self) -> TransitionPlan {
        self.request.plan
    }

    /// Loads the incoming asset, animates both surfaces, then swaps them.
    ///
    /// A failed load returns before any surface is touched.
    pub async fn run(self) -> Result<TransitionReport, TransitionError> {
        let TransitionRequest {
            plan,
            asset_ref,
            style,
        } = &self.request;
        let index = plan.to;
        let asset = self
            .engine
            .cache
            .load(asset_ref)
            .await
            .map_err(|source| TransitionError::Asset { index, source })?;

        let surfaces = &self.engine.surfaces;
        surfaces.send_modify(|pair| {
            pair.next = Surface {
                index: Some(index),
                asset: Some(asset),
                transform: style.enter.sample(0.0),
            };
            pair.progress = 0.0;
        });

        let start = Instant::now();
        let mut ticker = interval(self.engine.frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut frames = 0u32;
        loop {
            ticker.tick().await;
            let progress = progress(start.elapsed(), style.duration);
            surfaces.send_modify(|pair| {
                pair.current.transform = style.exit.sample(progress);
                pair.next.transform = style.enter.sample(progress);
                pair.progress = progress;
            });
            frames += 1;
            trace!(index, progress, "transition frame");
            if progress >= 1.0 {
                break;
            }
        }
        let settled = style.enter.to;
        surfaces.send_modify(|pair| {
            pair.next.transform = settled;
            pair.swap();
        });

        let report = TransitionReport {
            index,
            frames,
            elapsed: start.elapsed(),
        };
        debug!(?report, kind = ?plan.kind, "transition complete");
        Ok(report)
    }
}

fn progress(elapsed: Duration, total: Duration) -> f32 {
    if total.is_zero() {
        1.0
    } else {
        (elapsed.as_secs_f32() / total.as_secs_f32()).min(1.0)
    }
}
