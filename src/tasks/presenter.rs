//! Turns show views into scenes. Holds no show state of its own.

use std::sync::Arc;

use anyhow::Result;
use tokio::select;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, trace};

use crate::catalog::Catalog;
use crate::show::{RecapPhase, ShowState, ShowView};
use crate::tasks::transition::SurfacePair;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridCell {
    pub index: usize,
    pub name: String,
    pub revealed: bool,
    pub flashing: bool,
    pub failed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scene {
    Single {
        index: usize,
        name: String,
        caption: String,
    },
    /// Every slide except the winner.
    Grid { cells: Vec<GridCell> },
    Winner {
        index: usize,
        name: String,
        caption: String,
    },
}

pub fn compose(view: &ShowView, catalog: &Catalog) -> Scene {
    let (name, caption) = catalog
        .get(view.current_index)
        .map(|item| (item.display_name.clone(), item.caption.clone()))
        .unwrap_or_default();
    match view.state {
        ShowState::Recap(RecapPhase::Grid | RecapPhase::Flash) => {
            let flashing = view.state == ShowState::Recap(RecapPhase::Flash);
            let cells = catalog
                .items()
                .iter()
                .enumerate()
                .filter(|(index, _)| !catalog.is_winner(*index))
                .map(|(index, item)| GridCell {
                    index,
                    name: item.display_name.clone(),
                    revealed: view.grid.contains(&index),
                    flashing: flashing && view.flash.contains(&index),
                    failed: view.failed.contains(&index),
                })
                .collect();
            Scene::Grid { cells }
        }
        ShowState::Stopped {
            winner_revealed: true,
        } => Scene::Winner {
            index: view.current_index,
            name,
            caption,
        },
        _ => Scene::Single {
            index: view.current_index,
            name,
            caption,
        },
    }
}

/// Something that can draw scenes and surface frames.
pub trait Presenter: Send {
    fn present(&mut self, scene: &Scene);

    fn frame(&mut self, _surfaces: &SurfacePair) {}
}

/// Writes each new scene to the log.
#[derive(Debug, Default)]
pub struct LogPresenter {
    last: Option<Scene>,
    presented: usize,
    frames: u64,
}

impl LogPresenter {
    pub fn presented(&self) -> usize {
        self.presented
    }
}

impl Presenter for LogPresenter {
    fn present(&mut self, scene: &Scene) {
        if self.last.as_ref() == Some(scene) {
            return;
        }
        self.presented += 1;
        match scene {
            Scene::Single { index, name, .. } => info!(index, name = %name, "showing slide"),
            Scene::Grid { cells } => {
                let revealed = cells.iter().filter(|c| c.revealed).count();
                let flashing: Vec<_> = cells.iter().filter(|c| c.flashing).map(|c| c.index).collect();
                info!(revealed, total = cells.len(), ?flashing, "recap grid");
            }
            Scene::Winner { index, name, caption } => {
                info!(index, name = %name, caption = %caption, "*** winner ***");
            }
        }
        self.last = Some(scene.clone());
    }

    fn frame(&mut self, surfaces: &SurfacePair) {
        self.frames += 1;
        trace!(
            frames = self.frames,
            current = ?surfaces.current.index,
            next = ?surfaces.next.index,
            progress = surfaces.progress,
            "surface frame"
        );
    }
}

pub async fn run<P: Presenter>(
    catalog: Arc<Catalog>,
    mut presenter: P,
    mut view_rx: watch::Receiver<ShowView>,
    mut surfaces_rx: watch::Receiver<SurfacePair>,
    cancel: CancellationToken,
) -> Result<()> {
    let scene = compose(&view_rx.borrow_and_update(), &catalog);
    presenter.present(&scene);
    loop {
        select! {
            _ = cancel.cancelled() => break,
            changed = view_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let scene = compose(&view_rx.borrow_and_update(), &catalog);
                presenter.present(&scene);
            }
            Ok(()) = surfaces_rx.changed() => {
                presenter.frame(&surfaces_rx.borrow_and_update());
            }
        }
    }
    Ok(())
}
