//! Hero scene: smooth scroller → orchestrator → scrubbed sequence player
//!
//! The host calls `frame(dt)` once per animation frame. The smooth scroller
//! eases, the orchestrator turns the new position into timeline progress,
//! the player scrubs to it and applies whatever loads finished meanwhile.
//! Stats panel crossings come out of the same event bus as frame events.

use std::sync::Arc;
use std::time::Duration;

use log::debug;

use crate::core::{Environment, EventBus, PlayerError, SceneEvent, SequencePlayer};
use crate::entities::{HeroConfig, SequenceConfig};
use crate::fetch::FrameFetcher;
use crate::render::{RenderSurface, Viewport};
use crate::scroll::{LayoutEvent, ScrollOrchestrator, ScrollSource, ScrollUpdate, SmoothScroller, ViewportRect};

pub struct HeroScene<S: RenderSurface> {
    orchestrator: ScrollOrchestrator<SmoothScroller>,
    player: SequencePlayer<S>,
    last_progress: Option<f32>,
}

impl<S: RenderSurface> HeroScene<S> {
    /// A sequence without progress is switched to scrubbed mode at 0.
    pub fn new(
        hero: HeroConfig,
        sequence: SequenceConfig,
        scroller: SmoothScroller,
        env: Arc<dyn Environment>,
        fetcher: Arc<dyn FrameFetcher>,
        surface: S,
    ) -> Result<Self, PlayerError> {
        let sequence = match sequence.progress {
            Some(_) => sequence,
            None => sequence.scrubbed(0.0),
        };
        let player = SequencePlayer::new(sequence, env, fetcher, surface)?;
        let mut scene = Self {
            orchestrator: ScrollOrchestrator::new(scroller, hero),
            player,
            last_progress: None,
        };
        let initial = scene.orchestrator.update();
        scene.apply(&initial);
        Ok(scene)
    }

    pub fn wheel(&mut self, delta: f64) {
        self.orchestrator.source_mut().wheel(delta);
    }

    pub fn touch(&mut self, delta: f64) {
        self.orchestrator.source_mut().touch(delta);
    }

    pub fn scroll_to(&mut self, value: f64, immediate: bool) {
        self.orchestrator.source_mut().scroll_to(value, immediate);
    }

    /// Advance one animation frame of `dt`.
    pub fn frame(&mut self, dt: Duration) -> ScrollUpdate {
        self.orchestrator.source_mut().raf(dt);
        let update = self.orchestrator.update();
        self.apply(&update);
        self.player.pump();
        update
    }

    /// Viewport changed (or first load): resize, re-measure, resync.
    pub fn layout(&mut self, event: LayoutEvent, viewport: Viewport) -> ScrollUpdate {
        let rect = ViewportRect::new(f64::from(viewport.width), f64::from(viewport.height));
        self.orchestrator.source_mut().resize(rect);
        self.player.resize(viewport);
        let update = self.orchestrator.on_layout_event(event);
        self.apply(&update);
        update
    }

    fn apply(&mut self, update: &ScrollUpdate) {
        if self.last_progress != Some(update.progress) {
            self.last_progress = Some(update.progress);
            self.player.set_progress(update.progress);
        }
        if let Some(visible) = update.stats_toggled {
            debug!("Hero stats visible: {}", visible);
            self.player.events().emit(SceneEvent::StatsVisibility { visible });
        }
    }

    pub fn is_settled(&self) -> bool {
        self.orchestrator.source().is_settled()
    }

    pub fn scroll_position(&self) -> f64 {
        self.orchestrator.source().scroll_position()
    }

    pub fn events(&self) -> &EventBus<SceneEvent> {
        self.player.events()
    }

    pub fn player(&self) -> &SequencePlayer<S> {
        &self.player
    }

    pub fn player_mut(&mut self) -> &mut SequencePlayer<S> {
        &mut self.player
    }

    pub fn orchestrator(&self) -> &ScrollOrchestrator<SmoothScroller> {
        &self.orchestrator
    }

    pub fn teardown(&mut self) {
        self.player.teardown();
    }
}
