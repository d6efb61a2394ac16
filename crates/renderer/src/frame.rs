use lightfield::{BackgroundLoad, GridShape, ImageArrayBuffer, LoadError, LoadEvent};
use tracing::{debug, info, warn};

use crate::output::RenderedFrame;
use crate::surface::{Surface, SurfaceBackend};
use crate::types::{ParamEvent, RenderParams, SurfaceSettings, ViewerPose};
use crate::RenderError;

/// Turns absolute head positions into a parallax offset.
///
/// The first position seen becomes the origin; later positions report
/// their x/y movement from it multiplied by `scale`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadTracker {
    origin: Option<[f32; 3]>,
    scale: f32,
}

impl HeadTracker {
    pub fn new(scale: f32) -> Self {
        Self {
            origin: None,
            scale,
        }
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn is_tracking(&self) -> bool {
        self.origin.is_some()
    }

    pub fn offset(&mut self, position: [f32; 3]) -> [f32; 2] {
        let origin = *self.origin.get_or_insert(position);
        [
            (position[0] - origin[0]) * self.scale,
            (position[1] - origin[1]) * self.scale,
        ]
    }

    /// Forgets the origin; the next position becomes the new one.
    pub fn reset(&mut self) {
        self.origin = None;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    Idle,
    Loading { generation: u64, percent: u8 },
    Ready { generation: u64, gaps: usize },
    Failed { generation: u64, message: String },
}

/// Per-frame driver: polls the pending load, updates params from the pose
/// and draws the surface. Everything runs on the caller's thread.
pub struct FrameLoop<B: SurfaceBackend> {
    backend: B,
    surface: Surface<B>,
    tracker: HeadTracker,
    pending: Option<BackgroundLoad>,
    retired: Vec<BackgroundLoad>,
    status: LoadStatus,
    frames: u64,
}

impl<B: SurfaceBackend> FrameLoop<B> {
    pub fn new(
        backend: B,
        settings: SurfaceSettings,
        params: RenderParams,
        head_tracking_scale: f32,
    ) -> Self {
        let mut surface = Surface::new(settings);
        surface.set_params(params);
        Self {
            backend,
            surface,
            tracker: HeadTracker::new(head_tracking_scale),
            pending: None,
            retired: Vec::new(),
            status: LoadStatus::Idle,
            frames: 0,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn surface(&self) -> &Surface<B> {
        &self.surface
    }

    pub fn params(&self) -> RenderParams {
        self.surface.params()
    }

    pub fn status(&self) -> &LoadStatus {
        &self.status
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn apply(&mut self, event: ParamEvent) {
        if event == ParamEvent::Reset {
            self.tracker.reset();
        }
        let params = self.surface.params().apply(event);
        self.surface.set_params(params);
    }

    /// Shows an already loaded array right away.
    pub fn show(&mut self, field: ImageArrayBuffer, zoom: f32) -> Result<(), RenderError> {
        let shape = field.shape();
        let params = self.surface.params();
        self.surface.set_zoom(zoom);
        self.surface
            .create_or_update(&mut self.backend, Some(field), shape, params)
    }

    /// Hands a running load to the loop; frames draw nothing until it lands.
    ///
    /// A load attached earlier is cancelled: it stops after the fetch in
    /// flight and never reaches the surface.
    pub fn attach(
        &mut self,
        load: BackgroundLoad,
        shape: GridShape,
        zoom: f32,
    ) -> Result<(), RenderError> {
        if let Some(previous) = self.pending.take() {
            debug!(generation = previous.generation(), "retiring pending load");
            previous.cancel();
            self.retired.push(previous);
        }
        self.status = LoadStatus::Loading {
            generation: load.generation(),
            percent: 0,
        };
        self.pending = Some(load);
        let params = self.surface.params();
        self.surface.set_zoom(zoom);
        self.surface
            .create_or_update(&mut self.backend, None, shape, params)
    }

    /// Runs one frame. `Ok(None)` while the surface has no field.
    pub fn frame(&mut self, pose: ViewerPose) -> Result<Option<RenderedFrame>, RenderError> {
        self.poll_load()?;

        let offset = match pose {
            ViewerPose::Desktop { position } => [position[0], position[1]],
            ViewerPose::Head { position } => self.tracker.offset(position),
            ViewerPose::Untracked => [0.0, 0.0],
        };
        let params = self.surface.params().with_viewer_offset(offset);
        self.surface.set_params(params);

        let frame = self.surface.draw(&mut self.backend)?;
        if frame.is_some() {
            self.frames += 1;
        }
        Ok(frame)
    }

    /// Blocks until the pending load finishes, then binds its field.
    pub fn finish_load(&mut self) -> Result<(), RenderError> {
        while self.pending.is_some() {
            self.poll_load()?;
            if self.pending.is_some() {
                std::thread::sleep(std::time::Duration::from_millis(5));
            }
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.surface.clear(&mut self.backend);
        self.tracker.reset();
    }

    fn poll_load(&mut self) -> Result<(), RenderError> {
        self.retired.retain_mut(|load| {
            load.poll();
            !load.is_finished()
        });

        let Some(load) = self.pending.as_mut() else {
            return Ok(());
        };
        let generation = load.generation();
        let mut finished = None;
        for event in load.poll() {
            match event {
                LoadEvent::Progress(progress) => {
                    self.status = LoadStatus::Loading {
                        generation,
                        percent: progress.percent,
                    };
                }
                LoadEvent::Finished(result) => finished = Some(result),
            }
        }
        let Some(result) = finished else {
            return Ok(());
        };
        self.pending = None;

        match result {
            Ok(outcome) => {
                if outcome.is_partial() {
                    warn!(generation, gaps = outcome.gaps.len(), "showing partial light field");
                }
                info!(
                    generation,
                    elapsed = ?outcome.elapsed,
                    "light field ready"
                );
                self.status = LoadStatus::Ready {
                    generation,
                    gaps: outcome.gaps.len(),
                };
                let shape = outcome.buffer.shape();
                let params = self.surface.params();
                self.surface
                    .create_or_update(&mut self.backend, Some(outcome.buffer), shape, params)
            }
            Err(LoadError::Superseded { .. }) => {
                debug!(generation, "pending load was superseded");
                self.status = LoadStatus::Idle;
                Ok(())
            }
            Err(err) => {
                self.status = LoadStatus::Failed {
                    generation,
                    message: err.to_string(),
                };
                Err(err.into())
            }
        }
    }
}
