use lfconfig::RenderSettings;

/// Smallest focus depth accepted; `1 / focus` must stay finite.
pub const MIN_FOCUS: f32 = 1.0e-3;

/// Live controls read by the renderer every frame.
///
/// Values are replaced wholesale through the `with_*` builders or
/// [`RenderParams::apply`]; nothing mutates them in place.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderParams {
    aperture: f32,
    focus: f32,
    viewer_offset: [f32; 2],
}

impl RenderParams {
    pub fn new(aperture: f32, focus: f32) -> Self {
        Self::default().with_aperture(aperture).with_focus(focus)
    }

    pub fn from_settings(settings: &RenderSettings) -> Self {
        Self::new(settings.aperture, settings.focus)
    }

    pub fn aperture(&self) -> f32 {
        self.aperture
    }

    pub fn focus(&self) -> f32 {
        self.focus
    }

    pub fn viewer_offset(&self) -> [f32; 2] {
        self.viewer_offset
    }

    /// Negative and NaN apertures collapse to a pinhole.
    pub fn with_aperture(self, aperture: f32) -> Self {
        let aperture = if aperture.is_finite() && aperture > 0.0 {
            aperture
        } else {
            0.0
        };
        Self { aperture, ..self }
    }

    pub fn with_focus(self, focus: f32) -> Self {
        let focus = if focus.is_finite() {
            focus.max(MIN_FOCUS)
        } else {
            self.focus
        };
        Self { focus, ..self }
    }

    pub fn with_viewer_offset(self, viewer_offset: [f32; 2]) -> Self {
        Self {
            viewer_offset,
            ..self
        }
    }

    pub fn apply(self, event: ParamEvent) -> Self {
        match event {
            ParamEvent::Aperture(value) => self.with_aperture(value),
            ParamEvent::Focus(value) => self.with_focus(value),
            ParamEvent::ViewerOffset(offset) => self.with_viewer_offset(offset),
            ParamEvent::Reset => Self {
                viewer_offset: [0.0, 0.0],
                ..self
            },
        }
    }
}

impl Default for RenderParams {
    fn default() -> Self {
        Self {
            aperture: 0.0,
            focus: 1.0,
            viewer_offset: [0.0, 0.0],
        }
    }
}

/// Control changes produced by sliders, keys or scripted input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamEvent {
    Aperture(f32),
    Focus(f32),
    ViewerOffset([f32; 2]),
    /// Recentre the viewer.
    Reset,
}

/// Where the viewer is this frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewerPose {
    /// Desktop camera world position; x/y map straight onto the offset.
    Desktop { position: [f32; 3] },
    /// Tracked head position; only the movement since tracking began counts.
    Head { position: [f32; 3] },
    /// No pose available (tracking paused); the viewer sits on the centre camera.
    Untracked,
}

/// Render options fixed for the lifetime of a surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceSettings {
    pub camera_gap: f32,
    pub baseline: f32,
    pub background: [f32; 4],
    pub grid_overlay: bool,
}

impl SurfaceSettings {
    pub fn from_settings(settings: &RenderSettings) -> Self {
        Self {
            camera_gap: settings.camera_gap,
            baseline: settings.baseline,
            background: settings.background,
            grid_overlay: settings.grid_overlay,
        }
    }

    /// Focus depth at which the views line up without any shift.
    pub fn neutral_focus(&self) -> f32 {
        1.0 / self.baseline
    }
}

impl Default for SurfaceSettings {
    fn default() -> Self {
        Self::from_settings(&RenderSettings::default())
    }
}
