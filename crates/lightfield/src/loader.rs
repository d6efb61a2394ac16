use std::thread;
use std::time::{Duration, Instant};

use lfconfig::{FailurePolicy, LoaderSettings};
use tracing::{debug, info, warn};

use crate::buffer::ImageArrayBuffer;
use crate::generation::LoadTicket;
use crate::grid::{GridSpec, BYTES_PER_PIXEL};
use crate::source::{FetchError, ImageSource};

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("invalid grid: {0}")]
    InvalidGrid(String),
    #[error("view ({column}, {row}) could not be loaded: {source}")]
    Fetch {
        column: u32,
        row: u32,
        #[source]
        source: FetchError,
    },
    #[error("load generation {generation} was superseded by a newer load")]
    Superseded { generation: u64 },
    #[error("failed to start load worker: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Knobs for one image-array load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    pub policy: FailurePolicy,
    /// Extra attempts per view after the first failure.
    pub retries: u32,
    pub retry_delay: Duration,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            policy: FailurePolicy::Abort,
            retries: 0,
            retry_delay: Duration::from_millis(250),
        }
    }
}

impl From<&LoaderSettings> for LoadOptions {
    fn from(settings: &LoaderSettings) -> Self {
        Self {
            policy: settings.on_error,
            retries: settings.retries,
            retry_delay: settings.retry_delay,
        }
    }
}

/// Progress after finishing cell `index` (0-based, fetch order).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub index: usize,
    pub total: usize,
    pub percent: u8,
}

impl Progress {
    pub fn after(index: usize, total: usize) -> Self {
        Self {
            index,
            total,
            percent: progress_percent(index, total),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.index + 1 >= self.total
    }
}

/// `round(100 * (index + 1) / total)` with halves rounded up.
pub fn progress_percent(index: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let done = (index + 1).min(total);
    ((200 * done + total) / (2 * total)) as u8
}

/// A view that was skipped and left zero-filled.
#[derive(Debug)]
pub struct Gap {
    pub column: u32,
    pub row: u32,
    pub location: String,
    pub error: FetchError,
}

#[derive(Debug)]
pub struct LoadOutcome {
    pub buffer: ImageArrayBuffer,
    pub gaps: Vec<Gap>,
    pub elapsed: Duration,
}

impl LoadOutcome {
    pub fn is_partial(&self) -> bool {
        !self.gaps.is_empty()
    }
}

/// Fetches every view of `grid` one after another and packs them into a
/// single layered buffer.
///
/// `progress` is invoked once per cell, in fetch order. The ticket is checked
/// before every write; a superseded load returns [`LoadError::Superseded`]
/// and its partial buffer is dropped.
pub fn load_image_array<S, F>(
    grid: &GridSpec,
    source: &S,
    options: LoadOptions,
    ticket: &LoadTicket,
    mut progress: F,
) -> Result<LoadOutcome, LoadError>
where
    S: ImageSource + ?Sized,
    F: FnMut(Progress),
{
    let started = Instant::now();
    let total = grid.image_count();
    let mut buffer = ImageArrayBuffer::zeroed(grid.shape());
    let mut gaps = Vec::new();

    debug!(
        source = %source.describe(),
        columns = grid.columns(),
        rows = grid.rows(),
        width = grid.width(),
        height = grid.height(),
        generation = ticket.generation(),
        "starting light-field extraction"
    );

    for cell in grid.cells() {
        let location = grid.cell_location(cell.column, cell.row);
        let fetched = fetch_with_retry(source, &location, grid, options, ticket);

        if !ticket.is_current() {
            return Err(LoadError::Superseded {
                generation: ticket.generation(),
            });
        }

        match fetched {
            Ok(pixels) => buffer.layer_mut(cell.index).copy_from_slice(&pixels),
            Err(error) => match options.policy {
                FailurePolicy::Abort => {
                    return Err(LoadError::Fetch {
                        column: cell.column,
                        row: cell.row,
                        source: error,
                    });
                }
                FailurePolicy::Skip => {
                    warn!(%location, error = %error, "skipping view; leaving a zero-filled gap");
                    gaps.push(Gap {
                        column: cell.column,
                        row: cell.row,
                        location,
                        error,
                    });
                }
            },
        }

        let report = Progress::after(cell.index, total);
        debug!(percent = report.percent, "loading progress");
        progress(report);
    }

    if !ticket.is_current() {
        return Err(LoadError::Superseded {
            generation: ticket.generation(),
        });
    }

    let elapsed = started.elapsed();
    info!(
        views = total,
        gaps = gaps.len(),
        bytes = buffer.len(),
        elapsed_ms = elapsed.as_millis() as u64,
        "loaded light-field data"
    );

    Ok(LoadOutcome {
        buffer,
        gaps,
        elapsed,
    })
}

fn fetch_with_retry<S>(
    source: &S,
    location: &str,
    grid: &GridSpec,
    options: LoadOptions,
    ticket: &LoadTicket,
) -> Result<Vec<u8>, FetchError>
where
    S: ImageSource + ?Sized,
{
    let mut attempt = 0;
    loop {
        let result = source
            .fetch(location)
            .and_then(|bytes| decode_view(&bytes, location, grid.width(), grid.height()));
        match result {
            Ok(pixels) => return Ok(pixels),
            // A superseded load stops retrying; the caller reports it.
            Err(error) if !ticket.is_current() => return Err(error),
            Err(error) if attempt < options.retries => {
                attempt += 1;
                warn!(
                    %location,
                    attempt,
                    retries = options.retries,
                    error = %error,
                    "view fetch failed; retrying"
                );
                if !options.retry_delay.is_zero() {
                    thread::sleep(options.retry_delay);
                }
                if !ticket.is_current() {
                    return Err(error);
                }
            }
            Err(error) => return Err(error),
        }
    }
}

/// Decodes an encoded view and places it on a `width x height` RGBA canvas
/// anchored at the top-left corner. Larger images are cropped; smaller ones
/// leave transparent black around them.
pub fn decode_view(
    bytes: &[u8],
    location: &str,
    width: u32,
    height: u32,
) -> Result<Vec<u8>, FetchError> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|source| FetchError::Decode {
            location: location.to_string(),
            source,
        })?
        .to_rgba8();

    let (src_w, src_h) = decoded.dimensions();
    if (src_w, src_h) == (width, height) {
        return Ok(decoded.into_raw());
    }

    warn!(
        %location,
        expected_width = width,
        expected_height = height,
        actual_width = src_w,
        actual_height = src_h,
        "view resolution differs from grid; cropping/padding to fit"
    );

    let mut canvas = vec![0u8; width as usize * height as usize * BYTES_PER_PIXEL];
    let copy_w = src_w.min(width) as usize * BYTES_PER_PIXEL;
    let src_stride = src_w as usize * BYTES_PER_PIXEL;
    let dst_stride = width as usize * BYTES_PER_PIXEL;
    let raw = decoded.as_raw();
    for y in 0..src_h.min(height) as usize {
        let src = &raw[y * src_stride..y * src_stride + copy_w];
        canvas[y * dst_stride..y * dst_stride + copy_w].copy_from_slice(src);
    }
    Ok(canvas)
}
