use std::path::Path;

use plotters::coord::Shift;
use plotters::prelude::*;

use crate::error::{Ft8Error, Result};
use crate::monitor::Waterfall;

fn plot_error<E: std::fmt::Display>(e: E) -> Ft8Error {
    Ft8Error::Plot(e.to_string())
}

/// Paints every waterfall cell, time downwards and frequency to the right,
/// oversampled rows and columns interleaved.
pub fn plot_waterfall<DB: DrawingBackend>(
    wf: &Waterfall,
    drawing_area: &DrawingArea<DB, Shift>,
) -> Result<()> {
    let rows = wf.num_blocks * wf.time_osr;
    let cols = wf.num_bins * wf.freq_osr;
    if rows == 0 || cols == 0 {
        return Ok(());
    }

    let cells = drawing_area.split_evenly((rows, cols));
    let highest = wf.mag.iter().copied().max().unwrap_or(0).max(1) as f64;
    let color_scale = colorous::MAGMA;

    for (i, cell) in cells.iter().enumerate() {
        let (row, col) = (i / cols, i % cols);
        let idx = wf.index(
            row / wf.time_osr,
            row % wf.time_osr,
            col % wf.freq_osr,
            col / wf.freq_osr,
        );
        let density = wf.mag[idx] as f64 / highest;
        let color = color_scale.eval_continuous(density);
        cell.fill(&RGBColor(color.r, color.g, color.b)).map_err(plot_error)?;
    }
    Ok(())
}

/// Writes the waterfall to an image file.
pub fn render_waterfall(wf: &Waterfall, path: &Path, size: (u32, u32)) -> Result<()> {
    let root = BitMapBackend::new(path, size).into_drawing_area();
    root.fill(&BLACK).map_err(plot_error)?;
    plot_waterfall(wf, &root)?;
    root.present().map_err(plot_error)
}
