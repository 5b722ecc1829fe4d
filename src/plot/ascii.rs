//! ASCII plotting of a forecast for terminal output.
//!
//! Fixed-size grid, deterministic output. Elements:
//! - forecast `yhat`: `-` line
//! - interval bounds: `.`
//! - observed consumption: `o`

use crate::models::Forecast;

/// Render `forecast` over its rows, with `observed` overlaid when given.
pub fn render_forecast_plot(
    forecast: &Forecast,
    observed: Option<&[f64]>,
    width: usize,
    height: usize,
) -> String {
    let (Some(first), Some(last)) = (forecast.ds.first(), forecast.ds.last()) else {
        return "Plot: no data\n".to_string();
    };
    let width = width.max(10);
    let height = height.max(5);
    let observed = observed.filter(|o| o.len() == forecast.len());

    let x_max = (forecast.len() as f64 - 1.0).max(1.0);
    let series = |values: &[f64]| -> Vec<(f64, f64)> {
        values.iter().enumerate().map(|(i, v)| (i as f64, *v)).collect()
    };
    let yhat = series(&forecast.yhat);
    let lower = series(&forecast.yhat_lower);
    let upper = series(&forecast.yhat_upper);

    let all = forecast
        .yhat_lower
        .iter()
        .chain(&forecast.yhat_upper)
        .chain(&forecast.yhat)
        .chain(observed.unwrap_or(&[]));
    let (y_min, y_max) = y_range(all).unwrap_or((0.0, 1.0));
    let (y_min, y_max) = pad_range(y_min, y_max, 0.05);

    let mut grid = vec![vec![' '; width]; height];
    draw_curve(&mut grid, &yhat, x_max, y_min, y_max, '-');
    draw_curve(&mut grid, &lower, x_max, y_min, y_max, '.');
    draw_curve(&mut grid, &upper, x_max, y_min, y_max, '.');

    if let Some(observed) = observed {
        for (i, y) in observed.iter().enumerate() {
            let x = map_x(i as f64, x_max, width);
            grid[map_y(*y, y_min, y_max, height)][x] = 'o';
        }
    }

    let mut out = String::new();
    out.push_str(&format!(
        "Plot: {} -> {} | y=[{y_min:.2}, {y_max:.2}] MW\n",
        first.format("%Y-%m-%d %H:%M"),
        last.format("%Y-%m-%d %H:%M"),
    ));
    for row in grid {
        out.push_str(&row.into_iter().collect::<String>());
        out.push('\n');
    }
    out
}

fn y_range<'a>(values: impl Iterator<Item = &'a f64>) -> Option<(f64, f64)> {
    let mut min_y = f64::INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for &y in values {
        min_y = min_y.min(y);
        max_y = max_y.max(y);
    }
    if min_y.is_finite() && max_y.is_finite() && max_y > min_y {
        Some((min_y, max_y))
    } else {
        None
    }
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(x: f64, x_max: f64, width: usize) -> usize {
    let width = width.max(2);
    let u = (x / x_max).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    let height = height.max(2);
    let u = ((y - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
    // y=top is max -> row 0
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

fn draw_curve(grid: &mut [Vec<char>], curve: &[(f64, f64)], x_max: f64, y_min: f64, y_max: f64, ch: char) {
    let height = grid.len();
    let width = grid[0].len();

    let mut prev = None;
    for &(x, y) in curve {
        let col = map_x(x, x_max, width);
        let row = map_y(y, y_min, y_max, height);
        match prev {
            Some((x0, y0)) => draw_line(grid, x0, y0, col, row, ch),
            None if grid[row][col] == ' ' => grid[row][col] = ch,
            None => {}
        }
        prev = Some((col, row));
    }
}

/// Integer line drawing (Bresenham-ish); only blank cells are written.
fn draw_line(grid: &mut [Vec<char>], x0: usize, y0: usize, x1: usize, y1: usize, ch: char) {
    let mut x0 = x0 as isize;
    let mut y0 = y0 as isize;
    let x1 = x1 as isize;
    let y1 = y1 as isize;

    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if y0 >= 0
            && (y0 as usize) < grid.len()
            && x0 >= 0
            && (x0 as usize) < grid[0].len()
            && grid[y0 as usize][x0 as usize] == ' '
        {
            grid[y0 as usize][x0 as usize] = ch;
        }

        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}
