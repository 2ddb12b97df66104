// src/renderer.rs

use crate::chart::{Chart, ChartData};
use crate::error::{Error, Result};
use crate::glyphs::{draw_text, fit_text, text_width, GLYPH_HEIGHT};
use crate::templates::ChartKind;
use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use palette::{FromColor, Lch, LinSrgb, Srgb};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;
use std::io::Cursor;
use std::path::Path;

const BACKGROUND: Rgb<u8> = Rgb([8, 8, 12]);
const AXIS: Rgb<u8> = Rgb([150, 150, 160]);
const GRID: Rgb<u8> = Rgb([30, 30, 38]);
const TEXT: Rgb<u8> = Rgb([220, 220, 225]);

const Y_TICKS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    pub width: u32,
    pub height: u32,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            width: 960,
            height: 600,
        }
    }
}

pub fn render(chart: &Chart, options: &RenderOptions) -> Result<RgbImage> {
    if options.width < 240 || options.height < 180 {
        return Err(Error::Execution(format!(
            "canvas {}x{} is too small",
            options.width, options.height
        )));
    }

    let mut image = RgbImage::from_pixel(options.width, options.height, BACKGROUND);
    let title = fit_text(&chart.title, options.width - 20, 2);
    let title_x = (options.width as i32 - text_width(&title, 2) as i32) / 2;
    draw_text(&mut image, title_x, 12, &title, 2, TEXT);

    let frame = Frame {
        left: 72,
        top: 44,
        right: options.width as i32 - 28,
        bottom: options.height as i32 - 48,
    };

    match &chart.data {
        ChartData::Categories(values) => match chart.kind {
            ChartKind::Pie => draw_pie(&mut image, &frame, values)?,
            ChartKind::Line => draw_line_chart(&mut image, &frame, values),
            ChartKind::Histogram => draw_bars(&mut image, &frame, values, false),
            _ => draw_bars(&mut image, &frame, values, true),
        },
        ChartData::Points(points) => {
            draw_points(&mut image, &frame, points, chart.kind == ChartKind::Bubble)
        }
        ChartData::Groups(groups) if chart.kind == ChartKind::Violin => {
            draw_violins(&mut image, &frame, groups)
        }
        ChartData::Groups(groups) => draw_boxes(&mut image, &frame, groups),
        ChartData::Grid { xs, ys, values } => draw_heatmap(&mut image, &frame, xs, ys, values),
    }

    if chart.kind != ChartKind::Pie {
        let x_label = fit_text(&chart.x_label, frame.width() as u32, 1);
        let label_x = frame.left + (frame.width() - text_width(&x_label, 1) as i32) / 2;
        draw_text(&mut image, label_x, options.height as i32 - 16, &x_label, 1, AXIS);
        draw_text(&mut image, 6, 28, &fit_text(&chart.y_label, 200, 1), 1, AXIS);
    }

    Ok(image)
}

pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image.clone()).write_to(&mut buffer, ImageOutputFormat::Png)?;
    Ok(buffer.into_inner())
}

pub fn render_png(chart: &Chart, options: &RenderOptions) -> Result<Vec<u8>> {
    encode_png(&render(chart, options)?)
}

pub fn save_png(chart: &Chart, path: &Path, options: &RenderOptions) -> Result<()> {
    render(chart, options)?.save(path)?;
    Ok(())
}

/// Plot area in pixel coordinates
struct Frame {
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
}

impl Frame {
    fn width(&self) -> i32 {
        self.right - self.left
    }

    fn height(&self) -> i32 {
        self.bottom - self.top
    }

    fn x(&self, value: f64, (min, max): (f64, f64)) -> i32 {
        self.left + ((value - min) / (max - min) * self.width() as f64).round() as i32
    }

    fn y(&self, value: f64, (min, max): (f64, f64)) -> i32 {
        self.bottom - ((value - min) / (max - min) * self.height() as f64).round() as i32
    }

    fn value_at_y(&self, py: i32, (min, max): (f64, f64)) -> f64 {
        min + (self.bottom - py) as f64 / self.height() as f64 * (max - min)
    }

    /// Horizontal slot width for `n` evenly spaced categories
    fn slot(&self, n: usize) -> f64 {
        self.width() as f64 / n.max(1) as f64
    }
}

fn value_range(values: impl Iterator<Item = f64>, include_zero: bool) -> (f64, f64) {
    let (mut min, mut max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !min.is_finite() || !max.is_finite() {
        return (0.0, 1.0);
    }
    if include_zero {
        min = min.min(0.0);
        max = max.max(0.0);
    }
    if min == max {
        max += 1.0;
        if !include_zero {
            min -= 1.0;
        }
    }
    (min, max)
}

fn tick_label(value: f64) -> String {
    if value.abs() >= 10_000.0 {
        format!("{:.0}K", value / 1000.0)
    } else if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{:.1}", value)
    }
}

fn draw_y_axis(image: &mut RgbImage, frame: &Frame, range: (f64, f64)) {
    for i in 0..=Y_TICKS {
        let value = range.0 + (range.1 - range.0) * i as f64 / Y_TICKS as f64;
        let y = frame.y(value, range);
        line(image, frame.left, y, frame.right, y, GRID);
        let label = tick_label(value);
        let x = frame.left - 6 - text_width(&label, 1) as i32;
        draw_text(image, x, y - GLYPH_HEIGHT as i32 / 2, &label, 1, AXIS);
    }
    line(image, frame.left, frame.top, frame.left, frame.bottom, AXIS);
    line(image, frame.left, frame.bottom, frame.right, frame.bottom, AXIS);
}

fn draw_x_ticks(image: &mut RgbImage, frame: &Frame, range: (f64, f64)) {
    for i in 0..=Y_TICKS {
        let value = range.0 + (range.1 - range.0) * i as f64 / Y_TICKS as f64;
        let x = frame.x(value, range);
        line(image, x, frame.top, x, frame.bottom, GRID);
        let label = tick_label(value);
        draw_text(image, x - text_width(&label, 1) as i32 / 2, frame.bottom + 8, &label, 1, AXIS);
    }
}

/// Category labels under evenly spaced slots, thinned out when crowded
fn draw_category_labels<'a>(
    image: &mut RgbImage,
    frame: &Frame,
    labels: impl Iterator<Item = &'a str>,
) {
    let labels: Vec<&str> = labels.collect();
    let slot = frame.slot(labels.len());
    let step = ((32.0 / slot).ceil() as usize).max(1);
    for (i, label) in labels.iter().enumerate().step_by(step) {
        let text = fit_text(label, (slot * step as f64) as u32 - 2, 1);
        let center = frame.left + (slot * (i as f64 + 0.5)) as i32;
        let x = center - text_width(&text, 1) as i32 / 2;
        draw_text(image, x, frame.bottom + 8, &text, 1, AXIS);
    }
}

fn draw_bars(image: &mut RgbImage, frame: &Frame, bars: &[(String, f64)], colorful: bool) {
    let range = value_range(bars.iter().map(|(_, v)| *v), true);
    draw_y_axis(image, frame, range);

    let colors = series_colors(bars.len());
    let slot = frame.slot(bars.len());
    let gap = if colorful { slot * 0.15 } else { slot * 0.04 };
    let zero = frame.y(0.0, range);

    for (i, (_, value)) in bars.iter().enumerate() {
        let x0 = frame.left + (slot * i as f64 + gap) as i32;
        let x1 = (frame.left + (slot * (i + 1) as f64 - gap) as i32 - 1).max(x0);
        let color = if colorful { colors[i] } else { heat_to_color(0.15) };
        fill_rect(image, x0, frame.y(*value, range), x1, zero, color);
    }
    draw_category_labels(image, frame, bars.iter().map(|(l, _)| l.as_str()));
}

fn draw_line_chart(image: &mut RgbImage, frame: &Frame, values: &[(String, f64)]) {
    let range = value_range(values.iter().map(|(_, v)| *v), true);
    draw_y_axis(image, frame, range);

    let color = series_colors(1)[0];
    let slot = frame.slot(values.len());
    let points: Vec<(i32, i32)> = values
        .iter()
        .enumerate()
        .map(|(i, (_, v))| (frame.left + (slot * (i as f64 + 0.5)) as i32, frame.y(*v, range)))
        .collect();

    for pair in points.windows(2) {
        line(image, pair[0].0, pair[0].1, pair[1].0, pair[1].1, color);
        line(image, pair[0].0, pair[0].1 - 1, pair[1].0, pair[1].1 - 1, color);
    }
    if points.len() <= 120 {
        for (x, y) in &points {
            fill_circle(image, *x, *y, 3, color);
        }
    }
    draw_category_labels(image, frame, values.iter().map(|(l, _)| l.as_str()));
}

fn draw_pie(image: &mut RgbImage, frame: &Frame, slices: &[(String, f64)]) -> Result<()> {
    let total: f64 = slices.iter().map(|(_, v)| v).sum();
    if total <= 0.0 {
        return Err(Error::Execution("pie chart has nothing to plot".to_string()));
    }

    let colors = series_colors(slices.len());
    let mut bounds = Vec::with_capacity(slices.len());
    let mut acc = 0.0;
    for (_, value) in slices {
        acc += value / total;
        bounds.push(acc);
    }

    let legend_width = 240;
    let diameter = (frame.width() - legend_width).min(frame.height()).max(20);
    let radius = diameter / 2;
    let (cx, cy) = (frame.left + radius, frame.top + frame.height() / 2);

    for py in (cy - radius)..=(cy + radius) {
        for px in (cx - radius)..=(cx + radius) {
            let (dx, dy) = ((px - cx) as f64, (py - cy) as f64);
            if dx * dx + dy * dy > (radius * radius) as f64 {
                continue;
            }
            // Clockwise from twelve o'clock
            let fraction = dx.atan2(-dy).rem_euclid(2.0 * PI) / (2.0 * PI);
            let idx = bounds.iter().position(|b| fraction < *b).unwrap_or(slices.len() - 1);
            put(image, px, py, colors[idx]);
        }
    }

    let legend_x = cx + radius + 30;
    let mut legend_y = frame.top;
    for ((label, value), color) in slices.iter().zip(&colors) {
        if legend_y + 12 > frame.bottom {
            break;
        }
        fill_rect(image, legend_x, legend_y, legend_x + 9, legend_y + 9, *color);
        let text = format!("{} {:.1}%", label, value / total * 100.0);
        let max = (image.width() as i32 - legend_x - 20).max(0) as u32;
        draw_text(image, legend_x + 16, legend_y + 2, &fit_text(&text, max, 1), 1, TEXT);
        legend_y += 16;
    }
    Ok(())
}

fn draw_points(image: &mut RgbImage, frame: &Frame, points: &[(f64, f64, f64)], bubble: bool) {
    let x_range = value_range(points.iter().map(|p| p.0), false);
    let y_range = value_range(points.iter().map(|p| p.1), false);
    draw_y_axis(image, frame, y_range);
    draw_x_ticks(image, frame, x_range);

    let max_size = points.iter().map(|p| p.2).fold(0.0, f64::max);
    let colors = series_colors(2);
    for (x, y, size) in points {
        let radius = if bubble && max_size > 0.0 {
            3 + (17.0 * (size.max(0.0) / max_size).sqrt()) as i32
        } else {
            3
        };
        let (cx, cy) = (frame.x(*x, x_range), frame.y(*y, y_range));
        fill_circle(image, cx, cy, radius, colors[bubble as usize]);
    }
}

fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }
    let pos = q * (sorted.len() - 1) as f64;
    let (lo, hi) = (pos.floor() as usize, pos.ceil() as usize);
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

fn sorted_samples(samples: &[f64]) -> Vec<f64> {
    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted
}

fn draw_boxes(image: &mut RgbImage, frame: &Frame, groups: &[(String, Vec<f64>)]) {
    let range = value_range(groups.iter().flat_map(|(_, v)| v.iter().copied()), false);
    draw_y_axis(image, frame, range);

    let colors = series_colors(groups.len());
    let slot = frame.slot(groups.len());
    for (i, (_, samples)) in groups.iter().enumerate() {
        if samples.is_empty() {
            continue;
        }
        let sorted = sorted_samples(samples);
        let center = frame.left + (slot * (i as f64 + 0.5)) as i32;
        let half = ((slot * 0.3) as i32).max(2);

        let (low, q1, median, q3, high) = (
            sorted[0],
            quantile(&sorted, 0.25),
            quantile(&sorted, 0.5),
            quantile(&sorted, 0.75),
            sorted[sorted.len() - 1],
        );
        line(image, center, frame.y(low, range), center, frame.y(high, range), AXIS);
        let (whisker_left, whisker_right) = (center - half / 2, center + half / 2);
        line(image, whisker_left, frame.y(low, range), whisker_right, frame.y(low, range), AXIS);
        line(image, whisker_left, frame.y(high, range), whisker_right, frame.y(high, range), AXIS);
        let (top, bottom) = (frame.y(q3, range), frame.y(q1, range));
        fill_rect(image, center - half, top, center + half, bottom, colors[i]);
        let m = frame.y(median, range);
        line(image, center - half, m, center + half, m, TEXT);
    }
    draw_category_labels(image, frame, groups.iter().map(|(l, _)| l.as_str()));
}

/// Gaussian kernel density, Silverman bandwidth
fn density(sorted: &[f64], at: f64) -> f64 {
    let n = sorted.len() as f64;
    let mean = sorted.iter().sum::<f64>() / n;
    let std = (sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
    let spread = sorted[sorted.len() - 1] - sorted[0];
    let bandwidth = if std > 0.0 {
        1.06 * std * n.powf(-0.2)
    } else if spread > 0.0 {
        spread * 0.1
    } else {
        1.0
    };
    sorted
        .iter()
        .map(|v| (-0.5 * ((at - v) / bandwidth).powi(2)).exp())
        .sum::<f64>()
}

fn draw_violins(image: &mut RgbImage, frame: &Frame, groups: &[(String, Vec<f64>)]) {
    let range = value_range(groups.iter().flat_map(|(_, v)| v.iter().copied()), false);
    draw_y_axis(image, frame, range);

    let colors = series_colors(groups.len());
    let slot = frame.slot(groups.len());
    for (i, (_, samples)) in groups.iter().enumerate() {
        if samples.is_empty() {
            continue;
        }
        let sorted = sorted_samples(samples);
        let center = frame.left + (slot * (i as f64 + 0.5)) as i32;
        let profile: Vec<(i32, f64)> = (frame.top..=frame.bottom)
            .map(|py| (py, density(&sorted, frame.value_at_y(py, range))))
            .collect();
        let peak = profile.iter().map(|(_, d)| *d).fold(0.0, f64::max);
        if peak <= 0.0 {
            continue;
        }
        for (py, d) in profile {
            let half = (d / peak * slot * 0.45) as i32;
            if half > 0 {
                line(image, center - half, py, center + half, py, colors[i]);
            }
        }
        let m = frame.y(quantile(&sorted, 0.5), range);
        line(image, center - 4, m, center + 4, m, TEXT);
    }
    draw_category_labels(image, frame, groups.iter().map(|(l, _)| l.as_str()));
}

fn draw_heatmap(
    image: &mut RgbImage,
    frame: &Frame,
    xs: &[String],
    ys: &[String],
    values: &[Vec<f64>],
) {
    let peak = values.iter().flatten().copied().fold(0.0, f64::max);
    let cell_w = frame.width() as f64 / xs.len().max(1) as f64;
    let cell_h = frame.height() as f64 / ys.len().max(1) as f64;

    for (row, row_values) in values.iter().enumerate() {
        for (col, value) in row_values.iter().enumerate() {
            let heat = if peak > 0.0 { value / peak } else { 0.0 };
            fill_rect(
                image,
                frame.left + (cell_w * col as f64) as i32,
                frame.top + (cell_h * row as f64) as i32,
                frame.left + (cell_w * (col + 1) as f64) as i32 - 1,
                frame.top + (cell_h * (row + 1) as f64) as i32 - 1,
                heat_to_color(heat as f32),
            );
        }
    }

    let row_step = ((10.0 / cell_h).ceil() as usize).max(1);
    for (row, label) in ys.iter().enumerate().step_by(row_step) {
        let text = fit_text(label, frame.left as u32 - 10, 1);
        let y = frame.top + (cell_h * (row as f64 + 0.5)) as i32 - GLYPH_HEIGHT as i32 / 2;
        draw_text(image, frame.left - 6 - text_width(&text, 1) as i32, y, &text, 1, AXIS);
    }
    draw_category_labels(image, frame, xs.iter().map(String::as_str));
}

fn put(image: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < image.width() && (y as u32) < image.height() {
        image.put_pixel(x as u32, y as u32, color);
    }
}

fn fill_rect(image: &mut RgbImage, x0: i32, y0: i32, x1: i32, y1: i32, color: Rgb<u8>) {
    for y in y0.min(y1)..=y0.max(y1) {
        for x in x0.min(x1)..=x0.max(x1) {
            put(image, x, y, color);
        }
    }
}

fn fill_circle(image: &mut RgbImage, cx: i32, cy: i32, radius: i32, color: Rgb<u8>) {
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy <= radius * radius {
                put(image, cx + dx, cy + dy, color);
            }
        }
    }
}

// Bresenham
fn line(image: &mut RgbImage, x0: i32, y0: i32, x1: i32, y1: i32, color: Rgb<u8>) {
    let (dx, dy) = ((x1 - x0).abs(), -(y1 - y0).abs());
    let (sx, sy) = (if x0 < x1 { 1 } else { -1 }, if y0 < y1 { 1 } else { -1 });
    let (mut x, mut y, mut err) = (x0, y0, dx + dy);
    loop {
        put(image, x, y, color);
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

/// Blue-to-orange gradient, `heat` in `0.0..=1.0`
pub fn heat_to_color(heat: f32) -> Rgb<u8> {
    let lch_colors = [
        Lch::new(20.0f32, 30.0f32, 250.0f32), // Dark Blue
        Lch::new(40.0f32, 40.0f32, 260.0f32), // Blue
        Lch::new(95.0f32, 35.0f32, 90.0f32),  // Light Yellow
        Lch::new(75.0f32, 80.0f32, 50.0f32),  // Orange
        Lch::new(65.0f32, 100.0f32, 30.0f32), // Red-Orange
    ];
    let stops: Vec<LinSrgb<f32>> = lch_colors.into_iter().map(LinSrgb::from_color).collect();

    let scaled_pos = heat.clamp(0.0, 1.0) * (stops.len() - 1) as f32;
    let idx1 = scaled_pos.floor() as usize;
    let idx2 = (idx1 + 1).min(stops.len() - 1);
    let t = scaled_pos.fract();

    let (c1, c2) = (stops[idx1], stops[idx2]);
    let mixed = LinSrgb::new(
        c1.red + (c2.red - c1.red) * t,
        c1.green + (c2.green - c1.green) * t,
        c1.blue + (c2.blue - c1.blue) * t,
    );
    to_rgb(Srgb::from_linear(mixed))
}

/// One stable color per series; the same count always yields the same colors
pub fn series_colors(count: usize) -> Vec<Rgb<u8>> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..count)
        .map(|_| {
            let hue = rng.gen_range(0.0f32..360.0f32);
            to_rgb(Srgb::from_color(Lch::new(70.0f32, 80.0f32, hue)))
        })
        .collect()
}

fn to_rgb(color: Srgb<f32>) -> Rgb<u8> {
    let (r, g, b) = color.into_components();
    Rgb([
        (r.clamp(0.0, 1.0) * 255.0) as u8,
        (g.clamp(0.0, 1.0) * 255.0) as u8,
        (b.clamp(0.0, 1.0) * 255.0) as u8,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chart(kind: ChartKind, data: ChartData) -> Chart {
        Chart {
            kind,
            title: "Commits by author".to_string(),
            x_label: "author".to_string(),
            y_label: "commits".to_string(),
            data,
        }
    }

    fn categories() -> ChartData {
        ChartData::Categories(vec![("ana".into(), 3.0), ("bo".into(), 1.0), ("cy".into(), 2.0)])
    }

    fn groups() -> ChartData {
        ChartData::Groups(vec![("ana".into(), vec![1.0, 4.0, 9.0, 3.0]), ("bo".into(), vec![2.0])])
    }

    fn drawn_pixels(image: &RgbImage) -> usize {
        image.pixels().filter(|p| **p != BACKGROUND).count()
    }

    #[test]
    fn every_kind_draws_something() {
        let options = RenderOptions::default();
        let cases = vec![
            chart(ChartKind::Pie, categories()),
            chart(ChartKind::Bar, categories()),
            chart(ChartKind::Line, categories()),
            chart(ChartKind::Histogram, categories()),
            chart(ChartKind::Scatter, ChartData::Points(vec![(1.0, 2.0, 1.0), (3.0, 1.0, 1.0)])),
            chart(ChartKind::Bubble, ChartData::Points(vec![(1.0, 2.0, 5.0), (3.0, 1.0, 1.0)])),
            chart(ChartKind::Box, groups()),
            chart(ChartKind::Violin, groups()),
            chart(
                ChartKind::Heatmap,
                ChartData::Grid {
                    xs: vec!["9".into(), "10".into()],
                    ys: vec!["Mon".into()],
                    values: vec![vec![1.0, 0.0]],
                },
            ),
        ];
        for chart in cases {
            let image = render(&chart, &options).unwrap();
            assert_eq!(image.dimensions(), (960, 600));
            assert!(drawn_pixels(&image) > 1000, "{:?} drew too little", chart.kind);
        }
    }

    #[test]
    fn png_bytes_have_signature() {
        let png =
            render_png(&chart(ChartKind::Bar, categories()), &RenderOptions::default()).unwrap();
        assert_eq!(&png[..8], &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);
    }

    #[test]
    fn zero_pie_is_execution_error() {
        let zero = chart(ChartKind::Pie, ChartData::Categories(vec![("a".into(), 0.0)]));
        assert!(matches!(render(&zero, &RenderOptions::default()), Err(Error::Execution(_))));
    }

    #[test]
    fn tiny_canvas_is_rejected() {
        let options = RenderOptions { width: 10, height: 10 };
        assert!(render(&chart(ChartKind::Bar, categories()), &options).is_err());
    }

    #[test]
    fn colors_are_deterministic() {
        assert_eq!(series_colors(4), series_colors(4));
        assert_eq!(series_colors(4)[..2], series_colors(2)[..]);
        assert_ne!(heat_to_color(0.0), heat_to_color(1.0));
        assert_eq!(heat_to_color(2.0), heat_to_color(1.0));
    }

    #[test]
    fn quantiles_interpolate() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile(&sorted, 0.5), 2.5);
        assert_eq!(quantile(&sorted, 0.0), 1.0);
        assert_eq!(quantile(&[7.0], 0.75), 7.0);
    }
}
