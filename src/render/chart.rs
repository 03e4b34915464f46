//! Time-series chart, drawn as SVG and rasterised to PNG
//!
//! One line per entity over a shared time axis. The time axis is labelled on
//! several tracks at once: UTC below the plot, Philippines time above it and
//! three more zones stacked below UTC. All tracks use the same tick
//! positions; only the labels are converted.
//!
//! Lines are told apart by combining color, dash pattern and marker. The
//! three palettes have different lengths and are cycled independently, so
//! combinations repeat only after 30 entities.

use std::fmt::Write;
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Duration, TimeZone, Utc};
use chrono_tz::{America, Asia, Tz};
use resvg::{tiny_skia, usvg};
use thiserror::Error;
use tracing::debug;

use crate::discord::Attachment;
use crate::history::{Observation, SeriesHistory};
use crate::util::escape_xml;

const WIDTH: f64 = 1400.0;
const HEIGHT: f64 = 1000.0;
const PLOT_LEFT: f64 = 90.0;
const PLOT_RIGHT: f64 = WIDTH - 40.0;
const PLOT_TOP: f64 = 130.0;
const PLOT_BOTTOM: f64 = HEIGHT - 270.0;
const TRACK_SPACING: f64 = 62.0;
const MAX_TIME_TICKS: i64 = 8;
const Y_TICKS: usize = 5;

const COLORS: [&str; 15] = [
    "#e41a1c", "#377eb8", "#4daf4a", "#984ea3", "#ff7f00", "#ffff33", "#a65628", "#f781bf",
    "#999999", "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b",
];

/// SVG `stroke-dasharray` values; `None` is a solid line.
const DASHES: [Option<&str>; 10] = [
    None,
    Some("12,6"),
    Some("12,4,3,4"),
    Some("3,4"),
    None,
    Some("12,6"),
    Some("12,4,3,4"),
    Some("3,4"),
    None,
    Some("12,6"),
];

const MARKERS: [Marker; 10] = [
    Marker::Circle,
    Marker::Square,
    Marker::TriangleUp,
    Marker::Diamond,
    Marker::TriangleDown,
    Marker::TriangleLeft,
    Marker::TriangleRight,
    Marker::Pentagon,
    Marker::Star,
    Marker::Hexagon,
];

/// Candidate distances between time ticks, in seconds.
const TICK_STEPS: [i64; 15] = [
    60,
    5 * 60,
    15 * 60,
    30 * 60,
    3600,
    3 * 3600,
    6 * 3600,
    12 * 3600,
    86400,
    2 * 86400,
    7 * 86400,
    14 * 86400,
    30 * 86400,
    90 * 86400,
    365 * 86400,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Circle,
    Square,
    TriangleUp,
    Diamond,
    TriangleDown,
    TriangleLeft,
    TriangleRight,
    Pentagon,
    Star,
    Hexagon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesStyle {
    pub color: &'static str,
    pub dash: Option<&'static str>,
    pub marker: Marker,
}

/// Style of the `index`-th line, cycling through each palette.
pub fn series_style(index: usize) -> SeriesStyle {
    SeriesStyle {
        color: COLORS[index % COLORS.len()],
        dash: DASHES[index % DASHES.len()],
        marker: MARKERS[index % MARKERS.len()],
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TimezoneTrack {
    pub label: &'static str,
    pub tz: Tz,
    pub color: &'static str,
}

pub const PRIMARY_TRACK: TimezoneTrack = TimezoneTrack {
    label: "UTC",
    tz: chrono_tz::UTC,
    color: "#333333",
};

pub const TOP_TRACK: TimezoneTrack = TimezoneTrack {
    label: "Philippines (GMT+8)",
    tz: Asia::Manila,
    color: "#2E8B57",
};

pub const LOWER_TRACKS: [TimezoneTrack; 3] = [
    TimezoneTrack {
        label: "US Eastern (EST/EDT)",
        tz: America::New_York,
        color: "#4169E1",
    },
    TimezoneTrack {
        label: "Brazil (GMT-3)",
        tz: America::Sao_Paulo,
        color: "#FF6347",
    },
    TimezoneTrack {
        label: "Indonesia (GMT+9)",
        tz: Asia::Jayapura,
        color: "#8A2BE2",
    },
];

#[derive(Debug, Clone)]
pub struct ChartStyle {
    pub title: String,
    pub y_label: String,
    pub filename: String,
}

impl ChartStyle {
    pub fn new(title: impl ToString, y_label: impl ToString, filename: impl ToString) -> Self {
        Self {
            title: title.to_string(),
            y_label: y_label.to_string(),
            filename: filename.to_string(),
        }
    }
}

struct TimeScale {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeScale {
    fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        if start == end {
            let pad = Duration::minutes(30);
            return Self {
                start: start - pad,
                end: end + pad,
            };
        }
        Self { start, end }
    }

    fn span_secs(&self) -> f64 {
        (self.end - self.start).num_milliseconds() as f64 / 1000.0
    }

    fn x(&self, at: DateTime<Utc>) -> f64 {
        let offset = (at - self.start).num_milliseconds() as f64 / 1000.0;
        PLOT_LEFT + offset / self.span_secs() * (PLOT_RIGHT - PLOT_LEFT)
    }
}

struct ValueScale {
    max: f64,
}

impl ValueScale {
    fn y(&self, value: f64) -> f64 {
        PLOT_BOTTOM - value / self.max * (PLOT_BOTTOM - PLOT_TOP)
    }
}

/// Smallest of 1, 2, 2.5, 5, 10 times a power of ten that is `>= value`.
pub fn nice_ceiling(value: f64) -> f64 {
    if value <= 1.0 {
        return 1.0;
    }

    let magnitude = 10f64.powf(value.log10().floor());
    [1.0, 2.0, 2.5, 5.0, 10.0]
        .iter()
        .map(|factor| factor * magnitude)
        .find(|candidate| *candidate >= value)
        .unwrap_or(10.0 * magnitude)
}

/// Tick positions between `start` and `end`, aligned to a multiple of the
/// chosen step in UTC. Returns the ticks and the step in seconds.
pub fn time_ticks(start: DateTime<Utc>, end: DateTime<Utc>) -> (Vec<DateTime<Utc>>, i64) {
    let span = (end - start).num_seconds().max(1);
    let step = TICK_STEPS
        .iter()
        .copied()
        .find(|step| span / step <= MAX_TIME_TICKS)
        .unwrap_or(TICK_STEPS[TICK_STEPS.len() - 1]);

    let first = start.timestamp().div_euclid(step) * step
        + if start.timestamp().rem_euclid(step) == 0 { 0 } else { step };

    let ticks = (0..)
        .map(|i| first + i * step)
        .take_while(|secs| *secs <= end.timestamp())
        .filter_map(|secs| Utc.timestamp_opt(secs, 0).single())
        .collect();

    (ticks, step)
}

fn tick_label(at: DateTime<Utc>, tz: Tz, step: i64) -> String {
    let local = at.with_timezone(&tz);
    if step >= 86400 {
        local.format("%Y-%m-%d").to_string()
    } else {
        local.format("%m-%d %H:%M").to_string()
    }
}

fn format_value(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.1}")
    }
}

fn regular_polygon(cx: f64, cy: f64, radius: f64, sides: usize, rotation_deg: f64) -> String {
    (0..sides)
        .map(|i| {
            let angle = (rotation_deg + 360.0 * i as f64 / sides as f64).to_radians();
            format!("{:.1},{:.1}", cx + radius * angle.cos(), cy + radius * angle.sin())
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn star(cx: f64, cy: f64, radius: f64) -> String {
    (0..10)
        .map(|i| {
            let r = if i % 2 == 0 { radius } else { radius * 0.45 };
            let angle = (-90.0 + 36.0 * i as f64).to_radians();
            format!("{:.1},{:.1}", cx + r * angle.cos(), cy + r * angle.sin())
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn marker_svg(marker: Marker, x: f64, y: f64, color: &str) -> String {
    const R: f64 = 5.0;
    let attrs = format!(r#"fill="white" stroke="{color}" stroke-width="2""#);
    let points = match marker {
        Marker::Circle => {
            return format!(r#"<circle cx="{x:.1}" cy="{y:.1}" r="{R}" {attrs}/>"#);
        }
        Marker::Square => regular_polygon(x, y, R * 1.2, 4, 45.0),
        Marker::TriangleUp => regular_polygon(x, y, R * 1.2, 3, -90.0),
        Marker::Diamond => regular_polygon(x, y, R * 1.2, 4, -90.0),
        Marker::TriangleDown => regular_polygon(x, y, R * 1.2, 3, 90.0),
        Marker::TriangleLeft => regular_polygon(x, y, R * 1.2, 3, 180.0),
        Marker::TriangleRight => regular_polygon(x, y, R * 1.2, 3, 0.0),
        Marker::Pentagon => regular_polygon(x, y, R * 1.1, 5, -90.0),
        Marker::Star => star(x, y, R * 1.4),
        Marker::Hexagon => regular_polygon(x, y, R * 1.1, 6, 0.0),
    };
    format!(r#"<polygon points="{points}" {attrs}/>"#)
}

fn dash_attr(dash: Option<&str>) -> String {
    dash.map(|d| format!(r#" stroke-dasharray="{d}""#))
        .unwrap_or_default()
}

fn draw_track(
    svg: &mut String,
    track: &TimezoneTrack,
    axis_y: f64,
    above: bool,
    ticks: &[DateTime<Utc>],
    step: i64,
    scale: &TimeScale,
) {
    let (tick_end, label_y, title_y) = if above {
        (axis_y - 6.0, axis_y - 12.0, axis_y - 36.0)
    } else {
        (axis_y + 6.0, axis_y + 22.0, axis_y + 46.0)
    };

    let _ = writeln!(
        svg,
        r#"<g class="track" data-tz="{}"><line x1="{PLOT_LEFT}" y1="{axis_y}" x2="{PLOT_RIGHT}" y2="{axis_y}" stroke="{color}"/>"#,
        track.tz.name(),
        color = track.color
    );
    for tick in ticks {
        let x = scale.x(*tick);
        let _ = writeln!(
            svg,
            r#"<line x1="{x:.1}" y1="{axis_y}" x2="{x:.1}" y2="{tick_end}" stroke="{color}"/><text x="{x:.1}" y="{label_y}" font-size="12" text-anchor="middle" fill="{color}">{label}</text>"#,
            color = track.color,
            label = tick_label(*tick, track.tz, step)
        );
    }
    let _ = writeln!(
        svg,
        r#"<text x="{x:.1}" y="{title_y}" font-size="14" font-weight="bold" text-anchor="middle" fill="{color}">{label}</text></g>"#,
        x = (PLOT_LEFT + PLOT_RIGHT) / 2.0,
        color = track.color,
        label = escape_xml(track.label)
    );
}

fn draw_legend(svg: &mut String, entities: &[&str]) {
    let columns = entities.len().min(3);
    let rows = entities.len().div_ceil(columns);
    let column_width = 190.0;
    let row_height = 22.0;
    let x0 = PLOT_LEFT + 12.0;
    let y0 = PLOT_TOP + 12.0;

    let _ = writeln!(
        svg,
        r##"<g class="legend"><rect x="{x0}" y="{y0}" width="{w}" height="{h}" fill="white" fill-opacity="0.9" stroke="#cccccc" stroke-width="0.5"/>"##,
        w = columns as f64 * column_width + 12.0,
        h = rows as f64 * row_height + 10.0
    );
    for (index, entity) in entities.iter().enumerate() {
        let style = series_style(index);
        let x = x0 + 8.0 + (index % columns) as f64 * column_width;
        let y = y0 + 16.0 + (index / columns) as f64 * row_height;
        let _ = writeln!(
            svg,
            r#"<line x1="{x:.1}" y1="{y:.1}" x2="{x2:.1}" y2="{y:.1}" stroke="{color}" stroke-width="2.5"{dash}/>{marker}<text x="{tx:.1}" y="{ty:.1}" font-size="12">{name}</text>"#,
            x2 = x + 36.0,
            color = style.color,
            dash = dash_attr(style.dash),
            marker = marker_svg(style.marker, x + 18.0, y, style.color),
            tx = x + 44.0,
            ty = y + 4.0,
            name = escape_xml(entity)
        );
    }
    svg.push_str("</g>\n");
}

#[derive(Debug, Error)]
pub enum ChartError {
    #[error("chart SVG is invalid: {0}")]
    Svg(#[from] usvg::Error),

    #[error("cannot allocate a {width}x{height} canvas")]
    Canvas { width: u32, height: u32 },

    #[error("PNG encoding failed: {0}")]
    Encode(String),
}

/// Render `history` as a PNG line chart.
pub fn render_chart(history: &SeriesHistory, style: &ChartStyle) -> Result<Attachment, ChartError> {
    let svg = render_svg(history, style);
    Ok(Attachment {
        filename: style.filename.clone(),
        content_type: "image/png".to_string(),
        bytes: rasterize(&svg)?,
    })
}

/// System fonts, loaded once per process.
fn fonts() -> Arc<usvg::fontdb::Database> {
    static FONTS: OnceLock<Arc<usvg::fontdb::Database>> = OnceLock::new();
    FONTS
        .get_or_init(|| {
            let mut db = usvg::fontdb::Database::new();
            db.load_system_fonts();
            debug!("loaded {} font faces", db.len());
            Arc::new(db)
        })
        .clone()
}

fn rasterize(svg: &str) -> Result<Vec<u8>, ChartError> {
    let options = usvg::Options {
        fontdb: fonts(),
        ..Default::default()
    };
    let tree = usvg::Tree::from_str(svg, &options)?;

    let size = tree.size().to_int_size();
    let mut pixmap = tiny_skia::Pixmap::new(size.width(), size.height()).ok_or(ChartError::Canvas {
        width: size.width(),
        height: size.height(),
    })?;
    resvg::render(&tree, tiny_skia::Transform::default(), &mut pixmap.as_mut());

    pixmap.encode_png().map_err(|e| ChartError::Encode(e.to_string()))
}

/// Render `history` as an SVG line chart.
pub fn render_svg(history: &SeriesHistory, style: &ChartStyle) -> String {
    let mut svg = String::new();
    let _ = writeln!(
        svg,
        r##"<svg xmlns="http://www.w3.org/2000/svg" width="{WIDTH}" height="{HEIGHT}" viewBox="0 0 {WIDTH} {HEIGHT}" font-family="sans-serif">"##
    );
    let _ = writeln!(svg, r##"<rect width="100%" height="100%" fill="white"/>"##);
    let _ = writeln!(
        svg,
        r##"<rect x="{PLOT_LEFT}" y="{PLOT_TOP}" width="{w}" height="{h}" fill="#f8f9fa" stroke="#cccccc"/>"##,
        w = PLOT_RIGHT - PLOT_LEFT,
        h = PLOT_BOTTOM - PLOT_TOP
    );
    let _ = writeln!(
        svg,
        r##"<text x="{x}" y="32" font-size="22" font-weight="bold" text-anchor="middle" fill="#333333">{title}</text>"##,
        x = WIDTH / 2.0,
        title = escape_xml(&style.title)
    );
    let _ = writeln!(
        svg,
        r##"<text x="24" y="{y}" font-size="14" font-weight="bold" text-anchor="middle" transform="rotate(-90 24 {y})">{label}</text>"##,
        y = (PLOT_TOP + PLOT_BOTTOM) / 2.0,
        label = escape_xml(&style.y_label)
    );

    let observations = history.observations();
    let (Some(start), Some(end)) = (
        observations.iter().map(|o| o.date).min(),
        observations.iter().map(|o| o.date).max(),
    ) else {
        let _ = writeln!(
            svg,
            r##"<text x="{x}" y="{y}" font-size="18" text-anchor="middle" fill="#999999">No data</text>"##,
            x = WIDTH / 2.0,
            y = (PLOT_TOP + PLOT_BOTTOM) / 2.0
        );
        svg.push_str("</svg>\n");
        return svg;
    };

    let time = TimeScale::new(start, end);
    let max_metric = observations.iter().map(|o| o.metric).max().unwrap_or(0) as f64;
    let values = ValueScale {
        max: nice_ceiling(max_metric),
    };
    let (ticks, step) = time_ticks(time.start, time.end);

    // grid and value axis
    for i in 0..=Y_TICKS {
        let value = values.max * i as f64 / Y_TICKS as f64;
        let y = values.y(value);
        let _ = writeln!(
            svg,
            r##"<line x1="{PLOT_LEFT}" y1="{y:.1}" x2="{PLOT_RIGHT}" y2="{y:.1}" stroke="#000000" stroke-opacity="0.1"/><text x="{tx}" y="{ty:.1}" font-size="12" text-anchor="end">{label}</text>"##,
            tx = PLOT_LEFT - 8.0,
            ty = y + 4.0,
            label = format_value(value)
        );
    }
    for tick in &ticks {
        let x = time.x(*tick);
        let _ = writeln!(
            svg,
            r##"<line x1="{x:.1}" y1="{PLOT_TOP}" x2="{x:.1}" y2="{PLOT_BOTTOM}" stroke="#000000" stroke-opacity="0.1"/>"##
        );
    }

    draw_track(&mut svg, &TOP_TRACK, PLOT_TOP, true, &ticks, step, &time);
    draw_track(&mut svg, &PRIMARY_TRACK, PLOT_BOTTOM, false, &ticks, step, &time);
    for (index, track) in LOWER_TRACKS.iter().enumerate() {
        let axis_y = PLOT_BOTTOM + TRACK_SPACING * (index + 1) as f64;
        draw_track(&mut svg, track, axis_y, false, &ticks, step, &time);
    }

    let entities = history.entities();
    for (index, entity) in entities.iter().enumerate() {
        let style = series_style(index);
        let mut points: Vec<&Observation> =
            observations.iter().filter(|o| o.entity == *entity).collect();
        points.sort_by_key(|o| o.date);

        let coordinates: Vec<(f64, f64)> = points
            .iter()
            .map(|o| (time.x(o.date), values.y(o.metric as f64)))
            .collect();
        let path = coordinates
            .iter()
            .map(|(x, y)| format!("{x:.1},{y:.1}"))
            .collect::<Vec<_>>()
            .join(" ");

        let _ = writeln!(
            svg,
            r#"<g class="series" data-entity="{name}"><polyline points="{path}" fill="none" stroke="{color}" stroke-width="2.5" stroke-opacity="0.8"{dash}/>"#,
            name = escape_xml(entity),
            color = style.color,
            dash = dash_attr(style.dash)
        );
        for (x, y) in coordinates {
            svg.push_str(&marker_svg(style.marker, x, y, style.color));
        }
        svg.push_str("</g>\n");
    }

    if entities.len() > 1 {
        draw_legend(&mut svg, &entities);
    }

    svg.push_str("</svg>\n");
    svg
}
