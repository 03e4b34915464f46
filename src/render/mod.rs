//! Rendering of charts and notification text

pub mod chart;
pub mod text;

pub use chart::{ChartError, ChartStyle, render_chart, render_svg};
pub use text::{
    DocumentChange, DocumentPresenter, ManifestPresenter, SeriesLabels, StatusPresenter,
    render_series_fields, render_status, series_message,
};
