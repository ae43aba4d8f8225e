use std::io::Write;
use std::str::FromStr;

use crossterm::event::{self, Event, KeyEventKind};
use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Layout, Rect},
    prelude::Direction,
    style::{Color, Style},
    symbols::Marker,
    widgets::{Axis, Bar, BarChart, Block, Chart, Dataset, GraphType, Paragraph, Widget},
    DefaultTerminal,
};

use crate::error::StatsError;
use crate::models::Record;
use crate::stats::{self, FiveNumberSummary, HistogramBin};

const HISTOGRAM_BINS: usize = 10;
const TEXT_CHART_WIDTH: u16 = 80;
const TEXT_CHART_HEIGHT: u16 = 20;
const NOTHING_TO_PLOT: &str = "No grades to plot.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    Histogram,
    Boxplot,
    LinePlot,
}

impl FromStr for ChartKind {
    type Err = StatsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "histogram" => Ok(Self::Histogram),
            "boxplot" => Ok(Self::Boxplot),
            "lineplot" => Ok(Self::LinePlot),
            _ => Err(StatsError::InvalidSelector {
                requested: value.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChartRequest<'a> {
    pub values: &'a [f64],
    pub subject: &'a str,
    pub kind: ChartKind,
}

pub fn chart_request<'a>(
    record: &'a Record,
    subject: &'a str,
    kind: ChartKind,
) -> Result<ChartRequest<'a>, StatsError> {
    let values = record.scores(subject)?.unwrap_or_default();
    Ok(ChartRequest {
        values,
        subject,
        kind,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChartView<'a> {
    Histogram {
        subject: &'a str,
        bins: Vec<HistogramBin>,
    },
    Boxplot {
        subject: &'a str,
        summary: Option<FiveNumberSummary>,
    },
    Line {
        subject: &'a str,
        values: &'a [f64],
    },
}

pub trait ChartRenderer {
    fn show(&mut self, view: ChartView<'_>) -> anyhow::Result<()>;

    // Runs after every chart. Interactive renderers block here.
    fn finish_chart(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn histogram(&mut self, values: &[f64], subject: &str) -> anyhow::Result<()> {
        self.show(ChartView::Histogram {
            subject,
            bins: stats::histogram(values, HISTOGRAM_BINS),
        })
    }

    fn boxplot(&mut self, values: &[f64], subject: &str) -> anyhow::Result<()> {
        self.show(ChartView::Boxplot {
            subject,
            summary: stats::five_number_summary(values),
        })
    }

    fn line_plot(&mut self, values: &[f64], subject: &str) -> anyhow::Result<()> {
        self.show(ChartView::Line { subject, values })
    }

    fn render(&mut self, request: &ChartRequest<'_>) -> anyhow::Result<()> {
        match request.kind {
            ChartKind::Histogram => self.histogram(request.values, request.subject)?,
            ChartKind::Boxplot => self.boxplot(request.values, request.subject)?,
            ChartKind::LinePlot => self.line_plot(request.values, request.subject)?,
        }
        self.finish_chart()
    }
}

impl Widget for ChartView<'_> {
    fn render(self, area: Rect, buf: &mut Buffer)
    where
        Self: Sized,
    {
        match self {
            Self::Histogram { subject, bins } => render_histogram(subject, &bins, area, buf),
            Self::Boxplot { subject, summary } => render_boxplot(subject, summary, area, buf),
            Self::Line { subject, values } => render_line_plot(subject, values, area, buf),
        }
    }
}

fn render_empty(block: Block<'_>, area: Rect, buf: &mut Buffer) {
    Widget::render(Paragraph::new(NOTHING_TO_PLOT).block(block), area, buf);
}

fn render_histogram(subject: &str, bins: &[HistogramBin], area: Rect, buf: &mut Buffer) {
    let block = Block::bordered().title(format!("Grade Distribution in {subject}"));
    if bins.is_empty() {
        render_empty(block, area, buf);
        return;
    }

    let chart = BarChart::new(
        bins.iter()
            .map(|bin| {
                Bar::with_label(
                    format!("{:6.2}-{:6.2}", bin.range.start, bin.range.end),
                    bin.count,
                )
                .text_value(format!("{}", bin.count))
            })
            .collect::<Vec<_>>(),
    )
    .block(block)
    .direction(Direction::Horizontal)
    .bar_gap(0);

    Widget::render(chart, area, buf);
}

// Horizontal box and whiskers drawn as line datasets on a 0..2 band.
fn render_boxplot(
    subject: &str,
    summary: Option<FiveNumberSummary>,
    area: Rect,
    buf: &mut Buffer,
) {
    let block = Block::bordered().title(format!("Boxplot of Grades in {subject}"));
    let Some(summary) = summary else {
        render_empty(block, area, buf);
        return;
    };

    let FiveNumberSummary {
        min,
        lower_quartile: q1,
        median,
        upper_quartile: q3,
        max,
    } = summary;
    let whiskers = [(min, 1.0), (q1, 1.0), (q1, 0.5), (q3, 0.5), (q3, 1.0), (max, 1.0)];
    let outline = [(q1, 0.5), (q1, 1.5), (q3, 1.5), (q3, 0.5)];
    let median_line = [(median, 0.5), (median, 1.5)];

    let x_bounds = padded_bounds(min, max);
    let chart = Chart::new(vec![
        line_dataset(&whiskers),
        line_dataset(&outline),
        line_dataset(&median_line).style(Style::default().fg(Color::Yellow)),
    ])
    .block(block.title_bottom(format!(
        "min {min:.2} | q1 {q1:.2} | median {median:.2} | q3 {q3:.2} | max {max:.2}"
    )))
    .x_axis(grade_axis("Grades", x_bounds))
    .y_axis(Axis::default().bounds([0.0, 2.0]));

    Widget::render(chart, area, buf);
}

fn render_line_plot(subject: &str, values: &[f64], area: Rect, buf: &mut Buffer) {
    let block = Block::bordered().title(format!("Lineplot of Grades in {subject}"));
    if values.is_empty() {
        render_empty(block, area, buf);
        return;
    }

    let points: Vec<(f64, f64)> = values
        .iter()
        .enumerate()
        .map(|(index, &grade)| (index as f64, grade))
        .collect();
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let last_index = (values.len() - 1).max(1) as f64;

    let chart = Chart::new(vec![line_dataset(&points)])
        .block(block)
        .x_axis(
            Axis::default()
                .title("Index")
                .bounds([0.0, last_index])
                .labels(["0".to_string(), format!("{last_index:.0}")]),
        )
        .y_axis(grade_axis("Grades", padded_bounds(min, max)));

    Widget::render(chart, area, buf);
}

fn line_dataset(data: &[(f64, f64)]) -> Dataset<'_> {
    Dataset::default()
        .marker(Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(Color::Cyan))
        .data(data)
}

fn padded_bounds(min: f64, max: f64) -> [f64; 2] {
    if max > min {
        [min, max]
    } else {
        [min - 1.0, max + 1.0]
    }
}

fn grade_axis(title: &str, bounds: [f64; 2]) -> Axis<'_> {
    Axis::default().title(title).bounds(bounds).labels([
        format!("{:.2}", bounds[0]),
        format!("{:.2}", f64::midpoint(bounds[0], bounds[1])),
        format!("{:.2}", bounds[1]),
    ])
}

pub struct TerminalRenderer<'a> {
    terminal: &'a mut DefaultTerminal,
}

impl<'a> TerminalRenderer<'a> {
    pub fn new(terminal: &'a mut DefaultTerminal) -> Self {
        Self { terminal }
    }
}

impl ChartRenderer for TerminalRenderer<'_> {
    fn show(&mut self, view: ChartView<'_>) -> anyhow::Result<()> {
        self.terminal.draw(|frame| {
            let [chart_area, hint_area] =
                Layout::vertical([Constraint::Fill(1), Constraint::Length(1)])
                    .areas(frame.area());
            frame.render_widget(view, chart_area);
            frame.render_widget(Paragraph::new("Press any key to continue"), hint_area);
        })?;
        Ok(())
    }

    fn finish_chart(&mut self) -> anyhow::Result<()> {
        loop {
            match event::read()? {
                Event::Key(key_event) if key_event.kind == KeyEventKind::Press => return Ok(()),
                _ => {}
            }
        }
    }
}

// Renders each chart into an off-screen buffer and writes its rows as text.
pub struct TextRenderer<W> {
    out: W,
    area: Rect,
}

impl<W: Write> TextRenderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            area: Rect::new(0, 0, TEXT_CHART_WIDTH, TEXT_CHART_HEIGHT),
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ChartRenderer for TextRenderer<W> {
    fn show(&mut self, view: ChartView<'_>) -> anyhow::Result<()> {
        let mut buf = Buffer::empty(self.area);
        Widget::render(view, self.area, &mut buf);

        for y in self.area.top()..self.area.bottom() {
            let row: String = (self.area.left()..self.area.right())
                .map(|x| buf[(x, y)].symbol())
                .collect();
            writeln!(self.out, "{}", row.trim_end())?;
        }
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingRenderer {
        calls: Vec<(&'static str, String, usize)>,
        line_values: Vec<Vec<f64>>,
        finished: usize,
    }

    impl ChartRenderer for RecordingRenderer {
        fn show(&mut self, view: ChartView<'_>) -> anyhow::Result<()> {
            let call = match view {
                ChartView::Histogram { subject, bins } => (
                    "histogram",
                    subject.to_string(),
                    bins.iter().map(|bin| bin.count as usize).sum(),
                ),
                ChartView::Boxplot { subject, summary } => {
                    ("boxplot", subject.to_string(), usize::from(summary.is_some()))
                }
                ChartView::Line { subject, values } => {
                    self.line_values.push(values.to_vec());
                    ("lineplot", subject.to_string(), values.len())
                }
            };
            self.calls.push(call);
            Ok(())
        }

        fn finish_chart(&mut self) -> anyhow::Result<()> {
            self.finished += 1;
            Ok(())
        }
    }

    fn request(values: &[f64], kind: ChartKind) -> ChartRequest<'_> {
        ChartRequest {
            values,
            subject: "math",
            kind,
        }
    }

    #[test]
    fn chart_kind_parses_case_insensitively() {
        assert_eq!("Histogram".parse::<ChartKind>(), Ok(ChartKind::Histogram));
        assert_eq!("BOXPLOT".parse::<ChartKind>(), Ok(ChartKind::Boxplot));
        assert_eq!("lineplot".parse::<ChartKind>(), Ok(ChartKind::LinePlot));
    }

    #[test]
    fn unknown_chart_kind_is_rejected() {
        let err = "pie".parse::<ChartKind>().unwrap_err();
        assert_eq!(
            err,
            StatsError::InvalidSelector {
                requested: "pie".to_string()
            }
        );
        assert_eq!(err.to_string(), "Invalid visualization type selected.");
    }

    #[test]
    fn render_dispatches_on_kind_in_stored_order() {
        let record = Record::new("Alice").with_scores("math", [90.0, 70.0, 80.0]);
        let mut renderer = RecordingRenderer::default();

        for kind in [ChartKind::LinePlot, ChartKind::Boxplot, ChartKind::Histogram] {
            let request = chart_request(&record, "math", kind).unwrap();
            renderer.render(&request).unwrap();
        }

        assert_eq!(
            renderer.calls,
            vec![
                ("lineplot", "math".to_string(), 3),
                ("boxplot", "math".to_string(), 1),
                ("histogram", "math".to_string(), 3),
            ]
        );
        assert_eq!(renderer.line_values, vec![vec![90.0, 70.0, 80.0]]);
        assert_eq!(renderer.finished, 3);
    }

    #[test]
    fn chart_request_reports_malformed_subject() {
        let record = Record::new("Alice").with_malformed("math", serde_json::json!("n/a"));
        assert!(matches!(
            chart_request(&record, "math", ChartKind::Histogram),
            Err(StatsError::Format { .. })
        ));
    }

    #[test]
    fn text_renderer_draws_each_chart_kind() {
        let values = [85.0, 90.0, 80.0];
        let mut renderer = TextRenderer::new(Vec::new());
        for kind in [ChartKind::Histogram, ChartKind::Boxplot, ChartKind::LinePlot] {
            renderer.render(&request(&values, kind)).unwrap();
        }

        let output = String::from_utf8(renderer.into_inner()).unwrap();
        assert_eq!(output.lines().count(), 3 * TEXT_CHART_HEIGHT as usize);
        assert!(output.contains("Grade Distribution in math"));
        assert!(output.contains("Boxplot of Grades in math"));
        assert!(output.contains("median 85.00"));
        assert!(output.contains("Lineplot of Grades in math"));
        assert!(!output.contains(NOTHING_TO_PLOT));
    }

    #[test]
    fn text_renderer_notes_empty_subjects() {
        let mut renderer = TextRenderer::new(Vec::new());
        for kind in [ChartKind::Histogram, ChartKind::Boxplot, ChartKind::LinePlot] {
            renderer.render(&request(&[], kind)).unwrap();
        }

        let output = String::from_utf8(renderer.into_inner()).unwrap();
        assert_eq!(output.matches(NOTHING_TO_PLOT).count(), 3);
    }

    #[test]
    fn single_grade_charts_get_a_visible_range() {
        assert_eq!(padded_bounds(85.0, 85.0), [84.0, 86.0]);
        assert_eq!(padded_bounds(80.0, 90.0), [80.0, 90.0]);

        let mut renderer = TextRenderer::new(Vec::new());
        renderer.render(&request(&[85.0], ChartKind::LinePlot)).unwrap();
        let output = String::from_utf8(renderer.into_inner()).unwrap();
        assert!(output.contains("84.00"));
        assert!(output.contains("86.00"));
    }
}
