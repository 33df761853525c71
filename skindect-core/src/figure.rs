use crate::{error::Error, report::Ranking};
use crossterm::{
    event::{self, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use image::DynamicImage;
use ratatui::{
    layout::{Constraint, Layout},
    prelude::CrosstermBackend,
    style::{Style, Stylize},
    text::Line,
    widgets::{Bar, BarChart, BarGroup, Block, Borders},
    Terminal,
};
use ratatui_image::{picker::Picker, protocol::StatefulProtocol as _, FilterType, Resize};

/// Puts the shell back in cooked mode even when [`render`] bails out early.
struct RestoreTerminal;

impl Drop for RestoreTerminal {
    fn drop(&mut self) {
        disable_raw_mode().ok();
        execute!(std::io::stderr(), LeaveAlternateScreen).ok();
    }
}

fn viz(e: impl std::fmt::Display) -> Error {
    Error::Visualization(e.to_string())
}

/// Two-panel figure: the original image on the left, a horizontal
/// confidence bar chart on the right. Dismissed by any key press.
///
/// Every failure here is non-fatal; callers downgrade to the already
/// printed text report.
pub fn render(image: &DynamicImage, ranking: &Ranking) -> Result<(), Error> {
    let mut picker = Picker::from_termios()
        .map_err(|_| Error::Visualization("terminal does not support image rendering".into()))?;
    picker.guess_protocol();
    let mut protocol = picker.new_resize_protocol(image.clone());

    enable_raw_mode().map_err(viz)?;
    let _restore = RestoreTerminal;
    execute!(std::io::stderr(), EnterAlternateScreen).map_err(viz)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(std::io::stderr())).map_err(viz)?;
    terminal
        .draw(|f| {
            let [left, right] =
                Layout::horizontal([Constraint::Percentage(50), Constraint::Percentage(50)])
                    .areas(f.size());

            let image_block = Block::default()
                .title(format!(
                    "Prediction: {} ({:.2}%)",
                    ranking.predicted_class(),
                    ranking.confidence()
                ))
                .borders(Borders::ALL);
            let image_area = image_block.inner(left);
            f.render_widget(image_block, left);
            protocol.resize_encode(&Resize::Fit(Some(FilterType::Lanczos3)), None, image_area);
            protocol.render(image_area, f.buffer_mut());

            let chart_block = Block::default()
                .title("Prediction Probabilities")
                .borders(Borders::ALL);
            let chart_area = chart_block.inner(right);
            f.render_widget(chart_block, right);
            f.render_widget(barchart(ranking), chart_area);
        })
        .map_err(viz)?;

    loop {
        if let Event::Key(_) = event::read().map_err(viz)? {
            return Ok(());
        }
    }
}

/// Horizontal bar chart of the ranked confidences, top class reversed.
fn barchart(ranking: &Ranking) -> BarChart {
    let bars = ranking
        .entries()
        .iter()
        .enumerate()
        .map(|(rank, entry)| {
            let style = Style::default();
            Bar::default()
                // hundredths of a percent so short bars stay visible
                .value((entry.percent * 100.0) as u64)
                .label(Line::from(entry.label))
                .text_value(format!("{:.2}%", entry.percent))
                .style(style)
                .value_style(if rank == 0 { style.reversed() } else { style })
        })
        .collect::<Vec<_>>();
    BarChart::default()
        .data(BarGroup::default().bars(&bars))
        .max(100 * 100)
        .bar_gap(1)
        .bar_width(1)
        .direction(ratatui::layout::Direction::Horizontal)
}
