use crate::app::App;
use crate::map::project;
use crate::raster::{RasterCanvas, Rgba};
use crate::tracking::PositionSource;
use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Widget},
    Frame,
};

/// Map background, heat is composited over this
const BACKGROUND: [u8; 3] = [12, 14, 20];

/// Render the UI
pub fn render<P: PositionSource>(frame: &mut Frame, app: &App<P>) {
    let area = frame.area();

    // Split into map area and status bar
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(3),    // Map
            Constraint::Length(1), // Status bar
        ])
        .split(area);

    render_map(frame, app, chunks[0]);
    render_status_bar(frame, app, chunks[1]);
}

fn render_map<P: PositionSource>(frame: &mut Frame, app: &App<P>, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(Span::styled(
            " Heat Map ",
            Style::default()
                .fg(Color::Red)
                .add_modifier(Modifier::BOLD),
        ));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    // Half blocks give 1x2 pixels per character
    let mut canvas = RasterCanvas::new(inner.width as usize, inner.height as usize * 2);
    let viewport = canvas.size();
    app.renderer
        .render(&app.samples, app.region.as_ref(), viewport, &mut canvas);

    // Latest sample gets a marker on top of the heat
    let marker = app
        .samples
        .last()
        .and_then(|s| project(s.coordinate(), app.region.as_ref(), viewport))
        .filter(|px| px.x >= 0.0 && px.y >= 0.0)
        .map(|px| (px.x as u16, (px.y / 2.0) as u16))
        .filter(|&(cx, cy)| cx < inner.width && cy < inner.height);

    frame.render_widget(HeatWidget { canvas, marker }, inner);
}

/// Paints a [RasterCanvas] with upper half blocks: foreground is the top pixel,
/// background the bottom one
struct HeatWidget {
    canvas: RasterCanvas,
    marker: Option<(u16, u16)>,
}

fn rgb(c: [u8; 3]) -> Color {
    Color::Rgb(c[0], c[1], c[2])
}

impl Widget for HeatWidget {
    fn render(self, area: Rect, buf: &mut Buffer) {
        for row in 0..area.height {
            for col in 0..area.width {
                let x = col as usize;
                let top = self.canvas.pixel(x, row as usize * 2).unwrap_or(Rgba::TRANSPARENT);
                let bottom = self.canvas.pixel(x, row as usize * 2 + 1).unwrap_or(Rgba::TRANSPARENT);

                buf[(area.x + col, area.y + row)]
                    .set_char('▀')
                    .set_fg(rgb(top.flatten(BACKGROUND)))
                    .set_bg(rgb(bottom.flatten(BACKGROUND)));
            }
        }

        if let Some((cx, cy)) = self.marker {
            buf[(area.x + cx, area.y + cy)]
                .set_char('●')
                .set_fg(Color::White);
        }
    }
}

fn render_status_bar<P: PositionSource>(frame: &mut Frame, app: &App<P>, area: Rect) {
    let (state, state_color) = if app.is_running() {
        (" ● REC ", Color::Red)
    } else {
        (" ○ IDLE ", Color::DarkGray)
    };

    let mut spans = vec![
        Span::styled(state, Style::default().fg(state_color).add_modifier(Modifier::BOLD)),
        Span::styled(format!("{} samples ", app.samples.len()), Style::default().fg(Color::Yellow)),
        Span::styled("| ", Style::default().fg(Color::DarkGray)),
        Span::styled(app.center_coords(), Style::default().fg(Color::Cyan)),
        Span::styled(" | ", Style::default().fg(Color::DarkGray)),
        Span::styled(app.span_label(), Style::default().fg(Color::Magenta)),
    ];

    if let Some(why) = &app.last_error {
        spans.push(Span::styled(" | ", Style::default().fg(Color::DarkGray)));
        spans.push(Span::styled(why.clone(), Style::default().fg(Color::LightRed)));
    }

    spans.push(Span::styled(
        " | s:start x:stop c:clear r:reload hjkl:pan +/-:zoom q:quit",
        Style::default().fg(Color::DarkGray),
    ));

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}
