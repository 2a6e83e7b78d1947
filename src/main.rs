use std::fs::File;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, MouseButton,
    MouseEvent, MouseEventKind,
};
use crossterm::execute;
use log::info;
use ratatui::DefaultTerminal;
use tokio::runtime::Runtime;
use tui_heatmap::app::App;
use tui_heatmap::config::Cli;
use tui_heatmap::prelude::*;
use tui_heatmap::store::SampleStore;
use tui_heatmap::tracking::{PositionSource, Sampler};
use tui_heatmap::ui;

fn main() -> Result {
    let cli = Cli::parse();
    init_logging(&cli)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let store = cli.open_store().context("Failed to open sample store")?;
    let source = cli.build_source().context("Failed to set up position source")?;

    // Initialize terminal
    let mut terminal = ratatui::init();
    terminal.clear()?;

    // Enable mouse capture
    execute!(std::io::stdout(), EnableMouseCapture)?;

    let result = run(&mut terminal, &runtime, &cli, source, store);

    // Disable mouse capture and restore terminal
    let _ = execute!(std::io::stdout(), DisableMouseCapture);
    ratatui::restore();

    runtime.shutdown_timeout(Duration::from_secs(1));
    result
}

/// The terminal is taken by the map, so logs only go to a file when asked
fn init_logging(cli: &Cli) -> Result {
    let Some(path) = &cli.log_file else {
        return Ok(());
    };
    let file = File::create(path).with_context(|| format!("Failed to create log file {}", path.display()))?;
    colog::default_builder()
        .filter_level(cli.log_level())
        .write_style(env_logger::WriteStyle::Never)
        .target(env_logger::Target::Pipe(Box::new(file)))
        .try_init()
        .context("Failed to set up logging")?;
    Ok(())
}

/// Handle mouse events for panning and zooming
fn handle_mouse<P: PositionSource>(app: &mut App<P>, mouse: MouseEvent) {
    match mouse.kind {
        // Scroll wheel for zooming towards mouse position
        MouseEventKind::ScrollUp => app.zoom_in_at(mouse.column, mouse.row),
        MouseEventKind::ScrollDown => app.zoom_out_at(mouse.column, mouse.row),
        // Horizontal scroll for panning (trackpad two-finger swipe)
        MouseEventKind::ScrollLeft => app.pan(-15, 0),
        MouseEventKind::ScrollRight => app.pan(15, 0),
        // Click and drag to pan
        MouseEventKind::Down(MouseButton::Left) => {
            app.last_mouse = Some((mouse.column, mouse.row));
        }
        MouseEventKind::Drag(MouseButton::Left) => {
            app.handle_drag(mouse.column, mouse.row);
        }
        MouseEventKind::Up(MouseButton::Left) => {
            app.end_drag();
        }
        _ => {}
    }
}

fn run<P: PositionSource>(
    terminal: &mut DefaultTerminal,
    runtime: &Runtime,
    cli: &Cli,
    source: P,
    store: Arc<dyn SampleStore>,
) -> Result {
    let size = terminal.size()?;
    let sampler = Sampler::new(runtime.handle().clone(), source, store.clone());
    let mut app = App::new(
        sampler,
        store,
        cli.interval,
        cli.style(),
        size.width as usize,
        size.height as usize,
    );
    app.load()?;

    if cli.autostart {
        app.start_sampling();
    }

    // Main loop
    loop {
        app.drain_events();

        // Draw
        terminal.draw(|frame| ui::render(frame, &app))?;

        // Handle events with ~60fps target
        if event::poll(Duration::from_millis(16))? {
            match event::read()? {
                Event::Key(key) => {
                    // Only handle key press events (not release)
                    if key.kind == KeyEventKind::Press {
                        match key.code {
                            KeyCode::Char('q') | KeyCode::Esc => app.quit(),

                            // Recording
                            KeyCode::Char('s') => app.start_sampling(),
                            KeyCode::Char('x') => app.stop_sampling(),
                            KeyCode::Char(' ') => app.toggle_sampling(),

                            // Stored samples
                            KeyCode::Char('c') => {
                                let res = app.clear();
                                app.report(res);
                            }
                            KeyCode::Char('r') => {
                                let res = app.load();
                                app.report(res);
                            }
                            KeyCode::Char('0') => app.recenter(),

                            // Pan with hjkl or arrow keys
                            KeyCode::Left | KeyCode::Char('h') => app.pan(-10, 0),
                            KeyCode::Right | KeyCode::Char('l') => app.pan(10, 0),
                            KeyCode::Up | KeyCode::Char('k') => app.pan(0, -6),
                            KeyCode::Down | KeyCode::Char('j') => app.pan(0, 6),

                            // Zoom
                            KeyCode::Char('+') | KeyCode::Char('=') => app.zoom_in(),
                            KeyCode::Char('-') | KeyCode::Char('_') => app.zoom_out(),

                            _ => {}
                        }
                    }
                }
                Event::Mouse(mouse) => {
                    handle_mouse(&mut app, mouse);
                }
                Event::Resize(width, height) => {
                    app.resize(width as usize, height as usize);
                }
                _ => {}
            }
        }

        if app.should_quit {
            break;
        }
    }

    app.stop_sampling();
    info!("Exiting with {} samples", app.samples.len());
    Ok(())
}
