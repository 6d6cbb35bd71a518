use std::io;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEventKind, MouseEventKind};
use ratatui::{Terminal, backend::CrosstermBackend};

use clickflow_core::logger;
use clickflow_core::platform::hotkey;

use crate::App;
use crate::ui;

pub fn run(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    emergency: &AtomicBool,
) -> anyhow::Result<()> {
    loop {
        if app.should_quit {
            return Ok(());
        }

        // The global hotkey fires while another window has focus.
        if hotkey::take_trigger(emergency) {
            logger::warn(&format!("{} pressed", hotkey::EMERGENCY_COMBO));
            app.emergency_stop();
            hotkey::activate_terminal();
        }

        app.drain_logs();
        app.drain_events();

        terminal.draw(|f| ui::draw(f, app))?;

        // Poll for events with 100ms timeout (keeps TUI responsive)
        if event::poll(Duration::from_millis(100))? {
            match event::read()? {
                Event::Key(key) => {
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Char('Q') => app.quit(),
                        KeyCode::Char('r') | KeyCode::Char('R') => app.start_run(),
                        KeyCode::Char('p') | KeyCode::Char('P') => app.toggle_pause(),
                        KeyCode::Char('s') | KeyCode::Char('S') => app.stop(),
                        KeyCode::Char('x') | KeyCode::Char('X') => app.emergency_stop(),
                        KeyCode::Char('l') | KeyCode::Char('L') => app.toggle_log(),
                        KeyCode::Up | KeyCode::Char('k') => app.scroll_log_up(1),
                        KeyCode::Down | KeyCode::Char('j') => app.scroll_log_down(1),
                        _ => {}
                    }
                }
                Event::Mouse(mouse) => match mouse.kind {
                    MouseEventKind::ScrollUp => app.scroll_log_up(3),
                    MouseEventKind::ScrollDown => app.scroll_log_down(3),
                    _ => {}
                },
                _ => {}
            }
        }
    }
}
