use std::io;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseEventKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEvent {
    Tick,
    Quit,
    MoveUp,
    MoveDown,
    PageUp,
    PageDown,
    Submit,
    Back,
    Backspace,
    ToggleDetails,
    OpenPalette,
    InputChar(char),
}

fn map_key_event(key_event: KeyEvent) -> AppEvent {
    if key_event.kind != KeyEventKind::Press {
        return AppEvent::Tick;
    }

    if key_event.modifiers.contains(KeyModifiers::CONTROL) {
        return match key_event.code {
            KeyCode::Char('c') => AppEvent::Quit,
            KeyCode::Char('p') => AppEvent::OpenPalette,
            KeyCode::Char('u') => AppEvent::PageUp,
            KeyCode::Char('d') => AppEvent::PageDown,
            _ => AppEvent::Tick,
        };
    }

    match key_event.code {
        KeyCode::Up => AppEvent::MoveUp,
        KeyCode::Down => AppEvent::MoveDown,
        KeyCode::PageUp => AppEvent::PageUp,
        KeyCode::PageDown => AppEvent::PageDown,
        KeyCode::Enter => AppEvent::Submit,
        KeyCode::Esc => AppEvent::Back,
        KeyCode::Backspace => AppEvent::Backspace,
        KeyCode::Tab => AppEvent::ToggleDetails,
        KeyCode::Char(c) => AppEvent::InputChar(c),
        _ => AppEvent::Tick,
    }
}

fn map_mouse_event_kind(kind: MouseEventKind) -> AppEvent {
    match kind {
        MouseEventKind::ScrollUp => AppEvent::MoveUp,
        MouseEventKind::ScrollDown => AppEvent::MoveDown,
        _ => AppEvent::Tick,
    }
}

/// Waits one frame for input; returns `Tick` when nothing arrived.
pub fn next_event() -> io::Result<AppEvent> {
    if event::poll(Duration::from_millis(16))? {
        match event::read()? {
            Event::Key(key_event) if key_event.kind == KeyEventKind::Press => {
                return Ok(map_key_event(key_event));
            }
            Event::Mouse(mouse_event) => return Ok(map_mouse_event_kind(mouse_event.kind)),
            _ => {}
        }
    }

    Ok(AppEvent::Tick)
}
