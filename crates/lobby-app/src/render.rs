// Console front end for the lobby view model.
//
// Paints `LobbyView` snapshots as plain text. A view identical to the last
// painted one is skipped, so repeated updates do not flicker the terminal.

use std::io::{self, Write};

use lobby_core::controller::UiUpdate;
use lobby_core::handoff::Navigation;
use lobby_core::session::Phase;
use lobby_core::view::LobbyView;
use tracing::debug;

pub struct ConsoleRenderer<W: Write> {
    out: W,
    last: Option<LobbyView>,
}

impl<W: Write> ConsoleRenderer<W> {
    pub fn new(out: W) -> Self {
        ConsoleRenderer { out, last: None }
    }

    pub fn apply(&mut self, update: UiUpdate) -> io::Result<()> {
        match update {
            UiUpdate::View(view) => {
                self.paint(view)?;
            }
            // Each tick is followed by a view carrying the same value.
            UiUpdate::CountdownTick(n) => debug!("Countdown tick {n}"),
            UiUpdate::Error(message) => {
                writeln!(self.out, "! {message}")?;
                self.out.flush()?;
            }
        }
        Ok(())
    }

    /// Paint `view` unless it matches the last painted view. Returns whether
    /// anything was written.
    pub fn paint(&mut self, view: LobbyView) -> io::Result<bool> {
        if self.last.as_ref() == Some(&view) {
            return Ok(false);
        }
        for line in render_lines(&view) {
            writeln!(self.out, "{line}")?;
        }
        self.out.flush()?;
        self.last = Some(view);
        Ok(true)
    }

    pub fn navigate(&mut self, nav: &Navigation) -> io::Result<()> {
        writeln!(self.out, "-> {nav}")?;
        self.out.flush()
    }

    pub fn online(&mut self, users: &[String]) -> io::Result<()> {
        if users.is_empty() {
            writeln!(self.out, "Online: nobody")?;
        } else {
            writeln!(self.out, "Online: {}", users.join(", "))?;
        }
        self.out.flush()
    }

    pub fn notice(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.out, "{text}")?;
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Text lines for one view, in display order.
pub fn render_lines(view: &LobbyView) -> Vec<String> {
    if view.phase == Phase::Idle {
        let mut lines = vec!["[lobby closed]".to_string()];
        lines.extend(view.footer.clone());
        return lines;
    }

    let mut lines = vec![format!("== {} ==", view.title)];
    for (i, card) in view.players.iter().enumerate() {
        lines.push(format!("  {}. {} ({})", i + 1, card.username, card.avatar_url));
    }
    if let Some(footer) = &view.footer {
        lines.push(format!("  {footer}"));
    }
    lines
}
