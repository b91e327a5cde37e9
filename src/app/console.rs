use crate::app::error::AppError;

pub const HELP: &str = "commands: load | clear | ws | auto | help | quit";

/// One line typed into the running panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelCommand {
    /// Reload the history snapshot.
    Load,
    Clear,
    /// Connect the live socket, or close it when active.
    ToggleLive,
    ToggleAutoRefresh,
    Help,
    Quit,
}

impl PanelCommand {
    /// Blank lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>, AppError> {
        let command = match line.trim().to_ascii_lowercase().as_str() {
            "" => return Ok(None),
            "load" | "l" => PanelCommand::Load,
            "clear" | "c" => PanelCommand::Clear,
            "ws" | "w" => PanelCommand::ToggleLive,
            "auto" | "a" => PanelCommand::ToggleAutoRefresh,
            "help" | "h" | "?" => PanelCommand::Help,
            "quit" | "q" | "exit" => PanelCommand::Quit,
            other => {
                return Err(AppError::usage(format!("unknown command '{other}'; {HELP}")));
            }
        };

        Ok(Some(command))
    }
}
