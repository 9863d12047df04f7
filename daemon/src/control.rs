/// One-shot playback control, invoked as `mediaplayer <action>` from bar
/// click bindings.
///
/// Each action maps to a single `playerctl` call bounded by
/// [`CONTROL_TIMEOUT`]. Failures are logged and swallowed: dispatch always
/// returns normally so the bar never sees a non-zero exit.
use std::str::FromStr;
use std::time::Duration;

use crate::command::{ExternalCommand, PLAYERCTL};

pub const CONTROL_TIMEOUT: Duration = Duration::from_secs(2);
/// Click binding that is accepted but dispatches nothing.
pub const SHOW_MENU: &str = "show_menu";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    PlayPause,
    Next,
    Previous,
}

impl Action {
    pub const ALL: [Action; 3] = [Action::PlayPause, Action::Next, Action::Previous];

    /// Whether `name` is a control action rather than a monitor argument.
    pub fn is_known(name: &str) -> bool {
        name.parse::<Action>().is_ok()
    }

    /// Name used on the command line and in `click_actions`.
    pub fn name(self) -> &'static str {
        match self {
            Action::PlayPause => "play_pause",
            Action::Next => "next",
            Action::Previous => "previous",
        }
    }

    /// Argument passed to the control program.
    fn verb(self) -> &'static str {
        match self {
            Action::PlayPause => "play-pause",
            Action::Next => "next",
            Action::Previous => "previous",
        }
    }
}

impl FromStr for Action {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|action| action.name() == s)
            .ok_or(())
    }
}

/// Sends playback commands through an external control program.
pub struct Dispatcher {
    program: String,
    timeout: Duration,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(PLAYERCTL, CONTROL_TIMEOUT)
    }
}

impl Dispatcher {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn command_for(&self, action: Action) -> ExternalCommand {
        ExternalCommand::new(self.program.clone(), [action.verb()])
    }

    /// Runs the action called `name` once. Unknown names are logged and
    /// ignored; timeouts and failures are logged, never returned.
    pub async fn dispatch(&self, name: &str) {
        tracing::info!("Handling click action: {name}");
        match name.parse::<Action>() {
            Ok(action) => self.run(action).await,
            Err(()) if name == SHOW_MENU => tracing::debug!("Action {SHOW_MENU} has no handler"),
            Err(()) => tracing::warn!("Unknown action: {name}"),
        }
    }

    async fn run(&self, action: Action) {
        let command = self.command_for(action);
        if let Err(e) = command.run_bounded(self.timeout).await {
            tracing::error!("Error executing action {}: {e}", action.name());
        }
    }
}
