//! Client input management with change detection
//!
//! Stands in for a keyboard: lines of text typed on stdin are parsed into
//! [`Command`]s. Movement commands latch a held direction, a bomb drop
//! fires for exactly one frame, and the rest are handed back to the caller.

use shared::{Action, Dir};

/// Seconds between repeated sends of an unchanged action.
pub const INPUT_RESEND_PERIOD: f32 = 0.016;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Hold a direction until released or replaced
    Hold(Dir),
    Release,
    Drop,
    SetName(String),
    SetHost(String),
    Chat(String),
    AddBot,
    RemoveBot,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    #[error("unknown command {0:?}")]
    Unknown(String),
    #[error("{0} needs an argument")]
    MissingArgument(&'static str),
}

impl Command {
    /// Parses one line. Blank lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Command>, InputError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();

        let required = |what: &'static str| {
            if rest.is_empty() {
                Err(InputError::MissingArgument(what))
            } else {
                Ok(rest.to_string())
            }
        };

        let cmd = match word {
            "w" => Command::Hold(Dir::Up),
            "s" => Command::Hold(Dir::Down),
            "a" => Command::Hold(Dir::Left),
            "d" => Command::Hold(Dir::Right),
            "x" => Command::Release,
            "b" => Command::Drop,
            "/name" => Command::SetName(required("/name")?),
            "/host" => Command::SetHost(required("/host")?),
            "/chat" => Command::Chat(required("/chat")?),
            "/addbot" => Command::AddBot,
            "/removebot" => Command::RemoveBot,
            "/quit" => Command::Quit,
            other => return Err(InputError::Unknown(other.to_string())),
        };

        Ok(Some(cmd))
    }
}

/// Turns latched commands into one [`Action`] per frame
pub struct InputManager {
    held: Dir,
    drop_pending: bool,
    current_action: Action,
    since_last_send: f32,
}

impl InputManager {
    pub fn new() -> Self {
        Self {
            held: Dir::Nil,
            drop_pending: false,
            current_action: Action::default(),
            since_last_send: 0.0,
        }
    }

    /// Latches movement and drop commands. Returns false for commands
    /// that are not about movement, leaving them to the caller.
    pub fn apply(&mut self, cmd: &Command) -> bool {
        match cmd {
            Command::Hold(dir) => self.held = *dir,
            Command::Release => self.held = Dir::Nil,
            Command::Drop => self.drop_pending = true,
            _ => return false,
        }
        true
    }

    /// Builds this frame's action and decides whether it should go to the
    /// server: on change, or periodically as a keep-alive.
    pub fn update(&mut self, dt: f32) -> (Action, Option<Action>) {
        let mut action = Action::moving(self.held);
        action.drop = std::mem::take(&mut self.drop_pending);

        self.since_last_send += dt;
        let changed = action != self.current_action;
        let time_to_send = self.since_last_send >= INPUT_RESEND_PERIOD;

        self.current_action = action;

        if changed || time_to_send {
            self.since_last_send = 0.0;
            (action, Some(action))
        } else {
            (action, None)
        }
    }

    pub fn current_action(&self) -> &Action {
        &self.current_action
    }
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_movement_and_commands() {
        assert_eq!(Command::parse("w"), Ok(Some(Command::Hold(Dir::Up))));
        assert_eq!(Command::parse(" d "), Ok(Some(Command::Hold(Dir::Right))));
        assert_eq!(Command::parse("x"), Ok(Some(Command::Release)));
        assert_eq!(Command::parse("b"), Ok(Some(Command::Drop)));
        assert_eq!(Command::parse("/addbot"), Ok(Some(Command::AddBot)));
        assert_eq!(Command::parse(""), Ok(None));
        assert_eq!(
            Command::parse("/chat good   luck"),
            Ok(Some(Command::Chat("good   luck".into())))
        );
        assert_eq!(
            Command::parse("/host 10.0.0.2"),
            Ok(Some(Command::SetHost("10.0.0.2".into())))
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(Command::parse("/name"), Err(InputError::MissingArgument("/name")));
        assert_eq!(Command::parse("jump"), Err(InputError::Unknown("jump".into())));
    }

    #[test]
    fn test_input_manager_creation() {
        let input_manager = InputManager::new();
        assert_eq!(input_manager.held, Dir::Nil);
        assert_eq!(*input_manager.current_action(), Action::default());
    }

    #[test]
    fn test_drop_fires_for_one_frame() {
        let mut input = InputManager::new();
        assert!(input.apply(&Command::Drop));

        let (action, sent) = input.update(0.001);
        assert!(action.drop);
        assert_eq!(sent, Some(action));

        let (action, sent) = input.update(0.001);
        assert!(!action.drop);
        // dropping the flag is itself a change
        assert!(sent.is_some());
    }

    #[test]
    fn test_unchanged_action_is_resent_periodically() {
        let mut input = InputManager::new();
        input.apply(&Command::Hold(Dir::Left));

        assert!(input.update(0.001).1.is_some());
        assert!(input.update(0.001).1.is_none());
        assert!(input.update(INPUT_RESEND_PERIOD).1.is_some());
    }

    #[test]
    fn test_non_movement_commands_are_not_latched() {
        let mut input = InputManager::new();
        assert!(!input.apply(&Command::Quit));
        assert!(!input.apply(&Command::Chat("hi".into())));
        assert_eq!(input.update(0.0).0, Action::default());
    }
}
