use thiserror::Error;

const USER_MESSAGE: &str = "USER_MESSAGE:";
const SHELL_COMMANDS: &str = "SHELL_COMMANDS:";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("response has no SHELL_COMMANDS: section")]
    MissingCommandsMarker,
}

/// Commands proposed by the assistant, plus an optional note for the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Suggestion {
    pub message: Option<String>,
    pub commands: Vec<String>,
}

pub fn parse(response: &str) -> Result<Suggestion, ParseError> {
    let commands_at = response
        .find(SHELL_COMMANDS)
        .ok_or(ParseError::MissingCommandsMarker)?;

    // The note only counts when it precedes the command block
    let message = response
        .find(USER_MESSAGE)
        .filter(|&at| at < commands_at)
        .map(|at| response[at + USER_MESSAGE.len()..commands_at].trim())
        .filter(|message| !message.is_empty())
        .map(str::to_string);

    let commands = response[commands_at + SHELL_COMMANDS.len()..]
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();

    Ok(Suggestion { message, commands })
}
