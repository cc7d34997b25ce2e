use std::io::{self, Write};

use crate::utils::Theme;

/// Renders the messages shown while an interaction owns the terminal.
///
/// Every line ends with `\r\n` so output lines up whether or not the terminal
/// has been switched back to cooked mode yet.
pub struct OutputHandler {
    stdout: Box<dyn Write + Send>,
    theme: Theme,
}

impl OutputHandler {
    pub fn with_theme(stdout: Box<dyn Write + Send>, theme: Theme) -> Self {
        Self { stdout, theme }
    }

    /// Handler for the real terminal.
    pub fn stdout() -> Self {
        Self::with_theme(Box::new(io::stdout()), Theme::detect())
    }

    /// Renders multi-line text verbatim, normalising line endings.
    pub fn render_text(&mut self, text: &str) -> io::Result<()> {
        for line in text.lines() {
            self.stdout.write_all(line.as_bytes())?;
            self.stdout.write_all(b"\r\n")?;
        }
        self.stdout.flush()
    }

    pub fn render_info(&mut self, message: &str) -> io::Result<()> {
        let styled = self.theme.messages.info.apply_to(message);
        self.write_line(&styled.to_string())
    }

    pub fn render_success(&mut self, message: &str) -> io::Result<()> {
        let styled = self.theme.messages.success.apply_to(message);
        self.write_line(&styled.to_string())
    }

    pub fn render_warning(&mut self, message: &str) -> io::Result<()> {
        let styled = self.theme.messages.warning.apply_to(message);
        self.write_line(&styled.to_string())
    }

    pub fn render_error(&mut self, message: &str) -> io::Result<()> {
        let styled = self.theme.messages.error.apply_to(message);
        self.write_line(&styled.to_string())
    }

    /// Renders a newline (\r\n) to the terminal.
    pub fn render_newline(&mut self) -> io::Result<()> {
        self.stdout.write_all(b"\r\n")?;
        self.stdout.flush()
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.stdout.write_all(line.as_bytes())?;
        self.stdout.write_all(b"\r\n")?;
        self.stdout.flush()
    }
}
