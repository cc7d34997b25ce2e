use console::Style;

/// Colors for the messages xsh prints while an interaction owns the terminal.
/// Change values here to customize the look and feel.
pub struct Theme {
    pub messages: MessageTheme,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            messages: MessageTheme {
                success: Style::new().green(),
                error: Style::new().red().bold(),
                info: Style::new().cyan(),
                warning: Style::new().yellow(),
            },
        }
    }
}

impl Theme {
    /// No styling at all, for dumb terminals.
    pub fn plain() -> Self {
        Self {
            messages: MessageTheme {
                success: Style::new(),
                error: Style::new(),
                info: Style::new(),
                warning: Style::new(),
            },
        }
    }

    /// Plain when `TERM=dumb` or `NO_COLOR` is set.
    pub fn detect() -> Self {
        let dumb = std::env::var("TERM").is_ok_and(|term| term == "dumb");
        if dumb || std::env::var_os("NO_COLOR").is_some() {
            Self::plain()
        } else {
            Self::default()
        }
    }
}

/// Theme for different message types
pub struct MessageTheme {
    pub success: Style,
    pub error: Style,
    pub info: Style,
    pub warning: Style,
}
