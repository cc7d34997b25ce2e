//! Startup scripts that wire the AI key binding into the wrapped shell.

use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use portable_pty::CommandBuilder;
use tracing::debug;

use super::error::SessionError;

/// What a startup script needs to know about the session.
#[derive(Debug, Clone)]
pub struct HookContext {
    /// Home directory holding the user's own rc files
    pub home: PathBuf,
    pub request_pipe: PathBuf,
    pub response_pipe: PathBuf,
    /// Key in zsh `bindkey` notation, e.g. `^I`
    pub key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellKind {
    Zsh,
    Bash,
    Other,
}

impl ShellKind {
    pub fn detect(shell: &str) -> Self {
        let name = Path::new(shell)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(shell);
        match name {
            "zsh" => ShellKind::Zsh,
            "bash" => ShellKind::Bash,
            _ => ShellKind::Other,
        }
    }

    pub fn generator(self) -> Box<dyn HookGenerator> {
        match self {
            ShellKind::Zsh => Box::new(ZshHook),
            ShellKind::Bash => Box::new(BashHook),
            ShellKind::Other => Box::new(PassthroughHook),
        }
    }
}

/// Per-shell startup files and launch arguments.
pub trait HookGenerator: Send + Sync {
    /// Files to write into the profile directory, as `(file name, contents)`.
    fn files(&self, context: &HookContext) -> Vec<(&'static str, String)>;

    /// The file holding the key binding, if any.
    fn rc_file(&self) -> Option<&'static str>;

    fn command(&self, shell: &str, profile_dir: &Path) -> CommandBuilder;
}

/// Full support: a zle widget talks to xsh over the pipes.
pub struct ZshHook;

/// Partial support: the key only explains that AI needs zsh.
pub struct BashHook;

/// Any other shell runs untouched.
pub struct PassthroughHook;

const ZSH_STARTUP_FILES: [&str; 3] = [".zshenv", ".zprofile", ".zlogin"];

impl HookGenerator for ZshHook {
    fn files(&self, context: &HookContext) -> Vec<(&'static str, String)> {
        let mut files: Vec<(&'static str, String)> = ZSH_STARTUP_FILES
            .iter()
            .map(|name| (*name, source_if_present(&context.home.join(name))))
            .collect();

        let widget = format!(
            r#"xsh_ai_widget() {{
  local p_pipe={request}
  local r_pipe={response}
  local res
  print -rn -- "$BUFFER" > "$p_pipe"
  IFS= read -r res < "$r_pipe"
  if [[ -n "$res" ]]; then
    BUFFER=$res
    CURSOR=${{#BUFFER}}
  fi
  zle redisplay
}}
zle -N xsh_ai_widget
bindkey {key} xsh_ai_widget
"#,
            request = shell_quote(&context.request_pipe.to_string_lossy()),
            response = shell_quote(&context.response_pipe.to_string_lossy()),
            key = shell_quote(&context.key),
        );

        let rc = format!(
            "{}\n# xsh keybinding hook\n{}",
            source_if_present(&context.home.join(".zshrc")),
            widget
        );
        files.push((".zshrc", rc));
        files
    }

    fn rc_file(&self) -> Option<&'static str> {
        Some(".zshrc")
    }

    fn command(&self, shell: &str, profile_dir: &Path) -> CommandBuilder {
        let mut command = CommandBuilder::new(shell);
        command.arg("-l");
        command.env("ZDOTDIR", profile_dir);
        command
    }
}

impl HookGenerator for BashHook {
    fn files(&self, context: &HookContext) -> Vec<(&'static str, String)> {
        let rc = format!(
            r#"{source}
# xsh keybinding hook
xsh_zsh_only() {{
  printf '\n\033[31mxsh: AI assistance is only available for zsh.\033[0m\n'
}}
bind -x '"{key}": xsh_zsh_only'
"#,
            source = source_if_present(&context.home.join(".bashrc")),
            key = readline_key(&context.key),
        );
        vec![(".bashrc", rc)]
    }

    fn rc_file(&self) -> Option<&'static str> {
        Some(".bashrc")
    }

    fn command(&self, shell: &str, profile_dir: &Path) -> CommandBuilder {
        let mut command = CommandBuilder::new(shell);
        command.arg("--rcfile");
        command.arg(profile_dir.join(".bashrc"));
        command.arg("-i");
        command
    }
}

impl HookGenerator for PassthroughHook {
    fn files(&self, _context: &HookContext) -> Vec<(&'static str, String)> {
        Vec::new()
    }

    fn rc_file(&self) -> Option<&'static str> {
        None
    }

    fn command(&self, shell: &str, _profile_dir: &Path) -> CommandBuilder {
        let mut command = CommandBuilder::new(shell);
        command.arg("-l");
        command
    }
}

/// Writes the startup files for `kind` and returns the path of the one holding
/// the key binding.
pub fn install(
    kind: ShellKind,
    context: &HookContext,
    profile_dir: &Path,
) -> Result<Option<PathBuf>, SessionError> {
    let generator = kind.generator();

    for (name, contents) in generator.files(context) {
        let path = profile_dir.join(name);
        write_private(&path, &contents).map_err(|source| SessionError::Hook {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), "wrote startup file");
    }

    Ok(generator.rc_file().map(|name| profile_dir.join(name)))
}

fn write_private(path: &Path, contents: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents.as_bytes())
}

fn source_if_present(path: &Path) -> String {
    let quoted = shell_quote(&path.to_string_lossy());
    format!("# xsh startup script\nif [ -f {quoted} ]; then\n  source {quoted}\nfi\n")
}

/// Single-quotes `value` for POSIX shells.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// `^X` (zsh) to `\C-x` (readline). `^[` becomes `\e` anywhere in the
/// sequence; other notations pass through.
pub fn readline_key(key: &str) -> String {
    match key.strip_prefix('^') {
        Some(rest) if rest != "[" && rest.chars().count() == 1 => {
            format!(r"\C-{}", rest.to_ascii_lowercase())
        }
        _ => key.replace("^[", r"\e"),
    }
}
