//! Launcher registration
//!
//! With `auto_register`, the client asks the OS to route
//! `discord-<application id>://` URIs to the running program (or to Steam,
//! when a Steam app id is given) so the peer can launch it from an invite.

use crate::error::{Result, RpcError};

/// OS integration capability used by `initialize(.., auto_register = true, ..)`
pub trait LauncherRegistrar: Send {
    fn register_launcher(&self, application_id: &str, steam_id: Option<&str>) -> Result;
}

/// Registers nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRegistrar;

impl LauncherRegistrar for NoopRegistrar {
    fn register_launcher(&self, application_id: &str, _steam_id: Option<&str>) -> Result {
        log::debug!("Launcher registration skipped for {}", application_id);
        Ok(())
    }
}

/// Ids end up in file names and `.desktop` keys, so only ASCII
/// alphanumerics are accepted
fn check_id(kind: &str, id: &str) -> Result {
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(RpcError::Registration(format!("invalid {}: {:?}", kind, id)));
    }
    Ok(())
}

/// Quote one `Exec=` argument per the desktop entry spec
fn quote_exec_arg(arg: &str) -> String {
    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    for c in arg.chars() {
        if matches!(c, '"' | '`' | '$' | '\\') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// The command line the peer should run to launch us, ready for `Exec=`
pub fn launch_command(steam_id: Option<&str>) -> Result<String> {
    if let Some(steam_id) = steam_id.filter(|id| !id.is_empty()) {
        check_id("steam id", steam_id)?;
        return Ok(format!("xdg-open steam://rungameid/{}", steam_id));
    }
    let exe = std::env::current_exe()
        .map_err(|e| RpcError::Registration(format!("cannot resolve current executable: {}", e)))?;
    let exe = exe.display().to_string();
    if exe.contains('\n') {
        return Err(RpcError::Registration("executable path contains a newline".into()));
    }
    Ok(quote_exec_arg(&exe))
}

/// The `.desktop` entry registering the `discord-<id>` scheme handler
pub fn desktop_entry(application_id: &str, command: &str) -> String {
    format!(
        "[Desktop Entry]\n\
         Name=Game {id}\n\
         Exec={command} %u\n\
         Type=Application\n\
         NoDisplay=true\n\
         Categories=Discord;Games;\n\
         MimeType=x-scheme-handler/discord-{id};\n",
        id = application_id,
        command = command,
    )
}

/// freedesktop registration: writes a `.desktop` file and points
/// `x-scheme-handler/discord-<id>` at it through `xdg-mime`
#[cfg(unix)]
#[derive(Debug, Clone, Default)]
pub struct DesktopEntryRegistrar {
    applications_dir: Option<std::path::PathBuf>,
}

#[cfg(unix)]
impl DesktopEntryRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write entries into `dir` instead of `$XDG_DATA_HOME/applications`
    pub fn with_applications_dir<P: Into<std::path::PathBuf>>(dir: P) -> Self {
        Self {
            applications_dir: Some(dir.into()),
        }
    }

    fn applications_dir(&self) -> Result<std::path::PathBuf> {
        if let Some(dir) = &self.applications_dir {
            return Ok(dir.clone());
        }
        let data_home = std::env::var_os("XDG_DATA_HOME")
            .map(std::path::PathBuf::from)
            .or_else(|| {
                std::env::var_os("HOME").map(|home| std::path::Path::new(&home).join(".local/share"))
            })
            .ok_or_else(|| RpcError::Registration("neither XDG_DATA_HOME nor HOME is set".into()))?;
        Ok(data_home.join("applications"))
    }

    /// Write the entry and return its path
    pub fn write_entry(
        &self,
        application_id: &str,
        steam_id: Option<&str>,
    ) -> Result<std::path::PathBuf> {
        check_id("application id", application_id)?;
        let dir = self.applications_dir()?;
        std::fs::create_dir_all(&dir)
            .map_err(|e| RpcError::Registration(format!("{}: {}", dir.display(), e)))?;

        let path = dir.join(format!("discord-{}.desktop", application_id));
        let contents = desktop_entry(application_id, &launch_command(steam_id)?);
        std::fs::write(&path, contents)
            .map_err(|e| RpcError::Registration(format!("{}: {}", path.display(), e)))?;
        Ok(path)
    }
}

#[cfg(unix)]
impl LauncherRegistrar for DesktopEntryRegistrar {
    fn register_launcher(&self, application_id: &str, steam_id: Option<&str>) -> Result {
        let path = self.write_entry(application_id, steam_id)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let status = std::process::Command::new("xdg-mime")
            .args([
                "default",
                &file_name,
                &format!("x-scheme-handler/discord-{}", application_id),
            ])
            .status()
            .map_err(|e| RpcError::Registration(format!("xdg-mime: {}", e)))?;

        if !status.success() {
            return Err(RpcError::Registration(format!("xdg-mime exited with {}", status)));
        }
        log::debug!("Registered launcher {}", path.display());
        Ok(())
    }
}

/// The registrar used when none is injected
pub fn default_registrar() -> Box<dyn LauncherRegistrar> {
    #[cfg(all(unix, not(target_os = "macos")))]
    {
        Box::new(DesktopEntryRegistrar::new())
    }

    #[cfg(not(all(unix, not(target_os = "macos"))))]
    {
        Box::new(NoopRegistrar)
    }
}
