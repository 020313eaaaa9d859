//! Init command module for procwatch
//!
//! Generates configuration file with sample settings.

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::ProcwatchError;

/// Init command for generating configuration file
pub struct InitCommand;

impl InitCommand {
    /// Execute the init command to generate configuration file
    ///
    /// # Arguments
    /// * `force` - If true, overwrite existing file without confirmation
    ///
    /// # Returns
    /// * `Ok(PathBuf)` - Path to the generated file
    /// * `Err(ProcwatchError)` - If generation fails
    pub fn execute(force: bool) -> Result<PathBuf, ProcwatchError> {
        let config_path = Config::config_path().ok_or_else(|| {
            ProcwatchError::ConfigCreationError("Unable to determine config path".to_string())
        })?;
        Self::write_to(&config_path, force)?;
        Ok(config_path)
    }

    /// Write the sample configuration to `path`, creating parent directories
    ///
    /// An existing file is only replaced with `force` or after a yes on stdin.
    pub fn write_to(path: &Path, force: bool) -> Result<(), ProcwatchError> {
        Self::write_with_answers(path, force, &mut io::stdin().lock(), &mut io::stderr())
    }

    fn write_with_answers<R: BufRead, W: Write>(
        path: &Path,
        force: bool,
        answers: &mut R,
        prompt: &mut W,
    ) -> Result<(), ProcwatchError> {
        if path.exists() && !force {
            let replace = ask_replace(path, answers, prompt).map_err(|e| {
                ProcwatchError::ConfigCreationError(format!(
                    "Failed to read overwrite answer: {}",
                    e
                ))
            })?;
            if !replace {
                return Err(ProcwatchError::ConfigCreationError(
                    "Operation cancelled".to_string(),
                ));
            }
        }

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| {
                ProcwatchError::ConfigCreationError(format!(
                    "Failed to create directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
        }

        fs::write(path, Self::default_config_content()).map_err(|e| {
            ProcwatchError::ConfigCreationError(format!(
                "Failed to write config file {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Generate default configuration content with comments
    pub fn default_config_content() -> String {
        r#"# procwatch configuration file
# Command line options take precedence over these settings.

# Output: how each process event is printed on stdout.
#   - "text": one human-readable line per event
#   - "json": one JSON object per line
[output]
format = "text"

# Channel: netlink socket settings.
# receive_buffer is the size in bytes of the buffer each datagram is read
# into. Values smaller than one event frame are raised automatically;
# values above 1048576 (1 MiB) are rejected.
[channel]
receive_buffer = 4096
"#
        .to_string()
    }
}

/// Ask whether `path` may be replaced; anything but y/yes (or EOF) is a no
fn ask_replace<R: BufRead, W: Write>(
    path: &Path,
    answers: &mut R,
    prompt: &mut W,
) -> io::Result<bool> {
    write!(
        prompt,
        "{} already exists. Replace it with the sample config? [y/N]: ",
        path.display()
    )?;
    prompt.flush()?;

    let mut answer = String::new();
    answers.read_line(&mut answer)?;
    Ok(matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "y" | "yes"
    ))
}
