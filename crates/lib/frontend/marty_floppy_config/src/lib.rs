/*
    MartyPC
    https://github.com/dbalsom/martypc

    Copyright 2022-2025 Daniel Balsom

    Permission is hereby granted, free of charge, to any person obtaining a
    copy of this software and associated documentation files (the “Software”),
    to deal in the Software without restriction, including without limitation
    the rights to use, copy, modify, merge, publish, distribute, sublicense,
    and/or sell copies of the Software, and to permit persons to whom the
    Software is furnished to do so, subject to the following conditions:

    The above copyright notice and this permission notice shall be included in
    all copies or substantial portions of the Software.

    THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
    IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
    FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
    AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
    LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
    FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
    DEALINGS IN THE SOFTWARE.

    --------------------------------------------------------------------------

    marty_floppy_config::lib.rs

    Configuration file and command line handling for martyfdd
*/

//! The `marty_floppy_config` crate parses martyfdd's configuration file and overlays command
//! line arguments on top of it. Command line arguments always take priority over the
//! configuration file.
//!
//! Features:
//! - `use_bpaf`: Enable BPAF support for command line argument parsing.

mod action;
#[cfg(feature = "use_bpaf")]
mod bpaf_config;

use std::path::{Path, PathBuf};

use anyhow::Context;
use cfg_if::cfg_if;
use serde_derive::Deserialize;

pub use action::ImageAction;
#[cfg(feature = "use_bpaf")]
use bpaf_config::cli_args;
#[cfg(feature = "use_bpaf")]
pub use bpaf_config::CmdLineArgs;

/// Command line arguments, when command line parsing is compiled out.
#[cfg(not(feature = "use_bpaf"))]
#[derive(Debug, Default)]
pub struct CmdLineArgs {
    pub config_file: Option<PathBuf>,
    pub image: Option<PathBuf>,
    pub create: bool,
    pub tree: bool,
    pub pretty: bool,
    pub actions: Vec<ImageAction>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FloppyConfig {
    pub image: Option<PathBuf>,
    #[serde(default)]
    pub create_if_missing: bool,
    #[serde(default)]
    pub actions: Vec<ImageAction>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub print_tree: bool,
    #[serde(default)]
    pub pretty_json: bool,
    pub log_level: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConfigFileParams {
    #[serde(default)]
    pub floppy: FloppyConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl ConfigFileParams {
    pub fn overlay(&mut self, shell_args: CmdLineArgs) {
        if let Some(image) = shell_args.image {
            self.floppy.image = Some(image);
        }
        self.floppy.create_if_missing |= shell_args.create;

        // Command line actions run after any listed in the config file.
        self.floppy.actions.extend(shell_args.actions);

        self.output.print_tree |= shell_args.tree;
        self.output.pretty_json |= shell_args.pretty;
    }
}

pub fn read_config(toml_string: impl AsRef<str>, shell_args: CmdLineArgs) -> Result<ConfigFileParams, anyhow::Error> {
    let mut toml_args: ConfigFileParams = toml::from_str(toml_string.as_ref())?;

    toml_args.overlay(shell_args);
    Ok(toml_args)
}

/// Read the TOML configuration from a file path, parse and overlay command line arguments.
/// A missing file at `default_path` yields the default configuration; a config file named
/// on the command line must exist.
pub fn read_config_file<P>(default_path: P) -> Result<ConfigFileParams, anyhow::Error>
where
    P: AsRef<Path>,
{
    let shell_args: CmdLineArgs;

    cfg_if! {
        if #[cfg(feature = "use_bpaf")] {
            shell_args = cli_args().run();
        } else {
            shell_args = CmdLineArgs::default();
        }
    }

    // Allow configuration file path to be overridden by command line argument 'config_file'
    let toml_string = if let Some(configfile_path) = shell_args.config_file.as_ref() {
        std::fs::read_to_string(configfile_path)
            .with_context(|| format!("Couldn't read config file {}", configfile_path.display()))?
    }
    else {
        let default_path = default_path.as_ref();
        match std::fs::read_to_string(default_path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("Couldn't read config file {}", default_path.display()));
            }
        }
    };

    read_config(toml_string, shell_args)
}
