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

    marty_floppy_config::action.rs

    Parses image action specs given on the command line or in the config file
*/

use std::{fmt::Display, path::PathBuf, str::FromStr};

use serde_derive::Deserialize;

/// One file operation to apply to the mounted image, in the order given.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(try_from = "String")]
pub enum ImageAction {
    /// `add:HOST_PATH[:IMAGE_NAME]`
    Add {
        host_path:  PathBuf,
        image_name: Option<String>,
    },
    /// `extract:IMAGE_NAME:HOST_PATH`
    Extract { image_name: String, host_path: PathBuf },
    /// `delete:IMAGE_NAME`
    Delete { image_name: String },
    /// `rename:OLD:NEW`
    Rename { old: String, new: String },
}

fn non_empty<'a>(part: &'a str, what: &str) -> Result<&'a str, String> {
    if part.is_empty() {
        Err(format!("Missing {what}"))
    }
    else {
        Ok(part)
    }
}

impl FromStr for ImageAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (verb, rest) = s.split_once(':').ok_or("Missing action arguments")?;

        match verb.to_lowercase().as_str() {
            "add" => {
                // Only treat the last component as an image name if it can't be part of a host path.
                match rest.rsplit_once(':') {
                    Some((path, name)) if !path.is_empty() && !name.contains(['/', '\\']) => Ok(ImageAction::Add {
                        host_path:  PathBuf::from(path),
                        image_name: Some(non_empty(name, "image file name")?.to_string()),
                    }),
                    _ => Ok(ImageAction::Add {
                        host_path:  PathBuf::from(non_empty(rest, "host path")?),
                        image_name: None,
                    }),
                }
            }
            "extract" => {
                let (name, path) = rest.split_once(':').ok_or("Missing host path")?;
                Ok(ImageAction::Extract {
                    image_name: non_empty(name, "image file name")?.to_string(),
                    host_path:  PathBuf::from(non_empty(path, "host path")?),
                })
            }
            "delete" => Ok(ImageAction::Delete {
                image_name: non_empty(rest, "image file name")?.to_string(),
            }),
            "rename" => {
                let (old, new) = rest.split_once(':').ok_or("Missing new file name")?;
                Ok(ImageAction::Rename {
                    old: non_empty(old, "file name")?.to_string(),
                    new: non_empty(new, "new file name")?.to_string(),
                })
            }
            other => Err(format!("Unknown action: {other}")),
        }
    }
}

impl TryFrom<String> for ImageAction {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl Display for ImageAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageAction::Add {
                host_path,
                image_name: Some(name),
            } => write!(f, "add {} as {}", host_path.display(), name),
            ImageAction::Add { host_path, .. } => write!(f, "add {}", host_path.display()),
            ImageAction::Extract { image_name, host_path } => {
                write!(f, "extract {} to {}", image_name, host_path.display())
            }
            ImageAction::Delete { image_name } => write!(f, "delete {}", image_name),
            ImageAction::Rename { old, new } => write!(f, "rename {} to {}", old, new),
        }
    }
}
