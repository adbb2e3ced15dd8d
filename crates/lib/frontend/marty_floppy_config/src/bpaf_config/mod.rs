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

    marty_floppy_config::bpaf_config::mod.rs

    Command line arguments for martyfdd
*/

use std::path::PathBuf;

use crate::action::ImageAction;

use bpaf::{Bpaf, Parser};

fn action_arg() -> impl Parser<Vec<ImageAction>> {
    bpaf::short('a')
        .long("action")
        .help("Apply a file action to the image: add:HOST_PATH[:NAME], extract:NAME:HOST_PATH, delete:NAME, rename:OLD:NEW")
        .argument::<String>("action")
        .parse(|s| s.parse::<ImageAction>())
        .many()
}

#[derive(Bpaf)]
#[bpaf(options, version, generate(cli_args))]
#[derive(Debug, Default)]
pub struct CmdLineArgs {
    #[bpaf(long("config_file"), long("configfile"))]
    pub config_file: Option<PathBuf>,

    /// Raw 1.44MB FAT12 image to mount
    #[bpaf(short('i'), long)]
    pub image: Option<PathBuf>,

    /// Format a blank image if the image file does not exist
    #[bpaf(long, switch)]
    pub create: bool,

    /// Print the directory tree as JSON after all actions ran
    #[bpaf(long, switch)]
    pub tree: bool,

    /// Indent JSON output
    #[bpaf(long, switch)]
    pub pretty: bool,

    #[bpaf(external(action_arg))]
    pub actions: Vec<ImageAction>,
}
