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

    martyfdd_headless::lib.rs

    Headless frontend: mounts an image and applies file actions from the config and command line
*/

//! martyfdd headless front-end main library component.

#![forbid(unsafe_code)]

use std::path::Path;

use anyhow::{anyhow, Context};
use crossbeam_channel::Receiver;

use marty_floppy::{
    fat12::format::{create_image, VolumeLayout},
    FloppyController,
    FloppyEvent,
};
use marty_floppy_config::{ConfigFileParams, ImageAction};

pub const DEFAULT_CONFIG_FILE: &str = "./martyfdd.toml";

pub fn run() {
    // Resolve the configuration by parsing the configuration toml and merging it with
    // command line arguments.
    let config = match marty_floppy_config::read_config_file(DEFAULT_CONFIG_FILE) {
        Ok(config) => config,
        Err(e) => match e.downcast_ref::<std::io::Error>() {
            Some(io_err) if io_err.kind() == std::io::ErrorKind::NotFound => {
                eprintln!("Configuration file not found! Check the path given with --config_file.\n{:#}", e);
                std::process::exit(1);
            }
            Some(_) => {
                eprintln!("Unknown IO error reading configuration file:\n{:#}", e);
                std::process::exit(1);
            }
            None => {
                eprintln!(
                    "Failed to parse configuration file. There may be a typo or otherwise invalid toml:\n{:#}",
                    e
                );
                std::process::exit(1);
            }
        },
    };

    let log_level = config.output.log_level.as_deref().unwrap_or("info");
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    if let Err(e) = run_headless(&config) {
        log::error!("{:?}", e);
        eprintln!("martyfdd: {:#}", e);
        std::process::exit(1);
    }
}

/// Mount the configured image, apply every action in order, then optionally print the tree.
pub fn run_headless(config: &ConfigFileParams) -> Result<(), anyhow::Error> {
    let image_path = config
        .floppy
        .image
        .as_ref()
        .ok_or_else(|| anyhow!("No floppy image specified. Use --image or set floppy.image in the config file."))?;

    if !image_path.exists() {
        if config.floppy.create_if_missing {
            create_image(image_path, VolumeLayout::Pc1440K, None)
                .with_context(|| format!("Couldn't create image {}", image_path.display()))?;
            log::info!("Created blank {} image: {}", VolumeLayout::Pc1440K, image_path.display());
        }
        else {
            return Err(anyhow!(
                "Image {} does not exist. Use --create to format a new one.",
                image_path.display()
            ));
        }
    }

    let (event_sender, event_receiver) = crossbeam_channel::unbounded();
    let mut fdc = FloppyController::new().with_event_sender(event_sender);

    fdc.load_image(image_path)
        .with_context(|| format!("Couldn't load image {}", image_path.display()))?;

    for action in &config.floppy.actions {
        apply_action(&mut fdc, action).with_context(|| format!("Action '{}' failed", action))?;
        log::info!("Done: {}", action);
    }

    fdc.save_image().context("Couldn't flush image")?;

    if config.output.print_tree {
        println!("{}", fdc.directory_tree_json(config.output.pretty_json)?);
    }

    fdc.eject()?;
    drain_events(&event_receiver);
    Ok(())
}

fn apply_action(fdc: &mut FloppyController, action: &ImageAction) -> Result<(), anyhow::Error> {
    match action {
        ImageAction::Add { host_path, image_name } => {
            let data = std::fs::read(host_path).with_context(|| format!("Couldn't read {}", host_path.display()))?;
            let name = match image_name {
                Some(name) => name.clone(),
                None => file_name_of(host_path)?,
            };
            fdc.add_file(&name, &data)?;
        }
        ImageAction::Extract { image_name, host_path } => {
            let data = fdc.read_file(image_name)?;
            std::fs::write(host_path, &data).with_context(|| format!("Couldn't write {}", host_path.display()))?;
        }
        ImageAction::Delete { image_name } => fdc.delete_file(image_name)?,
        ImageAction::Rename { old, new } => fdc.rename_file(old, new)?,
    }
    Ok(())
}

fn file_name_of(path: &Path) -> Result<String, anyhow::Error> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("{} has no file name", path.display()))
}

fn drain_events(receiver: &Receiver<FloppyEvent>) {
    let mut transfers = 0;
    for event in receiver.try_iter() {
        if event == FloppyEvent::IoStarted {
            transfers += 1;
        }
    }
    log::debug!("Controller reported {} transfer(s)", transfers);
}
