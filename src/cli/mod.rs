// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::DEFAULT_CONFIG_FILE;

/// Caption image and video datasets with a local vision model
#[derive(Parser, Debug)]
#[command(name = "dataset-tagger")]
#[command(version)]
#[command(about = "Write training captions next to images and video segments", long_about = None)]
pub struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true, env = "TAGGER_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Caption image files, videos, or every media file in a directory
    Caption(commands::CaptionArgs),

    /// Split one video into segments and caption each segment
    Video(commands::VideoArgs),

    /// Validate the configuration and ping the backend
    Check,
}

/// Execute CLI command
pub async fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Caption(args) => commands::caption(&cli.config, args).await,
        Commands::Video(args) => commands::video(&cli.config, args).await,
        Commands::Check => commands::check(&cli.config).await,
    }
}
