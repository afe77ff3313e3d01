// Copyright 2025 dentsusoken
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use clap::{Args, Parser, Subcommand};
use depot_updater::commands::download::DownloadCommand;
use depot_updater::commands::list::{ListCommand, ListTarget};
use depot_updater::commands::update::UpdateCommand;
use depot_updater::config::new_updater_config;
use depot_updater::error::{Result, UpdaterError, format_error_with_color, get_exit_code};
use depot_updater::logging;
use std::io::IsTerminal;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "depot-updater")]
#[command(author, version, about = "Keeps a package depot in sync with remote package repositories", long_about = None)]
struct Cli {
    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Configuration file (default: $DEPOT_UPDATER_CONFIG or /etc/depot-updater/updater.toml)
    #[arg(short, long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download new packages, install them on the depot and notify clients
    #[command(visible_alias = "u")]
    Update {
        /// Only process this product (repeatable)
        #[arg(long = "product", value_name = "ID")]
        products: Vec<String>,

        /// Disable progress indicators
        #[arg(long)]
        no_progress: bool,
    },

    /// Download and verify new packages without installing them
    #[command(visible_alias = "d")]
    Download {
        /// Only process this product (repeatable)
        #[arg(long = "product", value_name = "ID")]
        products: Vec<String>,

        /// Download again even if a verified local copy exists
        #[arg(short, long)]
        force: bool,

        /// Disable progress indicators
        #[arg(long)]
        no_progress: bool,
    },

    /// Show repositories and packages
    #[command(visible_alias = "ls")]
    List(ListArgs),
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct ListArgs {
    /// All configured repositories
    #[arg(long)]
    repos: bool,

    /// Active repositories only
    #[arg(long)]
    active_repos: bool,

    /// Packages available in active repositories
    #[arg(long)]
    products: bool,

    /// Packages newer than what the depot has installed
    #[arg(long)]
    updatable: bool,
}

impl ListArgs {
    fn target(&self) -> ListTarget {
        if self.repos {
            ListTarget::Repositories
        } else if self.active_repos {
            ListTarget::ActiveRepositories
        } else if self.updatable {
            ListTarget::Updatable
        } else {
            ListTarget::Products
        }
    }
}

fn main() {
    let cli = Cli::parse();

    logging::setup_logger(cli.verbose);

    let config = match new_updater_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => exit_with(&e),
    };

    let result: Result<()> = (|| match cli.command {
        Commands::Update {
            products,
            no_progress,
        } => {
            let command = UpdateCommand::new(&config)?;
            command.execute(products, no_progress)
        }
        Commands::Download {
            products,
            force,
            no_progress,
        } => {
            let command = DownloadCommand::new(&config)?;
            command.execute(products, force, no_progress)
        }
        Commands::List(args) => {
            let command = ListCommand::new(&config)?;
            command.execute(args.target())
        }
    })();

    if let Err(e) = result {
        exit_with(&e);
    }
}

fn exit_with(error: &UpdaterError) -> ! {
    eprintln!(
        "{}",
        format_error_with_color(error, std::io::stderr().is_terminal())
    );
    std::process::exit(get_exit_code(error));
}
