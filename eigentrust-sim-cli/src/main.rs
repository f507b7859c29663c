//! # Eigentrust Sim CLI
//!
//! This crate provides a CLI interface to run `eigentrust-sim` scenarios.

#![warn(trivial_casts)]
#![deny(
	absolute_paths_not_starting_with_crate, deprecated, future_incompatible, missing_docs,
	nonstandard_style, unreachable_code, unreachable_patterns
)]
#![forbid(unsafe_code)]
#![deny(
	// Complexity
 	clippy::unnecessary_cast,
	clippy::needless_question_mark,
	// Pedantic
 	clippy::cast_lossless,
 	clippy::cast_possible_wrap,
	// Perf
	clippy::redundant_clone,
	// Restriction
 	clippy::panic,
	// Style
 	clippy::let_and_return,
 	clippy::needless_borrow
)]

mod cli;
mod fs;
mod scenarios;

use clap::Parser;
use cli::*;
use dotenv::dotenv;
use eigentrust_sim::{error::EigenError, TrustConfig};
use env_logger::{init_from_env, Env};
use fs::load_config;
use log::info;

#[tokio::main]
async fn main() -> Result<(), EigenError> {
	dotenv().ok();
	init_from_env(Env::default().filter_or("LOG_LEVEL", "info"));
	let mut config: TrustConfig = load_config()?;

	match Cli::parse().mode {
		Mode::Run(run_data) => handle_run(config, run_data).await?,
		Mode::Scenarios => handle_scenarios(),
		Mode::Show => info!("Trust config:\n{:#?}", config),
		Mode::Update(update_data) => handle_update(&mut config, update_data)?,
	};

	Ok(())
}
