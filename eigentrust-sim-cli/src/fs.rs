//! # Filesystem Actions Module.
//!
//! This module provides functionalities for filesystem actions.

use dotenv::{dotenv, var};
use eigentrust_sim::{
	error::EigenError,
	simulation::AgentSummary,
	storage::{CSVFileStorage, JSONFileStorage, Storage},
	TrustConfig,
};
use log::warn;
use std::{env::current_dir, path::PathBuf};

/// Library configuration file name.
pub const CONFIG_FILENAME: &str = "config";
/// Simulation results file name.
pub const RESULTS_FILENAME: &str = "results";

/// Enum representing the possible file extensions.
pub enum FileType {
	/// CSV file.
	Csv,
	/// JSON file.
	Json,
}

impl FileType {
	/// Converts the enum variant into its corresponding file extension.
	fn as_str(&self) -> &'static str {
		match self {
			FileType::Csv => "csv",
			FileType::Json => "json",
		}
	}
}

/// Loads the RNG seed from the environment, if one is set.
pub fn load_seed() -> Result<Option<u64>, EigenError> {
	dotenv().ok();
	match var("SIM_SEED") {
		Ok(seed) => seed
			.parse::<u64>()
			.map(Some)
			.map_err(|e| EigenError::ParsingError(format!("SIM_SEED: {}", e))),
		Err(_) => {
			warn!("SIM_SEED environment variable is not set. Using a random seed.");
			Ok(None)
		},
	}
}

/// Retrieves the path to the `assets` directory.
pub fn get_assets_path() -> Result<PathBuf, EigenError> {
	current_dir().map_err(EigenError::IOError).map(|current_dir| {
		// Workaround for the tests running in the crate directory.
		#[cfg(test)]
		{
			current_dir.join("assets")
		}

		#[cfg(not(test))]
		{
			current_dir.join("eigentrust-sim-cli/assets")
		}
	})
}

/// Helper function to get the path of a file in the `assets` directory.
pub fn get_file_path(file_name: &str, file_type: FileType) -> Result<PathBuf, EigenError> {
	let assets_path = get_assets_path()?;
	Ok(assets_path.join(format!("{}.{}", file_name, file_type.as_str())))
}

/// Loads the configuration file.
pub fn load_config() -> Result<TrustConfig, EigenError> {
	let filepath = get_file_path(CONFIG_FILENAME, FileType::Json)?;
	let config = JSONFileStorage::<TrustConfig>::new(filepath).load()?;
	config.validate()?;
	Ok(config)
}

/// Saves the configuration file.
pub fn save_config(config: &TrustConfig) -> Result<PathBuf, EigenError> {
	let filepath = get_file_path(CONFIG_FILENAME, FileType::Json)?;
	let mut storage = JSONFileStorage::<TrustConfig>::new(filepath);
	storage.save(config.clone())?;
	Ok(storage.filepath().clone())
}

/// Saves the per-agent results of a run.
pub fn save_results(rows: Vec<AgentSummary>) -> Result<PathBuf, EigenError> {
	let filepath = get_file_path(RESULTS_FILENAME, FileType::Csv)?;
	let mut storage = CSVFileStorage::<AgentSummary>::new(filepath);
	storage.save(rows)?;
	Ok(storage.filepath().clone())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_file_paths() {
		let config = get_file_path(CONFIG_FILENAME, FileType::Json).unwrap();
		assert!(config.ends_with("assets/config.json"));
		let results = get_file_path(RESULTS_FILENAME, FileType::Csv).unwrap();
		assert!(results.ends_with("assets/results.csv"));
	}

	#[test]
	fn test_load_bundled_config() {
		let config = load_config().unwrap();
		assert_eq!(config, TrustConfig::default());
	}
}
