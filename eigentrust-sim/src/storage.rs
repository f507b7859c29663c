//! # Storage Module.
//!
//! This module contains generic storage traits and the file backends used
//! for configuration and simulation results.

use crate::error::EigenError;
use csv::{ReaderBuilder, WriterBuilder};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{from_reader, to_string_pretty};
use std::{
	fs::{create_dir_all, File},
	io::{BufReader, Write},
	marker::PhantomData,
	path::{Path, PathBuf},
};

/// Somewhere a value is loaded from and saved to.
pub trait Storage<T> {
	/// The error type.
	type Err;

	/// Loads data from storage.
	fn load(&self) -> Result<T, Self::Err>;
	/// Saves data to storage.
	fn save(&mut self, data: T) -> Result<(), Self::Err>;
}

/// Simulation results, one `AgentSummary` per line under a header.
///
/// # Examples
///
/// ```no_run
/// use eigentrust_sim::{
/// 	simulation::{AgentSummary, Simulation},
/// 	storage::{CSVFileStorage, Storage},
/// 	strategy::Behaviour,
/// 	TrustConfig,
/// };
/// use std::path::PathBuf;
///
/// let mut sim = Simulation::new(TrustConfig::default(), 7).unwrap();
/// let agents = sim.spawn(4, Behaviour::Honest, false);
/// sim.introduce(&agents);
///
/// let mut storage = CSVFileStorage::<AgentSummary>::new(PathBuf::from("assets/results.csv"));
/// storage.save(sim.summary()).unwrap();
/// assert_eq!(storage.load().unwrap().len(), 4);
/// ```
pub struct CSVFileStorage<T> {
	filepath: PathBuf,
	phantom: PhantomData<T>,
}

impl<T> CSVFileStorage<T> {
	/// Creates a new CSVFileStorage.
	pub fn new(filepath: PathBuf) -> Self {
		Self { filepath, phantom: PhantomData }
	}

	/// Returns the path to the file.
	pub fn filepath(&self) -> &PathBuf {
		&self.filepath
	}
}

impl<T: Serialize + DeserializeOwned> Storage<Vec<T>> for CSVFileStorage<T> {
	type Err = EigenError;

	fn load(&self) -> Result<Vec<T>, EigenError> {
		let file = File::open(&self.filepath).map_err(EigenError::IOError)?;
		let mut reader = ReaderBuilder::new().from_reader(BufReader::new(file));
		reader.deserialize().map(|row| row.map_err(csv_error)).collect()
	}

	fn save(&mut self, rows: Vec<T>) -> Result<(), EigenError> {
		create_parent(&self.filepath)?;
		let mut writer = WriterBuilder::new().from_path(&self.filepath).map_err(csv_error)?;
		for row in &rows {
			writer.serialize(row).map_err(csv_error)?;
		}
		writer.flush().map_err(EigenError::IOError)
	}
}

/// A single value, such as the `TrustConfig`, kept as pretty JSON.
pub struct JSONFileStorage<T> {
	filepath: PathBuf,
	phantom: PhantomData<T>,
}

impl<T> JSONFileStorage<T> {
	/// Creates a new JSONFileStorage.
	pub fn new(filepath: PathBuf) -> Self {
		Self { filepath, phantom: PhantomData }
	}

	/// Returns the path to the file.
	pub fn filepath(&self) -> &PathBuf {
		&self.filepath
	}
}

impl<T: Serialize + DeserializeOwned> Storage<T> for JSONFileStorage<T> {
	type Err = EigenError;

	fn load(&self) -> Result<T, Self::Err> {
		let file = File::open(&self.filepath).map_err(EigenError::IOError)?;
		from_reader(BufReader::new(file)).map_err(json_error)
	}

	fn save(&mut self, value: T) -> Result<(), Self::Err> {
		let json = to_string_pretty(&value).map_err(json_error)?;
		create_parent(&self.filepath)?;
		let mut file = File::create(&self.filepath).map_err(EigenError::IOError)?;
		file.write_all(json.as_bytes()).map_err(EigenError::IOError)
	}
}

fn csv_error(e: csv::Error) -> EigenError {
	EigenError::FileIOError(e.to_string())
}

fn json_error(e: serde_json::Error) -> EigenError {
	EigenError::ParsingError(e.to_string())
}

/// Creates the directory a file is about to be written into.
fn create_parent(filepath: &Path) -> Result<(), EigenError> {
	match filepath.parent() {
		Some(dir) if !dir.as_os_str().is_empty() => {
			create_dir_all(dir).map_err(EigenError::IOError)
		},
		_ => Ok(()),
	}
}
