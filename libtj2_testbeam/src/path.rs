use std::path::PathBuf;

use super::processor::Processor;

/// Global parameters shared by all processors of a path
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PathGlobals {
    pub gear_file: PathBuf,
    pub max_record_number: u64,
    pub verbosity: Option<String>,
    pub lcio_input_files: Vec<String>,
}

/// An ordered list of processors executed by one Marlin job
///
/// Paths are built once and then handed to the engine. A path that is scheduled several
/// times is shared through an `Rc` rather than rebuilt.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingPath {
    pub name: String,
    pub globals: PathGlobals,
    processors: Vec<Processor>,
}

impl ProcessingPath {
    pub fn new(name: &str, globals: PathGlobals) -> Self {
        Self {
            name: name.to_string(),
            globals,
            processors: Vec::new(),
        }
    }

    pub fn add_processor(&mut self, processor: Processor) {
        self.processors.push(processor);
    }

    pub fn processors(&self) -> &[Processor] {
        &self.processors
    }

    pub fn processor_names(&self) -> Vec<&str> {
        self.processors.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.processors.iter().any(|p| p.name == name)
    }
}
