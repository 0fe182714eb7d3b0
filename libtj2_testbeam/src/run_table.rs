// The run look-up table is the logbook export of the testbeam campaign. It is a CSV file with
// a header row; only three columns matter here:
// Type,Run no,Device
// Rows with Type "Run" link a run number to the device that was mounted as DUT. Other rows
// (comments, configuration changes, ...) are ignored. Free-text columns may be quoted and
// contain commas.
use std::io::Read;
use std::path::Path;

use csv::StringRecord;
use fxhash::FxHashMap;

use super::error::RunTableError;

const TYPE_COLUMN: &str = "Type";
const RUN_COLUMN: &str = "Run no";
const DEVICE_COLUMN: &str = "Device";
const RUN_TYPE: &str = "Run";

/// Mapping of run number to the DUT device recorded in the logbook
#[derive(Debug, Clone, Default)]
pub struct RunTable {
    map: FxHashMap<String, String>,
}

fn column_index(headers: &StringRecord, name: &'static str) -> Result<usize, RunTableError> {
    headers
        .iter()
        .position(|h| h == name)
        .ok_or(RunTableError::MissingColumn(name))
}

impl RunTable {
    /// Read a run table from a CSV file
    pub fn new(path: &Path) -> Result<Self, RunTableError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    /// Parse the CSV contents of a run table
    pub fn parse(contents: &str) -> Result<Self, RunTableError> {
        Self::from_reader(contents.as_bytes())
    }

    fn from_reader<R: Read>(source: R) -> Result<Self, RunTableError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(source);

        let headers = reader.headers()?.clone();
        let type_idx = column_index(&headers, TYPE_COLUMN)?;
        let run_idx = column_index(&headers, RUN_COLUMN)?;
        let device_idx = column_index(&headers, DEVICE_COLUMN)?;
        let needed = type_idx.max(run_idx).max(device_idx) + 1;

        let mut table = RunTable::default();
        for (idx, result) in reader.records().enumerate() {
            let record = result?;
            if record.len() < needed {
                // header is line 1
                return Err(RunTableError::BadFileFormat(idx + 2));
            }
            if record.get(type_idx) != Some(RUN_TYPE) {
                continue;
            }
            if let (Some(run), Some(device)) = (record.get(run_idx), record.get(device_idx)) {
                table.map.insert(run.to_string(), device.to_string());
            }
        }
        Ok(table)
    }

    /// Device recorded for a run, if the run is in the table
    pub fn device_for_run(&self, run_number: u32) -> Option<&str> {
        self.map.get(&run_number.to_string()).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "Date,Type,Run no,Device,Comment\n\
        2022-06-30,Run,826,W14R12,\n\
        2022-06-30,Config,826,W14R13,threshold scan\n\
        2022-07-01,Run,827,W14R13,\n\
        \n";

    #[test]
    fn test_lookup_runs_only() {
        let table = RunTable::parse(TABLE).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.device_for_run(826), Some("W14R12"));
        assert_eq!(table.device_for_run(827), Some("W14R13"));
        assert_eq!(table.device_for_run(828), None);
    }

    #[test]
    fn test_quoted_fields_keep_columns() {
        let table = RunTable::parse(
            "Date,Comment,Type,Run no,Device\n\
             2022-06-30,\"HV on, 5V\",Run,826,W14R12\n\
             2022-06-30,\"beam off, access\",Run,827, W14R13 \n",
        )
        .unwrap();
        assert_eq!(table.device_for_run(826), Some("W14R12"));
        assert_eq!(table.device_for_run(827), Some("W14R13"));
    }

    #[test]
    fn test_bad_tables() {
        assert!(matches!(
            RunTable::parse("Date,Run no,Device\n"),
            Err(RunTableError::MissingColumn("Type"))
        ));
        assert!(matches!(
            RunTable::parse("Type,Run no,Device\nRun,826\n"),
            Err(RunTableError::BadFileFormat(2))
        ));
        assert!(RunTable::parse("Type,Run no,Device\n").unwrap().is_empty());
    }
}
