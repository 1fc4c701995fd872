use crate::error::Result;
use crate::types::Tick;
use std::path::Path;
use super::validator::TickValidator;

pub struct CsvConnector;

impl CsvConnector {
    /// Load a `timestamp,price,volume` CSV (RFC 3339 timestamps) into ticks
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Vec<Tick>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(path.as_ref())?;

        let mut ticks = Vec::new();
        for row in reader.deserialize() {
            let tick: Tick = row?;
            ticks.push(tick);
        }
        Ok(ticks)
    }

    /// Load and validate; fails below `min_rows` (default 100 ticks)
    pub fn load_and_validate<P: AsRef<Path>>(path: P, min_rows: Option<usize>) -> Result<Vec<Tick>> {
        let ticks = Self::load(&path)?;

        TickValidator::validate_prices(&ticks)?;
        TickValidator::validate_minimum_rows(&ticks, min_rows.unwrap_or(100))?;

        let out_of_order = TickValidator::count_out_of_order(&ticks);
        if out_of_order > 0 {
            log::warn!(
                "{} ticks in {} are out of timestamp order",
                out_of_order,
                path.as_ref().display()
            );
        }

        Ok(ticks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_rfc3339_rows() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "timestamp,price,volume").unwrap();
        writeln!(file, "2024-01-01T00:00:00Z,100.5,12").unwrap();
        writeln!(file, "2024-01-01T00:01:00Z, 101.0 ,3.5").unwrap();

        let ticks = CsvConnector::load(file.path()).unwrap();
        assert_eq!(ticks.len(), 2);
        assert_eq!(ticks[1].price, 101.0);
        assert!(CsvConnector::load_and_validate(file.path(), Some(3)).is_err());
        assert!(CsvConnector::load_and_validate(file.path(), Some(2)).is_ok());
    }
}
