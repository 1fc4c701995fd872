mod csv;
mod validator;

pub use self::csv::CsvConnector;
pub use self::validator::TickValidator;
