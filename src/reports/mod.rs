// Reports module - spreadsheet rows and their output formats

pub mod rows;
pub mod writers;

pub use rows::{report_sheets, Cell, Row, Sheet};
pub use writers::{open_writer, write_sheets, CsvReportWriter, RowWriter, XlsxReportWriter};
