//! Report output back ends

use anyhow::{Context, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_xlsxwriter::{Format, Workbook};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::rows::{Cell, Row, Sheet};
use crate::config::OutputFormat;

/// Destination for report sheets
pub trait RowWriter {
    fn write_rows(&mut self, sheet: &str, rows: &[Row]) -> Result<()>;

    /// Flush everything written so far, returning where the report ended up
    fn finish(&mut self) -> Result<PathBuf>;
}

/// Write each sheet as `<sheet>.csv` into a directory
pub struct CsvReportWriter {
    dir: PathBuf,
}

impl CsvReportWriter {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create output directory {:?}", dir))?;
        Ok(Self { dir })
    }
}

impl RowWriter for CsvReportWriter {
    fn write_rows(&mut self, sheet: &str, rows: &[Row]) -> Result<()> {
        let path = self.dir.join(format!("{}.csv", sheet));
        debug!("Writing {} rows to {:?}", rows.len(), path);

        let mut writer = csv::Writer::from_path(&path)
            .with_context(|| format!("Failed to create {:?}", path))?;
        for row in rows {
            writer.write_record(row.iter().map(|cell| cell.to_string()))?;
        }
        writer.flush()?;
        Ok(())
    }

    fn finish(&mut self) -> Result<PathBuf> {
        Ok(self.dir.clone())
    }
}

/// Write every sheet as a worksheet of one workbook
pub struct XlsxReportWriter {
    workbook: Workbook,
    path: PathBuf,
    money: Format,
}

impl XlsxReportWriter {
    /// `path` gets an `.xlsx` extension when it has none
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let mut path = path.as_ref().to_path_buf();
        if path.extension().is_none() {
            path.set_extension("xlsx");
        }
        Self {
            workbook: Workbook::new(),
            path,
            money: Format::new().set_num_format("0.00"),
        }
    }
}

// Money is always shown with cents; quantities keep their own precision
fn number_format<'a>(cell: &Cell, money: &'a Format) -> Option<&'a Format> {
    matches!(cell, Cell::Money(_)).then_some(money)
}

impl RowWriter for XlsxReportWriter {
    fn write_rows(&mut self, sheet: &str, rows: &[Row]) -> Result<()> {
        let worksheet = self.workbook.add_worksheet();
        worksheet.set_name(sheet)?;

        for (r, row) in rows.iter().enumerate() {
            let r = r as u32;
            for (c, cell) in row.iter().enumerate() {
                let c = c as u16;
                match cell {
                    Cell::Text(s) => {
                        worksheet.write_string(r, c, s)?;
                    }
                    Cell::Money(n) | Cell::Number(n) => {
                        let value = n.to_f64().unwrap_or_default();
                        match number_format(cell, &self.money) {
                            Some(format) => {
                                worksheet.write_number_with_format(r, c, value, format)?;
                            }
                            None => {
                                worksheet.write_number(r, c, value)?;
                            }
                        }
                    }
                    Cell::Integer(i) => {
                        worksheet.write_number(r, c, *i as f64)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<PathBuf> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }
        self.workbook
            .save(&self.path)
            .with_context(|| format!("Failed to save workbook {:?}", self.path))?;
        Ok(self.path.clone())
    }
}

/// Writer for the configured output format
pub fn open_writer(format: OutputFormat, path: &Path) -> Result<Box<dyn RowWriter>> {
    let writer: Box<dyn RowWriter> = match format {
        OutputFormat::Csv => Box::new(CsvReportWriter::new(path)?),
        OutputFormat::Xlsx => Box::new(XlsxReportWriter::new(path)),
    };
    Ok(writer)
}

/// Write all sheets and finish the report
pub fn write_sheets(writer: &mut dyn RowWriter, sheets: &[Sheet]) -> Result<PathBuf> {
    for sheet in sheets {
        writer.write_rows(sheet.name, &sheet.rows)?;
    }
    let path = writer.finish()?;
    info!("Report written to {:?}", path);
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sheet() -> Sheet {
        Sheet {
            name: "JOPPD",
            rows: vec![
                vec![Cell::from("Year"), Cell::from("Profit/Loss")],
                vec![Cell::Integer(2023), Cell::Money(dec!(450.00))],
                vec![Cell::Integer(2024), Cell::Money(dec!(-0.5))],
            ],
        }
    }

    #[test]
    fn test_csv_writer_one_file_per_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("report");
        let mut writer = CsvReportWriter::new(&out).unwrap();

        let path = write_sheets(&mut writer, &[sheet()]).unwrap();
        assert_eq!(path, out);

        let contents = std::fs::read_to_string(out.join("JOPPD.csv")).unwrap();
        assert_eq!(contents, "Year,Profit/Loss\n2023,450\n2024,-0.5\n");
    }

    #[test]
    fn test_xlsx_writer_adds_extension() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = XlsxReportWriter::new(dir.path().join("Tax Report"));

        let path = write_sheets(&mut writer, &[sheet()]).unwrap();
        assert_eq!(path, dir.path().join("Tax Report.xlsx"));

        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"PK"));
    }

    #[test]
    fn test_xlsx_number_format_follows_cell_kind() {
        let money = Format::new().set_num_format("0.00");
        assert!(number_format(&Cell::Money(dec!(450)), &money).is_some());
        assert!(number_format(&Cell::Money(dec!(-0.5)), &money).is_some());
        assert!(number_format(&Cell::Number(dec!(0.125)), &money).is_none());
        assert!(number_format(&Cell::Integer(2023), &money).is_none());
    }

    #[test]
    fn test_xlsx_writer_accepts_fractional_quantities() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = XlsxReportWriter::new(dir.path().join("holdings.xlsx"));
        let holdings = Sheet {
            name: "Holdings",
            rows: vec![
                vec![Cell::from("Quantity"), Cell::from("Cost")],
                vec![Cell::Number(dec!(0.125)), Cell::Money(dec!(450))],
            ],
        };

        let path = write_sheets(&mut writer, &[holdings]).unwrap();
        assert!(std::fs::read(path).unwrap().starts_with(b"PK"));
    }

    #[test]
    fn test_xlsx_rejects_invalid_sheet_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = XlsxReportWriter::new(dir.path().join("out.xlsx"));
        assert!(writer.write_rows("bad/name", &[]).is_err());
    }
}
