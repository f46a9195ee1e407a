use crate::results::QueryResults;
use arrow::array::{Array, BooleanArray, Float64Array, Int64Array};
use arrow::csv::WriterBuilder;
use arrow::datatypes::DataType;
use arrow::util::display::{ArrayFormatter, FormatOptions};
use common::{Error, Result};
use parquet::arrow::ArrowWriter;
use rust_xlsxwriter::{Format, FormatAlign, Workbook, Worksheet, XlsxError};
use std::fmt;
use std::fs::{self, File};
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Csv,
    Parquet,
    Xlsx,
}

impl FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "parquet" => Ok(ExportFormat::Parquet),
            "xlsx" => Ok(ExportFormat::Xlsx),
            other => Err(Error::InvalidInput(format!("unsupported format: {}", other))),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Parquet => "parquet",
            ExportFormat::Xlsx => "xlsx",
        };
        f.write_str(name)
    }
}

fn xlsx_error(err: XlsxError) -> Error {
    Error::Export(err.to_string())
}

/// Writes `results` to `path` and returns the number of rows written.
/// Empty results write nothing.
pub fn save_results(results: &QueryResults, path: &Path, format: ExportFormat) -> Result<usize> {
    if results.is_empty() {
        warn!(file = %path.display(), "No results to save");
        return Ok(0);
    }

    ensure_parent_dir(path)?;

    match format {
        ExportFormat::Csv => write_csv(results, path)?,
        ExportFormat::Parquet => write_parquet(results, path)?,
        ExportFormat::Xlsx => write_xlsx(results, path)?,
    }

    let rows = results.num_rows();
    info!(file = %path.display(), format = %format, rows, "Results saved");
    Ok(rows)
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn write_csv(results: &QueryResults, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = WriterBuilder::new().with_header(true).build(file);
    for batch in results.batches() {
        writer.write(batch)?;
    }
    Ok(())
}

fn write_parquet(results: &QueryResults, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, results.schema(), None)?;
    for batch in results.batches() {
        writer.write(batch)?;
    }
    writer.close()?;
    Ok(())
}

fn header_format() -> Format {
    Format::new().set_bold().set_align(FormatAlign::Center)
}

fn write_xlsx(results: &QueryResults, path: &Path) -> Result<()> {
    let mut workbook = Workbook::new();
    let ws = workbook.add_worksheet();
    ws.set_name("Results").map_err(xlsx_error)?;

    let hfmt = header_format();
    for (c, field) in results.schema().fields().iter().enumerate() {
        ws.write_string_with_format(0, c as u16, field.name(), &hfmt)
            .map_err(xlsx_error)?;
    }

    let mut row: u32 = 1;
    for batch in results.batches() {
        for (c, column) in batch.columns().iter().enumerate() {
            write_xlsx_column(ws, row, c as u16, column.as_ref())?;
        }
        row += batch.num_rows() as u32;
    }

    workbook.save(path).map_err(xlsx_error)?;
    Ok(())
}

/// Numbers and booleans keep their cell type; everything else is written as
/// its display string. Nulls are left blank.
fn write_xlsx_column(ws: &mut Worksheet, first_row: u32, col: u16, array: &dyn Array) -> Result<()> {
    match array.data_type() {
        DataType::Int64 => {
            if let Some(values) = array.as_any().downcast_ref::<Int64Array>() {
                for (i, value) in values.iter().enumerate() {
                    if let Some(v) = value {
                        ws.write_number(first_row + i as u32, col, v as f64)
                            .map_err(xlsx_error)?;
                    }
                }
            }
        }
        DataType::Float64 => {
            if let Some(values) = array.as_any().downcast_ref::<Float64Array>() {
                for (i, value) in values.iter().enumerate() {
                    if let Some(v) = value {
                        ws.write_number(first_row + i as u32, col, v).map_err(xlsx_error)?;
                    }
                }
            }
        }
        DataType::Boolean => {
            if let Some(values) = array.as_any().downcast_ref::<BooleanArray>() {
                for (i, value) in values.iter().enumerate() {
                    if let Some(v) = value {
                        ws.write_boolean(first_row + i as u32, col, v).map_err(xlsx_error)?;
                    }
                }
            }
        }
        _ => {
            let formatter = ArrayFormatter::try_new(array, &FormatOptions::default())?;
            for i in 0..array.len() {
                if array.is_valid(i) {
                    let text = formatter.value(i).to_string();
                    ws.write_string(first_row + i as u32, col, text)
                        .map_err(xlsx_error)?;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::ColumnSpec;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    fn sample() -> QueryResults {
        QueryResults::from_rows(
            &[
                ColumnSpec::new("id", "bigint"),
                ColumnSpec::new("cliente", "varchar"),
                ColumnSpec::new("valor_total", "double"),
            ],
            &[
                vec![Some("1".into()), Some("Ana".into()), Some("21.0".into())],
                vec![Some("2".into()), None, Some("0.0".into())],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!("parquet".parse::<ExportFormat>().unwrap(), ExportFormat::Parquet);
        assert_eq!("Xlsx".parse::<ExportFormat>().unwrap(), ExportFormat::Xlsx);
        assert!("json".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn test_csv_export_creates_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/nested/resultado.csv");

        let rows = save_results(&sample(), &path, ExportFormat::Csv).unwrap();

        assert_eq!(rows, 2);
        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines[0], "id,cliente,valor_total");
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("1,Ana,21"));
    }

    #[test]
    fn test_parquet_export_is_readable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resultado.parquet");

        save_results(&sample(), &path, ExportFormat::Parquet).unwrap();

        let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(&path).unwrap())
            .unwrap()
            .build()
            .unwrap();
        let total: usize = reader.map(|b| b.unwrap().num_rows()).sum();
        assert_eq!(total, 2);
    }

    #[test]
    fn test_xlsx_export_writes_workbook() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resultado.xlsx");

        let rows = save_results(&sample(), &path, ExportFormat::Xlsx).unwrap();

        assert_eq!(rows, 2);
        let bytes = fs::read(&path).unwrap();
        // xlsx files are zip archives
        assert_eq!(&bytes[..2], b"PK");
    }

    #[test]
    fn test_empty_results_write_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vazio.csv");
        let empty = QueryResults::from_rows(&[ColumnSpec::new("id", "bigint")], &[]).unwrap();

        let rows = save_results(&empty, &path, ExportFormat::Csv).unwrap();

        assert_eq!(rows, 0);
        assert!(!path.exists());
    }
}
