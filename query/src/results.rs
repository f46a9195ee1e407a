use arrow::array::{ArrayRef, RecordBatch, StringArray};
use arrow::compute::{CastOptions, cast_with_options};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::util::pretty::pretty_format_batches;
use common::Result;
use std::sync::Arc;

/// A result column as described by the query service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub type_name: String,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// Maps a service type name onto the Arrow type cells are parsed into.
pub fn arrow_type(type_name: &str) -> DataType {
    let normalized = type_name.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "boolean" => DataType::Boolean,
        "tinyint" | "smallint" | "integer" | "int" | "bigint" => DataType::Int64,
        "float" | "real" | "double" => DataType::Float64,
        "date" => DataType::Date32,
        other if other.starts_with("decimal") => DataType::Float64,
        _ => DataType::Utf8,
    }
}

#[derive(Debug, Clone)]
pub struct QueryResults {
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
}

impl QueryResults {
    /// Builds typed results from string cells. Missing or unparseable cells
    /// become null.
    pub fn from_rows(columns: &[ColumnSpec], rows: &[Vec<Option<String>>]) -> Result<Self> {
        let schema = Arc::new(Schema::new(
            columns
                .iter()
                .map(|c| Field::new(&c.name, arrow_type(&c.type_name), true))
                .collect::<Vec<_>>(),
        ));

        if rows.is_empty() {
            return Ok(Self {
                schema,
                batches: Vec::new(),
            });
        }

        let options = CastOptions::default();
        let arrays = schema
            .fields()
            .iter()
            .enumerate()
            .map(|(idx, field)| {
                let text: StringArray = rows
                    .iter()
                    .map(|row| row.get(idx).cloned().flatten())
                    .collect();
                let text: ArrayRef = Arc::new(text);
                if field.data_type() == &DataType::Utf8 {
                    Ok(text)
                } else {
                    cast_with_options(&text, field.data_type(), &options)
                }
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let batch = RecordBatch::try_new(schema.clone(), arrays)?;
        Ok(Self {
            schema,
            batches: vec![batch],
        })
    }

    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(|b| b.num_rows()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    /// Pretty table of the first `n` rows.
    pub fn preview(&self, n: usize) -> Result<String> {
        let mut remaining = n;
        let mut head = Vec::new();
        for batch in &self.batches {
            if remaining == 0 {
                break;
            }
            let take = remaining.min(batch.num_rows());
            head.push(batch.slice(0, take));
            remaining -= take;
        }
        Ok(pretty_format_batches(&head)?.to_string())
    }
}
