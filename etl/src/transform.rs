use chrono::{Local, NaiveDate};
use common::{Error, Result};
use datafusion::arrow::compute::can_cast_types;
use datafusion::arrow::datatypes::{DataType, TimeUnit};
use datafusion::logical_expr::{cast, ident, try_cast, when};
use datafusion::prelude::*;
use tracing::{info, warn};

pub const PARTITION_COLUMNS: [&str; 3] = ["ano", "mes", "dia"];
pub const TEXT_NULL_FILL: &str = "desconhecido";
pub const TOTAL_VALUE_COLUMN: &str = "valor_total";

const PRICE_COLUMN: &str = "preco";
const QUANTITY_COLUMN: &str = "quantidade";
const DATE_MARKERS: [&str; 2] = ["data", "date"];

/// Year/month/day partition values shared by every row of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionKey {
    pub year: String,
    pub month: String,
    pub day: String,
}

impl PartitionKey {
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.format("%Y").to_string(),
            month: date.format("%m").to_string(),
            day: date.format("%d").to_string(),
        }
    }

    pub fn today() -> Self {
        Self::from_date(Local::now().date_naive())
    }

    /// Parses `YYYY-MM-DD`.
    pub fn parse(value: &str) -> Result<Self> {
        NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .map(Self::from_date)
            .map_err(|_| Error::InvalidDate(value.to_string()))
    }

    fn values(&self) -> [&str; 3] {
        [&self.year, &self.month, &self.day]
    }
}

#[derive(Default)]
pub struct DataTransformer;

impl DataTransformer {
    pub fn new() -> Self {
        Self
    }

    pub async fn transform(&self, df: DataFrame, partition: &PartitionKey) -> Result<DataFrame> {
        if df.schema().fields().is_empty() {
            return Err(Error::EmptyInput("dataset has no columns".to_string()));
        }
        let input_rows = df.clone().count().await?;
        if input_rows == 0 {
            return Err(Error::EmptyInput("dataset has no rows".to_string()));
        }
        info!(rows = input_rows, "Starting transformation");

        // Partition columns must exist before the null-fill exclusion
        let df = self.add_partition_columns(df, partition)?;

        let df = df.distinct()?.cache().await?;
        let unique_rows = df.clone().count().await?;
        info!(
            rows = unique_rows,
            removed = input_rows - unique_rows,
            "Duplicates removed"
        );

        let df = self.fill_nulls(df)?;
        let df = self.coerce_date_columns(df)?;
        let df = self.derive_total_value(df)?;

        info!(rows = unique_rows, "Transformation complete");
        Ok(df)
    }

    /// Replaces any existing partition columns rather than duplicating them.
    fn add_partition_columns(&self, df: DataFrame, partition: &PartitionKey) -> Result<DataFrame> {
        let mut select_exprs: Vec<Expr> = df
            .schema()
            .fields()
            .iter()
            .filter(|f| !PARTITION_COLUMNS.contains(&f.name().as_str()))
            .map(|f| ident(f.name()))
            .collect();

        for (name, value) in PARTITION_COLUMNS.iter().zip(partition.values()) {
            select_exprs.push(lit(value.to_string()).alias(*name));
        }

        Ok(df.select(select_exprs)?)
    }

    fn fill_nulls(&self, df: DataFrame) -> Result<DataFrame> {
        let mut select_exprs = Vec::with_capacity(df.schema().fields().len());

        for field in df.schema().fields() {
            let name = field.name();
            let column = ident(name);
            let data_type = field.data_type();

            let expr = if data_type == &DataType::Null {
                // Inferred from a column with no values at all
                lit(0.0f64).alias(name)
            } else if data_type.is_numeric() {
                when(column.clone().is_null(), cast(lit(0i64), data_type.clone()))
                    .otherwise(column)?
                    .alias(name)
            } else if is_text(data_type) && !PARTITION_COLUMNS.contains(&name.as_str()) {
                when(column.clone().is_null(), lit(TEXT_NULL_FILL))
                    .otherwise(column)?
                    .alias(name)
            } else {
                column
            };
            select_exprs.push(expr);
        }

        Ok(df.select(select_exprs)?)
    }

    /// Best-effort: values that do not parse become null, columns whose type
    /// cannot be cast at all are left untouched.
    fn coerce_date_columns(&self, df: DataFrame) -> Result<DataFrame> {
        let target = DataType::Timestamp(TimeUnit::Millisecond, None);
        let mut select_exprs = Vec::with_capacity(df.schema().fields().len());

        for field in df.schema().fields() {
            let name = field.name();
            let column = ident(name);

            if !is_date_column(name) || matches!(field.data_type(), DataType::Timestamp(_, _)) {
                select_exprs.push(column);
                continue;
            }

            if can_cast_types(field.data_type(), &target) {
                info!(column = %name, from = %field.data_type(), "Converting column to timestamp");
                select_exprs.push(try_cast(column, target.clone()).alias(name));
            } else {
                warn!(
                    column = %name,
                    data_type = %field.data_type(),
                    "Could not convert column to timestamp"
                );
                select_exprs.push(column);
            }
        }

        Ok(df.select(select_exprs)?)
    }

    fn derive_total_value(&self, df: DataFrame) -> Result<DataFrame> {
        let schema = df.schema();
        if !(schema.has_column_with_unqualified_name(PRICE_COLUMN)
            && schema.has_column_with_unqualified_name(QUANTITY_COLUMN))
        {
            return Ok(df);
        }

        let df = df.with_column(
            TOTAL_VALUE_COLUMN,
            ident(PRICE_COLUMN) * ident(QUANTITY_COLUMN),
        )?;
        info!(column = TOTAL_VALUE_COLUMN, "Derived column created");
        Ok(df)
    }
}

fn is_text(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View
    )
}

fn is_date_column(name: &str) -> bool {
    let lower = name.to_lowercase();
    DATE_MARKERS.iter().any(|marker| lower.contains(marker))
}
