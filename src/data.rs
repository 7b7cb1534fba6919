//! Customer CSV ingestion using Polars
//!
//! The uploaded table is read once, checked against the declared schema and
//! materialized as a typed [`CustomerBatch`]. Every later stage works on the
//! batch instead of probing the raw frame for columns.

use crate::errors::UpliftError;
use polars::prelude::*;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Contact channel; required
pub const CONTACT: &str = "contact";
/// Account balance; required, numeric
pub const BALANCE: &str = "balance";
/// Campaign response ("yes"/"no"); optional
pub const RESPONSE: &str = "y";
/// Call duration; optional, never used as a feature
pub const DURATION: &str = "duration";

/// Columns appended by the pipeline. Raw columns with these names are
/// superseded by the derived values in the results.
pub const DERIVED_COLUMNS: [&str; 8] = [
    "treatment",
    "outcome",
    "uplift",
    "deposit_amount",
    "value",
    "contact_cost",
    "expected_profit",
    "recommend_contact",
];

/// Rows shown in the upload preview
pub const PREVIEW_ROWS: usize = 5;

/// Column separator of the uploaded customer file
pub const INPUT_SEPARATOR: u8 = b';';

/// Typed values of one raw column
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValues {
    Integer(Vec<Option<i64>>),
    Float(Vec<Option<f64>>),
    Boolean(Vec<Option<bool>>),
    Text(Vec<Option<String>>),
}

impl FieldValues {
    pub fn len(&self) -> usize {
        match self {
            FieldValues::Integer(v) => v.len(),
            FieldValues::Float(v) => v.len(),
            FieldValues::Boolean(v) => v.len(),
            FieldValues::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Text columns are one-hot encoded, everything else passes through
    pub fn is_categorical(&self) -> bool {
        matches!(self, FieldValues::Text(_))
    }

    /// Numeric view of the column, nulls as NaN. `None` for text columns.
    pub fn as_f64(&self) -> Option<Vec<f64>> {
        let values: Vec<f64> = match self {
            FieldValues::Integer(v) => v.iter().map(|x| x.map_or(f64::NAN, |x| x as f64)).collect(),
            FieldValues::Float(v) => v.iter().map(|x| x.unwrap_or(f64::NAN)).collect(),
            FieldValues::Boolean(v) => v
                .iter()
                .map(|x| x.map_or(f64::NAN, |b| if b { 1.0 } else { 0.0 }))
                .collect(),
            FieldValues::Text(_) => return None,
        };
        Some(values)
    }

    /// Copy of the column with rows picked in `order`
    pub fn reorder(&self, order: &[usize]) -> FieldValues {
        match self {
            FieldValues::Integer(v) => FieldValues::Integer(pick(v, order)),
            FieldValues::Float(v) => FieldValues::Float(pick(v, order)),
            FieldValues::Boolean(v) => FieldValues::Boolean(pick(v, order)),
            FieldValues::Text(v) => FieldValues::Text(pick(v, order)),
        }
    }

    pub fn to_series(&self, name: &str) -> Series {
        match self {
            FieldValues::Integer(v) => Series::new(name, v),
            FieldValues::Float(v) => Series::new(name, v),
            FieldValues::Boolean(v) => Series::new(name, v),
            FieldValues::Text(v) => {
                let borrowed: Vec<Option<&str>> = v.iter().map(|s| s.as_deref()).collect();
                Series::new(name, borrowed)
            }
        }
    }
}

/// Rows of `values` in `order`
pub(crate) fn pick<T: Clone>(values: &[T], order: &[usize]) -> Vec<T> {
    order.iter().map(|&i| values[i].clone()).collect()
}

/// A named raw column
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub values: FieldValues,
}

/// One uploaded customer table, validated against the declared schema
#[derive(Debug, Clone)]
pub struct CustomerBatch {
    /// Raw columns in upload order
    fields: Vec<Field>,
    contact: Vec<Option<String>>,
    balance: Vec<Option<f64>>,
    response: Option<Vec<Option<String>>>,
    n_rows: usize,
}

impl CustomerBatch {
    /// Validate a parsed frame and materialize it as a batch
    ///
    /// # Errors
    /// * `MissingColumn` if `contact` or `balance` is absent (checked in that order)
    /// * `InvalidColumn` if `balance` is not numeric
    /// * `EmptyInput` if the frame has no rows
    pub fn from_frame(df: &DataFrame) -> crate::Result<Self> {
        let has_column = |name: &str| df.get_columns().iter().any(|s| s.name() == name);

        if !has_column(CONTACT) {
            return Err(UpliftError::MissingColumn(CONTACT).into());
        }
        if !has_column(BALANCE) {
            return Err(UpliftError::MissingColumn(BALANCE).into());
        }
        if df.height() == 0 {
            return Err(UpliftError::EmptyInput.into());
        }

        let mut fields = Vec::with_capacity(df.width());
        for series in df.get_columns() {
            let name = series.name().to_string();
            let values = if name == CONTACT || name == RESPONSE {
                // Declared categorical even when every value looks numeric
                FieldValues::Text(text_values(series)?)
            } else {
                field_values(series)?
            };
            fields.push(Field { name, values });
        }

        let balance_series = df.column(BALANCE)?;
        if !balance_series.dtype().is_numeric() {
            return Err(UpliftError::InvalidColumn {
                column: BALANCE.to_string(),
                reason: format!("expected numeric values, found {}", balance_series.dtype()),
            }
            .into());
        }
        let balance: Vec<Option<f64>> = balance_series
            .cast(&DataType::Float64)?
            .f64()?
            .into_iter()
            .collect();

        let contact = text_values(df.column(CONTACT)?)?;
        let response = if has_column(RESPONSE) {
            Some(text_values(df.column(RESPONSE)?)?)
        } else {
            debug!("Column '{}' absent; every outcome defaults to 0", RESPONSE);
            None
        };

        Ok(Self {
            fields,
            contact,
            balance,
            response,
            n_rows: df.height(),
        })
    }

    pub fn len(&self) -> usize {
        self.n_rows
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows == 0
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn contact(&self) -> &[Option<String>] {
        &self.contact
    }

    pub fn balance(&self) -> &[Option<f64>] {
        &self.balance
    }

    /// Campaign response column, if the upload carried one
    pub fn response(&self) -> Option<&[Option<String>]> {
        self.response.as_deref()
    }

    pub fn has_duration(&self) -> bool {
        self.fields.iter().any(|f| f.name == DURATION)
    }

    /// Raw columns usable as model inputs
    ///
    /// Excludes `duration` (only known after the call), the response column
    /// and the `treatment`/`outcome` labels. Other raw columns are kept even
    /// when the results later replace them with derived values.
    pub fn feature_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields
            .iter()
            .filter(|f| !matches!(f.name.as_str(), DURATION | RESPONSE | "treatment" | "outcome"))
    }

    /// Raw columns carried into the scored results
    pub fn result_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields
            .iter()
            .filter(|f| f.name != DURATION && !DERIVED_COLUMNS.contains(&f.name.as_str()))
    }

    /// The batch as uploaded, as a Polars frame
    pub fn to_frame(&self) -> crate::Result<DataFrame> {
        let columns = self
            .fields
            .iter()
            .map(|f| f.values.to_series(&f.name))
            .collect();
        Ok(DataFrame::new(columns)?)
    }

    /// First rows of the upload, for display before scoring
    pub fn preview(&self, rows: usize) -> crate::Result<DataFrame> {
        Ok(self.to_frame()?.head(Some(rows)))
    }
}

/// Typed values for a column whose kind is inferred from its dtype
fn field_values(series: &Series) -> crate::Result<FieldValues> {
    let dtype = series.dtype();
    let values = if *dtype == DataType::Boolean {
        FieldValues::Boolean(series.bool()?.into_iter().collect())
    } else if dtype.is_float() {
        FieldValues::Float(series.cast(&DataType::Float64)?.f64()?.into_iter().collect())
    } else if dtype.is_integer() {
        FieldValues::Integer(series.cast(&DataType::Int64)?.i64()?.into_iter().collect())
    } else {
        FieldValues::Text(text_values(series)?)
    };
    Ok(values)
}

fn text_values(series: &Series) -> crate::Result<Vec<Option<String>>> {
    let casted = series.cast(&DataType::String)?;
    let values = casted
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect();
    Ok(values)
}

fn csv_options() -> CsvReadOptions {
    CsvReadOptions::default()
        .with_has_header(true)
        // Infer over the whole upload so a late text value demotes the column
        .with_infer_schema_length(None)
        .with_parse_options(CsvParseOptions::default().with_separator(INPUT_SEPARATOR))
}

/// Parse a semicolon-delimited customer file from disk
pub fn read_customer_csv(path: impl AsRef<Path>) -> crate::Result<DataFrame> {
    let path = path.as_ref();
    let df = csv_options()
        .try_into_reader_with_file_path(Some(PathBuf::from(path)))?
        .finish()?;
    Ok(df)
}

/// Parse an uploaded customer file held in memory
pub fn read_customer_bytes(bytes: Vec<u8>) -> crate::Result<DataFrame> {
    let df = csv_options()
        .into_reader_with_file_handle(Cursor::new(bytes))
        .finish()?;
    Ok(df)
}

/// Parse a customer upload streamed from `reader`, such as stdin
pub fn read_customer_stream(mut reader: impl Read) -> crate::Result<DataFrame> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    read_customer_bytes(bytes)
}

/// Load and validate a customer upload
///
/// # Arguments
/// * `source` - Path to the CSV file, or `-` to read it from stdin
///
/// # Returns
/// * `CustomerBatch` ready for feature preparation
pub fn load_customers(source: &str) -> crate::Result<CustomerBatch> {
    let df = if source == "-" {
        read_customer_stream(std::io::stdin().lock())?
    } else {
        read_customer_csv(source)?
    };

    info!(
        "Parsed upload: {} rows x {} columns",
        df.height(),
        df.width()
    );

    CustomerBatch::from_frame(&df)
}
