//! In-memory tabular dataset handed over by the loader.
//!
//! A [`Dataset`] wraps an Arrow [`RecordBatch`] whose columns have been
//! normalized to one physical type per declared field type:
//!
//! | field type | Arrow type |
//! |------------|------------|
//! | integer    | `Int64`    |
//! | float      | `Float64`  |
//! | string     | `Utf8`     |
//! | boolean    | `Boolean`  |
//! | date       | `Date32`   |
//!
//! Datasets are immutable; every transformation returns a new one.

use crate::catalog::FieldCatalog;
use crate::error::{DashSpecError, Result};
use crate::execution::selection::Scalar;
use crate::spec::FieldType;
use arrow::array::{
    Array, ArrayRef, BooleanArray, Date32Array, Float64Array, Int64Array, StringArray,
};
use arrow::compute::{cast, filter_record_batch};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use chrono::{Datelike, NaiveDate};
use std::sync::Arc;

/// Days between 0001-01-01 (CE day 1) and 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Days since 1970-01-01, the `Date32` representation.
pub fn epoch_days(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

pub fn date_from_epoch_days(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days.checked_add(UNIX_EPOCH_DAYS_FROM_CE)?)
}

/// The field type an Arrow type normalizes to, if supported.
pub fn field_type_of(data_type: &DataType) -> Option<FieldType> {
    match data_type {
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => Some(FieldType::Integer),
        DataType::Float16
        | DataType::Float32
        | DataType::Float64
        | DataType::Decimal128(_, _)
        | DataType::Decimal256(_, _) => Some(FieldType::Float),
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View | DataType::Null => {
            Some(FieldType::String)
        }
        DataType::Boolean => Some(FieldType::Boolean),
        DataType::Date32 | DataType::Date64 | DataType::Timestamp(_, _) => Some(FieldType::Date),
        DataType::Dictionary(_, value) => {
            field_type_of(value).filter(|ty| *ty == FieldType::String)
        }
        _ => None,
    }
}

/// Canonical Arrow type of a field type.
pub fn arrow_type(field_type: FieldType) -> DataType {
    match field_type {
        FieldType::Integer => DataType::Int64,
        FieldType::Float => DataType::Float64,
        FieldType::String => DataType::Utf8,
        FieldType::Boolean => DataType::Boolean,
        FieldType::Date => DataType::Date32,
    }
}

fn normalize(name: &str, array: &ArrayRef) -> Result<(Field, ArrayRef)> {
    let field_type = field_type_of(array.data_type()).ok_or_else(|| {
        DashSpecError::dataset(format!(
            "column '{name}' has unsupported type {}",
            array.data_type()
        ))
    })?;
    let target = arrow_type(field_type);
    let array = if array.data_type() == &target {
        Arc::clone(array)
    } else {
        cast(array, &target)?
    };
    Ok((Field::new(name, target, true), array))
}

/// Builds a canonical array of `field_type` from scalars.
///
/// Integers and floats convert into each other; any other mismatch becomes null.
pub fn array_from_scalars(field_type: FieldType, values: &[Option<Scalar>]) -> ArrayRef {
    match field_type {
        FieldType::Integer => Arc::new(
            values
                .iter()
                .map(|v| match v {
                    Some(Scalar::Int(i)) => Some(*i),
                    Some(Scalar::Float(f)) => Some(f.round() as i64),
                    _ => None,
                })
                .collect::<Int64Array>(),
        ),
        FieldType::Float => Arc::new(
            values
                .iter()
                .map(|v| match v {
                    Some(s @ (Scalar::Int(_) | Scalar::Float(_))) => s.as_f64(),
                    _ => None,
                })
                .collect::<Float64Array>(),
        ),
        FieldType::String => Arc::new(
            values
                .iter()
                .map(|v| match v {
                    Some(Scalar::Text(s)) => Some(s.as_str()),
                    _ => None,
                })
                .collect::<StringArray>(),
        ),
        FieldType::Boolean => Arc::new(
            values
                .iter()
                .map(|v| match v {
                    Some(Scalar::Bool(b)) => Some(*b),
                    _ => None,
                })
                .collect::<BooleanArray>(),
        ),
        FieldType::Date => Arc::new(
            values
                .iter()
                .map(|v| match v {
                    Some(Scalar::Date(d)) => Some(epoch_days(*d)),
                    _ => None,
                })
                .collect::<Date32Array>(),
        ),
    }
}

/// A read-only table of named, typed columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    batch: RecordBatch,
}

impl Dataset {
    /// Normalizes every column of `batch` to its canonical type.
    ///
    /// # Errors
    ///
    /// Returns [`DashSpecError::Dataset`] when a column has a type outside
    /// the five supported field types.
    pub fn new(batch: RecordBatch) -> Result<Self> {
        let schema = batch.schema();
        let mut fields = Vec::with_capacity(batch.num_columns());
        let mut columns = Vec::with_capacity(batch.num_columns());
        for (field, array) in schema.fields().iter().zip(batch.columns()) {
            let (field, array) = normalize(field.name(), array)?;
            fields.push(field);
            columns.push(array);
        }
        Self::assemble(fields, columns, batch.num_rows())
    }

    /// Builds a dataset from named arrays of equal length.
    pub fn from_columns<N: Into<String>>(columns: Vec<(N, ArrayRef)>) -> Result<Self> {
        let rows = columns.first().map(|(_, a)| a.len()).unwrap_or(0);
        let mut fields = Vec::with_capacity(columns.len());
        let mut arrays = Vec::with_capacity(columns.len());
        for (name, array) in columns {
            let (field, array) = normalize(&name.into(), &array)?;
            fields.push(field);
            arrays.push(array);
        }
        Self::assemble(fields, arrays, rows)
    }

    fn assemble(fields: Vec<Field>, columns: Vec<ArrayRef>, rows: usize) -> Result<Self> {
        let options = RecordBatchOptions::new().with_row_count(Some(rows));
        let batch =
            RecordBatch::try_new_with_options(Arc::new(Schema::new(fields)), columns, &options)?;
        Ok(Self { batch })
    }

    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    pub fn into_batch(self) -> RecordBatch {
        self.batch
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    pub fn column_names(&self) -> Vec<String> {
        self.batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.batch.schema().index_of(name).is_ok()
    }

    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.batch
            .column_by_name(name)
            .and_then(|array| field_type_of(array.data_type()))
    }

    /// Field catalog inferred from the column types.
    pub fn inferred_catalog(&self) -> FieldCatalog {
        self.batch
            .schema()
            .fields()
            .iter()
            .filter_map(|f| field_type_of(f.data_type()).map(|ty| (f.name().clone(), ty)))
            .collect()
    }

    pub fn array(&self, name: &str) -> Option<&ArrayRef> {
        self.batch.column_by_name(name)
    }

    /// Typed view of a column.
    pub fn column(&self, name: &str) -> Option<Column<'_>> {
        Column::from_array(self.batch.column_by_name(name)?.as_ref())
    }

    /// Keeps the rows where `mask` is true.
    pub fn filter(&self, mask: &BooleanArray) -> Result<Dataset> {
        Ok(Self {
            batch: filter_record_batch(&self.batch, mask)?,
        })
    }

    pub fn filter_rows(&self, keep: &[bool]) -> Result<Dataset> {
        self.filter(&BooleanArray::from(keep.to_vec()))
    }

    /// Replaces the column called `name`, or appends it when absent.
    pub fn with_column(&self, name: &str, array: ArrayRef) -> Result<Dataset> {
        if array.len() != self.num_rows() {
            return Err(DashSpecError::dataset(format!(
                "column '{name}' has {} rows, dataset has {}",
                array.len(),
                self.num_rows()
            )));
        }
        let (field, array) = normalize(name, &array)?;
        let schema = self.batch.schema();
        let mut fields: Vec<Field> = schema.fields().iter().map(|f| f.as_ref().clone()).collect();
        let mut columns = self.batch.columns().to_vec();
        match schema.index_of(name) {
            Ok(idx) => {
                fields[idx] = field;
                columns[idx] = array;
            }
            Err(_) => {
                fields.push(field);
                columns.push(array);
            }
        }
        Self::assemble(fields, columns, self.num_rows())
    }

    pub fn without_column(&self, name: &str) -> Result<Dataset> {
        let schema = self.batch.schema();
        let idx = schema
            .index_of(name)
            .map_err(|_| DashSpecError::ColumnNotFound {
                column: name.to_string(),
            })?;
        let mut fields: Vec<Field> = schema.fields().iter().map(|f| f.as_ref().clone()).collect();
        let mut columns = self.batch.columns().to_vec();
        fields.remove(idx);
        columns.remove(idx);
        Self::assemble(fields, columns, self.num_rows())
    }
}

/// Typed, borrowed view of a normalized column.
#[derive(Debug, Clone, Copy)]
pub enum Column<'a> {
    Int(&'a Int64Array),
    Float(&'a Float64Array),
    Text(&'a StringArray),
    Bool(&'a BooleanArray),
    Date(&'a Date32Array),
}

impl<'a> Column<'a> {
    fn from_array(array: &'a dyn Array) -> Option<Self> {
        let any = array.as_any();
        match array.data_type() {
            DataType::Int64 => any.downcast_ref::<Int64Array>().map(Column::Int),
            DataType::Float64 => any.downcast_ref::<Float64Array>().map(Column::Float),
            DataType::Utf8 => any.downcast_ref::<StringArray>().map(Column::Text),
            DataType::Boolean => any.downcast_ref::<BooleanArray>().map(Column::Bool),
            DataType::Date32 => any.downcast_ref::<Date32Array>().map(Column::Date),
            _ => None,
        }
    }

    fn array(&self) -> &'a dyn Array {
        match *self {
            Column::Int(a) => a,
            Column::Float(a) => a,
            Column::Text(a) => a,
            Column::Bool(a) => a,
            Column::Date(a) => a,
        }
    }

    pub fn field_type(&self) -> FieldType {
        match self {
            Column::Int(_) => FieldType::Integer,
            Column::Float(_) => FieldType::Float,
            Column::Text(_) => FieldType::String,
            Column::Bool(_) => FieldType::Boolean,
            Column::Date(_) => FieldType::Date,
        }
    }

    pub fn len(&self) -> usize {
        self.array().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn null_count(&self) -> usize {
        self.array().null_count()
    }

    pub fn is_null(&self, row: usize) -> bool {
        self.array().is_null(row)
    }

    /// Numeric view of a row; dates are days since the epoch.
    pub fn f64_at(&self, row: usize) -> Option<f64> {
        if self.is_null(row) {
            return None;
        }
        match self {
            Column::Int(a) => Some(a.value(row) as f64),
            Column::Float(a) => Some(a.value(row)),
            Column::Date(a) => Some(a.value(row) as f64),
            Column::Text(_) | Column::Bool(_) => None,
        }
    }

    /// Every row of an integer or float column; `None` for other types.
    /// NaN and infinities read as missing.
    pub fn numeric_values(&self) -> Option<Vec<Option<f64>>> {
        match self {
            Column::Int(_) | Column::Float(_) => Some(
                (0..self.len())
                    .map(|row| self.f64_at(row).filter(|v| v.is_finite()))
                    .collect(),
            ),
            _ => None,
        }
    }

    pub fn scalar_at(&self, row: usize) -> Option<Scalar> {
        if self.is_null(row) {
            return None;
        }
        match self {
            Column::Int(a) => Some(Scalar::Int(a.value(row))),
            Column::Float(a) => Some(Scalar::Float(a.value(row))),
            Column::Text(a) => Some(Scalar::Text(a.value(row).to_string())),
            Column::Bool(a) => Some(Scalar::Bool(a.value(row))),
            Column::Date(a) => date_from_epoch_days(a.value(row)).map(Scalar::Date),
        }
    }

    pub fn scalars(&self) -> Vec<Option<Scalar>> {
        (0..self.len()).map(|row| self.scalar_at(row)).collect()
    }

    /// Equality key of a row, used for distinct counts and duplicate detection.
    pub fn key_at(&self, row: usize) -> Option<String> {
        if self.is_null(row) {
            return None;
        }
        Some(match self {
            Column::Int(a) => a.value(row).to_string(),
            Column::Float(a) => a.value(row).to_string(),
            Column::Text(a) => a.value(row).to_string(),
            Column::Bool(a) => a.value(row).to_string(),
            Column::Date(a) => a.value(row).to_string(),
        })
    }
}
