//! Parquet archive of named arrays.
//!
//! Schema: `name (Utf8)`, `shape (List<UInt64>)`, `values (List<Float64>)`, one row
//! per array. Names are the escaped segments joined with `/`.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{
    Array as _, ArrayRef, AsArray, Float64Array, Float64Builder, ListBuilder, StringBuilder,
    UInt64Array, UInt64Builder,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use dyb_core::{Array, PathKey};
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use crate::sanitize::{from_slash_name, to_slash_name};
use crate::{FormatError, malformed};

fn schema() -> Arc<Schema> {
    let list_u64_field = Arc::new(Field::new_list_field(DataType::UInt64, true));
    let list_f64_field = Arc::new(Field::new_list_field(DataType::Float64, true));
    Arc::new(Schema::new(vec![
        Field::new("name", DataType::Utf8, false),
        Field::new("shape", DataType::List(list_u64_field), false),
        Field::new("values", DataType::List(list_f64_field), false),
    ]))
}

fn is_list_of(dt: &DataType, inner: &DataType) -> bool {
    matches!(dt, DataType::List(f) if f.data_type() == inner)
}

/// Arrays as one Arrow record batch.
pub fn to_record_batch(arrays: &[(PathKey, Array)]) -> Result<RecordBatch, FormatError> {
    let mut name_builder = StringBuilder::new();
    let mut shape_builder = ListBuilder::new(UInt64Builder::new());
    let mut values_builder = ListBuilder::new(Float64Builder::new());

    for (key, array) in arrays {
        name_builder.append_value(to_slash_name(key));

        let dims = shape_builder.values();
        for &d in array.shape() {
            dims.append_value(d as u64);
        }
        shape_builder.append(true);

        values_builder.values().append_slice(array.data());
        values_builder.append(true);
    }

    let batch = RecordBatch::try_new(
        schema(),
        vec![
            Arc::new(name_builder.finish()) as ArrayRef,
            Arc::new(shape_builder.finish()) as ArrayRef,
            Arc::new(values_builder.finish()) as ArrayRef,
        ],
    )?;
    Ok(batch)
}

/// Inverse of [`to_record_batch`].
pub fn from_record_batch(
    batch: &RecordBatch,
    origin: &Path,
) -> Result<Vec<(PathKey, Array)>, FormatError> {
    let column = |name: &str, expected: fn(&DataType) -> bool| -> Result<ArrayRef, FormatError> {
        let idx = batch
            .schema()
            .index_of(name)
            .map_err(|_| malformed("parquet", origin, format!("missing column '{name}'")))?;
        let col = batch.column(idx);
        if !expected(col.data_type()) {
            return Err(malformed(
                "parquet",
                origin,
                format!("column '{name}' has type {:?}", col.data_type()),
            ));
        }
        Ok(col.clone())
    };

    let names = column("name", |dt| matches!(dt, DataType::Utf8))?;
    let shapes = column("shape", |dt| is_list_of(dt, &DataType::UInt64))?;
    let values = column("values", |dt| is_list_of(dt, &DataType::Float64))?;

    let names = names.as_string::<i32>();
    let shapes = shapes.as_list::<i32>();
    let values = values.as_list::<i32>();

    let mut out = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let key = from_slash_name(names.value(i))?;

        let dims = shapes.value(i);
        let dims = dims
            .as_any()
            .downcast_ref::<UInt64Array>()
            .ok_or_else(|| malformed("parquet", origin, "shape is not UInt64"))?;
        let shape: Vec<usize> = dims.values().iter().map(|&d| d as usize).collect();

        let data = values.value(i);
        let data = data
            .as_any()
            .downcast_ref::<Float64Array>()
            .ok_or_else(|| malformed("parquet", origin, "values are not Float64"))?;

        let array = Array::new(shape, data.values().to_vec())
            .map_err(|e| malformed("parquet", origin, e.to_string()))?;
        out.push((key, array));
    }
    Ok(out)
}

pub fn save(path: &Path, arrays: &[(PathKey, Array)]) -> Result<(), FormatError> {
    let batch = to_record_batch(arrays)?;
    let props = WriterProperties::builder().set_compression(Compression::SNAPPY).build();

    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

pub fn load(path: &Path) -> Result<Vec<(PathKey, Array)>, FormatError> {
    let file = File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
    let mut out = Vec::new();
    for batch in reader {
        out.extend(from_record_batch(&batch?, path)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_layout() {
        let arrays = vec![
            (PathKey::parse("a.b").unwrap(), Array::vector(vec![1.0, 2.0])),
            (PathKey::parse("c").unwrap(), Array::scalar(3.0)),
        ];
        let batch = to_record_batch(&arrays).unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.schema().field(0).name(), "name");
        assert_eq!(batch.column(0).as_string::<i32>().value(0), "a/b");

        let back = from_record_batch(&batch, Path::new("mem")).unwrap();
        assert_eq!(back, arrays);
    }
}
