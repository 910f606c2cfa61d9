//! Parquet encoding for observation files

use crate::schema::{observation_schema, observations_to_batch, Observation};
use crate::{Error, Result};

use bytes::Bytes;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::{EnabledStatistics, WriterProperties, WriterVersion};

/// Encodes and decodes observation rows as Parquet.
pub struct ObservationWriter {
    props: WriterProperties,
}

impl ObservationWriter {
    pub fn new() -> Result<Self> {
        Ok(Self {
            props: Self::build_writer_properties()?,
        })
    }

    fn build_writer_properties() -> Result<WriterProperties> {
        let zstd = ZstdLevel::try_new(3)?;
        Ok(WriterProperties::builder()
            .set_writer_version(WriterVersion::PARQUET_2_0)
            .set_compression(Compression::ZSTD(zstd))
            // Metric ids, company ids and period names repeat heavily
            .set_dictionary_enabled(true)
            // Partitions hold one month of rows, well under one row group
            .set_max_row_group_size(128 * 1024)
            .set_statistics_enabled(EnabledStatistics::Chunk)
            .set_bloom_filter_enabled(false)
            .build())
    }

    /// Encode rows into one Parquet file.
    pub fn write(&self, rows: &[Observation]) -> Result<Bytes> {
        if rows.is_empty() {
            return Err(Error::InvalidArgument("No rows to write".into()));
        }

        let batch = observations_to_batch(rows)?;
        let mut buffer = Vec::new();
        {
            let mut writer =
                ArrowWriter::try_new(&mut buffer, observation_schema(), Some(self.props.clone()))?;
            writer.write(&batch)?;
            writer.close()?;
        }

        Ok(Bytes::from(buffer))
    }

    /// Decode every row of a file produced by [`write`](Self::write).
    pub fn read(bytes: Bytes) -> Result<Vec<Observation>> {
        let reader = ParquetRecordBatchReaderBuilder::try_new(bytes)?.build()?;
        let mut rows = Vec::new();
        for batch in reader {
            rows.extend(crate::schema::observations_from_batch(&batch?)?);
        }
        Ok(rows)
    }
}
