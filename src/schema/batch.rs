//! Arrow layout for observation rows

use super::observation::{ExtraPayload, MetricKey, Observation, Scope};
use crate::period::PeriodType;
use crate::{Error, Result};

use arrow_array::cast::AsArray;
use arrow_array::types::{Date32Type, Float64Type, TimestampNanosecondType};
use arrow_array::{
    Array, ArrayRef, Date32Array, Float64Array, RecordBatch, StringArray, TimestampNanosecondArray,
};
use arrow_schema::{DataType, Field, Schema, SchemaRef, TimeUnit};
use chrono::{Datelike, NaiveDate};
use std::sync::Arc;

pub const METRIC_ID_FIELD: &str = "metric_id";
pub const COMPANY_ID_FIELD: &str = "company_id";
pub const EMPLOYEE_ID_FIELD: &str = "employee_id";
pub const DEPARTMENT_ID_FIELD: &str = "department_id";
pub const PERIOD_FIELD: &str = "period";
pub const DATE_FIELD: &str = "date";
pub const PLAN_FIELD: &str = "plan";
pub const FACT_FIELD: &str = "fact";
pub const EXTRA_FIELD: &str = "extra";
pub const WRITTEN_AT_FIELD: &str = "written_at";

/// Days from 0001-01-01 (CE) to 1970-01-01
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Arrow schema shared by every observation file.
pub fn observation_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new(METRIC_ID_FIELD, DataType::Utf8, false),
        Field::new(COMPANY_ID_FIELD, DataType::Utf8, false),
        Field::new(EMPLOYEE_ID_FIELD, DataType::Utf8, true),
        Field::new(DEPARTMENT_ID_FIELD, DataType::Utf8, true),
        Field::new(PERIOD_FIELD, DataType::Utf8, false),
        Field::new(DATE_FIELD, DataType::Date32, false),
        Field::new(PLAN_FIELD, DataType::Float64, false),
        Field::new(FACT_FIELD, DataType::Float64, false),
        // JSON-encoded extra payload, null when empty
        Field::new(EXTRA_FIELD, DataType::Utf8, true),
        Field::new(
            WRITTEN_AT_FIELD,
            DataType::Timestamp(TimeUnit::Nanosecond, Some("UTC".into())),
            false,
        ),
    ]))
}

/// Encode rows into one record batch.
pub fn observations_to_batch(rows: &[Observation]) -> Result<RecordBatch> {
    let extras = rows
        .iter()
        .map(|row| {
            if row.extra.is_empty() {
                Ok(None)
            } else {
                serde_json::to_string(&row.extra).map(Some)
            }
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.key.metric_id.as_str()))),
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.key.scope.company_id.as_str()))),
        Arc::new(StringArray::from(
            rows.iter().map(|r| r.key.scope.employee_id.as_deref()).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            rows.iter().map(|r| r.key.scope.department_id.as_deref()).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.period.as_str()))),
        Arc::new(Date32Array::from(rows.iter().map(|r| date_to_days(r.date)).collect::<Vec<_>>())),
        Arc::new(Float64Array::from(rows.iter().map(|r| r.plan).collect::<Vec<_>>())),
        Arc::new(Float64Array::from(rows.iter().map(|r| r.fact).collect::<Vec<_>>())),
        Arc::new(StringArray::from(extras)),
        Arc::new(
            TimestampNanosecondArray::from(rows.iter().map(|r| r.written_at).collect::<Vec<_>>())
                .with_timezone("UTC"),
        ),
    ];

    Ok(RecordBatch::try_new(observation_schema(), columns)?)
}

/// Decode a record batch written by [`observations_to_batch`].
pub fn observations_from_batch(batch: &RecordBatch) -> Result<Vec<Observation>> {
    let metric = string_column(batch, METRIC_ID_FIELD)?;
    let company = string_column(batch, COMPANY_ID_FIELD)?;
    let employee = string_column(batch, EMPLOYEE_ID_FIELD)?;
    let department = string_column(batch, DEPARTMENT_ID_FIELD)?;
    let period = string_column(batch, PERIOD_FIELD)?;
    let extra_json = string_column(batch, EXTRA_FIELD)?;
    let date = column(batch, DATE_FIELD)?
        .as_primitive_opt::<Date32Type>()
        .ok_or_else(|| type_mismatch(DATE_FIELD))?;
    let plan = column(batch, PLAN_FIELD)?
        .as_primitive_opt::<Float64Type>()
        .ok_or_else(|| type_mismatch(PLAN_FIELD))?;
    let fact = column(batch, FACT_FIELD)?
        .as_primitive_opt::<Float64Type>()
        .ok_or_else(|| type_mismatch(FACT_FIELD))?;
    let written_at = column(batch, WRITTEN_AT_FIELD)?
        .as_primitive_opt::<TimestampNanosecondType>()
        .ok_or_else(|| type_mismatch(WRITTEN_AT_FIELD))?;

    let mut rows = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let scope = Scope {
            company_id: company.value(i).to_string(),
            employee_id: optional(employee, i),
            department_id: optional(department, i),
        };
        let extra: ExtraPayload = match optional(extra_json, i) {
            Some(raw) => serde_json::from_str(&raw)?,
            None => ExtraPayload::new(),
        };
        rows.push(Observation {
            key: MetricKey::new(metric.value(i), scope),
            period: period.value(i).parse::<PeriodType>()?,
            date: days_to_date(date.value(i))?,
            plan: plan.value(i),
            fact: fact.value(i),
            extra,
            written_at: written_at.value(i),
        });
    }
    Ok(rows)
}

fn column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a ArrayRef> {
    batch
        .column_by_name(name)
        .ok_or_else(|| Error::InvalidSchema(format!("Missing {} column", name)))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    column(batch, name)?
        .as_string_opt::<i32>()
        .ok_or_else(|| type_mismatch(name))
}

fn type_mismatch(name: &str) -> Error {
    Error::InvalidSchema(format!("Unexpected type for {} column", name))
}

fn optional(array: &StringArray, i: usize) -> Option<String> {
    if array.is_null(i) {
        None
    } else {
        Some(array.value(i).to_string())
    }
}

fn date_to_days(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

fn days_to_date(days: i32) -> Result<NaiveDate> {
    days.checked_add(UNIX_EPOCH_DAYS_FROM_CE)
        .and_then(NaiveDate::from_num_days_from_ce_opt)
        .ok_or_else(|| Error::InvalidSchema(format!("Date32 value {} out of range", days)))
}
