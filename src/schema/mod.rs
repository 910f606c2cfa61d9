//! Observation rows and their columnar layout
//!
//! An observation is one plan/fact cell for a metric within a scope, anchored
//! at the start date of the period it was recorded for. Rows are stored as
//! Arrow record batches; the extra payload travels as a JSON string column so
//! it survives upserts byte for byte.

mod batch;
mod observation;

pub use batch::{
    observation_schema, observations_from_batch, observations_to_batch, COMPANY_ID_FIELD,
    DATE_FIELD, DEPARTMENT_ID_FIELD, EMPLOYEE_ID_FIELD, EXTRA_FIELD, FACT_FIELD, METRIC_ID_FIELD,
    PERIOD_FIELD, PLAN_FIELD, WRITTEN_AT_FIELD,
};
pub use observation::{
    Coordinate, ExtraPayload, FieldChanges, MetricKey, Observation, Scope, ValueKind,
};
