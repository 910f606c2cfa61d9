//! Observation model

use crate::period::{normalize_start, PeriodType};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Ancillary row fields (status, paid amount, external id, ...). Preserved
/// verbatim across upserts.
pub type ExtraPayload = BTreeMap<String, serde_json::Value>;

/// Owner of a series: a company, optionally narrowed to an employee and/or
/// a department.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Scope {
    pub company_id: String,
    pub employee_id: Option<String>,
    pub department_id: Option<String>,
}

impl Scope {
    /// Company-wide scope
    pub fn company(company_id: impl Into<String>) -> Self {
        Self {
            company_id: company_id.into(),
            employee_id: None,
            department_id: None,
        }
    }

    /// Scope for one employee of a company
    pub fn employee(company_id: impl Into<String>, employee_id: impl Into<String>) -> Self {
        Self {
            employee_id: Some(employee_id.into()),
            ..Self::company(company_id)
        }
    }

    /// Narrow to a department
    pub fn with_department(mut self, department_id: impl Into<String>) -> Self {
        self.department_id = Some(department_id.into());
        self
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.company_id)?;
        if let Some(dep) = &self.department_id {
            write!(f, "/dep:{}", dep)?;
        }
        if let Some(emp) = &self.employee_id {
            write!(f, "/emp:{}", emp)?;
        }
        Ok(())
    }
}

/// One metric within one scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MetricKey {
    pub metric_id: String,
    pub scope: Scope,
}

impl MetricKey {
    pub fn new(metric_id: impl Into<String>, scope: Scope) -> Self {
        Self {
            metric_id: metric_id.into(),
            scope,
        }
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.metric_id, self.scope)
    }
}

/// Which of the two values on a row is meant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Plan,
    Fact,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Plan => "plan",
            ValueKind::Fact => "fact",
        }
    }
}

impl std::str::FromStr for ValueKind {
    type Err = crate::Error;

    fn from_str(value: &str) -> crate::Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "plan" => Ok(ValueKind::Plan),
            "fact" => Ok(ValueKind::Fact),
            other => Err(crate::Error::InvalidArgument(format!(
                "unknown value kind '{}'; expected plan or fact",
                other
            ))),
        }
    }
}

/// The logical cell a row belongs to. The date is always normalized to the
/// start of its period.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Coordinate {
    pub key: MetricKey,
    pub period: PeriodType,
    pub date: NaiveDate,
}

impl Coordinate {
    pub fn new(key: MetricKey, period: PeriodType, date: NaiveDate) -> Self {
        Self {
            key,
            period,
            date: normalize_start(date, period),
        }
    }

    /// Whether `row` sits at this coordinate.
    pub fn matches(&self, row: &Observation) -> bool {
        row.period == self.period && row.date == self.date && row.key == self.key
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.key, self.period, self.date)
    }
}

/// A stored plan/fact row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub key: MetricKey,
    pub period: PeriodType,
    /// Anchor date (start of the recorded period)
    pub date: NaiveDate,
    pub plan: f64,
    pub fact: f64,
    #[serde(default)]
    pub extra: ExtraPayload,
    /// Store-assigned write stamp (nanoseconds, monotonic per store)
    #[serde(default)]
    pub written_at: i64,
}

impl Observation {
    /// Empty row at `coordinate`: zero plan and fact, no payload.
    pub fn at(coordinate: &Coordinate) -> Self {
        Self {
            key: coordinate.key.clone(),
            period: coordinate.period,
            date: coordinate.date,
            plan: 0.0,
            fact: 0.0,
            extra: ExtraPayload::new(),
            written_at: 0,
        }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.key.clone(), self.period, self.date)
    }

    pub fn value(&self, kind: ValueKind) -> f64 {
        match kind {
            ValueKind::Plan => self.plan,
            ValueKind::Fact => self.fact,
        }
    }

    pub fn set_value(&mut self, kind: ValueKind, value: f64) {
        match kind {
            ValueKind::Plan => self.plan = value,
            ValueKind::Fact => self.fact = value,
        }
    }

    /// Builder-style setter used when seeding rows
    pub fn with_value(mut self, kind: ValueKind, value: f64) -> Self {
        self.set_value(kind, value);
        self
    }
}

/// Fields an upsert changes; everything else on the row is kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldChanges {
    pub plan: Option<f64>,
    pub fact: Option<f64>,
    /// Payload entries to set. A JSON `null` removes the entry.
    pub extra: ExtraPayload,
}

impl FieldChanges {
    /// Change a single value
    pub fn value(kind: ValueKind, value: f64) -> Self {
        Self::default().with_value(kind, value)
    }

    pub fn with_value(mut self, kind: ValueKind, value: f64) -> Self {
        match kind {
            ValueKind::Plan => self.plan = Some(value),
            ValueKind::Fact => self.fact = Some(value),
        }
        self
    }

    pub fn with_extra(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(name.into(), value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.plan.is_none() && self.fact.is_none() && self.extra.is_empty()
    }

    /// Merge into `row`, leaving untouched fields as they are.
    pub fn apply_to(&self, row: &mut Observation) {
        if let Some(plan) = self.plan {
            row.plan = plan;
        }
        if let Some(fact) = self.fact {
            row.fact = fact;
        }
        for (name, value) in &self.extra {
            if value.is_null() {
                row.extra.remove(name);
            } else {
                row.extra.insert(name.clone(), value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn key() -> MetricKey {
        MetricKey::new("revenue", Scope::employee("acme", "e-7").with_department("sales"))
    }

    #[test]
    fn test_coordinate_normalizes_date() {
        let coord = Coordinate::new(key(), PeriodType::Month, d(2024, 5, 17));
        assert_eq!(coord.date, d(2024, 5, 1));
    }

    #[test]
    fn test_coordinate_matches_row() {
        let coord = Coordinate::new(key(), PeriodType::Week, d(2024, 1, 17));
        let mut row = Observation::at(&coord);
        assert!(coord.matches(&row));

        row.period = PeriodType::Day;
        assert!(!coord.matches(&row));
    }

    #[test]
    fn test_changes_keep_untouched_fields() {
        let coord = Coordinate::new(key(), PeriodType::Month, d(2024, 5, 1));
        let mut row = Observation::at(&coord).with_value(ValueKind::Plan, 120.0);
        row.extra.insert("status".into(), json!("approved"));
        row.extra.insert("external_id".into(), json!("crm-42"));

        FieldChanges::value(ValueKind::Fact, 95.5)
            .with_extra("external_id", serde_json::Value::Null)
            .apply_to(&mut row);

        assert_eq!(row.plan, 120.0);
        assert_eq!(row.fact, 95.5);
        assert_eq!(row.extra.get("status"), Some(&json!("approved")));
        assert!(!row.extra.contains_key("external_id"));
    }

    #[test]
    fn test_key_display() {
        assert_eq!(key().to_string(), "revenue@acme/dep:sales/emp:e-7");
        assert_eq!(
            MetricKey::new("nps", Scope::company("acme")).to_string(),
            "nps@acme"
        );
    }

    #[test]
    fn test_value_kind_parse() {
        assert_eq!("Plan".parse::<ValueKind>().unwrap(), ValueKind::Plan);
        assert!("budget".parse::<ValueKind>().is_err());
    }
}
