//! Arrow schemas for CRM records, used to render tables.

/// Arrow schema definitions and batch builders for CRM records.
pub mod crm {
    use std::sync::Arc;

    use arrow::array::{ArrayRef, BooleanArray, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::error::ArrowError;
    use arrow::record_batch::RecordBatch;

    use crate::lead::{Assignment, Employee, Lead};

    /// Schema for lead records.
    pub fn leads_schema() -> Schema {
        Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("name", DataType::Utf8, true),
            Field::new("service", DataType::Utf8, false),
            Field::new("assigned_to", DataType::Utf8, true),
            Field::new("created_at", DataType::Utf8, true),
        ])
    }

    /// Schema for the employee directory.
    pub fn employees_schema() -> Schema {
        Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("name", DataType::Utf8, false),
            Field::new("active", DataType::Boolean, false),
        ])
    }

    /// Schema for the assignments made by a run.
    pub fn assignments_schema() -> Schema {
        Schema::new(vec![
            Field::new("lead_id", DataType::Utf8, false),
            Field::new("service", DataType::Utf8, false),
            Field::new("handler", DataType::Utf8, false),
        ])
    }

    pub fn leads_to_batch(leads: &[Lead]) -> Result<RecordBatch, ArrowError> {
        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from_iter_values(leads.iter().map(|l| l.id.as_str()))),
            Arc::new(leads.iter().map(|l| l.name.as_deref()).collect::<StringArray>()),
            Arc::new(StringArray::from_iter_values(
                leads.iter().map(|l| l.service.as_str()),
            )),
            Arc::new(
                leads
                    .iter()
                    .map(|l| l.assigned_to.as_deref())
                    .collect::<StringArray>(),
            ),
            Arc::new(
                leads
                    .iter()
                    .map(|l| l.created_at.as_deref())
                    .collect::<StringArray>(),
            ),
        ];
        RecordBatch::try_new(Arc::new(leads_schema()), columns)
    }

    pub fn employees_to_batch(employees: &[Employee]) -> Result<RecordBatch, ArrowError> {
        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from_iter_values(
                employees.iter().map(|e| e.id.as_str()),
            )),
            Arc::new(StringArray::from_iter_values(
                employees.iter().map(|e| e.name.as_str()),
            )),
            Arc::new(BooleanArray::from(
                employees.iter().map(|e| e.active).collect::<Vec<_>>(),
            )),
        ];
        RecordBatch::try_new(Arc::new(employees_schema()), columns)
    }

    pub fn assignments_to_batch(assignments: &[Assignment]) -> Result<RecordBatch, ArrowError> {
        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from_iter_values(
                assignments.iter().map(|a| a.lead_id.as_str()),
            )),
            Arc::new(StringArray::from_iter_values(
                assignments.iter().map(|a| a.service.as_str()),
            )),
            Arc::new(StringArray::from_iter_values(
                assignments.iter().map(|a| a.handler.as_str()),
            )),
        ];
        RecordBatch::try_new(Arc::new(assignments_schema()), columns)
    }
}
