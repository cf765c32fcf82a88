use crate::types::TaskRecord;
use chrono::{TimeZone, Utc};


/// Record with `date_added` truncated to the millisecond precision the table stores
fn sample_record(url: &str, dir: &str, name: &str) -> TaskRecord {
    let mut record = TaskRecord::new(url, dir, name);
    record.date_added = Utc
        .timestamp_millis_opt(record.date_added.timestamp_millis())
        .single()
        .unwrap();
    record
}
