#![allow(dead_code)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::DateTime;
use chrono_tz::Tz;

use viewcounter_db::{ViewRecord, ViewStore, reference_now, validate_view};
use viewcounter_error::{ErrorKind, Result, ViewCounterError};

/// 메모리 기반 저장소, 단계별 실패를 주입할 수 있음
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<Vec<ViewRecord>>,
    pub schema_failures: AtomicUsize,
    pub schema_failure_is_fatal: AtomicBool,
    pub fail_record: AtomicBool,
    pub fail_total: AtomicBool,
    pub fail_recent: AtomicBool,
    pub schema_calls: AtomicUsize,
    pub record_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    fn fail_if(flag: &AtomicBool, kind: ErrorKind) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            Err(ViewCounterError::new(kind, "injected failure"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ViewStore for MemoryStore {
    async fn ensure_schema(&self) -> Result<()> {
        self.schema_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.schema_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.schema_failures.store(remaining - 1, Ordering::SeqCst);
            let kind = if self.schema_failure_is_fatal.load(Ordering::SeqCst) {
                ErrorKind::Configuration
            } else {
                ErrorKind::Schema
            };
            return Err(ViewCounterError::new(kind, "injected schema failure"));
        }
        Ok(())
    }

    async fn record_view(&self, visitor_ip: &str, host: &str, port: u16) -> Result<ViewRecord> {
        self.record_calls.fetch_add(1, Ordering::SeqCst);
        Self::fail_if(&self.fail_record, ErrorKind::Record)?;
        validate_view(visitor_ip, host)?;

        let mut records = self.records.lock().unwrap();
        let record = ViewRecord {
            id: records.len() as i64 + 1,
            ip_address: visitor_ip.to_string(),
            host_name: (!host.is_empty()).then(|| host.to_string()),
            port,
            viewed_at: reference_now(),
        };
        records.push(record.clone());
        Ok(record)
    }

    async fn total_view_count(&self) -> Result<i64> {
        Self::fail_if(&self.fail_total, ErrorKind::Query)?;
        Ok(self.records.lock().unwrap().len() as i64)
    }

    async fn visitor_view_count(&self, visitor_ip: &str) -> Result<i64> {
        let records = self.records.lock().unwrap();
        Ok(records.iter().filter(|r| r.ip_address == visitor_ip).count() as i64)
    }

    async fn most_recent_view_time(&self, visitor_ip: Option<&str>) -> Result<Option<DateTime<Tz>>> {
        Self::fail_if(&self.fail_recent, ErrorKind::Query)?;
        let records = self.records.lock().unwrap();
        Ok(records
            .iter()
            .filter(|r| visitor_ip.is_none_or(|ip| r.ip_address == ip))
            .map(|r| r.viewed_at)
            .max())
    }
}
