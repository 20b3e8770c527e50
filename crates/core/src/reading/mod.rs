pub mod daily;
pub mod read_cup;

/// Failures surfaced at the orchestrator boundary.
///
/// Content rejections (bad photo, NSFW) are not errors; they come back as a successful
/// [`crate::domain::reading::ReadingResult`] with `is_valid_cup == false`.
#[derive(Debug, thiserror::Error)]
pub enum ReadingError {
    #[error("authentication required")]
    Unauthenticated,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Upstream detail stays in the wrapped error for logs; `Display` is deliberately generic.
    #[error("reading could not be generated")]
    Internal(anyhow::Error),
}

impl ReadingError {
    pub fn code(&self) -> &'static str {
        match self {
            ReadingError::Unauthenticated => "unauthenticated",
            ReadingError::InvalidArgument(_) => "invalid-argument",
            ReadingError::Internal(_) => "internal",
        }
    }

    pub fn detail(&self) -> Option<&anyhow::Error> {
        match self {
            ReadingError::Internal(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use chrono::NaiveDate;

    use crate::domain::reading::{AuditReadingRecord, DailyReading};
    use crate::llm::{Provider, ReadingModel};
    use crate::photo::ImageFetcher;
    use crate::storage::{AuditLog, DailyReadingStore};

    pub(crate) struct FakeModel {
        response: Result<String, String>,
        calls: AtomicUsize,
        pub(crate) prompts: Mutex<Vec<String>>,
        pub(crate) saw_image: Mutex<Vec<bool>>,
    }

    impl FakeModel {
        pub(crate) fn replying(text: impl Into<String>) -> Self {
            Self::with(Ok(text.into()))
        }

        pub(crate) fn failing(message: &str) -> Self {
            Self::with(Err(message.to_string()))
        }

        fn with(response: Result<String, String>) -> Self {
            Self {
                response,
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
                saw_image: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl ReadingModel for FakeModel {
        fn provider(&self) -> Provider {
            Provider::Anthropic
        }

        async fn generate(&self, prompt: &str, image: Option<&[u8]>) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.saw_image.lock().unwrap().push(image.is_some());
            self.response.clone().map_err(anyhow::Error::msg)
        }
    }

    pub(crate) struct FakeFetcher {
        pub(crate) bytes: Option<Vec<u8>>,
    }

    #[async_trait::async_trait]
    impl ImageFetcher for FakeFetcher {
        async fn fetch(&self, url: &str) -> anyhow::Result<Vec<u8>> {
            self.bytes
                .clone()
                .ok_or_else(|| anyhow::anyhow!("404 for {url}"))
        }
    }

    #[derive(Default)]
    pub(crate) struct MemoryAudit {
        pub(crate) fail: bool,
        pub(crate) records: Mutex<Vec<AuditReadingRecord>>,
    }

    #[async_trait::async_trait]
    impl AuditLog for MemoryAudit {
        async fn append(&self, record: &AuditReadingRecord) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("audit table unavailable");
            }
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    pub(crate) struct MemoryDailyStore {
        pub(crate) rows: Mutex<HashMap<(String, NaiveDate), DailyReading>>,
    }

    #[async_trait::async_trait]
    impl DailyReadingStore for MemoryDailyStore {
        async fn find(
            &self,
            user_id: &str,
            date: NaiveDate,
        ) -> anyhow::Result<Option<DailyReading>> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .get(&(user_id.to_string(), date))
                .cloned())
        }

        async fn insert_if_absent(&self, reading: &DailyReading) -> anyhow::Result<DailyReading> {
            let mut rows = self.rows.lock().unwrap();
            Ok(rows
                .entry((reading.user_id.clone(), reading.date))
                .or_insert_with(|| reading.clone())
                .clone())
        }
    }
}
