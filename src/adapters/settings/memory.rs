use crate::{
    domain::Settings,
    ports::settings::{Error, SettingsPort},
};
use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, PoisonError},
};

/// Settings table held in memory as raw key/value rows
///
/// Rows are parsed on every fetch, the same way a shared spreadsheet tab would be.
#[derive(Clone, Debug, Default)]
pub struct MemorySettings {
    rows: Arc<Mutex<BTreeMap<String, String>>>,
}

impl MemorySettings {
    pub fn new<I, K, V>(rows: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            rows: Arc::new(Mutex::new(
                rows.into_iter()
                    .map(|(key, value)| (key.into(), value.into()))
                    .collect(),
            )),
        }
    }

    /// Update a single row, e.g. when staff rotate the daily code
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) -> Result<(), Error> {
        self.rows.lock()?.insert(key.into(), value.into());
        Ok(())
    }
}

#[async_trait::async_trait]
impl SettingsPort for MemorySettings {
    async fn fetch(&self) -> Result<Settings, Error> {
        let rows = self.rows.lock()?;
        let settings = Settings::from_rows(
            rows.iter()
                .map(|(key, value)| (key.as_str(), value.as_str())),
        )?;

        Ok(settings)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("poison error: {0}")]
pub struct ErasedPoisonError(String);

impl<T> From<PoisonError<T>> for Error {
    fn from(err: PoisonError<T>) -> Self {
        Self::Adapter(Box::new(ErasedPoisonError(err.to_string())))
    }
}
