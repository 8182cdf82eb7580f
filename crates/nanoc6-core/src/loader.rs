//! Page data loader for the readings page.
//!
//! Runs the page query (all columns of `readings`, newest first) and
//! guarantees the result is a sequence: a missing result becomes an empty
//! list. A failed query also yields an empty list, but the failure is
//! logged and reported on [`ReadingsPage::error`].

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use nanoc6_types::Reading;

use crate::backend::ReadingsBackend;
use crate::query::ReadingQuery;

/// Data handed to the readings page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadingsPage {
    /// Readings exactly as returned by the store, newest first.
    pub readings: Vec<Reading>,
    /// Why the store could not be queried, if it could not.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReadingsPage {
    /// Whether the backend was queried successfully.
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Load the readings page with the default query.
pub async fn load_readings<B>(backend: &B) -> ReadingsPage
where
    B: ReadingsBackend + ?Sized,
{
    load_readings_with(backend, &ReadingQuery::new()).await
}

/// Load the readings page with a custom query.
pub async fn load_readings_with<B>(backend: &B, query: &ReadingQuery) -> ReadingsPage
where
    B: ReadingsBackend + ?Sized,
{
    match backend.select_readings(query).await {
        Ok(Some(readings)) => {
            debug!("Loaded {} readings", readings.len());
            ReadingsPage {
                readings,
                error: None,
            }
        }
        Ok(None) => {
            debug!("Readings query returned no result");
            ReadingsPage::default()
        }
        Err(e) => {
            warn!("Failed to load readings: {}", e);
            ReadingsPage {
                readings: Vec::new(),
                error: Some(e.to_string()),
            }
        }
    }
}
