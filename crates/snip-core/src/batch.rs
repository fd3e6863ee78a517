use crate::shortcode::ShortCode;
use serde::{Deserialize, Serialize};

/// One item of a batch shortening request.
///
/// The correlation id is opaque to the storage layer and never persisted; it
/// only matches request items to [`BatchResult`]s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItem {
    pub correlation_id: String,
    pub original_url: String,
}

/// The short code assigned to a [`BatchItem`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub correlation_id: String,
    pub short_code: ShortCode,
}
