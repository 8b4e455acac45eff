use serde::Deserialize;

/// Every site response wraps its payload as `{"data": ..., "status": ...}`.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub data: T,
}

/// A paginated listing.
#[derive(Debug, Deserialize)]
pub(crate) struct Page {
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub results: Vec<serde_json::Value>,
}

/// Listings come back paginated or, for small result sets, as a bare array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum Listing {
    Page(Page),
    Items(Vec<serde_json::Value>),
}

impl Listing {
    pub fn into_parts(self) -> (Vec<serde_json::Value>, Option<String>) {
        match self {
            Listing::Page(page) => (page.results, page.next),
            Listing::Items(items) => (items, None),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}
