use axum::Json;
use serde::Serialize;

/// A plain message response.
#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: &str) -> Json<Self> {
        Json(Self { message: message.to_string() })
    }
}

/// One page of a listing.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

/// Page number and size from a query string, size clamped to `max_limit`.
pub fn page_params(page: Option<i64>, limit: Option<i64>, default_limit: i64, max_limit: i64) -> (i64, i64) {
    (
        page.unwrap_or(1).max(1),
        limit.unwrap_or(default_limit).clamp(1, max_limit),
    )
}

#[cfg(test)]
mod tests {
    use super::page_params;

    #[test]
    fn page_params_are_clamped() {
        assert_eq!(page_params(None, None, 20, 100), (1, 20));
        assert_eq!(page_params(Some(0), Some(500), 20, 100), (1, 100));
        assert_eq!(page_params(Some(3), Some(-1), 20, 100), (3, 1));
    }
}
