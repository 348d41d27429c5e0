//! Default values for configuration

/// Default Opendatasoft dataset id (EU Safety Gate, English edition)
pub fn default_dataset_id() -> String {
    "healthref-europe-rapex-en".to_string()
}

/// Default Opendatasoft records search endpoint
pub fn default_dataset_base_url() -> String {
    std::env::var("SAFEGATE_DATASET_URL")
        .unwrap_or_else(|_| "https://public.opendatasoft.com/api/records/1.0/search".to_string())
}

/// Default name of the field holding the alert date
pub fn default_alert_date_field() -> String {
    "alert_date".to_string()
}

/// Default environment variable name for the dataset API key (empty = anonymous)
pub fn default_dataset_api_key_env() -> String {
    "".to_string()
}

/// Default page size, overridable with ROWS_PER_PAGE
pub fn default_rows_per_page() -> u32 {
    env_number("ROWS_PER_PAGE").unwrap_or(500)
}

/// Default page cap per run, overridable with MAX_PAGES
pub fn default_max_pages() -> u32 {
    env_number("MAX_PAGES").unwrap_or(20)
}

/// Days fetched on the first run
pub fn default_bootstrap_days() -> u32 {
    30
}

/// Documents buffered before a batch write
pub fn default_batch_size() -> usize {
    500
}

/// Check newest-first order of fetched pages
pub fn default_verify_sort_order() -> bool {
    true
}

/// Default user agent string
pub fn default_user_agent() -> String {
    format!("safegate/{}", env!("CARGO_PKG_VERSION"))
}

/// Default request timeout in seconds
pub fn default_http_timeout() -> u64 {
    30
}

/// Default transport retries for transient upstream failures
pub fn default_http_retries() -> u32 {
    2
}

/// Run the scheduled sync when serving
pub fn default_schedule_enabled() -> bool {
    true
}

/// Daily at 03:13 (sec min hour day month weekday)
pub fn default_schedule_cron() -> String {
    "0 13 3 * * *".to_string()
}

/// Default schedule timezone
pub fn default_schedule_timezone() -> String {
    "Europe/Bratislava".to_string()
}

/// Default server bind address
pub fn default_server_bind() -> String {
    std::env::var("SAFEGATE_BIND").unwrap_or_else(|_| "127.0.0.1:8080".to_string())
}

/// Days of alerts considered by a safety check
pub fn default_check_lookback_days() -> u32 {
    7
}

/// Maximum candidate alerts handed to the matcher
pub fn default_check_candidate_limit() -> u32 {
    100
}

/// Matches at or below this similarity are ignored
pub fn default_check_min_similarity() -> f64 {
    30.0
}

/// Default similarity matcher backend URL (empty = not configured)
pub fn default_matcher_url() -> String {
    std::env::var("SAFEGATE_MATCHER_URL").unwrap_or_default()
}

/// Default matcher request timeout in seconds
pub fn default_matcher_timeout() -> u64 {
    120
}

fn env_number(name: &str) -> Option<u32> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
