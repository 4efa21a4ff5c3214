pub mod constants;
pub mod content_disposition;
pub mod test_helpers;
pub mod types;
