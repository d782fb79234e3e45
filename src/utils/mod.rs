pub mod constants;
pub mod url_utils;

pub use constants::*;
pub use url_utils::{extract_domain, host_matches, is_valid_url};
