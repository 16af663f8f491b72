pub mod file_list;
pub mod google_auth;
pub mod handlers;
pub mod header;
pub mod progress;
pub mod results;
pub mod upload_section;
pub mod utils;
