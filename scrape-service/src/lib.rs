pub mod output;
pub mod request;
pub mod service;

pub use output::{result_file_name, write_result, ScrapeFailure, ScrapeSummary};
pub use request::ScrapeRequest;
pub use service::ScrapeService;
