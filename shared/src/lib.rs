pub mod auth;
pub mod cancel;
pub mod config;
pub mod error;
pub mod poll;
pub mod session;
pub mod status;
pub mod upload;

pub use cancel::CancelToken;
pub use config::ClientConfig;
pub use error::ApiError;
pub use poll::{Clock, PollPolicy, StatusSource};
pub use session::UploadSession;
pub use status::{StatusResponse, StatusSnapshot, TaskStatus};
pub use upload::{
    AcceptedType, AnomalyRecord, CancelResponse, DownloadFormat, Endpoints, FileMeta, TaskId,
    UploadResponse, ValidationReport,
};
