pub mod deletion;
pub mod naming;
pub mod shortener;
pub mod sweeper;
pub mod upload;

pub use deletion::{deletion_queue, DeletionQueue, OneTimeBody};
pub use shortener::UrlShortener;
pub use sweeper::Sweeper;
pub use upload::{UploadRequest, UploadService};
