pub mod gap_finder;
pub mod http;
pub mod retry;
pub mod simplize;
pub mod storage;
pub mod sync_driver;
pub mod vci;

pub use gap_finder::{find_gaps, missing_months, DateGap};
pub use http::{HttpReply, HttpTransport, IsahcTransport, ReqwestTransport, TransportError};
pub use retry::{Backoff, RetryPolicy};
pub use simplize::SimplizeClient;
pub use storage::{ChunkOutcome, ChunkReport, StorageClient, StorageError, Table, UpsertReport};
pub use sync_driver::{FetchWindow, SyncDriver};
pub use vci::{count_back_for_range, FetchError, FetchErrorKind, VciClient};
