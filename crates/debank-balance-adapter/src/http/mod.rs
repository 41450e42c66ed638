/*
[INPUT]:  Session configuration, API endpoints and fetch tasks
[OUTPUT]: Signed HTTP requests and decoded task outputs
[POS]:    HTTP layer - Balance API communication
[UPDATE]: When adding new endpoints or changing executor behavior
*/

pub mod endpoint;
pub mod error;
pub mod executor;
pub mod retry;
pub mod session;

pub use error::{BalanceError, Result};

pub use endpoint::Endpoint;
pub use executor::{Executed, RequestExecutor, TaskRunner};
pub use retry::RetryPolicy;
pub use session::{API_VERSION, ClientConfig, DEFAULT_BASE_URL, Session};
