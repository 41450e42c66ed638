/*
[INPUT]:  Crate modules and public type definitions
[OUTPUT]: Public Balance API adapter crate surface
[POS]:    Crate root - module wiring
[UPDATE]: When public modules or exports change
*/

pub mod auth;
pub mod http;
pub mod types;

// Re-export commonly used types from auth
pub use auth::{
    NativeSigner,
    SignRequest,
    Signature,
    Signer,
    SubprocessConfig,
    SubprocessSigner,
};

// Re-export commonly used types from http
pub use http::{
    API_VERSION,
    BalanceError,
    ClientConfig,
    DEFAULT_BASE_URL,
    Endpoint,
    Executed,
    RequestExecutor,
    Result,
    RetryPolicy,
    Session,
    TaskRunner,
};

// Re-export all types
pub use types::*;
