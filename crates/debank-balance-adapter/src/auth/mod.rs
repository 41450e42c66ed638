/*
[INPUT]:  Request payload/method/path to authenticate
[OUTPUT]: Per-request signatures from a pluggable signer backend
[POS]:    Auth layer - handles Balance API request signing
[UPDATE]: When signer backends or the signing contract change
*/

pub mod native;
pub mod signer;
pub mod subprocess;

pub use native::NativeSigner;
pub use signer::{SignRequest, Signature, Signer};
pub use subprocess::{SubprocessConfig, SubprocessSigner};
