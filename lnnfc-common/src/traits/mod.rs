// File: lnnfc-common/src/traits/mod.rs
pub mod claim_traits;
pub mod transport_traits;
pub mod clock;

pub use claim_traits::ClaimService;
pub use transport_traits::{SharedTransport, TagTransport, shared};
pub use clock::{Clock, SystemClock};

#[cfg(feature = "mocks")]
pub use claim_traits::MockClaimService;
#[cfg(feature = "mocks")]
pub use transport_traits::MockTagTransport;
