// =============================================================================
// Deriv API: streaming market data and contract client
// =============================================================================
//
// Thin async client over the Deriv WebSocket API v3. It supplies price series
// to the indicator functions but the indicators never depend on it.

pub mod client;
mod router;

pub use client::{build_url, DerivClient};
pub use router::DerivApiError;
