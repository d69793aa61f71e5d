//! # arbor-core
//!
//! Shared wire layer for Arbor RPC, used by both the server and the client.
//!
//! - Contracts: `RequestContract`, `ResponseContract`, `EventContract`
//! - Error taxonomy: `RpcError` with machine-readable reasons
//! - Codec: strict decoding that rejects malformed payloads before dispatch
//! - Channel lifecycle: `Connecting -> Connected -> Closed`
//! - Route templates: `/rpc` or `/rpc/:signature` endpoint addressing
//! - Positional parameters with typed accessors

#![deny(unsafe_code)]

pub mod codec;
pub mod contracts;
pub mod errors;
pub mod lifecycle;
pub mod params;
pub mod route;

pub use contracts::{
    CHANNEL_SIGNATURE, CONNECTION_ID_HEADER, ConnectionId, EmitEvent, ErrorBody, EventContract,
    RequestContract, ResponseContract, event_key,
};
pub use errors::{RouteParseError, RpcError};
pub use lifecycle::ChannelState;
pub use params::Params;
pub use route::RouteTemplate;

#[doc(hidden)]
pub mod __private {
    pub use serde_json::{Value, json};
}

/// Build a positional parameter list from serializable expressions.
///
/// ```ignore
/// let params = arbor_core::params![0, "hi"];
/// assert_eq!(params.len(), 2);
/// ```
#[macro_export]
macro_rules! params {
    () => {
        ::std::vec::Vec::<$crate::__private::Value>::new()
    };
    ($($arg:expr),+ $(,)?) => {
        ::std::vec![$($crate::__private::json!($arg)),+]
    };
}

#[cfg(test)]
mod tests {
    #[test]
    fn params_macro_empty() {
        let p = params![];
        assert!(p.is_empty());
    }

    #[test]
    fn params_macro_preserves_order_and_types() {
        let name = String::from("bob");
        let p = params![0, "hi", name, true];
        assert_eq!(p.len(), 4);
        assert_eq!(p[0], 0);
        assert_eq!(p[1], "hi");
        assert_eq!(p[2], "bob");
        assert_eq!(p[3], true);
    }
}
