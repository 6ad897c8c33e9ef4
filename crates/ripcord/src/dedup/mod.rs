// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Short-lived request deduplication.
//!
//! Identical requests are recognized by their [`Fingerprint`]. While a request is in flight, every
//! identical request joins it instead of reaching the service again. Once it completes, its
//! successful reply may optionally be reused for the rest of the entry lifetime; see
//! [`ResultCaching`][crate::ResultCaching].

mod cache;
mod fingerprint;

pub use cache::{DedupCache, Lookup};
pub use fingerprint::Fingerprint;
