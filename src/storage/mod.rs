// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Record stores behind the document and row backends.
//!
//! Drivers for real databases live outside this crate; they implement
//! [`RecordStore`](traits::RecordStore). [`InMemoryStore`](memory::InMemoryStore)
//! backs tests and the demo.

pub mod memory;
pub mod traits;

pub use memory::InMemoryStore;
pub use traits::{RecordStore, StorageError};
