//! # RDE I/O - connector and cache implementations
//!
//! Concrete I/O for the transfer engine: the Arrow IPC and in-memory cache
//! backends, SQL identifier/literal sanitisation shared by every dialect, the
//! in-process fixture source, the SQL warehouse source/destination, the
//! object-store destination, the console destination, and the
//! multi-destination composer. Everything here implements a trait from
//! `rde_core`; nothing here is held by name outside of the vendor registry.

pub mod cache_arrow;
pub mod cache_memory;
pub mod composer;
pub mod destination_console;
pub mod destination_object_store;
pub mod destination_sql;
pub mod registry;
pub mod source_memory;
pub mod source_sql;
pub mod sql_gen;
