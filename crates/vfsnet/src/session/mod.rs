// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Pooled backend sessions.
//!
//! A session is one authenticated connection to a stateful backend, shared
//! by every caller that presents the same [`Identity`]. Callers hold a
//! [`SessionHandle`]; the session outlives the last handle by the idle grace
//! window so that quick successive listings reuse the connection.

pub mod backend;
pub mod identity;
#[cfg(feature = "myth")]
pub mod myth;
pub mod pool;

pub use backend::{
    BackendEvent, Channel, Connection, Connector, ControlChannel, EventChannel, EventCode,
    GuideDatabase, NoConnector, Program, SessionListener,
};
pub use identity::Identity;
pub use pool::{Session, SessionHandle, SessionPool};
