// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! MythTV-style DVR backend protocol.
//!
//! Every message is an 8-byte, left-justified, space-padded decimal length
//! followed by that many bytes of tokens joined with `[]:[]`:
//!
//! ```text
//! "21      QUERY_RECORDINGS Play"
//! "13      ACCEPT[]:[]40"
//! ```

pub mod codec;
pub mod connector;

pub use codec::{encode_message, read_message, write_message};
pub use connector::{DatabaseFactory, MythConnector};
