//! Pipeline stages for one conversion request.
//!
//! Each submodule implements exactly one stage and knows nothing about HTTP
//! or about the other stages; the [`crate::gateway`] coordinator wires them.
//!
//! ## Data Flow
//!
//! ```text
//!            ┌──▶ local  ──┐
//! ingest ────┤             ├──▶ artifact bytes
//! (body→disk)└──▶ remote ──┘
//!              (soffice | export API)
//! ```
//!
//! 1. [`ingest`]: copy the declared-length body into the request's scratch
//!    directory under a read deadline
//! 2. [`local`]: run LibreOffice headless with the right filters; the only
//!    stage that spawns a process
//! 3. [`remote`]: the token → asset → upload → export → poll → download
//!    workflow; the only stage with network I/O

pub mod ingest;
pub mod local;
pub mod remote;
