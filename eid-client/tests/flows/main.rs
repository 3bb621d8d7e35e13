//! Flow Harness: client flows against scripted collaborators
//!
//! Every scenario runs the public flow functions over a scripted
//! transport, a manual clock and a recording advertiser:
//! - beacon registration, commit and rollback
//! - lease refresh and the advertise entry point
//! - sign-in, clock sync, persistence and inventory

mod common;
mod registration;
