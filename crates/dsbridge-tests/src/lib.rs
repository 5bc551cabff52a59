//! Integration test crate for DSBridge.
//!
//! This crate exists solely to hold cross-crate integration tests.
//! It drives the audio engine end to end over the loopback device.

#[cfg(test)]
mod ring_buffer;

#[cfg(test)]
mod mixer;

#[cfg(test)]
mod session;
