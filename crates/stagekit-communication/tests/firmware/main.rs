//! Tests for the firmware dialects: command codec, status parsing,
//! parameter dumps and the capability probe.

mod codec;
mod probe;
mod status_parser;
