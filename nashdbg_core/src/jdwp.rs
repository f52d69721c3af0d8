//! JDWP wire client.
//!
//! Speaks the Java Debug Wire Protocol over a TCP stream: the 14-byte
//! handshake, 11-byte packet headers, reply multiplexing by packet id and
//! composite-event decoding. Only the command subset the debugger host
//! needs; this is not a general JDWP client library.

pub mod client;
pub mod consts;
pub mod packet;
