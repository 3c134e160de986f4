//! Line protocol spoken with the conversion engine.
//!
//! One JSON object per line in each direction over the engine's stdio.
//!
//! - `codec`: [`LinesCodec`](tokio_util::codec::LinesCodec)-based framing.
//! - `message`: typed requests, verbatim replies, continuing/terminal frames.
//! - `correlator`: request id → one-shot response mapper table.
//! - `reader`: stdout reader and stderr logger tasks.
//! - `writer`: stdin writer task.

pub mod codec;
pub mod correlator;
pub mod message;
pub mod reader;
pub mod writer;
