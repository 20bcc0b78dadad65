pub mod backend;
pub mod frontend;
pub mod messages;
pub mod sequence;

pub use messages::{Command, CommandFrame, ResponsePacket};
pub use sequence::{ResponseSequence, SequencedPacket};

#[cfg(test)]
mod tests;
